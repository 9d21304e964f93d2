//! `rx` namespace: stream sources, operators and resources.
//!
//! Operator expressions (`rx.map`, `rx.filter`, ...) take their argument
//! unevaluated and evaluate it once per item, with the item as the current
//! value and the subscription's scope for variables. `rx.pipe` assembles its
//! elements per subscription so resources declared with `rx.resource` are
//! visible to every later element.

use crate::args::{Args, DynamicArg};
use crate::outcome::Outcome;
use crate::registry::OperatorRegistry;
use crate::schema::{OperatorSchema, ParamSpec};
use parking_lot::Mutex;
use rill_core::{Context, EngineError, EngineResult, ResourceRef, Value, is_truthy};
use rill_stream::{
    Observable, Operator, OverflowPolicy, PipeElement, Queue, QueueConfig, spawn_linked,
};
use std::sync::Arc;
use std::time::Duration;

/// Register the `rx` namespace
///
/// # Errors
///
/// Fails if a name is already taken
pub fn register(registry: &mut OperatorRegistry) -> EngineResult<()> {
    let expr = || ParamSpec::new("expr").dynamic();
    registry
        .namespace("rx")
        .register(
            "pipe",
            OperatorSchema::new("Compose a source, operators and resources left to right")
                .with_variadic(ParamSpec::new("element").dynamic()),
            pipe,
        )?
        .register(
            "data",
            OperatorSchema::new("Stream the items of an array").with_param(ParamSpec::new("items")),
            |_, args| Ok(Outcome::Stream(source_of(args.value(0)?.clone()))),
        )?
        .register(
            "map",
            OperatorSchema::new("Transform each item").with_param(expr()),
            map,
        )?
        .register(
            "filter",
            OperatorSchema::new("Keep items whose expression is truthy").with_param(expr()),
            filter,
        )?
        .register(
            "do",
            OperatorSchema::new("Evaluate a side effect per item").with_param(expr()),
            tap,
        )?
        .register(
            "map_promise",
            OperatorSchema::new("Transform each item asynchronously, one at a time")
                .with_param(expr()),
            map_promise,
        )?
        .register(
            "do_promise",
            OperatorSchema::new("Await a side effect per item, then forward the item")
                .with_param(expr()),
            do_promise,
        )?
        .register(
            "delay",
            OperatorSchema::new("Delay every item").with_param(ParamSpec::new("ms")),
            |_, args| Ok(operator(rill_stream::delay(Duration::from_millis(args.u64(0)?)))),
        )?
        .register(
            "take",
            OperatorSchema::new("First n items").with_param(ParamSpec::new("n")),
            |_, args| Ok(operator(rill_stream::take(count(&args, 0)?))),
        )?
        .register(
            "skip",
            OperatorSchema::new("All but the first n items").with_param(ParamSpec::new("n")),
            |_, args| Ok(operator(rill_stream::skip(count(&args, 0)?))),
        )?
        .register(
            "interval",
            OperatorSchema::new("Emit 0, 1, 2, ... every period").with_param(ParamSpec::new("ms")),
            |_, args| {
                Ok(Outcome::Stream(rill_stream::interval(Duration::from_millis(
                    args.u64(0)?,
                ))))
            },
        )?
        .register(
            "fork",
            OperatorSchema::new("Feed every item to side branches")
                .with_variadic(ParamSpec::new("branch").dynamic()),
            |_, args| Ok(operator(rill_stream::fork(operators(&args)?))),
        )?
        .register(
            "chain",
            OperatorSchema::new("Compose operators into one")
                .with_variadic(ParamSpec::new("operator").dynamic()),
            |_, args| Ok(operator(Operator::chain(operators(&args)?))),
        )?
        .register(
            "resource",
            OperatorSchema::new("Create a resource per subscription and bind it by name")
                .with_param(ParamSpec::new("name"))
                .with_param(ParamSpec::new("factory").dynamic()),
            resource,
        )?
        .register(
            "queue",
            OperatorSchema::new("Queue resource holding pending items")
                .with_param(ParamSpec::new("items").optional())
                .with_param(ParamSpec::new("capacity").optional())
                .with_param(ParamSpec::new("overflow").optional()),
            queue,
        )?
        .register(
            "source_queue",
            OperatorSchema::new("Drain the queue bound to a variable")
                .with_param(ParamSpec::new("name")),
            |_, args| Ok(Outcome::Stream(rill_stream::source_queue(args.str(0)?))),
        )?;
    Ok(())
}

fn operator(op: Operator) -> Outcome {
    Outcome::Element(PipeElement::Operator(op))
}

fn count(args: &Args, index: usize) -> EngineResult<usize> {
    usize::try_from(args.u64(index)?).map_err(|_| args.invalid("count does not fit in memory"))
}

fn source_of(value: Value) -> Observable {
    match value {
        Value::Array(items) => rill_stream::from_iter(items),
        other => rill_stream::of(other),
    }
}

/// Stream producing the result of a pending evaluation
fn source_once(
    future: futures::future::BoxFuture<'static, EngineResult<Option<Value>>>,
) -> Observable {
    let slot = Arc::new(Mutex::new(Some(future)));
    Observable::new(move |_, sub| {
        let Some(future) = slot.lock().take() else {
            sub.error(EngineError::stream("a pending value can only be streamed once"));
            return;
        };
        let emitter = sub.clone();
        spawn_linked(&sub, async move {
            match future.await {
                Ok(Some(value)) => {
                    emitter.next(value);
                    emitter.complete();
                }
                Ok(None) => emitter.complete(),
                Err(error) => emitter.error(error),
            }
        });
    })
}

/// What an `rx.pipe` argument contributes
fn element(outcome: Outcome) -> EngineResult<PipeElement> {
    Ok(match outcome {
        Outcome::Stream(stream) => PipeElement::Source(stream),
        Outcome::Element(element) => element,
        Outcome::Ready(value) => PipeElement::Source(source_of(value)),
        Outcome::Dropped => PipeElement::Source(rill_stream::empty()),
        Outcome::Pending(future) => PipeElement::Source(source_once(future)),
        Outcome::Resource(resource) => {
            return Err(EngineError::invalid_argument(
                "rx.pipe",
                format!(
                    "a bare {} resource must be declared with rx.resource",
                    resource.kind()
                ),
            ));
        }
    })
}

fn pipe(ctx: &Context, args: Args) -> EngineResult<Outcome> {
    let mut elements = Vec::with_capacity(args.len());
    for index in 0..args.len() {
        let arg = args.dynamic(index)?.clone();
        elements.push(PipeElement::deferred(move |scope| {
            element(arg.evaluate_in(scope)?)
        }));
    }
    Ok(Outcome::Stream(rill_stream::pipe(elements).bind(ctx.clone())))
}

/// Evaluate `arg` for one item; only immediate results are allowed
fn per_item(arg: &DynamicArg, ctx: &Context, value: Value, operator: &str) -> EngineResult<Option<Value>> {
    match arg.evaluate_in(&ctx.with_data(value))? {
        Outcome::Ready(value) => Ok(Some(value)),
        Outcome::Dropped => Ok(None),
        Outcome::Resource(resource) => Ok(Some(resource.snapshot())),
        other => Err(EngineError::invalid_argument(
            operator,
            format!(
                "expression produced a {}; use the _promise variant for asynchronous work",
                other.kind()
            ),
        )),
    }
}

fn map(_: &Context, args: Args) -> EngineResult<Outcome> {
    let arg = args.dynamic(0)?.clone();
    Ok(operator(rill_stream::filter_map(move |ctx, value| {
        per_item(&arg, ctx, value, "rx.map")
    })))
}

fn filter(_: &Context, args: Args) -> EngineResult<Outcome> {
    let arg = args.dynamic(0)?.clone();
    Ok(operator(rill_stream::filter(move |ctx, value| {
        let verdict = per_item(&arg, ctx, value.clone(), "rx.filter")?;
        Ok(verdict.as_ref().is_some_and(is_truthy))
    })))
}

fn tap(_: &Context, args: Args) -> EngineResult<Outcome> {
    let arg = args.dynamic(0)?.clone();
    Ok(operator(rill_stream::tap(move |ctx, value| {
        per_item(&arg, ctx, value.clone(), "rx.do").map(|_| ())
    })))
}

fn map_promise(_: &Context, args: Args) -> EngineResult<Outcome> {
    let arg = args.dynamic(0)?.clone();
    Ok(operator(rill_stream::filter_map_promise(move |ctx, value| {
        let arg = arg.clone();
        async move { arg.value_in(&ctx, value).await }
    })))
}

fn do_promise(_: &Context, args: Args) -> EngineResult<Outcome> {
    let arg = args.dynamic(0)?.clone();
    Ok(operator(rill_stream::do_promise(move |ctx, value| {
        let arg = arg.clone();
        async move { arg.value_in(&ctx, value).await.map(|_| ()) }
    })))
}

/// Evaluate each branch to a stream operator
fn operators(args: &Args) -> EngineResult<Vec<Operator>> {
    let mut ops = Vec::with_capacity(args.len());
    for index in 0..args.len() {
        match args.dynamic(index)?.evaluate()? {
            Outcome::Element(PipeElement::Operator(op)) => ops.push(op),
            other => {
                return Err(args.invalid(format!(
                    "argument {} must be a stream operator, got {}",
                    index,
                    other.kind()
                )));
            }
        }
    }
    Ok(ops)
}

fn resource(_: &Context, args: Args) -> EngineResult<Outcome> {
    let name = args.str(0)?.to_string();
    let factory = args.dynamic(1)?.clone();
    let label = name.clone();
    Ok(Outcome::Element(PipeElement::resource(name, move |scope| {
        match factory.evaluate_in(scope)? {
            Outcome::Resource(resource) => Ok(resource),
            other => Err(EngineError::invalid_argument(
                "rx.resource",
                format!("factory for '{}' produced a {}, not a resource", label, other.kind()),
            )),
        }
    })))
}

fn queue(_: &Context, args: Args) -> EngineResult<Outcome> {
    let items = match args.opt_value(0)? {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items.clone(),
        Some(single) => vec![single.clone()],
    };

    let mut config = QueueConfig::new();
    if let Some(capacity) = args.opt_value(1)? {
        if !capacity.is_null() {
            config = config.with_capacity(count(&args, 1)?);
        }
    }
    if let Some(overflow) = args.opt_value(2)? {
        let policy = match overflow.as_str() {
            Some("drop_newest") => OverflowPolicy::DropNewest,
            Some("drop_oldest") => OverflowPolicy::DropOldest,
            Some("reject") => OverflowPolicy::Reject,
            _ => {
                return Err(args.invalid(format!(
                    "overflow must be drop_newest, drop_oldest or reject, got {}",
                    overflow
                )));
            }
        };
        config = config.with_overflow(policy);
    }

    let resource: ResourceRef = Queue::new(items, config);
    Ok(Outcome::Resource(resource))
}

#[cfg(test)]
mod tests {
    use crate::evaluator::Evaluator;
    use crate::expr::Expr;
    use pretty_assertions::assert_eq;
    use rill_core::{Context, EngineError, Value};
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn run(doc: Value, data: Value) -> Result<Option<Value>, EngineError> {
        let evaluator = Evaluator::with_builtins();
        let ctx = Context::new(data);
        evaluator.evaluate_value(&Expr::from_json(&doc)?, &ctx).await
    }

    fn op(name: &str, args: Value) -> Value {
        json!({"$op": name, "args": args})
    }

    #[tokio::test]
    async fn test_pipe_map_join() {
        let doc = json!({"$pipeline": [
            op("rx.pipe", json!([op("rx.data", json!([[1, 2, 3, 4]])), op("rx.map", json!(["-%%-"]))])),
            op("core.join", json!([","]))
        ]});
        assert_eq!(run(doc, json!(null)).await.unwrap(), Some(json!("-1-,-2-,-3-,-4-")));
    }

    #[tokio::test]
    async fn test_pipe_source_from_current_value() {
        let doc = json!({"$pipeline": [
            "%items%",
            op("rx.pipe", json!(["%%", op("rx.filter", json!([op("core.not", json!(["%done%"]))])), op("rx.map", json!(["%id%"]))]))
        ]});
        let data = json!({"items": [
            {"id": 1, "done": true},
            {"id": 2, "done": false},
            {"id": 3, "done": false}
        ]});
        assert_eq!(run(doc, data).await.unwrap(), Some(json!([2, 3])));
    }

    #[tokio::test]
    async fn test_take_skip() {
        let doc = op(
            "rx.pipe",
            json!([op("rx.data", json!([[1, 2, 3, 4, 5, 6]])), op("rx.skip", json!([1])), op("rx.take", json!([2]))]),
        );
        assert_eq!(run(doc, json!(null)).await.unwrap(), Some(json!([2, 3])));
    }

    #[tokio::test]
    async fn test_interval_with_take() {
        let doc = op(
            "rx.pipe",
            json!([op("rx.interval", json!([1])), op("rx.take", json!([3]))]),
        );
        assert_eq!(run(doc, json!(null)).await.unwrap(), Some(json!([0, 1, 2])));
    }

    #[tokio::test]
    async fn test_map_promise_keeps_order() {
        // later items finish sooner
        let doc = op(
            "rx.pipe",
            json!([
                op("rx.data", json!([[30, 1, 10]])),
                op("rx.map_promise", json!([{"$pipeline": [
                    {"$op": "core.delay", "args": ["%%"]},
                    op("core.plus", json!([1]))
                ]}]))
            ]),
        );
        assert_eq!(run(doc, json!(null)).await.unwrap(), Some(json!([31, 2, 11])));
    }

    #[tokio::test]
    async fn test_map_rejects_async_expression() {
        let doc = op(
            "rx.pipe",
            json!([op("rx.data", json!([[1]])), op("rx.map", json!([op("core.delay", json!([1]))]))]),
        );
        let err = run(doc, json!(null)).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidArgument { ref operator, .. } if operator == "rx.map"));
    }

    #[tokio::test]
    async fn test_stream_error_propagates() {
        let doc = op(
            "rx.pipe",
            json!([op("rx.data", json!([[1, 2]])), op("rx.map", json!([op("core.raise", json!(["nope"]))]))]),
        );
        let err = run(doc, json!(null)).await.unwrap_err();
        assert_eq!(err.root_cause(), &EngineError::raised("nope"));
    }

    #[tokio::test]
    async fn test_pipe_without_source() {
        let err = run(op("rx.pipe", json!([])), json!(null)).await.unwrap_err();
        assert_eq!(err, EngineError::stream("pipe has no source"));

        let doc = op("rx.pipe", json!([op("rx.take", json!([1]))]));
        let err = run(doc, json!(null)).await.unwrap_err();
        assert_eq!(
            err,
            EngineError::stream("operator take appears before the pipe source")
        );
    }

    #[tokio::test]
    async fn test_queue_close_completes_after_drain() {
        let doc = op(
            "rx.pipe",
            json!([
                op("rx.resource", json!(["q", op("rx.queue", json!([["a", "b"]]))])),
                op("rx.source_queue", json!(["q"])),
                op("rx.do", json!([op("queue.close", json!(["%$q%"]))]))
            ]),
        );
        assert_eq!(run(doc, json!(null)).await.unwrap(), Some(json!(["a", "b"])));
    }

    #[tokio::test]
    async fn test_queue_items_added_while_draining() {
        let doc = op(
            "rx.pipe",
            json!([
                op("rx.resource", json!(["q", op("rx.queue", json!([["a"]]))])),
                op("rx.source_queue", json!(["q"])),
                op("rx.take", json!([3])),
                op("rx.do", json!([op("queue.add", json!(["%$q%", "%%!"]))]))
            ]),
        );
        assert_eq!(
            run(doc, json!(null)).await.unwrap(),
            Some(json!(["a", "a!", "a!!"]))
        );
    }

    #[tokio::test]
    async fn test_resource_factory_must_build_resource() {
        let doc = op(
            "rx.pipe",
            json!([op("rx.resource", json!(["q", 5])), op("rx.data", json!([[1]]))]),
        );
        let err = run(doc, json!(null)).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidArgument { ref operator, .. } if operator == "rx.resource"));
    }

    #[tokio::test]
    async fn test_fork_branches_see_items() {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        let mut registry = crate::registry::OperatorRegistry::with_builtins();
        registry
            .namespace("test")
            .register("bump", crate::schema::OperatorSchema::new("Count"), move |ctx, _| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(crate::outcome::Outcome::Ready(ctx.data().clone()))
            })
            .unwrap();
        let evaluator = Evaluator::new(registry);

        let doc = op(
            "rx.pipe",
            json!([
                op("rx.data", json!([[1, 2, 3]])),
                op("rx.fork", json!([
                    op("rx.do", json!([op("test.bump", json!([]))])),
                    op("rx.chain", json!([op("rx.take", json!([1])), op("rx.do", json!([op("test.bump", json!([]))]))]))
                ]))
            ]),
        );
        let ctx = Context::new(json!(null));
        let value = evaluator
            .evaluate_value(&Expr::from_json(&doc).unwrap(), &ctx)
            .await
            .unwrap();
        assert_eq!(value, Some(json!([1, 2, 3])));
        assert_eq!(seen.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_fork_rejects_non_operator_branch() {
        let doc = op(
            "rx.pipe",
            json!([op("rx.data", json!([[1]])), op("rx.fork", json!([5]))]),
        );
        assert!(run(doc, json!(null)).await.is_err());
    }

    #[tokio::test]
    async fn test_queue_overflow_argument() {
        let doc = op("rx.queue", json!([[], 1, "explode"]));
        let err = run(doc, json!(null)).await.unwrap_err();
        assert!(matches!(err, EngineError::Evaluation { .. }));
    }
}
