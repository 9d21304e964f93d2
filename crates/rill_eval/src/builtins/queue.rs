//! `queue` namespace: actions on queue resources.
//!
//! The first argument is either the queue itself (`%$q%`) or the name of
//! the variable holding it.

use crate::args::{Arg, Args};
use crate::outcome::Outcome;
use crate::registry::OperatorRegistry;
use crate::schema::{OperatorSchema, ParamSpec};
use rill_core::{Context, EngineResult, Value, downcast_resource};
use rill_stream::{Queue, lookup_queue};
use std::sync::Arc;

/// Register the `queue` namespace
///
/// # Errors
///
/// Fails if a name is already taken
pub fn register(registry: &mut OperatorRegistry) -> EngineResult<()> {
    let target = || ParamSpec::new("queue");
    registry
        .namespace("queue")
        .register(
            "add",
            OperatorSchema::new("Append an item; false when it was dropped")
                .with_param(target())
                .with_param(ParamSpec::new("item")),
            |ctx, args| {
                let queue = resolve_queue(ctx, &args)?;
                Ok(Outcome::ready(queue.add(args.value(1)?.clone())?))
            },
        )?
        .register(
            "remove",
            OperatorSchema::new("Remove the pending item at an index")
                .with_param(target())
                .with_param(ParamSpec::new("index")),
            |ctx, args| {
                let queue = resolve_queue(ctx, &args)?;
                let index = usize::try_from(args.u64(1)?).unwrap_or(usize::MAX);
                Ok(Outcome::Ready(queue.remove(index).unwrap_or(Value::Null)))
            },
        )?
        .register(
            "close",
            OperatorSchema::new("Stop accepting items").with_param(target()),
            |ctx, args| {
                resolve_queue(ctx, &args)?.close();
                Ok(Outcome::ready(true))
            },
        )?
        .register(
            "len",
            OperatorSchema::new("Number of pending items").with_param(target()),
            |ctx, args| Ok(Outcome::ready(resolve_queue(ctx, &args)?.len())),
        )?;
    Ok(())
}

fn resolve_queue(ctx: &Context, args: &Args) -> EngineResult<Arc<Queue>> {
    match args.get(0) {
        Some(Arg::Resource(resource)) => downcast_resource::<Queue>(Arc::clone(resource))
            .ok_or_else(|| args.invalid(format!("expected a queue, got a {}", resource.kind()))),
        Some(Arg::Value(Value::String(name))) => lookup_queue(ctx, name),
        _ => Err(args.invalid("argument 0 must be a queue or the name of one")),
    }
}

#[cfg(test)]
mod tests {
    use crate::evaluator::Evaluator;
    use crate::expr::Expr;
    use crate::outcome::Outcome;
    use pretty_assertions::assert_eq;
    use rill_core::{Binding, Context, EngineError, Resource, ResourceRef, Value};
    use rill_stream::{Queue, QueueConfig};
    use serde_json::json;
    use std::sync::Arc;

    fn with_queue(items: Vec<Value>) -> (Arc<Queue>, Context) {
        let queue = Queue::new(items, QueueConfig::new().with_capacity(3));
        let resource: ResourceRef = queue.clone();
        let ctx = Context::new(json!(null)).with_var("q", Binding::Resource(resource));
        (queue, ctx)
    }

    fn eval(doc: Value, ctx: &Context) -> Result<Value, EngineError> {
        match Evaluator::with_builtins().evaluate(&Expr::from_json(&doc)?, ctx)? {
            Outcome::Ready(value) => Ok(value),
            other => panic!("expected a ready value, got {:?}", other),
        }
    }

    #[test]
    fn test_add_by_reference_and_name() {
        let (queue, ctx) = with_queue(vec![]);
        assert_eq!(eval(json!({"$op": "queue.add", "args": ["%$q%", 1]}), &ctx).unwrap(), json!(true));
        assert_eq!(eval(json!({"$op": "queue.add", "args": ["q", 2]}), &ctx).unwrap(), json!(true));
        assert_eq!(queue.snapshot(), json!([1, 2]));
        assert_eq!(eval(json!({"$op": "queue.len", "args": ["q"]}), &ctx).unwrap(), json!(2));
    }

    #[test]
    fn test_add_when_full_drops_newest() {
        let (queue, ctx) = with_queue(vec![json!(1), json!(2), json!(3)]);
        assert_eq!(eval(json!({"$op": "queue.add", "args": ["q", 4]}), &ctx).unwrap(), json!(false));
        assert_eq!(queue.len(), 3);
    }

    #[test]
    fn test_remove() {
        let (queue, ctx) = with_queue(vec![json!("a"), json!("b")]);
        assert_eq!(eval(json!({"$op": "queue.remove", "args": ["q", 0]}), &ctx).unwrap(), json!("a"));
        assert_eq!(eval(json!({"$op": "queue.remove", "args": ["q", 9]}), &ctx).unwrap(), Value::Null);
        assert_eq!(queue.snapshot(), json!(["b"]));
    }

    #[test]
    fn test_close_rejects_later_adds() {
        let (queue, ctx) = with_queue(vec![]);
        eval(json!({"$op": "queue.close", "args": ["q"]}), &ctx).unwrap();
        assert!(queue.is_closed());
        let err = eval(json!({"$op": "queue.add", "args": ["q", 1]}), &ctx).unwrap_err();
        assert_eq!(err.root_cause(), &EngineError::stream("queue is closed"));
    }

    #[test]
    fn test_not_a_queue() {
        let ctx = Context::new(json!(null)).with_var("q", json!([1]));
        let err = eval(json!({"$op": "queue.add", "args": ["q", 1]}), &ctx).unwrap_err();
        assert_eq!(err, EngineError::reference("$q", "variable is not a queue"));
        assert!(eval(json!({"$op": "queue.len", "args": [5]}), &ctx).is_err());
    }
}
