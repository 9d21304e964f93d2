//! Pipeline evaluation.

use crate::args::{Arg, Args, DynamicArg};
use crate::expr::{Expr, PipelineExpr, StepExpr};
use crate::outcome::Outcome;
use crate::registry::{OperatorEntry, OperatorRegistry};
use crate::resolver::resolve;
use futures::FutureExt;
use futures::future::{self, BoxFuture};
use rill_core::{Binding, Context, EngineError, EngineResult, Value};
use std::sync::Arc;

/// Evaluates expression trees against a context.
///
/// Cheap to clone; clones share the registry.
#[derive(Clone)]
pub struct Evaluator {
    registry: Arc<OperatorRegistry>,
}

impl Evaluator {
    /// Evaluator over `registry`
    #[must_use]
    pub fn new(registry: OperatorRegistry) -> Self {
        Self::from_arc(Arc::new(registry))
    }

    /// Evaluator over a shared registry
    #[must_use]
    pub fn from_arc(registry: Arc<OperatorRegistry>) -> Self {
        Self { registry }
    }

    /// Evaluator with only the built-in operators
    #[must_use]
    pub fn with_builtins() -> Self {
        Self::new(OperatorRegistry::with_builtins())
    }

    /// Evaluator with only the built-in operators, failing if any of them
    /// cannot be registered
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Registry`] on a registration failure
    pub fn try_with_builtins() -> EngineResult<Self> {
        Ok(Self::new(OperatorRegistry::try_with_builtins()?))
    }

    /// Operators available to this evaluator
    #[must_use]
    pub fn registry(&self) -> &OperatorRegistry {
        &self.registry
    }

    /// Evaluate `expr` against `ctx`.
    ///
    /// Returns [`Outcome::Ready`] when every step completed synchronously
    /// and a single [`Outcome::Pending`] as soon as any step had to wait.
    ///
    /// # Errors
    ///
    /// Fails on unresolved references, unknown operators, arity mismatches,
    /// operator errors, cancellation and excessive nesting
    pub fn evaluate(&self, expr: &Expr, ctx: &Context) -> EngineResult<Outcome> {
        ctx.check_cancelled()?;
        let limit = ctx.config().max_eval_depth;
        if ctx.depth() > limit {
            return Err(EngineError::DepthExceeded { limit });
        }

        match expr {
            Expr::Literal(value) => Ok(Outcome::Ready(value.clone())),
            Expr::PathRef { .. } | Expr::VarRef { .. } | Expr::Template(_) => {
                Ok(match resolve(expr, ctx)? {
                    Some(Binding::Value(value)) => Outcome::Ready(value),
                    Some(Binding::Resource(resource)) => Outcome::Resource(resource),
                    None => Outcome::Dropped,
                })
            }
            Expr::Step(step) => self.evaluate_step(step, ctx),
            Expr::Pipeline(pipeline) => {
                self.run_steps(Arc::clone(pipeline), 0, ctx.data().clone(), ctx)
            }
        }
    }

    /// Evaluate and wait for a plain value.
    ///
    /// Streams are collected into an array, resources yield their snapshot
    /// and `None` means the expression produced no value.
    ///
    /// # Errors
    ///
    /// Propagates evaluation errors, rejected futures and stream errors
    pub async fn evaluate_value(&self, expr: &Expr, ctx: &Context) -> EngineResult<Option<Value>> {
        let outcome = self.evaluate(expr, ctx)?;
        settle(outcome, ctx).await
    }

    fn evaluate_step(&self, step: &Arc<StepExpr>, ctx: &Context) -> EngineResult<Outcome> {
        let entry: Arc<OperatorEntry> = ctx.cached(step.id, || self.registry.get(&step.operator))?;
        let name = entry.id.to_string();
        entry.schema.check_arity(&name, step.args.len())?;

        let mut args = Vec::with_capacity(step.args.len());
        let mut waiting: Vec<(usize, BoxFuture<'static, EngineResult<Option<Value>>>)> = Vec::new();
        for (index, arg) in step.args.iter().enumerate() {
            if entry.schema.is_dynamic(index) {
                args.push(Arg::Dynamic(DynamicArg::new(
                    arg.clone(),
                    ctx.clone(),
                    self.clone(),
                )));
                continue;
            }
            args.push(match self.evaluate(arg, ctx)? {
                Outcome::Ready(value) => Arg::Value(value),
                Outcome::Dropped => Arg::Absent,
                Outcome::Stream(stream) => Arg::Stream(stream),
                Outcome::Element(element) => Arg::Element(element),
                Outcome::Resource(resource) => Arg::Resource(resource),
                Outcome::Pending(future) => {
                    waiting.push((index, future));
                    Arg::Absent
                }
            });
        }

        if waiting.is_empty() {
            return invoke(&entry, name, ctx, args);
        }

        tracing::trace!(operator = %name, pending = waiting.len(), "awaiting arguments");
        let ctx = ctx.clone();
        Ok(Outcome::Pending(
            async move {
                for (index, future) in waiting {
                    args[index] = match future.await? {
                        Some(value) => Arg::Value(value),
                        None => Arg::Absent,
                    };
                }
                ctx.check_cancelled()?;
                let outcome = invoke(&entry, name, &ctx, args)?;
                settle(outcome, &ctx).await
            }
            .boxed(),
        ))
    }

    fn run_steps(
        &self,
        pipeline: Arc<PipelineExpr>,
        start: usize,
        input: Value,
        ctx: &Context,
    ) -> EngineResult<Outcome> {
        let count = pipeline.steps.len();
        let mut acc = input;

        for index in start..count {
            let last = index + 1 == count;
            let step = &pipeline.steps[index];
            let step_ctx = ctx.with_data(acc);

            let waiting = match self.evaluate(step, &step_ctx)? {
                Outcome::Ready(value) => {
                    acc = value;
                    continue;
                }
                Outcome::Resource(resource) if !last => {
                    acc = resource.snapshot();
                    continue;
                }
                Outcome::Dropped => {
                    tracing::trace!(step = index, "pipeline dropped its value");
                    return Ok(Outcome::Dropped);
                }
                Outcome::Element(_) if !last => {
                    return Err(EngineError::invalid_argument(
                        step.describe(),
                        "a pipe element cannot feed later pipeline steps",
                    ));
                }
                Outcome::Pending(future) if !last => future,
                Outcome::Stream(stream) if !last => {
                    let collect_ctx = step_ctx.clone();
                    async move {
                        let items = stream.collect(&collect_ctx).await?;
                        Ok::<_, EngineError>(Some(Value::Array(items)))
                    }
                    .boxed()
                }
                terminal => return Ok(terminal),
            };

            tracing::trace!(step = index, remaining = count - index - 1, "pipeline suspended");
            let evaluator = self.clone();
            let ctx = ctx.clone();
            return Ok(Outcome::Pending(
                async move {
                    let Some(value) = waiting.await? else {
                        return Ok(None);
                    };
                    ctx.check_cancelled()?;
                    let rest = evaluator.run_steps(pipeline, index + 1, value, &ctx)?;
                    settle(rest, &ctx).await
                }
                .boxed(),
            ));
        }

        Ok(Outcome::Ready(acc))
    }
}

impl std::fmt::Debug for Evaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Evaluator")
            .field("operators", &self.registry.len())
            .finish()
    }
}

fn invoke(entry: &OperatorEntry, name: String, ctx: &Context, args: Vec<Arg>) -> EngineResult<Outcome> {
    tracing::trace!(operator = %name, args = args.len(), "invoking operator");
    let outcome = entry
        .invoke(ctx, Args::new(name.clone(), args))
        .map_err(|error| {
            tracing::debug!(operator = %name, %error, "operator failed");
            EngineError::evaluation(name.clone(), error)
        })?;

    Ok(match outcome {
        Outcome::Pending(future) => Outcome::Pending(
            future
                .map(move |result| result.map_err(|error| EngineError::evaluation(name, error)))
                .boxed(),
        ),
        other => other,
    })
}

/// Turn any outcome into a future of a plain value.
///
/// Streams are subscribed when the future is first polled and collected
/// into an array; resources yield their snapshot.
pub fn settle(outcome: Outcome, ctx: &Context) -> BoxFuture<'static, EngineResult<Option<Value>>> {
    match outcome {
        Outcome::Ready(value) => future::ready(Ok(Some(value))).boxed(),
        Outcome::Dropped => future::ready(Ok(None)).boxed(),
        Outcome::Pending(future) => future,
        Outcome::Resource(resource) => future::ready(Ok(Some(resource.snapshot()))).boxed(),
        Outcome::Stream(stream) => {
            let ctx = ctx.clone();
            async move {
                let items = stream.collect(&ctx).await?;
                Ok::<_, EngineError>(Some(Value::Array(items)))
            }
            .boxed()
        }
        Outcome::Element(element) => future::ready(Err(EngineError::invalid_argument(
            "rx.pipe",
            format!("{:?} has no value outside a pipe", element),
        )))
        .boxed(),
    }
}
