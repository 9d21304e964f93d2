//! `core` namespace: operators over plain values.

use crate::args::{Arg, Args};
use crate::evaluator::settle;
use crate::expr::Expr;
use crate::outcome::Outcome;
use crate::registry::OperatorRegistry;
use crate::schema::{OperatorSchema, ParamSpec};
use rill_core::{Context, EngineError, EngineResult, Value, is_truthy, to_text, values_equal};
use std::time::Duration;

/// Register the `core` namespace
///
/// # Errors
///
/// Fails if a name is already taken
pub fn register(registry: &mut OperatorRegistry) -> EngineResult<()> {
    registry
        .namespace("core")
        .register(
            "pipeline",
            OperatorSchema::new("Run steps over the current value")
                .with_variadic(ParamSpec::new("step").dynamic()),
            pipeline,
        )?
        .register(
            "list",
            OperatorSchema::new("Collect arguments into an array, skipping missing ones")
                .with_variadic(ParamSpec::new("item")),
            list,
        )?
        .register(
            "join",
            OperatorSchema::new("Join the current array into a string")
                .with_param(ParamSpec::new("separator").optional()),
            join,
        )?
        .register(
            "contains",
            OperatorSchema::new("Substring or array membership test")
                .with_param(ParamSpec::new("needle")),
            contains,
        )?
        .register(
            "equals",
            OperatorSchema::new("Deep equality with the current value")
                .with_param(ParamSpec::new("value")),
            equals,
        )?
        .register(
            "not",
            OperatorSchema::new("Negated truthiness of the argument or current value")
                .with_param(ParamSpec::new("value").optional()),
            not,
        )?
        .register(
            "filter",
            OperatorSchema::new("Keep the current value when the condition holds")
                .with_param(ParamSpec::new("condition").dynamic()),
            filter,
        )?
        .register(
            "plus",
            OperatorSchema::new("Add numbers, concatenate strings or arrays")
                .with_param(ParamSpec::new("a"))
                .with_param(ParamSpec::new("b").optional()),
            plus,
        )?
        .register(
            "to_string",
            OperatorSchema::new("Text form of the current value"),
            |ctx, _| Ok(Outcome::ready(to_text(ctx.data()))),
        )?
        .register(
            "delay",
            OperatorSchema::new("Pass the current value on after a pause")
                .with_param(ParamSpec::new("ms")),
            delay,
        )?
        .register(
            "count",
            OperatorSchema::new("Number of items in the current value"),
            |ctx, _| Ok(Outcome::ready(count(ctx.data()))),
        )?
        .register(
            "raise",
            OperatorSchema::new("Fail with a message").with_param(ParamSpec::new("message")),
            |_, args| Err(EngineError::raised(to_text(args.value(0)?))),
        )?;
    Ok(())
}

fn pipeline(ctx: &Context, args: Args) -> EngineResult<Outcome> {
    let mut steps = Vec::with_capacity(args.len());
    let mut evaluator = None;
    for index in 0..args.len() {
        let step = args.dynamic(index)?;
        steps.push(step.expr().clone());
        evaluator.get_or_insert_with(|| step.evaluator().clone());
    }
    match evaluator {
        Some(evaluator) => evaluator.evaluate(&Expr::pipeline(steps), ctx),
        None => Ok(Outcome::Ready(ctx.data().clone())),
    }
}

fn list(_: &Context, args: Args) -> EngineResult<Outcome> {
    let mut items = Vec::with_capacity(args.len());
    for (index, arg) in args.iter().enumerate() {
        match arg {
            Arg::Value(value) => items.push(value.clone()),
            Arg::Absent => {}
            _ => return Err(args.invalid(format!("item {} is not a plain value", index))),
        }
    }
    Ok(Outcome::Ready(Value::Array(items)))
}

fn join(ctx: &Context, args: Args) -> EngineResult<Outcome> {
    let separator = match args.opt_value(0)? {
        Some(sep) => to_text(sep),
        None => ",".to_string(),
    };
    let text = match ctx.data() {
        Value::Array(items) => items.iter().map(to_text).collect::<Vec<_>>().join(&separator),
        other => to_text(other),
    };
    Ok(Outcome::ready(text))
}

fn contains(ctx: &Context, args: Args) -> EngineResult<Outcome> {
    let needle = args.value(0)?;
    let found = match ctx.data() {
        Value::String(text) => text.contains(&to_text(needle)),
        Value::Array(items) => items.iter().any(|item| values_equal(item, needle)),
        Value::Object(map) => needle.as_str().is_some_and(|key| map.contains_key(key)),
        _ => false,
    };
    Ok(Outcome::ready(found))
}

fn equals(ctx: &Context, args: Args) -> EngineResult<Outcome> {
    Ok(Outcome::ready(values_equal(ctx.data(), args.value(0)?)))
}

fn not(ctx: &Context, args: Args) -> EngineResult<Outcome> {
    let truthy = match args.get(0) {
        Some(Arg::Absent) => false,
        Some(_) => is_truthy(args.value(0)?),
        None => is_truthy(ctx.data()),
    };
    Ok(Outcome::ready(!truthy))
}

fn filter(ctx: &Context, args: Args) -> EngineResult<Outcome> {
    let current = ctx.data().clone();
    match args.dynamic(0)?.evaluate()? {
        Outcome::Ready(verdict) => Ok(if is_truthy(&verdict) {
            Outcome::Ready(current)
        } else {
            Outcome::Dropped
        }),
        Outcome::Dropped => Ok(Outcome::Dropped),
        other => {
            let verdict = settle(other, ctx);
            Ok(Outcome::pending_opt(async move {
                let keep = verdict.await?.as_ref().is_some_and(is_truthy);
                Ok::<_, EngineError>(keep.then_some(current))
            }))
        }
    }
}

fn plus(ctx: &Context, args: Args) -> EngineResult<Outcome> {
    let sum = match args.opt_value(1)? {
        Some(b) => add(args.value(0)?, b),
        None => add(ctx.data(), args.value(0)?),
    };
    sum.map(Outcome::Ready)
        .map_err(|reason| args.invalid(reason))
}

fn add(a: &Value, b: &Value) -> Result<Value, String> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            if let (Some(x), Some(y)) = (x.as_i64(), y.as_i64()) {
                if let Some(sum) = x.checked_add(y) {
                    return Ok(Value::from(sum));
                }
            }
            match (x.as_f64(), y.as_f64()) {
                (Some(x), Some(y)) => serde_json::Number::from_f64(x + y)
                    .map(Value::Number)
                    .ok_or_else(|| "sum is not a finite number".to_string()),
                _ => Err("operands are not numbers".to_string()),
            }
        }
        (Value::Array(x), Value::Array(y)) => Ok(Value::Array(x.iter().chain(y).cloned().collect())),
        (Value::Array(x), other) => {
            let mut items = x.clone();
            items.push(other.clone());
            Ok(Value::Array(items))
        }
        (Value::String(_), _) | (_, Value::String(_)) => Ok(Value::String(to_text(a) + &to_text(b))),
        (Value::Null, other) | (other, Value::Null) => Ok(other.clone()),
        _ => Err(format!("cannot add {} and {}", a, b)),
    }
}

fn delay(ctx: &Context, args: Args) -> EngineResult<Outcome> {
    let pause = Duration::from_millis(args.u64(0)?);
    let current = ctx.data().clone();
    Ok(Outcome::pending(async move {
        tokio::time::sleep(pause).await;
        Ok(current)
    }))
}

fn count(value: &Value) -> Value {
    let n = match value {
        Value::Null => 0,
        Value::Array(items) => items.len(),
        Value::Object(map) => map.len(),
        _ => 1,
    };
    Value::from(n)
}
