//! Single timed check.
//!
//! A check evaluates `calculate` against the context, reduces the outcome to
//! one value, then evaluates `expected` with that value as the current data
//! and as a variable. A boolean computed by a non-literal `expected` is
//! taken as a verdict; a literal, or any other value, is compared
//! structurally with the computed one.
//!
//! # Abandonment
//!
//! When the limit expires the in-flight future is dropped and the context is
//! cancelled. Stream subscriptions are torn down with it, but work already
//! handed to a spawned task keeps running until it next checks the
//! cancellation flag. The report does not wait for it.

use crate::config::HarnessConfig;
use rill_core::{Context, EngineError, EngineResult, Value, values_equal};
use rill_eval::{Evaluator, Expr, Outcome, settle};
use rill_stream::Observable;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Per-check settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckOptions {
    /// Time limit for the whole check
    pub timeout_ms: u64,
    /// Variable bound to the computed value while `expected` runs
    pub actual_variable: String,
}

impl CheckOptions {
    /// Options taken from the default harness config
    #[must_use]
    pub fn new() -> Self {
        Self::from(&HarnessConfig::default())
    }

    /// Set the time limit
    #[must_use]
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }
}

impl Default for CheckOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&HarnessConfig> for CheckOptions {
    fn from(config: &HarnessConfig) -> Self {
        Self {
            timeout_ms: config.default_timeout_ms,
            actual_variable: config.actual_variable.clone(),
        }
    }
}

/// Check verdict
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckReport {
    /// Whether the check passed
    pub pass: bool,
    /// Computed value, if `calculate` finished
    pub actual: Option<Value>,
    /// Why the check failed
    pub diagnostic: Option<String>,
    /// Wall time spent
    pub elapsed_ms: u64,
}

impl CheckReport {
    /// Passing report
    #[must_use]
    pub fn passed(actual: Value, elapsed_ms: u64) -> Self {
        Self {
            pass: true,
            actual: Some(actual),
            diagnostic: None,
            elapsed_ms,
        }
    }

    /// Failing report
    #[must_use]
    pub fn failed(actual: Option<Value>, diagnostic: impl Into<String>, elapsed_ms: u64) -> Self {
        Self {
            pass: false,
            actual,
            diagnostic: Some(diagnostic.into()),
            elapsed_ms,
        }
    }
}

enum Verdict {
    Pass(Value),
    Mismatch(Value, String),
    Failed(Option<Value>, String),
}

/// Run one check under a time limit
///
/// Never fails: evaluation errors and timeouts are reported through
/// [`CheckReport::diagnostic`]. On timeout `ctx` is cancelled, so give each
/// check its own root context.
pub async fn run_check(
    evaluator: &Evaluator,
    calculate: &Expr,
    expected: &Expr,
    ctx: &Context,
    options: &CheckOptions,
) -> CheckReport {
    let started = Instant::now();
    let limit = Duration::from_millis(options.timeout_ms);
    let work = judge(evaluator, calculate, expected, ctx, &options.actual_variable);
    let verdict = tokio::time::timeout(limit, work).await;
    let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

    match verdict {
        Ok(Verdict::Pass(actual)) => {
            tracing::debug!(elapsed_ms, "check passed");
            CheckReport::passed(actual, elapsed_ms)
        }
        Ok(Verdict::Mismatch(actual, diagnostic)) | Ok(Verdict::Failed(Some(actual), diagnostic)) => {
            tracing::debug!(elapsed_ms, %diagnostic, "check failed");
            CheckReport::failed(Some(actual), diagnostic, elapsed_ms)
        }
        Ok(Verdict::Failed(None, diagnostic)) => {
            tracing::debug!(elapsed_ms, %diagnostic, "check failed");
            CheckReport::failed(None, diagnostic, elapsed_ms)
        }
        Err(_) => {
            ctx.cancel();
            let error = EngineError::Timeout {
                elapsed_ms,
                limit_ms: options.timeout_ms,
            };
            tracing::warn!(elapsed_ms, limit_ms = options.timeout_ms, "check timed out");
            CheckReport::failed(None, error.to_string(), elapsed_ms)
        }
    }
}

async fn judge(
    evaluator: &Evaluator,
    calculate: &Expr,
    expected: &Expr,
    ctx: &Context,
    actual_variable: &str,
) -> Verdict {
    let actual = match compute(evaluator, calculate, ctx).await {
        Ok(actual) => actual,
        Err(error) => return Verdict::Failed(None, format!("calculate failed: {}", error)),
    };

    let expected_ctx = ctx
        .with_data(actual.clone())
        .with_var(actual_variable, actual.clone());
    let want = match compute(evaluator, expected, &expected_ctx).await {
        Ok(want) => want,
        Err(error) => return Verdict::Failed(Some(actual), format!("expected failed: {}", error)),
    };

    // a literal is a value to compare against, never a predicate
    let predicate = !matches!(expected, Expr::Literal(_));
    match want {
        Value::Bool(true) if predicate => Verdict::Pass(actual),
        Value::Bool(false) if predicate => {
            let diagnostic = format!("{} does not hold for {}", expected.describe(), actual);
            Verdict::Mismatch(actual, diagnostic)
        }
        want if values_equal(&actual, &want) => Verdict::Pass(actual),
        want => {
            let diagnostic = format!("expected {} but got {}", want, actual);
            Verdict::Mismatch(actual, diagnostic)
        }
    }
}

/// Evaluate and reduce the outcome to a single value
async fn compute(evaluator: &Evaluator, expr: &Expr, ctx: &Context) -> EngineResult<Value> {
    match evaluator.evaluate(expr, ctx)? {
        Outcome::Stream(stream) => collapse(&stream, ctx).await,
        outcome => Ok(settle(outcome, ctx).await?.unwrap_or(Value::Null)),
    }
}

/// No items is null, one item is itself, more is an array
async fn collapse(stream: &Observable, ctx: &Context) -> EngineResult<Value> {
    let mut items = stream.collect(ctx).await?;
    Ok(match items.len() {
        0 => Value::Null,
        1 => items.remove(0),
        _ => Value::Array(items),
    })
}
