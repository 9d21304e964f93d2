//! Operator arguments.

use crate::evaluator::{Evaluator, settle};
use crate::expr::Expr;
use crate::outcome::Outcome;
use indexmap::IndexMap;
use rill_core::{Binding, Context, EngineError, EngineResult, ResourceRef, Value};
use rill_stream::{Observable, PipeElement};

/// Unevaluated argument handed to operators whose schema marks the
/// parameter dynamic.
///
/// The operator decides when, how often and against which data the
/// expression is evaluated.
#[derive(Clone)]
pub struct DynamicArg {
    expr: Expr,
    ctx: Context,
    evaluator: Evaluator,
}

impl DynamicArg {
    pub(crate) fn new(expr: Expr, ctx: Context, evaluator: Evaluator) -> Self {
        Self {
            expr,
            ctx,
            evaluator,
        }
    }

    /// The captured expression
    #[must_use]
    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    /// Context captured at the call site
    #[must_use]
    pub fn context(&self) -> &Context {
        &self.ctx
    }

    /// Evaluator used for lazy evaluation
    #[must_use]
    pub fn evaluator(&self) -> &Evaluator {
        &self.evaluator
    }

    /// Evaluate against the captured context
    ///
    /// # Errors
    ///
    /// Propagates evaluation errors
    pub fn evaluate(&self) -> EngineResult<Outcome> {
        self.evaluator.evaluate(&self.expr, &self.ctx)
    }

    /// Evaluate with `data` as the current value
    ///
    /// # Errors
    ///
    /// Propagates evaluation errors
    pub fn evaluate_with_data(&self, data: Value) -> EngineResult<Outcome> {
        self.evaluator.evaluate(&self.expr, &self.ctx.with_data(data))
    }

    /// Evaluate in a different context, e.g. the one a stream subscribed in
    ///
    /// # Errors
    ///
    /// Propagates evaluation errors
    pub fn evaluate_in(&self, ctx: &Context) -> EngineResult<Outcome> {
        self.evaluator.evaluate(&self.expr, ctx)
    }

    /// Evaluate with optional data and extra variables layered over the
    /// captured context
    ///
    /// # Errors
    ///
    /// Propagates evaluation errors
    pub fn eval_with(
        &self,
        data: Option<Value>,
        vars: IndexMap<String, Binding>,
    ) -> EngineResult<Outcome> {
        let mut ctx = match data {
            Some(data) => self.ctx.with_data(data),
            None => self.ctx.clone(),
        };
        if !vars.is_empty() {
            ctx = ctx.with_vars(vars);
        }
        self.evaluator.evaluate(&self.expr, &ctx)
    }

    /// Evaluate against `data` in `ctx` and wait for a plain value
    ///
    /// # Errors
    ///
    /// Propagates evaluation errors, stream errors and rejected futures
    pub async fn value_in(&self, ctx: &Context, data: Value) -> EngineResult<Option<Value>> {
        let ctx = ctx.with_data(data);
        let outcome = self.evaluate_in(&ctx)?;
        settle(outcome, &ctx).await
    }
}

impl std::fmt::Debug for DynamicArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamicArg")
            .field("expr", &self.expr.describe())
            .finish()
    }
}

/// One evaluated (or deferred) argument
#[derive(Clone)]
pub enum Arg {
    /// Plain value
    Value(Value),
    /// Optional reference or step that produced nothing
    Absent,
    /// Stream argument
    Stream(Observable),
    /// Pipe element argument
    Element(PipeElement),
    /// Resource argument
    Resource(ResourceRef),
    /// Unevaluated argument
    Dynamic(DynamicArg),
}

impl Arg {
    fn kind(&self) -> &'static str {
        match self {
            Self::Value(_) => "value",
            Self::Absent => "nothing",
            Self::Stream(_) => "stream",
            Self::Element(_) => "pipe element",
            Self::Resource(_) => "resource",
            Self::Dynamic(_) => "expression",
        }
    }
}

impl std::fmt::Debug for Arg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Self::Dynamic(arg) => arg.fmt(f),
            other => f.write_str(other.kind()),
        }
    }
}

/// Arguments passed to an operator handler
#[derive(Debug, Clone)]
pub struct Args {
    operator: String,
    items: Vec<Arg>,
}

impl Args {
    /// Bundle arguments for `operator`
    pub fn new(operator: impl Into<String>, items: Vec<Arg>) -> Self {
        Self {
            operator: operator.into(),
            items,
        }
    }

    /// Operator the arguments belong to
    #[must_use]
    pub fn operator(&self) -> &str {
        &self.operator
    }

    /// Number of arguments
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether there are no arguments
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Argument at `index`
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Arg> {
        self.items.get(index)
    }

    /// All arguments in order
    pub fn iter(&self) -> impl Iterator<Item = &Arg> {
        self.items.iter()
    }

    /// Consume into the argument list
    #[must_use]
    pub fn into_items(self) -> Vec<Arg> {
        self.items
    }

    /// Error attributed to this operator
    #[must_use]
    pub fn invalid(&self, reason: impl Into<String>) -> EngineError {
        EngineError::invalid_argument(self.operator.clone(), reason)
    }

    fn mismatch(&self, index: usize, expected: &str) -> EngineError {
        let found = self.items.get(index).map_or("nothing", Arg::kind);
        self.invalid(format!("argument {} must be {}, got {}", index, expected, found))
    }

    /// Plain value at `index`
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidArgument`] when missing or not a value
    pub fn value(&self, index: usize) -> EngineResult<&Value> {
        match self.items.get(index) {
            Some(Arg::Value(value)) => Ok(value),
            _ => Err(self.mismatch(index, "a value")),
        }
    }

    /// Plain value at `index`, `None` when omitted or absent
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidArgument`] when present but not a value
    pub fn opt_value(&self, index: usize) -> EngineResult<Option<&Value>> {
        match self.items.get(index) {
            None | Some(Arg::Absent) => Ok(None),
            Some(Arg::Value(value)) => Ok(Some(value)),
            Some(_) => Err(self.mismatch(index, "a value")),
        }
    }

    /// Plain value at `index`, `null` when omitted or absent
    #[must_use]
    pub fn value_or_null(&self, index: usize) -> Value {
        match self.items.get(index) {
            Some(Arg::Value(value)) => value.clone(),
            _ => Value::Null,
        }
    }

    /// String at `index`
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidArgument`] when missing or not a string
    pub fn str(&self, index: usize) -> EngineResult<&str> {
        match self.items.get(index) {
            Some(Arg::Value(Value::String(s))) => Ok(s),
            _ => Err(self.mismatch(index, "a string")),
        }
    }

    /// Non-negative integer at `index`
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidArgument`] when missing or not a
    /// non-negative integer
    pub fn u64(&self, index: usize) -> EngineResult<u64> {
        match self.items.get(index) {
            Some(Arg::Value(value)) => value
                .as_u64()
                .ok_or_else(|| self.mismatch(index, "a non-negative integer")),
            _ => Err(self.mismatch(index, "a non-negative integer")),
        }
    }

    /// Unevaluated argument at `index`
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidArgument`] when the parameter is not
    /// dynamic or missing
    pub fn dynamic(&self, index: usize) -> EngineResult<&DynamicArg> {
        match self.items.get(index) {
            Some(Arg::Dynamic(arg)) => Ok(arg),
            _ => Err(self.mismatch(index, "an expression")),
        }
    }

    /// Resource at `index`
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidArgument`] when missing or not a
    /// resource
    pub fn resource(&self, index: usize) -> EngineResult<&ResourceRef> {
        match self.items.get(index) {
            Some(Arg::Resource(resource)) => Ok(resource),
            _ => Err(self.mismatch(index, "a resource")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args() -> Args {
        Args::new(
            "core.test",
            vec![Arg::Value(json!("sep")), Arg::Value(json!(3)), Arg::Absent],
        )
    }

    #[test]
    fn test_accessors() {
        let args = args();
        assert_eq!(args.len(), 3);
        assert_eq!(args.str(0).unwrap(), "sep");
        assert_eq!(args.u64(1).unwrap(), 3);
        assert_eq!(args.opt_value(2).unwrap(), None);
        assert_eq!(args.opt_value(7).unwrap(), None);
        assert_eq!(args.value_or_null(2), Value::Null);
    }

    #[test]
    fn test_mismatch_names_operator() {
        let args = args();
        let err = args.u64(0).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid argument for core.test: argument 0 must be a non-negative integer, got value"
        );
        let err = args.dynamic(2).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid argument for core.test: argument 2 must be an expression, got nothing"
        );
    }

    #[test]
    fn test_dynamic_eval_with() {
        let evaluator = Evaluator::with_builtins();
        let ctx = Context::new(json!({"a": 1}));
        let arg = DynamicArg::new(Expr::parse("%a%-%$x%").unwrap(), ctx, evaluator);

        let mut vars = IndexMap::new();
        vars.insert("x".to_string(), Binding::Value(json!("y")));
        let Outcome::Ready(value) = arg.eval_with(Some(json!({"a": 2})), vars).unwrap() else {
            panic!("expected a ready value");
        };
        assert_eq!(value, json!("2-y"));
        assert!(arg.evaluate().is_err());
    }
}
