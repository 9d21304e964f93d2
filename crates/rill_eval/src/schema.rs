//! Operator schemas.

use rill_core::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};

/// Declared operator parameter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamSpec {
    /// Parameter name
    pub name: String,
    /// Passed unevaluated as a [`DynamicArg`](crate::args::DynamicArg)
    pub dynamic: bool,
    /// May be omitted
    pub optional: bool,
}

impl ParamSpec {
    /// Required, eagerly evaluated parameter
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dynamic: false,
            optional: false,
        }
    }

    /// Mark the parameter dynamic
    #[must_use]
    pub fn dynamic(mut self) -> Self {
        self.dynamic = true;
        self
    }

    /// Mark the parameter optional
    #[must_use]
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }
}

/// Schema for an operator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct OperatorSchema {
    /// Human readable description
    pub description: String,
    /// Positional parameters
    pub params: Vec<ParamSpec>,
    /// Repeating trailing parameter, if the operator is variadic
    pub variadic: Option<ParamSpec>,
}

impl OperatorSchema {
    /// Create a schema with no parameters
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            params: Vec::new(),
            variadic: None,
        }
    }

    /// Add a positional parameter
    #[must_use]
    pub fn with_param(mut self, param: ParamSpec) -> Self {
        self.params.push(param);
        self
    }

    /// Accept any number of trailing arguments shaped like `param`
    #[must_use]
    pub fn with_variadic(mut self, param: ParamSpec) -> Self {
        self.variadic = Some(param);
        self
    }

    /// Fewest arguments accepted
    #[must_use]
    pub fn min_args(&self) -> usize {
        self.params.iter().filter(|p| !p.optional).count()
    }

    /// Most arguments accepted; `None` when variadic
    #[must_use]
    pub fn max_args(&self) -> Option<usize> {
        match self.variadic {
            Some(_) => None,
            None => Some(self.params.len()),
        }
    }

    /// Whether the argument at `index` is passed unevaluated
    #[must_use]
    pub fn is_dynamic(&self, index: usize) -> bool {
        match self.params.get(index) {
            Some(param) => param.dynamic,
            None => self.variadic.as_ref().is_some_and(|v| v.dynamic),
        }
    }

    /// Check an argument count against the arity bounds
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidArgument`] naming `operator`
    pub fn check_arity(&self, operator: &str, count: usize) -> EngineResult<()> {
        let min = self.min_args();
        if count < min {
            return Err(EngineError::invalid_argument(
                operator,
                format!("expected at least {} arguments, got {}", min, count),
            ));
        }
        if let Some(max) = self.max_args() {
            if count > max {
                return Err(EngineError::invalid_argument(
                    operator,
                    format!("expected at most {} arguments, got {}", max, count),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn join() -> OperatorSchema {
        OperatorSchema::new("Join items").with_param(ParamSpec::new("separator").optional())
    }

    #[test]
    fn test_arity_bounds() {
        let schema = join();
        assert_eq!(schema.min_args(), 0);
        assert_eq!(schema.max_args(), Some(1));
        assert!(schema.check_arity("core.join", 0).is_ok());
        assert!(schema.check_arity("core.join", 1).is_ok());

        let err = schema.check_arity("core.join", 2).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid argument for core.join: expected at most 1 arguments, got 2"
        );
    }

    #[test]
    fn test_variadic_dynamic() {
        let schema = OperatorSchema::new("Pipe")
            .with_param(ParamSpec::new("source"))
            .with_variadic(ParamSpec::new("element").dynamic());
        assert_eq!(schema.max_args(), None);
        assert!(!schema.is_dynamic(0));
        assert!(schema.is_dynamic(5));
        assert!(schema.check_arity("rx.pipe", 0).is_err());
        assert!(schema.check_arity("rx.pipe", 12).is_ok());
    }

    #[test]
    fn test_schema_serde() {
        let schema = join();
        let json = serde_json::to_string(&schema).unwrap();
        let back: OperatorSchema = serde_json::from_str(&json).unwrap();
        assert_eq!(schema, back);
    }
}
