//! Error taxonomy shared by the resolver, evaluator, stream core and harness.

/// Engine result type
pub type EngineResult<T> = Result<T, EngineError>;

/// Engine error type
///
/// Every failure surfaces as one of these variants. Only the evaluation
/// harness turns them into non-throwing reports.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    /// A mandatory path segment or variable could not be resolved
    #[error("Reference error at '{path}': {reason}")]
    Reference {
        /// Path or variable that failed
        path: String,
        /// What was missing
        reason: String,
    },

    /// An expression names an operator nobody registered
    #[error("Operator not found: {name}")]
    OperatorNotFound {
        /// Requested operator name
        name: String,
    },

    /// An operator failed or its future rejected
    #[error("Operator {operator} failed: {cause}")]
    Evaluation {
        /// Operator that failed
        operator: String,
        /// Original cause
        #[source]
        cause: Box<EngineError>,
    },

    /// The harness gave up waiting
    #[error("Timed out after {elapsed_ms}ms (limit {limit_ms}ms)")]
    Timeout {
        /// Time spent before giving up
        elapsed_ms: u64,
        /// Configured limit
        limit_ms: u64,
    },

    /// Terminal error delivered to a subscription
    #[error("Stream error: {message}")]
    Stream {
        /// Error message
        message: String,
    },

    /// An operator received arguments it cannot use
    #[error("Invalid argument for {operator}: {reason}")]
    InvalidArgument {
        /// Operator name
        operator: String,
        /// What was wrong
        reason: String,
    },

    /// Operator registration failed
    #[error("Registry error: {reason}")]
    Registry {
        /// What was wrong
        reason: String,
    },

    /// A placeholder string could not be parsed
    #[error("Parse error in '{input}': {reason}")]
    Parse {
        /// Offending input
        input: String,
        /// What was wrong
        reason: String,
    },

    /// Scope lookup walked more frames than allowed
    #[error("Scope chain exceeds {limit} frames")]
    ScopeOverflow {
        /// Configured cap
        limit: usize,
    },

    /// Nested evaluation went deeper than allowed
    #[error("Evaluation depth exceeds {limit}")]
    DepthExceeded {
        /// Configured cap
        limit: usize,
    },

    /// The evaluation was abandoned
    #[error("Evaluation cancelled")]
    Cancelled,

    /// Raised explicitly by an operator
    #[error("{message}")]
    Raised {
        /// Error message
        message: String,
    },
}

impl EngineError {
    /// Create a reference error
    #[must_use]
    pub fn reference(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Reference {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a stream error
    #[must_use]
    pub fn stream(message: impl Into<String>) -> Self {
        Self::Stream {
            message: message.into(),
        }
    }

    /// Create an invalid argument error
    #[must_use]
    pub fn invalid_argument(operator: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            operator: operator.into(),
            reason: reason.into(),
        }
    }

    /// Create a raised error
    #[must_use]
    pub fn raised(message: impl Into<String>) -> Self {
        Self::Raised {
            message: message.into(),
        }
    }

    /// Attribute a failure to an operator.
    ///
    /// Errors that already identify their origin (references, unknown
    /// operators, nested evaluation failures, cancellation and limits) pass
    /// through unchanged so the diagnostic names the innermost culprit.
    #[must_use]
    pub fn evaluation(operator: impl Into<String>, cause: EngineError) -> Self {
        if cause.is_attributed() {
            return cause;
        }
        Self::Evaluation {
            operator: operator.into(),
            cause: Box::new(cause),
        }
    }

    /// Whether this error already carries its origin
    #[must_use]
    pub fn is_attributed(&self) -> bool {
        matches!(
            self,
            Self::Reference { .. }
                | Self::OperatorNotFound { .. }
                | Self::Evaluation { .. }
                | Self::Timeout { .. }
                | Self::ScopeOverflow { .. }
                | Self::DepthExceeded { .. }
                | Self::Cancelled
        )
    }

    /// Innermost error in an evaluation chain
    #[must_use]
    pub fn root_cause(&self) -> &EngineError {
        match self {
            Self::Evaluation { cause, .. } => cause.root_cause(),
            other => other,
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse {
            input: "<json>".to_string(),
            reason: err.to_string(),
        }
    }
}
