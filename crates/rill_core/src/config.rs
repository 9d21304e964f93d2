//! Evaluation limits.

use serde::{Deserialize, Serialize};

/// Evaluation configuration
///
/// Shared by every context derived from one top-level evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvalConfig {
    /// Maximum number of frames a variable lookup may walk
    pub max_scope_depth: usize,
    /// Maximum nesting of derived contexts
    pub max_eval_depth: usize,
}

impl EvalConfig {
    /// Create a config with default limits
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_scope_depth: 1024,
            max_eval_depth: 256,
        }
    }

    /// Set the scope walk cap
    #[must_use]
    pub fn with_max_scope_depth(mut self, depth: usize) -> Self {
        self.max_scope_depth = depth;
        self
    }

    /// Set the evaluation nesting cap
    #[must_use]
    pub fn with_max_eval_depth(mut self, depth: usize) -> Self {
        self.max_eval_depth = depth;
        self
    }
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self::new()
    }
}
