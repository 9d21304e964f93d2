//! Harness configuration.

use serde::{Deserialize, Serialize};

/// Harness configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Time limit for checks that do not set their own
    pub default_timeout_ms: u64,
    /// Variable bound to the computed value while `expected` runs
    pub actual_variable: String,
}

impl HarnessConfig {
    /// Create a config with a 5 second limit
    #[must_use]
    pub fn new() -> Self {
        Self {
            default_timeout_ms: 5000,
            actual_variable: "actual".to_string(),
        }
    }

    /// Set the default time limit
    #[must_use]
    pub fn with_default_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.default_timeout_ms = timeout_ms;
        self
    }

    /// Set the name the computed value is bound under
    #[must_use]
    pub fn with_actual_variable(mut self, name: impl Into<String>) -> Self {
        self.actual_variable = name.into();
        self
    }
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self::new()
    }
}
