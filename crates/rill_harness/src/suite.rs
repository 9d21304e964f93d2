//! Named checks run as a batch.

use crate::check::{CheckOptions, CheckReport, run_check};
use crate::config::HarnessConfig;
use rill_core::{Context, Value};
use rill_eval::{Evaluator, Expr};
use serde::{Deserialize, Serialize};

/// One named check
///
/// Deserializes from the same documents [`Expr::from_json`] accepts:
///
/// ```json
/// {"name": "greeting", "calculate": "%name%", "expected": "Ada", "data": {"name": "Ada"}}
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct Check {
    /// Name used for filtering and reporting
    pub name: String,
    /// Expression that computes the actual value
    pub calculate: Expr,
    /// Value or predicate the result is judged against
    pub expected: Expr,
    /// Input document
    #[serde(default)]
    pub data: Value,
    /// Overrides the suite time limit
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl Check {
    /// Create a check over null data
    pub fn new(name: impl Into<String>, calculate: Expr, expected: Expr) -> Self {
        Self {
            name: name.into(),
            calculate,
            expected,
            data: Value::Null,
            timeout_ms: None,
        }
    }

    /// Set the input document
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    /// Set a time limit for this check only
    #[must_use]
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }
}

/// Report for one named check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedReport {
    /// Check name
    pub name: String,
    /// Verdict
    pub report: CheckReport,
}

/// Suite results
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SuiteReport {
    /// Checks that passed
    pub passed: u64,
    /// Checks that failed
    pub failed: u64,
    /// Checks excluded by the filter
    pub skipped: u64,
    /// Reports in run order
    pub results: Vec<NamedReport>,
}

impl SuiteReport {
    fn record(&mut self, name: String, report: CheckReport) {
        if report.pass {
            self.passed += 1;
        } else {
            self.failed += 1;
        }
        self.results.push(NamedReport { name, report });
    }

    /// Number of checks that ran
    #[must_use]
    pub fn total(&self) -> u64 {
        self.passed + self.failed
    }

    /// Fraction of run checks that passed; 1.0 when nothing ran
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            1.0
        } else {
            self.passed as f64 / total as f64
        }
    }

    /// Whether every run check passed
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }

    /// Reports of failed checks
    pub fn failures(&self) -> impl Iterator<Item = &NamedReport> {
        self.results.iter().filter(|result| !result.report.pass)
    }

    /// Report for a check by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&CheckReport> {
        self.results
            .iter()
            .find(|result| result.name == name)
            .map(|result| &result.report)
    }
}

/// Ordered collection of checks sharing one evaluator
#[derive(Clone)]
pub struct CheckSuite {
    evaluator: Evaluator,
    config: HarnessConfig,
    checks: Vec<Check>,
}

impl CheckSuite {
    /// Create an empty suite
    #[must_use]
    pub fn new(evaluator: Evaluator, config: HarnessConfig) -> Self {
        Self {
            evaluator,
            config,
            checks: Vec::new(),
        }
    }

    /// Suite over the built-in operators with default settings
    #[must_use]
    pub fn with_builtins() -> Self {
        Self::new(Evaluator::with_builtins(), HarnessConfig::default())
    }

    /// Append a check
    pub fn add(&mut self, check: Check) {
        self.checks.push(check);
    }

    /// Append a check, builder style
    #[must_use]
    pub fn with_check(mut self, check: Check) -> Self {
        self.add(check);
        self
    }

    /// Number of checks
    #[must_use]
    pub fn len(&self) -> usize {
        self.checks.len()
    }

    /// Whether the suite has no checks
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    /// Harness settings
    #[must_use]
    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Run checks in order
    ///
    /// With a filter, only checks whose name contains it run; the rest are
    /// counted as skipped. Each check gets a fresh root context.
    pub async fn run(&self, filter: Option<&str>) -> SuiteReport {
        let mut summary = SuiteReport::default();
        for check in &self.checks {
            if filter.is_some_and(|needle| !check.name.contains(needle)) {
                summary.skipped += 1;
                continue;
            }

            let mut options = CheckOptions::from(&self.config);
            if let Some(timeout_ms) = check.timeout_ms {
                options = options.with_timeout_ms(timeout_ms);
            }
            let ctx = Context::new(check.data.clone()).with_label(check.name.clone());
            let report = run_check(&self.evaluator, &check.calculate, &check.expected, &ctx, &options).await;
            if !report.pass {
                tracing::info!(check = %check.name, diagnostic = ?report.diagnostic, "check failed");
            }
            summary.record(check.name.clone(), report);
        }

        tracing::info!(
            passed = summary.passed,
            failed = summary.failed,
            skipped = summary.skipped,
            "suite finished"
        );
        summary
    }
}

impl std::fmt::Debug for CheckSuite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckSuite")
            .field("config", &self.config)
            .field("checks", &self.checks.len())
            .finish_non_exhaustive()
    }
}
