//! Rill Evaluation Harness
//!
//! Runs a `calculate` expression under a time limit and judges its result
//! against an `expected` expression. Failures of any kind, timeouts
//! included, become a failed [`CheckReport`] rather than an error.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod check;
pub mod config;
pub mod suite;

// Re-exports
pub use check::{CheckOptions, CheckReport, run_check};
pub use config::HarnessConfig;
pub use suite::{Check, CheckSuite, NamedReport, SuiteReport};
