//! Rill Pipeline Evaluation
//!
//! Expression trees, the placeholder parser, reference resolution, the
//! operator registry and the pipeline evaluator.
//!
//! Evaluation is synchronous until some step produces a future; from then on
//! the remaining steps run inside a single [`Outcome::Pending`] future. A
//! pipeline whose steps are all synchronous therefore yields
//! [`Outcome::Ready`] without touching the async runtime.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod args;
pub mod builtins;
pub mod evaluator;
pub mod expr;
pub mod outcome;
pub mod registry;
pub mod resolver;
pub mod schema;
pub mod template;

// Re-exports
pub use args::{Arg, Args, DynamicArg};
pub use evaluator::{Evaluator, settle};
pub use expr::{Expr, Path, PipelineExpr, Segment, StepExpr, TemplatePart};
pub use outcome::Outcome;
pub use registry::{Handler, Namespace, OperatorEntry, OperatorId, OperatorRegistry};
pub use resolver::{navigate, resolve, resolve_path, resolve_var};
pub use schema::{OperatorSchema, ParamSpec};
