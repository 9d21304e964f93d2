//! Rill Core Types
//!
//! Pure data types shared by every layer of the engine: the value model,
//! the error taxonomy, identifiers, the scope arena and evaluation contexts.
//! Nothing in this crate performs I/O or schedules work.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod context;
pub mod error;
pub mod id;
pub mod resource;
pub mod scope;
pub mod value;

// Re-exports
pub use config::EvalConfig;
pub use context::Context;
pub use error::{EngineError, EngineResult};
pub use id::{EvalId, ExprId, SubscriptionId};
pub use resource::{Resource, ResourceRef, downcast_resource};
pub use scope::{ScopeArena, ScopeId};
pub use value::{Binding, Value, is_truthy, to_text, values_equal};
