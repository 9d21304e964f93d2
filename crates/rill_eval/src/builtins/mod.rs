//! Built-in operators.
//!
//! - `core`: value pipelines ([`basic`])
//! - `rx`: stream construction and operators ([`stream`])
//! - `queue`: actions on queue resources ([`queue`])

pub mod basic;
pub mod queue;
pub mod stream;

use crate::registry::OperatorRegistry;
use rill_core::EngineResult;

/// Register every built-in namespace
///
/// # Errors
///
/// Fails if any built-in name is already taken
pub fn register_all(registry: &mut OperatorRegistry) -> EngineResult<()> {
    basic::register(registry)?;
    stream::register(registry)?;
    queue::register(registry)?;
    tracing::debug!(operators = registry.len(), "registered built-in operators");
    Ok(())
}
