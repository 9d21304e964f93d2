//! Subscription-scoped resources.

use crate::value::Value;
use std::any::Any;
use std::sync::Arc;

/// Mutable state whose lifetime is one stream subscription.
///
/// The subscription that creates a resource owns it and calls [`release`]
/// exactly once when it ends. Other operators reach it only by name through
/// the context scope.
///
/// [`release`]: Resource::release
pub trait Resource: Send + Sync {
    /// Short kind name used in diagnostics (e.g. "queue")
    fn kind(&self) -> &str;

    /// Current contents as data
    fn snapshot(&self) -> Value;

    /// Free the resource
    fn release(&self);

    /// Whether [`release`](Resource::release) already ran
    fn is_released(&self) -> bool;

    /// Upcast for typed access
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

/// Shared handle to a resource
pub type ResourceRef = Arc<dyn Resource>;

/// Recover the concrete resource type behind a handle
#[must_use]
pub fn downcast_resource<T: Resource + 'static>(resource: ResourceRef) -> Option<Arc<T>> {
    resource.into_any().downcast::<T>().ok()
}
