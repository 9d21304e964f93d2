//! Evaluation results.

use futures::FutureExt;
use futures::future::BoxFuture;
use rill_core::{EngineResult, ResourceRef, Value};
use rill_stream::{Observable, PipeElement};
use std::future::Future;

/// Result of evaluating an expression or invoking an operator.
///
/// Synchronous results are [`Outcome::Ready`]; anything that has to wait is
/// a single [`Outcome::Pending`] future. A pending future resolving to
/// `None` produced no value.
pub enum Outcome {
    /// Immediate value
    Ready(Value),
    /// Value that is still being computed
    Pending(BoxFuture<'static, EngineResult<Option<Value>>>),
    /// Stream of values
    Stream(Observable),
    /// Stream operator or resource element for `rx.pipe`
    Element(PipeElement),
    /// Subscription-scoped resource
    Resource(ResourceRef),
    /// No value; the rest of the pipeline is skipped
    Dropped,
}

impl Outcome {
    /// Immediate value
    pub fn ready(value: impl Into<Value>) -> Self {
        Self::Ready(value.into())
    }

    /// Future producing a value
    pub fn pending<F>(future: F) -> Self
    where
        F: Future<Output = EngineResult<Value>> + Send + 'static,
    {
        Self::Pending(future.map(|result| result.map(Some)).boxed())
    }

    /// Future that may produce no value
    pub fn pending_opt<F>(future: F) -> Self
    where
        F: Future<Output = EngineResult<Option<Value>>> + Send + 'static,
    {
        Self::Pending(future.boxed())
    }

    /// `Ready` for `Some`, `Dropped` for `None`
    #[must_use]
    pub fn from_option(value: Option<Value>) -> Self {
        match value {
            Some(value) => Self::Ready(value),
            None => Self::Dropped,
        }
    }

    /// Variant name for diagnostics
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Ready(_) => "value",
            Self::Pending(_) => "pending value",
            Self::Stream(_) => "stream",
            Self::Element(_) => "pipe element",
            Self::Resource(_) => "resource",
            Self::Dropped => "nothing",
        }
    }

    /// Whether this is an immediate value
    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }
}

impl std::fmt::Debug for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ready(value) => f.debug_tuple("Ready").field(value).finish(),
            Self::Element(element) => f.debug_tuple("Element").field(element).finish(),
            Self::Resource(resource) => f.debug_tuple("Resource").field(&resource.kind()).finish(),
            other => f.write_str(match other {
                Self::Pending(_) => "Pending",
                Self::Stream(_) => "Stream",
                _ => "Dropped",
            }),
        }
    }
}

impl From<Value> for Outcome {
    fn from(value: Value) -> Self {
        Self::Ready(value)
    }
}

impl From<Observable> for Outcome {
    fn from(stream: Observable) -> Self {
        Self::Stream(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_option() {
        assert!(matches!(Outcome::from_option(Some(json!(1))), Outcome::Ready(_)));
        assert!(matches!(Outcome::from_option(None), Outcome::Dropped));
    }

    #[test]
    fn test_kind_and_debug() {
        assert_eq!(Outcome::ready(1).kind(), "value");
        assert_eq!(format!("{:?}", Outcome::ready("a")), "Ready(String(\"a\"))");
        assert_eq!(format!("{:?}", Outcome::Dropped), "Dropped");
        assert_eq!(format!("{:?}", Outcome::pending(async { Ok(json!(1)) })), "Pending");
    }

    #[tokio::test]
    async fn test_pending_wraps_some() {
        let Outcome::Pending(future) = Outcome::pending(async { Ok(json!(2)) }) else {
            panic!("expected pending");
        };
        assert_eq!(future.await.unwrap(), Some(json!(2)));
    }
}
