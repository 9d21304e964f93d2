//! Awaiting a stream to completion.

use crate::observable::Observable;
use crate::subscriber::{Subscription, observer};
use parking_lot::Mutex;
use rill_core::{Context, EngineError, EngineResult, Value};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll};
use tokio::sync::oneshot;

type Reply = Arc<Mutex<Option<oneshot::Sender<EngineResult<Vec<Value>>>>>>;

/// Future returned by [`Observable::collect`]
#[must_use = "streams are collected only when awaited"]
pub struct Collect {
    receiver: oneshot::Receiver<EngineResult<Vec<Value>>>,
    subscription: Subscription,
}

impl Collect {
    pub(crate) fn new(source: &Observable, ctx: &Context) -> Self {
        let (tx, receiver) = oneshot::channel();
        let reply: Reply = Arc::new(Mutex::new(Some(tx)));
        let items = Arc::new(Mutex::new(Vec::new()));

        let on_next = items.clone();
        let on_error = reply.clone();
        let on_complete = reply;
        let subscription = source.subscribe_fns(
            ctx,
            move |value| on_next.lock().push(value),
            move |error| {
                if let Some(tx) = on_error.lock().take() {
                    let _ = tx.send(Err(error));
                }
            },
            move || {
                if let Some(tx) = on_complete.lock().take() {
                    let _ = tx.send(Ok(std::mem::take(&mut *items.lock())));
                }
            },
        );

        Self {
            receiver,
            subscription,
        }
    }

    /// Subscription feeding this future
    #[must_use]
    pub fn subscription(&self) -> &Subscription {
        &self.subscription
    }
}

impl Future for Collect {
    type Output = EngineResult<Vec<Value>>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.receiver).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(EngineError::stream(
                "stream was cancelled before it terminated",
            ))),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for Collect {
    fn drop(&mut self) {
        self.subscription.unsubscribe();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{from_iter, interval, throw_error};
    use serde_json::json;
    use std::time::Duration;

    #[tokio::test]
    async fn test_collect_items() {
        let ctx = Context::new(json!(null));
        let items = from_iter(vec![json!(1), json!(2), json!(3)])
            .collect(&ctx)
            .await
            .unwrap();
        assert_eq!(items, vec![json!(1), json!(2), json!(3)]);
    }

    #[tokio::test]
    async fn test_collect_error() {
        let ctx = Context::new(json!(null));
        let err = throw_error(EngineError::stream("bad"))
            .collect(&ctx)
            .await
            .unwrap_err();
        assert_eq!(err, EngineError::stream("bad"));
    }

    #[tokio::test]
    async fn test_drop_unsubscribes() {
        let ctx = Context::new(json!(null));
        let collect = interval(Duration::from_millis(5)).collect(&ctx);
        let subscription = collect.subscription().clone();
        let _ = tokio::time::timeout(Duration::from_millis(20), collect).await;
        assert!(subscription.is_closed());
    }

    #[tokio::test]
    async fn test_external_unsubscribe_resolves() {
        let ctx = Context::new(json!(null));
        let collect = interval(Duration::from_millis(5)).collect(&ctx);
        collect.subscription().unsubscribe();
        assert!(collect.await.is_err());
    }
}
