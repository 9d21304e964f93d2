//! Tasks tied to a subscription.

use crate::subscriber::Subscriber;
use rill_core::EngineError;
use std::future::Future;
use tokio::runtime::Handle;

/// Spawn `work` onto the current runtime and abort it when `subscriber`
/// ends.
///
/// Without a runtime the subscriber is errored instead.
pub fn spawn_linked<F>(subscriber: &Subscriber, work: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    match Handle::try_current() {
        Ok(handle) => {
            let task = handle.spawn(work);
            let abort = task.abort_handle();
            subscriber.add(move || abort.abort());
        }
        Err(_) => {
            subscriber.error(EngineError::stream("no async runtime available"));
        }
    }
}
