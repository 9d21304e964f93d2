//! Stream sources.

use crate::observable::Observable;
use crate::subscriber::Subscriber;
use crate::task::spawn_linked;
use rill_core::{EngineError, EngineResult, Value};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior, interval_at};

/// Emit `items` synchronously, then complete.
///
/// Stops as soon as the subscriber is closed, so a downstream `take`
/// prevents further emissions. While the consumer is paused the rest of
/// the items wait and are emitted from whichever thread resumes it.
pub fn from_iter(items: impl IntoIterator<Item = Value>) -> Observable {
    let items: Arc<[Value]> = items.into_iter().collect();
    Observable::new(move |_, sub| emit_from(items.clone(), 0, &sub))
}

fn emit_from(items: Arc<[Value]>, mut index: usize, sub: &Subscriber) {
    while index < items.len() {
        if sub.is_closed() {
            return;
        }
        if sub.is_paused() {
            let weak = sub.downgrade();
            sub.when_ready(move || {
                if let Some(sub) = weak.upgrade() {
                    emit_from(items, index, &sub);
                }
            });
            return;
        }
        sub.next(items[index].clone());
        index += 1;
    }
    sub.complete();
}

/// Emit one value, then complete
pub fn of(value: Value) -> Observable {
    from_iter([value])
}

/// Complete immediately
pub fn empty() -> Observable {
    Observable::new(|_, sub| sub.complete())
}

/// Error immediately
pub fn throw_error(error: EngineError) -> Observable {
    Observable::new(move |_, sub| sub.error(error.clone()))
}

/// Emit `0, 1, 2, ...` every `period`, starting one period after subscribe.
///
/// Nothing is emitted while the consumer is paused; the count resumes
/// where it stopped.
pub fn interval(period: Duration) -> Observable {
    Observable::new(move |_, sub| {
        if period.is_zero() {
            sub.error(EngineError::stream("interval period must be positive"));
            return;
        }
        let emitter = sub.clone();
        spawn_linked(&sub, async move {
            let mut ticks = interval_at(Instant::now() + period, period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut count: u64 = 0;
            loop {
                emitter.ready().await;
                ticks.tick().await;
                if emitter.is_closed() {
                    break;
                }
                emitter.next(Value::from(count));
                count += 1;
            }
        });
    })
}

/// Run a fresh future per subscription and emit its value
pub fn from_future<F, Fut>(factory: F) -> Observable
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = EngineResult<Value>> + Send + 'static,
{
    let factory = Arc::new(factory);
    Observable::new(move |_, sub| {
        let work = factory();
        let emitter = sub.clone();
        spawn_linked(&sub, async move {
            match work.await {
                Ok(value) => {
                    emitter.next(value);
                    emitter.complete();
                }
                Err(error) => emitter.error(error),
            }
        });
    })
}
