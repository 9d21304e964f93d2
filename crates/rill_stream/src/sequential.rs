//! Order-preserving asynchronous operators.
//!
//! Items are buffered in arrival order and handed to a single worker task,
//! which awaits each item's work before starting the next. Upstream errors
//! bypass the buffer and terminate the stream at once; upstream completion
//! is queued behind the buffered items.
//!
//! Once the buffer reaches its high-water mark the upstream demand gate is
//! held until the worker catches up, and the worker waits for downstream
//! demand before emitting. Hot sources keep pushing regardless, so the
//! buffer itself stays unbounded.

use crate::demand::Demand;
use crate::observable::{Observable, Operator, subscribe_gated};
use crate::subscriber::observer;
use crate::task::spawn_linked;
use futures::FutureExt;
use futures::future::BoxFuture;
use rill_core::{Context, EngineResult, Value};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

enum Signal {
    Item(Value, Instant),
    Complete,
}

type Handler = dyn Fn(Context, Value, Instant) -> BoxFuture<'static, EngineResult<Option<Value>>> + Send + Sync;

fn handler<H>(h: H) -> Arc<Handler>
where
    H: Fn(Context, Value, Instant) -> BoxFuture<'static, EngineResult<Option<Value>>> + Send + Sync + 'static,
{
    Arc::new(h)
}

/// Items an async transform buffers before pausing upstream
const PROMISE_HIGH_WATER: usize = 1;

/// Items `delay` buffers before pausing upstream
const DELAY_HIGH_WATER: usize = 256;

fn sequential(name: &'static str, high_water: usize, handler: Arc<Handler>) -> Operator {
    Operator::new(name, move |source| {
        let handler = handler.clone();
        Observable::new(move |ctx, down| {
            let (tx, mut rx) = mpsc::unbounded_channel::<Signal>();
            let gate = Arc::new(Demand::new());
            let pending = Arc::new(AtomicUsize::new(0));

            let worker_ctx = ctx.clone();
            let handler = handler.clone();
            let emitter = down.clone();
            let worker_gate = gate.clone();
            let worker_pending = pending.clone();
            spawn_linked(&down, async move {
                while let Some(signal) = rx.recv().await {
                    match signal {
                        Signal::Item(value, arrived) => {
                            match handler(worker_ctx.clone(), value, arrived).await {
                                Ok(Some(out)) => {
                                    emitter.ready().await;
                                    emitter.next(out);
                                }
                                Ok(None) => {}
                                Err(error) => {
                                    emitter.error(error);
                                    return;
                                }
                            }
                            if emitter.is_closed() {
                                return;
                            }
                            if worker_pending.fetch_sub(1, Ordering::SeqCst) == high_water {
                                worker_gate.release();
                            }
                        }
                        Signal::Complete => {
                            emitter.complete();
                            return;
                        }
                    }
                }
            });

            let items = tx.clone();
            let failed = down.clone();
            let upstream_gate = gate.clone();
            subscribe_gated(
                &source,
                ctx,
                &down,
                gate,
                observer(
                    move |value| {
                        if pending.fetch_add(1, Ordering::SeqCst) + 1 == high_water {
                            upstream_gate.hold();
                        }
                        let _ = items.send(Signal::Item(value, Instant::now()));
                    },
                    move |error| failed.error(error),
                    move || {
                        let _ = tx.send(Signal::Complete);
                    },
                ),
            );
        })
    })
}

/// Asynchronous transform that may drop items.
///
/// `Ok(None)` from the future drops the item; an error terminates the
/// stream.
pub fn filter_map_promise<F, Fut>(f: F) -> Operator
where
    F: Fn(Context, Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = EngineResult<Option<Value>>> + Send + 'static,
{
    sequential(
        "filter_map_promise",
        PROMISE_HIGH_WATER,
        handler(move |ctx, value, _| f(ctx, value).boxed()),
    )
}

/// Asynchronous transform, one item at a time, in arrival order
pub fn map_promise<F, Fut>(f: F) -> Operator
where
    F: Fn(Context, Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = EngineResult<Value>> + Send + 'static,
{
    sequential(
        "map_promise",
        PROMISE_HIGH_WATER,
        handler(move |ctx, value, _| {
            let work = f(ctx, value);
            async move { work.await.map(Some) }.boxed()
        }),
    )
}

/// Await a side effect per item, then forward the original item
pub fn do_promise<F, Fut>(f: F) -> Operator
where
    F: Fn(Context, Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = EngineResult<()>> + Send + 'static,
{
    sequential(
        "do_promise",
        PROMISE_HIGH_WATER,
        handler(move |ctx, value, _| {
            let work = f(ctx, value.clone());
            async move { work.await.map(|()| Some(value)) }.boxed()
        }),
    )
}

/// Deliver each item `duration` after it arrived
pub fn delay(duration: Duration) -> Operator {
    sequential(
        "delay",
        DELAY_HIGH_WATER,
        handler(move |_, value, arrived| {
            async move {
                tokio::time::sleep_until(arrived + duration).await;
                Ok(Some(value))
            }
            .boxed()
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operators::{take, tap};
    use crate::source::{from_iter, interval, of};
    use crate::subject::Subject;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use rill_core::EngineError;
    use serde_json::json;

    fn ctx() -> Context {
        Context::new(json!(null))
    }

    #[tokio::test]
    async fn test_map_promise_keeps_order() {
        // earlier items take longer, so unordered processing would reorder
        let source = from_iter(vec![json!(30), json!(20), json!(10), json!(0)]).pipe(&map_promise(
            |_, v: Value| async move {
                let ms = v.as_u64().unwrap_or(0);
                tokio::time::sleep(Duration::from_millis(ms)).await;
                Ok(v)
            },
        ));
        let items = source.collect(&ctx()).await.unwrap();
        assert_eq!(items, vec![json!(30), json!(20), json!(10), json!(0)]);
    }

    #[tokio::test]
    async fn test_map_promise_no_overlap() {
        let active = Arc::new(Mutex::new(0));
        let max_active = Arc::new(Mutex::new(0));
        let a = active.clone();
        let m = max_active.clone();
        let source = from_iter((0..5).map(Value::from)).pipe(&map_promise(move |_, v| {
            let a = a.clone();
            let m = m.clone();
            async move {
                {
                    let mut n = a.lock();
                    *n += 1;
                    let mut max = m.lock();
                    *max = (*max).max(*n);
                }
                tokio::time::sleep(Duration::from_millis(2)).await;
                *a.lock() -= 1;
                Ok(v)
            }
        }));
        let items = source.collect(&ctx()).await.unwrap();
        assert_eq!(items.len(), 5);
        assert_eq!(*max_active.lock(), 1);
    }

    #[tokio::test]
    async fn test_map_promise_rejection_errors() {
        let source = from_iter(vec![json!(1), json!(2), json!(3)]).pipe(&map_promise(|_, v| async move {
            if v == json!(2) {
                Err(EngineError::raised("rejected"))
            } else {
                Ok(v)
            }
        }));
        let err = source.collect(&ctx()).await.unwrap_err();
        assert_eq!(err, EngineError::raised("rejected"));
    }

    #[tokio::test]
    async fn test_do_promise_forwards_original() {
        let effects = Arc::new(Mutex::new(Vec::new()));
        let e = effects.clone();
        let source = of(json!(1))
            .pipe(&do_promise(move |_, v| {
                let e = e.clone();
                async move {
                    tokio::time::sleep(Duration::from_millis(1)).await;
                    e.lock().push(json!(format!("-{}-", v)));
                    Ok(())
                }
            }))
            .pipe(&map_promise(|_, v| async move {
                tokio::time::sleep(Duration::from_millis(1)).await;
                Ok(json!(format!("-{}-", v)))
            }));
        let items = source.collect(&ctx()).await.unwrap();
        assert_eq!(items, vec![json!("-1-")]);
        assert_eq!(*effects.lock(), vec![json!("-1-")]);
    }

    #[tokio::test]
    async fn test_filter_map_promise_drops() {
        let source = from_iter((1..=4).map(Value::from)).pipe(&filter_map_promise(|_, v| async move {
            Ok(if v.as_i64().unwrap_or(0) % 2 == 0 { Some(v) } else { None })
        }));
        let items = source.collect(&ctx()).await.unwrap();
        assert_eq!(items, vec![json!(2), json!(4)]);
    }

    #[tokio::test]
    async fn test_delay_holds_items() {
        let started = Instant::now();
        let items = from_iter(vec![json!("a"), json!("b")])
            .pipe(&delay(Duration::from_millis(30)))
            .collect(&ctx())
            .await
            .unwrap();
        assert_eq!(items, vec![json!("a"), json!("b")]);
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[tokio::test]
    async fn test_delay_forwards_errors_immediately() {
        let subject = Subject::new();
        let errors = Arc::new(Mutex::new(Vec::new()));
        let items = Arc::new(Mutex::new(Vec::new()));
        let e = errors.clone();
        let i = items.clone();
        subject
            .as_observable()
            .pipe(&delay(Duration::from_millis(50)))
            .subscribe_fns(&ctx(), move |v| i.lock().push(v), move |err| e.lock().push(err), || {});

        subject.next(json!(1));
        subject.error(EngineError::stream("upstream failed"));
        assert_eq!(errors.lock().len(), 1);

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(items.lock().is_empty());
    }

    #[tokio::test]
    async fn test_source_waits_for_async_work() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let emitted = log.clone();
        let handled = log.clone();
        let source = from_iter((0..5).map(Value::from))
            .pipe(&tap(move |_, v| {
                emitted.lock().push(format!("emit {}", v));
                Ok(())
            }))
            .pipe(&map_promise(move |_, v| {
                let handled = handled.clone();
                async move {
                    tokio::time::sleep(Duration::from_millis(1)).await;
                    handled.lock().push(format!("done {}", v));
                    Ok(v)
                }
            }));

        let items = source.collect(&ctx()).await.unwrap();
        assert_eq!(items.len(), 5);
        let expected: Vec<String> = (0..5)
            .flat_map(|i| [format!("emit {}", i), format!("done {}", i)])
            .collect();
        assert_eq!(*log.lock(), expected);
    }

    #[tokio::test]
    async fn test_interval_paced_by_slow_consumer() {
        let emitted = Arc::new(AtomicUsize::new(0));
        let counter = emitted.clone();
        let source = interval(Duration::from_millis(1))
            .pipe(&tap(move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }))
            .pipe(&map_promise(|_, v| async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok(v)
            }))
            .pipe(&take(3));

        let items = source.collect(&ctx()).await.unwrap();
        assert_eq!(items, vec![json!(0), json!(1), json!(2)]);
        assert!(emitted.load(Ordering::SeqCst) <= 4, "{:?}", emitted);
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_delay() {
        let items = Arc::new(Mutex::new(Vec::new()));
        let i = items.clone();
        let sub = of(json!(1))
            .pipe(&delay(Duration::from_millis(20)))
            .subscribe_fns(&ctx(), move |v| i.lock().push(v), |_| {}, || {});
        sub.unsubscribe();
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(items.lock().is_empty());
    }
}
