//! Synchronous stream operators.
//!
//! Each operator runs its function inline as items arrive. A function
//! returning an error terminates the stream with that error and unsubscribes
//! upstream.

use crate::observable::{Observable, Operator, relay, subscribe_upstream};
use rill_core::{Context, EngineResult, Value};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Transform every item
pub fn map<F>(f: F) -> Operator
where
    F: Fn(&Context, Value) -> EngineResult<Value> + Send + Sync + 'static,
{
    let f = Arc::new(f);
    Operator::new("map", move |source| {
        let f = f.clone();
        Observable::new(move |ctx, down| {
            let f = f.clone();
            let item_ctx = ctx.clone();
            let target = down.clone();
            subscribe_upstream(
                &source,
                ctx,
                &down,
                relay(&down, move |value| match f(&item_ctx, value) {
                    Ok(mapped) => target.next(mapped),
                    Err(error) => target.error(error),
                }),
            );
        })
    })
}

/// Transform every item, dropping those mapped to `None`
pub fn filter_map<F>(f: F) -> Operator
where
    F: Fn(&Context, Value) -> EngineResult<Option<Value>> + Send + Sync + 'static,
{
    let f = Arc::new(f);
    Operator::new("filter_map", move |source| {
        let f = f.clone();
        Observable::new(move |ctx, down| {
            let f = f.clone();
            let item_ctx = ctx.clone();
            let target = down.clone();
            subscribe_upstream(
                &source,
                ctx,
                &down,
                relay(&down, move |value| match f(&item_ctx, value) {
                    Ok(Some(mapped)) => target.next(mapped),
                    Ok(None) => {}
                    Err(error) => target.error(error),
                }),
            );
        })
    })
}

/// Keep items the predicate accepts
pub fn filter<F>(predicate: F) -> Operator
where
    F: Fn(&Context, &Value) -> EngineResult<bool> + Send + Sync + 'static,
{
    let predicate = Arc::new(predicate);
    Operator::new("filter", move |source| {
        let predicate = predicate.clone();
        Observable::new(move |ctx, down| {
            let predicate = predicate.clone();
            let item_ctx = ctx.clone();
            let target = down.clone();
            subscribe_upstream(
                &source,
                ctx,
                &down,
                relay(&down, move |value| match predicate(&item_ctx, &value) {
                    Ok(true) => target.next(value),
                    Ok(false) => {}
                    Err(error) => target.error(error),
                }),
            );
        })
    })
}

/// Run a side effect per item and forward it unchanged
pub fn tap<F>(effect: F) -> Operator
where
    F: Fn(&Context, &Value) -> EngineResult<()> + Send + Sync + 'static,
{
    let effect = Arc::new(effect);
    Operator::new("tap", move |source| {
        let effect = effect.clone();
        Observable::new(move |ctx, down| {
            let effect = effect.clone();
            let item_ctx = ctx.clone();
            let target = down.clone();
            subscribe_upstream(
                &source,
                ctx,
                &down,
                relay(&down, move |value| match effect(&item_ctx, &value) {
                    Ok(()) => target.next(value),
                    Err(error) => target.error(error),
                }),
            );
        })
    })
}

/// Forward the first `count` items, then complete and unsubscribe upstream.
///
/// `take(0)` completes on subscribe without touching upstream.
pub fn take(count: usize) -> Operator {
    Operator::new("take", move |source| {
        Observable::new(move |ctx, down| {
            if count == 0 {
                down.complete();
                return;
            }
            let seen = AtomicUsize::new(0);
            let target = down.clone();
            subscribe_upstream(
                &source,
                ctx,
                &down,
                relay(&down, move |value| {
                    let n = seen.fetch_add(1, Ordering::SeqCst) + 1;
                    if n <= count {
                        target.next(value);
                    }
                    if n == count {
                        target.complete();
                    }
                }),
            );
        })
    })
}

/// Drop the first `count` items
pub fn skip(count: usize) -> Operator {
    Operator::new("skip", move |source| {
        Observable::new(move |ctx, down| {
            let seen = AtomicUsize::new(0);
            let target = down.clone();
            subscribe_upstream(
                &source,
                ctx,
                &down,
                relay(&down, move |value| {
                    if seen.fetch_add(1, Ordering::SeqCst) >= count {
                        target.next(value);
                    }
                }),
            );
        })
    })
}
