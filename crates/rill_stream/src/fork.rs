//! Fan-out of one stream into side branches.

use crate::observable::{Observable, Operator, subscribe_upstream};
use crate::subject::Subject;
use crate::subscriber::{Subscriber, observer};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Feed every item to each branch, then pass it downstream unchanged.
///
/// Branches see items in declaration order and their outputs are
/// discarded. A branch error fails the whole fork; a branch completing
/// early only ends that branch. Downstream completes once upstream has
/// completed and every branch has terminated. Ending the fork's
/// subscription unsubscribes every branch and upstream synchronously.
pub fn fork(branches: Vec<Operator>) -> Operator {
    let branches = Arc::new(branches);
    Operator::new("fork", move |source| {
        let branches = branches.clone();
        Observable::new(move |ctx, down| {
            let hub = Subject::new();
            let pending = Arc::new(AtomicUsize::new(branches.len() + 1));
            let finish = {
                let down = down.clone();
                let pending = pending.clone();
                move || {
                    if pending.fetch_sub(1, Ordering::SeqCst) == 1 {
                        down.complete();
                    }
                }
            };

            for (index, branch) in branches.iter().enumerate() {
                let failed = down.clone();
                let done = finish.clone();
                let name = branch.name().to_string();
                let branch_sub = Subscriber::new(observer(
                    |_| {},
                    move |error| {
                        tracing::debug!(branch = index, operator = %name, %error, "fork branch failed");
                        failed.error(error);
                    },
                    move || done(),
                ));
                let link = branch_sub.clone();
                down.add(move || link.unsubscribe());
                branch
                    .apply(hub.as_observable())
                    .subscribe_with(ctx, branch_sub);
            }

            let items = hub.clone();
            let target = down.clone();
            let failed = down.clone();
            subscribe_upstream(
                &source,
                ctx,
                &down,
                observer(
                    move |value| {
                        items.next(value.clone());
                        target.next(value);
                    },
                    move |error| failed.error(error),
                    move || {
                        hub.complete();
                        finish();
                    },
                ),
            );
        })
    })
}
