//! Queue resource and the stream that drains it.
//!
//! A queue holds pending items that external actions may append to or
//! remove from while a single reader stream drains it. Delivery is FIFO;
//! items added while the reader is handling an item are appended and
//! delivered after everything already queued, never re-entrantly.

use crate::observable::Observable;
use crate::subscriber::Subscriber;
use parking_lot::Mutex;
use rill_core::{Binding, EngineError, EngineResult, Resource, Value, downcast_resource};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::VecDeque;
use std::sync::{Arc, Weak};

/// What a full queue does with a new item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum OverflowPolicy {
    /// Discard the incoming item
    #[default]
    DropNewest,
    /// Discard the oldest pending item to make room
    DropOldest,
    /// Fail the add
    Reject,
}

/// Queue configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Maximum pending items; `None` means unbounded
    pub capacity: Option<usize>,
    /// Behaviour when full
    pub overflow: OverflowPolicy,
}

impl QueueConfig {
    /// Unbounded queue
    #[must_use]
    pub fn new() -> Self {
        Self {
            capacity: None,
            overflow: OverflowPolicy::DropNewest,
        }
    }

    /// Bound the queue
    #[must_use]
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    /// Set the overflow policy
    #[must_use]
    pub fn with_overflow(mut self, overflow: OverflowPolicy) -> Self {
        self.overflow = overflow;
        self
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Default)]
struct QueueState {
    items: VecDeque<Value>,
    reader: Option<Subscriber>,
    closed: bool,
    released: bool,
    draining: bool,
}

/// Ordered, mutable sequence of pending items
pub struct Queue {
    config: QueueConfig,
    state: Mutex<QueueState>,
    this: Weak<Queue>,
}

impl Queue {
    /// Create a queue holding `items`
    #[must_use]
    pub fn new(items: impl IntoIterator<Item = Value>, config: QueueConfig) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            config,
            state: Mutex::new(QueueState {
                items: items.into_iter().collect(),
                ..QueueState::default()
            }),
            this: this.clone(),
        })
    }

    /// Configuration in effect
    #[must_use]
    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Append an item.
    ///
    /// Returns `false` when the item was discarded by
    /// [`OverflowPolicy::DropNewest`].
    ///
    /// # Errors
    ///
    /// Fails if the queue is closed, or full under
    /// [`OverflowPolicy::Reject`]
    pub fn add(&self, item: Value) -> EngineResult<bool> {
        let accepted = {
            let mut state = self.state.lock();
            if state.closed {
                return Err(EngineError::stream("queue is closed"));
            }
            let full = self
                .config
                .capacity
                .is_some_and(|capacity| state.items.len() >= capacity);
            if full {
                match self.config.overflow {
                    OverflowPolicy::DropNewest => {
                        tracing::debug!("queue full, dropping newest item");
                        false
                    }
                    OverflowPolicy::DropOldest => {
                        tracing::debug!("queue full, dropping oldest item");
                        state.items.pop_front();
                        state.items.push_back(item);
                        true
                    }
                    OverflowPolicy::Reject => {
                        return Err(EngineError::stream("queue is full"));
                    }
                }
            } else {
                state.items.push_back(item);
                true
            }
        };
        self.pump();
        Ok(accepted)
    }

    /// Remove and return the pending item at `index`
    pub fn remove(&self, index: usize) -> Option<Value> {
        self.state.lock().items.remove(index)
    }

    /// Stop accepting items; the reader completes once drained
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.pump();
    }

    /// Number of pending items
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    /// Whether nothing is pending
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.lock().items.is_empty()
    }

    /// Whether the queue stopped accepting items
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Attach the single reader and start delivering to it
    ///
    /// # Errors
    ///
    /// Fails if another reader is still attached or the queue was released
    pub fn attach(&self, reader: Subscriber) -> EngineResult<()> {
        {
            let mut state = self.state.lock();
            if state.released {
                return Err(EngineError::stream("queue was released"));
            }
            if state.reader.as_ref().is_some_and(|r| !r.is_closed()) {
                return Err(EngineError::stream("queue already has a reader"));
            }
            state.reader = Some(reader.clone());
        }
        let this = self.this.clone();
        let id = reader.id();
        reader.add(move || {
            if let Some(queue) = this.upgrade() {
                let mut state = queue.state.lock();
                if state.reader.as_ref().is_some_and(|r| r.id() == id) {
                    state.reader = None;
                }
            }
        });
        self.pump();
        Ok(())
    }

    /// Deliver pending items to the reader until the queue is empty or the
    /// reader pauses.
    ///
    /// Only one pump runs at a time; a nested call made from inside the
    /// reader returns at once and the running pump picks up its items. A
    /// paused reader resumes the pump once it wants more.
    fn pump(&self) {
        {
            let mut state = self.state.lock();
            if state.draining {
                return;
            }
            state.draining = true;
        }
        loop {
            let (reader, item) = {
                let mut state = self.state.lock();
                let reader = match &state.reader {
                    Some(reader) if !reader.is_closed() => reader.clone(),
                    _ => {
                        state.draining = false;
                        return;
                    }
                };
                if !state.items.is_empty() && reader.is_paused() {
                    state.draining = false;
                    drop(state);
                    let this = self.this.clone();
                    reader.when_ready(move || {
                        if let Some(queue) = this.upgrade() {
                            queue.pump();
                        }
                    });
                    return;
                }
                match state.items.pop_front() {
                    Some(item) => (reader, Some(item)),
                    None if state.closed => {
                        state.reader = None;
                        state.draining = false;
                        (reader, None)
                    }
                    None => {
                        state.draining = false;
                        return;
                    }
                }
            };
            match item {
                Some(item) => reader.next(item),
                None => {
                    reader.complete();
                    return;
                }
            }
        }
    }
}

impl Resource for Queue {
    fn kind(&self) -> &str {
        "queue"
    }

    fn snapshot(&self) -> Value {
        Value::Array(self.state.lock().items.iter().cloned().collect())
    }

    fn release(&self) {
        let reader = {
            let mut state = self.state.lock();
            if state.released {
                return;
            }
            state.released = true;
            state.closed = true;
            state.items.clear();
            state.reader.take()
        };
        tracing::trace!("queue released");
        if let Some(reader) = reader {
            reader.complete();
        }
    }

    fn is_released(&self) -> bool {
        self.state.lock().released
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

impl std::fmt::Debug for Queue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Queue")
            .field("pending", &state.items.len())
            .field("closed", &state.closed)
            .field("released", &state.released)
            .finish()
    }
}

/// Find the queue bound to variable `name`
///
/// # Errors
///
/// Fails if the variable is missing or holds something other than a queue
pub fn lookup_queue(ctx: &rill_core::Context, name: &str) -> EngineResult<Arc<Queue>> {
    match ctx.lookup_var(name)? {
        Some(Binding::Resource(resource)) => downcast_resource::<Queue>(resource)
            .ok_or_else(|| EngineError::reference(format!("${}", name), "variable is not a queue")),
        Some(Binding::Value(_)) => Err(EngineError::reference(
            format!("${}", name),
            "variable is not a queue",
        )),
        None => Err(EngineError::reference(
            format!("${}", name),
            "variable not defined",
        )),
    }
}

/// Stream draining the queue bound to `name` in the subscribing context
pub fn source_queue(name: impl Into<String>) -> Observable {
    let name = name.into();
    Observable::new(move |ctx, sub| {
        let attached = lookup_queue(ctx, &name).and_then(|queue| queue.attach(sub.clone()));
        if let Err(error) = attached {
            sub.error(error);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observable::Operator;
    use crate::operators::{take, tap};
    use crate::sequential::map_promise;
    use rill_core::{Context, ResourceRef};
    use serde_json::json;

    fn queue_ctx(queue: &Arc<Queue>) -> Context {
        let resource: ResourceRef = queue.clone();
        Context::new(json!(null)).with_var("q", Binding::Resource(resource))
    }

    fn record(source: &Observable, ctx: &Context) -> (Arc<Mutex<Vec<Value>>>, Arc<Mutex<bool>>) {
        let items = Arc::new(Mutex::new(Vec::new()));
        let done = Arc::new(Mutex::new(false));
        let i = items.clone();
        let d = done.clone();
        source.subscribe_fns(ctx, move |v| i.lock().push(v), |_| {}, move || *d.lock() = true);
        (items, done)
    }

    #[test]
    fn test_drains_initial_then_new_items() {
        let queue = Queue::new(vec![json!(1), json!(2)], QueueConfig::new());
        let ctx = queue_ctx(&queue);
        let (items, done) = record(&source_queue("q"), &ctx);

        assert_eq!(*items.lock(), vec![json!(1), json!(2)]);
        assert!(queue.is_empty());

        queue.add(json!(3)).unwrap();
        assert_eq!(*items.lock(), vec![json!(1), json!(2), json!(3)]);
        assert!(!*done.lock());

        queue.close();
        assert!(*done.lock());
    }

    #[test]
    fn test_add_during_delivery_is_appended() {
        let queue = Queue::new(vec![json!("a"), json!("b")], QueueConfig::new());
        let ctx = queue_ctx(&queue);
        let feeder = queue.clone();
        let source = source_queue("q").pipe(&tap(move |_, v| {
            if v == &json!("a") {
                feeder.add(json!("c"))?;
            }
            Ok(())
        }));
        let (items, _) = record(&source, &ctx);
        assert_eq!(*items.lock(), vec![json!("a"), json!("b"), json!("c")]);
    }

    #[test]
    fn test_removed_item_never_delivered() {
        let queue = Queue::new(Vec::new(), QueueConfig::new());
        queue.add(json!(1)).unwrap();
        queue.add(json!(2)).unwrap();
        queue.add(json!(3)).unwrap();
        assert_eq!(queue.remove(1), Some(json!(2)));
        assert_eq!(queue.remove(9), None);

        let ctx = queue_ctx(&queue);
        let (items, _) = record(&source_queue("q"), &ctx);
        assert_eq!(*items.lock(), vec![json!(1), json!(3)]);
    }

    #[test]
    fn test_overflow_policies() {
        let newest = Queue::new(vec![json!(1)], QueueConfig::new().with_capacity(1));
        assert!(!newest.add(json!(2)).unwrap());
        assert_eq!(newest.snapshot(), json!([1]));

        let oldest = Queue::new(
            vec![json!(1)],
            QueueConfig::new()
                .with_capacity(1)
                .with_overflow(OverflowPolicy::DropOldest),
        );
        assert!(oldest.add(json!(2)).unwrap());
        assert_eq!(oldest.snapshot(), json!([2]));

        let reject = Queue::new(
            vec![json!(1)],
            QueueConfig::new()
                .with_capacity(1)
                .with_overflow(OverflowPolicy::Reject),
        );
        assert!(reject.add(json!(2)).is_err());
    }

    #[test]
    fn test_release_completes_reader_once() {
        let queue = Queue::new(Vec::new(), QueueConfig::new());
        let ctx = queue_ctx(&queue);
        let (_, done) = record(&source_queue("q"), &ctx);

        queue.release();
        queue.release();
        assert!(*done.lock());
        assert!(queue.is_released());
        assert!(queue.add(json!(1)).is_err());
    }

    #[test]
    fn test_single_reader() {
        let queue = Queue::new(Vec::new(), QueueConfig::new());
        let ctx = queue_ctx(&queue);
        let _first = source_queue("q").subscribe_fns(&ctx, |_| {}, |_| {}, || {});

        let errors = Arc::new(Mutex::new(Vec::new()));
        let e = errors.clone();
        source_queue("q").subscribe_fns(&ctx, |_| {}, move |err| e.lock().push(err), || {});
        assert_eq!(errors.lock().len(), 1);
    }

    #[test]
    fn test_reader_unsubscribe_detaches() {
        let queue = Queue::new(vec![json!(1), json!(2), json!(3)], QueueConfig::new());
        let ctx = queue_ctx(&queue);
        let (items, _) = record(&source_queue("q").pipe(&take(1)), &ctx);
        assert_eq!(*items.lock(), vec![json!(1)]);
        assert_eq!(queue.len(), 2);

        let (rest, _) = record(&source_queue("q"), &ctx);
        assert_eq!(*rest.lock(), vec![json!(2), json!(3)]);
    }

    #[test]
    fn test_missing_queue_errors() {
        let ctx = Context::new(json!(null)).with_var("q", json!(5));
        let errors = Arc::new(Mutex::new(Vec::new()));
        let e = errors.clone();
        source_queue("q").subscribe_fns(&ctx, |_| {}, move |err| e.lock().push(err), || {});
        source_queue("nope").subscribe_fns(
            &ctx,
            |_| {},
            {
                let e = errors.clone();
                move |err| e.lock().push(err)
            },
            || {},
        );
        let errors = errors.lock();
        assert_eq!(errors.len(), 2);
        assert!(errors[0].to_string().contains("not a queue"));
        assert!(errors[1].to_string().contains("not defined"));
    }

    #[tokio::test]
    async fn test_paused_reader_resumes_from_queue() {
        let queue = Queue::new((1..=5).map(Value::from), QueueConfig::new());
        let ctx = queue_ctx(&queue);
        let source = source_queue("q").pipe(&map_promise(|_, v| async move {
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
            Ok(v)
        }));
        let (items, _) = record(&source, &ctx);

        // one item in flight, the rest still pending in the queue
        assert!(queue.len() >= 3);
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        assert_eq!(*items.lock(), (1..=5).map(Value::from).collect::<Vec<_>>());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_operator_chain_over_queue() {
        let queue = Queue::new(vec![json!(1), json!(2), json!(3)], QueueConfig::new());
        let ctx = queue_ctx(&queue);
        let chain = Operator::chain(vec![take(2)]);
        let (items, done) = record(&source_queue("q").pipe(&chain), &ctx);
        assert_eq!(items.lock().len(), 2);
        assert!(*done.lock());
    }
}
