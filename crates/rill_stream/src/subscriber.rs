//! Observers, subscribers and the subscription state machine.

use crate::demand::Demand;
use parking_lot::{Mutex, ReentrantMutex};
use rill_core::{EngineError, SubscriptionId, Value};
use std::sync::{Arc, Weak};

/// Receiver of stream notifications
pub trait Observer: Send + Sync {
    /// Next item
    fn next(&self, value: Value);

    /// Terminal failure
    fn error(&self, error: EngineError);

    /// Terminal success
    fn complete(&self);
}

/// Observer assembled from three closures
pub struct FnObserver<N, E, C> {
    on_next: N,
    on_error: E,
    on_complete: C,
}

impl<N, E, C> Observer for FnObserver<N, E, C>
where
    N: Fn(Value) + Send + Sync,
    E: Fn(EngineError) + Send + Sync,
    C: Fn() + Send + Sync,
{
    fn next(&self, value: Value) {
        (self.on_next)(value);
    }

    fn error(&self, error: EngineError) {
        (self.on_error)(error);
    }

    fn complete(&self) {
        (self.on_complete)();
    }
}

/// Build an observer from closures
pub fn observer<N, E, C>(on_next: N, on_error: E, on_complete: C) -> FnObserver<N, E, C>
where
    N: Fn(Value) + Send + Sync,
    E: Fn(EngineError) + Send + Sync,
    C: Fn() + Send + Sync,
{
    FnObserver {
        on_next,
        on_error,
        on_complete,
    }
}

/// Lifecycle of one subscription
///
/// `Idle -> Active -> {Completed | Errored | Unsubscribed}`. The last three
/// are terminal; `Unsubscribed` is reachable from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriptionState {
    /// Created, producer not started
    Idle,
    /// Producer running, items flow
    Active,
    /// Completed normally
    Completed,
    /// Terminated by an error
    Errored,
    /// Cancelled by the consumer
    Unsubscribed,
}

impl SubscriptionState {
    /// Whether no further transitions are possible
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Errored | Self::Unsubscribed)
    }
}

type Teardown = Box<dyn FnOnce() + Send>;

struct Teardowns {
    pending: Vec<Teardown>,
    closed: bool,
}

struct SubscriberInner {
    id: SubscriptionId,
    state: Mutex<SubscriptionState>,
    sink: Mutex<Option<Arc<dyn Observer>>>,
    // held while the observer runs; reentrant so observers may call back in
    delivery: ReentrantMutex<()>,
    teardowns: Mutex<Teardowns>,
    demand: Arc<Demand>,
}

/// Producer-side handle of one subscription.
///
/// Guards the downstream observer: notifications after a terminal
/// transition are discarded, and the observer is dropped as soon as the
/// subscription ends so reference cycles through teardowns are broken.
///
/// Notifications from different threads are serialized, so `error` and
/// `complete` wait for an item already being delivered and no item reaches
/// the observer after them. The same thread may re-enter from inside the
/// observer. `unsubscribe` does not wait: an item already past the state
/// check may still arrive.
#[derive(Clone)]
pub struct Subscriber {
    inner: Arc<SubscriberInner>,
}

impl Subscriber {
    /// Wrap an observer in a fresh idle subscriber
    pub fn new(observer: impl Observer + 'static) -> Self {
        Self::from_arc(Arc::new(observer))
    }

    /// Wrap a shared observer in a fresh idle subscriber with an open gate
    #[must_use]
    pub fn from_arc(observer: Arc<dyn Observer>) -> Self {
        Self::with_demand(observer, Arc::new(Demand::new()))
    }

    /// Wrap a shared observer, sharing an existing demand gate
    #[must_use]
    pub fn with_demand(observer: Arc<dyn Observer>, demand: Arc<Demand>) -> Self {
        Self {
            inner: Arc::new(SubscriberInner {
                id: SubscriptionId::new(),
                state: Mutex::new(SubscriptionState::Idle),
                sink: Mutex::new(Some(observer)),
                delivery: ReentrantMutex::new(()),
                teardowns: Mutex::new(Teardowns {
                    pending: Vec::new(),
                    closed: false,
                }),
                demand,
            }),
        }
    }

    /// Subscription identifier
    #[must_use]
    pub fn id(&self) -> SubscriptionId {
        self.inner.id
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> SubscriptionState {
        *self.inner.state.lock()
    }

    /// Whether the subscription reached a terminal state
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state().is_terminal()
    }

    /// Demand gate consulted by the producer
    #[must_use]
    pub fn demand(&self) -> &Arc<Demand> {
        &self.inner.demand
    }

    /// Whether the consumer asked the producer to pause
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.inner.demand.is_paused()
    }

    /// Wait until the consumer wants items
    pub async fn ready(&self) {
        self.inner.demand.ready().await;
    }

    /// Run `resume` once the consumer wants items
    pub fn when_ready(&self, resume: impl FnOnce() + Send + 'static) {
        self.inner.demand.when_ready(resume);
    }

    pub(crate) fn downgrade(&self) -> WeakSubscriber {
        WeakSubscriber(Arc::downgrade(&self.inner))
    }

    /// Move `Idle -> Active`; returns whether the subscription is active
    pub(crate) fn activate(&self) -> bool {
        let mut state = self.inner.state.lock();
        if *state == SubscriptionState::Idle {
            *state = SubscriptionState::Active;
            tracing::trace!(subscription = %self.inner.id, "subscription active");
        }
        *state == SubscriptionState::Active
    }

    fn transition(&self, target: SubscriptionState) -> bool {
        let mut state = self.inner.state.lock();
        if state.is_terminal() {
            return false;
        }
        *state = target;
        tracing::trace!(subscription = %self.inner.id, ?target, "subscription closed");
        true
    }

    /// Deliver an item if the subscription is active
    pub fn next(&self, value: Value) {
        let _delivering = self.inner.delivery.lock();
        let sink = {
            let state = self.inner.state.lock();
            if *state != SubscriptionState::Active {
                return;
            }
            self.inner.sink.lock().clone()
        };
        if let Some(sink) = sink {
            sink.next(value);
        }
    }

    /// Terminate with an error, then run teardowns
    pub fn error(&self, error: EngineError) {
        {
            let _delivering = self.inner.delivery.lock();
            if !self.transition(SubscriptionState::Errored) {
                return;
            }
            let sink = self.inner.sink.lock().take();
            if let Some(sink) = sink {
                sink.error(error);
            }
        }
        self.run_teardowns();
    }

    /// Terminate normally, then run teardowns
    pub fn complete(&self) {
        {
            let _delivering = self.inner.delivery.lock();
            if !self.transition(SubscriptionState::Completed) {
                return;
            }
            let sink = self.inner.sink.lock().take();
            if let Some(sink) = sink {
                sink.complete();
            }
        }
        self.run_teardowns();
    }

    /// Cancel without notifying the observer. Idempotent.
    pub fn unsubscribe(&self) {
        if !self.transition(SubscriptionState::Unsubscribed) {
            return;
        }
        drop(self.inner.sink.lock().take());
        self.run_teardowns();
    }

    /// Register cleanup to run when the subscription ends.
    ///
    /// Runs immediately if the subscription already ended.
    pub fn add(&self, teardown: impl FnOnce() + Send + 'static) {
        let mut teardowns = self.inner.teardowns.lock();
        if teardowns.closed {
            drop(teardowns);
            teardown();
            return;
        }
        teardowns.pending.push(Box::new(teardown));
    }

    fn run_teardowns(&self) {
        let pending = {
            let mut teardowns = self.inner.teardowns.lock();
            teardowns.closed = true;
            std::mem::take(&mut teardowns.pending)
        };
        for teardown in pending.into_iter().rev() {
            teardown();
        }
    }
}

impl std::fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscriber")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .finish()
    }
}

/// Subscriber reference that does not keep the subscription alive
pub(crate) struct WeakSubscriber(Weak<SubscriberInner>);

impl WeakSubscriber {
    pub(crate) fn upgrade(&self) -> Option<Subscriber> {
        self.0.upgrade().map(|inner| Subscriber { inner })
    }
}

/// Consumer-side handle returned by `subscribe`
#[derive(Debug, Clone)]
pub struct Subscription {
    subscriber: Subscriber,
}

impl Subscription {
    /// Cancel the subscription. Idempotent.
    pub fn unsubscribe(&self) {
        self.subscriber.unsubscribe();
    }

    /// Whether the subscription ended
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.subscriber.is_closed()
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> SubscriptionState {
        self.subscriber.state()
    }

    /// Subscription identifier
    #[must_use]
    pub fn id(&self) -> SubscriptionId {
        self.subscriber.id()
    }
}

impl From<Subscriber> for Subscription {
    fn from(subscriber: Subscriber) -> Self {
        Self { subscriber }
    }
}
