//! Observables and stream operators.

use crate::collect::Collect;
use crate::demand::Demand;
use crate::subscriber::{Observer, Subscriber, Subscription, observer};
use rill_core::{Context, EngineError, Value};
use std::sync::Arc;

type Producer = dyn Fn(&Context, Subscriber) + Send + Sync;

/// A cold, push-based sequence of values.
///
/// Every subscription runs the producer afresh with the subscribing context
/// and a [`Subscriber`] guarding the downstream observer.
#[derive(Clone)]
pub struct Observable {
    producer: Arc<Producer>,
}

impl Observable {
    /// Create an observable from a producer function
    pub fn new(producer: impl Fn(&Context, Subscriber) + Send + Sync + 'static) -> Self {
        Self {
            producer: Arc::new(producer),
        }
    }

    /// Run the producer for an existing subscriber
    pub fn subscribe_with(&self, ctx: &Context, subscriber: Subscriber) -> Subscription {
        if subscriber.activate() {
            (self.producer)(ctx, subscriber.clone());
        }
        Subscription::from(subscriber)
    }

    /// Subscribe an observer
    pub fn subscribe(&self, ctx: &Context, observer: impl Observer + 'static) -> Subscription {
        self.subscribe_with(ctx, Subscriber::new(observer))
    }

    /// Subscribe with closures
    pub fn subscribe_fns<N, E, C>(&self, ctx: &Context, on_next: N, on_error: E, on_complete: C) -> Subscription
    where
        N: Fn(Value) + Send + Sync + 'static,
        E: Fn(EngineError) + Send + Sync + 'static,
        C: Fn() + Send + Sync + 'static,
    {
        self.subscribe(ctx, observer(on_next, on_error, on_complete))
    }

    /// Future resolving to every item once the stream completes.
    ///
    /// Resolves to the first error instead if the stream fails. Dropping the
    /// future unsubscribes.
    pub fn collect(&self, ctx: &Context) -> Collect {
        Collect::new(self, ctx)
    }

    /// Pin the subscription context.
    ///
    /// The returned observable runs this one with `ctx` whatever context it
    /// is subscribed with.
    #[must_use]
    pub fn bind(&self, ctx: Context) -> Self {
        let source = self.clone();
        Self::new(move |_, subscriber| {
            source.subscribe_with(&ctx, subscriber);
        })
    }

    /// Apply an operator
    #[must_use]
    pub fn pipe(&self, operator: &Operator) -> Self {
        operator.apply(self.clone())
    }
}

impl std::fmt::Debug for Observable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observable").finish_non_exhaustive()
    }
}

/// Subscribe `downstream`'s upstream source with `observer`.
///
/// The upstream subscription is created before the source starts and is
/// linked to `downstream`, so ending `downstream` (even synchronously while
/// the source is still emitting) unsubscribes the source.
///
/// The source shares `downstream`'s demand gate.
pub fn subscribe_upstream(
    source: &Observable,
    ctx: &Context,
    downstream: &Subscriber,
    observer: impl Observer + 'static,
) -> Subscription {
    subscribe_gated(source, ctx, downstream, downstream.demand().clone(), observer)
}

/// [`subscribe_upstream`] with the source paced by `demand` instead of the
/// downstream gate
pub fn subscribe_gated(
    source: &Observable,
    ctx: &Context,
    downstream: &Subscriber,
    demand: Arc<Demand>,
    observer: impl Observer + 'static,
) -> Subscription {
    let upstream = Subscriber::with_demand(Arc::new(observer), demand);
    let link = upstream.clone();
    downstream.add(move || link.unsubscribe());
    source.subscribe_with(ctx, upstream)
}

/// Observer forwarding errors and completion to `downstream` unchanged
pub fn relay<N>(downstream: &Subscriber, on_next: N) -> impl Observer + 'static
where
    N: Fn(Value) + Send + Sync + 'static,
{
    let on_error = downstream.clone();
    let on_complete = downstream.clone();
    observer(
        on_next,
        move |error| on_error.error(error),
        move || on_complete.complete(),
    )
}

type Transform = dyn Fn(Observable) -> Observable + Send + Sync;

/// A named observable transformer
#[derive(Clone)]
pub struct Operator {
    name: String,
    transform: Arc<Transform>,
}

impl Operator {
    /// Create an operator
    pub fn new(
        name: impl Into<String>,
        transform: impl Fn(Observable) -> Observable + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            transform: Arc::new(transform),
        }
    }

    /// Operator name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wrap `source`
    #[must_use]
    pub fn apply(&self, source: Observable) -> Observable {
        (self.transform)(source)
    }

    /// Compose operators left to right
    #[must_use]
    pub fn chain(operators: Vec<Operator>) -> Self {
        let name = operators
            .iter()
            .map(Operator::name)
            .collect::<Vec<_>>()
            .join(" | ");
        Self::new(name, move |source| {
            operators.iter().fold(source, |acc, op| op.apply(acc))
        })
    }
}

impl std::fmt::Debug for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Operator").field("name", &self.name).finish()
    }
}
