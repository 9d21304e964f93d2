//! Rill Reactive Streams
//!
//! Push-based observables with an explicit subscription state machine.
//! Subscribing runs the producer against a [`rill_core::Context`], so
//! operators that evaluate expressions per item see the variables bound at
//! subscription time, including resources created by [`pipe`].
//!
//! Unsubscribing is synchronous: it stops further emissions and runs every
//! registered teardown exactly once, in reverse registration order.
//!
//! Cold sources honour a [`Demand`] gate shared along the chain, so an
//! asynchronous operator that is still busy pauses the source feeding it.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod collect;
pub mod demand;
pub mod fork;
pub mod observable;
pub mod operators;
pub mod pipe;
pub mod queue;
pub mod sequential;
pub mod source;
pub mod subject;
pub mod subscriber;
pub mod task;

// Re-exports
pub use collect::Collect;
pub use demand::Demand;
pub use fork::fork;
pub use observable::{Observable, Operator};
pub use operators::{filter, filter_map, map, skip, take, tap};
pub use pipe::{ElementBuilder, PipeElement, ResourceFactory, pipe};
pub use queue::{OverflowPolicy, Queue, QueueConfig, lookup_queue, source_queue};
pub use sequential::{delay, do_promise, filter_map_promise, map_promise};
pub use source::{empty, from_future, from_iter, interval, of, throw_error};
pub use subject::Subject;
pub use subscriber::{FnObserver, Observer, Subscriber, Subscription, SubscriptionState, observer};
pub use task::spawn_linked;
