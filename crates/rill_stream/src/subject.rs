//! Multicast hub.

use crate::observable::Observable;
use crate::subscriber::{Observer, Subscriber};
use parking_lot::Mutex;
use rill_core::{EngineError, SubscriptionId, Value};
use std::sync::{Arc, Weak};

#[derive(Clone)]
enum Terminal {
    Completed,
    Errored(EngineError),
}

#[derive(Default)]
struct SubjectState {
    subscribers: Vec<Subscriber>,
    terminal: Option<Terminal>,
}

/// Pushes every notification to all current subscribers.
///
/// Late subscribers after termination receive the terminal notification
/// immediately. Items are not replayed.
#[derive(Clone, Default)]
pub struct Subject {
    state: Arc<Mutex<SubjectState>>,
}

impl Subject {
    /// Create an open subject
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Observable view; each subscription registers with the hub
    #[must_use]
    pub fn as_observable(&self) -> Observable {
        let state = Arc::downgrade(&self.state);
        Observable::new(move |_, sub| {
            let Some(shared) = state.upgrade() else {
                sub.complete();
                return;
            };
            let terminal = {
                let mut guard = shared.lock();
                if guard.terminal.is_none() {
                    guard.subscribers.push(sub.clone());
                }
                guard.terminal.clone()
            };
            match terminal {
                Some(Terminal::Completed) => sub.complete(),
                Some(Terminal::Errored(error)) => sub.error(error),
                None => {
                    let id = sub.id();
                    let weak = Arc::downgrade(&shared);
                    sub.add(move || detach(&weak, id));
                }
            }
        })
    }

    /// Push an item to every subscriber
    pub fn next(&self, value: Value) {
        let targets = {
            let guard = self.state.lock();
            if guard.terminal.is_some() {
                return;
            }
            guard.subscribers.clone()
        };
        for target in targets {
            target.next(value.clone());
        }
    }

    /// Fail every subscriber
    pub fn error(&self, error: EngineError) {
        for target in self.finish(Terminal::Errored(error.clone())) {
            target.error(error.clone());
        }
    }

    /// Complete every subscriber
    pub fn complete(&self) {
        for target in self.finish(Terminal::Completed) {
            target.complete();
        }
    }

    fn finish(&self, terminal: Terminal) -> Vec<Subscriber> {
        let mut guard = self.state.lock();
        if guard.terminal.is_some() {
            return Vec::new();
        }
        guard.terminal = Some(terminal);
        std::mem::take(&mut guard.subscribers)
    }

    /// Number of live subscribers
    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.state.lock().subscribers.len()
    }

    /// Whether the subject terminated
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.lock().terminal.is_some()
    }
}

fn detach(state: &Weak<Mutex<SubjectState>>, id: SubscriptionId) {
    if let Some(state) = state.upgrade() {
        state.lock().subscribers.retain(|s| s.id() != id);
    }
}

impl Observer for Subject {
    fn next(&self, value: Value) {
        Subject::next(self, value);
    }

    fn error(&self, error: EngineError) {
        Subject::error(self, error);
    }

    fn complete(&self) {
        Subject::complete(self);
    }
}
