//! Demand gates.
//!
//! A gate tells cold producers whether the consumer wants more items. It is
//! held by operators that buffer work and released once the backlog shrinks.
//! Producers check [`Demand::is_paused`] before emitting and resume through
//! [`Demand::when_ready`] or [`Demand::ready`]. Hot sources such as subjects
//! ignore it.

use parking_lot::Mutex;
use tokio::sync::Notify;

type Resume = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct DemandState {
    // signed so a release racing ahead of its hold cancels out
    holds: isize,
    waiting: Vec<Resume>,
}

/// Pause/resume signal shared along a chain of subscribers
#[derive(Default)]
pub struct Demand {
    state: Mutex<DemandState>,
    resumed: Notify,
}

impl Demand {
    /// An open gate
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether producers should stop emitting
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.state.lock().holds > 0
    }

    /// Pause producers until a matching [`Demand::release`]
    pub fn hold(&self) {
        self.state.lock().holds += 1;
    }

    /// Undo one [`Demand::hold`]; wakes producers when the last hold goes
    pub fn release(&self) {
        let waiting = {
            let mut state = self.state.lock();
            state.holds -= 1;
            if state.holds > 0 {
                return;
            }
            std::mem::take(&mut state.waiting)
        };
        for resume in waiting {
            resume();
        }
        self.resumed.notify_waiters();
    }

    /// Run `resume` now if the gate is open, otherwise on the next release
    pub fn when_ready(&self, resume: impl FnOnce() + Send + 'static) {
        {
            let mut state = self.state.lock();
            if state.holds > 0 {
                state.waiting.push(Box::new(resume));
                return;
            }
        }
        resume();
    }

    /// Wait until the gate is open
    pub async fn ready(&self) {
        loop {
            let resumed = self.resumed.notified();
            if !self.is_paused() {
                return;
            }
            resumed.await;
        }
    }
}

impl std::fmt::Debug for Demand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Demand")
            .field("holds", &state.holds)
            .field("waiting", &state.waiting.len())
            .finish()
    }
}
