use std::sync::{Condvar, Mutex};
use std::time::Duration;

use crate::lock;

/// One-shot completion event.
///
/// Latches permanently on the first [`set`](Event::set); every current and
/// future waiter observes it. This is the blocking substrate under
/// `Future::wait` and `Future::get` — the promise side sets the event after
/// publishing its result.
#[derive(Debug, Default)]
pub struct Event {
    signalled: Mutex<bool>,
    cond: Condvar,
}

impl Event {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latches the event and wakes every waiter.
    pub fn set(&self) {
        let mut signalled = lock(&self.signalled);
        *signalled = true;
        drop(signalled);
        self.cond.notify_all();
    }

    /// Returns true once the event has been set.
    pub fn is_set(&self) -> bool {
        *lock(&self.signalled)
    }

    /// Blocks the calling thread until the event is set.
    pub fn wait(&self) {
        let mut signalled = lock(&self.signalled);
        while !*signalled {
            signalled = self
                .cond
                .wait(signalled)
                .unwrap_or_else(std::sync::PoisonError::into_inner);
        }
    }

    /// Blocks until the event is set or `timeout` elapses.
    ///
    /// Returns true if the event was set, false on timeout.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let signalled = lock(&self.signalled);
        let (signalled, _) = self
            .cond
            .wait_timeout_while(signalled, timeout, |set| !*set)
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *signalled
    }
}
