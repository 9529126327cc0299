//! One-shot hand-off signal.
//!
//! A binary semaphore used to pass "you may continue" from exactly one
//! releasing thread to exactly one waiting thread. There is no broadcast: each
//! `signal` is consumed by a single `wait`.
//!
//! The signal is stored before the waiter arrives if necessary, so the order in
//! which producer and consumer reach the rendezvous does not matter.

use parking_lot::{Condvar, Mutex};

#[derive(Debug, Default)]
pub(crate) struct Handoff {
    ready: Mutex<bool>,
    cv: Condvar,
}

impl Handoff {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Release the single waiter (now or in the future).
    pub(crate) fn signal(&self) {
        let mut ready = self.ready.lock();
        *ready = true;
        self.cv.notify_one();
    }

    /// Block until signalled, then consume the signal.
    pub(crate) fn wait(&self) {
        let mut ready = self.ready.lock();
        while !*ready {
            self.cv.wait(&mut ready);
        }
        *ready = false;
    }

    #[cfg(test)]
    pub(crate) fn is_set(&self) -> bool {
        *self.ready.lock()
    }
}
