//! Single-slot completion flag.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// A flag one side raises and another side waits on.
///
/// Repeated [`complete`](Completion::complete) calls collapse into one.
#[derive(Debug, Default)]
pub struct Completion {
    done: Mutex<bool>,
    cv: Condvar,
}

impl Completion {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, bool> {
        self.done.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Raise the flag and wake all waiters.
    pub fn complete(&self) {
        *self.lock() = true;
        self.cv.notify_all();
    }

    /// Whether the flag is raised.
    pub fn is_done(&self) -> bool {
        *self.lock()
    }

    /// Consume the flag if it is raised.
    pub fn try_wait(&self) -> bool {
        std::mem::replace(&mut *self.lock(), false)
    }

    /// Block until the flag is raised or `timeout` elapses, leaving it raised.
    pub fn wait_done(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut done = self.lock();
        while !*done {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            done = self
                .cv
                .wait_timeout(done, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        true
    }
}
