//! Transmit credit accounting.
//!
//! The chip has a fixed number of input buffers. Every message written takes
//! one; confirmations give them back, sometimes several at once.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::trace;

use crate::error::{BhError, Result};

/// Occupancy of the chip's input buffers.
#[derive(Debug)]
pub struct CreditCounter {
    capacity: u32,
    used: Mutex<u32>,
    drained: Condvar,
}

impl CreditCounter {
    pub fn new(capacity: u32) -> Self {
        Self {
            capacity,
            used: Mutex::new(0),
            drained: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, u32> {
        self.used.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Total number of credits.
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Credits currently held by the chip.
    pub fn used(&self) -> u32 {
        *self.lock()
    }

    /// Take one credit if any is free.
    pub fn try_reserve(&self) -> bool {
        let mut used = self.lock();
        if *used >= self.capacity {
            return false;
        }
        *used += 1;
        true
    }

    /// Give back a reservation that was not used for a transfer.
    pub fn unreserve(&self) {
        let mut used = self.lock();
        *used = used.saturating_sub(1);
        if *used == 0 {
            self.drained.notify_all();
        }
    }

    /// Return `count` credits, yielding the number still in use.
    ///
    /// Releasing more than is in use leaves the counter untouched.
    pub fn release(&self, count: u32) -> Result<u32> {
        let mut used = self.lock();
        if count > *used {
            return Err(BhError::CreditUnderflow {
                used: *used,
                release: count,
            });
        }
        *used -= count;
        trace!(released = count, used = *used, "credits released");
        if *used == 0 {
            self.drained.notify_all();
        }
        Ok(*used)
    }

    /// Block until every credit is back or `timeout` elapses.
    pub fn wait_drained(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut used = self.lock();
        while *used != 0 {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            used = self
                .drained
                .wait_timeout(used, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        true
    }
}
