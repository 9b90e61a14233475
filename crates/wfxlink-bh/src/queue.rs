use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use wfxlink_frame::Envelope;

/// Source of messages waiting to be sent to the chip.
///
/// The transmit pump takes messages one at a time while it holds a credit.
/// A message handed out by [`pop_next`](TxQueue::pop_next) is never
/// delivered again.
pub trait TxQueue: Send + Sync {
    /// Take the next message to send.
    fn pop_next(&self) -> Option<Envelope>;

    /// Whether no message is waiting.
    fn is_empty(&self) -> bool;

    /// Drop every waiting message, returning how many were dropped.
    fn clear(&self) -> usize;
}

/// FIFO outbound queue.
#[derive(Debug, Default)]
pub struct OutboundQueue {
    inner: Mutex<VecDeque<Envelope>>,
}

impl OutboundQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Envelope>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a message.
    pub fn push(&self, envelope: Envelope) {
        self.lock().push_back(envelope);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl TxQueue for OutboundQueue {
    fn pop_next(&self) -> Option<Envelope> {
        self.lock().pop_front()
    }

    fn is_empty(&self) -> bool {
        OutboundQueue::is_empty(self)
    }

    fn clear(&self) -> usize {
        let mut queue = self.lock();
        let dropped = queue.len();
        queue.clear();
        dropped
    }
}
