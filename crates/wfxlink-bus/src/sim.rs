//! In-memory chip model.
//!
//! [`SimChip`] plays the firmware side: tests push raw chip-to-host messages
//! and inspect what the host wrote. [`SimBus`] and [`SimWakePin`] are the host
//! side handles implementing [`HwBus`] and [`WakePin`] over the same state.
//!
//! The model follows the hardware contract the engine relies on:
//! - the control register announces the length of the first pending message
//! - every read returns one message followed by a piggyback word that
//!   announces the next one
//! - an interrupt is raised only when a message arrives on an empty queue, or
//!   when the wake line rises and wakeup acknowledgment is enabled

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::control::{CTRL_NEXT_LEN_MASK, CTRL_WLAN_READY};
use crate::error::{BusError, Result};
use crate::traits::{round_up, HwBus, WakePin};

const PIGGYBACK_SIZE: usize = 2;

type Responder = Box<dyn FnMut(&[u8]) -> Vec<Vec<u8>> + Send>;

struct SimState {
    pending: VecDeque<Vec<u8>>,
    written: Vec<Vec<u8>>,
    irq: bool,
    has_wake_pin: bool,
    wake_line: bool,
    ack_wakeup: bool,
    config_errors: u8,
    fail_reads: usize,
    fail_writes: usize,
    responder: Option<Responder>,
}

impl SimState {
    fn awake(&self) -> bool {
        !self.has_wake_pin || self.wake_line
    }

    fn control_word(&self) -> u32 {
        let next = self
            .pending
            .front()
            .map(|msg| (msg.len() / 2) as u32)
            .unwrap_or(0);
        let ready = if self.awake() { CTRL_WLAN_READY } else { 0 };
        (next & CTRL_NEXT_LEN_MASK) | ready
    }

    /// Queue a message; returns true if this should raise an interrupt.
    fn enqueue(&mut self, mut raw: Vec<u8>) -> bool {
        if raw.len() % 2 != 0 {
            raw.push(0);
        }
        let was_empty = self.pending.is_empty();
        self.pending.push_back(raw);
        if was_empty {
            self.irq = true;
        }
        was_empty
    }
}

struct SimShared {
    state: Mutex<SimState>,
    irq_cv: Condvar,
}

impl SimShared {
    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Firmware side of the simulated chip.
#[derive(Clone)]
pub struct SimChip {
    shared: Arc<SimShared>,
}

impl Default for SimChip {
    fn default() -> Self {
        Self::new()
    }
}

impl SimChip {
    /// Create an idle chip with an empty output queue.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(SimShared {
                state: Mutex::new(SimState {
                    pending: VecDeque::new(),
                    written: Vec::new(),
                    irq: false,
                    has_wake_pin: false,
                    wake_line: false,
                    ack_wakeup: false,
                    config_errors: 0,
                    fail_reads: 0,
                    fail_writes: 0,
                    responder: None,
                }),
                irq_cv: Condvar::new(),
            }),
        }
    }

    /// Host-side bus handle with the given transfer alignment.
    pub fn bus(&self, alignment: usize) -> SimBus {
        SimBus {
            shared: Arc::clone(&self.shared),
            alignment: alignment.max(1),
        }
    }

    /// Host-side wake line. Once created, the chip sleeps while the line is low.
    pub fn wake_pin(&self) -> SimWakePin {
        self.shared.lock().has_wake_pin = true;
        SimWakePin {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Queue a raw chip-to-host message. Odd lengths are padded to a word.
    pub fn push(&self, raw: impl Into<Vec<u8>>) {
        let raised = self.shared.lock().enqueue(raw.into());
        if raised {
            self.shared.irq_cv.notify_all();
        }
    }

    /// Number of messages the host has not read yet.
    pub fn pending(&self) -> usize {
        self.shared.lock().pending.len()
    }

    /// Current control register value, as the host would read it.
    pub fn control(&self) -> u32 {
        self.shared.lock().control_word()
    }

    /// Drain every buffer the host has written so far.
    pub fn take_written(&self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.shared.lock().written)
    }

    /// Number of buffers written by the host and not yet taken.
    pub fn written_count(&self) -> usize {
        self.shared.lock().written.len()
    }

    /// Install firmware logic invoked on every host write.
    ///
    /// The returned messages are queued for the host, raising an interrupt
    /// when the queue was empty.
    pub fn set_responder<F>(&self, responder: F)
    where
        F: FnMut(&[u8]) -> Vec<Vec<u8>> + Send + 'static,
    {
        self.shared.lock().responder = Some(Box::new(responder));
    }

    /// Raise an interrupt whenever the wake line rises.
    pub fn set_ack_wakeup(&self, enabled: bool) {
        self.shared.lock().ack_wakeup = enabled;
    }

    /// Report error bits on the next acknowledgment.
    pub fn inject_config_errors(&self, bits: u8) {
        self.shared.lock().config_errors = bits;
    }

    /// Make the next `count` reads fail.
    pub fn fail_next_reads(&self, count: usize) {
        self.shared.lock().fail_reads = count;
    }

    /// Make the next `count` writes fail.
    pub fn fail_next_writes(&self, count: usize) {
        self.shared.lock().fail_writes = count;
    }

    /// Whether the chip is currently awake.
    pub fn is_awake(&self) -> bool {
        self.shared.lock().awake()
    }

    /// Level of the wake line.
    pub fn wake_line(&self) -> bool {
        self.shared.lock().wake_line
    }

    /// Consume a raised interrupt without blocking.
    pub fn take_irq(&self) -> bool {
        std::mem::replace(&mut self.shared.lock().irq, false)
    }

    /// Block until an interrupt is raised or `timeout` elapses, consuming it.
    pub fn wait_irq(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.lock();
        loop {
            if state.irq {
                state.irq = false;
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            state = self
                .shared
                .irq_cv
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }
}

impl std::fmt::Debug for SimChip {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.lock();
        f.debug_struct("SimChip")
            .field("pending", &state.pending.len())
            .field("written", &state.written.len())
            .field("awake", &state.awake())
            .finish()
    }
}

/// Host-side data port of the simulated chip.
pub struct SimBus {
    shared: Arc<SimShared>,
    alignment: usize,
}

impl HwBus for SimBus {
    fn align_size(&self, len: usize) -> usize {
        round_up(len, self.alignment)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<()> {
        let mut state = self.shared.lock();
        if state.fail_reads > 0 {
            state.fail_reads -= 1;
            return Err(BusError::Io(std::io::Error::other("injected read failure")));
        }
        let need = match state.pending.front() {
            Some(msg) => msg.len() + PIGGYBACK_SIZE,
            None => return Err(BusError::NoData),
        };
        if buf.len() < need {
            return Err(BusError::BufferTooSmall {
                len: buf.len(),
                need,
            });
        }
        let Some(msg) = state.pending.pop_front() else {
            return Err(BusError::NoData);
        };
        buf.fill(0);
        buf[..msg.len()].copy_from_slice(&msg);
        let piggyback = state.control_word() as u16;
        let tail = buf.len() - PIGGYBACK_SIZE;
        buf[tail..].copy_from_slice(&piggyback.to_le_bytes());
        trace!(len = msg.len(), piggyback, "sim chip: message read");
        Ok(())
    }

    fn write(&mut self, buf: &[u8]) -> Result<()> {
        let mut state = self.shared.lock();
        if state.fail_writes > 0 {
            state.fail_writes -= 1;
            return Err(BusError::Io(std::io::Error::other("injected write failure")));
        }
        state.written.push(buf.to_vec());
        let replies = match state.responder.as_mut() {
            Some(responder) => responder(buf),
            None => Vec::new(),
        };
        let mut raised = false;
        for reply in replies {
            raised |= state.enqueue(reply);
        }
        drop(state);
        if raised {
            self.shared.irq_cv.notify_all();
        }
        trace!(len = buf.len(), "sim chip: message written");
        Ok(())
    }

    fn read_control(&mut self) -> Result<u32> {
        Ok(self.shared.lock().control_word())
    }

    fn acknowledge(&mut self) -> Result<u8> {
        Ok(std::mem::take(&mut self.shared.lock().config_errors))
    }
}

impl std::fmt::Debug for SimBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimBus")
            .field("alignment", &self.alignment)
            .finish()
    }
}

/// Host-side wake line of the simulated chip.
pub struct SimWakePin {
    shared: Arc<SimShared>,
}

impl WakePin for SimWakePin {
    fn is_asserted(&self) -> bool {
        self.shared.lock().wake_line
    }

    fn set(&mut self, asserted: bool) {
        let mut state = self.shared.lock();
        let rising = asserted && !state.wake_line;
        state.wake_line = asserted;
        if rising && state.ack_wakeup {
            state.irq = true;
            drop(state);
            debug!("sim chip: wakeup acknowledged");
            self.shared.irq_cv.notify_all();
        }
    }
}
