//! Bottom-half statistics.

use serde::Serialize;

use crate::wake::WakeOutcome;

/// Outcome of one scheduler run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// Messages written to the chip.
    pub requests: usize,
    /// Confirmations received.
    pub confirmations: usize,
    /// Indications received (exception reports included).
    pub indications: usize,
    /// Credits still held by the chip when the run ended.
    pub credits_in_flight: u32,
    /// Whether the chip was allowed to sleep.
    pub released: bool,
    /// How the chip was woken.
    pub wake: WakeOutcome,
}

impl RunReport {
    pub(crate) fn new(wake: WakeOutcome) -> Self {
        Self {
            requests: 0,
            confirmations: 0,
            indications: 0,
            credits_in_flight: 0,
            released: false,
            wake,
        }
    }

    /// Whether either pump moved a message.
    pub fn is_idle(&self) -> bool {
        self.requests == 0 && self.confirmations == 0 && self.indications == 0
    }
}

/// Counters accumulated over the life of a link.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BhStats {
    pub runs: u64,
    pub requests: u64,
    pub confirmations: u64,
    pub indications: u64,
    pub releases: u64,
    pub wake_timeouts: u64,
    pub seq_mismatches: u64,
    pub credit_underflows: u64,
    pub frame_errors: u64,
    pub encode_failures: u64,
    pub bus_errors: u64,
    pub alloc_failures: u64,
    pub chip_errors: u64,
    /// Interrupts that latched neither a length nor the ready bit.
    pub spurious_irqs: u64,
}

impl BhStats {
    pub(crate) fn record_run(&mut self, report: &RunReport) {
        self.runs += 1;
        self.requests += report.requests as u64;
        self.confirmations += report.confirmations as u64;
        self.indications += report.indications as u64;
        if report.released {
            self.releases += 1;
        }
        if report.wake == WakeOutcome::TimedOut {
            self.wake_timeouts += 1;
        }
    }

    /// Sum of every error counter.
    pub fn errors(&self) -> u64 {
        self.wake_timeouts
            + self.seq_mismatches
            + self.credit_underflows
            + self.frame_errors
            + self.encode_failures
            + self.bus_errors
            + self.alloc_failures
            + self.chip_errors
            + self.spurious_irqs
    }
}
