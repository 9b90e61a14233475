//! Chip wake line control.

use std::thread;
use std::time::Duration;

use serde::Serialize;
use tracing::{error, trace};
use wfxlink_bus::WakePin;

use crate::completion::Completion;
use crate::config::LinkConfig;

/// What [`WakeController::wake`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WakeOutcome {
    /// No wake line is wired; the chip never sleeps.
    NoPin,
    /// The line was already asserted.
    AlreadyAwake,
    /// Legacy firmware: slept the fixed delay.
    Delayed,
    /// The chip reported ready.
    Ready,
    /// The chip did not acknowledge in time.
    TimedOut,
}

/// Drives the optional wake line.
pub struct WakeController {
    pin: Option<Box<dyn WakePin>>,
    legacy: bool,
    wake_timeout: Duration,
    legacy_delay: Duration,
}

impl WakeController {
    /// Controller without a wake line.
    ///
    /// `legacy` selects the fixed-delay wakeup used before firmware API 1.4.
    pub fn new(legacy: bool, config: &LinkConfig) -> Self {
        Self {
            pin: None,
            legacy,
            wake_timeout: config.wake_timeout,
            legacy_delay: config.legacy_wake_delay,
        }
    }

    /// Attach the wake line.
    pub fn with_pin(mut self, pin: Box<dyn WakePin>) -> Self {
        self.pin = Some(pin);
        self
    }

    pub(crate) fn configure(&mut self, config: &LinkConfig) {
        self.wake_timeout = config.wake_timeout;
        self.legacy_delay = config.legacy_wake_delay;
    }

    pub fn has_pin(&self) -> bool {
        self.pin.is_some()
    }

    /// Level of the wake line, `None` without one.
    pub fn is_asserted(&self) -> Option<bool> {
        self.pin.as_ref().map(|pin| pin.is_asserted())
    }

    /// Assert the wake line and wait for the chip.
    ///
    /// `ready` is the control-register completion. It is observed, never
    /// consumed. A timeout is logged and otherwise ignored.
    pub fn wake(&mut self, ready: &Completion) -> WakeOutcome {
        let Some(pin) = self.pin.as_mut() else {
            return WakeOutcome::NoPin;
        };
        if pin.is_asserted() {
            return WakeOutcome::AlreadyAwake;
        }

        pin.set(true);
        trace!("wake line asserted");
        if self.legacy {
            if ready.is_done() {
                return WakeOutcome::Ready;
            }
            thread::sleep(self.legacy_delay);
            return WakeOutcome::Delayed;
        }

        if ready.wait_done(self.wake_timeout) {
            WakeOutcome::Ready
        } else {
            error!(timeout = ?self.wake_timeout, "timeout while waking up chip");
            WakeOutcome::TimedOut
        }
    }

    /// Deassert the wake line, letting the chip sleep.
    pub fn release(&mut self) {
        if let Some(pin) = self.pin.as_mut() {
            pin.set(false);
            trace!("wake line released");
        }
    }
}

impl std::fmt::Debug for WakeController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WakeController")
            .field("pin", &self.is_asserted())
            .field("legacy", &self.legacy)
            .field("wake_timeout", &self.wake_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use wfxlink_bus::SimChip;

    use super::*;

    fn controller(legacy: bool, chip: &SimChip) -> WakeController {
        WakeController::new(legacy, &LinkConfig::default()).with_pin(Box::new(chip.wake_pin()))
    }

    #[test]
    fn no_pin_is_noop() {
        let mut wake = WakeController::new(false, &LinkConfig::default());
        assert_eq!(wake.wake(&Completion::new()), WakeOutcome::NoPin);
        assert_eq!(wake.is_asserted(), None);
        wake.release();
    }

    #[test]
    fn already_asserted() {
        let chip = SimChip::new();
        let mut wake = controller(false, &chip);
        let ready = Completion::new();
        ready.complete();
        assert_eq!(wake.wake(&ready), WakeOutcome::Ready);
        assert_eq!(wake.wake(&Completion::new()), WakeOutcome::AlreadyAwake);
        assert!(chip.wake_line());
    }

    #[test]
    fn ready_is_observed_not_consumed() {
        let chip = SimChip::new();
        let mut wake = controller(false, &chip);
        let ready = Completion::new();
        ready.complete();
        assert_eq!(wake.wake(&ready), WakeOutcome::Ready);
        assert!(ready.is_done());
    }

    #[test]
    fn timeout_is_not_fatal() {
        let chip = SimChip::new();
        let mut wake = controller(false, &chip);
        assert_eq!(wake.wake(&Completion::new()), WakeOutcome::TimedOut);
        assert!(chip.is_awake());
    }

    #[test]
    fn legacy_sleeps_when_not_ready() {
        let chip = SimChip::new();
        let mut wake = controller(true, &chip);
        let start = Instant::now();
        assert_eq!(wake.wake(&Completion::new()), WakeOutcome::Delayed);
        assert!(start.elapsed() >= Duration::from_millis(2));
    }

    #[test]
    fn legacy_skips_delay_when_ready() {
        let chip = SimChip::new();
        let mut wake = controller(true, &chip);
        let ready = Completion::new();
        ready.complete();
        assert_eq!(wake.wake(&ready), WakeOutcome::Ready);
        assert!(ready.is_done());
    }

    #[test]
    fn release_lets_chip_sleep() {
        let chip = SimChip::new();
        let mut wake = controller(true, &chip);
        wake.wake(&Completion::new());
        assert!(chip.is_awake());
        wake.release();
        assert!(!chip.is_awake());
        assert_eq!(wake.is_asserted(), Some(false));
    }
}
