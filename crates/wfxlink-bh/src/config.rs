use std::time::Duration;

use wfxlink_frame::SEQ_COUNTER_MAX;

/// Tuning knobs of the bottom half.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkConfig {
    /// Maximum messages read per receive pump pass.
    pub rx_batch: usize,
    /// Maximum messages written per transmit pump pass.
    pub tx_batch: usize,
    /// How long to wait for the chip to acknowledge a wakeup.
    pub wake_timeout: Duration,
    /// Fixed delay after asserting the wake line on firmware older than 1.4.
    pub legacy_wake_delay: Duration,
    /// Default bound for [`LinkHandle::flush`](crate::LinkHandle::flush).
    pub flush_timeout: Duration,
    /// Largest sequence number before wrapping to 0.
    pub seq_counter_max: u8,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            rx_batch: 32,
            tx_batch: 32,
            wake_timeout: Duration::from_millis(3),
            legacy_wake_delay: Duration::from_millis(2),
            flush_timeout: Duration::from_secs(2),
            seq_counter_max: SEQ_COUNTER_MAX,
        }
    }
}

/// Capabilities reported by the chip at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChipCaps {
    /// Number of input buffers on the chip, i.e. the credit capacity.
    pub num_inp_ch_bufs: u32,
    /// Firmware API version as `(major, minor)`.
    pub api_version: (u8, u8),
}

impl ChipCaps {
    pub fn new(num_inp_ch_bufs: u32, api_version: (u8, u8)) -> Self {
        Self {
            num_inp_ch_bufs,
            api_version,
        }
    }

    /// Whether the firmware API is strictly older than `major.minor`.
    pub fn api_older_than(&self, major: u8, minor: u8) -> bool {
        self.api_version < (major, minor)
    }
}

impl Default for ChipCaps {
    fn default() -> Self {
        Self {
            num_inp_ch_bufs: 1,
            api_version: (1, 4),
        }
    }
}
