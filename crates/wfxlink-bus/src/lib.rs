//! Bus transport abstraction for the wfxlink chip protocol.
//!
//! The protocol engine never touches hardware directly. It talks to the chip
//! through two collaborators defined here:
//! - [`HwBus`]: byte-level data port plus the control register (SPI or SDIO)
//! - [`WakePin`]: the optional GPIO used to keep the chip out of sleep
//!
//! This is the lowest layer of wfxlink. The [`sim`] module provides an
//! in-memory chip model implementing both traits.

pub mod control;
pub mod error;
pub mod sim;
pub mod traits;

pub use control::{is_ready, next_len_bytes, CTRL_NEXT_LEN_MASK, CTRL_WLAN_READY, CTRL_WLAN_WAKEUP};
pub use error::{BusError, Result};
pub use sim::{SimBus, SimChip, SimWakePin};
pub use traits::{round_up, HwBus, WakePin};
