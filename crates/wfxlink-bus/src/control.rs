//! Control register layout.
//!
//! The same low bits are used by the 32-bit control register latched at
//! interrupt time and by the 16-bit piggyback word that trails every
//! message read from the chip.

/// Length of the next pending message, in 16-bit words.
pub const CTRL_NEXT_LEN_MASK: u32 = 0x0000_0FFF;

/// Host requests the chip to stay awake.
pub const CTRL_WLAN_WAKEUP: u32 = 0x0000_1000;

/// Chip is awake and ready to exchange messages.
pub const CTRL_WLAN_READY: u32 = 0x0000_2000;

/// Decode the announced length of the next message, in bytes.
pub fn next_len_bytes(ctrl: u32) -> usize {
    (ctrl & CTRL_NEXT_LEN_MASK) as usize * 2
}

/// Returns true if the ready bit is set.
pub fn is_ready(ctrl: u32) -> bool {
    ctrl & CTRL_WLAN_READY != 0
}
