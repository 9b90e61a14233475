use wfxlink_bus::{is_ready, next_len_bytes};

/// Size of the piggyback word trailing every message read from the chip.
pub const PIGGYBACK_SIZE: usize = 2;

/// Word appended by the chip after each message it sends.
///
/// Announces the length of the next pending message (if any) and whether the
/// chip is awake. Shares its bit layout with the control register.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Piggyback(u16);

impl Piggyback {
    /// Wrap a raw piggyback value.
    pub fn new(raw: u16) -> Self {
        Self(raw)
    }

    /// Read the piggyback from the last two bytes of a receive buffer.
    pub fn from_tail(buf: &[u8]) -> Option<Self> {
        let tail = buf.len().checked_sub(PIGGYBACK_SIZE)?;
        Some(Self(u16::from_le_bytes([buf[tail], buf[tail + 1]])))
    }

    /// Raw 16-bit value.
    pub fn raw(self) -> u16 {
        self.0
    }

    /// Same value widened to the control register format.
    pub fn as_control(self) -> u32 {
        u32::from(self.0)
    }

    /// Length of the next pending message, in bytes.
    pub fn next_len(self) -> usize {
        next_len_bytes(self.as_control())
    }

    /// Whether another message is already pending.
    pub fn has_next(self) -> bool {
        self.next_len() != 0
    }

    /// Whether the chip reports itself awake.
    pub fn is_ready(self) -> bool {
        is_ready(self.as_control())
    }
}
