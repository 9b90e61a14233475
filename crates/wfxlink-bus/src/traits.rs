use crate::error::Result;

/// Host side of the chip bus (SPI or SDIO).
///
/// Implementations own the physical transfer. All data transfers are issued
/// with a length already rounded through [`HwBus::align_size`].
pub trait HwBus: Send {
    /// Round a transfer length up to the granularity required by the bus.
    fn align_size(&self, len: usize) -> usize;

    /// Read one message from the chip's output queue into `buf`.
    ///
    /// The chip appends the piggyback word in the last two bytes of `buf`.
    fn read(&mut self, buf: &mut [u8]) -> Result<()>;

    /// Write one message to the chip's input queue.
    fn write(&mut self, buf: &[u8]) -> Result<()>;

    /// Read the control register.
    fn read_control(&mut self) -> Result<u32>;

    /// Acknowledge the last received transfer.
    ///
    /// Returns the error bits the chip reported (already cleared). Buses that
    /// need no acknowledgment keep the default, which reports nothing.
    fn acknowledge(&mut self) -> Result<u8> {
        Ok(0)
    }
}

impl<T: HwBus + ?Sized> HwBus for Box<T> {
    fn align_size(&self, len: usize) -> usize {
        (**self).align_size(len)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<()> {
        (**self).read(buf)
    }

    fn write(&mut self, buf: &[u8]) -> Result<()> {
        (**self).write(buf)
    }

    fn read_control(&mut self) -> Result<u32> {
        (**self).read_control()
    }

    fn acknowledge(&mut self) -> Result<u8> {
        (**self).acknowledge()
    }
}

/// GPIO line that keeps the chip awake while asserted.
pub trait WakePin: Send {
    /// Current level of the line.
    fn is_asserted(&self) -> bool;

    /// Drive the line.
    fn set(&mut self, asserted: bool);
}

/// Round `len` up to a multiple of `align`. An `align` of 0 or 1 is a no-op.
pub fn round_up(len: usize, align: usize) -> usize {
    if align <= 1 {
        return len;
    }
    len.div_ceil(align) * align
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_up_to_alignment() {
        assert_eq!(round_up(10, 2), 10);
        assert_eq!(round_up(11, 2), 12);
        assert_eq!(round_up(1, 16), 16);
        assert_eq!(round_up(0, 16), 0);
        assert_eq!(round_up(513, 512), 1024);
    }

    #[test]
    fn round_up_degenerate_alignment() {
        assert_eq!(round_up(7, 0), 7);
        assert_eq!(round_up(7, 1), 7);
    }
}
