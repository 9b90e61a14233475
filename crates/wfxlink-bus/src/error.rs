/// Errors that can occur on the bus between host and chip.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    /// An I/O error occurred on the data port or a register access.
    #[error("bus I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A read was issued while the chip had nothing to send.
    #[error("no data pending on the bus")]
    NoData,

    /// The transfer buffer is smaller than the data the chip holds.
    #[error("transfer buffer too small ({len} bytes, need {need})")]
    BufferTooSmall { len: usize, need: usize },
}

pub type Result<T> = std::result::Result<T, BusError>;
