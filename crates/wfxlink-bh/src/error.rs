use std::time::Duration;

/// Errors that can occur in bottom-half operations.
#[derive(Debug, thiserror::Error)]
pub enum BhError {
    /// Bus-level error.
    #[error("bus error: {0}")]
    Bus(#[from] wfxlink_bus::BusError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] wfxlink_frame::FrameError),

    /// A confirmation returned more credits than were outstanding.
    #[error("credit underflow: releasing {release} with {used} in use")]
    CreditUnderflow { used: u32, release: u32 },

    /// Receive buffer allocation failed.
    #[error("out of memory allocating {len} byte receive buffer")]
    OutOfMemory { len: usize },

    /// Operation did not complete in time.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The link no longer accepts work.
    #[error("link is shut down")]
    Shutdown,

    /// The worker thread could not be started.
    #[error("failed to spawn worker: {0}")]
    Spawn(#[source] std::io::Error),

    /// The worker panicked.
    #[error("worker panicked")]
    WorkerPanicked,
}

pub type Result<T> = std::result::Result<T, BhError>;
