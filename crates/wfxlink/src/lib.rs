//! Host-side message protocol engine for SPI/SDIO Wi-Fi chips.
//!
//! wfxlink moves framed messages between a host and a WFx-class chip: it
//! tracks sequence numbers and transmit credits, drains the chip's receive
//! queue via the piggyback length word, and keeps the chip awake only while
//! work is outstanding.
//!
//! # Crate Structure
//!
//! - [`bus`]: bus and wake-line abstractions, plus an in-memory simulated chip
//! - [`frame`]: message header, ids, piggyback word and codec
//! - [`bh`]: the bottom half (credits, sequencing, pumps, wake control, worker)

/// Re-export bus types.
pub mod bus {
    pub use wfxlink_bus::*;
}

/// Re-export framing types.
pub mod frame {
    pub use wfxlink_frame::*;
}

/// Re-export bottom-half types.
pub mod bh {
    pub use wfxlink_bh::*;
}
