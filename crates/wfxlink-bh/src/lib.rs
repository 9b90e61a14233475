//! Bottom-half protocol engine for the wfxlink chip protocol.
//!
//! This layer turns a raw [`HwBus`](wfxlink_bus::HwBus) into a flow-controlled
//! exchange of messages with the chip firmware:
//! - a [`CreditCounter`] bounds the transmit buffers outstanding on the chip
//! - a [`SequenceTracker`] stamps and checks the 3-bit sequence numbers
//! - the receive pump follows the piggyback word from message to message
//! - the [`WakeController`] keeps the chip awake while the bottom half runs
//!
//! A [`Link`] owns all of it. Call [`Link::run`] directly for a synchronous
//! pass, or [`Link::spawn`] a worker and feed it through a [`LinkHandle`].

pub mod completion;
pub mod config;
pub mod credit;
pub mod error;
pub mod handler;
pub mod link;
pub mod queue;
mod rx;
pub mod sequence;
pub mod stats;
mod tx;
pub mod wake;
pub mod worker;

pub use completion::Completion;
pub use config::{ChipCaps, LinkConfig};
pub use credit::CreditCounter;
pub use error::{BhError, Result};
pub use handler::MessageHandler;
pub use link::Link;
pub use queue::{OutboundQueue, TxQueue};
pub use sequence::{SequenceMismatch, SequenceTracker};
pub use stats::{BhStats, RunReport};
pub use wake::{WakeController, WakeOutcome};
#[cfg(feature = "async")]
pub use worker::AsyncLinkHandle;
pub use worker::{LinkHandle, LinkTrigger};
