//! Message framing for the wfxlink chip protocol.
//!
//! Every message exchanged with the chip is framed with a 4-byte header:
//! - a 2-byte little-endian length (header included)
//! - a 1-byte message id (bit 7 marks indications)
//! - a flags byte carrying the interface, the 3-bit sequence number and the
//!   2-bit encryption marker
//!
//! Messages read from the chip are followed by a piggyback word announcing
//! the next pending message. Messages flagged as encrypted are wrapped in the
//! secure-link envelope produced by an external [`SecureLink`].

pub mod codec;
pub mod dump;
pub mod error;
pub mod ids;
pub mod message;
pub mod piggyback;
pub mod secure;

pub use codec::{
    decode_message, encode_message, Decoded, Encryption, Envelope, HEADER_SIZE, LEN_FIELD_SIZE,
    MAX_MESSAGE_LEN, SEQ_COUNTER_MAX,
};
pub use dump::hex_dump;
pub use error::{CryptoError, FrameError, Result};
pub use ids::{message_name, ID_IS_INDICATION};
pub use message::{Message, MultiTxConfirmation};
pub use piggyback::{Piggyback, PIGGYBACK_SIZE};
pub use secure::{encrypted_len, SecureLink, SL_BLOCK_SIZE, SL_HEADER_SIZE, SL_TAG_SIZE};
