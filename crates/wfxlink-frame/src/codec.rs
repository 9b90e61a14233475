use bytes::{BufMut, Bytes, BytesMut};
use tracing::trace;
use wfxlink_bus::round_up;

use crate::error::{CryptoError, FrameError, Result};
use crate::ids;
use crate::piggyback::{Piggyback, PIGGYBACK_SIZE};
use crate::secure::{encrypted_len, SecureLink};

/// Message header: length (2) + id (1) + flags (1) = 4 bytes.
pub const HEADER_SIZE: usize = 4;

/// The length field stays in clear even on encrypted messages.
pub const LEN_FIELD_SIZE: usize = 2;

/// Largest value a sequence number can take before wrapping.
pub const SEQ_COUNTER_MAX: u8 = 7;

/// Largest message the 16-bit length field can describe.
pub const MAX_MESSAGE_LEN: usize = u16::MAX as usize;

/// Cleartext messages are padded to 16-bit words.
const WORD_ALIGN: usize = 2;

const IFACE_SHIFT: u8 = 1;
const IFACE_MASK: u8 = 0x03;
const SEQ_SHIFT: u8 = 3;
const SEQ_MASK: u8 = 0x07;
const ENC_SHIFT: u8 = 6;
const ENC_MASK: u8 = 0x03;

/// Encryption marker carried in the two top bits of the flags byte.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Encryption {
    /// Cleartext message.
    #[default]
    None,
    /// Reserved marker; never valid on the wire.
    Reserved,
    /// Secure-link envelope.
    Encrypted,
}

impl Encryption {
    /// Decode the 2-bit marker. Values 1 and 3 are both reserved.
    pub fn from_bits(bits: u8) -> Self {
        match bits & ENC_MASK {
            0 => Self::None,
            2 => Self::Encrypted,
            _ => Self::Reserved,
        }
    }

    /// Encode as the 2-bit marker.
    pub fn bits(self) -> u8 {
        match self {
            Self::None => 0,
            Self::Reserved => 1,
            Self::Encrypted => 2,
        }
    }
}

/// A message exchanged with the chip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Message id. Bit 7 marks indications.
    pub id: u8,
    /// Virtual interface the message belongs to (0..=3).
    pub interface: u8,
    /// Sequence number. Stamped by the transmit path, ignored when queued.
    pub seqnum: u8,
    /// How the message travelled on the wire.
    pub encryption: Encryption,
    /// Message body, header excluded.
    pub body: Bytes,
}

impl Envelope {
    /// Create an outgoing message on interface 0.
    pub fn new(id: u8, body: impl Into<Bytes>) -> Self {
        Self {
            id,
            interface: 0,
            seqnum: 0,
            encryption: Encryption::None,
            body: body.into(),
        }
    }

    /// Address the message to another interface.
    pub fn with_interface(mut self, interface: u8) -> Self {
        self.interface = interface & IFACE_MASK;
        self
    }

    /// Whether the message is a chip-to-host indication.
    pub fn is_indication(&self) -> bool {
        ids::is_indication(self.id)
    }

    /// Value of the header length field (header included).
    pub fn msg_len(&self) -> usize {
        HEADER_SIZE + self.body.len()
    }

    /// Cleartext size on the wire, before bus alignment.
    pub fn wire_size(&self) -> usize {
        round_up(self.msg_len(), WORD_ALIGN)
    }
}

/// Result of decoding one receive buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    /// The decoded message.
    pub envelope: Envelope,
    /// The word announcing what the chip holds next.
    pub piggyback: Piggyback,
}

fn flags(interface: u8, seqnum: u8, encryption: Encryption) -> u8 {
    ((interface & IFACE_MASK) << IFACE_SHIFT)
        | ((seqnum & SEQ_MASK) << SEQ_SHIFT)
        | (encryption.bits() << ENC_SHIFT)
}

fn read_len(src: &[u8]) -> usize {
    u16::from_le_bytes([src[0], src[1]]) as usize
}

/// Encode an envelope into the wire format.
///
/// Wire format (cleartext):
/// ```text
/// ┌──────────────┬────────┬─────────────────────────────┬──────────────┐
/// │ Length       │ Id     │ Flags                       │ Body         │
/// │ (2B LE)      │ (1B)   │ rsv:1 iface:2 seq:3 enc:2   │ padded to 2B │
/// └──────────────┴────────┴─────────────────────────────┴──────────────┘
/// ```
///
/// `seqnum` is stamped into the header. If `secure` requires security for
/// the id, the message is wrapped into a freshly allocated secure-link
/// envelope instead of being padded.
pub fn encode_message(
    envelope: &Envelope,
    seqnum: u8,
    secure: Option<&mut (dyn SecureLink + '_)>,
) -> Result<BytesMut> {
    let len = envelope.msg_len();
    if len > MAX_MESSAGE_LEN {
        return Err(FrameError::PayloadTooLarge {
            size: len,
            max: MAX_MESSAGE_LEN,
        });
    }

    let mut dst = BytesMut::with_capacity(round_up(len, WORD_ALIGN));
    dst.put_u16_le(len as u16);
    dst.put_u8(envelope.id);
    dst.put_u8(flags(envelope.interface, seqnum, Encryption::None));
    dst.put_slice(&envelope.body);

    match secure {
        Some(link) if link.requires_security(envelope.id) => {
            let wrapped = link.encode(&dst).map_err(FrameError::EncryptionFailed)?;
            let expected = encrypted_len(len);
            if wrapped.len() != expected {
                return Err(FrameError::EncryptionFailed(CryptoError::Malformed(format!(
                    "envelope is {} bytes, expected {expected}",
                    wrapped.len()
                ))));
            }
            if Encryption::from_bits(wrapped[3] >> ENC_SHIFT) != Encryption::Encrypted {
                return Err(FrameError::EncryptionFailed(CryptoError::Malformed(
                    "encryption marker not set".to_string(),
                )));
            }
            trace!(id = envelope.id, len, wire = expected, "message sealed");
            Ok(BytesMut::from(&wrapped[..]))
        }
        _ => {
            dst.resize(round_up(len, WORD_ALIGN), 0);
            Ok(dst)
        }
    }
}

/// Decode one receive buffer.
///
/// `raw` is the whole buffer read from the bus, bus padding and trailing
/// piggyback word included. `announced_len` is the message length the chip
/// announced through the control register or the previous piggyback.
pub fn decode_message(
    raw: Bytes,
    announced_len: usize,
    secure: Option<&mut (dyn SecureLink + '_)>,
) -> Result<Decoded> {
    if announced_len < HEADER_SIZE {
        return Err(FrameError::TooShort {
            len: announced_len,
            min: HEADER_SIZE,
        });
    }
    if raw.len() < announced_len + PIGGYBACK_SIZE {
        return Err(FrameError::TooShort {
            len: raw.len(),
            min: announced_len + PIGGYBACK_SIZE,
        });
    }

    let piggyback = Piggyback::from_tail(&raw).unwrap_or_default();
    let marker = (raw[3] >> ENC_SHIFT) & ENC_MASK;

    let (plain, encryption, computed) = match Encryption::from_bits(marker) {
        Encryption::Reserved => return Err(FrameError::ReservedEncryption(marker)),
        Encryption::Encrypted => {
            let link = secure.ok_or(FrameError::DecryptionFailed(CryptoError::NoSession))?;
            let plain = link
                .decode(&raw[..announced_len])
                .map_err(FrameError::DecryptionFailed)?;
            if plain.len() < HEADER_SIZE {
                return Err(FrameError::TooShort {
                    len: plain.len(),
                    min: HEADER_SIZE,
                });
            }
            let len = read_len(&plain);
            trace!(announced = announced_len, len, "message opened");
            (Bytes::from(plain), Encryption::Encrypted, encrypted_len(len))
        }
        Encryption::None => {
            let len = read_len(&raw);
            (raw.slice(..announced_len), Encryption::None, round_up(len, WORD_ALIGN))
        }
    };

    if computed != announced_len {
        return Err(FrameError::LengthMismatch {
            computed,
            announced: announced_len,
        });
    }

    let len = read_len(&plain);
    if len < HEADER_SIZE || len > plain.len() {
        return Err(FrameError::TooShort {
            len: plain.len(),
            min: len.max(HEADER_SIZE),
        });
    }

    let flags = plain[3];
    let envelope = Envelope {
        id: plain[2],
        interface: (flags >> IFACE_SHIFT) & IFACE_MASK,
        seqnum: (flags >> SEQ_SHIFT) & SEQ_MASK,
        encryption,
        body: plain.slice(HEADER_SIZE..len),
    };

    Ok(Decoded {
        envelope,
        piggyback,
    })
}
