//! Secure-link envelope.
//!
//! Encrypted messages keep the 2-byte length field outside the cipher. The
//! rest of the message is padded to the cipher block size and wrapped with a
//! 6-byte secure header in front and a 16-byte authentication tag behind.
//! The cipher itself lives behind [`SecureLink`].

use wfxlink_bus::round_up;

use crate::codec::LEN_FIELD_SIZE;
use crate::error::CryptoError;

/// Secure header: 30-bit counter plus 2-bit marker, then the plaintext length.
pub const SL_HEADER_SIZE: usize = 6;

/// Authentication tag appended after the ciphertext.
pub const SL_TAG_SIZE: usize = 16;

/// Cipher block size the encrypted region is padded to.
pub const SL_BLOCK_SIZE: usize = 16;

/// On-wire size of a message of `plain_len` bytes once encrypted.
pub fn encrypted_len(plain_len: usize) -> usize {
    round_up(plain_len.saturating_sub(LEN_FIELD_SIZE), SL_BLOCK_SIZE) + SL_HEADER_SIZE + SL_TAG_SIZE
}

/// Link-encryption transform negotiated with the chip.
pub trait SecureLink: Send {
    /// Whether messages with this id must be sent encrypted.
    fn requires_security(&self, id: u8) -> bool;

    /// Wrap a complete cleartext message (header included).
    ///
    /// Must return exactly [`encrypted_len`] bytes with the encryption marker
    /// set in the position of the cleartext flags.
    fn encode(&mut self, plain: &[u8]) -> Result<Vec<u8>, CryptoError>;

    /// Unwrap an encrypted message, returning the cleartext message.
    fn decode(&mut self, raw: &[u8]) -> Result<Vec<u8>, CryptoError>;
}

impl<T: SecureLink + ?Sized> SecureLink for Box<T> {
    fn requires_security(&self, id: u8) -> bool {
        (**self).requires_security(id)
    }

    fn encode(&mut self, plain: &[u8]) -> Result<Vec<u8>, CryptoError> {
        (**self).encode(plain)
    }

    fn decode(&mut self, raw: &[u8]) -> Result<Vec<u8>, CryptoError> {
        (**self).decode(raw)
    }
}
