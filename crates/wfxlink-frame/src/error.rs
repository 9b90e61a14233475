/// Errors reported by the external secure-link collaborator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CryptoError {
    /// No secure-link session has been negotiated.
    #[error("no secure link session")]
    NoSession,

    /// The authentication tag did not verify.
    #[error("authentication tag mismatch")]
    TagMismatch,

    /// The encrypted envelope is malformed.
    #[error("malformed secure link envelope: {0}")]
    Malformed(String),
}

/// Errors that can occur while framing or unframing a message.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The buffer is too short to hold what it claims to hold.
    #[error("message too short ({len} bytes, need {min})")]
    TooShort { len: usize, min: usize },

    /// The encryption field carries a reserved value.
    #[error("reserved encryption marker {0:#x}")]
    ReservedEncryption(u8),

    /// The length computed from the header disagrees with the bus.
    #[error("inconsistent message length: computed {computed}, announced {announced}")]
    LengthMismatch { computed: usize, announced: usize },

    /// The secure-link collaborator rejected an incoming message.
    #[error("secure link decode failed: {0}")]
    DecryptionFailed(#[source] CryptoError),

    /// The secure-link collaborator failed to wrap an outgoing message.
    #[error("secure link encode failed: {0}")]
    EncryptionFailed(#[source] CryptoError),

    /// The message does not fit the 16-bit length field.
    #[error("message too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// A confirmation body is shorter than its fixed layout.
    #[error("body of message {id:#04x} truncated ({len} bytes, need {need})")]
    TruncatedBody { id: u8, len: usize, need: usize },
}

pub type Result<T> = std::result::Result<T, FrameError>;
