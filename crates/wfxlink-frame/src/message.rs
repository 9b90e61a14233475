use crate::codec::Envelope;
use crate::error::{FrameError, Result};
use crate::ids::{self, MULTI_TRANSMIT_CNF_ID};

/// Size of the `NumTxConfs` field leading a multi-transmit confirmation.
const NUM_TX_CONFS_SIZE: usize = 4;

/// A decoded chip-to-host message, classified by id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Reply to one host request. Returns one credit.
    Confirmation(Envelope),
    /// Reply acknowledging several transmit requests at once.
    MultiTransmitConfirmation(MultiTxConfirmation),
    /// Unsolicited event.
    Indication(Envelope),
    /// Firmware exception or error report. Carries no sequence obligation.
    Exception(Envelope),
}

/// Confirmation covering a batch of transmit requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiTxConfirmation {
    envelope: Envelope,
    num_tx_confs: u32,
}

impl MultiTxConfirmation {
    /// Number of transmit requests acknowledged (and credits returned).
    pub fn num_tx_confs(&self) -> u32 {
        self.num_tx_confs
    }

    /// The underlying message.
    pub fn envelope(&self) -> &Envelope {
        &self.envelope
    }
}

impl Message {
    /// Classify a decoded envelope.
    ///
    /// Fails only when a multi-transmit confirmation is too short to carry
    /// its count.
    pub fn classify(envelope: Envelope) -> Result<Self> {
        if ids::is_sequence_exempt(envelope.id) {
            return Ok(Self::Exception(envelope));
        }
        if envelope.is_indication() {
            return Ok(Self::Indication(envelope));
        }
        if envelope.id != MULTI_TRANSMIT_CNF_ID {
            return Ok(Self::Confirmation(envelope));
        }

        let body = &envelope.body;
        if body.len() < NUM_TX_CONFS_SIZE {
            return Err(FrameError::TruncatedBody {
                id: envelope.id,
                len: body.len(),
                need: NUM_TX_CONFS_SIZE,
            });
        }
        let num_tx_confs = u32::from_le_bytes([body[0], body[1], body[2], body[3]]);
        Ok(Self::MultiTransmitConfirmation(MultiTxConfirmation {
            envelope,
            num_tx_confs,
        }))
    }

    /// Borrow the underlying envelope.
    pub fn envelope(&self) -> &Envelope {
        match self {
            Self::Confirmation(env) | Self::Indication(env) | Self::Exception(env) => env,
            Self::MultiTransmitConfirmation(cnf) => &cnf.envelope,
        }
    }

    /// Take the underlying envelope.
    pub fn into_envelope(self) -> Envelope {
        match self {
            Self::Confirmation(env) | Self::Indication(env) | Self::Exception(env) => env,
            Self::MultiTransmitConfirmation(cnf) => cnf.envelope,
        }
    }

    /// Message id.
    pub fn id(&self) -> u8 {
        self.envelope().id
    }

    /// Whether this is a reply to host requests.
    pub fn is_confirmation(&self) -> bool {
        matches!(
            self,
            Self::Confirmation(_) | Self::MultiTransmitConfirmation(_)
        )
    }

    /// Whether the receive sequence check applies to this message.
    pub fn is_sequence_exempt(&self) -> bool {
        matches!(self, Self::Exception(_))
    }

    /// Credits this message returns to the host, if it is a confirmation.
    pub fn credits_returned(&self) -> Option<u32> {
        match self {
            Self::Confirmation(_) => Some(1),
            Self::MultiTransmitConfirmation(cnf) => Some(cnf.num_tx_confs()),
            Self::Indication(_) | Self::Exception(_) => None,
        }
    }
}
