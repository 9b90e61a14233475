//! Transmit and receive sequence counters.

/// A received sequence number did not match the expected one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("wrong message sequence: received {received}, expected {expected}")]
pub struct SequenceMismatch {
    pub expected: u8,
    pub received: u8,
}

/// Two independent counters in `[0, max]`, wrapping to 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceTracker {
    tx: u8,
    rx: u8,
    max: u8,
}

impl SequenceTracker {
    pub fn new(max: u8) -> Self {
        Self { tx: 0, rx: 0, max }
    }

    fn wrap(&self, value: u8) -> u8 {
        ((u16::from(value) + 1) % (u16::from(self.max) + 1)) as u8
    }

    /// Sequence number the next transmitted message will carry.
    pub fn tx_seq(&self) -> u8 {
        self.tx
    }

    /// Sequence number expected on the next received message.
    pub fn expected_rx(&self) -> u8 {
        self.rx
    }

    /// Return the current transmit sequence number and advance.
    pub fn next_tx_seq(&mut self) -> u8 {
        let current = self.tx;
        self.tx = self.wrap(current);
        current
    }

    /// Check a received sequence number and advance the expectation.
    ///
    /// On mismatch the counter still resynchronizes on `received`. Exempt
    /// messages leave the counter untouched.
    pub fn validate_and_advance_rx_seq(
        &mut self,
        received: u8,
        exempt: bool,
    ) -> Result<(), SequenceMismatch> {
        if exempt {
            return Ok(());
        }
        let expected = self.rx;
        self.rx = self.wrap(received);
        if received != expected {
            return Err(SequenceMismatch { expected, received });
        }
        Ok(())
    }
}

impl Default for SequenceTracker {
    fn default() -> Self {
        Self::new(wfxlink_frame::SEQ_COUNTER_MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tx_wraps_modulo_max_plus_one() {
        for max in [1u8, 3, 7, 255] {
            let mut seq = SequenceTracker::new(max);
            let mut prev = seq.next_tx_seq();
            assert_eq!(prev, 0);
            for _ in 0..600 {
                let next = seq.next_tx_seq();
                assert_eq!(u16::from(next), (u16::from(prev) + 1) % (u16::from(max) + 1));
                prev = next;
            }
        }
    }

    #[test]
    fn rx_in_order() {
        let mut seq = SequenceTracker::default();
        for i in 0..8 {
            seq.validate_and_advance_rx_seq(i, false).unwrap();
        }
        assert_eq!(seq.expected_rx(), 0);
    }

    #[test]
    fn rx_wraps_after_max() {
        let mut seq = SequenceTracker::new(7);
        seq.validate_and_advance_rx_seq(5, true).unwrap();
        seq.rx = 6;
        seq.validate_and_advance_rx_seq(6, false).unwrap();
        assert_eq!(seq.expected_rx(), 7);
        seq.validate_and_advance_rx_seq(7, false).unwrap();
        assert_eq!(seq.expected_rx(), 0);
    }

    #[test]
    fn rx_mismatch_resynchronizes() {
        let mut seq = SequenceTracker::default();
        let err = seq.validate_and_advance_rx_seq(3, false).unwrap_err();
        assert_eq!(
            err,
            SequenceMismatch {
                expected: 0,
                received: 3
            }
        );
        assert_eq!(seq.expected_rx(), 4);
        seq.validate_and_advance_rx_seq(4, false).unwrap();
    }

    #[test]
    fn exempt_leaves_expectation() {
        let mut seq = SequenceTracker::default();
        seq.validate_and_advance_rx_seq(0, false).unwrap();
        seq.validate_and_advance_rx_seq(6, true).unwrap();
        assert_eq!(seq.expected_rx(), 1);
    }
}
