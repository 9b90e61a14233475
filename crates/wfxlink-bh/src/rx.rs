//! Receive pump.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, error, warn};
use wfxlink_bus::next_len_bytes;
use wfxlink_frame::{
    decode_message, hex_dump, message_name, FrameError, Message, Piggyback, PIGGYBACK_SIZE,
};

use crate::error::{BhError, Result};
use crate::link::Link;

impl Link {
    /// Read up to `max_messages` messages from the chip.
    ///
    /// The first length comes from the latched control register snapshot,
    /// the following ones from the piggyback word of the previous message.
    /// Confirmations bump `num_cnf` and return their credits. Any framing,
    /// allocation or bus error ends the pass early.
    ///
    /// The bus is locked only for each transfer; decoding and dispatch run
    /// with it released so an interrupt can latch the control register
    /// meanwhile. A snapshot latched that way is left alone while the
    /// piggyback chain is active.
    ///
    /// Returns the number of messages read and dispatched.
    pub fn rx_pump(&mut self, max_messages: usize, num_cnf: &mut usize) -> usize {
        let shared = Arc::clone(&self.shared);
        let mut piggyback = Piggyback::default();
        let mut done = 0;

        while done < max_messages {
            let ctrl = if piggyback.has_next() {
                piggyback.as_control()
            } else if shared.ctrl_ready.try_wait() {
                shared.ctrl_reg.swap(0, Ordering::AcqRel)
            } else {
                0
            };
            let len = next_len_bytes(ctrl);
            if len == 0 {
                return done;
            }

            piggyback = match self.receive_one(len, num_cnf) {
                Ok(piggyback) => piggyback,
                Err(err) => {
                    self.record_rx_error(&err);
                    return done;
                }
            };
            done += 1;
            if !piggyback.is_ready() {
                error!(
                    piggyback = format_args!("{:#06x}", piggyback.raw()),
                    "unexpected piggyback value: ready bit not set"
                );
            }
        }

        if piggyback.has_next() {
            let prev = shared.ctrl_reg.swap(piggyback.as_control(), Ordering::AcqRel);
            shared.ctrl_ready.complete();
            if prev != 0 {
                error!(
                    prev = format_args!("{prev:#06x}"),
                    piggyback = format_args!("{:#06x}", piggyback.raw()),
                    "unexpected IRQ happened"
                );
            }
        }
        done
    }

    /// Allocate the transfer buffer and read one message plus its piggyback.
    fn read_transfer(&self, read_len: usize) -> Result<Bytes> {
        let mut bus = self.shared.lock_bus();
        let alloc_len = bus.align_size(read_len + PIGGYBACK_SIZE);
        let mut buf = Vec::new();
        buf.try_reserve_exact(alloc_len)
            .map_err(|_| BhError::OutOfMemory { len: alloc_len })?;
        buf.resize(alloc_len, 0);
        bus.read(&mut buf)?;
        Ok(Bytes::from(buf))
    }

    fn receive_one(&mut self, read_len: usize, num_cnf: &mut usize) -> Result<Piggyback> {
        let raw = self.read_transfer(read_len)?;

        let (message, piggyback) = match self.decode(raw.clone(), read_len) {
            Ok(decoded) => decoded,
            Err(err) => {
                let end = read_len.min(raw.len());
                error!(
                    announced = read_len,
                    error = %err,
                    "dropping malformed message\n{}",
                    hex_dump(&raw[..end])
                );
                return Err(err.into());
            }
        };

        let envelope = message.envelope();
        let (id, seqnum) = (envelope.id, envelope.seqnum);
        debug!(
            id = format_args!("{id:#04x}"),
            name = message_name(id),
            seq = seqnum,
            len = envelope.msg_len(),
            "message received"
        );

        if let Err(mismatch) = self
            .seq
            .validate_and_advance_rx_seq(seqnum, message.is_sequence_exempt())
        {
            warn!(
                expected = mismatch.expected,
                received = mismatch.received,
                "wrong message sequence"
            );
            self.stats.seq_mismatches += 1;
        }

        if let Some(count) = message.credits_returned() {
            *num_cnf += 1;
            if let Err(err) = self.shared.credits.release(count) {
                error!(
                    id = format_args!("{id:#04x}"),
                    error = %err,
                    "corrupted buffer counter"
                );
                self.stats.credit_underflows += 1;
            }
        }

        self.handler.dispatch(message);
        Ok(piggyback)
    }

    fn decode(
        &mut self,
        raw: Bytes,
        read_len: usize,
    ) -> std::result::Result<(Message, Piggyback), FrameError> {
        let decoded = decode_message(raw, read_len, self.secure.as_deref_mut())?;
        Ok((Message::classify(decoded.envelope)?, decoded.piggyback))
    }

    fn record_rx_error(&mut self, err: &BhError) {
        match err {
            BhError::Frame(_) => self.stats.frame_errors += 1,
            BhError::OutOfMemory { len } => {
                error!(len, "cannot allocate receive buffer");
                self.stats.alloc_failures += 1;
            }
            other => {
                error!(error = %other, "receive aborted");
                self.stats.bus_errors += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use wfxlink_frame::ids::{
        ERROR_IND_ID, EVENT_IND_ID, EXCEPTION_IND_ID, MULTI_TRANSMIT_CNF_ID, RX_IND_ID, TX_ID,
    };
    use std::sync::{OnceLock, Weak};

    use wfxlink_bus::{HwBus, SimBus, SimChip, CTRL_NEXT_LEN_MASK, CTRL_WLAN_READY};
    use wfxlink_frame::Envelope;

    use crate::link::testing::{chip_message, Fixture};
    use crate::link::LinkShared;

    use super::*;

    /// Control value announcing the largest possible message.
    const BOGUS_CTRL: u32 = CTRL_WLAN_READY | CTRL_NEXT_LEN_MASK;

    /// Latches [`BOGUS_CTRL`] during the second read, as an interrupt
    /// racing the pump would.
    struct LatchOnRead {
        inner: SimBus,
        reads: usize,
        shared: Arc<OnceLock<Weak<LinkShared>>>,
    }

    impl HwBus for LatchOnRead {
        fn align_size(&self, len: usize) -> usize {
            self.inner.align_size(len)
        }

        fn read(&mut self, buf: &mut [u8]) -> wfxlink_bus::Result<()> {
            self.inner.read(buf)?;
            self.reads += 1;
            if self.reads == 2 {
                if let Some(shared) = self.shared.get().and_then(Weak::upgrade) {
                    shared.ctrl_reg.store(BOGUS_CTRL, Ordering::Release);
                    shared.ctrl_ready.complete();
                }
            }
            Ok(())
        }

        fn write(&mut self, buf: &[u8]) -> wfxlink_bus::Result<()> {
            self.inner.write(buf)
        }

        fn read_control(&mut self) -> wfxlink_bus::Result<u32> {
            self.inner.read_control()
        }
    }

    /// Asks for a buffer no allocator can provide.
    struct Unallocatable(SimBus);

    impl HwBus for Unallocatable {
        fn align_size(&self, _len: usize) -> usize {
            usize::MAX
        }

        fn read(&mut self, buf: &mut [u8]) -> wfxlink_bus::Result<()> {
            self.0.read(buf)
        }

        fn write(&mut self, buf: &[u8]) -> wfxlink_bus::Result<()> {
            self.0.write(buf)
        }

        fn read_control(&mut self) -> wfxlink_bus::Result<u32> {
            self.0.read_control()
        }
    }

    fn reserve(fx: &Fixture, n: u32) {
        for _ in 0..n {
            assert!(fx.link.credits().try_reserve());
        }
    }

    #[test]
    fn nothing_latched_reads_nothing() {
        let mut fx = Fixture::new(4, 2);
        fx.chip.push(chip_message(EVENT_IND_ID, 0, &[1, 2]));
        let mut cnf = 0;
        assert_eq!(fx.link.rx_pump(32, &mut cnf), 0);
        assert_eq!(fx.chip.pending(), 1);
    }

    #[test]
    fn single_confirmation_returns_credit() {
        let mut fx = Fixture::new(4, 2);
        reserve(&fx, 1);
        fx.deliver(chip_message(TX_ID, 0, &[0, 0, 0, 0]));

        let mut cnf = 0;
        assert_eq!(fx.link.rx_pump(1, &mut cnf), 1);
        assert_eq!(cnf, 1);
        assert_eq!(fx.link.credits().used(), 0);

        let received = fx.take_received();
        assert_eq!(received.len(), 1);
        assert!(matches!(received[0], Message::Confirmation(_)));
        assert_eq!(received[0].envelope().body.len(), 4);
    }

    #[test]
    fn piggyback_drives_following_reads() {
        let mut fx = Fixture::new(4, 4);
        fx.deliver(chip_message(RX_IND_ID, 0, &[1; 10]));
        fx.chip.push(chip_message(RX_IND_ID, 1, &[2; 3]));
        fx.chip.push(chip_message(EVENT_IND_ID, 2, &[]));

        let mut cnf = 0;
        assert_eq!(fx.link.rx_pump(32, &mut cnf), 3);
        assert_eq!(cnf, 0);
        assert_eq!(fx.chip.pending(), 0);
        assert_eq!(fx.link.shared.ctrl_reg.load(Ordering::Acquire), 0);
        assert!(!fx.link.shared.ctrl_ready.is_done());

        let bodies: Vec<usize> = fx
            .take_received()
            .iter()
            .map(|m| m.envelope().body.len())
            .collect();
        assert_eq!(bodies, vec![10, 3, 0]);
        assert_eq!(fx.link.sequence().expected_rx(), 3);
    }

    #[test]
    fn piggyback_chain_ignores_snapshot_latched_mid_batch() {
        let chip = SimChip::new();
        let slot = Arc::new(OnceLock::new());
        let bus = LatchOnRead {
            inner: chip.bus(2),
            reads: 0,
            shared: Arc::clone(&slot),
        };
        let mut fx = Fixture::with_bus(chip, bus, 4);
        slot.set(Arc::downgrade(&fx.link.shared)).unwrap();

        fx.deliver(chip_message(RX_IND_ID, 0, &[1; 10]));
        fx.chip.push(chip_message(RX_IND_ID, 1, &[2; 6]));
        fx.chip.push(chip_message(EVENT_IND_ID, 2, &[]));

        // Reads two and three follow the piggyback, not the new snapshot.
        let mut cnf = 0;
        assert_eq!(fx.link.rx_pump(3, &mut cnf), 3);
        let bodies: Vec<usize> = fx
            .take_received()
            .iter()
            .map(|m| m.envelope().body.len())
            .collect();
        assert_eq!(bodies, vec![10, 6, 0]);
        assert_eq!(fx.link.stats().frame_errors, 0);
        assert_eq!(fx.link.stats().bus_errors, 0);
        assert_eq!(fx.link.shared.ctrl_reg.load(Ordering::Acquire), BOGUS_CTRL);
        assert!(fx.link.shared.ctrl_ready.is_done());

        // Once the chain has ended the snapshot is consumed as announced.
        assert_eq!(fx.link.rx_pump(32, &mut cnf), 0);
        assert_eq!(fx.link.stats().bus_errors, 1);
        assert_eq!(fx.link.shared.ctrl_reg.load(Ordering::Acquire), 0);
        assert!(!fx.link.shared.ctrl_ready.is_done());
    }

    #[test]
    fn interrupt_during_dispatch_latches_without_blocking() {
        let chip = SimChip::new();
        let slot: Arc<OnceLock<Weak<LinkShared>>> = Arc::new(OnceLock::new());
        let latches = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let handler = {
            let slot = Arc::clone(&slot);
            let latches = Arc::clone(&latches);
            move |_msg: Message| {
                if let Some(shared) = slot.get().and_then(Weak::upgrade) {
                    shared.request_receive().unwrap();
                    latches.fetch_add(1, Ordering::AcqRel);
                }
            }
        };
        let mut link = Link::new(
            chip.bus(2),
            Arc::new(crate::queue::OutboundQueue::new()),
            handler,
            crate::config::ChipCaps::new(4, (3, 12)),
        );
        slot.set(Arc::downgrade(&link.shared)).unwrap();
        chip.push(chip_message(EVENT_IND_ID, 0, &[1, 2]));
        link.request_receive().unwrap();

        let mut cnf = 0;
        assert_eq!(link.rx_pump(32, &mut cnf), 1);
        assert_eq!(latches.load(Ordering::Acquire), 1);
        // The ready-only value latched from the handler ends the pass.
        assert_eq!(link.shared.ctrl_reg.load(Ordering::Acquire), 0);
        assert!(!link.shared.ctrl_ready.is_done());
        assert_eq!(link.stats().bus_errors, 0);
    }

    #[test]
    fn allocation_failure_ends_pass_untouched() {
        let chip = SimChip::new();
        let bus = Unallocatable(chip.bus(2));
        let mut fx = Fixture::with_bus(chip, bus, 4);
        reserve(&fx, 1);
        fx.deliver(chip_message(TX_ID, 0, &[0; 4]));

        let mut cnf = 0;
        assert_eq!(fx.link.rx_pump(32, &mut cnf), 0);
        assert_eq!(cnf, 0);
        assert_eq!(fx.link.stats().alloc_failures, 1);
        assert_eq!(fx.link.stats().bus_errors, 0);
        assert_eq!(fx.chip.pending(), 1);
        assert_eq!(fx.link.credits().used(), 1);
        assert_eq!(fx.link.sequence().expected_rx(), 0);
        assert!(fx.take_received().is_empty());
    }

    #[test]
    fn batch_limit_relatches_piggyback() {
        let mut fx = Fixture::new(4, 2);
        fx.deliver(chip_message(EVENT_IND_ID, 0, &[]));
        fx.chip.push(chip_message(EVENT_IND_ID, 1, &[0; 6]));
        fx.chip.push(chip_message(EVENT_IND_ID, 2, &[]));

        let mut cnf = 0;
        assert_eq!(fx.link.rx_pump(2, &mut cnf), 2);
        let latched = fx.link.shared.ctrl_reg.load(Ordering::Acquire);
        assert_eq!(next_len_bytes(latched), 4);
        assert!(fx.link.shared.ctrl_ready.is_done());

        assert_eq!(fx.link.rx_pump(2, &mut cnf), 1);
        assert_eq!(fx.link.shared.ctrl_reg.load(Ordering::Acquire), 0);
        assert_eq!(fx.take_received().len(), 3);
    }

    #[test]
    fn length_mismatch_aborts_without_side_effects() {
        let mut fx = Fixture::new(4, 2);
        reserve(&fx, 1);
        // Header claims 14 bytes, the chip announces 16.
        let mut raw = chip_message(TX_ID, 0, &[0; 10]);
        assert_eq!(raw[0], 14);
        raw.extend_from_slice(&[0, 0]);
        fx.deliver(raw);
        fx.chip.push(chip_message(TX_ID, 1, &[]));

        let mut cnf = 0;
        assert_eq!(fx.link.rx_pump(32, &mut cnf), 0);
        assert_eq!(cnf, 0);
        assert_eq!(fx.link.credits().used(), 1);
        assert_eq!(fx.link.sequence().expected_rx(), 0);
        assert!(fx.take_received().is_empty());
        assert_eq!(fx.link.stats().frame_errors, 1);
    }

    #[test]
    fn reserved_encryption_is_rejected() {
        let mut fx = Fixture::new(4, 2);
        let mut raw = chip_message(EVENT_IND_ID, 0, &[0; 4]);
        raw[3] |= 0b01 << 6;
        fx.deliver(raw);

        let mut cnf = 0;
        assert_eq!(fx.link.rx_pump(32, &mut cnf), 0);
        assert_eq!(fx.link.stats().frame_errors, 1);
    }

    #[test]
    fn encrypted_message_without_session_is_dropped() {
        let mut fx = Fixture::new(4, 2);
        let mut raw = chip_message(EVENT_IND_ID, 0, &[0; 4]);
        raw[3] |= 0b10 << 6;
        fx.deliver(raw);

        let mut cnf = 0;
        assert_eq!(fx.link.rx_pump(32, &mut cnf), 0);
        assert_eq!(fx.link.stats().frame_errors, 1);
    }

    #[test]
    fn sequence_mismatch_resynchronizes() {
        let mut fx = Fixture::new(4, 2);
        fx.deliver(chip_message(EVENT_IND_ID, 3, &[]));
        fx.chip.push(chip_message(EVENT_IND_ID, 4, &[]));

        let mut cnf = 0;
        assert_eq!(fx.link.rx_pump(32, &mut cnf), 2);
        assert_eq!(fx.link.stats().seq_mismatches, 1);
        assert_eq!(fx.link.sequence().expected_rx(), 5);
    }

    #[test]
    fn fault_reports_skip_sequence_check() {
        let mut fx = Fixture::new(4, 2);
        fx.deliver(chip_message(EXCEPTION_IND_ID, 6, &[0; 8]));
        fx.chip.push(chip_message(ERROR_IND_ID, 2, &[0; 4]));
        fx.chip.push(chip_message(EVENT_IND_ID, 0, &[]));

        let mut cnf = 0;
        assert_eq!(fx.link.rx_pump(32, &mut cnf), 3);
        assert_eq!(fx.link.stats().seq_mismatches, 0);
        assert_eq!(fx.link.sequence().expected_rx(), 1);
        let received = fx.take_received();
        assert!(received[0].is_sequence_exempt());
        assert!(received[1].is_sequence_exempt());
    }

    #[test]
    fn multi_transmit_confirmation_releases_batch() {
        let mut fx = Fixture::new(8, 2);
        reserve(&fx, 5);
        let mut body = 3u32.to_le_bytes().to_vec();
        body.extend_from_slice(&[0; 12]);
        fx.deliver(chip_message(MULTI_TRANSMIT_CNF_ID, 0, &body));

        let mut cnf = 0;
        assert_eq!(fx.link.rx_pump(32, &mut cnf), 1);
        assert_eq!(cnf, 1);
        assert_eq!(fx.link.credits().used(), 2);
    }

    #[test]
    fn truncated_multi_transmit_confirmation_is_framing_error() {
        let mut fx = Fixture::new(8, 2);
        reserve(&fx, 1);
        fx.deliver(chip_message(MULTI_TRANSMIT_CNF_ID, 0, &[1, 0]));

        let mut cnf = 0;
        assert_eq!(fx.link.rx_pump(32, &mut cnf), 0);
        assert_eq!(fx.link.credits().used(), 1);
        assert_eq!(fx.link.stats().frame_errors, 1);
    }

    #[test]
    fn credit_underflow_is_counted_not_fatal() {
        let mut fx = Fixture::new(4, 2);
        fx.deliver(chip_message(TX_ID, 0, &[]));
        fx.chip.push(chip_message(EVENT_IND_ID, 1, &[]));

        let mut cnf = 0;
        assert_eq!(fx.link.rx_pump(32, &mut cnf), 2);
        assert_eq!(cnf, 1);
        assert_eq!(fx.link.credits().used(), 0);
        assert_eq!(fx.link.stats().credit_underflows, 1);
        assert_eq!(fx.take_received().len(), 2);
    }

    #[test]
    fn bus_read_failure_aborts() {
        let mut fx = Fixture::new(4, 2);
        fx.deliver(chip_message(EVENT_IND_ID, 0, &[]));
        fx.chip.fail_next_reads(1);

        let mut cnf = 0;
        assert_eq!(fx.link.rx_pump(32, &mut cnf), 0);
        assert_eq!(fx.link.stats().bus_errors, 1);
        assert_eq!(fx.chip.pending(), 1);
    }

    #[test]
    fn missing_ready_bit_is_not_fatal() {
        let mut fx = Fixture::new(4, 2);
        // A wake line that is low keeps the ready bit clear.
        let _pin = fx.chip.wake_pin();
        fx.deliver(chip_message(EVENT_IND_ID, 0, &[]));
        fx.chip.push(chip_message(EVENT_IND_ID, 1, &[]));

        let mut cnf = 0;
        assert_eq!(fx.link.rx_pump(32, &mut cnf), 2);
    }

    #[test]
    fn dispatch_owns_decoded_body() {
        let mut fx = Fixture::new(4, 2);
        fx.deliver(chip_message(RX_IND_ID, 0, b"payload!"));
        let mut cnf = 0;
        fx.link.rx_pump(32, &mut cnf);
        let msg = fx.take_received().pop().unwrap();
        let envelope: Envelope = msg.into_envelope();
        assert_eq!(envelope.body.as_ref(), b"payload!");
        assert_eq!(envelope.id, RX_IND_ID);
    }
}
