//! Transmit pump.

use std::sync::Arc;

use tracing::{debug, error};
use wfxlink_frame::{encode_message, message_name};

use crate::link::Link;

impl Link {
    /// Write up to `max_messages` queued messages to the chip.
    ///
    /// Each message takes one credit and the next transmit sequence number.
    /// A message that fails to encode is dropped and gives its credit back.
    /// A failed bus write keeps the credit and ends the pass. The bus is
    /// locked for one write at a time.
    ///
    /// Returns the number of messages written.
    pub fn tx_pump(&mut self, max_messages: usize) -> usize {
        let shared = Arc::clone(&self.shared);
        let mut sent = 0;

        while sent < max_messages {
            if !shared.credits.try_reserve() {
                break;
            }
            let Some(envelope) = shared.queue.pop_next() else {
                shared.credits.unreserve();
                break;
            };
            let id = envelope.id;

            let seqnum = self.seq.tx_seq();
            let mut frame = match encode_message(&envelope, seqnum, self.secure.as_deref_mut()) {
                Ok(frame) => frame,
                Err(err) => {
                    error!(
                        id = format_args!("{id:#04x}"),
                        error = %err,
                        "dropping message that failed to encode"
                    );
                    shared.credits.unreserve();
                    self.stats.encode_failures += 1;
                    continue;
                }
            };
            self.seq.next_tx_seq();

            let written = {
                let mut bus = shared.lock_bus();
                let aligned = bus.align_size(frame.len());
                frame.resize(aligned, 0);
                bus.write(&frame)
            };
            if let Err(err) = written {
                error!(
                    id = format_args!("{id:#04x}"),
                    error = %err,
                    "bus write failed, aborting transmit"
                );
                self.stats.bus_errors += 1;
                break;
            }

            debug!(
                id = format_args!("{id:#04x}"),
                name = message_name(id),
                seq = seqnum,
                len = frame.len(),
                "message sent"
            );
            sent += 1;
        }
        sent
    }
}
