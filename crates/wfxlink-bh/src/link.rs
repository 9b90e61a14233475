//! The per-chip link context and the bottom-half scheduler.
//!
//! A [`Link`] is the sole owner of the protocol state for one chip. The
//! state other threads need to reach (control snapshot, credits, work
//! signal, bus) lives in [`LinkShared`] behind an `Arc`; everything else is
//! touched only by whoever drives [`Link::run`].

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, error, warn};
use wfxlink_bus::{is_ready, next_len_bytes, HwBus, WakePin};
use wfxlink_frame::SecureLink;

use crate::completion::Completion;
use crate::config::{ChipCaps, LinkConfig};
use crate::credit::CreditCounter;
use crate::error::{BhError, Result};
use crate::handler::MessageHandler;
use crate::queue::TxQueue;
use crate::sequence::SequenceTracker;
use crate::stats::{BhStats, RunReport};
use crate::wake::WakeController;
use crate::worker::WorkSignal;

/// Firmware API versions before this one have no wakeup acknowledgment.
const WAKE_ACK_API: (u8, u8) = (1, 4);

pub(crate) struct LinkShared {
    bus: Mutex<Box<dyn HwBus>>,
    /// Control register snapshot latched by the interrupt side.
    pub(crate) ctrl_reg: AtomicU32,
    /// Signaled whenever `ctrl_reg` holds something to read.
    pub(crate) ctrl_ready: Completion,
    pub(crate) credits: CreditCounter,
    pub(crate) scan_in_progress: AtomicBool,
    pub(crate) signal: WorkSignal,
    pub(crate) queue: Arc<dyn TxQueue>,
    /// Bumped from interrupt context, folded into [`BhStats`] by each run.
    spurious_irqs: AtomicU64,
}

impl LinkShared {
    pub(crate) fn lock_bus(&self) -> MutexGuard<'_, Box<dyn HwBus>> {
        self.bus.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Interrupt entry point: latch the control register and schedule a run.
    pub(crate) fn request_receive(&self) -> Result<()> {
        if self.signal.is_closed() {
            return Err(BhError::Shutdown);
        }
        let cur = self.lock_bus().read_control()?;
        let prev = self.ctrl_reg.swap(cur, Ordering::AcqRel);
        self.ctrl_ready.complete();
        self.signal.raise();

        if next_len_bytes(cur) == 0 {
            if is_ready(cur) {
                debug!(ctrl = format_args!("{cur:#06x}"), "chip acknowledged wakeup");
            } else {
                error!(
                    ctrl = format_args!("{cur:#06x}"),
                    "unexpected control register value: length field is 0"
                );
                self.spurious_irqs.fetch_add(1, Ordering::Relaxed);
            }
        }
        if prev != 0 {
            error!(
                prev = format_args!("{prev:#06x}"),
                cur = format_args!("{cur:#06x}"),
                "received IRQ but previous data was not read yet"
            );
        }
        Ok(())
    }

    /// Schedule a run to drain the outbound queue.
    pub(crate) fn request_transmit(&self) -> Result<()> {
        if self.signal.raise() {
            Ok(())
        } else {
            Err(BhError::Shutdown)
        }
    }

    /// Nothing queued and every credit returned.
    pub(crate) fn is_drained(&self) -> bool {
        self.queue.is_empty() && self.credits.used() == 0
    }
}

/// Protocol state for one chip.
pub struct Link {
    pub(crate) shared: Arc<LinkShared>,
    pub(crate) seq: SequenceTracker,
    wake: WakeController,
    pub(crate) secure: Option<Box<dyn SecureLink>>,
    pub(crate) handler: Box<dyn MessageHandler>,
    caps: ChipCaps,
    config: LinkConfig,
    pub(crate) stats: BhStats,
}

impl Link {
    /// Create a link over `bus`.
    ///
    /// Messages are taken from `queue` and every decoded message is handed
    /// to `handler`. The credit capacity comes from `caps`.
    pub fn new<B, H>(bus: B, queue: Arc<dyn TxQueue>, handler: H, caps: ChipCaps) -> Self
    where
        B: HwBus + 'static,
        H: MessageHandler + 'static,
    {
        let config = LinkConfig::default();
        Self {
            shared: Arc::new(LinkShared {
                bus: Mutex::new(Box::new(bus)),
                ctrl_reg: AtomicU32::new(0),
                ctrl_ready: Completion::new(),
                credits: CreditCounter::new(caps.num_inp_ch_bufs),
                scan_in_progress: AtomicBool::new(false),
                signal: WorkSignal::new(),
                queue,
                spurious_irqs: AtomicU64::new(0),
            }),
            seq: SequenceTracker::new(config.seq_counter_max),
            wake: WakeController::new(caps.api_older_than(WAKE_ACK_API.0, WAKE_ACK_API.1), &config),
            secure: None,
            handler: Box::new(handler),
            caps,
            config,
            stats: BhStats::default(),
        }
    }

    /// Keep the chip awake through `pin` while the bottom half runs.
    pub fn with_wake_pin(mut self, pin: impl WakePin + 'static) -> Self {
        let legacy = self.caps.api_older_than(WAKE_ACK_API.0, WAKE_ACK_API.1);
        self.wake = WakeController::new(legacy, &self.config).with_pin(Box::new(pin));
        self
    }

    /// Encrypt and decrypt messages through `link`.
    pub fn with_secure_link(mut self, link: impl SecureLink + 'static) -> Self {
        self.secure = Some(Box::new(link));
        self
    }

    /// Replace the tuning knobs. Resets the sequence counters.
    pub fn with_config(mut self, config: LinkConfig) -> Self {
        self.seq = SequenceTracker::new(config.seq_counter_max);
        self.wake.configure(&config);
        self.config = config;
        self
    }

    pub fn caps(&self) -> &ChipCaps {
        &self.caps
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    pub fn sequence(&self) -> &SequenceTracker {
        &self.seq
    }

    pub fn credits(&self) -> &CreditCounter {
        &self.shared.credits
    }

    pub fn wake_controller(&self) -> &WakeController {
        &self.wake
    }

    /// Counters as of the end of the last run.
    pub fn stats(&self) -> &BhStats {
        &self.stats
    }

    pub fn into_stats(mut self) -> BhStats {
        self.collect_shared_counters();
        self.stats
    }

    fn collect_shared_counters(&mut self) {
        self.stats.spurious_irqs = self.shared.spurious_irqs.load(Ordering::Relaxed);
    }

    /// Mark a scan as running. The chip is kept awake until it is cleared.
    pub fn set_scan_in_progress(&self, in_progress: bool) {
        self.shared
            .scan_in_progress
            .store(in_progress, Ordering::Release);
    }

    /// Latch the control register after an interrupt.
    pub fn request_receive(&self) -> Result<()> {
        self.shared.request_receive()
    }

    /// Note that the outbound queue has new messages.
    pub fn request_transmit(&self) -> Result<()> {
        self.shared.request_transmit()
    }

    /// Whether a run has been requested and not started yet.
    pub fn is_work_pending(&self) -> bool {
        self.shared.signal.is_pending()
    }

    /// One bottom-half pass.
    ///
    /// Wakes the chip, alternates the transmit and receive pumps until
    /// neither moves a message, then lets the chip sleep if nothing is in
    /// flight, queued or scanning.
    pub fn run(&mut self) -> RunReport {
        self.shared.signal.take();

        let wake = self.wake.wake(&self.shared.ctrl_ready);
        let mut report = RunReport::new(wake);
        let mut received = 0;
        let mut last_op_is_rx = false;
        loop {
            let num_tx = self.tx_pump(self.config.tx_batch);
            report.requests += num_tx;
            if num_tx > 0 {
                last_op_is_rx = false;
            }
            let num_rx = self.rx_pump(self.config.rx_batch, &mut report.confirmations);
            received += num_rx;
            if num_rx > 0 {
                last_op_is_rx = true;
            }
            if num_tx == 0 && num_rx == 0 {
                break;
            }
        }
        report.indications = received.saturating_sub(report.confirmations);

        if last_op_is_rx {
            self.acknowledge();
        }

        let used = self.shared.credits.used();
        report.credits_in_flight = used;
        if used == 0
            && !self.shared.signal.is_pending()
            && !self.shared.scan_in_progress.load(Ordering::Acquire)
        {
            self.wake.release();
            report.released = true;
        }

        debug!(
            ind = report.indications,
            req = report.requests,
            cnf = report.confirmations,
            busy = used,
            release = report.released,
            "bh stats"
        );
        self.stats.record_run(&report);
        self.collect_shared_counters();
        report
    }

    fn acknowledge(&mut self) {
        let result = self.shared.lock_bus().acknowledge();
        match result {
            Ok(0) => {}
            Ok(bits) => {
                warn!(errors = format_args!("{bits:#04x}"), "chip reports errors");
                self.stats.chip_errors += 1;
            }
            Err(err) => {
                error!(error = %err, "failed to acknowledge last transfer");
                self.stats.bus_errors += 1;
            }
        }
    }
}

impl std::fmt::Debug for Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Link")
            .field("caps", &self.caps)
            .field("credits_used", &self.shared.credits.used())
            .field("seq", &self.seq)
            .field("wake", &self.wake)
            .field("secure", &self.secure.is_some())
            .finish()
    }
}
