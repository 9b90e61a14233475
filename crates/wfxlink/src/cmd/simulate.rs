use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use bytes::{BufMut, BytesMut};
use serde::Serialize;
use tracing::{debug, info, trace, warn};
use wfxlink_bh::{BhStats, ChipCaps, Link, LinkConfig, LinkTrigger, OutboundQueue};
use wfxlink_bus::SimChip;
use wfxlink_frame::ids::{MULTI_TRANSMIT_CNF_ID, RX_IND_ID, TX_ID};
use wfxlink_frame::{
    encode_message, Envelope, FrameError, Message, HEADER_SIZE, MAX_MESSAGE_LEN, SEQ_COUNTER_MAX,
};

use crate::cmd::SimulateArgs;
use crate::exit::{bh_error, frame_error, CliError, CliResult, LINK_DEGRADED, SUCCESS, USAGE};
use crate::output::{message_kind, print_counters, print_json, OutputFormat};

const FIRMWARE_API: (u8, u8) = (3, 12);
const IRQ_POLL: Duration = Duration::from_millis(5);
// Wake acknowledgements cross two host threads in the simulation.
const SIM_WAKE_TIMEOUT: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Default, Serialize)]
struct Tally {
    confirmations: u64,
    multi_confirmations: u64,
    indications: u64,
    exceptions: u64,
    body_bytes: u64,
}

impl Tally {
    fn record(&mut self, message: &Message) {
        match message {
            Message::Confirmation(_) => self.confirmations += 1,
            Message::MultiTransmitConfirmation(_) => self.multi_confirmations += 1,
            Message::Indication(_) => self.indications += 1,
            Message::Exception(_) => self.exceptions += 1,
        }
        self.body_bytes += message.envelope().body.len() as u64;
    }
}

#[derive(Serialize)]
struct SimulateOutput {
    requests_queued: u64,
    frames_written: usize,
    elapsed_ms: f64,
    wake_line: bool,
    received: Tally,
    stats: BhStats,
}

pub fn run(args: SimulateArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_timeout(&args.timeout)?;
    validate(&args)?;

    let chip = SimChip::new();
    let mut firmware = Firmware::new(&args);
    chip.set_responder(move |request| firmware.respond(request));

    let tally = Arc::new(Mutex::new(Tally::default()));
    let sink = Arc::clone(&tally);
    let handler = move |message: Message| {
        trace!(
            kind = message_kind(&message),
            id = format_args!("{:#04x}", message.id()),
            "message dispatched"
        );
        sink.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .record(&message);
    };

    let queue = Arc::new(OutboundQueue::new());
    let config = LinkConfig {
        rx_batch: args.batch,
        tx_batch: args.batch,
        flush_timeout: timeout,
        wake_timeout: SIM_WAKE_TIMEOUT,
        ..LinkConfig::default()
    };
    let caps = ChipCaps::new(args.capacity, FIRMWARE_API);
    let mut link = Link::new(chip.bus(args.alignment), queue.clone(), handler, caps)
        .with_config(config);
    if args.wake_pin {
        chip.set_ack_wakeup(true);
        link = link.with_wake_pin(chip.wake_pin());
    }

    info!(
        count = args.count,
        body_len = args.body_len,
        capacity = args.capacity,
        alignment = args.alignment,
        "starting simulated link"
    );
    let started = Instant::now();
    let handle = link.spawn().map_err(|err| bh_error("spawn failed", err))?;
    let irq = IrqForwarder::start(chip.clone(), handle.trigger());

    for index in 0..args.count {
        queue.push(Envelope::new(TX_ID, request_body(index, args.body_len)));
    }
    let flushed = handle
        .request_transmit()
        .and_then(|()| handle.flush());

    drop(irq);
    let stats = handle
        .teardown()
        .map_err(|err| bh_error("teardown failed", err))?;
    flushed.map_err(|err| bh_error("flush failed", err))?;

    let out = SimulateOutput {
        requests_queued: args.count,
        frames_written: chip.written_count(),
        elapsed_ms: (started.elapsed().as_secs_f64() * 1000.0 * 100.0).round() / 100.0,
        wake_line: chip.wake_line(),
        received: tally
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone(),
        stats,
    };
    info!(
        requests = out.stats.requests,
        confirmations = out.stats.confirmations,
        indications = out.stats.indications,
        "simulation finished"
    );
    print_report(&out, format);

    if out.stats.errors() > 0 {
        warn!(errors = out.stats.errors(), "link recorded errors");
        return Ok(LINK_DEGRADED);
    }
    Ok(SUCCESS)
}

fn validate(args: &SimulateArgs) -> CliResult<()> {
    if HEADER_SIZE + args.body_len > MAX_MESSAGE_LEN {
        return Err(frame_error(
            "invalid --body-len",
            FrameError::PayloadTooLarge {
                size: HEADER_SIZE + args.body_len,
                max: MAX_MESSAGE_LEN,
            },
        ));
    }
    if args.capacity == 0 {
        return Err(CliError::new(USAGE, "--capacity must be greater than zero"));
    }
    if args.batch == 0 {
        return Err(CliError::new(USAGE, "--batch must be greater than zero"));
    }
    if args.alignment == 0 {
        return Err(CliError::new(USAGE, "--alignment must be greater than zero"));
    }
    if args.unsolicited == Some(0) {
        return Err(CliError::new(USAGE, "--unsolicited must be greater than zero"));
    }
    match args.multi {
        Some(0) => Err(CliError::new(USAGE, "--multi must be greater than zero")),
        Some(n) if n > args.capacity => Err(CliError::new(
            USAGE,
            format!("--multi {n} exceeds --capacity {}", args.capacity),
        )),
        _ => Ok(()),
    }
}

fn request_body(index: u64, len: usize) -> BytesMut {
    let mut body = BytesMut::with_capacity(len);
    let stamp = index.to_le_bytes();
    for i in 0..len {
        body.put_u8(stamp[i % stamp.len()]);
    }
    body
}

/// Firmware model answering host writes on the simulated chip.
struct Firmware {
    seq: u8,
    multi: u32,
    unconfirmed: u32,
    unsolicited: Option<u64>,
    seen: u64,
    total: u64,
}

impl Firmware {
    fn new(args: &SimulateArgs) -> Self {
        Self {
            seq: 0,
            multi: args.multi.unwrap_or(1),
            unconfirmed: 0,
            unsolicited: args.unsolicited,
            seen: 0,
            total: args.count,
        }
    }

    fn respond(&mut self, request: &[u8]) -> Vec<Vec<u8>> {
        let Some(&id) = request.get(2) else {
            return Vec::new();
        };
        self.seen += 1;
        let mut replies = Vec::new();

        if self.unsolicited.is_some_and(|every| self.seen % every == 0) {
            replies.extend(self.emit(RX_IND_ID, &self.seen.to_le_bytes()));
        }

        if self.multi <= 1 {
            replies.extend(self.emit(id, &[]));
            return replies;
        }
        self.unconfirmed += 1;
        if self.unconfirmed == self.multi || self.seen == self.total {
            let count = std::mem::take(&mut self.unconfirmed);
            replies.extend(self.emit(MULTI_TRANSMIT_CNF_ID, &count.to_le_bytes()));
        }
        replies
    }

    fn emit(&mut self, id: u8, body: &[u8]) -> Option<Vec<u8>> {
        let frame = encode_message(&Envelope::new(id, body.to_vec()), self.seq, None).ok()?;
        self.seq = (self.seq + 1) % (SEQ_COUNTER_MAX + 1);
        Some(frame.to_vec())
    }
}

/// Forwards simulated chip interrupts to the link until dropped.
struct IrqForwarder {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl IrqForwarder {
    fn start(chip: SimChip, trigger: LinkTrigger) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let thread = thread::spawn(move || {
            while !flag.load(Ordering::Acquire) {
                if chip.wait_irq(IRQ_POLL) && trigger.request_receive().is_err() {
                    debug!("link closed, irq forwarder exiting");
                    break;
                }
            }
        });
        Self {
            stop,
            thread: Some(thread),
        }
    }
}

impl Drop for IrqForwarder {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn print_report(out: &SimulateOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(out),
        OutputFormat::Table => {
            let stats = &out.stats;
            print_counters(
                ["COUNTER", "VALUE"],
                &[
                    ("requests queued", out.requests_queued.to_string()),
                    ("frames written", out.frames_written.to_string()),
                    ("elapsed ms", format!("{:.2}", out.elapsed_ms)),
                    ("runs", stats.runs.to_string()),
                    ("requests", stats.requests.to_string()),
                    ("confirmations", stats.confirmations.to_string()),
                    ("indications", stats.indications.to_string()),
                    (
                        "multi confirmations",
                        out.received.multi_confirmations.to_string(),
                    ),
                    ("releases", stats.releases.to_string()),
                    ("wake timeouts", stats.wake_timeouts.to_string()),
                    ("errors", stats.errors().to_string()),
                ],
            );
        }
        OutputFormat::Pretty => {
            println!("Simulation:");
            println!(
                "  Requests:       {} queued, {} sent",
                out.requests_queued, out.stats.requests
            );
            println!(
                "  Received:       {} confirmations ({} multi), {} indications, {} exceptions",
                out.received.confirmations + out.received.multi_confirmations,
                out.received.multi_confirmations,
                out.received.indications,
                out.received.exceptions
            );
            println!("  Bottom halves:  {}", out.stats.runs);
            println!("  Sleep releases: {}", out.stats.releases);
            println!("  Errors:         {}", out.stats.errors());
            println!("  Elapsed:        {:.2}ms", out.elapsed_ms);
        }
    }
}

fn parse_timeout(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "timeout must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid timeout value: {input}")))?;
    if value == 0 {
        return Err(CliError::new(USAGE, "timeout must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}
