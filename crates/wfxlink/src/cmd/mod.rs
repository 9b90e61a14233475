use clap::{Args, Subcommand};

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod simulate;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Drive a worker-backed link against the simulated chip.
    Simulate(SimulateArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Simulate(args) => simulate::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Number of transmit requests to queue.
    #[arg(long, default_value = "64")]
    pub count: u64,
    /// Body size of each request in bytes.
    #[arg(long, default_value = "32")]
    pub body_len: usize,
    /// Chip input buffers, i.e. the credit capacity.
    #[arg(long, default_value = "8")]
    pub capacity: u32,
    /// Bus transfer alignment in bytes.
    #[arg(long, default_value = "4")]
    pub alignment: usize,
    /// Maximum messages per pump pass in each direction.
    #[arg(long, default_value = "32")]
    pub batch: usize,
    /// Confirm requests in groups of N with multi-transmit confirmations.
    #[arg(long, value_name = "N")]
    pub multi: Option<u32>,
    /// Emit an unsolicited indication after every N requests.
    #[arg(long, value_name = "N")]
    pub unsolicited: Option<u64>,
    /// Drive the chip's wake line instead of keeping it always awake.
    #[arg(long)]
    pub wake_pin: bool,
    /// Maximum time to wait for the chip to confirm everything (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
