//! Stderr logging for the CLI.
//!
//! The engine crates follow `--log-level`. The simulated bus traces every
//! transfer, so it stays at info unless trace is requested, and foreign
//! crates are held at warn. `WFXLINK_LOG` replaces the whole filter with an
//! `EnvFilter` directive list.

use clap::ValueEnum;
use tracing_subscriber::EnvFilter;

/// Environment variable overriding the computed filter.
pub const LOG_ENV: &str = "WFXLINK_LOG";

const ENGINE_CRATES: &[&str] = &["wfxlink", "wfxlink_bh", "wfxlink_frame"];
const BUS_CRATE: &str = "wfxlink_bus";

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Per-crate directives for `level`.
pub fn filter_directives(level: LogLevel) -> String {
    let bus = if level == LogLevel::Trace {
        level
    } else {
        level.min(LogLevel::Info)
    };
    let mut directives = vec![level.min(LogLevel::Warn).as_str().to_string()];
    directives.extend(
        ENGINE_CRATES
            .iter()
            .map(|name| format!("{name}={}", level.as_str())),
    );
    directives.push(format!("{BUS_CRATE}={}", bus.as_str()));
    directives.join(",")
}

fn build_filter(level: LogLevel, env_override: Option<&str>) -> EnvFilter {
    if let Some(directives) = env_override.filter(|d| !d.trim().is_empty()) {
        match EnvFilter::try_new(directives) {
            Ok(filter) => return filter,
            Err(err) => eprintln!("warning: ignoring {LOG_ENV}: {err}"),
        }
    }
    EnvFilter::new(filter_directives(level))
}

/// Route engine logs to stderr so stdout carries only command output.
pub fn init_logging(format: LogFormat, level: LogLevel) {
    let env_override = std::env::var(LOG_ENV).ok();
    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(build_filter(level, env_override.as_deref()))
        .with_ansi(false)
        .with_target(true)
        .with_thread_names(true);

    match format {
        LogFormat::Text => {
            let _ = builder.try_init();
        }
        LogFormat::Json => {
            let _ = builder.json().try_init();
        }
    }
}
