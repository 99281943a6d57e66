//! Logging setup for the `muster` binary.
//!
//! Session transitions are logged with structured `session_id`, `person_id`
//! and `zone_id` fields so a muster can be reconstructed from the log. Output
//! goes to stderr; stdout is reserved for command output such as `--json`.

use std::io::IsTerminal;

use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Log target shared by every module in the crate.
const TARGET: &str = "musterpoint";

/// How much the CLI logs, chosen by `-q` and `-v` flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    /// Errors only.
    Quiet,
    /// Session transitions and warnings.
    #[default]
    Normal,
    /// Adds storage and timer activity.
    Verbose,
    /// Everything, including per-event gateway traffic.
    Trace,
}

impl Verbosity {
    /// Map the command-line flags to a verbosity. `quiet` wins over any
    /// number of `-v`.
    #[must_use]
    pub fn from_flags(quiet: bool, verbose: u8) -> Self {
        match (quiet, verbose) {
            (true, _) => Self::Quiet,
            (false, 0) => Self::Normal,
            (false, 1) => Self::Verbose,
            (false, _) => Self::Trace,
        }
    }

    /// Most detailed level that is still logged.
    #[must_use]
    pub fn level(self) -> LevelFilter {
        match self {
            Self::Quiet => LevelFilter::ERROR,
            Self::Normal => LevelFilter::INFO,
            Self::Verbose => LevelFilter::DEBUG,
            Self::Trace => LevelFilter::TRACE,
        }
    }

    /// `EnvFilter` directive scoping this level to the crate.
    #[must_use]
    pub fn filter_directive(self) -> String {
        let level = match self {
            Self::Quiet => "error",
            Self::Normal => "info",
            Self::Verbose => "debug",
            Self::Trace => "trace",
        };
        format!("{TARGET}={level}")
    }
}

/// Pick the filter: a valid `RUST_LOG` value wins, otherwise the verbosity.
fn build_filter(verbosity: Verbosity, rust_log: Option<&str>) -> EnvFilter {
    if let Some(spec) = rust_log {
        match EnvFilter::try_new(spec) {
            Ok(filter) => return filter,
            Err(e) => eprintln!("Ignoring invalid {}: {e}", EnvFilter::DEFAULT_ENV),
        }
    }
    EnvFilter::new(verbosity.filter_directive())
}

/// Install the global subscriber.
///
/// Call once at startup. Later calls leave the first subscriber in place.
///
/// ```no_run
/// use musterpoint::{init_logging, logging::Verbosity};
///
/// init_logging(Verbosity::from_flags(false, 1));
/// ```
pub fn init_logging(verbosity: Verbosity) {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = build_filter(verbosity, rust_log.as_deref());

    let stderr = fmt::layer()
        .compact()
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .with_target(verbosity == Verbosity::Trace);

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(stderr)
        .try_init();
}

/// Warnings and errors only, captured by the test harness.
#[cfg(test)]
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(format!("{TARGET}=warn"))
        .with_test_writer()
        .try_init();
}
