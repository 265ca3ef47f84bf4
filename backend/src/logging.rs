//! Structured logging setup
//!
//! Installs a JSON `tracing` subscriber writing to every configured output
//! (`stdout`, `stderr` or an appended file). Writers are non-blocking; the
//! returned guards must be held until shutdown so buffered lines are flushed.

use crate::config::LogConfig;
use std::fs::OpenOptions;
use std::io;
use thiserror::Error;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

/// Errors raised while installing the subscriber
#[derive(Error, Debug)]
pub enum LoggingError {
    /// The level directive could not be parsed
    #[error("invalid log level {directive:?}: {source}")]
    InvalidLevel {
        /// Rejected directive
        directive: String,
        /// Parser error
        source: tracing_subscriber::filter::ParseError,
    },

    /// A log file could not be opened
    #[error("failed to open log output {path}: {source}")]
    Output {
        /// Configured output path
        path: String,
        /// Underlying I/O error
        source: io::Error,
    },

    /// A global subscriber was already installed
    #[error("failed to install logger: {0}")]
    Init(#[from] tracing_subscriber::util::TryInitError),
}

/// Build the level filter; a non-empty `RUST_LOG` takes precedence
pub fn build_filter(level: &str) -> Result<EnvFilter, LoggingError> {
    let directive = std::env::var("RUST_LOG")
        .ok()
        .filter(|d| !d.trim().is_empty())
        .unwrap_or_else(|| level.to_string());

    EnvFilter::try_new(&directive).map_err(|source| LoggingError::InvalidLevel {
        directive,
        source,
    })
}

/// Open a non-blocking writer for each output target
pub fn open_outputs(paths: &[String]) -> Result<Vec<(NonBlocking, WorkerGuard)>, LoggingError> {
    let default = ["stdout".to_string()];
    let paths = if paths.is_empty() { &default[..] } else { paths };

    paths
        .iter()
        .map(|path| match path.as_str() {
            "stdout" => Ok(tracing_appender::non_blocking(io::stdout())),
            "stderr" => Ok(tracing_appender::non_blocking(io::stderr())),
            file => OpenOptions::new()
                .create(true)
                .append(true)
                .open(file)
                .map(tracing_appender::non_blocking)
                .map_err(|source| LoggingError::Output {
                    path: file.to_string(),
                    source,
                }),
        })
        .collect()
}

/// Install the global subscriber
///
/// # Returns
/// * `Ok(guards)` - keep alive for the lifetime of the process
/// * `Err(LoggingError)` - invalid level, unwritable output, or double init
pub fn init(config: &LogConfig) -> Result<Vec<WorkerGuard>, LoggingError> {
    let filter = build_filter(&config.level)?;

    let mut guards = Vec::new();
    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();
    for (writer, guard) in open_outputs(&config.output_paths)? {
        guards.push(guard);
        layers.push(
            fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(false)
                .with_writer(writer)
                .boxed(),
        );
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()?;

    Ok(guards)
}
