//! Tracing subscriber setup for binaries built on serio.
//!
//! The library itself only emits `tracing` events; installing a subscriber
//! is left to the application.

use crate::config::{ConfigError, ConfigResult, LogFormat, LoggingConfig};
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// Build the filter: `RUST_LOG` when set, else the configured level.
pub fn env_filter(config: &LoggingConfig) -> ConfigResult<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(&config.level)
            .map_err(|e| ConfigError::invalid("logging.level", e.to_string())),
    }
}

fn open_log_file(path: &Path) -> ConfigResult<std::fs::File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(ConfigError::io("create log directory for", path))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(ConfigError::io("open log file", path))
}

/// Install the global subscriber described by `config`.
///
/// Events go to stderr, or are appended to `config.file` without colors.
/// Fails if a global subscriber is already set.
pub fn init_tracing(config: &LoggingConfig) -> ConfigResult<()> {
    let filter = env_filter(config)?;
    let (writer, ansi) = match &config.file {
        Some(path) => (BoxMakeWriter::new(Mutex::new(open_log_file(path)?)), false),
        None => (BoxMakeWriter::new(std::io::stderr), true),
    };

    let layer = match config.format {
        LogFormat::Json => fmt::layer().json().with_writer(writer).boxed(),
        LogFormat::Pretty => fmt::layer()
            .pretty()
            .with_ansi(ansi)
            .with_writer(writer)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_ansi(ansi)
            .with_writer(writer)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(layer)
        .try_init()
        .map_err(|e| ConfigError::invalid("logging", e.to_string()))
}
