//! Crate-level error type.
//!
//! Errors raised while establishing a connection. Failures on an already
//! established connection never travel this way; they reach the protocol
//! through `connection_lost` as a [`TransportError`](crate::TransportError).

use crate::config::ConfigError;
use crate::port::PortError;
use thiserror::Error;

/// Errors returned when setting up a serial connection.
#[derive(Debug, Error)]
pub enum SerioError {
    /// Invalid port or connection parameters; nothing was opened.
    #[error("Invalid serial configuration: {0}")]
    InvalidConfig(String),

    /// The device could not be opened.
    #[error("Failed to open serial port '{port}': {source}")]
    Connection {
        port: String,
        #[source]
        source: PortError,
    },

    /// Neither readiness backend can drive this device on this host.
    #[error("Platform not supported for async serial I/O: {0}")]
    PlatformNotSupported(String),

    /// The device failed while the connection was being set up.
    #[error("Device error: {0}")]
    Device(#[from] PortError),

    /// Loading the settings file failed.
    #[error(transparent)]
    Settings(#[from] ConfigError),
}

/// Result type for connection setup.
pub type SerioResult<T> = Result<T, SerioError>;
