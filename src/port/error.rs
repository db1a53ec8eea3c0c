//! Port-specific error types.
//!
//! Defines error types for serial device operations, separate from transport
//! and crate-level errors to keep device failures distinguishable from
//! lifecycle misuse.

use std::io::ErrorKind;
use thiserror::Error;

/// Errors that can occur during serial device operations.
#[derive(Debug, Error)]
pub enum PortError {
    /// The specified serial port was not found on the system.
    #[error("Serial port not found: {0}")]
    NotFound(String),

    /// An I/O error occurred during port operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Port configuration failed or was rejected before opening.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The device accepted nothing; retry on the next write readiness.
    #[error("Operation would block")]
    WouldBlock,

    /// The device has no such control (for example, no modem lines).
    #[error("Not supported by this device: {0}")]
    Unsupported(&'static str),

    /// Attempted to use a port that has already been closed.
    #[error("Port is not open")]
    NotOpen,

    /// A serialport-specific error occurred.
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),
}

impl PortError {
    /// Create a NotFound error from a port name.
    pub fn not_found(port_name: impl Into<String>) -> Self {
        Self::NotFound(port_name.into())
    }

    /// Create a Config error from a message.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Whether this error only means "no progress right now".
    ///
    /// A zero-timeout serialport read reports `TimedOut` when the input queue
    /// is empty, and a non-blocking descriptor reports `WouldBlock`; both are
    /// retried on the next readiness notification instead of tearing the
    /// connection down.
    pub fn is_would_block(&self) -> bool {
        match self {
            Self::WouldBlock => true,
            Self::Io(e) => matches!(
                e.kind(),
                ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted
            ),
            _ => false,
        }
    }
}
