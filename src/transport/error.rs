//! Errors reported by an established transport.

use crate::port::PortError;
use std::io;
use thiserror::Error;

/// Errors a transport reports to its protocol or to the application.
///
/// Device failures end the connection and arrive through
/// `Protocol::connection_lost`; the remaining variants are returned
/// synchronously from the call that caused them.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The device failed while the connection was established.
    #[error("Device error: {0}")]
    Device(#[from] PortError),

    /// The application tore the connection down.
    #[error("Transport aborted: {0}")]
    Aborted(String),

    /// `pause_reading` was called while reading was already paused.
    #[error("Reading is already paused")]
    ReadingAlreadyPaused,

    /// `resume_reading` was called while reading was not paused.
    #[error("Reading is not paused")]
    ReadingNotPaused,

    /// Write buffer limits out of order.
    #[error("high ({high}) must be >= low ({low}) must be >= 0")]
    InvalidWaterMarks { high: usize, low: usize },

    /// Serial lines have no half-close.
    #[error("Serial ports do not support EOF")]
    EofUnsupported,
}

impl TransportError {
    /// Create an Aborted error from a reason.
    pub fn aborted(reason: impl Into<String>) -> Self {
        Self::Aborted(reason.into())
    }
}

impl From<TransportError> for io::Error {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Device(PortError::Io(e)) => e,
            other => io::Error::new(io::ErrorKind::Other, other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_keeps_device_kind() {
        let err = TransportError::Device(PortError::Io(io::Error::from(
            io::ErrorKind::BrokenPipe,
        )));
        assert_eq!(io::Error::from(err).kind(), io::ErrorKind::BrokenPipe);

        let err = io::Error::from(TransportError::aborted("done"));
        assert_eq!(err.kind(), io::ErrorKind::Other);
        assert_eq!(err.to_string(), "Transport aborted: done");
    }

    #[test]
    fn test_error_display() {
        let err = TransportError::InvalidWaterMarks { high: 10, low: 20 };
        assert_eq!(err.to_string(), "high (10) must be >= low (20) must be >= 0");

        let err = TransportError::from(PortError::NotOpen);
        assert_eq!(err.to_string(), "Device error: Port is not open");
    }
}
