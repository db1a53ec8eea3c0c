//! Device layer for serial communication.
//!
//! Provides the non-blocking `SerialDevice` contract a transport drives, the
//! native port implementation, and an in-memory device used by tests and
//! `loop://` URLs.

pub mod error;
pub mod mock;
pub mod sync_port;
pub mod traits;

pub use error::PortError;
pub use mock::MockSerialPort;
pub use sync_port::SyncSerialPort;
pub use traits::*;

use crate::error::SerioError;

/// URL scheme that opens an in-memory loopback device.
pub const LOOPBACK_URL: &str = "loop://";

/// Open a device by URL or port path.
///
/// `loop://` yields a [`MockSerialPort`] in loopback mode; any other target
/// is treated as a system port path. Parameter errors surface as
/// [`SerioError::InvalidConfig`] before anything is opened, open failures as
/// [`SerioError::Connection`].
pub fn open_device(
    target: &str,
    config: &PortConfiguration,
) -> Result<Box<dyn SerialDevice>, SerioError> {
    config
        .validate()
        .map_err(|e| SerioError::InvalidConfig(e.to_string()))?;

    if target.starts_with(LOOPBACK_URL) {
        return Ok(Box::new(MockSerialPort::loopback(target)));
    }

    match SyncSerialPort::open(target, config) {
        Ok(port) => Ok(Box::new(port)),
        Err(PortError::Config(message)) => Err(SerioError::InvalidConfig(message)),
        Err(e) => Err(SerioError::Connection {
            port: target.to_string(),
            source: e,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_loopback_url() {
        let mut device = open_device("loop://", &PortConfiguration::default()).unwrap();
        device.write_nonblocking(b"ping").unwrap();

        let mut buffer = [0u8; 8];
        let n = device.read_nonblocking(&mut buffer).unwrap();
        assert_eq!(&buffer[..n], b"ping");
    }

    #[test]
    fn test_open_rejects_invalid_configuration() {
        let config = PortConfiguration::with_baud_rate(0);
        let result = open_device("loop://", &config);
        assert!(matches!(result, Err(SerioError::InvalidConfig(_))));
    }

    #[test]
    fn test_open_missing_port_is_connection_error() {
        let result = open_device("/dev/nonexistent_port_12345", &PortConfiguration::default());
        assert!(matches!(result, Err(SerioError::Connection { .. })));
    }
}
