//! Native serial port device.
//!
//! Wraps the `serialport` crate's platform port type behind the
//! `SerialDevice` trait. The port is opened with a zero timeout and, on Unix,
//! its descriptor is switched to `O_NONBLOCK` so neither direction can ever
//! stall the event loop.

use super::error::PortError;
use super::traits::{PortConfiguration, SerialDevice};
use crate::reactor::Descriptor;
use serialport::SerialPort;
use std::io::{Read, Write};
use std::time::Duration;
use tracing::debug;

#[cfg(unix)]
type NativePort = serialport::TTYPort;

#[cfg(windows)]
type NativePort = serialport::COMPort;

/// Serial port opened through the platform driver.
pub struct SyncSerialPort {
    /// The underlying port; `None` once closed.
    port: Option<NativePort>,
    /// The port name/path for identification.
    name: String,
}

impl SyncSerialPort {
    /// Open a serial port with the given configuration.
    ///
    /// # Arguments
    /// * `port_name` - The system path to the serial port (e.g., "/dev/ttyUSB0" or "COM3")
    /// * `config` - Configuration parameters for the port
    ///
    /// # Example
    /// ```no_run
    /// use serio::port::{PortConfiguration, SyncSerialPort};
    ///
    /// let config = PortConfiguration::with_baud_rate(115200);
    /// let port = SyncSerialPort::open("/dev/ttyUSB0", &config)?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn open(port_name: &str, config: &PortConfiguration) -> Result<Self, PortError> {
        config.validate()?;

        #[allow(unused_mut)]
        let mut port = serialport::new(port_name, config.baud_rate)
            .data_bits(config.data_bits.into())
            .flow_control(config.flow_control().into())
            .parity(config.parity.into())
            .stop_bits(config.stop_bits.into())
            .timeout(Duration::ZERO)
            .open_native()
            .map_err(|e| match e.kind() {
                serialport::ErrorKind::NoDevice => PortError::not_found(port_name),
                serialport::ErrorKind::InvalidInput => PortError::config(e.to_string()),
                _ => PortError::Serial(e),
            })?;

        #[cfg(unix)]
        {
            if let Some(exclusive) = config.exclusive {
                port.set_exclusive(exclusive)?;
            }
            set_nonblocking(std::os::fd::AsRawFd::as_raw_fd(&port))?;
        }

        if config.dsrdtr {
            // serialport has no DSR/DTR handshake mode; assert DTR so the
            // peer sees us as ready.
            port.write_data_terminal_ready(true)?;
            debug!(port = port_name, "DSR/DTR flow control approximated by asserting DTR");
        }
        if config.inter_byte_timeout.is_some() {
            debug!(port = port_name, "inter_byte_timeout is not supported by the driver, ignoring");
        }

        debug!(port = port_name, baud = config.baud_rate, "serial port opened");
        Ok(Self {
            port: Some(port),
            name: port_name.to_string(),
        })
    }

    /// Get a reference to the underlying serialport implementation.
    ///
    /// This can be useful for accessing platform-specific features.
    pub fn as_raw(&self) -> Option<&dyn SerialPort> {
        self.port.as_ref().map(|p| p as &dyn SerialPort)
    }

    fn port_mut(&mut self) -> Result<&mut NativePort, PortError> {
        self.port.as_mut().ok_or(PortError::NotOpen)
    }
}

#[cfg(unix)]
fn set_nonblocking(fd: std::os::fd::RawFd) -> Result<(), PortError> {
    // SAFETY: `fd` belongs to a port we hold open for the duration of both calls.
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(PortError::Io(std::io::Error::last_os_error()));
    }
    // SAFETY: as above; only the file status flags are changed.
    if unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) } < 0 {
        return Err(PortError::Io(std::io::Error::last_os_error()));
    }
    Ok(())
}

impl SerialDevice for SyncSerialPort {
    fn name(&self) -> &str {
        &self.name
    }

    fn read_nonblocking(&mut self, buffer: &mut [u8]) -> Result<usize, PortError> {
        match self.port_mut()?.read(buffer) {
            Ok(n) => Ok(n),
            Err(e) => {
                let err = PortError::Io(e);
                if err.is_would_block() {
                    Ok(0)
                } else {
                    Err(err)
                }
            }
        }
    }

    fn write_nonblocking(&mut self, data: &[u8]) -> Result<usize, PortError> {
        match self.port_mut()?.write(data) {
            Ok(n) => Ok(n),
            Err(e) => {
                let err = PortError::Io(e);
                if err.is_would_block() {
                    Err(PortError::WouldBlock)
                } else {
                    Err(err)
                }
            }
        }
    }

    #[cfg(unix)]
    fn descriptor(&self) -> Option<Descriptor> {
        self.port
            .as_ref()
            .map(|p| Descriptor::from(std::os::fd::AsRawFd::as_raw_fd(p)))
    }

    fn bytes_to_read(&self) -> Option<usize> {
        self.port
            .as_ref()?
            .bytes_to_read()
            .ok()
            .map(|n| n as usize)
    }

    fn bytes_to_write(&self) -> Option<usize> {
        self.port
            .as_ref()?
            .bytes_to_write()
            .ok()
            .map(|n| n as usize)
    }

    fn set_data_terminal_ready(&mut self, level: bool) -> Result<(), PortError> {
        self.port_mut()?.write_data_terminal_ready(level)?;
        Ok(())
    }

    fn set_request_to_send(&mut self, level: bool) -> Result<(), PortError> {
        self.port_mut()?.write_request_to_send(level)?;
        Ok(())
    }

    fn close(&mut self) {
        if self.port.take().is_some() {
            debug!(port = %self.name, "serial port closed");
        }
    }
}

impl std::fmt::Debug for SyncSerialPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncSerialPort")
            .field("name", &self.name)
            .field("open", &self.port.is_some())
            .finish()
    }
}
