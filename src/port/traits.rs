//! Core traits for serial device abstraction.
//!
//! Defines the `SerialDevice` trait that lets both real serial ports and
//! in-memory devices sit under a transport, plus the port parameters passed
//! through to the driver when a device is opened.

use super::error::PortError;
use crate::reactor::Descriptor;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration parameters for a serial port.
///
/// The transport never interprets these; they are handed to the driver when
/// the device is opened. `timeout` and `write_timeout` are also honoured by
/// the stream adapter, where `None` means "wait as long as it takes".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortConfiguration {
    /// Baud rate (bits per second).
    pub baud_rate: u32,

    /// Number of data bits (5, 6, 7, or 8).
    pub data_bits: DataBits,

    /// Parity checking mode.
    pub parity: Parity,

    /// Number of stop bits.
    pub stop_bits: StopBits,

    /// Software (XON/XOFF) flow control.
    pub xonxoff: bool,

    /// Hardware (RTS/CTS) flow control.
    pub rtscts: bool,

    /// Hardware (DSR/DTR) flow control.
    pub dsrdtr: bool,

    /// Read timeout applied by the stream adapter.
    pub timeout: Option<Duration>,

    /// Write (drain) timeout applied by the stream adapter.
    pub write_timeout: Option<Duration>,

    /// Inter-character timeout, passed through to the driver.
    pub inter_byte_timeout: Option<Duration>,

    /// Request exclusive access to the device node.
    pub exclusive: Option<bool>,
}

impl Default for PortConfiguration {
    fn default() -> Self {
        Self {
            baud_rate: 9600,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
            xonxoff: false,
            rtscts: false,
            dsrdtr: false,
            timeout: None,
            write_timeout: None,
            inter_byte_timeout: None,
            exclusive: None,
        }
    }
}

impl PortConfiguration {
    /// Configuration with the given baud rate and 8N1 defaults.
    pub fn with_baud_rate(baud_rate: u32) -> Self {
        Self {
            baud_rate,
            ..Self::default()
        }
    }

    /// Flow control mode derived from the `xonxoff`/`rtscts` flags.
    pub fn flow_control(&self) -> FlowControl {
        if self.rtscts {
            FlowControl::Hardware
        } else if self.xonxoff {
            FlowControl::Software
        } else {
            FlowControl::None
        }
    }

    /// Reject parameter combinations no driver can honour.
    ///
    /// This runs before any device is opened, so a bad configuration never
    /// produces a half-built connection.
    pub fn validate(&self) -> Result<(), PortError> {
        if self.baud_rate == 0 {
            return Err(PortError::config("baud rate must be greater than zero"));
        }
        if self.xonxoff && self.rtscts {
            return Err(PortError::config(
                "xonxoff and rtscts flow control are mutually exclusive",
            ));
        }
        Ok(())
    }
}

/// Number of data bits per character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataBits {
    Five,
    Six,
    Seven,
    Eight,
}

impl From<DataBits> for serialport::DataBits {
    fn from(bits: DataBits) -> Self {
        match bits {
            DataBits::Five => serialport::DataBits::Five,
            DataBits::Six => serialport::DataBits::Six,
            DataBits::Seven => serialport::DataBits::Seven,
            DataBits::Eight => serialport::DataBits::Eight,
        }
    }
}

/// Flow control modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowControl {
    None,
    Software,
    Hardware,
}

impl From<FlowControl> for serialport::FlowControl {
    fn from(flow: FlowControl) -> Self {
        match flow {
            FlowControl::None => serialport::FlowControl::None,
            FlowControl::Software => serialport::FlowControl::Software,
            FlowControl::Hardware => serialport::FlowControl::Hardware,
        }
    }
}

/// Parity checking modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    None,
    Odd,
    Even,
}

impl From<Parity> for serialport::Parity {
    fn from(parity: Parity) -> Self {
        match parity {
            Parity::None => serialport::Parity::None,
            Parity::Odd => serialport::Parity::Odd,
            Parity::Even => serialport::Parity::Even,
        }
    }
}

/// Number of stop bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StopBits {
    One,
    Two,
}

impl From<StopBits> for serialport::StopBits {
    fn from(bits: StopBits) -> Self {
        match bits {
            StopBits::One => serialport::StopBits::One,
            StopBits::Two => serialport::StopBits::Two,
        }
    }
}

/// Non-blocking serial device handle.
///
/// A transport owns exactly one device for its whole life. Neither I/O
/// method may block: "nothing to read" is `Ok(0)` and "nothing accepted" is
/// `Err(PortError::WouldBlock)` (or any error for which
/// [`PortError::is_would_block`] holds).
pub trait SerialDevice: Send + std::fmt::Debug {
    /// Get the name/path of this serial port.
    fn name(&self) -> &str;

    /// Read whatever is available, up to `buffer.len()` bytes.
    fn read_nonblocking(&mut self, buffer: &mut [u8]) -> Result<usize, PortError>;

    /// Write as much of `data` as the device accepts right now.
    ///
    /// Returns the number of bytes actually written.
    fn write_nonblocking(&mut self, data: &[u8]) -> Result<usize, PortError>;

    /// Native readiness descriptor, if the platform exposes one.
    fn descriptor(&self) -> Option<Descriptor> {
        None
    }

    /// Get the current bytes available to read (if supported).
    fn bytes_to_read(&self) -> Option<usize> {
        None
    }

    /// Get the current bytes waiting in the device output queue (if supported).
    fn bytes_to_write(&self) -> Option<usize> {
        None
    }

    /// Drive the DTR modem line.
    fn set_data_terminal_ready(&mut self, _level: bool) -> Result<(), PortError> {
        Err(PortError::Unsupported("DTR"))
    }

    /// Drive the RTS modem line.
    fn set_request_to_send(&mut self, _level: bool) -> Result<(), PortError> {
        Err(PortError::Unsupported("RTS"))
    }

    /// Release the device. Further I/O fails with `PortError::NotOpen`.
    fn close(&mut self);
}
