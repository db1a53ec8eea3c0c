//! Configuration schema definitions.
//!
//! This module defines the structure of the configuration file using serde.
//! Every section has defaults, so an empty file is a valid configuration.

use crate::port::{DataBits, Parity, PortConfiguration, StopBits};
use crate::stream::{ConnectionOptions, DEFAULT_LIMIT};
use crate::transport::{
    ReadinessMode, TransportOptions, DEFAULT_HIGH_WATER_MARK, DEFAULT_LOW_WATER_MARK,
    DEFAULT_POLL_INTERVAL, DEFAULT_READ_CHUNK_SIZE,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Device and line settings
    pub serial: SerialConfig,
    /// Transport buffering and readiness
    pub transport: TransportConfig,
    /// Stream adapter settings
    pub stream: StreamConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Config {
    /// Connection options for the configured device.
    pub fn connection_options(&self) -> ConnectionOptions {
        ConnectionOptions {
            url: self.serial.url.clone(),
            port: self.serial.port.clone(),
            serial: self.serial.port_configuration(),
            limit: self.stream.limit,
            transport: self.transport.options(),
        }
    }
}

/// Serial device section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// System port path, e.g. `/dev/ttyUSB0` or `COM3`
    pub port: Option<String>,
    /// Device URL, e.g. `loop://`; wins over `port`
    pub url: Option<String>,
    pub baud_rate: u32,
    pub data_bits: DataBits,
    pub parity: Parity,
    pub stop_bits: StopBits,
    pub xonxoff: bool,
    pub rtscts: bool,
    pub dsrdtr: bool,
    /// Read timeout in milliseconds (unset = no timeout)
    pub timeout_ms: Option<u64>,
    /// Drain timeout in milliseconds (unset = no timeout)
    pub write_timeout_ms: Option<u64>,
    /// Inter-character timeout in milliseconds
    pub inter_byte_timeout_ms: Option<u64>,
    pub exclusive: Option<bool>,
}

impl Default for SerialConfig {
    fn default() -> Self {
        let port = PortConfiguration::default();
        Self {
            port: None,
            url: None,
            baud_rate: port.baud_rate,
            data_bits: port.data_bits,
            parity: port.parity,
            stop_bits: port.stop_bits,
            xonxoff: port.xonxoff,
            rtscts: port.rtscts,
            dsrdtr: port.dsrdtr,
            timeout_ms: None,
            write_timeout_ms: None,
            inter_byte_timeout_ms: None,
            exclusive: None,
        }
    }
}

impl SerialConfig {
    /// Get the read timeout as Duration
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// Get the write timeout as Duration
    pub fn write_timeout(&self) -> Option<Duration> {
        self.write_timeout_ms.map(Duration::from_millis)
    }

    pub fn port_configuration(&self) -> PortConfiguration {
        PortConfiguration {
            baud_rate: self.baud_rate,
            data_bits: self.data_bits,
            parity: self.parity,
            stop_bits: self.stop_bits,
            xonxoff: self.xonxoff,
            rtscts: self.rtscts,
            dsrdtr: self.dsrdtr,
            timeout: self.timeout(),
            write_timeout: self.write_timeout(),
            inter_byte_timeout: self.inter_byte_timeout_ms.map(Duration::from_millis),
            exclusive: self.exclusive,
        }
    }
}

/// Transport section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Pause the writer at this many buffered bytes
    pub high_water_mark: usize,
    /// Resume the writer at this many buffered bytes
    pub low_water_mark: usize,
    /// Bytes per device read
    pub read_chunk_size: usize,
    /// Polling backend period in milliseconds
    pub poll_interval_ms: u64,
    /// Readiness backend: "auto", "descriptor" or "polling"
    pub readiness: ReadinessMode,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            high_water_mark: DEFAULT_HIGH_WATER_MARK,
            low_water_mark: DEFAULT_LOW_WATER_MARK,
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
            poll_interval_ms: DEFAULT_POLL_INTERVAL.as_millis() as u64,
            readiness: ReadinessMode::Auto,
        }
    }
}

impl TransportConfig {
    /// Get the poll interval as Duration
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn options(&self) -> TransportOptions {
        TransportOptions {
            high_water_mark: self.high_water_mark,
            low_water_mark: self.low_water_mark,
            read_chunk_size: self.read_chunk_size,
            poll_interval: self.poll_interval(),
            readiness: self.readiness,
        }
    }
}

/// Stream adapter section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Inbound buffer limit in bytes
    pub limit: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
        }
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset
    pub level: String,
    /// Log file path (optional, stderr otherwise)
    pub file: Option<PathBuf>,
    /// Log format: "json", "pretty", "compact"
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            format: LogFormat::Pretty,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON format
    Json,
    /// Pretty format with colors
    #[default]
    Pretty,
    /// Compact format
    Compact,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.serial.baud_rate, 9600);
        assert_eq!(config.transport.high_water_mark, 65536);
        assert_eq!(config.stream.limit, 65536);
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[serial]"));
        assert!(toml_str.contains("[transport]"));
        assert!(toml_str.contains("[logging]"));
    }

    #[test]
    fn test_config_deserialization() {
        let toml_str = r#"
            [serial]
            url = "loop://"
            baud_rate = 115200
            parity = "even"
            timeout_ms = 250

            [transport]
            readiness = "polling"
            poll_interval_ms = 10
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        let options = config.connection_options();
        assert_eq!(options.url.as_deref(), Some("loop://"));
        assert_eq!(options.serial.baud_rate, 115200);
        assert_eq!(options.serial.parity, Parity::Even);
        assert_eq!(options.serial.timeout, Some(Duration::from_millis(250)));
        assert_eq!(options.serial.write_timeout, None);
        assert_eq!(options.transport.readiness, ReadinessMode::Polling);
        assert_eq!(options.transport.poll_interval, Duration::from_millis(10));
        // Defaults should still work
        assert_eq!(options.transport.low_water_mark, 16384);
    }
}
