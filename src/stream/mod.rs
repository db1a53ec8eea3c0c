//! Buffered stream interface over a serial transport.
//!
//! [`open_serial_connection`] opens a device and returns a
//! [`SerialReader`]/[`SerialWriter`] pair driven by a [`StreamProtocol`].
//! [`create_serial_connection`] is the lower-level entry point that binds any
//! [`Protocol`] to a freshly opened device.
//!
//! Both must be awaited from a task on the thread that drives the event
//! loop (for [`TokioLoop`](crate::reactor::TokioLoop), inside its `LocalSet`).

mod protocol;
mod reader;
mod writer;

pub use protocol::{StreamProtocol, DEFAULT_LIMIT};
pub use reader::SerialReader;
pub use writer::SerialWriter;

use crate::error::{SerioError, SerioResult};
use crate::port::{open_device, PortConfiguration, PortError};
use crate::reactor::EventLoop;
use crate::transport::{Protocol, SerialTransport, TransportOptions};
use protocol::StreamShared;
use std::io;
use std::rc::Rc;
use tracing::{debug, info};

/// Everything needed to open a serial connection.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionOptions {
    /// Device URL such as `loop://`. Takes precedence over `port`.
    pub url: Option<String>,
    /// System port path such as `/dev/ttyUSB0` or `COM3`.
    pub port: Option<String>,
    pub serial: PortConfiguration,
    /// Inbound buffer limit of the stream adapter.
    pub limit: usize,
    pub transport: TransportOptions,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            url: None,
            port: None,
            serial: PortConfiguration::default(),
            limit: DEFAULT_LIMIT,
            transport: TransportOptions::default(),
        }
    }
}

impl ConnectionOptions {
    pub fn url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::default()
        }
    }

    pub fn port(port: impl Into<String>) -> Self {
        Self {
            port: Some(port.into()),
            ..Self::default()
        }
    }

    pub fn with_serial(mut self, serial: PortConfiguration) -> Self {
        self.serial = serial;
        self
    }

    pub fn with_transport(mut self, transport: TransportOptions) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// The device to open: `url` if set, else `port`.
    pub fn target(&self) -> SerioResult<&str> {
        self.url
            .as_deref()
            .or(self.port.as_deref())
            .ok_or_else(|| {
                SerioError::InvalidConfig("Either 'url' or 'port' must be specified".to_string())
            })
    }
}

/// Open a device and bind the protocol built by `factory` to it.
///
/// The device is opened on the blocking thread pool so a slow driver never
/// stalls the loop. Returns once the transport is open and
/// `connection_made` has been delivered.
pub async fn create_serial_connection<F, P>(
    event_loop: Rc<dyn EventLoop>,
    factory: F,
    options: &ConnectionOptions,
) -> SerioResult<SerialTransport>
where
    F: FnOnce() -> P,
    P: Protocol + 'static,
{
    let target = options.target()?.to_string();
    options
        .serial
        .validate()
        .map_err(|e| SerioError::InvalidConfig(e.to_string()))?;

    debug!(target = %target, baud_rate = options.serial.baud_rate, "opening serial device");
    let serial = options.serial.clone();
    let device = tokio::task::spawn_blocking(move || open_device(&target, &serial))
        .await
        .map_err(|e| SerioError::Device(PortError::Io(io::Error::new(io::ErrorKind::Other, e))))??;

    let transport = SerialTransport::new(
        event_loop,
        device,
        Box::new(factory()),
        options.transport.clone(),
    )?;
    info!(port = %transport.port_name(), "serial connection established");
    Ok(transport)
}

/// Open a device and wrap it in a reader/writer pair.
///
/// The reader honours `serial.timeout`, the writer's `drain` honours
/// `serial.write_timeout`.
pub async fn open_serial_connection(
    event_loop: Rc<dyn EventLoop>,
    options: &ConnectionOptions,
) -> SerioResult<(SerialReader, SerialWriter)> {
    if options.limit == 0 {
        return Err(SerioError::InvalidConfig(
            "stream limit must be greater than zero".to_string(),
        ));
    }
    let shared = StreamShared::new(options.limit);
    let protocol_shared = Rc::clone(&shared);
    let transport = create_serial_connection(
        event_loop,
        move || StreamProtocol::new(protocol_shared),
        options,
    )
    .await?;

    let reader = SerialReader::new(Rc::clone(&shared), options.serial.timeout);
    let writer = SerialWriter::new(transport, shared, options.serial.write_timeout);
    Ok((reader, writer))
}

/// A reader/writer pair that closes its transport when dropped.
#[derive(Debug)]
pub struct SerialStream {
    reader: SerialReader,
    writer: SerialWriter,
}

impl SerialStream {
    pub async fn open(
        event_loop: Rc<dyn EventLoop>,
        options: &ConnectionOptions,
    ) -> SerioResult<Self> {
        let (reader, writer) = open_serial_connection(event_loop, options).await?;
        Ok(Self { reader, writer })
    }

    pub fn reader(&mut self) -> &mut SerialReader {
        &mut self.reader
    }

    pub fn writer(&self) -> &SerialWriter {
        &self.writer
    }

    /// Borrow both halves at once.
    pub fn split(&mut self) -> (&mut SerialReader, &mut SerialWriter) {
        (&mut self.reader, &mut self.writer)
    }
}

impl Drop for SerialStream {
    fn drop(&mut self) {
        self.writer.close();
    }
}
