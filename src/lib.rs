//! Asynchronous serial port I/O without a thread per connection.
//!
//! serio drives a non-blocking serial device from a single-threaded event
//! loop. It exposes a callback-driven transport/protocol pair and, on top of
//! it, a buffered reader/writer stream interface.
//!
//! # Modules
//!
//! - `port`: device contract, native ports and the in-memory mock
//! - `reactor`: the event-loop contract plus manual and tokio loops
//! - `transport`: the serial transport, its protocol trait and readiness backends
//! - `stream`: buffered reader/writer built on a transport
//! - `config`: TOML configuration with environment overrides
//! - `logging`: tracing subscriber setup for binaries
//! - `error`: connection setup errors

pub mod config;
pub mod error;
pub mod logging;
pub mod port;
pub mod reactor;
pub mod stream;
pub mod transport;

// Re-export commonly used types for convenience
pub use error::{SerioError, SerioResult};
pub use port::{
    open_device, DataBits, FlowControl, MockSerialPort, Parity, PortConfiguration, PortError,
    SerialDevice, StopBits, SyncSerialPort,
};
pub use reactor::{EventLoop, ManualLoop, TokioLoop};
pub use stream::{
    create_serial_connection, open_serial_connection, ConnectionOptions, SerialReader,
    SerialStream, SerialWriter, StreamProtocol,
};
pub use transport::{
    Protocol, ReadinessMode, SerialTransport, TransportError, TransportOptions, TransportState,
};
