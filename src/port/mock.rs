//! Mock serial device for testing and `loop://` connections.
//!
//! Provides a `MockSerialPort` that simulates a non-blocking serial device
//! without requiring hardware. Supports queued input, a write log, a
//! per-call acceptance limit, loopback mode and injected failures.

use super::error::PortError;
use super::traits::SerialDevice;
use crate::reactor::Descriptor;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

/// Inner state of the mock port, shared between clones.
#[derive(Debug, Default)]
struct MockPortState {
    /// Bytes returned by subsequent reads.
    read_queue: VecDeque<u8>,
    /// Every accepted write, in order.
    write_log: Vec<Vec<u8>>,
    /// Maximum bytes accepted by a single write call.
    write_limit: Option<usize>,
    /// Writes echo back into the read queue.
    loopback: bool,
    /// Error returned by the next read.
    read_error: Option<std::io::ErrorKind>,
    /// Error returned by the next write.
    write_error: Option<std::io::ErrorKind>,
    /// Fail every write with `WouldBlock` while set.
    write_blocked: bool,
    /// Reported output-queue depth.
    output_queued: usize,
    /// Number of read/write/probe calls made against the device.
    accesses: usize,
    /// Fake readiness descriptor.
    descriptor: Option<Descriptor>,
    dtr: bool,
    rts: bool,
    closed: bool,
}

/// Mock serial device.
///
/// Clones share state, so a test can keep one handle for inspection while
/// the transport owns another.
///
/// # Example
/// ```
/// use serio::port::{MockSerialPort, SerialDevice};
///
/// let mut port = MockSerialPort::new("MOCK0");
/// port.enqueue_read(b"Hello, World!");
///
/// let mut buffer = [0u8; 13];
/// let n = port.read_nonblocking(&mut buffer).unwrap();
/// assert_eq!(&buffer[..n], b"Hello, World!");
///
/// port.write_nonblocking(b"Response").unwrap();
/// assert_eq!(port.written(), b"Response");
/// ```
#[derive(Clone)]
pub struct MockSerialPort {
    name: String,
    state: Arc<Mutex<MockPortState>>,
}

impl MockSerialPort {
    /// Create a new mock serial port with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Arc::new(Mutex::new(MockPortState::default())),
        }
    }

    /// Create a mock whose writes become readable, like a wired loopback plug.
    pub fn loopback(name: impl Into<String>) -> Self {
        let port = Self::new(name);
        port.state().loopback = true;
        port
    }

    fn state(&self) -> MutexGuard<'_, MockPortState> {
        // A panic while holding the lock only happens inside a failing test.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Enqueue bytes to be returned by subsequent read operations.
    pub fn enqueue_read(&self, data: &[u8]) {
        self.state().read_queue.extend(data);
    }

    /// Limit how many bytes a single write call accepts.
    pub fn set_write_limit(&self, limit: Option<usize>) {
        self.state().write_limit = limit;
    }

    /// Make every write report `WouldBlock` until cleared.
    pub fn set_write_blocked(&self, blocked: bool) {
        self.state().write_blocked = blocked;
    }

    /// Fail the next read with the given I/O error kind.
    pub fn fail_next_read(&self, kind: std::io::ErrorKind) {
        self.state().read_error = Some(kind);
    }

    /// Fail the next write with the given I/O error kind.
    pub fn fail_next_write(&self, kind: std::io::ErrorKind) {
        self.state().write_error = Some(kind);
    }

    /// Report `queued` bytes pending in the device output queue.
    pub fn set_output_queued(&self, queued: usize) {
        self.state().output_queued = queued;
    }

    /// Expose a fake readiness descriptor.
    pub fn with_descriptor(self, descriptor: Descriptor) -> Self {
        self.state().descriptor = Some(descriptor);
        self
    }

    /// Get a copy of every accepted write.
    pub fn get_write_log(&self) -> Vec<Vec<u8>> {
        self.state().write_log.clone()
    }

    /// All accepted bytes concatenated in wire order.
    pub fn written(&self) -> Vec<u8> {
        self.state().write_log.concat()
    }

    /// Clear the write log.
    pub fn clear_write_log(&self) {
        self.state().write_log.clear();
    }

    /// Get the number of bytes available to read.
    pub fn available_bytes(&self) -> usize {
        self.state().read_queue.len()
    }

    /// Number of device calls made so far.
    pub fn access_count(&self) -> usize {
        self.state().accesses
    }

    /// Current `(dtr, rts)` modem line levels.
    pub fn modem_lines(&self) -> (bool, bool) {
        let state = self.state();
        (state.dtr, state.rts)
    }

    /// Whether `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.state().closed
    }
}

impl SerialDevice for MockSerialPort {
    fn name(&self) -> &str {
        &self.name
    }

    fn read_nonblocking(&mut self, buffer: &mut [u8]) -> Result<usize, PortError> {
        let mut state = self.state();
        if state.closed {
            return Err(PortError::NotOpen);
        }
        state.accesses += 1;

        if let Some(kind) = state.read_error.take() {
            return Err(PortError::Io(std::io::Error::new(kind, "injected read failure")));
        }

        let n = buffer.len().min(state.read_queue.len());
        for (slot, byte) in buffer.iter_mut().zip(state.read_queue.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn write_nonblocking(&mut self, data: &[u8]) -> Result<usize, PortError> {
        let mut state = self.state();
        if state.closed {
            return Err(PortError::NotOpen);
        }
        state.accesses += 1;

        if let Some(kind) = state.write_error.take() {
            return Err(PortError::Io(std::io::Error::new(kind, "injected write failure")));
        }
        if state.write_blocked {
            return Err(PortError::WouldBlock);
        }

        let n = state.write_limit.map_or(data.len(), |limit| limit.min(data.len()));
        if n == 0 && !data.is_empty() {
            return Err(PortError::WouldBlock);
        }
        let accepted = &data[..n];
        state.write_log.push(accepted.to_vec());
        if state.loopback {
            state.read_queue.extend(accepted);
        }
        Ok(n)
    }

    fn descriptor(&self) -> Option<Descriptor> {
        self.state().descriptor
    }

    fn bytes_to_read(&self) -> Option<usize> {
        let mut state = self.state();
        state.accesses += 1;
        Some(state.read_queue.len())
    }

    fn bytes_to_write(&self) -> Option<usize> {
        Some(self.state().output_queued)
    }

    fn set_data_terminal_ready(&mut self, level: bool) -> Result<(), PortError> {
        let mut state = self.state();
        if state.closed {
            return Err(PortError::NotOpen);
        }
        state.dtr = level;
        Ok(())
    }

    fn set_request_to_send(&mut self, level: bool) -> Result<(), PortError> {
        let mut state = self.state();
        if state.closed {
            return Err(PortError::NotOpen);
        }
        state.rts = level;
        Ok(())
    }

    fn close(&mut self) {
        self.state().closed = true;
    }
}

impl std::fmt::Debug for MockSerialPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockSerialPort")
            .field("name", &self.name)
            .field("available_bytes", &self.available_bytes())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enqueue_and_read() {
        let mut port = MockSerialPort::new("MOCK0");
        port.enqueue_read(b"Hello");

        let mut buffer = [0u8; 10];
        let n = port.read_nonblocking(&mut buffer).unwrap();
        assert_eq!(n, 5);
        assert_eq!(&buffer[..n], b"Hello");
    }

    #[test]
    fn test_empty_read_is_not_an_error() {
        let mut port = MockSerialPort::new("MOCK0");
        let mut buffer = [0u8; 10];
        assert_eq!(port.read_nonblocking(&mut buffer).unwrap(), 0);
    }

    #[test]
    fn test_partial_read() {
        let mut port = MockSerialPort::new("MOCK0");
        port.enqueue_read(b"Hello, World!");

        let mut buffer = [0u8; 5];
        let n = port.read_nonblocking(&mut buffer).unwrap();
        assert_eq!(&buffer[..n], b"Hello");
        assert_eq!(port.available_bytes(), 8);
    }

    #[test]
    fn test_write_limit_yields_partial_writes() {
        let mut port = MockSerialPort::new("MOCK0");
        port.set_write_limit(Some(3));

        assert_eq!(port.write_nonblocking(b"abcdef").unwrap(), 3);
        assert_eq!(port.write_nonblocking(b"def").unwrap(), 3);
        assert_eq!(port.get_write_log(), vec![b"abc".to_vec(), b"def".to_vec()]);
    }

    #[test]
    fn test_blocked_write() {
        let mut port = MockSerialPort::new("MOCK0");
        port.set_write_blocked(true);
        assert!(matches!(
            port.write_nonblocking(b"x"),
            Err(PortError::WouldBlock)
        ));
        assert!(port.written().is_empty());
    }

    #[test]
    fn test_loopback_echoes_writes() {
        let mut port = MockSerialPort::loopback("loop");
        port.write_nonblocking(b"AT\r\n").unwrap();
        assert_eq!(port.bytes_to_read(), Some(4));
    }

    #[test]
    fn test_injected_failures_fire_once() {
        let mut port = MockSerialPort::new("MOCK0");
        port.fail_next_read(std::io::ErrorKind::BrokenPipe);
        let mut buffer = [0u8; 4];
        assert!(port.read_nonblocking(&mut buffer).is_err());
        assert!(port.read_nonblocking(&mut buffer).is_ok());
    }

    #[test]
    fn test_closed_port_rejects_io() {
        let mut port = MockSerialPort::new("MOCK0");
        let observer = port.clone();
        port.close();
        assert!(observer.is_closed());
        assert!(matches!(
            port.write_nonblocking(b"x"),
            Err(PortError::NotOpen)
        ));
    }
}
