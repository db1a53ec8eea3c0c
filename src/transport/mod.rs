//! Serial transport: bridges a non-blocking device to a single-threaded
//! event loop.
//!
//! The transport owns the device, subscribes to readiness through one of two
//! backends, buffers outbound bytes with high/low water-mark flow control and
//! drives a [`Protocol`]. It never blocks: a device that has nothing to give
//! or cannot take more simply leaves the transport waiting for the next
//! readiness notification.
//!
//! # Architecture
//!
//! ```text
//! readiness backend ──> on_read_ready  ──> Protocol::data_received
//! Protocol / app    ──> write          ──> write buffer
//! readiness backend ──> on_write_ready ──> device ──> Protocol::resume_writing
//! ```
//!
//! Errors raised inside readiness callbacks never reach the loop: they end
//! the connection and are handed to `Protocol::connection_lost` exactly once.

mod buffer;
mod error;
mod protocol;
mod readiness;
mod state;

pub use buffer::{WaterMarks, DEFAULT_HIGH_WATER_MARK, DEFAULT_LOW_WATER_MARK};
pub use error::TransportError;
pub use protocol::Protocol;
pub use readiness::{ReadinessMode, OUTPUT_QUEUE_LIMIT};
pub use state::TransportState;

use crate::error::SerioError;
use crate::port::{PortError, SerialDevice};
use crate::reactor::{Direction, EventLoop, Readiness, ReadyHandler, TimerCallback};
use buffer::WriteBuffer;
use readiness::{Backend, DescriptorReadiness, PollingReadiness, ReadinessSource};
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Default size of a single device read.
pub const DEFAULT_READ_CHUNK_SIZE: usize = 4096;

/// Default period of the polling backend.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Tuning knobs of a transport.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportOptions {
    /// Pause the protocol's writer once this many bytes are buffered.
    pub high_water_mark: usize,
    /// Resume the writer once the buffer drains to this many bytes.
    pub low_water_mark: usize,
    /// Maximum bytes pulled from the device per read.
    pub read_chunk_size: usize,
    /// Tick period of the polling backend.
    pub poll_interval: Duration,
    /// Backend selection.
    pub readiness: ReadinessMode,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            high_water_mark: DEFAULT_HIGH_WATER_MARK,
            low_water_mark: DEFAULT_LOW_WATER_MARK,
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
            poll_interval: DEFAULT_POLL_INTERVAL,
            readiness: ReadinessMode::Auto,
        }
    }
}

/// Handle to a serial transport.
///
/// Cheap to clone; every clone refers to the same connection. All methods
/// must be called on the thread that drives the event loop.
///
/// # Example
/// ```
/// use serio::port::MockSerialPort;
/// use serio::reactor::ManualLoop;
/// use serio::transport::{Protocol, SerialTransport, TransportOptions};
///
/// struct Printer;
///
/// impl Protocol for Printer {
///     fn data_received(&mut self, data: &[u8]) {
///         println!("{}", String::from_utf8_lossy(data));
///     }
/// }
///
/// let event_loop = ManualLoop::new();
/// let device = MockSerialPort::loopback("loop://");
/// let transport = SerialTransport::new(
///     event_loop.clone(),
///     Box::new(device),
///     Box::new(Printer),
///     TransportOptions::default(),
/// )?;
///
/// transport.write(b"AT\r\n");
/// assert_eq!(transport.get_write_buffer_size(), 4);
/// transport.close();
/// # Ok::<(), serio::SerioError>(())
/// ```
#[derive(Clone)]
pub struct SerialTransport {
    shared: Rc<Shared>,
}

struct Shared {
    this: Weak<Shared>,
    event_loop: Rc<dyn EventLoop>,
    name: String,
    protocol: RefCell<Option<Box<dyn Protocol>>>,
    core: RefCell<Core>,
}

struct Core {
    state: TransportState,
    device: Option<Box<dyn SerialDevice>>,
    readiness: Option<ReadinessSource>,
    write_buffer: WriteBuffer,
    marks: WaterMarks,
    writing_paused: bool,
    reading_paused: bool,
    /// Scratch space for device reads, one chunk long.
    read_buffer: Vec<u8>,
}

/// Writer flow-control edge produced by a buffer change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlowSignal {
    Pause,
    Resume,
}

impl Core {
    fn maybe_pause(&mut self) -> Option<FlowSignal> {
        if !self.writing_paused
            && !self.write_buffer.is_empty()
            && self.write_buffer.len() >= self.marks.high()
        {
            self.writing_paused = true;
            return Some(FlowSignal::Pause);
        }
        None
    }

    fn maybe_resume(&mut self) -> Option<FlowSignal> {
        if self.writing_paused && self.write_buffer.len() <= self.marks.low() {
            self.writing_paused = false;
            return Some(FlowSignal::Resume);
        }
        None
    }
}

impl SerialTransport {
    /// Wrap an opened device and start watching it.
    ///
    /// On success the transport is `Open` and `connection_made` has already
    /// been delivered. On failure the device is closed and nothing is left
    /// registered with the loop.
    pub fn new(
        event_loop: Rc<dyn EventLoop>,
        mut device: Box<dyn SerialDevice>,
        protocol: Box<dyn Protocol>,
        options: TransportOptions,
    ) -> Result<Self, SerioError> {
        let prepared = WaterMarks::new(options.high_water_mark, options.low_water_mark)
            .map_err(|e| SerioError::InvalidConfig(e.to_string()))
            .and_then(|marks| {
                if options.read_chunk_size == 0 {
                    return Err(SerioError::InvalidConfig(
                        "read chunk size must be greater than zero".to_string(),
                    ));
                }
                let backend =
                    Backend::select(options.readiness, device.descriptor(), &*event_loop)?;
                Ok((marks, backend))
            });
        let (marks, backend) = match prepared {
            Ok(prepared) => prepared,
            Err(e) => {
                device.close();
                return Err(e);
            }
        };

        let name = device.name().to_string();
        let shared = Rc::new_cyclic(|this| Shared {
            this: this.clone(),
            event_loop,
            name,
            protocol: RefCell::new(Some(protocol)),
            core: RefCell::new(Core {
                state: TransportState::Connecting,
                device: Some(device),
                readiness: None,
                write_buffer: WriteBuffer::default(),
                marks,
                writing_paused: false,
                reading_paused: false,
                read_buffer: vec![0u8; options.read_chunk_size],
            }),
        });

        let readiness = match shared.start_readiness(backend, options.poll_interval) {
            Ok(readiness) => readiness,
            Err(e) => {
                if let Some(mut device) = shared.core.borrow_mut().device.take() {
                    device.close();
                }
                shared.protocol.borrow_mut().take();
                return Err(e);
            }
        };

        {
            let mut core = shared.core.borrow_mut();
            core.readiness = Some(readiness);
            core.state = TransportState::Open;
        }
        debug!(port = %shared.name, ?backend, "transport open");

        let transport = Self { shared };
        let handle = transport.clone();
        transport
            .shared
            .notify(move |protocol| protocol.connection_made(handle));
        Ok(transport)
    }

    /// Queue `data` for the device.
    ///
    /// Silently dropped once the transport is closing or closed.
    pub fn write(&self, data: &[u8]) {
        self.shared.write(data);
    }

    /// Queue every chunk of `lines` in order.
    pub fn write_lines<I, B>(&self, lines: I)
    where
        I: IntoIterator<Item = B>,
        B: AsRef<[u8]>,
    {
        for line in lines {
            self.shared.write(line.as_ref());
        }
    }

    /// Serial lines have no half-close.
    pub fn can_write_eof(&self) -> bool {
        false
    }

    /// Always fails with [`TransportError::EofUnsupported`].
    pub fn write_eof(&self) -> Result<(), TransportError> {
        Err(TransportError::EofUnsupported)
    }

    /// Close once the write buffer has drained.
    ///
    /// Reading stops immediately. Calling this again has no further effect.
    pub fn close(&self) {
        self.shared.close();
    }

    /// Tear down immediately, discarding buffered bytes.
    ///
    /// The protocol sees `connection_lost(None)`.
    pub fn abort(&self) {
        self.shared.teardown(TransportState::Closed, None);
    }

    /// Tear down immediately with `error`, discarding buffered bytes.
    pub fn abort_with(&self, error: TransportError) {
        self.shared.teardown(TransportState::Errored, Some(error));
    }

    /// Stop pulling bytes from the device until [`resume_reading`](Self::resume_reading).
    ///
    /// Unread bytes stay in the device's own input buffer. A no-op once the
    /// transport is closing.
    pub fn pause_reading(&self) -> Result<(), TransportError> {
        self.shared.set_reading_paused(true)
    }

    /// Undo [`pause_reading`](Self::pause_reading).
    pub fn resume_reading(&self) -> Result<(), TransportError> {
        self.shared.set_reading_paused(false)
    }

    /// Whether bytes are currently being pulled from the device.
    pub fn is_reading(&self) -> bool {
        let core = self.shared.core.borrow();
        core.state == TransportState::Open && !core.reading_paused
    }

    /// Whether `close` or `abort` has been called or the device failed.
    pub fn is_closing(&self) -> bool {
        matches!(
            self.state(),
            TransportState::Closing | TransportState::Closed | TransportState::Errored
        )
    }

    pub fn state(&self) -> TransportState {
        self.shared.core.borrow().state
    }

    /// Bytes buffered but not yet accepted by the device.
    pub fn get_write_buffer_size(&self) -> usize {
        self.shared.core.borrow().write_buffer.len()
    }

    /// Current `(low, high)` write buffer limits.
    pub fn get_write_buffer_limits(&self) -> (usize, usize) {
        let marks = self.shared.core.borrow().marks;
        (marks.low(), marks.high())
    }

    /// Change the write buffer limits and re-evaluate flow control.
    ///
    /// Missing values default as in [`WaterMarks::resolve`].
    pub fn set_write_buffer_limits(
        &self,
        high: Option<usize>,
        low: Option<usize>,
    ) -> Result<(), TransportError> {
        let marks = WaterMarks::resolve(high, low)?;
        let signal = {
            let mut core = self.shared.core.borrow_mut();
            core.marks = marks;
            core.maybe_resume().or_else(|| core.maybe_pause())
        };
        self.shared.emit(signal);
        Ok(())
    }

    /// Name of the underlying device.
    pub fn port_name(&self) -> &str {
        &self.shared.name
    }

    /// Run `f` against the underlying device, for example to drive modem
    /// lines.
    ///
    /// Returns `None` once the device has been released. `f` must not call
    /// back into this transport.
    ///
    /// ```
    /// # use serio::port::{MockSerialPort, SerialDevice};
    /// # use serio::reactor::ManualLoop;
    /// # use serio::transport::{Protocol, SerialTransport, TransportOptions};
    /// # struct Quiet;
    /// # impl Protocol for Quiet {
    /// #     fn data_received(&mut self, _data: &[u8]) {}
    /// # }
    /// # let device = MockSerialPort::new("MOCK0");
    /// # let transport = SerialTransport::new(
    /// #     ManualLoop::new(),
    /// #     Box::new(device.clone()),
    /// #     Box::new(Quiet),
    /// #     TransportOptions::default(),
    /// # )?;
    /// let toggled = transport.with_device(|device| device.set_data_terminal_ready(true));
    /// assert!(matches!(toggled, Some(Ok(()))));
    /// assert_eq!(device.modem_lines(), (true, false));
    /// # Ok::<(), serio::SerioError>(())
    /// ```
    pub fn with_device<R>(&self, f: impl FnOnce(&mut dyn SerialDevice) -> R) -> Option<R> {
        let mut core = self.shared.core.try_borrow_mut().ok()?;
        let device = core.device.as_mut()?;
        Some(f(device.as_mut()))
    }

    /// Read readiness entry point, as invoked by a readiness backend.
    pub fn on_read_ready(&self) -> Readiness {
        self.shared.on_read_ready()
    }

    /// Write readiness entry point, as invoked by a readiness backend.
    pub fn on_write_ready(&self) -> Readiness {
        self.shared.on_write_ready()
    }
}

impl fmt::Debug for SerialTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let core = self.shared.core.borrow();
        f.debug_struct("SerialTransport")
            .field("port", &self.shared.name)
            .field("state", &core.state)
            .field("write_buffer", &core.write_buffer.len())
            .field("writing_paused", &core.writing_paused)
            .field("reading_paused", &core.reading_paused)
            .finish()
    }
}

impl Shared {
    fn start_readiness(
        &self,
        backend: Backend,
        poll_interval: Duration,
    ) -> Result<ReadinessSource, SerioError> {
        let event_loop = &*self.event_loop;
        match backend {
            Backend::Descriptor(descriptor) => {
                let weak = self.this.clone();
                let handler: ReadyHandler = Rc::new(move |direction| match weak.upgrade() {
                    Some(shared) => match direction {
                        Direction::Read => shared.on_read_ready(),
                        Direction::Write => shared.on_write_ready(),
                    },
                    None => Readiness::Exhausted,
                });
                DescriptorReadiness::start(event_loop, descriptor, handler)
                    .map(ReadinessSource::Descriptor)
                    .map_err(|e| {
                        SerioError::PlatformNotSupported(format!(
                            "descriptor readiness not supported: {e}"
                        ))
                    })
            }
            Backend::Polling => {
                let weak = self.this.clone();
                let tick: TimerCallback = Rc::new(move || {
                    if let Some(shared) = weak.upgrade() {
                        shared.poll_tick();
                    }
                });
                Ok(ReadinessSource::Polling(PollingReadiness::start(
                    event_loop,
                    poll_interval,
                    tick,
                )))
            }
        }
    }

    /// Deliver an event to the protocol, deferring it when the protocol is
    /// already inside a callback so callbacks never nest.
    fn notify<F>(&self, event: F)
    where
        F: FnOnce(&mut dyn Protocol) + 'static,
    {
        match self.protocol.try_borrow_mut() {
            Ok(mut slot) => {
                if let Some(protocol) = slot.as_mut() {
                    event(protocol.as_mut());
                }
            }
            Err(_) => {
                if let Some(shared) = self.this.upgrade() {
                    self.event_loop
                        .call_soon(Box::new(move || shared.notify(event)));
                }
            }
        }
    }

    fn emit(&self, signal: Option<FlowSignal>) {
        match signal {
            Some(FlowSignal::Pause) => {
                debug!(port = %self.name, "write buffer above high-water mark, pausing writer");
                self.notify(|protocol| protocol.pause_writing());
            }
            Some(FlowSignal::Resume) => {
                debug!(port = %self.name, "write buffer at low-water mark, resuming writer");
                self.notify(|protocol| protocol.resume_writing());
            }
            None => {}
        }
    }

    fn set_interest(&self, core: &mut Core, direction: Direction, enabled: bool) {
        if let Some(readiness) = core.readiness.as_mut() {
            if let Err(e) = readiness.set_interest(&*self.event_loop, direction, enabled) {
                warn!(port = %self.name, ?direction, error = %e, "failed to update readiness interest");
            }
        }
    }

    fn write(&self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        let signal = {
            let mut core = self.core.borrow_mut();
            if core.state != TransportState::Open {
                trace!(port = %self.name, len = data.len(), state = %core.state, "write dropped");
                return;
            }
            core.write_buffer.push(data);
            self.set_interest(&mut core, Direction::Write, true);
            trace!(port = %self.name, len = data.len(), buffered = core.write_buffer.len(), "write queued");
            core.maybe_pause()
        };
        self.emit(signal);
    }

    fn on_read_ready(&self) -> Readiness {
        let (result, chunk) = {
            let mut core = self.core.borrow_mut();
            if core.state != TransportState::Open || core.reading_paused {
                return Readiness::Exhausted;
            }
            let Core {
                device,
                read_buffer,
                ..
            } = &mut *core;
            let chunk = read_buffer.len();
            let Some(device) = device.as_mut() else {
                return Readiness::Exhausted;
            };
            let result = match device.read_nonblocking(read_buffer) {
                Ok(n) => Ok(read_buffer[..n].to_vec()),
                Err(e) if e.is_would_block() => Ok(Vec::new()),
                Err(e) => Err(e),
            };
            (result, chunk)
        };

        match result {
            Ok(data) if data.is_empty() => Readiness::Exhausted,
            Ok(data) => {
                trace!(port = %self.name, len = data.len(), "data received");
                let readiness = if data.len() < chunk {
                    Readiness::Exhausted
                } else {
                    Readiness::Remaining
                };
                self.notify(move |protocol| protocol.data_received(&data));
                readiness
            }
            Err(e) => {
                self.fatal_error(e);
                Readiness::Exhausted
            }
        }
    }

    fn on_write_ready(&self) -> Readiness {
        let outcome = {
            let mut core = self.core.borrow_mut();
            if !core.state.is_draining() {
                return Readiness::Exhausted;
            }
            if core.write_buffer.is_empty() {
                self.set_interest(&mut core, Direction::Write, false);
                return Readiness::Exhausted;
            }

            let Core {
                device,
                write_buffer,
                ..
            } = &mut *core;
            let Some(device) = device.as_mut() else {
                return Readiness::Exhausted;
            };
            let pending = write_buffer.pending();
            let requested = pending.len();
            match device.write_nonblocking(pending) {
                Ok(n) => {
                    write_buffer.consume(n);
                    trace!(port = %self.name, written = n, remaining = write_buffer.len(), "drained");
                    Ok(n < requested)
                }
                Err(e) if e.is_would_block() => Ok(true),
                Err(e) => Err(e),
            }
        };

        let exhausted = match outcome {
            Ok(exhausted) => exhausted,
            Err(e) => {
                self.fatal_error(e);
                return Readiness::Exhausted;
            }
        };

        let (signal, finished) = {
            let mut core = self.core.borrow_mut();
            let drained = core.write_buffer.is_empty();
            if drained {
                self.set_interest(&mut core, Direction::Write, false);
            }
            let signal = core.maybe_resume();
            (signal, drained && core.state == TransportState::Closing)
        };
        self.emit(signal);
        if finished {
            self.teardown(TransportState::Closed, None);
        }

        if exhausted {
            Readiness::Exhausted
        } else {
            Readiness::Remaining
        }
    }

    /// One probe of the polling backend.
    fn poll_tick(&self) {
        let (probe_read, probe_write) = {
            let core = self.core.borrow();
            let Some(device) = core.device.as_ref() else {
                return;
            };
            let probe_read = core.state == TransportState::Open
                && !core.reading_paused
                && device.bytes_to_read().map_or(true, |n| n > 0);
            let probe_write = core.state.is_draining()
                && !core.write_buffer.is_empty()
                && device
                    .bytes_to_write()
                    .map_or(true, |queued| queued < OUTPUT_QUEUE_LIMIT);
            (probe_read, probe_write)
        };

        if probe_read {
            self.on_read_ready();
        }
        if probe_write {
            self.on_write_ready();
        }
    }

    fn set_reading_paused(&self, paused: bool) -> Result<(), TransportError> {
        let mut core = self.core.borrow_mut();
        if core.state != TransportState::Open {
            return Ok(());
        }
        match (paused, core.reading_paused) {
            (true, true) => return Err(TransportError::ReadingAlreadyPaused),
            (false, false) => return Err(TransportError::ReadingNotPaused),
            _ => {}
        }
        core.reading_paused = paused;
        self.set_interest(&mut core, Direction::Read, !paused);
        debug!(port = %self.name, paused, "reading flow control changed");
        Ok(())
    }

    fn close(&self) {
        let finished = {
            let mut core = self.core.borrow_mut();
            if core.state != TransportState::Open {
                return;
            }
            self.set_interest(&mut core, Direction::Read, false);
            if core.write_buffer.is_empty() {
                true
            } else {
                core.state = TransportState::Closing;
                debug!(port = %self.name, pending = core.write_buffer.len(), "transport closing, draining");
                false
            }
        };
        if finished {
            self.teardown(TransportState::Closed, None);
        }
    }

    fn fatal_error(&self, error: PortError) {
        warn!(port = %self.name, error = %error, "fatal device error, closing transport");
        self.teardown(TransportState::Errored, Some(TransportError::Device(error)));
    }

    /// Move to a terminal state: stop readiness, release the device and
    /// schedule the single `connection_lost`.
    fn teardown(&self, terminal: TransportState, error: Option<TransportError>) {
        let device = {
            let mut core = self.core.borrow_mut();
            if core.state.is_terminal() {
                return;
            }
            debug!(port = %self.name, from = %core.state, to = %terminal, "transport teardown");
            core.state = terminal;
            if let Some(mut readiness) = core.readiness.take() {
                readiness.teardown(&*self.event_loop);
            }
            let discarded = core.write_buffer.len();
            if discarded > 0 {
                debug!(port = %self.name, discarded, "discarding unsent bytes");
            }
            core.write_buffer.clear();
            core.writing_paused = false;
            core.device.take()
        };
        if let Some(mut device) = device {
            device.close();
        }

        if let Some(shared) = self.this.upgrade() {
            self.event_loop
                .call_soon(Box::new(move || shared.deliver_connection_lost(error)));
        }
    }

    fn deliver_connection_lost(self: Rc<Self>, error: Option<TransportError>) {
        let protocol = match self.protocol.try_borrow_mut() {
            Ok(mut slot) => slot.take(),
            Err(_) => {
                let shared = Rc::clone(&self);
                self.event_loop
                    .call_soon(Box::new(move || shared.deliver_connection_lost(error)));
                return;
            }
        };
        if let Some(mut protocol) = protocol {
            protocol.connection_lost(error);
        }
    }
}
