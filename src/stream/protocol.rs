//! Protocol that turns transport callbacks into buffered stream state.

use crate::transport::{Protocol, SerialTransport, TransportError};
use std::cell::RefCell;
use std::io;
use std::rc::Rc;
use std::task::Waker;
use tracing::{debug, trace};

/// Inbound buffer limit used when none is configured.
pub const DEFAULT_LIMIT: usize = 64 * 1024;

/// State shared by a [`StreamProtocol`] and the reader/writer halves.
#[derive(Debug)]
pub(crate) struct StreamShared {
    pub buffer: Vec<u8>,
    pub limit: usize,
    pub eof: bool,
    /// Error the connection ended with, kept as kind and message so every
    /// waiter can be handed its own copy.
    pub error: Option<(io::ErrorKind, String)>,
    pub transport: Option<SerialTransport>,
    pub reading_paused: bool,
    pub writing_paused: bool,
    pub connection_lost: bool,
    read_waker: Option<Waker>,
    write_wakers: Vec<Waker>,
    close_wakers: Vec<Waker>,
}

impl StreamShared {
    pub fn new(limit: usize) -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self {
            buffer: Vec::new(),
            limit,
            eof: false,
            error: None,
            transport: None,
            reading_paused: false,
            writing_paused: false,
            connection_lost: false,
            read_waker: None,
            write_wakers: Vec::new(),
            close_wakers: Vec::new(),
        }))
    }

    pub fn error(&self) -> Option<io::Error> {
        self.error
            .as_ref()
            .map(|(kind, message)| io::Error::new(*kind, message.clone()))
    }

    pub fn park_reader(&mut self, waker: &Waker) {
        self.read_waker = Some(waker.clone());
    }

    pub fn park_writer(&mut self, waker: &Waker) {
        if !self.write_wakers.iter().any(|w| w.will_wake(waker)) {
            self.write_wakers.push(waker.clone());
        }
    }

    pub fn park_closer(&mut self, waker: &Waker) {
        if !self.close_wakers.iter().any(|w| w.will_wake(waker)) {
            self.close_wakers.push(waker.clone());
        }
    }

    /// Take `n` bytes off the front and let the transport read again once
    /// the buffer is back under the limit.
    pub fn consume(&mut self, n: usize) -> Vec<u8> {
        let n = n.min(self.buffer.len());
        let data: Vec<u8> = self.buffer.drain(..n).collect();
        self.maybe_resume_reading();
        data
    }

    fn maybe_resume_reading(&mut self) {
        if self.reading_paused && self.buffer.len() <= self.limit {
            self.reading_paused = false;
            if let Some(transport) = &self.transport {
                // Only fails when reading was not paused, which the flag rules out.
                let _ = transport.resume_reading();
            }
        }
    }

    fn maybe_pause_reading(&mut self) {
        if self.reading_paused || self.buffer.len() <= self.limit.saturating_mul(2) {
            return;
        }
        if let Some(transport) = &self.transport {
            if transport.pause_reading().is_ok() {
                self.reading_paused = true;
                debug!(buffered = self.buffer.len(), limit = self.limit, "stream buffer full, reading paused");
            }
        }
    }

    fn wake_reader(&mut self) {
        if let Some(waker) = self.read_waker.take() {
            waker.wake();
        }
    }

    fn wake_writers(&mut self) {
        for waker in self.write_wakers.drain(..) {
            waker.wake();
        }
    }
}

/// [`Protocol`] backing a [`SerialReader`](super::SerialReader) /
/// [`SerialWriter`](super::SerialWriter) pair.
pub struct StreamProtocol {
    shared: Rc<RefCell<StreamShared>>,
}

impl StreamProtocol {
    pub(crate) fn new(shared: Rc<RefCell<StreamShared>>) -> Self {
        Self { shared }
    }
}

impl Protocol for StreamProtocol {
    fn connection_made(&mut self, transport: SerialTransport) {
        self.shared.borrow_mut().transport = Some(transport);
    }

    fn data_received(&mut self, data: &[u8]) {
        let mut shared = self.shared.borrow_mut();
        shared.buffer.extend_from_slice(data);
        trace!(len = data.len(), buffered = shared.buffer.len(), "stream data buffered");
        shared.wake_reader();
        shared.maybe_pause_reading();
    }

    fn connection_lost(&mut self, error: Option<TransportError>) {
        let mut shared = self.shared.borrow_mut();
        if let Some(error) = error {
            let error = io::Error::from(error);
            shared.error = Some((error.kind(), error.to_string()));
        }
        shared.eof = true;
        shared.connection_lost = true;
        shared.writing_paused = false;
        shared.transport = None;
        shared.wake_reader();
        shared.wake_writers();
        for waker in shared.close_wakers.drain(..) {
            waker.wake();
        }
    }

    fn pause_writing(&mut self) {
        self.shared.borrow_mut().writing_paused = true;
    }

    fn resume_writing(&mut self) {
        let mut shared = self.shared.borrow_mut();
        shared.writing_paused = false;
        shared.wake_writers();
    }
}
