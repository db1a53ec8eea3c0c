//! Shared test utilities for serio integration tests.
//!
//! This module provides:
//! - A recording protocol that logs every transport callback
//! - Builders for transports over a `ManualLoop` and a `MockSerialPort`
//! - Helpers to drain a transport tick by tick

#![allow(dead_code)]

use serio::port::MockSerialPort;
use serio::reactor::{Descriptor, Direction, ManualLoop};
use serio::transport::{Protocol, SerialTransport, TransportError, TransportOptions};
use std::cell::RefCell;
use std::rc::Rc;

/// Descriptor the mock devices expose in descriptor-readiness tests.
pub const MOCK_FD: Descriptor = Descriptor::new(42);

/// One callback observed by a [`RecordingProtocol`].
#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolEvent {
    ConnectionMade,
    DataReceived(Vec<u8>),
    ConnectionLost(Option<String>),
    PauseWriting,
    ResumeWriting,
}

/// Protocol that records its callbacks into a shared log.
#[derive(Clone, Default)]
pub struct RecordingProtocol {
    log: Rc<RefCell<Vec<ProtocolEvent>>>,
}

impl RecordingProtocol {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ProtocolEvent> {
        self.log.borrow().clone()
    }

    /// Concatenation of every `data_received` payload.
    pub fn received(&self) -> Vec<u8> {
        self.log
            .borrow()
            .iter()
            .filter_map(|event| match event {
                ProtocolEvent::DataReceived(data) => Some(data.as_slice()),
                _ => None,
            })
            .flatten()
            .copied()
            .collect()
    }

    pub fn count(&self, wanted: &ProtocolEvent) -> usize {
        self.log.borrow().iter().filter(|e| *e == wanted).count()
    }

    pub fn connection_lost_count(&self) -> usize {
        self.log
            .borrow()
            .iter()
            .filter(|e| matches!(e, ProtocolEvent::ConnectionLost(_)))
            .count()
    }

    /// Index of the first event equal to `wanted`.
    pub fn position(&self, wanted: &ProtocolEvent) -> Option<usize> {
        self.log.borrow().iter().position(|e| e == wanted)
    }
}

impl Protocol for RecordingProtocol {
    fn connection_made(&mut self, _transport: SerialTransport) {
        self.log.borrow_mut().push(ProtocolEvent::ConnectionMade);
    }

    fn data_received(&mut self, data: &[u8]) {
        self.log
            .borrow_mut()
            .push(ProtocolEvent::DataReceived(data.to_vec()));
    }

    fn connection_lost(&mut self, error: Option<TransportError>) {
        self.log
            .borrow_mut()
            .push(ProtocolEvent::ConnectionLost(error.map(|e| e.to_string())));
    }

    fn pause_writing(&mut self) {
        self.log.borrow_mut().push(ProtocolEvent::PauseWriting);
    }

    fn resume_writing(&mut self) {
        self.log.borrow_mut().push(ProtocolEvent::ResumeWriting);
    }
}

/// Everything a transport test needs to drive and inspect a connection.
pub struct Harness {
    pub event_loop: Rc<ManualLoop>,
    pub device: MockSerialPort,
    pub protocol: RecordingProtocol,
    pub transport: SerialTransport,
}

impl Harness {
    /// Transport over a mock with a descriptor, so the descriptor backend is used.
    pub fn with_descriptor(options: TransportOptions) -> Self {
        Self::build(MockSerialPort::new("MOCK0").with_descriptor(MOCK_FD), options)
    }

    /// Transport over a mock without a descriptor, so the polling backend is used.
    pub fn polling(options: TransportOptions) -> Self {
        Self::build(MockSerialPort::new("MOCK0"), options)
    }

    pub fn build(device: MockSerialPort, options: TransportOptions) -> Self {
        let event_loop = ManualLoop::new();
        let protocol = RecordingProtocol::new();
        let transport = SerialTransport::new(
            event_loop.clone(),
            Box::new(device.clone()),
            Box::new(protocol.clone()),
            options,
        )
        .expect("transport should open over a mock device");
        Self {
            event_loop,
            device,
            protocol,
            transport,
        }
    }

    pub fn fire_read(&self) {
        self.event_loop.fire(MOCK_FD, Direction::Read);
    }

    pub fn fire_write(&self) {
        self.event_loop.fire(MOCK_FD, Direction::Write);
    }

    /// Fire write readiness until the buffer is empty or `max_ticks` pass.
    ///
    /// Returns the number of ticks used.
    pub fn drain(&self, max_ticks: usize) -> usize {
        let mut ticks = 0;
        while self.transport.get_write_buffer_size() > 0 && ticks < max_ticks {
            self.fire_write();
            ticks += 1;
        }
        ticks
    }
}

/// Transport options with the given watermarks.
pub fn watermarks(high: usize, low: usize) -> TransportOptions {
    TransportOptions {
        high_water_mark: high,
        low_water_mark: low,
        ..TransportOptions::default()
    }
}
