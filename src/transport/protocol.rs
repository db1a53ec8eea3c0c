//! Callback interface a transport drives.

use super::error::TransportError;
use super::SerialTransport;

/// Receiver of transport events.
///
/// A protocol is bound to exactly one transport for its whole life. All
/// callbacks run on the event-loop thread, one at a time and never nested:
/// if the protocol triggers a notification from inside a callback (for
/// example `pause_writing` caused by a `write` in `data_received`), that
/// notification is delivered on a later loop turn.
///
/// The transport drops the protocol right after `connection_lost` returns.
pub trait Protocol {
    /// The connection is open. `transport` stays valid for writes until
    /// `connection_lost`.
    fn connection_made(&mut self, transport: SerialTransport) {
        let _ = transport;
    }

    /// Bytes arrived, verbatim and in order. No framing is applied.
    fn data_received(&mut self, data: &[u8]);

    /// The connection ended. `None` means a clean close or a plain abort.
    fn connection_lost(&mut self, error: Option<TransportError>) {
        let _ = error;
    }

    /// The write buffer reached the high-water mark; stop producing.
    fn pause_writing(&mut self) {}

    /// The write buffer drained to the low-water mark; producing may resume.
    fn resume_writing(&mut self) {}
}
