//! Transport lifecycle states.

use std::fmt;

/// Lifecycle of a serial transport.
///
/// ```text
/// CONNECTING ─> OPEN ─┬─> CLOSING ─┬─> CLOSED
///                     │            └─> ERRORED
///                     ├─> CLOSED
///                     └─> ERRORED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    /// Device opened, protocol not yet told.
    Connecting,
    /// Reads and writes flowing.
    Open,
    /// Close requested with bytes still buffered; draining only.
    Closing,
    /// Shut down cleanly or aborted without an error.
    Closed,
    /// Shut down by a device error or an abort carrying one.
    Errored,
}

impl TransportState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Errored)
    }

    /// Whether buffered bytes may still go out to the device.
    pub fn is_draining(self) -> bool {
        matches!(self, Self::Open | Self::Closing)
    }
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closing => "closing",
            Self::Closed => "closed",
            Self::Errored => "errored",
        };
        f.write_str(name)
    }
}
