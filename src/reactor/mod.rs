//! Minimal event-loop contract a transport needs.
//!
//! A transport does not own a scheduler. It asks the loop for three things:
//! readiness callbacks on a native descriptor, callbacks "as soon as
//! possible" on a later turn, and a recurring timer. Everything runs on one
//! thread, so callbacks are plain `Rc` closures and never need to be `Send`.
//!
//! Two loops ship with the crate:
//!
//! - [`ManualLoop`]: deterministic, driven by hand. Used by the test suite
//!   and by applications embedding a transport into their own loop.
//! - [`TokioLoop`]: runs on a tokio `LocalSet`, with descriptor readiness
//!   from `AsyncFd` on Unix.

pub mod manual;
pub mod tokio_loop;

pub use manual::ManualLoop;
pub use tokio_loop::TokioLoop;

use std::cell::Cell;
use std::io;
use std::rc::Rc;
use std::time::Duration;

/// Native readiness handle of a device (a file descriptor on Unix).
///
/// Registering a descriptor never transfers ownership; the device that
/// produced it is responsible for closing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Descriptor(i32);

impl Descriptor {
    /// Wrap a raw descriptor value.
    pub const fn new(raw: i32) -> Self {
        Self(raw)
    }

    /// The raw descriptor value.
    pub const fn raw(self) -> i32 {
        self.0
    }
}

impl From<i32> for Descriptor {
    fn from(raw: i32) -> Self {
        Self(raw)
    }
}

#[cfg(unix)]
impl std::os::fd::AsRawFd for Descriptor {
    fn as_raw_fd(&self) -> std::os::fd::RawFd {
        self.0
    }
}

/// One I/O direction of a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Read,
    Write,
}

/// Interest set of a single descriptor registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Interest {
    read: bool,
    write: bool,
}

impl Interest {
    pub const NONE: Interest = Interest {
        read: false,
        write: false,
    };
    pub const READ: Interest = Interest {
        read: true,
        write: false,
    };
    pub const WRITE: Interest = Interest {
        read: false,
        write: true,
    };
    pub const BOTH: Interest = Interest {
        read: true,
        write: true,
    };

    /// Whether `direction` is part of the set.
    pub const fn contains(self, direction: Direction) -> bool {
        match direction {
            Direction::Read => self.read,
            Direction::Write => self.write,
        }
    }

    /// Copy of the set with `direction` switched on or off.
    pub const fn with(self, direction: Direction, enabled: bool) -> Self {
        match direction {
            Direction::Read => Interest {
                read: enabled,
                write: self.write,
            },
            Direction::Write => Interest {
                read: self.read,
                write: enabled,
            },
        }
    }

    pub const fn is_empty(self) -> bool {
        !self.read && !self.write
    }
}

/// What a readiness handler left behind.
///
/// Edge-triggered backends only clear their readiness flag on `Exhausted`;
/// `Remaining` makes them dispatch again on a later turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// The device reported no more progress in this direction for now.
    Exhausted,
    /// The handler stopped early; more data or space is likely available.
    Remaining,
}

/// Callback run once on a later loop turn.
pub type Callback = Box<dyn FnOnce()>;

/// Callback invoked when a registered descriptor becomes ready.
pub type ReadyHandler = Rc<dyn Fn(Direction) -> Readiness>;

/// Callback invoked on every tick of a recurring timer.
pub type TimerCallback = Rc<dyn Fn()>;

/// Cancellation handle of a recurring timer.
///
/// Cancelling is idempotent; once cancelled the timer callback never runs
/// again.
#[derive(Debug, Clone, Default)]
pub struct TimerHandle {
    cancelled: Rc<Cell<bool>>,
}

impl TimerHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.set(true);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.get()
    }
}

/// The scheduling capabilities a transport consumes.
///
/// Implementations must never invoke a callback re-entrantly from inside one
/// of these methods; every callback runs on its own loop turn.
pub trait EventLoop {
    /// Whether `register` can watch native descriptors on this loop.
    fn supports_descriptors(&self) -> bool;

    /// Start watching `descriptor` for the directions in `interest`.
    ///
    /// One registration per descriptor; the interest set is later changed
    /// with [`EventLoop::modify`].
    fn register(
        &self,
        descriptor: Descriptor,
        interest: Interest,
        handler: ReadyHandler,
    ) -> io::Result<()>;

    /// Replace the interest set of an existing registration.
    fn modify(&self, descriptor: Descriptor, interest: Interest) -> io::Result<()>;

    /// Stop watching `descriptor`. No handler fires after this returns.
    fn deregister(&self, descriptor: Descriptor) -> io::Result<()>;

    /// Run `callback` on a later turn, in FIFO order with other such calls.
    fn call_soon(&self, callback: Callback);

    /// Run `callback` every `interval` until the returned handle is cancelled.
    fn call_every(&self, interval: Duration, callback: TimerCallback) -> TimerHandle;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interest_set_directions_are_independent() {
        let both = Interest::READ.with(Direction::Write, true);
        assert_eq!(both, Interest::BOTH);

        let write_only = both.with(Direction::Read, false);
        assert_eq!(write_only, Interest::WRITE);
        assert!(write_only.contains(Direction::Write));
        assert!(!write_only.contains(Direction::Read));
        assert!(write_only.with(Direction::Write, false).is_empty());
    }

    #[test]
    fn test_timer_handle_cancel_is_shared() {
        let handle = TimerHandle::new();
        let clone = handle.clone();
        clone.cancel();
        clone.cancel();
        assert!(handle.is_cancelled());
    }
}
