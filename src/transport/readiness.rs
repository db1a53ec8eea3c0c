//! Readiness backends that tell a transport when its device can make progress.
//!
//! The backend is picked once, when the transport is built, and the
//! transport only ever asks it to turn read or write interest on and off.

use crate::error::SerioError;
use crate::reactor::{
    Descriptor, Direction, EventLoop, Interest, ReadyHandler, TimerCallback, TimerHandle,
};
use serde::{Deserialize, Serialize};
use std::io;
use std::time::Duration;
use tracing::debug;

/// Device output-queue depth above which the polling backend skips a drain.
pub const OUTPUT_QUEUE_LIMIT: usize = 1024;

/// Whether the polling backend can run on this host.
const POLLING_SUPPORTED: bool = cfg!(any(unix, windows));

/// Which readiness backend a transport should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadinessMode {
    /// Descriptor readiness when the device and loop support it, polling otherwise.
    #[default]
    Auto,
    /// Descriptor readiness or nothing.
    Descriptor,
    /// Recurring probe timer.
    Polling,
}

/// Backend chosen for a particular device and loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Backend {
    Descriptor(Descriptor),
    Polling,
}

impl Backend {
    pub fn select(
        mode: ReadinessMode,
        descriptor: Option<Descriptor>,
        event_loop: &dyn EventLoop,
    ) -> Result<Self, SerioError> {
        let native = descriptor.filter(|_| event_loop.supports_descriptors());
        match mode {
            ReadinessMode::Descriptor => native.map(Backend::Descriptor).ok_or_else(|| {
                SerioError::PlatformNotSupported(
                    "descriptor readiness requires a device descriptor and a loop that can watch it"
                        .to_string(),
                )
            }),
            ReadinessMode::Polling if POLLING_SUPPORTED => Ok(Backend::Polling),
            ReadinessMode::Auto => match native {
                Some(fd) => Ok(Backend::Descriptor(fd)),
                None if POLLING_SUPPORTED => Ok(Backend::Polling),
                None => Err(unsupported_platform()),
            },
            ReadinessMode::Polling => Err(unsupported_platform()),
        }
    }
}

fn unsupported_platform() -> SerioError {
    SerioError::PlatformNotSupported(format!(
        "no readiness backend for target OS '{}'",
        std::env::consts::OS
    ))
}

/// Live subscription of one transport.
pub(crate) enum ReadinessSource {
    Descriptor(DescriptorReadiness),
    Polling(PollingReadiness),
}

impl ReadinessSource {
    /// Turn interest in `direction` on or off. Polling ignores this; its
    /// tick consults the transport directly.
    pub fn set_interest(
        &mut self,
        event_loop: &dyn EventLoop,
        direction: Direction,
        enabled: bool,
    ) -> io::Result<()> {
        match self {
            Self::Descriptor(source) => source.set_interest(event_loop, direction, enabled),
            Self::Polling(_) => Ok(()),
        }
    }

    /// Stop all notifications. Safe to call more than once.
    pub fn teardown(&mut self, event_loop: &dyn EventLoop) {
        match self {
            Self::Descriptor(source) => source.teardown(event_loop),
            Self::Polling(source) => source.teardown(),
        }
    }
}

/// Registration of the device descriptor with the loop's native mechanism.
///
/// Read and write interest live in one interest set on one registration,
/// so dropping one direction never disturbs the other.
pub(crate) struct DescriptorReadiness {
    descriptor: Descriptor,
    interest: Interest,
    registered: bool,
}

impl DescriptorReadiness {
    /// Register `descriptor` with read interest.
    pub fn start(
        event_loop: &dyn EventLoop,
        descriptor: Descriptor,
        handler: ReadyHandler,
    ) -> io::Result<Self> {
        event_loop.register(descriptor, Interest::READ, handler)?;
        debug!(descriptor = descriptor.raw(), "descriptor readiness registered");
        Ok(Self {
            descriptor,
            interest: Interest::READ,
            registered: true,
        })
    }

    fn set_interest(
        &mut self,
        event_loop: &dyn EventLoop,
        direction: Direction,
        enabled: bool,
    ) -> io::Result<()> {
        let interest = self.interest.with(direction, enabled);
        if !self.registered || interest == self.interest {
            return Ok(());
        }
        event_loop.modify(self.descriptor, interest)?;
        self.interest = interest;
        Ok(())
    }

    fn teardown(&mut self, event_loop: &dyn EventLoop) {
        if !std::mem::take(&mut self.registered) {
            return;
        }
        self.interest = Interest::NONE;
        if let Err(e) = event_loop.deregister(self.descriptor) {
            debug!(descriptor = self.descriptor.raw(), error = %e, "descriptor deregistration failed");
        }
    }
}

/// Recurring probe for devices the loop cannot watch natively.
pub(crate) struct PollingReadiness {
    timer: Option<TimerHandle>,
}

impl PollingReadiness {
    pub fn start(event_loop: &dyn EventLoop, interval: Duration, tick: TimerCallback) -> Self {
        debug!(interval_ms = interval.as_millis() as u64, "polling readiness started");
        Self {
            timer: Some(event_loop.call_every(interval, tick)),
        }
    }

    fn teardown(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactor::{ManualLoop, Readiness};
    use std::rc::Rc;

    #[test]
    fn test_auto_prefers_descriptor() {
        let event_loop = ManualLoop::new();
        let fd = Descriptor::new(4);
        assert_eq!(
            Backend::select(ReadinessMode::Auto, Some(fd), &*event_loop).unwrap(),
            Backend::Descriptor(fd)
        );
        assert_eq!(
            Backend::select(ReadinessMode::Auto, None, &*event_loop).unwrap(),
            Backend::Polling
        );
    }

    #[test]
    fn test_forced_descriptor_without_one_is_unsupported() {
        let event_loop = ManualLoop::new();
        let result = Backend::select(ReadinessMode::Descriptor, None, &*event_loop);
        assert!(matches!(result, Err(SerioError::PlatformNotSupported(_))));
    }

    #[test]
    fn test_write_interest_toggles_without_losing_read() {
        let event_loop = ManualLoop::new();
        let fd = Descriptor::new(9);
        let mut source =
            DescriptorReadiness::start(&*event_loop, fd, Rc::new(|_| Readiness::Exhausted))
                .unwrap();

        for _ in 0..3 {
            source
                .set_interest(&*event_loop, Direction::Write, true)
                .unwrap();
            assert_eq!(event_loop.interest(fd), Some(Interest::BOTH));
            source
                .set_interest(&*event_loop, Direction::Write, false)
                .unwrap();
            assert_eq!(event_loop.interest(fd), Some(Interest::READ));
        }
        assert_eq!(event_loop.registration_count(), 1);

        source.teardown(&*event_loop);
        source.teardown(&*event_loop);
        assert!(!event_loop.is_registered(fd));
    }

    #[test]
    fn test_polling_teardown_cancels_timer_once() {
        let event_loop = ManualLoop::new();
        let mut source =
            PollingReadiness::start(&*event_loop, Duration::from_millis(5), Rc::new(|| {}));
        assert_eq!(event_loop.active_timers(), 1);
        source.teardown();
        source.teardown();
        assert_eq!(event_loop.active_timers(), 0);
    }
}
