//! Event loop on a tokio `LocalSet`.
//!
//! Each descriptor registration becomes one local task that waits on
//! `AsyncFd` readiness for the directions in its interest set. The interest
//! set travels over a `watch` channel so `modify` never re-registers the
//! descriptor with the OS. Timers and call-soon callbacks are local tasks as
//! well, so all callbacks stay on the thread driving the `LocalSet`.
//!
//! The `AsyncFd` is owned by the registration, not by the task's future:
//! `deregister` drops it immediately, so the descriptor has left the OS
//! poller before the device closes it.
//!
//! Every method that schedules work must be called from within a
//! `LocalSet` context (`LocalSet::run_until`, `LocalSet::block_on`, or a
//! task spawned with `spawn_local`).

use super::{
    Callback, Descriptor, EventLoop, Interest, ReadyHandler, TimerCallback, TimerHandle,
};
use std::cell::RefCell;
use std::collections::HashMap;
use std::io;
use std::rc::Rc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

#[cfg(unix)]
use super::{Direction, Readiness};
#[cfg(unix)]
use std::task::{Context, Poll};
#[cfg(unix)]
use tokio::io::unix::AsyncFd;
#[cfg(unix)]
use tracing::trace;

/// Shortest timer period the loop will schedule.
const MIN_TIMER_INTERVAL: Duration = Duration::from_millis(1);

/// OS registration shared by a watcher and its task. Emptying the slot
/// removes the descriptor from the OS poller on the spot.
#[cfg(unix)]
type SharedFd = Rc<RefCell<Option<AsyncFd<Descriptor>>>>;

struct Watcher {
    interest: watch::Sender<Interest>,
    #[cfg(unix)]
    fd: SharedFd,
    task: JoinHandle<()>,
}

impl Watcher {
    fn stop(self) {
        #[cfg(unix)]
        drop(self.fd.borrow_mut().take());
        self.task.abort();
    }
}

/// Tokio-backed event loop for single-threaded use.
///
/// # Example
/// ```no_run
/// use serio::reactor::TokioLoop;
///
/// #[tokio::main(flavor = "current_thread")]
/// async fn main() {
///     let local = tokio::task::LocalSet::new();
///     local
///         .run_until(async {
///             let event_loop = TokioLoop::new();
///             // hand `event_loop` to a transport here
///             # drop(event_loop);
///         })
///         .await;
/// }
/// ```
#[derive(Default)]
pub struct TokioLoop {
    watchers: RefCell<HashMap<Descriptor, Watcher>>,
}

impl TokioLoop {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }
}

impl Drop for TokioLoop {
    fn drop(&mut self) {
        for (_, watcher) in self.watchers.get_mut().drain() {
            watcher.stop();
        }
    }
}

#[cfg(unix)]
enum Dispatch {
    Handled(Readiness),
    Deregistered,
}

/// Whether `direction` is ready. `Ok(false)` once the descriptor is gone.
///
/// The `RefCell` borrow never outlives this call, so handlers are free to
/// deregister.
#[cfg(unix)]
fn poll_ready(
    fd: &SharedFd,
    direction: Direction,
    cx: &mut Context<'_>,
) -> Poll<io::Result<bool>> {
    let slot = fd.borrow();
    let Some(fd) = slot.as_ref() else {
        return Poll::Ready(Ok(false));
    };
    let ready = match direction {
        Direction::Read => fd.poll_read_ready(cx).map_ok(|_guard| true),
        Direction::Write => fd.poll_write_ready(cx).map_ok(|_guard| true),
    };
    ready
}

#[cfg(unix)]
fn clear_ready(fd: &SharedFd, direction: Direction, cx: &mut Context<'_>) {
    let slot = fd.borrow();
    let Some(fd) = slot.as_ref() else {
        return;
    };
    let _ = match direction {
        Direction::Read => fd.poll_read_ready(cx).map_ok(|mut guard| guard.clear_ready()),
        Direction::Write => fd.poll_write_ready(cx).map_ok(|mut guard| guard.clear_ready()),
    };
}

#[cfg(unix)]
fn poll_dispatch(
    fd: &SharedFd,
    interest: Interest,
    handler: &ReadyHandler,
    cx: &mut Context<'_>,
) -> Poll<Dispatch> {
    for direction in [Direction::Read, Direction::Write] {
        if !interest.contains(direction) {
            continue;
        }
        match poll_ready(fd, direction, cx) {
            Poll::Ready(Ok(true)) => {}
            Poll::Ready(Ok(false)) | Poll::Ready(Err(_)) => {
                return Poll::Ready(Dispatch::Deregistered)
            }
            Poll::Pending => continue,
        }
        let readiness = handler(direction);
        if readiness == Readiness::Exhausted {
            // Same poll as the readiness check: the driver has not run in
            // between, so only the readiness the handler consumed is cleared.
            clear_ready(fd, direction, cx);
        }
        return Poll::Ready(Dispatch::Handled(readiness));
    }
    Poll::Pending
}

#[cfg(unix)]
async fn watch_descriptor(
    descriptor: Descriptor,
    fd: SharedFd,
    mut interest: watch::Receiver<Interest>,
    handler: ReadyHandler,
) {
    loop {
        let current = *interest.borrow_and_update();
        tokio::select! {
            changed = interest.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            dispatch = std::future::poll_fn(|cx| poll_dispatch(&fd, current, &handler, cx)) => {
                match dispatch {
                    Dispatch::Deregistered => break,
                    Dispatch::Handled(Readiness::Remaining) => tokio::task::yield_now().await,
                    Dispatch::Handled(Readiness::Exhausted) => {}
                }
            }
        }
    }
    trace!(descriptor = descriptor.raw(), "descriptor watcher stopped");
}

impl EventLoop for TokioLoop {
    fn supports_descriptors(&self) -> bool {
        cfg!(unix)
    }

    #[cfg(unix)]
    fn register(
        &self,
        descriptor: Descriptor,
        interest: Interest,
        handler: ReadyHandler,
    ) -> io::Result<()> {
        if self.watchers.borrow().contains_key(&descriptor) {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("descriptor {} is already registered", descriptor.raw()),
            ));
        }

        // Both directions are registered with the OS once; the interest set
        // only gates which readiness the watcher task dispatches.
        let fd = AsyncFd::with_interest(
            descriptor,
            tokio::io::Interest::READABLE | tokio::io::Interest::WRITABLE,
        )?;
        let fd: SharedFd = Rc::new(RefCell::new(Some(fd)));
        let (tx, rx) = watch::channel(interest);
        let task = tokio::task::spawn_local(watch_descriptor(
            descriptor,
            Rc::clone(&fd),
            rx,
            handler,
        ));

        self.watchers.borrow_mut().insert(
            descriptor,
            Watcher {
                interest: tx,
                fd,
                task,
            },
        );
        Ok(())
    }

    #[cfg(not(unix))]
    fn register(
        &self,
        _descriptor: Descriptor,
        _interest: Interest,
        _handler: ReadyHandler,
    ) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "descriptor readiness is only available on Unix",
        ))
    }

    fn modify(&self, descriptor: Descriptor, interest: Interest) -> io::Result<()> {
        let watchers = self.watchers.borrow();
        let watcher = watchers
            .get(&descriptor)
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))?;
        watcher.interest.send_replace(interest);
        Ok(())
    }

    /// Removes the descriptor from the OS poller before returning, so the
    /// caller may close it right away.
    fn deregister(&self, descriptor: Descriptor) -> io::Result<()> {
        let watcher = self
            .watchers
            .borrow_mut()
            .remove(&descriptor)
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))?;
        watcher.stop();
        Ok(())
    }

    fn call_soon(&self, callback: Callback) {
        tokio::task::spawn_local(async move { callback() });
    }

    fn call_every(&self, interval: Duration, callback: TimerCallback) -> TimerHandle {
        let handle = TimerHandle::new();
        let cancelled = handle.clone();
        let period = interval.max(MIN_TIMER_INTERVAL);

        tokio::task::spawn_local(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if cancelled.is_cancelled() {
                    break;
                }
                callback();
            }
        });
        handle
    }
}
