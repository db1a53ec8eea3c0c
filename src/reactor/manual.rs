//! Hand-driven event loop.
//!
//! `ManualLoop` keeps registrations, queued callbacks and timers in plain
//! collections and only acts when told to. Readiness is injected with
//! [`ManualLoop::fire`] and time moves with [`ManualLoop::advance`], which
//! makes every interleaving reproducible.

use super::{
    Callback, Descriptor, Direction, EventLoop, Interest, Readiness, ReadyHandler, TimerCallback,
    TimerHandle,
};
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::io;
use std::rc::Rc;
use std::time::Duration;

struct Registration {
    interest: Interest,
    handler: ReadyHandler,
}

struct ManualTimer {
    handle: TimerHandle,
    interval: Duration,
    due: Duration,
    callback: TimerCallback,
}

#[derive(Default)]
struct ManualState {
    pending: VecDeque<Callback>,
    registrations: HashMap<Descriptor, Registration>,
    timers: Vec<ManualTimer>,
    now: Duration,
}

/// Deterministic single-threaded event loop.
///
/// # Example
/// ```
/// use serio::reactor::{EventLoop, ManualLoop};
/// use std::cell::Cell;
/// use std::rc::Rc;
///
/// let event_loop = ManualLoop::new();
/// let ran = Rc::new(Cell::new(false));
/// let flag = ran.clone();
/// event_loop.call_soon(Box::new(move || flag.set(true)));
///
/// assert!(!ran.get());
/// assert_eq!(event_loop.run_pending(), 1);
/// assert!(ran.get());
/// ```
#[derive(Default)]
pub struct ManualLoop {
    state: RefCell<ManualState>,
}

impl ManualLoop {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Run queued callbacks, including ones they queue, until none are left.
    ///
    /// Returns how many callbacks ran.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        loop {
            let next = self.state.borrow_mut().pending.pop_front();
            match next {
                Some(callback) => {
                    callback();
                    ran += 1;
                }
                None => return ran,
            }
        }
    }

    /// Report `direction` ready on `descriptor`, then run queued callbacks.
    ///
    /// Returns `None` when the descriptor is not registered or the direction
    /// is outside its interest set, in which case nothing is dispatched.
    pub fn fire(&self, descriptor: Descriptor, direction: Direction) -> Option<Readiness> {
        let handler = {
            let state = self.state.borrow();
            let registration = state.registrations.get(&descriptor)?;
            if !registration.interest.contains(direction) {
                return None;
            }
            Rc::clone(&registration.handler)
        };
        let readiness = handler(direction);
        self.run_pending();
        Some(readiness)
    }

    /// Move the clock forward, firing every timer that falls due.
    ///
    /// Timers fire in due order; queued callbacks run after each tick.
    /// Returns the number of timer ticks dispatched.
    pub fn advance(&self, by: Duration) -> usize {
        let target = self.state.borrow().now + by;
        let mut ticks = 0;

        loop {
            let due = {
                let mut state = self.state.borrow_mut();
                state.timers.retain(|t| !t.handle.is_cancelled());
                let next = state
                    .timers
                    .iter_mut()
                    .filter(|t| t.due <= target)
                    .min_by_key(|t| t.due);
                match next {
                    Some(timer) => {
                        let fired_at = timer.due;
                        timer.due += timer.interval;
                        let tick = (timer.handle.clone(), Rc::clone(&timer.callback));
                        state.now = fired_at;
                        Some(tick)
                    }
                    None => None,
                }
            };

            let Some((handle, callback)) = due else {
                break;
            };
            if !handle.is_cancelled() {
                callback();
                ticks += 1;
            }
            self.run_pending();
        }

        self.state.borrow_mut().now = target;
        ticks
    }

    /// Current interest set of `descriptor`, if registered.
    pub fn interest(&self, descriptor: Descriptor) -> Option<Interest> {
        self.state
            .borrow()
            .registrations
            .get(&descriptor)
            .map(|r| r.interest)
    }

    pub fn is_registered(&self, descriptor: Descriptor) -> bool {
        self.state.borrow().registrations.contains_key(&descriptor)
    }

    pub fn registration_count(&self) -> usize {
        self.state.borrow().registrations.len()
    }

    /// Number of recurring timers that have not been cancelled.
    pub fn active_timers(&self) -> usize {
        self.state
            .borrow()
            .timers
            .iter()
            .filter(|t| !t.handle.is_cancelled())
            .count()
    }

    /// Callbacks waiting for [`ManualLoop::run_pending`].
    pub fn pending_callbacks(&self) -> usize {
        self.state.borrow().pending.len()
    }

    /// Time elapsed on the loop clock.
    pub fn now(&self) -> Duration {
        self.state.borrow().now
    }
}

impl EventLoop for ManualLoop {
    fn supports_descriptors(&self) -> bool {
        true
    }

    fn register(
        &self,
        descriptor: Descriptor,
        interest: Interest,
        handler: ReadyHandler,
    ) -> io::Result<()> {
        let mut state = self.state.borrow_mut();
        if state.registrations.contains_key(&descriptor) {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("descriptor {} is already registered", descriptor.raw()),
            ));
        }
        state
            .registrations
            .insert(descriptor, Registration { interest, handler });
        Ok(())
    }

    fn modify(&self, descriptor: Descriptor, interest: Interest) -> io::Result<()> {
        let mut state = self.state.borrow_mut();
        let registration = state
            .registrations
            .get_mut(&descriptor)
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))?;
        registration.interest = interest;
        Ok(())
    }

    fn deregister(&self, descriptor: Descriptor) -> io::Result<()> {
        self.state
            .borrow_mut()
            .registrations
            .remove(&descriptor)
            .map(|_| ())
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))
    }

    fn call_soon(&self, callback: Callback) {
        self.state.borrow_mut().pending.push_back(callback);
    }

    fn call_every(&self, interval: Duration, callback: TimerCallback) -> TimerHandle {
        let handle = TimerHandle::new();
        let mut state = self.state.borrow_mut();
        let interval = interval.max(Duration::from_nanos(1));
        let due = state.now + interval;
        state.timers.push(ManualTimer {
            handle: handle.clone(),
            interval,
            due,
            callback,
        });
        handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_call_soon_runs_in_fifo_order() {
        let event_loop = ManualLoop::new();
        let order = Rc::new(RefCell::new(Vec::new()));
        for i in 0..3 {
            let order = order.clone();
            event_loop.call_soon(Box::new(move || order.borrow_mut().push(i)));
        }
        assert_eq!(event_loop.run_pending(), 3);
        assert_eq!(*order.borrow(), vec![0, 1, 2]);
    }

    #[test]
    fn test_fire_respects_interest_set() {
        let event_loop = ManualLoop::new();
        let fd = Descriptor::new(7);
        let hits = Rc::new(Cell::new(0));
        let counter = hits.clone();
        event_loop
            .register(
                fd,
                Interest::READ,
                Rc::new(move |_| {
                    counter.set(counter.get() + 1);
                    Readiness::Exhausted
                }),
            )
            .unwrap();

        assert_eq!(event_loop.fire(fd, Direction::Write), None);
        assert_eq!(event_loop.fire(fd, Direction::Read), Some(Readiness::Exhausted));

        event_loop.modify(fd, Interest::WRITE).unwrap();
        assert_eq!(event_loop.fire(fd, Direction::Read), None);
        assert!(event_loop.fire(fd, Direction::Write).is_some());
        assert_eq!(hits.get(), 2);

        event_loop.deregister(fd).unwrap();
        assert_eq!(event_loop.fire(fd, Direction::Write), None);
        assert_eq!(event_loop.registration_count(), 0);
    }

    #[test]
    fn test_double_registration_rejected() {
        let event_loop = ManualLoop::new();
        let fd = Descriptor::new(3);
        let handler: ReadyHandler = Rc::new(|_| Readiness::Exhausted);
        event_loop.register(fd, Interest::READ, handler.clone()).unwrap();
        assert!(event_loop.register(fd, Interest::WRITE, handler).is_err());
    }

    #[test]
    fn test_timers_fire_until_cancelled() {
        let event_loop = ManualLoop::new();
        let ticks = Rc::new(Cell::new(0));
        let counter = ticks.clone();
        let handle = event_loop.call_every(
            Duration::from_millis(5),
            Rc::new(move || counter.set(counter.get() + 1)),
        );

        assert_eq!(event_loop.advance(Duration::from_millis(4)), 0);
        assert_eq!(event_loop.advance(Duration::from_millis(11)), 3);
        assert_eq!(ticks.get(), 3);

        handle.cancel();
        assert_eq!(event_loop.advance(Duration::from_millis(50)), 0);
        assert_eq!(event_loop.active_timers(), 0);
        assert_eq!(event_loop.now(), Duration::from_millis(65));
    }
}
