//! Timer Queue
//!
//! `setTimeout`/`setInterval` for the in-process host. Timers fire in
//! due-time order; timers due at the same instant fire in creation order.
//! Callbacks run with the queue unborrowed, so they may create or clear
//! timers, including themselves.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashSet};
use std::rc::Rc;
use std::time::Duration;

use tracing::trace;

use super::clock::{Clock, ManualClock, SystemClock};

/// Intervals shorter than this are clamped so a zero period cannot spin.
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Handle to a scheduled timer. Ids increase in creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

enum Callback {
    Once(Box<dyn FnOnce()>),
    Repeat { period: Duration, run: Rc<dyn Fn()> },
}

struct Timer {
    due: Duration,
    callback: Callback,
}

#[derive(Default)]
struct TimerQueue {
    timers: BTreeMap<TimerId, Timer>,
    next_id: u64,
}

impl TimerQueue {
    fn insert(&mut self, due: Duration, callback: Callback) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        self.timers.insert(id, Timer { due, callback });
        id
    }

    fn next_due(&self, limit: Duration, skip: &HashSet<TimerId>) -> Option<(TimerId, Duration)> {
        self.timers
            .iter()
            .filter(|(id, timer)| timer.due <= limit && !skip.contains(id))
            .min_by_key(|(id, timer)| (timer.due, **id))
            .map(|(id, timer)| (*id, timer.due))
    }
}

#[derive(Clone)]
enum TimeSource {
    Manual(ManualClock),
    System(SystemClock),
}

impl TimeSource {
    fn now(&self) -> Duration {
        match self {
            Self::Manual(clock) => clock.now(),
            Self::System(clock) => clock.now(),
        }
    }
}

/// Shared handle to a timer queue.
#[derive(Clone)]
pub struct Timers {
    queue: Rc<RefCell<TimerQueue>>,
    source: TimeSource,
}

impl Timers {
    /// Timers driven by virtual time; see [`Timers::advance`].
    pub fn manual(clock: ManualClock) -> Self {
        Self {
            queue: Rc::default(),
            source: TimeSource::Manual(clock),
        }
    }

    /// Timers driven by the wall clock; poll with [`Timers::run_due`].
    pub fn system() -> Self {
        Self {
            queue: Rc::default(),
            source: TimeSource::System(SystemClock::new()),
        }
    }

    /// Current time of the underlying clock.
    pub fn now(&self) -> Duration {
        self.source.now()
    }

    /// Run `callback` once, `delay` from now.
    pub fn set_timeout<F>(&self, delay: Duration, callback: F) -> TimerId
    where
        F: FnOnce() + 'static,
    {
        let due = self.now() + delay;
        self.queue
            .borrow_mut()
            .insert(due, Callback::Once(Box::new(callback)))
    }

    /// Run `callback` every `period` until cleared.
    pub fn set_interval<F>(&self, period: Duration, callback: F) -> TimerId
    where
        F: Fn() + 'static,
    {
        let period = period.max(MIN_INTERVAL);
        let due = self.now() + period;
        self.queue.borrow_mut().insert(
            due,
            Callback::Repeat {
                period,
                run: Rc::new(callback),
            },
        )
    }

    /// Cancel a timer. Returns `false` if it already fired or was cleared.
    pub fn clear(&self, id: TimerId) -> bool {
        self.queue.borrow_mut().timers.remove(&id).is_some()
    }

    pub fn is_active(&self, id: TimerId) -> bool {
        self.queue.borrow().timers.contains_key(&id)
    }

    /// Number of timers waiting to fire.
    pub fn pending(&self) -> usize {
        self.queue.borrow().timers.len()
    }

    /// Fire every timer due at the current time. Each timer fires at most
    /// once per call, so a zero-delay timer created by a callback waits for
    /// the next call.
    pub fn run_due(&self) -> usize {
        let now = self.now();
        let horizon = TimerId(self.queue.borrow().next_id);
        let mut fired = HashSet::new();
        loop {
            let next = {
                let queue = self.queue.borrow();
                queue
                    .next_due(now, &fired)
                    .filter(|(id, _)| *id < horizon)
            };
            let Some((id, _)) = next else {
                break;
            };
            fired.insert(id);
            self.fire(id);
        }
        fired.len()
    }

    /// Move virtual time forward by `by`, firing timers at their due
    /// instants along the way. On a system clock this only runs due timers.
    pub fn advance(&self, by: Duration) -> usize {
        let TimeSource::Manual(clock) = &self.source else {
            return self.run_due();
        };
        let target = clock.now() + by;
        let mut count = 0;
        loop {
            let next = self.queue.borrow().next_due(target, &HashSet::new());
            let Some((id, due)) = next else {
                break;
            };
            clock.set(due);
            if self.fire(id) {
                count += 1;
            }
        }
        clock.set(target);
        if count > 0 {
            trace!(fired = count, now_ms = target.as_millis() as u64, "timers advanced");
        }
        count
    }

    fn fire(&self, id: TimerId) -> bool {
        enum Ready {
            Once(Box<dyn FnOnce()>),
            Repeat(Rc<dyn Fn()>),
        }

        let ready = {
            let mut queue = self.queue.borrow_mut();
            let repeat = match queue.timers.get_mut(&id) {
                None => return false,
                Some(timer) => match &timer.callback {
                    Callback::Repeat { period, run } => {
                        timer.due += *period;
                        Some(Rc::clone(run))
                    }
                    Callback::Once(_) => None,
                },
            };
            match repeat {
                Some(run) => Ready::Repeat(run),
                None => match queue.timers.remove(&id).map(|timer| timer.callback) {
                    Some(Callback::Once(run)) => Ready::Once(run),
                    Some(Callback::Repeat { run, .. }) => Ready::Repeat(run),
                    None => return false,
                },
            }
        };

        match ready {
            Ready::Once(run) => run(),
            Ready::Repeat(run) => run(),
        }
        true
    }
}

impl Clock for Timers {
    fn now(&self) -> Duration {
        self.source.now()
    }
}

/// Schedules one-shot timers on behalf of a rate limiter.
pub trait TimerHost {
    /// Returns `None` when the host no longer accepts timers.
    fn set_timeout(&self, delay: Duration, callback: Box<dyn FnOnce()>) -> Option<TimerId>;

    /// Returns `false` if the timer already fired or was cleared.
    fn clear_timeout(&self, id: TimerId) -> bool;

    fn is_active(&self, id: TimerId) -> bool;
}

impl TimerHost for Timers {
    fn set_timeout(&self, delay: Duration, callback: Box<dyn FnOnce()>) -> Option<TimerId> {
        Some(Timers::set_timeout(self, delay, callback))
    }

    fn clear_timeout(&self, id: TimerId) -> bool {
        self.clear(id)
    }

    fn is_active(&self, id: TimerId) -> bool {
        Timers::is_active(self, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn timeout_fires_once_at_due_time() {
        let timers = Timers::manual(ManualClock::new());
        let hits = Rc::new(Cell::new(0));
        let h = hits.clone();
        timers.set_timeout(ms(100), move || h.set(h.get() + 1));

        timers.advance(ms(99));
        assert_eq!(hits.get(), 0);
        timers.advance(ms(1));
        assert_eq!(hits.get(), 1);
        timers.advance(ms(1000));
        assert_eq!(hits.get(), 1);
        assert_eq!(timers.pending(), 0);
    }

    #[test]
    fn interval_repeats_until_cleared() {
        let timers = Timers::manual(ManualClock::new());
        let hits = Rc::new(Cell::new(0));
        let h = hits.clone();
        let id = timers.set_interval(ms(10), move || h.set(h.get() + 1));

        timers.advance(ms(35));
        assert_eq!(hits.get(), 3);

        assert!(timers.clear(id));
        timers.advance(ms(100));
        assert_eq!(hits.get(), 3);
        assert!(!timers.clear(id));
    }

    #[test]
    fn timers_fire_in_due_then_creation_order() {
        let timers = Timers::manual(ManualClock::new());
        let log = Rc::new(RefCell::new(Vec::new()));
        for (label, delay) in [("b", 20), ("a", 10), ("c", 20)] {
            let log = log.clone();
            timers.set_timeout(ms(delay), move || log.borrow_mut().push(label));
        }
        timers.advance(ms(20));
        assert_eq!(*log.borrow(), vec!["a", "b", "c"]);
    }

    #[test]
    fn callback_sees_its_due_time() {
        let clock = ManualClock::new();
        let timers = Timers::manual(clock.clone());
        let seen = Rc::new(Cell::new(Duration::ZERO));
        let s = seen.clone();
        let c = clock.clone();
        timers.set_timeout(ms(30), move || s.set(c.now()));

        timers.advance(ms(100));
        assert_eq!(seen.get(), ms(30));
        assert_eq!(clock.now(), ms(100));
    }

    #[test]
    fn callback_can_clear_other_timers() {
        let timers = Timers::manual(ManualClock::new());
        let hits = Rc::new(Cell::new(0));
        let h = hits.clone();
        let victim = timers.set_timeout(ms(20), move || h.set(h.get() + 1));
        let t = timers.clone();
        timers.set_timeout(ms(10), move || {
            t.clear(victim);
        });

        timers.advance(ms(50));
        assert_eq!(hits.get(), 0);
    }

    #[test]
    fn run_due_defers_timers_created_during_run() {
        let timers = Timers::manual(ManualClock::new());
        let hits = Rc::new(Cell::new(0));
        let t = timers.clone();
        let h = hits.clone();
        timers.set_timeout(Duration::ZERO, move || {
            let h = h.clone();
            t.set_timeout(Duration::ZERO, move || h.set(h.get() + 1));
        });

        assert_eq!(timers.run_due(), 1);
        assert_eq!(hits.get(), 0);
        assert_eq!(timers.run_due(), 1);
        assert_eq!(hits.get(), 1);
    }
}
