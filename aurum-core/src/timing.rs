//! Debounce and Throttle
//!
//! Call-rate limiters that work off the host's clock and timers, not the
//! frame schedulers.
//!
//! - [`Debounce`] runs the wrapped function once the calls stop for `wait`,
//!   with the arguments of the last call.
//! - [`Throttle`] runs the first call of a window immediately and drops
//!   every other call until `wait` has passed since that leading call.
//!
//! Both are cheap `Rc` handles; clones share state, so a clone can be moved
//! into an event listener while the owner keeps another for `cancel()`.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::time::Duration;

use crate::host::{Clock, TimerHost, TimerId, Timers};

struct DebounceState<A> {
    timer: Option<TimerId>,
    args: Option<A>,
}

struct DebounceInner<A> {
    run: Box<dyn Fn(A)>,
    wait: Duration,
    host: Box<dyn TimerHost>,
    state: RefCell<DebounceState<A>>,
}

impl<A> DebounceInner<A> {
    fn fire(&self) {
        let args = {
            let mut state = self.state.borrow_mut();
            state.timer = None;
            state.args.take()
        };
        if let Some(args) = args {
            (self.run)(args);
        }
    }
}

/// Trailing-edge debounce.
pub struct Debounce<A> {
    inner: Rc<DebounceInner<A>>,
}

impl<A: 'static> Debounce<A> {
    pub fn new<F>(timers: &Timers, wait: Duration, run: F) -> Self
    where
        F: Fn(A) + 'static,
    {
        Self::with_host(timers.clone(), wait, run)
    }

    /// Debounce on a custom timer host, e.g. an element's
    /// [`ScopedTimers`](crate::element::ScopedTimers) so disconnect clears
    /// the pending call.
    pub fn with_host<H, F>(host: H, wait: Duration, run: F) -> Self
    where
        H: TimerHost + 'static,
        F: Fn(A) + 'static,
    {
        Self {
            inner: Rc::new(DebounceInner {
                run: Box::new(run),
                wait,
                host: Box::new(host),
                state: RefCell::new(DebounceState {
                    timer: None,
                    args: None,
                }),
            }),
        }
    }

    /// Record `args` and restart the quiet-period timer.
    pub fn call(&self, args: A) {
        let previous = {
            let mut state = self.inner.state.borrow_mut();
            state.args = Some(args);
            state.timer.take()
        };
        if let Some(id) = previous {
            self.inner.host.clear_timeout(id);
        }

        let weak: Weak<DebounceInner<A>> = Rc::downgrade(&self.inner);
        let id = self.inner.host.set_timeout(
            self.inner.wait,
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.fire();
                }
            }),
        );
        let mut state = self.inner.state.borrow_mut();
        state.timer = id;
        if id.is_none() {
            state.args = None;
        }
    }

    /// Drop the pending call. Returns `true` if one was pending.
    pub fn cancel(&self) -> bool {
        let timer = {
            let mut state = self.inner.state.borrow_mut();
            state.args = None;
            state.timer.take()
        };
        timer.is_some_and(|id| self.inner.host.clear_timeout(id))
    }

    /// Run the pending call now instead of waiting.
    pub fn flush(&self) -> bool {
        let timer = self.inner.state.borrow_mut().timer.take();
        match timer {
            Some(id) if self.inner.host.clear_timeout(id) => {
                self.inner.fire();
                true
            }
            _ => {
                self.inner.state.borrow_mut().args = None;
                false
            }
        }
    }

    /// Whether a call is waiting for its timer. A timer cleared by the host
    /// (for example on disconnect) no longer counts.
    pub fn is_pending(&self) -> bool {
        let timer = self.inner.state.borrow().timer;
        timer.is_some_and(|id| self.inner.host.is_active(id))
    }
}

impl<A> Clone for Debounce<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<A> fmt::Debug for Debounce<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Debounce")
            .field("wait", &self.inner.wait)
            .field("timer", &self.inner.state.borrow().timer)
            .finish()
    }
}

struct ThrottleInner<A> {
    run: Box<dyn Fn(A)>,
    wait: Duration,
    clock: Box<dyn Clock>,
    window_start: Cell<Option<Duration>>,
}

/// Leading-edge throttle; calls inside the window are dropped.
pub struct Throttle<A> {
    inner: Rc<ThrottleInner<A>>,
}

impl<A> Throttle<A> {
    pub fn new<C, F>(clock: C, wait: Duration, run: F) -> Self
    where
        C: Clock + 'static,
        F: Fn(A) + 'static,
    {
        Self {
            inner: Rc::new(ThrottleInner {
                run: Box::new(run),
                wait,
                clock: Box::new(clock),
                window_start: Cell::new(None),
            }),
        }
    }

    /// Run `args` if no window is open. Returns whether it ran.
    pub fn call(&self, args: A) -> bool {
        let now = self.inner.clock.now();
        if let Some(start) = self.inner.window_start.get() {
            if now < start + self.inner.wait {
                return false;
            }
        }
        self.inner.window_start.set(Some(now));
        (self.inner.run)(args);
        true
    }

    /// Close the current window so the next call runs immediately.
    pub fn reset(&self) {
        self.inner.window_start.set(None);
    }
}

impl<A> Clone for Throttle<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<A> fmt::Debug for Throttle<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Throttle")
            .field("wait", &self.inner.wait)
            .field("window_start", &self.inner.window_start.get())
            .finish()
    }
}
