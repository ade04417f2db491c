//! Render Scheduler
//!
//! A single FIFO queue of render callbacks flushed once per frame.
//!
//! # Re-entrancy
//!
//! A flush takes the whole queue before running anything. Callbacks that
//! schedule more work while the flush is running land in a fresh queue and
//! request the *next* frame, so a callback that always reschedules itself
//! runs once per frame instead of looping forever.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::mem;

use tracing::{debug, trace};

use super::{run_isolated, FlushMode, FlushStats, Task};
use crate::error::Result;

#[derive(Default)]
struct SchedulerState {
    queue: VecDeque<Task>,
    mode: FlushMode,
    flush_requested: bool,
    flushing: bool,
    frame_requests: u64,
}

thread_local! {
    static RENDER_SCHEDULER: RefCell<SchedulerState> = RefCell::new(SchedulerState::default());
}

/// The process-wide render queue.
pub struct RenderScheduler;

impl RenderScheduler {
    /// Reset the singleton and select how flush requests are answered.
    pub fn init(mode: FlushMode) {
        RENDER_SCHEDULER.with(|state| {
            *state.borrow_mut() = SchedulerState {
                mode,
                ..SchedulerState::default()
            };
        });
    }

    /// Drop every queued callback and clear all flags.
    pub fn reset() {
        let dropped = RENDER_SCHEDULER.with(|state| mem::take(&mut *state.borrow_mut()));
        if !dropped.queue.is_empty() {
            debug!(dropped = dropped.queue.len(), "render scheduler reset");
        }
    }

    /// Queue an infallible callback.
    pub fn schedule<F>(callback: F)
    where
        F: FnOnce() + 'static,
    {
        Self::enqueue(Box::new(move || {
            callback();
            Ok(())
        }));
    }

    /// Queue a fallible callback. An `Err` is logged at flush time.
    pub fn schedule_try<F>(callback: F)
    where
        F: FnOnce() -> Result<()> + 'static,
    {
        Self::enqueue(Box::new(callback));
    }

    fn enqueue(task: Task) {
        let flush_now = RENDER_SCHEDULER.with(|state| {
            let mut state = state.borrow_mut();
            state.queue.push_back(task);
            if !state.flush_requested {
                state.flush_requested = true;
                state.frame_requests += 1;
                trace!(queued = state.queue.len(), "render frame requested");
            }
            state.mode == FlushMode::Immediate && !state.flushing
        });
        if flush_now {
            Self::flush();
        }
    }

    /// Run every callback queued before this call, in FIFO order.
    ///
    /// Returns empty stats if called from inside a running flush.
    pub fn flush() -> FlushStats {
        let tasks = RENDER_SCHEDULER.with(|state| {
            let mut state = state.borrow_mut();
            if state.flushing {
                return None;
            }
            state.flushing = true;
            state.flush_requested = false;
            Some(mem::take(&mut state.queue))
        });
        let Some(tasks) = tasks else {
            return FlushStats::default();
        };

        let stats = run_isolated(tasks, "render");

        let carried = RENDER_SCHEDULER.with(|state| {
            let mut state = state.borrow_mut();
            state.flushing = false;
            state.queue.len()
        });
        if stats.ran > 0 {
            debug!(ran = stats.ran, failed = stats.failed, carried, "render flush");
        }
        stats
    }

    /// Flush only if a frame was requested.
    pub fn flush_if_requested() -> Option<FlushStats> {
        Self::is_flush_requested().then(Self::flush)
    }

    pub fn is_flush_requested() -> bool {
        RENDER_SCHEDULER.with(|state| state.borrow().flush_requested)
    }

    /// Callbacks waiting for the next flush.
    pub fn pending() -> usize {
        RENDER_SCHEDULER.with(|state| state.borrow().queue.len())
    }

    /// Total frames requested since the last `init()`/`reset()`.
    pub fn frame_requests() -> u64 {
        RENDER_SCHEDULER.with(|state| state.borrow().frame_requests)
    }

    pub fn mode() -> FlushMode {
        RENDER_SCHEDULER.with(|state| state.borrow().mode)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn log() -> Rc<RefCell<Vec<u32>>> {
        Rc::new(RefCell::new(Vec::new()))
    }

    #[test]
    fn callbacks_run_once_in_fifo_order() {
        RenderScheduler::init(FlushMode::Frame);
        let seen = log();
        for i in 0..5 {
            let seen = seen.clone();
            RenderScheduler::schedule(move || seen.borrow_mut().push(i));
        }

        // Nothing runs before the frame
        assert!(seen.borrow().is_empty());
        assert_eq!(RenderScheduler::pending(), 5);

        let stats = RenderScheduler::flush();
        assert_eq!(stats, FlushStats { ran: 5, failed: 0 });
        assert_eq!(*seen.borrow(), vec![0, 1, 2, 3, 4]);

        // A second flush has nothing to do
        assert_eq!(RenderScheduler::flush().ran, 0);
        assert_eq!(seen.borrow().len(), 5);
    }

    #[test]
    fn requests_coalesce_into_one_frame() {
        RenderScheduler::init(FlushMode::Frame);
        for _ in 0..10 {
            RenderScheduler::schedule(|| {});
        }
        assert_eq!(RenderScheduler::frame_requests(), 1);
        assert!(RenderScheduler::is_flush_requested());

        RenderScheduler::flush();
        assert!(!RenderScheduler::is_flush_requested());

        RenderScheduler::schedule(|| {});
        assert_eq!(RenderScheduler::frame_requests(), 2);
    }

    #[test]
    fn failing_callbacks_do_not_block_later_ones() {
        RenderScheduler::init(FlushMode::Frame);
        let seen = log();

        let s = seen.clone();
        RenderScheduler::schedule(move || s.borrow_mut().push(1));
        RenderScheduler::schedule(|| panic!("render exploded"));
        RenderScheduler::schedule_try(|| Err(Error::callback("bad item")));
        let s = seen.clone();
        RenderScheduler::schedule(move || s.borrow_mut().push(4));

        let stats = RenderScheduler::flush();
        assert_eq!(stats, FlushStats { ran: 4, failed: 2 });
        assert_eq!(*seen.borrow(), vec![1, 4]);
    }

    #[test]
    fn reentrant_schedule_waits_for_next_flush() {
        RenderScheduler::init(FlushMode::Frame);
        let seen = log();

        let s = seen.clone();
        RenderScheduler::schedule(move || {
            s.borrow_mut().push(1);
            let inner = s.clone();
            RenderScheduler::schedule(move || inner.borrow_mut().push(2));
        });

        RenderScheduler::flush();
        assert_eq!(*seen.borrow(), vec![1]);
        assert!(RenderScheduler::is_flush_requested());

        RenderScheduler::flush();
        assert_eq!(*seen.borrow(), vec![1, 2]);
    }

    #[test]
    fn immediate_mode_flushes_synchronously() {
        RenderScheduler::init(FlushMode::Immediate);
        let seen = log();
        let s = seen.clone();
        RenderScheduler::schedule(move || s.borrow_mut().push(7));
        assert_eq!(*seen.borrow(), vec![7]);
        assert_eq!(RenderScheduler::pending(), 0);
        RenderScheduler::reset();
    }

    #[test]
    fn reset_drops_queued_callbacks() {
        RenderScheduler::init(FlushMode::Frame);
        let seen = log();
        let s = seen.clone();
        RenderScheduler::schedule(move || s.borrow_mut().push(1));

        RenderScheduler::reset();
        assert_eq!(RenderScheduler::pending(), 0);
        assert_eq!(RenderScheduler::frame_requests(), 0);
        RenderScheduler::flush();
        assert!(seen.borrow().is_empty());
    }
}
