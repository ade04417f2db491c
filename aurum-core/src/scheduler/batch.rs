//! DOM Batch
//!
//! Two-phase batching of DOM reads and writes.
//!
//! A flush drains the read queue, then drains the write queue. Writes queued
//! by a read callback join the write phase of the same flush, which is what
//! makes the measure-then-mutate pattern land in one frame:
//!
//! ```rust,ignore
//! DomBatch::read(move || {
//!     let height = measure(node);
//!     DomBatch::write(move || apply(node, height));
//! });
//! ```
//!
//! Reads queued during the write phase, and anything queued by a write,
//! wait for the next flush.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::mem;

use tracing::{debug, trace};

use super::{run_isolated, FlushMode, FlushStats, Task};
use crate::error::Result;

#[derive(Default)]
struct BatchState {
    reads: VecDeque<Task>,
    writes: VecDeque<Task>,
    mode: FlushMode,
    flush_requested: bool,
    phase: Option<BatchPhase>,
    frame_requests: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BatchPhase {
    Reads,
    Writes,
}

thread_local! {
    static DOM_BATCH: RefCell<BatchState> = RefCell::new(BatchState::default());
}

/// Outcome of one batch flush, per phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchFlush {
    pub reads: FlushStats,
    pub writes: FlushStats,
}

/// The process-wide read/write batcher.
pub struct DomBatch;

impl DomBatch {
    /// Reset the singleton and select how flush requests are answered.
    pub fn init(mode: FlushMode) {
        DOM_BATCH.with(|state| {
            *state.borrow_mut() = BatchState {
                mode,
                ..BatchState::default()
            };
        });
    }

    /// Drop every queued callback and clear all flags.
    pub fn reset() {
        let dropped = DOM_BATCH.with(|state| mem::take(&mut *state.borrow_mut()));
        let count = dropped.reads.len() + dropped.writes.len();
        if count > 0 {
            debug!(dropped = count, "dom batch reset");
        }
    }

    /// Queue a measurement.
    pub fn read<F>(callback: F)
    where
        F: FnOnce() + 'static,
    {
        Self::enqueue(BatchPhase::Reads, wrap(callback));
    }

    /// Queue a mutation.
    pub fn write<F>(callback: F)
    where
        F: FnOnce() + 'static,
    {
        Self::enqueue(BatchPhase::Writes, wrap(callback));
    }

    /// Queue a fallible measurement.
    pub fn read_try<F>(callback: F)
    where
        F: FnOnce() -> Result<()> + 'static,
    {
        Self::enqueue(BatchPhase::Reads, Box::new(callback));
    }

    /// Queue a fallible mutation.
    pub fn write_try<F>(callback: F)
    where
        F: FnOnce() -> Result<()> + 'static,
    {
        Self::enqueue(BatchPhase::Writes, Box::new(callback));
    }

    fn enqueue(phase: BatchPhase, task: Task) {
        let flush_now = DOM_BATCH.with(|state| {
            let mut state = state.borrow_mut();
            match phase {
                BatchPhase::Reads => state.reads.push_back(task),
                BatchPhase::Writes => state.writes.push_back(task),
            }
            // A write queued from the read phase joins this flush; anything
            // else waits for a frame.
            let joins_current =
                state.phase == Some(BatchPhase::Reads) && phase == BatchPhase::Writes;
            if !joins_current && !state.flush_requested {
                state.flush_requested = true;
                state.frame_requests += 1;
                trace!(
                    reads = state.reads.len(),
                    writes = state.writes.len(),
                    "batch frame requested"
                );
            }
            state.mode == FlushMode::Immediate && state.phase.is_none()
        });
        if flush_now {
            Self::flush();
        }
    }

    /// Run all queued reads, then all queued writes.
    ///
    /// Returns empty stats if called from inside a running flush.
    pub fn flush() -> BatchFlush {
        let reads = DOM_BATCH.with(|state| {
            let mut state = state.borrow_mut();
            if state.phase.is_some() {
                return None;
            }
            state.phase = Some(BatchPhase::Reads);
            state.flush_requested = false;
            Some(mem::take(&mut state.reads))
        });
        let Some(reads) = reads else {
            return BatchFlush::default();
        };
        let read_stats = run_isolated(reads, "batch-read");

        let writes = DOM_BATCH.with(|state| {
            let mut state = state.borrow_mut();
            state.phase = Some(BatchPhase::Writes);
            mem::take(&mut state.writes)
        });
        let write_stats = run_isolated(writes, "batch-write");

        DOM_BATCH.with(|state| state.borrow_mut().phase = None);

        if read_stats.ran + write_stats.ran > 0 {
            debug!(
                reads = read_stats.ran,
                writes = write_stats.ran,
                failed = read_stats.failed + write_stats.failed,
                "batch flush"
            );
        }
        BatchFlush {
            reads: read_stats,
            writes: write_stats,
        }
    }

    /// Flush only if a frame was requested.
    pub fn flush_if_requested() -> Option<BatchFlush> {
        Self::is_flush_requested().then(Self::flush)
    }

    pub fn is_flush_requested() -> bool {
        DOM_BATCH.with(|state| state.borrow().flush_requested)
    }

    /// Queued reads and writes.
    pub fn pending() -> (usize, usize) {
        DOM_BATCH.with(|state| {
            let state = state.borrow();
            (state.reads.len(), state.writes.len())
        })
    }

    /// Total frames requested since the last `init()`/`reset()`.
    pub fn frame_requests() -> u64 {
        DOM_BATCH.with(|state| state.borrow().frame_requests)
    }
}

fn wrap<F>(callback: F) -> Task
where
    F: FnOnce() + 'static,
{
    Box::new(move || {
        callback();
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn push(log: &Rc<RefCell<Vec<String>>>, entry: &str) -> impl FnOnce() + 'static {
        let log = log.clone();
        let entry = entry.to_string();
        move || log.borrow_mut().push(entry)
    }

    #[test]
    fn reads_run_before_writes() {
        DomBatch::init(FlushMode::Frame);
        let log = Rc::new(RefCell::new(Vec::new()));

        DomBatch::write(push(&log, "w1"));
        DomBatch::read(push(&log, "r1"));
        DomBatch::write(push(&log, "w2"));
        DomBatch::read(push(&log, "r2"));
        assert_eq!(DomBatch::pending(), (2, 2));
        assert_eq!(DomBatch::frame_requests(), 1);

        let flushed = DomBatch::flush();
        assert_eq!(flushed.reads.ran, 2);
        assert_eq!(flushed.writes.ran, 2);
        assert_eq!(*log.borrow(), vec!["r1", "r2", "w1", "w2"]);
    }

    #[test]
    fn write_from_read_lands_in_same_flush() {
        DomBatch::init(FlushMode::Frame);
        let log = Rc::new(RefCell::new(Vec::new()));

        let l = log.clone();
        DomBatch::read(move || {
            l.borrow_mut().push("measure".to_string());
            DomBatch::write(push(&l, "mutate"));
        });

        DomBatch::flush();
        assert_eq!(*log.borrow(), vec!["measure", "mutate"]);
        assert!(!DomBatch::is_flush_requested());
    }

    #[test]
    fn read_from_write_waits_for_next_flush() {
        DomBatch::init(FlushMode::Frame);
        let log = Rc::new(RefCell::new(Vec::new()));

        let l = log.clone();
        DomBatch::write(move || {
            l.borrow_mut().push("mutate".to_string());
            DomBatch::read(push(&l, "measure"));
        });

        DomBatch::flush();
        assert_eq!(*log.borrow(), vec!["mutate"]);
        assert!(DomBatch::is_flush_requested());

        DomBatch::flush();
        assert_eq!(*log.borrow(), vec!["mutate", "measure"]);
    }

    #[test]
    fn failures_are_isolated_per_phase() {
        DomBatch::init(FlushMode::Frame);
        let log = Rc::new(RefCell::new(Vec::new()));

        DomBatch::read(|| panic!("layout read failed"));
        DomBatch::read(push(&log, "r"));
        DomBatch::write(push(&log, "w"));

        let flushed = DomBatch::flush();
        assert_eq!(flushed.reads.failed, 1);
        assert_eq!(*log.borrow(), vec!["r", "w"]);
    }
}
