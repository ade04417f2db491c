//! Frame Schedulers
//!
//! Two process-wide queues align DOM work to frame boundaries:
//!
//! - [`RenderScheduler`]: one FIFO queue of render callbacks.
//! - [`DomBatch`]: a read queue and a write queue; all reads of a flush run
//!   before any write of that flush.
//!
//! # Flushing
//!
//! Enqueuing only *requests* a frame. The request is coalesced: however many
//! callbacks are queued between two flushes, exactly one frame is requested.
//! The host answers the request by calling `flush()` from its per-frame
//! callback (`Runtime::run_frame` in this crate). In [`FlushMode::Immediate`]
//! the request is answered synchronously, for hosts without a frame clock.
//!
//! # Failure isolation
//!
//! Every callback runs inside its own isolation boundary. A callback that
//! returns `Err` or panics is logged and counted; the rest of the flush
//! continues.
//!
//! # Singletons
//!
//! The runtime is single-threaded, so each scheduler is a thread-local
//! singleton with explicit `init()`/`reset()` hooks. Each test thread gets
//! its own pair.

mod batch;
mod render;

pub use batch::{BatchFlush, DomBatch};
pub use render::RenderScheduler;

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use serde::{Deserialize, Serialize};
use tracing::error;

use crate::error::Result;

/// How a flush request is answered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlushMode {
    /// Wait for the host's next frame.
    #[default]
    Frame,
    /// Flush synchronously when the request is made outside a flush.
    Immediate,
}

/// A queued callback.
pub(crate) type Task = Box<dyn FnOnce() -> Result<()>>;

/// Outcome of one flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushStats {
    /// Callbacks that ran.
    pub ran: usize,
    /// Callbacks that returned an error or panicked.
    pub failed: usize,
}

impl FlushStats {
    pub(crate) fn absorb(&mut self, other: FlushStats) {
        self.ran += other.ran;
        self.failed += other.failed;
    }
}

/// Run queued tasks in order, isolating each one.
pub(crate) fn run_isolated(tasks: impl IntoIterator<Item = Task>, queue: &'static str) -> FlushStats {
    let mut stats = FlushStats::default();
    for task in tasks {
        stats.ran += 1;
        match panic::catch_unwind(AssertUnwindSafe(task)) {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                stats.failed += 1;
                error!(queue, error = %err, "scheduled callback failed");
            }
            Err(payload) => {
                stats.failed += 1;
                error!(queue, panic = panic_message(&*payload), "scheduled callback panicked");
            }
        }
    }
    stats
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}
