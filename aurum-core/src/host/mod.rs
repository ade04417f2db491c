//! Host Services
//!
//! Clocks and timers the runtime calls into. Everything here is
//! single-threaded: handles are `Rc`-based and clones share state.

mod clock;
mod timers;

pub use clock::{Clock, ManualClock, SystemClock};
pub use timers::{TimerHost, TimerId, Timers};
