//! Runtime configuration.
//!
//! ```json
//! {
//!   "flush_mode": "immediate",
//!   "frame_interval_ms": 16,
//!   "scroll_throttle_ms": 16,
//!   "virtual_buffer": 2,
//!   "memo_max_size": 512
//! }
//! ```
//!
//! Every field is optional.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::scheduler::FlushMode;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// How scheduler flush requests are answered.
    pub flush_mode: FlushMode,
    /// Virtual time advanced by `Runtime::tick`.
    pub frame_interval_ms: u64,
    /// Throttle window for virtual list scroll handling.
    pub scroll_throttle_ms: u64,
    /// Rows rendered beyond each edge of a virtual list's viewport.
    pub virtual_buffer: usize,
    /// Default bound for memoizers created through the runtime.
    pub memo_max_size: Option<usize>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            flush_mode: FlushMode::Frame,
            frame_interval_ms: 16,
            scroll_throttle_ms: 16,
            virtual_buffer: 2,
            memo_max_size: None,
        }
    }
}

impl RuntimeConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }

    pub fn scroll_throttle(&self) -> Duration {
        Duration::from_millis(self.scroll_throttle_ms)
    }
}
