//! Aurum Core
//!
//! This crate provides the runtime underneath Aurum custom elements.
//! It implements:
//!
//! - The element lifecycle contract (attribute observation, idempotent
//!   render, scoped listeners and timers released on disconnect)
//! - Frame-aligned scheduling of renders and two-phase DOM batching
//! - Bounded memoization, debounce and throttle
//! - Keyed list reconciliation and windowed virtualization
//!
//! Everything runs on one thread. The document, timers and frame loop are
//! in-process stand-ins for the platform, so components run and test the
//! same way natively.
//!
//! # Architecture
//!
//! - `dom`: node arena, markup builder and event dispatch
//! - `host`: clocks and the timer queue
//! - `scheduler`: the RenderScheduler and DomBatch singletons
//! - `memo`, `timing`: pure-function caching and call-rate limiting
//! - `element`: the `Component` contract and `Element` instances
//! - `list`: keyed reconciler and virtualizer
//! - `components`: `au-list` and `au-virtual-list`
//! - `runtime`: the facade that owns a document and runs frames
//!
//! # Example
//!
//! ```rust,ignore
//! use aurum_core::components::{field_key, AuList};
//! use aurum_core::Runtime;
//! use serde_json::json;
//!
//! let mut runtime = Runtime::new();
//! let list = runtime.mount(AuList::default(), runtime.body())?;
//!
//! list.set_key_fn(field_key("id"))?;
//! list.set_items(vec![json!({"id": 1, "label": "one"})])?;
//!
//! // The reconcile runs on the next frame
//! runtime.run_frame();
//! ```

pub mod components;
pub mod config;
pub mod dom;
pub mod element;
pub mod error;
pub mod host;
pub mod list;
pub mod memo;
pub mod runtime;
pub mod scheduler;
pub mod timing;

pub use config::RuntimeConfig;
pub use element::{AttributeChange, Component, Context, Element, ElementRegistry, UpdateStrategy};
pub use error::{Error, Result};
pub use memo::{memo, memo_with, Memo, MemoOptions};
pub use runtime::{FrameReport, Runtime};
pub use scheduler::{DomBatch, FlushMode, RenderScheduler};
pub use timing::{Debounce, Throttle};
