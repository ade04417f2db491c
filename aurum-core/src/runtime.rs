//! Runtime
//!
//! Ties one document, one timer queue, the element registry and the two
//! frame schedulers together, and plays the part of the host's frame loop.
//!
//! # How It Works
//!
//! 1. `Runtime::new` (or `with_config`) initializes the RenderScheduler and
//!    DomBatch singletons for the current thread and defines the built-in
//!    list components.
//!
//! 2. Schedulers only *request* frames. `run_frame` is the per-frame
//!    callback: it flushes pending renders, then the DOM batch.
//!
//! 3. Time is virtual. `advance` moves the clock and fires due timers;
//!    `tick` advances one frame interval and runs a frame.
//!
//! Dropping the runtime resets both schedulers, so queued callbacks never
//! leak into the next runtime created on the same thread.

use std::fmt::Debug;
use std::time::Duration;

use tracing::{debug, warn};

use crate::components::{AuList, AuVirtualList};
use crate::config::RuntimeConfig;
use crate::dom::{Dom, NodeId};
use crate::element::{AnyElement, Component, Element, ElementRegistry};
use crate::error::Result;
use crate::host::{ManualClock, Timers};
use crate::memo::Memo;
use crate::scheduler::{BatchFlush, DomBatch, FlushStats, RenderScheduler};
use crate::timing::{Debounce, Throttle};

/// Work done by one frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameReport {
    pub renders: FlushStats,
    pub batch: BatchFlush,
}

impl FrameReport {
    /// Whether the frame ran any callback.
    pub fn is_idle(&self) -> bool {
        self.renders.ran == 0 && self.batch.reads.ran == 0 && self.batch.writes.ran == 0
    }

    pub fn failed(&self) -> usize {
        self.renders.failed + self.batch.reads.failed + self.batch.writes.failed
    }
}

pub struct Runtime {
    config: RuntimeConfig,
    dom: Dom,
    clock: ManualClock,
    timers: Timers,
    registry: ElementRegistry,
    frames: u64,
}

impl Runtime {
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    pub fn with_config(config: RuntimeConfig) -> Self {
        RenderScheduler::init(config.flush_mode);
        DomBatch::init(config.flush_mode);

        let clock = ManualClock::new();
        let timers = Timers::manual(clock.clone());
        let mut registry = ElementRegistry::new();
        let buffer = config.virtual_buffer;
        let throttle = config.scroll_throttle();
        // Fresh registry, so these cannot collide.
        if let Err(err) = registry
            .define::<AuList>()
            .and_then(|()| registry.define_with(move || AuVirtualList::new(buffer, throttle)))
        {
            warn!(error = %err, "built-in element definition failed");
        }
        debug!(flush_mode = ?config.flush_mode, "runtime initialized");

        Self {
            config,
            dom: Dom::new(),
            clock,
            timers,
            registry,
            frames: 0,
        }
    }

    /// Build a runtime from a JSON config.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(Self::with_config(RuntimeConfig::from_json(json)?))
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn dom(&self) -> &Dom {
        &self.dom
    }

    pub fn body(&self) -> NodeId {
        self.dom.body()
    }

    pub fn timers(&self) -> &Timers {
        &self.timers
    }

    pub fn clock(&self) -> &ManualClock {
        &self.clock
    }

    pub fn registry(&self) -> &ElementRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut ElementRegistry {
        &mut self.registry
    }

    /// Define a component with `Default` construction.
    pub fn define<C: Component + Default>(&mut self) -> Result<()> {
        self.registry.define::<C>()
    }

    /// Create a detached instance of a registered tag.
    pub fn create(&self, tag: &str) -> Result<Box<dyn AnyElement>> {
        self.registry.create(tag, &self.dom, &self.timers)
    }

    /// Bind `component` to a new detached host node.
    pub fn element<C: Component>(&self, component: C) -> Element<C> {
        Element::new(&self.dom, &self.timers, component)
    }

    /// Bind `component` and mount it under `parent`.
    pub fn mount<C: Component>(&self, component: C, parent: NodeId) -> Result<Element<C>> {
        let element = self.element(component);
        element.mount(parent)?;
        Ok(element)
    }

    /// The per-frame callback: flush renders, then the DOM batch.
    pub fn run_frame(&mut self) -> FrameReport {
        self.frames += 1;
        let report = FrameReport {
            renders: RenderScheduler::flush_if_requested().unwrap_or_default(),
            batch: DomBatch::flush_if_requested().unwrap_or_default(),
        };
        if !report.is_idle() {
            debug!(
                frame = self.frames,
                renders = report.renders.ran,
                reads = report.batch.reads.ran,
                writes = report.batch.writes.ran,
                failed = report.failed(),
                "frame"
            );
        }
        report
    }

    /// Frames run so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Move virtual time forward, firing due timers. Returns how many fired.
    pub fn advance(&self, by: Duration) -> usize {
        self.timers.advance(by)
    }

    /// Advance one frame interval, then run a frame.
    pub fn tick(&mut self) -> FrameReport {
        self.advance(self.config.frame_interval());
        self.run_frame()
    }

    /// Run frames until neither scheduler has work, up to `max_frames`.
    /// Returns the number of frames run.
    pub fn settle(&mut self, max_frames: usize) -> usize {
        let mut frames = 0;
        while frames < max_frames
            && (RenderScheduler::is_flush_requested() || DomBatch::is_flush_requested())
        {
            self.run_frame();
            frames += 1;
        }
        frames
    }

    /// Memoize `compute`, bounded by `memo_max_size` when configured.
    pub fn memo<A, R, F>(&self, compute: F) -> Memo<A, R>
    where
        A: Debug + 'static,
        R: Clone,
        F: Fn(&A) -> R + Send + Sync + 'static,
    {
        let memo = Memo::new(compute);
        match self.config.memo_max_size {
            Some(max_size) => memo.with_max_size(max_size),
            None => memo,
        }
    }

    /// Debounce `run` on this runtime's timers.
    pub fn debounce<A: 'static, F>(&self, wait: Duration, run: F) -> Debounce<A>
    where
        F: Fn(A) + 'static,
    {
        Debounce::new(&self.timers, wait, run)
    }

    /// Throttle `run` against this runtime's clock.
    pub fn throttle<A, F>(&self, wait: Duration, run: F) -> Throttle<A>
    where
        F: Fn(A) + 'static,
    {
        Throttle::new(self.clock.clone(), wait, run)
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        RenderScheduler::reset();
        DomBatch::reset();
    }
}
