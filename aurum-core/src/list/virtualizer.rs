//! Virtualizer
//!
//! Windowed rendering for long lists of fixed-height rows. Only the rows
//! intersecting the viewport, plus `buffer` rows on each side, exist in the
//! document. They are absolutely positioned inside a spacer whose height
//! stands in for the whole list.
//!
//! ```text
//! start = max(0, floor(scroll_top / item_height) - buffer)
//! count = ceil(viewport_height / item_height) + 2 * buffer
//! end   = min(item_count, start + count)
//! ```
//!
//! Scrolling re-renders only when `[start, end)` changes; the comparison is
//! on the range alone, not on content.

use std::cell::Cell;
use std::rc::Rc;

use serde::Serialize;
use tracing::trace;

use super::reconciler::{Key, KeyFn, KeyedReconciler, ReconcileReport, RenderItem};
use crate::dom::{Document, Markup, NodeId};
use crate::error::Result;

/// Class of the spacer node.
pub const SPACER_CLASS: &str = "au-virtual-spacer";
/// Class of the wrapper around each materialized row.
pub const ITEM_CLASS: &str = "au-virtual-item";

/// Half-open index range `[start, end)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct VisibleRange {
    pub start: usize,
    pub end: usize,
}

impl VisibleRange {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn contains(&self, index: usize) -> bool {
        (self.start..self.end).contains(&index)
    }
}

/// Inputs of the window computation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportMetrics {
    pub item_count: usize,
    pub item_height: f64,
    pub viewport_height: f64,
    pub scroll_top: f64,
    pub buffer: usize,
}

/// Compute the materialized window. A non-positive item height yields an
/// empty window.
pub fn compute_range(metrics: &ViewportMetrics) -> VisibleRange {
    let h = metrics.item_height;
    if h.is_nan() || h <= 0.0 || metrics.item_count == 0 {
        return VisibleRange::default();
    }
    let first_visible = (metrics.scroll_top.max(0.0) / h).floor() as usize;
    // Float-to-usize casts saturate, so tiny heights or huge buffers cap at
    // `usize::MAX` instead of overflowing.
    let per_view = (metrics.viewport_height.max(0.0) / h).ceil() as usize;
    let visible = per_view.saturating_add(metrics.buffer.saturating_mul(2));

    let start = first_visible.saturating_sub(metrics.buffer);
    let end = metrics.item_count.min(start.saturating_add(visible));
    VisibleRange {
        start: start.min(end),
        end,
    }
}

/// Format a pixel length without a trailing `.0`.
fn px(value: f64) -> String {
    format!("{value}px")
}

/// Windowed list over a container node.
pub struct Virtualizer<T> {
    spacer: NodeId,
    reconciler: KeyedReconciler<T>,
    items: Vec<T>,
    item_height: Rc<Cell<f64>>,
    viewport_height: f64,
    scroll_top: f64,
    buffer: usize,
    range: Option<VisibleRange>,
}

impl<T: 'static> Virtualizer<T> {
    /// Create the spacer inside `container`. Nothing is rendered until the
    /// first [`render`](Self::render) or [`set_items`](Self::set_items).
    pub fn new<R>(
        doc: &mut Document,
        container: NodeId,
        item_height: f64,
        viewport_height: f64,
        buffer: usize,
        render_item: R,
    ) -> Result<Self>
    where
        R: Fn(&T, usize) -> Result<Markup> + 'static,
    {
        let spacer = doc.materialize(
            &Markup::element("div")
                .attr("class", SPACER_CLASS)
                .attr("style", "position:relative;height:0px"),
        );
        doc.append_child(container, spacer)?;

        let item_height = Rc::new(Cell::new(item_height));
        let reconciler = KeyedReconciler::new(spacer, wrap(Rc::new(render_item), item_height.clone()));
        Ok(Self {
            spacer,
            reconciler,
            items: Vec::new(),
            item_height,
            viewport_height,
            scroll_top: 0.0,
            buffer,
            range: None,
        })
    }

    pub fn with_key_fn<K>(mut self, key_fn: K) -> Self
    where
        K: Fn(&T, usize) -> Key + 'static,
    {
        self.reconciler.set_key_fn(Rc::new(key_fn));
        self
    }

    pub fn set_key_fn(&mut self, key_fn: KeyFn<T>) {
        self.reconciler.set_key_fn(key_fn);
    }

    pub fn set_render_item(&mut self, render_item: RenderItem<T>) {
        self.reconciler
            .set_render_item(Rc::new(wrap(render_item, self.item_height.clone())));
    }

    pub fn spacer(&self) -> NodeId {
        self.spacer
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    pub fn item_height(&self) -> f64 {
        self.item_height.get()
    }

    pub fn scroll_top(&self) -> f64 {
        self.scroll_top
    }

    pub fn buffer(&self) -> usize {
        self.buffer
    }

    /// Height of the whole list: `item_count * item_height`.
    pub fn total_height(&self) -> f64 {
        self.items.len() as f64 * self.item_height.get()
    }

    pub fn metrics(&self) -> ViewportMetrics {
        ViewportMetrics {
            item_count: self.items.len(),
            item_height: self.item_height.get(),
            viewport_height: self.viewport_height,
            scroll_top: self.scroll_top,
            buffer: self.buffer,
        }
    }

    /// The window for the current metrics.
    pub fn visible_range(&self) -> VisibleRange {
        compute_range(&self.metrics())
    }

    /// The window last rendered, if any.
    pub fn rendered_range(&self) -> Option<VisibleRange> {
        self.range
    }

    /// Nodes currently materialized.
    pub fn materialized(&self) -> usize {
        self.reconciler.len()
    }

    pub fn node_for(&self, key: &Key) -> Option<NodeId> {
        self.reconciler.node_for(key)
    }

    /// Replace the items and re-render unconditionally.
    pub fn set_items(&mut self, doc: &mut Document, items: Vec<T>) -> Result<ReconcileReport> {
        self.items = items;
        self.render(doc)
    }

    /// Scroll to `scroll_top`. Returns the new window, or `None` when the
    /// window did not change and nothing was rendered.
    pub fn set_scroll_top(&mut self, doc: &mut Document, scroll_top: f64) -> Result<Option<VisibleRange>> {
        self.scroll_top = scroll_top.max(0.0);
        self.refresh(doc)
    }

    /// Scroll so that row `index` is the first visible row.
    pub fn scroll_to(&mut self, doc: &mut Document, index: usize) -> Result<Option<VisibleRange>> {
        let top = index as f64 * self.item_height.get();
        self.set_scroll_top(doc, top)
    }

    pub fn set_viewport_height(&mut self, doc: &mut Document, height: f64) -> Result<Option<VisibleRange>> {
        self.viewport_height = height;
        self.refresh(doc)
    }

    pub fn set_buffer(&mut self, doc: &mut Document, buffer: usize) -> Result<Option<VisibleRange>> {
        self.buffer = buffer;
        self.refresh(doc)
    }

    /// Changing the row height moves every row, so this always re-renders.
    pub fn set_item_height(&mut self, doc: &mut Document, height: f64) -> Result<ReconcileReport> {
        self.item_height.set(height);
        self.render(doc)
    }

    fn refresh(&mut self, doc: &mut Document) -> Result<Option<VisibleRange>> {
        let range = self.visible_range();
        if self.range == Some(range) {
            trace!(start = range.start, end = range.end, "window unchanged");
            return Ok(None);
        }
        self.render(doc)?;
        Ok(Some(range))
    }

    /// Size the spacer and reconcile the current window.
    pub fn render(&mut self, doc: &mut Document) -> Result<ReconcileReport> {
        let range = self.visible_range();
        doc.set_attribute(
            self.spacer,
            "style",
            &format!("position:relative;height:{}", px(self.total_height())),
        )?;
        let window = self.items[range.start..range.end]
            .iter()
            .enumerate()
            .map(|(offset, item)| (range.start + offset, item));
        let report = self.reconciler.reconcile_indexed(doc, window)?;
        self.range = Some(range);
        trace!(
            start = range.start,
            end = range.end,
            created = report.created,
            removed = report.removed,
            "window rendered"
        );
        Ok(report)
    }

    /// Remove every row and the spacer.
    pub fn destroy(mut self, doc: &mut Document) {
        self.reconciler.clear(doc);
        // The spacer may already be gone with its container.
        let _ = doc.remove(self.spacer);
    }
}

/// Wrap a row renderer so each row sits at `index * item_height`.
fn wrap<T: 'static>(inner: RenderItem<T>, item_height: Rc<Cell<f64>>) -> impl Fn(&T, usize) -> Result<Markup> {
    move |item: &T, index: usize| {
        let h = item_height.get();
        let content = inner(item, index)?;
        Ok(Markup::element("div")
            .attr("class", ITEM_CLASS)
            .attr("data-index", index)
            .attr(
                "style",
                format!("position:absolute;top:{};height:{}", px(index as f64 * h), px(h)),
            )
            .child(content))
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
