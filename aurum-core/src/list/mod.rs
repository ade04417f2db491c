//! List rendering: keyed reconciliation and windowed virtualization.

mod reconciler;
mod virtualizer;

pub use reconciler::{Key, KeyFn, KeyedReconciler, ReconcileReport, RenderItem};
pub use virtualizer::{
    compute_range, ViewportMetrics, VisibleRange, Virtualizer, ITEM_CLASS, SPACER_CLASS,
};
