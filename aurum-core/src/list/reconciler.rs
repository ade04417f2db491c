//! Keyed Reconciler
//!
//! Maps a data array onto the children of a container node by stable key.
//! Each pass:
//!
//! 1. Computes the new key set.
//! 2. Removes every materialized node whose key is gone.
//! 3. Renders each item and compares the markup with the node's current
//!    serialization; a node is replaced only when they differ.
//! 4. Moves a node only when its DOM predecessor is not the one the new
//!    order requires.
//!
//! A node whose key survives and whose markup is unchanged is never
//! recreated, so focus, listeners and any state hung off it survive too.
//!
//! # Keys
//!
//! The default key is the item's index, which ties identity to position:
//! inserting at the front re-renders every item after it. Supply a key
//! function for data with real identity. Duplicate keys are logged and the
//! last occurrence wins.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use serde::Serialize;
use tracing::{debug, error, warn};

use crate::dom::{Document, Markup, NodeId};
use crate::error::{Error, Result};

/// Identity of a list item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(untagged)]
pub enum Key {
    Index(usize),
    Int(i64),
    Str(String),
}

impl From<i64> for Key {
    fn from(value: i64) -> Self {
        Key::Int(value)
    }
}

impl From<i32> for Key {
    fn from(value: i32) -> Self {
        Key::Int(value.into())
    }
}

impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Key::Str(value.to_string())
    }
}

impl From<String> for Key {
    fn from(value: String) -> Self {
        Key::Str(value)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Index(i) => write!(f, "#{i}"),
            Key::Int(n) => write!(f, "{n}"),
            Key::Str(s) => f.write_str(s),
        }
    }
}

/// Computes an item's key from the item and its index.
pub type KeyFn<T> = Rc<dyn Fn(&T, usize) -> Key>;

/// Renders an item to markup. Must not touch the document.
pub type RenderItem<T> = Rc<dyn Fn(&T, usize) -> Result<Markup>>;

/// What one reconciliation pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Nodes materialized for new keys.
    pub created: usize,
    /// Nodes replaced because their markup changed.
    pub updated: usize,
    /// Nodes left as they were.
    pub unchanged: usize,
    /// Nodes removed because their key disappeared.
    pub removed: usize,
    /// Surviving nodes repositioned.
    pub moved: usize,
    /// Items whose `render_item` failed.
    pub failed: usize,
    /// Items dropped because a later item had the same key.
    pub duplicates: usize,
}

impl ReconcileReport {
    /// Whether the pass wrote to the document at all.
    pub fn is_noop(&self) -> bool {
        self.created == 0 && self.updated == 0 && self.removed == 0 && self.moved == 0
    }
}

/// Reconciles a container's children against a list of items.
pub struct KeyedReconciler<T> {
    container: NodeId,
    /// Materialized nodes in the order of the last pass.
    nodes: IndexMap<Key, NodeId>,
    key_fn: KeyFn<T>,
    render_item: RenderItem<T>,
}

impl<T> KeyedReconciler<T> {
    /// A reconciler keyed by index.
    pub fn new<R>(container: NodeId, render_item: R) -> Self
    where
        R: Fn(&T, usize) -> Result<Markup> + 'static,
    {
        Self {
            container,
            nodes: IndexMap::new(),
            key_fn: Rc::new(|_, index| Key::Index(index)),
            render_item: Rc::new(render_item),
        }
    }

    /// A reconciler from shared key and render functions.
    pub fn from_fns(container: NodeId, key_fn: KeyFn<T>, render_item: RenderItem<T>) -> Self {
        Self {
            container,
            nodes: IndexMap::new(),
            key_fn,
            render_item,
        }
    }

    pub fn with_key_fn<K>(mut self, key_fn: K) -> Self
    where
        K: Fn(&T, usize) -> Key + 'static,
    {
        self.key_fn = Rc::new(key_fn);
        self
    }

    pub fn set_key_fn(&mut self, key_fn: KeyFn<T>) {
        self.key_fn = key_fn;
    }

    pub fn set_render_item(&mut self, render_item: RenderItem<T>) {
        self.render_item = render_item;
    }

    pub fn container(&self) -> NodeId {
        self.container
    }

    /// The node currently materialized for `key`.
    pub fn node_for(&self, key: &Key) -> Option<NodeId> {
        self.nodes.get(key).copied()
    }

    /// Keys in DOM order as of the last pass.
    pub fn keys(&self) -> impl Iterator<Item = &Key> {
        self.nodes.keys()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Reconcile against `items`, indexed from zero.
    pub fn reconcile(&mut self, doc: &mut Document, items: &[T]) -> Result<ReconcileReport> {
        self.reconcile_indexed(doc, items.iter().enumerate())
    }

    /// Reconcile against a window of items carrying their own indices.
    pub fn reconcile_indexed<'a, I>(&mut self, doc: &mut Document, items: I) -> Result<ReconcileReport>
    where
        I: IntoIterator<Item = (usize, &'a T)>,
        T: 'a,
    {
        if doc.tag_name(self.container).is_none() {
            return Err(if doc.contains(self.container) {
                Error::NotAnElement(self.container)
            } else {
                Error::StaleNode(self.container)
            });
        }

        let mut report = ReconcileReport::default();

        // 1. New key set; a repeated key keeps its last occurrence.
        let mut entries: Vec<(Key, usize, &'a T)> = Vec::new();
        let mut slots: HashMap<Key, usize> = HashMap::new();
        for (index, item) in items {
            let key = (self.key_fn)(item, index);
            if let Some(&slot) = slots.get(&key) {
                warn!(key = %key, index, "duplicate list key; last occurrence wins");
                entries[slot].1 = index;
                entries[slot].2 = item;
                report.duplicates += 1;
            } else {
                slots.insert(key.clone(), entries.len());
                entries.push((key, index, item));
            }
        }

        // 2. Drop nodes whose key disappeared.
        let mut previous = std::mem::take(&mut self.nodes);
        previous.retain(|key, node| {
            if slots.contains_key(key) && doc.contains(*node) {
                return true;
            }
            if doc.contains(*node) {
                // Only nodes we can still see count as removals.
                if doc.remove(*node).is_ok() {
                    report.removed += 1;
                }
            }
            false
        });

        // 3. Render, diff and create.
        let mut next: IndexMap<Key, NodeId> = IndexMap::with_capacity(entries.len());
        let mut fresh: HashSet<NodeId> = HashSet::new();
        for (key, index, item) in entries {
            let existing = previous.get(&key).copied();
            let markup = match (self.render_item)(item, index) {
                Ok(markup) => markup,
                Err(err) => {
                    error!(key = %key, index, error = %err, "render_item failed");
                    report.failed += 1;
                    if let Some(node) = existing {
                        next.insert(key, node);
                    }
                    continue;
                }
            };
            let node = match existing {
                Some(node) if doc.outer_html(node) == markup.to_html() => {
                    report.unchanged += 1;
                    node
                }
                Some(node) => {
                    let replacement = doc.materialize(&markup);
                    doc.insert_before(self.container, replacement, Some(node))
                        .or_else(|_| doc.append_child(self.container, replacement))?;
                    doc.remove(node)?;
                    report.updated += 1;
                    fresh.insert(replacement);
                    replacement
                }
                None => {
                    let created = doc.materialize(&markup);
                    report.created += 1;
                    fresh.insert(created);
                    created
                }
            };
            next.insert(key, node);
        }

        // 4. Reposition against the required predecessor.
        let mut predecessor: Option<NodeId> = None;
        for node in next.values().copied() {
            let in_place = doc.parent(node) == Some(self.container)
                && doc.previous_sibling(node) == predecessor;
            if !in_place {
                let reference = match predecessor {
                    Some(prev) => doc.next_sibling(prev),
                    None => doc.first_child(self.container),
                };
                let was_attached = doc.parent(node) == Some(self.container);
                doc.insert_before(self.container, node, reference)?;
                if was_attached && !fresh.contains(&node) {
                    report.moved += 1;
                }
            }
            predecessor = Some(node);
        }

        self.nodes = next;
        debug!(
            container = %self.container,
            created = report.created,
            updated = report.updated,
            removed = report.removed,
            moved = report.moved,
            failed = report.failed,
            "reconciled"
        );
        Ok(report)
    }

    /// Remove every node this reconciler materialized.
    pub fn clear(&mut self, doc: &mut Document) -> usize {
        let mut removed = 0;
        for (_, node) in self.nodes.drain(..) {
            if doc.remove(node).is_ok() {
                removed += 1;
            }
        }
        removed
    }
}

impl<T> fmt::Debug for KeyedReconciler<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyedReconciler")
            .field("container", &self.container)
            .field("nodes", &self.nodes)
            .finish_non_exhaustive()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[derive(Debug, Clone)]
    struct Row {
        id: i64,
        label: &'static str,
    }

    fn row(id: i64, label: &'static str) -> Row {
        Row { id, label }
    }

    fn setup() -> (Document, KeyedReconciler<Row>) {
        let mut doc = Document::new();
        let container = doc.create_element("ul");
        let body = doc.body();
        doc.append_child(body, container).unwrap();
        let reconciler = KeyedReconciler::new(container, |row: &Row, _| {
            Ok(Markup::element("li")
                .attr("data-id", row.id)
                .with_text(row.label))
        })
        .with_key_fn(|row: &Row, _| Key::Int(row.id));
        (doc, reconciler)
    }

    fn ids(doc: &Document, container: NodeId) -> Vec<String> {
        doc.children(container)
            .iter()
            .filter_map(|child| doc.get_attribute(*child, "data-id").map(str::to_string))
            .collect()
    }

    #[test]
    fn preserves_identity_for_surviving_keys() {
        let (mut doc, mut reconciler) = setup();
        let container = reconciler.container();

        let first = reconciler
            .reconcile(&mut doc, &[row(1, "a"), row(2, "b"), row(3, "c")])
            .unwrap();
        assert_eq!(first.created, 3);
        let node1 = reconciler.node_for(&Key::Int(1)).unwrap();
        let node2 = reconciler.node_for(&Key::Int(2)).unwrap();
        let node3 = reconciler.node_for(&Key::Int(3)).unwrap();

        let second = reconciler
            .reconcile(&mut doc, &[row(2, "b"), row(3, "c"), row(4, "d")])
            .unwrap();

        assert_eq!(reconciler.node_for(&Key::Int(2)), Some(node2));
        assert_eq!(reconciler.node_for(&Key::Int(3)), Some(node3));
        assert!(!doc.contains(node1));
        assert_eq!(
            second,
            ReconcileReport {
                created: 1,
                unchanged: 2,
                removed: 1,
                ..ReconcileReport::default()
            }
        );
        assert_eq!(ids(&doc, container), ["2", "3", "4"]);
    }

    #[test]
    fn replaces_only_changed_content() {
        let (mut doc, mut reconciler) = setup();
        reconciler
            .reconcile(&mut doc, &[row(1, "a"), row(2, "b")])
            .unwrap();
        let node1 = reconciler.node_for(&Key::Int(1)).unwrap();
        let node2 = reconciler.node_for(&Key::Int(2)).unwrap();

        let report = reconciler
            .reconcile(&mut doc, &[row(1, "a"), row(2, "B")])
            .unwrap();

        assert_eq!((report.updated, report.unchanged), (1, 1));
        assert_eq!(reconciler.node_for(&Key::Int(1)), Some(node1));
        let replaced = reconciler.node_for(&Key::Int(2)).unwrap();
        assert_ne!(replaced, node2);
        assert_eq!(doc.text_content(replaced), "B");
        assert_eq!(doc.children(reconciler.container()), [node1, replaced]);
    }

    #[test]
    fn reorders_with_minimal_moves() {
        let (mut doc, mut reconciler) = setup();
        let container = reconciler.container();
        let rows = [row(1, "a"), row(2, "b"), row(3, "c"), row(4, "d")];
        reconciler.reconcile(&mut doc, &rows).unwrap();

        // Moving the last row to the front needs one move.
        let report = reconciler
            .reconcile(
                &mut doc,
                &[row(4, "d"), row(1, "a"), row(2, "b"), row(3, "c")],
            )
            .unwrap();
        assert_eq!(report.moved, 1);
        assert_eq!(ids(&doc, container), ["4", "1", "2", "3"]);

        let report = reconciler
            .reconcile(
                &mut doc,
                &[row(3, "c"), row(2, "b"), row(1, "a"), row(4, "d")],
            )
            .unwrap();
        assert_eq!(ids(&doc, container), ["3", "2", "1", "4"]);
        assert_eq!(report.created + report.removed + report.updated, 0);
    }

    #[test]
    fn reverses_a_large_list_in_place() {
        let (mut doc, mut reconciler) = setup();
        let container = reconciler.container();
        let rows: Vec<Row> = (0..2000).map(|id| row(id, "x")).collect();
        reconciler.reconcile(&mut doc, &rows).unwrap();
        let before = doc.children(container).to_vec();

        let reversed: Vec<Row> = (0..2000).rev().map(|id| row(id, "x")).collect();
        let report = reconciler.reconcile(&mut doc, &reversed).unwrap();

        // Every node but the one that ends up last moves once.
        assert_eq!(report.moved, 1999);
        assert_eq!(report.unchanged, 2000);
        let after = doc.children(container).to_vec();
        assert!(after.iter().eq(before.iter().rev()));
    }

    #[test]
    fn unchanged_input_writes_nothing() {
        let (mut doc, mut reconciler) = setup();
        let rows = [row(1, "a"), row(2, "b")];
        reconciler.reconcile(&mut doc, &rows).unwrap();
        let report = reconciler.reconcile(&mut doc, &rows).unwrap();
        assert!(report.is_noop());
        assert_eq!(report.unchanged, 2);
    }

    #[test]
    fn render_failure_is_isolated_to_its_key() {
        let mut doc = Document::new();
        let container = doc.create_element("ul");
        let fail_on = Rc::new(Cell::new(0_i64));
        let f = fail_on.clone();
        let mut reconciler = KeyedReconciler::new(container, move |row: &Row, _| {
            if row.id == f.get() {
                return Err(Error::render("li", "boom"));
            }
            Ok(Markup::element("li").with_text(row.label))
        })
        .with_key_fn(|row: &Row, _| Key::Int(row.id));

        reconciler
            .reconcile(&mut doc, &[row(1, "a"), row(2, "b")])
            .unwrap();
        let node1 = reconciler.node_for(&Key::Int(1)).unwrap();

        fail_on.set(1);
        let report = reconciler
            .reconcile(&mut doc, &[row(1, "changed"), row(2, "b"), row(3, "c")])
            .unwrap();

        assert_eq!(report.failed, 1);
        assert_eq!(report.created, 1);
        assert_eq!(reconciler.node_for(&Key::Int(1)), Some(node1));
        assert_eq!(doc.text_content(node1), "a");

        fail_on.set(4);
        let report = reconciler
            .reconcile(&mut doc, &[row(4, "d"), row(2, "b")])
            .unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(reconciler.node_for(&Key::Int(4)), None);
        assert_eq!(reconciler.len(), 1);
    }

    #[test]
    fn duplicate_keys_keep_last_occurrence() {
        let (mut doc, mut reconciler) = setup();
        let report = reconciler
            .reconcile(&mut doc, &[row(1, "first"), row(2, "b"), row(1, "last")])
            .unwrap();

        assert_eq!(report.duplicates, 1);
        assert_eq!(reconciler.len(), 2);
        let node1 = reconciler.node_for(&Key::Int(1)).unwrap();
        assert_eq!(doc.text_content(node1), "last");
    }

    #[test]
    fn index_keys_track_position() {
        let mut doc = Document::new();
        let container = doc.create_element("ol");
        let mut reconciler =
            KeyedReconciler::new(container, |label: &&str, _| Ok(Markup::element("li").with_text(*label)));

        reconciler.reconcile(&mut doc, &["a", "b"]).unwrap();
        let report = reconciler.reconcile(&mut doc, &["z", "a", "b"]).unwrap();

        // Every position changed content, so nothing was reused.
        assert_eq!((report.updated, report.created), (2, 1));
        assert_eq!(doc.text_content(container), "zab");
    }

    #[test]
    fn clear_removes_everything() {
        let (mut doc, mut reconciler) = setup();
        reconciler
            .reconcile(&mut doc, &[row(1, "a"), row(2, "b")])
            .unwrap();
        assert_eq!(reconciler.clear(&mut doc), 2);
        assert!(reconciler.is_empty());
        assert!(doc.children(reconciler.container()).is_empty());
    }

    #[test]
    fn stale_container_is_an_error() {
        let (mut doc, mut reconciler) = setup();
        doc.remove(reconciler.container()).unwrap();
        assert!(matches!(
            reconciler.reconcile(&mut doc, &[row(1, "a")]),
            Err(Error::StaleNode(_))
        ));
    }
}
