//! Document Arena
//!
//! The document owns every node in a slot arena addressed by `NodeId`.
//! Removing a node frees its whole subtree and every listener registered on
//! it, so nothing keeps a detached node alive.

use std::collections::HashMap;

use indexmap::IndexMap;
use smallvec::SmallVec;

use super::event::{Listener, ListenerOptions};
use super::markup::{self, Markup};
use super::node::{NodeData, NodeId, NodeKind};
use crate::error::{Error, Result};

struct Slot {
    generation: u32,
    data: Option<NodeData>,
}

/// A listener registration on one node.
#[derive(Debug, Clone)]
pub(crate) struct Registration {
    pub(crate) event_type: String,
    pub(crate) listener: Listener,
    pub(crate) options: ListenerOptions,
}

/// Which listeners run while an event visits a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    Capture,
    AtTarget,
    Bubble,
}

/// Path buffer for event dispatch; most trees are shallow.
pub(crate) type NodePath = SmallVec<[NodeId; 16]>;

/// An in-memory document.
pub struct Document {
    slots: Vec<Slot>,
    free: Vec<u32>,
    body: NodeId,
    listeners: HashMap<NodeId, Vec<Registration>>,
    live: usize,
}

impl Document {
    /// Create a document containing only `<body>`.
    pub fn new() -> Self {
        let mut document = Self {
            slots: Vec::new(),
            free: Vec::new(),
            body: NodeId::new(0, 0),
            listeners: HashMap::new(),
            live: 0,
        };
        document.body = document.alloc(NodeData::element("body"));
        document
    }

    /// The root element every connected node descends from.
    pub fn body(&self) -> NodeId {
        self.body
    }

    // ------------------------------------------------------------------------
    // Arena
    // ------------------------------------------------------------------------

    fn alloc(&mut self, data: NodeData) -> NodeId {
        self.live += 1;
        match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.data = Some(data);
                NodeId::new(index, slot.generation)
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Slot {
                    generation: 0,
                    data: Some(data),
                });
                NodeId::new(index, 0)
            }
        }
    }

    /// Get a live node.
    pub fn get(&self, id: NodeId) -> Option<&NodeData> {
        self.slots
            .get(id.index())
            .filter(|slot| slot.generation == id.generation())
            .and_then(|slot| slot.data.as_ref())
    }

    fn get_mut(&mut self, id: NodeId) -> Option<&mut NodeData> {
        self.slots
            .get_mut(id.index())
            .filter(|slot| slot.generation == id.generation())
            .and_then(|slot| slot.data.as_mut())
    }

    fn data(&self, id: NodeId) -> Result<&NodeData> {
        self.get(id).ok_or(Error::StaleNode(id))
    }

    fn data_mut(&mut self, id: NodeId) -> Result<&mut NodeData> {
        self.get_mut(id).ok_or(Error::StaleNode(id))
    }

    /// Check if the id refers to a live node.
    pub fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    /// Number of live nodes, including `<body>`.
    pub fn node_count(&self) -> usize {
        self.live
    }

    // ------------------------------------------------------------------------
    // Construction
    // ------------------------------------------------------------------------

    /// Create a detached element.
    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.alloc(NodeData::element(tag))
    }

    /// Create a detached text node.
    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.alloc(NodeData::text(text))
    }

    /// Build a detached subtree from markup and return its root.
    pub fn materialize(&mut self, markup: &Markup) -> NodeId {
        match markup {
            Markup::Text(text) => self.create_text(text),
            Markup::Element {
                tag,
                attributes,
                children,
            } => {
                let id = self.alloc(NodeData {
                    kind: NodeKind::Element {
                        tag: tag.clone(),
                        attributes: attributes.clone(),
                    },
                    parent: None,
                    children: Vec::new(),
                });
                for child in children {
                    let child_id = self.materialize(child);
                    if let Some(child_data) = self.get_mut(child_id) {
                        child_data.parent = Some(id);
                    }
                    if let Some(parent) = self.get_mut(id) {
                        parent.children.push(child_id);
                    }
                }
                id
            }
        }
    }

    // ------------------------------------------------------------------------
    // Tree navigation
    // ------------------------------------------------------------------------

    pub fn tag_name(&self, id: NodeId) -> Option<&str> {
        self.get(id).and_then(NodeData::tag)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.get(id).and_then(NodeData::parent)
    }

    /// Children in document order; empty for stale ids.
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.get(id).map(NodeData::children).unwrap_or(&[])
    }

    pub fn first_child(&self, id: NodeId) -> Option<NodeId> {
        self.children(id).first().copied()
    }

    pub fn last_child(&self, id: NodeId) -> Option<NodeId> {
        self.children(id).last().copied()
    }

    pub fn previous_sibling(&self, id: NodeId) -> Option<NodeId> {
        let siblings = self.children(self.parent(id)?);
        let position = siblings.iter().position(|sibling| *sibling == id)?;
        position.checked_sub(1).map(|p| siblings[p])
    }

    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        let siblings = self.children(self.parent(id)?);
        let position = siblings.iter().position(|sibling| *sibling == id)?;
        siblings.get(position + 1).copied()
    }

    /// Check if `ancestor` is `node` or one of its ancestors.
    pub fn is_inclusive_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.parent(id);
        }
        false
    }

    /// Check if the node is attached under `<body>`.
    pub fn is_connected(&self, id: NodeId) -> bool {
        self.contains(id) && self.is_inclusive_ancestor(self.body, id)
    }

    /// All descendants of `root` in pre-order, excluding `root`.
    pub fn descendants(&self, root: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(root).iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self.children(id).iter().rev().copied());
        }
        out
    }

    /// First descendant of `root` in pre-order matching `predicate`.
    pub fn find_descendant<F>(&self, root: NodeId, predicate: F) -> Option<NodeId>
    where
        F: Fn(&NodeData) -> bool,
    {
        self.descendants(root)
            .into_iter()
            .find(|id| self.get(*id).is_some_and(&predicate))
    }

    /// First descendant of `root` whose `class` attribute lists `class`.
    pub fn find_by_class(&self, root: NodeId, class: &str) -> Option<NodeId> {
        self.find_descendant(root, |node| {
            node.attributes()
                .and_then(|attrs| attrs.get("class"))
                .is_some_and(|value| value.split_whitespace().any(|c| c == class))
        })
    }

    // ------------------------------------------------------------------------
    // Tree mutation
    // ------------------------------------------------------------------------

    fn ensure_element(&self, id: NodeId) -> Result<()> {
        if self.data(id)?.is_element() {
            Ok(())
        } else {
            Err(Error::NotAnElement(id))
        }
    }

    /// Append `child` to `parent`, moving it if it is attached elsewhere.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        self.insert_before(parent, child, None)
    }

    /// Insert `child` into `parent` before `reference`, or at the end when
    /// `reference` is `None`. An attached child is moved.
    pub fn insert_before(
        &mut self,
        parent: NodeId,
        child: NodeId,
        reference: Option<NodeId>,
    ) -> Result<()> {
        self.ensure_element(parent)?;
        self.data(child)?;
        if reference == Some(child) {
            return Ok(());
        }
        if child == self.body || self.is_inclusive_ancestor(child, parent) {
            return Err(Error::Hierarchy { parent, child });
        }
        if let Some(reference) = reference {
            if self.parent(reference) != Some(parent) {
                return Err(Error::NotAChild {
                    parent,
                    child: reference,
                });
            }
        }

        self.detach(child);

        let position = match reference {
            Some(reference) => self
                .children(parent)
                .iter()
                .position(|sibling| *sibling == reference)
                .ok_or(Error::NotAChild {
                    parent,
                    child: reference,
                })?,
            None => self.children(parent).len(),
        };
        self.data_mut(parent)?.children.insert(position, child);
        self.data_mut(child)?.parent = Some(parent);
        Ok(())
    }

    /// Detach a node from its parent without freeing it.
    pub fn detach(&mut self, id: NodeId) -> Option<NodeId> {
        let parent = self.get_mut(id)?.parent.take()?;
        if let Some(parent_data) = self.get_mut(parent) {
            parent_data.children.retain(|child| *child != id);
        }
        Some(parent)
    }

    /// Detach a node and free its subtree along with all of its listeners.
    pub fn remove(&mut self, id: NodeId) -> Result<()> {
        self.data(id)?;
        if id == self.body {
            return Err(Error::Hierarchy {
                parent: id,
                child: id,
            });
        }
        self.detach(id);

        let mut stack = vec![id];
        while let Some(node) = stack.pop() {
            let Some(slot) = self.slots.get_mut(node.index()) else {
                continue;
            };
            if slot.generation != node.generation() {
                continue;
            }
            if let Some(data) = slot.data.take() {
                slot.generation = slot.generation.wrapping_add(1);
                stack.extend(data.children);
                self.free.push(node.index() as u32);
                self.listeners.remove(&node);
                self.live -= 1;
            }
        }
        Ok(())
    }

    /// Remove every child of `id`.
    pub fn clear_children(&mut self, id: NodeId) -> Result<()> {
        let children = self.data(id)?.children.clone();
        for child in children {
            self.remove(child)?;
        }
        Ok(())
    }

    /// Replace an element's children with a single text node, or change the
    /// text of a text node.
    pub fn set_text(&mut self, id: NodeId, text: &str) -> Result<()> {
        if let NodeKind::Text(current) = &mut self.data_mut(id)?.kind {
            *current = text.to_string();
            return Ok(());
        }
        self.clear_children(id)?;
        let text_node = self.create_text(text);
        self.append_child(id, text_node)
    }

    /// Concatenated text of the node and its descendants.
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        if let Some(NodeKind::Text(text)) = self.get(id).map(NodeData::kind) {
            out.push_str(text);
        }
        for node in self.descendants(id) {
            if let Some(NodeKind::Text(text)) = self.get(node).map(NodeData::kind) {
                out.push_str(text);
            }
        }
        out
    }

    // ------------------------------------------------------------------------
    // Attributes
    // ------------------------------------------------------------------------

    fn attributes_mut(&mut self, id: NodeId) -> Result<&mut IndexMap<String, String>> {
        match &mut self.data_mut(id)?.kind {
            NodeKind::Element { attributes, .. } => Ok(attributes),
            NodeKind::Text(_) => Err(Error::NotAnElement(id)),
        }
    }

    pub fn get_attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        self.get(id)
            .and_then(NodeData::attributes)
            .and_then(|attrs| attrs.get(name))
            .map(String::as_str)
    }

    pub fn has_attribute(&self, id: NodeId, name: &str) -> bool {
        self.get_attribute(id, name).is_some()
    }

    /// Set an attribute and return the previous value.
    pub fn set_attribute(&mut self, id: NodeId, name: &str, value: &str) -> Result<Option<String>> {
        Ok(self
            .attributes_mut(id)?
            .insert(name.to_string(), value.to_string()))
    }

    /// Remove an attribute and return the previous value.
    pub fn remove_attribute(&mut self, id: NodeId, name: &str) -> Result<Option<String>> {
        Ok(self.attributes_mut(id)?.shift_remove(name))
    }

    // ------------------------------------------------------------------------
    // Serialization
    // ------------------------------------------------------------------------

    /// Serialize the node and its subtree; empty for stale ids.
    pub fn outer_html(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.write_html(id, &mut out);
        out
    }

    /// Serialize the node's children.
    pub fn inner_html(&self, id: NodeId) -> String {
        let mut out = String::new();
        for child in self.children(id) {
            self.write_html(*child, &mut out);
        }
        out
    }

    fn write_html(&self, id: NodeId, out: &mut String) {
        let Some(data) = self.get(id) else {
            return;
        };
        match &data.kind {
            NodeKind::Text(text) => markup::write_text(out, text),
            NodeKind::Element { tag, attributes } => {
                markup::write_open_tag(out, tag, attributes.iter());
                for child in &data.children {
                    self.write_html(*child, out);
                }
                markup::write_close_tag(out, tag);
            }
        }
    }

    // ------------------------------------------------------------------------
    // Listeners
    // ------------------------------------------------------------------------

    /// Register a listener. Returns `false` if the same (type, listener,
    /// capture) registration already exists on the target.
    pub fn add_listener(
        &mut self,
        target: NodeId,
        event_type: &str,
        listener: Listener,
        options: ListenerOptions,
    ) -> Result<bool> {
        self.data(target)?;
        if self.has_listener(target, event_type, &listener, options.capture) {
            return Ok(false);
        }
        self.listeners.entry(target).or_default().push(Registration {
            event_type: event_type.to_string(),
            listener,
            options,
        });
        Ok(true)
    }

    /// Remove a registration. Returns `false` if it was not present.
    pub fn remove_listener(
        &mut self,
        target: NodeId,
        event_type: &str,
        listener: &Listener,
        capture: bool,
    ) -> bool {
        let Some(registrations) = self.listeners.get_mut(&target) else {
            return false;
        };
        let before = registrations.len();
        registrations.retain(|r| {
            !(r.event_type == event_type && r.options.capture == capture && r.listener == *listener)
        });
        let removed = registrations.len() != before;
        if registrations.is_empty() {
            self.listeners.remove(&target);
        }
        removed
    }

    pub fn has_listener(
        &self,
        target: NodeId,
        event_type: &str,
        listener: &Listener,
        capture: bool,
    ) -> bool {
        self.listeners.get(&target).is_some_and(|registrations| {
            registrations.iter().any(|r| {
                r.event_type == event_type && r.options.capture == capture && r.listener == *listener
            })
        })
    }

    /// Number of registrations on one node.
    pub fn listener_count(&self, target: NodeId) -> usize {
        self.listeners.get(&target).map_or(0, Vec::len)
    }

    /// Number of registrations in the whole document.
    pub fn total_listeners(&self) -> usize {
        self.listeners.values().map(Vec::len).sum()
    }

    pub(crate) fn listeners_for(
        &self,
        node: NodeId,
        event_type: &str,
        phase: Phase,
    ) -> SmallVec<[Registration; 4]> {
        self.listeners
            .get(&node)
            .map(|registrations| {
                registrations
                    .iter()
                    .filter(|r| r.event_type == event_type)
                    .filter(|r| match phase {
                        Phase::Capture => r.options.capture,
                        Phase::AtTarget => true,
                        Phase::Bubble => !r.options.capture,
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The target followed by its ancestors, innermost first.
    pub(crate) fn propagation_path(&self, target: NodeId) -> NodePath {
        let mut path = NodePath::new();
        let mut current = self.get(target).map(|_| target);
        while let Some(id) = current {
            path.push(id);
            current = self.parent(id);
        }
        path
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}
