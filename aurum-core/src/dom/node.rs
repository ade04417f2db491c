//! Document Nodes
//!
//! This module defines the node types stored in the document arena.

use std::fmt;

use indexmap::IndexMap;

/// Unique identifier for a node in the document arena.
///
/// An id is an arena index plus a generation. Freeing a node bumps the
/// generation of its slot, so an id held after removal never aliases the
/// node that later reuses the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl NodeId {
    pub(crate) fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Get the arena slot index.
    pub fn index(&self) -> usize {
        self.index as usize
    }

    /// Get the slot generation this id was issued for.
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}v{}", self.index, self.generation)
    }
}

/// What a node holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// An element with a tag name and ordered attributes.
    Element {
        tag: String,
        attributes: IndexMap<String, String>,
    },

    /// A text node.
    Text(String),
}

/// A node in the document arena.
#[derive(Debug, Clone)]
pub struct NodeData {
    pub(crate) kind: NodeKind,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
}

impl NodeData {
    /// Create a detached element node.
    pub fn element(tag: impl Into<String>) -> Self {
        Self {
            kind: NodeKind::Element {
                tag: tag.into(),
                attributes: IndexMap::new(),
            },
            parent: None,
            children: Vec::new(),
        }
    }

    /// Create a detached text node.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: NodeKind::Text(text.into()),
            parent: None,
            children: Vec::new(),
        }
    }

    /// Get the node's kind.
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// Get the parent, if attached.
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Get the children in document order.
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Check if this is an element node.
    pub fn is_element(&self) -> bool {
        matches!(self.kind, NodeKind::Element { .. })
    }

    /// Get the tag name of an element node.
    pub fn tag(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Element { tag, .. } => Some(tag),
            NodeKind::Text(_) => None,
        }
    }

    /// Get the attribute map of an element node.
    pub fn attributes(&self) -> Option<&IndexMap<String, String>> {
        match &self.kind {
            NodeKind::Element { attributes, .. } => Some(attributes),
            NodeKind::Text(_) => None,
        }
    }
}
