//! Error Types
//!
//! A single error enum covers every fallible runtime operation. Render and
//! update failures travel back to whoever drove the attribute change; failures
//! inside scheduled callbacks never surface here because the schedulers log
//! and isolate them.

use thiserror::Error;

use crate::dom::NodeId;

/// Errors produced by the Aurum runtime.
#[derive(Debug, Error)]
pub enum Error {
    /// A component's `render()` failed.
    #[error("render of <{tag}> failed: {message}")]
    Render { tag: String, message: String },

    /// A component's `update()` failed for an observed attribute.
    #[error("update of attribute `{attribute}` failed: {message}")]
    Update { attribute: String, message: String },

    /// No factory is registered under this tag name.
    #[error("no element is defined for tag `{0}`")]
    UnknownElement(String),

    /// A factory is already registered under this tag name.
    #[error("element `{0}` is already defined")]
    DuplicateDefinition(String),

    /// Custom element names must be lowercase and contain a hyphen.
    #[error("invalid custom element name `{0}`")]
    InvalidTagName(String),

    /// The node id refers to a freed arena slot.
    #[error("node {0} is not part of the document")]
    StaleNode(NodeId),

    /// The operation needs an element but the node is text.
    #[error("node {0} is not an element")]
    NotAnElement(NodeId),

    /// Inserting would create a cycle or move the document body.
    #[error("cannot insert {child} into {parent}")]
    Hierarchy { parent: NodeId, child: NodeId },

    /// The reference node passed to `insert_before` is not a child of the parent.
    #[error("{child} is not a child of {parent}")]
    NotAChild { parent: NodeId, child: NodeId },

    /// An element was re-entered while it was already rendering or updating.
    #[error("<{0}> is busy; re-entrant lifecycle call rejected")]
    Reentrant(String),

    /// Runtime configuration could not be parsed.
    #[error("invalid runtime configuration: {0}")]
    Config(#[from] serde_json::Error),

    /// A scheduled or user-supplied callback reported a failure.
    #[error("callback failed: {0}")]
    Callback(String),
}

impl Error {
    /// Shorthand for a render failure of the given tag.
    pub fn render(tag: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Render {
            tag: tag.into(),
            message: message.into(),
        }
    }

    /// Shorthand for a failed update of `attribute`.
    pub fn update(attribute: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Update {
            attribute: attribute.into(),
            message: message.into(),
        }
    }

    /// Shorthand for a callback failure.
    pub fn callback(message: impl Into<String>) -> Self {
        Self::Callback(message.into())
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
