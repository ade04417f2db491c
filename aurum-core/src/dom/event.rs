//! Events and Listeners
//!
//! Events follow the platform's shape: a type string, bubbling and
//! cancelation flags, and a JSON `detail` payload for custom events.
//! Listeners are reference-counted closures; two `Listener` values are the
//! same handler exactly when they share the allocation, which is what the
//! at-most-once registration rule compares.

use std::fmt;
use std::rc::Rc;

use serde_json::Value;

use super::NodeId;

/// Namespace prefix for events emitted by Aurum components.
pub const EVENT_PREFIX: &str = "au-";

/// An event travelling through the document.
#[derive(Debug, Clone)]
pub struct Event {
    event_type: String,
    detail: Value,
    bubbles: bool,
    cancelable: bool,
    composed: bool,
    default_prevented: bool,
    propagation_stopped: bool,
    in_passive_listener: bool,
    target: Option<NodeId>,
    current_target: Option<NodeId>,
}

impl Event {
    /// A plain event that neither bubbles nor can be canceled.
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            detail: Value::Null,
            bubbles: false,
            cancelable: false,
            composed: false,
            default_prevented: false,
            propagation_stopped: false,
            in_passive_listener: false,
            target: None,
            current_target: None,
        }
    }

    /// A bubbling, cancelable, composed custom event carrying `detail`.
    pub fn custom(event_type: impl Into<String>, detail: Value) -> Self {
        Self {
            detail,
            bubbles: true,
            cancelable: true,
            composed: true,
            ..Self::new(event_type)
        }
    }

    pub fn with_bubbles(mut self, bubbles: bool) -> Self {
        self.bubbles = bubbles;
        self
    }

    pub fn with_cancelable(mut self, cancelable: bool) -> Self {
        self.cancelable = cancelable;
        self
    }

    pub fn with_detail(mut self, detail: Value) -> Self {
        self.detail = detail;
        self
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn detail(&self) -> &Value {
        &self.detail
    }

    pub fn bubbles(&self) -> bool {
        self.bubbles
    }

    pub fn cancelable(&self) -> bool {
        self.cancelable
    }

    pub fn composed(&self) -> bool {
        self.composed
    }

    /// The node the event was dispatched at.
    pub fn target(&self) -> Option<NodeId> {
        self.target
    }

    /// The node whose listeners are currently running.
    pub fn current_target(&self) -> Option<NodeId> {
        self.current_target
    }

    /// Cancel the default action. Ignored for non-cancelable events and
    /// inside passive listeners.
    pub fn prevent_default(&mut self) {
        if self.cancelable && !self.in_passive_listener {
            self.default_prevented = true;
        }
    }

    pub fn default_prevented(&self) -> bool {
        self.default_prevented
    }

    /// Stop the event from reaching further nodes on its path.
    pub fn stop_propagation(&mut self) {
        self.propagation_stopped = true;
    }

    pub fn propagation_stopped(&self) -> bool {
        self.propagation_stopped
    }

    pub(crate) fn set_target(&mut self, target: NodeId) {
        self.target = Some(target);
    }

    pub(crate) fn set_current_target(&mut self, node: Option<NodeId>) {
        self.current_target = node;
    }

    pub(crate) fn set_passive(&mut self, passive: bool) {
        self.in_passive_listener = passive;
    }
}

/// Registration options, mirroring `addEventListener`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListenerOptions {
    /// Run during the capture phase. Part of the registration identity.
    pub capture: bool,
    /// Remove the registration after the first invocation.
    pub once: bool,
    /// The listener promises not to call `prevent_default`.
    pub passive: bool,
}

impl ListenerOptions {
    pub fn capture() -> Self {
        Self {
            capture: true,
            ..Self::default()
        }
    }

    pub fn once() -> Self {
        Self {
            once: true,
            ..Self::default()
        }
    }

    pub fn passive() -> Self {
        Self {
            passive: true,
            ..Self::default()
        }
    }
}

/// An event handler with pointer identity.
#[derive(Clone)]
pub struct Listener(Rc<dyn Fn(&mut Event)>);

impl Listener {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&mut Event) + 'static,
    {
        Self(Rc::new(handler))
    }

    pub fn call(&self, event: &mut Event) {
        (self.0)(event)
    }
}

impl PartialEq for Listener {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Listener {}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Listener({:p})", Rc::as_ptr(&self.0) as *const ())
    }
}
