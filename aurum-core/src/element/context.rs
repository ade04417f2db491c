//! Lifecycle Context
//!
//! The view of the runtime a component gets inside `render`, `update` and
//! `connected`: its host node, the document, and scoped acquisition of
//! listeners and timers.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::time::Duration;

use serde_json::Value;

use super::scope::Scope;
use crate::dom::{Dom, Event, Listener, ListenerOptions, NodeId};
use crate::error::{Error, Result};
use crate::host::{TimerHost, TimerId, Timers};

/// Shared view of an element's connection state.
///
/// Callbacks that may outlive a disconnect (scheduled renders, batched
/// writes) capture one of these and bail out when it reads `false`.
#[derive(Debug, Clone)]
pub struct Connection(pub(crate) Rc<Cell<bool>>);

impl Connection {
    pub fn is_connected(&self) -> bool {
        self.0.get()
    }
}

/// Timer handle that outlives a lifecycle call but still schedules into the
/// element's scope, so disconnect clears its timers.
///
/// Refuses new timers while the element is disconnected.
#[derive(Clone)]
pub struct ScopedTimers {
    timers: Timers,
    scope: Weak<RefCell<Scope>>,
    connection: Connection,
}

impl TimerHost for ScopedTimers {
    fn set_timeout(&self, delay: Duration, callback: Box<dyn FnOnce()>) -> Option<TimerId> {
        if !self.connection.is_connected() {
            return None;
        }
        let scope = self.scope.upgrade()?;
        let mut held = scope.try_borrow_mut().ok()?;
        Some(held.set_timeout(&self.timers, delay, callback))
    }

    fn clear_timeout(&self, id: TimerId) -> bool {
        let Some(scope) = self.scope.upgrade() else {
            return false;
        };
        let cleared = match scope.try_borrow_mut() {
            Ok(mut held) => held.clear_timer(&self.timers, id),
            Err(_) => false,
        };
        cleared
    }

    fn is_active(&self, id: TimerId) -> bool {
        self.timers.is_active(id)
    }
}

impl fmt::Debug for ScopedTimers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedTimers")
            .field("connected", &self.connection.is_connected())
            .finish()
    }
}

/// Runtime services for one element during a lifecycle call.
pub struct Context<'a> {
    pub(crate) tag: &'static str,
    pub(crate) host: NodeId,
    pub(crate) dom: &'a Dom,
    pub(crate) timers: &'a Timers,
    pub(crate) scope: &'a Rc<RefCell<Scope>>,
    pub(crate) connected: &'a Rc<Cell<bool>>,
}

impl<'a> Context<'a> {
    /// The element's own node.
    pub fn host(&self) -> NodeId {
        self.host
    }

    pub fn tag(&self) -> &'static str {
        self.tag
    }

    pub fn dom(&self) -> &Dom {
        self.dom
    }

    pub fn timers(&self) -> &Timers {
        self.timers
    }

    pub fn is_connected(&self) -> bool {
        self.connected.get()
    }

    pub fn connection(&self) -> Connection {
        Connection(Rc::clone(self.connected))
    }

    /// Current value of an attribute on the host.
    pub fn attribute(&self, name: &str) -> Option<String> {
        self.dom
            .borrow()
            .get_attribute(self.host, name)
            .map(str::to_string)
    }

    /// Boolean attributes are presence-based: any value, even `"false"`,
    /// means `true`.
    pub fn has_flag(&self, name: &str) -> bool {
        self.dom.borrow().has_attribute(self.host, name)
    }

    /// Find the marker node an idempotent render leaves behind.
    pub fn find_marker(&self, class: &str) -> Option<NodeId> {
        self.dom.borrow().find_by_class(self.host, class)
    }

    /// Listen on `target` for the lifetime of this connection.
    pub fn listen(&self, target: NodeId, event_type: &str, listener: &Listener) -> Result<bool> {
        self.listen_with(target, event_type, listener, ListenerOptions::default())
    }

    pub fn listen_with(
        &self,
        target: NodeId,
        event_type: &str,
        listener: &Listener,
        options: ListenerOptions,
    ) -> Result<bool> {
        self.scope
            .borrow_mut()
            .listen(self.dom, target, event_type, listener, options)
    }

    pub fn unlisten(&self, target: NodeId, event_type: &str, listener: &Listener) -> bool {
        self.scope
            .borrow_mut()
            .unlisten(self.dom, target, event_type, listener, false)
    }

    /// A timeout cleared automatically on disconnect.
    pub fn set_timeout<F>(&self, delay: Duration, callback: F) -> TimerId
    where
        F: FnOnce() + 'static,
    {
        self.scope
            .borrow_mut()
            .set_timeout(self.timers, delay, callback)
    }

    /// An interval cleared automatically on disconnect.
    pub fn set_interval<F>(&self, period: Duration, callback: F) -> TimerId
    where
        F: Fn() + 'static,
    {
        self.scope
            .borrow_mut()
            .set_interval(self.timers, period, callback)
    }

    pub fn clear_timer(&self, id: TimerId) -> bool {
        self.scope.borrow_mut().clear_timer(self.timers, id)
    }

    /// A timer handle for callbacks that run outside lifecycle calls, such
    /// as a debounce inside an event listener.
    pub fn scoped_timers(&self) -> ScopedTimers {
        ScopedTimers {
            timers: self.timers.clone(),
            scope: Rc::downgrade(self.scope),
            connection: self.connection(),
        }
    }

    /// Dispatch a bubbling, cancelable, composed custom event from the host.
    pub fn emit(&self, name: &str, detail: Value) {
        self.dom
            .dispatch_event(self.host, &mut Event::custom(name, detail));
    }

    /// Build a render error for this element.
    pub fn error(&self, message: impl Into<String>) -> Error {
        Error::render(self.tag, message)
    }
}
