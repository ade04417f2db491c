//! Element Runtime
//!
//! The lifecycle contract every Aurum component fulfills, and the instance
//! that drives it.
//!
//! # Lifecycle
//!
//! 1. `connect()` marks the element connected, calls `render()` to build its
//!    structure, then `connected()` to register listeners and timers.
//!
//! 2. Each change of an observed attribute calls `update()` once with the
//!    attribute name and both values. Unobserved attributes are stored on
//!    the node and otherwise inert.
//!
//! 3. `disconnect()` releases every listener and timer acquired through the
//!    element's [`Context`], then calls `disconnected()`. Calling it again
//!    does nothing.
//!
//! # Idempotent render
//!
//! `render()` may run many times on the same instance. Components look for
//! a marker node (see [`Context::find_marker`]) and only build structure
//! when it is missing; listener registration through the context is
//! at-most-once per (target, type, handler).
//!
//! # Errors
//!
//! Errors from `render()` and `update()` are returned to the caller that
//! triggered them. Renders requested through [`Element::request_render`] run
//! on the render scheduler, which logs and isolates failures.

mod context;
mod registry;
mod scope;

pub use context::{Connection, Context, ScopedTimers};
pub use registry::{AnyElement, ElementRegistry};
pub use scope::{Released, Scope};

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::{debug, warn};

use crate::dom::{Dom, NodeId};
use crate::error::{Error, Result};
use crate::host::Timers;
use crate::scheduler::RenderScheduler;

/// One observed attribute mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeChange {
    pub name: String,
    /// `None` when the attribute was removed.
    pub new_value: Option<String>,
    /// `None` when the attribute was absent.
    pub old_value: Option<String>,
}

/// What the runtime does after `update()` returns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UpdateStrategy {
    /// `update()` patched the affected state; nothing else happens.
    #[default]
    Patch,
    /// Clear the host's children and render from scratch.
    Rerender,
}

/// The contract a custom element implements.
pub trait Component: 'static {
    /// Custom element name: lowercase with at least one hyphen.
    const TAG: &'static str;

    /// Attribute names whose changes reach `update()`.
    fn observed_attributes() -> &'static [&'static str]
    where
        Self: Sized,
    {
        &[]
    }

    fn update_strategy(&self) -> UpdateStrategy {
        UpdateStrategy::Patch
    }

    /// Build or refresh the element's structure. Must be idempotent.
    fn render(&mut self, cx: &Context<'_>) -> Result<()>;

    /// React to one observed attribute change.
    fn update(&mut self, cx: &Context<'_>, change: &AttributeChange) -> Result<()> {
        let _ = (cx, change);
        Ok(())
    }

    /// Called after the first render of each connection.
    fn connected(&mut self, cx: &Context<'_>) -> Result<()> {
        let _ = cx;
        Ok(())
    }

    /// Called after the element's scoped resources were released.
    fn disconnected(&mut self) {}
}

struct Shared<C> {
    node: NodeId,
    dom: Dom,
    timers: Timers,
    connected: Rc<Cell<bool>>,
    pending_render: Cell<bool>,
    scope: Rc<RefCell<Scope>>,
    component: RefCell<C>,
}

impl<C: Component> Shared<C> {
    fn context(&self) -> Context<'_> {
        Context {
            tag: C::TAG,
            host: self.node,
            dom: &self.dom,
            timers: &self.timers,
            scope: &self.scope,
            connected: &self.connected,
        }
    }

    fn release(&self) -> Released {
        self.scope.borrow_mut().release(&self.dom, &self.timers)
    }
}

impl<C> Drop for Shared<C> {
    fn drop(&mut self) {
        // The last handle went away while connected; nothing else can
        // release these registrations now.
        if self.connected.get() {
            self.connected.set(false);
            self.scope.borrow_mut().release(&self.dom, &self.timers);
        }
    }
}

/// A component instance bound to a host node.
///
/// `Element` is a cheap handle; clones refer to the same instance.
pub struct Element<C> {
    shared: Rc<Shared<C>>,
}

impl<C> Clone for Element<C> {
    fn clone(&self) -> Self {
        Self {
            shared: Rc::clone(&self.shared),
        }
    }
}

impl<C: Component> Element<C> {
    /// Create the host node and bind `component` to it. The element starts
    /// detached and disconnected.
    pub fn new(dom: &Dom, timers: &Timers, component: C) -> Self {
        let node = dom.borrow_mut().create_element(C::TAG);
        Self {
            shared: Rc::new(Shared {
                node,
                dom: dom.clone(),
                timers: timers.clone(),
                connected: Rc::new(Cell::new(false)),
                pending_render: Cell::new(false),
                scope: Rc::new(RefCell::new(Scope::new())),
                component: RefCell::new(component),
            }),
        }
    }

    pub fn node(&self) -> NodeId {
        self.shared.node
    }

    pub fn tag(&self) -> &'static str {
        C::TAG
    }

    pub fn is_connected(&self) -> bool {
        self.shared.connected.get()
    }

    pub fn connection(&self) -> Connection {
        Connection(Rc::clone(&self.shared.connected))
    }

    pub fn is_observed(name: &str) -> bool {
        C::observed_attributes().contains(&name)
    }

    /// Attach the host under `parent` and connect. Moving a connected
    /// element disconnects it first, as the platform does.
    pub fn mount(&self, parent: NodeId) -> Result<()> {
        if self.is_connected() {
            self.disconnect();
        }
        self.shared
            .dom
            .borrow_mut()
            .append_child(parent, self.shared.node)?;
        self.connect()
    }

    /// Disconnect and detach the host from its parent.
    pub fn unmount(&self) {
        self.disconnect();
        self.shared.dom.borrow_mut().detach(self.shared.node);
    }

    /// The connected callback: render, then `connected()`.
    pub fn connect(&self) -> Result<()> {
        if self.is_connected() {
            return Ok(());
        }
        let mut component = self.borrow_component()?;
        self.shared.connected.set(true);
        let cx = self.shared.context();
        component.render(&cx)?;
        component.connected(&cx)?;
        debug!(tag = C::TAG, node = %self.shared.node, "connected");
        Ok(())
    }

    /// The disconnected callback. Releases every scoped listener and timer.
    /// Safe to call any number of times.
    pub fn disconnect(&self) {
        if !self.shared.connected.replace(false) {
            return;
        }
        self.shared.pending_render.set(false);
        let released = self.shared.release();
        match self.shared.component.try_borrow_mut() {
            Ok(mut component) => component.disconnected(),
            Err(_) => warn!(
                tag = C::TAG,
                "disconnected during a lifecycle call; skipping disconnected hook"
            ),
        }
        debug!(
            tag = C::TAG,
            node = %self.shared.node,
            listeners = released.listeners,
            timers = released.timers,
            "disconnected"
        );
    }

    /// Run `render()` now. Does nothing while disconnected.
    pub fn render(&self) -> Result<()> {
        if !self.is_connected() {
            return Ok(());
        }
        let mut component = self.borrow_component()?;
        component.render(&self.shared.context())
    }

    /// Queue a render on the render scheduler. Requests made while one is
    /// already queued coalesce into it.
    pub fn request_render(&self) {
        if !self.is_connected() || self.shared.pending_render.replace(true) {
            return;
        }
        let weak: Weak<Shared<C>> = Rc::downgrade(&self.shared);
        RenderScheduler::schedule_try(move || {
            let Some(shared) = weak.upgrade() else {
                return Ok(());
            };
            let element = Element { shared };
            element.shared.pending_render.set(false);
            element.render()
        });
    }

    pub fn has_pending_render(&self) -> bool {
        self.shared.pending_render.get()
    }

    /// Set an attribute on the host; observed changes reach `update()`.
    pub fn set_attribute(&self, name: &str, value: &str) -> Result<()> {
        let old = self
            .shared
            .dom
            .borrow_mut()
            .set_attribute(self.shared.node, name, value)?;
        if old.as_deref() == Some(value) {
            return Ok(());
        }
        self.attribute_changed(AttributeChange {
            name: name.to_string(),
            new_value: Some(value.to_string()),
            old_value: old,
        })
    }

    /// Remove an attribute from the host; observed removals reach `update()`.
    pub fn remove_attribute(&self, name: &str) -> Result<()> {
        let old = self
            .shared
            .dom
            .borrow_mut()
            .remove_attribute(self.shared.node, name)?;
        if old.is_none() {
            return Ok(());
        }
        self.attribute_changed(AttributeChange {
            name: name.to_string(),
            new_value: None,
            old_value: old,
        })
    }

    /// Presence-based boolean attribute.
    pub fn has_flag(&self, name: &str) -> bool {
        self.shared
            .dom
            .borrow()
            .has_attribute(self.shared.node, name)
    }

    /// Set or remove a boolean attribute.
    pub fn set_flag(&self, name: &str, on: bool) -> Result<()> {
        if on {
            self.set_attribute(name, "")
        } else {
            self.remove_attribute(name)
        }
    }

    fn attribute_changed(&self, change: AttributeChange) -> Result<()> {
        // Disconnected elements pick attributes up on their next render.
        if !Self::is_observed(&change.name) || !self.is_connected() {
            return Ok(());
        }
        let mut component = self.borrow_component()?;
        let cx = self.shared.context();
        component.update(&cx, &change)?;
        if component.update_strategy() == UpdateStrategy::Rerender {
            self.shared
                .dom
                .borrow_mut()
                .clear_children(self.shared.node)?;
            component.render(&cx)?;
        }
        Ok(())
    }

    /// Read the component.
    pub fn with<R>(&self, f: impl FnOnce(&C) -> R) -> Result<R> {
        let component = self
            .shared
            .component
            .try_borrow()
            .map_err(|_| Error::Reentrant(C::TAG.to_string()))?;
        Ok(f(&component))
    }

    /// Mutate the component with its context, as property setters do.
    pub fn with_mut<R>(&self, f: impl FnOnce(&mut C, &Context<'_>) -> R) -> Result<R> {
        let mut component = self.borrow_component()?;
        Ok(f(&mut component, &self.shared.context()))
    }

    fn borrow_component(&self) -> Result<std::cell::RefMut<'_, C>> {
        self.shared
            .component
            .try_borrow_mut()
            .map_err(|_| Error::Reentrant(C::TAG.to_string()))
    }

    /// Listener registrations currently held by the element's scope.
    pub fn active_listeners(&self) -> usize {
        self.shared.scope.borrow().listener_count()
    }

    /// Scoped timers that have neither fired nor been cleared.
    pub fn active_timers(&self) -> usize {
        self.shared.scope.borrow().active_timers(&self.shared.timers)
    }
}

impl<C: Component> AnyElement for Element<C> {
    fn tag(&self) -> &'static str {
        C::TAG
    }

    fn node(&self) -> NodeId {
        Element::node(self)
    }

    fn is_connected(&self) -> bool {
        Element::is_connected(self)
    }

    fn observed_attributes(&self) -> &'static [&'static str] {
        C::observed_attributes()
    }

    fn mount(&self, parent: NodeId) -> Result<()> {
        Element::mount(self, parent)
    }

    fn connect(&self) -> Result<()> {
        Element::connect(self)
    }

    fn disconnect(&self) {
        Element::disconnect(self)
    }

    fn set_attribute(&self, name: &str, value: &str) -> Result<()> {
        Element::set_attribute(self, name, value)
    }

    fn remove_attribute(&self, name: &str) -> Result<()> {
        Element::remove_attribute(self, name)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl<C: Component> fmt::Debug for Element<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Element")
            .field("tag", &C::TAG)
            .field("node", &self.shared.node)
            .field("connected", &self.is_connected())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
