//! Host Document
//!
//! The runtime treats the DOM as a platform collaborator. This module is the
//! in-process rendition of that collaborator: an arena of nodes, a markup
//! builder for item renderers, and event dispatch with capture, target and
//! bubble phases.
//!
//! `Dom` is the shared handle components and schedulers hold. Dispatch never
//! keeps the document borrowed while a listener runs, so listeners are free
//! to mutate the tree or dispatch nested events.

mod document;
mod event;
mod markup;
mod node;

pub use document::Document;
pub use event::{Event, Listener, ListenerOptions, EVENT_PREFIX};
pub use markup::Markup;
pub use node::{NodeData, NodeId, NodeKind};

use std::cell::{Ref, RefCell, RefMut};
use std::rc::Rc;

use tracing::trace;

use document::Phase;

/// Shared handle to a document.
#[derive(Clone, Default)]
pub struct Dom(Rc<RefCell<Document>>);

impl Dom {
    /// Create a handle to a fresh document.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn borrow(&self) -> Ref<'_, Document> {
        self.0.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, Document> {
        self.0.borrow_mut()
    }

    /// Run `f` with shared access to the document.
    pub fn with<R>(&self, f: impl FnOnce(&Document) -> R) -> R {
        f(&self.0.borrow())
    }

    /// Run `f` with exclusive access to the document.
    pub fn with_mut<R>(&self, f: impl FnOnce(&mut Document) -> R) -> R {
        f(&mut self.0.borrow_mut())
    }

    /// The document's `<body>`.
    pub fn body(&self) -> NodeId {
        self.0.borrow().body()
    }

    /// Dispatch `event` at `target`.
    ///
    /// Capture listeners on ancestors run outermost first, then every
    /// listener on the target, then (for bubbling events) non-capture
    /// listeners on ancestors innermost first. A registration removed while
    /// the event is in flight does not run. Returns `false` if a listener
    /// canceled the event.
    pub fn dispatch_event(&self, target: NodeId, event: &mut Event) -> bool {
        let path = {
            let document = self.0.borrow();
            if !document.contains(target) {
                return true;
            }
            document.propagation_path(target)
        };
        trace!(event = event.event_type(), depth = path.len(), "dispatch");
        event.set_target(target);

        for &node in path.iter().skip(1).rev() {
            self.invoke(node, event, Phase::Capture);
        }
        self.invoke(target, event, Phase::AtTarget);
        if event.bubbles() {
            for &node in path.iter().skip(1) {
                self.invoke(node, event, Phase::Bubble);
            }
        }

        event.set_current_target(None);
        !event.default_prevented()
    }

    fn invoke(&self, node: NodeId, event: &mut Event, phase: Phase) {
        if event.propagation_stopped() {
            return;
        }
        let registrations = self
            .0
            .borrow()
            .listeners_for(node, event.event_type(), phase);
        if registrations.is_empty() {
            return;
        }

        event.set_current_target(Some(node));
        for registration in registrations {
            let live = {
                let mut document = self.0.borrow_mut();
                let present = document.has_listener(
                    node,
                    &registration.event_type,
                    &registration.listener,
                    registration.options.capture,
                );
                if present && registration.options.once {
                    document.remove_listener(
                        node,
                        &registration.event_type,
                        &registration.listener,
                        registration.options.capture,
                    );
                }
                present
            };
            if !live {
                continue;
            }
            event.set_passive(registration.options.passive);
            registration.listener.call(event);
            event.set_passive(false);
        }
    }
}
