//! Scoped Resources
//!
//! Every listener and timer an element acquires while connected is recorded
//! here and released when the element disconnects. Releasing drains the
//! records, so a second release finds nothing to do.

use std::time::Duration;

use indexmap::IndexSet;
use tracing::trace;

use crate::dom::{Dom, Listener, ListenerOptions, NodeId};
use crate::error::Result;
use crate::host::{TimerId, Timers};

#[derive(Debug, Clone)]
struct ListenerRecord {
    target: NodeId,
    event_type: String,
    listener: Listener,
    capture: bool,
}

impl ListenerRecord {
    fn matches(&self, target: NodeId, event_type: &str, listener: &Listener, capture: bool) -> bool {
        self.target == target
            && self.event_type == event_type
            && self.capture == capture
            && self.listener == *listener
    }
}

/// Resources owned by one connected element.
#[derive(Debug, Default)]
pub struct Scope {
    listeners: Vec<ListenerRecord>,
    timers: IndexSet<TimerId>,
}

/// What a release detached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Released {
    pub listeners: usize,
    pub timers: usize,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener` on `target` and record it.
    ///
    /// Returns `Ok(false)` when the identical registration is already held,
    /// so idempotent render paths can call this unconditionally.
    pub fn listen(
        &mut self,
        dom: &Dom,
        target: NodeId,
        event_type: &str,
        listener: &Listener,
        options: ListenerOptions,
    ) -> Result<bool> {
        let held = self
            .listeners
            .iter()
            .any(|r| r.matches(target, event_type, listener, options.capture));
        let added = dom
            .borrow_mut()
            .add_listener(target, event_type, listener.clone(), options)?;
        if !held {
            self.listeners.push(ListenerRecord {
                target,
                event_type: event_type.to_string(),
                listener: listener.clone(),
                capture: options.capture,
            });
        }
        Ok(added)
    }

    /// Detach a listener early. Returns `false` if this scope did not hold it.
    pub fn unlisten(
        &mut self,
        dom: &Dom,
        target: NodeId,
        event_type: &str,
        listener: &Listener,
        capture: bool,
    ) -> bool {
        let Some(position) = self
            .listeners
            .iter()
            .position(|r| r.matches(target, event_type, listener, capture))
        else {
            return false;
        };
        self.listeners.remove(position);
        dom.borrow_mut()
            .remove_listener(target, event_type, listener, capture);
        true
    }

    /// Schedule a one-shot timer owned by this scope.
    pub fn set_timeout<F>(&mut self, timers: &Timers, delay: Duration, callback: F) -> TimerId
    where
        F: FnOnce() + 'static,
    {
        self.prune(timers);
        let id = timers.set_timeout(delay, callback);
        self.timers.insert(id);
        id
    }

    /// Schedule a repeating timer owned by this scope.
    pub fn set_interval<F>(&mut self, timers: &Timers, period: Duration, callback: F) -> TimerId
    where
        F: Fn() + 'static,
    {
        self.prune(timers);
        let id = timers.set_interval(period, callback);
        self.timers.insert(id);
        id
    }

    /// Clear a timer early. Returns `false` if this scope did not hold it.
    pub fn clear_timer(&mut self, timers: &Timers, id: TimerId) -> bool {
        if !self.timers.shift_remove(&id) {
            return false;
        }
        timers.clear(id);
        true
    }

    /// Forget one-shot timers that already fired.
    fn prune(&mut self, timers: &Timers) {
        self.timers.retain(|id| timers.is_active(*id));
    }

    /// Detach every listener and clear every timer this scope holds.
    pub fn release(&mut self, dom: &Dom, timers: &Timers) -> Released {
        let listeners = std::mem::take(&mut self.listeners);
        let timer_ids = std::mem::take(&mut self.timers);

        let mut released = Released::default();
        {
            let mut document = dom.borrow_mut();
            for record in &listeners {
                if document.remove_listener(
                    record.target,
                    &record.event_type,
                    &record.listener,
                    record.capture,
                ) {
                    released.listeners += 1;
                }
            }
        }
        for id in timer_ids {
            if timers.clear(id) {
                released.timers += 1;
            }
        }
        trace!(
            listeners = released.listeners,
            timers = released.timers,
            "scope released"
        );
        released
    }

    /// Listener registrations currently held.
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Timers held that have not fired or been cleared.
    pub fn active_timers(&self, timers: &Timers) -> usize {
        self.timers.iter().filter(|id| timers.is_active(**id)).count()
    }
}
