//! Element Registry
//!
//! Maps custom element names to factories, the way `customElements.define`
//! does. Created elements are returned behind [`AnyElement`]; downcast with
//! [`downcast`](dyn AnyElement::downcast) to reach the typed handle.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;

use tracing::debug;

use super::{Component, Element};
use crate::dom::{Dom, NodeId};
use crate::error::{Error, Result};
use crate::host::Timers;

/// Type-erased view of an [`Element`].
pub trait AnyElement {
    fn tag(&self) -> &'static str;
    fn node(&self) -> NodeId;
    fn is_connected(&self) -> bool;
    fn observed_attributes(&self) -> &'static [&'static str];
    fn mount(&self, parent: NodeId) -> Result<()>;
    fn connect(&self) -> Result<()>;
    fn disconnect(&self);
    fn set_attribute(&self, name: &str, value: &str) -> Result<()>;
    fn remove_attribute(&self, name: &str) -> Result<()>;
    fn as_any(&self) -> &dyn Any;
}

impl dyn AnyElement {
    /// The typed handle, if this element is a `C`.
    pub fn downcast<C: Component>(&self) -> Option<Element<C>> {
        self.as_any().downcast_ref::<Element<C>>().cloned()
    }
}

impl fmt::Debug for dyn AnyElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnyElement")
            .field("tag", &self.tag())
            .field("node", &self.node())
            .field("connected", &self.is_connected())
            .finish()
    }
}

type Factory = Box<dyn Fn(&Dom, &Timers) -> Box<dyn AnyElement>>;

struct Definition {
    observed: &'static [&'static str],
    factory: Factory,
}

/// Registered custom element definitions.
#[derive(Default)]
pub struct ElementRegistry {
    definitions: HashMap<&'static str, Definition>,
}

impl ElementRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Define `C` under its tag, constructing instances with `Default`.
    pub fn define<C: Component + Default>(&mut self) -> Result<()> {
        self.define_with::<C, _>(C::default)
    }

    /// Define `C` under its tag with a custom constructor.
    pub fn define_with<C, F>(&mut self, factory: F) -> Result<()>
    where
        C: Component,
        F: Fn() -> C + 'static,
    {
        validate_tag(C::TAG)?;
        if self.definitions.contains_key(C::TAG) {
            return Err(Error::DuplicateDefinition(C::TAG.to_string()));
        }
        self.definitions.insert(
            C::TAG,
            Definition {
                observed: C::observed_attributes(),
                factory: Box::new(move |dom, timers| {
                    Box::new(Element::new(dom, timers, factory()))
                }),
            },
        );
        debug!(tag = C::TAG, "element defined");
        Ok(())
    }

    pub fn is_defined(&self, tag: &str) -> bool {
        self.definitions.contains_key(tag)
    }

    /// Construct a detached, disconnected instance of `tag`.
    pub fn create(&self, tag: &str, dom: &Dom, timers: &Timers) -> Result<Box<dyn AnyElement>> {
        let definition = self
            .definitions
            .get(tag)
            .ok_or_else(|| Error::UnknownElement(tag.to_string()))?;
        Ok((definition.factory)(dom, timers))
    }

    pub fn observed_attributes(&self, tag: &str) -> Option<&'static [&'static str]> {
        self.definitions.get(tag).map(|d| d.observed)
    }

    /// Defined tags, sorted.
    pub fn tags(&self) -> Vec<&'static str> {
        let mut tags: Vec<_> = self.definitions.keys().copied().collect();
        tags.sort_unstable();
        tags
    }
}

impl fmt::Debug for ElementRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElementRegistry")
            .field("tags", &self.tags())
            .finish()
    }
}

/// Custom element names start with a lowercase ASCII letter, contain a
/// hyphen, and use only lowercase letters, digits, `-`, `.` and `_`.
fn validate_tag(tag: &str) -> Result<()> {
    let valid = tag.starts_with(|c: char| c.is_ascii_lowercase())
        && tag.contains('-')
        && tag
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '-' | '.' | '_'));
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidTagName(tag.to_string()))
    }
}
