//! `<au-list>`: a keyed list reconciled from its `items` property.

use std::rc::Rc;

use serde_json::Value;

use super::render_text_item;
use crate::dom::{Markup, NodeId};
use crate::element::{AttributeChange, Component, Context, Element};
use crate::error::Result;
use crate::list::{Key, KeyFn, KeyedReconciler, ReconcileReport, RenderItem};

/// Emitted after each reconciliation with the [`ReconcileReport`] as detail.
pub const RECONCILED_EVENT: &str = "au-reconciled";

const ITEMS_CLASS: &str = "au-list__items";
const ITEM_CLASS: &str = "au-list__item";

pub struct AuList {
    items: Vec<Value>,
    key_fn: KeyFn<Value>,
    render_item: RenderItem<Value>,
    reconciler: Option<KeyedReconciler<Value>>,
    last_report: Option<ReconcileReport>,
}

impl Default for AuList {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            key_fn: Rc::new(|_, index| Key::Index(index)),
            render_item: Rc::new(|item, _| render_text_item("li", ITEM_CLASS, item)),
            reconciler: None,
            last_report: None,
        }
    }
}

impl AuList {
    fn ensure_container(&self, cx: &Context<'_>) -> Result<NodeId> {
        if let Some(node) = cx.find_marker(ITEMS_CLASS) {
            return Ok(node);
        }
        let mut markup = Markup::element("ul")
            .attr("class", ITEMS_CLASS)
            .attr("role", "list");
        if let Some(label) = cx.attribute("label") {
            markup = markup.attr("aria-label", label);
        }
        let mut doc = cx.dom().borrow_mut();
        let node = doc.materialize(&markup);
        doc.append_child(cx.host(), node)?;
        Ok(node)
    }

    fn reconciler_for(&mut self, container: NodeId) -> &mut KeyedReconciler<Value> {
        let reconciler = match self.reconciler.take() {
            Some(reconciler) if reconciler.container() == container => reconciler,
            _ => KeyedReconciler::from_fns(
                container,
                self.key_fn.clone(),
                self.render_item.clone(),
            ),
        };
        self.reconciler.insert(reconciler)
    }
}

impl Component for AuList {
    const TAG: &'static str = "au-list";

    fn observed_attributes() -> &'static [&'static str] {
        &["label"]
    }

    fn render(&mut self, cx: &Context<'_>) -> Result<()> {
        let container = self.ensure_container(cx)?;
        let report = {
            let items = std::mem::take(&mut self.items);
            let result = {
                let mut doc = cx.dom().borrow_mut();
                self.reconciler_for(container).reconcile(&mut doc, &items)
            };
            self.items = items;
            result?
        };
        self.last_report = Some(report);
        let detail = serde_json::to_value(report).map_err(|err| cx.error(err.to_string()))?;
        cx.emit(RECONCILED_EVENT, detail);
        Ok(())
    }

    fn update(&mut self, cx: &Context<'_>, change: &AttributeChange) -> Result<()> {
        if change.name != "label" {
            return Ok(());
        }
        let Some(container) = cx.find_marker(ITEMS_CLASS) else {
            return Ok(());
        };
        let mut doc = cx.dom().borrow_mut();
        match &change.new_value {
            Some(label) => {
                doc.set_attribute(container, "aria-label", label)?;
            }
            None => {
                doc.remove_attribute(container, "aria-label")?;
            }
        }
        Ok(())
    }
}

/// Property API.
impl Element<AuList> {
    /// Replace the items and schedule a reconcile.
    pub fn set_items(&self, items: Vec<Value>) -> Result<()> {
        self.with_mut(|list, _| list.items = items)?;
        self.request_render();
        Ok(())
    }

    pub fn set_key_fn<K>(&self, key_fn: K) -> Result<()>
    where
        K: Fn(&Value, usize) -> Key + 'static,
    {
        self.with_mut(|list, _| {
            list.key_fn = Rc::new(key_fn);
            if let Some(reconciler) = list.reconciler.as_mut() {
                reconciler.set_key_fn(list.key_fn.clone());
            }
        })?;
        self.request_render();
        Ok(())
    }

    pub fn set_render_item<R>(&self, render_item: R) -> Result<()>
    where
        R: Fn(&Value, usize) -> Result<Markup> + 'static,
    {
        self.with_mut(|list, _| {
            list.render_item = Rc::new(render_item);
            if let Some(reconciler) = list.reconciler.as_mut() {
                reconciler.set_render_item(list.render_item.clone());
            }
        })?;
        self.request_render();
        Ok(())
    }

    pub fn item_count(&self) -> Result<usize> {
        self.with(|list| list.items.len())
    }

    /// The report of the most recent reconcile.
    pub fn last_report(&self) -> Result<Option<ReconcileReport>> {
        self.with(|list| list.last_report)
    }

    /// The node rendered for `key`, if any.
    pub fn node_for(&self, key: &Key) -> Result<Option<NodeId>> {
        self.with(|list| list.reconciler.as_ref().and_then(|r| r.node_for(key)))
    }
}
