//! `<au-virtual-list>`: a windowed list for large item counts.
//!
//! Attributes: `item-height` (px, default 40), `viewport-height` (px,
//! default 400), `buffer` (rows, default from the runtime config).
//!
//! The viewport listens for `scroll` events whose detail carries
//! `{"scrollTop": <px>}`. Scroll handling is throttled; a trailing debounce
//! applies the final position once scrolling settles, so the last offset is
//! never lost to the throttle.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::time::Duration;

use serde_json::{json, Value};
use tracing::error;

use super::render_text_item;
use crate::dom::{Dom, Event, Listener, Markup, NodeId};
use crate::element::{AttributeChange, Component, Connection, Context, Element};
use crate::error::{Error, Result};
use crate::list::{Key, KeyFn, RenderItem, Virtualizer, VisibleRange};
use crate::timing::{Debounce, Throttle};

/// Emitted when the materialized window changes, with `{start, end}`.
pub const RANGE_CHANGE_EVENT: &str = "au-range-change";

const VIEWPORT_CLASS: &str = "au-virtual-list__viewport";
const ROW_CLASS: &str = "au-virtual-list__row";

const DEFAULT_ITEM_HEIGHT: f64 = 40.0;
const DEFAULT_VIEWPORT_HEIGHT: f64 = 400.0;

/// State shared between the component and its scroll handler.
struct Window {
    viewport: NodeId,
    host: NodeId,
    dom: Dom,
    connection: Connection,
    virtualizer: RefCell<Virtualizer<Value>>,
    announced: Cell<Option<VisibleRange>>,
}

impl Window {
    fn scroll(&self, scroll_top: f64) {
        if !self.connection.is_connected() {
            return;
        }
        let result = {
            let mut doc = self.dom.borrow_mut();
            self.virtualizer
                .borrow_mut()
                .set_scroll_top(&mut doc, scroll_top)
        };
        match result {
            Ok(Some(_)) => self.announce(),
            Ok(None) => {}
            Err(err) => error!(error = %err, "virtual list scroll failed"),
        }
    }

    /// Emit the range-change event if the rendered window moved since the
    /// last announcement.
    fn announce(&self) {
        let Some(range) = self.virtualizer.borrow().rendered_range() else {
            return;
        };
        if self.announced.replace(Some(range)) == Some(range) {
            return;
        }
        let detail = json!({ "start": range.start, "end": range.end });
        self.dom
            .dispatch_event(self.host, &mut Event::custom(RANGE_CHANGE_EVENT, detail));
    }
}

pub struct AuVirtualList {
    items: Vec<Value>,
    key_fn: Option<KeyFn<Value>>,
    render_item: RenderItem<Value>,
    default_buffer: usize,
    scroll_throttle: Duration,
    window: Option<Rc<Window>>,
    on_scroll: Option<Listener>,
    settle: Option<Debounce<f64>>,
}

impl Default for AuVirtualList {
    fn default() -> Self {
        Self::new(2, Duration::from_millis(16))
    }
}

impl AuVirtualList {
    pub fn new(default_buffer: usize, scroll_throttle: Duration) -> Self {
        Self {
            items: Vec::new(),
            key_fn: None,
            render_item: Rc::new(|item, _| render_text_item("div", ROW_CLASS, item)),
            default_buffer,
            scroll_throttle,
            window: None,
            on_scroll: None,
            settle: None,
        }
    }

    fn number_attribute(cx: &Context<'_>, name: &str, default: f64) -> Result<f64> {
        match cx.attribute(name) {
            None => Ok(default),
            Some(raw) => match raw.trim().parse::<f64>() {
                Ok(value) if value.is_finite() && value > 0.0 => Ok(value),
                _ => Err(Error::update(name, format!("expected a positive number, got {raw:?}"))),
            },
        }
    }

    fn buffer_attribute(&self, cx: &Context<'_>) -> Result<usize> {
        match cx.attribute("buffer") {
            None => Ok(self.default_buffer),
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|_| Error::update("buffer", format!("expected a row count, got {raw:?}"))),
        }
    }

    fn build(&self, cx: &Context<'_>, viewport_height: f64, item_height: f64, buffer: usize) -> Result<Rc<Window>> {
        let viewport = {
            let mut doc = cx.dom().borrow_mut();
            let viewport = doc.materialize(
                &Markup::element("div")
                    .attr("class", VIEWPORT_CLASS)
                    .attr("style", viewport_style(viewport_height)),
            );
            doc.append_child(cx.host(), viewport)?;
            viewport
        };
        let render = self.render_item.clone();
        let mut virtualizer = Virtualizer::new(
            &mut cx.dom().borrow_mut(),
            viewport,
            item_height,
            viewport_height,
            buffer,
            move |item: &Value, index| render(item, index),
        )?;
        if let Some(key_fn) = &self.key_fn {
            virtualizer.set_key_fn(key_fn.clone());
        }
        Ok(Rc::new(Window {
            viewport,
            host: cx.host(),
            dom: cx.dom().clone(),
            connection: cx.connection(),
            virtualizer: RefCell::new(virtualizer),
            announced: Cell::new(None),
        }))
    }

    /// Scroll listener for `window`: throttled, with a trailing settle pass.
    fn scroll_listener(&mut self, cx: &Context<'_>, window: &Rc<Window>) -> Listener {
        let weak: Weak<Window> = Rc::downgrade(window);
        let throttled = {
            let weak = weak.clone();
            Throttle::new(cx.timers().clone(), self.scroll_throttle, move |top: f64| {
                if let Some(window) = weak.upgrade() {
                    window.scroll(top);
                }
            })
        };
        let settle = Debounce::with_host(
            cx.scoped_timers(),
            self.scroll_throttle,
            move |top: f64| {
                if let Some(window) = weak.upgrade() {
                    window.scroll(top);
                }
            },
        );
        self.settle = Some(settle.clone());
        Listener::new(move |event| {
            let Some(top) = event.detail().get("scrollTop").and_then(Value::as_f64) else {
                return;
            };
            if throttled.call(top) {
                settle.cancel();
            } else {
                settle.call(top);
            }
        })
    }
}

fn viewport_style(height: f64) -> String {
    format!("overflow-y:auto;height:{height}px")
}

impl Component for AuVirtualList {
    const TAG: &'static str = "au-virtual-list";

    fn observed_attributes() -> &'static [&'static str] {
        &["item-height", "buffer", "viewport-height"]
    }

    fn render(&mut self, cx: &Context<'_>) -> Result<()> {
        let item_height = Self::number_attribute(cx, "item-height", DEFAULT_ITEM_HEIGHT)?;
        let viewport_height = Self::number_attribute(cx, "viewport-height", DEFAULT_VIEWPORT_HEIGHT)?;
        let buffer = self.buffer_attribute(cx)?;

        let current = match (&self.window, cx.find_marker(VIEWPORT_CLASS)) {
            (Some(window), Some(viewport)) if window.viewport == viewport => Some(window.clone()),
            _ => None,
        };
        let window = match current {
            Some(window) => window,
            None => {
                self.on_scroll = None;
                let window = self.build(cx, viewport_height, item_height, buffer)?;
                self.window = Some(window.clone());
                window
            }
        };

        {
            let mut doc = cx.dom().borrow_mut();
            let mut virtualizer = window.virtualizer.borrow_mut();
            if virtualizer.item_height() != item_height {
                virtualizer.set_item_height(&mut doc, item_height)?;
            }
            virtualizer.set_buffer(&mut doc, buffer)?;
            virtualizer.set_viewport_height(&mut doc, viewport_height)?;
            virtualizer.set_items(&mut doc, self.items.clone())?;
        }

        let listener = match &self.on_scroll {
            Some(listener) => listener.clone(),
            None => {
                let listener = self.scroll_listener(cx, &window);
                self.on_scroll = Some(listener.clone());
                listener
            }
        };
        cx.listen(window.viewport, "scroll", &listener)?;

        window.announce();
        Ok(())
    }

    fn update(&mut self, cx: &Context<'_>, change: &AttributeChange) -> Result<()> {
        let Some(window) = self.window.clone() else {
            return Ok(());
        };
        match change.name.as_str() {
            "item-height" => {
                let height = Self::number_attribute(cx, "item-height", DEFAULT_ITEM_HEIGHT)?;
                window
                    .virtualizer
                    .borrow_mut()
                    .set_item_height(&mut cx.dom().borrow_mut(), height)?;
            }
            "viewport-height" => {
                let height = Self::number_attribute(cx, "viewport-height", DEFAULT_VIEWPORT_HEIGHT)?;
                let mut doc = cx.dom().borrow_mut();
                doc.set_attribute(window.viewport, "style", &viewport_style(height))?;
                window
                    .virtualizer
                    .borrow_mut()
                    .set_viewport_height(&mut doc, height)?;
            }
            "buffer" => {
                let buffer = self.buffer_attribute(cx)?;
                window
                    .virtualizer
                    .borrow_mut()
                    .set_buffer(&mut cx.dom().borrow_mut(), buffer)?;
            }
            _ => {}
        }
        window.announce();
        Ok(())
    }

    fn disconnected(&mut self) {
        if let Some(settle) = &self.settle {
            settle.cancel();
        }
    }
}

/// Property API.
impl Element<AuVirtualList> {
    /// Replace the items and schedule a render.
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
            let key_fn: KeyFn<Value> = Rc::new(key_fn);
            if let Some(window) = &list.window {
                window.virtualizer.borrow_mut().set_key_fn(key_fn.clone());
            }
            list.key_fn = Some(key_fn);
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
            if let Some(window) = &list.window {
                window
                    .virtualizer
                    .borrow_mut()
                    .set_render_item(list.render_item.clone());
            }
        })?;
        self.request_render();
        Ok(())
    }

    /// The viewport node that receives `scroll` events.
    pub fn viewport(&self) -> Result<Option<NodeId>> {
        self.with(|list| list.window.as_ref().map(|w| w.viewport))
    }

    /// The window currently rendered.
    pub fn visible_range(&self) -> Result<Option<VisibleRange>> {
        self.with(|list| {
            list.window
                .as_ref()
                .and_then(|w| w.virtualizer.borrow().rendered_range())
        })
    }

    /// Rows currently in the document.
    pub fn materialized(&self) -> Result<usize> {
        self.with(|list| {
            list.window
                .as_ref()
                .map_or(0, |w| w.virtualizer.borrow().materialized())
        })
    }

    /// Scroll the viewport, as the platform would by dispatching `scroll`.
    pub fn scroll_to_offset(&self, scroll_top: f64) -> Result<()> {
        let Some(viewport) = self.viewport()? else {
            return Ok(());
        };
        let dom = self.with_mut(|_, cx| cx.dom().clone())?;
        let mut event = Event::new("scroll").with_detail(json!({ "scrollTop": scroll_top }));
        dom.dispatch_event(viewport, &mut event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{ManualClock, Timers};
    use crate::scheduler::{FlushMode, RenderScheduler};

    fn rows(count: usize) -> Vec<Value> {
        (0..count).map(|i| json!(format!("row {i}"))).collect()
    }

    struct Fixture {
        dom: Dom,
        timers: Timers,
        list: Element<AuVirtualList>,
        ranges: Rc<RefCell<Vec<Value>>>,
    }

    fn fixture(count: usize) -> Fixture {
        RenderScheduler::init(FlushMode::Immediate);
        let dom = Dom::new();
        let timers = Timers::manual(ManualClock::new());
        let list = Element::new(&dom, &timers, AuVirtualList::default());
        list.set_attribute("item-height", "50").unwrap();
        list.set_attribute("viewport-height", "400").unwrap();

        let ranges = Rc::new(RefCell::new(Vec::new()));
        let r = ranges.clone();
        let body = dom.body();
        dom.borrow_mut()
            .add_listener(
                body,
                RANGE_CHANGE_EVENT,
                Listener::new(move |event| r.borrow_mut().push(event.detail().clone())),
                Default::default(),
            )
            .unwrap();

        list.mount(body).unwrap();
        list.set_items(rows(count)).unwrap();
        Fixture {
            dom,
            timers,
            list,
            ranges,
        }
    }

    #[test]
    fn renders_initial_window() {
        let f = fixture(1000);
        assert_eq!(
            f.list.visible_range().unwrap(),
            Some(VisibleRange { start: 0, end: 12 })
        );
        assert_eq!(f.list.materialized().unwrap(), 12);
        assert_eq!(f.ranges.borrow().last(), Some(&json!({"start": 0, "end": 12})));
    }

    #[test]
    fn scroll_is_throttled_and_settles() {
        let f = fixture(1000);
        f.ranges.borrow_mut().clear();

        f.list.scroll_to_offset(1000.0).unwrap();
        assert_eq!(
            f.list.visible_range().unwrap(),
            Some(VisibleRange { start: 18, end: 30 })
        );

        // Inside the throttle window: dropped now, applied once it settles.
        f.list.scroll_to_offset(2000.0).unwrap();
        assert_eq!(
            f.list.visible_range().unwrap(),
            Some(VisibleRange { start: 18, end: 30 })
        );
        f.timers.advance(Duration::from_millis(16));
        assert_eq!(
            f.list.visible_range().unwrap(),
            Some(VisibleRange { start: 38, end: 50 })
        );

        assert_eq!(
            *f.ranges.borrow(),
            vec![json!({"start": 18, "end": 30}), json!({"start": 38, "end": 50})]
        );
    }

    #[test]
    fn same_window_is_not_announced_twice() {
        let f = fixture(1000);
        f.ranges.borrow_mut().clear();
        f.list.scroll_to_offset(10.0).unwrap();
        assert!(f.ranges.borrow().is_empty());
    }

    #[test]
    fn attribute_changes_resize_the_window() {
        let f = fixture(1000);
        f.list.set_attribute("viewport-height", "100").unwrap();
        assert_eq!(
            f.list.visible_range().unwrap(),
            Some(VisibleRange { start: 0, end: 6 })
        );
        f.list.set_attribute("buffer", "0").unwrap();
        assert_eq!(
            f.list.visible_range().unwrap(),
            Some(VisibleRange { start: 0, end: 2 })
        );

        let err = f.list.set_attribute("item-height", "-3").unwrap_err();
        assert!(matches!(err, Error::Update { .. }));
    }

    #[test]
    fn disconnect_stops_scroll_handling() {
        let f = fixture(1000);
        let viewport = f.list.viewport().unwrap().unwrap();
        f.list.scroll_to_offset(1000.0).unwrap();
        f.list.scroll_to_offset(3000.0).unwrap();

        f.list.unmount();
        f.timers.advance(Duration::from_secs(1));
        let mut event = Event::new("scroll").with_detail(json!({"scrollTop": 5000.0}));
        f.dom.dispatch_event(viewport, &mut event);

        assert_eq!(
            f.list.visible_range().unwrap(),
            Some(VisibleRange { start: 18, end: 30 })
        );
        assert_eq!(f.dom.borrow().total_listeners(), 1);
        assert_eq!(f.timers.pending(), 0);
    }

    #[test]
    fn disconnect_during_update_clears_pending_settle() {
        let f = fixture(1000);
        f.list.scroll_to_offset(1000.0).unwrap();
        f.list.scroll_to_offset(3000.0).unwrap();
        assert_eq!(f.list.active_timers(), 1);

        // The range change announced by `update` unmounts the list while the
        // component is still borrowed, so `disconnected()` is skipped.
        let list = f.list.clone();
        let body = f.dom.body();
        f.dom
            .borrow_mut()
            .add_listener(
                body,
                RANGE_CHANGE_EVENT,
                Listener::new(move |_| list.unmount()),
                Default::default(),
            )
            .unwrap();
        f.list.set_attribute("viewport-height", "100").unwrap();

        assert!(!f.list.is_connected());
        assert_eq!(f.list.active_timers(), 0);
        assert_eq!(f.timers.pending(), 0);

        f.timers.advance(Duration::from_secs(1));
        assert_eq!(
            f.list.visible_range().unwrap(),
            Some(VisibleRange { start: 18, end: 24 })
        );
    }
}
