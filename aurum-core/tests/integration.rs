//! Integration Tests for the Element Runtime
//!
//! These tests drive components, schedulers and list rendering together
//! through the public API, the way a host page would.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use aurum_core::components::{field_key, AuList, AuVirtualList, RANGE_CHANGE_EVENT, RECONCILED_EVENT};
use aurum_core::dom::{Event, Listener, Markup};
use aurum_core::list::{Key, VisibleRange};
use aurum_core::{
    AttributeChange, Component, Context, DomBatch, Error, RenderScheduler, Result, Runtime,
};
use serde_json::json;

/// A component that counts clicks and ticks of its own interval.
#[derive(Default)]
struct Ticker {
    clicks: Arc<AtomicI32>,
    ticks: Arc<AtomicI32>,
    on_click: Option<Listener>,
    strict: bool,
}

impl Component for Ticker {
    const TAG: &'static str = "au-ticker";

    fn observed_attributes() -> &'static [&'static str] {
        &["mode"]
    }

    fn render(&mut self, cx: &Context<'_>) -> Result<()> {
        if cx.find_marker("au-ticker__face").is_none() {
            let mut doc = cx.dom().borrow_mut();
            let face = doc.materialize(&Markup::element("span").attr("class", "au-ticker__face"));
            doc.append_child(cx.host(), face)?;
        }
        let clicks = self.clicks.clone();
        let on_click = self
            .on_click
            .get_or_insert_with(|| {
                Listener::new(move |_| {
                    clicks.fetch_add(1, Ordering::SeqCst);
                })
            })
            .clone();
        cx.listen(cx.host(), "click", &on_click)?;
        Ok(())
    }

    fn update(&mut self, _cx: &Context<'_>, change: &AttributeChange) -> Result<()> {
        if self.strict && change.new_value.as_deref() != Some("fast") {
            return Err(Error::update(&change.name, "only `fast` is supported"));
        }
        Ok(())
    }

    fn connected(&mut self, cx: &Context<'_>) -> Result<()> {
        let ticks = self.ticks.clone();
        cx.set_interval(Duration::from_millis(100), move || {
            ticks.fetch_add(1, Ordering::SeqCst);
        });
        let ticks = self.ticks.clone();
        cx.set_timeout(Duration::from_millis(50), move || {
            ticks.fetch_add(10, Ordering::SeqCst);
        });
        Ok(())
    }
}

/// Test that nothing a component registered survives its disconnect.
#[test]
fn disconnect_releases_everything() {
    let runtime = Runtime::new();
    let ticker = runtime.mount(Ticker::default(), runtime.body()).unwrap();
    let (clicks, ticks) = ticker
        .with(|t| (t.clicks.clone(), t.ticks.clone()))
        .unwrap();

    runtime.dom().dispatch_event(ticker.node(), &mut Event::new("click"));
    runtime.advance(Duration::from_millis(100));
    assert_eq!(clicks.load(Ordering::SeqCst), 1);
    assert_eq!(ticks.load(Ordering::SeqCst), 11);

    ticker.unmount();
    // A second disconnect is harmless
    ticker.unmount();

    runtime.dom().dispatch_event(ticker.node(), &mut Event::new("click"));
    runtime.advance(Duration::from_secs(5));

    assert_eq!(clicks.load(Ordering::SeqCst), 1);
    assert_eq!(ticks.load(Ordering::SeqCst), 11);
    assert_eq!(runtime.dom().borrow().total_listeners(), 0);
    assert_eq!(runtime.timers().pending(), 0);
}

/// Test that repeated renders do not duplicate structure or handlers.
#[test]
fn render_is_idempotent_across_reconnects() {
    let runtime = Runtime::new();
    let ticker = runtime.mount(Ticker::default(), runtime.body()).unwrap();

    for _ in 0..3 {
        ticker.render().unwrap();
        ticker.unmount();
        ticker.mount(runtime.body()).unwrap();
    }

    let clicks = ticker.with(|t| t.clicks.clone()).unwrap();
    runtime.dom().dispatch_event(ticker.node(), &mut Event::new("click"));

    assert_eq!(clicks.load(Ordering::SeqCst), 1);
    assert_eq!(runtime.dom().borrow().children(ticker.node()).len(), 1);
    assert_eq!(ticker.active_listeners(), 1);
    assert_eq!(ticker.active_timers(), 2);
}

/// Test that update errors reach the code that changed the attribute.
#[test]
fn update_errors_propagate_to_the_caller() {
    let runtime = Runtime::new();
    let ticker = runtime
        .mount(
            Ticker {
                strict: true,
                ..Ticker::default()
            },
            runtime.body(),
        )
        .unwrap();

    assert!(ticker.set_attribute("mode", "fast").is_ok());
    let err = ticker.set_attribute("mode", "slow").unwrap_err();
    assert!(matches!(err, Error::Update { ref attribute, .. } if attribute == "mode"));
    // Unobserved attributes never reach update()
    assert!(ticker.set_attribute("title", "slow").is_ok());
}

/// Test that every scheduled callback runs once, in order, whatever the
/// others do.
#[test]
fn scheduled_failures_are_isolated() {
    let mut runtime = Runtime::new();
    let order = Rc::new(RefCell::new(Vec::new()));

    let o = order.clone();
    RenderScheduler::schedule(move || o.borrow_mut().push(1));
    RenderScheduler::schedule_try(|| Err(Error::callback("deferred failure")));
    RenderScheduler::schedule(|| panic!("render callback panicked"));
    let o = order.clone();
    RenderScheduler::schedule(move || o.borrow_mut().push(2));

    let frame = runtime.run_frame();
    assert_eq!(*order.borrow(), [1, 2]);
    assert_eq!(frame.renders.ran, 4);
    assert_eq!(frame.failed(), 2);
}

/// Test that components measuring then mutating in one frame read before
/// anyone writes.
#[test]
fn batch_reads_precede_writes_across_components() {
    let mut runtime = Runtime::new();
    let log = Rc::new(RefCell::new(Vec::new()));

    for name in ["a", "b", "c"] {
        let log = log.clone();
        DomBatch::read(move || {
            log.borrow_mut().push(format!("read {name}"));
            let log = log.clone();
            DomBatch::write(move || log.borrow_mut().push(format!("write {name}")));
        });
    }
    runtime.run_frame();

    assert_eq!(
        *log.borrow(),
        ["read a", "read b", "read c", "write a", "write b", "write c"]
    );
}

/// Test the keyed list end to end: identity, events and removal.
#[test]
fn keyed_list_preserves_identity() {
    let mut runtime = Runtime::new();
    let list = runtime.mount(AuList::default(), runtime.body()).unwrap();
    let reports = Rc::new(RefCell::new(Vec::new()));
    let r = reports.clone();
    let body = runtime.body();
    runtime
        .dom()
        .borrow_mut()
        .add_listener(
            body,
            RECONCILED_EVENT,
            Listener::new(move |event| r.borrow_mut().push(event.detail().clone())),
            Default::default(),
        )
        .unwrap();

    list.set_key_fn(field_key("id")).unwrap();
    list.set_items(vec![json!({"id": 1}), json!({"id": 2}), json!({"id": 3})])
        .unwrap();
    runtime.run_frame();

    let before: Vec<_> = (1..=3)
        .map(|id| list.node_for(&Key::Int(id)).unwrap())
        .collect();

    list.set_items(vec![json!({"id": 2}), json!({"id": 3}), json!({"id": 4})])
        .unwrap();
    runtime.run_frame();

    assert_eq!(list.node_for(&Key::Int(2)).unwrap(), before[1]);
    assert_eq!(list.node_for(&Key::Int(3)).unwrap(), before[2]);
    assert!(!runtime.dom().borrow().contains(before[0].unwrap()));
    assert!(list.node_for(&Key::Int(4)).unwrap().is_some());

    let last = reports.borrow().last().cloned().unwrap();
    assert_eq!(last["created"], json!(1));
    assert_eq!(last["removed"], json!(1));
}

/// Test the virtual list window against the documented formula.
#[test]
fn virtual_list_renders_only_the_window() {
    let mut runtime = Runtime::new();
    let element = runtime.create("au-virtual-list").unwrap();
    element.set_attribute("item-height", "50").unwrap();
    element.set_attribute("viewport-height", "400").unwrap();
    element.set_attribute("buffer", "2").unwrap();
    element.mount(runtime.body()).unwrap();

    let list = element.downcast::<AuVirtualList>().unwrap();
    let ranges = Rc::new(RefCell::new(Vec::new()));
    let r = ranges.clone();
    runtime
        .dom()
        .borrow_mut()
        .add_listener(
            list.node(),
            RANGE_CHANGE_EVENT,
            Listener::new(move |event| r.borrow_mut().push(event.detail().clone())),
            Default::default(),
        )
        .unwrap();

    list.set_items((0..1000).map(|i| json!(i)).collect()).unwrap();
    runtime.run_frame();
    list.scroll_to_offset(1000.0).unwrap();

    assert_eq!(
        list.visible_range().unwrap(),
        Some(VisibleRange { start: 18, end: 30 })
    );
    assert_eq!(list.materialized().unwrap(), 12);
    assert_eq!(ranges.borrow().last(), Some(&json!({"start": 18, "end": 30})));

    // Scrolling inside the same window renders nothing new
    runtime.advance(Duration::from_millis(100));
    ranges.borrow_mut().clear();
    list.scroll_to_offset(1020.0).unwrap();
    runtime.advance(Duration::from_millis(100));
    assert!(ranges.borrow().is_empty());
}

/// Test that memoized work runs once per distinct argument.
#[test]
fn runtime_memo_caches_and_evicts() {
    let runtime = Runtime::from_json(r#"{"memo_max_size": 2}"#).unwrap();
    let compute_count = Arc::new(AtomicI32::new(0));
    let counter = compute_count.clone();
    let slow_len = runtime.memo(move |s: &String| {
        counter.fetch_add(1, Ordering::SeqCst);
        s.len()
    });

    let (a, b, c) = ("a".to_string(), "bb".to_string(), "ccc".to_string());
    assert_eq!(slow_len.call(&a), 1);
    assert_eq!(slow_len.call(&a), 1);
    assert_eq!(compute_count.load(Ordering::SeqCst), 1);

    slow_len.call(&b);
    slow_len.call(&a);
    slow_len.call(&c);
    // `b` was least recently used
    assert!(!slow_len.contains(&b));
    assert!(slow_len.contains(&a));
    assert_eq!(compute_count.load(Ordering::SeqCst), 3);
}

/// Test debounce and throttle on the runtime's virtual clock.
#[test]
fn debounce_and_throttle_follow_virtual_time() {
    let runtime = Runtime::new();
    let last = Rc::new(RefCell::new(None));
    let l = last.clone();
    let search = runtime.debounce(Duration::from_millis(300), move |q: &'static str| {
        *l.borrow_mut() = Some(q);
    });

    search.call("a");
    runtime.advance(Duration::from_millis(100));
    search.call("ab");
    runtime.advance(Duration::from_millis(299));
    assert_eq!(*last.borrow(), None);
    runtime.advance(Duration::from_millis(1));
    assert_eq!(*last.borrow(), Some("ab"));

    let hits = Rc::new(RefCell::new(Vec::new()));
    let h = hits.clone();
    let resize = runtime.throttle(Duration::from_millis(100), move |w: u32| h.borrow_mut().push(w));
    assert!(resize.call(1));
    runtime.advance(Duration::from_millis(50));
    assert!(!resize.call(2));
    runtime.advance(Duration::from_millis(50));
    assert!(resize.call(3));
    assert_eq!(*hits.borrow(), [1, 3]);
}
