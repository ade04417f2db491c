//! List-rendering components built on the element runtime.
//!
//! Both take their data through property setters on the element handle
//! rather than attributes, since items, key functions and renderers are not
//! strings. Setting a property schedules a render on the render scheduler.

mod list;
mod virtual_list;

pub use list::{AuList, RECONCILED_EVENT};
pub use virtual_list::{AuVirtualList, RANGE_CHANGE_EVENT};

use serde_json::Value;

use crate::dom::Markup;
use crate::error::Result;
use crate::list::Key;

/// Key items by an object field. Integer and string fields become keys;
/// anything else falls back to the item's index.
pub fn field_key(field: &'static str) -> impl Fn(&Value, usize) -> Key {
    move |item, index| match item.get(field) {
        Some(Value::String(s)) => Key::Str(s.clone()),
        Some(Value::Number(n)) => n.as_i64().map_or(Key::Index(index), Key::Int),
        _ => Key::Index(index),
    }
}

/// Text shown for an item by the default renderers.
fn item_text(item: &Value) -> String {
    match item {
        Value::String(s) => s.clone(),
        Value::Object(map) => match map.get("label") {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => item.to_string(),
        },
        other => other.to_string(),
    }
}

fn render_text_item(tag: &str, class: &str, item: &Value) -> Result<Markup> {
    Ok(Markup::element(tag).attr("class", class).with_text(item_text(item)))
}
