//! Markup
//!
//! `Markup` is the owned description of a subtree that item renderers
//! produce. It serializes to exactly the string `Document::outer_html`
//! produces for a node materialized from it, which lets the reconciler
//! detect content changes with a plain string comparison.

use std::fmt::Write;

use indexmap::IndexMap;

/// An element or text subtree that has not been materialized yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Markup {
    Element {
        tag: String,
        attributes: IndexMap<String, String>,
        children: Vec<Markup>,
    },
    Text(String),
}

impl Markup {
    /// Start an element description.
    pub fn element(tag: impl Into<String>) -> Self {
        Self::Element {
            tag: tag.into(),
            attributes: IndexMap::new(),
            children: Vec::new(),
        }
    }

    /// A text node.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    /// Set an attribute. Setting the same name twice keeps the first
    /// position and the last value, like `setAttribute`.
    pub fn attr(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        if let Self::Element { attributes, .. } = &mut self {
            attributes.insert(name.into(), value.to_string());
        }
        self
    }

    /// Append a child.
    pub fn child(mut self, child: Markup) -> Self {
        if let Self::Element { children, .. } = &mut self {
            children.push(child);
        }
        self
    }

    /// Append several children.
    pub fn children(mut self, new_children: impl IntoIterator<Item = Markup>) -> Self {
        if let Self::Element { children, .. } = &mut self {
            children.extend(new_children);
        }
        self
    }

    /// Append a text child.
    pub fn with_text(self, text: impl Into<String>) -> Self {
        self.child(Markup::text(text))
    }

    /// Serialize to HTML.
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        self.write_html(&mut out);
        out
    }

    fn write_html(&self, out: &mut String) {
        match self {
            Self::Text(text) => write_text(out, text),
            Self::Element {
                tag,
                attributes,
                children,
            } => {
                write_open_tag(out, tag, attributes.iter());
                for child in children {
                    child.write_html(out);
                }
                write_close_tag(out, tag);
            }
        }
    }
}

pub(crate) fn write_open_tag<'a>(
    out: &mut String,
    tag: &str,
    attributes: impl Iterator<Item = (&'a String, &'a String)>,
) {
    out.push('<');
    out.push_str(tag);
    for (name, value) in attributes {
        let _ = write!(out, " {}=\"", name);
        for ch in value.chars() {
            match ch {
                '&' => out.push_str("&amp;"),
                '"' => out.push_str("&quot;"),
                '<' => out.push_str("&lt;"),
                _ => out.push(ch),
            }
        }
        out.push('"');
    }
    out.push('>');
}

pub(crate) fn write_close_tag(out: &mut String, tag: &str) {
    let _ = write!(out, "</{}>", tag);
}

pub(crate) fn write_text(out: &mut String, text: &str) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_nested_markup() {
        let markup = Markup::element("li")
            .attr("class", "row")
            .attr("data-id", 7)
            .child(Markup::element("span").with_text("a < b"));

        assert_eq!(
            markup.to_html(),
            r#"<li class="row" data-id="7"><span>a &lt; b</span></li>"#
        );
    }

    #[test]
    fn repeated_attribute_keeps_position() {
        let markup = Markup::element("div")
            .attr("id", "x")
            .attr("class", "a")
            .attr("id", "y");
        assert_eq!(markup.to_html(), r#"<div id="y" class="a"></div>"#);
    }

    #[test]
    fn attribute_values_are_escaped() {
        let markup = Markup::element("a").attr("title", "\"q\" & <r>");
        assert_eq!(
            markup.to_html(),
            r#"<a title="&quot;q&quot; &amp; &lt;r>"></a>"#
        );
    }
}
