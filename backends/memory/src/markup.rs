//! Serialization of the attached resources to HTML-like markup.

use core::fmt::Write;

use canopy_core::{ResourceHandle, ResourceKind};

use crate::MemoryBackend;

impl MemoryBackend {
    /// Serializes every top-level resource and its attached descendants, in order.
    ///
    /// Elements become `<tag name="value">…</tag>`, text is escaped.
    #[must_use]
    pub fn to_markup(&self) -> String {
        let mut out = String::new();
        for root in self.roots() {
            self.write_markup(*root, &mut out);
        }
        out
    }

    /// Serializes one resource and its attached descendants.
    #[must_use]
    pub fn markup_of(&self, handle: ResourceHandle) -> String {
        let mut out = String::new();
        self.write_markup(handle, &mut out);
        out
    }

    fn write_markup(&self, handle: ResourceHandle, out: &mut String) {
        let Some(node) = self.node(handle) else {
            return;
        };
        match node.kind() {
            ResourceKind::Text { content } => escape_into(content, out),
            ResourceKind::Element { tag, attributes } => {
                out.push('<');
                out.push_str(tag);
                for (name, value) in attributes {
                    let _ = write!(out, " {name}=\"");
                    escape_into(value, out);
                    out.push('"');
                }
                out.push('>');
                for child in node.children() {
                    self.write_markup(*child, out);
                }
                let _ = write!(out, "</{tag}>");
            }
        }
    }
}

fn escape_into(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            c => out.push(c),
        }
    }
}
