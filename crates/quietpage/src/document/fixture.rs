//! JSON document fixtures.
//!
//! Fixtures describe a document tree as nested [`NodeSpec`] values:
//!
//! ```json
//! [
//!   { "tag": "p", "text": "hello there" },
//!   { "tag": "div", "class": "captions", "children": [ { "text": "raw text" } ] },
//!   { "tag": "x-card", "shadow": [ { "tag": "span", "text": "inside" } ] }
//! ]
//! ```
//!
//! A spec without a `tag` is a bare text node.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use super::{Document, NodeId, NodeKind};
use crate::error::Result;

/// Declarative description of a node and its subtree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeSpec {
    /// Element tag. `None` makes this a text node holding `text`.
    pub tag: Option<String>,
    /// Text content. For elements this becomes the first child text node.
    pub text: Option<String>,
    /// Shorthand for the `id` attribute.
    pub id: Option<String>,
    /// Shorthand for the `class` attribute.
    pub class: Option<String>,
    /// Other attributes.
    pub attrs: BTreeMap<String, String>,
    /// Child nodes.
    pub children: Vec<NodeSpec>,
    /// Content of an attached encapsulated region.
    pub shadow: Option<Vec<NodeSpec>>,
}

impl NodeSpec {
    /// Build this spec into `doc` as a detached subtree and return its root.
    ///
    /// # Errors
    ///
    /// Returns an error if the document rejects one of the insertions.
    pub fn build(&self, doc: &mut Document) -> Result<NodeId> {
        let Some(tag) = &self.tag else {
            return Ok(doc.create_text(self.text.clone().unwrap_or_default()));
        };

        let element = doc.create_element(tag);
        if let Some(id) = &self.id {
            doc.set_attribute(element, "id", id.clone())?;
        }
        if let Some(class) = &self.class {
            doc.set_attribute(element, "class", class.clone())?;
        }
        for (name, value) in &self.attrs {
            doc.set_attribute(element, name, value.clone())?;
        }
        if let Some(text) = &self.text {
            let text_node = doc.create_text(text.clone());
            doc.append_child(element, text_node)?;
        }
        for child in &self.children {
            let child_node = child.build(doc)?;
            doc.append_child(element, child_node)?;
        }
        if let Some(shadow_children) = &self.shadow {
            let shadow = doc.attach_shadow(element)?;
            for child in shadow_children {
                let child_node = child.build(doc)?;
                doc.append_child(shadow, child_node)?;
            }
        }
        Ok(element)
    }
}

impl Document {
    /// Build a document whose root holds the given top-level specs.
    ///
    /// # Errors
    ///
    /// Returns an error if building any subtree fails.
    pub fn from_specs(specs: &[NodeSpec]) -> Result<Self> {
        let mut doc = Self::new();
        let root = doc.root();
        for spec in specs {
            let node = spec.build(&mut doc)?;
            doc.append_child(root, node)?;
        }
        Ok(doc)
    }

    /// Parse a JSON array of [`NodeSpec`] into a document.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed.
    pub fn from_json(json: &str) -> Result<Self> {
        let specs: Vec<NodeSpec> = serde_json::from_str(json)?;
        Self::from_specs(&specs)
    }
}

/// Render an indented outline of the attached document, shadow regions included.
#[must_use]
pub fn render_outline(doc: &Document) -> String {
    let mut out = String::new();
    let mut stack: Vec<(NodeId, usize)> = doc
        .children(doc.root())
        .iter()
        .rev()
        .map(|n| (*n, 0))
        .collect();

    while let Some((node, depth)) = stack.pop() {
        let indent = "  ".repeat(depth);
        match doc.kind(node) {
            Some(NodeKind::Text(data)) => {
                let _ = writeln!(out, "{indent}{data:?}");
            }
            Some(NodeKind::Element(el)) => {
                let attrs: String = el
                    .attributes
                    .iter()
                    .map(|(k, v)| format!(" {k}={v:?}"))
                    .collect();
                let _ = writeln!(out, "{indent}<{}{attrs}>", el.tag);
                for child in doc.children(node).iter().rev() {
                    stack.push((*child, depth + 1));
                }
                if let Some(shadow) = el.shadow_root {
                    stack.push((shadow, depth + 1));
                }
            }
            Some(NodeKind::ShadowRoot { .. }) => {
                let _ = writeln!(out, "{indent}#shadow-root");
                for child in doc.children(node).iter().rev() {
                    stack.push((*child, depth + 1));
                }
            }
            Some(NodeKind::Document) | None => {}
        }
    }
    out
}
