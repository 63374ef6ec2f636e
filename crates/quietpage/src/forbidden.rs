//! Nodes the filter must never touch.

use crate::document::{Document, NodeId, NodeKind};

/// Decides whether a node (and everything beneath it) is off limits.
pub trait ForbiddenPredicate {
    /// Whether `node` must be skipped entirely.
    fn is_forbidden(&self, doc: &Document, node: NodeId) -> bool;
}

/// Skips script-like and editable regions.
///
/// A text node is forbidden when its parent element is. An element is
/// forbidden when its tag is listed or it, or an ancestor, is editable.
#[derive(Debug, Clone)]
pub struct DefaultForbidden {
    tags: Vec<String>,
}

impl Default for DefaultForbidden {
    fn default() -> Self {
        Self::with_tags(["script", "style", "noscript", "textarea", "input", "select", "template"])
    }
}

impl DefaultForbidden {
    /// A predicate forbidding the given (case-insensitive) tags.
    #[must_use]
    pub fn with_tags<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            tags: tags
                .into_iter()
                .map(|t| t.as_ref().to_ascii_lowercase())
                .collect(),
        }
    }

    fn is_editable(doc: &Document, element: NodeId) -> bool {
        let mut current = Some(element);
        while let Some(node) = current {
            if let Some(value) = doc.attribute(node, "contenteditable") {
                return !value.eq_ignore_ascii_case("false");
            }
            current = doc.parent_element(node);
        }
        false
    }
}

impl ForbiddenPredicate for DefaultForbidden {
    fn is_forbidden(&self, doc: &Document, node: NodeId) -> bool {
        let element = match doc.kind(node) {
            Some(NodeKind::Element(_)) => node,
            Some(NodeKind::Text(_)) => match doc.parent_element(node) {
                Some(parent) => parent,
                None => return false,
            },
            _ => return false,
        };
        doc.tag(element)
            .is_some_and(|tag| self.tags.iter().any(|t| t == tag))
            || Self::is_editable(doc, element)
    }
}

/// Forbids nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl ForbiddenPredicate for AllowAll {
    fn is_forbidden(&self, _doc: &Document, _node: NodeId) -> bool {
        false
    }
}
