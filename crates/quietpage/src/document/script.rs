//! Edit scripts: scripted page activity replayed between scheduler turns.
//!
//! A script is a JSON array of batches; each batch is an array of [`Edit`]s
//! applied together, so their change records are delivered as one batch.
//! Elements are addressed by their `id` attribute.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::fixture::NodeSpec;
use super::{Document, NodeId};
use crate::error::{Error, Result};

/// One scripted edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Edit {
    /// Append a new subtree under `parent` (the document root when absent).
    Append {
        /// Element id of the parent.
        #[serde(default)]
        parent: Option<String>,
        /// The subtree to build.
        node: NodeSpec,
    },
    /// Detach the element with the given id.
    Remove {
        /// Element id to remove.
        target: String,
    },
    /// Replace the text of the element with the given id.
    SetText {
        /// Element id whose text changes.
        target: String,
        /// New text.
        text: String,
    },
    /// Set an attribute on the element with the given id.
    SetAttribute {
        /// Element id to modify.
        target: String,
        /// Attribute name.
        name: String,
        /// Attribute value.
        value: String,
    },
}

/// A sequence of edit batches.
pub type Script = Vec<Vec<Edit>>;

/// Parse a JSON edit script.
///
/// # Errors
///
/// Returns an error if the JSON does not describe a list of edit batches.
pub fn parse_script(json: &str) -> Result<Script> {
    Ok(serde_json::from_str(json)?)
}

fn lookup(doc: &Document, element_id: &str) -> Result<NodeId> {
    doc.element_by_id(element_id)
        .ok_or_else(|| Error::UnknownElement {
            id: element_id.to_string(),
        })
}

impl Edit {
    /// Apply this edit to `doc`.
    ///
    /// # Errors
    ///
    /// Returns an error if a referenced element does not exist.
    pub fn apply(&self, doc: &mut Document) -> Result<()> {
        match self {
            Self::Append { parent, node } => {
                let parent = match parent {
                    Some(id) => lookup(doc, id)?,
                    None => doc.root(),
                };
                let built = node.build(doc)?;
                doc.append_child(parent, built)
            }
            Self::Remove { target } => {
                let node = lookup(doc, target)?;
                doc.remove(node)
            }
            Self::SetText { target, text } => {
                let node = lookup(doc, target)?;
                doc.set_text_content(node, text)
            }
            Self::SetAttribute {
                target,
                name,
                value,
            } => {
                let node = lookup(doc, target)?;
                doc.set_attribute(node, name, value.clone())
            }
        }
    }
}

/// Apply a batch of edits, skipping (and logging) edits that fail.
///
/// Returns the number of edits applied.
pub fn apply_batch(doc: &mut Document, batch: &[Edit]) -> usize {
    let mut applied = 0;
    for edit in batch {
        match edit.apply(doc) {
            Ok(()) => applied += 1,
            Err(e) => debug!(error = %e, ?edit, "Skipping edit"),
        }
    }
    applied
}
