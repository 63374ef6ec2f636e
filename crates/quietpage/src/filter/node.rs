//! Subtree filtering.
//!
//! [`filter_node`] walks a subtree with an explicit worklist, so adversarially
//! deep documents cannot exhaust the call stack. Encapsulated regions found
//! on the way are not entered; they are returned so the caller can give each
//! one its own watcher registration.

use tracing::{debug, trace};

use super::text::{MatchSpan, TextFilterEngine};
use crate::document::{Document, NodeId, NodeKind};
use crate::error::{Error, Result};
use crate::forbidden::ForbiddenPredicate;

/// Attributes of image-like elements that carry visible text.
const IMAGE_TEXT_ATTRIBUTES: [&str; 2] = ["alt", "title"];

/// Elements that flow within a line. Any other element separates text runs
/// in advanced mode.
const INLINE_TAGS: [&str; 26] = [
    "a", "abbr", "b", "bdi", "bdo", "cite", "code", "data", "del", "dfn", "em", "font", "i",
    "ins", "kbd", "mark", "q", "s", "samp", "small", "span", "strong", "sub", "sup", "u", "var",
];

/// How the walker treats a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeClass {
    /// A text node; its data is filtered.
    TextLeaf,
    /// An image-like element; its textual attributes are filtered.
    ImageLeaf,
    /// An element hosting an encapsulated region.
    EncapsulationBoundary {
        /// Root of the hosted region.
        region: NodeId,
    },
    /// Anything else with children to walk.
    NonLeafContainer,
    /// Skipped along with its subtree.
    Forbidden,
}

/// Classify `node` for the walker.
///
/// # Errors
///
/// Returns [`Error::MalformedTarget`] if the node no longer exists.
pub fn classify_node(
    doc: &Document,
    forbidden: &dyn ForbiddenPredicate,
    node: NodeId,
) -> Result<NodeClass> {
    let kind = doc.kind(node).ok_or(Error::MalformedTarget { node })?;
    if forbidden.is_forbidden(doc, node) {
        return Ok(NodeClass::Forbidden);
    }
    Ok(match kind {
        NodeKind::Text(_) => NodeClass::TextLeaf,
        NodeKind::Element(el) if el.tag == "img" => NodeClass::ImageLeaf,
        NodeKind::Element(el) => match el.shadow_root {
            Some(region) => NodeClass::EncapsulationBoundary { region },
            None => NodeClass::NonLeafContainer,
        },
        NodeKind::Document | NodeKind::ShadowRoot { .. } => NodeClass::NonLeafContainer,
    })
}

/// What a subtree pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeSweep {
    /// Number of text nodes and attributes rewritten.
    pub modified: usize,
    /// Encapsulated regions discovered, in document order.
    pub regions: Vec<NodeId>,
}

impl NodeSweep {
    /// Fold another sweep into this one.
    pub fn merge(&mut self, other: NodeSweep) {
        self.modified += other.modified;
        self.regions.extend(other.regions);
    }
}

/// Borrowed session pieces a subtree pass needs.
#[allow(missing_debug_implementations)]
pub struct NodeFilter<'a> {
    /// The document being rewritten.
    pub doc: &'a mut Document,
    /// The engine holding the session wordlists.
    pub engine: &'a mut TextFilterEngine,
    /// Nodes to leave alone.
    pub forbidden: &'a dyn ForbiddenPredicate,
    /// Match across adjacent text nodes.
    pub advanced: bool,
}

/// Filter every leaf under `node` (inclusive) with wordlist `wordlist_id`.
///
/// In advanced mode the text of each block is matched as one run, so a word
/// split across adjacent inline text nodes is still found: the first node the
/// match touches receives the replacement and the remaining portions are
/// emptied. Block-level elements start a new run.
///
/// # Errors
///
/// Returns an error if the wordlist is missing or `node` no longer exists.
/// Failures on individual descendants are logged and skipped.
pub fn filter_node(
    ctx: &mut NodeFilter<'_>,
    node: NodeId,
    wordlist_id: u8,
    record_stats: bool,
) -> Result<NodeSweep> {
    ctx.engine.registry().get(wordlist_id)?;
    if !ctx.doc.is_alive(node) {
        return Err(Error::MalformedTarget { node });
    }

    let mut sweep = NodeSweep::default();
    let mut runs: Vec<Vec<NodeId>> = vec![Vec::new()];
    let mut worklist = vec![Walk::Visit(node)];
    while let Some(step) = worklist.pop() {
        let current = match step {
            Walk::Visit(current) => current,
            Walk::Break => {
                break_run(&mut runs);
                continue;
            }
        };
        let class = match classify_node(ctx.doc, ctx.forbidden, current) {
            Ok(class) => class,
            Err(e) => {
                debug!(node = %current, error = %e, "Skipping node");
                continue;
            }
        };
        let separates = !is_inline(ctx.doc, current);
        if separates {
            break_run(&mut runs);
        }
        match class {
            NodeClass::Forbidden => {}
            NodeClass::TextLeaf => {
                if let Some(run) = runs.last_mut() {
                    run.push(current);
                }
            }
            NodeClass::ImageLeaf => {
                sweep.modified += filter_image(ctx, current, wordlist_id, record_stats);
            }
            NodeClass::EncapsulationBoundary { region } => {
                trace!(host = %current, %region, "Found encapsulated region");
                sweep.regions.push(region);
                push_children(&mut worklist, ctx.doc, current, separates);
            }
            NodeClass::NonLeafContainer => {
                push_children(&mut worklist, ctx.doc, current, separates);
            }
        }
    }

    let run_as_one = ctx.advanced && (node == ctx.doc.root() || ctx.doc.parent(node).is_some());
    if run_as_one {
        for run in runs.iter().filter(|run| !run.is_empty()) {
            sweep.modified += filter_text_run(ctx, run, wordlist_id, record_stats)?;
        }
    } else {
        sweep.modified += runs
            .into_iter()
            .flatten()
            .filter(|leaf| filter_text_leaf(ctx, *leaf, wordlist_id, record_stats))
            .count();
    }
    Ok(sweep)
}

enum Walk {
    Visit(NodeId),
    Break,
}

fn push_children(worklist: &mut Vec<Walk>, doc: &Document, node: NodeId, separates: bool) {
    if separates {
        worklist.push(Walk::Break);
    }
    worklist.extend(doc.children(node).iter().rev().map(|child| Walk::Visit(*child)));
}

fn break_run(runs: &mut Vec<Vec<NodeId>>) {
    if runs.last().is_some_and(|run| !run.is_empty()) {
        runs.push(Vec::new());
    }
}

fn is_inline(doc: &Document, node: NodeId) -> bool {
    match doc.kind(node) {
        Some(NodeKind::Text(_)) => true,
        Some(NodeKind::Element(el)) => INLINE_TAGS
            .iter()
            .any(|tag| el.tag.eq_ignore_ascii_case(tag)),
        _ => false,
    }
}

/// Encapsulated regions under `node` (inclusive), without filtering anything.
#[must_use]
pub fn discover_regions(doc: &Document, forbidden: &dyn ForbiddenPredicate, node: NodeId) -> Vec<NodeId> {
    let mut regions = Vec::new();
    let mut worklist = vec![node];
    while let Some(current) = worklist.pop() {
        match classify_node(doc, forbidden, current) {
            Ok(NodeClass::EncapsulationBoundary { region }) => {
                regions.push(region);
                worklist.extend(doc.children(current).iter().rev());
            }
            Ok(NodeClass::NonLeafContainer) => worklist.extend(doc.children(current).iter().rev()),
            _ => {}
        }
    }
    regions
}

fn filter_text_leaf(ctx: &mut NodeFilter<'_>, leaf: NodeId, wordlist_id: u8, record_stats: bool) -> bool {
    let Some(text) = ctx.doc.text(leaf) else {
        return false;
    };
    if text.trim().is_empty() {
        return false;
    }
    let text = text.to_string();
    let result = ctx
        .engine
        .filter_text_or_passthrough(&text, wordlist_id, record_stats);
    if !result.modified {
        return false;
    }
    match ctx.doc.set_text(leaf, result.filtered) {
        Ok(()) => true,
        Err(e) => {
            debug!(node = %leaf, error = %e, "Could not rewrite text");
            false
        }
    }
}

fn filter_image(ctx: &mut NodeFilter<'_>, image: NodeId, wordlist_id: u8, record_stats: bool) -> usize {
    let mut modified = 0;
    for name in IMAGE_TEXT_ATTRIBUTES {
        let Some(value) = ctx.doc.attribute(image, name).filter(|v| !v.is_empty()) else {
            continue;
        };
        let value = value.to_string();
        let result = ctx
            .engine
            .filter_text_or_passthrough(&value, wordlist_id, record_stats);
        if result.modified && ctx.doc.set_attribute(image, name, result.filtered).is_ok() {
            modified += 1;
        }
    }
    modified
}

fn filter_text_run(
    ctx: &mut NodeFilter<'_>,
    leaves: &[NodeId],
    wordlist_id: u8,
    record_stats: bool,
) -> Result<usize> {
    let mut run = String::new();
    let mut pieces = Vec::with_capacity(leaves.len());
    for leaf in leaves {
        if let Some(text) = ctx.doc.text(*leaf) {
            pieces.push((*leaf, run.len(), text.to_string()));
            run.push_str(text);
        }
    }
    if run.trim().is_empty() {
        return Ok(0);
    }

    let spans = ctx.engine.plan_text(&run, wordlist_id, record_stats)?;
    if spans.is_empty() {
        return Ok(0);
    }

    let mut modified = 0;
    for (leaf, offset, text) in pieces {
        let end = offset + text.len();
        let mut edits = Vec::new();
        for span in spans.iter().filter(|s| s.start < end && offset < s.end) {
            let first_portion = span.start >= offset;
            edits.push(MatchSpan {
                start: span.start.max(offset) - offset,
                end: span.end.min(end) - offset,
                word: span.word.clone(),
                replacement: if first_portion {
                    span.replacement.clone()
                } else {
                    String::new()
                },
            });
        }
        if edits.is_empty() {
            continue;
        }
        let rewritten = super::text::splice(&text, &edits);
        if rewritten == text {
            continue;
        }
        match ctx.doc.set_text(leaf, rewritten) {
            Ok(()) => modified += 1,
            Err(e) => debug!(node = %leaf, error = %e, "Could not rewrite text"),
        }
    }
    Ok(modified)
}
