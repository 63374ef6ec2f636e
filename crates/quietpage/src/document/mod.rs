//! The observed document structure.
//!
//! A [`Document`] is an arena of nodes addressed by generational [`NodeId`]
//! handles. It doubles as the change-detection mechanism: every structural
//! edit or text change inside an observed region is queued as a
//! [`ChangeEvent`] until the watcher takes the records, much like a mutation
//! observer coalesces edits between scheduler turns.
//!
//! Removed nodes stay readable (detached) until [`Document::collect_garbage`]
//! frees them, after which any handle to them fails the liveness check.

pub mod fixture;
pub mod script;

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use tracing::trace;

use crate::error::{Error, Result};

/// Stable identity of a node in a [`Document`].
///
/// Handles carry a generation so that a handle to a freed slot can never be
/// confused with whatever node reuses that slot later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}.{}", self.index, self.generation)
    }
}

/// Element payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementData {
    /// Lowercased tag name.
    pub tag: String,
    /// Attributes, ordered by name.
    pub attributes: BTreeMap<String, String>,
    /// Encapsulated region attached to this element, if any.
    pub shadow_root: Option<NodeId>,
}

/// What kind of node a slot holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// The document root.
    Document,
    /// An element with a tag and attributes.
    Element(ElementData),
    /// A text leaf.
    Text(String),
    /// The root of an encapsulated region hosted by an element.
    ShadowRoot {
        /// The hosting element.
        host: NodeId,
    },
}

#[derive(Debug)]
struct NodeData {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    node: Option<NodeData>,
}

/// The kind of change a [`ChangeEvent`] describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// `target` was inserted under `parent`.
    NodeAdded,
    /// `target` was removed from `parent`.
    NodeRemoved,
    /// The data of text node `target` changed; `old_value` holds the previous data.
    TextChanged,
}

/// A single recorded change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    /// What happened.
    pub kind: ChangeKind,
    /// The node that was added, removed or changed.
    pub target: NodeId,
    /// The parent involved in an insertion or removal.
    pub parent: Option<NodeId>,
    /// Previous text for [`ChangeKind::TextChanged`].
    pub old_value: Option<String>,
}

impl ChangeEvent {
    /// An insertion of `node` under `parent`.
    #[must_use]
    pub fn added(parent: NodeId, node: NodeId) -> Self {
        Self {
            kind: ChangeKind::NodeAdded,
            target: node,
            parent: Some(parent),
            old_value: None,
        }
    }

    /// A removal of `node` from `parent`.
    #[must_use]
    pub fn removed(parent: NodeId, node: NodeId) -> Self {
        Self {
            kind: ChangeKind::NodeRemoved,
            target: node,
            parent: Some(parent),
            old_value: None,
        }
    }

    /// A text change on `node`.
    #[must_use]
    pub fn text_changed(node: NodeId, old_value: impl Into<String>) -> Self {
        Self {
            kind: ChangeKind::TextChanged,
            target: node,
            parent: None,
            old_value: Some(old_value.into()),
        }
    }
}

#[derive(Debug)]
struct Observation {
    region: NodeId,
    records: Vec<ChangeEvent>,
    // Subtrees removed from the region since the last take; edits to them
    // are still reported to this region.
    transient: Vec<NodeId>,
}

/// An arena-backed document tree with built-in change recording.
#[derive(Debug)]
pub struct Document {
    slots: Vec<Slot>,
    free: Vec<u32>,
    root: NodeId,
    observations: Vec<Observation>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Create an empty document.
    #[must_use]
    pub fn new() -> Self {
        let mut doc = Self {
            slots: Vec::new(),
            free: Vec::new(),
            root: NodeId {
                index: 0,
                generation: 0,
            },
            observations: Vec::new(),
        };
        doc.root = doc.alloc(NodeKind::Document);
        doc
    }

    /// The document root node.
    #[must_use]
    pub fn root(&self) -> NodeId {
        self.root
    }

    fn alloc(&mut self, kind: NodeKind) -> NodeId {
        let node = NodeData {
            kind,
            parent: None,
            children: Vec::new(),
        };
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.node = Some(node);
            NodeId {
                index,
                generation: slot.generation,
            }
        } else {
            let index = u32::try_from(self.slots.len()).unwrap_or(u32::MAX);
            self.slots.push(Slot {
                generation: 0,
                node: Some(node),
            });
            NodeId {
                index,
                generation: 0,
            }
        }
    }

    fn data(&self, id: NodeId) -> Option<&NodeData> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_ref())
    }

    fn data_mut(&mut self, id: NodeId) -> Option<&mut NodeData> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_mut())
    }

    fn live(&self, id: NodeId) -> Result<&NodeData> {
        self.data(id).ok_or(Error::MalformedTarget { node: id })
    }

    /// Create a detached element.
    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.alloc(NodeKind::Element(ElementData {
            tag: tag.to_ascii_lowercase(),
            attributes: BTreeMap::new(),
            shadow_root: None,
        }))
    }

    /// Create a detached text node.
    pub fn create_text(&mut self, data: impl Into<String>) -> NodeId {
        self.alloc(NodeKind::Text(data.into()))
    }

    /// Attach an encapsulated region to `host` and return its root.
    ///
    /// Returns the existing root when the host already has one.
    ///
    /// # Errors
    ///
    /// Returns an error if `host` is not a live element.
    pub fn attach_shadow(&mut self, host: NodeId) -> Result<NodeId> {
        match &self.live(host)?.kind {
            NodeKind::Element(el) => {
                if let Some(existing) = el.shadow_root {
                    return Ok(existing);
                }
            }
            _ => return Err(Error::MalformedTarget { node: host }),
        }
        let shadow = self.alloc(NodeKind::ShadowRoot { host });
        if let Some(NodeData {
            kind: NodeKind::Element(el),
            ..
        }) = self.data_mut(host)
        {
            el.shadow_root = Some(shadow);
        }
        Ok(shadow)
    }

    /// Append `child` as the last child of `parent`.
    ///
    /// A child that is attached elsewhere is removed from its old parent first.
    ///
    /// # Errors
    ///
    /// Returns an error if either node is dead or the insertion would create a cycle.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        self.live(parent)?;
        self.live(child)?;
        if child == self.root || self.contains(child, parent) {
            return Err(Error::MalformedTarget { node: child });
        }
        if let Some(old_parent) = self.parent(child) {
            self.remove_child(old_parent, child)?;
        }
        if let Some(data) = self.data_mut(parent) {
            data.children.push(child);
        }
        if let Some(data) = self.data_mut(child) {
            data.parent = Some(parent);
        }
        self.record(parent, ChangeEvent::added(parent, child));
        Ok(())
    }

    /// Insert `child` under `parent` immediately before `reference`.
    ///
    /// # Errors
    ///
    /// Returns an error if a node is dead, `reference` is not a child of
    /// `parent`, or the insertion would create a cycle.
    pub fn insert_before(&mut self, parent: NodeId, child: NodeId, reference: NodeId) -> Result<()> {
        self.live(child)?;
        if child == self.root || self.contains(child, parent) || child == reference {
            return Err(Error::MalformedTarget { node: child });
        }
        if !self.live(parent)?.children.contains(&reference) {
            return Err(Error::MalformedTarget { node: reference });
        }
        if let Some(old_parent) = self.parent(child) {
            self.remove_child(old_parent, child)?;
        }
        if let Some(data) = self.data_mut(parent) {
            let position = data
                .children
                .iter()
                .position(|c| *c == reference)
                .unwrap_or(data.children.len());
            data.children.insert(position, child);
        }
        if let Some(data) = self.data_mut(child) {
            data.parent = Some(parent);
        }
        self.record(parent, ChangeEvent::added(parent, child));
        Ok(())
    }

    /// Detach `child` from `parent`.
    ///
    /// # Errors
    ///
    /// Returns an error if either node is dead or `child` is not a child of `parent`.
    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        let position = self
            .live(parent)?
            .children
            .iter()
            .position(|c| *c == child)
            .ok_or(Error::MalformedTarget { node: child })?;
        // Record before detaching so the region is resolved through the parent.
        self.record(parent, ChangeEvent::removed(parent, child));
        if let Some(region) = self.region_of(parent) {
            if let Some(obs) = self.observations.iter_mut().find(|o| o.region == region) {
                obs.transient.push(child);
            }
        }
        if let Some(data) = self.data_mut(parent) {
            data.children.remove(position);
        }
        if let Some(data) = self.data_mut(child) {
            data.parent = None;
        }
        Ok(())
    }

    /// Detach `node` from wherever it is attached. No-op for detached nodes.
    ///
    /// # Errors
    ///
    /// Returns an error if the node is dead.
    pub fn remove(&mut self, node: NodeId) -> Result<()> {
        match self.live(node)?.parent {
            Some(parent) => self.remove_child(parent, node),
            None => Ok(()),
        }
    }

    /// Replace the data of a text node.
    ///
    /// # Errors
    ///
    /// Returns an error if `node` is not a live text node.
    pub fn set_text(&mut self, node: NodeId, data: impl Into<String>) -> Result<()> {
        let data = data.into();
        let old = match self.data_mut(node).map(|d| &mut d.kind) {
            Some(NodeKind::Text(current)) => std::mem::replace(current, data),
            _ => return Err(Error::MalformedTarget { node }),
        };
        self.record(node, ChangeEvent::text_changed(node, old));
        Ok(())
    }

    /// Replace the text of `node`.
    ///
    /// Text nodes are updated in place, as are elements whose only child is a
    /// text node. Other elements have their children replaced by one text node.
    ///
    /// # Errors
    ///
    /// Returns an error if `node` is dead.
    pub fn set_text_content(&mut self, node: NodeId, text: &str) -> Result<()> {
        let data = self.live(node)?;
        if matches!(data.kind, NodeKind::Text(_)) {
            return self.set_text(node, text);
        }
        let children = data.children.clone();
        if let [only] = children.as_slice() {
            if self.is_text(*only) {
                return self.set_text(*only, text);
            }
        }
        for child in children {
            self.remove_child(node, child)?;
        }
        let text_node = self.create_text(text);
        self.append_child(node, text_node)
    }

    /// Set an attribute on an element. Attribute changes are not recorded.
    ///
    /// # Errors
    ///
    /// Returns an error if `node` is not a live element.
    pub fn set_attribute(&mut self, node: NodeId, name: &str, value: impl Into<String>) -> Result<()> {
        match self.data_mut(node).map(|d| &mut d.kind) {
            Some(NodeKind::Element(el)) => {
                el.attributes
                    .insert(name.to_ascii_lowercase(), value.into());
                Ok(())
            }
            _ => Err(Error::MalformedTarget { node }),
        }
    }

    // === Queries ===

    /// Whether `id` still refers to a node (attached or not).
    #[must_use]
    pub fn is_alive(&self, id: NodeId) -> bool {
        self.data(id).is_some()
    }

    /// Whether `id` is reachable from the document root, through shadow hosts if needed.
    #[must_use]
    pub fn is_attached(&self, id: NodeId) -> bool {
        let mut current = id;
        loop {
            let Some(data) = self.data(current) else {
                return false;
            };
            match (&data.kind, data.parent) {
                (_, Some(parent)) => current = parent,
                (NodeKind::Document, None) => return current == self.root,
                (NodeKind::ShadowRoot { host }, None) => current = *host,
                _ => return false,
            }
        }
    }

    /// The node's kind, if it is alive.
    #[must_use]
    pub fn kind(&self, id: NodeId) -> Option<&NodeKind> {
        self.data(id).map(|d| &d.kind)
    }

    /// The node's parent, if any.
    #[must_use]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.data(id).and_then(|d| d.parent)
    }

    /// The node's children in order. Empty for dead nodes.
    #[must_use]
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.data(id)
            .map_or(&[] as &[NodeId], |d| d.children.as_slice())
    }

    /// Lowercased tag name for elements.
    #[must_use]
    pub fn tag(&self, id: NodeId) -> Option<&str> {
        match self.kind(id) {
            Some(NodeKind::Element(el)) => Some(el.tag.as_str()),
            _ => None,
        }
    }

    /// Attribute value for elements.
    #[must_use]
    pub fn attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        match self.kind(id) {
            Some(NodeKind::Element(el)) => el.attributes.get(name).map(String::as_str),
            _ => None,
        }
    }

    /// Whether the element's `class` attribute contains `class_name`.
    #[must_use]
    pub fn has_class(&self, id: NodeId, class_name: &str) -> bool {
        self.attribute(id, "class")
            .is_some_and(|classes| classes.split_whitespace().any(|c| c == class_name))
    }

    /// Data of a text node.
    #[must_use]
    pub fn text(&self, id: NodeId) -> Option<&str> {
        match self.kind(id) {
            Some(NodeKind::Text(data)) => Some(data.as_str()),
            _ => None,
        }
    }

    /// Whether `id` is a live text node.
    #[must_use]
    pub fn is_text(&self, id: NodeId) -> bool {
        matches!(self.kind(id), Some(NodeKind::Text(_)))
    }

    /// The encapsulated region hosted by an element.
    #[must_use]
    pub fn shadow_root(&self, id: NodeId) -> Option<NodeId> {
        match self.kind(id) {
            Some(NodeKind::Element(el)) => el.shadow_root,
            _ => None,
        }
    }

    /// The closest element ancestor of `id`.
    #[must_use]
    pub fn parent_element(&self, id: NodeId) -> Option<NodeId> {
        self.parent(id)
            .filter(|p| matches!(self.kind(*p), Some(NodeKind::Element(_))))
    }

    /// Concatenated text of all descendant text nodes, not crossing region boundaries.
    #[must_use]
    pub fn text_content(&self, id: NodeId) -> String {
        if let Some(data) = self.text(id) {
            return data.to_string();
        }
        self.descendants(id)
            .into_iter()
            .filter_map(|n| self.text(n))
            .collect()
    }

    /// Preorder descendants of `id` (excluding `id`), not crossing region boundaries.
    #[must_use]
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
        while let Some(node) = stack.pop() {
            out.push(node);
            stack.extend(self.children(node).iter().rev());
        }
        out
    }

    /// Whether `node` is `ancestor` or lies beneath it.
    #[must_use]
    pub fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(n) = current {
            if n == ancestor {
                return true;
            }
            current = self.parent(n);
        }
        false
    }

    /// The top of `id`'s parent chain: the document, a shadow root or a detached subtree root.
    #[must_use]
    pub fn region_of(&self, id: NodeId) -> Option<NodeId> {
        let mut current = id;
        self.data(current)?;
        while let Some(parent) = self.parent(current) {
            current = parent;
        }
        Some(current)
    }

    /// Find an attached element by its `id` attribute, searching shadow regions too.
    #[must_use]
    pub fn element_by_id(&self, element_id: &str) -> Option<NodeId> {
        let mut regions = vec![self.root];
        while let Some(region) = regions.pop() {
            for node in self.descendants(region) {
                if self.attribute(node, "id") == Some(element_id) {
                    return Some(node);
                }
                if let Some(shadow) = self.shadow_root(node) {
                    regions.push(shadow);
                }
            }
        }
        None
    }

    /// Free every node that is no longer reachable from the document root.
    ///
    /// Returns the number of freed nodes. Handles to them stop being alive.
    pub fn collect_garbage(&mut self) -> usize {
        let mut reachable = HashSet::new();
        let mut stack = vec![self.root];
        while let Some(node) = stack.pop() {
            if !reachable.insert(node) {
                continue;
            }
            stack.extend(self.children(node));
            if let Some(shadow) = self.shadow_root(node) {
                stack.push(shadow);
            }
        }

        let mut freed = 0;
        for (index, slot) in self.slots.iter_mut().enumerate() {
            let Some(_) = slot.node else { continue };
            let id = NodeId {
                index: u32::try_from(index).unwrap_or(u32::MAX),
                generation: slot.generation,
            };
            if !reachable.contains(&id) {
                slot.node = None;
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(id.index);
                freed += 1;
            }
        }
        for obs in &mut self.observations {
            obs.transient.retain(|n| reachable.contains(n));
        }
        trace!(freed, "Collected detached nodes");
        freed
    }

    /// Number of live nodes, attached or not.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.slots.iter().filter(|s| s.node.is_some()).count()
    }

    // === Change recording ===

    /// Start recording changes for `region` (the document root or a shadow root).
    ///
    /// Returns `false` if the region is already observed.
    pub fn observe(&mut self, region: NodeId) -> bool {
        if self.is_observed(region) {
            return false;
        }
        self.observations.push(Observation {
            region,
            records: Vec::new(),
            transient: Vec::new(),
        });
        true
    }

    /// Whether changes in `region` are being recorded.
    #[must_use]
    pub fn is_observed(&self, region: NodeId) -> bool {
        self.observations.iter().any(|o| o.region == region)
    }

    /// Stop recording for `region`, discarding its queue. Take the records first to keep them.
    pub fn disconnect(&mut self, region: NodeId) {
        self.observations.retain(|o| o.region != region);
    }

    /// Drain the queued records of one region.
    pub fn take_records(&mut self, region: NodeId) -> Vec<ChangeEvent> {
        self.observations
            .iter_mut()
            .find(|o| o.region == region)
            .map(|o| {
                o.transient.clear();
                std::mem::take(&mut o.records)
            })
            .unwrap_or_default()
    }

    /// Drain the queued records of every region, in registration order.
    pub fn take_all_records(&mut self) -> Vec<ChangeEvent> {
        let mut out = Vec::new();
        for obs in &mut self.observations {
            obs.transient.clear();
            out.append(&mut obs.records);
        }
        out
    }

    /// Whether any region has queued records.
    #[must_use]
    pub fn has_pending_records(&self) -> bool {
        self.observations.iter().any(|o| !o.records.is_empty())
    }

    fn record(&mut self, anchor: NodeId, event: ChangeEvent) {
        let Some(top) = self.region_of(anchor) else {
            return;
        };
        if let Some(obs) = self
            .observations
            .iter_mut()
            .find(|o| o.region == top || o.transient.contains(&top))
        {
            trace!(kind = ?event.kind, target = %event.target, "Recorded change");
            obs.records.push(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paragraph(doc: &mut Document, text: &str) -> (NodeId, NodeId) {
        let p = doc.create_element("P");
        let t = doc.create_text(text);
        doc.append_child(p, t).unwrap();
        doc.append_child(doc.root(), p).unwrap();
        (p, t)
    }

    #[test]
    fn test_create_and_append() {
        let mut doc = Document::new();
        let (p, t) = paragraph(&mut doc, "hello");

        assert_eq!(doc.tag(p), Some("p"));
        assert_eq!(doc.text(t), Some("hello"));
        assert_eq!(doc.parent(t), Some(p));
        assert_eq!(doc.text_content(doc.root()), "hello");
        assert!(doc.is_attached(t));
    }

    #[test]
    fn test_unobserved_changes_are_not_recorded() {
        let mut doc = Document::new();
        paragraph(&mut doc, "hello");
        assert!(!doc.has_pending_records());
        assert!(doc.take_all_records().is_empty());
    }

    #[test]
    fn test_observed_changes_are_recorded_in_order() {
        let mut doc = Document::new();
        let root = doc.root();
        assert!(doc.observe(root));
        assert!(!doc.observe(root));

        let (p, t) = paragraph(&mut doc, "one");
        doc.set_text(t, "two").unwrap();
        doc.remove(p).unwrap();

        let records = doc.take_records(root);
        assert_eq!(records.len(), 4);
        assert_eq!(records[0], ChangeEvent::added(p, t));
        assert_eq!(records[1], ChangeEvent::added(root, p));
        assert_eq!(records[2], ChangeEvent::text_changed(t, "one"));
        assert_eq!(records[3], ChangeEvent::removed(root, p));
        assert!(doc.take_records(root).is_empty());
    }

    #[test]
    fn test_changes_in_removed_subtree_reach_region_until_taken() {
        let mut doc = Document::new();
        let root = doc.root();
        let (p, t) = paragraph(&mut doc, "caption");
        doc.observe(root);

        doc.remove(p).unwrap();
        doc.set_text(t, "edited").unwrap();
        let records = doc.take_records(root);
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].kind, ChangeKind::TextChanged);

        doc.set_text(t, "again").unwrap();
        assert!(doc.take_records(root).is_empty());
    }

    #[test]
    fn test_shadow_region_is_separate() {
        let mut doc = Document::new();
        let root = doc.root();
        let host = doc.create_element("div");
        doc.append_child(root, host).unwrap();
        let shadow = doc.attach_shadow(host).unwrap();
        assert_eq!(doc.attach_shadow(host).unwrap(), shadow);

        doc.observe(root);
        let t = doc.create_text("inside");
        doc.append_child(shadow, t).unwrap();
        assert!(doc.take_records(root).is_empty());
        assert!(doc.is_attached(t));
        assert_eq!(doc.region_of(t), Some(shadow));
        assert_eq!(doc.text_content(host), "");

        doc.observe(shadow);
        doc.set_text(t, "changed").unwrap();
        assert_eq!(doc.take_records(shadow).len(), 1);
    }

    #[test]
    fn test_collect_garbage_invalidates_handles() {
        let mut doc = Document::new();
        let (p, t) = paragraph(&mut doc, "bye");
        doc.remove(p).unwrap();
        assert!(doc.is_alive(t));
        assert!(!doc.is_attached(t));

        assert_eq!(doc.collect_garbage(), 2);
        assert!(!doc.is_alive(p));
        assert!(!doc.is_alive(t));
        assert!(matches!(
            doc.set_text(t, "x"),
            Err(Error::MalformedTarget { .. })
        ));

        // Slot reuse does not resurrect the stale handle.
        let fresh = doc.create_text("new");
        assert!(doc.is_alive(fresh));
        assert!(!doc.is_alive(t));
    }

    #[test]
    fn test_set_text_content_in_place_for_single_text_child() {
        let mut doc = Document::new();
        let root = doc.root();
        let (p, t) = paragraph(&mut doc, "old");
        doc.observe(root);

        doc.set_text_content(p, "new").unwrap();
        assert_eq!(doc.text(t), Some("new"));
        let records = doc.take_records(root);
        assert_eq!(records, vec![ChangeEvent::text_changed(t, "old")]);
    }

    #[test]
    fn test_insert_before() {
        let mut doc = Document::new();
        let root = doc.root();
        let (p, _) = paragraph(&mut doc, "second");
        let first = doc.create_element("h1");
        doc.observe(root);

        doc.insert_before(root, first, p).unwrap();
        assert_eq!(doc.children(root), &[first, p]);
        assert_eq!(doc.take_records(root), vec![ChangeEvent::added(root, first)]);

        let stray = doc.create_element("span");
        assert!(doc.insert_before(first, stray, p).is_err());
    }

    #[test]
    fn test_append_rejects_cycles() {
        let mut doc = Document::new();
        let (p, t) = paragraph(&mut doc, "x");
        assert!(doc.append_child(t, p).is_err());
        assert!(doc.append_child(p, doc.root()).is_err());
    }

    #[test]
    fn test_element_by_id_and_classes() {
        let mut doc = Document::new();
        let (p, _) = paragraph(&mut doc, "x");
        doc.set_attribute(p, "id", "intro").unwrap();
        doc.set_attribute(p, "class", "caption  current").unwrap();

        assert_eq!(doc.element_by_id("intro"), Some(p));
        assert!(doc.has_class(p, "current"));
        assert!(!doc.has_class(p, "cap"));
        assert_eq!(doc.element_by_id("missing"), None);
    }
}
