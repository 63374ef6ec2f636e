//! Recognizing caption elements tied to a playing media stream.
//!
//! Site heuristics live behind [`MediaSiteAdapter`]. [`SelectorAdapter`] is a
//! configurable implementation that matches caption elements by tag and
//! class and understands one auto-generated caption layout
//! (window, rows, text segments).

use tracing::trace;

use crate::config::{AudioConfig, AutoCaptionConfig};
use crate::document::{Document, NodeId, NodeKind};
use crate::error::{Error, Result};

/// A caption element's role: which media rule it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaRole {
    /// Index of the rule in the adapter's rule list.
    pub rule: usize,
}

/// A named caption rule and its unmute policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaRule {
    /// Name for logs and timelines.
    pub name: String,
    /// Allow unmuting when removed text is contained in the last muted text.
    pub simple_unmute: bool,
    tag: Option<String>,
    class: Option<String>,
    parent_class: Option<String>,
}

impl MediaRule {
    /// A rule matching elements by tag, class and parent class. `None` matches anything.
    #[must_use]
    pub fn new(
        name: &str,
        tag: Option<&str>,
        class: Option<&str>,
        parent_class: Option<&str>,
        simple_unmute: bool,
    ) -> Self {
        Self {
            name: name.to_string(),
            simple_unmute,
            tag: tag.map(str::to_ascii_lowercase),
            class: class.map(str::to_string),
            parent_class: parent_class.map(str::to_string),
        }
    }

    fn matches(&self, doc: &Document, element: NodeId) -> bool {
        self.tag.as_deref().map_or(true, |tag| doc.tag(element) == Some(tag))
            && self
                .class
                .as_deref()
                .map_or(true, |class| doc.has_class(element, class))
            && self.parent_class.as_deref().map_or(true, |class| {
                doc.parent_element(element)
                    .is_some_and(|parent| doc.has_class(parent, class))
            })
    }
}

/// Site-specific knowledge about caption elements.
pub trait MediaSiteAdapter {
    /// Classify `node`.
    ///
    /// `Ok(None)` means the node is not audio-relevant.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ClassificationUncertain`] when the role cannot be
    /// determined and [`Error::MalformedTarget`] for dead nodes.
    fn classify(&self, doc: &Document, node: NodeId) -> Result<Option<MediaRole>>;

    /// Whether the document currently shows an auto-generated caption stream.
    fn auto_captions_present(&self, doc: &Document) -> bool;

    /// Whether `node` is part of the auto-generated caption stream.
    fn is_auto_caption_node(&self, doc: &Document, node: NodeId) -> bool;

    /// Whether `node` belongs to the caption row currently being spoken.
    fn is_current_caption_row(&self, doc: &Document, node: NodeId) -> bool;

    /// Whether `node` is a caption text segment outside of any row.
    fn is_caption_text(&self, doc: &Document, node: NodeId) -> bool;

    /// The caption row containing `node`, if any.
    fn caption_row(&self, doc: &Document, node: NodeId) -> Option<NodeId>;

    /// Role assigned to auto-generated caption rows.
    fn auto_caption_role(&self) -> Option<MediaRole>;

    /// Rule at `index`.
    fn rule(&self, index: usize) -> Option<&MediaRule>;

    /// Whether the adapter recognizes anything at all.
    fn supports_page(&self) -> bool;
}

/// Matches caption elements by configured selectors.
#[derive(Debug, Clone, Default)]
pub struct SelectorAdapter {
    rules: Vec<MediaRule>,
    auto: Option<AutoCaptionConfig>,
    auto_rule: Option<usize>,
}

impl SelectorAdapter {
    /// An adapter with explicit rules and an optional auto-caption layout.
    #[must_use]
    pub fn new(mut rules: Vec<MediaRule>, auto: Option<AutoCaptionConfig>, simple_unmute: bool) -> Self {
        let auto_rule = auto.as_ref().map(|layout| {
            rules.push(MediaRule::new(
                "auto-captions",
                None,
                Some(&layout.row_class),
                None,
                simple_unmute,
            ));
            rules.len() - 1
        });
        Self {
            rules,
            auto,
            auto_rule,
        }
    }

    /// Build from the `audio` configuration section.
    #[must_use]
    pub fn from_config(config: &AudioConfig) -> Self {
        let rules = config
            .media_rules
            .iter()
            .map(|rule| {
                MediaRule::new(
                    &rule.name,
                    rule.tag.as_deref(),
                    rule.class.as_deref(),
                    rule.parent_class.as_deref(),
                    rule.simple_unmute.unwrap_or(config.simple_unmute),
                )
            })
            .collect();
        Self::new(rules, config.auto_captions.clone(), config.simple_unmute)
    }

    /// Closest ancestor-or-self element carrying `class`.
    fn closest_with_class(doc: &Document, node: NodeId, class: &str) -> Option<NodeId> {
        let mut current = Some(node);
        while let Some(n) = current {
            if doc.has_class(n, class) {
                return Some(n);
            }
            current = doc.parent(n);
        }
        None
    }

    fn container_of(&self, doc: &Document, node: NodeId) -> Option<NodeId> {
        let layout = self.auto.as_ref()?;
        Self::closest_with_class(doc, node, &layout.container_class)
    }
}

impl MediaSiteAdapter for SelectorAdapter {
    fn classify(&self, doc: &Document, node: NodeId) -> Result<Option<MediaRole>> {
        let element = match doc.kind(node) {
            None => return Err(Error::MalformedTarget { node }),
            Some(NodeKind::Element(_)) => node,
            Some(NodeKind::Text(_)) => doc
                .parent_element(node)
                .ok_or(Error::ClassificationUncertain { node })?,
            Some(_) => return Ok(None),
        };

        if let Some(index) = self
            .rules
            .iter()
            .enumerate()
            .filter(|(index, _)| Some(*index) != self.auto_rule)
            .find(|(_, rule)| rule.matches(doc, element))
            .map(|(index, _)| index)
        {
            trace!(%node, rule = %self.rules[index].name, "Caption node");
            return Ok(Some(MediaRole { rule: index }));
        }

        if self.caption_row(doc, element).is_some() {
            return Ok(self.auto_caption_role());
        }
        Ok(None)
    }

    fn auto_captions_present(&self, doc: &Document) -> bool {
        let Some(layout) = &self.auto else {
            return false;
        };
        doc.descendants(doc.root())
            .into_iter()
            .any(|n| doc.has_class(n, &layout.container_class))
    }

    fn is_auto_caption_node(&self, doc: &Document, node: NodeId) -> bool {
        self.container_of(doc, node).is_some()
            || self.auto.as_ref().is_some_and(|layout| {
                doc.descendants(node)
                    .into_iter()
                    .any(|n| doc.has_class(n, &layout.container_class))
            })
    }

    fn is_current_caption_row(&self, doc: &Document, node: NodeId) -> bool {
        let Some(layout) = &self.auto else {
            return false;
        };
        let Some(row) = self.caption_row(doc, node) else {
            return false;
        };
        let Some(container) = self.container_of(doc, row) else {
            return false;
        };
        doc.descendants(container)
            .into_iter()
            .filter(|n| doc.has_class(*n, &layout.row_class))
            .last()
            == Some(row)
    }

    fn is_caption_text(&self, doc: &Document, node: NodeId) -> bool {
        let Some(layout) = &self.auto else {
            return false;
        };
        if layout.text_class.is_empty() {
            return false;
        }
        Self::closest_with_class(doc, node, &layout.text_class).is_some()
            && self.caption_row(doc, node).is_none()
    }

    fn caption_row(&self, doc: &Document, node: NodeId) -> Option<NodeId> {
        let layout = self.auto.as_ref()?;
        let row = Self::closest_with_class(doc, node, &layout.row_class)?;
        self.container_of(doc, row).map(|_| row)
    }

    fn auto_caption_role(&self) -> Option<MediaRole> {
        self.auto_rule.map(|rule| MediaRole { rule })
    }

    fn rule(&self, index: usize) -> Option<&MediaRule> {
        self.rules.get(index)
    }

    fn supports_page(&self) -> bool {
        !self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MediaRuleConfig;

    fn adapter() -> SelectorAdapter {
        let config = AudioConfig {
            mute_audio: true,
            simple_unmute: true,
            media_rules: vec![MediaRuleConfig {
                name: "player".to_string(),
                tag: Some("div".to_string()),
                class: Some("caption-line".to_string()),
                parent_class: Some("player-captions".to_string()),
                simple_unmute: Some(false),
            }],
            auto_captions: Some(AutoCaptionConfig {
                container_class: "caption-window".to_string(),
                row_class: "caption-row".to_string(),
                text_class: "caption-segment".to_string(),
            }),
        };
        SelectorAdapter::from_config(&config)
    }

    fn document() -> Document {
        Document::from_json(
            r#"[
                { "tag": "div", "class": "player-captions", "children": [
                    { "tag": "div", "id": "line", "class": "caption-line", "text": "darn" }
                ] },
                { "tag": "div", "id": "window", "class": "caption-window", "children": [
                    { "tag": "span", "id": "old", "class": "caption-row", "children": [
                        { "tag": "span", "class": "caption-segment", "text": "old words" } ] },
                    { "tag": "span", "id": "now", "class": "caption-row", "children": [
                        { "tag": "span", "id": "seg", "class": "caption-segment", "text": "new words" } ] }
                ] },
                { "tag": "span", "id": "loose", "class": "caption-segment", "text": "stray" },
                { "tag": "p", "id": "para", "text": "body" }
            ]"#,
        )
        .unwrap()
    }

    #[test]
    fn test_classify_rules() {
        let doc = document();
        let adapter = adapter();
        let line = doc.element_by_id("line").unwrap();
        let text = doc.children(line)[0];

        assert_eq!(adapter.classify(&doc, line).unwrap(), Some(MediaRole { rule: 0 }));
        assert_eq!(adapter.classify(&doc, text).unwrap(), Some(MediaRole { rule: 0 }));
        assert_eq!(
            adapter.classify(&doc, doc.element_by_id("para").unwrap()).unwrap(),
            None
        );
        assert_eq!(
            adapter.classify(&doc, doc.element_by_id("seg").unwrap()).unwrap(),
            adapter.auto_caption_role()
        );
        assert!(!adapter.rule(0).unwrap().simple_unmute);
        assert!(adapter.rule(1).unwrap().simple_unmute);
    }

    #[test]
    fn test_classify_detached_text_is_uncertain() {
        let mut doc = document();
        let orphan = doc.create_text("darn");
        assert!(matches!(
            adapter().classify(&doc, orphan),
            Err(Error::ClassificationUncertain { .. })
        ));
    }

    #[test]
    fn test_auto_caption_rows() {
        let doc = document();
        let adapter = adapter();
        let old = doc.element_by_id("old").unwrap();
        let now = doc.element_by_id("now").unwrap();
        let seg = doc.element_by_id("seg").unwrap();

        assert!(adapter.auto_captions_present(&doc));
        assert!(adapter.is_auto_caption_node(&doc, old));
        assert!(adapter.is_auto_caption_node(&doc, doc.element_by_id("window").unwrap()));
        assert!(!adapter.is_auto_caption_node(&doc, doc.element_by_id("para").unwrap()));

        assert!(adapter.is_current_caption_row(&doc, now));
        assert!(adapter.is_current_caption_row(&doc, seg));
        assert!(!adapter.is_current_caption_row(&doc, old));
        assert_eq!(adapter.caption_row(&doc, seg), Some(now));
    }

    #[test]
    fn test_caption_text_outside_rows() {
        let doc = document();
        let adapter = adapter();
        assert!(adapter.is_caption_text(&doc, doc.element_by_id("loose").unwrap()));
        assert!(!adapter.is_caption_text(&doc, doc.element_by_id("seg").unwrap()));
    }

    #[test]
    fn test_default_adapter_supports_nothing() {
        let doc = document();
        let adapter = SelectorAdapter::default();
        assert!(!adapter.supports_page());
        assert!(!adapter.auto_captions_present(&doc));
        assert_eq!(adapter.classify(&doc, doc.root()).unwrap(), None);
    }
}
