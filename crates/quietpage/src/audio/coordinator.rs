//! The mute/unmute state machine.
//!
//! The coordinator keeps every caption node that currently holds the stream
//! muted. Playback is muted exactly while that set is non-empty: entries are
//! dropped when their node leaves the document or when their text stops
//! matching. The simple-unmute heuristic only widens which entries get
//! re-checked. Transitions
//! are reconciled once at the end of each operation so a release followed by
//! a fresh match inside the same operation never flickers the audio.

use tracing::{debug, trace};

use super::state::{ActiveMute, MuteState, MuteStatus, PlaybackControl};
use crate::document::{Document, NodeId};
use crate::error::Error;
use crate::filter::TextFilterEngine;
use crate::media::{MediaRole, MediaSiteAdapter};

/// Borrowed session pieces the coordinator reads from.
#[allow(missing_debug_implementations)]
pub struct AudioContext<'a> {
    /// The observed document. Caption text is never rewritten here.
    pub doc: &'a Document,
    /// Engine holding the audio wordlist.
    pub engine: &'a mut TextFilterEngine,
    /// Site knowledge about caption elements.
    pub adapter: &'a dyn MediaSiteAdapter,
}

/// Where a node goes after the audio path had a look at it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioDecision {
    /// The node is audio-gated; leave its text alone.
    Handled,
    /// Not audio-relevant; send it through text filtering.
    FilterText,
    /// Neither path applies.
    Ignore,
}

/// Tracks mute state for one media stream.
pub struct AudioMuteCoordinator {
    state: MuteState,
    active: Vec<ActiveMute>,
    playback: Box<dyn PlaybackControl>,
    wordlist_id: u8,
    mutes: u32,
}

impl std::fmt::Debug for AudioMuteCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioMuteCoordinator")
            .field("state", &self.state)
            .field("active", &self.active)
            .field("wordlist_id", &self.wordlist_id)
            .field("mutes", &self.mutes)
            .finish_non_exhaustive()
    }
}

impl AudioMuteCoordinator {
    /// A coordinator matching captions against `wordlist_id`.
    #[must_use]
    pub fn new(wordlist_id: u8, playback: Box<dyn PlaybackControl>) -> Self {
        Self {
            state: MuteState::default(),
            active: Vec::new(),
            playback,
            wordlist_id,
            mutes: 0,
        }
    }

    /// Wordlist used for caption matching.
    #[must_use]
    pub fn wordlist_id(&self) -> u8 {
        self.wordlist_id
    }

    /// Current mute state.
    #[must_use]
    pub fn state(&self) -> &MuteState {
        &self.state
    }

    /// Whether playback is muted.
    #[must_use]
    pub fn is_muted(&self) -> bool {
        self.state.is_muted()
    }

    /// Number of times playback went from unmuted to muted.
    #[must_use]
    pub fn muted_spans(&self) -> u32 {
        self.mutes
    }

    /// Caption nodes currently holding the mute.
    #[must_use]
    pub fn active(&self) -> &[ActiveMute] {
        &self.active
    }

    /// Route a newly added node.
    ///
    /// When an auto-generated caption stream is on the page only its current
    /// row is evaluated for muting; historical rows go to text filtering and
    /// loose caption text is ignored. Otherwise the adapter's classification
    /// decides, and an uncertain classification falls back to text filtering.
    pub fn route_added(&mut self, ctx: &mut AudioContext<'_>, node: NodeId) -> AudioDecision {
        let decision = if ctx.adapter.auto_captions_present(ctx.doc)
            && ctx.adapter.is_auto_caption_node(ctx.doc, node)
        {
            if ctx.adapter.is_current_caption_row(ctx.doc, node) {
                self.evaluate_auto_row(ctx, node);
                AudioDecision::Handled
            } else {
                AudioDecision::FilterText
            }
        } else if ctx.adapter.is_caption_text(ctx.doc, node) {
            AudioDecision::Ignore
        } else {
            match ctx.adapter.classify(ctx.doc, node) {
                Ok(Some(role)) => {
                    self.evaluate(ctx, node, role);
                    AudioDecision::Handled
                }
                Ok(None) => AudioDecision::FilterText,
                Err(e) => {
                    debug!(%node, error = %e, "Falling back to text filtering");
                    AudioDecision::FilterText
                }
            }
        };
        self.settle(ctx);
        decision
    }

    /// Evaluate a caption node: mute if its text matches, release it if it no longer does.
    pub fn clean(&mut self, ctx: &mut AudioContext<'_>, node: NodeId, role: MediaRole) {
        self.evaluate(ctx, node, role);
        self.settle(ctx);
    }

    /// Evaluate the auto-caption row containing `node`.
    pub fn clean_auto_captions(&mut self, ctx: &mut AudioContext<'_>, node: NodeId) {
        self.evaluate_auto_row(ctx, node);
        self.settle(ctx);
    }

    /// A node was removed from `parent` while muted.
    ///
    /// Mutes held by the removed node, anything inside it, or the caption it
    /// was removed from are re-checked. Under simple-unmute, mutes whose text
    /// contains the removed text are re-checked too.
    pub fn on_node_removed(&mut self, ctx: &mut AudioContext<'_>, node: NodeId, parent: Option<NodeId>) {
        if !self.is_muted() {
            return;
        }
        let role = match ctx.adapter.classify(ctx.doc, node) {
            Ok(role) => role,
            Err(e) => {
                trace!(%node, error = %e, "Removed node has no caption role");
                None
            }
        };
        let rule = role.map_or(0, |r| r.rule);
        let simple_unmute = ctx.adapter.rule(rule).is_some_and(|r| r.simple_unmute);

        let doc = ctx.doc;
        let last = self.state.last_filtered_node;
        self.reverify(ctx, |entry| {
            entry.node == node
                || last == Some(node)
                || doc.contains(node, entry.node)
                || parent.is_some_and(|p| doc.contains(entry.node, p))
        });

        if simple_unmute {
            let removed = doc.text_content(node);
            self.release_by_text(ctx, &removed);
        }
        self.settle(ctx);
    }

    /// The data of text node `node` changed from `old_value`.
    pub fn on_text_changed(
        &mut self,
        ctx: &mut AudioContext<'_>,
        node: NodeId,
        old_value: Option<&str>,
    ) -> AudioDecision {
        let decision = match ctx.adapter.classify(ctx.doc, node) {
            Ok(Some(role)) => {
                let simple_unmute = ctx.adapter.rule(role.rule).is_some_and(|r| r.simple_unmute);
                if simple_unmute && self.is_muted() {
                    self.release_by_text(ctx, old_value.unwrap_or_default());
                }
                if Some(role) == ctx.adapter.auto_caption_role() {
                    if ctx.adapter.is_current_caption_row(ctx.doc, node) {
                        self.evaluate_auto_row(ctx, node);
                        AudioDecision::Handled
                    } else {
                        AudioDecision::FilterText
                    }
                } else {
                    self.evaluate(ctx, node, role);
                    AudioDecision::Handled
                }
            }
            Ok(None) => AudioDecision::FilterText,
            Err(Error::ClassificationUncertain { .. }) if ctx.doc.parent(node).is_none() => {
                // Detached caption text: its identity is gone, only its text is left.
                let simple_unmute = ctx.adapter.rule(0).is_some_and(|r| r.simple_unmute);
                if simple_unmute && self.is_muted() {
                    let text = ctx.doc.text_content(node);
                    self.release_by_text(ctx, &text);
                    AudioDecision::Handled
                } else {
                    AudioDecision::FilterText
                }
            }
            Err(Error::ClassificationUncertain { .. }) => {
                debug!(%node, "Falling back to text filtering");
                AudioDecision::FilterText
            }
            Err(e) => {
                debug!(%node, error = %e, "Dropping text change");
                AudioDecision::Ignore
            }
        };
        self.settle(ctx);
        decision
    }

    /// Unmute and forget everything. Used at session teardown.
    pub fn reset(&mut self) {
        if self.is_muted() {
            self.playback.unmute();
        }
        self.active.clear();
        self.state = MuteState::default();
    }

    fn evaluate(&mut self, ctx: &mut AudioContext<'_>, node: NodeId, role: MediaRole) {
        let text = ctx.doc.text_content(node);
        let matched = !text.trim().is_empty()
            && ctx
                .engine
                .filter_text_or_passthrough(&text, self.wordlist_id, true)
                .has_matches();
        if matched {
            self.track(node, role, text);
        } else {
            let doc = ctx.doc;
            self.reverify(ctx, |entry| {
                entry.node == node || doc.contains(node, entry.node) || doc.contains(entry.node, node)
            });
        }
    }

    fn evaluate_auto_row(&mut self, ctx: &mut AudioContext<'_>, node: NodeId) {
        let Some(role) = ctx.adapter.auto_caption_role() else {
            return;
        };
        let row = ctx.adapter.caption_row(ctx.doc, node).unwrap_or(node);
        self.evaluate(ctx, row, role);
    }

    fn track(&mut self, node: NodeId, role: MediaRole, text: String) {
        trace!(%node, rule = role.rule, "Caption matched");
        self.active.retain(|entry| entry.node != node);
        self.active.push(ActiveMute {
            node,
            rule: role.rule,
            text: text.clone(),
        });
        self.state.last_filtered_text = text;
        self.state.last_filtered_node = Some(node);
    }

    // Touched entries survive only if their node is attached and still matches.
    fn reverify(&mut self, ctx: &mut AudioContext<'_>, touched: impl Fn(&ActiveMute) -> bool) {
        let wordlist_id = self.wordlist_id;
        self.active.retain(|entry| {
            if !touched(entry) {
                return true;
            }
            let keep = ctx.doc.is_attached(entry.node)
                && ctx
                    .engine
                    .filter_text_or_passthrough(&ctx.doc.text_content(entry.node), wordlist_id, false)
                    .has_matches();
            if !keep {
                debug!(node = %entry.node, "Released caption mute");
            }
            keep
        });
    }

    // Simple unmute: mutes whose caption text contains `text` are re-checked
    // even when their node was not touched. Captions still on screen and
    // still matching keep the stream muted.
    fn release_by_text(&mut self, ctx: &mut AudioContext<'_>, text: &str) {
        if text.trim().is_empty() || !self.state.last_filtered_text.contains(text) {
            return;
        }
        trace!(text, "Re-checking mutes by text");
        self.reverify(ctx, |entry| entry.text.contains(text));
    }

    fn settle(&mut self, ctx: &AudioContext<'_>) {
        let auto_rule = ctx.adapter.auto_caption_role().map(|r| r.rule);
        self.active.retain(|entry| {
            ctx.doc.is_attached(entry.node)
                && (Some(entry.rule) != auto_rule
                    || ctx.adapter.is_current_caption_row(ctx.doc, entry.node))
        });

        match (self.active.last(), self.state.status) {
            (None, MuteStatus::Muted { .. }) => {
                self.playback.unmute();
                self.state.status = MuteStatus::Unmuted;
                debug!("Unmuted playback");
            }
            (Some(entry), MuteStatus::Unmuted) => {
                let reason = ctx
                    .adapter
                    .rule(entry.rule)
                    .map_or_else(|| format!("rule {}", entry.rule), |r| r.name.clone());
                self.playback.mute(&reason);
                self.mutes += 1;
                self.state.status = MuteStatus::Muted { rule: entry.rule };
                debug!(node = %entry.node, %reason, "Muted playback");
            }
            (Some(entry), MuteStatus::Muted { .. }) => {
                self.state.status = MuteStatus::Muted { rule: entry.rule };
            }
            (None, MuteStatus::Unmuted) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{RecordingPlayback, Timeline};
    use crate::config::AutoCaptionConfig;
    use crate::media::{MediaRule, SelectorAdapter};
    use crate::wordlist::{MatchMethod, Replacement, Wordlist, WordlistRegistry, WordlistRule};

    struct Rig {
        doc: Document,
        engine: TextFilterEngine,
        adapter: SelectorAdapter,
        coordinator: AudioMuteCoordinator,
        timeline: Timeline,
    }

    impl Rig {
        fn new(simple_unmute: bool) -> Self {
            let mut registry = WordlistRegistry::new();
            registry.register(Wordlist::with_rules(
                2,
                vec![WordlistRule::new("darn", MatchMethod::Exact, Replacement::default(), false).unwrap()],
            ));
            let playback = RecordingPlayback::new();
            let timeline = playback.timeline();
            let adapter = SelectorAdapter::new(
                vec![MediaRule::new("captions", None, Some("caption"), None, simple_unmute)],
                Some(AutoCaptionConfig {
                    container_class: "window".to_string(),
                    row_class: "row".to_string(),
                    text_class: "segment".to_string(),
                }),
                simple_unmute,
            );
            Self {
                doc: Document::new(),
                engine: TextFilterEngine::new(registry),
                adapter,
                coordinator: AudioMuteCoordinator::new(2, Box::new(playback)),
                timeline,
            }
        }

        fn caption(&mut self, parent: NodeId, text: &str) -> NodeId {
            let el = self.doc.create_element("div");
            self.doc.set_attribute(el, "class", "caption").unwrap();
            let t = self.doc.create_text(text);
            self.doc.append_child(el, t).unwrap();
            self.doc.append_child(parent, el).unwrap();
            el
        }

        fn added(&mut self, node: NodeId) -> AudioDecision {
            let Self {
                doc,
                engine,
                adapter,
                coordinator,
                ..
            } = self;
            coordinator.route_added(
                &mut AudioContext {
                    doc,
                    engine,
                    adapter,
                },
                node,
            )
        }

        fn removed(&mut self, node: NodeId) {
            let parent = self.doc.parent(node);
            self.doc.remove(node).unwrap();
            let Self {
                doc,
                engine,
                adapter,
                coordinator,
                ..
            } = self;
            coordinator.on_node_removed(
                &mut AudioContext {
                    doc,
                    engine,
                    adapter,
                },
                node,
                parent,
            );
        }

        fn text_changed(&mut self, node: NodeId, text: &str) -> AudioDecision {
            let old = self.doc.text(node).map(str::to_string);
            self.doc.set_text(node, text).unwrap();
            let Self {
                doc,
                engine,
                adapter,
                coordinator,
                ..
            } = self;
            coordinator.on_text_changed(
                &mut AudioContext {
                    doc,
                    engine,
                    adapter,
                },
                node,
                old.as_deref(),
            )
        }
    }

    #[test]
    fn test_matching_caption_mutes_and_removal_unmutes() {
        let mut rig = Rig::new(true);
        let root = rig.doc.root();
        let caption = rig.caption(root, "well darn");

        assert_eq!(rig.added(caption), AudioDecision::Handled);
        assert!(rig.coordinator.is_muted());
        assert_eq!(rig.coordinator.state().status, MuteStatus::Muted { rule: 0 });
        assert_eq!(rig.coordinator.state().last_filtered_text, "well darn");
        assert_eq!(rig.coordinator.state().last_filtered_node, Some(caption));
        assert_eq!(rig.engine.stats().count(2, "darn"), 1);

        rig.removed(caption);
        assert!(!rig.coordinator.is_muted());
        assert_eq!(rig.timeline.muted_spans(), 1);
        assert!(!rig.timeline.is_muted());
    }

    #[test]
    fn test_clean_caption_does_not_mute() {
        let mut rig = Rig::new(true);
        let root = rig.doc.root();
        let caption = rig.caption(root, "all good");
        assert_eq!(rig.added(caption), AudioDecision::Handled);
        assert!(!rig.coordinator.is_muted());
        assert!(rig.timeline.events().is_empty());
    }

    #[test]
    fn test_non_caption_routes_to_text() {
        let mut rig = Rig::new(true);
        let p = rig.doc.create_element("p");
        let root = rig.doc.root();
        rig.doc.append_child(root, p).unwrap();
        assert_eq!(rig.added(p), AudioDecision::FilterText);
        assert!(!rig.coordinator.is_muted());
    }

    #[test]
    fn test_overlapping_captions_do_not_unmute_early() {
        let mut rig = Rig::new(true);
        let root = rig.doc.root();
        let first = rig.caption(root, "darn one");
        let second = rig.caption(root, "darn two");
        rig.added(first);
        rig.added(second);
        assert_eq!(rig.coordinator.active().len(), 2);

        rig.removed(first);
        assert!(rig.coordinator.is_muted());
        assert_eq!(rig.timeline.muted_spans(), 1);

        rig.removed(second);
        assert!(!rig.coordinator.is_muted());
        assert_eq!(rig.coordinator.muted_spans(), 1);
    }

    #[test]
    fn test_text_change_clearing_match_unmutes() {
        let mut rig = Rig::new(false);
        let root = rig.doc.root();
        let caption = rig.caption(root, "darn");
        rig.added(caption);
        assert!(rig.coordinator.is_muted());

        let text = rig.doc.children(caption)[0];
        assert_eq!(rig.text_changed(text, "darn again"), AudioDecision::Handled);
        assert!(rig.coordinator.is_muted());
        assert_eq!(rig.timeline.events().len(), 1);

        rig.text_changed(text, "fine now");
        assert!(!rig.coordinator.is_muted());
    }

    #[test]
    fn test_simple_unmute_on_detached_text() {
        let mut rig = Rig::new(true);
        let root = rig.doc.root();
        let caption = rig.caption(root, "oh darn");
        rig.added(caption);

        // The site pulls the text out of the caption without a removal we see,
        // then rewrites the detached node.
        let text = rig.doc.children(caption)[0];
        rig.doc.remove(text).unwrap();
        assert!(rig.coordinator.is_muted());
        assert_eq!(rig.text_changed(text, "darn"), AudioDecision::Handled);
        assert!(!rig.coordinator.is_muted());
    }

    #[test]
    fn test_simple_unmute_keeps_captions_still_on_screen() {
        let mut rig = Rig::new(true);
        let root = rig.doc.root();
        let short = rig.caption(root, "darn");
        let long = rig.caption(root, "oh darn");
        rig.added(short);
        rig.added(long);
        assert_eq!(rig.coordinator.active().len(), 2);

        rig.removed(short);
        assert!(rig.doc.is_attached(long));
        assert!(rig.coordinator.is_muted());
        assert_eq!(rig.coordinator.active().len(), 1);
        assert_eq!(rig.coordinator.active()[0].node, long);

        // A stray detached copy of the text on screen does not release it either.
        let copy = rig.doc.create_text("scratch");
        rig.text_changed(copy, "oh darn");
        assert!(rig.coordinator.is_muted());
        assert_eq!(rig.timeline.muted_spans(), 1);

        rig.removed(long);
        assert!(!rig.coordinator.is_muted());
    }

    #[test]
    fn test_simple_unmute_disabled_keeps_detached_text_out() {
        let mut rig = Rig::new(false);
        let root = rig.doc.root();
        let caption = rig.caption(root, "oh darn");
        rig.added(caption);

        let copy = rig.doc.create_text("scratch");
        assert_eq!(rig.text_changed(copy, "oh darn"), AudioDecision::FilterText);
        assert!(rig.coordinator.is_muted());
    }

    #[test]
    fn test_auto_caption_current_row_only() {
        let mut rig = Rig::new(true);
        let root = rig.doc.root();
        let window = rig.doc.create_element("div");
        rig.doc.set_attribute(window, "class", "window").unwrap();
        rig.doc.append_child(root, window).unwrap();

        let row = |rig: &mut Rig, text: &str| {
            let row = rig.doc.create_element("span");
            rig.doc.set_attribute(row, "class", "row").unwrap();
            let t = rig.doc.create_text(text);
            rig.doc.append_child(row, t).unwrap();
            rig.doc.append_child(window, row).unwrap();
            row
        };

        let historical = row(&mut rig, "darn it");
        let current = row(&mut rig, "nice weather");
        assert_eq!(rig.added(historical), AudioDecision::FilterText);
        assert!(!rig.coordinator.is_muted());
        assert_eq!(rig.added(current), AudioDecision::Handled);
        assert!(!rig.coordinator.is_muted());

        let newest = row(&mut rig, "darn it");
        assert_eq!(rig.added(newest), AudioDecision::Handled);
        assert!(rig.coordinator.is_muted());

        // The row scrolls into history once a new row starts.
        let next = row(&mut rig, "moving on");
        rig.added(next);
        assert!(!rig.coordinator.is_muted());
    }

    #[test]
    fn test_reset_unmutes() {
        let mut rig = Rig::new(true);
        let root = rig.doc.root();
        let caption = rig.caption(root, "darn");
        rig.added(caption);
        rig.coordinator.reset();
        assert!(!rig.coordinator.is_muted());
        assert!(rig.coordinator.active().is_empty());
        assert!(!rig.timeline.is_muted());
    }
}
