//! Change-batch dispatch.
//!
//! The [`MutationWatcher`] owns the set of observed regions (the document
//! root plus every encapsulated region discovered while filtering) and turns
//! each batch of [`ChangeEvent`]s into text filtering or audio decisions.
//!
//! Within a batch, added nodes are handled first, then removals (only while
//! muted), then direct text changes, each text leaf at most once. Every event
//! is handled independently: a stale or malformed event is dropped and the
//! rest of the batch continues.

use std::collections::HashSet;

use serde::Serialize;
use tracing::{debug, trace, warn};

use crate::audio::{AudioContext, AudioDecision, AudioMuteCoordinator};
use crate::document::{ChangeEvent, ChangeKind, Document, NodeId};
use crate::error::Error;
use crate::filter::{discover_regions, filter_node, NodeFilter, TextFilterEngine};
use crate::forbidden::ForbiddenPredicate;
use crate::media::MediaSiteAdapter;

/// Resolved filtering settings for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FilterMode {
    /// Wordlist for visible text.
    pub wordlist_id: u8,
    /// Match across adjacent text nodes.
    pub advanced: bool,
    /// Never rewrite visible text.
    pub audio_only: bool,
}

/// Borrowed session pieces a batch needs.
#[allow(missing_debug_implementations)]
pub struct WatchContext<'a> {
    /// The observed document.
    pub doc: &'a mut Document,
    /// Engine holding the session wordlists.
    pub engine: &'a mut TextFilterEngine,
    /// Present when the page is in mute-tracking mode.
    pub audio: Option<&'a mut AudioMuteCoordinator>,
    /// Site knowledge about caption elements.
    pub adapter: &'a dyn MediaSiteAdapter,
    /// Nodes to leave alone.
    pub forbidden: &'a dyn ForbiddenPredicate,
    /// Resolved settings.
    pub mode: FilterMode,
}

/// What processing one batch did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    /// Events in the batch.
    pub events: usize,
    /// Added nodes handled.
    pub added: usize,
    /// Removed nodes evaluated for unmuting.
    pub removed: usize,
    /// Text leaves handled through the direct text-change path.
    pub text_changed: usize,
    /// Events dropped because their target was dead or invalid.
    pub dropped: usize,
    /// Text nodes and attributes rewritten.
    pub modified: usize,
    /// Encapsulated regions registered during the batch.
    pub regions_registered: usize,
}

impl BatchReport {
    /// Fold another report into this one.
    pub fn merge(&mut self, other: &BatchReport) {
        self.events += other.events;
        self.added += other.added;
        self.removed += other.removed;
        self.text_changed += other.text_changed;
        self.dropped += other.dropped;
        self.modified += other.modified;
        self.regions_registered += other.regions_registered;
    }
}

/// Observes regions and dispatches their change batches.
#[derive(Debug, Default)]
pub struct MutationWatcher {
    regions: Vec<NodeId>,
}

impl MutationWatcher {
    /// A watcher observing nothing yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start observing `region`. Returns `false` if it is already observed.
    pub fn observe(&mut self, doc: &mut Document, region: NodeId) -> bool {
        if self.regions.contains(&region) || !doc.observe(region) {
            return false;
        }
        debug!(%region, "Observing region");
        self.regions.push(region);
        true
    }

    /// Whether `region` is observed by this watcher.
    #[must_use]
    pub fn is_observing(&self, region: NodeId) -> bool {
        self.regions.contains(&region)
    }

    /// Observed regions in registration order.
    #[must_use]
    pub fn regions(&self) -> &[NodeId] {
        &self.regions
    }

    /// Process everything queued for every observed region as one batch.
    pub fn deliver(&mut self, ctx: &mut WatchContext<'_>) -> BatchReport {
        let events = ctx.doc.take_all_records();
        if events.is_empty() {
            return BatchReport::default();
        }
        self.process_batch(ctx, &events)
    }

    /// Drain and process `region`'s queued events, then stop observing it.
    pub fn stop(&mut self, ctx: &mut WatchContext<'_>, region: NodeId) -> BatchReport {
        let events = ctx.doc.take_records(region);
        let report = self.process_batch(ctx, &events);
        ctx.doc.disconnect(region);
        self.regions.retain(|r| *r != region);
        debug!(%region, drained = events.len(), "Stopped observing region");
        report
    }

    /// Stop every region, draining each first.
    pub fn stop_all(&mut self, ctx: &mut WatchContext<'_>) -> BatchReport {
        let mut report = BatchReport::default();
        // Draining can register further regions; keep going until none are left.
        while let Some(region) = self.regions.first().copied() {
            report.merge(&self.stop(ctx, region));
        }
        report
    }

    /// Dispatch one batch.
    pub fn process_batch(&mut self, ctx: &mut WatchContext<'_>, events: &[ChangeEvent]) -> BatchReport {
        let mut report = BatchReport {
            events: events.len(),
            ..BatchReport::default()
        };

        // Leaves already reached through an added subtree; the direct text
        // path must not see them again.
        let mut seen = HashSet::new();
        for event in events.iter().filter(|e| e.kind == ChangeKind::NodeAdded) {
            let node = event.target;
            if !ctx.doc.is_alive(node) {
                drop_event(&mut report, &Error::MalformedTarget { node });
                continue;
            }
            if ctx.forbidden.is_forbidden(ctx.doc, node) {
                trace!(%node, "Skipping forbidden node");
                continue;
            }
            report.added += 1;
            let regions = route(ctx, node, &mut report);
            self.register_regions(ctx, regions, &mut report);
            seen.insert(node);
            seen.extend(ctx.doc.descendants(node));
        }

        let muted = ctx.audio.as_deref().is_some_and(AudioMuteCoordinator::is_muted);
        if muted {
            for event in events.iter().filter(|e| e.kind == ChangeKind::NodeRemoved) {
                let node = event.target;
                if !ctx.doc.is_alive(node) {
                    drop_event(&mut report, &Error::MalformedTarget { node });
                    continue;
                }
                if let Some(audio) = ctx.audio.as_deref_mut() {
                    report.removed += 1;
                    audio.on_node_removed(
                        &mut AudioContext {
                            doc: &*ctx.doc,
                            engine: &mut *ctx.engine,
                            adapter: ctx.adapter,
                        },
                        node,
                        event.parent,
                    );
                }
            }
        }

        for event in events.iter().filter(|e| e.kind == ChangeKind::TextChanged) {
            let node = event.target;
            if !seen.insert(node) {
                continue;
            }
            if !ctx.doc.is_text(node) {
                drop_event(&mut report, &Error::MalformedTarget { node });
                continue;
            }
            if ctx.forbidden.is_forbidden(ctx.doc, node) {
                continue;
            }
            report.text_changed += 1;
            let decision = match ctx.audio.as_deref_mut() {
                Some(audio) => audio.on_text_changed(
                    &mut AudioContext {
                        doc: &*ctx.doc,
                        engine: &mut *ctx.engine,
                        adapter: ctx.adapter,
                    },
                    node,
                    event.old_value.as_deref(),
                ),
                None => AudioDecision::FilterText,
            };
            if decision == AudioDecision::FilterText && !ctx.mode.audio_only {
                report.modified += filter_text_path(ctx, node).0;
            }
        }

        if report.modified > 0 || report.dropped > 0 {
            debug!(?report, "Processed batch");
        }
        report
    }

    /// Observe each newly discovered region once and give it an initial pass.
    /// Regions found inside those are handled the same way.
    pub fn register_regions(
        &mut self,
        ctx: &mut WatchContext<'_>,
        mut pending: Vec<NodeId>,
        report: &mut BatchReport,
    ) {
        while let Some(region) = pending.pop() {
            if !ctx.doc.is_alive(region) || !self.observe(ctx.doc, region) {
                continue;
            }
            report.regions_registered += 1;
            pending.extend(route(ctx, region, report));
        }
    }
}

fn drop_event(report: &mut BatchReport, error: &Error) {
    debug!(error = %error, "Dropping change event");
    report.dropped += 1;
}

// Audio path first when mute tracking, text path otherwise. Returns the
// encapsulated regions found under `node`.
fn route(ctx: &mut WatchContext<'_>, node: NodeId, report: &mut BatchReport) -> Vec<NodeId> {
    let decision = match ctx.audio.as_deref_mut() {
        Some(audio) => audio.route_added(
            &mut AudioContext {
                doc: &*ctx.doc,
                engine: &mut *ctx.engine,
                adapter: ctx.adapter,
            },
            node,
        ),
        None => AudioDecision::FilterText,
    };
    if decision == AudioDecision::FilterText && !ctx.mode.audio_only {
        let (modified, regions) = filter_text_path(ctx, node);
        report.modified += modified;
        regions
    } else {
        discover_regions(ctx.doc, ctx.forbidden, node)
    }
}

fn filter_text_path(ctx: &mut WatchContext<'_>, node: NodeId) -> (usize, Vec<NodeId>) {
    let mut filter = NodeFilter {
        doc: &mut *ctx.doc,
        engine: &mut *ctx.engine,
        forbidden: ctx.forbidden,
        advanced: ctx.mode.advanced,
    };
    match filter_node(&mut filter, node, ctx.mode.wordlist_id, true) {
        Ok(sweep) => (sweep.modified, sweep.regions),
        Err(e @ Error::WordlistMissing { .. }) => {
            warn!(error = %e, "Text pass skipped");
            (0, Vec::new())
        }
        Err(e) => {
            debug!(%node, error = %e, "Text pass failed");
            (0, Vec::new())
        }
    }
}
