//! The page session.
//!
//! A [`FilterOrchestrator`] owns everything one page needs: the document, the
//! filtering engine, the watcher, the optional mute coordinator and the
//! collaborators that decide policy, classify media and receive reports.
//! Nothing is global; each page gets its own orchestrator.
//!
//! ```text
//! Uninitialized -> Resolving -> Disabled
//!                            -> Active -> Unloaded
//! ```

use std::fmt;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::audio::{AudioMuteCoordinator, PlaybackControl, RecordingPlayback};
use crate::config::Config;
use crate::document::script::{apply_batch, Edit};
use crate::document::{Document, NodeId};
use crate::error::Error;
use crate::filter::{discover_regions, filter_node, MatchStats, NodeFilter, TextFilterEngine};
use crate::forbidden::{DefaultForbidden, ForbiddenPredicate};
use crate::media::{MediaSiteAdapter, SelectorAdapter};
use crate::policy::{ConfigPolicyResolver, DomainPolicyResolver, FrameContext};
use crate::report::{LogReporter, ReportingSink, SessionStatus, SessionSummary};
use crate::watcher::{BatchReport, FilterMode, MutationWatcher, WatchContext};
use crate::wordlist::{Wordlist, WordlistRegistry};

/// Delivery rounds per [`FilterOrchestrator::deliver`]. The engine's own
/// writes are observed too; one extra round settles them.
const MAX_DELIVERY_ROUNDS: usize = 8;

/// Lifecycle of a page session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created, not started.
    Uninitialized,
    /// Policy is being resolved.
    Resolving,
    /// The page is out of scope. Nothing is filtered.
    Disabled,
    /// Filtering and watching.
    Active,
    /// Torn down.
    Unloaded,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "uninitialized"),
            Self::Resolving => write!(f, "resolving"),
            Self::Disabled => write!(f, "disabled"),
            Self::Active => write!(f, "active"),
            Self::Unloaded => write!(f, "unloaded"),
        }
    }
}

/// Drives filtering for one page.
pub struct FilterOrchestrator {
    config: Config,
    doc: Document,
    engine: TextFilterEngine,
    watcher: MutationWatcher,
    audio: Option<AudioMuteCoordinator>,
    playback: Option<Box<dyn PlaybackControl>>,
    resolver: Box<dyn DomainPolicyResolver>,
    adapter: Box<dyn MediaSiteAdapter>,
    forbidden: Box<dyn ForbiddenPredicate>,
    reporter: Box<dyn ReportingSink>,
    state: SessionState,
    mode: FilterMode,
    hostname: String,
    started_at: DateTime<Utc>,
    passes: usize,
    totals: BatchReport,
}

impl fmt::Debug for FilterOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterOrchestrator")
            .field("state", &self.state)
            .field("hostname", &self.hostname)
            .field("mode", &self.mode)
            .field("regions", &self.watcher.regions().len())
            .field("audio", &self.audio)
            .field("passes", &self.passes)
            .finish_non_exhaustive()
    }
}

impl FilterOrchestrator {
    /// A session over `doc` with collaborators built from `config`.
    #[must_use]
    pub fn new(config: Config, doc: Document) -> Self {
        let resolver = ConfigPolicyResolver::from_config(&config);
        let adapter = SelectorAdapter::from_config(&config.audio);
        Self {
            config,
            doc,
            engine: TextFilterEngine::new(WordlistRegistry::new()),
            watcher: MutationWatcher::new(),
            audio: None,
            playback: None,
            resolver: Box::new(resolver),
            adapter: Box::new(adapter),
            forbidden: Box::new(DefaultForbidden::default()),
            reporter: Box::new(LogReporter),
            state: SessionState::Uninitialized,
            mode: FilterMode::default(),
            hostname: String::new(),
            started_at: Utc::now(),
            passes: 0,
            totals: BatchReport::default(),
        }
    }

    /// Use a different policy resolver.
    #[must_use]
    pub fn with_resolver(mut self, resolver: impl DomainPolicyResolver + 'static) -> Self {
        self.resolver = Box::new(resolver);
        self
    }

    /// Use a different media adapter.
    #[must_use]
    pub fn with_adapter(mut self, adapter: impl MediaSiteAdapter + 'static) -> Self {
        self.adapter = Box::new(adapter);
        self
    }

    /// Use a different forbidden-node predicate.
    #[must_use]
    pub fn with_forbidden(mut self, forbidden: impl ForbiddenPredicate + 'static) -> Self {
        self.forbidden = Box::new(forbidden);
        self
    }

    /// Send notifications to `reporter`.
    #[must_use]
    pub fn with_reporter(mut self, reporter: impl ReportingSink + 'static) -> Self {
        self.reporter = Box::new(reporter);
        self
    }

    /// Drive `playback` when mute tracking is enabled. Defaults to a
    /// [`RecordingPlayback`].
    #[must_use]
    pub fn with_playback(mut self, playback: impl PlaybackControl + 'static) -> Self {
        self.playback = Some(Box::new(playback));
        self
    }

    /// Resolve policy for a framed document and start.
    pub fn start_framed(&mut self, frame: &FrameContext) -> SessionStatus {
        let hostname = frame.effective_hostname();
        self.start(&hostname)
    }

    /// Resolve policy for `hostname`, sweep the document once and start
    /// watching it.
    ///
    /// A disabled page gets exactly one status notification and no
    /// filtering at all.
    pub fn start(&mut self, hostname: &str) -> SessionStatus {
        if self.state != SessionState::Uninitialized {
            warn!(state = %self.state, "Session already started");
            return self.status();
        }
        self.state = SessionState::Resolving;
        self.hostname = hostname.to_string();
        self.started_at = Utc::now();

        let policy = self.resolver.resolve(hostname);
        debug!(hostname, ?policy, "Resolved policy");
        if !policy.enabled {
            self.state = SessionState::Disabled;
            let status = self.status();
            self.reporter.status(&status);
            info!(hostname, "Filtering disabled for page");
            return status;
        }

        self.mode = FilterMode {
            wordlist_id: policy.wordlist_id,
            advanced: policy.advanced_mode,
            audio_only: self.config.filter.audio_only,
        };
        self.register_wordlist(policy.wordlist_id);

        if self.config.audio.mute_audio && self.adapter.supports_page() {
            let audio_id = if self.config.filter.wordlists_enabled {
                policy.audio_wordlist_id
            } else {
                policy.wordlist_id
            };
            if audio_id != policy.wordlist_id {
                self.register_wordlist(audio_id);
            }
            let playback = self
                .playback
                .take()
                .unwrap_or_else(|| Box::new(RecordingPlayback::new()) as Box<dyn PlaybackControl>);
            self.audio = Some(AudioMuteCoordinator::new(audio_id, playback));
            debug!(wordlist = audio_id, "Mute tracking enabled");
        }

        self.state = SessionState::Active;
        let regions = self.sweep();
        let root = self.doc.root();
        let mut report = BatchReport::default();
        self.with_context(|watcher, ctx| {
            watcher.observe(ctx.doc, root);
            watcher.register_regions(ctx, regions, &mut report);
        });
        self.totals.merge(&report);

        info!(
            hostname,
            regions = self.watcher.regions().len(),
            modified = self.totals.modified,
            muting = self.audio.is_some(),
            "Session active"
        );
        self.status()
    }

    // One synchronous pass over the whole document. Returns the encapsulated
    // regions it found.
    fn sweep(&mut self) -> Vec<NodeId> {
        self.passes += 1;
        let root = self.doc.root();
        if self.mode.audio_only {
            return discover_regions(&self.doc, self.forbidden.as_ref(), root);
        }

        let mut filter = NodeFilter {
            doc: &mut self.doc,
            engine: &mut self.engine,
            forbidden: self.forbidden.as_ref(),
            advanced: self.mode.advanced,
        };
        match filter_node(&mut filter, root, self.mode.wordlist_id, true) {
            Ok(sweep) => {
                self.totals.modified += sweep.modified;
                sweep.regions
            }
            Err(e) => {
                warn!(error = %e, "Initial sweep skipped");
                discover_regions(&self.doc, self.forbidden.as_ref(), root)
            }
        }
    }

    fn register_wordlist(&mut self, id: u8) {
        match Wordlist::from_config(&self.config, id) {
            Ok(wordlist) => {
                debug!(id, rules = wordlist.len(), "Registered wordlist");
                self.engine.registry_mut().register(wordlist);
            }
            Err(e) => warn!(id, error = %e, "Wordlist unavailable; text passes will not match"),
        }
    }

    fn with_context<R>(
        &mut self,
        f: impl FnOnce(&mut MutationWatcher, &mut WatchContext<'_>) -> R,
    ) -> R {
        let mut ctx = WatchContext {
            doc: &mut self.doc,
            engine: &mut self.engine,
            audio: self.audio.as_mut(),
            adapter: self.adapter.as_ref(),
            forbidden: self.forbidden.as_ref(),
            mode: self.mode,
        };
        f(&mut self.watcher, &mut ctx)
    }

    /// Process everything the page changed since the last call.
    ///
    /// Batches keep being delivered while the engine's own writes leave
    /// records behind. Does nothing unless the session is active.
    pub fn deliver(&mut self) -> BatchReport {
        let mut total = BatchReport::default();
        if self.state != SessionState::Active {
            return total;
        }

        for _ in 0..MAX_DELIVERY_ROUNDS {
            if !self.doc.has_pending_records() {
                break;
            }
            self.passes += 1;
            let report = self.with_context(|watcher, ctx| watcher.deliver(ctx));
            total.merge(&report);
        }

        if self.doc.has_pending_records() {
            debug!("Records still pending after delivery rounds");
        } else {
            let freed = self.doc.collect_garbage();
            trace!(freed, "Collected detached nodes");
        }
        self.totals.merge(&total);
        total
    }

    /// Apply edit batches from `rx` as they arrive, delivering after each,
    /// until the sender is dropped.
    pub async fn run(&mut self, mut rx: mpsc::Receiver<Vec<Edit>>) -> BatchReport {
        let mut total = BatchReport::default();
        while let Some(batch) = rx.recv().await {
            let applied = apply_batch(&mut self.doc, &batch);
            trace!(applied, edits = batch.len(), "Applied edit batch");
            total.merge(&self.deliver());
            tokio::task::yield_now().await;
        }
        total
    }

    /// Tear the session down: drain and detach every watcher, restore
    /// playback, release the wordlists and report statistics.
    ///
    /// Returns `None` if the session was already unloaded.
    pub fn unload(&mut self) -> Option<SessionSummary> {
        if self.state == SessionState::Unloaded {
            return None;
        }

        if self.state == SessionState::Active {
            let report = self.with_context(|watcher, ctx| watcher.stop_all(ctx));
            self.totals.merge(&report);
        }
        if let Some(audio) = self.audio.as_mut() {
            audio.reset();
        }
        self.engine.release();

        let summary = SessionSummary::new(
            self.hostname.clone(),
            self.started_at,
            self.state == SessionState::Disabled,
            self.muted_spans(),
            self.engine.stats(),
        );
        self.reporter.statistics(&summary);
        self.state = SessionState::Unloaded;
        info!(hostname = %self.hostname, matches = summary.total_matches(), "Session unloaded");
        Some(summary)
    }

    /// Status for the current policy.
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            hostname: self.hostname.clone(),
            disabled: self.state == SessionState::Disabled,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Resolved filtering mode.
    #[must_use]
    pub fn mode(&self) -> FilterMode {
        self.mode
    }

    /// The observed document.
    #[must_use]
    pub fn document(&self) -> &Document {
        &self.doc
    }

    /// The observed document, for page edits. Changes are picked up on the
    /// next [`deliver`](Self::deliver).
    pub fn document_mut(&mut self) -> &mut Document {
        &mut self.doc
    }

    /// Session match statistics.
    #[must_use]
    pub fn stats(&self) -> &MatchStats {
        self.engine.stats()
    }

    /// The mute coordinator, when mute tracking is enabled.
    #[must_use]
    pub fn audio(&self) -> Option<&AudioMuteCoordinator> {
        self.audio.as_ref()
    }

    /// Whether playback is muted right now.
    #[must_use]
    pub fn is_muted(&self) -> bool {
        self.audio.as_ref().is_some_and(AudioMuteCoordinator::is_muted)
    }

    /// Number of mutes so far.
    #[must_use]
    pub fn muted_spans(&self) -> u32 {
        self.audio.as_ref().map_or(0, AudioMuteCoordinator::muted_spans)
    }

    /// Whether `region` is being watched.
    #[must_use]
    pub fn is_watching(&self, region: NodeId) -> bool {
        self.watcher.is_observing(region)
    }

    /// Number of watched regions.
    #[must_use]
    pub fn watched_regions(&self) -> usize {
        self.watcher.regions().len()
    }

    /// Filtering passes run: the initial sweep plus each delivered batch.
    #[must_use]
    pub fn passes(&self) -> usize {
        self.passes
    }

    /// Everything processed so far.
    #[must_use]
    pub fn totals(&self) -> &BatchReport {
        &self.totals
    }

    /// Filter a standalone string with the session's text wordlist.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WordlistMissing`] before the session is active.
    pub fn filter_text(&mut self, text: &str) -> crate::Result<String> {
        if self.state != SessionState::Active {
            return Err(Error::WordlistMissing {
                id: self.mode.wordlist_id,
            });
        }
        Ok(self
            .engine
            .filter_text(text, self.mode.wordlist_id, false)?
            .filtered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AutoCaptionConfig, DomainConfig, MediaRuleConfig};
    use crate::document::fixture::NodeSpec;
    use crate::report::MemoryReporter;

    fn page() -> Document {
        Document::from_json(
            r#"[
                { "tag": "p", "id": "intro", "text": "well darn it" },
                { "tag": "div", "id": "host", "shadow": [
                    { "tag": "span", "text": "shadow darn" }
                ] }
            ]"#,
        )
        .unwrap()
    }

    fn captions_config() -> Config {
        let mut config = Config::default();
        config.audio.mute_audio = true;
        config.audio.media_rules.push(MediaRuleConfig {
            name: "player".to_string(),
            tag: None,
            class: Some("caption".to_string()),
            parent_class: None,
            simple_unmute: None,
        });
        config
    }

    #[test]
    fn test_start_sweeps_and_watches() {
        crate::logging::init_test_logging();
        let mut session = FilterOrchestrator::new(Config::default(), page());
        let status = session.start("example.com");

        assert!(!status.disabled);
        assert_eq!(session.state(), SessionState::Active);
        let doc = session.document();
        let intro = doc.element_by_id("intro").unwrap();
        assert_eq!(doc.text_content(intro), "well **** it");
        assert!(session.is_watching(doc.root()));
        assert_eq!(session.watched_regions(), 2);
        assert_eq!(session.stats().count(0, "darn"), 2);
    }

    #[test]
    fn test_disabled_domain_does_nothing() {
        let mut config = Config::default();
        config.domains.insert(
            "example.com".to_string(),
            DomainConfig {
                disabled: true,
                ..DomainConfig::default()
            },
        );
        let reporter = MemoryReporter::new();
        let mut session = FilterOrchestrator::new(config, page()).with_reporter(reporter.clone());

        let status = session.start("www.example.com");
        assert!(status.disabled);
        assert_eq!(session.state(), SessionState::Disabled);
        assert_eq!(session.passes(), 0);
        assert_eq!(session.watched_regions(), 0);

        let intro = session.document().element_by_id("intro").unwrap();
        session.document_mut().set_text_content(intro, "darn again").unwrap();
        assert_eq!(session.deliver(), BatchReport::default());
        assert_eq!(session.passes(), 0);

        assert_eq!(reporter.statuses().len(), 1);
        assert!(reporter.statuses()[0].disabled);
    }

    #[test]
    fn test_start_twice_is_ignored() {
        let mut session = FilterOrchestrator::new(Config::default(), page());
        session.start("example.com");
        let passes = session.passes();
        session.start("example.com");
        assert_eq!(session.passes(), passes);
    }

    #[test]
    fn test_deliver_settles_own_writes() {
        let mut session = FilterOrchestrator::new(Config::default(), page());
        session.start("example.com");

        let root = session.document().root();
        let spec = NodeSpec {
            tag: Some("p".to_string()),
            text: Some("oh darn".to_string()),
            ..NodeSpec::default()
        };
        let doc = session.document_mut();
        let node = spec.build(doc).unwrap();
        doc.append_child(root, node).unwrap();

        let report = session.deliver();
        assert_eq!(report.modified, 1);
        assert!(!session.document().has_pending_records());
        assert_eq!(session.document().text_content(node), "oh ****");
    }

    #[test]
    fn test_audio_only_leaves_text() {
        let mut config = captions_config();
        config.filter.audio_only = true;
        let mut session = FilterOrchestrator::new(config, page());
        session.start("example.com");

        let intro = session.document().element_by_id("intro").unwrap();
        assert_eq!(session.document().text_content(intro), "well darn it");
        assert_eq!(session.watched_regions(), 2);
    }

    #[test]
    fn test_caption_mutes_and_unload_restores() {
        let playback = RecordingPlayback::new();
        let timeline = playback.timeline();
        let reporter = MemoryReporter::new();
        let mut session = FilterOrchestrator::new(captions_config(), page())
            .with_playback(playback)
            .with_reporter(reporter.clone());
        session.start("video.com");

        let root = session.document().root();
        let spec = NodeSpec {
            tag: Some("div".to_string()),
            class: Some("caption".to_string()),
            text: Some("what the darn".to_string()),
            ..NodeSpec::default()
        };
        let doc = session.document_mut();
        let caption = spec.build(doc).unwrap();
        doc.append_child(root, caption).unwrap();
        session.deliver();

        assert!(session.is_muted());
        assert!(timeline.is_muted());

        let summary = session.unload().unwrap();
        assert!(!timeline.is_muted());
        assert_eq!(summary.muted_spans, 1);
        assert_eq!(reporter.summaries().len(), 1);
        assert!(session.unload().is_none());
    }

    #[test]
    fn test_separate_audio_wordlist_registered() {
        let mut config = captions_config();
        config.filter.audio_wordlist_id = 2;
        config.audio.auto_captions = Some(AutoCaptionConfig {
            container_class: "window".to_string(),
            row_class: "row".to_string(),
            text_class: "segment".to_string(),
        });
        let mut session = FilterOrchestrator::new(config, page());
        session.start("example.com");

        assert_eq!(session.audio().map(AudioMuteCoordinator::wordlist_id), Some(2));
        assert_eq!(session.engine.registry().ids(), vec![0, 2]);
    }

    #[test]
    fn test_filter_text_requires_active() {
        let mut session = FilterOrchestrator::new(Config::default(), Document::new());
        assert!(session.filter_text("darn").is_err());
        session.start("example.com");
        assert_eq!(session.filter_text("darn").unwrap(), "****");
    }

    #[test]
    fn test_unload_releases_wordlists() {
        let mut session = FilterOrchestrator::new(Config::default(), page());
        session.start("example.com");
        let summary = session.unload().unwrap();

        assert_eq!(session.state(), SessionState::Unloaded);
        assert!(session.engine.registry().is_empty());
        assert_eq!(session.watched_regions(), 0);
        assert_eq!(summary.total_matches(), 2);
    }

    #[tokio::test]
    async fn test_run_applies_batches() {
        let mut session = FilterOrchestrator::new(Config::default(), page());
        session.start("example.com");

        let (tx, rx) = mpsc::channel(4);
        tx.send(vec![Edit::SetText {
            target: "intro".to_string(),
            text: "darn darn".to_string(),
        }])
        .await
        .unwrap();
        drop(tx);

        let report = session.run(rx).await;
        assert_eq!(report.modified, 1);
        let intro = session.document().element_by_id("intro").unwrap();
        assert_eq!(session.document().text_content(intro), "**** ****");
    }
}
