//! Outbound notifications: session status and match telemetry.
//!
//! Reporting is fire-and-forget. A sink that fails logs and moves on; nothing
//! it does feeds back into filtering.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::filter::MatchStats;
use crate::storage::StatsStore;

/// Status notification sent once per session when the page is out of scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    /// Hostname the policy was resolved for.
    pub hostname: String,
    /// Whether filtering is disabled for this page.
    pub disabled: bool,
}

/// Matches of one word in one wordlist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WordCount {
    /// Wordlist the match was counted under.
    pub wordlist_id: u8,
    /// The configured word.
    pub word: String,
    /// Number of matches.
    pub count: u64,
}

/// Telemetry for a finished session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    /// Hostname the policy was resolved for.
    pub hostname: String,
    /// When the session started.
    pub started_at: DateTime<Utc>,
    /// Whether the page was out of scope.
    pub disabled: bool,
    /// How many times playback was muted.
    pub muted_spans: u32,
    /// Per-word match counts.
    pub matches: Vec<WordCount>,
}

impl SessionSummary {
    /// Summary with counts taken from session statistics.
    #[must_use]
    pub fn new(
        hostname: impl Into<String>,
        started_at: DateTime<Utc>,
        disabled: bool,
        muted_spans: u32,
        stats: &MatchStats,
    ) -> Self {
        Self {
            hostname: hostname.into(),
            started_at,
            disabled,
            muted_spans,
            matches: stats
                .iter()
                .map(|(wordlist_id, word, count)| WordCount {
                    wordlist_id,
                    word: word.to_string(),
                    count,
                })
                .collect(),
        }
    }

    /// Sum of all match counts.
    #[must_use]
    pub fn total_matches(&self) -> u64 {
        self.matches.iter().map(|m| m.count).sum()
    }
}

/// Receives session notifications.
pub trait ReportingSink {
    /// The page was found to be out of scope.
    fn status(&mut self, status: &SessionStatus);

    /// The session ended.
    fn statistics(&mut self, summary: &SessionSummary);
}

/// Sink that writes to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

impl ReportingSink for LogReporter {
    fn status(&mut self, status: &SessionStatus) {
        info!(hostname = %status.hostname, disabled = status.disabled, "session status");
    }

    fn statistics(&mut self, summary: &SessionSummary) {
        info!(
            hostname = %summary.hostname,
            matches = summary.total_matches(),
            words = summary.matches.len(),
            muted_spans = summary.muted_spans,
            "session statistics"
        );
    }
}

#[derive(Debug, Default)]
struct Received {
    statuses: Vec<SessionStatus>,
    summaries: Vec<SessionSummary>,
}

/// Sink that keeps everything it receives, readable through a shared handle.
#[derive(Debug, Clone, Default)]
pub struct MemoryReporter {
    inner: Arc<Mutex<Received>>,
}

impl MemoryReporter {
    /// An empty reporter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Received> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Status notifications received so far.
    #[must_use]
    pub fn statuses(&self) -> Vec<SessionStatus> {
        self.lock().statuses.clone()
    }

    /// Session summaries received so far.
    #[must_use]
    pub fn summaries(&self) -> Vec<SessionSummary> {
        self.lock().summaries.clone()
    }
}

impl ReportingSink for MemoryReporter {
    fn status(&mut self, status: &SessionStatus) {
        self.lock().statuses.push(status.clone());
    }

    fn statistics(&mut self, summary: &SessionSummary) {
        self.lock().summaries.push(summary.clone());
    }
}

/// Sink that persists summaries into a [`StatsStore`].
#[derive(Debug)]
pub struct StoreReporter {
    store: StatsStore,
    last_session: Option<i64>,
}

impl StoreReporter {
    /// Wrap an open store.
    #[must_use]
    pub fn new(store: StatsStore) -> Self {
        Self {
            store,
            last_session: None,
        }
    }

    /// Row id of the last persisted session.
    #[must_use]
    pub fn last_session(&self) -> Option<i64> {
        self.last_session
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &StatsStore {
        &self.store
    }
}

impl ReportingSink for StoreReporter {
    fn status(&mut self, status: &SessionStatus) {
        info!(hostname = %status.hostname, disabled = status.disabled, "session status");
    }

    fn statistics(&mut self, summary: &SessionSummary) {
        match self.store.record_session(summary) {
            Ok(id) => self.last_session = Some(id),
            Err(e) => warn!(error = %e, hostname = %summary.hostname, "failed to record session"),
        }
    }
}
