//! `SQLite` store for session telemetry.
//!
//! Each finished session is one row in `sessions`, with its per-word counts in
//! `match_counts`. The store is written by [`crate::report::StoreReporter`] and
//! read by `qpage stats`.

pub mod migrations;
pub mod schema;

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::report::{SessionSummary, WordCount};

/// Persistent session statistics.
#[derive(Debug)]
pub struct StatsStore {
    path: PathBuf,
    conn: Connection,
}

impl StatsStore {
    /// Open or create a store at `path`, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or database cannot be created, or
    /// the schema cannot be brought up to date.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        debug!("Opening statistics database at {}", path.display());
        let conn = Connection::open(&path).map_err(|source| Error::DatabaseOpen {
            path: path.clone(),
            source,
        })?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL; PRAGMA foreign_keys=ON;",
        )?;
        migrations::initialize_schema(&conn)?;

        info!("Statistics database ready at {}", path.display());
        Ok(Self { path, conn })
    }

    /// An in-memory store.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| Error::DatabaseOpen {
            path: PathBuf::from(":memory:"),
            source,
        })?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        migrations::initialize_schema(&conn)?;

        Ok(Self {
            path: PathBuf::from(":memory:"),
            conn,
        })
    }

    /// Path of the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persist a session and its match counts. Returns the session row id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails. Nothing is written
    /// in that case.
    pub fn record_session(&self, summary: &SessionSummary) -> Result<i64> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            r"
            INSERT INTO sessions (started_at, hostname, disabled, muted_spans)
            VALUES (?1, ?2, ?3, ?4)
            ",
            params![
                summary.started_at.to_rfc3339(),
                summary.hostname,
                summary.disabled,
                summary.muted_spans,
            ],
        )?;
        let id = tx.last_insert_rowid();
        insert_matches(&tx, id, &summary.matches)?;
        tx.commit()?;

        debug!(session = id, matches = summary.matches.len(), "recorded session");
        Ok(id)
    }

    /// Add match counts to an existing session. Counts for a word already
    /// recorded in that session are summed.
    ///
    /// # Errors
    ///
    /// Returns an error if the session does not exist or the database
    /// operation fails.
    pub fn record_matches(&self, session_id: i64, matches: &[WordCount]) -> Result<usize> {
        let exists: Option<i64> = self
            .conn
            .query_row("SELECT id FROM sessions WHERE id = ?1", [session_id], |row| {
                row.get(0)
            })
            .optional()?;
        if exists.is_none() {
            return Err(Error::internal(format!("no session with id {session_id}")));
        }

        let tx = self.conn.unchecked_transaction()?;
        let written = insert_matches(&tx, session_id, matches)?;
        tx.commit()?;
        Ok(written)
    }

    /// Per-word totals across all sessions, most frequent first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn word_totals(&self, limit: usize) -> Result<Vec<WordTotal>> {
        let mut stmt = self.conn.prepare(
            r"
            SELECT word, SUM(count) AS total, COUNT(DISTINCT session_id)
            FROM match_counts GROUP BY word
            ORDER BY total DESC, word ASC LIMIT ?1
            ",
        )?;

        let limit_i64 = i64::try_from(limit).unwrap_or(i64::MAX);
        let totals = stmt
            .query_map([limit_i64], |row| {
                Ok(WordTotal {
                    word: row.get(0)?,
                    count: row.get(1)?,
                    sessions: row.get(2)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(totals)
    }

    /// Most recent sessions, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn recent_sessions(&self, limit: usize) -> Result<Vec<SessionRecord>> {
        let mut stmt = self.conn.prepare(
            r"
            SELECT s.id, s.started_at, s.hostname, s.disabled, s.muted_spans,
                   COALESCE((SELECT SUM(count) FROM match_counts m WHERE m.session_id = s.id), 0)
            FROM sessions s ORDER BY s.started_at DESC, s.id DESC LIMIT ?1
            ",
        )?;

        let limit_i64 = i64::try_from(limit).unwrap_or(i64::MAX);
        let sessions = stmt
            .query_map([limit_i64], |row| {
                let started_at: String = row.get(1)?;
                Ok(SessionRecord {
                    id: row.get(0)?,
                    started_at: parse_timestamp(&started_at),
                    hostname: row.get(2)?,
                    disabled: row.get(3)?,
                    muted_spans: row.get(4)?,
                    total_matches: row.get(5)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(sessions)
    }

    /// Number of recorded sessions.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn session_count(&self) -> Result<i64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Aggregate statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn stats(&self) -> Result<StoreStats> {
        let (sessions, disabled_sessions, muted_spans, first, last): (
            i64,
            i64,
            i64,
            Option<String>,
            Option<String>,
        ) = self.conn.query_row(
            r"
            SELECT COUNT(*), COALESCE(SUM(disabled), 0), COALESCE(SUM(muted_spans), 0),
                   MIN(started_at), MAX(started_at)
            FROM sessions
            ",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
        )?;

        let total_matches: i64 = self.conn.query_row(
            "SELECT COALESCE(SUM(count), 0) FROM match_counts",
            [],
            |row| row.get(0),
        )?;

        let db_size_bytes = if self.path.to_string_lossy() == ":memory:" {
            0
        } else {
            std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
        };

        Ok(StoreStats {
            sessions,
            disabled_sessions,
            total_matches,
            muted_spans,
            first_session: first.as_deref().map(parse_timestamp),
            last_session: last.as_deref().map(parse_timestamp),
            db_size_bytes,
        })
    }
}

fn insert_matches(conn: &Connection, session_id: i64, matches: &[WordCount]) -> Result<usize> {
    let mut stmt = conn.prepare(
        r"
        INSERT INTO match_counts (session_id, wordlist_id, word, count)
        VALUES (?1, ?2, ?3, ?4)
        ON CONFLICT (session_id, wordlist_id, word) DO UPDATE SET count = count + excluded.count
        ",
    )?;
    for entry in matches {
        let count = i64::try_from(entry.count).unwrap_or(i64::MAX);
        stmt.execute(params![session_id, entry.wordlist_id, entry.word, count])?;
    }
    Ok(matches.len())
}

fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map_or(DateTime::<Utc>::UNIX_EPOCH, |dt| dt.with_timezone(&Utc))
}

/// Total matches of one word across sessions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WordTotal {
    /// The configured word.
    pub word: String,
    /// Matches across all sessions and wordlists.
    pub count: i64,
    /// Sessions the word matched in.
    pub sessions: i64,
}

/// A stored session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionRecord {
    /// Row id.
    pub id: i64,
    /// When the session started.
    pub started_at: DateTime<Utc>,
    /// Hostname the policy was resolved for.
    pub hostname: String,
    /// Whether the page was out of scope.
    pub disabled: bool,
    /// How many times playback was muted.
    pub muted_spans: i64,
    /// Sum of the session's match counts.
    pub total_matches: i64,
}

/// Aggregate statistics about the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    /// Recorded sessions.
    pub sessions: i64,
    /// Sessions on out-of-scope pages.
    pub disabled_sessions: i64,
    /// Matches across all sessions.
    pub total_matches: i64,
    /// Mutes across all sessions.
    pub muted_spans: i64,
    /// Start of the oldest session.
    pub first_session: Option<DateTime<Utc>>,
    /// Start of the newest session.
    pub last_session: Option<DateTime<Utc>>,
    /// Size of the database file in bytes.
    pub db_size_bytes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn create_test_store() -> StatsStore {
        StatsStore::open_in_memory().expect("failed to create test store")
    }

    fn word(word: &str, count: u64) -> WordCount {
        WordCount {
            wordlist_id: 0,
            word: word.to_string(),
            count,
        }
    }

    fn summary(hostname: &str, matches: Vec<WordCount>) -> SessionSummary {
        SessionSummary {
            hostname: hostname.to_string(),
            started_at: Utc::now(),
            disabled: false,
            muted_spans: 0,
            matches,
        }
    }

    #[test]
    fn test_open_in_memory() {
        let store = create_test_store();
        assert_eq!(store.session_count().unwrap(), 0);
        assert_eq!(store.path(), Path::new(":memory:"));
    }

    #[test]
    fn test_record_session() {
        let store = create_test_store();
        let id = store
            .record_session(&summary("a.com", vec![word("darn", 2), word("hell", 1)]))
            .unwrap();

        assert!(id > 0);
        assert_eq!(store.session_count().unwrap(), 1);
        let sessions = store.recent_sessions(10).unwrap();
        assert_eq!(sessions[0].hostname, "a.com");
        assert_eq!(sessions[0].total_matches, 3);
    }

    #[test]
    fn test_record_matches_sums_existing_words() {
        let store = create_test_store();
        let id = store
            .record_session(&summary("a.com", vec![word("darn", 2)]))
            .unwrap();

        let written = store
            .record_matches(id, &[word("darn", 3), word("crap", 1)])
            .unwrap();
        assert_eq!(written, 2);

        let totals = store.word_totals(10).unwrap();
        assert_eq!(totals[0].word, "darn");
        assert_eq!(totals[0].count, 5);
        assert_eq!(totals[1].word, "crap");
    }

    #[test]
    fn test_record_matches_unknown_session() {
        let store = create_test_store();
        assert!(store.record_matches(42, &[word("darn", 1)]).is_err());
    }

    #[test]
    fn test_word_totals_across_sessions() {
        let store = create_test_store();
        store
            .record_session(&summary("a.com", vec![word("darn", 1), word("hell", 4)]))
            .unwrap();
        store
            .record_session(&summary("b.com", vec![word("darn", 2)]))
            .unwrap();

        let totals = store.word_totals(1).unwrap();
        assert_eq!(totals.len(), 1);
        assert_eq!(totals[0].word, "hell");

        let totals = store.word_totals(10).unwrap();
        let darn = totals.iter().find(|t| t.word == "darn").unwrap();
        assert_eq!(darn.count, 3);
        assert_eq!(darn.sessions, 2);
    }

    #[test]
    fn test_recent_sessions_newest_first() {
        let store = create_test_store();
        let mut old = summary("old.com", vec![]);
        old.started_at = Utc::now() - Duration::hours(1);
        store.record_session(&old).unwrap();
        store.record_session(&summary("new.com", vec![])).unwrap();

        let sessions = store.recent_sessions(10).unwrap();
        assert_eq!(sessions[0].hostname, "new.com");
        assert_eq!(sessions[1].hostname, "old.com");
    }

    #[test]
    fn test_stats_empty() {
        let stats = create_test_store().stats().unwrap();
        assert_eq!(stats.sessions, 0);
        assert_eq!(stats.total_matches, 0);
        assert!(stats.first_session.is_none());
    }

    #[test]
    fn test_stats_with_data() {
        let store = create_test_store();
        let mut disabled = summary("off.com", vec![]);
        disabled.disabled = true;
        store.record_session(&disabled).unwrap();
        let mut muted = summary("video.com", vec![word("darn", 2)]);
        muted.muted_spans = 3;
        store.record_session(&muted).unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.sessions, 2);
        assert_eq!(stats.disabled_sessions, 1);
        assert_eq!(stats.muted_spans, 3);
        assert_eq!(stats.total_matches, 2);
        assert!(stats.first_session <= stats.last_session);
    }

    #[test]
    fn test_open_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("stats.db");

        {
            let store = StatsStore::open(&path).unwrap();
            store
                .record_session(&summary("a.com", vec![word("darn", 1)]))
                .unwrap();
        }

        let store = StatsStore::open(&path).unwrap();
        assert_eq!(store.session_count().unwrap(), 1);
        assert!(store.stats().unwrap().db_size_bytes > 0);
    }
}
