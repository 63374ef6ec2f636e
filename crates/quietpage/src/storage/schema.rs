//! `SQLite` schema for the statistics store.

/// One row per finished page session.
pub const CREATE_SESSIONS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS sessions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    hostname TEXT NOT NULL,
    disabled INTEGER NOT NULL DEFAULT 0,
    muted_spans INTEGER NOT NULL DEFAULT 0
)
";

/// Per-word match counts of a session.
pub const CREATE_MATCH_COUNTS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS match_counts (
    session_id INTEGER NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
    wordlist_id INTEGER NOT NULL,
    word TEXT NOT NULL,
    count INTEGER NOT NULL,
    PRIMARY KEY (session_id, wordlist_id, word)
)
";

/// Sessions are listed newest first.
pub const CREATE_STARTED_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_sessions_started ON sessions(started_at DESC)
";

/// Word totals group by word.
pub const CREATE_WORD_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_match_counts_word ON match_counts(word)
";

/// Key-value metadata, including the schema version.
pub const CREATE_METADATA_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
";

/// All schema creation statements in order.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    CREATE_SESSIONS_TABLE,
    CREATE_MATCH_COUNTS_TABLE,
    CREATE_STARTED_INDEX,
    CREATE_WORD_INDEX,
    CREATE_METADATA_TABLE,
];
