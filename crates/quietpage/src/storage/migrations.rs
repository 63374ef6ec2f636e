//! Schema versioning for the statistics store.

use rusqlite::Connection;

use crate::error::{Error, Result};

use super::schema::SCHEMA_STATEMENTS;

/// The current schema version.
pub const CURRENT_VERSION: i32 = 2;

const VERSION_KEY: &str = "schema_version";

/// Create missing tables, then bring an older database up to [`CURRENT_VERSION`].
///
/// # Errors
///
/// Returns an error if a statement or a migration step fails.
pub fn initialize_schema(conn: &Connection) -> Result<()> {
    for statement in SCHEMA_STATEMENTS {
        conn.execute(statement, [])?;
    }

    let version = schema_version(conn)?;
    if version > CURRENT_VERSION {
        return Err(Error::DatabaseMigration {
            message: format!("database schema {version} is newer than supported {CURRENT_VERSION}"),
        });
    }
    for next in (version + 1)..=CURRENT_VERSION {
        migrate(conn, next)?;
        set_schema_version(conn, next)?;
    }
    Ok(())
}

/// Stored schema version, 0 for a fresh database.
///
/// # Errors
///
/// Returns an error if the metadata table cannot be read or holds a non-numeric version.
pub fn schema_version(conn: &Connection) -> Result<i32> {
    let result: std::result::Result<String, rusqlite::Error> = conn.query_row(
        "SELECT value FROM metadata WHERE key = ?1",
        [VERSION_KEY],
        |row| row.get(0),
    );

    match result {
        Ok(value) => value.parse().map_err(|_| Error::DatabaseMigration {
            message: format!("invalid schema version: {value}"),
        }),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(0),
        Err(e) => Err(e.into()),
    }
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO metadata (key, value) VALUES (?1, ?2)",
        (VERSION_KEY, version.to_string()),
    )?;
    Ok(())
}

fn migrate(conn: &Connection, version: i32) -> Result<()> {
    match version {
        // Base tables come from SCHEMA_STATEMENTS.
        1 => Ok(()),
        // Version 1 stored no mute counts.
        2 => {
            let has_column: bool = conn.query_row(
                "SELECT COUNT(*) > 0 FROM pragma_table_info('sessions') WHERE name = 'muted_spans'",
                [],
                |row| row.get(0),
            )?;
            if !has_column {
                conn.execute(
                    "ALTER TABLE sessions ADD COLUMN muted_spans INTEGER NOT NULL DEFAULT 0",
                    [],
                )?;
            }
            Ok(())
        }
        _ => Err(Error::DatabaseMigration {
            message: format!("unknown migration version: {version}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_db() -> Connection {
        Connection::open_in_memory().expect("failed to create in-memory database")
    }

    fn table_exists(conn: &Connection, name: &str) -> bool {
        conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
            [name],
            |row| row.get::<_, i32>(0),
        )
        .unwrap()
            == 1
    }

    #[test]
    fn test_initialize_schema_creates_tables() {
        let conn = create_test_db();
        initialize_schema(&conn).unwrap();
        assert!(table_exists(&conn, "sessions"));
        assert!(table_exists(&conn, "match_counts"));
        assert!(table_exists(&conn, "metadata"));
        assert_eq!(schema_version(&conn).unwrap(), CURRENT_VERSION);
    }

    #[test]
    fn test_initialize_schema_idempotent() {
        let conn = create_test_db();
        initialize_schema(&conn).unwrap();
        initialize_schema(&conn).unwrap();
        assert_eq!(schema_version(&conn).unwrap(), CURRENT_VERSION);
    }

    #[test]
    fn test_upgrade_from_v1_adds_muted_spans() {
        let conn = create_test_db();
        conn.execute_batch(
            r"
            CREATE TABLE sessions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                started_at TEXT NOT NULL,
                hostname TEXT NOT NULL,
                disabled INTEGER NOT NULL DEFAULT 0
            );
            CREATE TABLE metadata (key TEXT PRIMARY KEY, value TEXT NOT NULL);
            INSERT INTO metadata (key, value) VALUES ('schema_version', '1');
            INSERT INTO sessions (started_at, hostname) VALUES ('2024-01-01T00:00:00Z', 'a.com');
            ",
        )
        .unwrap();

        initialize_schema(&conn).unwrap();

        let spans: i64 = conn
            .query_row("SELECT muted_spans FROM sessions", [], |row| row.get(0))
            .unwrap();
        assert_eq!(spans, 0);
        assert_eq!(schema_version(&conn).unwrap(), 2);
    }

    #[test]
    fn test_newer_schema_rejected() {
        let conn = create_test_db();
        initialize_schema(&conn).unwrap();
        set_schema_version(&conn, 99).unwrap();

        let err = initialize_schema(&conn).unwrap_err();
        assert!(err.to_string().contains("newer than supported"));
    }

    #[test]
    fn test_unknown_migration_version() {
        let conn = create_test_db();
        let err = migrate(&conn, 999).unwrap_err();
        assert!(err.to_string().contains("unknown migration version"));
    }
}
