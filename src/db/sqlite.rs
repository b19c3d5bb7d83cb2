use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::{Connection, Transaction, TransactionBehavior};
use tracing;

use super::DatabaseError;

/// How long a writer waits on a locked database before giving up.
/// The compliance sweep and request threads write to the same file.
pub const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Open a SQLite connection to the given path and run migrations
pub fn open_database(path: &Path) -> Result<Connection, DatabaseError> {
    let conn = Connection::open(path)?;
    configure_pragmas(&conn)?;
    run_migrations(&conn)?;
    Ok(conn)
}

/// Open an in-memory database (for testing)
pub fn open_memory_database() -> Result<Connection, DatabaseError> {
    let conn = Connection::open_in_memory()?;
    configure_pragmas(&conn)?;
    run_migrations(&conn)?;
    Ok(conn)
}

fn configure_pragmas(conn: &Connection) -> Result<(), DatabaseError> {
    conn.busy_timeout(BUSY_TIMEOUT)?;
    conn.execute_batch(
        "PRAGMA journal_mode=DELETE;
         PRAGMA foreign_keys=ON;"
    )?;
    Ok(())
}

/// Run all pending migrations
pub fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    let current_version = get_current_version(conn);

    let migrations: Vec<(i64, &str)> = vec![
        (1, include_str!("../../resources/migrations/001_initial.sql")),
    ];

    for (version, sql) in migrations {
        if version > current_version {
            tracing::info!("Running migration v{version}");
            conn.execute_batch(sql).map_err(|e| DatabaseError::MigrationFailed {
                version,
                reason: e.to_string(),
            })?;
        }
    }

    Ok(())
}

/// Get the current schema version (0 if no schema exists yet)
fn get_current_version(conn: &Connection) -> i64 {
    conn.query_row(
        "SELECT MAX(version) FROM schema_version",
        [],
        |row| row.get::<_, i64>(0),
    )
    .unwrap_or(0)
}

/// Begin a short write transaction that takes the write lock up front.
///
/// Check-then-insert sequences (alert deduplication) must not interleave
/// with another writer between the check and the insert.
pub fn begin_immediate(conn: &Connection) -> Result<Transaction<'_>, DatabaseError> {
    Ok(Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?)
}

/// Count tables in the database (for verification)
#[cfg(test)]
pub fn count_tables(conn: &Connection) -> Result<i64, DatabaseError> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
        [],
        |row| row.get::<_, i64>(0),
    )?;
    Ok(count)
}

// ═══════════════════════════════════════════════════════════
// Connection sources
// ═══════════════════════════════════════════════════════════

/// Hands out independent connections to the record store.
///
/// Background workers never share the connection of a request thread;
/// each unit of work opens its own and drops it when done.
pub trait ConnectionSource: Send + Sync {
    fn open(&self) -> Result<Connection, DatabaseError>;
}

/// File-backed SQLite store. Every `open` runs pending migrations.
#[derive(Debug, Clone)]
pub struct DatabaseFile {
    path: PathBuf,
}

impl DatabaseFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConnectionSource for DatabaseFile {
    fn open(&self) -> Result<Connection, DatabaseError> {
        open_database(&self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_initializes_all_tables() {
        let conn = open_memory_database().unwrap();
        // 7 entity tables + schema_version
        let count = count_tables(&conn).unwrap();
        assert_eq!(count, 8, "Expected 8 tables, got {count}");
    }

    #[test]
    fn schema_version_is_current() {
        let conn = open_memory_database().unwrap();
        let version: i64 = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, 1);
    }

    #[test]
    fn migration_idempotent() {
        let conn = open_memory_database().unwrap();
        // Run migrations again, should not error
        let result = run_migrations(&conn);
        assert!(result.is_ok());
    }

    #[test]
    fn foreign_keys_enabled() {
        let conn = open_memory_database().unwrap();
        let fk: i64 = conn
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();
        assert_eq!(fk, 1);
    }

    #[test]
    fn resolved_alert_must_be_read() {
        let conn = open_memory_database().unwrap();
        conn.execute(
            "INSERT INTO patients (id, name, created_at) VALUES ('p1', 'Ada', '2026-01-01 00:00:00')",
            [],
        )
        .unwrap();
        let result = conn.execute(
            "INSERT INTO alerts (id, patient_id, alert_type, message, severity, created_at, is_read, resolved_at)
             VALUES ('a1', 'p1', 'medication_reminder', 'm', 'medium', '2026-01-01 00:00:00', 0, '2026-01-02 00:00:00')",
            [],
        );
        assert!(result.is_err(), "resolved_at without is_read must be rejected");
    }

    #[test]
    fn database_file_opens_independent_connections() {
        let dir = tempfile::tempdir().unwrap();
        let source = DatabaseFile::new(dir.path().join("glycare.db"));

        let first = source.open().unwrap();
        first
            .execute(
                "INSERT INTO doctors (id, name, created_at) VALUES ('d1', 'Dr. Rossi', '2026-01-01 00:00:00')",
                [],
            )
            .unwrap();

        let second = source.open().unwrap();
        let count: i64 = second
            .query_row("SELECT COUNT(*) FROM doctors", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }
}
