//! SQLite-backed session store
//!
//! Tables:
//! - `schema_metadata(key, value)` - schema version and last write time
//! - `sessions(session_id)` - one row per session, including sessions with no locks
//! - `session_locks(session_id, position, record)` - one row per lock; `record`
//!   is the JSON encoding of the lock and `position` its index in the session
//!
//! Every write replaces all rows inside one transaction.

use super::error::{StoreError, StoreResult};
use super::SessionStore;
use crate::config::SqliteSettings;
use crate::models::{lock_count, ClientLock, SessionTable};
use crate::utils::lock_mutex_recover;
use chrono::Utc;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

const SCHEMA_VERSION: i32 = 1;

pub struct SqliteStore {
    path: PathBuf,
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open with default settings
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        Self::open_with(path, &SqliteSettings::default())
    }

    pub fn open_with(path: impl AsRef<Path>, settings: &SqliteSettings) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            crate::file_storage::ensure_dir(parent)?;
        }

        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(&path, flags)?;

        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(&format!(
            "PRAGMA journal_mode = {};",
            settings.journal_mode.pragma_value()
        ))?;
        conn.execute_batch(&format!(
            "PRAGMA synchronous = {};",
            settings.synchronous.pragma_value()
        ))?;
        conn.busy_timeout(Duration::from_millis(settings.busy_timeout_ms))?;

        let store = Self {
            path,
            conn: Mutex::new(conn),
        };
        store.init()?;

        log::debug!("Opened session database {:?}", store.path);
        Ok(store)
    }

    /// Path of the database file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn init(&self) -> StoreResult<()> {
        let conn = lock_mutex_recover(&self.conn);

        conn.execute(
            "CREATE TABLE IF NOT EXISTS schema_metadata (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
            [],
        )?;

        let version: Option<String> = conn
            .query_row(
                "SELECT value FROM schema_metadata WHERE key = 'version'",
                [],
                |row| row.get(0),
            )
            .optional()?;

        let version = match version {
            Some(v) => v.parse::<i32>().map_err(|_| {
                StoreError::corruption(format!("schema version {:?} is not a number", v))
            })?,
            None => 0,
        };

        // Forward compatibility check: refuse a database written by a newer build
        if version > SCHEMA_VERSION {
            return Err(StoreError::corruption(format!(
                "database schema version {} is newer than supported version {}",
                version, SCHEMA_VERSION
            )));
        }

        if version < SCHEMA_VERSION {
            conn.execute_batch(
                "BEGIN;
                CREATE TABLE IF NOT EXISTS sessions (
                    session_id TEXT PRIMARY KEY
                );
                CREATE TABLE IF NOT EXISTS session_locks (
                    session_id TEXT NOT NULL REFERENCES sessions(session_id) ON DELETE CASCADE,
                    position INTEGER NOT NULL,
                    record TEXT NOT NULL,
                    PRIMARY KEY (session_id, position)
                );
                COMMIT;",
            )?;
            conn.execute(
                "INSERT OR REPLACE INTO schema_metadata (key, value) VALUES ('version', ?1)",
                params![SCHEMA_VERSION.to_string()],
            )?;
            log::info!(
                "Initialized session database schema (version {} -> {})",
                version,
                SCHEMA_VERSION
            );
        }

        Ok(())
    }
}

/// Encode every lock up front so a serialization failure never reaches the database
fn encode_rows(table: &SessionTable) -> StoreResult<Vec<(&str, Vec<String>)>> {
    let mut rows = Vec::with_capacity(table.len());
    for (session_id, locks) in table {
        let records = locks
            .iter()
            .map(serde_json::to_string)
            .collect::<Result<Vec<_>, _>>()
            .map_err(StoreError::Serialization)?;
        rows.push((session_id.as_str(), records));
    }
    Ok(rows)
}

impl SessionStore for SqliteStore {
    fn write(&self, table: &SessionTable) -> StoreResult<()> {
        let rows = encode_rows(table)?;

        let mut conn = lock_mutex_recover(&self.conn);
        let tx = conn.transaction()?;

        tx.execute("DELETE FROM session_locks", [])?;
        tx.execute("DELETE FROM sessions", [])?;
        {
            let mut insert_session =
                tx.prepare_cached("INSERT INTO sessions (session_id) VALUES (?1)")?;
            let mut insert_lock = tx.prepare_cached(
                "INSERT INTO session_locks (session_id, position, record) VALUES (?1, ?2, ?3)",
            )?;

            for (session_id, records) in &rows {
                insert_session.execute(params![session_id])?;
                for (position, record) in records.iter().enumerate() {
                    insert_lock.execute(params![session_id, position as i64, record])?;
                }
            }
        }
        tx.execute(
            "INSERT OR REPLACE INTO schema_metadata (key, value) VALUES ('updated_at', ?1)",
            params![Utc::now().to_rfc3339()],
        )?;
        tx.commit()?;

        log::debug!(
            "Wrote session state to {:?} ({} sessions, {} locks)",
            self.path,
            table.len(),
            lock_count(table)
        );
        Ok(())
    }

    fn read(&self) -> StoreResult<SessionTable> {
        let conn = lock_mutex_recover(&self.conn);
        let mut table = SessionTable::new();

        let mut stmt = conn.prepare("SELECT session_id FROM sessions")?;
        let session_ids = stmt.query_map([], |row| row.get::<_, String>(0))?;
        for session_id in session_ids {
            table.insert(session_id?, Vec::new());
        }

        let mut stmt = conn.prepare(
            "SELECT session_id, position, record FROM session_locks
             ORDER BY session_id, position",
        )?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let session_id: String = row.get(0)?;
            let position: i64 = row.get(1)?;
            let record: String = row.get(2)?;

            let locks = table.get_mut(&session_id).ok_or_else(|| {
                StoreError::corruption(format!(
                    "locks recorded for unknown session {:?}",
                    session_id
                ))
            })?;

            if position != locks.len() as i64 {
                return Err(StoreError::corruption(format!(
                    "session {:?} has a gap in its locks at position {}",
                    session_id,
                    locks.len()
                )));
            }

            let lock: ClientLock = serde_json::from_str(&record).map_err(|e| {
                StoreError::corruption(format!(
                    "lock {} of session {:?} is malformed: {}",
                    position, session_id, e
                ))
            })?;
            locks.push(lock);
        }

        log::debug!(
            "Read session state from {:?} ({} sessions, {} locks)",
            self.path,
            table.len(),
            lock_count(&table)
        );
        Ok(table)
    }

    fn close(&self) -> StoreResult<()> {
        let conn = lock_mutex_recover(&self.conn);
        conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
        log::debug!("Checkpointed session database {:?}", self.path);
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "sqlite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn sample_table() -> SessionTable {
        let mut table = SessionTable::new();
        table.insert("session-A".to_string(), vec![ClientLock::new("res1", "k1")]);
        table.insert(
            "session-B".to_string(),
            vec![
                ClientLock::new("res2", "k2"),
                ClientLock::new("res3", "k3").with_size(5),
            ],
        );
        table.insert("session-C".to_string(), Vec::new());
        table
    }

    #[test]
    fn test_fresh_database_reads_empty() {
        let temp_dir = TempDir::new().unwrap();
        let store = SqliteStore::open(temp_dir.path().join("sessions.db")).unwrap();
        assert!(store.read().unwrap().is_empty());
    }

    #[test]
    fn test_write_then_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("sessions.db");

        {
            let store = SqliteStore::open(&path).unwrap();
            store.write(&sample_table()).unwrap();
            store.close().unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.read().unwrap(), sample_table());
    }

    #[test]
    fn test_write_replaces_previous_rows() {
        let temp_dir = TempDir::new().unwrap();
        let store = SqliteStore::open(temp_dir.path().join("sessions.db")).unwrap();

        store.write(&sample_table()).unwrap();
        let mut smaller = SessionTable::new();
        smaller.insert("session-B".to_string(), vec![ClientLock::new("res3", "k3")]);
        store.write(&smaller).unwrap();

        assert_eq!(store.read().unwrap(), smaller);
    }

    #[test]
    fn test_foreign_file_is_corruption() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("sessions.db");
        fs::write(&path, "this is a plain text file, not a database at all".repeat(10)).unwrap();

        let err = SqliteStore::open(&path).err().unwrap();
        assert!(err.is_corruption(), "unexpected error: {}", err);
    }

    #[test]
    fn test_newer_schema_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("sessions.db");
        drop(SqliteStore::open(&path).unwrap());

        let conn = Connection::open(&path).unwrap();
        conn.execute(
            "UPDATE schema_metadata SET value = '99' WHERE key = 'version'",
            [],
        )
        .unwrap();
        drop(conn);

        let err = SqliteStore::open(&path).err().unwrap();
        assert!(err.is_corruption());
    }

    #[test]
    fn test_gap_in_lock_positions_is_corruption() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("sessions.db");
        let store = SqliteStore::open(&path).unwrap();
        store.write(&sample_table()).unwrap();

        let conn = Connection::open(&path).unwrap();
        conn.execute(
            "DELETE FROM session_locks WHERE session_id = 'session-B' AND position = 0",
            [],
        )
        .unwrap();
        drop(conn);

        assert!(store.read().unwrap_err().is_corruption());
    }

    #[test]
    fn test_malformed_record_is_corruption() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("sessions.db");
        let store = SqliteStore::open(&path).unwrap();
        store.write(&sample_table()).unwrap();

        let conn = Connection::open(&path).unwrap();
        conn.execute(
            "UPDATE session_locks SET record = '{\"name\": \"res1\"'
             WHERE session_id = 'session-A'",
            [],
        )
        .unwrap();
        drop(conn);

        let err = store.read().unwrap_err();
        assert!(err.to_string().contains("malformed"));
    }

    #[test]
    fn test_unencodable_lock_keeps_previous_rows() {
        let temp_dir = TempDir::new().unwrap();
        let store = SqliteStore::open(temp_dir.path().join("sessions.db")).unwrap();
        store.write(&sample_table()).unwrap();

        let mut lock = ClientLock::new("res4", "k4");
        lock.extra.insert("acquiredAt".to_string(), serde_json::Value::Null);
        let mut next = sample_table();
        next.insert("session-D".to_string(), vec![lock]);

        let err = store.write(&next).unwrap_err();
        assert_eq!(err.kind(), crate::store::StoreErrorKind::Serialization);
        assert_eq!(store.read().unwrap(), sample_table());
    }

    #[test]
    fn test_concurrent_writes_leave_one_complete_table() {
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(SqliteStore::open(temp_dir.path().join("sessions.db")).unwrap());

        let candidates: Vec<SessionTable> = (0..6)
            .map(|i| {
                let mut table = SessionTable::new();
                let locks = (0..=i)
                    .map(|j| ClientLock::new(format!("res-{}", j), format!("key-{}-{}", i, j)))
                    .collect();
                table.insert(format!("session-{}", i), locks);
                table
            })
            .collect();

        let handles: Vec<_> = candidates
            .iter()
            .cloned()
            .map(|t| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for _ in 0..3 {
                        store.write(&t).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert!(candidates.contains(&store.read().unwrap()));
    }
}
