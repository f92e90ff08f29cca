//! Session store: durable record of which session holds which locks
//!
//! The lock registry hands the store its complete session table on every
//! change (`write`) and reads it back once at startup (`read`). Backends:
//! - [`NoopStore`] - persists nothing; every read is empty
//! - [`MemoryStore`] - keeps the encoded table in process memory (tests)
//! - [`FileStore`] - one JSON state file replaced by atomic rename
//! - [`SqliteStore`] - rows in an SQLite database replaced in one transaction
//!
//! A store is constructed once at startup from [`StoreConfig`] and shared as
//! `Arc<dyn SessionStore>`; call [`SessionStore::close`] on shutdown.

pub mod error;
pub mod file;
pub mod format;
pub mod memory;
pub mod sqlite;

pub use error::{StoreError, StoreErrorKind, StoreResult};
pub use file::FileStore;
pub use memory::{MemoryStore, NoopStore};
pub use sqlite::SqliteStore;

use crate::config::{BackendKind, StoreConfig};
use crate::models::SessionTable;
use std::sync::Arc;

/// Persistence boundary for the session-to-locks table
pub trait SessionStore: Send + Sync {
    /// Durably replace the persisted table with `table`
    ///
    /// Either the whole table is committed or the previous one stays in
    /// place. Concurrent calls are serialized.
    fn write(&self, table: &SessionTable) -> StoreResult<()>;

    /// Read the last committed table; empty if nothing was ever written
    fn read(&self) -> StoreResult<SessionTable>;

    /// Flush and release the underlying medium
    ///
    /// Meant as the last call on a store. A closed file store refuses further
    /// writes with [`StoreError::Closed`].
    fn close(&self) -> StoreResult<()> {
        Ok(())
    }

    /// Short backend name for logs
    fn backend(&self) -> &'static str;
}

/// Open the store described by `config`
pub fn open_store(config: &StoreConfig) -> StoreResult<Arc<dyn SessionStore>> {
    let store: Arc<dyn SessionStore> = match config.backend {
        BackendKind::Noop => Arc::new(NoopStore::new()),
        BackendKind::Memory => Arc::new(MemoryStore::new()),
        BackendKind::File => Arc::new(FileStore::open(config.state_path())?),
        BackendKind::Sqlite => Arc::new(SqliteStore::open_with(
            config.state_path(),
            &config.sqlite,
        )?),
    };

    log::info!(
        "Opened {} session store{}",
        store.backend(),
        match config.backend {
            BackendKind::File | BackendKind::Sqlite =>
                format!(" at {}", config.state_path().display()),
            _ => String::new(),
        }
    );
    Ok(store)
}
