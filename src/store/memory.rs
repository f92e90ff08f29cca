// In-process session stores (no durable medium)

use super::error::StoreResult;
use super::format;
use super::SessionStore;
use crate::models::{lock_count, SessionTable};
use crate::utils::lock_mutex_recover;
use std::sync::Mutex;

/// Store that persists nothing
///
/// Selected explicitly with the `noop` backend: locks do not survive a restart.
#[derive(Debug, Default)]
pub struct NoopStore;

impl NoopStore {
    pub fn new() -> Self {
        Self
    }
}

impl SessionStore for NoopStore {
    fn write(&self, table: &SessionTable) -> StoreResult<()> {
        log::trace!("Discarding session table ({} sessions)", table.len());
        Ok(())
    }

    fn read(&self) -> StoreResult<SessionTable> {
        Ok(SessionTable::new())
    }

    fn backend(&self) -> &'static str {
        "noop"
    }
}

/// Store holding the encoded table in memory
///
/// Goes through the same encoding as the file backend, so a table that
/// would fail to serialize on disk fails here too.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<Option<Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(None),
        }
    }

    /// Whether a table has been written
    pub fn has_state(&self) -> bool {
        lock_mutex_recover(&self.state).is_some()
    }

    /// Replace the held bytes directly (simulates a damaged medium)
    pub fn set_raw(&self, bytes: Vec<u8>) {
        *lock_mutex_recover(&self.state) = Some(bytes);
    }
}

impl SessionStore for MemoryStore {
    fn write(&self, table: &SessionTable) -> StoreResult<()> {
        let bytes = format::encode(table)?;
        *lock_mutex_recover(&self.state) = Some(bytes);
        log::debug!(
            "Stored session table in memory ({} sessions, {} locks)",
            table.len(),
            lock_count(table)
        );
        Ok(())
    }

    fn read(&self) -> StoreResult<SessionTable> {
        match lock_mutex_recover(&self.state).as_deref() {
            Some(bytes) => format::decode(bytes),
            None => Ok(SessionTable::new()),
        }
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
