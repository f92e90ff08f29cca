// In-memory session lock table kept in step with a session store

use crate::models::{lock_count, ClientLock, SessionTable};
use crate::store::{SessionStore, StoreResult};
use crate::utils::lock_mutex_recover;
use std::sync::{Arc, Mutex};

/// Which session holds which locks, persisted on every change
///
/// Each change is applied to a copy of the table, written to the store, and
/// only then made visible. A failed write leaves the in-memory table equal to
/// the last durable one.
pub struct SessionLocks {
    store: Arc<dyn SessionStore>,
    table: Mutex<SessionTable>,
}

impl SessionLocks {
    /// Read the persisted table once and start tracking from it
    pub fn load(store: Arc<dyn SessionStore>) -> StoreResult<Self> {
        let table = store.read()?;
        log::info!(
            "Loaded {} sessions holding {} locks from {} store",
            table.len(),
            lock_count(&table),
            store.backend()
        );
        Ok(Self {
            store,
            table: Mutex::new(table),
        })
    }

    /// Record that `session_id` holds `lock`
    ///
    /// A lock with the same name in that session is replaced in place;
    /// otherwise the lock is appended.
    pub fn add_lock(&self, session_id: &str, lock: ClientLock) -> StoreResult<()> {
        self.update(|table| {
            let locks = table.entry(session_id.to_string()).or_default();
            match locks.iter().position(|held| held.name == lock.name) {
                Some(position) => locks[position] = lock,
                None => locks.push(lock),
            }
        })
    }

    /// Forget the lock named `name` held by `session_id`
    ///
    /// The session entry stays even if it no longer holds anything.
    pub fn remove_lock(&self, session_id: &str, name: &str) -> StoreResult<Option<ClientLock>> {
        let mut guard = lock_mutex_recover(&self.table);

        let position = match guard
            .get(session_id)
            .and_then(|locks| locks.iter().position(|held| held.name == name))
        {
            Some(position) => position,
            None => return Ok(None),
        };

        let mut next = guard.clone();
        let removed = next
            .get_mut(session_id)
            .map(|locks| locks.remove(position));
        self.store.write(&next)?;
        *guard = next;
        Ok(removed)
    }

    /// Drop a session and return the locks it held
    pub fn remove_session(&self, session_id: &str) -> StoreResult<Vec<ClientLock>> {
        let mut guard = lock_mutex_recover(&self.table);

        if !guard.contains_key(session_id) {
            return Ok(Vec::new());
        }

        let mut next = guard.clone();
        let removed = next.remove(session_id).unwrap_or_default();
        self.store.write(&next)?;
        *guard = next;

        log::debug!(
            "Removed session {} ({} locks released)",
            session_id,
            removed.len()
        );
        Ok(removed)
    }

    /// Locks currently held by a session, in grant order
    pub fn locks_for(&self, session_id: &str) -> Vec<ClientLock> {
        lock_mutex_recover(&self.table)
            .get(session_id)
            .cloned()
            .unwrap_or_default()
    }

    /// All known session IDs
    pub fn session_ids(&self) -> Vec<String> {
        lock_mutex_recover(&self.table).keys().cloned().collect()
    }

    /// Copy of the whole table
    pub fn snapshot(&self) -> SessionTable {
        lock_mutex_recover(&self.table).clone()
    }

    /// Close the underlying store
    pub fn close(&self) -> StoreResult<()> {
        // Holding the table lock keeps any change from racing the close.
        let _guard = lock_mutex_recover(&self.table);
        self.store.close()
    }

    fn update<F>(&self, apply: F) -> StoreResult<()>
    where
        F: FnOnce(&mut SessionTable),
    {
        let mut guard = lock_mutex_recover(&self.table);
        let mut next = guard.clone();
        apply(&mut next);
        self.store.write(&next)?;
        *guard = next;
        Ok(())
    }
}
