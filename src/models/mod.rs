// Data models shared between the lock registry and the session store

use chrono::{DateTime, Utc};
use serde::ser::{Error as _, SerializeMap};
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;

/// Mapping of session ID to the locks held by that session, in grant order
pub type SessionTable = BTreeMap<String, Vec<ClientLock>>;

/// Wire names of the fields `ClientLock` owns; `extra` may not reuse them
pub const LOCK_FIELDS: [&str; 4] = ["name", "key", "size", "acquiredAt"];

fn default_size() -> i32 {
    1
}

/// A lock held by a client session
///
/// The store never interprets these fields. Fields it does not know about
/// (written by a newer build) are kept in `extra` and written back as-is.
///
/// Serializing a lock whose `extra` reuses one of [`LOCK_FIELDS`] fails.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientLock {
    /// Lock name (the locked resource)
    pub name: String,
    /// Token handed to the client when the lock was granted
    pub key: String,
    /// Lock capacity; 1 for an exclusive lock
    #[serde(default = "default_size")]
    pub size: i32,
    /// When the lock was granted
    #[serde(default)]
    pub acquired_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ClientLock {
    pub fn new(name: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key: key.into(),
            size: default_size(),
            acquired_at: None,
            extra: serde_json::Map::new(),
        }
    }

    /// Set the lock capacity
    pub fn with_size(mut self, size: i32) -> Self {
        self.size = size;
        self
    }

    /// Set the grant timestamp
    pub fn with_acquired_at(mut self, acquired_at: DateTime<Utc>) -> Self {
        self.acquired_at = Some(acquired_at);
        self
    }
}

impl Serialize for ClientLock {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if let Some(field) = self.extra.keys().find(|k| LOCK_FIELDS.contains(&k.as_str())) {
            return Err(S::Error::custom(format!(
                "lock {:?} has an extra field {:?} that shadows a named field",
                self.name, field
            )));
        }

        let len = 3 + usize::from(self.acquired_at.is_some()) + self.extra.len();
        let mut map = serializer.serialize_map(Some(len))?;
        map.serialize_entry("name", &self.name)?;
        map.serialize_entry("key", &self.key)?;
        map.serialize_entry("size", &self.size)?;
        if let Some(acquired_at) = &self.acquired_at {
            map.serialize_entry("acquiredAt", acquired_at)?;
        }
        for (field, value) in &self.extra {
            map.serialize_entry(field, value)?;
        }
        map.end()
    }
}

/// Count locks across every session in a table
pub fn lock_count(table: &SessionTable) -> usize {
    table.values().map(Vec::len).sum()
}
