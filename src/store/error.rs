// Session store error types

use std::path::PathBuf;
use thiserror::Error;

/// Broad failure category reported to the lock registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorKind {
    /// Storage medium unreachable, full or access-denied
    Io,
    /// A lock record or table could not be encoded
    Serialization,
    /// Persisted data could not be decoded into a well-formed table
    Corruption,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("State file {path:?} is owned by another process")]
    InUse { path: PathBuf },

    #[error("State file {path:?} was closed; reopen the store to write")]
    Closed { path: PathBuf },

    #[error("Database error: {0}")]
    Database(#[source] rusqlite::Error),

    #[error("Failed to serialize session table: {0}")]
    Serialization(#[source] serde_json::Error),

    #[error("Session state is corrupt: {0}")]
    Corruption(String),
}

impl StoreError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        StoreError::Io {
            context: context.into(),
            source,
        }
    }

    pub fn corruption(message: impl Into<String>) -> Self {
        StoreError::Corruption(message.into())
    }

    pub fn kind(&self) -> StoreErrorKind {
        match self {
            StoreError::Io { .. }
            | StoreError::InUse { .. }
            | StoreError::Closed { .. }
            | StoreError::Database(_) => StoreErrorKind::Io,
            StoreError::Serialization(_) => StoreErrorKind::Serialization,
            StoreError::Corruption(_) => StoreErrorKind::Corruption,
        }
    }

    pub fn is_corruption(&self) -> bool {
        self.kind() == StoreErrorKind::Corruption
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        use rusqlite::ErrorCode;

        match err {
            rusqlite::Error::InvalidColumnType(..)
            | rusqlite::Error::FromSqlConversionFailure(..) => {
                return StoreError::Corruption(format!("unexpected column contents: {}", err));
            }
            _ => {}
        }

        match err.sqlite_error_code() {
            Some(ErrorCode::NotADatabase) | Some(ErrorCode::DatabaseCorrupt) => {
                StoreError::Corruption(format!("database file is unreadable: {}", err))
            }
            _ => StoreError::Database(err),
        }
    }
}

/// Result type for session store operations
pub type StoreResult<T> = Result<T, StoreError>;
