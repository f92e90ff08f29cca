//! State file encoding
//!
//! A state file is a single JSON envelope:
//!
//! ```text
//! {
//!   "format": "lock-session-state",
//!   "version": 1,
//!   "updatedAt": "...",
//!   "checksum": "sha256:<hex>",
//!   "sessions": { ... }
//! }
//! ```
//!
//! The checksum covers the exact bytes of the `sessions` value. Decoding keeps
//! that value raw so the digest is verified over the bytes on disk, not over a
//! re-serialization.

use super::error::{StoreError, StoreResult};
use crate::models::SessionTable;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use sha2::{Digest, Sha256};

/// Marker identifying a session state file
pub const STATE_FORMAT: &str = "lock-session-state";

/// Version of the state file format
pub const STATE_VERSION: u32 = 1;

const CHECKSUM_PREFIX: &str = "sha256:";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EnvelopeOut<'a> {
    format: &'a str,
    version: u32,
    updated_at: DateTime<Utc>,
    checksum: String,
    sessions: &'a RawValue,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EnvelopeIn<'a> {
    format: String,
    version: u32,
    #[allow(dead_code)]
    updated_at: Option<DateTime<Utc>>,
    checksum: String,
    #[serde(borrow)]
    sessions: &'a RawValue,
}

fn checksum(bytes: &[u8]) -> String {
    format!("{}{}", CHECKSUM_PREFIX, hex::encode(Sha256::digest(bytes)))
}

/// Encode a table into state file bytes
pub fn encode(table: &SessionTable) -> StoreResult<Vec<u8>> {
    let sessions = serde_json::to_string(table).map_err(StoreError::Serialization)?;
    let sessions = RawValue::from_string(sessions).map_err(StoreError::Serialization)?;

    let envelope = EnvelopeOut {
        format: STATE_FORMAT,
        version: STATE_VERSION,
        updated_at: Utc::now(),
        checksum: checksum(sessions.get().as_bytes()),
        sessions: &sessions,
    };

    let mut bytes = serde_json::to_vec_pretty(&envelope).map_err(StoreError::Serialization)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Decode state file bytes into a table
///
/// Any deviation from a well-formed envelope is reported as corruption;
/// nothing is salvaged from a damaged file.
pub fn decode(bytes: &[u8]) -> StoreResult<SessionTable> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(StoreError::corruption("state file is empty"));
    }

    let envelope: EnvelopeIn<'_> = serde_json::from_slice(bytes).map_err(|e| {
        StoreError::corruption(format!("state file is not a valid envelope: {}", e))
    })?;

    if envelope.format != STATE_FORMAT {
        return Err(StoreError::corruption(format!(
            "unexpected format marker {:?}",
            envelope.format
        )));
    }

    if envelope.version == 0 || envelope.version > STATE_VERSION {
        return Err(StoreError::corruption(format!(
            "state file version {} is not supported (this build reads up to {})",
            envelope.version, STATE_VERSION
        )));
    }

    let computed = checksum(envelope.sessions.get().as_bytes());
    if computed != envelope.checksum {
        return Err(StoreError::corruption(format!(
            "checksum mismatch: recorded {}, computed {}",
            envelope.checksum, computed
        )));
    }

    serde_json::from_str(envelope.sessions.get())
        .map_err(|e| StoreError::corruption(format!("sessions payload is malformed: {}", e)))
}
