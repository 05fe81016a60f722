use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// Stored value envelope: payload bytes plus optional absolute expiry.
///
/// Every row in a durable backend is a bincode-serialized `ValueRecord`.
/// `expires_at` is Unix epoch milliseconds; `None` never expires. Expiry
/// is lazy: a dead row stays on disk until a read or scan touches it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueRecord {
    /// The caller's value bytes, opaque to the engine.
    pub payload: Vec<u8>,
    /// Absolute expiry in Unix epoch milliseconds. `None` never expires.
    pub expires_at: Option<u64>,
}

impl ValueRecord {
    /// Create a record without expiry.
    pub fn new(payload: Vec<u8>) -> Self {
        Self {
            payload,
            expires_at: None,
        }
    }

    /// Create a record that expires `ttl` from now.
    pub fn with_ttl(payload: Vec<u8>, ttl: Duration) -> EngineResult<Self> {
        let expires_at = now_millis()?.saturating_add(ttl.as_millis() as u64);
        Ok(Self {
            payload,
            expires_at: Some(expires_at),
        })
    }

    /// Create a record with or without expiry depending on `ttl`.
    pub fn from_parts(payload: Vec<u8>, ttl: Option<Duration>) -> EngineResult<Self> {
        match ttl {
            Some(ttl) => Self::with_ttl(payload, ttl),
            None => Ok(Self::new(payload)),
        }
    }

    /// `true` once the expiry timestamp has passed.
    pub fn is_expired(&self, now: u64) -> bool {
        matches!(self.expires_at, Some(at) if now >= at)
    }

    /// Serialize the record for storage.
    pub fn encode(&self) -> EngineResult<Vec<u8>> {
        bincode::serialize(self).map_err(|e| EngineError::Backend(e.to_string()))
    }

    /// Reconstruct a record from stored bytes.
    pub fn decode(bytes: &[u8]) -> EngineResult<Self> {
        bincode::deserialize(bytes).map_err(|e| EngineError::Corrupted(e.to_string()))
    }
}

/// Milliseconds since the UNIX epoch.
pub(crate) fn now_millis() -> EngineResult<u64> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .map_err(|_| EngineError::Clock)
}
