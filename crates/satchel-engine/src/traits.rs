use std::time::Duration;

use crate::error::EngineResult;

/// Byte-oriented ordered key-value engine.
///
/// All implementations must satisfy these invariants:
/// - Thread-safe: one engine instance is shared across caller threads.
/// - Scans return live entries in lexicographic key order.
/// - An entry stored with a TTL behaves as absent once the TTL elapses,
///   with no explicit delete. Implementations reclaim dead rows lazily
///   when a read or scan touches them; they never need a background
///   sweeper.
/// - The engine never interprets payload bytes.
pub trait KvEngine: Send + Sync {
    /// Point lookup. Returns `Ok(None)` when the key is absent or expired.
    fn get(&self, key: &str) -> EngineResult<Option<Vec<u8>>>;

    /// Insert or overwrite an entry. `ttl` marks it for expiry after the
    /// given duration; `None` never expires.
    fn put(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> EngineResult<()>;

    /// Remove an entry. Returns `true` iff a live entry was removed;
    /// deleting an absent or already-expired key reports `false`.
    fn delete(&self, key: &str) -> EngineResult<bool>;

    /// All live entries whose key starts with `prefix`, in lexicographic
    /// key order. The empty prefix scans the whole keyspace.
    fn scan_prefix(&self, prefix: &str) -> EngineResult<Vec<(String, Vec<u8>)>>;

    /// All live keys, in lexicographic order.
    fn keys(&self) -> EngineResult<Vec<String>>;

    /// `true` when the key resolves to a live entry.
    ///
    /// Default implementation goes through `get`; backends may override
    /// to skip materializing the payload.
    fn exists(&self, key: &str) -> EngineResult<bool> {
        Ok(self.get(key)?.is_some())
    }
}
