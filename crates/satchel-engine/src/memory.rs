use std::collections::BTreeMap;
use std::sync::RwLock;
use std::time::Duration;

use crate::error::EngineResult;
use crate::record::{now_millis, ValueRecord};
use crate::traits::KvEngine;

/// In-memory, `BTreeMap`-based engine.
///
/// Intended for tests and embedding. Entries are held behind an `RwLock`;
/// the map's ordering provides the lexicographic scan order durable
/// backends get from their on-disk trees. Records are kept unserialized,
/// but expiry semantics are identical: dead rows are dropped when a read
/// or scan touches them.
pub struct MemoryEngine {
    entries: RwLock<BTreeMap<String, ValueRecord>>,
}

impl MemoryEngine {
    /// Create a new empty engine.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    /// Number of live entries.
    pub fn len(&self) -> EngineResult<usize> {
        let now = now_millis()?;
        let map = self.entries.read().expect("lock poisoned");
        Ok(map.values().filter(|r| !r.is_expired(now)).count())
    }

    /// Returns `true` if the engine holds no live entries.
    pub fn is_empty(&self) -> EngineResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Remove the given rows if they are still expired.
    ///
    /// Re-checks under the write lock: a row may have been overwritten
    /// between the read that found it dead and this call.
    fn sweep(&self, keys: &[String], now: u64) {
        if keys.is_empty() {
            return;
        }
        let mut map = self.entries.write().expect("lock poisoned");
        for key in keys {
            if map.get(key).is_some_and(|r| r.is_expired(now)) {
                map.remove(key);
            }
        }
    }
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl KvEngine for MemoryEngine {
    fn get(&self, key: &str) -> EngineResult<Option<Vec<u8>>> {
        let now = now_millis()?;
        {
            let map = self.entries.read().expect("lock poisoned");
            match map.get(key) {
                Some(record) if !record.is_expired(now) => {
                    return Ok(Some(record.payload.clone()))
                }
                Some(_) => {} // dead row, fall through to reclaim it
                None => return Ok(None),
            }
        }
        // Read lock is released; reclaim the dead row.
        self.sweep(&[key.to_string()], now);
        Ok(None)
    }

    fn put(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> EngineResult<()> {
        let record = ValueRecord::from_parts(value.to_vec(), ttl)?;
        let mut map = self.entries.write().expect("lock poisoned");
        map.insert(key.to_string(), record);
        Ok(())
    }

    fn delete(&self, key: &str) -> EngineResult<bool> {
        let now = now_millis()?;
        let mut map = self.entries.write().expect("lock poisoned");
        match map.remove(key) {
            Some(record) => Ok(!record.is_expired(now)),
            None => Ok(false),
        }
    }

    fn scan_prefix(&self, prefix: &str) -> EngineResult<Vec<(String, Vec<u8>)>> {
        let now = now_millis()?;
        let mut live = Vec::new();
        let mut dead = Vec::new();
        {
            let map = self.entries.read().expect("lock poisoned");
            for (key, record) in map.range(prefix.to_string()..) {
                if !key.starts_with(prefix) {
                    break;
                }
                if record.is_expired(now) {
                    dead.push(key.clone());
                } else {
                    live.push((key.clone(), record.payload.clone()));
                }
            }
        }
        self.sweep(&dead, now);
        Ok(live)
    }

    fn keys(&self) -> EngineResult<Vec<String>> {
        let now = now_millis()?;
        let mut live = Vec::new();
        let mut dead = Vec::new();
        {
            let map = self.entries.read().expect("lock poisoned");
            for (key, record) in map.iter() {
                if record.is_expired(now) {
                    dead.push(key.clone());
                } else {
                    live.push(key.clone());
                }
            }
        }
        self.sweep(&dead, now);
        Ok(live)
    }
}

impl std::fmt::Debug for MemoryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.entries.read().expect("lock poisoned").len();
        f.debug_struct("MemoryEngine")
            .field("entry_count", &count)
            .finish()
    }
}
