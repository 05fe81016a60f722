//! Tag index maintenance.
//!
//! A tag is a secondary index: the row `tag:<name>` holds the encoded set
//! of keys currently carrying that tag. The engine's atomic primitives
//! are per-key, so the read-modify-write cycle on a tag row is guarded by
//! a store-owned mutex instead of engine transactions. The lock is
//! deliberately coarse -- one per store, covering every tag -- trading
//! tag throughput for freedom from lost updates. Primary operations on
//! untagged keys never take it.
//!
//! Membership is best-effort. TTL expiry and plain deletes do not know
//! which tags reference a key, so a tag row can carry members that no
//! longer resolve. Lookups prune those stale members and write the
//! repaired set back before releasing the lock: the index converges
//! toward correctness only as a side effect of being read. A tag that is
//! only ever written can carry stale members indefinitely.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use satchel_engine::{EngineError, KvEngine};

use crate::codec;
use crate::error::StoreResult;

/// Reserved key namespace for tag index rows.
///
/// User keys and tag names are trusted not to collide with it.
pub(crate) const TAG_PREFIX: &str = "tag:";

/// Storage key for a tag's index row.
fn tag_key(tag: &str) -> String {
    format!("{TAG_PREFIX}{tag}")
}

/// Snapshot of the tag index health counters.
///
/// The index degrades rather than fails in several places (corrupt rows
/// read as empty, lookups abort to an empty result); these counters make
/// those silent paths observable.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TagStats {
    /// Stale members pruned by lookups.
    pub stale_pruned: u64,
    /// Tag rows whose stored bytes failed to decode and were read as empty.
    pub decode_degrades: u64,
    /// Lookups aborted to an empty result by a non-NotFound failure.
    pub aborted_lookups: u64,
    /// Tag rows deleted because pruning emptied them.
    pub empty_tags_removed: u64,
}

#[derive(Debug, Default)]
struct Counters {
    stale_pruned: AtomicU64,
    decode_degrades: AtomicU64,
    aborted_lookups: AtomicU64,
    empty_tags_removed: AtomicU64,
}

/// Tag index manager for one store instance.
pub(crate) struct TagIndex {
    engine: Arc<dyn KvEngine>,
    /// Serializes every tag read-modify-write cycle on this store.
    /// Per-instance: independent stores on different paths never contend.
    lock: Mutex<()>,
    counters: Counters,
}

impl TagIndex {
    pub(crate) fn new(engine: Arc<dyn KvEngine>) -> Self {
        Self {
            engine,
            lock: Mutex::new(()),
            counters: Counters::default(),
        }
    }

    pub(crate) fn stats(&self) -> TagStats {
        TagStats {
            stale_pruned: self.counters.stale_pruned.load(Ordering::Relaxed),
            decode_degrades: self.counters.decode_degrades.load(Ordering::Relaxed),
            aborted_lookups: self.counters.aborted_lookups.load(Ordering::Relaxed),
            empty_tags_removed: self.counters.empty_tags_removed.load(Ordering::Relaxed),
        }
    }

    /// Add `key` to each tag's member set.
    ///
    /// The caller has already stored the primary entry. Tags are committed
    /// one at a time: a crash mid-call can leave some tags updated and
    /// others not. Re-tagging an already-present key is a no-op.
    pub(crate) fn save(&self, key: &str, tags: &[&str]) -> StoreResult<()> {
        let _guard = self.lock.lock().expect("tag lock poisoned");
        for tag in tags {
            let row = tag_key(tag);
            let mut members = self.load_members(tag, &row)?;
            if !members.insert(key.to_string()) {
                continue; // already tagged, nothing to write
            }
            let bytes = codec::encode(&members)?;
            self.engine.put(&row, &bytes, None)?;
            debug!(tag = %tag, key = %key, "tagged entry");
        }
        Ok(())
    }

    /// Read a tag's member set for mutation.
    ///
    /// Absent rows and rows whose bytes fail to decode both read as the
    /// empty set; corruption is logged and counted, not surfaced. Other
    /// engine failures propagate.
    fn load_members(&self, tag: &str, row: &str) -> StoreResult<BTreeSet<String>> {
        let bytes = match self.engine.get(row) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return Ok(BTreeSet::new()),
            Err(EngineError::Corrupted(e)) => {
                self.degraded(tag, &e);
                return Ok(BTreeSet::new());
            }
            Err(e) => return Err(e.into()),
        };
        match codec::decode(&bytes) {
            Ok(members) => Ok(members),
            Err(e) => {
                self.degraded(tag, &e.to_string());
                Ok(BTreeSet::new())
            }
        }
    }

    /// All live values carrying `tag`, in key order.
    ///
    /// Members that no longer resolve (expired or deleted behind the
    /// index's back) are pruned from the row before the lock is released.
    /// Any other failure while resolving a member aborts the whole lookup
    /// to an empty result, with the underlying error logged and counted
    /// rather than returned.
    pub(crate) fn lookup<T: DeserializeOwned>(&self, tag: &str) -> StoreResult<Vec<T>> {
        let _guard = self.lock.lock().expect("tag lock poisoned");
        let row = tag_key(tag);

        let mut members: BTreeSet<String> = match self.engine.get(&row) {
            Ok(Some(bytes)) => match codec::decode(&bytes) {
                Ok(members) => members,
                Err(e) => {
                    self.degraded(tag, &e.to_string());
                    return Ok(Vec::new());
                }
            },
            Ok(None) => return Ok(Vec::new()),
            Err(EngineError::Corrupted(e)) => {
                self.degraded(tag, &e);
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let mut values = Vec::with_capacity(members.len());
        let mut stale = Vec::new();
        for key in &members {
            let bytes = match self.engine.get(key) {
                Ok(Some(bytes)) => bytes,
                // Expired or deleted without the index being told.
                Ok(None) => {
                    stale.push(key.clone());
                    continue;
                }
                Err(e) => return Ok(self.aborted(tag, key, &e.to_string())),
            };
            match codec::decode::<T>(&bytes) {
                Ok(value) => values.push(value),
                Err(e) => return Ok(self.aborted(tag, key, &e.to_string())),
            }
        }

        if !stale.is_empty() {
            for key in &stale {
                members.remove(key);
            }
            self.counters
                .stale_pruned
                .fetch_add(stale.len() as u64, Ordering::Relaxed);
            // Healing is best-effort; a failed write-back leaves the row
            // for the next lookup to repair.
            if let Err(e) = self.write_back(tag, &row, &members) {
                warn!(tag = %tag, error = %e, "failed to write back pruned tag row");
            }
        }

        Ok(values)
    }

    /// Persist a pruned member set, dropping the row once it is empty.
    fn write_back(&self, tag: &str, row: &str, members: &BTreeSet<String>) -> StoreResult<()> {
        if members.is_empty() {
            self.engine.delete(row)?;
            self.counters
                .empty_tags_removed
                .fetch_add(1, Ordering::Relaxed);
            debug!(tag = %tag, "removed emptied tag row");
        } else {
            let bytes = codec::encode(members)?;
            self.engine.put(row, &bytes, None)?;
            debug!(tag = %tag, members = members.len(), "pruned stale tag members");
        }
        Ok(())
    }

    fn degraded(&self, tag: &str, error: &str) {
        self.counters.decode_degrades.fetch_add(1, Ordering::Relaxed);
        warn!(tag = %tag, error = %error, "corrupt tag row; treating as empty");
    }

    fn aborted<T>(&self, tag: &str, key: &str, error: &str) -> Vec<T> {
        self.counters.aborted_lookups.fetch_add(1, Ordering::Relaxed);
        warn!(tag = %tag, key = %key, error = %error, "tag lookup aborted; returning empty");
        Vec::new()
    }
}
