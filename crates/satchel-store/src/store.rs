use std::marker::PhantomData;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use satchel_engine::{EngineConfig, KvEngine, RedbEngine};

use crate::codec;
use crate::error::{StoreError, StoreResult};
use crate::tags::{TagIndex, TagStats, TAG_PREFIX};

/// Typed, tag-indexed key-value store over an embedded ordered engine.
///
/// A store instance is parameterized over one caller-chosen element type
/// `T`; every entry holds a `T` serialized through the bincode codec.
/// Keys are arbitrary strings (the empty string included).
///
/// Primary operations lean entirely on the engine's own concurrency
/// control and add no locking of their own. Tag operations additionally
/// serialize behind the store-owned tag lock; see the
/// [`tags`](crate::tags) module for the maintenance protocol.
///
/// A store exclusively owns its engine handle for its lifetime. [`close`]
/// consumes the store, so use-after-close is unrepresentable.
///
/// [`close`]: KvStore::close
pub struct KvStore<T> {
    engine: Arc<dyn KvEngine>,
    tags: TagIndex,
    _element: PhantomData<fn() -> T>,
}

impl<T> KvStore<T>
where
    T: Serialize + DeserializeOwned,
{
    /// Open or create a durable store at `path`.
    ///
    /// Any leading directories must already exist. Only one handle may
    /// hold the file open at a time; a locked path fails with a bounded
    /// ~50ms wait rather than hanging.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        Self::open_with_config(path, EngineConfig::default())
    }

    /// Open with explicit engine options (lock timeout, durability).
    pub fn open_with_config(path: impl AsRef<Path>, config: EngineConfig) -> StoreResult<Self> {
        let engine = RedbEngine::open(path, config)?;
        Ok(Self::with_engine(Arc::new(engine)))
    }

    /// Build a store over any engine implementation.
    ///
    /// Useful for tests and embedding (e.g. a
    /// [`MemoryEngine`](satchel_engine::MemoryEngine)).
    pub fn with_engine(engine: Arc<dyn KvEngine>) -> Self {
        Self {
            tags: TagIndex::new(Arc::clone(&engine)),
            engine,
            _element: PhantomData,
        }
    }

    // ---------------------------------------------------------------
    // Writes
    // ---------------------------------------------------------------

    /// Store an entry, creating or overwriting it.
    ///
    /// The key may be the empty string. A value that encodes to zero
    /// bytes ("no value") is rejected with [`StoreError::BadValue`]
    /// before anything is stored.
    pub fn put(&self, key: &str, value: &T) -> StoreResult<()> {
        let bytes = encode_value(value)?;
        self.engine.put(key, &bytes, None)?;
        Ok(())
    }

    /// Store an entry that expires `ttl` from now.
    ///
    /// Once the TTL elapses, [`get`](KvStore::get) reports the key as
    /// not found with no explicit delete having occurred.
    pub fn put_with_ttl(&self, key: &str, value: &T, ttl: Duration) -> StoreResult<()> {
        let bytes = encode_value(value)?;
        self.engine.put(key, &bytes, Some(ttl))?;
        Ok(())
    }

    /// Store an entry and add it to each of the given tags.
    ///
    /// The primary write lands first; tags are then updated one at a
    /// time, each independently committed. Tagging the same key twice is
    /// a no-op for the index.
    pub fn put_with_tags(&self, key: &str, value: &T, tags: &[&str]) -> StoreResult<()> {
        self.put(key, value)?;
        self.tags.save(key, tags)
    }

    /// Store an expiring entry and add it to each of the given tags.
    ///
    /// The tag rows themselves never expire; lookups prune the member
    /// once the entry does.
    pub fn put_with_tags_and_ttl(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
        tags: &[&str],
    ) -> StoreResult<()> {
        self.put_with_ttl(key, value, ttl)?;
        self.tags.save(key, tags)
    }

    /// Delete an entry.
    ///
    /// Deleting a key with no live entry (absent, already deleted, or
    /// expired) is [`StoreError::NotFound`], not a no-op.
    pub fn delete(&self, key: &str) -> StoreResult<()> {
        if self.engine.delete(key)? {
            Ok(())
        } else {
            Err(StoreError::NotFound)
        }
    }

    // ---------------------------------------------------------------
    // Reads
    // ---------------------------------------------------------------

    /// Fetch and decode the entry at `key`.
    ///
    /// [`StoreError::NotFound`] for absent or expired keys;
    /// [`StoreError::Decode`] when the stored bytes do not reconstruct
    /// into `T`.
    pub fn get(&self, key: &str) -> StoreResult<T> {
        match self.engine.get(key)? {
            Some(bytes) => codec::decode(&bytes),
            None => Err(StoreError::NotFound),
        }
    }

    /// `true` when `key` resolves to a live entry.
    pub fn exists(&self, key: &str) -> StoreResult<bool> {
        Ok(self.engine.exists(key)?)
    }

    /// All values whose key starts with `prefix`, in lexicographic key
    /// order. An unmatched prefix yields an empty vector, not an error;
    /// any single decode failure fails the call.
    pub fn get_with_prefix(&self, prefix: &str) -> StoreResult<Vec<T>> {
        let mut values = Vec::new();
        for (key, bytes) in self.engine.scan_prefix(prefix)? {
            if key.starts_with(TAG_PREFIX) {
                continue; // index rows are not user data
            }
            values.push(codec::decode(&bytes)?);
        }
        Ok(values)
    }

    /// All values currently carrying `tag`, in key order.
    ///
    /// Stale tag members (expired or deleted entries) are pruned as a
    /// side effect. An unknown tag yields an empty vector.
    pub fn get_with_tag(&self, tag: &str) -> StoreResult<Vec<T>> {
        self.tags.lookup(tag)
    }

    /// All live keys, in lexicographic order.
    pub fn keys(&self) -> StoreResult<Vec<String>> {
        let keys = self
            .engine
            .keys()?
            .into_iter()
            .filter(|k| !k.starts_with(TAG_PREFIX))
            .collect();
        Ok(keys)
    }

    /// Decode of every live entry, in key order.
    ///
    /// Fail-fast: the first decode failure fails the whole call with no
    /// partial result.
    pub fn get_all(&self) -> StoreResult<Vec<T>> {
        self.get_with_prefix("")
    }

    // ---------------------------------------------------------------
    // Lifecycle / diagnostics
    // ---------------------------------------------------------------

    /// Snapshot of the tag index health counters.
    pub fn tag_stats(&self) -> TagStats {
        self.tags.stats()
    }

    /// Close the store, releasing the engine handle and its file lock.
    pub fn close(self) -> StoreResult<()> {
        debug!("store closed");
        drop(self);
        Ok(())
    }
}

/// Encode a value for the primary keyspace, rejecting empty encodings.
fn encode_value<T: Serialize>(value: &T) -> StoreResult<Vec<u8>> {
    let bytes = codec::encode(value)?;
    if bytes.is_empty() {
        return Err(StoreError::BadValue);
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use satchel_engine::MemoryEngine;
    use serde::Deserialize;
    use std::collections::HashMap;

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    struct Item {
        name: String,
        count: u32,
        attrs: HashMap<String, String>,
    }

    fn item(name: &str, count: u32) -> Item {
        Item {
            name: name.to_string(),
            count,
            attrs: HashMap::new(),
        }
    }

    fn memory_store<T: Serialize + DeserializeOwned>() -> (KvStore<T>, Arc<MemoryEngine>) {
        let engine = Arc::new(MemoryEngine::new());
        (
            KvStore::with_engine(engine.clone() as Arc<dyn KvEngine>),
            engine,
        )
    }

    // -----------------------------------------------------------------------
    // Put / Get
    // -----------------------------------------------------------------------

    #[test]
    fn put_then_get_roundtrips() {
        let (store, _) = memory_store::<Item>();
        let value = item("widget", 7);
        store.put("k", &value).unwrap();
        assert_eq!(store.get("k").unwrap(), value);
    }

    #[test]
    fn put_overwrites_existing() {
        let (store, _) = memory_store::<Item>();
        store.put("k", &item("old", 1)).unwrap();
        store.put("k", &item("new", 2)).unwrap();
        assert_eq!(store.get("k").unwrap().name, "new");
    }

    #[test]
    fn empty_string_key_behaves_like_any_other() {
        let (store, _) = memory_store::<Item>();
        store.put("", &item("rooted", 0)).unwrap();
        assert_eq!(store.get("").unwrap().name, "rooted");
        store.delete("").unwrap();
        assert!(matches!(store.get(""), Err(StoreError::NotFound)));
    }

    #[test]
    fn zero_byte_encoding_is_rejected_as_bad_value() {
        let (store, engine) = memory_store::<()>();
        assert!(matches!(store.put("k", &()), Err(StoreError::BadValue)));
        // Nothing was stored.
        assert_eq!(engine.get("k").unwrap(), None);
    }

    #[test]
    fn corrupt_payload_surfaces_as_decode_error() {
        let (store, engine) = memory_store::<Item>();
        engine.put("k", &[0x01, 0x02], None).unwrap();
        assert!(matches!(store.get("k"), Err(StoreError::Decode(_))));
    }

    // -----------------------------------------------------------------------
    // Not-found symmetry
    // -----------------------------------------------------------------------

    #[test]
    fn get_and_delete_agree_on_missing_keys() {
        let (store, _) = memory_store::<Item>();
        assert!(matches!(store.get("ghost"), Err(StoreError::NotFound)));
        assert!(matches!(store.delete("ghost"), Err(StoreError::NotFound)));
    }

    #[test]
    fn double_delete_is_not_found() {
        let (store, _) = memory_store::<Item>();
        store.put("k", &item("x", 1)).unwrap();
        store.delete("k").unwrap();
        assert!(matches!(store.delete("k"), Err(StoreError::NotFound)));
    }

    // -----------------------------------------------------------------------
    // TTL
    // -----------------------------------------------------------------------

    #[test]
    fn ttl_entry_expires_without_delete() {
        let (store, _) = memory_store::<Item>();
        store
            .put_with_ttl("k", &item("fleeting", 1), Duration::from_millis(10))
            .unwrap();
        assert_eq!(store.get("k").unwrap().name, "fleeting");

        std::thread::sleep(Duration::from_millis(30));
        assert!(matches!(store.get("k"), Err(StoreError::NotFound)));
    }

    // -----------------------------------------------------------------------
    // Prefix scans and iteration
    // -----------------------------------------------------------------------

    #[test]
    fn prefix_scan_returns_exact_matches_in_key_order() {
        let (store, _) = memory_store::<Item>();
        store.put("B-1", &item("b1", 3)).unwrap();
        store.put("A-2", &item("a2", 2)).unwrap();
        store.put("A-1", &item("a1", 1)).unwrap();

        let names: Vec<String> = store
            .get_with_prefix("A-")
            .unwrap()
            .into_iter()
            .map(|i| i.name)
            .collect();
        assert_eq!(names, vec!["a1", "a2"]);
    }

    #[test]
    fn prefix_scan_without_matches_is_empty() {
        let (store, _) = memory_store::<Item>();
        store.put("A-1", &item("a1", 1)).unwrap();
        assert!(store.get_with_prefix("Z-").unwrap().is_empty());
    }

    #[test]
    fn keys_and_get_all_skip_tag_rows() {
        let (store, _) = memory_store::<Item>();
        store
            .put_with_tags("user-1", &item("tagged", 1), &["red"])
            .unwrap();
        store.put("user-2", &item("plain", 2)).unwrap();

        assert_eq!(store.keys().unwrap(), vec!["user-1", "user-2"]);
        assert_eq!(store.get_all().unwrap().len(), 2);
    }

    #[test]
    fn get_all_fails_fast_on_one_corrupt_entry() {
        let (store, engine) = memory_store::<Item>();
        store.put("good-1", &item("a", 1)).unwrap();
        store.put("good-2", &item("b", 2)).unwrap();
        engine.put("bad", &[0xff], None).unwrap();

        assert!(matches!(store.get_all(), Err(StoreError::Decode(_))));
    }

    #[test]
    fn exists_reflects_liveness() {
        let (store, _) = memory_store::<Item>();
        assert!(!store.exists("k").unwrap());
        store.put("k", &item("x", 1)).unwrap();
        assert!(store.exists("k").unwrap());
        store.delete("k").unwrap();
        assert!(!store.exists("k").unwrap());
    }

    // -----------------------------------------------------------------------
    // Randomized concurrent stress
    // -----------------------------------------------------------------------

    #[test]
    fn concurrent_random_operations_never_corrupt() {
        use rand::Rng;

        let (store, _) = memory_store::<Item>();
        let store = Arc::new(store);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    let mut rng = rand::thread_rng();
                    for _ in 0..200 {
                        let key = format!("key-{}", rng.gen_range(0..16));
                        match rng.gen_range(0..3) {
                            0 => store.put(&key, &item(&key, 1)).unwrap(),
                            1 => match store.get(&key) {
                                Ok(value) => assert_eq!(value.name, key),
                                Err(StoreError::NotFound) => {}
                                Err(e) => panic!("unexpected error: {e}"),
                            },
                            _ => match store.delete(&key) {
                                Ok(()) | Err(StoreError::NotFound) => {}
                                Err(e) => panic!("unexpected error: {e}"),
                            },
                        }
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().expect("thread should not panic");
        }
    }

    // -----------------------------------------------------------------------
    // Durable backend smoke test
    // -----------------------------------------------------------------------

    #[test]
    fn durable_store_roundtrips_and_persists() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("store.redb");

        let store: KvStore<Item> = KvStore::open(&path).unwrap();
        store
            .put_with_tags("k", &item("durable", 9), &["kept"])
            .unwrap();
        store.close().unwrap();

        let store: KvStore<Item> = KvStore::open(&path).unwrap();
        assert_eq!(store.get("k").unwrap().name, "durable");
        assert_eq!(store.get_with_tag("kept").unwrap().len(), 1);
    }

    #[test]
    fn second_open_of_locked_path_times_out() {
        use satchel_engine::EngineError;

        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("store.redb");
        let _held: KvStore<Item> = KvStore::open(&path).unwrap();

        let result: StoreResult<KvStore<Item>> = KvStore::open(&path);
        assert!(matches!(
            result,
            Err(StoreError::Engine(EngineError::Locked { .. }))
        ));
    }
}
