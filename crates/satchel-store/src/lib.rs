//! Typed, tag-indexed key-value store over an embedded ordered engine.
//!
//! `satchel-store` is the convenience layer: pick an element type, open a
//! path, and get typed Put/Get/Delete, lexicographic prefix scans,
//! per-entry TTLs, and secondary "tag" lookups. The durable heavy
//! lifting -- transactions, crash recovery, the single-writer file lock
//! -- belongs to the engine behind the
//! [`KvEngine`](satchel_engine::KvEngine) seam and is never reimplemented
//! here.
//!
//! The one piece of real machinery in this crate is the tag index (the
//! [`tags`] module): a `tag -> key set` mapping stored inside the same
//! engine, serialized by a store-owned lock, that tolerates stale members
//! and heals itself lazily when a tag is read.
//!
//! # Example
//!
//! ```no_run
//! use satchel_store::KvStore;
//!
//! # fn main() -> satchel_store::StoreResult<()> {
//! let store: KvStore<String> = KvStore::open("/var/lib/app/cache.redb")?;
//! store.put("greeting", &"hello".to_string())?;
//! store.put_with_tags("farewell", &"goodbye".to_string(), &["salutations"])?;
//!
//! let tagged = store.get_with_tag("salutations")?;
//! assert_eq!(tagged, vec!["goodbye".to_string()]);
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod error;
pub mod store;
pub mod tags;

// Re-export primary types at crate root for ergonomic imports.
pub use error::{StoreError, StoreResult};
pub use store::KvStore;
pub use tags::TagStats;

// Engine-facing surface, re-exported so most callers depend on one crate.
pub use satchel_engine::{Durability, EngineConfig, EngineError, KvEngine, MemoryEngine, RedbEngine};
