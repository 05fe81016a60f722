//! Storage engine seam for Satchel.
//!
//! This crate defines the byte-oriented contract the typed layer builds
//! on -- an ordered key-value engine with lazy per-entry expiry -- and
//! ships two implementations of it:
//!
//! - [`RedbEngine`] -- durable backend over the `redb` embedded B-tree
//!   database. Transactions, crash recovery and the single-writer file
//!   lock all belong to redb; this crate never reimplements them.
//! - [`MemoryEngine`] -- `BTreeMap`-based store for tests and embedding.
//!
//! # Expiry model
//!
//! Every row carries a [`ValueRecord`] envelope with an optional absolute
//! expiry timestamp. Expiry is lazy: an expired row reads as absent and
//! is reclaimed when a read or scan touches it. There is no background
//! sweeper, so a dead row on a never-read key can linger indefinitely --
//! callers above this crate are built to tolerate that.
//!
//! # Design Rules
//!
//! 1. Scans return live entries in lexicographic key order.
//! 2. The engine never interprets payload bytes.
//! 3. Opening a locked database fails within a bounded wait, never hangs.
//! 4. All backend errors are propagated, never silently ignored.

pub mod config;
pub mod error;
pub mod memory;
pub mod record;
pub mod redb;
pub mod traits;

// Re-export primary types at crate root for ergonomic imports.
pub use config::{Durability, EngineConfig};
pub use error::{EngineError, EngineResult};
pub use memory::MemoryEngine;
pub use record::ValueRecord;
pub use self::redb::RedbEngine;
pub use traits::KvEngine;
