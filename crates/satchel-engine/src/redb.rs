use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use ::redb::{Database, DatabaseError, ReadableTable, StorageError, TableDefinition};
use tracing::{debug, warn};

use crate::config::{Durability, EngineConfig};
use crate::error::{EngineError, EngineResult};
use crate::record::{now_millis, ValueRecord};
use crate::traits::KvEngine;

/// Single table holding every row (user entries and index rows alike),
/// keyed by string, valued by a bincode-serialized [`ValueRecord`].
const KV_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("kv");

/// Poll interval while waiting for the backend's exclusive file lock.
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Map any backend error into [`EngineError::Backend`].
fn backend<E: std::fmt::Display>(err: E) -> EngineError {
    EngineError::Backend(err.to_string())
}

/// Durable engine backed by redb.
///
/// redb supplies the transaction model, crash recovery and the
/// single-writer file lock; this type only adapts its byte-keyed API to
/// [`KvEngine`] and layers the expiry envelope on top. Reads run on MVCC
/// snapshots and never block each other; writes serialize inside redb.
pub struct RedbEngine {
    db: Database,
    durability: ::redb::Durability,
    path: PathBuf,
}

impl RedbEngine {
    /// Open or create the database at `path`.
    ///
    /// Parent directories must already exist. If another handle (in this
    /// process or another) holds the file open, the open is retried until
    /// `config.lock_timeout` elapses and then fails with
    /// [`EngineError::Locked`] -- a bounded wait, never a hang. On Unix
    /// the file is restricted to mode `0640`.
    pub fn open(path: impl AsRef<Path>, config: EngineConfig) -> EngineResult<Self> {
        let path = path.as_ref().to_path_buf();
        let db = open_with_lock_timeout(&path, config.lock_timeout)?;
        restrict_permissions(&path)?;

        // Create the table up front so reads never observe a missing table.
        let txn = db.begin_write().map_err(backend)?;
        {
            let _table = txn.open_table(KV_TABLE).map_err(backend)?;
        }
        txn.commit().map_err(backend)?;

        debug!(path = %path.display(), "engine opened");
        Ok(Self {
            db,
            durability: match config.durability {
                Durability::Eventual => ::redb::Durability::Eventual,
                Durability::Immediate => ::redb::Durability::Immediate,
            },
            path,
        })
    }

    /// Path of the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the given rows if they are still expired.
    ///
    /// Runs in its own write transaction after the scan that found the
    /// rows has released its read snapshot. Each row is re-checked: it may
    /// have been overwritten in between.
    fn sweep(&self, keys: &[String]) -> EngineResult<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let now = now_millis()?;
        let mut txn = self.db.begin_write().map_err(backend)?;
        txn.set_durability(self.durability);
        {
            let mut table = txn.open_table(KV_TABLE).map_err(backend)?;
            for key in keys {
                let still_expired = match table.get(key.as_str()).map_err(backend)? {
                    Some(guard) => ValueRecord::decode(guard.value())?.is_expired(now),
                    None => false,
                };
                if still_expired {
                    table.remove(key.as_str()).map_err(backend)?;
                }
            }
        }
        txn.commit().map_err(backend)?;
        debug!(count = keys.len(), "reclaimed expired rows");
        Ok(())
    }
}

impl KvEngine for RedbEngine {
    fn get(&self, key: &str) -> EngineResult<Option<Vec<u8>>> {
        let record = {
            let txn = self.db.begin_read().map_err(backend)?;
            let table = txn.open_table(KV_TABLE).map_err(backend)?;
            match table.get(key).map_err(backend)? {
                Some(guard) => Some(ValueRecord::decode(guard.value())?),
                None => None,
            }
        };
        let now = now_millis()?;
        match record {
            Some(record) if record.is_expired(now) => {
                // Read snapshot is closed; reclaim the dead row.
                self.sweep(&[key.to_string()])?;
                Ok(None)
            }
            Some(record) => Ok(Some(record.payload)),
            None => Ok(None),
        }
    }

    fn put(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> EngineResult<()> {
        let bytes = ValueRecord::from_parts(value.to_vec(), ttl)?.encode()?;
        let mut txn = self.db.begin_write().map_err(backend)?;
        txn.set_durability(self.durability);
        {
            let mut table = txn.open_table(KV_TABLE).map_err(backend)?;
            table.insert(key, bytes.as_slice()).map_err(backend)?;
        }
        txn.commit().map_err(backend)?;
        Ok(())
    }

    fn delete(&self, key: &str) -> EngineResult<bool> {
        let mut txn = self.db.begin_write().map_err(backend)?;
        txn.set_durability(self.durability);
        let removed = {
            let mut table = txn.open_table(KV_TABLE).map_err(backend)?;
            let removed = table
                .remove(key)
                .map_err(backend)?
                .map(|guard| guard.value().to_vec());
            removed
        };
        txn.commit().map_err(backend)?;
        match removed {
            Some(bytes) => Ok(!ValueRecord::decode(&bytes)?.is_expired(now_millis()?)),
            None => Ok(false),
        }
    }

    fn scan_prefix(&self, prefix: &str) -> EngineResult<Vec<(String, Vec<u8>)>> {
        let now = now_millis()?;
        let mut live = Vec::new();
        let mut dead = Vec::new();
        {
            let txn = self.db.begin_read().map_err(backend)?;
            let table = txn.open_table(KV_TABLE).map_err(backend)?;
            for item in table.range(prefix..).map_err(backend)? {
                let (key, value) = item.map_err(backend)?;
                let key = key.value();
                if !key.starts_with(prefix) {
                    break;
                }
                let record = ValueRecord::decode(value.value())?;
                if record.is_expired(now) {
                    dead.push(key.to_string());
                } else {
                    live.push((key.to_string(), record.payload));
                }
            }
        }
        self.sweep(&dead)?;
        Ok(live)
    }

    fn keys(&self) -> EngineResult<Vec<String>> {
        let now = now_millis()?;
        let mut live = Vec::new();
        let mut dead = Vec::new();
        {
            let txn = self.db.begin_read().map_err(backend)?;
            let table = txn.open_table(KV_TABLE).map_err(backend)?;
            for item in table.iter().map_err(backend)? {
                let (key, value) = item.map_err(backend)?;
                let record = ValueRecord::decode(value.value())?;
                if record.is_expired(now) {
                    dead.push(key.value().to_string());
                } else {
                    live.push(key.value().to_string());
                }
            }
        }
        self.sweep(&dead)?;
        Ok(live)
    }
}

impl std::fmt::Debug for RedbEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbEngine")
            .field("path", &self.path)
            .finish()
    }
}

/// Open the database, retrying while another handle holds the file lock.
///
/// The lock itself belongs to redb (single-writer constraint); this loop
/// only bounds the wait for it.
fn open_with_lock_timeout(path: &Path, timeout: Duration) -> EngineResult<Database> {
    let deadline = Instant::now() + timeout;
    loop {
        match Database::create(path) {
            Ok(db) => return Ok(db),
            Err(e) if is_locked(&e) => {
                if Instant::now() >= deadline {
                    warn!(path = %path.display(), ?timeout, "gave up waiting for file lock");
                    return Err(EngineError::Locked {
                        path: path.to_path_buf(),
                        timeout,
                    });
                }
                thread::sleep(LOCK_POLL_INTERVAL);
            }
            Err(e) => return Err(backend(e)),
        }
    }
}

/// `true` when the error means another handle holds the file lock.
fn is_locked(err: &DatabaseError) -> bool {
    match err {
        DatabaseError::DatabaseAlreadyOpen => true,
        DatabaseError::Storage(StorageError::Io(io)) => {
            io.kind() == std::io::ErrorKind::WouldBlock
        }
        _ => false,
    }
}

/// Restrict the database file to owner read/write, group read (0640).
fn restrict_permissions(path: &Path) -> EngineResult<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o640))?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}
