use std::io;
use std::path::PathBuf;
use std::time::Duration;

/// Errors produced by the storage engine seam.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The database file is exclusively locked by another handle and the
    /// bounded wait expired.
    #[error("database {path} is locked by another handle (waited {timeout:?})")]
    Locked { path: PathBuf, timeout: Duration },

    /// I/O error from the filesystem.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// Stored bytes could not be decoded into a value record.
    #[error("corrupt value record: {0}")]
    Corrupted(String),

    /// Error surfaced by the backing database.
    #[error("backend error: {0}")]
    Backend(String),

    /// The system clock reads before the UNIX epoch.
    #[error("system clock is before the UNIX epoch")]
    Clock,
}

/// Convenience alias used throughout the engine crate.
pub type EngineResult<T> = std::result::Result<T, EngineError>;
