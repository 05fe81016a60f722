use satchel_engine::EngineError;

/// Errors from typed store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The key does not resolve to a live entry.
    #[error("key not found")]
    NotFound,

    /// The caller attempted to store a value with no representation:
    /// the value encodes to zero bytes.
    #[error("bad value: encodes to zero bytes")]
    BadValue,

    /// A value could not be serialized for storage.
    #[error("encode error: {0}")]
    Encode(String),

    /// Stored bytes could not be reconstructed into the expected type.
    #[error("decode error: {0}")]
    Decode(String),

    /// Error surfaced by the storage engine.
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Convenience alias used throughout the store crate.
pub type StoreResult<T> = std::result::Result<T, StoreError>;
