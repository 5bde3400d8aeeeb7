//! Error types for the storage layer.

use thiserror::Error;

/// Errors produced by the storage backends.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A value failed validation before reaching the store.
    #[error(transparent)]
    Value(#[from] pulse_proto::ProtoError),

    /// Snapshot file I/O failed.
    #[error("snapshot io: {0}")]
    Io(#[from] std::io::Error),

    /// The snapshot file does not hold valid JSON.
    #[error("snapshot encoding: {0}")]
    Encoding(#[from] serde_json::Error),

    /// A database statement failed.
    #[error("database: {0}")]
    Database(#[from] sqlx::Error),
}
