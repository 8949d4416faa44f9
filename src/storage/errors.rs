use chrono::{DateTime, Utc};
use sled::transaction::TransactionError;
use thiserror::Error;

/// Errors that can arise while reading or writing the bot's database.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Wrapper around sled's error type.
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    /// Wrapper around bincode serialization and deserialization errors.
    #[error("serialization error: {0}")]
    Bincode(#[from] bincode::Error),

    /// Node snapshots are kept as JSON text.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Wrapper around IO errors (directory creation, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A row with the same creation timestamp already exists.
    #[error("timestamp collision in {table} at {timestamp}")]
    TimestampCollision {
        table: &'static str,
        timestamp: DateTime<Utc>,
    },

    /// The instant cannot be encoded as nanoseconds since the epoch.
    #[error("timestamp out of range: {0}")]
    TimestampRange(DateTime<Utc>),

    /// Returned when deserializing a row with an unexpected schema version.
    #[error("schema mismatch for {entity}: expected {expected}, got {found}")]
    SchemaMismatch {
        entity: &'static str,
        expected: u8,
        found: u8,
    },
}

impl From<TransactionError<StorageError>> for StorageError {
    fn from(err: TransactionError<StorageError>) -> Self {
        match err {
            TransactionError::Abort(inner) => inner,
            TransactionError::Storage(e) => StorageError::Sled(e),
        }
    }
}
