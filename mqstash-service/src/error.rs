//! Service error types.

use mqstash_storage::StorageError;
use thiserror::Error;

/// Errors surfaced by the message service and the push-property cache.
///
/// A missing message or connection is never an error; operations report it
/// through `Option` or an empty result instead.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// A stored record could not be decoded (malformed user properties).
    #[error("Record `{id}` is corrupt: {reason}")]
    CorruptRecord { id: String, reason: String },

    /// The storage backend failed.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Result type for service operations.
pub type Result<T> = std::result::Result<T, ServiceError>;

impl ServiceError {
    /// Attributes a decoding failure to the record it was read from.
    pub(crate) fn for_record(id: &str, err: StorageError) -> Self {
        match err {
            StorageError::SerializationError(reason) => ServiceError::CorruptRecord {
                id: id.to_string(),
                reason,
            },
            other => ServiceError::Storage(other),
        }
    }
}
