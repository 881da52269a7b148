//! Storage abstraction layer for mqstash.
//!
//! This crate provides the traits the message service and push-property cache
//! persist through, the record shapes they expect the backing store to expose,
//! and two backends (in-memory and, behind the `sqlite` feature, SQLite).

pub mod codec;
pub mod memory;
pub mod record;

#[cfg(feature = "sqlite")]
pub mod sqlite;

use async_trait::async_trait;
use thiserror::Error;

pub use codec::{CorrelationEncoding, MergePolicy, PropertyColumns};
pub use record::{ConnectionRecord, MessageField, MessageRecord};

/// Error type for storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage operation failed: {0}")]
    OperationFailed(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[cfg(feature = "sqlite")]
    #[error("Database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),
}

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Trait for message record persistence.
///
/// Records are keyed by message id; saving an existing id replaces the row.
#[async_trait]
pub trait MessageRecordStore: Send + Sync {
    /// Look up a message record by id.
    async fn find_message(&self, id: &str) -> Result<Option<MessageRecord>>;

    /// Insert or update a message record by id, returning what was persisted.
    async fn save_message(&self, record: &MessageRecord) -> Result<MessageRecord>;

    /// Delete every record whose id is in `ids`. Unknown ids are ignored.
    async fn delete_messages(&self, ids: &[String]) -> Result<()>;

    /// Get all records whose `field` equals `value`, oldest first.
    async fn query_messages(&self, field: MessageField, value: &str)
        -> Result<Vec<MessageRecord>>;
}

/// Trait for connection record persistence.
///
/// The broker's connection management owns these records; the push-property
/// cache only reads them and rewrites their push-prop shadow.
#[async_trait]
pub trait ConnectionRecordStore: Send + Sync {
    /// Look up a connection record by id.
    async fn find_connection(&self, id: &str) -> Result<Option<ConnectionRecord>>;

    /// Insert or update a connection record by id.
    async fn save_connection(&self, record: &ConnectionRecord) -> Result<ConnectionRecord>;

    /// Delete a connection record.
    async fn delete_connection(&self, id: &str) -> Result<()>;

    /// List all stored connection ids.
    async fn list_connections(&self) -> Result<Vec<String>>;
}

/// Combined trait for everything the mqstash services need.
pub trait BrokerStore: MessageRecordStore + ConnectionRecordStore {}

/// Blanket implementation for any type implementing both storage traits.
impl<T> BrokerStore for T where T: MessageRecordStore + ConnectionRecordStore {}
