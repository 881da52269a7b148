//! Message store adapter.

use std::sync::Arc;

use mqstash_core::Message;
use mqstash_storage::{MergePolicy, MessageField, MessageRecordStore};
use tracing::{debug, info};

use crate::{
    keyed_lock::KeyedLocks,
    mapping::{entity_to_model, model_to_entity},
    Result, ServiceOptions,
};

/// Persists messages that must outlive the current processing step, such as
/// messages queued for an offline or slow client.
pub struct MessageService<S: MessageRecordStore> {
    storage: Arc<S>,
    upsert_locks: Option<Arc<KeyedLocks>>,
}

impl<S: MessageRecordStore> Clone for MessageService<S> {
    fn clone(&self) -> Self {
        MessageService {
            storage: Arc::clone(&self.storage),
            upsert_locks: self.upsert_locks.clone(),
        }
    }
}

impl<S: MessageRecordStore> MessageService<S> {
    pub fn new(storage: Arc<S>) -> MessageService<S> {
        Self::with_options(storage, ServiceOptions::default())
    }

    pub fn with_options(storage: Arc<S>, options: ServiceOptions) -> MessageService<S> {
        let upsert_locks = options
            .serialize_upserts
            .then(|| Arc::new(KeyedLocks::default()));

        MessageService {
            storage,
            upsert_locks,
        }
    }

    /// Stores `message` for `connection_id`, merging into any record with the same id.
    ///
    /// Fields present on `message` replace the stored ones; absent fields keep
    /// what is stored. The record is always rebound to `connection_id`.
    /// Returns the message as persisted. If the merged record cannot be
    /// decoded, `CorruptRecord` is returned and nothing is written.
    pub async fn push_to_connection(&self, message: Message, connection_id: &str) -> Result<Message> {
        let _guard = match &self.upsert_locks {
            Some(locks) => Some(locks.lock(&message.id).await),
            None => None,
        };

        let incoming = model_to_entity(message, Some(connection_id));
        let record = match self.storage.find_message(&incoming.id).await? {
            Some(existing) => {
                debug!(
                    "Merging message `{}` into stored record for connection `{}`",
                    incoming.id, connection_id
                );
                existing.merge(incoming, MergePolicy::KeepExisting)
            }
            None => {
                debug!(
                    "Storing new message `{}` for connection `{}`",
                    incoming.id, connection_id
                );
                incoming
            }
        };

        // A stored record that fails to decode is left untouched
        entity_to_model(record.clone())?;

        let saved = self.storage.save_message(&record).await?;
        entity_to_model(saved)
    }

    /// Get a stored message by id.
    pub async fn get(&self, id: &str) -> Result<Option<Message>> {
        self.storage
            .find_message(id)
            .await?
            .map(entity_to_model)
            .transpose()
    }

    /// Get every message stored for a connection, oldest first.
    pub async fn list_in_connection(&self, connection_id: &str) -> Result<Vec<Message>> {
        self.storage
            .query_messages(MessageField::ConnectionId, connection_id)
            .await?
            .into_iter()
            .map(entity_to_model)
            .collect()
    }

    /// Deletes a message and returns what was removed.
    ///
    /// Returns `None` without writing if no message has this id. A record
    /// that cannot be decoded is reported and left in place.
    pub async fn delete(&self, id: &str) -> Result<Option<Message>> {
        let Some(record) = self.storage.find_message(id).await? else {
            return Ok(None);
        };

        let removed = entity_to_model(record)?;
        self.storage.delete_messages(&[removed.id.clone()]).await?;
        debug!("Deleted message `{}`", id);

        Ok(Some(removed))
    }

    /// Discards every message stored for a connection in one batch delete.
    ///
    /// Returns the ids that were removed; empty if there was nothing to do.
    pub async fn clean_in_connection(&self, connection_id: &str) -> Result<Vec<String>> {
        let records = self
            .storage
            .query_messages(MessageField::ConnectionId, connection_id)
            .await?;
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<String> = records.into_iter().map(|record| record.id).collect();
        self.storage.delete_messages(&ids).await?;
        info!(
            "Removed {} stored messages for connection `{}`",
            ids.len(),
            connection_id
        );

        Ok(ids)
    }
}
