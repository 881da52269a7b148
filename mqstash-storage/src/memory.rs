//! In-memory storage backend.
//!
//! This module provides a thread-safe in-memory implementation of all storage traits.
//! Suitable for development, testing, and single-node deployments where persistence
//! across restarts is not required.

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use async_trait::async_trait;

use crate::{
    ConnectionRecord, ConnectionRecordStore, MessageField, MessageRecord, MessageRecordStore,
    Result, StorageError,
};

/// In-memory storage backend implementing all storage traits.
///
/// Uses `RwLock` for thread-safe concurrent access. All data is lost on restart.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    messages: Arc<RwLock<HashMap<String, MessageRecord>>>,
    connections: Arc<RwLock<HashMap<String, ConnectionRecord>>>,
}

impl MemoryStore {
    /// Create a new in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored message records.
    pub fn message_count(&self) -> Result<usize> {
        let messages = self
            .messages
            .read()
            .map_err(|e| StorageError::OperationFailed(e.to_string()))?;
        Ok(messages.len())
    }
}

#[async_trait]
impl MessageRecordStore for MemoryStore {
    async fn find_message(&self, id: &str) -> Result<Option<MessageRecord>> {
        let messages = self
            .messages
            .read()
            .map_err(|e| StorageError::OperationFailed(e.to_string()))?;
        Ok(messages.get(id).cloned())
    }

    async fn save_message(&self, record: &MessageRecord) -> Result<MessageRecord> {
        let mut messages = self
            .messages
            .write()
            .map_err(|e| StorageError::OperationFailed(e.to_string()))?;
        messages.insert(record.id.clone(), record.clone());
        Ok(record.clone())
    }

    async fn delete_messages(&self, ids: &[String]) -> Result<()> {
        let mut messages = self
            .messages
            .write()
            .map_err(|e| StorageError::OperationFailed(e.to_string()))?;
        for id in ids {
            messages.remove(id);
        }
        Ok(())
    }

    async fn query_messages(
        &self,
        field: MessageField,
        value: &str,
    ) -> Result<Vec<MessageRecord>> {
        let messages = self
            .messages
            .read()
            .map_err(|e| StorageError::OperationFailed(e.to_string()))?;

        let mut matched: Vec<MessageRecord> = messages
            .values()
            .filter(|record| field.matches(record, value))
            .cloned()
            .collect();
        matched.sort_by(|a, b| (a.create_at, &a.id).cmp(&(b.create_at, &b.id)));

        Ok(matched)
    }
}

#[async_trait]
impl ConnectionRecordStore for MemoryStore {
    async fn find_connection(&self, id: &str) -> Result<Option<ConnectionRecord>> {
        let connections = self
            .connections
            .read()
            .map_err(|e| StorageError::OperationFailed(e.to_string()))?;
        Ok(connections.get(id).cloned())
    }

    async fn save_connection(&self, record: &ConnectionRecord) -> Result<ConnectionRecord> {
        let mut connections = self
            .connections
            .write()
            .map_err(|e| StorageError::OperationFailed(e.to_string()))?;
        connections.insert(record.id.clone(), record.clone());
        Ok(record.clone())
    }

    async fn delete_connection(&self, id: &str) -> Result<()> {
        let mut connections = self
            .connections
            .write()
            .map_err(|e| StorageError::OperationFailed(e.to_string()))?;
        connections.remove(id);
        Ok(())
    }

    async fn list_connections(&self) -> Result<Vec<String>> {
        let connections = self
            .connections
            .read()
            .map_err(|e| StorageError::OperationFailed(e.to_string()))?;
        let mut ids: Vec<String> = connections.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}
