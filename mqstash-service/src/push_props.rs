//! Connection push-property cache.
//!
//! Each connection record carries a shadow copy of the last property set
//! pushed to it. A later delivery to the same connection, for instance after
//! the session is resumed, can reapply those properties without the caller
//! specifying them again.

use std::sync::Arc;

use mockable::Clock;
use mqstash_core::MessageProperties;
use mqstash_storage::{ConnectionRecordStore, CorrelationEncoding, PropertyColumns};
use tracing::debug;

use crate::{Result, ServiceError};

/// Remembers the last push properties of each connection.
pub struct PushPropertyCache<S, C>
where
    S: ConnectionRecordStore,
    C: Clock + Send + Sync,
{
    storage: Arc<S>,
    clock: Arc<C>,
}

impl<S, C> Clone for PushPropertyCache<S, C>
where
    S: ConnectionRecordStore,
    C: Clock + Send + Sync,
{
    fn clone(&self) -> Self {
        PushPropertyCache {
            storage: Arc::clone(&self.storage),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<S, C> PushPropertyCache<S, C>
where
    S: ConnectionRecordStore,
    C: Clock + Send + Sync,
{
    pub fn new(storage: Arc<S>, clock: Arc<C>) -> PushPropertyCache<S, C> {
        PushPropertyCache { storage, clock }
    }

    /// Replaces the push properties of `connection_id` with `properties`.
    ///
    /// Nothing happens when `properties` is `None` or the connection is not
    /// stored. The previous shadow is replaced as a whole: fields missing from
    /// `properties` are cleared. Correlation data is stored as text, so bytes
    /// that are not valid UTF-8 come back with replacement characters.
    pub async fn add_push_prop(
        &self,
        properties: Option<&MessageProperties>,
        connection_id: &str,
    ) -> Result<()> {
        let Some(properties) = properties else {
            return Ok(());
        };
        let Some(mut connection) = self.storage.find_connection(connection_id).await? else {
            debug!(
                "Skipping push properties for unknown connection `{}`",
                connection_id
            );
            return Ok(());
        };

        let push_props = PropertyColumns::encode(properties, CorrelationEncoding::Text);
        connection.replace_push_props(push_props, self.clock.utc());
        self.storage.save_connection(&connection).await?;
        debug!("Updated push properties for connection `{}`", connection_id);

        Ok(())
    }

    /// Get the push properties last stored for `connection_id`.
    ///
    /// Returns `None` only when the connection is not stored; a connection
    /// that never received push properties yields an empty property set.
    pub async fn get_push_prop(&self, connection_id: &str) -> Result<Option<MessageProperties>> {
        let Some(connection) = self.storage.find_connection(connection_id).await? else {
            return Ok(None);
        };

        connection
            .push_props
            .decode()
            .map(Some)
            .map_err(|e| ServiceError::for_record(connection_id, e))
    }
}
