//! Conversion between wire-level messages and message records.

use mqstash_core::Message;
use mqstash_storage::{CorrelationEncoding, MessageRecord, PropertyColumns};

use crate::{Result, ServiceError};

/// Flattens a message into its record, bound to `connection_id` if given.
///
/// Correlation data is kept as raw bytes. An absent or empty property bag
/// leaves every property column empty.
pub fn model_to_entity(message: Message, connection_id: Option<&str>) -> MessageRecord {
    let properties = message
        .properties
        .as_ref()
        .map(|props| PropertyColumns::encode(props, CorrelationEncoding::Binary))
        .unwrap_or_default();

    MessageRecord {
        id: message.id,
        connection_id: connection_id.map(str::to_string),
        topic: message.topic,
        payload: message.payload,
        qos: message.qos,
        retain: message.retain,
        out: message.out,
        create_at: message.create_at,
        properties,
    }
}

/// Rebuilds a message from its record.
///
/// The connection binding is a storage concern and is dropped. `properties`
/// is `None` when every property column is empty.
pub fn entity_to_model(record: MessageRecord) -> Result<Message> {
    let MessageRecord {
        id,
        connection_id: _,
        topic,
        payload,
        qos,
        retain,
        out,
        create_at,
        properties,
    } = record;

    let properties = if properties.is_empty() {
        None
    } else {
        Some(
            properties
                .decode()
                .map_err(|e| ServiceError::for_record(&id, e))?,
        )
    };

    Ok(Message {
        id,
        topic,
        payload,
        qos,
        retain,
        out,
        create_at,
        properties,
    })
}
