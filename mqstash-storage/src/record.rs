//! Persisted record shapes.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use mqstash_core::QoS;

use crate::codec::{MergePolicy, PropertyColumns};

/// Persisted form of a message queued for (or bound to) a connection.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MessageRecord {
    /// Primary key.
    pub id: String,
    /// `None` while the message is not bound to any connection.
    pub connection_id: Option<String>,
    pub topic: Option<String>,
    pub payload: Option<Bytes>,
    pub qos: Option<QoS>,
    pub retain: Option<bool>,
    pub out: Option<bool>,
    pub create_at: Option<DateTime<Utc>>,
    pub properties: PropertyColumns,
}

impl MessageRecord {
    /// Combines `self` (stored) with `incoming` field by field.
    ///
    /// The identity always comes from `incoming`.
    pub fn merge(self, incoming: MessageRecord, policy: MergePolicy) -> MessageRecord {
        match policy {
            MergePolicy::KeepExisting => MessageRecord {
                id: incoming.id,
                connection_id: incoming.connection_id.or(self.connection_id),
                topic: incoming.topic.or(self.topic),
                payload: incoming.payload.or(self.payload),
                qos: incoming.qos.or(self.qos),
                retain: incoming.retain.or(self.retain),
                out: incoming.out.or(self.out),
                create_at: incoming.create_at.or(self.create_at),
                properties: self.properties.merge(incoming.properties, policy),
            },
            MergePolicy::Overwrite => incoming,
        }
    }
}

/// Columns a message query can filter on.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MessageField {
    ConnectionId,
    Topic,
}

impl MessageField {
    /// Column name in the `messages` table.
    pub fn column(&self) -> &'static str {
        match self {
            MessageField::ConnectionId => "connection_id",
            MessageField::Topic => "topic",
        }
    }

    pub(crate) fn matches(&self, record: &MessageRecord, value: &str) -> bool {
        let field = match self {
            MessageField::ConnectionId => record.connection_id.as_deref(),
            MessageField::Topic => record.topic.as_deref(),
        };
        field == Some(value)
    }
}

/// Persisted connection, as far as this crate touches it.
///
/// Connections are created and removed by the broker's connection management.
/// The only part written here is the push-prop shadow and `update_at`.
#[derive(Clone, Debug, PartialEq)]
pub struct ConnectionRecord {
    pub id: String,
    pub client_id: Option<String>,
    pub create_at: DateTime<Utc>,
    pub update_at: Option<DateTime<Utc>>,
    /// Last properties pushed to this connection, stored as `push_props_*` columns.
    pub push_props: PropertyColumns,
}

impl ConnectionRecord {
    pub fn new(id: impl Into<String>, create_at: DateTime<Utc>) -> Self {
        ConnectionRecord {
            id: id.into(),
            client_id: None,
            create_at,
            update_at: None,
            push_props: PropertyColumns::default(),
        }
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Replaces the whole push-prop shadow and stamps `update_at`.
    pub fn replace_push_props(&mut self, push_props: PropertyColumns, now: DateTime<Utc>) {
        let previous = std::mem::take(&mut self.push_props);
        self.push_props = previous.merge(push_props, MergePolicy::Overwrite);
        self.update_at = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stored() -> MessageRecord {
        MessageRecord {
            id: "m1".to_string(),
            connection_id: Some("c1".to_string()),
            topic: Some("a".to_string()),
            payload: Some(Bytes::from_static(b"hello")),
            qos: Some(QoS::AtLeastOnce),
            retain: Some(false),
            out: Some(true),
            create_at: None,
            properties: PropertyColumns {
                content_type: Some("text/plain".to_string()),
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_keep_existing_keeps_absent_fields() {
        let incoming = MessageRecord {
            id: "m1".to_string(),
            payload: Some(Bytes::from_static(b"bye")),
            ..Default::default()
        };

        let merged = stored().merge(incoming, MergePolicy::KeepExisting);
        assert_eq!(merged.topic.as_deref(), Some("a"));
        assert_eq!(merged.payload, Some(Bytes::from_static(b"bye")));
        assert_eq!(merged.qos, Some(QoS::AtLeastOnce));
        assert_eq!(merged.connection_id.as_deref(), Some("c1"));
        assert_eq!(merged.properties.content_type.as_deref(), Some("text/plain"));
    }

    #[test]
    fn test_overwrite_replaces_everything() {
        let incoming = MessageRecord {
            id: "m1".to_string(),
            ..Default::default()
        };

        let merged = stored().merge(incoming.clone(), MergePolicy::Overwrite);
        assert_eq!(merged, incoming);
    }

    #[test]
    fn test_message_field_matches() {
        let record = stored();
        assert!(MessageField::ConnectionId.matches(&record, "c1"));
        assert!(!MessageField::ConnectionId.matches(&record, "c2"));
        assert!(MessageField::Topic.matches(&record, "a"));

        let unbound = MessageRecord::default();
        assert!(!MessageField::ConnectionId.matches(&unbound, ""));
    }

    #[test]
    fn test_replace_push_props_stamps_update_at() {
        let created = DateTime::from_timestamp_millis(1_700_000_000_000).unwrap();
        let now = DateTime::from_timestamp_millis(1_700_000_100_000).unwrap();
        let mut connection = ConnectionRecord::new("c1", created);
        connection.push_props.topic_alias = Some(5);

        connection.replace_push_props(
            PropertyColumns {
                content_type: Some("x".to_string()),
                ..Default::default()
            },
            now,
        );

        assert!(connection.push_props.topic_alias.is_none());
        assert_eq!(connection.push_props.content_type.as_deref(), Some("x"));
        assert_eq!(connection.update_at, Some(now));
        assert_eq!(connection.create_at, created);
    }
}
