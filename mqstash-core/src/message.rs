//! Wire-level message handed over by the protocol layer.

use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::{properties::MessageProperties, qos::QoS};

/// MQTT message as seen by the broker protocol layer.
///
/// Only `id` is mandatory. Every other field may be absent, which matters when
/// a message is pushed again for an id that is already stored: absent fields
/// leave the stored values untouched.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Message {
    /// Externally assigned identity, stable across retransmission.
    pub id: String,
    pub topic: Option<String>,
    /// Payload data - Bytes is reference-counted for cheap cloning
    pub payload: Option<Bytes>,
    pub qos: Option<QoS>,
    pub retain: Option<bool>,
    /// `true` for messages published by this side, `false` for received ones.
    pub out: Option<bool>,
    pub create_at: Option<DateTime<Utc>>,
    pub properties: Option<MessageProperties>,
}

impl Message {
    pub fn new(id: impl Into<String>) -> Self {
        Message {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    pub fn with_payload(mut self, payload: impl Into<Bytes>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    pub fn with_qos(mut self, qos: QoS) -> Self {
        self.qos = Some(qos);
        self
    }

    pub fn with_retain(mut self, retain: bool) -> Self {
        self.retain = Some(retain);
        self
    }

    pub fn with_out(mut self, out: bool) -> Self {
        self.out = Some(out);
        self
    }

    pub fn with_create_at(mut self, create_at: DateTime<Utc>) -> Self {
        self.create_at = Some(create_at);
        self
    }

    pub fn with_properties(mut self, properties: MessageProperties) -> Self {
        self.properties = Some(properties);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_sets_only_given_fields() {
        let msg = Message::new("m1")
            .with_topic("sensors/temp")
            .with_qos(QoS::AtLeastOnce);

        assert_eq!(msg.id, "m1");
        assert_eq!(msg.topic.as_deref(), Some("sensors/temp"));
        assert_eq!(msg.qos, Some(QoS::AtLeastOnce));
        assert!(msg.payload.is_none());
        assert!(msg.retain.is_none());
        assert!(msg.properties.is_none());
    }
}
