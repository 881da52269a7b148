//! MQTT 5 publish properties carried alongside a stored message.

use bytes::Bytes;

/// A single user property. MQTT 5 allows the same key to appear more than
/// once, so user properties are kept as an ordered list rather than a map.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserProperty {
    pub key: String,
    pub value: String,
}

impl UserProperty {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        UserProperty {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// The publish property set a message (or a connection's push defaults) may carry.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MessageProperties {
    pub payload_format_indicator: Option<u8>,
    pub message_expiry_interval: Option<u32>,
    pub topic_alias: Option<u16>,
    pub response_topic: Option<String>,
    pub correlation_data: Option<Bytes>,
    pub subscription_identifier: Option<u32>,
    pub content_type: Option<String>,
    pub user_properties: Option<Vec<UserProperty>>,
}

impl MessageProperties {
    /// Returns `true` when no property is set.
    pub fn is_empty(&self) -> bool {
        self.payload_format_indicator.is_none()
            && self.message_expiry_interval.is_none()
            && self.topic_alias.is_none()
            && self.response_topic.is_none()
            && self.correlation_data.is_none()
            && self.subscription_identifier.is_none()
            && self.content_type.is_none()
            && self.user_properties.is_none()
    }

    /// Appends a user property, creating the list on first use.
    pub fn push_user_property(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.user_properties
            .get_or_insert_with(Vec::new)
            .push(UserProperty::new(key, value));
    }
}
