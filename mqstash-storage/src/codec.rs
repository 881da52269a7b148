//! Flat column codec for the MQTT 5 property set.
//!
//! Records keep the nested property bag of a [`Message`] as flat columns.
//! Message records and connection push-prop shadows share the same column
//! set, declared once in the `property_columns!` table below; the struct, the
//! merge rules and the SQLite column helpers are all generated from it.
//!
//! [`Message`]: mqstash_core::Message

use mqstash_core::{MessageProperties, UserProperty};
use serde_json::Value;

use crate::{Result, StorageError};

/// How a write combines an incoming column set with the stored one.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MergePolicy {
    /// Present incoming fields win; absent incoming fields keep the stored value.
    KeepExisting,
    /// Every field is replaced, absent incoming fields clear the stored value.
    Overwrite,
}

/// Storage encoding for correlation data.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CorrelationEncoding {
    /// Bytes are stored as given.
    Binary,
    /// Bytes are coerced to UTF-8 text first. Invalid sequences are replaced
    /// with U+FFFD, so binary correlation data does not survive this encoding.
    Text,
}

impl CorrelationEncoding {
    fn apply(self, data: &[u8]) -> Vec<u8> {
        match self {
            CorrelationEncoding::Binary => data.to_vec(),
            CorrelationEncoding::Text => String::from_utf8_lossy(data).into_owned().into_bytes(),
        }
    }
}

macro_rules! property_columns {
    ($($field:ident: $ty:ty => $sql:literal),* $(,)?) => {
        /// MQTT 5 properties flattened to one optional value per column.
        ///
        /// `user_properties` holds the serialized form produced by
        /// [`encode_user_properties`].
        #[derive(Clone, Debug, Default, PartialEq, Eq)]
        pub struct PropertyColumns {
            $(pub $field: Option<$ty>,)*
        }

        impl PropertyColumns {
            /// Column names in declaration order.
            pub const NAMES: &'static [&'static str] = &[$(stringify!($field)),*];

            /// Combines `self` (stored) with `incoming` according to `policy`.
            pub fn merge(self, incoming: Self, policy: MergePolicy) -> Self {
                match policy {
                    MergePolicy::KeepExisting => PropertyColumns {
                        $($field: incoming.$field.or(self.$field),)*
                    },
                    MergePolicy::Overwrite => incoming,
                }
            }

            /// Returns `true` when every column is empty.
            pub fn is_empty(&self) -> bool {
                true $(&& self.$field.is_none())*
            }

            #[cfg(feature = "sqlite")]
            pub(crate) fn column_defs(prefix: &str) -> String {
                [$(format!("{}{} {}", prefix, stringify!($field), $sql)),*].join(",\n")
            }

            #[cfg(feature = "sqlite")]
            pub(crate) fn column_names(prefix: &str) -> Vec<String> {
                Self::NAMES
                    .iter()
                    .map(|name| format!("{}{}", prefix, name))
                    .collect()
            }

            #[cfg(feature = "sqlite")]
            pub(crate) fn to_sql_values(&self) -> Vec<rusqlite::types::Value> {
                vec![$(rusqlite::types::Value::from(self.$field.clone())),*]
            }

            /// Reads the columns starting at `offset`, in declaration order.
            #[cfg(feature = "sqlite")]
            pub(crate) fn from_row(row: &rusqlite::Row<'_>, offset: usize) -> rusqlite::Result<Self> {
                let mut idx = offset;
                $(
                    let $field: Option<$ty> = row.get(idx)?;
                    idx += 1;
                )*
                let _ = idx;
                Ok(PropertyColumns { $($field,)* })
            }
        }
    };
}

property_columns! {
    payload_format_indicator: u8 => "INTEGER",
    message_expiry_interval: u32 => "INTEGER",
    topic_alias: u16 => "INTEGER",
    response_topic: String => "TEXT",
    correlation_data: Vec<u8> => "BLOB",
    subscription_identifier: u32 => "INTEGER",
    content_type: String => "TEXT",
    user_properties: String => "TEXT",
}

// The struct literals below list every column without `..`, so a column added
// to the table above fails to compile until both directions handle it.
impl PropertyColumns {
    /// Flattens a property bag into columns.
    pub fn encode(properties: &MessageProperties, correlation: CorrelationEncoding) -> Self {
        PropertyColumns {
            payload_format_indicator: properties.payload_format_indicator,
            message_expiry_interval: properties.message_expiry_interval,
            topic_alias: properties.topic_alias,
            response_topic: properties.response_topic.clone(),
            correlation_data: properties
                .correlation_data
                .as_ref()
                .map(|data| correlation.apply(data)),
            subscription_identifier: properties.subscription_identifier,
            content_type: properties.content_type.clone(),
            user_properties: properties
                .user_properties
                .as_deref()
                .map(encode_user_properties),
        }
    }

    /// Rebuilds the property bag.
    ///
    /// Fails with [`StorageError::SerializationError`] if the stored user
    /// properties are not valid.
    pub fn decode(self) -> Result<MessageProperties> {
        let user_properties = self
            .user_properties
            .as_deref()
            .map(decode_user_properties)
            .transpose()?;

        Ok(MessageProperties {
            payload_format_indicator: self.payload_format_indicator,
            message_expiry_interval: self.message_expiry_interval,
            topic_alias: self.topic_alias,
            response_topic: self.response_topic,
            correlation_data: self.correlation_data.map(Into::into),
            subscription_identifier: self.subscription_identifier,
            content_type: self.content_type,
            user_properties,
        })
    }
}

/// Serializes user properties as a JSON array of `[key, value]` pairs.
///
/// Order and duplicate keys are preserved; an empty list becomes `[]`.
pub fn encode_user_properties(properties: &[UserProperty]) -> String {
    Value::Array(
        properties
            .iter()
            .map(|p| {
                Value::Array(vec![
                    Value::String(p.key.clone()),
                    Value::String(p.value.clone()),
                ])
            })
            .collect(),
    )
    .to_string()
}

/// Inverse of [`encode_user_properties`].
pub fn decode_user_properties(text: &str) -> Result<Vec<UserProperty>> {
    let pairs: Vec<(String, String)> = serde_json::from_str(text)
        .map_err(|e| StorageError::SerializationError(format!("user properties: {}", e)))?;

    Ok(pairs
        .into_iter()
        .map(|(key, value)| UserProperty { key, value })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn full_properties() -> MessageProperties {
        MessageProperties {
            payload_format_indicator: Some(1),
            message_expiry_interval: Some(3600),
            topic_alias: Some(7),
            response_topic: Some("reply/to".to_string()),
            correlation_data: Some(Bytes::from_static(b"req-42")),
            subscription_identifier: Some(268_435_455),
            content_type: Some("application/json".to_string()),
            user_properties: Some(vec![
                UserProperty::new("k", "1"),
                UserProperty::new("a", "x"),
                UserProperty::new("k", "2"),
            ]),
        }
    }

    #[test]
    fn test_user_properties_round_trip_order_and_duplicates() {
        let props = vec![
            UserProperty::new("z", "last"),
            UserProperty::new("a", "first"),
            UserProperty::new("z", "again"),
            UserProperty::new("quote\"d", "new\nline"),
        ];

        let text = encode_user_properties(&props);
        assert_eq!(decode_user_properties(&text).unwrap(), props);
    }

    #[test]
    fn test_empty_user_properties_encode_to_empty_array() {
        let text = encode_user_properties(&[]);
        assert_eq!(text, "[]");
        assert!(decode_user_properties(&text).unwrap().is_empty());
    }

    #[test]
    fn test_malformed_user_properties_fail() {
        for text in ["", "not json", "{\"k\":\"v\"}", "[[\"only-key\"]]", "[[1,2]]"] {
            let err = decode_user_properties(text).unwrap_err();
            assert!(matches!(err, StorageError::SerializationError(_)), "{}", text);
        }
    }

    #[test]
    fn test_encode_decode_full_properties() {
        let props = full_properties();
        let columns = PropertyColumns::encode(&props, CorrelationEncoding::Binary);
        assert_eq!(columns.decode().unwrap(), props);
    }

    #[test]
    fn test_absent_and_empty_user_properties_stay_distinct() {
        let none = PropertyColumns::encode(&MessageProperties::default(), CorrelationEncoding::Binary);
        assert!(none.user_properties.is_none());
        assert!(none.is_empty());

        let empty = PropertyColumns::encode(
            &MessageProperties {
                user_properties: Some(vec![]),
                ..Default::default()
            },
            CorrelationEncoding::Binary,
        );
        assert_eq!(empty.user_properties.as_deref(), Some("[]"));
        assert_eq!(empty.decode().unwrap().user_properties, Some(vec![]));
    }

    #[test]
    fn test_text_correlation_is_lossy_for_binary_data() {
        let props = MessageProperties {
            correlation_data: Some(Bytes::from_static(&[b'i', b'd', 0xff, 0xfe])),
            ..Default::default()
        };

        let columns = PropertyColumns::encode(&props, CorrelationEncoding::Text);
        let decoded = columns.decode().unwrap();
        assert_eq!(
            decoded.correlation_data.unwrap(),
            Bytes::from("id\u{fffd}\u{fffd}")
        );

        let utf8 = MessageProperties {
            correlation_data: Some(Bytes::from_static(b"req-1")),
            ..Default::default()
        };
        let columns = PropertyColumns::encode(&utf8, CorrelationEncoding::Text);
        assert_eq!(columns.decode().unwrap(), utf8);
    }

    #[test]
    fn test_keep_existing_merge() {
        let stored = PropertyColumns {
            topic_alias: Some(5),
            content_type: Some("text/plain".to_string()),
            ..Default::default()
        };
        let incoming = PropertyColumns {
            content_type: Some("application/json".to_string()),
            ..Default::default()
        };

        let merged = stored.merge(incoming, MergePolicy::KeepExisting);
        assert_eq!(merged.topic_alias, Some(5));
        assert_eq!(merged.content_type.as_deref(), Some("application/json"));
    }

    #[test]
    fn test_overwrite_merge() {
        let stored = PropertyColumns {
            topic_alias: Some(5),
            ..Default::default()
        };
        let incoming = PropertyColumns {
            content_type: Some("x".to_string()),
            ..Default::default()
        };

        let merged = stored.merge(incoming.clone(), MergePolicy::Overwrite);
        assert_eq!(merged, incoming);
        assert!(merged.topic_alias.is_none());
    }

    #[test]
    fn test_names_follow_declaration_order() {
        assert_eq!(PropertyColumns::NAMES.len(), 8);
        assert_eq!(PropertyColumns::NAMES[0], "payload_format_indicator");
        assert_eq!(PropertyColumns::NAMES[7], "user_properties");
    }
}
