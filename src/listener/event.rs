//! Expiration Events

use crate::error::CodecError;
use crate::mapping::{from_bucket, Bucket};
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

/// Raised once per expired record.
///
/// `value` is only present if a shadow copy of the record was still around
/// when the notification was processed.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpiredEvent {
    /// Channel the notification arrived on
    pub channel: String,
    /// The expired key, `keyspace:id`
    pub key: Bytes,
    pub keyspace: String,
    pub id: Bytes,
    /// The recovered value, scalars as strings
    pub value: Option<JsonValue>,
    bucket: Option<Bucket>,
}

impl ExpiredEvent {
    pub(crate) fn new(channel: String, key: Bytes, keyspace: String, id: Bytes, bucket: Option<Bucket>) -> Self {
        let value = bucket.as_ref().and_then(|bucket| from_bucket(bucket).ok());
        Self {
            channel,
            key,
            keyspace,
            id,
            value,
            bucket,
        }
    }

    /// Type alias stored with the recovered value.
    pub fn type_hint(&self) -> Option<&str> {
        self.bucket.as_ref().and_then(|bucket| bucket.type_hint())
    }

    /// Decodes the recovered value into `T`, `Ok(None)` if nothing was recovered.
    pub fn value_as<T: DeserializeOwned>(&self) -> Result<Option<T>, CodecError> {
        self.bucket.as_ref().map(from_bucket).transpose()
    }

    /// The id as UTF-8 text.
    pub fn id_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.id).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Deserialize)]
    struct Session {
        user: String,
        hits: u32,
    }

    fn event(bucket: Option<Bucket>) -> ExpiredEvent {
        ExpiredEvent::new(
            "__keyevent@0__:expired".to_string(),
            Bytes::from("session:1"),
            "session".to_string(),
            Bytes::from("1"),
            bucket,
        )
    }

    #[test]
    fn test_recovered_value() {
        let mut bucket = Bucket::new();
        bucket.put("_class", "Session");
        bucket.put("user", "jon");
        bucket.put("hits", "3");

        let event = event(Some(bucket));
        assert_eq!(event.id_str(), Some("1"));
        assert_eq!(event.type_hint(), Some("Session"));
        assert_eq!(event.value.as_ref().unwrap()["hits"], "3");
        assert_eq!(
            event.value_as::<Session>().unwrap(),
            Some(Session {
                user: "jon".to_string(),
                hits: 3
            })
        );
    }

    #[test]
    fn test_nothing_recovered() {
        let event = event(None);
        assert!(event.value.is_none());
        assert!(event.type_hint().is_none());
        assert_eq!(event.value_as::<Session>().unwrap(), None);
    }
}
