//! Expiration Listener
//!
//! When the store expires a record, nothing in the application removes its id
//! from the keyspace id-set or its index memberships. This listener does, on
//! every `__keyevent@*__:expired` notification for a record key:
//!
//! 1. Reads and deletes the shadow copy `keyspace:id:phantom` (unless shadow
//!    copies are off); its bucket becomes the recovered value
//! 2. Removes the id from the keyspace id-set
//! 3. Removes the id from every index of the keyspace
//! 4. Publishes an [`ExpiredEvent`]
//!
//! Every step tolerates the id already being gone, so processing the same
//! notification twice is harmless.

use crate::adapter::keys::{keyspace_key, phantom_key, KeyspaceIdentifier};
use crate::config::ShadowCopy;
use crate::error::StoreResult;
use crate::index::IndexWriter;
use crate::listener::container::MessageListener;
use crate::listener::event::ExpiredEvent;
use crate::mapping::Bucket;
use crate::storage::{KeyValueStore, Message, NOTIFY_KEYSPACE_EVENTS};
use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Topic pattern of expired key notifications, across all databases.
pub const EXPIRED_TOPIC: &str = "__keyevent@*__:expired";

/// Reconciles the id-set and indexes of expired records.
pub struct ExpirationListener {
    store: Arc<dyn KeyValueStore>,
    shadow_copy: ShadowCopy,
    events: broadcast::Sender<ExpiredEvent>,
}

impl ExpirationListener {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        shadow_copy: ShadowCopy,
        events: broadcast::Sender<ExpiredEvent>,
    ) -> Self {
        Self {
            store,
            shadow_copy,
            events,
        }
    }

    /// Enables keyspace notifications on the store if it has none configured.
    ///
    /// An empty or missing `parameter` keeps the store settings.
    pub fn configure_notifications(&self, parameter: Option<&str>) -> StoreResult<()> {
        let Some(parameter) = parameter.filter(|p| !p.is_empty()) else {
            return Ok(());
        };

        let current = self.store.get_config(NOTIFY_KEYSPACE_EVENTS)?;
        if current.as_deref().unwrap_or("").is_empty() {
            self.store.set_config(NOTIFY_KEYSPACE_EVENTS, parameter)?;
            info!(value = parameter, "Enabled keyspace notifications");
        }
        Ok(())
    }

    /// Processes the expiry of `key`.
    ///
    /// Returns the published event, or `None` if `key` is not a record key.
    pub fn handle(&self, channel: &[u8], key: &[u8]) -> StoreResult<Option<ExpiredEvent>> {
        let Some(identifier) = KeyspaceIdentifier::parse(key) else {
            return Ok(None);
        };

        let bucket = match self.shadow_copy {
            ShadowCopy::Off => None,
            ShadowCopy::On | ShadowCopy::Default => self.read_shadow_copy(&identifier),
        };

        self.store
            .srem(&keyspace_key(&identifier.keyspace), &identifier.id)?;
        IndexWriter::new(self.store.as_ref()).remove_key_from_indexes(&identifier.keyspace, &identifier.id)?;

        debug!(
            keyspace = %identifier.keyspace,
            id = ?identifier.id,
            recovered = bucket.is_some(),
            "Reconciled expired record"
        );

        let event = ExpiredEvent::new(
            String::from_utf8_lossy(channel).into_owned(),
            Bytes::copy_from_slice(key),
            identifier.keyspace,
            identifier.id,
            bucket,
        );
        // No subscribers is fine
        let _ = self.events.send(event.clone());
        Ok(Some(event))
    }

    /// Reads and consumes the shadow copy. Failures only lose the value.
    fn read_shadow_copy(&self, identifier: &KeyspaceIdentifier) -> Option<Bucket> {
        let phantom = phantom_key(&identifier.keyspace, &identifier.id);

        let raw = match self.store.hgetall(&phantom) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "Failed to read shadow copy");
                return None;
            }
        };
        if raw.is_empty() {
            return None;
        }

        if let Err(e) = self.store.del(&phantom) {
            warn!(error = %e, "Failed to delete shadow copy");
        }

        let bucket = Bucket::from_raw(raw);
        if bucket.is_type_hint_only() {
            return None;
        }
        Some(bucket)
    }
}

impl MessageListener for ExpirationListener {
    fn on_message(&self, message: &Message, _pattern: &str) {
        if message.channel.is_empty() || message.payload.is_empty() {
            return;
        }

        if let Err(e) = self.handle(&message.channel, &message.payload) {
            error!(error = %e, key = ?message.payload, "Failed to reconcile expired record");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::IndexedData;
    use crate::storage::{StorageEngine, KEYEVENT_EXPIRED_CHANNEL};

    fn setup(shadow_copy: ShadowCopy) -> (Arc<StorageEngine>, ExpirationListener, broadcast::Receiver<ExpiredEvent>) {
        let store = Arc::new(StorageEngine::new());
        let (events, rx) = broadcast::channel(16);
        let listener = ExpirationListener::new(store.clone(), shadow_copy, events);

        // What is left behind when person:42 expires
        let id = Bytes::from("42");
        store.sadd(Bytes::from("person"), vec![id.clone()]).unwrap();
        IndexWriter::new(store.as_ref())
            .create_indexes(
                &id,
                &[IndexedData::Simple {
                    keyspace: "person".to_string(),
                    path: "firstname".to_string(),
                    value: Bytes::from("Jon"),
                }],
            )
            .unwrap();
        store
            .hset(
                Bytes::from("person:42:phantom"),
                vec![
                    (Bytes::from("_class"), Bytes::from("Person")),
                    (Bytes::from("firstname"), Bytes::from("Jon")),
                ],
            )
            .unwrap();

        (store, listener, rx)
    }

    #[test]
    fn test_reconciles_and_recovers() {
        let (store, listener, mut rx) = setup(ShadowCopy::On);

        let event = listener
            .handle(KEYEVENT_EXPIRED_CHANNEL.as_bytes(), b"person:42")
            .unwrap()
            .unwrap();

        assert_eq!(event.keyspace, "person");
        assert_eq!(event.id, Bytes::from("42"));
        assert_eq!(event.channel, KEYEVENT_EXPIRED_CHANNEL);
        assert_eq!(event.value.as_ref().unwrap()["firstname"], "Jon");

        assert!(!store.sismember(&Bytes::from("person"), &Bytes::from("42")).unwrap());
        assert!(!store.exists(&Bytes::from("person:firstname:Jon")));
        assert!(!store.exists(&Bytes::from("person:42:idx")));
        // Shadow copy is consumed
        assert!(!store.exists(&Bytes::from("person:42:phantom")));

        assert_eq!(rx.try_recv().unwrap(), event);
    }

    #[test]
    fn test_shadow_copy_off_is_not_read() {
        let (store, listener, _rx) = setup(ShadowCopy::Off);

        let event = listener
            .handle(KEYEVENT_EXPIRED_CHANNEL.as_bytes(), b"person:42")
            .unwrap()
            .unwrap();

        assert!(event.value.is_none());
        assert!(store.exists(&Bytes::from("person:42:phantom")));
        assert!(!store.sismember(&Bytes::from("person"), &Bytes::from("42")).unwrap());
    }

    #[test]
    fn test_reprocessing_is_idempotent() {
        let (store, listener, _rx) = setup(ShadowCopy::Default);

        listener
            .handle(KEYEVENT_EXPIRED_CHANNEL.as_bytes(), b"person:42")
            .unwrap();
        let keys_after_first = store.len();

        let second = listener
            .handle(KEYEVENT_EXPIRED_CHANNEL.as_bytes(), b"person:42")
            .unwrap()
            .unwrap();
        assert!(second.value.is_none());
        assert_eq!(store.len(), keys_after_first);
    }

    #[test]
    fn test_ignores_non_record_keys() {
        let (store, listener, mut rx) = setup(ShadowCopy::On);

        for key in [&b"person:42:phantom"[..], b"person:42:idx", b"person", b""] {
            assert!(listener
                .handle(KEYEVENT_EXPIRED_CHANNEL.as_bytes(), key)
                .unwrap()
                .is_none());
        }
        listener.on_message(&Message::new("", "person:42"), EXPIRED_TOPIC);

        assert!(rx.try_recv().is_err());
        assert!(store.sismember(&Bytes::from("person"), &Bytes::from("42")).unwrap());
    }

    #[test]
    fn test_configure_notifications_keeps_existing() {
        let (store, listener, _rx) = setup(ShadowCopy::Default);

        listener.configure_notifications(Some("Ex")).unwrap();
        assert_eq!(store.config_get(NOTIFY_KEYSPACE_EVENTS).as_deref(), Some("Ex"));

        store.config_set(NOTIFY_KEYSPACE_EVENTS, "KEA");
        listener.configure_notifications(Some("Ex")).unwrap();
        assert_eq!(store.config_get(NOTIFY_KEYSPACE_EVENTS).as_deref(), Some("KEA"));

        store.config_set(NOTIFY_KEYSPACE_EVENTS, "");
        listener.configure_notifications(None).unwrap();
        assert_eq!(store.config_get(NOTIFY_KEYSPACE_EVENTS).as_deref(), Some(""));
    }
}
