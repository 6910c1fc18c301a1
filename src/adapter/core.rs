//! Keyspace Adapter
//!
//! [`KeyValueAdapter`] persists entities as hashes and keeps everything that
//! hangs off a record in step with it:
//!
//! ```text
//! put(42, person)
//!   DEL person:42                  -> 0 means insert
//!   HSET person:42 <bucket>
//!   SADD person 42                 (insert only)
//!   PEXPIRE person:42 <ttl>        (expiring records)
//!   HSET/PEXPIRE person:42:phantom (shadow copy, ttl + grace)
//!   index writer                   create (insert) or rebuild (overwrite)
//! ```
//!
//! Commands are issued one at a time without a transaction. A failure part
//! way through is returned to the caller and leaves earlier commands applied.

use crate::adapter::keys::{keyspace_key, object_key, phantom_key};
use crate::adapter::lifecycle::{Lifecycle, State};
use crate::config::{EnableKeyspaceEvents, MappingConfig, ShadowCopy};
use crate::error::{LifecycleError, Result, StoreResult};
use crate::index::{IndexReader, IndexWriter};
use crate::listener::{ExpirationListener, ExpiredEvent, ListenerContainer, MessageListener, EXPIRED_TOPIC};
use crate::mapping::{read_entity, read_value, write_entity, Bucket, Entity, TimeUnit};
use crate::storage::{Capability, KeyValueStore};
use bytes::Bytes;
use serde_json::Value as JsonValue;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, trace};

/// Listener container in use, and whether the adapter created it.
#[derive(Default)]
struct ContainerSlot {
    container: Option<Arc<ListenerContainer>>,
    managed: bool,
}

/// Maps entities onto a [`KeyValueStore`].
pub struct KeyValueAdapter {
    pub(crate) store: Arc<dyn KeyValueStore>,
    pub(crate) config: MappingConfig,
    lifecycle: Lifecycle,
    container: Mutex<ContainerSlot>,
    /// Set while an expiration listener is registered
    listener_active: AtomicBool,
    expiration_listener: Mutex<Option<Arc<dyn MessageListener>>>,
    events: broadcast::Sender<ExpiredEvent>,
}

impl KeyValueAdapter {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_config(store, MappingConfig::default())
    }

    pub fn with_config(store: Arc<dyn KeyValueStore>, config: MappingConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_buffer_size.max(1));
        Self {
            store,
            config,
            lifecycle: Lifecycle::new(),
            container: Mutex::new(ContainerSlot::default()),
            listener_active: AtomicBool::new(false),
            expiration_listener: Mutex::new(None),
            events,
        }
    }

    pub fn config(&self) -> &MappingConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    // ========================================================================
    // Records
    // ========================================================================

    /// Stores `entity` as `keyspace:id`, replacing any previous record.
    ///
    /// The entity's own id wins over `id` when it has one. Returns the entity.
    pub fn put<T: Entity>(&self, id: &str, entity: T) -> Result<T> {
        let id = entity.id().unwrap_or_else(|| id.to_string());
        let record = write_entity(&id, &entity)?;

        if self.config.enable_keyspace_events == EnableKeyspaceEvents::OnDemand
            && record.expires()
            && !self.listener_active.load(Ordering::Acquire)
        {
            let container = self.container();
            self.init_expiration_listener(&container)?;
        }

        let binary_id = Bytes::from(record.id.clone());
        let key = object_key(&record.keyspace, &binary_id);

        let is_new = !self.store.del(&key)?;
        self.store.hset(&key, record.bucket.to_raw())?;

        if is_new {
            self.store.sadd(&keyspace_key(&record.keyspace), &binary_id)?;
        }

        if let Some(ttl) = record.time_to_live.filter(|_| record.expires()) {
            self.expire(&key, ttl)?;
        }

        if self.keep_shadow_copy() {
            let phantom = phantom_key(&record.keyspace, &binary_id);
            match record.time_to_live.filter(|_| record.expires()) {
                Some(ttl) => self.write_shadow_copy(&phantom, &record.bucket, ttl)?,
                None if !is_new => {
                    self.store.del(&phantom)?;
                }
                None => {}
            }
        }

        let writer = IndexWriter::new(self.store.as_ref());
        if is_new {
            writer.create_indexes(&binary_id, &record.indexed)?;
        } else {
            writer.delete_and_update_indexes(&record.keyspace, &binary_id, &record.indexed)?;
        }

        debug!(
            keyspace = %record.keyspace,
            id = %record.id,
            inserted = is_new,
            fields = record.bucket.len(),
            indexes = record.indexed.len(),
            "Stored record"
        );
        Ok(entity)
    }

    /// Reads the record `id` of `T`'s keyspace.
    ///
    /// If `T` has an explicit time-to-live property it is filled with the
    /// remaining TTL of the record.
    pub fn get<T: Entity>(&self, id: &str) -> Result<Option<T>> {
        let schema = &T::SCHEMA;
        let key = object_key(schema.keyspace, id.as_bytes());

        let Some(mut bucket) = self.read_bucket(&key)? else {
            return Ok(None);
        };

        if let Some((path, unit)) = schema.explicit_ttl_property() {
            if let Some(remaining) = self.remaining_ttl(&key, unit)? {
                bucket.put(path, remaining.to_string());
            }
        }

        Ok(Some(read_entity(&bucket)?))
    }

    /// Reads a record without a target type. Scalars come back as strings.
    pub fn get_value(&self, id: &str, keyspace: &str) -> Result<Option<JsonValue>> {
        let key = object_key(keyspace, id.as_bytes());
        match self.read_bucket(&key)? {
            Some(bucket) => Ok(Some(read_value(&bucket)?)),
            None => Ok(None),
        }
    }

    /// True if `id` is in the id-set of `keyspace`. Does not read the record.
    pub fn contains(&self, id: &str, keyspace: &str) -> Result<bool> {
        Ok(self
            .store
            .sismember(&keyspace_key(keyspace), &Bytes::copy_from_slice(id.as_bytes()))?)
    }

    /// Deletes the record `id` with its id-set membership, index memberships
    /// and shadow copy. Returns the deleted entity.
    pub fn delete<T: Entity>(&self, id: &str) -> Result<Option<T>> {
        let schema = &T::SCHEMA;
        let Some(value) = self.get::<T>(id)? else {
            return Ok(None);
        };

        let binary_id = Bytes::copy_from_slice(id.as_bytes());
        let key = object_key(schema.keyspace, &binary_id);

        self.store.del(&key)?;
        self.store.srem(&keyspace_key(schema.keyspace), &binary_id)?;
        IndexWriter::new(self.store.as_ref()).remove_key_from_indexes(schema.keyspace, &binary_id)?;

        if self.keep_shadow_copy() && schema.is_expiring() {
            self.store.del(&phantom_key(schema.keyspace, &binary_id))?;
        }

        debug!(keyspace = schema.keyspace, id = id, "Deleted record");
        Ok(Some(value))
    }

    /// Reads every record of `T`'s keyspace.
    pub fn get_all_of<T: Entity>(&self) -> Result<Vec<T>> {
        self.get_all_of_paged(0, None)
    }

    /// Reads a page of the records of `T`'s keyspace.
    ///
    /// The page is a slice of one snapshot of the id-set, so pages of
    /// separate calls may overlap. Records that vanish between reading the
    /// id-set and reading the record are skipped.
    pub fn get_all_of_paged<T: Entity>(&self, offset: usize, rows: Option<usize>) -> Result<Vec<T>> {
        let ids = self.index_reader().ids(T::SCHEMA.keyspace, offset, rows)?;

        let mut result = Vec::with_capacity(ids.len());
        for id in ids {
            let id = String::from_utf8_lossy(&id);
            if let Some(value) = self.get::<T>(&id)? {
                result.push(value);
            }
        }
        Ok(result)
    }

    /// Number of ids in `keyspace`.
    pub fn count(&self, keyspace: &str) -> Result<usize> {
        Ok(self.index_reader().count(keyspace)?)
    }

    /// Deletes the id-set and every key below `keyspace:`.
    pub fn delete_all_of(&self, keyspace: &str) -> Result<()> {
        self.store.del(&keyspace_key(keyspace))?;
        let deleted = IndexWriter::new(self.store.as_ref()).remove_all_indexes(keyspace)?;

        debug!(keyspace = keyspace, deleted = deleted, "Deleted keyspace");
        Ok(())
    }

    /// Lookups against the indexes this adapter maintains.
    pub fn index_reader(&self) -> IndexReader<'_> {
        IndexReader::new(self.store.as_ref())
    }

    /// Subscribes to expiration events.
    pub fn subscribe_expirations(&self) -> broadcast::Receiver<ExpiredEvent> {
        self.events.subscribe()
    }

    fn read_bucket(&self, key: &Bytes) -> Result<Option<Bucket>> {
        let raw = self.store.hgetall(key)?;
        if raw.is_empty() {
            return Ok(None);
        }
        Ok(Some(Bucket::from_raw(raw)))
    }

    // ========================================================================
    // Expiry
    // ========================================================================

    /// Sets the TTL of `key`, in milliseconds when the store supports it.
    pub(crate) fn expire(&self, key: &Bytes, ttl: Duration) -> StoreResult<bool> {
        if self.store.supports(Capability::MillisecondExpiry) {
            self.store.pexpire(key, ttl.as_millis() as u64)
        } else {
            self.store.expire(key, TimeUnit::Seconds.from_duration(ttl))
        }
    }

    /// Remaining TTL of `key` in `unit`, `-1` if it does not expire.
    fn remaining_ttl(&self, key: &Bytes, unit: TimeUnit) -> StoreResult<Option<i64>> {
        if unit == TimeUnit::Seconds {
            return self.store.ttl(key);
        }

        let millis = if self.store.supports(Capability::MillisecondExpiry) {
            self.store.pttl(key)?
        } else {
            self.store
                .ttl(key)?
                .map(|seconds| if seconds < 0 { seconds } else { seconds * 1000 })
        };
        Ok(millis.map(|ms| unit.from_remaining_millis(ms)))
    }

    /// Whether shadow copies are written for expiring records right now.
    pub(crate) fn keep_shadow_copy(&self) -> bool {
        match self.config.shadow_copy {
            ShadowCopy::Off => false,
            ShadowCopy::On => true,
            ShadowCopy::Default => self.listener_active.load(Ordering::Acquire),
        }
    }

    /// Replaces the shadow copy at `phantom` with `bucket`, living `ttl` plus
    /// the grace period.
    fn write_shadow_copy(&self, phantom: &Bytes, bucket: &Bucket, ttl: Duration) -> StoreResult<()> {
        self.store.del(phantom)?;
        self.store.hset(phantom, bucket.to_raw())?;
        self.expire(phantom, ttl + self.config.phantom_grace)?;
        trace!(key = ?phantom, "Wrote shadow copy");
        Ok(())
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    pub fn state(&self) -> State {
        self.lifecycle.state()
    }

    pub fn is_running(&self) -> bool {
        self.lifecycle.is_started()
    }

    /// True while an expiration listener is registered.
    pub fn is_listening_for_expirations(&self) -> bool {
        self.listener_active.load(Ordering::Acquire)
    }

    /// Starts the listener container and, with
    /// [`EnableKeyspaceEvents::OnStartup`], registers the expiration listener.
    ///
    /// With [`EnableKeyspaceEvents::Off`] no subscription is made. Starting a
    /// running adapter is a no-op.
    pub fn start(&self) -> Result<()> {
        if !self.lifecycle.begin_start()? {
            return Ok(());
        }

        match self.start_listening() {
            Ok(()) => {
                self.lifecycle.transition(State::Starting, State::Started)?;
                info!("Adapter started");
                Ok(())
            }
            Err(e) => {
                let _ = self.lifecycle.transition(State::Starting, State::Stopped);
                Err(e)
            }
        }
    }

    fn start_listening(&self) -> Result<()> {
        if self.config.enable_keyspace_events == EnableKeyspaceEvents::Off {
            return Ok(());
        }

        let container = self.container();
        container.start()?;
        if self.config.enable_keyspace_events == EnableKeyspaceEvents::OnStartup {
            self.init_expiration_listener(&container)?;
        }
        Ok(())
    }

    /// Unregisters the expiration listener and stops the listener container.
    pub fn stop(&self) -> Result<()> {
        if !self.lifecycle.begin_stop()? {
            return Ok(());
        }

        self.stop_listening();
        self.lifecycle.transition(State::Stopping, State::Stopped)?;
        info!("Adapter stopped");
        Ok(())
    }

    fn stop_listening(&self) {
        let container = self.container.lock().unwrap().container.clone();
        let listener = self.expiration_listener.lock().unwrap().take();

        if self.listener_active.swap(false, Ordering::AcqRel) {
            if let (Some(container), Some(listener)) = (&container, &listener) {
                container.remove_listener(listener);
            }
            debug!("Expiration listener unregistered");
        }
        if let Some(container) = container {
            container.stop();
        }
    }

    /// Stops the adapter and releases a managed listener container. Terminal.
    pub fn destroy(&self) -> Result<()> {
        match self.stop() {
            Ok(()) | Err(crate::error::MappingError::Lifecycle(LifecycleError::Destroyed)) => {}
            Err(e) => return Err(e),
        }

        // Registered on demand without a start
        self.stop_listening();

        let mut slot = self.container.lock().unwrap();
        if slot.managed {
            slot.container = None;
        }
        drop(slot);

        if self.lifecycle.destroy() != State::Destroyed {
            info!("Adapter destroyed");
        }
        Ok(())
    }

    /// Uses `container` instead of a container the adapter creates itself.
    ///
    /// Fails once the adapter has created its own container.
    pub fn set_listener_container(&self, container: Arc<ListenerContainer>) -> std::result::Result<(), LifecycleError> {
        let mut slot = self.container.lock().unwrap();
        if slot.managed && slot.container.is_some() {
            return Err(LifecycleError::ContainerAlreadyInitialized);
        }
        slot.managed = false;
        slot.container = Some(container);
        Ok(())
    }

    /// The container in use, creating a managed one on first use.
    fn container(&self) -> Arc<ListenerContainer> {
        let mut slot = self.container.lock().unwrap();
        if let Some(container) = &slot.container {
            return Arc::clone(container);
        }

        let container = Arc::new(ListenerContainer::new(Arc::clone(&self.store)));
        slot.container = Some(Arc::clone(&container));
        slot.managed = true;
        debug!("Created managed listener container");
        container
    }

    /// Registers the expiration listener once.
    fn init_expiration_listener(&self, container: &ListenerContainer) -> Result<()> {
        if self
            .listener_active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(());
        }

        let listener = ExpirationListener::new(
            Arc::clone(&self.store),
            self.config.shadow_copy,
            self.events.clone(),
        );
        if let Err(e) = listener.configure_notifications(self.config.keyspace_notifications_config.as_deref()) {
            self.listener_active.store(false, Ordering::Release);
            return Err(e.into());
        }

        let listener: Arc<dyn MessageListener> = Arc::new(listener);
        container.add_listener(EXPIRED_TOPIC, Arc::clone(&listener));
        *self.expiration_listener.lock().unwrap() = Some(listener);

        info!(topic = EXPIRED_TOPIC, "Expiration listener registered");
        Ok(())
    }
}

impl Drop for KeyValueAdapter {
    fn drop(&mut self) {
        if self.lifecycle.state() != State::Destroyed {
            let _ = self.destroy();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::{EntitySchema, IndexDefinition, TimeToLive};
    use crate::storage::StorageEngine;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Person {
        firstname: String,
        age: u32,
    }

    impl Entity for Person {
        const SCHEMA: EntitySchema = EntitySchema::new("person", "Person")
            .with_indexes(&[IndexDefinition::equality("firstname")]);

        fn id(&self) -> Option<String> {
            None
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Session {
        id: String,
        user: String,
        ttl: Option<i64>,
    }

    impl Entity for Session {
        const SCHEMA: EntitySchema = EntitySchema::new("session", "Session").with_time_to_live(
            TimeToLive::Property {
                path: "ttl",
                unit: TimeUnit::Seconds,
            },
        );

        fn id(&self) -> Option<String> {
            Some(self.id.clone())
        }
    }

    fn jon() -> Person {
        Person {
            firstname: "Jon".to_string(),
            age: 30,
        }
    }

    fn session(ttl: Option<i64>) -> Session {
        Session {
            id: "s1".to_string(),
            user: "jon".to_string(),
            ttl,
        }
    }

    fn adapter(config: MappingConfig) -> (Arc<StorageEngine>, KeyValueAdapter) {
        let store = Arc::new(StorageEngine::new());
        let adapter = KeyValueAdapter::with_config(store.clone(), config);
        (store, adapter)
    }

    fn key(s: &str) -> Bytes {
        Bytes::from(s.to_string())
    }

    #[test]
    fn test_put_get_roundtrip() {
        let (store, adapter) = adapter(MappingConfig::default());

        let stored = adapter.put("42", jon()).unwrap();
        assert_eq!(stored, jon());

        assert_eq!(adapter.get::<Person>("42").unwrap(), Some(jon()));
        assert!(adapter.contains("42", "person").unwrap());
        assert_eq!(adapter.count("person").unwrap(), 1);
        assert!(store.sismember(&key("person:firstname:Jon"), &key("42")).unwrap());
        assert_eq!(
            store.hget(&key("person:42"), &key("_class")).unwrap(),
            Some(key("Person"))
        );
    }

    #[test]
    fn test_get_missing_is_none() {
        let (_store, adapter) = adapter(MappingConfig::default());
        assert_eq!(adapter.get::<Person>("404").unwrap(), None);
        assert_eq!(adapter.get_value("404", "person").unwrap(), None);
        assert_eq!(adapter.delete::<Person>("404").unwrap(), None);
        assert!(!adapter.contains("404", "person").unwrap());
    }

    #[test]
    fn test_overwrite_reindexes() {
        let (store, adapter) = adapter(MappingConfig::default());

        adapter.put("42", jon()).unwrap();
        adapter
            .put(
                "42",
                Person {
                    firstname: "Ygritte".to_string(),
                    age: 19,
                },
            )
            .unwrap();

        assert!(!store.exists(&key("person:firstname:Jon")));
        assert!(store.sismember(&key("person:firstname:Ygritte"), &key("42")).unwrap());
        assert_eq!(adapter.count("person").unwrap(), 1);
    }

    #[test]
    fn test_delete_removes_all_traces() {
        let (store, adapter) = adapter(MappingConfig::default());
        adapter.put("42", jon()).unwrap();

        assert_eq!(adapter.delete::<Person>("42").unwrap(), Some(jon()));
        assert!(!adapter.contains("42", "person").unwrap());
        assert_eq!(adapter.get::<Person>("42").unwrap(), None);
        assert!(!store.exists(&key("person:firstname:Jon")));
        assert!(store.is_empty());
    }

    #[test]
    fn test_entity_id_wins() {
        let (_store, adapter) = adapter(MappingConfig::default());
        adapter.put("ignored", session(None)).unwrap();

        assert!(adapter.contains("s1", "session").unwrap());
        assert!(!adapter.contains("ignored", "session").unwrap());
    }

    #[test]
    fn test_expiring_record_and_ttl_read_back() {
        let (store, adapter) = adapter(MappingConfig {
            shadow_copy: ShadowCopy::On,
            ..Default::default()
        });

        adapter.put("s1", session(Some(100))).unwrap();

        let pttl = store.pttl(&key("session:s1")).unwrap();
        assert!(pttl > 99_000 && pttl <= 100_000);
        let phantom_ttl = store.ttl(&key("session:s1:phantom")).unwrap();
        assert!(phantom_ttl >= 399 && phantom_ttl <= 400);

        let read = adapter.get::<Session>("s1").unwrap().unwrap();
        let ttl = read.ttl.unwrap();
        assert!(ttl > 0 && ttl <= 100);
    }

    #[test]
    fn test_non_expiring_overwrite_drops_shadow_copy() {
        let (store, adapter) = adapter(MappingConfig {
            shadow_copy: ShadowCopy::On,
            ..Default::default()
        });

        adapter.put("s1", session(Some(100))).unwrap();
        assert!(store.exists(&key("session:s1:phantom")));

        adapter.put("s1", session(None)).unwrap();
        assert!(!store.exists(&key("session:s1:phantom")));
        assert_eq!(store.ttl(&key("session:s1")), Some(-1));
    }

    #[test]
    fn test_default_shadow_copy_needs_listener() {
        let (store, adapter) = adapter(MappingConfig::default());
        adapter.put("s1", session(Some(100))).unwrap();

        assert!(!adapter.is_listening_for_expirations());
        assert!(!store.exists(&key("session:s1:phantom")));
    }

    #[test]
    fn test_on_demand_registers_listener() {
        let (store, adapter) = adapter(MappingConfig {
            enable_keyspace_events: EnableKeyspaceEvents::OnDemand,
            ..Default::default()
        });

        adapter.put("42", jon()).unwrap();
        assert!(!adapter.is_listening_for_expirations());

        adapter.put("s1", session(Some(100))).unwrap();
        assert!(adapter.is_listening_for_expirations());
        assert!(store.exists(&key("session:s1:phantom")));
        assert_eq!(store.config_get("notify-keyspace-events").as_deref(), Some("Ex"));
    }

    #[test]
    fn test_get_all_of_and_delete_all_of() {
        let (store, adapter) = adapter(MappingConfig::default());
        for i in 0..5 {
            adapter.put(&i.to_string(), jon()).unwrap();
        }
        store.sadd(key("city"), vec![key("1")]).unwrap();

        assert_eq!(adapter.get_all_of::<Person>().unwrap().len(), 5);
        assert_eq!(adapter.get_all_of_paged::<Person>(3, Some(10)).unwrap().len(), 2);

        adapter.delete_all_of("person").unwrap();
        assert_eq!(adapter.count("person").unwrap(), 0);
        assert!(adapter.get_all_of::<Person>().unwrap().is_empty());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_get_all_of_skips_vanished_records() {
        let (store, adapter) = adapter(MappingConfig::default());
        adapter.put("1", jon()).unwrap();
        adapter.put("2", jon()).unwrap();
        store.delete(&key("person:2"));

        assert_eq!(adapter.get_all_of::<Person>().unwrap().len(), 1);
    }

    #[test]
    fn test_millisecond_fallback() {
        struct SecondsOnly(StorageEngine);

        // Delegate everything except the capability query
        impl KeyValueStore for SecondsOnly {
            fn hset(&self, key: &Bytes, fields: Vec<(Bytes, Bytes)>) -> StoreResult<()> { KeyValueStore::hset(&self.0, key, fields) }
            fn hget(&self, key: &Bytes, field: &Bytes) -> StoreResult<Option<Bytes>> { KeyValueStore::hget(&self.0, key, field) }
            fn hgetall(&self, key: &Bytes) -> StoreResult<Vec<(Bytes, Bytes)>> { KeyValueStore::hgetall(&self.0, key) }
            fn hkeys(&self, key: &Bytes) -> StoreResult<Vec<Bytes>> { KeyValueStore::hkeys(&self.0, key) }
            fn hdel(&self, key: &Bytes, fields: &[Bytes]) -> StoreResult<usize> { KeyValueStore::hdel(&self.0, key, fields) }
            fn sadd(&self, key: &Bytes, member: &Bytes) -> StoreResult<bool> { KeyValueStore::sadd(&self.0, key, member) }
            fn srem(&self, key: &Bytes, member: &Bytes) -> StoreResult<bool> { KeyValueStore::srem(&self.0, key, member) }
            fn sismember(&self, key: &Bytes, member: &Bytes) -> StoreResult<bool> { KeyValueStore::sismember(&self.0, key, member) }
            fn smembers(&self, key: &Bytes) -> StoreResult<Vec<Bytes>> { KeyValueStore::smembers(&self.0, key) }
            fn scard(&self, key: &Bytes) -> StoreResult<usize> { KeyValueStore::scard(&self.0, key) }
            fn zadd(&self, key: &Bytes, score: f64, member: &Bytes) -> StoreResult<bool> { KeyValueStore::zadd(&self.0, key, score, member) }
            fn zrem(&self, key: &Bytes, member: &Bytes) -> StoreResult<bool> { KeyValueStore::zrem(&self.0, key, member) }
            fn zrank(&self, key: &Bytes, member: &Bytes) -> StoreResult<Option<usize>> { KeyValueStore::zrank(&self.0, key, member) }
            fn zscore(&self, key: &Bytes, member: &Bytes) -> StoreResult<Option<f64>> { KeyValueStore::zscore(&self.0, key, member) }
            fn zrange_by_score(&self, key: &Bytes, min: f64, max: f64) -> StoreResult<Vec<(Bytes, f64)>> { KeyValueStore::zrange_by_score(&self.0, key, min, max) }
            fn del(&self, key: &Bytes) -> StoreResult<bool> { KeyValueStore::del(&self.0, key) }
            fn exists(&self, key: &Bytes) -> StoreResult<bool> { KeyValueStore::exists(&self.0, key) }
            fn expire(&self, key: &Bytes, seconds: u64) -> StoreResult<bool> { KeyValueStore::expire(&self.0, key, seconds) }
            fn pexpire(&self, _key: &Bytes, _millis: u64) -> StoreResult<bool> { Err(crate::error::StoreError::Unsupported("PEXPIRE")) }
            fn persist(&self, key: &Bytes) -> StoreResult<bool> { KeyValueStore::persist(&self.0, key) }
            fn ttl(&self, key: &Bytes) -> StoreResult<Option<i64>> { KeyValueStore::ttl(&self.0, key) }
            fn pttl(&self, _key: &Bytes) -> StoreResult<Option<i64>> { Err(crate::error::StoreError::Unsupported("PTTL")) }
            fn key_type(&self, key: &Bytes) -> StoreResult<&'static str> { KeyValueStore::key_type(&self.0, key) }
            fn keys(&self, pattern: &str) -> StoreResult<Vec<Bytes>> { KeyValueStore::keys(&self.0, pattern) }
            fn get_config(&self, parameter: &str) -> StoreResult<Option<String>> { KeyValueStore::get_config(&self.0, parameter) }
            fn set_config(&self, parameter: &str, value: &str) -> StoreResult<()> { KeyValueStore::set_config(&self.0, parameter, value) }
            fn publish(&self, channel: &Bytes, payload: &Bytes) -> StoreResult<usize> { KeyValueStore::publish(&self.0, channel, payload) }
            fn subscribe(&self) -> StoreResult<broadcast::Receiver<crate::storage::Message>> { KeyValueStore::subscribe(&self.0) }
            fn supports(&self, capability: Capability) -> bool { capability != Capability::MillisecondExpiry }
        }

        let store = Arc::new(SecondsOnly(StorageEngine::new()));
        let adapter = KeyValueAdapter::new(store.clone());

        adapter.put("s1", session(Some(2))).unwrap();
        assert!(matches!(store.0.ttl(&key("session:s1")), Some(1) | Some(2)));
        assert!(matches!(
            adapter.get::<Session>("s1").unwrap().unwrap().ttl,
            Some(1) | Some(2)
        ));
    }

    #[test]
    fn test_ttl_read_back_in_minutes() {
        #[derive(Debug, Serialize, Deserialize)]
        struct Lease {
            id: String,
            minutes: Option<i64>,
        }

        impl Entity for Lease {
            const SCHEMA: EntitySchema = EntitySchema::new("lease", "Lease").with_time_to_live(
                TimeToLive::Property {
                    path: "minutes",
                    unit: TimeUnit::Minutes,
                },
            );

            fn id(&self) -> Option<String> {
                Some(self.id.clone())
            }
        }

        let (store, adapter) = adapter(MappingConfig::default());
        adapter
            .put("l1", Lease { id: "l1".to_string(), minutes: Some(2) })
            .unwrap();

        let pttl = store.pttl(&key("lease:l1")).unwrap();
        assert!(pttl > 60_000 && pttl <= 120_000);
        // whole minutes, rounded down
        assert!(matches!(
            adapter.get::<Lease>("l1").unwrap().unwrap().minutes,
            Some(1) | Some(2)
        ));

        adapter
            .put("l2", Lease { id: "l2".to_string(), minutes: None })
            .unwrap();
        assert_eq!(adapter.get::<Lease>("l2").unwrap().unwrap().minutes, Some(-1));
    }

    #[test]
    fn test_set_listener_container_after_managed_fails() {
        let (store, adapter) = adapter(MappingConfig {
            enable_keyspace_events: EnableKeyspaceEvents::OnDemand,
            ..Default::default()
        });

        // Allowed before the adapter creates its own
        let custom = Arc::new(ListenerContainer::new(store.clone()));
        adapter.set_listener_container(Arc::clone(&custom)).unwrap();
        adapter.put("s1", session(Some(100))).unwrap();
        assert_eq!(custom.listener_count(), 1);

        let (_store, adapter) = adapter_with_managed_container();
        assert_eq!(
            adapter.set_listener_container(custom),
            Err(LifecycleError::ContainerAlreadyInitialized)
        );
    }

    fn adapter_with_managed_container() -> (Arc<StorageEngine>, KeyValueAdapter) {
        let (store, adapter) = adapter(MappingConfig {
            enable_keyspace_events: EnableKeyspaceEvents::OnDemand,
            ..Default::default()
        });
        adapter.put("s1", session(Some(100))).unwrap();
        (store, adapter)
    }

    #[test]
    fn test_start_off_needs_no_runtime() {
        let (_store, adapter) = adapter(MappingConfig::default());

        adapter.start().unwrap();
        assert!(adapter.is_running());
        adapter.stop().unwrap();
        assert_eq!(adapter.state(), State::Stopped);
        adapter.start().unwrap();
        adapter.destroy().unwrap();
        assert_eq!(adapter.state(), State::Destroyed);
        assert!(adapter.start().is_err());
    }

    #[test]
    fn test_failed_start_can_be_retried() {
        let (_store, adapter) = adapter(MappingConfig {
            enable_keyspace_events: EnableKeyspaceEvents::OnStartup,
            ..Default::default()
        });

        // No runtime outside #[tokio::test]
        assert!(adapter.start().is_err());
        assert_eq!(adapter.state(), State::Stopped);
    }

    #[tokio::test]
    async fn test_start_on_startup_registers_listener() {
        let (store, adapter) = adapter(MappingConfig {
            enable_keyspace_events: EnableKeyspaceEvents::OnStartup,
            ..Default::default()
        });

        adapter.start().unwrap();
        assert!(adapter.is_listening_for_expirations());
        assert_eq!(store.config_get("notify-keyspace-events").as_deref(), Some("Ex"));

        adapter.stop().unwrap();
        assert!(!adapter.is_listening_for_expirations());
        assert_eq!(adapter.state(), State::Stopped);
    }
}
