//! Partial Update Engine
//!
//! Applies a [`PartialUpdate`] to a stored record without rewriting its whole
//! bucket. Only the touched fields and the indexes of the touched paths change.
//!
//! Deletions and structured values (arrays, objects) replace every field
//! stored below their path, so those paths are inspected first: the current
//! field value, or every `path.*` field, is read back to find the fields and
//! index memberships to drop before the new fields are written.
//!
//! Paths into a single collection element (`nicknames.[0]`) are inspected
//! too. Their index assertions are only added, so the memberships of sibling
//! elements the update leaves alone survive.

use crate::adapter::core::KeyValueAdapter;
use crate::adapter::keys::{equality_index_key, geo_index_key, index_helper_key, object_key, phantom_key};
use crate::error::{CodecError, Result, StoreResult};
use crate::index::IndexWriter;
use crate::mapping::bucket::element_index;
use crate::mapping::converter::{indexed_path, resolve_indexes, time_to_live_of, to_json};
use crate::mapping::{Bucket, Entity, EntitySchema, IndexedData, TYPE_HINT_FIELD};
use bytes::Bytes;
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::collections::HashSet;
use std::fmt;
use std::marker::PhantomData;
use tracing::{debug, trace};

/// One property mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyUpdate {
    Set { path: String, value: JsonValue },
    Delete { path: String },
}

impl PropertyUpdate {
    pub fn path(&self) -> &str {
        match self {
            PropertyUpdate::Set { path, .. } | PropertyUpdate::Delete { path } => path,
        }
    }

    /// True if the fields currently stored at the path must be read back
    /// before the update is applied.
    fn needs_inspection(&self) -> bool {
        match self {
            PropertyUpdate::Delete { .. } => true,
            PropertyUpdate::Set { path, value } => {
                value.is_array() || value.is_object() || is_element_path(path)
            }
        }
    }
}

/// True if `path` addresses something inside a collection element.
fn is_element_path(path: &str) -> bool {
    path.split('.').any(|segment| element_index(segment).is_some())
}

/// A set of property mutations for one record of `T`.
///
/// ```
/// # use flashmap::adapter::PartialUpdate;
/// # use flashmap::mapping::{Entity, EntitySchema};
/// # use serde::{Deserialize, Serialize};
/// # #[derive(Serialize, Deserialize)]
/// # struct Person { firstname: String, age: u32 }
/// # impl Entity for Person {
/// #     const SCHEMA: EntitySchema = EntitySchema::new("person", "Person");
/// #     fn id(&self) -> Option<String> { None }
/// # }
/// let update = PartialUpdate::<Person>::new("42")
///     .set("age", 31)
///     .del("nickname");
/// assert_eq!(update.updates().len(), 2);
/// ```
pub struct PartialUpdate<T> {
    id: String,
    updates: Vec<PropertyUpdate>,
    refresh_ttl: bool,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity> PartialUpdate<T> {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            updates: Vec::new(),
            refresh_ttl: false,
            _entity: PhantomData,
        }
    }

    /// Sets `path` to `value`. A null value deletes the path.
    pub fn set(mut self, path: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        let path = path.into();
        let value = value.into();
        self.updates.push(if value.is_null() {
            PropertyUpdate::Delete { path }
        } else {
            PropertyUpdate::Set { path, value }
        });
        self
    }

    /// Sets `path` to any serializable value.
    pub fn set_serialized<V: Serialize + ?Sized>(self, path: impl Into<String>, value: &V) -> std::result::Result<Self, CodecError> {
        let value = to_json(value)?;
        Ok(self.set(path, value))
    }

    /// Removes `path` and everything stored below it.
    pub fn del(mut self, path: impl Into<String>) -> Self {
        self.updates.push(PropertyUpdate::Delete { path: path.into() });
        self
    }

    /// Recomputes the record's time-to-live from the updated properties.
    pub fn refresh_ttl(mut self, refresh: bool) -> Self {
        self.refresh_ttl = refresh;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn updates(&self) -> &[PropertyUpdate] {
        &self.updates
    }

    pub fn is_refresh_ttl(&self) -> bool {
        self.refresh_ttl
    }
}

impl<T> fmt::Debug for PartialUpdate<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PartialUpdate")
            .field("id", &self.id)
            .field("updates", &self.updates)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish()
    }
}

/// Fields and index memberships that an update removes.
#[derive(Default)]
struct Staged {
    fields: Vec<Bytes>,
    set_members: Vec<Bytes>,
    zset_members: Vec<Bytes>,
}

impl KeyValueAdapter {
    /// Applies `update` to the record it names.
    ///
    /// The record is not required to exist; a partial bucket is written as is.
    pub fn update<T: Entity>(&self, update: &PartialUpdate<T>) -> Result<()> {
        let schema = &T::SCHEMA;
        let keyspace = schema.keyspace;
        let id = Bytes::from(update.id.clone());
        let key = object_key(keyspace, &id);

        // element writes are indexed separately from whole-path writes
        let mut bucket = Bucket::new();
        bucket.put(TYPE_HINT_FIELD, schema.type_alias);
        let mut elements = Bucket::new();
        for property in &update.updates {
            if let PropertyUpdate::Set { path, value } = property {
                if is_element_path(path) {
                    elements.write_value(path, value);
                } else {
                    bucket.write_value(path, value);
                }
            }
        }
        let whole = resolve_indexes(schema, keyspace, &bucket);
        let element_indexes = resolve_indexes(schema, keyspace, &elements);
        for (field, value) in elements.iter() {
            bucket.put(field.clone(), value.clone());
        }

        let mut staged = Staged::default();
        let mut indexed = Vec::new();
        for property in update.updates.iter().filter(|p| p.needs_inspection()) {
            let path = property.path();
            self.stage_removals(&key, keyspace, &id, path, &mut staged)?;

            for index in schema.indexes {
                let below = index
                    .path
                    .strip_prefix(path)
                    .is_some_and(|rest| rest.starts_with('.'));
                if below {
                    indexed.push(removal(keyspace, index.path));
                } else if index.covers(path) && !is_element_path(path) {
                    indexed.push(removal(keyspace, path));
                }
            }
        }
        if !staged.set_members.is_empty() {
            self.keep_shared_memberships(&key, keyspace, &mut staged)?;
        }

        if !staged.fields.is_empty() {
            self.store.hdel(&key, &staged.fields)?;
            if self.keep_shadow_copy() && schema.is_expiring() {
                self.store.hdel(&phantom_key(keyspace, &id), &staged.fields)?;
            }
        }

        let helper = index_helper_key(keyspace, &id);
        for index_key in &staged.set_members {
            self.store.srem(index_key, &id)?;
            self.store.srem(&helper, index_key)?;
        }
        for index_key in &staged.zset_members {
            self.store.zrem(index_key, &id)?;
            self.store.srem(&helper, index_key)?;
        }

        if !bucket.is_empty() && !bucket.is_type_hint_only() {
            self.store.hset(&key, bucket.to_raw())?;
        }

        if update.refresh_ttl {
            self.refresh_time_to_live(&key, keyspace, &id, schema, &bucket)?;
        }

        indexed.extend(whole);
        let writer = IndexWriter::new(self.store.as_ref());
        writer.update_indexes(&id, &indexed)?;
        writer.create_indexes(&id, &element_indexes)?;

        debug!(
            keyspace = keyspace,
            id = %update.id,
            written = bucket.len(),
            removed_fields = staged.fields.len(),
            removed_memberships = staged.set_members.len() + staged.zset_members.len(),
            indexes = indexed.len() + element_indexes.len(),
            "Applied partial update"
        );
        Ok(())
    }

    /// Finds the fields and index memberships held by `path` today.
    fn stage_removals(
        &self,
        key: &Bytes,
        keyspace: &str,
        id: &Bytes,
        path: &str,
        staged: &mut Staged,
    ) -> StoreResult<()> {
        staged.fields.push(Bytes::from(path.to_string()));

        let field = Bytes::from(path.to_string());
        if let Some(value) = self.store.hget(key, &field)? {
            self.stage_equality_removal(keyspace, id, &indexed_path(path), &value, staged)?;
            return Ok(());
        }

        let prefix = format!("{}.", path);
        for field in self.store.hkeys(key)? {
            if !field.starts_with(prefix.as_bytes()) {
                continue;
            }
            if let Some(value) = self.store.hget(key, &field)? {
                let name = String::from_utf8_lossy(&field);
                self.stage_equality_removal(keyspace, id, &indexed_path(&name), &value, staged)?;
            }
            staged.fields.push(field);
        }

        let geo_key = geo_index_key(keyspace, path);
        if self.store.zrank(&geo_key, id)?.is_some() {
            trace!(index = ?geo_key, "Staged geo index removal");
            staged.zset_members.push(geo_key);
        }
        Ok(())
    }

    fn stage_equality_removal(
        &self,
        keyspace: &str,
        id: &Bytes,
        path: &str,
        value: &Bytes,
        staged: &mut Staged,
    ) -> StoreResult<()> {
        let index_key = equality_index_key(keyspace, path, value);
        if self.store.sismember(&index_key, id)? {
            trace!(index = ?index_key, "Staged index removal");
            staged.set_members.push(index_key);
        }
        Ok(())
    }

    /// Drops staged memberships that a field outliving the update still
    /// holds, such as a sibling element with the same value.
    fn keep_shared_memberships(&self, key: &Bytes, keyspace: &str, staged: &mut Staged) -> StoreResult<()> {
        let mut held = HashSet::new();
        for (field, value) in self.store.hgetall(key)? {
            if staged.fields.contains(&field) {
                continue;
            }
            let name = String::from_utf8_lossy(&field);
            held.insert(equality_index_key(keyspace, &indexed_path(&name), &value));
        }
        staged.set_members.retain(|index_key| !held.contains(index_key));
        Ok(())
    }

    /// Resets the TTL from the updated properties, or makes the record
    /// persistent if they no longer give one.
    fn refresh_time_to_live(
        &self,
        key: &Bytes,
        keyspace: &str,
        id: &Bytes,
        schema: &EntitySchema,
        bucket: &Bucket,
    ) -> StoreResult<()> {
        let phantom = phantom_key(keyspace, id);

        match time_to_live_of(schema, bucket).filter(|ttl| !ttl.is_zero()) {
            Some(ttl) => {
                self.expire(key, ttl)?;
                if self.keep_shadow_copy() {
                    self.store.hset(&phantom, bucket.to_raw())?;
                    self.expire(&phantom, ttl + self.config.phantom_grace)?;
                }
            }
            None => {
                self.store.persist(key)?;
                if self.keep_shadow_copy() {
                    self.store.del(&phantom)?;
                }
            }
        }
        Ok(())
    }
}

fn removal(keyspace: &str, path: &str) -> IndexedData {
    IndexedData::Remove {
        keyspace: keyspace.to_string(),
        path: path.to_string(),
    }
}
