//! Index Writer
//!
//! Applies [`IndexedData`] assertions to the store. Equality indexes are sets
//! of ids, geo indexes are sorted sets of ids scored by geohash.
//!
//! Every index key an id is added to is also recorded in the helper set
//! `keyspace:id:idx`. That reverse index is what lets the writer drop all of
//! an id's memberships without scanning the keyspace.
//!
//! Each membership change is one store command. A failure part way through
//! leaves the earlier changes in place.

use crate::adapter::keys::{equality_index_key, equality_index_prefix, geo_index_key, index_helper_key};
use crate::error::StoreResult;
use crate::mapping::IndexedData;
use crate::storage::engine::GlobPattern;
use crate::storage::KeyValueStore;
use bytes::Bytes;
use std::collections::HashSet;
use tracing::trace;

/// Writes index memberships through a borrowed store.
pub struct IndexWriter<'a> {
    store: &'a dyn KeyValueStore,
}

impl<'a> IndexWriter<'a> {
    pub fn new(store: &'a dyn KeyValueStore) -> Self {
        Self { store }
    }

    /// Adds `id` to every index implied by `indexed`. For new records only.
    pub fn create_indexes(&self, id: &Bytes, indexed: &[IndexedData]) -> StoreResult<()> {
        for data in indexed {
            self.add_key_to_index(id, data)?;
        }
        Ok(())
    }

    /// Drops every index membership of `id` in `keyspace`, then adds the ones
    /// implied by `indexed`.
    pub fn delete_and_update_indexes(
        &self,
        keyspace: &str,
        id: &Bytes,
        indexed: &[IndexedData],
    ) -> StoreResult<()> {
        self.remove_key_from_indexes(keyspace, id)?;
        self.create_indexes(id, indexed)
    }

    /// Re-indexes `id` under the paths named by `indexed`.
    ///
    /// Memberships of other paths are left alone. For every path touched, the
    /// current memberships are dropped before the new ones are added, so
    /// [`IndexedData::Remove`] simply un-indexes the path.
    pub fn update_indexes(&self, id: &Bytes, indexed: &[IndexedData]) -> StoreResult<()> {
        let mut cleared = HashSet::new();
        for data in indexed {
            if cleared.insert((data.keyspace(), data.path())) {
                self.remove_key_from_existing_indexes(id, data.keyspace(), data.path())?;
            }
        }

        for data in indexed {
            self.add_key_to_index(id, data)?;
        }
        Ok(())
    }

    /// Removes `id` from every index of `keyspace` that references it.
    pub fn remove_key_from_indexes(&self, keyspace: &str, id: &Bytes) -> StoreResult<()> {
        let helper = index_helper_key(keyspace, id);

        for index_key in self.store.smembers(&helper)? {
            self.remove_membership(&index_key, id)?;
        }
        self.store.del(&helper)?;

        trace!(keyspace = keyspace, "Removed id from all indexes");
        Ok(())
    }

    /// Deletes every key below `keyspace:`, returning how many were deleted.
    pub fn remove_all_indexes(&self, keyspace: &str) -> StoreResult<usize> {
        let pattern = format!("{}:*", GlobPattern::escape(keyspace));

        let mut deleted = 0;
        for key in self.store.keys(&pattern)? {
            if self.store.del(&key)? {
                deleted += 1;
            }
        }

        trace!(keyspace = keyspace, deleted = deleted, "Removed all indexes");
        Ok(deleted)
    }

    /// Drops the memberships of `id` under one path, equality and geo alike.
    fn remove_key_from_existing_indexes(&self, id: &Bytes, keyspace: &str, path: &str) -> StoreResult<()> {
        let helper = index_helper_key(keyspace, id);
        let prefix = equality_index_prefix(keyspace, path);
        let geo_key = geo_index_key(keyspace, path);

        for index_key in self.store.smembers(&helper)? {
            if index_key.starts_with(&prefix) || index_key == geo_key {
                self.remove_membership(&index_key, id)?;
                self.store.srem(&helper, &index_key)?;
            }
        }
        Ok(())
    }

    fn remove_membership(&self, index_key: &Bytes, id: &Bytes) -> StoreResult<()> {
        match self.store.key_type(index_key)? {
            "zset" => self.store.zrem(index_key, id)?,
            _ => self.store.srem(index_key, id)?,
        };
        trace!(index = ?index_key, "Removed index membership");
        Ok(())
    }

    fn add_key_to_index(&self, id: &Bytes, data: &IndexedData) -> StoreResult<()> {
        let index_key = match data {
            IndexedData::Simple {
                keyspace,
                path,
                value,
            } => {
                let index_key = equality_index_key(keyspace, path, value);
                self.store.sadd(&index_key, id)?;
                index_key
            }
            IndexedData::Geo {
                keyspace,
                path,
                point,
            } => {
                let index_key = geo_index_key(keyspace, path);
                self.store.zadd(&index_key, point.score(), id)?;
                index_key
            }
            IndexedData::Remove { .. } => return Ok(()),
        };

        self.store
            .sadd(&index_helper_key(data.keyspace(), id), &index_key)?;
        trace!(index = ?index_key, "Added index membership");
        Ok(())
    }
}
