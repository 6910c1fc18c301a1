//! Index Lookups
//!
//! Read side of the indexes, for a query layer to build on.

use crate::adapter::keys::{equality_index_key, geo_index_key, keyspace_key};
use crate::error::StoreResult;
use crate::mapping::geo::score_ranges;
use crate::mapping::GeoPoint;
use crate::storage::KeyValueStore;
use bytes::Bytes;

/// Reads ids out of keyspace id-sets and indexes.
pub struct IndexReader<'a> {
    store: &'a dyn KeyValueStore,
}

impl<'a> IndexReader<'a> {
    pub fn new(store: &'a dyn KeyValueStore) -> Self {
        Self { store }
    }

    /// Ids holding `value` at `path`.
    pub fn find_by(&self, keyspace: &str, path: &str, value: &[u8]) -> StoreResult<Vec<Bytes>> {
        self.store
            .smembers(&equality_index_key(keyspace, path, value))
    }

    /// Ids in the geo index of `path` within `radius` meters of `center`,
    /// nearest first, with their distance.
    ///
    /// Only the score ranges of the geohash cells around `center` are read.
    pub fn find_within(
        &self,
        keyspace: &str,
        path: &str,
        center: GeoPoint,
        radius: f64,
    ) -> StoreResult<Vec<(Bytes, f64)>> {
        let index = geo_index_key(keyspace, path);

        let mut found = Vec::new();
        for (min, max) in score_ranges(&center, radius) {
            for (id, score) in self.store.zrange_by_score(&index, min, max)? {
                let distance = GeoPoint::from_score(score).distance_to(&center);
                if distance <= radius {
                    found.push((id, distance));
                }
            }
        }
        found.sort_by(|a, b| a.1.total_cmp(&b.1));
        Ok(found)
    }

    /// A page of the ids in `keyspace`.
    ///
    /// The page is a slice of one snapshot of the id-set; the order is not
    /// stable across calls. `rows` of `None` returns everything after `offset`.
    pub fn ids(&self, keyspace: &str, offset: usize, rows: Option<usize>) -> StoreResult<Vec<Bytes>> {
        let ids = self.store.smembers(&keyspace_key(keyspace))?;
        Ok(ids
            .into_iter()
            .skip(offset)
            .take(rows.unwrap_or(usize::MAX))
            .collect())
    }

    /// Number of ids in `keyspace`.
    pub fn count(&self, keyspace: &str) -> StoreResult<usize> {
        self.store.scard(&keyspace_key(keyspace))
    }
}
