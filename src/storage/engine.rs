//! Thread-Safe Storage Engine with Expiry Support
//!
//! This module implements the storage engine FlashMap persists objects into.
//! It provides a thread-safe, concurrent key space holding hashes, sets and
//! sorted sets, each with optional TTL (Time-To-Live).
//!
//! ## Design Decisions
//!
//! 1. **Sharded Locks**: Instead of one big lock, we use multiple shards to reduce contention.
//! 2. **Lazy Expiry**: Keys are checked for expiry on access (lazy) plus background cleanup.
//! 3. **Typed Values**: A key holds exactly one kind of value; using it as another kind
//!    fails with `WRONGTYPE`, like Redis.
//! 4. **Auto-Delete**: Hashes, sets and sorted sets are removed when their last element goes.
//! 5. **Notifications**: Every key removed because it expired is announced on
//!    `__keyevent@0__:expired` (when enabled through `notify-keyspace-events`).
//!
//! ## Concurrency Model
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     StorageEngine                           │
//! │  ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐           │
//! │  │ Shard 0 │ │ Shard 1 │ │ Shard 2 │ │ Shard N │           │
//! │  │ RwLock  │ │ RwLock  │ │ RwLock  │ │ RwLock  │           │
//! │  │ HashMap │ │ HashMap │ │ HashMap │ │ HashMap │           │
//! │  └─────────┘ └─────────┘ └─────────┘ └─────────┘           │
//! └──────────────────────────┬──────────────────────────────────┘
//!                            │ expired keys
//!                            ▼
//!                   KeyspaceNotifier (pub/sub)
//! ```
//!
//! Keys are distributed across shards using a hash function.
//! Every command touches a single key, so it holds at most one shard lock.

use crate::error::{StoreError, StoreResult};
use crate::storage::notify::{KeyspaceNotifier, Message, NOTIFY_KEYSPACE_EVENTS};
use bytes::Bytes;
use std::collections::hash_map::Entry as MapEntry;
use std::collections::{HashMap, HashSet};
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;

/// Number of shards for the storage engine.
/// More shards = less lock contention, but more memory overhead.
/// 64 is a good balance for most workloads.
const NUM_SHARDS: usize = 64;

/// A value held by a key.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Field -> value map
    Hash(HashMap<Bytes, Bytes>),
    /// Unordered set of members
    Set(HashSet<Bytes>),
    /// Members with a floating point score
    SortedSet(HashMap<Bytes, f64>),
}

impl Value {
    fn empty_hash() -> Self {
        Value::Hash(HashMap::new())
    }

    fn empty_set() -> Self {
        Value::Set(HashSet::new())
    }

    fn empty_sorted_set() -> Self {
        Value::SortedSet(HashMap::new())
    }

    /// Returns the type name reported by the TYPE command.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Hash(_) => "hash",
            Value::Set(_) => "set",
            Value::SortedSet(_) => "zset",
        }
    }

    fn is_empty(&self) -> bool {
        match self {
            Value::Hash(h) => h.is_empty(),
            Value::Set(s) => s.is_empty(),
            Value::SortedSet(z) => z.is_empty(),
        }
    }

    fn as_hash(&self) -> Option<&HashMap<Bytes, Bytes>> {
        match self {
            Value::Hash(h) => Some(h),
            _ => None,
        }
    }

    fn as_hash_mut(&mut self) -> Option<&mut HashMap<Bytes, Bytes>> {
        match self {
            Value::Hash(h) => Some(h),
            _ => None,
        }
    }

    fn as_set(&self) -> Option<&HashSet<Bytes>> {
        match self {
            Value::Set(s) => Some(s),
            _ => None,
        }
    }

    fn as_set_mut(&mut self) -> Option<&mut HashSet<Bytes>> {
        match self {
            Value::Set(s) => Some(s),
            _ => None,
        }
    }

    fn as_sorted_set(&self) -> Option<&HashMap<Bytes, f64>> {
        match self {
            Value::SortedSet(z) => Some(z),
            _ => None,
        }
    }

    fn as_sorted_set_mut(&mut self) -> Option<&mut HashMap<Bytes, f64>> {
        match self {
            Value::SortedSet(z) => Some(z),
            _ => None,
        }
    }
}

/// Represents a stored value with optional expiry time.
#[derive(Debug, Clone)]
pub struct Entry {
    /// The actual value stored
    pub value: Value,
    /// When this entry expires (None = never expires)
    pub expires_at: Option<Instant>,
    /// When this entry was created
    pub created_at: Instant,
}

impl Entry {
    /// Creates a new entry without expiry.
    pub fn new(value: Value) -> Self {
        Self {
            value,
            expires_at: None,
            created_at: Instant::now(),
        }
    }

    /// Checks if this entry has expired.
    #[inline]
    pub fn is_expired(&self) -> bool {
        self.expires_at
            .map(|exp| Instant::now() >= exp)
            .unwrap_or(false)
    }

    /// Returns the remaining TTL, or None if no expiry.
    pub fn remaining(&self) -> Option<Duration> {
        self.expires_at
            .map(|exp| exp.saturating_duration_since(Instant::now()))
    }
}

/// A single shard containing a portion of the keys.
#[derive(Debug)]
struct Shard {
    data: RwLock<HashMap<Bytes, Entry>>,
}

impl Shard {
    fn new() -> Self {
        Self {
            data: RwLock::new(HashMap::new()),
        }
    }
}

/// The storage engine backing FlashMap.
///
/// # Thread Safety
///
/// This struct is designed to be wrapped in an `Arc` and shared between the
/// mapping adapter, the expiry sweeper and the notification listener.
/// All operations are thread-safe.
///
/// # Example
///
/// ```
/// use flashmap::storage::StorageEngine;
/// use bytes::Bytes;
///
/// let engine = StorageEngine::new();
///
/// engine
///     .hset(Bytes::from("person:42"), vec![(Bytes::from("firstname"), Bytes::from("Jon"))])
///     .unwrap();
/// let value = engine.hget(&Bytes::from("person:42"), &Bytes::from("firstname")).unwrap();
/// assert_eq!(value, Some(Bytes::from("Jon")));
///
/// engine.sadd(Bytes::from("person"), vec![Bytes::from("42")]).unwrap();
/// assert_eq!(engine.scard(&Bytes::from("person")).unwrap(), 1);
/// ```
pub struct StorageEngine {
    /// Sharded storage for reduced lock contention
    shards: Vec<Shard>,

    /// Pub/sub for keyspace notifications
    notifier: KeyspaceNotifier,

    /// Statistics: total number of keys (approximate)
    key_count: AtomicU64,

    /// Statistics: total read commands
    read_count: AtomicU64,

    /// Statistics: total write commands
    write_count: AtomicU64,

    /// Statistics: total DEL operations
    del_count: AtomicU64,

    /// Statistics: number of expired keys cleaned up
    expired_count: AtomicU64,
}

impl std::fmt::Debug for StorageEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageEngine")
            .field("shards", &self.shards.len())
            .field("key_count", &self.key_count.load(Ordering::Relaxed))
            .field("read_count", &self.read_count.load(Ordering::Relaxed))
            .field("write_count", &self.write_count.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for StorageEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageEngine {
    /// Creates a new storage engine with default settings.
    pub fn new() -> Self {
        let shards = (0..NUM_SHARDS).map(|_| Shard::new()).collect();

        Self {
            shards,
            notifier: KeyspaceNotifier::new(),
            key_count: AtomicU64::new(0),
            read_count: AtomicU64::new(0),
            write_count: AtomicU64::new(0),
            del_count: AtomicU64::new(0),
            expired_count: AtomicU64::new(0),
        }
    }

    /// Determines which shard a key belongs to.
    #[inline]
    fn shard_index(&self, key: &[u8]) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() as usize) % NUM_SHARDS
    }

    /// Gets the shard for a given key.
    #[inline]
    fn get_shard(&self, key: &[u8]) -> &Shard {
        &self.shards[self.shard_index(key)]
    }

    fn wrong_type(key: &Bytes) -> StoreError {
        StoreError::WrongType {
            key: String::from_utf8_lossy(key).into_owned(),
        }
    }

    /// Removes `key` if it is still expired and announces it.
    fn expire_now(&self, key: &Bytes) {
        let shard = self.get_shard(key);
        let removed = {
            let mut data = shard.data.write().unwrap();
            match data.get(key) {
                Some(entry) if entry.is_expired() => {
                    data.remove(key);
                    true
                }
                _ => false,
            }
        };

        if removed {
            self.key_count.fetch_sub(1, Ordering::Relaxed);
            self.expired_count.fetch_add(1, Ordering::Relaxed);
            self.notifier.notify_expired(key);
        }
    }

    /// Runs `f` against the live value of `key`.
    ///
    /// Returns `Ok(None)` if the key doesn't exist (expired keys are removed
    /// on the way), and `WRONGTYPE` if `f` rejects the kind of value.
    fn inspect<R>(&self, key: &Bytes, f: impl FnOnce(&Value) -> Option<R>) -> StoreResult<Option<R>> {
        self.read_count.fetch_add(1, Ordering::Relaxed);
        let shard = self.get_shard(key);

        // Fast path: read lock for existing, non-expired keys
        {
            let data = shard.data.read().unwrap();
            match data.get(key) {
                None => return Ok(None),
                Some(entry) if !entry.is_expired() => {
                    return f(&entry.value).map(Some).ok_or_else(|| Self::wrong_type(key));
                }
                Some(_) => {}
            }
        }

        self.expire_now(key);
        Ok(None)
    }

    /// Runs `f` against the shard map holding `key` under the write lock.
    ///
    /// An expired value at `key` is removed first, and the key count is kept
    /// in sync with whatever `f` inserts or removes.
    fn write<R>(&self, key: &Bytes, f: impl FnOnce(&mut HashMap<Bytes, Entry>) -> R) -> R {
        self.write_count.fetch_add(1, Ordering::Relaxed);
        let shard = self.get_shard(key);

        let (expired, result) = {
            let mut data = shard.data.write().unwrap();

            let expired = matches!(data.get(key), Some(entry) if entry.is_expired());
            if expired {
                data.remove(key);
                self.key_count.fetch_sub(1, Ordering::Relaxed);
                self.expired_count.fetch_add(1, Ordering::Relaxed);
            }

            let before = data.len();
            let result = f(&mut data);
            let after = data.len();

            if after > before {
                self.key_count
                    .fetch_add((after - before) as u64, Ordering::Relaxed);
            } else if before > after {
                self.key_count
                    .fetch_sub((before - after) as u64, Ordering::Relaxed);
            }

            (expired, result)
        };

        if expired {
            self.notifier.notify_expired(key);
        }

        result
    }

    /// Applies `f` to the value at `key`, creating it with `empty` if missing.
    ///
    /// Values left empty by `f` are deleted. Without `empty`, a missing key
    /// yields `Ok(None)` and `f` is not called.
    fn modify<R>(
        &self,
        key: &Bytes,
        empty: Option<fn() -> Value>,
        f: impl FnOnce(&mut Value) -> Option<R>,
    ) -> StoreResult<Option<R>> {
        self.write(key, |data| {
            let entry = match data.entry(key.clone()) {
                MapEntry::Occupied(occupied) => occupied.into_mut(),
                MapEntry::Vacant(vacant) => match empty {
                    Some(empty) => vacant.insert(Entry::new(empty())),
                    None => return Ok(None),
                },
            };

            let result = f(&mut entry.value);
            if entry.value.is_empty() {
                data.remove(key);
            }

            result.map(Some).ok_or_else(|| Self::wrong_type(key))
        })
    }

    // ========================================================================
    // HASH OPERATIONS
    // ========================================================================

    /// Sets one or more hash fields, creating the hash if needed.
    ///
    /// # Returns
    /// The number of fields that were newly added.
    pub fn hset(&self, key: Bytes, fields: Vec<(Bytes, Bytes)>) -> StoreResult<usize> {
        if fields.is_empty() {
            return Ok(0);
        }
        let added = self.modify(&key, Some(Value::empty_hash), |value| {
            value.as_hash_mut().map(|hash| {
                fields
                    .into_iter()
                    .filter(|(field, v)| hash.insert(field.clone(), v.clone()).is_none())
                    .count()
            })
        })?;
        Ok(added.unwrap_or(0))
    }

    /// Gets a single hash field.
    pub fn hget(&self, key: &Bytes, field: &Bytes) -> StoreResult<Option<Bytes>> {
        Ok(self
            .inspect(key, |value| value.as_hash().map(|hash| hash.get(field).cloned()))?
            .flatten())
    }

    /// Gets all fields and values of a hash.
    ///
    /// Returns an empty vector if the key doesn't exist.
    pub fn hgetall(&self, key: &Bytes) -> StoreResult<Vec<(Bytes, Bytes)>> {
        Ok(self
            .inspect(key, |value| {
                value.as_hash().map(|hash| {
                    hash.iter()
                        .map(|(field, v)| (field.clone(), v.clone()))
                        .collect::<Vec<_>>()
                })
            })?
            .unwrap_or_default())
    }

    /// Gets all field names of a hash.
    pub fn hkeys(&self, key: &Bytes) -> StoreResult<Vec<Bytes>> {
        Ok(self
            .inspect(key, |value| value.as_hash().map(|hash| hash.keys().cloned().collect()))?
            .unwrap_or_default())
    }

    /// Deletes hash fields.
    ///
    /// # Returns
    /// The number of fields that were removed.
    pub fn hdel(&self, key: &Bytes, fields: &[Bytes]) -> StoreResult<usize> {
        let removed = self.modify(key, None, |value| {
            value
                .as_hash_mut()
                .map(|hash| fields.iter().filter(|f| hash.remove(*f).is_some()).count())
        })?;
        Ok(removed.unwrap_or(0))
    }

    /// Returns the number of fields in a hash.
    pub fn hlen(&self, key: &Bytes) -> StoreResult<usize> {
        Ok(self
            .inspect(key, |value| value.as_hash().map(|hash| hash.len()))?
            .unwrap_or(0))
    }

    // ========================================================================
    // SET OPERATIONS
    // ========================================================================

    /// Adds members to a set, creating the set if needed.
    ///
    /// # Returns
    /// The number of members that were not already present.
    pub fn sadd(&self, key: Bytes, members: Vec<Bytes>) -> StoreResult<usize> {
        if members.is_empty() {
            return Ok(0);
        }
        let added = self.modify(&key, Some(Value::empty_set), |value| {
            value
                .as_set_mut()
                .map(|set| members.into_iter().filter(|m| set.insert(m.clone())).count())
        })?;
        Ok(added.unwrap_or(0))
    }

    /// Removes members from a set.
    ///
    /// # Returns
    /// The number of members that were removed.
    pub fn srem(&self, key: &Bytes, members: &[Bytes]) -> StoreResult<usize> {
        let removed = self.modify(key, None, |value| {
            value
                .as_set_mut()
                .map(|set| members.iter().filter(|m| set.remove(*m)).count())
        })?;
        Ok(removed.unwrap_or(0))
    }

    /// Checks set membership.
    pub fn sismember(&self, key: &Bytes, member: &Bytes) -> StoreResult<bool> {
        Ok(self
            .inspect(key, |value| value.as_set().map(|set| set.contains(member)))?
            .unwrap_or(false))
    }

    /// Returns all members of a set (in no particular order).
    pub fn smembers(&self, key: &Bytes) -> StoreResult<Vec<Bytes>> {
        Ok(self
            .inspect(key, |value| value.as_set().map(|set| set.iter().cloned().collect()))?
            .unwrap_or_default())
    }

    /// Returns the cardinality of a set.
    pub fn scard(&self, key: &Bytes) -> StoreResult<usize> {
        Ok(self
            .inspect(key, |value| value.as_set().map(|set| set.len()))?
            .unwrap_or(0))
    }

    // ========================================================================
    // SORTED SET OPERATIONS
    // ========================================================================

    /// Adds members with scores, updating the score of existing members.
    ///
    /// # Returns
    /// The number of members that were newly added.
    pub fn zadd(&self, key: Bytes, members: Vec<(f64, Bytes)>) -> StoreResult<usize> {
        if members.is_empty() {
            return Ok(0);
        }
        let added = self.modify(&key, Some(Value::empty_sorted_set), |value| {
            value.as_sorted_set_mut().map(|zset| {
                members
                    .into_iter()
                    .filter(|(score, member)| zset.insert(member.clone(), *score).is_none())
                    .count()
            })
        })?;
        Ok(added.unwrap_or(0))
    }

    /// Removes members from a sorted set.
    pub fn zrem(&self, key: &Bytes, members: &[Bytes]) -> StoreResult<usize> {
        let removed = self.modify(key, None, |value| {
            value
                .as_sorted_set_mut()
                .map(|zset| members.iter().filter(|m| zset.remove(*m).is_some()).count())
        })?;
        Ok(removed.unwrap_or(0))
    }

    /// Returns the score of a member.
    pub fn zscore(&self, key: &Bytes, member: &Bytes) -> StoreResult<Option<f64>> {
        Ok(self
            .inspect(key, |value| value.as_sorted_set().map(|zset| zset.get(member).copied()))?
            .flatten())
    }

    /// Returns the 0-based rank of a member, ordered by (score, member).
    pub fn zrank(&self, key: &Bytes, member: &Bytes) -> StoreResult<Option<usize>> {
        Ok(self
            .inspect(key, |value| {
                value.as_sorted_set().map(|zset| {
                    zset.get(member)?;
                    Some(
                        sorted_members(zset)
                            .iter()
                            .position(|(m, _)| m == member)
                            .unwrap_or(0),
                    )
                })
            })?
            .flatten())
    }

    /// Returns members with `min <= score <= max`, ordered by (score, member).
    pub fn zrange_by_score(&self, key: &Bytes, min: f64, max: f64) -> StoreResult<Vec<(Bytes, f64)>> {
        Ok(self
            .inspect(key, |value| {
                value.as_sorted_set().map(|zset| {
                    sorted_members(zset)
                        .into_iter()
                        .filter(|(_, score)| *score >= min && *score <= max)
                        .collect::<Vec<_>>()
                })
            })?
            .unwrap_or_default())
    }

    /// Returns the number of members in a sorted set.
    pub fn zcard(&self, key: &Bytes) -> StoreResult<usize> {
        Ok(self
            .inspect(key, |value| value.as_sorted_set().map(|zset| zset.len()))?
            .unwrap_or(0))
    }

    // ========================================================================
    // KEY OPERATIONS
    // ========================================================================

    /// Deletes a key from the database.
    ///
    /// # Returns
    ///
    /// Returns `true` if the key was deleted, `false` if it didn't exist.
    pub fn delete(&self, key: &Bytes) -> bool {
        self.del_count.fetch_add(1, Ordering::Relaxed);
        self.write(key, |data| data.remove(key).is_some())
    }

    /// Deletes multiple keys from the database.
    ///
    /// # Returns
    ///
    /// Returns the number of keys that were deleted.
    pub fn delete_many(&self, keys: &[Bytes]) -> u64 {
        keys.iter().filter(|key| self.delete(key)).count() as u64
    }

    /// Checks if a key exists (and is not expired).
    pub fn exists(&self, key: &Bytes) -> bool {
        matches!(self.inspect(key, |_| Some(())), Ok(Some(())))
    }

    /// Sets an expiry time on an existing key.
    ///
    /// # Returns
    ///
    /// Returns `true` if the expiry was set, `false` if the key doesn't exist.
    pub fn expire(&self, key: &Bytes, ttl: Duration) -> bool {
        self.write(key, |data| match data.get_mut(key) {
            Some(entry) => {
                entry.expires_at = Some(Instant::now() + ttl);
                true
            }
            None => false,
        })
    }

    /// Removes the expiry from a key (makes it persistent).
    ///
    /// # Returns
    ///
    /// Returns `true` if the expiry was removed, `false` if the key doesn't exist
    /// or didn't have an expiry.
    pub fn persist(&self, key: &Bytes) -> bool {
        self.write(key, |data| match data.get_mut(key) {
            Some(entry) => entry.expires_at.take().is_some(),
            None => false,
        })
    }

    fn remaining(&self, key: &Bytes) -> Option<Option<Duration>> {
        let shard = self.get_shard(key);
        let outcome = {
            let data = shard.data.read().unwrap();
            data.get(key).map(|entry| (entry.is_expired(), entry.remaining()))
        };

        match outcome {
            None => None,
            Some((true, _)) => {
                self.expire_now(key);
                None
            }
            Some((false, remaining)) => Some(remaining),
        }
    }

    /// Gets the remaining TTL for a key in seconds.
    ///
    /// # Returns
    ///
    /// - `Some(seconds)` if the key exists and has an expiry
    /// - `Some(-1)` if the key exists but has no expiry
    /// - `None` if the key doesn't exist
    pub fn ttl(&self, key: &Bytes) -> Option<i64> {
        self.remaining(key)
            .map(|remaining| remaining.map(|d| d.as_secs() as i64).unwrap_or(-1))
    }

    /// Gets the remaining TTL for a key in milliseconds.
    pub fn pttl(&self, key: &Bytes) -> Option<i64> {
        self.remaining(key)
            .map(|remaining| remaining.map(|d| d.as_millis() as i64).unwrap_or(-1))
    }

    /// Returns the type of a key ("hash", "set", "zset", or "none").
    pub fn key_type(&self, key: &Bytes) -> &'static str {
        match self.inspect(key, |value| Some(value.type_name())) {
            Ok(Some(name)) => name,
            _ => "none",
        }
    }

    /// Returns all keys matching a pattern (simplified glob matching).
    ///
    /// Supported patterns:
    /// - `*` matches everything
    /// - `h*llo` matches hello, hallo, hxllo
    /// - `h?llo` matches hello, hallo, but not hllo
    /// - `h[ae]llo` matches hello and hallo, but not hillo
    ///
    /// **Warning**: This operation scans all keys and can be slow on large databases.
    pub fn keys(&self, pattern: &str) -> Vec<Bytes> {
        let mut result = Vec::new();
        let pattern = GlobPattern::new(pattern);

        for shard in &self.shards {
            let data = shard.data.read().unwrap();
            for (key, entry) in data.iter() {
                if !entry.is_expired() && pattern.matches_bytes(key) {
                    result.push(key.clone());
                }
            }
        }

        result
    }

    /// Clears all data from the database.
    ///
    /// This is equivalent to the Redis FLUSHDB command.
    pub fn flush(&self) {
        for shard in &self.shards {
            let mut data = shard.data.write().unwrap();
            data.clear();
        }
        self.key_count.store(0, Ordering::Relaxed);
    }

    /// Returns the approximate number of keys in the database.
    ///
    /// This is an approximation because it uses relaxed atomic ordering.
    pub fn len(&self) -> u64 {
        self.key_count.load(Ordering::Relaxed)
    }

    /// Returns true if the database is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns database statistics.
    pub fn stats(&self) -> StorageStats {
        StorageStats {
            keys: self.key_count.load(Ordering::Relaxed),
            read_ops: self.read_count.load(Ordering::Relaxed),
            write_ops: self.write_count.load(Ordering::Relaxed),
            del_ops: self.del_count.load(Ordering::Relaxed),
            expired: self.expired_count.load(Ordering::Relaxed),
        }
    }

    /// Cleans up expired keys from all shards.
    ///
    /// This is called by the background expiry sweeper. An expired event is
    /// published for every removed key once its shard lock is released.
    ///
    /// # Returns
    ///
    /// Returns the number of keys that were cleaned up.
    pub fn cleanup_expired(&self) -> u64 {
        let mut cleaned = 0u64;

        for shard in &self.shards {
            let mut expired = Vec::new();
            {
                let mut data = shard.data.write().unwrap();
                data.retain(|key, entry| {
                    if entry.is_expired() {
                        expired.push(key.clone());
                        false
                    } else {
                        true
                    }
                });
            }

            cleaned += expired.len() as u64;
            for key in &expired {
                self.notifier.notify_expired(key);
            }
        }

        if cleaned > 0 {
            self.key_count.fetch_sub(cleaned, Ordering::Relaxed);
            self.expired_count.fetch_add(cleaned, Ordering::Relaxed);
        }

        cleaned
    }

    // ========================================================================
    // CONFIG AND PUB/SUB
    // ========================================================================

    /// Reads a configuration parameter. Only `notify-keyspace-events` is known.
    pub fn config_get(&self, parameter: &str) -> Option<String> {
        if parameter.eq_ignore_ascii_case(NOTIFY_KEYSPACE_EVENTS) {
            Some(self.notifier.flags())
        } else {
            None
        }
    }

    /// Sets a configuration parameter.
    ///
    /// # Returns
    /// `true` if the parameter is known and was updated.
    pub fn config_set(&self, parameter: &str, value: &str) -> bool {
        if parameter.eq_ignore_ascii_case(NOTIFY_KEYSPACE_EVENTS) {
            self.notifier.set_flags(value);
            true
        } else {
            false
        }
    }

    /// Publishes a message to all subscribers.
    pub fn publish(&self, channel: Bytes, payload: Bytes) -> usize {
        self.notifier.publish(Message { channel, payload })
    }

    /// Subscribes to every message published by this engine.
    pub fn subscribe(&self) -> broadcast::Receiver<Message> {
        self.notifier.subscribe()
    }
}

/// Sorted set members ordered by (score, member).
fn sorted_members(zset: &HashMap<Bytes, f64>) -> Vec<(Bytes, f64)> {
    let mut members: Vec<(Bytes, f64)> = zset.iter().map(|(m, s)| (m.clone(), *s)).collect();
    members.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
    members
}

/// Database statistics.
#[derive(Debug, Clone, Copy)]
pub struct StorageStats {
    /// Number of keys currently stored
    pub keys: u64,
    /// Total read commands
    pub read_ops: u64,
    /// Total write commands
    pub write_ops: u64,
    /// Total DEL operations
    pub del_ops: u64,
    /// Total expired keys cleaned up
    pub expired: u64,
}

/// Simple glob pattern matcher for the KEYS command and pub/sub topics.
#[derive(Debug, Clone)]
pub(crate) struct GlobPattern {
    pattern: Vec<u8>,
}

impl GlobPattern {
    pub(crate) fn new(pattern: &str) -> Self {
        Self {
            pattern: pattern.as_bytes().to_vec(),
        }
    }

    #[cfg(test)]
    fn matches(&self, text: &str) -> bool {
        self.matches_bytes(text.as_bytes())
    }

    pub(crate) fn matches_bytes(&self, text: &[u8]) -> bool {
        Self::matches_recursive(&self.pattern, text)
    }

    /// Escapes glob metacharacters so `literal` only matches itself.
    pub(crate) fn escape(literal: &str) -> String {
        let mut escaped = String::with_capacity(literal.len());
        for c in literal.chars() {
            if matches!(c, '*' | '?' | '[' | ']' | '\\') {
                escaped.push('\\');
            }
            escaped.push(c);
        }
        escaped
    }

    fn matches_recursive(pattern: &[u8], text: &[u8]) -> bool {
        if pattern.is_empty() {
            return text.is_empty();
        }

        match pattern[0] {
            b'*' => {
                // Try matching zero or more characters
                (0..=text.len()).any(|i| Self::matches_recursive(&pattern[1..], &text[i..]))
            }
            b'?' => {
                // Match exactly one character
                !text.is_empty() && Self::matches_recursive(&pattern[1..], &text[1..])
            }
            b'[' => {
                // Character class
                if text.is_empty() {
                    return false;
                }

                let mut i = 1;
                let mut matched = false;
                let negate = pattern.get(1) == Some(&b'^');
                if negate {
                    i += 1;
                }

                while i < pattern.len() && pattern[i] != b']' {
                    if pattern[i] == text[0] {
                        matched = true;
                    }
                    // Handle ranges like [a-z]
                    if i + 2 < pattern.len() && pattern[i + 1] == b'-' && pattern[i + 2] != b']' {
                        if text[0] >= pattern[i] && text[0] <= pattern[i + 2] {
                            matched = true;
                        }
                        i += 2;
                    }
                    i += 1;
                }

                if negate {
                    matched = !matched;
                }

                if i < pattern.len() {
                    matched && Self::matches_recursive(&pattern[i + 1..], &text[1..])
                } else {
                    false
                }
            }
            b'\\' => {
                // Escape character
                if pattern.len() > 1 && !text.is_empty() && pattern[1] == text[0] {
                    Self::matches_recursive(&pattern[2..], &text[1..])
                } else {
                    false
                }
            }
            c => {
                // Literal character
                !text.is_empty() && c == text[0] && Self::matches_recursive(&pattern[1..], &text[1..])
            }
        }
    }
}
