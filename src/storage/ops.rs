//! Store Primitives
//!
//! [`KeyValueStore`] is the set of commands the mapping engine issues. Each
//! call is a single atomic command against one key; the engine composes them
//! without transactions. Every command is fallible so that transport failures
//! of a remote store surface as [`StoreError`](crate::error::StoreError).
//!
//! [`StorageEngine`] implements the trait in-process and never fails except
//! for `WRONGTYPE`.

use crate::error::StoreResult;
use crate::storage::notify::Message;
use crate::storage::StorageEngine;
use bytes::Bytes;
use std::time::Duration;
use tokio::sync::broadcast;

/// Optional store features the engine checks before relying on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// `PEXPIRE` / `PTTL` with millisecond precision
    MillisecondExpiry,
    /// Keyspace notifications and pub/sub subscriptions
    KeyspaceNotifications,
}

/// Commands consumed by the mapping engine.
pub trait KeyValueStore: Send + Sync {
    // Hashes
    fn hset(&self, key: &Bytes, fields: Vec<(Bytes, Bytes)>) -> StoreResult<()>;
    fn hget(&self, key: &Bytes, field: &Bytes) -> StoreResult<Option<Bytes>>;
    fn hgetall(&self, key: &Bytes) -> StoreResult<Vec<(Bytes, Bytes)>>;
    fn hkeys(&self, key: &Bytes) -> StoreResult<Vec<Bytes>>;
    fn hdel(&self, key: &Bytes, fields: &[Bytes]) -> StoreResult<usize>;

    // Sets
    fn sadd(&self, key: &Bytes, member: &Bytes) -> StoreResult<bool>;
    fn srem(&self, key: &Bytes, member: &Bytes) -> StoreResult<bool>;
    fn sismember(&self, key: &Bytes, member: &Bytes) -> StoreResult<bool>;
    fn smembers(&self, key: &Bytes) -> StoreResult<Vec<Bytes>>;
    fn scard(&self, key: &Bytes) -> StoreResult<usize>;

    // Sorted sets
    fn zadd(&self, key: &Bytes, score: f64, member: &Bytes) -> StoreResult<bool>;
    fn zrem(&self, key: &Bytes, member: &Bytes) -> StoreResult<bool>;
    fn zrank(&self, key: &Bytes, member: &Bytes) -> StoreResult<Option<usize>>;
    fn zscore(&self, key: &Bytes, member: &Bytes) -> StoreResult<Option<f64>>;
    fn zrange_by_score(&self, key: &Bytes, min: f64, max: f64) -> StoreResult<Vec<(Bytes, f64)>>;

    // Keys
    /// Deletes a key, returning true if it existed.
    fn del(&self, key: &Bytes) -> StoreResult<bool>;
    fn exists(&self, key: &Bytes) -> StoreResult<bool>;
    fn expire(&self, key: &Bytes, seconds: u64) -> StoreResult<bool>;
    fn pexpire(&self, key: &Bytes, millis: u64) -> StoreResult<bool>;
    fn persist(&self, key: &Bytes) -> StoreResult<bool>;
    /// Remaining TTL in seconds: `None` if missing, `Some(-1)` if persistent.
    fn ttl(&self, key: &Bytes) -> StoreResult<Option<i64>>;
    /// Remaining TTL in milliseconds: `None` if missing, `Some(-1)` if persistent.
    fn pttl(&self, key: &Bytes) -> StoreResult<Option<i64>>;
    fn key_type(&self, key: &Bytes) -> StoreResult<&'static str>;
    fn keys(&self, pattern: &str) -> StoreResult<Vec<Bytes>>;

    // Server
    fn get_config(&self, parameter: &str) -> StoreResult<Option<String>>;
    fn set_config(&self, parameter: &str, value: &str) -> StoreResult<()>;
    fn publish(&self, channel: &Bytes, payload: &Bytes) -> StoreResult<usize>;
    fn subscribe(&self) -> StoreResult<broadcast::Receiver<Message>>;

    /// Reports whether the store offers `capability`.
    fn supports(&self, capability: Capability) -> bool;
}

impl KeyValueStore for StorageEngine {
    fn hset(&self, key: &Bytes, fields: Vec<(Bytes, Bytes)>) -> StoreResult<()> {
        StorageEngine::hset(self, key.clone(), fields).map(|_| ())
    }

    fn hget(&self, key: &Bytes, field: &Bytes) -> StoreResult<Option<Bytes>> {
        StorageEngine::hget(self, key, field)
    }

    fn hgetall(&self, key: &Bytes) -> StoreResult<Vec<(Bytes, Bytes)>> {
        StorageEngine::hgetall(self, key)
    }

    fn hkeys(&self, key: &Bytes) -> StoreResult<Vec<Bytes>> {
        StorageEngine::hkeys(self, key)
    }

    fn hdel(&self, key: &Bytes, fields: &[Bytes]) -> StoreResult<usize> {
        StorageEngine::hdel(self, key, fields)
    }

    fn sadd(&self, key: &Bytes, member: &Bytes) -> StoreResult<bool> {
        StorageEngine::sadd(self, key.clone(), vec![member.clone()]).map(|added| added > 0)
    }

    fn srem(&self, key: &Bytes, member: &Bytes) -> StoreResult<bool> {
        StorageEngine::srem(self, key, std::slice::from_ref(member)).map(|removed| removed > 0)
    }

    fn sismember(&self, key: &Bytes, member: &Bytes) -> StoreResult<bool> {
        StorageEngine::sismember(self, key, member)
    }

    fn smembers(&self, key: &Bytes) -> StoreResult<Vec<Bytes>> {
        StorageEngine::smembers(self, key)
    }

    fn scard(&self, key: &Bytes) -> StoreResult<usize> {
        StorageEngine::scard(self, key)
    }

    fn zadd(&self, key: &Bytes, score: f64, member: &Bytes) -> StoreResult<bool> {
        StorageEngine::zadd(self, key.clone(), vec![(score, member.clone())]).map(|added| added > 0)
    }

    fn zrem(&self, key: &Bytes, member: &Bytes) -> StoreResult<bool> {
        StorageEngine::zrem(self, key, std::slice::from_ref(member)).map(|removed| removed > 0)
    }

    fn zrank(&self, key: &Bytes, member: &Bytes) -> StoreResult<Option<usize>> {
        StorageEngine::zrank(self, key, member)
    }

    fn zscore(&self, key: &Bytes, member: &Bytes) -> StoreResult<Option<f64>> {
        StorageEngine::zscore(self, key, member)
    }

    fn zrange_by_score(&self, key: &Bytes, min: f64, max: f64) -> StoreResult<Vec<(Bytes, f64)>> {
        StorageEngine::zrange_by_score(self, key, min, max)
    }

    fn del(&self, key: &Bytes) -> StoreResult<bool> {
        Ok(self.delete(key))
    }

    fn exists(&self, key: &Bytes) -> StoreResult<bool> {
        Ok(StorageEngine::exists(self, key))
    }

    fn expire(&self, key: &Bytes, seconds: u64) -> StoreResult<bool> {
        Ok(StorageEngine::expire(self, key, Duration::from_secs(seconds)))
    }

    fn pexpire(&self, key: &Bytes, millis: u64) -> StoreResult<bool> {
        Ok(StorageEngine::expire(self, key, Duration::from_millis(millis)))
    }

    fn persist(&self, key: &Bytes) -> StoreResult<bool> {
        Ok(StorageEngine::persist(self, key))
    }

    fn ttl(&self, key: &Bytes) -> StoreResult<Option<i64>> {
        Ok(StorageEngine::ttl(self, key))
    }

    fn pttl(&self, key: &Bytes) -> StoreResult<Option<i64>> {
        Ok(StorageEngine::pttl(self, key))
    }

    fn key_type(&self, key: &Bytes) -> StoreResult<&'static str> {
        Ok(StorageEngine::key_type(self, key))
    }

    fn keys(&self, pattern: &str) -> StoreResult<Vec<Bytes>> {
        Ok(StorageEngine::keys(self, pattern))
    }

    fn get_config(&self, parameter: &str) -> StoreResult<Option<String>> {
        Ok(self.config_get(parameter))
    }

    fn set_config(&self, parameter: &str, value: &str) -> StoreResult<()> {
        if self.config_set(parameter, value) {
            Ok(())
        } else {
            Err(crate::error::StoreError::Unsupported("CONFIG SET"))
        }
    }

    fn publish(&self, channel: &Bytes, payload: &Bytes) -> StoreResult<usize> {
        Ok(StorageEngine::publish(self, channel.clone(), payload.clone()))
    }

    fn subscribe(&self) -> StoreResult<broadcast::Receiver<Message>> {
        Ok(StorageEngine::subscribe(self))
    }

    fn supports(&self, capability: Capability) -> bool {
        match capability {
            Capability::MillisecondExpiry | Capability::KeyspaceNotifications => true,
        }
    }
}
