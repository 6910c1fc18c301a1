//! Storage Engine Module
//!
//! This module provides the store FlashMap maps objects into: a thread-safe,
//! sharded key space of hashes, sets and sorted sets with TTL support, a
//! background expiry sweeper and keyspace notifications.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │            StorageEngine  (impl KeyValueStore)              │
//! │  ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐           │
//! │  │ Shard 0 │ │ Shard 1 │ │ Shard 2 │ │...64    │           │
//! │  │ RwLock  │ │ RwLock  │ │ RwLock  │ │ shards  │           │
//! │  └─────────┘ └─────────┘ └─────────┘ └─────────┘           │
//! └──────────────▲───────────────────────────┬──────────────────┘
//!                │                           │ __keyevent@0__:expired
//!  ┌─────────────┴─────────────┐   ┌─────────▼─────────────────┐
//!  │     ExpirySweeper         │   │    KeyspaceNotifier       │
//!  │  (Background Tokio Task)  │   │  (tokio broadcast)        │
//!  └───────────────────────────┘   └───────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use flashmap::storage::{KeyValueStore, StorageEngine};
//! use bytes::Bytes;
//! use std::sync::Arc;
//!
//! let store: Arc<dyn KeyValueStore> = Arc::new(StorageEngine::new());
//!
//! let key = Bytes::from("person:42");
//! store.hset(&key, vec![(Bytes::from("firstname"), Bytes::from("Jon"))]).unwrap();
//! store.expire(&key, 60).unwrap();
//! assert!(store.ttl(&key).unwrap().unwrap() > 0);
//! ```

pub mod engine;
pub mod expiry;
pub mod notify;
pub mod ops;

// Re-export commonly used types
pub use engine::{Entry, StorageEngine, StorageStats, Value};
pub use expiry::{start_expiry_sweeper, ExpiryConfig, ExpirySweeper};
pub use notify::{KeyspaceNotifier, Message, KEYEVENT_EXPIRED_CHANNEL, NOTIFY_KEYSPACE_EVENTS};
pub use ops::{Capability, KeyValueStore};
