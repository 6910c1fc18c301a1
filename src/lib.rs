//! # FlashMap - Object Mapping and Secondary Indexes for FlashKV
//!
//! FlashMap stores typed objects as hashes in a key-value store and keeps
//! their keyspace id-sets, secondary indexes and shadow copies in step as the
//! objects are written, partially updated, deleted or expire.
//!
//! ## Features
//!
//! - **Bucket Mapping**: Any `serde` type is flattened into a hash of dotted paths
//! - **Secondary Indexes**: Equality indexes as sets, geo indexes as sorted sets
//! - **Partial Updates**: Touch a few fields without rewriting the record or
//!   invalidating the indexes of unrelated properties
//! - **Expiration Reconciliation**: Expired records are dropped from their
//!   id-set and indexes, and their last value is recovered from a shadow copy
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              FlashMap                                   │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────────┐    ┌─────────────┐              │
//! │  │   Entity    │───>│ KeyValueAdapter │───>│ IndexWriter │              │
//! │  │  (serde)    │    │ put/get/update  │    │             │              │
//! │  └─────────────┘    └────────┬────────┘    └──────┬──────┘              │
//! │                              │                    │                     │
//! │                              ▼                    ▼                     │
//! │                     ┌──────────────────────────────────────────────┐    │
//! │                     │       KeyValueStore (StorageEngine)          │    │
//! │                     │  person   person:42   person:firstname:Jon   │    │
//! │                     └──────────────────────┬───────────────────────┘    │
//! │                                            │ __keyevent@0__:expired     │
//! │                                            ▼                            │
//! │                     ┌──────────────────────────────────────────────┐    │
//! │                     │ ListenerContainer -> ExpirationListener      │    │
//! │                     │      (Background Tokio Task)                 │    │
//! │                     └──────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```
//! use flashmap::adapter::{KeyValueAdapter, PartialUpdate};
//! use flashmap::mapping::{Entity, EntitySchema, IndexDefinition};
//! use flashmap::storage::StorageEngine;
//! use serde::{Deserialize, Serialize};
//! use std::sync::Arc;
//!
//! #[derive(Debug, PartialEq, Serialize, Deserialize)]
//! struct Person {
//!     firstname: String,
//!     age: u32,
//! }
//!
//! impl Entity for Person {
//!     const SCHEMA: EntitySchema = EntitySchema::new("person", "Person")
//!         .with_indexes(&[IndexDefinition::equality("firstname")]);
//!
//!     fn id(&self) -> Option<String> {
//!         None
//!     }
//! }
//!
//! # fn main() -> flashmap::Result<()> {
//! let adapter = KeyValueAdapter::new(Arc::new(StorageEngine::new()));
//!
//! adapter.put("42", Person { firstname: "Jon".into(), age: 30 })?;
//! adapter.update(&PartialUpdate::<Person>::new("42").set("age", 31))?;
//!
//! let jon = adapter.get::<Person>("42")?.unwrap();
//! assert_eq!(jon.age, 31);
//! assert_eq!(adapter.index_reader().find_by("person", "firstname", b"Jon")?.len(), 1);
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Overview
//!
//! - [`adapter`]: The keyspace adapter, partial updates and lifecycle
//! - [`mapping`]: Buckets, schemas and the object codec
//! - [`index`]: Index maintenance and lookups
//! - [`listener`]: Keyspace notification dispatch and expiration handling
//! - [`storage`]: Thread-safe storage engine with TTL and keyspace notifications
//! - [`config`]: Adapter configuration
//!
//! ## Design Highlights
//!
//! ### No Transactions
//!
//! Every operation is a short sequence of single-key commands. A failure part
//! way through is returned to the caller and earlier commands stay applied;
//! indexes are eventually consistent with records across failures.
//!
//! ### Shadow Copies
//!
//! An expiring record `keyspace:id` can be mirrored to `keyspace:id:phantom`,
//! which lives for the record's TTL plus a grace period. When the record
//! expires, the expiration listener reads the shadow copy so the
//! [`ExpiredEvent`] carries the last value of the record.

pub mod adapter;
pub mod config;
pub mod error;
pub mod index;
pub mod listener;
pub mod mapping;
pub mod storage;

// Re-export commonly used types for convenience
pub use adapter::{KeyValueAdapter, PartialUpdate, PropertyUpdate, State};
pub use config::{EnableKeyspaceEvents, MappingConfig, ShadowCopy};
pub use error::{CodecError, LifecycleError, MappingError, Result, StoreError};
pub use listener::ExpiredEvent;
pub use mapping::{Entity, EntitySchema, GeoPoint, IndexDefinition, TimeToLive, TimeUnit};
pub use storage::{KeyValueStore, StorageEngine};

/// Version of FlashMap
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
