//! Keyspace Adapter Module
//!
//! The entry point of the crate: [`KeyValueAdapter`] writes, reads, updates
//! and deletes records and owns the expiration listener lifecycle.

pub mod core;
pub mod keys;
pub mod lifecycle;
pub mod update;

pub use self::core::KeyValueAdapter;
pub use keys::KeyspaceIdentifier;
pub use lifecycle::{Lifecycle, State};
pub use update::{PartialUpdate, PropertyUpdate};
