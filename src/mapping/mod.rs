//! Object Mapping Module
//!
//! Converts typed objects to and from [`Bucket`]s, the flat field maps the
//! engine stores as hashes, and derives the index assertions for them.
//!
//! ## Data Flow
//!
//! ```text
//!   Entity ──serde_json──> Value ──flatten──> Bucket ──> HSET keyspace:id
//!                                               │
//!                                               └──> EntitySchema ──> Vec<IndexedData>
//!
//!   HGETALL keyspace:id ──> Bucket ──NodeDeserializer──> Entity
//! ```

pub mod bucket;
pub mod converter;
pub mod de;
pub mod geo;
pub mod schema;

pub use bucket::{Bucket, TYPE_HINT_FIELD};
pub use converter::{read_entity, read_value, write_entity, IndexedData, RecordData};
pub use de::from_bucket;
pub use geo::{geo_index_name, GeoPoint};
pub use schema::{Entity, EntitySchema, IndexDefinition, IndexKind, TimeToLive, TimeUnit};
