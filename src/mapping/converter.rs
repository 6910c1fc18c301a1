//! Object <-> Record Conversion
//!
//! Turns an [`Entity`] into a [`RecordData`]: the bucket to store, its
//! time-to-live and the index assertions the index writer applies. Reading
//! goes the other way through the type-directed bucket deserializer.

use crate::error::CodecError;
use crate::mapping::bucket::{element_index, Bucket, TYPE_HINT_FIELD};
use crate::mapping::de::from_bucket;
use crate::mapping::geo::GeoPoint;
use crate::mapping::schema::{Entity, EntitySchema, IndexKind, TimeToLive};
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::time::Duration;

/// An assertion about what an id should be indexed under.
#[derive(Debug, Clone, PartialEq)]
pub enum IndexedData {
    /// Member of the equality index `keyspace:path:value`
    Simple {
        keyspace: String,
        path: String,
        value: Bytes,
    },
    /// Member of the geo index `keyspace:geo_index_name(path)`
    Geo {
        keyspace: String,
        path: String,
        point: GeoPoint,
    },
    /// No longer indexed under `path`
    Remove { keyspace: String, path: String },
}

impl IndexedData {
    pub fn keyspace(&self) -> &str {
        match self {
            IndexedData::Simple { keyspace, .. }
            | IndexedData::Geo { keyspace, .. }
            | IndexedData::Remove { keyspace, .. } => keyspace,
        }
    }

    pub fn path(&self) -> &str {
        match self {
            IndexedData::Simple { path, .. }
            | IndexedData::Geo { path, .. }
            | IndexedData::Remove { path, .. } => path,
        }
    }
}

/// Everything the adapter needs to persist one object.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordData {
    pub id: String,
    pub keyspace: String,
    pub bucket: Bucket,
    pub time_to_live: Option<Duration>,
    pub indexed: Vec<IndexedData>,
}

impl RecordData {
    /// True if the record carries a positive time-to-live.
    pub fn expires(&self) -> bool {
        self.time_to_live.is_some_and(|ttl| !ttl.is_zero())
    }
}

/// Serializes any value into a JSON tree, the intermediate form of a bucket.
pub fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<JsonValue, CodecError> {
    Ok(serde_json::to_value(value)?)
}

/// Converts an entity into the record stored under `keyspace:id`.
pub fn write_entity<T: Entity>(id: &str, entity: &T) -> Result<RecordData, CodecError> {
    let schema = &T::SCHEMA;

    let mut bucket = Bucket::from_value(&to_json(entity)?)?;
    bucket.put(schema.id_path, id.to_string());
    bucket.put(TYPE_HINT_FIELD, schema.type_alias);

    let time_to_live = time_to_live_of(schema, &bucket);
    let indexed = resolve_indexes(schema, schema.keyspace, &bucket);

    Ok(RecordData {
        id: id.to_string(),
        keyspace: schema.keyspace.to_string(),
        bucket,
        time_to_live,
        indexed,
    })
}

/// Reads an entity back from its bucket.
pub fn read_entity<T: DeserializeOwned>(bucket: &Bucket) -> Result<T, CodecError> {
    from_bucket(bucket)
}

/// Reads a bucket without knowing its type; scalars come back as strings.
pub fn read_value(bucket: &Bucket) -> Result<JsonValue, CodecError> {
    from_bucket(bucket)
}

/// Computes the time-to-live of a record from its schema and stored fields.
///
/// A property TTL that is absent or not positive means the record does not
/// expire.
pub fn time_to_live_of(schema: &EntitySchema, bucket: &Bucket) -> Option<Duration> {
    match schema.time_to_live {
        TimeToLive::None => None,
        TimeToLive::Fixed(0) => None,
        TimeToLive::Fixed(seconds) => Some(Duration::from_secs(seconds)),
        TimeToLive::Property { path, unit } => {
            let amount = bucket.get_str(path)?.parse::<f64>().ok()?;
            if amount >= 1.0 {
                Some(unit.to_duration(amount as u64))
            } else {
                None
            }
        }
    }
}

/// Resolves the index assertions implied by the fields of `bucket`.
///
/// Only fields present in the bucket contribute, so a sparse bucket of a
/// partial update yields assertions for the touched paths only.
pub fn resolve_indexes(schema: &EntitySchema, keyspace: &str, bucket: &Bucket) -> Vec<IndexedData> {
    let mut indexed = Vec::new();

    for index in schema.indexes {
        match index.kind {
            IndexKind::Equality => {
                if let Some(value) = bucket.get(index.path) {
                    indexed.push(IndexedData::Simple {
                        keyspace: keyspace.to_string(),
                        path: index.path.to_string(),
                        value: value.clone(),
                    });
                }
                for (field, value) in bucket.nested(index.path) {
                    indexed.push(IndexedData::Simple {
                        keyspace: keyspace.to_string(),
                        path: indexed_path(field),
                        value: value.clone(),
                    });
                }
            }
            IndexKind::Geo => {
                if let Some(point) = geo_point_at(bucket, index.path) {
                    indexed.push(IndexedData::Geo {
                        keyspace: keyspace.to_string(),
                        path: index.path.to_string(),
                        point,
                    });
                }
            }
        }
    }

    indexed
}

/// Index path of a stored field: collection element segments are dropped,
/// so `tags.[3]` is indexed under `tags` and `addresses.[0].city` under
/// `addresses.city`.
pub(crate) fn indexed_path(field: &str) -> String {
    field
        .split('.')
        .filter(|segment| element_index(segment).is_none())
        .collect::<Vec<_>>()
        .join(".")
}

/// Reads the point stored as `path.x` / `path.y`.
pub(crate) fn geo_point_at(bucket: &Bucket, path: &str) -> Option<GeoPoint> {
    let x = bucket.get_str(&format!("{}.x", path))?.parse().ok()?;
    let y = bucket.get_str(&format!("{}.y", path))?.parse().ok()?;
    let point = GeoPoint::new(x, y);
    point.is_valid().then_some(point)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::schema::{IndexDefinition, TimeUnit};
    use serde::Deserialize;
    use std::collections::HashMap;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Person {
        id: Option<String>,
        firstname: String,
        age: u32,
        #[serde(default)]
        nicknames: Vec<String>,
        #[serde(default)]
        attributes: HashMap<String, String>,
        location: Option<GeoPoint>,
        ttl: Option<i64>,
    }

    impl Entity for Person {
        const SCHEMA: EntitySchema = EntitySchema::new("person", "Person")
            .with_indexes(&[
                IndexDefinition::equality("firstname"),
                IndexDefinition::equality("nicknames"),
                IndexDefinition::equality("attributes"),
                IndexDefinition::geo("location"),
            ])
            .with_time_to_live(TimeToLive::Property {
                path: "ttl",
                unit: TimeUnit::Seconds,
            });

        fn id(&self) -> Option<String> {
            self.id.clone()
        }
    }

    fn jon() -> Person {
        Person {
            id: None,
            firstname: "Jon".to_string(),
            age: 30,
            nicknames: vec!["Lord Snow".to_string(), "King".to_string()],
            attributes: HashMap::from([("hair".to_string(), "dark".to_string())]),
            location: Some(GeoPoint::new(13.361389, 38.115556)),
            ttl: Some(10),
        }
    }

    fn simple(path: &str, value: &str) -> IndexedData {
        IndexedData::Simple {
            keyspace: "person".to_string(),
            path: path.to_string(),
            value: Bytes::from(value.to_string()),
        }
    }

    #[test]
    fn test_write_entity() {
        let record = write_entity("42", &jon()).unwrap();

        assert_eq!(record.id, "42");
        assert_eq!(record.keyspace, "person");
        assert_eq!(record.bucket.get_str("id"), Some("42"));
        assert_eq!(record.bucket.type_hint(), Some("Person"));
        assert_eq!(record.bucket.get_str("location.x"), Some("13.361389"));
        assert_eq!(record.time_to_live, Some(Duration::from_secs(10)));
        assert!(record.expires());
    }

    #[test]
    fn test_resolve_indexes() {
        let record = write_entity("42", &jon()).unwrap();

        assert!(record.indexed.contains(&simple("firstname", "Jon")));
        assert!(record.indexed.contains(&simple("nicknames", "Lord Snow")));
        assert!(record.indexed.contains(&simple("nicknames", "King")));
        assert!(record.indexed.contains(&simple("attributes.hair", "dark")));
        assert!(record.indexed.iter().any(|data| matches!(
            data,
            IndexedData::Geo { path, .. } if path == "location"
        )));
        // age is not indexed
        assert!(!record.indexed.iter().any(|data| data.path() == "age"));
    }

    #[test]
    fn test_read_entity_restores_id() {
        let record = write_entity("42", &jon()).unwrap();
        let restored: Person = read_entity(&record.bucket).unwrap();

        assert_eq!(restored.id.as_deref(), Some("42"));
        assert_eq!(Person { id: None, ..restored }, jon());
    }

    #[test]
    fn test_time_to_live_sources() {
        let mut person = jon();
        person.ttl = None;
        assert_eq!(write_entity("1", &person).unwrap().time_to_live, None);

        person.ttl = Some(-1);
        assert!(!write_entity("1", &person).unwrap().expires());

        let fixed = EntitySchema::new("session", "Session").with_time_to_live(TimeToLive::Fixed(5));
        assert_eq!(time_to_live_of(&fixed, &Bucket::new()), Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_indexed_path() {
        assert_eq!(indexed_path("tags.[3]"), "tags");
        assert_eq!(indexed_path("addresses.[0].city"), "addresses.city");
        assert_eq!(indexed_path("attributes.hair"), "attributes.hair");
    }

    #[test]
    fn test_untyped_read() {
        let record = write_entity("42", &jon()).unwrap();
        let value = read_value(&record.bucket).unwrap();

        assert_eq!(value["firstname"], "Jon");
        assert_eq!(value["age"], "30");
        assert_eq!(value["nicknames"][1], "King");
        assert!(value.get(TYPE_HINT_FIELD).is_none());
    }
}
