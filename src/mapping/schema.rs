//! Entity Schemas
//!
//! Every persisted type carries a static [`EntitySchema`]: its keyspace, the
//! property paths that are indexed and where its time-to-live comes from.
//! The engine consults it with plain path matching; nothing is discovered at
//! runtime.
//!
//! ```
//! use flashmap::mapping::{Entity, EntitySchema, IndexDefinition};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize)]
//! struct Person {
//!     id: String,
//!     firstname: String,
//!     age: u32,
//! }
//!
//! impl Entity for Person {
//!     const SCHEMA: EntitySchema = EntitySchema::new("person", "Person")
//!         .with_indexes(&[IndexDefinition::equality("firstname")]);
//!
//!     fn id(&self) -> Option<String> {
//!         Some(self.id.clone())
//!     }
//! }
//! ```

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

/// Kind of secondary index maintained for a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    /// Set of ids per value, at `keyspace:path:value`
    Equality,
    /// Sorted set of ids scored by geohash, at `keyspace:geo_index_name(path)`
    Geo,
}

/// One indexed property path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexDefinition {
    pub path: &'static str,
    pub kind: IndexKind,
}

impl IndexDefinition {
    pub const fn equality(path: &'static str) -> Self {
        Self {
            path,
            kind: IndexKind::Equality,
        }
    }

    /// The property must serialize as a [`GeoPoint`](crate::mapping::GeoPoint).
    pub const fn geo(path: &'static str) -> Self {
        Self {
            path,
            kind: IndexKind::Geo,
        }
    }

    /// True if `path` is this index's path or lies below it.
    pub fn covers(&self, path: &str) -> bool {
        path == self.path
            || path
                .strip_prefix(self.path)
                .is_some_and(|rest| rest.starts_with('.'))
    }
}

/// Unit of a time-to-live property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Seconds,
    Milliseconds,
    Minutes,
    Hours,
    Days,
}

impl TimeUnit {
    /// Length of one unit in milliseconds.
    pub const fn millis(self) -> u64 {
        match self {
            TimeUnit::Milliseconds => 1,
            TimeUnit::Seconds => 1_000,
            TimeUnit::Minutes => 60_000,
            TimeUnit::Hours => 3_600_000,
            TimeUnit::Days => 86_400_000,
        }
    }

    pub fn to_duration(self, amount: u64) -> Duration {
        Duration::from_millis(amount.saturating_mul(self.millis()))
    }

    /// Converts a duration to this unit, rounding up.
    pub fn from_duration(self, duration: Duration) -> u64 {
        duration.as_millis().div_ceil(self.millis() as u128) as u64
    }

    /// Converts a remaining TTL in milliseconds to this unit, rounding down.
    /// Negative markers (`-1` persistent) are kept as they are.
    pub fn from_remaining_millis(self, millis: i64) -> i64 {
        if millis < 0 {
            millis
        } else {
            millis / self.millis() as i64
        }
    }
}

/// Where a record's time-to-live comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeToLive {
    /// Records never expire
    None,
    /// Every record expires after this many seconds
    Fixed(u64),
    /// Read from a numeric property; `get` writes the remaining TTL back into it
    Property { path: &'static str, unit: TimeUnit },
}

/// Static description of a persisted type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntitySchema {
    pub keyspace: &'static str,
    /// Stored under `_class` in every bucket
    pub type_alias: &'static str,
    pub id_path: &'static str,
    pub indexes: &'static [IndexDefinition],
    pub time_to_live: TimeToLive,
}

impl EntitySchema {
    pub const fn new(keyspace: &'static str, type_alias: &'static str) -> Self {
        Self {
            keyspace,
            type_alias,
            id_path: "id",
            indexes: &[],
            time_to_live: TimeToLive::None,
        }
    }

    pub const fn with_id_path(mut self, id_path: &'static str) -> Self {
        self.id_path = id_path;
        self
    }

    pub const fn with_indexes(mut self, indexes: &'static [IndexDefinition]) -> Self {
        self.indexes = indexes;
        self
    }

    pub const fn with_time_to_live(mut self, time_to_live: TimeToLive) -> Self {
        self.time_to_live = time_to_live;
        self
    }

    /// True if records of this type may carry a time-to-live.
    pub fn is_expiring(&self) -> bool {
        !matches!(self.time_to_live, TimeToLive::None)
    }

    /// The property that receives the remaining TTL on read, if any.
    pub fn explicit_ttl_property(&self) -> Option<(&'static str, TimeUnit)> {
        match self.time_to_live {
            TimeToLive::Property { path, unit } => Some((path, unit)),
            _ => None,
        }
    }

    /// Finds the index covering `path`, if any.
    pub fn index_for(&self, path: &str) -> Option<&IndexDefinition> {
        self.indexes.iter().find(|index| index.covers(path))
    }
}

/// A type that can be stored in a keyspace.
pub trait Entity: Serialize + DeserializeOwned {
    const SCHEMA: EntitySchema;

    /// The record id, `None` if not assigned.
    fn id(&self) -> Option<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    const PERSON: EntitySchema = EntitySchema::new("person", "Person")
        .with_indexes(&[
            IndexDefinition::equality("firstname"),
            IndexDefinition::geo("address.location"),
        ])
        .with_time_to_live(TimeToLive::Property {
            path: "ttl",
            unit: TimeUnit::Seconds,
        });

    #[test]
    fn test_const_builder() {
        assert_eq!(PERSON.keyspace, "person");
        assert_eq!(PERSON.id_path, "id");
        assert_eq!(PERSON.indexes.len(), 2);
        assert!(PERSON.is_expiring());
        assert_eq!(
            PERSON.explicit_ttl_property(),
            Some(("ttl", TimeUnit::Seconds))
        );

        let fixed = EntitySchema::new("session", "Session").with_time_to_live(TimeToLive::Fixed(5));
        assert!(fixed.is_expiring());
        assert_eq!(fixed.explicit_ttl_property(), None);
        assert!(!EntitySchema::new("city", "City").is_expiring());
    }

    #[test]
    fn test_index_covers_nested_paths() {
        let index = IndexDefinition::equality("address");
        assert!(index.covers("address"));
        assert!(index.covers("address.city"));
        assert!(!index.covers("addressbook"));

        assert_eq!(
            PERSON.index_for("address.location.x").map(|i| i.kind),
            Some(IndexKind::Geo)
        );
        assert!(PERSON.index_for("age").is_none());
    }

    #[test]
    fn test_time_unit_rounds_up() {
        assert_eq!(TimeUnit::Seconds.from_duration(Duration::from_millis(1500)), 2);
        assert_eq!(TimeUnit::Seconds.from_duration(Duration::from_secs(3)), 3);
        assert_eq!(TimeUnit::Milliseconds.from_duration(Duration::from_millis(1500)), 1500);
        assert_eq!(TimeUnit::Milliseconds.to_duration(250), Duration::from_millis(250));
        assert_eq!(TimeUnit::Minutes.from_duration(Duration::from_secs(61)), 2);
    }

    #[test]
    fn test_coarse_time_units() {
        assert_eq!(TimeUnit::Minutes.to_duration(2), Duration::from_secs(120));
        assert_eq!(TimeUnit::Hours.to_duration(1), Duration::from_secs(3600));
        assert_eq!(TimeUnit::Days.to_duration(1), Duration::from_secs(86_400));
        assert_eq!(TimeUnit::Hours.from_duration(Duration::from_secs(3600)), 1);

        assert_eq!(TimeUnit::Minutes.from_remaining_millis(119_999), 1);
        assert_eq!(TimeUnit::Days.from_remaining_millis(86_400_000), 1);
        assert_eq!(TimeUnit::Seconds.from_remaining_millis(999), 0);
        assert_eq!(TimeUnit::Hours.from_remaining_millis(-1), -1);
    }
}
