//! Key Layout
//!
//! ```text
//! keyspace                     id-set of the keyspace          (set)
//! keyspace:id                  record bucket                   (hash)
//! keyspace:id:phantom          shadow copy of the bucket       (hash)
//! keyspace:id:idx              index keys referencing the id   (set)
//! keyspace:path:value          equality index                  (set)
//! keyspace:geo_index_name      geo index                       (sorted set)
//! ```

use crate::mapping::geo_index_name;
use bytes::{BufMut, Bytes, BytesMut};

const DELIMITER: u8 = b':';

/// Suffix of shadow copy keys.
pub const PHANTOM_SUFFIX: &str = ":phantom";

/// Suffix of the per-id index helper set.
pub const INDEX_HELPER_SUFFIX: &str = ":idx";

fn concat(parts: &[&[u8]]) -> Bytes {
    let len = parts.iter().map(|part| part.len()).sum::<usize>() + parts.len();
    let mut buf = BytesMut::with_capacity(len);
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            buf.put_u8(DELIMITER);
        }
        buf.put_slice(part);
    }
    buf.freeze()
}

/// Key of the id-set of `keyspace`.
pub fn keyspace_key(keyspace: &str) -> Bytes {
    Bytes::copy_from_slice(keyspace.as_bytes())
}

/// `keyspace:id`
pub fn object_key(keyspace: &str, id: &[u8]) -> Bytes {
    concat(&[keyspace.as_bytes(), id])
}

/// `keyspace:id:phantom`
pub fn phantom_key(keyspace: &str, id: &[u8]) -> Bytes {
    concat(&[keyspace.as_bytes(), id, &PHANTOM_SUFFIX.as_bytes()[1..]])
}

/// `keyspace:id:idx`
pub fn index_helper_key(keyspace: &str, id: &[u8]) -> Bytes {
    concat(&[keyspace.as_bytes(), id, &INDEX_HELPER_SUFFIX.as_bytes()[1..]])
}

/// `keyspace:path:value`
pub fn equality_index_key(keyspace: &str, path: &str, value: &[u8]) -> Bytes {
    concat(&[keyspace.as_bytes(), path.as_bytes(), value])
}

/// Prefix shared by every equality index key of `path`: `keyspace:path:`.
pub fn equality_index_prefix(keyspace: &str, path: &str) -> Bytes {
    concat(&[keyspace.as_bytes(), path.as_bytes(), &[]])
}

/// `keyspace:` followed by the geo index name of `path`.
pub fn geo_index_key(keyspace: &str, path: &str) -> Bytes {
    concat(&[keyspace.as_bytes(), geo_index_name(path).as_bytes()])
}

/// A primary record key split into keyspace and id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyspaceIdentifier {
    pub keyspace: String,
    pub id: Bytes,
}

impl KeyspaceIdentifier {
    /// Parses `keyspace:id`. The keyspace ends at the first `:`.
    ///
    /// Returns `None` for keys without a keyspace or id, and for shadow copy
    /// and index helper keys, which are not records.
    pub fn parse(key: &[u8]) -> Option<Self> {
        let delimiter = key.iter().position(|&b| b == DELIMITER)?;
        let (keyspace, rest) = key.split_at(delimiter);
        let id = &rest[1..];

        if keyspace.is_empty() || id.is_empty() {
            return None;
        }
        if key.ends_with(PHANTOM_SUFFIX.as_bytes()) || key.ends_with(INDEX_HELPER_SUFFIX.as_bytes()) {
            return None;
        }

        let keyspace = std::str::from_utf8(keyspace).ok()?.to_string();
        Some(Self {
            keyspace,
            id: Bytes::copy_from_slice(id),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_derivation() {
        assert_eq!(keyspace_key("person"), Bytes::from("person"));
        assert_eq!(object_key("person", b"42"), Bytes::from("person:42"));
        assert_eq!(phantom_key("person", b"42"), Bytes::from("person:42:phantom"));
        assert_eq!(index_helper_key("person", b"42"), Bytes::from("person:42:idx"));
        assert_eq!(
            equality_index_key("person", "firstname", b"Jon"),
            Bytes::from("person:firstname:Jon")
        );
        assert_eq!(
            equality_index_prefix("person", "firstname"),
            Bytes::from("person:firstname:")
        );
        assert_eq!(
            geo_index_key("person", "address.location"),
            Bytes::from("person:address:location")
        );
    }

    #[test]
    fn test_parse_record_key() {
        let identifier = KeyspaceIdentifier::parse(b"person:42").unwrap();
        assert_eq!(identifier.keyspace, "person");
        assert_eq!(identifier.id, Bytes::from("42"));

        // ids may contain the delimiter
        let identifier = KeyspaceIdentifier::parse(b"person:a:b").unwrap();
        assert_eq!(identifier.id, Bytes::from("a:b"));
    }

    #[test]
    fn test_parse_rejects_non_records() {
        assert!(KeyspaceIdentifier::parse(b"person").is_none());
        assert!(KeyspaceIdentifier::parse(b":42").is_none());
        assert!(KeyspaceIdentifier::parse(b"person:").is_none());
        assert!(KeyspaceIdentifier::parse(b"person:42:phantom").is_none());
        assert!(KeyspaceIdentifier::parse(b"person:42:idx").is_none());
        assert!(KeyspaceIdentifier::parse(b"").is_none());
    }
}
