//! Buckets
//!
//! A [`Bucket`] is the flat `field -> bytes` map an object is stored as.
//! Nested values are spread over dotted paths:
//!
//! ```text
//! { "firstname": "Jon",              firstname       -> Jon
//!   "address": { "city": "Winterfell" }  =>  address.city    -> Winterfell
//!   "nicknames": ["Lord Snow"] }         nicknames.[0]   -> Lord Snow
//! ```
//!
//! Strings are stored verbatim, numbers and booleans as their text form and
//! nulls are omitted. The type alias of the entity lives under `_class`.

use crate::error::CodecError;
use bytes::Bytes;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

/// Field holding the type alias of the stored entity.
pub const TYPE_HINT_FIELD: &str = "_class";

/// Flat field-name -> bytes representation of an object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bucket {
    fields: BTreeMap<String, Bytes>,
}

impl Bucket {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flattens a JSON object into a bucket.
    pub fn from_value(value: &JsonValue) -> Result<Self, CodecError> {
        if !value.is_object() {
            return Err(CodecError::NotAnObject);
        }
        let mut bucket = Self::new();
        bucket.write_value("", value);
        Ok(bucket)
    }

    /// Builds a bucket from raw hash fields as returned by HGETALL.
    ///
    /// Field names are decoded as UTF-8, replacing invalid sequences.
    pub fn from_raw(raw: Vec<(Bytes, Bytes)>) -> Self {
        let fields = raw
            .into_iter()
            .map(|(field, value)| (String::from_utf8_lossy(&field).into_owned(), value))
            .collect();
        Self { fields }
    }

    /// Returns the raw hash fields for HSET.
    pub fn to_raw(&self) -> Vec<(Bytes, Bytes)> {
        self.fields
            .iter()
            .map(|(field, value)| (Bytes::from(field.clone()), value.clone()))
            .collect()
    }

    /// Flattens `value` into this bucket under `path` ("" for the root).
    pub fn write_value(&mut self, path: &str, value: &JsonValue) {
        match value {
            JsonValue::Null => {}
            JsonValue::Bool(b) => self.put(path, b.to_string()),
            JsonValue::Number(n) => self.put(path, n.to_string()),
            JsonValue::String(s) => self.put(path, s.clone()),
            JsonValue::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    self.write_value(&join_path(path, &format!("[{}]", i)), item);
                }
            }
            JsonValue::Object(map) => {
                for (key, item) in map {
                    self.write_value(&join_path(path, key), item);
                }
            }
        }
    }

    pub fn put(&mut self, path: impl Into<String>, value: impl Into<Bytes>) {
        self.fields.insert(path.into(), value.into());
    }

    pub fn get(&self, path: &str) -> Option<&Bytes> {
        self.fields.get(path)
    }

    /// Returns the field as UTF-8 text, if present and valid.
    pub fn get_str(&self, path: &str) -> Option<&str> {
        self.get(path).and_then(|v| std::str::from_utf8(v).ok())
    }

    pub fn remove(&mut self, path: &str) -> Option<Bytes> {
        self.fields.remove(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.fields.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Bytes)> {
        self.fields.iter()
    }

    /// Iterates the fields nested below `path` (`path.` prefix).
    pub fn nested(&self, path: &str) -> impl Iterator<Item = (&String, &Bytes)> {
        let prefix = format!("{}.", path);
        self.fields
            .range(prefix.clone()..)
            .take_while(move |(field, _)| field.starts_with(&prefix))
    }

    /// Returns the type alias stored under `_class`.
    pub fn type_hint(&self) -> Option<&str> {
        self.get_str(TYPE_HINT_FIELD)
    }

    /// True if the bucket carries nothing but the type alias.
    pub fn is_type_hint_only(&self) -> bool {
        self.fields.len() == 1 && self.contains(TYPE_HINT_FIELD)
    }
}

/// Joins a parent path and a child segment with `.`.
pub(crate) fn join_path(parent: &str, segment: &str) -> String {
    if parent.is_empty() {
        segment.to_string()
    } else {
        format!("{}.{}", parent, segment)
    }
}

/// True if `segment` is a collection element segment like `[3]`.
pub(crate) fn element_index(segment: &str) -> Option<usize> {
    segment
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .and_then(|index| index.parse().ok())
}
