//! Reading Buckets Back
//!
//! Buckets store every scalar as text, so reading one back is type-directed:
//! the target type tells us whether `"30"` is a number or a string. This
//! module rebuilds a tree from the dotted paths and implements a serde
//! [`Deserializer`](serde::Deserializer) over it that parses leaves on demand.
//!
//! Collections and maps with no elements are not stored at all, so their
//! fields should carry `#[serde(default)]`.

use crate::error::CodecError;
use crate::mapping::bucket::{element_index, join_path, Bucket, TYPE_HINT_FIELD};
use serde::de::value::{MapAccessDeserializer, MapDeserializer, SeqDeserializer, StringDeserializer};
use serde::de::{self, DeserializeOwned, IntoDeserializer, Visitor};
use std::collections::BTreeMap;
use std::str::FromStr;

/// A bucket rebuilt as a tree.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Node {
    Leaf(String),
    Branch(BTreeMap<String, Node>),
}

impl Node {
    /// Rebuilds the tree of `bucket`, skipping the type hint.
    pub(crate) fn from_bucket(bucket: &Bucket) -> Self {
        let mut root = BTreeMap::new();
        for (path, value) in bucket.iter() {
            if path == TYPE_HINT_FIELD {
                continue;
            }
            let leaf = Node::Leaf(String::from_utf8_lossy(value).into_owned());
            let segments: Vec<&str> = path.split('.').collect();
            insert(&mut root, &segments, leaf);
        }
        Node::Branch(root)
    }
}

fn insert(branch: &mut BTreeMap<String, Node>, segments: &[&str], leaf: Node) {
    let Some((segment, rest)) = segments.split_first() else {
        return;
    };

    if rest.is_empty() {
        branch.insert(segment.to_string(), leaf);
        return;
    }

    let child = branch
        .entry(segment.to_string())
        .or_insert_with(|| Node::Branch(BTreeMap::new()));
    // A scalar and a nested value under the same path: the nested value wins
    if let Node::Leaf(_) = child {
        *child = Node::Branch(BTreeMap::new());
    }
    if let Node::Branch(children) = child {
        insert(children, rest, leaf);
    }
}

/// Decodes `bucket` into `T`.
pub fn from_bucket<T: DeserializeOwned>(bucket: &Bucket) -> Result<T, CodecError> {
    T::deserialize(NodeDeserializer::new(Node::from_bucket(bucket), String::new()))
}

/// Deserializer over one node of the tree.
pub(crate) struct NodeDeserializer {
    node: Node,
    path: String,
}

impl NodeDeserializer {
    pub(crate) fn new(node: Node, path: String) -> Self {
        Self { node, path }
    }

    fn parse<T: FromStr>(self) -> Result<T, CodecError> {
        match self.node {
            Node::Leaf(text) => text.parse().map_err(|_| CodecError::InvalidScalar {
                path: self.path,
                value: text,
            }),
            Node::Branch(_) => Err(CodecError::InvalidScalar {
                path: self.path,
                value: "<nested value>".to_string(),
            }),
        }
    }

    fn into_map<'de>(self) -> Result<MapDeserializer<'de, MapEntries, CodecError>, CodecError> {
        match self.node {
            Node::Branch(children) => {
                let parent = self.path;
                let entries: Vec<(String, NodeDeserializer)> = children
                    .into_iter()
                    .map(|(key, node)| {
                        let path = join_path(&parent, &key);
                        (key, NodeDeserializer::new(node, path))
                    })
                    .collect();
                Ok(MapDeserializer::new(entries.into_iter()))
            }
            Node::Leaf(text) => Err(CodecError::InvalidScalar {
                path: self.path,
                value: text,
            }),
        }
    }

    fn into_seq(self) -> Result<SeqDeserializer<SeqElements, CodecError>, CodecError> {
        match self.node {
            Node::Branch(children) => {
                let mut elements: Vec<(usize, String, Node)> = children
                    .into_iter()
                    .enumerate()
                    .map(|(position, (key, node))| (element_index(&key).unwrap_or(position), key, node))
                    .collect();
                elements.sort_by_key(|(index, _, _)| *index);

                let parent = self.path;
                let elements: Vec<NodeDeserializer> = elements
                    .into_iter()
                    .map(|(_, key, node)| NodeDeserializer::new(node, join_path(&parent, &key)))
                    .collect();
                Ok(SeqDeserializer::new(elements.into_iter()))
            }
            Node::Leaf(text) => Err(CodecError::InvalidScalar {
                path: self.path,
                value: text,
            }),
        }
    }

    fn is_sequence(&self) -> bool {
        match &self.node {
            Node::Branch(children) => {
                !children.is_empty() && children.keys().all(|key| element_index(key).is_some())
            }
            Node::Leaf(_) => false,
        }
    }
}

type MapEntries = std::vec::IntoIter<(String, NodeDeserializer)>;
type SeqElements = std::vec::IntoIter<NodeDeserializer>;

impl<'de> IntoDeserializer<'de, CodecError> for NodeDeserializer {
    type Deserializer = Self;

    fn into_deserializer(self) -> Self {
        self
    }
}

macro_rules! deserialize_parsed {
    ($($method:ident => $visit:ident: $ty:ty),* $(,)?) => {
        $(
            fn $method<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, CodecError> {
                let value: $ty = self.parse()?;
                visitor.$visit(value)
            }
        )*
    };
}

impl<'de> de::Deserializer<'de> for NodeDeserializer {
    type Error = CodecError;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, CodecError> {
        match self.node {
            Node::Leaf(text) => visitor.visit_string(text),
            Node::Branch(_) if self.is_sequence() => self.deserialize_seq(visitor),
            Node::Branch(_) => self.deserialize_map(visitor),
        }
    }

    deserialize_parsed! {
        deserialize_bool => visit_bool: bool,
        deserialize_i8 => visit_i8: i8,
        deserialize_i16 => visit_i16: i16,
        deserialize_i32 => visit_i32: i32,
        deserialize_i64 => visit_i64: i64,
        deserialize_u8 => visit_u8: u8,
        deserialize_u16 => visit_u16: u16,
        deserialize_u32 => visit_u32: u32,
        deserialize_u64 => visit_u64: u64,
        deserialize_f32 => visit_f32: f32,
        deserialize_f64 => visit_f64: f64,
        deserialize_char => visit_char: char,
    }

    fn deserialize_str<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, CodecError> {
        self.deserialize_string(visitor)
    }

    fn deserialize_string<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, CodecError> {
        match self.node {
            Node::Leaf(text) => visitor.visit_string(text),
            Node::Branch(_) => self.deserialize_any(visitor),
        }
    }

    fn deserialize_bytes<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, CodecError> {
        self.deserialize_byte_buf(visitor)
    }

    fn deserialize_byte_buf<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, CodecError> {
        match self.node {
            Node::Leaf(text) => visitor.visit_byte_buf(text.into_bytes()),
            Node::Branch(_) => self.deserialize_seq(visitor),
        }
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, CodecError> {
        // Absent values never reach the deserializer: nulls are not stored
        visitor.visit_some(self)
    }

    fn deserialize_unit<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, CodecError> {
        visitor.visit_unit()
    }

    fn deserialize_unit_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, CodecError> {
        visitor.visit_unit()
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, CodecError> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_seq<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, CodecError> {
        let mut seq = self.into_seq()?;
        let value = visitor.visit_seq(&mut seq)?;
        seq.end()?;
        Ok(value)
    }

    fn deserialize_tuple<V: Visitor<'de>>(self, _len: usize, visitor: V) -> Result<V::Value, CodecError> {
        self.deserialize_seq(visitor)
    }

    fn deserialize_tuple_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _len: usize,
        visitor: V,
    ) -> Result<V::Value, CodecError> {
        self.deserialize_seq(visitor)
    }

    fn deserialize_map<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, CodecError> {
        let mut map = self.into_map()?;
        let value = visitor.visit_map(&mut map)?;
        map.end()?;
        Ok(value)
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, CodecError> {
        self.deserialize_map(visitor)
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, CodecError> {
        match self.node {
            Node::Leaf(text) => {
                let variant: StringDeserializer<CodecError> = text.into_deserializer();
                visitor.visit_enum(variant)
            }
            Node::Branch(_) => visitor.visit_enum(MapAccessDeserializer::new(self.into_map()?)),
        }
    }

    fn deserialize_identifier<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, CodecError> {
        self.deserialize_string(visitor)
    }

    fn deserialize_ignored_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, CodecError> {
        visitor.visit_unit()
    }
}
