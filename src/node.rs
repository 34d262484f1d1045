//! The recursive tree node model for configuration data
//!
//! A [`Node`] is one JSON-like unit of configuration: null, a primitive, an
//! insertion-ordered object, or a list. The type is an exhaustive tagged
//! union so that every traversal switch in the library is checked by the
//! compiler.
//!
//! A `Node` serialized to JSON and parsed back is deep-equal to the original;
//! no variant leaks representation-specific metadata into the logical value.
//! Object key order is preserved across the round trip.

use indexmap::IndexMap;
use serde::de::{MapAccess, SeqAccess, Visitor};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::error::Result;

/// Reserved key marking a container node as referable by uuid.
pub const UUID_KEY: &str = "_.uuid";

/// Reserved key present only on olock roots; holds the last-computed
/// structural hash of that subtree.
pub const HASH_KEY: &str = "_.hash";

/// Reserved key marking the containing node as a reference to another node
/// by uuid.
pub const REF_KEY: &str = "_.ref";

/// Flag key accompanying [`REF_KEY`] on non-owning references.
pub const WEAK_REF_KEY: &str = "weakReference";

/// One JSON-like unit of configuration data
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// The JSON null value
    Null,
    /// A boolean primitive
    Bool(bool),
    /// A numeric primitive (integer or float, per JSON semantics)
    Number(serde_json::Number),
    /// A string primitive
    String(String),
    /// An insertion-ordered mapping from unique string keys to child nodes
    Object(IndexMap<String, Node>),
    /// An ordered sequence of child nodes
    List(Vec<Node>),
}

impl Node {
    /// Create an empty object node
    pub fn object() -> Self {
        Node::Object(IndexMap::new())
    }

    /// Create an object node stamped with a fresh v4 uuid under `_.uuid`,
    /// making it referable from elsewhere in the tree.
    pub fn referable(mut map: IndexMap<String, Node>) -> Self {
        map.insert(
            UUID_KEY.to_string(),
            Node::String(uuid::Uuid::new_v4().to_string()),
        );
        Node::Object(map)
    }

    /// Create a strong reference node pointing at the node with `uuid`
    pub fn reference(uuid: &str) -> Self {
        let mut map = IndexMap::new();
        map.insert(REF_KEY.to_string(), Node::String(uuid.to_string()));
        Node::Object(map)
    }

    /// Create a weak (non-owning) reference node pointing at the node with
    /// `uuid`
    pub fn weak_reference(uuid: &str) -> Self {
        let mut map = IndexMap::new();
        map.insert(REF_KEY.to_string(), Node::String(uuid.to_string()));
        map.insert(WEAK_REF_KEY.to_string(), Node::Bool(true));
        Node::Object(map)
    }

    /// The uuid this node references via `_.ref`, if it is a reference node
    pub fn referenced_uuid(&self) -> Option<&str> {
        self.get(REF_KEY).and_then(Node::as_str)
    }

    /// The uuid declared by this node via `_.uuid`, if any
    pub fn declared_uuid(&self) -> Option<&str> {
        self.get(UUID_KEY).and_then(Node::as_str)
    }

    /// True if this is the null node
    pub fn is_null(&self) -> bool {
        matches!(self, Node::Null)
    }

    /// True if this is an object node
    pub fn is_object(&self) -> bool {
        matches!(self, Node::Object(_))
    }

    /// True if this is a list node
    pub fn is_list(&self) -> bool {
        matches!(self, Node::List(_))
    }

    /// The contained boolean, if this is a boolean primitive
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Node::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The contained string slice, if this is a string primitive
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Node::String(s) => Some(s),
            _ => None,
        }
    }

    /// The contained integer, if this is an integral number
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Node::Number(n) => n.as_i64(),
            _ => None,
        }
    }

    /// The contained float, if this is a number
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Node::Number(n) => n.as_f64(),
            _ => None,
        }
    }

    /// Borrow the underlying map, if this is an object node
    pub fn as_object(&self) -> Option<&IndexMap<String, Node>> {
        match self {
            Node::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Mutably borrow the underlying map, if this is an object node
    pub fn as_object_mut(&mut self) -> Option<&mut IndexMap<String, Node>> {
        match self {
            Node::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Borrow the underlying items, if this is a list node
    pub fn as_list(&self) -> Option<&[Node]> {
        match self {
            Node::List(items) => Some(items),
            _ => None,
        }
    }

    /// Mutably borrow the underlying items, if this is a list node
    pub fn as_list_mut(&mut self) -> Option<&mut Vec<Node>> {
        match self {
            Node::List(items) => Some(items),
            _ => None,
        }
    }

    /// Child lookup by key on object nodes; `None` for any other variant
    pub fn get(&self, key: &str) -> Option<&Node> {
        self.as_object().and_then(|map| map.get(key))
    }

    /// Resolve a path relative to this node; `Ok(None)` if absent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`](crate::error::Error::Storage) when the path
    /// descends into a node of the wrong kind.
    pub fn get_path(&self, path: &crate::path::Path) -> Result<Option<&Node>> {
        crate::tree::node_at(self, path)
    }

    /// The canonical string form of a primitive, used by search predicates
    /// and the structural hash. `None` for null and container nodes.
    pub fn primitive_text(&self) -> Option<String> {
        match self {
            Node::Bool(b) => Some(b.to_string()),
            Node::Number(n) => Some(n.to_string()),
            Node::String(s) => Some(s.clone()),
            Node::Null | Node::Object(_) | Node::List(_) => None,
        }
    }

    /// Parse a node from a JSON document
    pub fn from_json_str(json: &str) -> Result<Node> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize this node to a compact JSON document
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Serialize this node to a pretty-printed JSON document
    pub fn to_json_string_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl Default for Node {
    fn default() -> Self {
        Node::Null
    }
}

impl From<bool> for Node {
    fn from(v: bool) -> Self {
        Node::Bool(v)
    }
}

impl From<i64> for Node {
    fn from(v: i64) -> Self {
        Node::Number(v.into())
    }
}

impl From<u64> for Node {
    fn from(v: u64) -> Self {
        Node::Number(v.into())
    }
}

impl From<&str> for Node {
    fn from(v: &str) -> Self {
        Node::String(v.to_string())
    }
}

impl From<String> for Node {
    fn from(v: String) -> Self {
        Node::String(v)
    }
}

impl From<Vec<Node>> for Node {
    fn from(v: Vec<Node>) -> Self {
        Node::List(v)
    }
}

impl From<IndexMap<String, Node>> for Node {
    fn from(v: IndexMap<String, Node>) -> Self {
        Node::Object(v)
    }
}

impl Serialize for Node {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Node::Null => serializer.serialize_unit(),
            Node::Bool(b) => serializer.serialize_bool(*b),
            Node::Number(n) => n.serialize(serializer),
            Node::String(s) => serializer.serialize_str(s),
            Node::Object(map) => {
                let mut state = serializer.serialize_map(Some(map.len()))?;
                for (key, value) in map {
                    state.serialize_entry(key, value)?;
                }
                state.end()
            }
            Node::List(items) => {
                let mut state = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    state.serialize_element(item)?;
                }
                state.end()
            }
        }
    }
}

struct NodeVisitor;

impl<'de> Visitor<'de> for NodeVisitor {
    type Value = Node;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a JSON value")
    }

    fn visit_unit<E: serde::de::Error>(self) -> std::result::Result<Node, E> {
        Ok(Node::Null)
    }

    fn visit_none<E: serde::de::Error>(self) -> std::result::Result<Node, E> {
        Ok(Node::Null)
    }

    fn visit_some<D: Deserializer<'de>>(
        self,
        deserializer: D,
    ) -> std::result::Result<Node, D::Error> {
        deserializer.deserialize_any(NodeVisitor)
    }

    fn visit_bool<E: serde::de::Error>(self, v: bool) -> std::result::Result<Node, E> {
        Ok(Node::Bool(v))
    }

    fn visit_i64<E: serde::de::Error>(self, v: i64) -> std::result::Result<Node, E> {
        Ok(Node::Number(v.into()))
    }

    fn visit_u64<E: serde::de::Error>(self, v: u64) -> std::result::Result<Node, E> {
        Ok(Node::Number(v.into()))
    }

    fn visit_f64<E: serde::de::Error>(self, v: f64) -> std::result::Result<Node, E> {
        serde_json::Number::from_f64(v)
            .map(Node::Number)
            .ok_or_else(|| E::custom("non-finite number"))
    }

    fn visit_str<E: serde::de::Error>(self, v: &str) -> std::result::Result<Node, E> {
        Ok(Node::String(v.to_string()))
    }

    fn visit_string<E: serde::de::Error>(self, v: String) -> std::result::Result<Node, E> {
        Ok(Node::String(v))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> std::result::Result<Node, A::Error> {
        let mut map = IndexMap::with_capacity(access.size_hint().unwrap_or(0));
        while let Some((key, value)) = access.next_entry::<String, Node>()? {
            map.insert(key, value);
        }
        Ok(Node::Object(map))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut access: A) -> std::result::Result<Node, A::Error> {
        let mut items = Vec::with_capacity(access.size_hint().unwrap_or(0));
        while let Some(item) = access.next_element::<Node>()? {
            items.push(item);
        }
        Ok(Node::List(items))
    }
}

impl<'de> Deserialize<'de> for Node {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Node, D::Error> {
        deserializer.deserialize_any(NodeVisitor)
    }
}
