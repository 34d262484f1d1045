//! Schema hints consumed by the optimistic-locking engine
//!
//! A [`Schema`] mirrors the shape of a configuration subtree and records
//! which positions are olock roots. It is produced outside this library
//! (by whatever maps application classes onto tree nodes) and consumed by
//! the hash-marking pass, which inserts a placeholder hash at every
//! designated position before hashes are computed.
//!
//! Polymorphic containers (extension maps keyed by type name, uuid-keyed
//! device maps, lists of homogeneous elements) are described by a
//! `wildcard` child schema applied to every child the named children do not
//! cover.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Shape description for one tree position
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Schema {
    /// True if the node at this position carries a structural hash and
    /// participates in optimistic-merge comparison.
    #[serde(default)]
    pub olock_root: bool,

    /// Schemas for named children
    #[serde(default)]
    pub children: IndexMap<String, Schema>,

    /// Schema applied to every child not matched by `children`: extension
    /// maps, uuid-keyed containers, and list elements.
    #[serde(default)]
    pub wildcard: Option<Box<Schema>>,
}

impl Schema {
    /// A schema marking its own position as an olock root
    pub fn olock_root() -> Self {
        Schema {
            olock_root: true,
            ..Schema::default()
        }
    }

    /// Builder: add a named child schema
    pub fn with_child(mut self, name: &str, child: Schema) -> Self {
        self.children.insert(name.to_string(), child);
        self
    }

    /// Builder: set the wildcard child schema
    pub fn with_wildcard(mut self, child: Schema) -> Self {
        self.wildcard = Some(Box::new(child));
        self
    }

    /// The schema governing the child at `key`, if any
    pub fn child(&self, key: &str) -> Option<&Schema> {
        self.children.get(key).or(self.wildcard.as_deref())
    }

    /// The schema governing list elements at this position, if any
    pub fn element(&self) -> Option<&Schema> {
        self.wildcard.as_deref()
    }
}
