//! Structural hash calculation for optimistic locking
//!
//! Every container accumulates a fixed-width SHA-256 digest from its
//! descendants using byte-wise wrapping addition, an associative,
//! order-insensitive combination, so sibling order never affects a parent's
//! digest, and individual contributions can be subtracted back out during
//! merge attribution. Each object entry contributes
//! `sha256(key || child digest)`, so renaming a key changes the digest; list
//! items contribute their own digest; primitives are digested from a type
//! tag and their canonical string form.
//!
//! A node carrying the `_.hash` marker is an **olock root**: its combined
//! digest is written back into `_.hash` (hex), and only a fixed zero-digest
//! envelope is folded into its parent. Edits inside a root therefore never
//! disturb the hash of an enclosing root, while adding or deleting the root
//! itself does. The hash key and the in-flight snapshot key are excluded
//! from hashing, which keeps repeated computation idempotent.

use indexmap::IndexMap;
use sha2::{Digest, Sha256};

use crate::node::{Node, HASH_KEY};
use crate::schema::Schema;
use crate::tree;

/// Placeholder value inserted by the marking pass at olock-root positions
/// whose hash has not been calculated yet.
pub const HASH_PLACEHOLDER: &str = "*";

/// In-flight-only key holding the hash a subtree had when the caller read
/// it. Moved out of `_.hash` before fresh hashes are computed; never
/// persisted.
pub const OLD_HASH_KEY: &str = "#old_hash";

/// Fixed-width structural digest
pub type NodeDigest = [u8; 32];

pub(crate) const ZERO_DIGEST: NodeDigest = [0; 32];

/// Fold a contribution into an accumulator (byte-wise wrapping addition)
pub(crate) fn add(acc: &mut NodeDigest, contribution: &NodeDigest) {
    for (a, c) in acc.iter_mut().zip(contribution) {
        *a = a.wrapping_add(*c);
    }
}

/// Remove a contribution from an accumulator (inverse of [`add`])
pub(crate) fn subtract(acc: &mut NodeDigest, contribution: &NodeDigest) {
    for (a, c) in acc.iter_mut().zip(contribution) {
        *a = a.wrapping_sub(*c);
    }
}

/// Digest an object entry together with its key
pub(crate) fn keyed_digest(key: &str, child: &NodeDigest) -> NodeDigest {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hasher.update(child);
    hasher.finalize().into()
}

fn primitive_digest(tag: u8, text: &str) -> NodeDigest {
    let mut hasher = Sha256::new();
    hasher.update([tag]);
    hasher.update(text.as_bytes());
    hasher.finalize().into()
}

fn object_digest(map: &IndexMap<String, Node>) -> NodeDigest {
    let mut acc = ZERO_DIGEST;
    for (key, value) in map {
        if key == HASH_KEY || key == OLD_HASH_KEY {
            continue;
        }
        add(&mut acc, &keyed_digest(key, &subtree_digest(value)));
    }
    acc
}

/// The digest a node contributes to its parent's accumulator.
///
/// An olock root (an object carrying `_.hash`) contributes the fixed zero
/// envelope; its content digest stays local to the root.
pub(crate) fn subtree_digest(node: &Node) -> NodeDigest {
    match node {
        Node::Null => primitive_digest(b'z', ""),
        Node::Bool(b) => primitive_digest(b'b', &b.to_string()),
        Node::Number(n) => primitive_digest(b'd', &n.to_string()),
        Node::String(s) => primitive_digest(b's', s),
        Node::Object(map) => {
            if map.contains_key(HASH_KEY) {
                ZERO_DIGEST
            } else {
                object_digest(map)
            }
        }
        Node::List(items) => {
            let mut acc = ZERO_DIGEST;
            for item in items {
                add(&mut acc, &subtree_digest(item));
            }
            acc
        }
    }
}

/// Parse a hex hash value back into a digest
pub(crate) fn parse_digest(hash: &str) -> Option<NodeDigest> {
    let bytes = hex::decode(hash).ok()?;
    bytes.try_into().ok()
}

/// Schema-directed marking pass: insert the [`HASH_PLACEHOLDER`] sentinel at
/// every position the schema designates as an olock root, recursing through
/// named children, wildcard/extension maps, and list elements.
///
/// Marking is idempotent; positions already carrying `_.hash` keep their
/// value.
pub fn mark_hash_roots(node: &mut Node, schema: &Schema) {
    match node {
        Node::Object(map) => {
            if schema.olock_root && !map.contains_key(HASH_KEY) {
                map.insert(
                    HASH_KEY.to_string(),
                    Node::String(HASH_PLACEHOLDER.to_string()),
                );
            }
            for index in 0..map.len() {
                let key = map
                    .get_index(index)
                    .map(|(key, _)| key.clone())
                    .expect("index in range");
                if let Some(child_schema) = schema.child(&key) {
                    let value = map.get_index_mut(index).expect("index in range").1;
                    mark_hash_roots(value, child_schema);
                }
            }
        }
        Node::List(items) => {
            if let Some(element_schema) = schema.element() {
                for item in items {
                    mark_hash_roots(item, element_schema);
                }
            }
        }
        _ => {}
    }
}

/// Move the hash each olock root carried when the caller read it into the
/// temporary snapshot key, leaving the placeholder behind so the position
/// stays marked. Roots still carrying the placeholder (never read from the
/// store) get no snapshot.
pub fn snapshot_hashes(node: &mut Node) {
    tree::walk_objects_mut(node, &mut |map| {
        if let Some(Node::String(hash)) = map.get(HASH_KEY) {
            if hash != HASH_PLACEHOLDER {
                let hash = hash.clone();
                map.insert(OLD_HASH_KEY.to_string(), Node::String(hash));
                map.insert(
                    HASH_KEY.to_string(),
                    Node::String(HASH_PLACEHOLDER.to_string()),
                );
            }
        }
    });
}

/// Compute fresh digests bottom-up, writing each olock root's digest (hex)
/// into its `_.hash` marker. Returns the digest the whole subtree
/// contributes to an enclosing accumulator.
///
/// Computation is idempotent: hash and snapshot keys are excluded from the
/// digests, so recomputing over an unmodified tree rewrites identical
/// values.
pub fn compute_hashes(node: &mut Node) -> NodeDigest {
    match node {
        Node::Object(map) => {
            let is_root = map.contains_key(HASH_KEY);
            let mut acc = ZERO_DIGEST;
            for index in 0..map.len() {
                let key = map
                    .get_index(index)
                    .map(|(key, _)| key.clone())
                    .expect("index in range");
                if key == HASH_KEY || key == OLD_HASH_KEY {
                    continue;
                }
                let value = map.get_index_mut(index).expect("index in range").1;
                let child = compute_hashes(value);
                add(&mut acc, &keyed_digest(&key, &child));
            }
            if is_root {
                map.insert(HASH_KEY.to_string(), Node::String(hex::encode(acc)));
                ZERO_DIGEST
            } else {
                acc
            }
        }
        Node::List(items) => {
            let mut acc = ZERO_DIGEST;
            for item in items {
                add(&mut acc, &compute_hashes(item));
            }
            acc
        }
        primitive => subtree_digest(primitive),
    }
}

/// Cleanup pass: strip the hash marker and the snapshot key everywhere so
/// neither leaks into durable storage.
pub fn strip_hash_keys(node: &mut Node) {
    tree::walk_objects_mut(node, &mut |map| {
        map.shift_remove(HASH_KEY);
        map.shift_remove(OLD_HASH_KEY);
    });
}
