//! Dual-tree optimistic merge
//!
//! Reconciles the currently-stored tree (*old*) with the tree being
//! persisted (*new*) after both sides carry freshly computed hashes and the
//! new side carries its read-time snapshot under the temporary old-hash key.
//!
//! Outside marked subtrees the merge mode is inherited unchanged: the new
//! side is authoritative by default, matching full-replacement persist
//! semantics. At every olock root the three-way hash comparison is
//! re-evaluated, swapping which side is authoritative as needed:
//!
//! - snapshot == current: the caller changed nothing here; the stored
//!   side's fresh content wins for the whole subtree.
//! - snapshot == stored: the store did not move since the caller read; the
//!   caller's edit is kept as-is.
//! - both diverged: before conflicting, the engine attributes one side's
//!   divergence to pure key additions by subtracting the added keys'
//!   contributions from that side's digest (the additive combination makes
//!   contributions removable). If the remainder equals the snapshot, the
//!   other side's content wins and the additions are appended; otherwise
//!   the conflict is real and surfaces with the dotted path of the subtree.
//!
//! Lists whose elements lack uuid identity are taken wholesale from the
//! authoritative side; uuid-keyed lists merge element-wise. A subtree the
//! caller read from the store (it carries a snapshot) that the stored side
//! no longer has was deleted concurrently; deletion wins over edits.
//!
//! The merge returns a new owned tree; neither input is mutated, and no
//! state outlives one call.

use indexmap::IndexMap;

use crate::error::{Error, Result};
use crate::node::{Node, HASH_KEY};
use crate::path::{Path, PathSegment};
use crate::tree::{zip_by_uuid, zip_objects, Side};

use super::hash::{self, OLD_HASH_KEY};

/// Keys only one side has that must survive a merge decided for the other
/// side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Additions {
    None,
    OldOnly,
    NewOnly,
}

/// Merge `new` (being persisted) onto `old` (currently stored).
///
/// `base` is the path of the merged subtree inside the whole configuration
/// tree; conflict errors carry `base` extended down to the conflicting
/// olock root.
pub fn merge_trees(old: &Node, new: &Node, base: &Path) -> Result<Node> {
    let mut trail = base.clone();
    merge_value(old, new, Side::New, &mut trail)
}

fn merge_value(old: &Node, new: &Node, inherited: Side, trail: &mut Path) -> Result<Node> {
    match (old, new) {
        (Node::Object(old_map), Node::Object(new_map)) => {
            merge_objects(old_map, new_map, inherited, trail)
        }
        (Node::List(old_items), Node::List(new_items)) => {
            merge_lists(old_items, new_items, inherited, trail)
        }
        _ => Ok(match inherited {
            Side::Old => old.clone(),
            Side::New => new.clone(),
        }),
    }
}

fn merge_objects(
    old_map: &IndexMap<String, Node>,
    new_map: &IndexMap<String, Node>,
    inherited: Side,
    trail: &mut Path,
) -> Result<Node> {
    let (mode, additions) = decide(old_map, new_map, inherited, trail)?;

    let mut merged = IndexMap::new();
    for (key, old_value, new_value) in zip_objects(old_map, new_map, mode) {
        if key == HASH_KEY || key == OLD_HASH_KEY {
            continue;
        }
        let value = match (old_value, new_value) {
            (Some(old_value), Some(new_value)) => {
                trail.push(PathSegment::Key(key.to_string()));
                let value = merge_value(old_value, new_value, mode, trail)?;
                trail.pop();
                value
            }
            (None, Some(new_value)) => {
                if read_from_store(new_value) {
                    // The stored side deleted a subtree the caller had read;
                    // deletion wins over the caller's copy.
                    continue;
                }
                if mode == Side::New || additions == Additions::NewOnly {
                    new_value.clone()
                } else {
                    continue;
                }
            }
            (Some(old_value), None) => {
                if mode == Side::Old || additions == Additions::OldOnly {
                    old_value.clone()
                } else {
                    continue;
                }
            }
            (None, None) => unreachable!("zip yields keys present on a side"),
        };
        merged.insert(key.to_string(), value);
    }
    Ok(Node::Object(merged))
}

fn merge_lists(
    old_items: &[Node],
    new_items: &[Node],
    inherited: Side,
    trail: &mut Path,
) -> Result<Node> {
    match zip_by_uuid(old_items, new_items, inherited) {
        Some(pairs) => {
            let mut merged = Vec::with_capacity(pairs.len());
            for (index, (old_item, new_item)) in pairs.into_iter().enumerate() {
                let value = match (old_item, new_item) {
                    (Some(old_item), Some(new_item)) => {
                        trail.push(PathSegment::Index(index));
                        let value = merge_value(old_item, new_item, inherited, trail)?;
                        trail.pop();
                        value
                    }
                    (None, Some(new_item)) => {
                        if read_from_store(new_item) || inherited == Side::Old {
                            continue;
                        }
                        new_item.clone()
                    }
                    (Some(old_item), None) => {
                        if inherited == Side::New {
                            continue;
                        }
                        old_item.clone()
                    }
                    (None, None) => unreachable!("zip yields elements present on a side"),
                };
                merged.push(value);
            }
            Ok(Node::List(merged))
        }
        // Without element identity there is nothing to align: the
        // authoritative side's list is taken wholesale.
        None => Ok(match inherited {
            Side::Old => Node::List(old_items.to_vec()),
            Side::New => Node::List(new_items.to_vec()),
        }),
    }
}

/// True for a subtree the caller originally read from the store: its olock
/// marker carries a snapshot.
fn read_from_store(node: &Node) -> bool {
    node.get(OLD_HASH_KEY).is_some()
}

fn hash_value<'a>(map: &'a IndexMap<String, Node>, key: &str) -> Option<&'a str> {
    map.get(key).and_then(Node::as_str)
}

/// Re-evaluate the three-way comparison at an olock root; elsewhere the
/// inherited mode flows through.
fn decide(
    old_map: &IndexMap<String, Node>,
    new_map: &IndexMap<String, Node>,
    inherited: Side,
    trail: &Path,
) -> Result<(Side, Additions)> {
    let marked = old_map.contains_key(HASH_KEY)
        || new_map.contains_key(HASH_KEY)
        || new_map.contains_key(OLD_HASH_KEY);
    if !marked {
        return Ok((inherited, Additions::None));
    }

    // Without a snapshot the caller never read this root; there is nothing
    // to compare against.
    let snapshot = match hash_value(new_map, OLD_HASH_KEY) {
        Some(snapshot) => snapshot,
        None => return Ok((inherited, Additions::None)),
    };
    let current = hash_value(new_map, HASH_KEY);
    let stored = hash_value(old_map, HASH_KEY);

    if current == Some(snapshot) {
        return Ok((Side::Old, Additions::None));
    }
    if stored == Some(snapshot) {
        return Ok((Side::New, Additions::None));
    }

    if let (Some(snapshot), Some(current), Some(stored)) = (
        hash::parse_digest(snapshot),
        current.and_then(hash::parse_digest),
        stored.and_then(hash::parse_digest),
    ) {
        if let Some(additions) = attribute_additions(current, snapshot, new_map, old_map) {
            if additions {
                return Ok((Side::Old, Additions::NewOnly));
            }
        }
        if let Some(additions) = attribute_additions(stored, snapshot, old_map, new_map) {
            if additions {
                return Ok((Side::New, Additions::OldOnly));
            }
        }
    }

    Err(Error::OptimisticLock {
        path: trail.to_string(),
    })
}

/// Test whether `side_digest` differs from `snapshot` exactly by the keys
/// `side_map` has and `other_map` lacks. Returns `Some(true)` when the
/// subtraction lands on the snapshot, `Some(false)` when there were no such
/// keys to attribute.
fn attribute_additions(
    side_digest: hash::NodeDigest,
    snapshot: hash::NodeDigest,
    side_map: &IndexMap<String, Node>,
    other_map: &IndexMap<String, Node>,
) -> Option<bool> {
    let mut reduced = side_digest;
    let mut any = false;
    for (key, value) in side_map {
        if key == HASH_KEY || key == OLD_HASH_KEY || other_map.contains_key(key) {
            continue;
        }
        if read_from_store(value) {
            // Not an addition: the other side deleted a subtree this side
            // had read. Its envelope cancels out of both digests.
            continue;
        }
        any = true;
        hash::subtract(&mut reduced, &hash::keyed_digest(key, &hash::subtree_digest(value)));
    }
    if !any {
        return Some(false);
    }
    if reduced == snapshot {
        Some(true)
    } else {
        None
    }
}
