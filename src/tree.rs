//! Tree utilities: path resolution, traversal, and dual-tree zips
//!
//! This module provides the operations every higher component is built on:
//!
//! - Path-addressed access: [`node_at`], [`node_exists`], [`replace_node`],
//!   [`remove_node`], with by-uuid reference segments resolved by tree scan.
//! - The single-tree visitor [`walk`], with before/after hooks for objects,
//!   keys, lists, list items, and a primitive hook. Traversal order over
//!   object keys is insertion order, so repeated traversals over an
//!   unmodified tree observe identical sequences.
//! - The dual-tree lock-step primitives [`zip_objects`] and [`zip_by_uuid`]
//!   that the merge engine is built on. Traversal state is explicit in the
//!   returned pairings; nothing is carried on visitor instance fields.

use indexmap::IndexMap;

use crate::error::{Error, Result};
use crate::node::Node;
use crate::path::{Path, PathSegment};

/// Which input tree a dual-tree operation treats as authoritative
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// The currently-stored tree
    Old,
    /// The tree being persisted
    New,
}

/// Resolve a path to a node, if present.
///
/// Reference segments are resolved by scanning the current subtree for the
/// node declaring the uuid; an unresolved reference yields `Ok(None)`.
///
/// # Errors
///
/// Returns [`Error::Storage`] when the path descends into a node of the
/// wrong kind (e.g. a key segment applied to a primitive).
pub fn node_at<'a>(root: &'a Node, path: &Path) -> Result<Option<&'a Node>> {
    let mut current = root;
    for segment in path.segments() {
        match segment {
            PathSegment::Key(key) => match current {
                Node::Object(map) => match map.get(key) {
                    Some(child) => current = child,
                    None => return Ok(None),
                },
                Node::Null => return Ok(None),
                _ => {
                    return Err(Error::Storage {
                        message: format!("expected object while navigating to '{}'", key),
                    })
                }
            },
            PathSegment::Index(index) => match current {
                Node::List(items) => match items.get(*index) {
                    Some(child) => current = child,
                    None => return Ok(None),
                },
                Node::Null => return Ok(None),
                _ => {
                    return Err(Error::Storage {
                        message: format!("expected list while navigating to index {}", index),
                    })
                }
            },
            PathSegment::Reference(uuid) => match find_by_uuid(current, uuid) {
                Some((_, node)) => current = node,
                None => return Ok(None),
            },
        }
    }
    Ok(Some(current))
}

/// True if the path resolves to a node
pub fn node_exists(root: &Node, path: &Path) -> Result<bool> {
    Ok(node_at(root, path)?.is_some())
}

/// Rewrite a path with every reference segment replaced by the concrete
/// segments of the node declaring the uuid.
///
/// # Errors
///
/// Returns [`Error::UnresolvedReference`] when a reference segment does not
/// resolve.
pub fn resolve_references(root: &Node, path: &Path) -> Result<Path> {
    if !path.has_reference() {
        return Ok(path.clone());
    }
    let mut resolved = Path::root();
    let mut current = root;
    for segment in path.segments() {
        match segment {
            PathSegment::Reference(uuid) => match find_by_uuid(current, uuid) {
                Some((relative, node)) => {
                    resolved = resolved.join(&relative);
                    current = node;
                }
                None => {
                    return Err(Error::UnresolvedReference {
                        uuid: uuid.clone(),
                    })
                }
            },
            other => {
                resolved.push(other.clone());
                current = match node_at(current, &Path::from(vec![other.clone()]))? {
                    Some(node) => node,
                    None => {
                        return Err(Error::NoSuchParent {
                            path: path.to_string(),
                        })
                    }
                };
            }
        }
    }
    Ok(resolved)
}

fn navigate_parent_mut<'a>(root: &'a mut Node, path: &Path) -> Result<Option<&'a mut Node>> {
    let parent_len = path.len() - 1;
    let mut current = root;
    for segment in &path.segments()[..parent_len] {
        match segment {
            PathSegment::Key(key) => match current {
                Node::Object(map) => match map.get_mut(key) {
                    Some(child) => current = child,
                    None => return Ok(None),
                },
                _ => {
                    return Err(Error::Storage {
                        message: format!("expected object while navigating to '{}'", key),
                    })
                }
            },
            PathSegment::Index(index) => match current {
                Node::List(items) => match items.get_mut(*index) {
                    Some(child) => current = child,
                    None => return Ok(None),
                },
                _ => {
                    return Err(Error::Storage {
                        message: format!("expected list while navigating to index {}", index),
                    })
                }
            },
            PathSegment::Reference(_) => {
                return Err(Error::Storage {
                    message: "reference segments must be resolved before mutation".to_string(),
                })
            }
        }
    }
    Ok(Some(current))
}

/// Fully replace the subtree at `path` with `node`.
///
/// The parent chain must already exist; the final segment may name a key not
/// yet present (it is created) or the index one past the end of a list (the
/// node is appended).
///
/// # Errors
///
/// - [`Error::NoSuchParent`] when the parent chain is incomplete.
/// - [`Error::Storage`] on kind mismatches along the path.
pub fn replace_node(root: &mut Node, path: &Path, node: Node) -> Result<()> {
    if path.is_root() {
        *root = node;
        return Ok(());
    }
    let path = resolve_references(root, path)?;

    let missing_parent = || Error::NoSuchParent {
        path: path.to_string(),
    };
    let parent = navigate_parent_mut(root, &path)?.ok_or_else(missing_parent)?;
    match path.last().expect("non-root path") {
        PathSegment::Key(key) => match parent {
            Node::Object(map) => {
                map.insert(key.clone(), node);
                Ok(())
            }
            _ => Err(missing_parent()),
        },
        PathSegment::Index(index) => match parent {
            Node::List(items) if *index < items.len() => {
                items[*index] = node;
                Ok(())
            }
            Node::List(items) if *index == items.len() => {
                items.push(node);
                Ok(())
            }
            _ => Err(missing_parent()),
        },
        PathSegment::Reference(_) => unreachable!("references resolved above"),
    }
}

/// Delete the subtree at `path`, returning it if it existed.
///
/// Removing the root replaces the tree with an empty object.
pub fn remove_node(root: &mut Node, path: &Path) -> Result<Option<Node>> {
    if path.is_root() {
        return Ok(Some(std::mem::replace(root, Node::object())));
    }
    let path = match resolve_references(root, path) {
        Ok(path) => path,
        Err(Error::UnresolvedReference { .. }) | Err(Error::NoSuchParent { .. }) => {
            return Ok(None)
        }
        Err(other) => return Err(other),
    };

    let parent = match navigate_parent_mut(root, &path)? {
        Some(parent) => parent,
        None => return Ok(None),
    };
    match path.last().expect("non-root path") {
        PathSegment::Key(key) => match parent {
            Node::Object(map) => Ok(map.shift_remove(key)),
            _ => Ok(None),
        },
        PathSegment::Index(index) => match parent {
            Node::List(items) if *index < items.len() => Ok(Some(items.remove(*index))),
            _ => Ok(None),
        },
        PathSegment::Reference(_) => unreachable!("references resolved above"),
    }
}

/// Depth-first scan for the object declaring `uuid`; returns its path
/// relative to `node` together with the node itself.
pub fn find_by_uuid<'a>(node: &'a Node, uuid: &str) -> Option<(Path, &'a Node)> {
    fn scan<'a>(node: &'a Node, uuid: &str, trail: &mut Path) -> Option<(Path, &'a Node)> {
        match node {
            Node::Object(map) => {
                if node.declared_uuid() == Some(uuid) {
                    return Some((trail.clone(), node));
                }
                for (key, value) in map {
                    trail.push(PathSegment::Key(key.clone()));
                    if let Some(found) = scan(value, uuid, trail) {
                        return Some(found);
                    }
                    trail.pop();
                }
                None
            }
            Node::List(items) => {
                for (index, item) in items.iter().enumerate() {
                    trail.push(PathSegment::Index(index));
                    if let Some(found) = scan(item, uuid, trail) {
                        return Some(found);
                    }
                    trail.pop();
                }
                None
            }
            _ => None,
        }
    }
    scan(node, uuid, &mut Path::root())
}

/// Hooks invoked by [`walk`]. All hooks default to no-ops so implementors
/// only override what they observe.
pub trait NodeVisitor {
    fn enter_object(&mut self, _map: &IndexMap<String, Node>) {}
    fn leave_object(&mut self, _map: &IndexMap<String, Node>) {}
    fn enter_key(&mut self, _key: &str, _value: &Node) {}
    fn leave_key(&mut self, _key: &str, _value: &Node) {}
    fn enter_list(&mut self, _items: &[Node]) {}
    fn leave_list(&mut self, _items: &[Node]) {}
    fn enter_item(&mut self, _index: usize, _item: &Node) {}
    fn leave_item(&mut self, _index: usize, _item: &Node) {}
    fn visit_primitive(&mut self, _node: &Node) {}
}

/// Visit every node depth-first, invoking the matching hooks. Object keys
/// are visited in insertion order.
pub fn walk(node: &Node, visitor: &mut dyn NodeVisitor) {
    match node {
        Node::Object(map) => {
            visitor.enter_object(map);
            for (key, value) in map {
                visitor.enter_key(key, value);
                walk(value, visitor);
                visitor.leave_key(key, value);
            }
            visitor.leave_object(map);
        }
        Node::List(items) => {
            visitor.enter_list(items);
            for (index, item) in items.iter().enumerate() {
                visitor.enter_item(index, item);
                walk(item, visitor);
                visitor.leave_item(index, item);
            }
            visitor.leave_list(items);
        }
        _ => visitor.visit_primitive(node),
    }
}

/// Apply `f` to every object map in the tree, top-down
pub fn walk_objects_mut(node: &mut Node, f: &mut dyn FnMut(&mut IndexMap<String, Node>)) {
    match node {
        Node::Object(map) => {
            f(map);
            for (_, value) in map.iter_mut() {
                walk_objects_mut(value, f);
            }
        }
        Node::List(items) => {
            for item in items.iter_mut() {
                walk_objects_mut(item, f);
            }
        }
        _ => {}
    }
}

/// Collect every `(uuid, path)` pair declared in the tree, paths prefixed
/// with `base`.
pub fn collect_uuids(node: &Node, base: &Path) -> Vec<(String, Path)> {
    struct UuidCollector {
        trail: Path,
        found: Vec<(String, Path)>,
    }

    impl NodeVisitor for UuidCollector {
        fn enter_object(&mut self, map: &IndexMap<String, Node>) {
            if let Some(Node::String(uuid)) = map.get(crate::node::UUID_KEY) {
                self.found.push((uuid.clone(), self.trail.clone()));
            }
        }

        fn enter_key(&mut self, key: &str, _value: &Node) {
            self.trail.push(PathSegment::Key(key.to_string()));
        }

        fn leave_key(&mut self, _key: &str, _value: &Node) {
            self.trail.pop();
        }

        fn enter_item(&mut self, index: usize, _item: &Node) {
            self.trail.push(PathSegment::Index(index));
        }

        fn leave_item(&mut self, _index: usize, _item: &Node) {
            self.trail.pop();
        }
    }

    let mut collector = UuidCollector {
        trail: base.clone(),
        found: Vec::new(),
    };
    walk(node, &mut collector);
    collector.found
}

/// Walk two object maps in lock-step, yielding the union of their keys as
/// `(key, old value, new value)` triples. The authoritative side's keys come
/// first in its insertion order, followed by keys only the other side has.
pub fn zip_objects<'a>(
    old: &'a IndexMap<String, Node>,
    new: &'a IndexMap<String, Node>,
    authoritative: Side,
) -> Vec<(&'a str, Option<&'a Node>, Option<&'a Node>)> {
    let (lead, trail) = match authoritative {
        Side::Old => (old, new),
        Side::New => (new, old),
    };
    let mut pairs = Vec::with_capacity(lead.len() + trail.len());
    for key in lead.keys() {
        pairs.push((key.as_str(), old.get(key), new.get(key)));
    }
    for key in trail.keys() {
        if !lead.contains_key(key) {
            pairs.push((key.as_str(), old.get(key), new.get(key)));
        }
    }
    pairs
}

/// Walk two lists in lock-step, aligning elements by their `_.uuid`
/// identity. Returns `None` when either list contains an element without a
/// uuid, in which case no element-level alignment is possible and the caller
/// falls back to wholesale replacement.
///
/// Pairs are yielded as `(old element, new element)` in the authoritative
/// side's order, followed by elements only the other side has.
pub fn zip_by_uuid<'a>(
    old: &'a [Node],
    new: &'a [Node],
    authoritative: Side,
) -> Option<Vec<(Option<&'a Node>, Option<&'a Node>)>> {
    fn identity_map(items: &[Node]) -> Option<IndexMap<&str, &Node>> {
        let mut map = IndexMap::with_capacity(items.len());
        for item in items {
            map.insert(item.declared_uuid()?, item);
        }
        Some(map)
    }

    let old_by_uuid = identity_map(old)?;
    let new_by_uuid = identity_map(new)?;
    let (lead, trail) = match authoritative {
        Side::Old => (&old_by_uuid, &new_by_uuid),
        Side::New => (&new_by_uuid, &old_by_uuid),
    };

    let mut pairs = Vec::with_capacity(lead.len() + trail.len());
    for uuid in lead.keys() {
        pairs.push((
            old_by_uuid.get(uuid).copied(),
            new_by_uuid.get(uuid).copied(),
        ));
    }
    for uuid in trail.keys() {
        if !lead.contains_key(uuid) {
            pairs.push((
                old_by_uuid.get(uuid).copied(),
                new_by_uuid.get(uuid).copied(),
            ));
        }
    }
    Some(pairs)
}
