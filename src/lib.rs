//! # Configuration Tree Store
//!
//! This library provides a hierarchical, path-addressed configuration store
//! persisting device and application configuration as schema-light JSON-like
//! trees. It is designed to sit under a larger network stack but can be
//! embedded by any application that needs tree-shaped configuration with
//! optimistic concurrency.
//!
//! ## Quick Example
//!
//! ```
//! use conftree::config::Configuration;
//! use conftree::node::Node;
//! use conftree::path::Path;
//! use conftree::storage::MemoryConfiguration;
//!
//! let config = MemoryConfiguration::new();
//!
//! // Create the tree with a first persist to the root.
//! let root = Node::from_json_str(r#"{"devices":{"scanner":{"port":104}}}"#).unwrap();
//! config.persist_node(&Path::root(), root, None).unwrap();
//!
//! // Address subtrees by path.
//! let port = config
//!     .configuration_node(&Path::parse("devices.scanner.port").unwrap(), None)
//!     .unwrap()
//!     .unwrap();
//! assert_eq!(port.as_i64(), Some(104));
//!
//! // Search with the restricted lite-XPath syntax.
//! let hits: Vec<Node> = config.search("/devices/*[port=104]").unwrap().collect();
//! assert_eq!(hits.len(), 1);
//! ```
//!
//! ## Core Concepts
//!
//! The library is built around a few key concepts:
//!
//! - **Node model (`node`, `path`)**: the recursive tree representation and
//!   the addressing scheme used to locate subtrees, including by-uuid
//!   references.
//! - **Tree utilities (`tree`, `query`)**: path-addressed access, the
//!   traversal primitives every higher component is built on, and the
//!   lite-XPath search engine.
//! - **The contract (`config`)**: the `Configuration` trait (CRUD, search,
//!   pessimistic locking, and batches) implemented by backends and
//!   decorators alike.
//! - **Backends (`storage`)**: the in-memory reference backend and the
//!   single-JSON-document backend.
//! - **Decorators (`decorator`)**: root caching, staleness-aware caching,
//!   and uuid reference indexing, each wrapping an inner configuration by
//!   composition.
//! - **Optimistic locking (`olock`, `schema`)**: structural hashes over
//!   schema-designated subtrees and the dual-tree merge that lets
//!   independent writers update overlapping trees, detecting only genuine
//!   conflicts.
//!
//! ## Write Path
//!
//! A caller invokes `persist_node` on the outermost decorator; each
//! decorator performs its concern and delegates inward. The olock decorator,
//! when present, fetches the stored subtree, computes structural hashes on
//! both sides, merges them (or raises `Error::OptimisticLock`), and forwards
//! the merged subtree to the physical backend. Deep cloning on every
//! externally observable read keeps callers isolated from shared cache
//! state.

pub mod config;
pub mod decorator;
pub mod error;
pub mod node;
pub mod olock;
pub mod path;
pub mod query;
pub mod schema;
pub mod storage;
pub mod tree;

#[cfg(test)]
mod node_proptest;
