//! Hash-based optimistic locking
//!
//! The optimistic alternative to [`Configuration::lock`]: independent
//! writers may update overlapping subtrees without a pessimistic lock, and
//! only genuine overlapping conflicts surface, as
//! [`Error::OptimisticLock`](crate::error::Error::OptimisticLock) carrying
//! the dotted path of the conflicting subtree, which callers recover from by
//! re-reading and retrying.
//!
//! The moving parts:
//!
//! - [`hash`]: structural digests, the schema-directed marking pass, the
//!   snapshot pass, and the cleanup pass.
//! - [`merge`]: the dual-tree three-way merge.
//! - [`OlockConfiguration`]: the decorator wiring them into the
//!   [`Configuration`] contract. Reads with a schema hint return subtrees
//!   with hashes marked and computed; persists snapshot the caller's
//!   hashes, recompute both sides, merge (or raise a conflict), strip all
//!   hash bookkeeping, and forward the merged subtree to the inner
//!   configuration. Durable storage never contains hash or snapshot keys.
//!
//! All merge state is local to one persist call; nothing survives it.

pub mod hash;
pub mod merge;

use log::debug;

use crate::config::{ConfigLock, Configuration, SearchResults};
use crate::error::Result;
use crate::node::Node;
use crate::path::Path;
use crate::schema::Schema;

pub use hash::{
    compute_hashes, mark_hash_roots, snapshot_hashes, strip_hash_keys, HASH_PLACEHOLDER,
    OLD_HASH_KEY,
};
pub use merge::merge_trees;

/// Decorator adding hash-based optimistic locking to an inner
/// configuration.
pub struct OlockConfiguration {
    inner: Box<dyn Configuration>,
}

impl OlockConfiguration {
    /// Wrap `inner`
    pub fn new(inner: Box<dyn Configuration>) -> Self {
        OlockConfiguration { inner }
    }
}

impl Configuration for OlockConfiguration {
    fn configuration_root(&self) -> Result<Node> {
        self.inner.configuration_root()
    }

    fn configuration_node(&self, path: &Path, schema: Option<&Schema>) -> Result<Option<Node>> {
        let node = self.inner.configuration_node(path, schema)?;
        match (node, schema) {
            (Some(mut node), Some(schema)) => {
                mark_hash_roots(&mut node, schema);
                compute_hashes(&mut node);
                Ok(Some(node))
            }
            (node, _) => Ok(node),
        }
    }

    fn node_exists(&self, path: &Path) -> Result<bool> {
        self.inner.node_exists(path)
    }

    fn persist_node(&self, path: &Path, mut node: Node, schema: Option<&Schema>) -> Result<()> {
        if let Some(schema) = schema {
            mark_hash_roots(&mut node, schema);
        }
        snapshot_hashes(&mut node);
        compute_hashes(&mut node);

        let mut merged = match self.inner.configuration_node(path, None)? {
            Some(mut stored) => {
                if let Some(schema) = schema {
                    mark_hash_roots(&mut stored, schema);
                }
                compute_hashes(&mut stored);
                merge_trees(&stored, &node, path)?
            }
            None => {
                debug!("no stored subtree at '{}', persisting without merge", path);
                node
            }
        };

        strip_hash_keys(&mut merged);
        self.inner.persist_node(path, merged, schema)
    }

    fn refresh_node(&self, path: &Path) -> Result<()> {
        self.inner.refresh_node(path)
    }

    fn remove_node(&self, path: &Path) -> Result<()> {
        self.inner.remove_node(path)
    }

    fn search(&self, pattern: &str) -> Result<SearchResults> {
        self.inner.search(pattern)
    }

    fn lock(&self) -> Result<ConfigLock> {
        self.inner.lock()
    }

    fn run_batch(&self, batch: &mut dyn FnMut() -> Result<()>) -> Result<()> {
        self.inner.run_batch(batch)
    }
}
