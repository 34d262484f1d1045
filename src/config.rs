//! # The Configuration Contract
//!
//! This module defines the [`Configuration`] trait: the CRUD + search +
//! batch + lock contract every physical backend and every decorator
//! implements. Decorators hold an owned `Box<dyn Configuration>` and forward
//! every operation they do not override; composition replaces the
//! delegating-base-class pattern.
//!
//! ## Key Components
//!
//! - **`Configuration`**: the store's operation contract. All operations
//!   are synchronous and may block on backend I/O or on
//!   [`Configuration::lock`].
//! - **`ConfigLock`**: an RAII guard for the backend's pessimistic lock,
//!   released on drop. Used as an escape hatch when optimistic merging is
//!   insufficient.
//! - **`SearchResults`**: a finite, forward-only iterator of matching nodes.
//!   It is not restartable; implementations are free to materialize eagerly.
//!
//! Every reader that returns a tree to a caller returns an independent deep
//! clone unless its documentation explicitly says otherwise; this is the
//! primary isolation mechanism between concurrent callers.

use std::fmt;

use crate::error::Result;
use crate::node::Node;
use crate::path::Path;
use crate::schema::Schema;

/// RAII guard for a backend's pessimistic lock.
///
/// The lock is released when the guard is dropped; [`ConfigLock::release`]
/// releases it early. Backends that need no locking hand out a no-op guard.
pub struct ConfigLock {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl ConfigLock {
    /// A guard that releases nothing (single-process backends)
    pub fn noop() -> Self {
        ConfigLock { release: None }
    }

    /// A guard running `release` when dropped
    pub fn on_release(release: impl FnOnce() + Send + 'static) -> Self {
        ConfigLock {
            release: Some(Box::new(release)),
        }
    }

    /// Release the lock before the guard goes out of scope.
    ///
    /// Further calls are no-ops.
    pub fn release(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for ConfigLock {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for ConfigLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigLock")
            .field("held", &self.release.is_some())
            .finish()
    }
}

/// A finite, forward-only sequence of search results.
///
/// Every yielded node is an independent deep clone; mutating one cannot
/// affect the backend or other results.
#[derive(Debug)]
pub struct SearchResults {
    nodes: std::vec::IntoIter<Node>,
}

impl SearchResults {
    /// Wrap materialized results
    pub fn new(nodes: Vec<Node>) -> Self {
        SearchResults {
            nodes: nodes.into_iter(),
        }
    }

    /// An empty result sequence
    pub fn empty() -> Self {
        SearchResults::new(Vec::new())
    }
}

impl Iterator for SearchResults {
    type Item = Node;

    fn next(&mut self) -> Option<Node> {
        self.nodes.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.nodes.size_hint()
    }
}

impl From<Vec<Node>> for SearchResults {
    fn from(nodes: Vec<Node>) -> Self {
        SearchResults::new(nodes)
    }
}

/// The contract every backend and decorator implements.
///
/// Operations fail with the crate [`Error`](crate::error::Error) type;
/// backend I/O failures are wrapped, never swallowed.
pub trait Configuration: Send + Sync {
    /// The full configuration tree.
    ///
    /// Implementations may legally serve a cached instance, but must
    /// document whether the returned tree is live or cloned; every
    /// implementation in this crate returns a deep clone.
    fn configuration_root(&self) -> Result<Node>;

    /// Resolve a path to a node, or `None` if absent.
    ///
    /// When `schema` is provided, schema-aware decorators post-process the
    /// returned subtree (the olock decorator marks hash roots and computes
    /// their hashes). With `schema` absent the semantics are identical,
    /// minus the post-processing.
    fn configuration_node(&self, path: &Path, schema: Option<&Schema>) -> Result<Option<Node>>;

    /// True if a node exists at `path`
    fn node_exists(&self, path: &Path) -> Result<bool> {
        Ok(self.configuration_node(path, None)?.is_some())
    }

    /// Fully replace the subtree at `path` with `node`.
    ///
    /// Any child present in the old subtree but absent from `node` is
    /// deleted. The path's parent chain must already exist.
    fn persist_node(&self, path: &Path, node: Node, schema: Option<&Schema>) -> Result<()>;

    /// Invalidate any cached state for `path`.
    ///
    /// Implementations may reload eagerly or lazily; callers must not assume
    /// either.
    fn refresh_node(&self, path: &Path) -> Result<()>;

    /// Delete the subtree at `path` and everything under it, permanently
    fn remove_node(&self, path: &Path) -> Result<()>;

    /// Evaluate a lite-XPath pattern, yielding matching nodes
    fn search(&self, pattern: &str) -> Result<SearchResults>;

    /// Acquire the backend's pessimistic lock.
    ///
    /// Process-wide, or cluster-wide in distributed backends; re-entrant
    /// within one logical transaction. Released when the returned guard
    /// drops.
    fn lock(&self) -> Result<ConfigLock>;

    /// Execute `batch` so that the persist/remove calls it makes apply
    /// atomically relative to the backend's transaction boundary.
    fn run_batch(&self, batch: &mut dyn FnMut() -> Result<()>) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_config_lock_releases_on_drop() {
        let released = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&released);
        {
            let _guard = ConfigLock::on_release(move || flag.store(true, Ordering::SeqCst));
            assert!(!released.load(Ordering::SeqCst));
        }
        assert!(released.load(Ordering::SeqCst));
    }

    #[test]
    fn test_config_lock_explicit_release_is_idempotent() {
        let released = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&released);
        let mut guard = ConfigLock::on_release(move || flag.store(true, Ordering::SeqCst));
        guard.release();
        assert!(released.load(Ordering::SeqCst));
        guard.release(); // second release is a no-op
    }

    #[test]
    fn test_noop_lock() {
        let guard = ConfigLock::noop();
        assert_eq!(format!("{:?}", guard), "ConfigLock { held: false }");
    }

    #[test]
    fn test_search_results_forward_only() {
        let mut results = SearchResults::new(vec![Node::from(1i64), Node::from(2i64)]);
        assert_eq!(results.next(), Some(Node::from(1i64)));
        assert_eq!(results.next(), Some(Node::from(2i64)));
        assert_eq!(results.next(), None);
        assert_eq!(SearchResults::empty().count(), 0);
    }
}
