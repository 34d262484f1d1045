//! In-memory configuration backend

use std::sync::Mutex;

use crate::config::{ConfigLock, Configuration, SearchResults};
use crate::error::{Error, Result};
use crate::node::Node;
use crate::path::Path;
use crate::query::{self, PathPattern};
use crate::schema::Schema;
use crate::tree;

/// Backend holding the root tree in process memory.
///
/// Every read returns an independent deep clone, and every search result is
/// cloned before it is yielded, so callers can never mutate internal state.
/// `lock()` is a no-op in this single-process implementation; serializing
/// truly overlapping writers is the caller's concurrency discipline.
pub struct MemoryConfiguration {
    root: Mutex<Node>,
}

impl MemoryConfiguration {
    /// Create a backend with an empty root object
    pub fn new() -> Self {
        MemoryConfiguration {
            root: Mutex::new(Node::object()),
        }
    }

    /// Create a backend from an existing root tree.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if `root` is not an object node.
    pub fn with_root(root: Node) -> Result<Self> {
        if !root.is_object() {
            return Err(Error::Storage {
                message: "configuration root must be an object".to_string(),
            });
        }
        Ok(MemoryConfiguration {
            root: Mutex::new(root),
        })
    }

    fn locked(&self) -> Result<std::sync::MutexGuard<'_, Node>> {
        self.root.lock().map_err(|_| Error::LockPoisoned {
            context: "in-memory configuration root".to_string(),
        })
    }
}

impl Default for MemoryConfiguration {
    fn default() -> Self {
        MemoryConfiguration::new()
    }
}

impl Configuration for MemoryConfiguration {
    fn configuration_root(&self) -> Result<Node> {
        Ok(self.locked()?.clone())
    }

    fn configuration_node(&self, path: &Path, _schema: Option<&Schema>) -> Result<Option<Node>> {
        let root = self.locked()?;
        Ok(tree::node_at(&root, path)?.cloned())
    }

    fn node_exists(&self, path: &Path) -> Result<bool> {
        let root = self.locked()?;
        tree::node_exists(&root, path)
    }

    fn persist_node(&self, path: &Path, node: Node, _schema: Option<&Schema>) -> Result<()> {
        if path.is_root() && !node.is_object() {
            return Err(Error::Storage {
                message: "configuration root must be an object".to_string(),
            });
        }
        let mut root = self.locked()?;
        tree::replace_node(&mut root, path, node)
    }

    fn refresh_node(&self, _path: &Path) -> Result<()> {
        // Nothing is cached; reads always observe the live tree.
        Ok(())
    }

    fn remove_node(&self, path: &Path) -> Result<()> {
        let mut root = self.locked()?;
        tree::remove_node(&mut root, path)?;
        Ok(())
    }

    fn search(&self, pattern: &str) -> Result<SearchResults> {
        let root = self.locked()?;
        if let Some(uuid) = query::uuid_reference(pattern) {
            let found = tree::find_by_uuid(&root, &uuid)
                .map(|(_, node)| node.clone())
                .into_iter()
                .collect();
            return Ok(SearchResults::new(found));
        }
        let parsed = PathPattern::parse(pattern)?;
        Ok(SearchResults::new(query::search(&root, &parsed)))
    }

    fn lock(&self) -> Result<ConfigLock> {
        Ok(ConfigLock::noop())
    }

    fn run_batch(&self, batch: &mut dyn FnMut() -> Result<()>) -> Result<()> {
        batch()
    }
}
