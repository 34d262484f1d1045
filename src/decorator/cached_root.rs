//! Root-retaining read cache decorator

use std::sync::Mutex;

use log::debug;

use crate::config::{ConfigLock, Configuration, SearchResults};
use crate::error::{Error, Result};
use crate::node::Node;
use crate::path::Path;
use crate::query::{self, PathPattern};
use crate::schema::Schema;
use crate::tree;

/// Decorator that fetches the root tree once and serves every read from the
/// retained copy via path lookup.
///
/// Reads return deep clones of the retained tree, never live references.
/// `persist_node` mutates the retained tree in place (replacing the whole
/// tree on root-path writes) in addition to delegating to the backend;
/// `refresh_node` re-fetches the affected subtree from the backend and
/// splices it in. The retained root is guarded by a mutex; that discipline
/// is part of this type's construction contract.
pub struct CachedRootConfiguration {
    inner: Box<dyn Configuration>,
    root: Mutex<Option<Node>>,
}

impl CachedRootConfiguration {
    /// Wrap `inner`; the root is fetched lazily on the first read
    pub fn new(inner: Box<dyn Configuration>) -> Self {
        CachedRootConfiguration {
            inner,
            root: Mutex::new(None),
        }
    }

    fn locked(&self) -> Result<std::sync::MutexGuard<'_, Option<Node>>> {
        self.root.lock().map_err(|_| Error::LockPoisoned {
            context: "cached configuration root".to_string(),
        })
    }

    fn with_root<T>(&self, f: impl FnOnce(&Node) -> Result<T>) -> Result<T> {
        let mut guard = self.locked()?;
        if guard.is_none() {
            debug!("fetching configuration root into cache");
            *guard = Some(self.inner.configuration_root()?);
        }
        f(guard.as_ref().expect("root loaded above"))
    }

    fn invalidate(&self) {
        if let Ok(mut guard) = self.root.lock() {
            *guard = None;
        }
    }
}

impl Configuration for CachedRootConfiguration {
    fn configuration_root(&self) -> Result<Node> {
        self.with_root(|root| Ok(root.clone()))
    }

    fn configuration_node(&self, path: &Path, _schema: Option<&Schema>) -> Result<Option<Node>> {
        self.with_root(|root| Ok(tree::node_at(root, path)?.cloned()))
    }

    fn node_exists(&self, path: &Path) -> Result<bool> {
        self.with_root(|root| tree::node_exists(root, path))
    }

    fn persist_node(&self, path: &Path, node: Node, schema: Option<&Schema>) -> Result<()> {
        self.inner.persist_node(path, node.clone(), schema)?;
        let mut guard = self.locked()?;
        let splice_failed = match guard.as_mut() {
            Some(root) if path.is_root() => {
                *root = node;
                false
            }
            Some(root) => tree::replace_node(root, path, node).is_err(),
            None => false,
        };
        if splice_failed {
            // The retained tree no longer matches the backend; the write
            // itself succeeded, so re-fetch lazily instead of failing.
            *guard = None;
        }
        Ok(())
    }

    fn refresh_node(&self, path: &Path) -> Result<()> {
        self.inner.refresh_node(path)?;
        let mut guard = self.locked()?;
        if guard.is_some() {
            let fresh = self.inner.configuration_node(path, None)?;
            let root = guard.as_mut().expect("checked above");
            let spliced = match fresh {
                Some(subtree) if path.is_root() => {
                    *root = subtree;
                    Ok(())
                }
                Some(subtree) => tree::replace_node(root, path, subtree),
                None => tree::remove_node(root, path).map(|_| ()),
            };
            if spliced.is_err() {
                *guard = None;
            }
        }
        Ok(())
    }

    fn remove_node(&self, path: &Path) -> Result<()> {
        self.inner.remove_node(path)?;
        let mut guard = self.locked()?;
        let splice_failed = match guard.as_mut() {
            Some(root) => tree::remove_node(root, path).is_err(),
            None => false,
        };
        if splice_failed {
            *guard = None;
        }
        Ok(())
    }

    fn search(&self, pattern: &str) -> Result<SearchResults> {
        self.with_root(|root| {
            if let Some(uuid) = query::uuid_reference(pattern) {
                let found = tree::find_by_uuid(root, &uuid)
                    .map(|(_, node)| node.clone())
                    .into_iter()
                    .collect();
                return Ok(SearchResults::new(found));
            }
            let parsed = PathPattern::parse(pattern)?;
            Ok(SearchResults::new(query::search(root, &parsed)))
        })
    }

    fn lock(&self) -> Result<ConfigLock> {
        self.inner.lock()
    }

    fn run_batch(&self, batch: &mut dyn FnMut() -> Result<()>) -> Result<()> {
        match self.inner.run_batch(batch) {
            Ok(()) => Ok(()),
            Err(err) => {
                // The backend transaction may have partially applied; drop
                // the retained root rather than serving stale state.
                debug!("dropping cached root after failed batch");
                self.invalidate();
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryConfiguration;

    fn wrapped() -> CachedRootConfiguration {
        let backend = MemoryConfiguration::new();
        backend
            .persist_node(
                &Path::root(),
                Node::from_json_str(r#"{"devices":{"a":{"port":1}}}"#).unwrap(),
                None,
            )
            .unwrap();
        CachedRootConfiguration::new(Box::new(backend))
    }

    #[test]
    fn test_reads_come_from_retained_root() {
        let config = wrapped();
        let path = Path::parse("devices.a.port").unwrap();
        assert_eq!(
            config
                .configuration_node(&path, None)
                .unwrap()
                .unwrap()
                .as_i64(),
            Some(1)
        );
        assert!(config.node_exists(&Path::parse("devices.a").unwrap()).unwrap());
    }

    #[test]
    fn test_reads_are_isolated_clones() {
        let config = wrapped();
        let path = Path::parse("devices.a").unwrap();
        let mut first = config.configuration_node(&path, None).unwrap().unwrap();
        first
            .as_object_mut()
            .unwrap()
            .insert("mutated".to_string(), Node::Bool(true));
        let second = config.configuration_node(&path, None).unwrap().unwrap();
        assert!(second.get("mutated").is_none());
    }

    #[test]
    fn test_persist_updates_cache_and_backend() {
        let config = wrapped();
        let path = Path::parse("devices.a").unwrap();
        // Prime the cache.
        config.configuration_root().unwrap();
        config
            .persist_node(&path, Node::from_json_str(r#"{"port":2}"#).unwrap(), None)
            .unwrap();
        assert_eq!(
            config
                .configuration_node(&Path::parse("devices.a.port").unwrap(), None)
                .unwrap()
                .unwrap()
                .as_i64(),
            Some(2)
        );
    }

    #[test]
    fn test_root_persist_replaces_whole_tree() {
        let config = wrapped();
        config.configuration_root().unwrap();
        config
            .persist_node(
                &Path::root(),
                Node::from_json_str(r#"{"fresh":true}"#).unwrap(),
                None,
            )
            .unwrap();
        assert_eq!(
            config.configuration_root().unwrap(),
            Node::from_json_str(r#"{"fresh":true}"#).unwrap()
        );
    }

    #[test]
    fn test_remove_updates_cache() {
        let config = wrapped();
        let path = Path::parse("devices.a").unwrap();
        config.configuration_root().unwrap();
        config.remove_node(&path).unwrap();
        assert!(!config.node_exists(&path).unwrap());
    }

    #[test]
    fn test_search_served_from_cache() {
        let config = wrapped();
        let results: Vec<Node> = config.search("/devices/*[port=1]").unwrap().collect();
        assert_eq!(results.len(), 1);
    }
}
