//! Uuid reference index decorator

use std::collections::HashMap;
use std::sync::Mutex;

use log::debug;

use crate::config::{ConfigLock, Configuration, SearchResults};
use crate::error::{Error, Result};
use crate::node::Node;
use crate::path::{Path, PathSegment};
use crate::query;
use crate::schema::Schema;
use crate::tree;

/// Decorator maintaining the uuid-to-path reference index.
///
/// On every persist/refresh/remove the index entries for uuids present in
/// the old subtree are removed, and (for persist/refresh) entries for uuids
/// present in the new subtree are re-added. `configuration_node` and
/// `node_exists` recognize the `//*[_.uuid='{uuid}']` path form and resolve
/// it via direct index lookup instead of a tree scan; so does `search` for
/// the bare reference pattern.
///
/// A persist that would bind a uuid already bound outside the replaced
/// subtree fails with [`Error::DuplicateUuid`] before anything is written.
///
/// The index lifetime is tied to this decorator instance; it is rebuilt from
/// the backend at construction and kept consistent by the overridden write
/// operations. Writes bypassing this decorator make it stale; compose it
/// so that all writers go through it.
pub struct IndexingConfiguration {
    inner: Box<dyn Configuration>,
    index: Mutex<HashMap<String, Path>>,
}

impl IndexingConfiguration {
    /// Wrap `inner`, building the index from its current root.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateUuid`] if the stored tree already binds the
    /// same uuid twice.
    pub fn new(inner: Box<dyn Configuration>) -> Result<Self> {
        let root = inner.configuration_root()?;
        let mut index = HashMap::new();
        for (uuid, path) in tree::collect_uuids(&root, &Path::root()) {
            if let Some(existing) = index.insert(uuid.clone(), path.clone()) {
                return Err(Error::DuplicateUuid {
                    uuid,
                    existing: existing.to_string(),
                    incoming: path.to_string(),
                });
            }
        }
        debug!("built uuid index with {} entries", index.len());
        Ok(IndexingConfiguration {
            inner,
            index: Mutex::new(index),
        })
    }

    fn locked(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Path>>> {
        self.index.lock().map_err(|_| Error::LockPoisoned {
            context: "uuid reference index".to_string(),
        })
    }

    /// Rewrite a leading reference segment through the index; `Ok(None)`
    /// when the uuid is not bound.
    fn resolve(&self, path: &Path) -> Result<Option<Path>> {
        if !path.has_reference() {
            return Ok(Some(path.clone()));
        }
        let segments = path.segments();
        let (first, rest) = segments.split_first().expect("reference implies segments");
        let uuid = match first {
            PathSegment::Reference(uuid) => uuid,
            // References deeper in the path fall through to the backend's
            // tree scan.
            _ => return Ok(Some(path.clone())),
        };
        let index = self.locked()?;
        match index.get(uuid) {
            Some(bound) => {
                let mut resolved = bound.clone();
                for segment in rest {
                    resolved.push(segment.clone());
                }
                Ok(Some(resolved))
            }
            None => Ok(None),
        }
    }

    fn drop_entries_under(&self, path: &Path) -> Result<()> {
        let mut index = self.locked()?;
        index.retain(|_, bound| !bound.starts_with(path));
        Ok(())
    }

    fn insert_entries(&self, entries: Vec<(String, Path)>) -> Result<()> {
        let mut index = self.locked()?;
        for (uuid, path) in entries {
            index.insert(uuid, path);
        }
        Ok(())
    }

    /// Reject `entries` that collide with bindings outside `target`, or with
    /// each other.
    fn check_duplicates(&self, target: &Path, entries: &[(String, Path)]) -> Result<()> {
        let mut seen: HashMap<&str, &Path> = HashMap::new();
        for (uuid, path) in entries {
            if let Some(previous) = seen.insert(uuid.as_str(), path) {
                return Err(Error::DuplicateUuid {
                    uuid: uuid.clone(),
                    existing: previous.to_string(),
                    incoming: path.to_string(),
                });
            }
        }
        let index = self.locked()?;
        for (uuid, path) in entries {
            if let Some(existing) = index.get(uuid) {
                if !existing.starts_with(target) {
                    return Err(Error::DuplicateUuid {
                        uuid: uuid.clone(),
                        existing: existing.to_string(),
                        incoming: path.to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

impl Configuration for IndexingConfiguration {
    fn configuration_root(&self) -> Result<Node> {
        self.inner.configuration_root()
    }

    fn configuration_node(&self, path: &Path, schema: Option<&Schema>) -> Result<Option<Node>> {
        match self.resolve(path)? {
            Some(resolved) => self.inner.configuration_node(&resolved, schema),
            None => Ok(None),
        }
    }

    fn node_exists(&self, path: &Path) -> Result<bool> {
        match self.resolve(path)? {
            Some(resolved) => self.inner.node_exists(&resolved),
            None => Ok(false),
        }
    }

    fn persist_node(&self, path: &Path, node: Node, schema: Option<&Schema>) -> Result<()> {
        let target = self.resolve(path)?.ok_or_else(|| {
            let uuid = match path.segments().first() {
                Some(PathSegment::Reference(uuid)) => uuid.clone(),
                _ => String::new(),
            };
            Error::UnresolvedReference { uuid }
        })?;

        let entries = tree::collect_uuids(&node, &target);
        self.check_duplicates(&target, &entries)?;

        self.inner.persist_node(&target, node, schema)?;
        self.drop_entries_under(&target)?;
        self.insert_entries(entries)
    }

    fn refresh_node(&self, path: &Path) -> Result<()> {
        let target = match self.resolve(path)? {
            Some(resolved) => resolved,
            None => return Ok(()),
        };
        self.inner.refresh_node(&target)?;
        self.drop_entries_under(&target)?;
        if let Some(fresh) = self.inner.configuration_node(&target, None)? {
            self.insert_entries(tree::collect_uuids(&fresh, &target))?;
        }
        Ok(())
    }

    fn remove_node(&self, path: &Path) -> Result<()> {
        let target = match self.resolve(path)? {
            Some(resolved) => resolved,
            None => return Ok(()),
        };
        self.inner.remove_node(&target)?;
        self.drop_entries_under(&target)
    }

    fn search(&self, pattern: &str) -> Result<SearchResults> {
        if let Some(uuid) = query::uuid_reference(pattern) {
            let path = {
                let index = self.locked()?;
                index.get(&uuid).cloned()
            };
            return match path {
                Some(path) => {
                    let found = self.inner.configuration_node(&path, None)?;
                    Ok(SearchResults::new(found.into_iter().collect()))
                }
                None => Ok(SearchResults::empty()),
            };
        }
        self.inner.search(pattern)
    }

    fn lock(&self) -> Result<ConfigLock> {
        self.inner.lock()
    }

    fn run_batch(&self, batch: &mut dyn FnMut() -> Result<()>) -> Result<()> {
        self.inner.run_batch(batch)
    }
}
