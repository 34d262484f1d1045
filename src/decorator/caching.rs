//! Staleness-aware caching decorator

use std::sync::Mutex;
use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::config::{ConfigLock, Configuration, SearchResults};
use crate::error::{Error, Result};
use crate::node::Node;
use crate::path::Path;
use crate::query::{self, PathPattern};
use crate::schema::Schema;
use crate::tree;

struct CacheState {
    root: Option<Node>,
    fetched_at: Option<Instant>,
}

/// Decorator retaining the root tree with an optional staleness window.
///
/// Reads return deep clones of cached subtrees; once the window elapses the
/// next read synchronously re-fetches rather than serving data older than
/// the configured bound. Writes update the cache in place unless the
/// decorator was constructed read-only, in which case they invalidate it so
/// the next read observes the backend's view.
///
/// On any failure inside [`Configuration::run_batch`] the cache is
/// invalidated before the error propagates: the underlying transaction may
/// have partially applied, and serving stale cached data would be unsafe.
///
/// `search` fully materializes and deep-clones its results before returning,
/// guaranteeing isolation from later cache mutation. The cache state is
/// mutex-guarded; that discipline is part of this type's construction
/// contract.
pub struct CachingConfiguration {
    inner: Box<dyn Configuration>,
    state: Mutex<CacheState>,
    staleness: Option<Duration>,
    read_only: bool,
}

impl CachingConfiguration {
    /// Wrap `inner`.
    ///
    /// `staleness` bounds how old the retained root may grow before a read
    /// forces a re-fetch; `None` retains it until explicitly refreshed or
    /// invalidated. `read_only` makes writes invalidate instead of updating
    /// the cache.
    pub fn new(inner: Box<dyn Configuration>, staleness: Option<Duration>, read_only: bool) -> Self {
        CachingConfiguration {
            inner,
            state: Mutex::new(CacheState {
                root: None,
                fetched_at: None,
            }),
            staleness,
            read_only,
        }
    }

    fn locked(&self) -> Result<std::sync::MutexGuard<'_, CacheState>> {
        self.state.lock().map_err(|_| Error::LockPoisoned {
            context: "caching decorator state".to_string(),
        })
    }

    fn is_stale(&self, state: &CacheState) -> bool {
        if state.root.is_none() {
            return true;
        }
        match (self.staleness, state.fetched_at) {
            (Some(bound), Some(at)) => at.elapsed() > bound,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }

    fn with_fresh_root<T>(&self, f: impl FnOnce(&Node) -> Result<T>) -> Result<T> {
        let mut state = self.locked()?;
        if self.is_stale(&state) {
            debug!("re-fetching configuration root into cache");
            state.root = Some(self.inner.configuration_root()?);
            state.fetched_at = Some(Instant::now());
        }
        f(state.root.as_ref().expect("root fetched above"))
    }

    fn invalidate(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.root = None;
            state.fetched_at = None;
        }
    }
}

impl Configuration for CachingConfiguration {
    fn configuration_root(&self) -> Result<Node> {
        self.with_fresh_root(|root| Ok(root.clone()))
    }

    fn configuration_node(&self, path: &Path, _schema: Option<&Schema>) -> Result<Option<Node>> {
        self.with_fresh_root(|root| Ok(tree::node_at(root, path)?.cloned()))
    }

    fn node_exists(&self, path: &Path) -> Result<bool> {
        self.with_fresh_root(|root| tree::node_exists(root, path))
    }

    fn persist_node(&self, path: &Path, node: Node, schema: Option<&Schema>) -> Result<()> {
        self.inner.persist_node(path, node.clone(), schema)?;
        if self.read_only {
            self.invalidate();
            return Ok(());
        }
        let mut state = self.locked()?;
        let splice_failed = match state.root.as_mut() {
            Some(root) if path.is_root() => {
                *root = node;
                false
            }
            Some(root) => tree::replace_node(root, path, node).is_err(),
            None => false,
        };
        if splice_failed {
            // The cached shape no longer matches the backend; the write
            // itself succeeded, so drop the cache instead of failing.
            state.root = None;
            state.fetched_at = None;
        }
        Ok(())
    }

    fn refresh_node(&self, path: &Path) -> Result<()> {
        self.inner.refresh_node(path)?;
        // Lazy reload: the next read re-fetches the whole root.
        self.invalidate();
        Ok(())
    }

    fn remove_node(&self, path: &Path) -> Result<()> {
        self.inner.remove_node(path)?;
        if self.read_only {
            self.invalidate();
            return Ok(());
        }
        let mut state = self.locked()?;
        let splice_failed = match state.root.as_mut() {
            Some(root) => tree::remove_node(root, path).is_err(),
            None => false,
        };
        if splice_failed {
            state.root = None;
            state.fetched_at = None;
        }
        Ok(())
    }

    fn search(&self, pattern: &str) -> Result<SearchResults> {
        self.with_fresh_root(|root| {
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
                warn!("invalidating configuration cache after failed batch: {}", err);
                self.invalidate();
                Err(err)
            }
        }
    }
}
