//! Single-document JSON file backend

use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use fs2::FileExt;
use log::debug;

use crate::config::{ConfigLock, Configuration, SearchResults};
use crate::error::{Error, Result};
use crate::node::Node;
use crate::path::Path;
use crate::query::{self, PathPattern};
use crate::schema::Schema;
use crate::tree;

/// Backend persisting the root tree as one JSON document.
///
/// There is no incremental update: every read deserializes the whole
/// document and every write re-serializes the whole tree. A missing document
/// is treated as an empty root, not an error; a malformed document is a
/// structural error and propagates.
///
/// `lock()` takes an OS-level advisory lock on a sidecar `<doc>.lock` file,
/// shared with every other process locking the same document. The lock is
/// re-entrant within this handle: nested guards are refcounted and the OS
/// lock is released when the last guard drops. `run_batch` holds the lock
/// across the whole closure.
pub struct FileConfiguration {
    doc_path: PathBuf,
    lock_state: Arc<Mutex<FileLockState>>,
}

#[derive(Default)]
struct FileLockState {
    count: u32,
    file: Option<fs::File>,
}

impl FileConfiguration {
    /// Create a backend over the document at `doc_path`
    pub fn new(doc_path: impl Into<PathBuf>) -> Self {
        FileConfiguration {
            doc_path: doc_path.into(),
            lock_state: Arc::new(Mutex::new(FileLockState::default())),
        }
    }

    /// Path of the sidecar lock file
    pub fn lock_path(&self) -> PathBuf {
        PathBuf::from(format!("{}.lock", self.doc_path.display()))
    }

    fn load(&self) -> Result<Node> {
        let content = match fs::read_to_string(&self.doc_path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Node::object());
            }
            Err(err) => return Err(err.into()),
        };
        let root = Node::from_json_str(&content)?;
        if !root.is_object() {
            return Err(Error::Storage {
                message: format!(
                    "document '{}' does not hold an object root",
                    self.doc_path.display()
                ),
            });
        }
        Ok(root)
    }

    fn store(&self, root: &Node) -> Result<()> {
        let mut serialized = root.to_json_string_pretty()?;
        if !serialized.ends_with('\n') {
            serialized.push('\n');
        }
        debug!("rewriting configuration document {}", self.doc_path.display());
        fs::write(&self.doc_path, serialized)?;
        Ok(())
    }
}

impl Configuration for FileConfiguration {
    fn configuration_root(&self) -> Result<Node> {
        self.load()
    }

    fn configuration_node(&self, path: &Path, _schema: Option<&Schema>) -> Result<Option<Node>> {
        let root = self.load()?;
        Ok(tree::node_at(&root, path)?.cloned())
    }

    fn persist_node(&self, path: &Path, node: Node, _schema: Option<&Schema>) -> Result<()> {
        if path.is_root() && !node.is_object() {
            return Err(Error::Storage {
                message: "configuration root must be an object".to_string(),
            });
        }
        let mut root = self.load()?;
        tree::replace_node(&mut root, path, node)?;
        self.store(&root)
    }

    fn refresh_node(&self, _path: &Path) -> Result<()> {
        // Every read already deserializes the document afresh.
        Ok(())
    }

    fn remove_node(&self, path: &Path) -> Result<()> {
        let mut root = self.load()?;
        if tree::remove_node(&mut root, path)?.is_some() || path.is_root() {
            self.store(&root)?;
        }
        Ok(())
    }

    fn search(&self, pattern: &str) -> Result<SearchResults> {
        let root = self.load()?;
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
        let mut state = self.lock_state.lock().map_err(|_| Error::LockPoisoned {
            context: "file configuration lock state".to_string(),
        })?;

        if state.count == 0 {
            let lock_path = self.lock_path();
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(&lock_path)
                .map_err(|err| Error::Lock {
                    message: format!("cannot open {}: {}", lock_path.display(), err),
                })?;
            file.lock_exclusive().map_err(|err| Error::Lock {
                message: format!("cannot lock {}: {}", lock_path.display(), err),
            })?;
            state.file = Some(file);
        }
        state.count += 1;

        let shared = Arc::clone(&self.lock_state);
        Ok(ConfigLock::on_release(move || {
            if let Ok(mut state) = shared.lock() {
                state.count = state.count.saturating_sub(1);
                if state.count == 0 {
                    if let Some(file) = state.file.take() {
                        let _ = FileExt::unlock(&file);
                    }
                }
            }
        }))
    }

    fn run_batch(&self, batch: &mut dyn FnMut() -> Result<()>) -> Result<()> {
        let _guard = self.lock()?;
        batch()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config_in(dir: &TempDir) -> FileConfiguration {
        FileConfiguration::new(dir.path().join("config.json"))
    }

    #[test]
    fn test_missing_document_reads_as_empty_root() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        assert_eq!(config.configuration_root().unwrap(), Node::object());
        assert!(!config
            .node_exists(&Path::parse("anything").unwrap())
            .unwrap());
    }

    #[test]
    fn test_persist_rewrites_whole_document() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        config
            .persist_node(
                &Path::root(),
                Node::from_json_str(r#"{"devices":{"a":{"port":1}}}"#).unwrap(),
                None,
            )
            .unwrap();
        config
            .persist_node(
                &Path::parse("devices.a").unwrap(),
                Node::from_json_str(r#"{"port":2}"#).unwrap(),
                None,
            )
            .unwrap();

        let written = fs::read_to_string(dir.path().join("config.json")).unwrap();
        assert!(written.ends_with('\n'));
        let reparsed = Node::from_json_str(&written).unwrap();
        assert_eq!(
            reparsed,
            Node::from_json_str(r#"{"devices":{"a":{"port":2}}}"#).unwrap()
        );
    }

    #[test]
    fn test_malformed_document_is_an_error() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("config.json"), "{not json").unwrap();
        let config = config_in(&dir);
        assert!(matches!(config.configuration_root(), Err(Error::Json(_))));
    }

    #[test]
    fn test_non_object_root_is_an_error() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("config.json"), "[1,2]").unwrap();
        let config = config_in(&dir);
        assert!(matches!(
            config.configuration_root(),
            Err(Error::Storage { .. })
        ));
    }

    #[test]
    fn test_remove_node_persists() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        config
            .persist_node(
                &Path::root(),
                Node::from_json_str(r#"{"a":{"b":1},"c":2}"#).unwrap(),
                None,
            )
            .unwrap();
        config.remove_node(&Path::parse("a").unwrap()).unwrap();

        let reread = config_in(&dir);
        assert_eq!(
            reread.configuration_root().unwrap(),
            Node::from_json_str(r#"{"c":2}"#).unwrap()
        );
    }

    #[test]
    fn test_lock_is_reentrant_and_creates_sidecar() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);

        let mut outer = config.lock().unwrap();
        let inner = config.lock().unwrap();
        assert!(config.lock_path().exists());
        drop(inner);
        outer.release();

        // Fully released: a fresh handle can lock again.
        let other = config_in(&dir);
        let _guard = other.lock().unwrap();
    }

    #[test]
    fn test_run_batch_holds_lock_and_propagates_errors() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        let result = config.run_batch(&mut || {
            config.persist_node(
                &Path::root(),
                Node::from_json_str(r#"{"x":1}"#).unwrap(),
                None,
            )?;
            Err(Error::Batch {
                message: "abort".to_string(),
            })
        });
        assert!(matches!(result, Err(Error::Batch { .. })));
        // The lock was released when the batch ended.
        let _guard = config.lock().unwrap();
    }

    #[test]
    fn test_search_over_document() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        config
            .persist_node(
                &Path::root(),
                Node::from_json_str(
                    r#"{"devices":{"a":{"name":"a","on":true},"b":{"name":"b","on":false}}}"#,
                )
                .unwrap(),
                None,
            )
            .unwrap();
        let names: Vec<String> = config
            .search("/devices/*[on=true]")
            .unwrap()
            .filter_map(|n| n.get("name").and_then(Node::as_str).map(String::from))
            .collect();
        assert_eq!(names, vec!["a"]);
    }
}
