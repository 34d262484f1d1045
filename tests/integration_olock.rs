//! Integration tests for the optimistic locking merge engine.
//!
//! These drive the full write path: readers fetch hashed subtrees through
//! the olock decorator, edit them, and persist concurrently; the merge
//! engine reconciles or conflicts.
//!
//! ## Test Scenarios
//!
//! 1. `stale_double_write_conflicts` - two readers saw the same snapshot,
//!    both rewrite the same value; the second persist conflicts at the
//!    subtree path
//! 2. `disjoint_edits_merge` - one writer changes `x`, the other adds `y`;
//!    both edits survive
//! 3. `deletion_wins_over_edit` - deleting an olock root on one side while
//!    the other edits a descendant never conflicts
//! 4. `noop_persist_succeeds` - persisting an unmodified read is always
//!    clean
//! 5. `file_backed_round_trip` - hash bookkeeping never reaches the stored
//!    document
//! 6. `conflict_recovery` - re-read-and-retry after a conflict succeeds

use conftree::config::Configuration;
use conftree::error::Error;
use conftree::node::{Node, HASH_KEY};
use conftree::olock::OlockConfiguration;
use conftree::path::Path;
use conftree::schema::Schema;
use conftree::storage::{FileConfiguration, MemoryConfiguration};
use tempfile::TempDir;

fn device_schema() -> Schema {
    Schema::default().with_child(
        "devices",
        Schema::default().with_wildcard(Schema::olock_root()),
    )
}

fn olocked_memory() -> OlockConfiguration {
    let backend = MemoryConfiguration::new();
    backend
        .persist_node(
            &Path::root(),
            Node::from_json_str(r#"{"devices":{"scan":{"x":1}}}"#).unwrap(),
            None,
        )
        .unwrap();
    OlockConfiguration::new(Box::new(backend))
}

fn read_root(config: &dyn Configuration, schema: &Schema) -> Node {
    config
        .configuration_node(&Path::root(), Some(schema))
        .unwrap()
        .unwrap()
}

fn set_scan(tree: &mut Node, key: &str, value: Node) {
    tree.as_object_mut()
        .unwrap()
        .get_mut("devices")
        .unwrap()
        .as_object_mut()
        .unwrap()
        .get_mut("scan")
        .unwrap()
        .as_object_mut()
        .unwrap()
        .insert(key.to_string(), value);
}

#[test]
fn test_stale_double_write_conflicts() {
    let config = olocked_memory();
    let schema = device_schema();

    let mut writer1 = read_root(&config, &schema);
    let mut writer2 = writer1.clone();
    set_scan(&mut writer1, "x", Node::from(2i64));
    set_scan(&mut writer2, "x", Node::from(2i64));

    config
        .persist_node(&Path::root(), writer1, Some(&schema))
        .unwrap();

    match config.persist_node(&Path::root(), writer2, Some(&schema)) {
        Err(Error::OptimisticLock { path }) => assert_eq!(path, "devices.scan"),
        other => panic!("expected optimistic lock failure, got {:?}", other),
    }
}

#[test]
fn test_disjoint_edits_merge() {
    let config = olocked_memory();
    let schema = device_schema();

    let mut writer1 = read_root(&config, &schema);
    let mut writer2 = writer1.clone();
    set_scan(&mut writer1, "x", Node::from(2i64));
    set_scan(&mut writer2, "y", Node::from(5i64));

    config
        .persist_node(&Path::root(), writer1, Some(&schema))
        .unwrap();
    config
        .persist_node(&Path::root(), writer2, Some(&schema))
        .unwrap();

    let stored = config
        .configuration_node(&Path::parse("devices.scan").unwrap(), None)
        .unwrap()
        .unwrap();
    assert_eq!(stored, Node::from_json_str(r#"{"x":2,"y":5}"#).unwrap());
}

#[test]
fn test_deletion_wins_over_edit() {
    let config = olocked_memory();
    let schema = device_schema();

    let mut deleter = read_root(&config, &schema);
    let mut editor = deleter.clone();

    deleter
        .as_object_mut()
        .unwrap()
        .get_mut("devices")
        .unwrap()
        .as_object_mut()
        .unwrap()
        .shift_remove("scan");
    set_scan(&mut editor, "x", Node::from(3i64));

    config
        .persist_node(&Path::root(), deleter, Some(&schema))
        .unwrap();
    // The editor's stale copy of the deleted subtree does not resurrect it
    // and does not conflict.
    config
        .persist_node(&Path::root(), editor, Some(&schema))
        .unwrap();

    assert!(!config
        .node_exists(&Path::parse("devices.scan").unwrap())
        .unwrap());
}

#[test]
fn test_noop_persist_succeeds() {
    let config = olocked_memory();
    let schema = device_schema();

    let read = read_root(&config, &schema);
    config
        .persist_node(&Path::root(), read, Some(&schema))
        .unwrap();

    assert_eq!(
        config
            .configuration_node(&Path::root(), None)
            .unwrap()
            .unwrap(),
        Node::from_json_str(r#"{"devices":{"scan":{"x":1}}}"#).unwrap()
    );
}

#[test]
fn test_file_backed_round_trip_stays_clean() {
    let dir = TempDir::new().unwrap();
    let doc = dir.path().join("config.json");

    let backend = FileConfiguration::new(&doc);
    backend
        .persist_node(
            &Path::root(),
            Node::from_json_str(r#"{"devices":{"scan":{"x":1}}}"#).unwrap(),
            None,
        )
        .unwrap();

    let config = OlockConfiguration::new(Box::new(FileConfiguration::new(&doc)));
    let schema = device_schema();

    let mut edit = read_root(&config, &schema);
    assert!(edit
        .get("devices")
        .and_then(|d| d.get("scan"))
        .and_then(|s| s.get(HASH_KEY))
        .is_some());
    set_scan(&mut edit, "x", Node::from(9i64));
    config
        .persist_node(&Path::root(), edit, Some(&schema))
        .unwrap();

    // The document on disk carries no hash bookkeeping.
    let written = std::fs::read_to_string(&doc).unwrap();
    assert!(!written.contains("_.hash"));
    assert!(!written.contains("#old_hash"));
    assert_eq!(
        Node::from_json_str(&written).unwrap(),
        Node::from_json_str(r#"{"devices":{"scan":{"x":9}}}"#).unwrap()
    );
}

#[test]
fn test_conflict_recovery_by_reread() {
    let config = olocked_memory();
    let schema = device_schema();

    let mut writer1 = read_root(&config, &schema);
    let mut writer2 = writer1.clone();
    set_scan(&mut writer1, "x", Node::from(2i64));
    set_scan(&mut writer2, "x", Node::from(5i64));

    config
        .persist_node(&Path::root(), writer1, Some(&schema))
        .unwrap();
    assert!(matches!(
        config.persist_node(&Path::root(), writer2, Some(&schema)),
        Err(Error::OptimisticLock { .. })
    ));

    // The caller-recoverable path: read again, reapply, persist.
    let mut retry = read_root(&config, &schema);
    set_scan(&mut retry, "x", Node::from(5i64));
    config
        .persist_node(&Path::root(), retry, Some(&schema))
        .unwrap();

    assert_eq!(
        config
            .configuration_node(&Path::parse("devices.scan.x").unwrap(), None)
            .unwrap()
            .unwrap()
            .as_i64(),
        Some(5)
    );
}
