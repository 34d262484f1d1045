//! Property-based tests for the node model and path formatting.
//!
//! These tests use proptest to generate random trees and paths and verify
//! that the serialization and hashing invariants hold for all inputs.

#[cfg(test)]
mod proptest_tests {
    use crate::node::{Node, HASH_KEY};
    use crate::olock::hash::compute_hashes;
    use crate::path::{Path, PathSegment};
    use indexmap::IndexMap;
    use proptest::prelude::*;

    fn arb_node() -> impl Strategy<Value = Node> {
        let leaf = prop_oneof![
            Just(Node::Null),
            any::<bool>().prop_map(Node::Bool),
            any::<i64>().prop_map(|v| Node::Number(v.into())),
            "[a-zA-Z0-9 _.-]{0,12}".prop_map(Node::String),
        ];
        leaf.prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Node::List),
                prop::collection::vec(("[a-zA-Z0-9_]{1,8}", inner), 0..4).prop_map(|entries| {
                    let mut map = IndexMap::new();
                    for (key, value) in entries {
                        map.insert(key, value);
                    }
                    Node::Object(map)
                }),
            ]
        })
    }

    fn arb_segment() -> impl Strategy<Value = PathSegment> {
        // Keys exercise the escapable characters (dot, backslash, brackets)
        // but not '/', which only denotes the root and reference forms.
        prop_oneof![
            r"[a-zA-Z0-9_.\-\\\[\]]{1,10}".prop_map(PathSegment::Key),
            (0usize..100).prop_map(PathSegment::Index),
        ]
    }

    proptest! {
        /// Property: for all valid trees T, parse(serialize(T)) == T
        #[test]
        fn node_json_round_trip(node in arb_node()) {
            let json = node.to_json_string().unwrap();
            let reparsed = Node::from_json_str(&json).unwrap();
            prop_assert_eq!(node, reparsed);
        }

        /// Property: serialization preserves object key order
        #[test]
        fn node_serialization_is_deterministic(node in arb_node()) {
            let first = node.to_json_string().unwrap();
            let second = node.to_json_string().unwrap();
            prop_assert_eq!(first, second);
        }
    }

    proptest! {
        /// Property: computing the structural hash twice without mutation
        /// yields the same digest
        #[test]
        fn hash_is_idempotent(node in arb_node()) {
            let mut map = IndexMap::new();
            map.insert(HASH_KEY.to_string(), Node::String("*".to_string()));
            map.insert("payload".to_string(), node);
            let mut tree = Node::Object(map);

            compute_hashes(&mut tree);
            let first = tree.get(HASH_KEY).and_then(Node::as_str).unwrap().to_string();
            compute_hashes(&mut tree);
            let second = tree.get(HASH_KEY).and_then(Node::as_str).unwrap().to_string();
            prop_assert_eq!(first, second);
        }

        /// Property: reordering an object's keys leaves the digest unchanged
        #[test]
        fn hash_ignores_sibling_order(
            unique_entries in prop::collection::hash_map("[a-z]{1,6}", any::<i64>(), 1..6)
        ) {
            let entries: Vec<(String, i64)> = unique_entries.into_iter().collect();
            let forward: IndexMap<String, Node> = entries
                .iter()
                .map(|(key, value)| (key.clone(), Node::from(*value)))
                .collect();
            let backward: IndexMap<String, Node> = entries
                .iter()
                .rev()
                .map(|(key, value)| (key.clone(), Node::from(*value)))
                .collect();

            let hash_of = |map: IndexMap<String, Node>| {
                let mut map = map;
                map.insert(HASH_KEY.to_string(), Node::String("*".to_string()));
                let mut tree = Node::Object(map);
                compute_hashes(&mut tree);
                tree.get(HASH_KEY).and_then(Node::as_str).unwrap().to_string()
            };

            prop_assert_eq!(hash_of(forward), hash_of(backward));
        }
    }

    proptest! {
        /// Property: the dotted/escaped path form round-trips through parse
        #[test]
        fn path_display_round_trips(segments in prop::collection::vec(arb_segment(), 0..6)) {
            let path = Path::from(segments);
            let printed = path.to_string();
            let reparsed = Path::parse(&printed).unwrap();
            prop_assert_eq!(path, reparsed);
        }
    }
}
