//! Structural deep merge of settings trees.
//!
//! Nested mappings are merged recursively; any other overlay value
//! (including lists) replaces the base value entirely.

use super::node::ConfigNode;
use super::value::{ConfigValue, Map};

impl ConfigNode {
    /// Returns a new node holding `overlay` deep-merged over this node.
    ///
    /// This node is left untouched. The result keeps this node's section
    /// label and missing-key policy.
    pub fn deep_merge(&self, overlay: &Map) -> ConfigNode {
        let merged = merge_maps(self.to_map(), overlay);
        ConfigNode::with_options(
            merged,
            self.section().map(str::to_owned),
            self.suppress_errors(),
        )
    }

    /// Deep-merges `overlay` into this node.
    ///
    /// The node keeps its identity, so every handle to it observes the merged
    /// entries. Memoized child nodes under keys that both sides map to a
    /// mapping are merged into recursively and keep their identity too;
    /// children the overlay does not touch stay memoized.
    pub fn deep_merge_in_place(&self, overlay: &Map) {
        // Snapshot before locking: the overlay may hold this node or an ancestor.
        let overlay = overlay
            .iter()
            .map(|(key, value)| (key.clone(), value.to_plain()))
            .collect();
        merge_into(self, overlay);
    }
}

fn merge_into(node: &ConfigNode, overlay: Map) {
    for (child, nested) in node.merge_entries(overlay) {
        merge_into(&child, nested);
    }
}

/// Merges `overlay` into `base`, consuming `base` and returning the result.
pub fn merge_maps(mut base: Map, overlay: &Map) -> Map {
    for (key, value) in overlay {
        let merged = match (base.remove(key), value) {
            (Some(existing), overlay_value) if existing.is_mapping() && overlay_value.is_mapping() => {
                ConfigValue::Map(merge_maps(into_map(existing), &into_map(overlay_value.clone())))
            }
            (_, overlay_value) => overlay_value.to_plain(),
        };
        base.insert(key.clone(), merged);
    }
    base
}

fn into_map(value: ConfigValue) -> Map {
    match value {
        ConfigValue::Map(map) => map,
        ConfigValue::Node(node) => node.to_map(),
        _ => Map::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn map(entries: Vec<(&str, ConfigValue)>) -> Map {
        entries
            .into_iter()
            .map(|(key, value)| (key.to_string(), value))
            .collect()
    }

    #[test]
    fn test_nested_tables_merge() {
        let base = map(vec![("a", map(vec![("x", 1.into())]).into())]);
        let overlay = map(vec![("a", map(vec![("y", 2.into())]).into())]);

        let merged = merge_maps(base, &overlay);
        assert_eq!(
            merged,
            map(vec![("a", map(vec![("x", 1.into()), ("y", 2.into())]).into())])
        );
    }

    #[test]
    fn test_scalar_replaced_by_table() {
        let base = map(vec![("a", 1.into())]);
        let overlay = map(vec![("a", map(vec![("y", 2.into())]).into())]);

        let merged = merge_maps(base, &overlay);
        assert_eq!(merged, map(vec![("a", map(vec![("y", 2.into())]).into())]));
    }

    #[test]
    fn test_lists_are_replaced() {
        let base = map(vec![("list", vec![1, 2, 3].into())]);
        let overlay = map(vec![("list", vec![4].into())]);

        let merged = merge_maps(base, &overlay);
        assert_eq!(merged["list"], ConfigValue::from(vec![4]));
    }

    #[test]
    fn test_deep_merge_leaves_base_untouched() {
        let node = ConfigNode::new(map(vec![(
            "haskell",
            map(vec![("paradigm", "functional".into())]).into(),
        )]));
        let before = node.to_map();

        let merged = node.deep_merge(&map(vec![
            ("haskell", map(vec![("type_system", "static".into())]).into()),
            ("ruby", map(vec![("paradigm", "object oriented".into())]).into()),
        ]));

        assert_eq!(
            merged.resolve_path("haskell.paradigm").unwrap(),
            ConfigValue::from("functional")
        );
        assert_eq!(
            merged.resolve_path("haskell.type_system").unwrap(),
            ConfigValue::from("static")
        );
        assert_eq!(
            merged.resolve_path("ruby.paradigm").unwrap(),
            ConfigValue::from("object oriented")
        );
        assert!(node.probe("ruby").is_none());
        assert_eq!(node.to_map(), before);
        assert!(!merged.ptr_eq(&node));
    }

    #[test]
    fn test_deep_merge_reads_runtime_children() {
        let node = ConfigNode::new(map(vec![("deep", map(vec![("a", 1.into())]).into())]));
        let deep = node.get("deep").unwrap();
        deep.as_node().unwrap().set("b", 2);

        let merged = node.deep_merge(&map(vec![("deep", map(vec![("c", 3.into())]).into())]));
        let deep = merged.get("deep").unwrap();
        let deep = deep.as_node().unwrap();
        assert_eq!(deep.keys(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_merged_children_are_independent() {
        let node = ConfigNode::new(map(vec![("deep", map(vec![("a", 1.into())]).into())]));
        let merged = node.deep_merge(&Map::new());

        merged
            .get("deep")
            .unwrap()
            .as_node()
            .unwrap()
            .set("a", 99);

        assert_eq!(node.resolve_path("deep.a").unwrap(), ConfigValue::from(1));
    }

    #[test]
    fn test_deep_merge_in_place_keeps_identity() {
        let node = ConfigNode::new(map(vec![(
            "setting1",
            map(vec![(
                "deep",
                map(vec![("child", map(vec![("value", 2.into())]).into())]).into(),
            )])
            .into(),
        )]));
        let handle = node.clone();
        let setting1 = node.get("setting1").unwrap();
        let setting1 = setting1.as_node().unwrap().clone();

        setting1.deep_merge_in_place(&map(vec![
            (
                "deep",
                map(vec![("child", map(vec![("new_sibling", "hello".into())]).into())]).into(),
            ),
            ("new_branch", map(vec![("leaf", "world".into())]).into()),
        ]));

        assert!(handle.ptr_eq(&node));
        let same = node.get("setting1").unwrap();
        assert!(same.as_node().unwrap().ptr_eq(&setting1));
        assert_eq!(
            node.resolve_path("setting1.deep.child.value").unwrap(),
            ConfigValue::from(2)
        );
        assert_eq!(
            node.resolve_path("setting1.deep.child.new_sibling").unwrap(),
            ConfigValue::from("hello")
        );
        assert_eq!(
            node.resolve_path("setting1.new_branch.leaf").unwrap(),
            ConfigValue::from("world")
        );
        assert!(setting1.responds_to("new_branch"));
    }

    #[test]
    fn test_in_place_merge_keeps_untouched_children() {
        let root = ConfigNode::new(map(vec![("a", map(vec![("x", 1.into())]).into())]));
        let a = root.get("a").unwrap();
        let a = a.as_node().unwrap().clone();

        root.deep_merge_in_place(&map(vec![("b", 2.into())]));

        let same = root.get("a").unwrap();
        assert!(same.as_node().unwrap().ptr_eq(&a));
        a.set("y", 9);
        assert_eq!(root.resolve_path("a.y").unwrap(), ConfigValue::from(9));
        assert_eq!(root.get("b").unwrap(), ConfigValue::from(2));
    }

    #[test]
    fn test_in_place_merge_into_memoized_child() {
        let root = ConfigNode::new(map(vec![(
            "a",
            map(vec![("x", 1.into()), ("deep", map(vec![("k", 1.into())]).into())]).into(),
        )]));
        let a = root.get("a").unwrap().as_node().unwrap().clone();
        let deep = a.get("deep").unwrap().as_node().unwrap().clone();

        root.deep_merge_in_place(&map(vec![(
            "a",
            map(vec![("deep", map(vec![("j", 2.into())]).into())]).into(),
        )]));

        assert!(root.get("a").unwrap().as_node().unwrap().ptr_eq(&a));
        assert!(a.get("deep").unwrap().as_node().unwrap().ptr_eq(&deep));
        assert_eq!(root.resolve_path("a.x").unwrap(), ConfigValue::from(1));
        assert_eq!(root.resolve_path("a.deep.k").unwrap(), ConfigValue::from(1));
        assert_eq!(deep.get("j").unwrap(), ConfigValue::from(2));
    }

    #[test]
    fn test_in_place_merge_replaces_child_with_scalar() {
        let root = ConfigNode::new(map(vec![("a", map(vec![("x", 1.into())]).into())]));
        let _ = root.get("a").unwrap();

        root.deep_merge_in_place(&map(vec![("a", "flat".into())]));
        assert_eq!(root.get("a").unwrap(), ConfigValue::from("flat"));
    }

    #[test]
    fn test_in_place_merge_with_ancestor_in_overlay() {
        let root = ConfigNode::new(map(vec![("a", map(vec![("x", 1.into())]).into())]));
        let a = root.get("a").unwrap().as_node().unwrap().clone();

        a.deep_merge_in_place(&map(vec![("parent", root.clone().into())]));

        assert_eq!(root.resolve_path("a.parent.a.x").unwrap(), ConfigValue::from(1));
    }

    fn leaf() -> impl Strategy<Value = ConfigValue> {
        prop_oneof![
            any::<i64>().prop_map(ConfigValue::from),
            any::<bool>().prop_map(ConfigValue::from),
            "[a-z]{0,6}".prop_map(ConfigValue::from),
            Just(ConfigValue::Null),
        ]
    }

    fn tree() -> impl Strategy<Value = Map> {
        let value = leaf().prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..3).prop_map(ConfigValue::List),
                prop::collection::btree_map("[a-c]", inner, 0..4).prop_map(ConfigValue::Map),
            ]
        });
        prop::collection::btree_map("[a-d]", value, 0..5)
    }

    proptest! {
        #[test]
        fn prop_deep_merge_never_mutates_base(base in tree(), overlay in tree()) {
            let node = ConfigNode::new(base.clone());
            let merged = node.deep_merge(&overlay);

            prop_assert_eq!(node.to_map(), base.clone());
            for key in overlay.keys() {
                prop_assert!(merged.contains_key(key));
            }
            for key in base.keys() {
                prop_assert!(merged.contains_key(key));
            }
        }
    }
}
