//! Recursive key-case conversion of settings trees into plain mappings.

use std::borrow::Borrow;
use std::collections::BTreeMap;

use serde::{Serialize, Serializer};

use super::node::ConfigNode;
use super::value::{ConfigValue, Map, Symbol};

/// A value in a plain keyed tree produced by [`to_atom_keyed`] or
/// [`to_string_keyed`].
#[derive(Debug, Clone, PartialEq)]
pub enum Keyed<K> {
    /// A scalar or tagged value.
    Value(ConfigValue),
    List(Vec<Keyed<K>>),
    Map(BTreeMap<K, Keyed<K>>),
}

pub type SymbolMap = BTreeMap<Symbol, Keyed<Symbol>>;
pub type StringMap = BTreeMap<String, Keyed<String>>;

impl<K: Ord + Borrow<str>> Keyed<K> {
    /// Looks up `key` when this is a mapping.
    pub fn get(&self, key: &str) -> Option<&Keyed<K>> {
        match self {
            Keyed::Map(map) => map.get(key),
            _ => None,
        }
    }

    pub fn as_value(&self) -> Option<&ConfigValue> {
        match self {
            Keyed::Value(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Keyed<K>]> {
        match self {
            Keyed::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<K, Keyed<K>>> {
        match self {
            Keyed::Map(map) => Some(map),
            _ => None,
        }
    }
}

impl<K: Serialize> Serialize for Keyed<K> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Keyed::Value(value) => value.serialize(serializer),
            Keyed::List(items) => serializer.collect_seq(items),
            Keyed::Map(map) => serializer.collect_map(map),
        }
    }
}

/// Rebuilds `node` as a plain mapping keyed by [`Symbol`]s.
pub fn to_atom_keyed(node: &ConfigNode) -> SymbolMap {
    transform(node.to_map())
}

/// Rebuilds `node` as a plain mapping keyed by `String`s.
pub fn to_string_keyed(node: &ConfigNode) -> StringMap {
    transform(node.to_map())
}

impl ConfigNode {
    /// See [`to_atom_keyed`].
    pub fn symbolize_keys(&self) -> SymbolMap {
        to_atom_keyed(self)
    }

    /// See [`to_string_keyed`].
    pub fn stringify_keys(&self) -> StringMap {
        to_string_keyed(self)
    }
}

fn transform<K: Ord + From<String>>(map: Map) -> BTreeMap<K, Keyed<K>> {
    map.into_iter()
        .map(|(key, value)| (K::from(key), transform_value(value)))
        .collect()
}

fn transform_value<K: Ord + From<String>>(value: ConfigValue) -> Keyed<K> {
    match value {
        ConfigValue::Map(map) => Keyed::Map(transform(map)),
        ConfigValue::Node(node) => Keyed::Map(transform(node.to_map())),
        ConfigValue::List(items) => Keyed::List(items.into_iter().map(transform_value).collect()),
        scalar => Keyed::Value(scalar),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(entries: Vec<(&str, ConfigValue)>) -> Map {
        entries
            .into_iter()
            .map(|(key, value)| (key.to_string(), value))
            .collect()
    }

    fn language() -> ConfigNode {
        ConfigNode::new(map(vec![
            ("haskell", map(vec![("paradigm", "functional".into())]).into()),
            ("smalltalk", map(vec![("paradigm", "object oriented".into())]).into()),
            (
                "array",
                vec![ConfigValue::from(map(vec![("name", "first".into())]))].into(),
            ),
        ]))
    }

    #[test]
    fn test_symbolize_keys_recursively() {
        let result = language().symbolize_keys();

        assert!(result.contains_key("haskell"));
        assert_eq!(
            result["haskell"].get("paradigm").and_then(Keyed::as_value),
            Some(&ConfigValue::from("functional"))
        );
        let array = result["array"].as_list().unwrap();
        assert_eq!(
            array[0].get("name").and_then(Keyed::as_value),
            Some(&ConfigValue::from("first"))
        );
    }

    #[test]
    fn test_stringify_keys_matches_plain_tree() {
        let node = language();
        let haskell = node.get("haskell").unwrap();
        let result = haskell.as_node().unwrap().stringify_keys();

        let expected = StringMap::from([(
            "paradigm".to_string(),
            Keyed::Value(ConfigValue::from("functional")),
        )]);
        assert_eq!(result, expected);
    }

    #[test]
    fn test_includes_runtime_writes() {
        let node = language();
        node.set("symbol_key", map(vec![("symbol_child", "value".into())]));

        let result = node.stringify_keys();
        assert_eq!(
            result["symbol_key"].get("symbol_child").and_then(Keyed::as_value),
            Some(&ConfigValue::from("value"))
        );
    }

    #[test]
    fn test_leaves_node_untouched() {
        let node = language();
        let before = node.to_map();
        let _ = node.symbolize_keys();
        let _ = node.stringify_keys();

        assert_eq!(node.to_map(), before);
        assert!(node.probe("haskell").unwrap().as_node().is_some());
    }
}
