//! Values stored in a settings tree.

use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Serialize, Serializer};

use super::node::ConfigNode;

/// A plain string-keyed mapping of values.
pub type Map = BTreeMap<String, ConfigValue>;

/// An interned-style name, produced by `:name` scalars and by
/// [`ConfigNode::symbolize_keys`](super::ConfigNode::symbolize_keys).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Symbol(String);

impl Symbol {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Symbol {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<String> for Symbol {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl From<&str> for Symbol {
    fn from(name: &str) -> Self {
        Self(name.to_owned())
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, ":{}", self.0)
    }
}

impl Serialize for Symbol {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

/// Scalar kinds a document may contain.
///
/// These are the entries of the deserializer's allow-list; see
/// [`PermittedTypes`](super::PermittedTypes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ScalarKind {
    String,
    Integer,
    Float,
    Boolean,
    Null,
    Date,
    Timestamp,
    Symbol,
    Decimal,
}

impl ScalarKind {
    pub const ALL: [ScalarKind; 9] = [
        ScalarKind::String,
        ScalarKind::Integer,
        ScalarKind::Float,
        ScalarKind::Boolean,
        ScalarKind::Null,
        ScalarKind::Date,
        ScalarKind::Timestamp,
        ScalarKind::Symbol,
        ScalarKind::Decimal,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ScalarKind::String => "string",
            ScalarKind::Integer => "integer",
            ScalarKind::Float => "float",
            ScalarKind::Boolean => "boolean",
            ScalarKind::Null => "null",
            ScalarKind::Date => "date",
            ScalarKind::Timestamp => "timestamp",
            ScalarKind::Symbol => "symbol",
            ScalarKind::Decimal => "decimal",
        }
    }
}

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A value in the settings tree.
///
/// `Map` is the raw form mappings take when they come out of a document;
/// [`ConfigNode::get`](super::ConfigNode::get) hands them back wrapped as
/// `Node`.
#[derive(Debug, Clone)]
pub enum ConfigValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Symbol(Symbol),
    Date(NaiveDate),
    Timestamp(DateTime<FixedOffset>),
    /// Decimal number kept as its source text.
    Decimal(String),
    List(Vec<ConfigValue>),
    Map(Map),
    Node(ConfigNode),
    /// A value carrying a custom tag that the allow-list permitted.
    Tagged {
        tag: String,
        value: Box<ConfigValue>,
    },
}

impl ConfigValue {
    /// The allow-list kind of a scalar, `None` for collections and tagged values.
    pub fn scalar_kind(&self) -> Option<ScalarKind> {
        match self {
            ConfigValue::Null => Some(ScalarKind::Null),
            ConfigValue::Bool(_) => Some(ScalarKind::Boolean),
            ConfigValue::Integer(_) => Some(ScalarKind::Integer),
            ConfigValue::Float(_) => Some(ScalarKind::Float),
            ConfigValue::String(_) => Some(ScalarKind::String),
            ConfigValue::Symbol(_) => Some(ScalarKind::Symbol),
            ConfigValue::Date(_) => Some(ScalarKind::Date),
            ConfigValue::Timestamp(_) => Some(ScalarKind::Timestamp),
            ConfigValue::Decimal(_) => Some(ScalarKind::Decimal),
            ConfigValue::List(_)
            | ConfigValue::Map(_)
            | ConfigValue::Node(_)
            | ConfigValue::Tagged { .. } => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ConfigValue::Null)
    }

    /// `true` for raw mappings and nodes.
    pub fn is_mapping(&self) -> bool {
        matches!(self, ConfigValue::Map(_) | ConfigValue::Node(_))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ConfigValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ConfigValue::Float(f) => Some(*f),
            ConfigValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConfigValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_node(&self) -> Option<&ConfigNode> {
        match self {
            ConfigValue::Node(node) => Some(node),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[ConfigValue]> {
        match self {
            ConfigValue::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Map> {
        match self {
            ConfigValue::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Falsy in the `||=` sense: null or `false`.
    pub(crate) fn is_falsy(&self) -> bool {
        matches!(self, ConfigValue::Null | ConfigValue::Bool(false))
    }

    /// Copies the value with every node replaced by a snapshot of its entries.
    pub fn to_plain(&self) -> ConfigValue {
        match self {
            ConfigValue::Node(node) => ConfigValue::Map(node.to_map()),
            ConfigValue::Map(map) => ConfigValue::Map(
                map.iter()
                    .map(|(key, value)| (key.clone(), value.to_plain()))
                    .collect(),
            ),
            ConfigValue::List(items) => {
                ConfigValue::List(items.iter().map(ConfigValue::to_plain).collect())
            }
            ConfigValue::Tagged { tag, value } => ConfigValue::Tagged {
                tag: tag.clone(),
                value: Box::new(value.to_plain()),
            },
            scalar => scalar.clone(),
        }
    }
}

impl PartialEq for ConfigValue {
    fn eq(&self, other: &Self) -> bool {
        use ConfigValue::*;
        match (self, other) {
            (Null, Null) => true,
            (Bool(a), Bool(b)) => a == b,
            (Integer(a), Integer(b)) => a == b,
            (Float(a), Float(b)) => a == b,
            (String(a), String(b)) => a == b,
            (Symbol(a), Symbol(b)) => a == b,
            (Date(a), Date(b)) => a == b,
            (Timestamp(a), Timestamp(b)) => a == b,
            (Decimal(a), Decimal(b)) => a == b,
            (List(a), List(b)) => a == b,
            (Map(a), Map(b)) => a == b,
            (Node(a), Node(b)) => a == b,
            (Node(node), Map(map)) | (Map(map), Node(node)) => node.to_map() == *map,
            (Tagged { tag: a, value: x }, Tagged { tag: b, value: y }) => a == b && x == y,
            _ => false,
        }
    }
}

impl Serialize for ConfigValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ConfigValue::Null => serializer.serialize_none(),
            ConfigValue::Bool(b) => serializer.serialize_bool(*b),
            ConfigValue::Integer(i) => serializer.serialize_i64(*i),
            ConfigValue::Float(f) => serializer.serialize_f64(*f),
            ConfigValue::String(s) | ConfigValue::Decimal(s) => serializer.serialize_str(s),
            ConfigValue::Symbol(symbol) => symbol.serialize(serializer),
            ConfigValue::Date(date) => serializer.collect_str(date),
            ConfigValue::Timestamp(ts) => serializer.serialize_str(&ts.to_rfc3339()),
            ConfigValue::List(items) => serializer.collect_seq(items),
            ConfigValue::Map(map) => serializer.collect_map(map),
            ConfigValue::Node(node) => node.serialize(serializer),
            ConfigValue::Tagged { value, .. } => value.serialize(serializer),
        }
    }
}

impl From<&str> for ConfigValue {
    fn from(s: &str) -> Self {
        ConfigValue::String(s.to_owned())
    }
}

impl From<String> for ConfigValue {
    fn from(s: String) -> Self {
        ConfigValue::String(s)
    }
}

impl From<i64> for ConfigValue {
    fn from(i: i64) -> Self {
        ConfigValue::Integer(i)
    }
}

impl From<i32> for ConfigValue {
    fn from(i: i32) -> Self {
        ConfigValue::Integer(i64::from(i))
    }
}

impl From<f64> for ConfigValue {
    fn from(f: f64) -> Self {
        ConfigValue::Float(f)
    }
}

impl From<bool> for ConfigValue {
    fn from(b: bool) -> Self {
        ConfigValue::Bool(b)
    }
}

impl From<Symbol> for ConfigValue {
    fn from(symbol: Symbol) -> Self {
        ConfigValue::Symbol(symbol)
    }
}

impl From<NaiveDate> for ConfigValue {
    fn from(date: NaiveDate) -> Self {
        ConfigValue::Date(date)
    }
}

impl From<Map> for ConfigValue {
    fn from(map: Map) -> Self {
        ConfigValue::Map(map)
    }
}

impl From<ConfigNode> for ConfigValue {
    fn from(node: ConfigNode) -> Self {
        ConfigValue::Node(node)
    }
}

impl<T: Into<ConfigValue>> From<Vec<T>> for ConfigValue {
    fn from(items: Vec<T>) -> Self {
        ConfigValue::List(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<ConfigValue>> From<Option<T>> for ConfigValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(ConfigValue::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_equals_matching_map() {
        let map = Map::from([("a".to_string(), ConfigValue::from(1))]);
        let node = ConfigNode::new(map.clone());

        assert_eq!(ConfigValue::Node(node), ConfigValue::Map(map));
    }

    #[test]
    fn test_to_plain_flattens_nested_nodes() {
        let inner = ConfigNode::new(Map::from([("x".to_string(), ConfigValue::from("y"))]));
        let value = ConfigValue::List(vec![ConfigValue::Node(inner)]);

        let plain = value.to_plain();
        let items = plain.as_list().unwrap();
        assert_eq!(items[0].as_map().unwrap()["x"], ConfigValue::from("y"));
    }

    #[test]
    fn test_scalar_kind() {
        assert_eq!(ConfigValue::Null.scalar_kind(), Some(ScalarKind::Null));
        assert_eq!(
            ConfigValue::Symbol(Symbol::new("a")).scalar_kind(),
            Some(ScalarKind::Symbol)
        );
        assert_eq!(ConfigValue::List(vec![]).scalar_kind(), None);
    }

    #[test]
    fn test_falsy_values() {
        assert!(ConfigValue::Null.is_falsy());
        assert!(ConfigValue::Bool(false).is_falsy());
        assert!(!ConfigValue::Integer(0).is_falsy());
        assert!(!ConfigValue::from("").is_falsy());
    }
}
