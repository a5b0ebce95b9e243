//! The recursive settings node.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::{Serialize, Serializer};
use tracing::trace;

use super::merge::merge_maps;
use super::value::{ConfigValue, Map};
use super::ConfigError;

/// Label used in error messages for nodes reached without a named context,
/// such as the elements of a list of mappings.
const UNNAMED_SECTION: &str = "unnamed section";

/// Returns `true` if `key` may be exposed as a named accessor.
///
/// Only keys made of ASCII letters, digits and underscores qualify. Every
/// other key stays reachable through [`ConfigNode::get`],
/// [`ConfigNode::probe`] and [`ConfigNode::set`].
pub fn expose_as_named_accessor(key: &str) -> bool {
    !key.is_empty() && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// A mapping in the settings tree.
///
/// Cloning a node is cheap and yields a handle to the same node; writes
/// through any handle are observed by all of them. Nested mappings are
/// wrapped into child nodes the first time they are read and the child is
/// memoized, so repeated reads of a key return the same node until the key
/// is overwritten.
///
/// ## Example
///
/// ```
/// use settings_tree::{ConfigNode, ConfigValue, Map};
///
/// let mut database = Map::new();
/// database.insert("host".into(), "localhost".into());
/// let mut root = Map::new();
/// root.insert("database".into(), database.into());
///
/// let settings = ConfigNode::new(root);
/// assert_eq!(settings.resolve_path("database.host")?, ConfigValue::from("localhost"));
/// assert!(settings.get("port").is_err());
/// # Ok::<(), settings_tree::ConfigError>(())
/// ```
#[derive(Clone)]
pub struct ConfigNode {
    inner: Arc<Inner>,
}

struct Inner {
    section: Option<String>,
    suppress_errors: bool,
    state: RwLock<State>,
}

#[derive(Default)]
struct State {
    entries: Map,
    /// Child nodes (or lists of child nodes) built from raw mappings.
    resolved: HashMap<String, ConfigValue>,
    /// Keys reachable through the named accessor surface.
    accessors: BTreeSet<String>,
}

impl State {
    fn new(entries: Map) -> Self {
        let accessors = entries
            .keys()
            .filter(|key| expose_as_named_accessor(key))
            .cloned()
            .collect();
        Self {
            entries,
            resolved: HashMap::new(),
            accessors,
        }
    }

    fn snapshot(&self) -> Map {
        self.entries
            .iter()
            .map(|(key, value)| {
                let value = self.resolved.get(key).unwrap_or(value);
                (key.clone(), value.to_plain())
            })
            .collect()
    }
}

impl ConfigNode {
    /// Creates an unlabelled node that raises on missing keys.
    pub fn new(entries: Map) -> Self {
        Self::with_options(entries, None, false)
    }

    /// Creates a node with a section label and missing-key policy.
    ///
    /// Children created through [`get`](Self::get) inherit `suppress_errors`.
    pub fn with_options(entries: Map, section: Option<String>, suppress_errors: bool) -> Self {
        Self {
            inner: Arc::new(Inner {
                section,
                suppress_errors,
                state: RwLock::new(State::new(entries)),
            }),
        }
    }

    /// Describes how this node was reached, for error messages.
    pub fn section(&self) -> Option<&str> {
        self.inner.section.as_deref()
    }

    pub fn suppress_errors(&self) -> bool {
        self.inner.suppress_errors
    }

    /// Returns `true` if both handles refer to the same node.
    pub fn ptr_eq(&self, other: &ConfigNode) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn section_label(&self) -> &str {
        self.section().unwrap_or(UNNAMED_SECTION)
    }

    /// Reads `key`, wrapping nested mappings into child nodes.
    ///
    /// A missing key fails with [`ConfigError::MissingSetting`], or yields
    /// [`ConfigValue::Null`] when this node suppresses errors.
    pub fn get(&self, key: &str) -> Result<ConfigValue, ConfigError> {
        match self.probe(key) {
            Some(value) => Ok(value),
            None => self.missing(key, self.section_label()),
        }
    }

    /// Reads `key` like [`get`](Self::get) but never fails.
    pub fn probe(&self, key: &str) -> Option<ConfigValue> {
        {
            let state = self.inner.state.read();
            if let Some(cached) = state.resolved.get(key) {
                return Some(cached.clone());
            }
            let raw = state.entries.get(key)?;
            if !needs_wrapping(raw) {
                return Some(raw.clone());
            }
        }

        let mut state = self.inner.state.write();
        // Another reader may have built the child while we waited.
        if let Some(cached) = state.resolved.get(key) {
            return Some(cached.clone());
        }
        let child = match state.entries.get(key)? {
            ConfigValue::Map(map) => ConfigValue::Node(self.child(key, map.clone())),
            ConfigValue::List(items) if items.iter().all(ConfigValue::is_mapping) => {
                ConfigValue::List(items.iter().map(|item| self.list_item(item)).collect())
            }
            other => return Some(other.clone()),
        };
        trace!(key, section = self.section_label(), "memoized child settings");
        state.resolved.insert(key.to_owned(), child.clone());
        Some(child)
    }

    /// Upserts `key`.
    ///
    /// Mappings are wrapped into a node carrying this node's label and
    /// missing-key policy before they are stored, so later reads return that
    /// node. Any other value replaces the entry and drops its memoized child.
    pub fn set(&self, key: impl Into<String>, value: impl Into<ConfigValue>) {
        let key = key.into();
        let value = match value.into() {
            ConfigValue::Map(map) => ConfigValue::Node(ConfigNode::with_options(
                map,
                self.inner.section.clone(),
                self.suppress_errors(),
            )),
            other => other,
        };

        let mut state = self.inner.state.write();
        match &value {
            ConfigValue::Node(_) => {
                state.resolved.insert(key.clone(), value.clone());
            }
            _ => {
                state.resolved.remove(&key);
            }
        }
        if expose_as_named_accessor(&key) {
            state.accessors.insert(key.clone());
        }
        state.entries.insert(key, value);
    }

    /// Returns the current value of `key` unless it is absent, null or
    /// `false`, in which case `default` is stored and returned.
    pub fn get_or_insert_with<V, F>(&self, key: &str, default: F) -> ConfigValue
    where
        V: Into<ConfigValue>,
        F: FnOnce() -> V,
    {
        if let Some(value) = self.probe(key).filter(|value| !value.is_falsy()) {
            return value;
        }
        self.set(key, default());
        self.probe(key).unwrap_or(ConfigValue::Null)
    }

    /// Follows a dotted path such as `"database.primary.host"`.
    ///
    /// Each segment is read with [`get`](Self::get), so the first missing
    /// segment fails (or yields null under suppression). A segment that
    /// continues past a non-mapping value is reported as missing too.
    pub fn resolve_path(&self, dotted: &str) -> Result<ConfigValue, ConfigError> {
        let mut segments = dotted.split('.');
        let first = segments.next().unwrap_or_default();
        let mut walked = first.to_owned();
        let mut current = self.get(first)?;

        for segment in segments {
            current = match current {
                ConfigValue::Node(node) => node.get(segment)?,
                ConfigValue::Null if self.suppress_errors() => return Ok(ConfigValue::Null),
                _ => {
                    let section = format!("non-section value '{walked}' in {}", self.section_label());
                    return self.missing(segment, &section);
                }
            };
            walked.push('.');
            walked.push_str(segment);
        }

        Ok(current)
    }

    /// Reads `name` through the named accessor surface.
    ///
    /// Names that fail [`expose_as_named_accessor`] are rejected outright;
    /// use [`get`](Self::get) for those keys.
    pub fn accessor(&self, name: &str) -> Result<ConfigValue, ConfigError> {
        if !expose_as_named_accessor(name) {
            return Err(ConfigError::InvalidAccessor(name.to_owned()));
        }
        self.get(name)
    }

    /// Returns `true` if `name` is currently exposed as a named accessor.
    pub fn responds_to(&self, name: &str) -> bool {
        self.inner.state.read().accessors.contains(name)
    }

    pub fn accessor_names(&self) -> Vec<String> {
        self.inner.state.read().accessors.iter().cloned().collect()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.state.read().entries.contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.inner.state.read().entries.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.state.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.state.read().entries.is_empty()
    }

    /// Copies the entries into a plain mapping, reading through memoized
    /// children so runtime writes to them are included.
    pub fn to_map(&self) -> Map {
        self.inner.state.read().snapshot()
    }

    /// Deserializes this subtree into `T`.
    ///
    /// Goes through the `toml` value model: null entries are dropped and
    /// dates become strings.
    pub fn extract<T: DeserializeOwned>(&self) -> Result<T, ConfigError> {
        let value =
            toml::Value::try_from(self).map_err(|e| ConfigError::Extract(e.to_string()))?;
        value
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::Extract(e.to_string()))
    }

    /// Deep-merges a plain `overlay` into the entries under one write lock.
    ///
    /// Keys the overlay does not mention keep their memoized children. A
    /// memoized child node that the overlay maps onto another mapping is left
    /// in place and returned with that mapping, so the caller can merge into
    /// it without holding this node's lock.
    pub(crate) fn merge_entries(&self, overlay: Map) -> Vec<(ConfigNode, Map)> {
        let mut state = self.inner.state.write();
        let mut nested = Vec::new();

        for (key, value) in overlay {
            let cached = match (&value, state.resolved.get(&key)) {
                (ConfigValue::Map(_), Some(ConfigValue::Node(child))) => Some(child.clone()),
                _ => None,
            };
            let merged = match (cached, state.entries.remove(&key), value) {
                (Some(child), existing, ConfigValue::Map(map)) => {
                    if let Some(existing) = existing {
                        state.entries.insert(key, existing);
                    }
                    nested.push((child, map));
                    continue;
                }
                (_, Some(existing), ConfigValue::Map(map)) if existing.is_mapping() => {
                    match existing.to_plain() {
                        ConfigValue::Map(base) => ConfigValue::Map(merge_maps(base, &map)),
                        _ => ConfigValue::Map(map),
                    }
                }
                (_, _, value) => value,
            };

            state.resolved.remove(&key);
            if expose_as_named_accessor(&key) {
                state.accessors.insert(key.clone());
            }
            state.entries.insert(key, merged);
        }
        nested
    }

    fn missing(&self, key: &str, section: &str) -> Result<ConfigValue, ConfigError> {
        if self.suppress_errors() {
            Ok(ConfigValue::Null)
        } else {
            Err(ConfigError::missing(key, section))
        }
    }

    fn child(&self, key: &str, entries: Map) -> ConfigNode {
        let section = format!("'{key}' section in {}", self.section_label());
        ConfigNode::with_options(entries, Some(section), self.suppress_errors())
    }

    fn list_item(&self, item: &ConfigValue) -> ConfigValue {
        match item {
            ConfigValue::Map(map) => ConfigValue::Node(ConfigNode::with_options(
                map.clone(),
                None,
                self.suppress_errors(),
            )),
            other => other.clone(),
        }
    }
}

/// Raw mappings and lists holding raw mappings get wrapped on first read.
fn needs_wrapping(value: &ConfigValue) -> bool {
    match value {
        ConfigValue::Map(_) => true,
        ConfigValue::List(items) => {
            items.iter().all(ConfigValue::is_mapping)
                && items.iter().any(|item| matches!(item, ConfigValue::Map(_)))
        }
        _ => false,
    }
}

impl From<Map> for ConfigNode {
    fn from(entries: Map) -> Self {
        ConfigNode::new(entries)
    }
}

impl PartialEq for ConfigNode {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || self.to_map() == other.to_map()
    }
}

impl fmt::Debug for ConfigNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigNode")
            .field("section", &self.inner.section)
            .field("suppress_errors", &self.inner.suppress_errors)
            .field("entries", &self.to_map())
            .finish()
    }
}

impl Serialize for ConfigNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.to_map())
    }
}
