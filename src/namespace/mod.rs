//! Lazily constructed, reloadable settings roots.

mod registry;

pub use registry::Registry;

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};

use crate::config::{
    ConfigError, ConfigNode, ConfigValue, Deserializer, Fetcher, HttpFetcher, Map, Source,
    Template,
};
use crate::Error;

/// A named settings root bound to one source.
///
/// The root is built on first access and kept until [`reload`](Self::reload).
/// Concurrent first accesses build it exactly once.
///
/// ## Example
///
/// ```no_run
/// use settings_tree::Namespace;
///
/// let settings = Namespace::builder("settings")
///     .source_descriptor("config/application.yml")
///     .root_key("production")
///     .build()?;
///
/// let host = settings.get("database.host")?;
/// println!("database host: {:?}", host.as_str());
/// # Ok::<(), settings_tree::Error>(())
/// ```
#[derive(Debug)]
pub struct Namespace {
    name: String,
    source: Source,
    root_key: Option<String>,
    suppress_errors: bool,
    deserializer: Deserializer,
    template: Option<Arc<dyn Template>>,
    fetcher: Arc<dyn Fetcher>,
    root: RwLock<Option<ConfigNode>>,
    /// Held for the whole of a construction.
    construct: Mutex<()>,
}

impl Namespace {
    /// Creates a new builder for a namespace called `name`.
    pub fn builder(name: impl Into<String>) -> NamespaceBuilder {
        NamespaceBuilder {
            name: name.into(),
            source: None,
            root_key: None,
            suppress_errors: false,
            deserializer: Deserializer::default(),
            template: None,
            fetcher: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &Source {
        &self.source
    }

    pub fn root_key(&self) -> Option<&str> {
        self.root_key.as_deref()
    }

    pub fn suppress_errors(&self) -> bool {
        self.suppress_errors
    }

    /// Returns `true` once a root has been constructed and not discarded.
    pub fn is_loaded(&self) -> bool {
        self.root.read().is_some()
    }

    /// Constructs the root if that has not happened yet.
    pub fn load(&self) -> Result<(), Error> {
        self.root().map(drop)
    }

    /// Returns the root node, constructing it on first use.
    pub fn root(&self) -> Result<ConfigNode, Error> {
        if let Some(root) = self.root.read().as_ref() {
            return Ok(root.clone());
        }

        let _guard = self.construct.lock();
        if let Some(root) = self.root.read().as_ref() {
            return Ok(root.clone());
        }
        let root = self.construct()?;
        *self.root.write() = Some(root.clone());
        Ok(root)
    }

    /// Resolves a dotted path such as `"database.host"` against the root.
    pub fn get(&self, dotted: &str) -> Result<ConfigValue, Error> {
        Ok(self.root()?.resolve_path(dotted)?)
    }

    /// Reads a single root key without ever failing on absence.
    pub fn probe(&self, key: &str) -> Result<Option<ConfigValue>, Error> {
        Ok(self.root()?.probe(key))
    }

    /// Writes a root key. The write lasts until the next reload.
    pub fn set(&self, key: impl Into<String>, value: impl Into<ConfigValue>) -> Result<(), Error> {
        self.root()?.set(key, value);
        Ok(())
    }

    /// Discards the current root and builds a fresh one from the source.
    ///
    /// Runtime writes and memoized children are lost. Handles to the old
    /// root stay usable but are no longer reachable from this namespace. If
    /// the rebuild fails the namespace is left unloaded and the next access
    /// tries again.
    pub fn reload(&self) -> Result<(), Error> {
        let _guard = self.construct.lock();
        *self.root.write() = None;
        info!(namespace = %self.name, source = %self.source, "reloading settings");

        let root = self.construct()?;
        *self.root.write() = Some(root);
        Ok(())
    }

    fn construct(&self) -> Result<ConfigNode, ConfigError> {
        let label = self.source.label();
        let document = match &self.source {
            Source::Literal(map) => ConfigValue::Map(map.clone()).to_plain(),
            source => {
                let raw = source.read(self.fetcher.as_ref())?.unwrap_or_default();
                let text = match &self.template {
                    Some(template) => template.render(&raw)?,
                    None => raw,
                };
                self.deserializer.parse_for(&text, source)?
            }
        };

        let entries = match &self.root_key {
            Some(key) => self.extract_root(document, key, &label)?,
            None => into_entries(document, &label)?,
        };

        debug!(
            namespace = %self.name,
            source = %label,
            keys = entries.len(),
            "constructed settings root"
        );
        Ok(ConfigNode::with_options(
            entries,
            Some(label),
            self.suppress_errors,
        ))
    }

    fn extract_root(&self, document: ConfigValue, key: &str, label: &str) -> Result<Map, ConfigError> {
        let mut entries = into_entries(document, label)?;
        match entries.remove(key) {
            Some(value) => into_entries(value, &format!("'{key}' section in {label}")),
            None if self.suppress_errors => Ok(Map::new()),
            None => Err(ConfigError::MissingSetting {
                key: key.to_string(),
                section: label.to_string(),
            }),
        }
    }
}

fn into_entries(value: ConfigValue, section: &str) -> Result<Map, ConfigError> {
    match value {
        ConfigValue::Map(map) => Ok(map),
        ConfigValue::Node(node) => Ok(node.to_map()),
        ConfigValue::Null => Ok(Map::new()),
        _ => Err(ConfigError::NotAMapping {
            section: section.to_string(),
        }),
    }
}

/// Builder for a [`Namespace`].
#[derive(Debug)]
#[must_use = "builders do nothing until .build() is called"]
pub struct NamespaceBuilder {
    name: String,
    source: Option<Result<Source, ConfigError>>,
    root_key: Option<String>,
    suppress_errors: bool,
    deserializer: Deserializer,
    template: Option<Arc<dyn Template>>,
    fetcher: Option<Arc<dyn Fetcher>>,
}

impl NamespaceBuilder {
    /// Sets the source: a literal [`Map`], a path, or a parsed [`Source`].
    pub fn source(mut self, source: impl Into<Source>) -> Self {
        self.source = Some(Ok(source.into()));
        self
    }

    /// Sets the source from a path or `http(s)://` URL string.
    ///
    /// An invalid descriptor is reported by [`build`](Self::build).
    pub fn source_descriptor(mut self, descriptor: &str) -> Self {
        self.source = Some(Source::parse(descriptor));
        self
    }

    /// Uses only the mapping under `key` as the root.
    pub fn root_key(mut self, key: impl Into<String>) -> Self {
        self.root_key = Some(key.into());
        self
    }

    /// Turns missing-setting failures into null values for the whole tree.
    pub fn suppress_errors(mut self, suppress: bool) -> Self {
        self.suppress_errors = suppress;
        self
    }

    pub fn deserializer(mut self, deserializer: Deserializer) -> Self {
        self.deserializer = deserializer;
        self
    }

    /// Runs `template` over the raw text before it is parsed.
    pub fn template(mut self, template: Arc<dyn Template>) -> Self {
        self.template = Some(template);
        self
    }

    /// Replaces the default [`HttpFetcher`] used for URL sources.
    pub fn fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Builds the namespace without reading the source.
    pub fn build(self) -> Result<Namespace, Error> {
        let source = self.source.unwrap_or_else(|| {
            Err(ConfigError::InvalidSource(format!(
                "namespace '{}' has no settings source",
                self.name
            )))
        })?;

        Ok(Namespace {
            name: self.name,
            source,
            root_key: self.root_key,
            suppress_errors: self.suppress_errors,
            deserializer: self.deserializer,
            template: self.template,
            fetcher: self.fetcher.unwrap_or_else(|| Arc::new(HttpFetcher)),
            root: RwLock::new(None),
            construct: Mutex::new(()),
        })
    }
}
