use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;
use tracing::debug;

use super::Namespace;
use crate::config::ConfigValue;
use crate::Error;

/// Namespaces by name.
///
/// Tests construct their own registry; applications may share
/// [`Registry::global`].
#[derive(Debug, Default)]
pub struct Registry {
    namespaces: RwLock<BTreeMap<String, Arc<Namespace>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry, created on first use.
    pub fn global() -> &'static Registry {
        static GLOBAL: OnceLock<Registry> = OnceLock::new();
        GLOBAL.get_or_init(Registry::new)
    }

    /// Adds `namespace` under its own name.
    pub fn register(&self, namespace: Namespace) -> Result<Arc<Namespace>, Error> {
        let mut namespaces = self.namespaces.write();
        if namespaces.contains_key(namespace.name()) {
            return Err(Error::DuplicateNamespace(namespace.name().to_string()));
        }

        debug!(namespace = %namespace.name(), source = %namespace.source(), "registered namespace");
        let namespace = Arc::new(namespace);
        namespaces.insert(namespace.name().to_string(), Arc::clone(&namespace));
        Ok(namespace)
    }

    pub fn namespace(&self, name: &str) -> Result<Arc<Namespace>, Error> {
        self.namespaces
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownNamespace(name.to_string()))
    }

    /// Resolves `dotted` in the namespace called `name`.
    pub fn get(&self, name: &str, dotted: &str) -> Result<ConfigValue, Error> {
        self.namespace(name)?.get(dotted)
    }

    pub fn reload(&self, name: &str) -> Result<(), Error> {
        self.namespace(name)?.reload()
    }

    /// Reloads every namespace, stopping at the first failure.
    pub fn reload_all(&self) -> Result<(), Error> {
        let namespaces: Vec<_> = self.namespaces.read().values().cloned().collect();
        namespaces.iter().try_for_each(|namespace| namespace.reload())
    }

    pub fn names(&self) -> Vec<String> {
        self.namespaces.read().keys().cloned().collect()
    }

    pub fn remove(&self, name: &str) -> Option<Arc<Namespace>> {
        self.namespaces.write().remove(name)
    }
}
