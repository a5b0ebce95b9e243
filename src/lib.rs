//! Hierarchical, dot-navigable application settings.
//!
//! A [`Namespace`] binds a name to one settings source (a YAML or TOML file,
//! an `http(s)://` URL, or a literal [`Map`]) and lazily builds a
//! [`ConfigNode`] tree from it. Nested mappings become child nodes on first
//! read; missing keys fail with [`ConfigError::MissingSetting`] unless the
//! namespace suppresses errors. Documents are deserialized against a type
//! allow-list so settings files can never construct arbitrary types.

pub mod config;
mod error;
pub mod namespace;

pub use config::{
    ConfigError, ConfigNode, ConfigValue, Deserializer, EnvTemplate, Map, PermittedTypes, Source,
};
pub use error::Error;
pub use namespace::{Namespace, NamespaceBuilder, Registry};
