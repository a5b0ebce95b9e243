//! The settings tree and everything that builds it.

mod error;
pub mod keys;
mod merge;
mod node;
pub mod parse;
pub mod source;
pub mod template;
mod value;

pub use error::ConfigError;
pub use keys::{to_atom_keyed, to_string_keyed, Keyed, StringMap, SymbolMap};
pub use merge::merge_maps;
pub use node::{expose_as_named_accessor, ConfigNode};
pub use parse::{parse, Deserializer, ExpansionLimits, Format, PermittedTypes};
pub use source::{Fetcher, HttpFetcher, Source};
pub use template::{EnvTemplate, Template};
pub use value::{ConfigValue, Map, ScalarKind, Symbol};
