use crate::config::ConfigError;
use thiserror::Error;

/// Top-level error type for the settings-tree library.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("no namespace named '{0}' is registered")]
    UnknownNamespace(String),

    #[error("a namespace named '{0}' is already registered")]
    DuplicateNamespace(String),
}

impl Error {
    /// Returns `true` if this wraps [`ConfigError::MissingSetting`].
    pub fn is_missing_setting(&self) -> bool {
        matches!(self, Error::Config(err) if err.is_missing_setting())
    }
}
