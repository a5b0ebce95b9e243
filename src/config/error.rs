use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("Missing setting '{key}' in {section}")]
    MissingSetting { key: String, section: String },

    #[error("tried to load disallowed type '{type_name}'; permit it explicitly to load this document")]
    DisallowedType { type_name: String },

    #[error("alias at line {line} refers to an anchor that is still being defined")]
    AliasCycle { line: usize },

    #[error("bad alias at line {line}: {reason}")]
    BadAlias { line: usize, reason: String },

    #[error("syntax error at line {line}, column {column}: {message}")]
    Syntax {
        line: usize,
        column: usize,
        message: String,
    },

    #[error("invalid {tag} value: {value:?}")]
    InvalidScalar { tag: String, value: String },

    #[error("document expands to more than {limit} nodes")]
    ExpansionLimit { limit: usize },

    #[error("document nests deeper than {limit} levels")]
    NestingTooDeep { limit: usize },

    #[error("expected a mapping in {section}")]
    NotAMapping { section: String },

    #[error("settings source not found: {0}")]
    SourceNotFound(PathBuf),

    #[error("failed to read settings source '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid settings source: {0}")]
    InvalidSource(String),

    #[error("failed to fetch {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("'{0}' cannot be used as a named accessor")]
    InvalidAccessor(String),

    #[error("unclosed reference (missing '}}')")]
    UnclosedReference,

    #[error("undefined template variable: {0}")]
    UndefinedVariable(String),

    #[error("failed to extract settings: {0}")]
    Extract(String),
}

impl ConfigError {
    pub(crate) fn missing(key: impl Into<String>, section: impl Into<String>) -> Self {
        Self::MissingSetting {
            key: key.into(),
            section: section.into(),
        }
    }

    /// Returns `true` for the only error kind subject to error suppression.
    pub fn is_missing_setting(&self) -> bool {
        matches!(self, Self::MissingSetting { .. })
    }
}
