//! Template pre-processing of raw settings text.
//!
//! A [`Template`] runs over the raw document before it is deserialized.
//! [`EnvTemplate`] supports `${NAME}` and `${NAME:-default}` references to
//! environment variables. Use `$$` to escape a literal `$`.

use std::collections::HashMap;
use std::fmt;

use super::ConfigError;

/// Rewrites raw document text before it is parsed.
pub trait Template: Send + Sync + fmt::Debug {
    fn render(&self, raw: &str) -> Result<String, ConfigError>;
}

/// Expands `${NAME}` references from the process environment, or from a
/// fixed set of variables.
#[derive(Debug, Clone, Default)]
pub struct EnvTemplate {
    vars: Option<HashMap<String, String>>,
}

impl EnvTemplate {
    /// Reads variables from the process environment at render time.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads variables only from `vars`.
    pub fn with_vars<K, V>(vars: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: Some(
                vars.into_iter()
                    .map(|(key, value)| (key.into(), value.into()))
                    .collect(),
            ),
        }
    }

    fn lookup(&self, name: &str) -> Option<String> {
        match &self.vars {
            Some(vars) => vars.get(name).cloned(),
            None => std::env::var(name).ok(),
        }
    }

    fn expand(&self, reference: &str) -> Result<String, ConfigError> {
        let (name, default) = match reference.split_once(":-") {
            Some((name, default)) => (name.trim(), Some(default)),
            None => (reference.trim(), None),
        };

        match (self.lookup(name), default) {
            (Some(value), _) => Ok(value),
            (None, Some(default)) => Ok(default.to_string()),
            (None, None) => Err(ConfigError::UndefinedVariable(name.to_string())),
        }
    }
}

impl Template for EnvTemplate {
    fn render(&self, raw: &str) -> Result<String, ConfigError> {
        let mut result = String::with_capacity(raw.len());
        let mut chars = raw.chars().peekable();

        while let Some(ch) = chars.next() {
            if ch != '$' {
                result.push(ch);
                continue;
            }
            match chars.peek() {
                Some('$') => {
                    chars.next();
                    result.push('$');
                }
                Some('{') => {
                    chars.next();
                    let reference =
                        consume_until(&mut chars, '}').ok_or(ConfigError::UnclosedReference)?;
                    result.push_str(&self.expand(&reference)?);
                }
                _ => result.push('$'),
            }
        }

        Ok(result)
    }
}

/// Consumes characters until the delimiter, returning the collected string.
fn consume_until(chars: &mut std::iter::Peekable<std::str::Chars>, delim: char) -> Option<String> {
    let mut result = String::new();
    for ch in chars.by_ref() {
        if ch == delim {
            return Some(result);
        }
        result.push(ch);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template() -> EnvTemplate {
        EnvTemplate::with_vars([("TEST_SETTING", "from_env"), ("PORT", "3000")])
    }

    #[test]
    fn test_expands_variables() {
        let rendered = template()
            .render("env_setting: ${TEST_SETTING}\nurl: http://localhost:${PORT}\n")
            .unwrap();
        assert_eq!(
            rendered,
            "env_setting: from_env\nurl: http://localhost:3000\n"
        );
    }

    #[test]
    fn test_default_value() {
        let rendered = template().render("user: ${USER_NAME:-unknown}").unwrap();
        assert_eq!(rendered, "user: unknown");
    }

    #[test]
    fn test_escape_sequence() {
        let rendered = template().render("value: use $${VAR} and $5").unwrap();
        assert_eq!(rendered, "value: use ${VAR} and $5");
    }

    #[test]
    fn test_undefined_variable() {
        let err = template().render("a: ${NOPE}").unwrap_err();
        assert!(matches!(err, ConfigError::UndefinedVariable(name) if name == "NOPE"));
    }

    #[test]
    fn test_unclosed_reference() {
        let err = template().render("a: ${PORT").unwrap_err();
        assert!(matches!(err, ConfigError::UnclosedReference));
    }

    #[test]
    fn test_reads_process_environment() {
        let path = std::env::var("PATH").unwrap_or_default();
        let rendered = EnvTemplate::new().render("path: \"${PATH:-}\"").unwrap();
        assert_eq!(rendered, format!("path: \"{path}\""));
    }
}
