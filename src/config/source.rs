//! Where a namespace's settings come from.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::redirect::Policy;
use tracing::debug;
use url::Url;

use super::parse::Format;
use super::value::Map;
use super::ConfigError;

/// A settings source descriptor.
///
/// Strings are classified by [`Source::parse`]: `http://` and `https://`
/// URLs are fetched, any other `scheme://` is rejected before any I/O, and
/// everything else is a local path.
#[derive(Debug, Clone, PartialEq)]
pub enum Source {
    /// An in-memory mapping; never re-read.
    Literal(Map),
    Path(PathBuf),
    Url(Url),
}

impl Source {
    /// Classifies a source descriptor string.
    pub fn parse(descriptor: &str) -> Result<Self, ConfigError> {
        let descriptor = descriptor.trim();
        if descriptor.is_empty() {
            return Err(ConfigError::InvalidSource(
                "no settings source specified".to_string(),
            ));
        }

        match scheme_of(descriptor) {
            Some(scheme)
                if scheme.eq_ignore_ascii_case("http") || scheme.eq_ignore_ascii_case("https") =>
            {
                Url::parse(descriptor).map(Source::Url).map_err(|e| {
                    ConfigError::InvalidSource(format!("invalid URL '{descriptor}': {e}"))
                })
            }
            Some(scheme) => Err(ConfigError::InvalidSource(format!(
                "unsupported URL scheme '{scheme}' in '{descriptor}'"
            ))),
            None => Ok(Source::Path(PathBuf::from(descriptor))),
        }
    }

    /// The section label root nodes built from this source carry.
    pub fn label(&self) -> String {
        match self {
            Source::Literal(_) => "literal settings".to_string(),
            Source::Path(path) => path.display().to_string(),
            Source::Url(url) => url.to_string(),
        }
    }

    /// The document format implied by the source, if any.
    pub fn format_hint(&self) -> Option<Format> {
        let path = match self {
            Source::Literal(_) => return None,
            Source::Path(path) => path.as_path(),
            Source::Url(url) => Path::new(url.path()),
        };
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => Some(Format::Toml),
            Some(ext) if ext.eq_ignore_ascii_case("yml") || ext.eq_ignore_ascii_case("yaml") => {
                Some(Format::Yaml)
            }
            _ => None,
        }
    }

    /// Reads the raw document text. Literal sources have none.
    pub fn read(&self, fetcher: &dyn Fetcher) -> Result<Option<String>, ConfigError> {
        match self {
            Source::Literal(_) => Ok(None),
            Source::Path(path) => read_file(path).map(Some),
            Source::Url(url) => {
                debug!(%url, "fetching settings");
                fetcher.fetch(url).map(Some)
            }
        }
    }
}

impl FromStr for Source {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Source::parse(s)
    }
}

impl From<Map> for Source {
    fn from(map: Map) -> Self {
        Source::Literal(map)
    }
}

impl From<PathBuf> for Source {
    fn from(path: PathBuf) -> Self {
        Source::Path(path)
    }
}

impl From<&Path> for Source {
    fn from(path: &Path) -> Self {
        Source::Path(path.to_path_buf())
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// Returns the scheme of a `scheme://...` descriptor.
fn scheme_of(descriptor: &str) -> Option<&str> {
    let (scheme, _) = descriptor.split_once("://")?;
    let mut chars = scheme.chars();
    let valid = chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    valid.then_some(scheme)
}

/// Reads a whole settings file.
fn read_file(path: &Path) -> Result<String, ConfigError> {
    debug!(path = %path.display(), "reading settings file");
    match std::fs::read_to_string(path) {
        Ok(contents) => Ok(contents),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(ConfigError::SourceNotFound(path.to_path_buf()))
        }
        Err(e) => Err(ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Retrieves remote settings documents.
///
/// Implementations make a single attempt; wrap a fetcher to add retries or
/// timeouts.
pub trait Fetcher: Send + Sync + fmt::Debug {
    fn fetch(&self, url: &Url) -> Result<String, ConfigError>;
}

/// Fetches documents with one blocking HTTP GET.
///
/// Redirects are not followed and any non-2xx status is an error. There is
/// no request timeout.
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpFetcher;

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &Url) -> Result<String, ConfigError> {
        let fetch_error = |reason: String| ConfigError::Fetch {
            url: url.to_string(),
            reason,
        };

        let client = Client::builder()
            .redirect(Policy::none())
            .timeout(None::<Duration>)
            .build()
            .map_err(|e| fetch_error(e.to_string()))?;
        let response = client
            .get(url.as_str())
            .send()
            .map_err(|e| fetch_error(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(fetch_error(status.to_string()));
        }
        response.text().map_err(|e| fetch_error(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_classifies_descriptors() {
        assert!(matches!(
            Source::parse("/var/configs/application.yml"),
            Ok(Source::Path(_))
        ));
        assert!(matches!(Source::parse("relative/path.yml"), Ok(Source::Path(_))));
        assert!(matches!(
            Source::parse("https://example.com/config.yml"),
            Ok(Source::Url(_))
        ));
        assert!(matches!(
            Source::parse("HTTP://example.com/config.yml"),
            Ok(Source::Url(_))
        ));
    }

    #[test]
    fn test_rejects_other_schemes() {
        for descriptor in [
            "file:///etc/passwd",
            "ftp://example.com/config.yml",
            "gopher://example.com/config.yml",
        ] {
            let err = Source::parse(descriptor).unwrap_err();
            assert!(matches!(err, ConfigError::InvalidSource(_)), "{descriptor}");
        }
    }

    #[test]
    fn test_rejects_malformed_url_and_empty_source() {
        assert!(matches!(
            Source::parse("http://[invalid"),
            Err(ConfigError::InvalidSource(_))
        ));
        assert!(matches!(Source::parse("  "), Err(ConfigError::InvalidSource(_))));
    }

    #[test]
    fn test_format_hint() {
        assert_eq!(
            Source::parse("config/app.toml").unwrap().format_hint(),
            Some(Format::Toml)
        );
        assert_eq!(
            Source::parse("https://example.com/app.yaml").unwrap().format_hint(),
            Some(Format::Yaml)
        );
        assert_eq!(Source::Literal(Map::new()).format_hint(), None);
    }

    #[test]
    fn test_reads_local_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "test: value").unwrap();

        let source = Source::from(file.path());
        let text = source.read(&HttpFetcher).unwrap().unwrap();
        assert_eq!(text, "test: value\n");
    }

    #[test]
    fn test_missing_file() {
        let source = Source::parse("/nonexistent/path/to/nowhere.yml").unwrap();
        let err = source.read(&HttpFetcher).unwrap_err();
        assert!(matches!(err, ConfigError::SourceNotFound(_)));
    }

    #[test]
    fn test_fetches_url() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", "/config.yml")
            .with_status(200)
            .with_body("remote: true\n")
            .create();

        let source = Source::parse(&format!("{}/config.yml", server.url())).unwrap();
        let text = source.read(&HttpFetcher).unwrap().unwrap();

        assert_eq!(text, "remote: true\n");
        mock.assert();
    }

    #[test]
    fn test_non_success_status_fails() {
        let mut server = mockito::Server::new();
        server.mock("GET", "/missing.yml").with_status(404).create();

        let source = Source::parse(&format!("{}/missing.yml", server.url())).unwrap();
        let err = source.read(&HttpFetcher).unwrap_err();
        assert!(matches!(err, ConfigError::Fetch { reason, .. } if reason.starts_with("404")));
    }

    #[test]
    fn test_redirects_are_not_followed() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/config.yml")
            .with_status(301)
            .with_header("location", "/elsewhere.yml")
            .create();
        let elsewhere = server
            .mock("GET", "/elsewhere.yml")
            .with_status(200)
            .with_body("moved: true\n")
            .expect(0)
            .create();

        let source = Source::parse(&format!("{}/config.yml", server.url())).unwrap();
        let err = source.read(&HttpFetcher).unwrap_err();

        assert!(matches!(err, ConfigError::Fetch { .. }));
        elsewhere.assert();
    }
}
