//! Configuration management for indexner using the prefer crate.
//!
//! A config file (`indexner.toml`, `.yaml` or `.json`) is discovered by
//! prefer and parsed with serde. Connection settings can be overridden from
//! the environment (and a `.env` file, loaded by the binary).

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::annotation::FilterCategoryMap;
use crate::index::IndexError;
use crate::recognizer::RecognizerConfig;

/// Name used for config file discovery.
pub const CONFIG_NAME: &str = "indexner";

/// Mapping type of the annotated field.
pub const ANNOTATED_FIELD_TYPE: &str = "annotated_text";

/// Mapping type of the filter fields.
pub const FILTER_FIELD_TYPE: &str = "keyword";

/// Errors that stop a run before any document is touched.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unknown language or model '{key}' (configured: {available})")]
    UnknownModel { key: String, available: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to load config file {}: {message}", path.display())]
    File { path: PathBuf, message: String },

    #[error(
        "Field '{field}' in index '{index}' is mapped as '{existing}', cannot declare it as '{requested}'"
    )]
    MappingConflict {
        index: String,
        field: String,
        existing: String,
        requested: String,
    },

    #[error("Cannot reach index at {url}: {source}")]
    Unreachable {
        url: String,
        #[source]
        source: IndexError,
    },

    #[error(transparent)]
    Index(#[from] IndexError),
}

/// Connection settings for the search index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Full base URL. Takes precedence over host and port when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// API key id. HTTPS with API key auth is used when id, key and CA
    /// bundle are all set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certs_location: Option<PathBuf>,
    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Retries after the first attempt for transient failures.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    9200
}

fn default_request_timeout() -> u64 {
    180
}

fn default_max_retries() -> u32 {
    15
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self::base_default().with_env_overrides()
    }
}

impl IndexConfig {
    /// Base default without env overrides.
    pub fn base_default() -> Self {
        Self {
            url: None,
            host: default_host(),
            port: default_port(),
            api_id: None,
            api_key: None,
            certs_location: None,
            request_timeout_secs: default_request_timeout(),
            max_retries: default_max_retries(),
        }
    }

    /// Apply environment variable overrides.
    ///
    /// Supported env vars:
    /// - `ES_URL`: full base URL
    /// - `ES_HOST`: host name (default `localhost`)
    /// - `ES_PORT`: port (default 9200)
    /// - `API_ID`, `API_KEY`: API key credentials
    /// - `CERTS_LOCATION`: CA bundle for HTTPS
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(val) = std::env::var("ES_URL") {
            self.url = Some(val);
        }
        if let Ok(val) = std::env::var("ES_HOST") {
            self.host = val;
        }
        if let Ok(val) = std::env::var("ES_PORT") {
            if let Ok(port) = val.parse() {
                self.port = port;
            }
        }
        if let Ok(val) = std::env::var("API_ID") {
            self.api_id = Some(val);
        }
        if let Ok(val) = std::env::var("API_KEY") {
            self.api_key = Some(val);
        }
        if let Ok(val) = std::env::var("CERTS_LOCATION") {
            self.certs_location = Some(PathBuf::from(val));
        }
        self
    }

    /// API key id, key and CA bundle, when all three are configured.
    pub fn credentials(&self) -> Option<(&str, &str, &Path)> {
        match (&self.api_id, &self.api_key, &self.certs_location) {
            (Some(id), Some(key), Some(certs)) => Some((id, key, certs.as_path())),
            _ => None,
        }
    }

    /// Base URL of the index server.
    pub fn base_url(&self) -> String {
        if let Some(ref url) = self.url {
            return url.clone();
        }
        let scheme = if self.credentials().is_some() {
            "https"
        } else {
            "http"
        };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }
}

/// How documents are paged out of the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraversalConfig {
    /// Documents fetched per page.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Cursor lease in seconds. Must exceed the time needed to annotate one page.
    #[serde(default = "default_scroll_lease")]
    pub scroll_lease_secs: u64,
}

fn default_page_size() -> usize {
    100
}

fn default_scroll_lease() -> u64 {
    300
}

impl Default for TraversalConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            scroll_lease_secs: default_scroll_lease(),
        }
    }
}

impl TraversalConfig {
    pub fn lease(&self) -> Duration {
        Duration::from_secs(self.scroll_lease_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page_size == 0 {
            return Err(ConfigError::Invalid("page_size must be at least 1".into()));
        }
        if self.scroll_lease_secs == 0 {
            return Err(ConfigError::Invalid(
                "scroll_lease_secs must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub traversal: TraversalConfig,
    #[serde(default)]
    pub recognizer: RecognizerConfig,
    /// Entity category code to filter field name.
    #[serde(default)]
    pub filters: FilterCategoryMap,
    /// Directory for raw entity archives.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<String>,
    /// Path to the config file this was loaded from (not serialized).
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration using prefer crate for discovery.
    ///
    /// Falls back to defaults with env overrides only when no config file
    /// exists. A file that is found but cannot be read or parsed is an error.
    pub async fn load() -> Result<Self, ConfigError> {
        Self::load_discovered(prefer::discovery::find_config_file(CONFIG_NAME).await).await
    }

    async fn load_discovered(found: prefer::Result<PathBuf>) -> Result<Self, ConfigError> {
        match found {
            Ok(path) => Self::load_from_path(&path).await,
            Err(prefer::Error::FileNotFound(_)) => Ok(Self::default()),
            Err(e) => Err(ConfigError::File {
                path: PathBuf::from(CONFIG_NAME),
                message: e.to_string(),
            }),
        }
    }

    /// Load configuration from an explicit path, or discover it.
    pub async fn load_with(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load_from_path(path).await,
            None => Self::load().await,
        }
    }

    /// Load configuration from a specific file path.
    /// The format is picked from the file extension (TOML, YAML, or JSON).
    pub async fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let file_error = |message: String| ConfigError::File {
            path: path.to_path_buf(),
            message,
        };

        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| file_error(e.to_string()))?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");
        let mut config = Self::parse(&contents, ext).map_err(file_error)?;

        config.source_path = Some(path.to_path_buf());
        config.index = config.index.with_env_overrides();
        config.recognizer = config.recognizer.with_env_overrides();
        Ok(config)
    }

    fn parse(contents: &str, ext: &str) -> Result<Self, String> {
        match ext {
            "toml" => toml::from_str(contents).map_err(|e| format!("invalid TOML: {}", e)),
            "yaml" | "yml" => {
                serde_yaml::from_str(contents).map_err(|e| format!("invalid YAML: {}", e))
            }
            "json" => serde_json::from_str(contents).map_err(|e| format!("invalid JSON: {}", e)),
            other => Err(format!("unsupported config format '{}'", other)),
        }
    }

    /// Get the base directory for resolving relative paths.
    pub fn base_dir(&self) -> Option<PathBuf> {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
    }

    /// Resolve a path that may be relative to the config file.
    pub fn resolve_path(&self, path_str: &str, base_dir: &Path) -> PathBuf {
        let expanded = shellexpand::tilde(path_str);
        let path = Path::new(expanded.as_ref());

        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base_dir.join(path)
        }
    }

    /// Directory for entity archives: the CLI flag wins over the config file.
    /// CLI paths are relative to the working directory, config paths to the
    /// config file.
    pub fn archive_dir(&self, cli_override: Option<&Path>) -> Option<PathBuf> {
        if let Some(dir) = cli_override {
            return Some(self.resolve_path(&dir.to_string_lossy(), Path::new(".")));
        }
        let base = self.base_dir().unwrap_or_else(|| PathBuf::from("."));
        self.output_dir
            .as_deref()
            .map(|dir| self.resolve_path(dir, &base))
    }

    /// Check everything that can be checked without contacting a server.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.traversal.validate()?;
        if self.filters.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one filter category is required".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_http_without_credentials() {
        let config = IndexConfig::base_default();
        assert_eq!(config.base_url(), "http://localhost:9200");
        assert!(config.credentials().is_none());
    }

    #[test]
    fn test_https_requires_all_credentials() {
        let mut config = IndexConfig::base_default();
        config.api_id = Some("id".into());
        config.api_key = Some("key".into());
        assert_eq!(config.base_url(), "http://localhost:9200");

        config.certs_location = Some(PathBuf::from("/etc/ssl/ca.pem"));
        assert_eq!(config.base_url(), "https://localhost:9200");
    }

    #[test]
    fn test_explicit_url_wins() {
        let mut config = IndexConfig::base_default();
        config.url = Some("https://search.example.org".into());
        assert_eq!(config.base_url(), "https://search.example.org");
    }

    #[test]
    fn test_parse_toml() {
        let config = Config::parse(
            r#"
            output_dir = "archives"

            [index]
            host = "es.internal"
            port = 9201

            [traversal]
            page_size = 25

            [filters]
            PER = "ner:person"
            "#,
            "toml",
        )
        .unwrap();

        assert_eq!(config.index.host, "es.internal");
        assert_eq!(config.index.port, 9201);
        assert_eq!(config.index.max_retries, 15);
        assert_eq!(config.traversal.page_size, 25);
        assert_eq!(config.traversal.scroll_lease_secs, 300);
        assert_eq!(config.filters.field_for("PER"), Some("ner:person"));
        assert_eq!(config.filters.field_for("LOC"), None);
        assert_eq!(config.output_dir.as_deref(), Some("archives"));
    }

    #[test]
    fn test_parse_json_defaults() {
        let config = Config::parse("{}", "json").unwrap();
        assert_eq!(config.traversal, TraversalConfig::default());
        assert_eq!(config.filters.field_for("LOC"), Some("ner:location"));
    }

    #[test]
    fn test_parse_error_reports_format() {
        let err = Config::parse("page_size = ", "toml").unwrap_err();
        assert!(err.starts_with("invalid TOML"));
    }

    #[test]
    fn test_unsupported_format_rejected() {
        let err = Config::parse("[index]", "ini").unwrap_err();
        assert!(err.contains("unsupported"));
    }

    #[test]
    fn test_zero_page_size_rejected() {
        let mut config = Config::default();
        config.traversal.page_size = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_archive_dir_relative_to_config_file() {
        let config = Config {
            output_dir: Some("archives".into()),
            source_path: Some(PathBuf::from("/srv/indexner/indexner.toml")),
            ..Default::default()
        };
        assert_eq!(
            config.archive_dir(None),
            Some(PathBuf::from("/srv/indexner/archives"))
        );
        assert_eq!(
            config.archive_dir(Some(Path::new("/tmp/out"))),
            Some(PathBuf::from("/tmp/out"))
        );
    }

    #[tokio::test]
    async fn test_load_from_missing_path() {
        let err = Config::load_from_path(Path::new("/nonexistent/indexner.toml"))
            .await
            .unwrap_err();
        assert!(matches!(err, ConfigError::File { .. }));
    }

    #[tokio::test]
    async fn test_discovered_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("indexner.toml");
        std::fs::write(&path, "[filters]\nPER = \"ner:people\"\n[traversal\n").unwrap();

        let err = Config::load_discovered(Ok(path.clone())).await.unwrap_err();
        match err {
            ConfigError::File { path: reported, message } => {
                assert_eq!(reported, path);
                assert!(message.starts_with("invalid TOML"));
            }
            other => panic!("expected a file error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_discovered_file_is_used() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("indexner.toml");
        std::fs::write(&path, "[filters]\nPER = \"ner:people\"\n").unwrap();

        let config = Config::load_discovered(Ok(path.clone())).await.unwrap();
        assert_eq!(config.filters.field_for("PER"), Some("ner:people"));
        assert_eq!(config.source_path, Some(path));
    }

    #[tokio::test]
    async fn test_no_config_file_uses_defaults() {
        let config = Config::load_discovered(Err(prefer::Error::FileNotFound(
            CONFIG_NAME.to_string(),
        )))
        .await
        .unwrap();
        assert!(config.source_path.is_none());
        assert_eq!(config.filters.field_for("PER"), Some("ner:person"));
    }
}
