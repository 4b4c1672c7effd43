//! Site configuration for the documentation viewer.
//!
//! A site is described by a single TOML file: the document source, cache
//! sizing, retry policy and HTTP settings. Every table except `[source]` is
//! optional and falls back to defaults.
//!
//! ## Example Configuration File
//!
//! ```toml
//! [source]
//! type = "url"
//! base_url = "https://docs.example.com/md"
//!
//! [source.headers]
//! Authorization = "Bearer abc"
//!
//! [[source.documents]]
//! id = "intro"
//! title = "Introduction"
//! file = "intro.md"
//! tags = ["start"]
//!
//! [cache]
//! capacity = 50
//! storage_key = "markdown-docs-cache"
//!
//! [retry]
//! max_attempts = 3
//! base_delay_ms = 1000
//!
//! [http]
//! timeout_secs = 30
//! ```

use crate::persistent::DEFAULT_STORAGE_KEY;
use crate::retry::RetryConfig;
use crate::{DocumentSource, Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Default GitHub REST endpoint.
pub const GITHUB_API_BASE: &str = "https://api.github.com";

/// Complete configuration for one documentation site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Where documents come from.
    pub source: DocumentSource,
    /// Document cache settings.
    #[serde(default)]
    pub cache: CacheSettings,
    /// Retry policy for fetches.
    #[serde(default)]
    pub retry: RetryConfig,
    /// HTTP client settings.
    #[serde(default)]
    pub http: HttpSettings,
}

/// Document cache sizing and persistence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Maximum cached documents.
    pub capacity: usize,
    /// Key the cache snapshot is stored under.
    pub storage_key: String,
    /// Mirror the cache to durable storage.
    pub persist: bool,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            capacity: 50,
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            persist: true,
        }
    }
}

/// HTTP client settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// GitHub API base URL, overridable for GitHub Enterprise or tests.
    pub github_api_base: String,
    /// Optional User-Agent override.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            github_api_base: GITHUB_API_BASE.to_string(),
            user_agent: None,
        }
    }
}

impl SiteConfig {
    /// Configuration with default settings around `source`.
    #[must_use]
    pub fn new(source: DocumentSource) -> Self {
        Self {
            source,
            cache: CacheSettings::default(),
            retry: RetryConfig::default(),
            http: HttpSettings::default(),
        }
    }

    /// Read and parse a TOML configuration file.
    ///
    /// # Errors
    ///
    /// Returns an `INVALID_CONFIGURATION` error if the file cannot be read or
    /// parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            Error::invalid_config(format!("Failed to read config {}: {e}", path.display()))
                .with_original(e)
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse a TOML configuration string.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| {
            Error::invalid_config(format!("Failed to parse config: {e}")).with_original(e)
        })
    }

    /// Serialize to pretty TOML.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| Error::invalid_config(format!("Failed to serialize config: {e}")))
    }
}
