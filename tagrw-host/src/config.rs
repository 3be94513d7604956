//! Session configuration
//!
//! A single JSON file; every field has a default, so an empty object (or
//! no file at all) gives a working setup.
//!
//! ```json
//! {
//!   "permission_topic": "nfc",
//!   "default_text_encoding": "utf-8",
//!   "event_buffer": 100,
//!   "cache": { "version": "v1" }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Error type for configuration files
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to access config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Assets cached on install
pub const DEFAULT_MANIFEST: &[&str] = &[
    "/",
    "/index.html",
    "/assets/favicon.ico",
    "/script.js",
    "/styles.css",
    "/assets/close.svg",
    "/assets/logo.svg",
    "/assets/logo-text.svg",
    "/assets/guide.png",
    "/manifest.webmanifest",
    "/assets/splash/manifest-icon-192.png",
    "/assets/splash/manifest-icon-512.png",
];

/// URL fragments that are never cached (analytics and web fonts)
pub const DEFAULT_BYPASS_PATTERNS: &[&str] = &[
    "__",
    "googletagmanager",
    "google-analytics",
    "fonts.gstatic.com",
];

pub const DEFAULT_CACHE_VERSION: &str = "v1";

/// Offline asset cache settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Name of the current cache store; other stores are purged on activate
    pub version: String,
    pub manifest: Vec<String>,
    /// Substrings that exclude a URL from caching
    pub bypass_patterns: Vec<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            version: DEFAULT_CACHE_VERSION.to_string(),
            manifest: DEFAULT_MANIFEST.iter().map(|s| s.to_string()).collect(),
            bypass_patterns: DEFAULT_BYPASS_PATTERNS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl CacheConfig {
    pub fn is_bypassed(&self, url: &str) -> bool {
        self.bypass_patterns.iter().any(|p| url.contains(p.as_str()))
    }
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Host permission topic to query
    pub permission_topic: String,

    /// Encoding label used when a text record carries none
    pub default_text_encoding: String,

    /// Capacity of the driver inbox
    pub event_buffer: usize,

    pub cache: CacheConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            permission_topic: tagrw_api::DEFAULT_PERMISSION_TOPIC.to_string(),
            default_text_encoding: "utf-8".to_string(),
            event_buffer: 100,
            cache: CacheConfig::default(),
        }
    }
}

impl SessionConfig {
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder::new()
    }

    /// Read a config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = serde_json::from_reader(BufReader::new(file)).map_err(|source| {
            ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            }
        })?;
        tracing::debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    /// Read `path` if given and present, defaults otherwise
    ///
    /// A missing file is not an error; a malformed one is.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) if path.exists() => Self::load(path),
            Some(path) => {
                tracing::debug!(path = %path.display(), "No config file, using defaults");
                Ok(Self::default())
            }
            None => Ok(Self::default()),
        }
    }

    /// Write the config as pretty JSON, creating parent directories
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let file = File::create(path).map_err(io_err)?;
        self.write_pretty(file, path)
    }

    // The final flush is where a full disk shows up
    fn write_pretty<W: Write>(&self, writer: W, path: &Path) -> Result<(), ConfigError> {
        let mut writer = BufWriter::new(writer);
        serde_json::to_writer_pretty(&mut writer, self).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        writer.flush().map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// `<config dir>/<app_name>/config.json`
    pub fn default_path(app_name: &str) -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(app_name)
            .join("config.json")
    }
}

/// Builder for [`SessionConfig`]
#[derive(Debug, Default)]
pub struct SessionConfigBuilder {
    config: SessionConfig,
}

impl SessionConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn permission_topic(mut self, topic: impl Into<String>) -> Self {
        self.config.permission_topic = topic.into();
        self
    }

    pub fn default_text_encoding(mut self, label: impl Into<String>) -> Self {
        self.config.default_text_encoding = label.into();
        self
    }

    pub fn event_buffer(mut self, capacity: usize) -> Self {
        self.config.event_buffer = capacity;
        self
    }

    pub fn cache_version(mut self, version: impl Into<String>) -> Self {
        self.config.cache.version = version.into();
        self
    }

    pub fn manifest<I, S>(mut self, urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.cache.manifest = urls.into_iter().map(Into::into).collect();
        self
    }

    pub fn bypass_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.config.cache.bypass_patterns.push(pattern.into());
        self
    }

    pub fn build(self) -> SessionConfig {
        self.config
    }
}
