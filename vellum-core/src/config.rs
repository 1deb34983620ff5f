//! Client configuration handling.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Error loading or parsing the client configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config from {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config from {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Retry policy for the request pipeline.
///
/// Applies to transport errors and non-401 HTTP failures; 401 handling has
/// its own single-refresh rule and ignores this policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Whether failed requests are redelivered at all.
    #[serde(default)]
    pub enabled: bool,

    /// Maximum number of redeliveries per request.
    #[serde(default = "default_retry_count")]
    pub count: u32,

    /// Fixed delay between redeliveries, in seconds.
    #[serde(default = "default_retry_delay_secs")]
    pub delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            count: default_retry_count(),
            delay_secs: default_retry_delay_secs(),
        }
    }
}

impl RetryConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.delay_secs)
    }
}

/// Configuration consumed by the client core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL the API paths are joined onto.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Base URL for static assets (cover images, avatars).
    #[serde(default = "default_static_base_url")]
    pub static_base_url: String,

    /// Per-request timeout, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            static_base_url: default_static_base_url(),
            timeout_secs: default_timeout_secs(),
            retry: RetryConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from the default location.
    ///
    /// Missing file yields the defaults; a present-but-invalid file is an
    /// error rather than a silent fallback.
    pub fn load() -> Result<Self, ConfigError> {
        let path = config_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from an explicit path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn config_path() -> PathBuf {
    project_dirs()
        .map(|d| d.config_dir().join("client.toml"))
        .unwrap_or_else(|| PathBuf::from("vellum-client.toml"))
}

/// Default directory for persisted client state.
pub fn default_data_dir() -> PathBuf {
    project_dirs()
        .map(|d| d.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".vellum"))
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "vellum-press", "vellum")
}

fn default_api_base_url() -> String {
    "http://localhost:3000/api/v1/web".to_string()
}

fn default_static_base_url() -> String {
    "http://localhost:3000/static".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_retry_count() -> u32 {
    3
}

fn default_retry_delay_secs() -> u64 {
    3
}
