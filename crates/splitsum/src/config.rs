//! Credential and endpoint resolution for the network backend.
//!
//! Settings are resolved in a fixed order: environment variable, then the
//! JSON config file, then nothing. A missing or malformed config file is
//! never fatal; resolution logs a warning and continues without it.
//!
//! The config file is a JSON object with two optional keys:
//!
//! ```json
//! { "apiKey": "sk-...", "baseURL": "https://example.com/v1" }
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

/// Environment variable holding the API credential.
pub const ENV_API_KEY: &str = "OPENAI_API_KEY";

/// Environment variable overriding the API endpoint.
pub const ENV_BASE_URL: &str = "SPLITSUM_BASE_URL";

/// Config file looked up in the working directory when none is given.
pub const DEFAULT_CONFIG_FILE: &str = "config.json";

/// Endpoint used when neither the environment nor the file sets one.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Contents of the JSON config file.
#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct FileConfig {
    #[serde(rename = "apiKey", default)]
    pub api_key: Option<String>,
    #[serde(rename = "baseURL", default)]
    pub base_url: Option<String>,
}

/// Resolved settings for the network backend.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackendConfig {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
}

impl BackendConfig {
    /// The configured endpoint, or [`DEFAULT_BASE_URL`].
    pub fn base_url(&self) -> &str {
        self.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL)
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Read and parse a config file.
pub fn load_file_config(path: &Path) -> Result<FileConfig, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Combine environment lookups with an optional file config.
///
/// `env` returns the value of an environment variable; empty values count
/// as unset. Environment values win over file values key by key.
pub fn resolve_config(
    env: impl Fn(&str) -> Option<String>,
    file: Option<&FileConfig>,
) -> BackendConfig {
    let non_empty = |v: Option<String>| v.filter(|s| !s.trim().is_empty());

    let api_key = non_empty(env(ENV_API_KEY))
        .or_else(|| non_empty(file.and_then(|f| f.api_key.clone())));
    let base_url = non_empty(env(ENV_BASE_URL))
        .or_else(|| non_empty(file.and_then(|f| f.base_url.clone())));

    debug!(
        "Resolved backend config: api_key={}, base_url={}",
        if api_key.is_some() { "set" } else { "unset" },
        base_url.as_deref().unwrap_or(DEFAULT_BASE_URL)
    );

    BackendConfig { api_key, base_url }
}

/// Resolve settings from `path` and `env`, degrading to environment-only
/// when the file cannot be loaded.
pub fn resolve_from_path(path: &Path, env: impl Fn(&str) -> Option<String>) -> BackendConfig {
    let file = match load_file_config(path) {
        Ok(file) => Some(file),
        Err(e) => {
            warn!("Could not load config ({e}); using default settings");
            None
        }
    };
    resolve_config(env, file.as_ref())
}

/// Resolve settings from `path` and the process environment.
pub fn resolve_from_env(path: &Path) -> BackendConfig {
    resolve_from_path(path, |key| std::env::var(key).ok())
}
