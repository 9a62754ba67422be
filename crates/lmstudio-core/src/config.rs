//! Configuration management for lmstudio.toml

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default LM Studio server address
pub const DEFAULT_BASE_URL: &str = "http://localhost:1234";

/// Environment variable overriding the server base URL
pub const ENV_BASE_URL: &str = "LMSTUDIO_API_BASE";

/// Environment variable overriding the request timeout (seconds)
pub const ENV_TIMEOUT: &str = "LMSTUDIO_TIMEOUT";

const CONFIG_FILE: &str = "lmstudio.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub defaults: DefaultsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub base_url: String,
    /// Whole-request timeout; unset means wait as long as the server takes
    pub timeout_secs: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DefaultsConfig {
    pub model: Option<String>,
    pub system: Option<String>,
}

impl Config {
    /// Load configuration from lmstudio.toml (if present) and the environment.
    ///
    /// Called once at process start; nothing re-reads it afterwards.
    pub fn load() -> Result<Self> {
        let base = match Self::find_config_path() {
            Ok(path) => Self::load_from(path)?,
            Err(_) => Self::default(),
        };
        base.with_env_overrides(|key| std::env::var(key).ok())
    }

    /// Load configuration from a specific path
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read {}", path.as_ref().display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.as_ref().display()))
    }

    /// Find lmstudio.toml by searching current directory and parents
    pub fn find_config_path() -> Result<PathBuf> {
        Self::find_config_path_from(std::env::current_dir()?)
    }

    /// Find lmstudio.toml starting from `start` and walking up
    pub fn find_config_path_from(start: impl Into<PathBuf>) -> Result<PathBuf> {
        let mut current = start.into();

        for _ in 0..10 {
            let candidate = current.join(CONFIG_FILE);
            if candidate.exists() {
                return Ok(candidate);
            }
            if !current.pop() {
                break;
            }
        }

        anyhow::bail!("{CONFIG_FILE} not found in current directory or parents")
    }

    /// Apply `LMSTUDIO_API_BASE` / `LMSTUDIO_TIMEOUT` on top of the file values.
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_BASE_URL).filter(|u| !u.trim().is_empty()) {
            self.server.base_url = url.trim().to_string();
        }

        if let Some(raw) = lookup(ENV_TIMEOUT).filter(|t| !t.trim().is_empty()) {
            let secs: u64 = raw
                .trim()
                .parse()
                .with_context(|| format!("{ENV_TIMEOUT} must be a whole number of seconds, got {raw:?}"))?;
            self.server.timeout_secs = Some(secs);
        }

        Ok(self)
    }

    /// Server base URL without a trailing slash
    pub fn base_url(&self) -> &str {
        self.server.base_url.trim_end_matches('/')
    }

    /// Request timeout, if one is configured
    pub fn timeout(&self) -> Option<Duration> {
        self.server.timeout_secs.map(Duration::from_secs)
    }
}
