//! Configuration system (layered: defaults < config file < env).

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};

/// Default Intercom REST endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.intercom.io";

/// Message posted to a conversation when its AI session ends.
pub const DEFAULT_CLOSE_MESSAGE: &str = "Conversation was closed because dialog was finished";

/// Layered configuration for the bridge.
///
/// Resolution order (later wins):
/// 1. Built-in defaults
/// 2. TOML config file (`--config` or the platform config dir)
/// 3. Environment (`INTERCOM_APIKEY`, `INTERCOM_BASE_URL`, `.env` honoured)
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub base_url: String,
    pub access_token: Option<String>,
    pub watch: WatchConfig,
    pub session: SessionConfig,
    pub engine: EngineConfig,
}

/// Conversation listing poll settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WatchConfig {
    pub per_page: u32,
    pub poll_interval_ms: u64,
}

/// Per-conversation session settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SessionConfig {
    pub poll_interval_ms: u64,
    pub close_message: String,
}

/// Settings for the in-process engine used by the CLI.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EngineConfig {
    pub concurrency: usize,
    pub max_pending: usize,
    pub queue_timeout_secs: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            access_token: None,
            watch: WatchConfig::default(),
            session: SessionConfig::default(),
            engine: EngineConfig::default(),
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            per_page: 20,
            poll_interval_ms: 1000,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            close_message: DEFAULT_CLOSE_MESSAGE.to_string(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            concurrency: 10,
            max_pending: 100,
            queue_timeout_secs: 3600,
        }
    }
}

impl fmt::Debug for BridgeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeConfig")
            .field("base_url", &self.base_url)
            .field("access_token", &self.access_token.as_ref().map(|_| ".."))
            .field("watch", &self.watch)
            .field("session", &self.session)
            .field("engine", &self.engine)
            .finish()
    }
}

impl WatchConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl SessionConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl EngineConfig {
    pub fn queue_timeout(&self) -> Duration {
        Duration::from_secs(self.queue_timeout_secs)
    }
}

impl BridgeConfig {
    /// Create a config with defaults and the given token.
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: Some(access_token.into()),
            ..Self::default()
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Parse a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| BridgeError::Configuration(e.to_string()))
    }

    /// Read a TOML config file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            BridgeError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&text)
    }

    /// Platform config file location (`<config dir>/intercom-bridge/config.toml`).
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "intercom-bridge")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load the full layered configuration.
    ///
    /// An explicit `path` must exist; the default location is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let _ = dotenvy::dotenv(); // load .env if present, ignore error
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path().filter(|p| p.exists()) {
                Some(path) => Self::from_file(&path)?,
                None => Self::default(),
            },
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Overlay environment values using the given lookup.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(token) = lookup("INTERCOM_APIKEY").filter(|t| !t.is_empty()) {
            self.access_token = Some(token);
        }
        if let Some(url) = lookup("INTERCOM_BASE_URL").filter(|u| !u.is_empty()) {
            self.base_url = url;
        }
    }

    /// The access token, or a configuration error if none is set.
    pub fn require_token(&self) -> Result<&str> {
        self.access_token.as_deref().ok_or_else(|| {
            BridgeError::Configuration(
                "Intercom access token missing; set INTERCOM_APIKEY or access_token".into(),
            )
        })
    }
}
