use crate::constants::*;
use crate::error::{DashboardError, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backend: BackendConfig,
    pub poll: PollConfig,
    pub stream: StreamConfig,
    pub reconcile: ReconcileConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub api_url: String,
    pub ws_url: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            ws_url: DEFAULT_WS_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    pub logs_interval_ms: u64,
    pub stats_interval_ms: u64,
    pub request_timeout_ms: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            logs_interval_ms: DEFAULT_LOGS_INTERVAL_MS,
            stats_interval_ms: DEFAULT_STATS_INTERVAL_MS,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
        }
    }
}

impl PollConfig {
    pub fn logs_interval(&self) -> Duration {
        Duration::from_millis(self.logs_interval_ms)
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_millis(self.stats_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Open the push connection when live mode starts.
    pub enabled: bool,
    /// Reconnect on our own after a broken connection. When false, recovery
    /// requires toggling live mode off and on.
    pub auto_reconnect: bool,
    pub backoff_initial_ms: u64,
    pub backoff_max_ms: u64,
    pub backoff_multiplier: f64,
    pub max_attempts: Option<u32>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            auto_reconnect: true,
            backoff_initial_ms: DEFAULT_BACKOFF_INITIAL_MS,
            backoff_max_ms: DEFAULT_BACKOFF_MAX_MS,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            max_attempts: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Merge poll and stream histories by entry identity instead of arrival order.
    pub dedupe: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_HTTP_PORT,
        }
    }
}

impl Config {
    /// Load configuration from `path` (or `config.toml` when absent), then
    /// apply environment overrides and validate.
    ///
    /// A missing default file is not an error; a missing explicit file is.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_PATH);
                if default_path.exists() {
                    Self::from_file(default_path)?
                } else {
                    debug!("No {} found, using defaults", DEFAULT_CONFIG_PATH);
                    Config::default()
                }
            }
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        info!(
            api_url = %config.backend.api_url,
            ws_url = %config.backend.ws_url,
            "Configuration loaded"
        );
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            DashboardError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Apply `LOGSTREAM_*` overrides using the given lookup.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_API_URL) {
            self.backend.api_url = url;
        }
        if let Some(url) = lookup(ENV_WS_URL) {
            self.backend.ws_url = url;
        }
        if let Some(port) = lookup(ENV_HTTP_PORT) {
            self.server.port = port.parse().map_err(|_| {
                DashboardError::Config(format!("{} is not a valid port: {}", ENV_HTTP_PORT, port))
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let api = url::Url::parse(&self.backend.api_url)?;
        if !matches!(api.scheme(), "http" | "https") {
            return Err(DashboardError::Config(format!(
                "backend.api_url must be http(s), got '{}'",
                self.backend.api_url
            )));
        }
        let ws = url::Url::parse(&self.backend.ws_url)?;
        if !matches!(ws.scheme(), "ws" | "wss") {
            return Err(DashboardError::Config(format!(
                "backend.ws_url must be ws(s), got '{}'",
                self.backend.ws_url
            )));
        }
        if self.poll.logs_interval_ms == 0 || self.poll.stats_interval_ms == 0 {
            return Err(DashboardError::Config(
                "poll intervals must be greater than zero".to_string(),
            ));
        }
        if self.poll.request_timeout_ms == 0 {
            return Err(DashboardError::Config(
                "poll.request_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.stream.backoff_multiplier < 1.0 {
            return Err(DashboardError::Config(
                "stream.backoff_multiplier must be at least 1.0".to_string(),
            ));
        }
        if self.stream.backoff_initial_ms == 0
            || self.stream.backoff_max_ms < self.stream.backoff_initial_ms
        {
            return Err(DashboardError::Config(
                "stream backoff bounds are inconsistent".to_string(),
            ));
        }
        Ok(())
    }
}
