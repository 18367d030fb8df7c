/// Shared constants for the dashboard client.
/// Backend paths and defaults mirror the LogStream query service.

/// Maximum number of entries shown at once. Fixed, not user-configurable.
pub const DISPLAY_CAPACITY: usize = 100;

// Backend endpoints
pub const LOGS_PATH: &str = "/logs";
pub const STATS_PATH: &str = "/stats";

// Endpoint labels used in errors, logs and metrics
pub const LOGS_ENDPOINT: &str = "logs";
pub const STATS_ENDPOINT: &str = "stats";

pub const DEFAULT_API_URL: &str = "http://localhost:8081";
pub const DEFAULT_WS_URL: &str = "ws://localhost:8081/ws";
pub const DEFAULT_HTTP_PORT: u16 = 3000;
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

// Poll scheduling
pub const DEFAULT_LOGS_INTERVAL_MS: u64 = 2_000;
pub const DEFAULT_STATS_INTERVAL_MS: u64 = 5_000;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 8_000;

// Stream reconnection
pub const DEFAULT_BACKOFF_INITIAL_MS: u64 = 500;
pub const DEFAULT_BACKOFF_MAX_MS: u64 = 30_000;
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;
pub const BACKOFF_JITTER_RATIO: f64 = 0.2;

// Environment overrides
pub const ENV_API_URL: &str = "LOGSTREAM_API_URL";
pub const ENV_WS_URL: &str = "LOGSTREAM_WS_URL";
pub const ENV_HTTP_PORT: &str = "LOGSTREAM_HTTP_PORT";
