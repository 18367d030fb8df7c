use thiserror::Error;

#[derive(Error, Debug)]
pub enum DashboardError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{endpoint} returned HTTP {status}")]
    Status { endpoint: &'static str, status: u16 },

    #[error("{endpoint} request timed out")]
    Timeout { endpoint: &'static str },

    #[error("Invalid alert rule: {0}")]
    InvalidAlert(String),

    #[error("Dashboard event loop has shut down")]
    Closed,
}

impl DashboardError {
    /// Short label used for metrics and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            DashboardError::Http(_) => "http",
            DashboardError::Json(_) => "malformed",
            DashboardError::Toml(_) => "toml",
            DashboardError::Io(_) => "io",
            DashboardError::Url(_) => "url",
            DashboardError::WebSocket(_) => "websocket",
            DashboardError::Config(_) => "config",
            DashboardError::Status { .. } => "status",
            DashboardError::Timeout { .. } => "timeout",
            DashboardError::InvalidAlert(_) => "alert",
            DashboardError::Closed => "closed",
        }
    }
}

pub type Result<T> = std::result::Result<T, DashboardError>;
