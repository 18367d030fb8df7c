use crate::error::Result;
use crate::query::QueryParameters;
use crate::types::{AggregateStats, LogEntry};
use async_trait::async_trait;

/// Request/response access to the external log-query service.
#[async_trait]
pub trait LogQueryPort: Send + Sync {
    /// `GET /logs`: matching entries, newest first.
    async fn fetch_logs(&self, query: &QueryParameters) -> Result<Vec<LogEntry>>;

    /// `GET /stats`: per-bucket counts for the volume chart.
    async fn fetch_stats(&self, query: &QueryParameters) -> Result<AggregateStats>;
}

/// Opens push connections to the log stream.
#[async_trait]
pub trait StreamConnectorPort: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn StreamSession>>;
}

/// One open push connection.
#[async_trait]
pub trait StreamSession: Send {
    /// Next frame from the server; `None` once the connection is gone.
    async fn next_frame(&mut self) -> Option<Result<StreamFrame>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamFrame {
    Text(String),
    Binary(Vec<u8>),
    /// Ping, pong and other frames with no payload for us.
    Control,
    Close,
}
