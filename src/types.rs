use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;

/// Severity of a log entry.
///
/// The set is closed, but the backend is free to send anything: values outside
/// it become `Unknown`, which is treated like `Debug` everywhere it matters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
    #[default]
    Unknown,
}

impl Level {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "debug" => Level::Debug,
            "info" => Level::Info,
            "warn" | "warning" => Level::Warn,
            "error" => Level::Error,
            _ => Level::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Unknown => "unknown",
        }
    }

    /// Ordering rank; `Unknown` ranks with `Debug`.
    pub fn rank(&self) -> u8 {
        match self {
            Level::Debug | Level::Unknown => 0,
            Level::Info => 1,
            Level::Warn => 2,
            Level::Error => 3,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Level {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Level {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.as_deref().map(Level::parse).unwrap_or_default())
    }
}

/// One ingested log record, exactly as a source delivered it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Time the originating service recorded the event (not arrival time).
    pub timestamp: DateTime<Utc>,
    pub service: String,
    #[serde(default)]
    pub level: Level,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, String>>,
}

impl LogEntry {
    pub fn new(
        timestamp: DateTime<Utc>,
        service: impl Into<String>,
        level: Level,
        message: impl Into<String>,
    ) -> Self {
        Self {
            timestamp,
            service: service.into(),
            level,
            message: message.into(),
            metadata: None,
        }
    }

    /// Stable identity used when de-duplicating across sources.
    pub fn key(&self) -> EntryKey {
        EntryKey {
            timestamp: self.timestamp,
            service: self.service.clone(),
            level: self.level,
            message: self.message.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntryKey {
    pub timestamp: DateTime<Utc>,
    pub service: String,
    pub level: Level,
    pub message: String,
}

/// One fixed-width time bucket of the volume chart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatBucket {
    pub timestamp: DateTime<Utc>,
    pub count: u64,
}

pub type AggregateStats = Vec<StatBucket>;

/// Lifecycle of the push connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        };
        f.write_str(s)
    }
}

/// Which acquisition channel the displayed entries came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntrySource {
    Poll,
    Stream,
}
