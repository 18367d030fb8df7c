//! Read-only view of the dashboard for renderers.
//!
//! Renderers receive an owned [`DashboardSnapshot`] and never touch the
//! reconciler. Message truncation happens here, at render time, and nowhere
//! else.

pub mod chart;
pub mod format;
pub mod terminal;

use crate::query::Filter;
use crate::types::{AggregateStats, ConnectionState, EntrySource, Level, LogEntry};
use serde::Serialize;
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardSnapshot {
    /// Authoritative entries, newest first.
    pub entries: Vec<LogEntry>,
    pub stats: AggregateStats,
    pub connection: ConnectionState,
    pub source: EntrySource,
    /// Last `/logs` failure, cleared by the next success.
    pub logs_error: Option<String>,
    /// Last `/stats` failure, cleared by the next success.
    pub stats_error: Option<String>,
    pub live: bool,
    pub filter: Filter,
}

/// Header counters shown above the entry table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub total: usize,
    pub services: usize,
    pub errors: usize,
}

impl DashboardSnapshot {
    pub fn summary(&self) -> Summary {
        let services: HashSet<&str> = self.entries.iter().map(|e| e.service.as_str()).collect();
        Summary {
            total: self.entries.len(),
            services: services.len(),
            errors: self
                .entries
                .iter()
                .filter(|e| e.level == Level::Error)
                .count(),
        }
    }

    /// True when what is shown may be out of date.
    pub fn is_stale(&self) -> bool {
        self.logs_error.is_some() || self.stats_error.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_summary_counts() {
        let now = Utc::now();
        let snapshot = DashboardSnapshot {
            entries: vec![
                LogEntry::new(now, "auth", Level::Error, "denied"),
                LogEntry::new(now, "auth", Level::Info, "ok"),
                LogEntry::new(now, "billing", Level::Error, "declined"),
            ],
            stats: Vec::new(),
            connection: ConnectionState::Disconnected,
            source: EntrySource::Poll,
            logs_error: None,
            stats_error: None,
            live: true,
            filter: Filter::default(),
        };
        assert_eq!(
            snapshot.summary(),
            Summary {
                total: 3,
                services: 2,
                errors: 2
            }
        );
        assert!(!snapshot.is_stale());
    }
}
