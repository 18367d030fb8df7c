//! Canonical query model shared by the poll and stream channels.
//!
//! A [`Filter`] is a plain value; [`build_query`] turns it into the wire
//! parameters of the `/logs` and `/stats` endpoints. Nothing here validates
//! input: absent (or blank) fields simply produce no parameter.

use crate::constants::DISPLAY_CAPACITY;
use crate::types::{Level, LogEntry};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<DateTime<Utc>>,
}

/// Active query constraints. `None` means "no constraint on that dimension".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Filter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<Level>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_range: Option<TimeRange>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.trim().is_empty())
}

impl Filter {
    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = Some(level);
        self
    }

    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    pub fn with_time_range(
        mut self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Self {
        self.time_range = Some(TimeRange { from, to });
        self
    }

    fn from_bound(&self) -> Option<DateTime<Utc>> {
        self.time_range.as_ref().and_then(|r| r.from)
    }

    fn to_bound(&self) -> Option<DateTime<Utc>> {
        self.time_range.as_ref().and_then(|r| r.to)
    }

    /// True when no dimension is constrained.
    pub fn is_unconstrained(&self) -> bool {
        non_empty(&self.service).is_none()
            && self.level.is_none()
            && non_empty(&self.search).is_none()
            && self.from_bound().is_none()
            && self.to_bound().is_none()
    }

    /// Client-side equivalent of the backend predicate: exact service and
    /// level, case-insensitive substring search on the message, inclusive
    /// time bounds.
    pub fn matches(&self, entry: &LogEntry) -> bool {
        if let Some(service) = non_empty(&self.service) {
            if entry.service != service {
                return false;
            }
        }
        if let Some(level) = self.level {
            // Unknown levels count as debug.
            if entry.level.rank() != level.rank() {
                return false;
            }
        }
        if let Some(search) = non_empty(&self.search) {
            if !entry
                .message
                .to_lowercase()
                .contains(&search.to_lowercase())
            {
                return false;
            }
        }
        if let Some(from) = self.from_bound() {
            if entry.timestamp < from {
                return false;
            }
        }
        if let Some(to) = self.to_bound() {
            if entry.timestamp > to {
                return false;
            }
        }
        true
    }
}

/// Ordered wire parameters for the query endpoints.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParameters {
    pairs: Vec<(&'static str, String)>,
}

impl QueryParameters {
    pub fn pairs(&self) -> &[(&'static str, String)] {
        &self.pairs
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn to_query_string(&self) -> String {
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        for (k, v) in &self.pairs {
            serializer.append_pair(k, v);
        }
        serializer.finish()
    }

    /// Replace the query of `url` with these parameters.
    pub fn apply_to(&self, url: &mut Url) {
        url.set_query(None);
        let mut query = url.query_pairs_mut();
        for (k, v) in &self.pairs {
            query.append_pair(k, v);
        }
    }
}

fn format_instant(instant: &DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Serialize a filter into query parameters. Pure and deterministic.
pub fn build_query(filter: &Filter) -> QueryParameters {
    let mut pairs = Vec::with_capacity(6);
    if let Some(service) = non_empty(&filter.service) {
        pairs.push(("service", service.to_string()));
    }
    if let Some(level) = filter.level {
        pairs.push(("level", level.as_str().to_string()));
    }
    if let Some(search) = non_empty(&filter.search) {
        pairs.push(("search", search.to_string()));
    }
    if let Some(from) = filter.from_bound() {
        pairs.push(("start_time", format_instant(&from)));
    }
    if let Some(to) = filter.to_bound() {
        pairs.push(("end_time", format_instant(&to)));
    }
    pairs.push(("limit", DISPLAY_CAPACITY.to_string()));
    QueryParameters { pairs }
}
