//! Metrics for the dashboard client.
//!
//! Recorded through the `metrics` facade; when [`init`] has installed the
//! Prometheus recorder they can be rendered in-process with [`render`].
//! Without a recorder every call is a no-op, which keeps tests quiet.

use std::fmt;
use std::sync::OnceLock;
use tracing::{info, warn};

/// All metric names used by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    // Poll channel
    PollSuccess,
    PollError,
    PollSkipped,
    PollStaleDiscarded,
    PollDuration,

    // Stream channel
    StreamBatches,
    StreamEntries,
    StreamMalformedFrames,
    StreamReconnectAttempts,
    StreamConnectionState,

    // Reconciler
    DisplayBufferLength,
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::PollSuccess => "logstream_poll_success_total",
            MetricName::PollError => "logstream_poll_error_total",
            MetricName::PollSkipped => "logstream_poll_skipped_total",
            MetricName::PollStaleDiscarded => "logstream_poll_stale_discarded_total",
            MetricName::PollDuration => "logstream_poll_duration_seconds",

            MetricName::StreamBatches => "logstream_stream_batches_total",
            MetricName::StreamEntries => "logstream_stream_entries_total",
            MetricName::StreamMalformedFrames => "logstream_stream_malformed_frames_total",
            MetricName::StreamReconnectAttempts => "logstream_stream_reconnect_attempts_total",
            MetricName::StreamConnectionState => "logstream_stream_connection_state",

            MetricName::DisplayBufferLength => "logstream_display_buffer_length",
        }
    }

    pub fn all_metrics() -> impl Iterator<Item = MetricName> {
        use MetricName::*;
        [
            PollSuccess,
            PollError,
            PollSkipped,
            PollStaleDiscarded,
            PollDuration,
            StreamBatches,
            StreamEntries,
            StreamMalformedFrames,
            StreamReconnectAttempts,
            StreamConnectionState,
            DisplayBufferLength,
        ]
        .into_iter()
    }

    pub fn description(&self) -> &'static str {
        match self {
            MetricName::PollSuccess => "Successful poll requests by endpoint",
            MetricName::PollError => "Failed poll requests by endpoint and error kind",
            MetricName::PollSkipped => "Poll ticks skipped because a request was still in flight",
            MetricName::PollStaleDiscarded => "Poll responses discarded after a filter change or pause",
            MetricName::PollDuration => "Poll request round-trip time",
            MetricName::StreamBatches => "Batches received from the push connection",
            MetricName::StreamEntries => "Entries received from the push connection",
            MetricName::StreamMalformedFrames => "Push frames dropped because they could not be decoded",
            MetricName::StreamReconnectAttempts => "Automatic reconnect attempts",
            MetricName::StreamConnectionState => "0 = disconnected, 1 = connecting, 2 = connected",
            MetricName::DisplayBufferLength => "Entries currently displayed",
        }
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

static HANDLE: OnceLock<metrics_exporter_prometheus::PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder and describe every metric. Idempotent.
pub fn init() {
    if HANDLE.get().is_some() {
        return;
    }
    match metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            if HANDLE.set(handle).is_err() {
                warn!("Metrics handle was already set");
            }
            describe_all();
            info!("Prometheus recorder installed");
        }
        Err(e) => warn!("Failed to install Prometheus recorder: {}", e),
    }
}

/// Render all metrics in Prometheus text format, if the recorder is installed.
pub fn render() -> Option<String> {
    HANDLE.get().map(|handle| handle.render())
}

fn describe_all() {
    use MetricName::*;
    for metric in MetricName::all_metrics() {
        match metric {
            PollDuration => ::metrics::describe_histogram!(
                metric.as_str(),
                ::metrics::Unit::Seconds,
                metric.description()
            ),
            StreamConnectionState | DisplayBufferLength => {
                ::metrics::describe_gauge!(metric.as_str(), metric.description())
            }
            _ => ::metrics::describe_counter!(metric.as_str(), metric.description()),
        }
    }
}

// ============================================================================
// Poll Channel Metrics
// ============================================================================

pub mod poll {
    use super::MetricName;

    pub fn success(endpoint: &'static str, secs: f64) {
        ::metrics::counter!(MetricName::PollSuccess.as_str(), "endpoint" => endpoint).increment(1);
        ::metrics::histogram!(MetricName::PollDuration.as_str(), "endpoint" => endpoint).record(secs);
    }

    pub fn error(endpoint: &'static str, kind: &'static str) {
        ::metrics::counter!(
            MetricName::PollError.as_str(),
            "endpoint" => endpoint,
            "kind" => kind
        )
        .increment(1);
    }

    pub fn skipped(endpoint: &'static str) {
        ::metrics::counter!(MetricName::PollSkipped.as_str(), "endpoint" => endpoint).increment(1);
    }

    pub fn stale_discarded(endpoint: &'static str) {
        ::metrics::counter!(MetricName::PollStaleDiscarded.as_str(), "endpoint" => endpoint)
            .increment(1);
    }
}

// ============================================================================
// Stream Channel Metrics
// ============================================================================

pub mod stream {
    use super::MetricName;
    use crate::types::ConnectionState;

    pub fn batch_received(entries: usize) {
        ::metrics::counter!(MetricName::StreamBatches.as_str()).increment(1);
        ::metrics::counter!(MetricName::StreamEntries.as_str()).increment(entries as u64);
    }

    pub fn malformed_frame() {
        ::metrics::counter!(MetricName::StreamMalformedFrames.as_str()).increment(1);
    }

    pub fn reconnect_attempt() {
        ::metrics::counter!(MetricName::StreamReconnectAttempts.as_str()).increment(1);
    }

    pub fn connection_state(state: ConnectionState) {
        let value = match state {
            ConnectionState::Disconnected => 0.0,
            ConnectionState::Connecting => 1.0,
            ConnectionState::Connected => 2.0,
        };
        ::metrics::gauge!(MetricName::StreamConnectionState.as_str()).set(value);
    }
}

// ============================================================================
// Reconciler Metrics
// ============================================================================

pub mod reconcile {
    use super::MetricName;

    pub fn buffer_length(len: usize) {
        ::metrics::gauge!(MetricName::DisplayBufferLength.as_str()).set(len as f64);
    }
}
