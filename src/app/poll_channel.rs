use crate::app::ports::LogQueryPort;
use crate::constants::{LOGS_ENDPOINT, STATS_ENDPOINT};
use crate::error::{DashboardError, Result};
use crate::observability::metrics;
use crate::query::QueryParameters;
use crate::types::{AggregateStats, LogEntry};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// A completed poll request, tagged with the epoch it was issued under.
#[derive(Debug)]
pub enum PollResult {
    Logs {
        epoch: u64,
        result: Result<Vec<LogEntry>>,
    },
    Stats {
        epoch: u64,
        result: Result<AggregateStats>,
    },
}

/// Marks an endpoint busy for as long as the guard lives.
struct InFlightGuard(Arc<AtomicBool>);

impl InFlightGuard {
    fn try_acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlightGuard(flag.clone()))
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Periodic request/response acquisition against the log-query service.
///
/// At most one request per endpoint is outstanding: a tick that finds its
/// endpoint busy is skipped, never queued. Every request is bounded by the
/// configured timeout, and a timeout counts as a failed request.
pub struct PollChannel {
    port: Arc<dyn LogQueryPort>,
    timeout: Duration,
    logs_in_flight: Arc<AtomicBool>,
    stats_in_flight: Arc<AtomicBool>,
}

impl PollChannel {
    pub fn new(port: Arc<dyn LogQueryPort>, timeout: Duration) -> Self {
        Self {
            port,
            timeout,
            logs_in_flight: Arc::new(AtomicBool::new(false)),
            stats_in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn logs_in_flight(&self) -> bool {
        self.logs_in_flight.load(Ordering::Acquire)
    }

    pub fn stats_in_flight(&self) -> bool {
        self.stats_in_flight.load(Ordering::Acquire)
    }

    /// Start a `/logs` request unless one is already outstanding.
    /// Returns false when the tick was skipped.
    pub fn try_spawn_logs(
        &self,
        epoch: u64,
        query: QueryParameters,
        tx: mpsc::UnboundedSender<PollResult>,
    ) -> bool {
        let Some(guard) = InFlightGuard::try_acquire(&self.logs_in_flight) else {
            debug!(endpoint = LOGS_ENDPOINT, "Previous request still in flight, skipping tick");
            metrics::poll::skipped(LOGS_ENDPOINT);
            return false;
        };
        let port = self.port.clone();
        let timeout = self.timeout;
        tokio::spawn(async move {
            let _guard = guard;
            let result = timed(LOGS_ENDPOINT, timeout, port.fetch_logs(&query)).await;
            let _ = tx.send(PollResult::Logs { epoch, result });
        });
        true
    }

    /// Start a `/stats` request unless one is already outstanding.
    pub fn try_spawn_stats(
        &self,
        epoch: u64,
        query: QueryParameters,
        tx: mpsc::UnboundedSender<PollResult>,
    ) -> bool {
        let Some(guard) = InFlightGuard::try_acquire(&self.stats_in_flight) else {
            debug!(endpoint = STATS_ENDPOINT, "Previous request still in flight, skipping tick");
            metrics::poll::skipped(STATS_ENDPOINT);
            return false;
        };
        let port = self.port.clone();
        let timeout = self.timeout;
        tokio::spawn(async move {
            let _guard = guard;
            let result = timed(STATS_ENDPOINT, timeout, port.fetch_stats(&query)).await;
            let _ = tx.send(PollResult::Stats { epoch, result });
        });
        true
    }

    /// One synchronous round trip to `/logs`, outside the schedule.
    pub async fn fetch_logs(&self, query: &QueryParameters) -> Result<Vec<LogEntry>> {
        timed(LOGS_ENDPOINT, self.timeout, self.port.fetch_logs(query)).await
    }

    /// One synchronous round trip to `/stats`, outside the schedule.
    pub async fn fetch_stats(&self, query: &QueryParameters) -> Result<AggregateStats> {
        timed(STATS_ENDPOINT, self.timeout, self.port.fetch_stats(query)).await
    }
}

async fn timed<T, F>(endpoint: &'static str, timeout: Duration, request: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let started = Instant::now();
    let result = match tokio::time::timeout(timeout, request).await {
        Ok(result) => result,
        Err(_) => Err(DashboardError::Timeout { endpoint }),
    };
    match &result {
        Ok(_) => metrics::poll::success(endpoint, started.elapsed().as_secs_f64()),
        Err(e) => {
            warn!(endpoint, error = %e, "Poll request failed");
            metrics::poll::error(endpoint, e.kind());
        }
    }
    result
}
