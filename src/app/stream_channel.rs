//! Push-based acquisition of newly ingested entries.
//!
//! [`StreamChannel`] owns the connection state machine:
//!
//! ```text
//! disconnected -> connecting -> connected
//! connecting | connected -> disconnected
//! ```
//!
//! Each start spawns a session task that connects, decodes frames into
//! batches and reports state changes over a channel. Events carry the session
//! id, so anything still queued from a stopped session is ignored. Batches are
//! forwarded in the order the backend emitted them. A frame that cannot be
//! decoded is logged and dropped without closing the connection.

use crate::app::ports::{StreamConnectorPort, StreamFrame, StreamSession};
use crate::config::StreamConfig;
use crate::constants::BACKOFF_JITTER_RATIO;
use crate::error::Result;
use crate::observability::metrics;
use crate::types::{ConnectionState, LogEntry};
use rand::Rng;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Bounded exponential backoff for automatic reconnects.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    pub enabled: bool,
    pub initial: Duration,
    pub max: Duration,
    pub multiplier: f64,
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::from_config(&StreamConfig::default())
    }
}

impl ReconnectPolicy {
    pub fn from_config(config: &StreamConfig) -> Self {
        Self {
            enabled: config.auto_reconnect,
            initial: Duration::from_millis(config.backoff_initial_ms),
            max: Duration::from_millis(config.backoff_max_ms),
            multiplier: config.backoff_multiplier,
            max_attempts: config.max_attempts,
        }
    }

    /// Only reconnect when the user re-enables live mode.
    pub fn manual() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Whether reconnect attempt number `attempt` (1-based) may run.
    pub fn allows(&self, attempt: u32) -> bool {
        self.enabled && self.max_attempts.map_or(true, |max| attempt <= max)
    }

    /// Delay before attempt `attempt` (1-based), without jitter.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let millis = self.initial.as_millis() as f64 * self.multiplier.powi(exponent);
        let capped = millis.min(self.max.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }

    /// Delay with up to 20% random jitter added, still capped at `max`.
    pub fn delay_with_jitter<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let base = self.base_delay(attempt);
        let jitter = base.mul_f64(rng.gen_range(0.0..=BACKOFF_JITTER_RATIO));
        (base + jitter).min(self.max)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StreamEventKind {
    State(ConnectionState),
    Batch(Vec<LogEntry>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct StreamEvent {
    pub session: u64,
    pub kind: StreamEventKind,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Payload {
    Batch(Vec<LogEntry>),
    Single(LogEntry),
}

/// Decode one frame into a batch. `Ok(None)` for frames that carry no
/// entries; `Err` for payloads that are not entry JSON.
pub fn decode_frame(frame: &StreamFrame) -> Result<Option<Vec<LogEntry>>> {
    let payload: Payload = match frame {
        StreamFrame::Text(text) => serde_json::from_str(text)?,
        StreamFrame::Binary(bytes) => serde_json::from_slice(bytes)?,
        StreamFrame::Control | StreamFrame::Close => return Ok(None),
    };
    Ok(Some(match payload {
        Payload::Batch(entries) => entries,
        Payload::Single(entry) => vec![entry],
    }))
}

pub struct StreamChannel {
    connector: Arc<dyn StreamConnectorPort>,
    policy: ReconnectPolicy,
    state: ConnectionState,
    session: u64,
    task: Option<JoinHandle<()>>,
}

impl StreamChannel {
    pub fn new(connector: Arc<dyn StreamConnectorPort>, policy: ReconnectPolicy) -> Self {
        Self {
            connector,
            policy,
            state: ConnectionState::Disconnected,
            session: 0,
            task: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Open a new session, replacing any existing one.
    pub fn start(&mut self, tx: mpsc::UnboundedSender<StreamEvent>) {
        self.stop();
        self.session += 1;
        let session = self.session;
        info!(session, "Starting stream session");
        let connector = self.connector.clone();
        let policy = self.policy.clone();
        self.task = Some(tokio::spawn(run_session(connector, policy, session, tx)));
    }

    /// Close the current session. Returns the new state if it changed.
    pub fn stop(&mut self) -> Option<ConnectionState> {
        if let Some(task) = self.task.take() {
            task.abort();
            debug!(session = self.session, "Stream session stopped");
        }
        self.session += 1;
        self.transition(ConnectionState::Disconnected)
    }

    /// Apply an event from a session task. Returns `None` for events from a
    /// superseded session and for state reports that change nothing.
    pub fn observe(&mut self, event: StreamEvent) -> Option<StreamEventKind> {
        if event.session != self.session {
            debug!(session = event.session, current = self.session, "Ignoring stale stream event");
            return None;
        }
        match event.kind {
            StreamEventKind::State(state) => self.transition(state).map(StreamEventKind::State),
            StreamEventKind::Batch(batch) => {
                if self.state != ConnectionState::Connected {
                    return None;
                }
                Some(StreamEventKind::Batch(batch))
            }
        }
    }

    fn transition(&mut self, next: ConnectionState) -> Option<ConnectionState> {
        if next == self.state {
            return None;
        }
        self.state = next;
        metrics::stream::connection_state(next);
        Some(next)
    }
}

impl Drop for StreamChannel {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn run_session(
    connector: Arc<dyn StreamConnectorPort>,
    policy: ReconnectPolicy,
    session: u64,
    tx: mpsc::UnboundedSender<StreamEvent>,
) {
    let emit = |kind: StreamEventKind| tx.send(StreamEvent { session, kind }).is_ok();
    let mut attempt: u32 = 0;

    loop {
        if !emit(StreamEventKind::State(ConnectionState::Connecting)) {
            return;
        }
        match connector.connect().await {
            Ok(mut conn) => {
                attempt = 0;
                info!(session, "Stream connected");
                if !emit(StreamEventKind::State(ConnectionState::Connected)) {
                    return;
                }
                if !pump_frames(conn.as_mut(), &emit).await {
                    return;
                }
                info!(session, "Stream connection closed");
            }
            Err(e) => warn!(session, error = %e, "Stream connect failed"),
        }

        if !emit(StreamEventKind::State(ConnectionState::Disconnected)) {
            return;
        }

        attempt += 1;
        if !policy.allows(attempt) {
            if policy.enabled {
                warn!(session, attempts = attempt - 1, "Giving up on stream reconnects");
            }
            return;
        }
        let delay = policy.delay_with_jitter(attempt, &mut rand::thread_rng());
        metrics::stream::reconnect_attempt();
        info!(session, attempt, delay_ms = delay.as_millis() as u64, "Reconnecting stream");
        tokio::time::sleep(delay).await;
    }
}

/// Forward decoded batches until the connection ends. Returns false when the
/// receiving side is gone.
async fn pump_frames<F>(conn: &mut dyn StreamSession, emit: &F) -> bool
where
    F: Fn(StreamEventKind) -> bool,
{
    while let Some(frame) = conn.next_frame().await {
        let frame = match frame {
            Ok(StreamFrame::Close) => break,
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "Stream read failed");
                break;
            }
        };
        match decode_frame(&frame) {
            Ok(Some(batch)) => {
                metrics::stream::batch_received(batch.len());
                debug!(entries = batch.len(), "Stream batch received");
                if !emit(StreamEventKind::Batch(batch)) {
                    return false;
                }
            }
            Ok(None) => {}
            Err(e) => {
                warn!(error = %e, "Dropping malformed stream frame");
                metrics::stream::malformed_frame();
            }
        }
    }
    true
}
