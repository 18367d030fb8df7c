//! Single event loop that owns all mutable dashboard state.
//!
//! Poll results, stream events, timer ticks and user commands all arrive on
//! one task, so the reconciler is mutated from exactly one place and needs no
//! lock. Readers get owned snapshots through a `watch` channel.

use crate::app::poll_channel::{PollChannel, PollResult};
use crate::app::ports::{LogQueryPort, StreamConnectorPort};
use crate::app::reconciler::{MergeMode, PollOutcome, Reconciler};
use crate::app::stream_channel::{ReconnectPolicy, StreamChannel, StreamEvent, StreamEventKind};
use crate::config::Config;
use crate::constants::{LOGS_ENDPOINT, STATS_ENDPOINT};
use crate::error::{DashboardError, Result};
use crate::observability::metrics;
use crate::presentation::DashboardSnapshot;
use crate::query::{build_query, Filter};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info};

#[derive(Debug)]
enum Command {
    SetFilter(Filter),
    SetLive(bool),
    Snapshot(oneshot::Sender<DashboardSnapshot>),
    Shutdown,
}

/// Cloneable front door to a running dashboard.
#[derive(Clone)]
pub struct DashboardHandle {
    commands: mpsc::UnboundedSender<Command>,
    snapshots: watch::Receiver<DashboardSnapshot>,
}

impl DashboardHandle {
    /// Replace the active filter; both channels use it from their next request.
    pub fn set_filter(&self, filter: Filter) -> Result<()> {
        self.send(Command::SetFilter(filter))
    }

    /// Turn live mode on or off. Off stops polling and closes the stream.
    pub fn set_live(&self, live: bool) -> Result<()> {
        self.send(Command::SetLive(live))
    }

    /// Current state, read through the event loop.
    pub async fn snapshot(&self) -> Result<DashboardSnapshot> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Snapshot(tx))?;
        rx.await.map_err(|_| DashboardError::Closed)
    }

    /// Latest published snapshot without a round trip.
    pub fn latest(&self) -> DashboardSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<DashboardSnapshot> {
        self.snapshots.clone()
    }

    pub fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown);
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands.send(command).map_err(|_| DashboardError::Closed)
    }
}

pub struct Dashboard {
    reconciler: Reconciler,
    poll: PollChannel,
    stream: StreamChannel,
    logs_interval: Duration,
    stats_interval: Duration,
    stream_enabled: bool,
}

impl Dashboard {
    pub fn new(
        config: &Config,
        query_port: Arc<dyn LogQueryPort>,
        connector: Arc<dyn StreamConnectorPort>,
    ) -> Self {
        let mode = if config.reconcile.dedupe {
            MergeMode::Dedupe
        } else {
            MergeMode::Arrival
        };
        Self {
            reconciler: Reconciler::new(mode),
            poll: PollChannel::new(query_port, config.poll.request_timeout()),
            stream: StreamChannel::new(connector, ReconnectPolicy::from_config(&config.stream)),
            logs_interval: config.poll.logs_interval(),
            stats_interval: config.poll.stats_interval(),
            stream_enabled: config.stream.enabled,
        }
    }

    /// Start the event loop with the given initial filter and live mode.
    pub fn spawn(mut self, filter: Filter, live: bool) -> (DashboardHandle, JoinHandle<()>) {
        self.reconciler.set_filter(filter);
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(self.reconciler.snapshot());
        let task = tokio::spawn(self.run(live, command_rx, snapshot_tx));
        let handle = DashboardHandle {
            commands: command_tx,
            snapshots: snapshot_rx,
        };
        (handle, task)
    }

    async fn run(
        mut self,
        live: bool,
        mut commands: mpsc::UnboundedReceiver<Command>,
        snapshots: watch::Sender<DashboardSnapshot>,
    ) {
        let (poll_tx, mut poll_rx) = mpsc::unbounded_channel::<PollResult>();
        let (stream_tx, mut stream_rx) = mpsc::unbounded_channel::<StreamEvent>();

        let mut logs_tick = time::interval(self.logs_interval);
        logs_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut stats_tick = time::interval(self.stats_interval);
        stats_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        if live {
            self.go_live(&stream_tx);
        }
        info!(live, "Dashboard event loop started");

        loop {
            tokio::select! {
                _ = logs_tick.tick() => self.poll_logs(&poll_tx),
                _ = stats_tick.tick() => self.poll_stats(&poll_tx),
                Some(result) = poll_rx.recv() => self.apply_poll(result),
                Some(event) = stream_rx.recv() => self.apply_stream(event),
                command = commands.recv() => match command {
                    Some(Command::SetFilter(filter)) => {
                        info!(?filter, "Filter changed");
                        self.reconciler.set_filter(filter);
                        self.poll_logs(&poll_tx);
                        self.poll_stats(&poll_tx);
                    }
                    Some(Command::SetLive(true)) => {
                        if !self.reconciler.is_live() {
                            self.go_live(&stream_tx);
                            self.poll_logs(&poll_tx);
                            self.poll_stats(&poll_tx);
                        }
                    }
                    Some(Command::SetLive(false)) => self.pause(),
                    Some(Command::Snapshot(reply)) => {
                        let _ = reply.send(self.reconciler.snapshot());
                    }
                    Some(Command::Shutdown) | None => break,
                },
            }

            let next = self.reconciler.snapshot();
            snapshots.send_if_modified(|current| {
                if *current == next {
                    false
                } else {
                    *current = next;
                    true
                }
            });
        }

        self.stream.stop();
        info!("Dashboard event loop stopped");
    }

    fn go_live(&mut self, stream_tx: &mpsc::UnboundedSender<StreamEvent>) {
        self.reconciler.set_live(true);
        if self.stream_enabled {
            self.stream.start(stream_tx.clone());
        }
        info!("Live mode on");
    }

    fn pause(&mut self) {
        self.reconciler.set_live(false);
        if let Some(state) = self.stream.stop() {
            self.reconciler.on_connection_state(state);
        }
        info!("Live mode off");
    }

    fn poll_logs(&mut self, tx: &mpsc::UnboundedSender<PollResult>) {
        if !self.reconciler.is_live() {
            return;
        }
        if self.reconciler.stream_is_authoritative() {
            debug!(endpoint = LOGS_ENDPOINT, "Polling suspended while streaming");
            return;
        }
        let query = build_query(self.reconciler.filter());
        self.poll.try_spawn_logs(self.reconciler.epoch(), query, tx.clone());
    }

    fn poll_stats(&mut self, tx: &mpsc::UnboundedSender<PollResult>) {
        if !self.reconciler.is_live() || self.reconciler.stream_is_authoritative() {
            return;
        }
        let query = build_query(self.reconciler.filter());
        self.poll.try_spawn_stats(self.reconciler.epoch(), query, tx.clone());
    }

    fn apply_poll(&mut self, result: PollResult) {
        let (endpoint, outcome) = match result {
            PollResult::Logs { epoch, result } => {
                (LOGS_ENDPOINT, self.reconciler.apply_poll_logs(epoch, result))
            }
            PollResult::Stats { epoch, result } => {
                (STATS_ENDPOINT, self.reconciler.apply_poll_stats(epoch, result))
            }
        };
        if outcome == PollOutcome::Stale {
            metrics::poll::stale_discarded(endpoint);
        }
    }

    fn apply_stream(&mut self, event: StreamEvent) {
        match self.stream.observe(event) {
            Some(StreamEventKind::State(state)) => self.reconciler.on_connection_state(state),
            Some(StreamEventKind::Batch(batch)) => {
                // The push feed is unfiltered; admit only what the active filter matches.
                let filter = self.reconciler.filter();
                let admitted: Vec<_> = batch.into_iter().filter(|e| filter.matches(e)).collect();
                self.reconciler.on_stream_batch(admitted);
            }
            None => {}
        }
    }
}
