//! Merge authority for the displayed entry set.
//!
//! The reconciler decides, at any instant, whether the display is sourced from
//! the streamed buffer or from the last successful poll, and keeps the
//! streamed buffer ordered and capped. It never filters and never mutates an
//! entry; it only reorders, drops and caps.
//!
//! Every poll request is tagged with the epoch it was issued under. The epoch
//! advances on each filter change and each live-mode toggle, so a response
//! that was requested under an older filter (or before a pause) is discarded.

use crate::constants::DISPLAY_CAPACITY;
use crate::error::DashboardError;
use crate::observability::metrics;
use crate::presentation::DashboardSnapshot;
use crate::query::Filter;
use crate::types::{AggregateStats, ConnectionState, EntryKey, EntrySource, LogEntry};
use std::collections::{HashSet, VecDeque};
use tracing::debug;

/// How streamed batches are merged into the streamed buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergeMode {
    /// Prepend each batch in delivery order and drop the oldest. No
    /// de-duplication; switching sources may visibly reset the display.
    #[default]
    Arrival,
    /// Seed from the last poll on the first batch after connecting, drop
    /// duplicate entries and keep the buffer sorted newest-first by timestamp.
    Dedupe,
}

/// Result of offering a poll response to the reconciler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Applied,
    /// The request failed; the previous result stays visible.
    Failed,
    /// Requested under an older epoch or while paused; ignored.
    Stale,
}

#[derive(Debug)]
pub struct Reconciler {
    mode: MergeMode,
    capacity: usize,
    live: bool,
    filter: Filter,
    epoch: u64,
    connection: ConnectionState,
    batch_since_connect: bool,
    streamed: VecDeque<LogEntry>,
    polled: Vec<LogEntry>,
    /// Epoch the current `polled` page was requested under.
    polled_epoch: Option<u64>,
    stats: AggregateStats,
    logs_error: Option<String>,
    stats_error: Option<String>,
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new(MergeMode::default())
    }
}

impl Reconciler {
    pub fn new(mode: MergeMode) -> Self {
        Self {
            mode,
            capacity: DISPLAY_CAPACITY,
            live: false,
            filter: Filter::default(),
            epoch: 0,
            connection: ConnectionState::Disconnected,
            batch_since_connect: false,
            streamed: VecDeque::with_capacity(DISPLAY_CAPACITY),
            polled: Vec::new(),
            polled_epoch: None,
            stats: AggregateStats::new(),
            logs_error: None,
            stats_error: None,
        }
    }

    pub fn filter(&self) -> &Filter {
        &self.filter
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn is_live(&self) -> bool {
        self.live
    }

    pub fn connection(&self) -> ConnectionState {
        self.connection
    }

    /// Replace the active filter. Returns the new epoch.
    ///
    /// Streamed entries were admitted under the old filter, so the streamed
    /// buffer is dropped and the poll result stays on screen until a response
    /// for the new filter arrives.
    pub fn set_filter(&mut self, filter: Filter) -> u64 {
        self.filter = filter;
        self.streamed.clear();
        self.batch_since_connect = false;
        self.advance_epoch()
    }

    /// Toggle live mode. Returns the new epoch.
    pub fn set_live(&mut self, live: bool) -> u64 {
        self.live = live;
        if !live {
            self.batch_since_connect = false;
        }
        self.advance_epoch()
    }

    fn advance_epoch(&mut self) -> u64 {
        self.epoch += 1;
        debug!(epoch = self.epoch, "Reconciler epoch advanced");
        self.epoch
    }

    /// Observe a connection state change from the stream channel.
    pub fn on_connection_state(&mut self, state: ConnectionState) {
        if state != self.connection {
            debug!(from = %self.connection, to = %state, "Stream connection state changed");
        }
        if state != ConnectionState::Connected || self.connection != ConnectionState::Connected {
            self.batch_since_connect = false;
        }
        self.connection = state;
    }

    /// True when the streamed buffer is the authoritative source.
    pub fn stream_is_authoritative(&self) -> bool {
        self.connection == ConnectionState::Connected && self.batch_since_connect
    }

    pub fn source(&self) -> EntrySource {
        if self.stream_is_authoritative() {
            EntrySource::Stream
        } else {
            EntrySource::Poll
        }
    }

    /// Merge a batch delivered by the stream channel. Returns whether the
    /// batch was accepted.
    ///
    /// Batches arriving while not connected are ignored, as are empty ones:
    /// an empty batch carries nothing to show and must not take the display
    /// away from the poll result.
    pub fn on_stream_batch(&mut self, batch: Vec<LogEntry>) -> bool {
        if self.connection != ConnectionState::Connected || batch.is_empty() {
            return false;
        }
        match self.mode {
            MergeMode::Arrival => {
                for entry in batch.into_iter().rev() {
                    self.streamed.push_front(entry);
                }
                self.streamed.truncate(self.capacity);
            }
            MergeMode::Dedupe => {
                let mut merged: Vec<LogEntry> = batch;
                merged.extend(self.streamed.drain(..));
                // First batch of a connection: fold in what was polled while
                // the stream was not authoritative, if it matches the filter.
                if !self.batch_since_connect && self.polled_epoch == Some(self.epoch) {
                    merged.extend(self.polled.iter().cloned());
                }
                let mut seen: HashSet<EntryKey> = HashSet::with_capacity(merged.len());
                merged.retain(|entry| seen.insert(entry.key()));
                merged.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
                merged.truncate(self.capacity);
                self.streamed = merged.into();
            }
        }
        self.batch_since_connect = true;
        metrics::reconcile::buffer_length(self.display_len());
        true
    }

    fn accepts(&self, epoch: u64) -> bool {
        self.live && epoch == self.epoch
    }

    /// Offer a `/logs` response requested under `epoch`.
    pub fn apply_poll_logs(
        &mut self,
        epoch: u64,
        result: Result<Vec<LogEntry>, DashboardError>,
    ) -> PollOutcome {
        if !self.accepts(epoch) {
            debug!(epoch, current = self.epoch, "Discarding stale logs response");
            return PollOutcome::Stale;
        }
        match result {
            Ok(mut entries) => {
                entries.truncate(self.capacity);
                self.polled = entries;
                self.polled_epoch = Some(epoch);
                self.logs_error = None;
                metrics::reconcile::buffer_length(self.display_len());
                PollOutcome::Applied
            }
            Err(e) => {
                self.logs_error = Some(e.to_string());
                PollOutcome::Failed
            }
        }
    }

    /// Offer a `/stats` response requested under `epoch`.
    pub fn apply_poll_stats(
        &mut self,
        epoch: u64,
        result: Result<AggregateStats, DashboardError>,
    ) -> PollOutcome {
        if !self.accepts(epoch) {
            debug!(epoch, current = self.epoch, "Discarding stale stats response");
            return PollOutcome::Stale;
        }
        match result {
            Ok(stats) => {
                self.stats = stats;
                self.stats_error = None;
                PollOutcome::Applied
            }
            Err(e) => {
                self.stats_error = Some(e.to_string());
                PollOutcome::Failed
            }
        }
    }

    fn display_len(&self) -> usize {
        if self.stream_is_authoritative() {
            self.streamed.len()
        } else {
            self.polled.len()
        }
    }

    /// The authoritative entry set, newest first.
    pub fn display(&self) -> Vec<LogEntry> {
        if self.stream_is_authoritative() {
            self.streamed.iter().cloned().collect()
        } else {
            self.polled.clone()
        }
    }

    pub fn snapshot(&self) -> DashboardSnapshot {
        DashboardSnapshot {
            entries: self.display(),
            stats: self.stats.clone(),
            connection: self.connection,
            source: self.source(),
            logs_error: self.logs_error.clone(),
            stats_error: self.stats_error.clone(),
            live: self.live,
            filter: self.filter.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Level, StatBucket};
    use chrono::{Duration, TimeZone, Utc};

    fn at(secs: i64) -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap() + Duration::seconds(secs)
    }

    fn entry(secs: i64, message: &str) -> LogEntry {
        LogEntry::new(at(secs), "svc-a", Level::Info, message)
    }

    fn live_reconciler(mode: MergeMode) -> Reconciler {
        let mut r = Reconciler::new(mode);
        r.set_live(true);
        r
    }

    fn connected(mode: MergeMode) -> Reconciler {
        let mut r = live_reconciler(mode);
        r.on_connection_state(ConnectionState::Connecting);
        r.on_connection_state(ConnectionState::Connected);
        r
    }

    fn messages(entries: &[LogEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.message.as_str()).collect()
    }

    #[test]
    fn test_poll_result_is_displayed_when_stream_disconnected() {
        let mut r = live_reconciler(MergeMode::Arrival);
        let oops = LogEntry::new(at(1), "svc-a", Level::Error, "oops");
        let epoch = r.epoch();

        assert_eq!(r.apply_poll_logs(epoch, Ok(vec![oops.clone()])), PollOutcome::Applied);
        assert_eq!(r.display(), vec![oops]);
        assert_eq!(r.source(), EntrySource::Poll);
    }

    #[test]
    fn test_newest_batch_is_prepended() {
        let mut r = connected(MergeMode::Arrival);
        assert!(r.on_stream_batch(vec![entry(1, "e1"), entry(2, "e2")]));
        assert!(r.on_stream_batch(vec![entry(3, "e3")]));

        let shown = r.display();
        assert_eq!(messages(&shown), vec!["e3", "e1", "e2"]);
        assert_eq!(r.source(), EntrySource::Stream);
    }

    #[test]
    fn test_full_buffer_drops_oldest_entries() {
        let mut r = connected(MergeMode::Arrival);
        let first: Vec<_> = (0..100).map(|i| entry(i, &format!("old-{i}"))).collect();
        r.on_stream_batch(first);
        assert_eq!(r.display().len(), 100);

        let fresh: Vec<_> = (0..5).map(|i| entry(1000 + i, &format!("new-{i}"))).collect();
        r.on_stream_batch(fresh);

        let shown = r.display();
        assert_eq!(shown.len(), 100);
        assert_eq!(
            messages(&shown[..5]),
            vec!["new-0", "new-1", "new-2", "new-3", "new-4"]
        );
        for i in 95..100 {
            let gone = format!("old-{i}");
            assert!(shown.iter().all(|e| e.message != gone));
        }
        assert_eq!(shown[99].message, "old-94");
    }

    #[test]
    fn test_stale_poll_response_after_filter_change_is_discarded() {
        let mut r = live_reconciler(MergeMode::Arrival);
        let before = r.epoch();
        r.apply_poll_logs(before, Ok(vec![entry(1, "initial")]));

        let f1_epoch = r.set_filter(Filter::default().with_service("svc-a"));
        let _f2_epoch = r.set_filter(Filter::default().with_service("svc-b"));

        let snapshot_before = r.snapshot();
        let outcome = r.apply_poll_logs(f1_epoch, Ok(vec![entry(2, "from-f1")]));
        assert_eq!(outcome, PollOutcome::Stale);
        assert_eq!(r.snapshot().entries, snapshot_before.entries);
        assert_eq!(messages(&r.display()), vec!["initial"]);
    }

    #[test]
    fn test_response_arriving_after_pause_is_discarded() {
        let mut r = live_reconciler(MergeMode::Arrival);
        let epoch = r.epoch();
        r.set_live(false);
        assert_eq!(r.apply_poll_logs(epoch, Ok(vec![entry(1, "late")])), PollOutcome::Stale);

        // Re-enabling does not resurrect the old request either.
        r.set_live(true);
        assert_eq!(r.apply_poll_logs(epoch, Ok(vec![entry(1, "late")])), PollOutcome::Stale);
        assert!(r.display().is_empty());
    }

    #[test]
    fn test_identical_poll_responses_are_idempotent() {
        let mut r = live_reconciler(MergeMode::Arrival);
        let epoch = r.epoch();
        let page = vec![entry(2, "b"), entry(1, "a")];
        r.apply_poll_logs(epoch, Ok(page.clone()));
        let first = serde_json::to_vec(&r.snapshot()).unwrap();
        r.apply_poll_logs(epoch, Ok(page));
        let second = serde_json::to_vec(&r.snapshot()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_stream_has_priority_over_concurrent_polls() {
        let mut r = connected(MergeMode::Arrival);
        r.on_stream_batch(vec![entry(5, "streamed")]);
        let epoch = r.epoch();
        r.apply_poll_logs(epoch, Ok(vec![entry(9, "polled")]));

        assert_eq!(r.source(), EntrySource::Stream);
        assert_eq!(messages(&r.display()), vec!["streamed"]);
    }

    #[test]
    fn test_connected_without_batch_still_uses_poll() {
        let mut r = connected(MergeMode::Arrival);
        let epoch = r.epoch();
        r.apply_poll_logs(epoch, Ok(vec![entry(1, "polled")]));
        assert!(!r.stream_is_authoritative());
        assert_eq!(messages(&r.display()), vec!["polled"]);
    }

    #[test]
    fn test_disconnect_falls_back_to_last_poll() {
        let mut r = connected(MergeMode::Arrival);
        let epoch = r.epoch();
        r.apply_poll_logs(epoch, Ok(vec![entry(1, "polled")]));
        r.on_stream_batch(vec![entry(2, "streamed")]);
        assert_eq!(r.source(), EntrySource::Stream);

        r.on_connection_state(ConnectionState::Disconnected);
        assert_eq!(r.source(), EntrySource::Poll);
        assert_eq!(messages(&r.display()), vec!["polled"]);

        // Reconnecting alone does not hand authority back.
        r.on_connection_state(ConnectionState::Connecting);
        r.on_connection_state(ConnectionState::Connected);
        assert_eq!(r.source(), EntrySource::Poll);
    }

    #[test]
    fn test_failed_poll_keeps_previous_result_and_flags_error() {
        let mut r = live_reconciler(MergeMode::Arrival);
        let epoch = r.epoch();
        r.apply_poll_logs(epoch, Ok(vec![entry(1, "good")]));

        let outcome = r.apply_poll_logs(
            epoch,
            Err(DashboardError::Status { endpoint: "logs", status: 500 }),
        );
        assert_eq!(outcome, PollOutcome::Failed);
        let snapshot = r.snapshot();
        assert_eq!(messages(&snapshot.entries), vec!["good"]);
        assert_eq!(snapshot.logs_error.as_deref(), Some("logs returned HTTP 500"));

        r.apply_poll_logs(epoch, Ok(vec![entry(2, "better")]));
        assert!(r.snapshot().logs_error.is_none());
    }

    #[test]
    fn test_oversized_poll_page_is_capped() {
        let mut r = live_reconciler(MergeMode::Arrival);
        let epoch = r.epoch();
        let page: Vec<_> = (0..150).map(|i| entry(i, "x")).collect();
        r.apply_poll_logs(epoch, Ok(page));
        assert_eq!(r.display().len(), DISPLAY_CAPACITY);
    }

    #[test]
    fn test_poll_order_is_passed_through_unsorted() {
        let mut r = live_reconciler(MergeMode::Arrival);
        let epoch = r.epoch();
        r.apply_poll_logs(epoch, Ok(vec![entry(1, "older-first"), entry(9, "newer-second")]));
        assert_eq!(messages(&r.display()), vec!["older-first", "newer-second"]);
    }

    #[test]
    fn test_empty_or_disconnected_batches_are_ignored() {
        let mut r = connected(MergeMode::Arrival);
        assert!(!r.on_stream_batch(vec![]));
        assert!(!r.stream_is_authoritative());

        let mut r = live_reconciler(MergeMode::Arrival);
        assert!(!r.on_stream_batch(vec![entry(1, "nobody home")]));
    }

    #[test]
    fn test_filter_change_resets_stream_authority() {
        let mut r = connected(MergeMode::Arrival);
        r.on_stream_batch(vec![entry(1, "old filter")]);
        r.set_filter(Filter::default().with_level(Level::Error));
        assert_eq!(r.source(), EntrySource::Poll);

        r.on_stream_batch(vec![entry(2, "new filter")]);
        assert_eq!(messages(&r.display()), vec!["new filter"]);
    }

    #[test]
    fn test_stats_failure_keeps_previous_buckets() {
        let mut r = live_reconciler(MergeMode::Arrival);
        let epoch = r.epoch();
        let buckets = vec![StatBucket { timestamp: at(0), count: 7 }];
        assert_eq!(r.apply_poll_stats(epoch, Ok(buckets.clone())), PollOutcome::Applied);
        r.apply_poll_stats(epoch, Err(DashboardError::Timeout { endpoint: "stats" }));

        let snapshot = r.snapshot();
        assert_eq!(snapshot.stats, buckets);
        assert!(snapshot.stats_error.is_some());
        assert!(snapshot.logs_error.is_none());
    }

    #[test]
    fn test_dedupe_mode_seeds_from_poll_and_orders_by_timestamp() {
        let mut r = connected(MergeMode::Dedupe);
        let epoch = r.epoch();
        r.apply_poll_logs(epoch, Ok(vec![entry(3, "c"), entry(1, "a")]));

        // "c" is already known from the poll; "b" is out of order.
        r.on_stream_batch(vec![entry(3, "c"), entry(2, "b"), entry(4, "d")]);

        assert_eq!(messages(&r.display()), vec!["d", "c", "b", "a"]);
    }

    #[test]
    fn test_dedupe_mode_respects_capacity() {
        let mut r = connected(MergeMode::Dedupe);
        r.on_stream_batch((0..80).map(|i| entry(i, "x")).collect());
        r.on_stream_batch((80..130).map(|i| entry(i, "x")).collect());

        let shown = r.display();
        assert_eq!(shown.len(), 100);
        assert_eq!(shown[0].timestamp, at(129));
        assert_eq!(shown[99].timestamp, at(30));
    }

    #[test]
    fn test_dedupe_mode_does_not_seed_from_previous_filter() {
        let mut r = connected(MergeMode::Dedupe);
        let epoch = r.set_filter(Filter::default().with_service("svc-a"));
        r.apply_poll_logs(epoch, Ok(vec![entry(1, "a-polled")]));

        r.set_filter(Filter::default().with_service("svc-b"));
        let b = LogEntry::new(at(2), "svc-b", Level::Info, "b-streamed");
        r.on_stream_batch(vec![b]);

        let shown = r.display();
        assert_eq!(messages(&shown), vec!["b-streamed"]);
        assert!(shown.iter().all(|e| r.filter().matches(e)));
    }

    #[test]
    fn test_dedupe_mode_reseeds_after_reconnect() {
        let mut r = connected(MergeMode::Dedupe);
        r.on_stream_batch(vec![entry(1, "first-conn")]);

        r.on_connection_state(ConnectionState::Disconnected);
        let epoch = r.epoch();
        r.apply_poll_logs(epoch, Ok(vec![entry(2, "polled-during-outage"), entry(1, "first-conn")]));

        r.on_connection_state(ConnectionState::Connecting);
        r.on_connection_state(ConnectionState::Connected);
        r.on_stream_batch(vec![entry(3, "second-conn")]);

        assert_eq!(
            messages(&r.display()),
            vec!["second-conn", "polled-during-outage", "first-conn"]
        );

        // Later batches on the same connection do not fold the poll page in again.
        let epoch = r.epoch();
        r.apply_poll_logs(epoch, Ok(vec![entry(0, "late-poll")]));
        r.on_stream_batch(vec![entry(4, "fourth")]);
        assert!(r.display().iter().all(|e| e.message != "late-poll"));
    }
}
