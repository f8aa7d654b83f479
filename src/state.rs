//! fuzz session's runtime state information
use std::collections::VecDeque;
use std::fmt::{self, Display, Formatter};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::actions::Action;
use crate::error::FuzzError;
use crate::events::{ErrorRecorded, EventPublisher, MessageSent, Publisher, ResultRecorded};
use crate::findings::{Alert, Findings};
use crate::history::{HistoryStore, InMemoryHistory};
use crate::messages::HttpResponse;
use crate::options::FuzzerOptions;
use crate::results::{FuzzResult, ResultTable};
use crate::statistics::Statistics;
use crate::{atomic_increment, atomic_load, atomic_store};

/// source label of the marker appended when the error threshold is reached
pub const MAX_ERRORS_SOURCE: &str = "fuzzer";

/// one entry of the session's error table
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ErrorRecord {
    /// id of the task the error belongs to; the baseline is task 0
    pub task_id: usize,

    /// what raised the error, i.e. a processor's name or the transport
    pub source: String,

    /// human readable description
    pub reason: String,
}

impl ErrorRecord {
    /// create a new error record
    #[must_use]
    pub fn new(task_id: usize, source: &str, reason: &str) -> Self {
        Self {
            task_id,
            source: source.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl Display for ErrorRecord {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "#{} [{}] {}", self.task_id, self.source, self.reason)
    }
}

/// bounded, append-only list of [`ErrorRecord`]s; the oldest record makes
/// room for a new one once full
#[derive(Clone, Debug, Default)]
struct ErrorTable {
    records: VecDeque<ErrorRecord>,
    capacity: usize,
}

impl ErrorTable {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            records: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    fn push(&mut self, record: ErrorRecord) {
        if self.records.len() >= self.capacity {
            self.records.pop_front();
        }

        self.records.push_back(record);
    }
}

/// fuzz session's current state
///
/// cheap to clone; every clone points at the same counters and tables, which is
/// how worker threads and [`TaskUtils`] share them
///
/// [`TaskUtils`]: crate::fuzzers::TaskUtils
#[derive(Clone, Debug)]
pub struct SharedState {
    messages_sent: Arc<AtomicUsize>,
    error_count: Arc<AtomicUsize>,
    tasks_done: Arc<AtomicUsize>,
    stopped: Arc<AtomicBool>,
    max_errors_allowed: Option<usize>,
    results: Arc<RwLock<ResultTable>>,
    errors: Arc<RwLock<ErrorTable>>,
    findings: Arc<RwLock<Findings>>,
    statistics: Arc<RwLock<Statistics>>,
    history: Arc<dyn HistoryStore>,
    publisher: Arc<RwLock<Publisher>>,
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new(&FuzzerOptions::default(), Arc::new(InMemoryHistory::new()))
    }
}

impl SharedState {
    /// create the state of a session configured by `options`, persisting the
    /// messages alerts are raised against into `history`
    ///
    /// # Examples
    ///
    /// ```
    /// # use std::sync::Arc;
    /// # use locfuzz::history::InMemoryHistory;
    /// # use locfuzz::options::FuzzerOptions;
    /// # use locfuzz::state::SharedState;
    /// let options = FuzzerOptions::default().with_max_errors_allowed(Some(2));
    /// let state = SharedState::new(&options, Arc::new(InMemoryHistory::new()));
    ///
    /// state.increase_error_count(1, "transport", "connection refused");
    /// assert!(!state.is_max_errors_reached());
    ///
    /// state.increase_error_count(2, "transport", "connection refused");
    /// assert!(state.is_max_errors_reached());
    ///
    /// // two errors plus the marker
    /// assert_eq!(state.errors().len(), 3);
    /// ```
    #[must_use]
    #[instrument(skip_all, level = "trace")]
    pub fn new(options: &FuzzerOptions, history: Arc<dyn HistoryStore>) -> Self {
        debug!(
            max_results = options.max_results(),
            max_error_records = options.max_error_records(),
            max_errors_allowed = ?options.max_errors_allowed(),
            "created new SharedState"
        );

        Self {
            messages_sent: Arc::new(AtomicUsize::new(0)),
            error_count: Arc::new(AtomicUsize::new(0)),
            tasks_done: Arc::new(AtomicUsize::new(0)),
            stopped: Arc::new(AtomicBool::new(false)),
            max_errors_allowed: options.max_errors_allowed(),
            results: Arc::new(RwLock::new(ResultTable::with_capacity(options.max_results()))),
            errors: Arc::new(RwLock::new(ErrorTable::with_capacity(
                options.max_error_records(),
            ))),
            findings: Arc::new(RwLock::new(Findings::default())),
            statistics: Arc::new(RwLock::new(Statistics::new())),
            history,
            publisher: Arc::new(RwLock::new(Publisher::new())),
        }
    }

    /// number of messages that made a successful round-trip
    #[must_use]
    pub fn messages_sent(&self) -> usize {
        atomic_load!(self.messages_sent)
    }

    /// number of errors raised so far
    #[must_use]
    pub fn error_count(&self) -> usize {
        atomic_load!(self.error_count)
    }

    /// number of tasks finished so far, whatever their outcome
    #[must_use]
    pub fn tasks_done(&self) -> usize {
        atomic_load!(self.tasks_done)
    }

    /// `true` once a stop was requested
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        atomic_load!(self.stopped)
    }

    /// request a cooperative stop; tasks observe it before their next attempt
    pub fn stop(&self) {
        atomic_store!(self.stopped, true);
    }

    /// `true` when the error count reached the configured maximum
    #[must_use]
    pub fn is_max_errors_reached(&self) -> bool {
        self.max_errors_allowed
            .map_or(false, |max| self.error_count() >= max)
    }

    /// a message made a successful round-trip
    #[instrument(skip(self, response), level = "trace")]
    pub(crate) fn message_sent(&self, task_id: usize, response: Option<&HttpResponse>) {
        atomic_increment!(self.messages_sent);

        if let Some(response) = response {
            if let Ok(mut guard) = self.statistics.write() {
                guard.update(response);
            }
        }

        self.publisher.notify(MessageSent { task_id });
    }

    /// a task finished; returns the number of tasks finished so far
    pub(crate) fn task_done(&self) -> usize {
        self.tasks_done.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// update the [`Statistics`] object with the given [`FuzzError`]
    pub(crate) fn update_from_error(&self, error: &FuzzError) {
        if let Ok(mut guard) = self.statistics.write() {
            guard.update_from_error(error);
        }
    }

    /// tally a post-send verdict
    pub(crate) fn update_actions(&self, action: Action) {
        if let Ok(mut guard) = self.statistics.write() {
            guard.update_actions(action);
        }
    }

    /// append a result to the result table
    #[instrument(skip_all, level = "trace")]
    pub fn record_result(&self, result: FuzzResult) {
        let task_id = result.task_id();
        let kind = result.kind().to_string();

        if let Ok(mut guard) = self.results.write() {
            if let Some(displaced) = guard.push(result) {
                debug!(
                    task_id = displaced.task_id(),
                    "result table is full; evicted oldest result"
                );
            }
        } else {
            warn!(%task_id, "result table lock is poisoned; result dropped");
            return;
        }

        self.publisher.notify(ResultRecorded { task_id, kind });
    }

    /// add an alert to the session's findings; returns `false` for a finding
    /// that was already known
    pub(crate) fn record_alert(&self, alert: Alert) -> bool {
        self.findings
            .write()
            .map_or(false, |mut guard| guard.record(alert))
    }

    /// append an error record without touching the error count
    #[instrument(skip(self), level = "trace")]
    pub fn record_error(&self, task_id: usize, source: &str, reason: &str) {
        if let Ok(mut guard) = self.errors.write() {
            guard.push(ErrorRecord::new(task_id, source, reason));
        }

        self.publisher.notify(ErrorRecorded {
            task_id,
            source: source.to_string(),
            reason: reason.to_string(),
        });
    }

    /// count an error and record it
    ///
    /// the error that brings the count to the configured maximum is followed by
    /// one "max errors reached" marker. The state never stops itself; callers
    /// check [`SharedState::is_max_errors_reached`].
    ///
    /// returns the new error count
    pub fn increase_error_count(&self, task_id: usize, source: &str, reason: &str) -> usize {
        let total = self.error_count.fetch_add(1, Ordering::SeqCst) + 1;

        self.record_error(task_id, source, reason);

        if self.max_errors_allowed == Some(total) {
            warn!(%total, "maximum number of errors reached");

            self.record_error(
                task_id,
                MAX_ERRORS_SOURCE,
                &format!("maximum number of errors reached ({total})"),
            );
        }

        total
    }

    /// snapshot of the result table
    #[must_use]
    pub fn results(&self) -> Arc<RwLock<ResultTable>> {
        self.results.clone()
    }

    /// snapshot of the error table, oldest first
    #[must_use]
    pub fn errors(&self) -> Vec<ErrorRecord> {
        self.errors
            .read()
            .map_or_else(|_| Vec::new(), |guard| guard.records.iter().cloned().collect())
    }

    /// snapshot of every alert raised so far
    #[must_use]
    pub fn findings(&self) -> Findings {
        self.findings
            .read()
            .map_or_else(|_| Findings::default(), |guard| guard.clone())
    }

    /// snapshot of the session's statistics
    #[must_use]
    pub fn stats(&self) -> Arc<RwLock<Statistics>> {
        self.statistics.clone()
    }

    /// the store messages with alerts are persisted into
    #[must_use]
    pub fn history(&self) -> Arc<dyn HistoryStore> {
        self.history.clone()
    }

    /// the session's event publisher
    #[must_use]
    pub fn events(&self) -> Arc<RwLock<Publisher>> {
        self.publisher.clone()
    }
}

impl Display for SharedState {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "SharedState::{{")?;
        writeln!(f, "  MessagesSent={}", self.messages_sent())?;
        writeln!(f, "  Errors={}", self.error_count())?;
        writeln!(f, "  TasksDone={}", self.tasks_done())?;
        writeln!(f, "  Stopped={}", self.is_stopped())?;

        if let Ok(guard) = self.statistics.read() {
            writeln!(f, "  Statistics={guard}")?;
        }

        writeln!(f, "}}")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::HttpMessage;
    use crate::results::RESULT;
    use crate::std_ext::ops::Len;

    /// the marker is appended exactly once, when the threshold is crossed
    #[test]
    fn max_errors_marker_appended_once() {
        let options = FuzzerOptions::default().with_max_errors_allowed(Some(2));
        let state = SharedState::new(&options, Arc::new(InMemoryHistory::new()));

        for task_id in 1..=4 {
            state.increase_error_count(task_id, "transport", "boom");
        }

        let markers = state
            .errors()
            .into_iter()
            .filter(|record| record.source == MAX_ERRORS_SOURCE)
            .count();

        assert_eq!(markers, 1);
        assert_eq!(state.error_count(), 4);
        assert!(state.is_max_errors_reached());
        assert!(!state.is_stopped());
    }

    /// no limit means the threshold is never reached
    #[test]
    fn unlimited_errors_never_reach_max() {
        let options = FuzzerOptions::default().with_max_errors_allowed(None);
        let state = SharedState::new(&options, Arc::new(InMemoryHistory::new()));

        for task_id in 1..=50 {
            state.increase_error_count(task_id, "transport", "boom");
        }

        assert!(!state.is_max_errors_reached());
        assert_eq!(state.errors().len(), 50);
    }

    /// the error table keeps the newest records once full
    #[test]
    fn error_table_is_bounded() {
        let options = FuzzerOptions::default()
            .with_max_error_records(3)
            .with_max_errors_allowed(None);
        let state = SharedState::new(&options, Arc::new(InMemoryHistory::new()));

        for task_id in 1..=5 {
            state.record_error(task_id, "transport", "boom");
        }

        let ids: Vec<_> = state.errors().iter().map(|record| record.task_id).collect();
        assert_eq!(ids, vec![3, 4, 5]);
        assert_eq!(state.error_count(), 0);
    }

    /// recorded results land in the result table and are announced
    #[test]
    fn record_result_notifies_listeners() -> Result<(), Box<dyn std::error::Error>> {
        let state = SharedState::default();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();

        state.events().subscribe(move |event: ResultRecorded| {
            assert_eq!(event.kind, RESULT);
            counter.fetch_add(event.task_id, Ordering::SeqCst);
        });

        state.record_result(FuzzResult::new(4, RESULT, HttpMessage::get("http://localhost/")?, Vec::new()));

        assert_eq!(seen.load(Ordering::SeqCst), 4);
        assert_eq!(state.results().read().map(|table| table.len()).unwrap_or(0), 1);
        Ok(())
    }

    /// duplicate findings are kept but reported as known
    #[test]
    fn record_alert_reports_duplicates() {
        let state = SharedState::default();
        let alert = Alert::new(crate::findings::Risk::Low, crate::findings::Confidence::Low, "finding");

        assert!(state.record_alert(alert.clone()));
        assert!(!state.record_alert(alert));
        assert_eq!(state.findings().unique_count(), 1);
    }

    /// clones share their counters
    #[test]
    fn clones_share_counters() {
        let state = SharedState::default();
        let clone = state.clone();

        clone.message_sent(1, None);
        clone.stop();

        assert_eq!(state.messages_sent(), 1);
        assert!(state.is_stopped());
    }
}
