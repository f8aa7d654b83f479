use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, OnceLock, PoisonError, RwLock};
use std::thread;
use std::time::Duration;

use regex::Regex;
use tracing::{debug, error, info, instrument, warn};

use super::typestate::{NoLocations, NoMessage, NoSender};
use super::{FuzzerBuilder, FuzzerState, FuzzerTask, TaskUtils, BASELINE_TASK_ID, SENDER_SOURCE};
use crate::actions::Action;
use crate::client::HttpSender;
use crate::error::FuzzError;
use crate::events::{EventPublisher, FuzzerCompleted, FuzzerStarted, Publisher};
use crate::findings::Alert;
use crate::locations::Replacer;
use crate::messages::HttpMessage;
use crate::options::FuzzerOptions;
use crate::payloads::Payload;
use crate::processors::ProcessorChain;
use crate::results::{FuzzResult, SearchMatch, ORIGINAL_MESSAGE};
use crate::state::{ErrorRecord, SharedState};
use crate::statistics::Statistics;

/// upper bound on one wait of the dispatch loop for a task to finish when too many are live
const BACKPRESSURE_WAIT: Duration = Duration::from_millis(25);

type Job = (usize, HttpMessage, Vec<Payload>);

/// replays a message template with payloads substituted into its fuzz
/// locations, sending every generated message on a pool of worker threads
///
/// see [`FuzzerBuilder`] for how to put one together
#[derive(Debug)]
pub struct HttpFuzzer {
    options: FuzzerOptions,
    state: SharedState,
    sender: Arc<dyn HttpSender>,
    original: HttpMessage,
    baseline: OnceLock<HttpMessage>,
    replacer: Mutex<Replacer>,
    total: usize,
    processors: ProcessorChain,
    lifecycle: Mutex<FuzzerState>,
    unpaused: Condvar,
    backpressure: Mutex<()>,
    task_finished: Condvar,
}

impl HttpFuzzer {
    /// create a builder for a new `HttpFuzzer`
    #[must_use]
    pub fn builder() -> FuzzerBuilder<NoSender, NoMessage, NoLocations> {
        FuzzerBuilder::new()
    }

    pub(crate) fn new(
        options: FuzzerOptions,
        state: SharedState,
        sender: Arc<dyn HttpSender>,
        original: HttpMessage,
        replacer: Replacer,
        processors: ProcessorChain,
    ) -> Self {
        let total = replacer.total();

        Self {
            options,
            state,
            sender,
            original,
            baseline: OnceLock::new(),
            replacer: Mutex::new(replacer),
            total,
            processors,
            lifecycle: Mutex::new(FuzzerState::NotStarted),
            unpaused: Condvar::new(),
            backpressure: Mutex::new(()),
            task_finished: Condvar::new(),
        }
    }

    /// run the session to completion, blocking the calling thread
    ///
    /// sends the baseline message if it has no response yet, records it as
    /// the `"original message"` result, and then dispatches one task per
    /// generated message. Returns once every dispatched task finished, whether
    /// the session ran out of messages or was stopped.
    ///
    /// # Errors
    ///
    /// returns [`FuzzError::AlreadyStarted`] if the session was already run or stopped
    #[instrument(skip_all, level = "trace")]
    pub fn run(&self) -> Result<(), FuzzError> {
        {
            let mut lifecycle = self.lifecycle();

            if *lifecycle != FuzzerState::NotStarted {
                error!(state = %*lifecycle, "fuzzer can only be run once");
                return Err(FuzzError::AlreadyStarted);
            }

            *lifecycle = FuzzerState::Running;
        }

        if let Ok(mut stats) = self.state.stats().write() {
            stats.start_timer(0.0);
        }

        self.send_baseline();

        self.state.events().notify(FuzzerStarted {
            total: self.total,
            threads: self.options.thread_count(),
        });

        info!(total = self.total, threads = self.options.thread_count(), strategy = ?self.options.strategy(), "fuzzer started");

        let (jobs, queue) = mpsc::channel::<Job>();
        let queue = Mutex::new(queue);

        let completed = thread::scope(|scope| {
            for _ in 0..self.options.thread_count() {
                scope.spawn(|| self.work(&queue));
            }

            let completed = self.dispatch(&jobs);

            // closing the channel lets the workers drain the queue and exit
            drop(jobs);

            completed
        });

        let successfully =
            completed && !self.state.is_stopped() && !self.state.is_max_errors_reached();

        *self.lifecycle() = if successfully {
            FuzzerState::Finished
        } else {
            FuzzerState::Stopped
        };

        self.unpaused.notify_all();

        self.state
            .events()
            .notify(FuzzerCompleted { successfully });

        if successfully {
            info!(
                sent = self.state.messages_sent(),
                errors = self.state.error_count(),
                "fuzzer completed"
            );
        } else {
            info!(
                sent = self.state.messages_sent(),
                errors = self.state.error_count(),
                "fuzzer stopped"
            );
        }

        Ok(())
    }

    fn send_baseline(&self) {
        let mut baseline = self.original.clone();

        if baseline.response().is_none() {
            match self.sender.send(&mut baseline, self.options.follow_redirects()) {
                Ok(()) => self.state.message_sent(BASELINE_TASK_ID, baseline.response()),
                Err(error) => {
                    warn!(%error, "failed to send the original message");

                    self.state.update_from_error(&error);
                    self.state.increase_error_count(
                        BASELINE_TASK_ID,
                        SENDER_SOURCE,
                        &format!("failed to send the original message: {error}"),
                    );
                }
            }
        }

        self.state.record_result(FuzzResult::new(
            BASELINE_TASK_ID,
            ORIGINAL_MESSAGE,
            baseline.clone(),
            Vec::new(),
        ));

        if self.baseline.set(baseline).is_err() {
            debug!("baseline message was already set");
        }
    }

    /// pull generated messages and hand them to the workers until the
    /// replacer is exhausted or the session is stopped
    ///
    /// returns `true` when every message was dispatched
    #[instrument(skip_all, level = "trace")]
    fn dispatch(&self, jobs: &Sender<Job>) -> bool {
        let max_live = self.options.max_live_tasks();
        let delay = self.options.send_message_delay();
        let mut dispatched: usize = 0;

        loop {
            self.wait_for_live_tasks(dispatched, max_live);

            self.wait_while_paused();

            if dispatched > 0 && !delay.is_zero() {
                thread::sleep(delay);
            }

            if self.should_stop() {
                return false;
            }

            let next = self
                .replacer
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .next();

            let Some((message, payloads)) = next else {
                return true;
            };

            dispatched += 1;

            if jobs.send((dispatched, message, payloads)).is_err() {
                warn!(task_id = dispatched, "no worker left to run the task");
                return false;
            }
        }
    }

    /// block while more than `max_live` dispatched tasks are unfinished
    fn wait_for_live_tasks(&self, dispatched: usize, max_live: usize) {
        let mut guard = self
            .backpressure
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        // the timeout lets a stop requested from outside the workers be seen
        while dispatched.saturating_sub(self.state.tasks_done()) > max_live && !self.should_stop() {
            guard = self
                .task_finished
                .wait_timeout(guard, BACKPRESSURE_WAIT)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// count a finished task and wake the dispatch loop; returns the number of finished tasks
    pub(crate) fn finish_task(&self) -> usize {
        let done = self.state.task_done();

        // taking the lock orders the wakeup after the dispatcher's last check
        drop(
            self.backpressure
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        self.task_finished.notify_one();

        done
    }

    fn work(&self, queue: &Mutex<Receiver<Job>>) {
        loop {
            let job = queue
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .recv();

            let Ok((task_id, message, payloads)) = job else {
                break;
            };

            self.dispatch_task(task_id, message, payloads).run();
        }
    }

    /// `true` when dispatch must end; reaching the error threshold stops the session
    fn should_stop(&self) -> bool {
        self.state.is_stopped() || self.stop_on_max_errors()
    }

    /// request a stop once the error threshold is reached; returns `true` if it is
    pub(crate) fn stop_on_max_errors(&self) -> bool {
        if !self.state.is_max_errors_reached() {
            return false;
        }

        if !self.state.is_stopped() {
            warn!(
                errors = self.state.error_count(),
                "maximum number of errors reached, stopping the fuzzer"
            );

            self.state.stop();
        }

        true
    }

    fn lifecycle(&self) -> MutexGuard<'_, FuzzerState> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait_while_paused(&self) {
        let mut lifecycle = self.lifecycle();

        while *lifecycle == FuzzerState::Paused {
            lifecycle = self
                .unpaused
                .wait(lifecycle)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// create the task for one generated message
    #[must_use]
    pub fn dispatch_task(
        &self,
        task_id: usize,
        message: HttpMessage,
        payloads: Vec<Payload>,
    ) -> FuzzerTask<'_> {
        FuzzerTask::new(self, task_id, message, payloads)
    }

    /// append `result` to the result table
    pub fn record_result(&self, result: FuzzResult) {
        self.state.record_result(result);
    }

    /// count an error and append its record; returns the new error count
    ///
    /// reaching the configured maximum appends one extra "maximum number of
    /// errors reached" record and stops the session
    pub fn increase_error_count(&self, task_id: usize, source: &str, reason: &str) -> usize {
        let count = self.state.increase_error_count(task_id, source, reason);

        self.stop_on_max_errors();

        count
    }

    fn task_utils(&self, task_id: usize, payloads: Vec<Payload>) -> TaskUtils<'_> {
        TaskUtils::new(
            task_id,
            &self.state,
            self.sender.as_ref(),
            self.original_message(),
            payloads,
        )
    }

    /// run the pre-send processors against `message`
    ///
    /// processors may rewrite both the message and the task's payloads
    pub fn pre_process_message(
        &self,
        task_id: usize,
        message: &mut HttpMessage,
        payloads: &mut Vec<Payload>,
    ) {
        if self.processors.is_empty() {
            return;
        }

        let mut utils = self.task_utils(task_id, std::mem::take(payloads));

        self.processors.pre_process(&mut utils, message);

        *payloads = utils.into_payloads();
    }

    /// run the post-send processors against `result`; the result should only
    /// be recorded when [`Action::Keep`] is returned
    pub fn process_result(&self, result: &mut FuzzResult) -> Action {
        if self.processors.is_empty() {
            return Action::Keep;
        }

        let mut utils = self.task_utils(result.task_id(), result.payloads().to_vec());

        self.processors.post_process(&mut utils, result)
    }

    /// search the recorded results for `pattern`
    ///
    /// see [`ResultTable::search`] for the meaning of `inverse` and `max`
    ///
    /// # Errors
    ///
    /// returns [`FuzzError::InvalidRegex`] if `pattern` doesn't compile
    ///
    /// [`ResultTable::search`]: crate::results::ResultTable::search
    pub fn search(
        &self,
        pattern: &str,
        inverse: bool,
        max: Option<usize>,
    ) -> Result<Vec<SearchMatch>, FuzzError> {
        let regex = Regex::new(pattern).map_err(|source| {
            error!(%pattern, %source, "could not compile search pattern");

            FuzzError::InvalidRegex {
                source,
                pattern: pattern.to_string(),
            }
        })?;

        let matches = self
            .state
            .results()
            .read()
            .map_or_else(|_| Vec::new(), |table| table.search(&regex, inverse, max));

        Ok(matches)
    }

    /// suspend dispatch; returns `false` if the session isn't running
    pub fn pause(&self) -> bool {
        let mut lifecycle = self.lifecycle();

        if *lifecycle != FuzzerState::Running {
            return false;
        }

        info!("pausing fuzzer");
        *lifecycle = FuzzerState::Paused;
        true
    }

    /// resume a paused session; returns `false` if the session isn't paused
    pub fn resume(&self) -> bool {
        let mut lifecycle = self.lifecycle();

        if *lifecycle != FuzzerState::Paused {
            return false;
        }

        info!("resuming fuzzer");
        *lifecycle = FuzzerState::Running;
        self.unpaused.notify_all();
        true
    }

    /// stop a running or paused session; returns `false` otherwise
    ///
    /// in-flight tasks leave before their next send attempt, a request already
    /// on the wire is only bounded by the request timeout
    pub fn stop(&self) -> bool {
        let mut lifecycle = self.lifecycle();

        if !matches!(*lifecycle, FuzzerState::Running | FuzzerState::Paused) {
            return false;
        }

        info!("stopping fuzzer");
        *lifecycle = FuzzerState::Stopped;
        self.state.stop();
        self.unpaused.notify_all();
        self.task_finished.notify_all();
        true
    }

    /// current lifecycle state
    #[must_use]
    pub fn fuzzer_state(&self) -> FuzzerState {
        *self.lifecycle()
    }

    /// `true` while dispatching and not paused
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.fuzzer_state() == FuzzerState::Running
    }

    /// `true` while paused
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.fuzzer_state() == FuzzerState::Paused
    }

    /// `true` once the session stopped or finished
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        matches!(
            self.fuzzer_state(),
            FuzzerState::Stopped | FuzzerState::Finished
        )
    }

    /// number of finished tasks
    #[must_use]
    pub fn progress(&self) -> usize {
        self.state.tasks_done()
    }

    /// number of tasks the session dispatches when run to completion
    #[must_use]
    pub const fn maximum(&self) -> usize {
        self.total
    }

    /// number of successful round-trips, the baseline included
    #[must_use]
    pub fn messages_sent_count(&self) -> usize {
        self.state.messages_sent()
    }

    /// number of errors counted so far
    #[must_use]
    pub fn error_count(&self) -> usize {
        self.state.error_count()
    }

    /// snapshot of the recorded results, in completion order
    #[must_use]
    pub fn results(&self) -> Vec<FuzzResult> {
        self.state
            .results()
            .read()
            .map_or_else(|_| Vec::new(), |table| table.iter().cloned().collect())
    }

    /// snapshot of the error table, oldest first
    #[must_use]
    pub fn errors(&self) -> Vec<ErrorRecord> {
        self.state.errors()
    }

    /// every unique alert raised so far
    #[must_use]
    pub fn alerts(&self) -> Vec<Alert> {
        self.state.findings().alerts().to_vec()
    }

    /// snapshot of the session's statistics
    #[must_use]
    pub fn statistics(&self) -> Statistics {
        self.state
            .stats()
            .read()
            .map_or_else(|_| Statistics::default(), |stats| stats.clone())
    }

    /// the session's event publisher, to subscribe to progress and completion
    #[must_use]
    pub fn events(&self) -> Arc<RwLock<Publisher>> {
        self.state.events()
    }

    /// the session's shared state
    #[must_use]
    pub const fn state(&self) -> &SharedState {
        &self.state
    }

    /// the options the session was built with
    #[must_use]
    pub const fn options(&self) -> &FuzzerOptions {
        &self.options
    }

    /// the baseline message; carries its response once [`HttpFuzzer::run`] sent it
    #[must_use]
    pub fn original_message(&self) -> &HttpMessage {
        self.baseline.get().unwrap_or(&self.original)
    }

    /// the processor chain; processors may be added before the session runs
    #[must_use]
    pub const fn processors(&self) -> &ProcessorChain {
        &self.processors
    }

    pub(crate) fn sender(&self) -> &dyn HttpSender {
        self.sender.as_ref()
    }
}
