use tracing::{debug, instrument, warn};

use crate::client::HttpSender;
use crate::findings::Alert;
use crate::messages::HttpMessage;
use crate::payloads::Payload;
use crate::results::FuzzResult;
use crate::state::SharedState;

/// error source used for errors raised through [`TaskUtils`]
const PROCESSOR_SOURCE: &str = "processor";

/// source used when a finding couldn't be persisted
const ALERT_SOURCE: &str = "alert";

/// the narrow view of a running session handed to [`Processor`]s
///
/// everything a processor does to the session goes through here, so that
/// out-of-band requests, alerts, and extra results are accounted for the same
/// way as the task's own
///
/// [`Processor`]: crate::processors::Processor
#[derive(Debug)]
pub struct TaskUtils<'a> {
    task_id: usize,
    state: &'a SharedState,
    sender: &'a dyn HttpSender,
    original: &'a HttpMessage,
    payloads: Vec<Payload>,
}

impl<'a> TaskUtils<'a> {
    pub(crate) fn new(
        task_id: usize,
        state: &'a SharedState,
        sender: &'a dyn HttpSender,
        original: &'a HttpMessage,
        payloads: Vec<Payload>,
    ) -> Self {
        Self {
            task_id,
            state,
            sender,
            original,
            payloads,
        }
    }

    /// id of the task being processed
    #[must_use]
    pub const fn task_id(&self) -> usize {
        self.task_id
    }

    /// the session's baseline message
    #[must_use]
    pub const fn original_message(&self) -> &HttpMessage {
        self.original
    }

    /// payloads of the current task, in location order
    #[must_use]
    pub fn payloads(&self) -> &[Payload] {
        &self.payloads
    }

    /// payloads of the current task; pre-send processors may rewrite them and
    /// the result reports the rewritten values
    pub fn payloads_mut(&mut self) -> &mut Vec<Payload> {
        &mut self.payloads
    }

    pub(crate) fn into_payloads(self) -> Vec<Payload> {
        self.payloads
    }

    /// send `message` out-of-band with the session's sender
    ///
    /// returns `false` when the message couldn't be sent; the failure is logged
    /// and never surfaces as an error to the caller
    #[instrument(skip_all, fields(task_id = self.task_id), level = "trace")]
    pub fn send_message(&self, message: &mut HttpMessage, follow_redirects: bool) -> bool {
        match self.sender.send(message, follow_redirects) {
            Ok(()) => true,
            Err(error) => {
                debug!(task_id = self.task_id, %error, "out-of-band message could not be sent");
                false
            }
        }
    }

    /// attach `alert` to `result` and add it to the session's findings
    ///
    /// the result's message is persisted on the first alert only; later alerts
    /// on the same result share its history reference. When persisting fails
    /// the error count is increased and the alert is dropped.
    ///
    /// returns `true` when the alert was attached
    #[instrument(skip_all, fields(task_id = self.task_id), level = "trace")]
    pub fn raise_alert(&self, result: &mut FuzzResult, mut alert: Alert) -> bool {
        let history_id = match result.message().history_id() {
            Some(id) => id,
            None => match self.state.history().persist(result.message()) {
                Ok(id) => {
                    result.set_history_id(id);
                    id
                }
                Err(error) => {
                    warn!(task_id = self.task_id, %error, name = %alert.name, "alert dropped, message could not be persisted");

                    self.state.increase_error_count(
                        self.task_id,
                        ALERT_SOURCE,
                        &format!("could not persist message for alert `{}`: {error}", alert.name),
                    );

                    return false;
                }
            },
        };

        alert.history_id = Some(history_id);

        if alert.url.is_empty() {
            if let Ok(url) = result.message().url() {
                alert.url = url.to_string();
            }
        }

        if alert.method.is_empty() {
            alert.method = result.message().method().to_string();
        }

        self.state.record_alert(alert.clone());
        result.add_alert(alert);

        true
    }

    /// record an extra result for the current task, i.e. a redirect hop
    ///
    /// the extra result carries the task's current payloads
    pub fn add_message_to_results(
        &self,
        kind: &str,
        message: HttpMessage,
        custom_state: Option<(&str, &str)>,
    ) {
        let mut result = FuzzResult::new(self.task_id, kind, message, self.payloads.clone());

        if let Some((key, value)) = custom_state {
            result.add_custom_state(key, value);
        }

        self.state.record_result(result);
    }

    /// count an error against the current task
    pub fn increase_error_count(&self, reason: &str) {
        self.state
            .increase_error_count(self.task_id, PROCESSOR_SOURCE, reason);
    }

    /// request the session to stop; tasks observe it before their next attempt
    pub fn stop_fuzzer(&self) {
        debug!(task_id = self.task_id, "stop requested by a processor");
        self.state.stop();
    }

    pub(crate) const fn state(&self) -> &SharedState {
        self.state
    }
}
