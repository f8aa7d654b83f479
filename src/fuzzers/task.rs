use tracing::{debug, instrument, warn};

use super::{HttpFuzzer, SENDER_SOURCE};
use crate::actions::Action;
use crate::error::FuzzError;
use crate::events::{EventPublisher, FuzzerProgress};
use crate::messages::HttpMessage;
use crate::payloads::Payload;
use crate::results::{FuzzResult, RESULT};

/// how a task's send loop ended
enum SendOutcome {
    Sent,
    Failed { error: FuzzError, attempts: usize },
    Abandoned,
}

/// one generated message, waiting to be sent and turned into a result or an error
///
/// tasks never return errors; every failure ends up in the session's error table
#[derive(Debug)]
pub struct FuzzerTask<'a> {
    fuzzer: &'a HttpFuzzer,
    task_id: usize,
    message: HttpMessage,
    payloads: Vec<Payload>,
}

impl<'a> FuzzerTask<'a> {
    pub(crate) fn new(
        fuzzer: &'a HttpFuzzer,
        task_id: usize,
        message: HttpMessage,
        payloads: Vec<Payload>,
    ) -> Self {
        Self {
            fuzzer,
            task_id,
            message,
            payloads,
        }
    }

    /// id of the task, unique within its session
    #[must_use]
    pub const fn task_id(&self) -> usize {
        self.task_id
    }

    /// the message as generated, before any processor ran
    #[must_use]
    pub const fn message(&self) -> &HttpMessage {
        &self.message
    }

    /// the payloads that produced the message
    #[must_use]
    pub fn payloads(&self) -> &[Payload] {
        &self.payloads
    }

    /// pre-process, send, post-process, and record the task's message
    ///
    /// the stop flag is checked before pre-processing and before every send
    /// attempt; a stopped task leaves without a result or an error. Errors
    /// counted along the way stop the session once the threshold is reached.
    #[instrument(skip_all, fields(task_id = self.task_id), level = "trace")]
    pub fn run(self) {
        let Self {
            fuzzer,
            task_id,
            mut message,
            mut payloads,
        } = self;

        let outcome = if fuzzer.state().is_stopped() {
            SendOutcome::Abandoned
        } else {
            fuzzer.pre_process_message(task_id, &mut message, &mut payloads);
            Self::send(fuzzer, task_id, &mut message)
        };

        match outcome {
            SendOutcome::Sent => {
                fuzzer.state().message_sent(task_id, message.response());

                let mut result = FuzzResult::new(task_id, RESULT, message, payloads);
                let action = fuzzer.process_result(&mut result);

                fuzzer.state().update_actions(action);

                if action == Action::Keep {
                    fuzzer.record_result(result);
                } else {
                    debug!(%task_id, "result discarded by a processor");
                }
            }
            SendOutcome::Failed { error, attempts } => {
                let retries = fuzzer.options().retries_on_io_error();

                fuzzer.increase_error_count(
                    task_id,
                    SENDER_SOURCE,
                    &format!(
                        "failed to send the message after {attempts} attempt(s) ({retries} retries allowed): {error}"
                    ),
                );
            }
            SendOutcome::Abandoned => {
                debug!(%task_id, "task abandoned, the fuzzer was stopped");
            }
        }

        // processors count their own errors, so the threshold is checked for every task
        fuzzer.stop_on_max_errors();

        let done = fuzzer.finish_task();

        fuzzer.state().events().notify(FuzzerProgress {
            done,
            total: fuzzer.maximum(),
        });
    }

    /// send `message`, retrying transient failures up to the configured bound
    fn send(fuzzer: &HttpFuzzer, task_id: usize, message: &mut HttpMessage) -> SendOutcome {
        let options = fuzzer.options();
        let max_attempts = options.retries_on_io_error().saturating_add(1);

        message.clear_response();

        let mut attempts = 0;

        loop {
            if fuzzer.state().is_stopped() {
                return SendOutcome::Abandoned;
            }

            attempts += 1;

            match fuzzer.sender().send(message, options.follow_redirects()) {
                Ok(()) => return SendOutcome::Sent,
                Err(error) => {
                    fuzzer.state().update_from_error(&error);

                    warn!(%task_id, %attempts, %max_attempts, %error, "failed to send message");

                    if attempts >= max_attempts || !error.is_transient() {
                        return SendOutcome::Failed { error, attempts };
                    }
                }
            }
        }
    }
}
