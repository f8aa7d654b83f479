//! pluggable hooks that run before a fuzzed message is sent and after its
//! result is built
//!
//! processors run in registration order, one task at a time. A processor that
//! returns an error or panics is removed from the chain for the rest of the
//! session; its removal is recorded as one error naming it.
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Mutex, MutexGuard, PoisonError};

use dyn_clone::DynClone;
use tracing::{error, instrument};

use crate::actions::Action;
use crate::error::FuzzError;
use crate::events::{EventPublisher, ProcessorRemoved};
use crate::fuzzers::TaskUtils;
use crate::messages::HttpMessage;
use crate::results::FuzzResult;
use crate::std_ext::any::{AsAny, Named};

pub use self::alerts::RegexAlertProcessor;
pub use self::anti_csrf::AntiCsrfTokenRefresher;
pub use self::content_length::RequestContentLengthUpdater;
pub use self::redirect::RedirectFollower;
pub use self::reflection::{PayloadReflectionDetector, REFLECTED_STATE};
pub use self::request::RequestProcessor;
pub use self::result::ResultProcessor;
pub use self::tagger::{MessageTagger, TAGS_STATE};

mod alerts;
mod anti_csrf;
mod content_length;
mod redirect;
mod reflection;
mod request;
mod result;
mod tagger;

/// a pre-send and/or post-send hook
///
/// both hooks default to doing nothing, so implementors only override the
/// side(s) they care about
///
/// expected order of operations for each task:
/// - `processors.process_message`
/// - `sender.send(message)` (with retries)
/// - `processors.process_result`
pub trait Processor: DynClone + AsAny + Named + Send + Sync {
    /// called before the task's message is sent; may rewrite the message and
    /// the task's payloads (through `utils`)
    ///
    /// # Errors
    ///
    /// an error removes the processor from the chain
    fn process_message(
        &mut self,
        _utils: &mut TaskUtils<'_>,
        _message: &mut HttpMessage,
    ) -> Result<(), FuzzError> {
        Ok(())
    }

    /// called with the task's result; [`Action::Discard`] drops the result
    /// and skips the remaining processors
    ///
    /// # Errors
    ///
    /// an error removes the processor from the chain
    fn process_result(
        &mut self,
        _utils: &mut TaskUtils<'_>,
        _result: &mut FuzzResult,
    ) -> Result<Action, FuzzError> {
        Ok(Action::Keep)
    }
}

impl Clone for Box<dyn Processor> {
    fn clone(&self) -> Self {
        dyn_clone::clone_box(&**self)
    }
}

/// the ordered list of processors shared by every task of a session
///
/// one lock guards the chain for both phases, so a processor never runs
/// concurrently with another (or with itself)
#[derive(Default)]
pub struct ProcessorChain {
    processors: Mutex<Vec<Box<dyn Processor>>>,
}

impl std::fmt::Debug for ProcessorChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessorChain")
            .field("processors", &self.names())
            .finish()
    }
}

impl Clone for ProcessorChain {
    fn clone(&self) -> Self {
        Self::new(self.lock().clone())
    }
}

impl ProcessorChain {
    /// create a chain that runs `processors` in the given order
    #[must_use]
    pub fn new(processors: Vec<Box<dyn Processor>>) -> Self {
        Self {
            processors: Mutex::new(processors),
        }
    }

    /// append a processor to the end of the chain
    pub fn push(&self, processor: impl Processor + 'static) {
        self.lock().push(Box::new(processor));
    }

    /// names of the processors still in the chain, in order
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.lock()
            .iter()
            .map(|processor| processor.name().to_string())
            .collect()
    }

    /// number of processors still in the chain
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// `true` when no processor is left
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Box<dyn Processor>>> {
        // processor panics are caught inside the critical section, so a poisoned
        // lock still holds a consistent chain
        self.processors.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// run every processor's pre-send hook against `message`
    #[instrument(skip_all, fields(task_id = utils.task_id()), level = "trace")]
    pub(crate) fn pre_process(&self, utils: &mut TaskUtils<'_>, message: &mut HttpMessage) {
        let mut chain = self.lock();
        let mut failures = Vec::new();

        for (index, processor) in chain.iter_mut().enumerate() {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                processor.process_message(utils, message)
            }));

            if let Some(reason) = failure_reason(outcome.map(|result| result.map(|()| Action::Keep))) {
                failures.push((index, reason));
            }
        }

        Self::compact(&mut chain, failures, utils);
    }

    /// run every processor's post-send hook against `result`, stopping at the
    /// first one that discards it
    #[instrument(skip_all, fields(task_id = utils.task_id()), level = "trace")]
    pub(crate) fn post_process(&self, utils: &mut TaskUtils<'_>, result: &mut FuzzResult) -> Action {
        let mut chain = self.lock();
        let mut failures = Vec::new();
        let mut verdict = Action::Keep;

        for (index, processor) in chain.iter_mut().enumerate() {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                processor.process_result(utils, result)
            }));

            match outcome {
                Ok(Ok(Action::Discard)) => {
                    verdict = Action::Discard;
                    break;
                }
                Ok(Ok(_)) => {}
                failed => {
                    if let Some(reason) = failure_reason(failed) {
                        failures.push((index, reason));
                    }
                }
            }
        }

        Self::compact(&mut chain, failures, utils);

        verdict
    }

    /// drop the processors that failed during this traversal, recording one
    /// error for each; the surviving processors keep their relative order
    fn compact(
        chain: &mut Vec<Box<dyn Processor>>,
        failures: Vec<(usize, String)>,
        utils: &TaskUtils<'_>,
    ) {
        if failures.is_empty() {
            return;
        }

        let mut removed = Vec::with_capacity(failures.len());

        // highest index first, so earlier indices stay valid
        for (index, reason) in failures.into_iter().rev() {
            let processor = chain.remove(index);
            removed.push((processor.name().to_string(), reason));
        }

        for (name, reason) in removed.into_iter().rev() {
            error!(task_id = utils.task_id(), processor = %name, %reason, "processor failed and was removed");

            utils.state().increase_error_count(
                utils.task_id(),
                &name,
                &format!("processor `{name}` failed and was removed: {reason}"),
            );

            utils.state().events().notify(ProcessorRemoved { name });
        }
    }
}

/// turn a hook's outcome into the reason it failed, if it did
fn failure_reason(outcome: Result<Result<Action, FuzzError>, Box<dyn Any + Send>>) -> Option<String> {
    match outcome {
        Ok(Ok(_)) => None,
        Ok(Err(error)) => Some(error.to_string()),
        Err(payload) => Some(panic_message(payload.as_ref())),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("panicked: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("panicked: {message}")
    } else {
        String::from("panicked")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::test_support::ScriptedSender;
    use crate::results::RESULT;
    use crate::state::SharedState;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// counts its invocations and fails (or panics) on the `fail_on`th call
    #[derive(Clone, Debug)]
    struct Flaky {
        name: &'static str,
        calls: Arc<AtomicUsize>,
        fail_on: Option<usize>,
        panics: bool,
    }

    impl Flaky {
        fn new(name: &'static str, fail_on: Option<usize>, panics: bool) -> Self {
            Self {
                name,
                calls: Arc::new(AtomicUsize::new(0)),
                fail_on,
                panics,
            }
        }

        fn tick(&self) -> Result<(), FuzzError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;

            if Some(call) == self.fail_on {
                if self.panics {
                    panic!("{} blew up", self.name);
                }

                return Err(FuzzError::ProcessorFailure {
                    processor: self.name.to_string(),
                    reason: String::from("broken"),
                });
            }

            Ok(())
        }
    }

    impl Processor for Flaky {
        fn process_message(
            &mut self,
            _utils: &mut TaskUtils<'_>,
            _message: &mut HttpMessage,
        ) -> Result<(), FuzzError> {
            self.tick()
        }

        fn process_result(
            &mut self,
            _utils: &mut TaskUtils<'_>,
            _result: &mut FuzzResult,
        ) -> Result<Action, FuzzError> {
            self.tick().map(|()| Action::Keep)
        }
    }

    impl Named for Flaky {
        fn name(&self) -> &str {
            self.name
        }
    }

    impl AsAny for Flaky {
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[derive(Clone, Debug)]
    struct Reject;

    impl Processor for Reject {
        fn process_result(
            &mut self,
            _utils: &mut TaskUtils<'_>,
            _result: &mut FuzzResult,
        ) -> Result<Action, FuzzError> {
            Ok(Action::Discard)
        }
    }

    impl Named for Reject {
        fn name(&self) -> &str {
            "Reject"
        }
    }

    impl AsAny for Reject {
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    /// appends `{name}:{phase}` to a shared log on every call
    #[derive(Clone, Debug)]
    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Recorder {
        fn record(&self, phase: &str) {
            if let Ok(mut log) = self.log.lock() {
                log.push(format!("{}:{phase}", self.name));
            }
        }
    }

    impl Processor for Recorder {
        fn process_message(
            &mut self,
            _utils: &mut TaskUtils<'_>,
            _message: &mut HttpMessage,
        ) -> Result<(), FuzzError> {
            self.record("pre");
            Ok(())
        }

        fn process_result(
            &mut self,
            _utils: &mut TaskUtils<'_>,
            _result: &mut FuzzResult,
        ) -> Result<Action, FuzzError> {
            self.record("post");
            Ok(Action::Keep)
        }
    }

    impl Named for Recorder {
        fn name(&self) -> &str {
            self.name
        }
    }

    impl AsAny for Recorder {
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    /// both phases run the processors in registration order, including ones
    /// pushed after the chain was created
    #[test]
    fn both_phases_run_in_registration_order() -> Result<(), Box<dyn std::error::Error>> {
        let state = SharedState::default();
        let original = HttpMessage::get("http://localhost/")?;
        let sender = ScriptedSender::default();
        let log = Arc::new(Mutex::new(Vec::new()));

        let recorder = |name| Recorder {
            name,
            log: log.clone(),
        };

        let chain = ProcessorChain::new(vec![Box::new(recorder("first")), Box::new(recorder("second"))]);
        chain.push(recorder("third"));

        let mut utils = TaskUtils::new(1, &state, &sender, &original, Vec::new());
        let mut message = original.clone();
        chain.pre_process(&mut utils, &mut message);

        let mut result = FuzzResult::new(1, RESULT, message, Vec::new());
        assert_eq!(chain.post_process(&mut utils, &mut result), Action::Keep);

        let calls = log.lock().map(|guard| guard.clone()).unwrap_or_default();
        assert_eq!(
            calls,
            vec![
                "first:pre",
                "second:pre",
                "third:pre",
                "first:post",
                "second:post",
                "third:post",
            ]
        );
        Ok(())
    }

    /// a processor failing on call k never runs again and is reported once;
    /// the survivors keep their order
    #[test]
    fn failing_processor_removed_once() -> Result<(), Box<dyn std::error::Error>> {
        let state = SharedState::default();
        let original = HttpMessage::get("http://localhost/")?;
        let sender = ScriptedSender::default();

        let first = Flaky::new("first", None, false);
        let broken = Flaky::new("broken", Some(2), false);
        let last = Flaky::new("last", None, false);
        let broken_calls = broken.calls.clone();

        let chain = ProcessorChain::new(vec![
            Box::new(first.clone()),
            Box::new(broken),
            Box::new(last.clone()),
        ]);

        for task_id in 1..=5 {
            let mut utils = TaskUtils::new(task_id, &state, &sender, &original, Vec::new());
            let mut message = original.clone();
            chain.pre_process(&mut utils, &mut message);
        }

        assert_eq!(broken_calls.load(Ordering::SeqCst), 2);
        assert_eq!(first.calls.load(Ordering::SeqCst), 5);
        assert_eq!(last.calls.load(Ordering::SeqCst), 5);
        assert_eq!(chain.names(), vec!["first", "last"]);

        let errors = state.errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].source, "broken");
        assert_eq!(errors[0].task_id, 2);
        Ok(())
    }

    /// panics are treated like returned errors, in either phase
    #[test]
    fn panicking_processor_removed() -> Result<(), Box<dyn std::error::Error>> {
        let state = SharedState::default();
        let original = HttpMessage::get("http://localhost/")?;
        let sender = ScriptedSender::default();
        let removed = Arc::new(AtomicUsize::new(0));
        let counter = removed.clone();

        state.events().subscribe(move |event: ProcessorRemoved| {
            assert_eq!(event.name, "panicky");
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let chain = ProcessorChain::new(vec![Box::new(Flaky::new("panicky", Some(1), true))]);

        for task_id in 1..=3 {
            let mut utils = TaskUtils::new(task_id, &state, &sender, &original, Vec::new());
            let mut result = FuzzResult::new(task_id, RESULT, original.clone(), Vec::new());
            assert_eq!(chain.post_process(&mut utils, &mut result), Action::Keep);
        }

        assert!(chain.is_empty());
        assert_eq!(removed.load(Ordering::SeqCst), 1);
        assert_eq!(state.error_count(), 1);
        assert!(state.errors()[0].reason.contains("panicked: panicky blew up"));
        Ok(())
    }

    /// the first discard short-circuits the rest of the chain
    #[test]
    fn discard_short_circuits() -> Result<(), Box<dyn std::error::Error>> {
        let state = SharedState::default();
        let original = HttpMessage::get("http://localhost/")?;
        let sender = ScriptedSender::default();
        let after = Flaky::new("after", None, false);

        let chain = ProcessorChain::new(vec![Box::new(Reject), Box::new(after.clone())]);

        let mut utils = TaskUtils::new(1, &state, &sender, &original, Vec::new());
        let mut result = FuzzResult::new(1, RESULT, original.clone(), Vec::new());

        assert_eq!(chain.post_process(&mut utils, &mut result), Action::Discard);
        assert_eq!(after.calls.load(Ordering::SeqCst), 0);
        Ok(())
    }
}
