//! Configuration of a fuzz session
use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tracing::{error, instrument};

use crate::error::FuzzError;
use crate::locations::ReplacementStrategy;

/// tunables of an [`HttpFuzzer`]
///
/// every field has a default, so a partial JSON document is enough to
/// configure a session
///
/// # Examples
///
/// ```
/// # use std::time::Duration;
/// # use locfuzz::options::FuzzerOptions;
/// let options = FuzzerOptions::default()
///     .with_thread_count(2)
///     .with_retries_on_io_error(0)
///     .with_send_message_delay(Duration::from_millis(50));
///
/// assert_eq!(options.thread_count(), 2);
/// assert_eq!(options.max_errors_allowed(), Some(1000));
/// assert!(options.validate().is_ok());
/// ```
///
/// [`HttpFuzzer`]: crate::fuzzers::HttpFuzzer
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct FuzzerOptions {
    thread_count: usize,
    retries_on_io_error: usize,
    max_errors_allowed: Option<usize>,
    send_message_delay_ms: u64,
    strategy: ReplacementStrategy,
    follow_redirects: bool,
    max_redirects: usize,
    request_timeout_ms: u64,
    max_results: usize,
    max_error_records: usize,
    max_live_tasks_factor: usize,
}

impl Default for FuzzerOptions {
    fn default() -> Self {
        Self {
            thread_count: 8,
            retries_on_io_error: 3,
            max_errors_allowed: Some(1000),
            send_message_delay_ms: 0,
            strategy: ReplacementStrategy::DepthFirst,
            follow_redirects: false,
            max_redirects: 100,
            request_timeout_ms: 7_000,
            max_results: 100_000,
            max_error_records: 10_000,
            max_live_tasks_factor: 3,
        }
    }
}

impl FuzzerOptions {
    /// read options from a JSON document; missing keys keep their defaults
    ///
    /// # Errors
    ///
    /// returns an error if `json` isn't valid JSON for these options or the
    /// resulting options fail [`FuzzerOptions::validate`]
    ///
    /// # Examples
    ///
    /// ```
    /// # use locfuzz::options::FuzzerOptions;
    /// # use locfuzz::locations::ReplacementStrategy;
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let options = FuzzerOptions::from_json(r#"{"thread_count": 4, "strategy": "BreadthFirst"}"#)?;
    ///
    /// assert_eq!(options.thread_count(), 4);
    /// assert_eq!(options.strategy(), ReplacementStrategy::BreadthFirst);
    /// assert_eq!(options.max_redirects(), 100);
    /// # Ok(())
    /// # }
    /// ```
    #[cfg(feature = "json")]
    #[cfg_attr(docsrs, doc(cfg(feature = "json")))]
    #[instrument(skip_all, level = "trace")]
    pub fn from_json(json: &str) -> Result<Self, FuzzError> {
        let options: Self = serde_json::from_str(json).map_err(|source| {
            error!(%source, "could not parse fuzzer options");
            FuzzError::JSONParseError { source }
        })?;

        options.validate()?;

        Ok(options)
    }

    /// check that the options describe a session that can run
    ///
    /// # Errors
    ///
    /// returns [`FuzzError::InvalidParameter`] when a thread count, result
    /// capacity, error capacity, or live-task factor is zero
    pub fn validate(&self) -> Result<(), FuzzError> {
        let checks = [
            (self.thread_count, "thread_count", "at least one thread is required"),
            (self.max_results, "max_results", "the result table must hold at least one result"),
            (
                self.max_error_records,
                "max_error_records",
                "the error table must hold at least one record",
            ),
            (
                self.max_live_tasks_factor,
                "max_live_tasks_factor",
                "at least one task per thread must be allowed in flight",
            ),
        ];

        for (value, param, message) in checks {
            if value == 0 {
                error!(%param, "invalid fuzzer option: {}", message);

                return Err(FuzzError::InvalidParameter {
                    param: param.to_string(),
                    message,
                });
            }
        }

        Ok(())
    }

    /// number of worker threads sending messages
    #[must_use]
    pub const fn thread_count(&self) -> usize {
        self.thread_count
    }

    /// number of times a message is re-sent after an I/O error
    #[must_use]
    pub const fn retries_on_io_error(&self) -> usize {
        self.retries_on_io_error
    }

    /// number of errors after which no further tasks are dispatched; `None` is unlimited
    #[must_use]
    pub const fn max_errors_allowed(&self) -> Option<usize> {
        self.max_errors_allowed
    }

    /// pause between two consecutive dispatches
    #[must_use]
    pub const fn send_message_delay(&self) -> Duration {
        Duration::from_millis(self.send_message_delay_ms)
    }

    /// order in which the payloads of multiple locations are combined
    #[must_use]
    pub const fn strategy(&self) -> ReplacementStrategy {
        self.strategy
    }

    /// whether fuzzed messages follow redirects
    #[must_use]
    pub const fn follow_redirects(&self) -> bool {
        self.follow_redirects
    }

    /// maximum number of redirects followed for one message
    #[must_use]
    pub const fn max_redirects(&self) -> usize {
        self.max_redirects
    }

    /// time after which a single request is abandoned
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// capacity of the result table
    #[must_use]
    pub const fn max_results(&self) -> usize {
        self.max_results
    }

    /// capacity of the error table
    #[must_use]
    pub const fn max_error_records(&self) -> usize {
        self.max_error_records
    }

    /// tasks allowed in flight per thread
    #[must_use]
    pub const fn max_live_tasks_factor(&self) -> usize {
        self.max_live_tasks_factor
    }

    /// maximum number of tasks dispatched but not yet done
    #[must_use]
    pub const fn max_live_tasks(&self) -> usize {
        self.thread_count.saturating_mul(self.max_live_tasks_factor)
    }

    /// builder-style setter for [`FuzzerOptions::thread_count`]
    #[must_use]
    pub const fn with_thread_count(mut self, thread_count: usize) -> Self {
        self.thread_count = thread_count;
        self
    }

    /// builder-style setter for [`FuzzerOptions::retries_on_io_error`]
    #[must_use]
    pub const fn with_retries_on_io_error(mut self, retries: usize) -> Self {
        self.retries_on_io_error = retries;
        self
    }

    /// builder-style setter for [`FuzzerOptions::max_errors_allowed`]
    #[must_use]
    pub const fn with_max_errors_allowed(mut self, max_errors: Option<usize>) -> Self {
        self.max_errors_allowed = max_errors;
        self
    }

    /// builder-style setter for [`FuzzerOptions::send_message_delay`]
    ///
    /// sub-millisecond precision is dropped
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn with_send_message_delay(mut self, delay: Duration) -> Self {
        self.send_message_delay_ms = delay.as_millis() as u64;
        self
    }

    /// builder-style setter for [`FuzzerOptions::strategy`]
    #[must_use]
    pub const fn with_strategy(mut self, strategy: ReplacementStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// builder-style setter for [`FuzzerOptions::follow_redirects`]
    #[must_use]
    pub const fn with_follow_redirects(mut self, follow: bool) -> Self {
        self.follow_redirects = follow;
        self
    }

    /// builder-style setter for [`FuzzerOptions::max_redirects`]
    #[must_use]
    pub const fn with_max_redirects(mut self, max_redirects: usize) -> Self {
        self.max_redirects = max_redirects;
        self
    }

    /// builder-style setter for [`FuzzerOptions::request_timeout`]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// builder-style setter for [`FuzzerOptions::max_results`]
    #[must_use]
    pub const fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    /// builder-style setter for [`FuzzerOptions::max_error_records`]
    #[must_use]
    pub const fn with_max_error_records(mut self, max_error_records: usize) -> Self {
        self.max_error_records = max_error_records;
        self
    }

    /// builder-style setter for [`FuzzerOptions::max_live_tasks_factor`]
    #[must_use]
    pub const fn with_max_live_tasks_factor(mut self, factor: usize) -> Self {
        self.max_live_tasks_factor = factor;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let options = FuzzerOptions::default();

        assert_eq!(options.thread_count(), 8);
        assert_eq!(options.retries_on_io_error(), 3);
        assert_eq!(options.max_errors_allowed(), Some(1000));
        assert_eq!(options.send_message_delay(), Duration::ZERO);
        assert_eq!(options.strategy(), ReplacementStrategy::DepthFirst);
        assert!(!options.follow_redirects());
        assert_eq!(options.max_redirects(), 100);
        assert_eq!(options.max_live_tasks(), 24);
    }

    #[test]
    fn validate_rejects_zero_capacities() {
        assert!(FuzzerOptions::default().with_thread_count(0).validate().is_err());
        assert!(FuzzerOptions::default().with_max_results(0).validate().is_err());
        assert!(FuzzerOptions::default().with_max_error_records(0).validate().is_err());
        assert!(FuzzerOptions::default()
            .with_max_live_tasks_factor(0)
            .validate()
            .is_err());
    }

    #[cfg(feature = "json")]
    #[test]
    fn from_json_keeps_defaults_for_missing_keys() -> Result<(), FuzzError> {
        let options = FuzzerOptions::from_json(
            r#"{"retries_on_io_error": 0, "max_errors_allowed": null, "send_message_delay_ms": 250}"#,
        )?;

        assert_eq!(options.retries_on_io_error(), 0);
        assert_eq!(options.max_errors_allowed(), None);
        assert_eq!(options.send_message_delay(), Duration::from_millis(250));
        assert_eq!(options.thread_count(), 8);

        assert!(FuzzerOptions::from_json(r#"{"thread_count": 0}"#).is_err());
        assert!(FuzzerOptions::from_json("not json").is_err());
        Ok(())
    }
}
