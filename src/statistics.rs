//! [`Statistics`] is the primary data container for request, response, and
//! timing statistics gathered during a fuzz session
use std::collections::HashMap;
use std::fmt::Display;
use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};

use crate::actions::Action;
use crate::error::{FuzzError, RequestErrorKind};
use crate::messages::HttpResponse;
use crate::std_ext::time::current_time;

/// fuzzer's tracked statistics
#[derive(Default, Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Statistics {
    /// tracker for number of timeouts seen by the client
    timeouts: usize,

    /// tracker for total number of requests sent by the client, successful or not
    requests: f64,

    /// tracker for total number of errors encountered by the client
    ///
    /// these errors are not related to status code based errors in the
    /// 400 or 500 range. The errors tracked here reflect things like
    /// network connection errors, timeouts, etc...
    errors: usize,

    /// tracker for overall number of 1xx status codes seen by the client
    informatives: usize,

    /// tracker for overall number of 2xx status codes seen by the client
    successes: usize,

    /// tracker for overall number of 3xx status codes seen by the client
    redirects: usize,

    /// tracker for overall number of 4xx status codes seen by the client
    client_errors: usize,

    /// tracker for overall number of 5xx status codes seen by the client
    server_errors: usize,

    /// tracker for number of errors triggered by the redirect policy
    redirection_errors: usize,

    /// tracker for number of errors related to the connecting
    connection_errors: usize,

    /// tracker for number of errors related to the request used
    request_errors: usize,

    /// tracker for when the fuzzing began
    start_time: Duration,

    /// total number of seconds the session has run
    ///
    /// this value is a snapshot in time from when `common_updates` was last called
    pub elapsed: f64,

    /// average number of requests per second
    avg_reqs_per_sec: f64,

    /// tracker for overall number of any status code seen by the client
    statuses: HashMap<u16, usize>,

    /// tracker for the verdicts of the post-send processor chain
    actions: HashMap<Action, usize>,
}

impl Statistics {
    /// create a new default instance of `Statistics`
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// get the number of request timeouts
    #[inline]
    #[must_use]
    pub const fn timeouts(&self) -> usize {
        self.timeouts
    }

    /// get the number of requests sent
    #[inline]
    #[must_use]
    pub const fn requests(&self) -> f64 {
        self.requests
    }

    /// get the number of general errors
    #[inline]
    #[must_use]
    pub const fn errors(&self) -> usize {
        self.errors
    }

    /// get the number of informative responses (status code 1XX)
    #[inline]
    #[must_use]
    pub const fn informatives(&self) -> usize {
        self.informatives
    }

    /// get the number of success responses (status code 2XX)
    #[inline]
    #[must_use]
    pub const fn successes(&self) -> usize {
        self.successes
    }

    /// get the number of redirect responses (status code 3XX)
    #[inline]
    #[must_use]
    pub const fn redirects(&self) -> usize {
        self.redirects
    }

    /// get the number of client errors (status code 4XX)
    #[inline]
    #[must_use]
    pub const fn client_errors(&self) -> usize {
        self.client_errors
    }

    /// get the number of server errors (status code 5XX)
    #[inline]
    #[must_use]
    pub const fn server_errors(&self) -> usize {
        self.server_errors
    }

    /// given a status code, return the number of times it was seen by the client
    #[inline]
    #[must_use]
    pub fn status_code_count(&self, status_code: u16) -> Option<usize> {
        self.statuses.get(&status_code).copied()
    }

    /// get the number of errors encountered during redirection (redirect loops etc)
    #[inline]
    #[must_use]
    pub const fn redirection_errors(&self) -> usize {
        self.redirection_errors
    }

    /// get the number of connection errors
    #[inline]
    #[must_use]
    pub const fn connection_errors(&self) -> usize {
        self.connection_errors
    }

    /// get the number of request errors
    #[inline]
    #[must_use]
    pub const fn request_errors(&self) -> usize {
        self.request_errors
    }

    /// get a reference to the fuzzer's start time
    #[inline]
    #[must_use]
    pub const fn start_time(&self) -> &Duration {
        &self.start_time
    }

    /// get the current average number of requests per second
    #[inline]
    #[must_use]
    pub const fn requests_per_sec(&self) -> f64 {
        self.avg_reqs_per_sec
    }

    /// get the number of seconds elapsed since the fuzzer began fuzzing
    #[inline]
    #[must_use]
    pub fn elapsed(&self) -> f64 {
        current_time()
            .checked_sub(self.start_time)
            .map_or_else(|| 0.0, |duration| duration.as_secs_f64())
    }

    /// number of results the post-send processor chain kept
    #[inline]
    #[must_use]
    pub fn kept(&self) -> usize {
        self.actions.get(&Action::Keep).copied().unwrap_or(0)
    }

    /// number of results the post-send processor chain discarded
    #[inline]
    #[must_use]
    pub fn discarded(&self) -> usize {
        self.actions.get(&Action::Discard).copied().unwrap_or(0)
    }

    /// manually start the fuzzer's timer
    ///
    /// `offset` is the number of seconds already spent fuzzing, i.e. when
    /// resuming a session
    #[inline]
    pub fn start_timer(&mut self, offset: f64) {
        let adjustment = Duration::from_secs_f64(offset.max(0.0));
        self.start_time = current_time()
            .checked_sub(adjustment)
            .unwrap_or_else(|| Duration::from_secs_f64(0.0));
        self.elapsed = self.elapsed();
    }

    /// Inspect the given status code and increment the appropriate fields
    #[instrument(skip(self), level = "trace")]
    fn add_status_code(&mut self, status: u16) {
        match status {
            100..=199 => self.informatives += 1,
            200..=299 => self.successes += 1,
            300..=399 => self.redirects += 1,
            400..=499 => self.client_errors += 1,
            500..=599 => self.server_errors += 1,
            _ => {
                // anything outside 100-599 is invalid, still counted in the map below
                warn!(%status, "status code is outside of the 100-599 range");
            }
        }

        *self.statuses.entry(status).or_insert(0) += 1;
    }

    /// tally the post-send verdict for one result
    pub(crate) fn update_actions(&mut self, action: Action) {
        *self.actions.entry(action).or_insert(0) += 1;
    }

    /// update total # of requests and average # of requests per second
    #[inline]
    fn common_updates(&mut self) {
        if self.requests == 0.0 && self.start_time == Duration::default() {
            // first update, can set the fuzzer's start time based off of it
            self.start_time = current_time();
        }

        self.requests += 1.0;

        self.elapsed = self.elapsed();

        if self.elapsed == 0.0 {
            // set to 0 if checked_sub failed above
            self.avg_reqs_per_sec = 0.0;
        } else {
            self.avg_reqs_per_sec = self.requests / self.elapsed;
        }
    }

    /// update the internal trackers from a received response
    #[instrument(skip_all, level = "trace")]
    pub(crate) fn update(&mut self, response: &HttpResponse) {
        // note: if any additional entrypoints are added, the common_updates function must be called
        //       from the new entrypoint (i.e. update and update_from_error)
        self.common_updates();
        self.add_status_code(response.status_code());
    }

    /// update the internal trackers from the given error
    ///
    /// only [`FuzzError::RequestError`]s carry enough information to be tallied by kind;
    /// anything else only counts towards the total number of errors
    #[instrument(skip(self), level = "trace")]
    pub(crate) fn update_from_error(&mut self, error: &FuzzError) {
        self.common_updates();

        // increment total # of errors, doesn't matter what kind it is
        self.errors += 1;

        let FuzzError::RequestError { kind, .. } = error else {
            return;
        };

        match kind {
            RequestErrorKind::Body(status)
            | RequestErrorKind::Decode(status)
            | RequestErrorKind::Request(status) => {
                if let Some(code) = status {
                    self.add_status_code(*code);
                }

                self.request_errors += 1;
            }
            RequestErrorKind::Connect(status) => {
                if let Some(code) = status {
                    self.add_status_code(*code);
                }

                self.connection_errors += 1;
            }
            RequestErrorKind::Redirect(status) => {
                if let Some(code) = status {
                    self.add_status_code(*code);
                }

                self.redirection_errors += 1;
            }
            RequestErrorKind::Timeout(_) => {
                self.timeouts += 1;
            }
            _ => {
                warn!(?kind, "Unknown FuzzError::RequestError; only the total was updated");
            }
        }
    }
}

impl Display for Statistics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        #[cfg(feature = "json")]
        return write!(
            f,
            "{}",
            serde_json::to_string(&self).map_err(|_| { std::fmt::Error })?
        );

        #[cfg(not(feature = "json"))]
        return write!(f, "{self:?}");
    }
}
