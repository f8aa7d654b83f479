//! Results produced by a fuzz session and the bounded table they're recorded into
use std::collections::{HashMap, VecDeque};
use std::fmt::{self, Display, Formatter};

use regex::Regex;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tracing::{instrument, trace};

use crate::findings::Alert;
use crate::history::HistoryId;
use crate::messages::{HttpMessage, MessageSection};
use crate::payloads::Payload;
use crate::std_ext::ops::Len;

/// type label of the result recorded for the baseline message
pub const ORIGINAL_MESSAGE: &str = "original message";

/// type label of the result recorded for every fuzzed message
pub const RESULT: &str = "result";

/// type label of the results injected for each redirect hop
pub const REDIRECT: &str = "Redirect";

const SEARCHABLE_SECTIONS: [MessageSection; 4] = [
    MessageSection::RequestHeader,
    MessageSection::RequestBody,
    MessageSection::ResponseHeader,
    MessageSection::ResponseBody,
];

/// the outcome of one sent message
///
/// # Examples
///
/// ```
/// # use locfuzz::messages::HttpMessage;
/// # use locfuzz::payloads::Payload;
/// # use locfuzz::results::{FuzzResult, RESULT};
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let message = HttpMessage::get("http://localhost/?q=admin")?;
/// let mut result = FuzzResult::new(1, RESULT, message, vec![Payload::from("admin")]);
///
/// result.add_custom_state("reflected", "yes");
///
/// assert_eq!(result.payloads(), &["admin"]);
/// assert_eq!(result.custom_state("reflected"), Some("yes"));
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FuzzResult {
    task_id: usize,
    kind: String,
    message: HttpMessage,
    payloads: Vec<Payload>,
    custom_state: HashMap<String, String>,
    alerts: Vec<Alert>,
}

impl FuzzResult {
    /// create a new result with no custom state and no alerts
    #[must_use]
    pub fn new(task_id: usize, kind: &str, message: HttpMessage, payloads: Vec<Payload>) -> Self {
        Self {
            task_id,
            kind: kind.to_string(),
            message,
            payloads,
            custom_state: HashMap::new(),
            alerts: Vec::new(),
        }
    }

    /// id of the task that produced this result; the baseline is task 0
    #[must_use]
    pub const fn task_id(&self) -> usize {
        self.task_id
    }

    /// type label, i.e. [`RESULT`] or [`ORIGINAL_MESSAGE`]
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// the sent message, with its response attached
    #[must_use]
    pub const fn message(&self) -> &HttpMessage {
        &self.message
    }

    /// the payloads that produced the message, in location order
    #[must_use]
    pub fn payloads(&self) -> &[Payload] {
        &self.payloads
    }

    /// every key/value pair processors attached to this result
    #[must_use]
    pub const fn custom_states(&self) -> &HashMap<String, String> {
        &self.custom_state
    }

    /// the value processors attached under `key`
    #[must_use]
    pub fn custom_state(&self, key: &str) -> Option<&str> {
        self.custom_state.get(key).map(String::as_str)
    }

    /// attach `value` under `key`, replacing whatever was there
    pub fn add_custom_state(&mut self, key: &str, value: &str) {
        self.custom_state.insert(key.to_string(), value.to_string());
    }

    /// drop the value under `key`; absent keys are ignored
    pub fn remove_custom_state(&mut self, key: &str) {
        self.custom_state.remove(key);
    }

    /// alerts raised against this result
    #[must_use]
    pub fn alerts(&self) -> &[Alert] {
        &self.alerts
    }

    pub(crate) fn add_alert(&mut self, alert: Alert) {
        self.alerts.push(alert);
    }

    pub(crate) fn set_history_id(&mut self, id: HistoryId) {
        self.message.set_history_id(id);
    }
}

impl Display for FuzzResult {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let status = self
            .message
            .response()
            .map_or_else(|| String::from("-"), |response| response.status_code().to_string());

        write!(
            f,
            "#{} [{}] {} {} {} {:?}",
            self.task_id,
            self.kind,
            status,
            self.message.method(),
            self.message.request_target(),
            self.payloads.iter().map(Payload::as_str).collect::<Vec<_>>()
        )
    }
}

/// one hit of [`ResultTable::search`]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SearchMatch {
    /// the pattern matched `start..end` of `section`
    Location {
        /// id of the result's task
        task_id: usize,

        /// the section the match was found in
        section: MessageSection,

        /// byte offset of the start of the match
        start: usize,

        /// byte offset one past the end of the match
        end: usize,
    },

    /// the whole message of a result the pattern did not match (inverse searches)
    Message {
        /// id of the result's task
        task_id: usize,
    },
}

impl SearchMatch {
    /// id of the task whose result matched
    #[must_use]
    pub const fn task_id(&self) -> usize {
        match self {
            Self::Location { task_id, .. } | Self::Message { task_id } => *task_id,
        }
    }
}

/// bounded, insertion-ordered table of recorded results
///
/// once `capacity` results are held, recording another evicts the oldest
#[derive(Clone, Debug, Default)]
pub struct ResultTable {
    results: VecDeque<FuzzResult>,
    capacity: usize,
    evicted: usize,
}

impl ResultTable {
    /// create an empty table holding at most `capacity` results
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            results: VecDeque::new(),
            capacity: capacity.max(1),
            evicted: 0,
        }
    }

    /// record a result, returning the result it displaced, if any
    pub fn push(&mut self, result: FuzzResult) -> Option<FuzzResult> {
        let displaced = if self.results.len() >= self.capacity {
            self.evicted += 1;
            self.results.pop_front()
        } else {
            None
        };

        self.results.push_back(result);

        displaced
    }

    /// the results held, oldest first
    pub fn iter(&self) -> impl Iterator<Item = &FuzzResult> {
        self.results.iter()
    }

    /// the result at `index`, oldest first
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&FuzzResult> {
        self.results.get(index)
    }

    /// number of results evicted to make room for newer ones
    #[must_use]
    pub const fn evicted(&self) -> usize {
        self.evicted
    }

    /// the maximum number of results held
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// forget every result
    pub fn clear(&mut self) {
        self.results.clear();
        self.evicted = 0;
    }

    /// scan every result's message (all four sections) for `pattern`
    ///
    /// with `inverse` set, each result without a single match yields one
    /// [`SearchMatch::Message`] instead.
    ///
    /// `max` is checked between results: once the running total reaches it no
    /// further results are scanned, but a result's matches are never split, so
    /// the returned total may exceed `max`.
    #[instrument(skip_all, level = "trace")]
    #[must_use]
    pub fn search(&self, pattern: &Regex, inverse: bool, max: Option<usize>) -> Vec<SearchMatch> {
        let mut matches = Vec::new();

        for result in &self.results {
            if max.map_or(false, |max| matches.len() >= max) {
                trace!(found = matches.len(), "search limit reached");
                break;
            }

            let found = Self::matches_in(pattern, result);

            if inverse {
                if found.is_empty() {
                    matches.push(SearchMatch::Message {
                        task_id: result.task_id(),
                    });
                }
            } else {
                matches.extend(found);
            }
        }

        matches
    }

    fn matches_in(pattern: &Regex, result: &FuzzResult) -> Vec<SearchMatch> {
        let mut found = Vec::new();

        for section in SEARCHABLE_SECTIONS {
            let text = result.message().text_for(section);

            found.extend(pattern.find_iter(&text).map(|hit| SearchMatch::Location {
                task_id: result.task_id(),
                section,
                start: hit.start(),
                end: hit.end(),
            }));
        }

        found
    }
}

impl Len for ResultTable {
    fn len(&self) -> usize {
        self.results.len()
    }
}
