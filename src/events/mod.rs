//! subscribable events for introspection into a running fuzz session
//!
//! Custom events can be defined by simply adding a new type; the [`EventPublisher`]
//! trait provides a simple interface for subscribing to and notifying listeners of
//! events.
//!
//! # Examples
//!
//! Subscribe to the [`FuzzerProgress`] event:
//!
//! ```
//! use locfuzz::events::{EventPublisher, FuzzerProgress};
//! use locfuzz::state::SharedState;
//!
//! let state = SharedState::default();
//!
//! let listener_id = state.events().subscribe(|event: FuzzerProgress| {
//!    println!("{}/{}", event.done, event.total);
//! });
//!
//! // ... fuzzer calls state.events().notify(FuzzerProgress { .. }) ...
//!
//! // unsubscribe from the event
//! if let Some(id) = listener_id {
//!     state.events().unsubscribe::<FuzzerProgress>(id);
//! }
//!
//! assert!(!state.events().has_listeners::<FuzzerProgress>());
//! ```
//!
//! Define a custom event
//!
//! ```
//! use locfuzz::events::EventPublisher;
//! use locfuzz::state::SharedState;
//!
//! let state = SharedState::default();
//!
//! // define a custom event (must be Clone)
//! #[derive(Clone)]
//! struct CustomEvent {
//!    message: String,
//! }
//!
//! let listener_id = state.events().subscribe(|event: CustomEvent| {
//!    assert_eq!(event.message, "hello world");
//! });
//!
//! state.events().notify(CustomEvent {
//!   message: "hello world".to_string(),
//! });
//!
//! assert!(listener_id.is_some());
//! ```

mod publisher;

pub use self::publisher::{EventPublisher, ListenerId, Publisher};

/// emitted once when a fuzzer enters its dispatch loop
#[derive(Copy, Default, Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FuzzerStarted {
    /// number of messages the replacement strategy will produce
    pub total: usize,

    /// the number of threads the fuzzer is configured to use
    pub threads: usize,
}

/// emitted every time a task finishes, whatever its outcome
#[derive(Copy, Default, Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FuzzerProgress {
    /// tasks finished so far
    pub done: usize,

    /// tasks the session will dispatch in total
    pub total: usize,
}

/// emitted when a message round-trip succeeds, before post-processing
#[derive(Copy, Default, Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MessageSent {
    /// id of the task that sent the message; 0 is the baseline
    pub task_id: usize,
}

/// emitted when a result makes it into the result table
#[derive(Default, Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResultRecorded {
    /// id of the task that produced the result
    pub task_id: usize,

    /// the result's type label, i.e. "result" or "Redirect"
    pub kind: String,
}

/// emitted when an error record is appended to the session's error table
#[derive(Default, Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ErrorRecorded {
    /// id of the task the error belongs to
    pub task_id: usize,

    /// what raised the error, i.e. a processor's name
    pub source: String,

    /// human readable description
    pub reason: String,
}

/// emitted when a failing processor is removed from the chain
#[derive(Default, Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProcessorRemoved {
    /// name of the removed processor
    pub name: String,
}

/// emitted once when the dispatch loop exits
#[derive(Copy, Default, Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FuzzerCompleted {
    /// `false` when the session was stopped before every message was dispatched
    pub successfully: bool,
}
