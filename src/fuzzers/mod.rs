//! the fuzz session engine: a blocking dispatch loop feeding a pool of worker
//! threads, each running one [`FuzzerTask`] at a time
//!
//! a session is put together with a [`FuzzerBuilder`] and driven by
//! [`HttpFuzzer::run`]; other threads may pause, resume, or stop it while it runs
use std::fmt::{self, Display, Formatter};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

pub use self::builder::FuzzerBuilder;
pub use self::http_fuzzer::HttpFuzzer;
pub use self::task::FuzzerTask;
pub use self::utils::TaskUtils;

mod builder;
mod http_fuzzer;
mod task;
mod utils;

/// task id of the baseline message; fuzz tasks are numbered from 1
pub const BASELINE_TASK_ID: usize = 0;

/// error source used for messages that couldn't be sent
pub const SENDER_SOURCE: &str = "http sender";

/// lifecycle of an [`HttpFuzzer`]
///
/// ```text
/// NotStarted -> Running <-> Paused
///                  |           |
///                  v           v
///              Finished     Stopped
/// ```
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum FuzzerState {
    /// [`HttpFuzzer::run`] was not called yet
    #[default]
    NotStarted,

    /// dispatching tasks
    Running,

    /// dispatch is suspended until resumed or stopped; in-flight tasks finish
    Paused,

    /// stopped before every message was dispatched
    Stopped,

    /// every message was dispatched and every task finished
    Finished,
}

impl Display for FuzzerState {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let state = match self {
            Self::NotStarted => "not started",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Stopped => "stopped",
            Self::Finished => "finished",
        };

        write!(f, "{state}")
    }
}

mod typestate {
    // typestate information for the fuzzer builder; not useful for anything else
    pub trait FuzzerBuildState {}
    pub struct NoSender;
    pub struct NoMessage;
    pub struct NoLocations;
    pub struct HasSender;
    pub struct HasMessage;
    pub struct HasLocations;
    impl FuzzerBuildState for NoSender {}
    impl FuzzerBuildState for NoMessage {}
    impl FuzzerBuildState for NoLocations {}
    impl FuzzerBuildState for HasSender {}
    impl FuzzerBuildState for HasMessage {}
    impl FuzzerBuildState for HasLocations {}
}
