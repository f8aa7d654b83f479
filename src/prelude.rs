//! small collection of widely used core types and traits
//!
//! The goal in using the prelude is to reduce the number of imports
//! needed to (mostly) only those that have direct impact on setting up
//! and driving a fuzz session.
//!
//! # Traits
//!
//! - [`HttpSender`] - exposes the `send` method on transports such as [`BlockingClient`]
//! - [`Processor`] - exposes the `process_message` and `process_result` hooks
//! - [`PayloadGenerator`] - exposes the `get` method on payload sources
//! - [`EventPublisher`] - exposes the `subscribe` and `notify` methods on the session's publisher
//! - [`Len`] - exposes the `len` method on payload sources and the result table
//! - [`Named`] - exposes the `name` method on processors and payload sources
//!
//! # Structs & Enums
//!
//! - [`HttpFuzzer`] - the fuzz session
//! - [`HttpMessage`] - the core request/response type
//! - [`FuzzLocation`] - a fuzz location bound to its payloads
//! - [`FuzzerOptions`] - engine configuration
//! - [`FuzzResult`] - one recorded result
//! - [`Action`] - a post-send processor's verdict
//!
//! [`BlockingClient`]: crate::client::BlockingClient

// traits that are likely to be used by anyone setting up a fuzzer
pub use crate::client::HttpSender;
pub use crate::events::EventPublisher;
pub use crate::payloads::PayloadGenerator;
pub use crate::processors::Processor;
pub use crate::Len;
pub use crate::Named;

// core structs needed by everyone
pub use crate::actions::Action;
pub use crate::fuzzers::{HttpFuzzer, TaskUtils};
pub use crate::locations::{FuzzLocation, MessageLocation, ReplacementStrategy};
pub use crate::messages::{HttpMessage, MessageSection};
pub use crate::options::FuzzerOptions;
pub use crate::payloads::Wordlist;
pub use crate::results::FuzzResult;
pub use crate::state::SharedState;

// crate's error type
pub use crate::error::FuzzError;
