//! Custom error-type definitions
#![allow(clippy::use_self)] // clippy false-positive on RequestErrorKind, doesn't want to apply directly to the enums that derive Serialize
use thiserror::Error;
use url::ParseError;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::messages::MessageSection;

/// primary error-type for the locfuzz library
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum FuzzError {
    /// Represents a failure to open a file while populating a payload source.
    #[error("The file `{path}` for payload population couldn't be opened.")]
    PayloadFileOpenError {
        /// underlying source error-type
        source: std::io::Error,

        /// path to the file that couldn't be opened
        path: String,
    },

    /// Represents all other cases of `std::io::Error`.
    #[error(transparent)]
    IOError {
        /// underlying source error-type
        #[from]
        source: std::io::Error,
    },

    /// Represents a failure to parse the given string into a [`url::Url`](https://docs.rs/url/latest/url/struct.Url.html).
    #[error("The url `{url}` is invalid and couldn't be parsed.")]
    InvalidUrl {
        /// underlying source error-type
        source: ParseError,

        /// the url that couldn't be parsed
        url: String,
    },

    /// Represents a request header whose request-line or header fields couldn't be parsed
    #[error("Could not parse the request header: {reason}")]
    InvalidRequestHeader {
        /// why the header was rejected
        reason: String,
    },

    /// Represents a failure to read the body of a `reqwest::blocking::Response` object
    #[cfg(feature = "reqwest")]
    #[cfg_attr(docsrs, doc(cfg(feature = "reqwest")))]
    #[error("Could not read the response body")]
    ResponseReadError {
        /// underlying source error-type
        #[from]
        source: reqwest::Error,
    },

    /// Represents a failure to generate a [`reqwest::Method`] from a string
    #[error("Could not parse the given http method `{method}`")]
    MethodParseError {
        /// the method that couldn't be parsed
        method: String,
    },

    /// Represents a failure to generate a [`reqwest::Version`] from a string
    #[error(
        "Could not parse the given http version `{version}`. For now, versions must be syntactically correct."
    )]
    InvalidVersionError {
        /// the version that couldn't be parsed
        version: String,
    },

    /// Represents a header name or value that can't be placed on the wire
    #[error("The header `{name}` is malformed and couldn't be sent")]
    MalformedHeader {
        /// name of the offending header
        name: String,
    },

    /// Represents a failure to parse an object into JSON
    #[cfg(feature = "json")]
    #[cfg_attr(docsrs, doc(cfg(feature = "json")))]
    #[error("Could not convert the given object to/from JSON")]
    JSONParseError {
        /// underlying source error-type
        #[from]
        source: serde_json::Error,
    },

    /// Represents an empty payload source, which isn't allowed
    #[error("No entries were found in the payload source `{name}`")]
    EmptyPayloads {
        /// name of the empty payload source
        name: String,
    },

    /// Represents an invalid index passed to [`PayloadGenerator::get`]
    ///
    /// [`PayloadGenerator::get`]: crate::payloads::PayloadGenerator::get
    #[error("Requested entry at `{index}` could not be found in payload source `{name}`")]
    PayloadNotFound {
        /// the name of the payload source
        name: String,

        /// the index that couldn't be found
        index: usize,
    },

    /// Represents a fuzzer that was given zero fuzz locations
    #[error("At least one fuzz location is required")]
    NoFuzzLocations,

    /// Represents a fuzz location that doesn't fit within the message template
    #[error("The location {start}..{end} in {section:?} is invalid: {reason}")]
    InvalidLocation {
        /// section of the message the location points into
        section: MessageSection,

        /// inclusive start offset
        start: usize,

        /// exclusive end offset
        end: usize,

        /// why the location was rejected
        reason: &'static str,
    },

    /// Represents two fuzz locations that share at least one byte
    #[error("The locations {first} and {second} overlap")]
    OverlappingLocations {
        /// display form of the first location
        first: String,

        /// display form of the second location
        second: String,
    },

    /// Represents an invalid parameter passed to some function or constructor
    #[error("Invalid parameter provided, {message}: {param}")]
    InvalidParameter {
        /// the failing parameter
        param: String,

        /// the associated message to help the user
        message: &'static str,
    },

    /// Represents a regular expression that failed to compile
    #[error("The pattern `{pattern}` is not a valid regular expression")]
    InvalidRegex {
        /// underlying source error-type
        source: regex::Error,

        /// the pattern that couldn't be compiled
        pattern: String,
    },

    /// Represents a failure encountered during sending a request / receiving a response
    #[error("An error occurred while sending the request: {kind:?} {message}")]
    RequestError {
        /// what category of error occurred
        kind: RequestErrorKind,

        /// the underlying error message
        message: String,
    },

    /// Represents a message sent without a response being attached to it
    #[error("The message has no response")]
    MissingResponse,

    /// Represents a processor that failed while handling a message or result
    #[error("Processor `{processor}` failed: {reason}")]
    ProcessorFailure {
        /// name of the failing processor
        processor: String,

        /// the failure reason reported by the processor
        reason: String,
    },

    /// Represents a failure to persist a message to the history store
    #[error("Could not persist the message: {reason}")]
    PersistenceError {
        /// why the history store refused the message
        reason: String,
    },

    /// Represents a call to [`HttpFuzzer::run`] on a fuzzer that already ran
    ///
    /// [`HttpFuzzer::run`]: crate::fuzzers::HttpFuzzer::run
    #[error("The fuzzer was already started")]
    AlreadyStarted,
}

impl FuzzError {
    /// `true` when the error came from the network, as opposed to a malformed message
    ///
    /// only network failures are worth another attempt
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::RequestError { kind, .. } => !matches!(kind, RequestErrorKind::Redirect(_)),
            Self::IOError { .. } => true,
            #[cfg(feature = "reqwest")]
            Self::ResponseReadError { .. } => true,
            _ => false,
        }
    }
}

/// Used to differentiate between different types of errors that occur when making requests.
///
/// That differentiation is then used internally to update the proper error counts in [`Statistics`]
///
/// [`Statistics`]: crate::statistics::Statistics
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Copy, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
#[non_exhaustive]
pub enum RequestErrorKind {
    /// Represents a failure to read a response body
    Body(Option<u16>),

    /// Represents a failure during client connection to target
    Connect(Option<u16>),

    /// Represents a failure to decode a response body
    Decode(Option<u16>),

    /// Represents a failure to related to redirection, i.e. too many redirects
    Redirect(Option<u16>),

    /// Represents a failure related to the request
    Request(Option<u16>),

    /// Represents a timeout during the request
    Timeout(Option<u16>),

    /// Represents an unexpected error
    #[default]
    Unknown,
}

#[cfg(test)]
mod tests {
    use super::*;

    /// only network-level failures are considered worth retrying
    #[test]
    fn transient_errors_are_network_errors() {
        let connect = FuzzError::RequestError {
            kind: RequestErrorKind::Connect(None),
            message: String::from("refused"),
        };
        assert!(connect.is_transient());

        let redirect = FuzzError::RequestError {
            kind: RequestErrorKind::Redirect(Some(302)),
            message: String::from("too many redirects"),
        };
        assert!(!redirect.is_transient());

        let header = FuzzError::InvalidRequestHeader {
            reason: String::from("empty"),
        };
        assert!(!header.is_transient());
    }
}
