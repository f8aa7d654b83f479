//! Raw http request/response pairs, the unit of work flowing through a fuzz session
#![allow(clippy::use_self)] // clippy false-positive on MessageSection, doesn't want to apply directly to the enums that derive Serialize
mod message;
mod response;

pub use self::message::HttpMessage;
pub use self::response::HttpResponse;

use std::fmt::{self, Display, Formatter};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// the four textual parts of an [`HttpMessage`]
///
/// fuzz locations may only point into the request parts, while
/// searches consider all four
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum MessageSection {
    /// request-line plus header fields
    RequestHeader,

    /// request body
    RequestBody,

    /// status-line plus header fields
    ResponseHeader,

    /// response body
    ResponseBody,
}

impl MessageSection {
    /// `true` for the two sections a fuzz location may point into
    #[must_use]
    pub const fn is_request(self) -> bool {
        matches!(self, Self::RequestHeader | Self::RequestBody)
    }
}

impl Display for MessageSection {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::RequestHeader => "request header",
            Self::RequestBody => "request body",
            Self::ResponseHeader => "response header",
            Self::ResponseBody => "response body",
        };

        write!(f, "{name}")
    }
}
