//! represents the verdict a post-send [`Processor`] reaches about a [`FuzzResult`]
//!
//! [`Processor`]: crate::processors::Processor
//! [`FuzzResult`]: crate::results::FuzzResult
#![allow(clippy::use_self)] // clippy false-positive on Action, doesn't want to apply directly to the enums that derive Serialize

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// all possible actions
#[derive(Copy, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[non_exhaustive]
pub enum Action {
    /// retain the current [`FuzzResult`] and pass it to the next processor in the chain
    ///
    /// [`FuzzResult`]: crate::results::FuzzResult
    #[default]
    Keep,

    /// drop the current [`FuzzResult`]; no further processors see it and it is never recorded
    ///
    /// [`FuzzResult`]: crate::results::FuzzResult
    Discard,
}

impl Action {
    /// `true` when the result should still be recorded
    #[must_use]
    pub const fn is_keep(self) -> bool {
        matches!(self, Self::Keep)
    }
}

impl From<bool> for Action {
    fn from(accept: bool) -> Self {
        if accept {
            Self::Keep
        } else {
            Self::Discard
        }
    }
}
