//! Payload sources, modeled around how the substitution values are generated, i.e. from a file/range etc...
mod range;
mod wordlist;

use crate::std_ext::ops::Len;

// re-exported trait, to be available as top-level `payloads` module import for users
pub use crate::std_ext::any::Named;

use std::fmt::{self, Display, Formatter};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tracing::instrument;

// re-exports
pub use self::range::{RangeBuilder, RangePayloads};
pub use self::wordlist::{Wordlist, WordlistBuilder};

/// one concrete substitution value for a fuzz location
#[derive(Clone, Default, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Payload(String);

impl Payload {
    /// the payload text
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// replace the payload text
    pub fn set<T>(&mut self, value: T)
    where
        T: Into<String>,
    {
        self.0 = value.into();
    }
}

impl From<&str> for Payload {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for Payload {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for Payload {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<&str> for Payload {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl PartialEq<str> for Payload {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl Display for Payload {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// a finite, restartable source of payloads for a single fuzz location
///
/// entries are addressed by index so that a replacement strategy can walk a
/// source any number of times without consuming it
pub trait PayloadGenerator: Named + Len {
    /// get a reference to a payload by index
    fn get(&self, index: usize) -> Option<&Payload>;

    /// get a reference to every payload, in order
    #[must_use]
    fn items(&self) -> &[Payload];
}

/// [`PayloadGenerator`] wrapper enum to facilitate static dispatch of [`PayloadGenerator`] methods
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[non_exhaustive]
pub enum PayloadSource {
    /// [`Wordlist`] wrapper
    Wordlist(Wordlist),

    /// [`RangePayloads`] wrapper
    Range(RangePayloads),
}

impl PayloadGenerator for PayloadSource {
    #[instrument(skip(self), level = "trace")]
    fn get(&self, index: usize) -> Option<&Payload> {
        match self {
            Self::Wordlist(source) => source.get(index),
            Self::Range(source) => source.get(index),
        }
    }

    #[instrument(skip_all, level = "trace")]
    fn items(&self) -> &[Payload] {
        match self {
            Self::Wordlist(source) => source.items(),
            Self::Range(source) => source.items(),
        }
    }
}

impl Named for PayloadSource {
    fn name(&self) -> &str {
        match self {
            Self::Wordlist(source) => source.name(),
            Self::Range(source) => source.name(),
        }
    }
}

impl Len for PayloadSource {
    fn len(&self) -> usize {
        match self {
            Self::Wordlist(source) => source.len(),
            Self::Range(source) => source.len(),
        }
    }
}

impl Display for PayloadSource {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Wordlist(source) => source.fmt(f),
            Self::Range(source) => source.fmt(f),
        }
    }
}

impl<'i> IntoIterator for &'i PayloadSource {
    /// the type of the elements being iterated over
    type Item = &'i Payload;

    /// the kind of iterator we're turning the given source into
    type IntoIter = std::slice::Iter<'i, Payload>;

    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        self.items().iter()
    }
}

/// display the type, its length, and the first `n` payloads
fn display_top(f: &mut Formatter<'_>, kind: &str, items: &[Payload], n: usize) -> fmt::Result {
    let peek: Vec<&str> = items.iter().take(n).map(Payload::as_str).collect();

    write!(
        f,
        "{kind}::{{len={}, top-{}={:?}}}",
        items.len(),
        peek.len(),
        peek
    )
}

mod typestate {
    // typestate information for the different payload builders; not useful for anything else
    pub trait PayloadBuildState {}
    pub struct NoItems;
    pub struct NoName;
    pub struct NotUnique;
    pub struct HasItems;
    pub struct HasName;
    pub struct Unique;
    impl PayloadBuildState for NoItems {}
    impl PayloadBuildState for NoName {}
    impl PayloadBuildState for NotUnique {}
    impl PayloadBuildState for HasItems {}
    impl PayloadBuildState for HasName {}
    impl PayloadBuildState for Unique {}
}
