use crate::actions::Action;

use std::ops::{BitAnd, BitOr};

/// simple trait to add a `.len()` equivalent to implementors
#[allow(clippy::len_without_is_empty)]
pub trait Len {
    /// get the length of the implementing object
    #[must_use]
    fn len(&self) -> usize;

    /// `true` when the implementing object holds nothing
    #[must_use]
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Len for Vec<T> {
    fn len(&self) -> usize {
        <Self>::len(self)
    }
}

impl<T> Len for &[T] {
    fn len(&self) -> usize {
        <[T]>::len(self)
    }
}

/// logical AND of two verdicts; `Discard` wins
///
/// | A         | B         | A & B     |
/// |-----------|-----------|-----------|
/// | `Keep`    | `Keep`    | `Keep`    |
/// | `Keep`    | `Discard` | `Discard` |
/// | `Discard` | `Keep`    | `Discard` |
/// | `Discard` | `Discard` | `Discard` |
impl BitAnd for Action {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self::Output {
        match (self, rhs) {
            (Self::Keep, Self::Keep) => Self::Keep,
            _ => Self::Discard,
        }
    }
}

/// logical OR of two verdicts; `Keep` wins
impl BitOr for Action {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        match (self, rhs) {
            (Self::Discard, Self::Discard) => Self::Discard,
            _ => Self::Keep,
        }
    }
}
