//! home to locfuzz's cross-cutting traits, utilities, etc... Follows
//! the same structure as [`std`] where possible.

pub mod any;
pub mod ops;
pub mod str;
pub mod time;
