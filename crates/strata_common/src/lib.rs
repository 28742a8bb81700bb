//! Shared foundational types used across the Strata design database.
//!
//! This crate provides interned identifiers, reference-counted names, content
//! hashing for persisted images, planar geometry with a global comparison
//! epsilon, and the internal error type shared by every other crate.

#![warn(missing_docs)]

pub mod geometry;
pub mod hash;
pub mod ident;
pub mod name;
pub mod result;

pub use geometry::{Orientation, Point, Rect, EPSILON};
pub use hash::ContentHash;
pub use ident::{Ident, Interner};
pub use name::Name;
pub use result::{InternalError, StrataResult};
