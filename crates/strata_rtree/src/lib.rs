//! A bounding-box R-tree for per-cell spatial lookup.
//!
//! Nodes hold between [`MIN_DEGREE`] and [`MAX_DEGREE`] children; only the
//! root may hold fewer. Leaves hold `(geometry, bounds)` entries. Overflow is
//! resolved by a quadratic split and underflow by detaching the node and
//! reinserting its geometry. Every stored bound is compared with
//! [`EPSILON`](strata_common::EPSILON) slack.

#![warn(missing_docs)]

pub mod error;
pub mod search;
pub mod tree;

pub use error::RTreeError;
pub use search::Search;
pub use tree::{RTree, MAX_DEGREE, MIN_DEGREE};
