//! Network equivalence between the exports of a cell.
//!
//! For every cell of a snapshot, [`EquivalentExports`] records which exports
//! are electrically joined inside the cell under three connectivity
//! policies of increasing coarseness: topological shorts only
//! ([`EquivPolicy::N`](strata_tech::EquivPolicy::N)), plus simple resistors
//! (`P`), plus complex resistors (`A`). Subcells are computed before the
//! cells that place them and feed their own tables into the parent.

#![warn(missing_docs)]

pub mod equiv;
pub mod error;
pub mod network;
pub mod union_find;

pub use equiv::EquivalentExports;
pub use error::NetlistError;
pub use network::NetworkTable;
pub use union_find::UnionFind;
