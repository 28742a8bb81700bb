//! Stable identities for the Strata design database.
//!
//! Every technology, library, cell, export, primitive node, primitive port,
//! and arc prototype is named by a small `Copy` id allocated once by the
//! [`IdRegistry`] and never reused. Ids carry no content: what a cell holds
//! lives in the immutable revisions of `strata_db`, which refer to cells,
//! exports, and primitives only through these ids.

#![warn(missing_docs)]

pub mod arena;
pub mod cell_name;
pub mod error;
pub mod ids;
pub mod registry;

pub use arena::{Arena, ArenaId};
pub use cell_name::{CellName, View};
pub use error::IdError;
pub use ids::{
    ArcId, ArcProtoId, CellId, ExportId, LibId, NodeId, NodeProtoId, PortProtoId,
    PrimitiveNodeId, PrimitivePortId, TechId,
};
pub use registry::{CellUsage, IdRegistry};
