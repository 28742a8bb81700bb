//! Error types for identity allocation and lookup.

use crate::ids::{ArcProtoId, CellId, ExportId, LibId, PrimitiveNodeId, PrimitivePortId, TechId};

/// Errors raised by the [`IdRegistry`](crate::IdRegistry).
///
/// Every variant reports a contract violation by the caller or a corrupted
/// registry; none of them is recoverable by retrying.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    /// A new identity was requested after the registry was frozen.
    #[error("cannot create {kind} '{name}': id registry is read-only")]
    ReadOnly {
        /// Kind of identity requested.
        kind: &'static str,
        /// Requested name.
        name: String,
    },

    /// The technology id was never allocated.
    #[error("unknown technology {0}")]
    UnknownTech(TechId),

    /// The library id was never allocated.
    #[error("unknown library {0}")]
    UnknownLib(LibId),

    /// The cell id was never allocated.
    #[error("unknown cell {0}")]
    UnknownCell(CellId),

    /// The export id was never allocated.
    #[error("unknown export {0}")]
    UnknownExport(ExportId),

    /// The primitive node id was never allocated.
    #[error("unknown primitive node {0}")]
    UnknownPrimitiveNode(PrimitiveNodeId),

    /// The primitive port id was never allocated.
    #[error("unknown primitive port {0}")]
    UnknownPrimitivePort(PrimitivePortId),

    /// The arc prototype id was never allocated.
    #[error("unknown arc prototype {0}")]
    UnknownArcProto(ArcProtoId),

    /// A usage index past the end of the parent's usage list.
    #[error("cell {parent} has no usage #{index}")]
    UnknownUsage {
        /// Parent cell.
        parent: CellId,
        /// Requested usage index.
        index: u32,
    },

    /// A set of export names contained the same name twice.
    #[error("duplicate export name '{name}' in {cell}")]
    DuplicateExport {
        /// Cell receiving the exports.
        cell: CellId,
        /// Repeated name.
        name: String,
    },

    /// A string that is not of the form `name{view}`.
    #[error("invalid cell name '{0}'")]
    BadCellName(String),

    /// The registry's arrays and name maps disagree.
    #[error("id registry corrupted: {0}")]
    Corrupt(String),
}
