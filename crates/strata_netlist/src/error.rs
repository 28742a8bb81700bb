//! Error types for network equivalence.

use strata_db::DbError;
use strata_ids::{CellId, NodeId, PortProtoId, PrimitiveNodeId};

/// Errors raised while computing export equivalence.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NetlistError {
    /// The snapshot could not be ordered or read.
    #[error(transparent)]
    Db(#[from] DbError),

    /// A placed subcell has no equivalence table yet.
    #[error("{cell}: subcell {subcell} has not been computed")]
    MissingSubcell {
        /// The parent cell.
        cell: CellId,
        /// The subcell.
        subcell: CellId,
    },

    /// A primitive is missing from the cell's technologies.
    #[error("{cell}: node {node} uses unknown primitive {proto}")]
    UnknownPrimitive {
        /// The cell.
        cell: CellId,
        /// The node.
        node: NodeId,
        /// The primitive.
        proto: PrimitiveNodeId,
    },

    /// A port reference lies outside its node's port range.
    #[error("{cell}: port {port} of {node} is out of range")]
    PortOutOfRange {
        /// The cell.
        cell: CellId,
        /// The node.
        node: NodeId,
        /// The port.
        port: PortProtoId,
    },

    /// The class table is not a partition.
    #[error("{cell}: equivalence check failed: {detail}")]
    Check {
        /// The cell.
        cell: CellId,
        /// What did not hold.
        detail: String,
    },
}
