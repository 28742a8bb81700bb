//! Error types for revisions, backups, and the live database.

use strata_common::InternalError;
use strata_ids::{ArcId, ArcProtoId, CellId, ExportId, IdError, LibId, NodeId, PortProtoId};
use strata_rtree::RTreeError;
use strata_tech::TechError;

/// Errors raised while building or editing database content.
///
/// Every variant is a contract violation: the caller asked for content that
/// would break an identity or technology rule. None of them is ever logged
/// and dropped by the database.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DbError {
    /// An identity lookup failed.
    #[error(transparent)]
    Id(#[from] IdError),

    /// A technology lookup failed.
    #[error(transparent)]
    Tech(#[from] TechError),

    /// The per-cell spatial index could not be updated.
    #[error(transparent)]
    RTree(#[from] RTreeError),

    /// A state the database itself should never reach.
    #[error(transparent)]
    Internal(#[from] InternalError),

    /// Two nodes in one cell share an id.
    #[error("{cell}: duplicate node id {node}")]
    DuplicateNode {
        /// The cell.
        cell: CellId,
        /// The repeated id.
        node: NodeId,
    },

    /// Two arcs in one cell share an id.
    #[error("{cell}: duplicate arc id {arc}")]
    DuplicateArc {
        /// The cell.
        cell: CellId,
        /// The repeated id.
        arc: ArcId,
    },

    /// An arc angle is not below a full turn of 3600 tenths of a degree.
    #[error("{cell}: arc {arc} has angle {angle}, expected less than 3600")]
    InvalidAngle {
        /// The cell.
        cell: CellId,
        /// The arc.
        arc: ArcId,
        /// The rejected angle.
        angle: u16,
    },

    /// Two exports in one cell share an id.
    #[error("{cell}: duplicate export {export}")]
    DuplicateExport {
        /// The cell.
        cell: CellId,
        /// The repeated id.
        export: ExportId,
    },

    /// A cell holds more than one cell-center node.
    #[error("{cell}: more than one cell-center node")]
    DuplicateCellCenter {
        /// The cell.
        cell: CellId,
    },

    /// An icon cell instantiates another cell.
    #[error("{cell}: icon cells cannot instantiate {proto}")]
    IconSubcell {
        /// The icon cell.
        cell: CellId,
        /// The instantiated cell.
        proto: CellId,
    },

    /// A cell instantiates itself.
    #[error("{cell}: a cell cannot instantiate itself")]
    SelfInstance {
        /// The cell.
        cell: CellId,
    },

    /// An export record belongs to another cell.
    #[error("export {export} does not belong to {cell}")]
    ForeignExport {
        /// The cell holding the record.
        cell: CellId,
        /// The misplaced export.
        export: ExportId,
    },

    /// An arc end or export refers to a node that is not in the cell.
    #[error("{cell}: {what} refers to missing node {node}")]
    MissingNode {
        /// The cell.
        cell: CellId,
        /// The dangling reference.
        node: NodeId,
        /// What holds the reference.
        what: String,
    },

    /// A port reference does not belong to the prototype of its node.
    #[error("{cell}: port {port} is not on the prototype of {node}")]
    PortMismatch {
        /// The cell.
        cell: CellId,
        /// The node.
        node: NodeId,
        /// The port.
        port: PortProtoId,
    },

    /// A port reference names a port that was never created.
    #[error("{cell}: unknown port {port}")]
    UnknownPort {
        /// The cell.
        cell: CellId,
        /// The port.
        port: PortProtoId,
    },

    /// An arc cannot attach to the port its end names.
    #[error("{cell}: arc {arc} of type {proto} cannot connect to {port}")]
    ArcPortMismatch {
        /// The cell.
        cell: CellId,
        /// The arc.
        arc: ArcId,
        /// The arc prototype.
        proto: ArcProtoId,
        /// The port.
        port: PortProtoId,
    },

    /// A size or width is negative or not finite.
    #[error("{what} must be finite and not negative, got {value}")]
    InvalidSize {
        /// What was being sized.
        what: &'static str,
        /// The rejected value.
        value: f64,
    },

    /// A "with" update tried to change a record's id.
    #[error("record id cannot change from {from} to {to}")]
    IdChanged {
        /// Old id.
        from: String,
        /// New id.
        to: String,
    },

    /// No live library has this id.
    #[error("library {0} is not in the database")]
    NoSuchLibrary(LibId),

    /// No live cell has this id.
    #[error("cell {0} is not in the database")]
    NoSuchCell(CellId),

    /// The cell is already live.
    #[error("cell {0} already exists")]
    CellExists(CellId),

    /// The node is not in the cell.
    #[error("{cell}: no node {node}")]
    NoSuchNode {
        /// The cell.
        cell: CellId,
        /// The node.
        node: NodeId,
    },

    /// The arc is not in the cell.
    #[error("{cell}: no arc {arc}")]
    NoSuchArc {
        /// The cell.
        cell: CellId,
        /// The arc.
        arc: ArcId,
    },

    /// The export is not in the cell.
    #[error("no export {0}")]
    NoSuchExport(ExportId),

    /// The cell is still placed in another cell.
    #[error("{cell} is placed in {parent}")]
    CellInUse {
        /// The cell.
        cell: CellId,
        /// A cell placing it.
        parent: CellId,
    },

    /// The cell usage graph has a cycle.
    #[error("recursive hierarchy through {0}")]
    RecursiveHierarchy(CellId),

    /// Live state differs from the snapshot it should match.
    #[error("{context} is stale: {detail}")]
    Stale {
        /// The object that differs.
        context: String,
        /// How it differs.
        detail: String,
    },

    /// A cached index differs from a fresh recomputation.
    #[error("{context}: check failed: {detail}")]
    Check {
        /// The object that was checked.
        context: String,
        /// What did not match.
        detail: String,
    },
}

impl DbError {
    pub(crate) fn check(context: impl ToString, detail: impl Into<String>) -> Self {
        DbError::Check {
            context: context.to_string(),
            detail: detail.into(),
        }
    }

    pub(crate) fn stale(context: impl ToString, detail: impl Into<String>) -> Self {
        DbError::Stale {
            context: context.to_string(),
            detail: detail.into(),
        }
    }
}

/// Errors raised while writing or reading a persisted snapshot image.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    /// Reading or writing the image file failed.
    #[error("snapshot I/O error at {path}: {source}")]
    Io {
        /// The file.
        path: std::path::PathBuf,
        /// The underlying error.
        source: std::io::Error,
    },

    /// The image could not be encoded.
    #[error("failed to encode snapshot: {0}")]
    Encode(String),

    /// The image could not be decoded.
    #[error("failed to decode snapshot: {0}")]
    Decode(String),

    /// The image header is missing or malformed.
    #[error("invalid snapshot header: {0}")]
    InvalidHeader(String),

    /// The payload does not match the checksum in the header.
    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// Checksum recorded in the header.
        expected: String,
        /// Checksum of the payload read.
        actual: String,
    },

    /// An identity in the image resolves to a different id in the registry.
    #[error("{kind} '{name}' was {stored} when written but resolves to {resolved}")]
    IdMismatch {
        /// Identity kind.
        kind: &'static str,
        /// Identity name.
        name: String,
        /// Id recorded in the image.
        stored: String,
        /// Id the registry returned.
        resolved: String,
    },

    /// An identity could not be resolved.
    #[error(transparent)]
    Id(#[from] IdError),

    /// The decoded content is not a valid database state.
    #[error(transparent)]
    Db(#[from] DbError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_offender() {
        let err = DbError::DuplicateNode {
            cell: CellId::from_raw(2),
            node: NodeId::from_raw(7),
        };
        assert_eq!(err.to_string(), "cell#2: duplicate node id node#7");
    }

    #[test]
    fn id_errors_pass_through() {
        let err: DbError = IdError::UnknownCell(CellId::from_raw(9)).into();
        assert!(err.to_string().contains("cell#9"));
    }
}
