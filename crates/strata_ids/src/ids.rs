//! Id newtypes for every identity the database hands out.
//!
//! Top-level ids (technology, library, cell) are dense `u32` indices into the
//! registry. Child ids (primitive node, arc prototype, primitive port,
//! export) pair their parent id with a chronological index that is assigned
//! at creation and survives renames. Node and arc ids are local to one cell.

use crate::arena::ArenaId;
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
        pub struct $name(u32);

        impl $name {
            /// Creates an id from a raw `u32` index.
            pub fn from_raw(index: u32) -> Self {
                Self(index)
            }

            /// Returns the raw `u32` index.
            pub fn as_raw(self) -> u32 {
                self.0
            }

            /// Returns the raw index widened for slice indexing.
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl ArenaId for $name {
            fn from_raw(index: u32) -> Self {
                Self(index)
            }

            fn as_raw(self) -> u32 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "#{}"), self.0)
            }
        }
    };
}

define_id!(
    /// A technology: a read-only table of primitive nodes and arc prototypes.
    TechId,
    "tech"
);

define_id!(
    /// A library of cells.
    LibId,
    "lib"
);

define_id!(
    /// A cell (one view of a circuit definition).
    CellId,
    "cell"
);

define_id!(
    /// A node instance, unique within its parent cell.
    NodeId,
    "node"
);

define_id!(
    /// An arc instance, unique within its parent cell.
    ArcId,
    "arc"
);

/// A primitive node prototype owned by a technology.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
pub struct PrimitiveNodeId {
    tech: TechId,
    index: u32,
}

impl PrimitiveNodeId {
    /// Creates the id of the `index`-th primitive node of `tech`.
    pub fn new(tech: TechId, index: u32) -> Self {
        Self { tech, index }
    }

    /// The owning technology.
    pub fn tech(self) -> TechId {
        self.tech
    }

    /// Chronological index within the technology.
    pub fn index(self) -> u32 {
        self.index
    }

    /// Id of this node's `chron`-th port.
    pub fn port(self, chron: u32) -> PrimitivePortId {
        PrimitivePortId::new(self, chron)
    }
}

impl fmt::Display for PrimitiveNodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/node#{}", self.tech, self.index)
    }
}

/// An arc prototype (wire type) owned by a technology.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
pub struct ArcProtoId {
    tech: TechId,
    index: u32,
}

impl ArcProtoId {
    /// Creates the id of the `index`-th arc prototype of `tech`.
    pub fn new(tech: TechId, index: u32) -> Self {
        Self { tech, index }
    }

    /// The owning technology.
    pub fn tech(self) -> TechId {
        self.tech
    }

    /// Chronological index within the technology.
    pub fn index(self) -> u32 {
        self.index
    }
}

impl fmt::Display for ArcProtoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/arc#{}", self.tech, self.index)
    }
}

/// A port on a primitive node prototype.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
pub struct PrimitivePortId {
    node: PrimitiveNodeId,
    chron: u32,
}

impl PrimitivePortId {
    /// Creates the id of port `chron` on `node`.
    pub fn new(node: PrimitiveNodeId, chron: u32) -> Self {
        Self { node, chron }
    }

    /// The owning primitive node.
    pub fn node(self) -> PrimitiveNodeId {
        self.node
    }

    /// Chronological index within the node.
    pub fn chron(self) -> u32 {
        self.chron
    }
}

impl fmt::Display for PrimitivePortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/port#{}", self.node, self.chron)
    }
}

/// An export of a cell.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
pub struct ExportId {
    cell: CellId,
    chron: u32,
}

impl ExportId {
    /// Creates the id of export `chron` on `cell`.
    pub fn new(cell: CellId, chron: u32) -> Self {
        Self { cell, chron }
    }

    /// The cell that owns the export.
    pub fn cell(self) -> CellId {
        self.cell
    }

    /// Chronological index within the cell.
    pub fn chron(self) -> u32 {
        self.chron
    }
}

impl fmt::Display for ExportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/export#{}", self.cell, self.chron)
    }
}

/// The prototype of a node instance.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
pub enum NodeProtoId {
    /// An instance of another cell.
    Cell(CellId),
    /// An instance of a technology primitive.
    Primitive(PrimitiveNodeId),
}

impl NodeProtoId {
    /// Returns the subcell id for cell instances.
    pub fn as_cell(self) -> Option<CellId> {
        match self {
            NodeProtoId::Cell(id) => Some(id),
            NodeProtoId::Primitive(_) => None,
        }
    }

    /// Returns the primitive id for primitive instances.
    pub fn as_primitive(self) -> Option<PrimitiveNodeId> {
        match self {
            NodeProtoId::Primitive(id) => Some(id),
            NodeProtoId::Cell(_) => None,
        }
    }

    /// Returns `true` for subcell instances.
    pub fn is_cell(self) -> bool {
        matches!(self, NodeProtoId::Cell(_))
    }
}

impl fmt::Display for NodeProtoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeProtoId::Cell(id) => write!(f, "{id}"),
            NodeProtoId::Primitive(id) => write!(f, "{id}"),
        }
    }
}

impl From<CellId> for NodeProtoId {
    fn from(id: CellId) -> Self {
        NodeProtoId::Cell(id)
    }
}

impl From<PrimitiveNodeId> for NodeProtoId {
    fn from(id: PrimitiveNodeId) -> Self {
        NodeProtoId::Primitive(id)
    }
}

/// A port on a node prototype: a primitive port or a subcell export.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
pub enum PortProtoId {
    /// A port of a primitive node.
    Primitive(PrimitivePortId),
    /// An export of a subcell.
    Export(ExportId),
}

impl PortProtoId {
    /// The prototype that owns this port.
    pub fn parent(self) -> NodeProtoId {
        match self {
            PortProtoId::Primitive(p) => NodeProtoId::Primitive(p.node()),
            PortProtoId::Export(e) => NodeProtoId::Cell(e.cell()),
        }
    }

    /// Chronological index of the port within its prototype.
    pub fn chron_index(self) -> u32 {
        match self {
            PortProtoId::Primitive(p) => p.chron(),
            PortProtoId::Export(e) => e.chron(),
        }
    }
}

impl fmt::Display for PortProtoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortProtoId::Primitive(id) => write!(f, "{id}"),
            PortProtoId::Export(id) => write!(f, "{id}"),
        }
    }
}

impl From<PrimitivePortId> for PortProtoId {
    fn from(id: PrimitivePortId) -> Self {
        PortProtoId::Primitive(id)
    }
}

impl From<ExportId> for PortProtoId {
    fn from(id: ExportId) -> Self {
        PortProtoId::Export(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn id_roundtrip() {
        let id = CellId::from_raw(42);
        assert_eq!(id.as_raw(), 42);
        assert_eq!(id.index(), 42);
    }

    #[test]
    fn ids_hash_distinctly() {
        let set: HashSet<NodeId> = (0..5).map(NodeId::from_raw).collect();
        assert_eq!(set.len(), 5);
    }

    #[test]
    fn display_includes_parent() {
        let node = PrimitiveNodeId::new(TechId::from_raw(1), 4);
        assert_eq!(node.port(2).to_string(), "tech#1/node#4/port#2");
        let export = ExportId::new(CellId::from_raw(3), 0);
        assert_eq!(export.to_string(), "cell#3/export#0");
    }

    #[test]
    fn port_parent_and_chron() {
        let cell = CellId::from_raw(9);
        let export: PortProtoId = ExportId::new(cell, 5).into();
        assert_eq!(export.parent(), NodeProtoId::Cell(cell));
        assert_eq!(export.chron_index(), 5);

        let prim = PrimitiveNodeId::new(TechId::from_raw(0), 2);
        let port: PortProtoId = prim.port(1).into();
        assert_eq!(port.parent(), NodeProtoId::Primitive(prim));
        assert_eq!(port.chron_index(), 1);
    }

    #[test]
    fn proto_accessors() {
        let cell: NodeProtoId = CellId::from_raw(1).into();
        assert!(cell.is_cell());
        assert_eq!(cell.as_cell(), Some(CellId::from_raw(1)));
        assert!(cell.as_primitive().is_none());
    }

    #[test]
    fn serde_roundtrip() {
        let port = PortProtoId::Export(ExportId::new(CellId::from_raw(2), 7));
        let json = serde_json::to_string(&port).unwrap();
        let back: PortProtoId = serde_json::from_str(&json).unwrap();
        assert_eq!(port, back);
    }
}
