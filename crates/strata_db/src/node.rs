//! Immutable node instances.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strata_common::{Name, Orientation, Point, Rect};
use strata_ids::{NodeId, NodeProtoId};

use crate::error::DbError;
use crate::flags::NodeFlags;
use crate::variable::{Variable, Variables};

/// One node instance: a placed primitive or subcell.
///
/// Records are shared through `Arc` and never mutated. Each `with_*` method
/// returns the same `Arc` when the requested value is already in place, so
/// callers can detect "nothing changed" with [`Arc::ptr_eq`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImmutableNodeInst {
    /// Id, unique within the parent cell.
    pub node_id: NodeId,
    /// Primitive or subcell being placed.
    pub proto: NodeProtoId,
    /// Instance name.
    pub name: Name,
    /// Rotation and mirroring.
    pub orient: Orientation,
    /// Placement point in parent coordinates.
    pub anchor: Point,
    /// Width before orientation; ignored for subcells.
    pub width: f64,
    /// Height before orientation; ignored for subcells.
    pub height: f64,
    /// Instance flags.
    pub flags: NodeFlags,
    /// Technology-specific bits, opaque to the database.
    pub tech_bits: u32,
    /// Attached variables.
    pub vars: Variables,
}

impl ImmutableNodeInst {
    /// Creates a node with default orientation and no variables.
    pub fn new(
        node_id: NodeId,
        proto: NodeProtoId,
        name: &str,
        anchor: Point,
        width: f64,
        height: f64,
    ) -> Result<Arc<Self>, DbError> {
        check_size(width, height)?;
        Ok(Arc::new(Self {
            node_id,
            proto,
            name: Name::new(name),
            orient: Orientation::R0,
            anchor,
            width,
            height,
            flags: NodeFlags::empty(),
            tech_bits: 0,
            vars: Variables::default(),
        }))
    }

    fn update(self: &Arc<Self>, f: impl FnOnce(&mut Self)) -> Arc<Self> {
        let mut next = Self::clone(self);
        f(&mut next);
        Arc::new(next)
    }

    /// Returns the node renamed.
    pub fn with_name(self: &Arc<Self>, name: &str) -> Arc<Self> {
        if self.name.as_str() == name {
            return Arc::clone(self);
        }
        self.update(|n| n.name = Name::new(name))
    }

    /// Returns the node moved to `anchor`.
    pub fn with_anchor(self: &Arc<Self>, anchor: Point) -> Arc<Self> {
        if self.anchor == anchor {
            return Arc::clone(self);
        }
        self.update(|n| n.anchor = anchor)
    }

    /// Returns the node with another orientation.
    pub fn with_orient(self: &Arc<Self>, orient: Orientation) -> Arc<Self> {
        if self.orient == orient {
            return Arc::clone(self);
        }
        self.update(|n| n.orient = orient)
    }

    /// Returns the node resized. Negative sizes are rejected.
    pub fn with_size(self: &Arc<Self>, width: f64, height: f64) -> Result<Arc<Self>, DbError> {
        check_size(width, height)?;
        if self.width == width && self.height == height {
            return Ok(Arc::clone(self));
        }
        Ok(self.update(|n| {
            n.width = width;
            n.height = height;
        }))
    }

    /// Returns the node with `flag` set or cleared.
    pub fn with_flag(self: &Arc<Self>, flag: NodeFlags, on: bool) -> Arc<Self> {
        let flags = self.flags.set(flag, on);
        if flags == self.flags {
            return Arc::clone(self);
        }
        self.update(|n| n.flags = flags)
    }

    /// Returns the node with new technology bits.
    pub fn with_tech_bits(self: &Arc<Self>, tech_bits: u32) -> Arc<Self> {
        if self.tech_bits == tech_bits {
            return Arc::clone(self);
        }
        self.update(|n| n.tech_bits = tech_bits)
    }

    /// Returns the node with `var` added or replaced.
    pub fn with_variable(self: &Arc<Self>, var: Variable) -> Arc<Self> {
        match self.vars.with(var) {
            Some(vars) => self.update(|n| n.vars = vars),
            None => Arc::clone(self),
        }
    }

    /// Returns the node without variable `key`.
    pub fn without_variable(self: &Arc<Self>, key: &str) -> Arc<Self> {
        match self.vars.without(key) {
            Some(vars) => self.update(|n| n.vars = vars),
            None => Arc::clone(self),
        }
    }

    /// Returns `true` for subcell instances.
    pub fn is_cell_instance(&self) -> bool {
        self.proto.is_cell()
    }

    /// Bounds of a primitive instance: its size box placed at the anchor.
    pub fn primitive_bounds(&self) -> Rect {
        let local = Rect::from_center(Point::ORIGIN, self.width, self.height);
        self.orient.place(&local, self.anchor)
    }

    /// Bounds of an instance whose prototype occupies `proto_bounds` in its
    /// own coordinates.
    pub fn placed_bounds(&self, proto_bounds: &Rect) -> Rect {
        self.orient.place(proto_bounds, self.anchor)
    }
}

pub(crate) fn check_size(width: f64, height: f64) -> Result<(), DbError> {
    if !width.is_finite() || width < 0.0 {
        return Err(DbError::InvalidSize { what: "node width", value: width });
    }
    if !height.is_finite() || height < 0.0 {
        return Err(DbError::InvalidSize { what: "node height", value: height });
    }
    Ok(())
}
