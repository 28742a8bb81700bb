//! Immutable arc instances.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strata_common::{Name, Point, Rect};
use strata_ids::{ArcId, ArcProtoId, NodeId, PortProtoId};
use strata_tech::shape;

use crate::error::DbError;
use crate::flags::ArcFlags;
use crate::variable::{Variable, Variables};

/// One end of an arc: the node and port it attaches to, and where.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ArcEnd {
    /// Attached node.
    pub node: NodeId,
    /// Port on that node's prototype.
    pub port: PortProtoId,
    /// Location in parent coordinates.
    pub location: Point,
}

impl ArcEnd {
    /// Creates an arc end.
    pub fn new(node: NodeId, port: impl Into<PortProtoId>, location: Point) -> Self {
        Self {
            node,
            port: port.into(),
            location,
        }
    }
}

/// One arc instance: a wire between two node ports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImmutableArcInst {
    /// Id, unique within the parent cell.
    pub arc_id: ArcId,
    /// Wire type.
    pub proto: ArcProtoId,
    /// Instance name.
    pub name: Name,
    /// Tail end.
    pub tail: ArcEnd,
    /// Head end.
    pub head: ArcEnd,
    /// Full width.
    pub width: f64,
    /// Direction from tail to head in tenths of a degree.
    pub angle: u16,
    /// Instance flags.
    pub flags: ArcFlags,
    /// Attached variables.
    pub vars: Variables,
}

impl ImmutableArcInst {
    /// Creates an arc with default flags. The angle follows the ends.
    pub fn new(
        arc_id: ArcId,
        proto: ArcProtoId,
        name: &str,
        tail: ArcEnd,
        head: ArcEnd,
        width: f64,
    ) -> Result<Arc<Self>, DbError> {
        check_width(width)?;
        Ok(Arc::new(Self {
            arc_id,
            proto,
            name: Name::new(name),
            angle: shape::direction_angle(tail.location, head.location).unwrap_or(0),
            tail,
            head,
            width,
            flags: ArcFlags::DEFAULT,
            vars: Variables::default(),
        }))
    }

    fn update(self: &Arc<Self>, f: impl FnOnce(&mut Self)) -> Arc<Self> {
        let mut next = Self::clone(self);
        f(&mut next);
        Arc::new(next)
    }

    /// Returns the arc renamed.
    pub fn with_name(self: &Arc<Self>, name: &str) -> Arc<Self> {
        if self.name.as_str() == name {
            return Arc::clone(self);
        }
        self.update(|a| a.name = Name::new(name))
    }

    /// Returns the arc with new end locations. A zero-length result keeps
    /// the previous angle.
    pub fn with_locations(self: &Arc<Self>, tail: Point, head: Point) -> Arc<Self> {
        if self.tail.location == tail && self.head.location == head {
            return Arc::clone(self);
        }
        let angle = shape::direction_angle(tail, head).unwrap_or(self.angle);
        self.update(|a| {
            a.tail.location = tail;
            a.head.location = head;
            a.angle = angle;
        })
    }

    /// Returns the arc with an explicit angle. Only meaningful for
    /// zero-length arcs; otherwise the ends decide.
    pub fn with_angle(self: &Arc<Self>, angle: u16) -> Arc<Self> {
        let angle = angle % 3600;
        if self.angle == angle || self.tail.location != self.head.location {
            return Arc::clone(self);
        }
        self.update(|a| a.angle = angle)
    }

    /// Returns the arc with a different width. Negative widths are rejected.
    pub fn with_width(self: &Arc<Self>, width: f64) -> Result<Arc<Self>, DbError> {
        check_width(width)?;
        if self.width == width {
            return Ok(Arc::clone(self));
        }
        Ok(self.update(|a| a.width = width))
    }

    /// Returns the arc with `flag` set or cleared.
    pub fn with_flag(self: &Arc<Self>, flag: ArcFlags, on: bool) -> Arc<Self> {
        let flags = self.flags.set(flag, on);
        if flags == self.flags {
            return Arc::clone(self);
        }
        self.update(|a| a.flags = flags)
    }

    /// Returns the arc with `var` added or replaced.
    pub fn with_variable(self: &Arc<Self>, var: Variable) -> Arc<Self> {
        match self.vars.with(var) {
            Some(vars) => self.update(|a| a.vars = vars),
            None => Arc::clone(self),
        }
    }

    /// Returns the arc without variable `key`.
    pub fn without_variable(self: &Arc<Self>, key: &str) -> Arc<Self> {
        match self.vars.without(key) {
            Some(vars) => self.update(|a| a.vars = vars),
            None => Arc::clone(self),
        }
    }

    /// The tail end (`false`) or head end (`true`).
    pub fn end(&self, head: bool) -> &ArcEnd {
        if head {
            &self.head
        } else {
            &self.tail
        }
    }

    /// Returns `true` if the arc runs horizontally or vertically.
    pub fn is_manhattan(&self) -> bool {
        self.angle % 900 == 0
    }

    /// Bounds of the arc body.
    ///
    /// With `easy` set an axis-parallel arc takes the rectangular fast path;
    /// everything else builds the outline.
    pub fn bounds(&self, easy: bool) -> Rect {
        let tail_ext = self.flags.contains(ArcFlags::TAIL_EXTENDED);
        let head_ext = self.flags.contains(ArcFlags::HEAD_EXTENDED);
        let (t, h) = (self.tail.location, self.head.location);
        let fast = if easy {
            shape::easy_arc_bounds(t, h, self.angle, self.width, tail_ext, head_ext)
        } else {
            None
        };
        fast.unwrap_or_else(|| {
            shape::outline_bounds(t, h, self.angle, self.width, tail_ext, head_ext)
        })
    }
}

pub(crate) fn check_width(width: f64) -> Result<(), DbError> {
    if !width.is_finite() || width < 0.0 {
        return Err(DbError::InvalidSize { what: "arc width", value: width });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_ids::{PrimitiveNodeId, TechId};

    fn wire(tail: Point, head: Point) -> Arc<ImmutableArcInst> {
        let tech = TechId::from_raw(0);
        let port = PrimitiveNodeId::new(tech, 0).port(0);
        ImmutableArcInst::new(
            ArcId::from_raw(3),
            ArcProtoId::new(tech, 0),
            "w",
            ArcEnd::new(NodeId::from_raw(0), port, tail),
            ArcEnd::new(NodeId::from_raw(1), port, head),
            2.0,
        )
        .unwrap()
    }

    #[test]
    fn angle_follows_ends() {
        let a = wire(Point::ORIGIN, Point::new(0.0, 10.0));
        assert_eq!(a.angle, 900);
        assert!(a.is_manhattan());
        let b = a.with_locations(Point::ORIGIN, Point::new(-4.0, 0.0));
        assert_eq!(b.angle, 1800);
        let c = b.with_locations(Point::ORIGIN, Point::ORIGIN);
        assert_eq!(c.angle, 1800);
    }

    #[test]
    fn no_op_updates_return_same_instance() {
        let a = wire(Point::ORIGIN, Point::new(10.0, 0.0));
        assert!(Arc::ptr_eq(&a, &a.with_name("w")));
        assert!(Arc::ptr_eq(&a, &a.with_locations(Point::ORIGIN, Point::new(10.0, 0.0))));
        assert!(Arc::ptr_eq(&a, &a.with_width(2.0).unwrap()));
        assert!(Arc::ptr_eq(&a, &a.with_flag(ArcFlags::TAIL_EXTENDED, true)));
        assert!(Arc::ptr_eq(&a, &a.with_angle(450)));
    }

    #[test]
    fn non_finite_width_rejected() {
        let a = wire(Point::ORIGIN, Point::new(10.0, 0.0));
        for bad in [f64::NAN, f64::INFINITY, -1.0] {
            assert!(matches!(a.with_width(bad), Err(DbError::InvalidSize { what: "arc width", .. })));
        }
    }

    #[test]
    fn easy_and_outline_bounds_agree_on_manhattan_arcs() {
        let a = wire(Point::ORIGIN, Point::new(10.0, 0.0));
        let easy = a.bounds(true);
        assert!(easy.approx_eq(&Rect::new(-1.0, -1.0, 11.0, 1.0)));
        assert!(easy.approx_eq(&a.bounds(false)));
    }

    #[test]
    fn diagonal_arc_uses_outline() {
        let a = wire(Point::ORIGIN, Point::new(10.0, 10.0));
        assert!(!a.is_manhattan());
        let b = a.bounds(true);
        assert!(b.hi_x() > 10.0 && b.lo_x() < 0.0);
    }
}
