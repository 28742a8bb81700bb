//! Planar geometry: points, axis-aligned rectangles, and instance orientations.
//!
//! All database coordinates are `f64` lambda units. Comparisons that guard
//! structural invariants (R-tree bounds, cached cell bounds) use [`EPSILON`]
//! so that values recomputed along a different arithmetic path still agree.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Tolerance for bounding-box comparisons.
pub const EPSILON: f64 = 1e-6;

/// A point in database coordinates.
#[derive(Clone, Copy, PartialEq, Debug, Default, Serialize, Deserialize)]
pub struct Point {
    /// X coordinate.
    pub x: f64,
    /// Y coordinate.
    pub y: f64,
}

impl Point {
    /// The origin.
    pub const ORIGIN: Point = Point { x: 0.0, y: 0.0 };

    /// Creates a point.
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to `other`.
    pub fn distance(self, other: Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    /// Returns this point shifted by `(dx, dy)`.
    pub fn translate(self, dx: f64, dy: f64) -> Point {
        Point::new(self.x + dx, self.y + dy)
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// An axis-aligned rectangle with inclusive edges.
///
/// Constructors normalize so that `lo_x <= hi_x` and `lo_y <= hi_y`. A
/// zero-area rectangle is a valid value (a pin, a point query).
#[derive(Clone, Copy, PartialEq, Debug, Serialize, Deserialize)]
pub struct Rect {
    lo_x: f64,
    lo_y: f64,
    hi_x: f64,
    hi_y: f64,
}

impl Rect {
    /// Creates a rectangle from two opposite corners in any order.
    pub fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self {
            lo_x: x0.min(x1),
            lo_y: y0.min(y1),
            hi_x: x0.max(x1),
            hi_y: y0.max(y1),
        }
    }

    /// Creates a rectangle of the given size centered on `center`.
    pub fn from_center(center: Point, width: f64, height: f64) -> Self {
        let hw = width.abs() / 2.0;
        let hh = height.abs() / 2.0;
        Self::new(center.x - hw, center.y - hh, center.x + hw, center.y + hh)
    }

    /// A zero-area rectangle at `p`.
    pub fn from_point(p: Point) -> Self {
        Self::new(p.x, p.y, p.x, p.y)
    }

    /// Smallest rectangle enclosing every point, or `None` for no points.
    pub fn bounding(points: impl IntoIterator<Item = Point>) -> Option<Rect> {
        points
            .into_iter()
            .map(Rect::from_point)
            .reduce(|a, b| a.union(&b))
    }

    /// Union of every rectangle, or `None` when the iterator is empty.
    pub fn union_all(rects: impl IntoIterator<Item = Rect>) -> Option<Rect> {
        rects.into_iter().reduce(|a, b| a.union(&b))
    }

    /// Low X edge.
    pub fn lo_x(&self) -> f64 {
        self.lo_x
    }

    /// Low Y edge.
    pub fn lo_y(&self) -> f64 {
        self.lo_y
    }

    /// High X edge.
    pub fn hi_x(&self) -> f64 {
        self.hi_x
    }

    /// High Y edge.
    pub fn hi_y(&self) -> f64 {
        self.hi_y
    }

    /// Width along X.
    pub fn width(&self) -> f64 {
        self.hi_x - self.lo_x
    }

    /// Height along Y.
    pub fn height(&self) -> f64 {
        self.hi_y - self.lo_y
    }

    /// Area.
    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    /// Center point.
    pub fn center(&self) -> Point {
        Point::new(
            (self.lo_x + self.hi_x) / 2.0,
            (self.lo_y + self.hi_y) / 2.0,
        )
    }

    /// The four corners, counter-clockwise from the low corner.
    pub fn corners(&self) -> [Point; 4] {
        [
            Point::new(self.lo_x, self.lo_y),
            Point::new(self.hi_x, self.lo_y),
            Point::new(self.hi_x, self.hi_y),
            Point::new(self.lo_x, self.hi_y),
        ]
    }

    /// Smallest rectangle containing both `self` and `other`.
    pub fn union(&self, other: &Rect) -> Rect {
        Rect {
            lo_x: self.lo_x.min(other.lo_x),
            lo_y: self.lo_y.min(other.lo_y),
            hi_x: self.hi_x.max(other.hi_x),
            hi_y: self.hi_y.max(other.hi_y),
        }
    }

    /// Area growth needed for `self` to also cover `other`.
    pub fn expansion(&self, other: &Rect) -> f64 {
        self.union(other).area() - self.area()
    }

    /// Distance between the centers of two rectangles.
    pub fn center_distance(&self, other: &Rect) -> f64 {
        self.center().distance(other.center())
    }

    /// Returns `true` if the rectangles overlap.
    ///
    /// With `include_edges` set, rectangles that only touch along an edge or
    /// corner count as overlapping; otherwise they must share interior area
    /// (or, for degenerate rectangles, strictly straddle each other).
    pub fn intersects(&self, other: &Rect, include_edges: bool) -> bool {
        if include_edges {
            !(other.hi_x < self.lo_x
                || other.lo_x > self.hi_x
                || other.hi_y < self.lo_y
                || other.lo_y > self.hi_y)
        } else {
            !(other.hi_x <= self.lo_x
                || other.lo_x >= self.hi_x
                || other.hi_y <= self.lo_y
                || other.lo_y >= self.hi_y)
        }
    }

    /// Returns `true` if `other` lies inside `self`, allowing `eps` slack.
    pub fn contains_rect(&self, other: &Rect, eps: f64) -> bool {
        other.lo_x >= self.lo_x - eps
            && other.lo_y >= self.lo_y - eps
            && other.hi_x <= self.hi_x + eps
            && other.hi_y <= self.hi_y + eps
    }

    /// Returns `true` if `p` lies inside or on the boundary.
    pub fn contains_point(&self, p: Point) -> bool {
        p.x >= self.lo_x && p.x <= self.hi_x && p.y >= self.lo_y && p.y <= self.hi_y
    }

    /// Edge-wise equality within [`EPSILON`].
    pub fn approx_eq(&self, other: &Rect) -> bool {
        (self.lo_x - other.lo_x).abs() <= EPSILON
            && (self.lo_y - other.lo_y).abs() <= EPSILON
            && (self.hi_x - other.hi_x).abs() <= EPSILON
            && (self.hi_y - other.hi_y).abs() <= EPSILON
    }

    /// Returns this rectangle shifted by `(dx, dy)`.
    pub fn translate(&self, dx: f64, dy: f64) -> Rect {
        Rect {
            lo_x: self.lo_x + dx,
            lo_y: self.lo_y + dy,
            hi_x: self.hi_x + dx,
            hi_y: self.hi_y + dy,
        }
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {}]x[{}, {}]",
            self.lo_x, self.hi_x, self.lo_y, self.hi_y
        )
    }
}

/// Placement orientation of a node instance.
///
/// The eight members of the square's symmetry group. Mirrored variants flip X
/// before rotating counter-clockwise.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default, Serialize, Deserialize)]
pub enum Orientation {
    /// Identity.
    #[default]
    R0,
    /// Rotate 90 degrees counter-clockwise.
    R90,
    /// Rotate 180 degrees.
    R180,
    /// Rotate 270 degrees counter-clockwise.
    R270,
    /// Mirror in X.
    MirrorR0,
    /// Mirror in X, then rotate 90 degrees.
    MirrorR90,
    /// Mirror in X, then rotate 180 degrees (a mirror in Y).
    MirrorR180,
    /// Mirror in X, then rotate 270 degrees.
    MirrorR270,
}

impl Orientation {
    /// All orientations.
    pub const ALL: [Orientation; 8] = [
        Orientation::R0,
        Orientation::R90,
        Orientation::R180,
        Orientation::R270,
        Orientation::MirrorR0,
        Orientation::MirrorR90,
        Orientation::MirrorR180,
        Orientation::MirrorR270,
    ];

    /// Returns `true` if the orientation includes a mirror.
    pub fn is_mirrored(self) -> bool {
        matches!(
            self,
            Orientation::MirrorR0
                | Orientation::MirrorR90
                | Orientation::MirrorR180
                | Orientation::MirrorR270
        )
    }

    /// Rotation in tenths of a degree.
    pub fn angle(self) -> u16 {
        match self {
            Orientation::R0 | Orientation::MirrorR0 => 0,
            Orientation::R90 | Orientation::MirrorR90 => 900,
            Orientation::R180 | Orientation::MirrorR180 => 1800,
            Orientation::R270 | Orientation::MirrorR270 => 2700,
        }
    }

    /// Transforms a point relative to the instance origin.
    pub fn apply(self, p: Point) -> Point {
        let x = if self.is_mirrored() { -p.x } else { p.x };
        let y = p.y;
        match self.angle() {
            900 => Point::new(-y, x),
            1800 => Point::new(-x, -y),
            2700 => Point::new(y, -x),
            _ => Point::new(x, y),
        }
    }

    /// Places a rectangle given in instance coordinates at `anchor`.
    pub fn place(self, rect: &Rect, anchor: Point) -> Rect {
        let placed = rect.corners().map(|c| self.apply(c).translate(anchor.x, anchor.y));
        let [a, b, c, d] = placed;
        Rect::new(a.x, a.y, c.x, c.y)
            .union(&Rect::from_point(b))
            .union(&Rect::from_point(d))
    }
}
