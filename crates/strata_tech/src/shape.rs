//! Arc outline rules shared by bounds computation and shrinkage.
//!
//! An arc is a rectangle of its full width running from tail to head,
//! optionally extended past either end by half its width. Angles are in
//! tenths of a degree, counter-clockwise from +X.

use strata_common::{Point, Rect};

/// Direction from `from` to `to` in tenths of a degree, or `None` when the
/// points coincide.
pub fn direction_angle(from: Point, to: Point) -> Option<u16> {
    let dx = to.x - from.x;
    let dy = to.y - from.y;
    if dx == 0.0 && dy == 0.0 {
        return None;
    }
    let tenths = (dy.atan2(dx).to_degrees() * 10.0).round() as i32;
    Some(tenths.rem_euclid(3600) as u16)
}

/// Exact bounds of an axis-parallel arc without building its outline.
///
/// Returns `None` when the arc is not horizontal or vertical; a zero-length
/// arc uses `angle` to pick its axis.
pub fn easy_arc_bounds(
    tail: Point,
    head: Point,
    angle: u16,
    width: f64,
    tail_extended: bool,
    head_extended: bool,
) -> Option<Rect> {
    let hw = width / 2.0;
    let te = if tail_extended { hw } else { 0.0 };
    let he = if head_extended { hw } else { 0.0 };
    let degenerate = tail == head;
    if tail.y == head.y && (!degenerate || angle % 1800 == 0) {
        let (lo, lo_ext, hi, hi_ext) = ordered(tail.x, te, head.x, he, degenerate && angle == 1800);
        return Some(Rect::new(lo - lo_ext, tail.y - hw, hi + hi_ext, tail.y + hw));
    }
    if tail.x == head.x && (!degenerate || angle % 1800 == 900) {
        let (lo, lo_ext, hi, hi_ext) = ordered(tail.y, te, head.y, he, degenerate && angle == 2700);
        return Some(Rect::new(tail.x - hw, lo - lo_ext, tail.x + hw, hi + hi_ext));
    }
    None
}

fn ordered(t: f64, te: f64, h: f64, he: f64, reversed: bool) -> (f64, f64, f64, f64) {
    if t < h || (t == h && !reversed) {
        (t, te, h, he)
    } else {
        (h, he, t, te)
    }
}

/// The four corners of an arc's outline.
pub fn arc_outline(
    tail: Point,
    head: Point,
    angle: u16,
    width: f64,
    tail_extended: bool,
    head_extended: bool,
) -> [Point; 4] {
    let len = tail.distance(head);
    let (dx, dy) = if len > 0.0 {
        ((head.x - tail.x) / len, (head.y - tail.y) / len)
    } else {
        let a = (f64::from(angle) / 10.0).to_radians();
        (a.cos(), a.sin())
    };
    let hw = width / 2.0;
    let te = if tail_extended { hw } else { 0.0 };
    let he = if head_extended { hw } else { 0.0 };
    let t = tail.translate(-dx * te, -dy * te);
    let h = head.translate(dx * he, dy * he);
    let (nx, ny) = (-dy * hw, dx * hw);
    [
        t.translate(nx, ny),
        h.translate(nx, ny),
        h.translate(-nx, -ny),
        t.translate(-nx, -ny),
    ]
}

/// Bounds of an arc's full outline.
pub fn outline_bounds(
    tail: Point,
    head: Point,
    angle: u16,
    width: f64,
    tail_extended: bool,
    head_extended: bool,
) -> Rect {
    let [a, b, c, d] = arc_outline(tail, head, angle, width, tail_extended, head_extended);
    Rect::new(a.x, a.y, b.x, b.y).union(&Rect::new(c.x, c.y, d.x, d.y))
}
