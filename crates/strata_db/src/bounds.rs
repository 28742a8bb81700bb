//! Bounds and arc shrinkage derived from a cell's primitive content.

use fixedbitset::FixedBitSet;
use strata_common::Rect;
use strata_ids::NodeProtoId;
use strata_tech::{PrimitiveFunction, TechPool};

use crate::memo::Memoization;

/// Union of the bounds of every primitive node and every arc.
///
/// Cell-center markers never count. Invisible pins count only when they
/// carry displayed interior text. Returns `None` when nothing counts.
pub fn compute_primitive_bounds(memo: &Memoization, pool: &TechPool) -> Option<Rect> {
    let rev = memo.revision();
    let nodes = rev.nodes().iter().filter_map(|n| {
        let NodeProtoId::Primitive(p) = n.proto else {
            return None;
        };
        match pool.primitive_node(p).map(|pn| pn.function) {
            Some(PrimitiveFunction::CellCenter) => None,
            Some(PrimitiveFunction::InvisiblePin) if !n.vars.has_interior_text() => None,
            _ => Some(n.primitive_bounds()),
        }
    });
    let arcs = rev
        .arcs()
        .iter()
        .enumerate()
        .map(|(i, a)| a.bounds(!memo.is_hard_arc(i)));
    Rect::union_all(nodes.chain(arcs))
}

/// Per-node angle between the two arcs meeting at a shrinking pin.
///
/// An entry exists only for pins whose prototype shrinks arcs and that
/// join exactly two arcs at something other than a straight line. The value
/// is the smaller angle between the arcs in tenths of a degree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shrinkage {
    by_node: Vec<Option<u16>>,
}

impl Shrinkage {
    /// Computes shrinkage for every node of the memoized revision.
    pub fn new(memo: &Memoization, pool: &TechPool) -> Self {
        let rev = memo.revision();
        let mut by_node = vec![None; rev.nodes().len()];
        for (i, n) in rev.nodes().iter().enumerate() {
            let NodeProtoId::Primitive(p) = n.proto else {
                continue;
            };
            if !pool.primitive_node(p).is_some_and(|pn| pn.arcs_shrink) {
                continue;
            }
            let mut heads = FixedBitSet::new();
            let arcs = memo.get_connections(Some(&mut heads), n.node_id, None);
            let [a, b] = arcs.as_slice() else {
                continue;
            };
            let outward = |angle: u16, head: bool| if head { (angle + 1800) % 3600 } else { angle };
            let da = outward(a.angle, heads.contains(0));
            let db = outward(b.angle, heads.contains(1));
            let diff = da.abs_diff(db);
            let between = diff.min(3600 - diff);
            if between != 1800 {
                by_node[i] = Some(between);
            }
        }
        Self { by_node }
    }

    /// Angle between the two arcs at the node at `node_index`, if it shrinks.
    pub fn shrink_angle(&self, node_index: usize) -> Option<u16> {
        self.by_node.get(node_index).copied().flatten()
    }

    /// Number of shrinking pins.
    pub fn count(&self) -> usize {
        self.by_node.iter().flatten().count()
    }
}
