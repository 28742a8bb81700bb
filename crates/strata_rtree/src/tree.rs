//! R-tree storage, insertion, and removal.
//!
//! Nodes live in an arena addressed by `usize`; parent links are arena
//! indices, so there are no reference cycles. Freed nodes are recycled.

use std::fmt;

use smallvec::SmallVec;
use strata_common::{Point, Rect, EPSILON};

use crate::error::RTreeError;
use crate::search::Search;

/// Minimum children of every non-root node.
pub const MIN_DEGREE: usize = 4;
/// Maximum children of any node.
pub const MAX_DEGREE: usize = 8;

#[derive(Debug, Clone)]
pub(crate) enum Child<G> {
    Geom { geom: G, bounds: Rect },
    Node(usize),
}

#[derive(Debug, Clone)]
pub(crate) struct RTNode<G> {
    pub(crate) bounds: Rect,
    pub(crate) leaf: bool,
    pub(crate) parent: Option<usize>,
    pub(crate) children: SmallVec<[Child<G>; MAX_DEGREE]>,
}

impl<G> RTNode<G> {
    fn empty(leaf: bool) -> Self {
        Self {
            bounds: Rect::from_point(Point::ORIGIN),
            leaf,
            parent: None,
            children: SmallVec::new(),
        }
    }
}

/// A spatial index over geometry handles `G` keyed by bounding box.
///
/// `G` is usually a small copyable reference (a node or arc id); the tree
/// never inspects it beyond equality.
#[derive(Debug, Clone)]
pub struct RTree<G> {
    pub(crate) nodes: Vec<RTNode<G>>,
    free: Vec<usize>,
    pub(crate) root: usize,
    len: usize,
}

impl<G> Default for RTree<G> {
    fn default() -> Self {
        Self::new()
    }
}

impl<G> RTree<G> {
    /// Creates an empty tree.
    pub fn new() -> Self {
        Self {
            nodes: vec![RTNode::empty(true)],
            free: Vec::new(),
            root: 0,
            len: 0,
        }
    }

    /// Number of stored geometries.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if no geometry is stored.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bounds of everything stored, or `None` for an empty tree.
    pub fn bounds(&self) -> Option<Rect> {
        (self.len > 0).then(|| self.nodes[self.root].bounds)
    }

    /// Number of levels from root to leaves.
    pub fn depth(&self) -> usize {
        let mut depth = 1;
        let mut n = self.root;
        while !self.nodes[n].leaf {
            match self.nodes[n].children.first() {
                Some(Child::Node(c)) => n = *c,
                _ => break,
            }
            depth += 1;
        }
        depth
    }

    /// Removes everything.
    pub fn clear(&mut self) {
        *self = Self::new();
    }

    /// Lazily yields every geometry whose bounds meet `area`.
    ///
    /// With `include_edges` set, boxes that only touch `area` are included.
    pub fn search(&self, area: Rect, include_edges: bool) -> Search<'_, G> {
        Search::new(self, Some(area), include_edges)
    }

    /// Lazily yields every stored geometry.
    pub fn iter(&self) -> Search<'_, G> {
        Search::new(self, None, true)
    }

    /// Entry count of every leaf, in arena order.
    pub fn leaf_occupancy(&self) -> Vec<usize> {
        let mut out = Vec::new();
        let mut stack = vec![self.root];
        while let Some(n) = stack.pop() {
            let node = &self.nodes[n];
            if node.leaf {
                out.push(node.children.len());
            } else {
                stack.extend(node.children.iter().filter_map(|c| match c {
                    Child::Node(i) => Some(*i),
                    Child::Geom { .. } => None,
                }));
            }
        }
        out
    }

    pub(crate) fn child_bounds(&self, child: &Child<G>) -> Rect {
        match child {
            Child::Geom { bounds, .. } => *bounds,
            Child::Node(i) => self.nodes[*i].bounds,
        }
    }

    fn alloc(&mut self, node: RTNode<G>) -> usize {
        match self.free.pop() {
            Some(i) => {
                self.nodes[i] = node;
                i
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        }
    }

    fn release(&mut self, n: usize) {
        self.nodes[n] = RTNode::empty(true);
        self.free.push(n);
    }

    fn recompute_bounds(&mut self, n: usize) {
        let bounds = Rect::union_all(self.nodes[n].children.iter().map(|c| self.child_bounds(c)));
        self.nodes[n].bounds = bounds.unwrap_or_else(|| Rect::from_point(Point::ORIGIN));
    }

    fn refresh_upward(&mut self, mut n: usize) {
        loop {
            self.recompute_bounds(n);
            match self.nodes[n].parent {
                Some(p) => n = p,
                None => break,
            }
        }
    }

    /// Inserts a geometry with its bounding box.
    pub fn insert(&mut self, geom: G, bounds: Rect) {
        self.link(geom, bounds);
        self.len += 1;
    }

    fn link(&mut self, geom: G, bounds: Rect) {
        let leaf = self.choose_leaf(&bounds);
        self.add_child(leaf, Child::Geom { geom, bounds });
    }

    /// Descends from the root, at each level taking the child whose box
    /// grows least to cover `bounds` (smaller area on ties).
    fn choose_leaf(&self, bounds: &Rect) -> usize {
        let mut n = self.root;
        while !self.nodes[n].leaf {
            let mut best: Option<(usize, f64, f64)> = None;
            for child in &self.nodes[n].children {
                let Child::Node(c) = child else { continue };
                let cb = self.nodes[*c].bounds;
                let growth = cb.expansion(bounds);
                let area = cb.area();
                let better = match best {
                    None => true,
                    Some((_, g, a)) => growth < g || (growth == g && area < a),
                };
                if better {
                    best = Some((*c, growth, area));
                }
            }
            match best {
                Some((c, _, _)) => n = c,
                None => break,
            }
        }
        n
    }

    fn add_child(&mut self, n: usize, child: Child<G>) {
        if self.nodes[n].children.len() >= MAX_DEGREE {
            self.split(n, child);
            return;
        }
        if let Child::Node(c) = child {
            self.nodes[c].parent = Some(n);
        }
        self.nodes[n].children.push(child);
        self.refresh_upward(n);
    }

    /// Splits the full node `n` while adding `extra`.
    ///
    /// The two entries whose centers are farthest apart seed two groups; the
    /// rest go one at a time to whichever group's box grows least, unless a
    /// group needs every remaining entry to reach [`MIN_DEGREE`]. `n` keeps
    /// the first group and a new sibling takes the second.
    fn split(&mut self, n: usize, extra: Child<G>) {
        let leaf = self.nodes[n].leaf;
        let drained = std::mem::take(&mut self.nodes[n].children);
        let mut entries: Vec<(Child<G>, Rect)> = drained
            .into_iter()
            .chain(std::iter::once(extra))
            .map(|c| {
                let b = self.child_bounds(&c);
                (c, b)
            })
            .collect();

        let (s1, s2) = farthest_pair(&entries);
        let seed_b = entries.swap_remove(s2);
        let seed_a = entries.swap_remove(s1);
        let mut bounds_a = seed_a.1;
        let mut bounds_b = seed_b.1;
        let mut group_a = vec![seed_a.0];
        let mut group_b = vec![seed_b.0];

        while let Some((child, cb)) = entries.pop() {
            let remaining = entries.len() + 1;
            let to_a = if group_a.len() + remaining <= MIN_DEGREE {
                true
            } else if group_b.len() + remaining <= MIN_DEGREE {
                false
            } else {
                let ga = bounds_a.expansion(&cb);
                let gb = bounds_b.expansion(&cb);
                ga < gb
                    || (ga == gb
                        && (bounds_a.area() < bounds_b.area()
                            || (bounds_a.area() == bounds_b.area()
                                && group_a.len() <= group_b.len())))
            };
            if to_a {
                bounds_a = bounds_a.union(&cb);
                group_a.push(child);
            } else {
                bounds_b = bounds_b.union(&cb);
                group_b.push(child);
            }
        }

        let sibling = self.alloc(RTNode::empty(leaf));
        for child in group_a {
            if let Child::Node(c) = child {
                self.nodes[c].parent = Some(n);
            }
            self.nodes[n].children.push(child);
        }
        for child in group_b {
            if let Child::Node(c) = child {
                self.nodes[c].parent = Some(sibling);
            }
            self.nodes[sibling].children.push(child);
        }
        self.recompute_bounds(n);
        self.recompute_bounds(sibling);

        match self.nodes[n].parent {
            Some(p) => self.add_child(p, Child::Node(sibling)),
            None => {
                let mut root = RTNode::empty(false);
                root.children.push(Child::Node(n));
                root.children.push(Child::Node(sibling));
                let root = self.alloc(root);
                self.nodes[n].parent = Some(root);
                self.nodes[sibling].parent = Some(root);
                self.root = root;
                self.recompute_bounds(root);
            }
        }
    }

    /// Detaches underfull nodes from `n` upward, then reinserts their
    /// geometry from the top.
    fn condense(&mut self, mut n: usize) {
        let mut orphans: Vec<(G, Rect)> = Vec::new();
        while let Some(p) = self.nodes[n].parent {
            if self.nodes[n].children.len() >= MIN_DEGREE {
                break;
            }
            self.nodes[p]
                .children
                .retain(|c| !matches!(c, Child::Node(i) if *i == n));
            self.collect_geoms(n, &mut orphans);
            n = p;
        }
        self.refresh_upward(n);
        self.collapse_root();
        for (geom, bounds) in orphans {
            self.link(geom, bounds);
        }
    }

    /// Moves every geometry under `n` into `out` and frees the subtree.
    fn collect_geoms(&mut self, n: usize, out: &mut Vec<(G, Rect)>) {
        let children = std::mem::take(&mut self.nodes[n].children);
        for child in children {
            match child {
                Child::Geom { geom, bounds } => out.push((geom, bounds)),
                Child::Node(c) => self.collect_geoms(c, out),
            }
        }
        self.release(n);
    }

    /// Promotes the only child of an internal root until the root is a leaf
    /// or has several children. Below that the root may stay underfull.
    fn collapse_root(&mut self) {
        while !self.nodes[self.root].leaf {
            let only = match self.nodes[self.root].children.as_slice() {
                [Child::Node(only)] => *only,
                [] => {
                    self.nodes[self.root].leaf = true;
                    self.recompute_bounds(self.root);
                    return;
                }
                _ => return,
            };
            let old = self.root;
            self.nodes[only].parent = None;
            self.root = only;
            self.release(old);
        }
    }

    /// Builds a tree holding exactly `items`.
    pub fn rebuild(&mut self, items: impl IntoIterator<Item = (G, Rect)>) {
        self.clear();
        for (geom, bounds) in items {
            self.insert(geom, bounds);
        }
    }
}

impl<G: PartialEq + fmt::Debug> RTree<G> {
    /// Removes a geometry previously inserted with `bounds`.
    ///
    /// The search first follows only subtrees whose boxes cover `bounds`. If
    /// that misses, every leaf is scanned and a warning is logged because the
    /// entry was not where its bounds say it should be. If the geometry is
    /// not stored at all, [`RTreeError::NotFound`] is returned and the tree
    /// is left unchanged.
    pub fn remove(&mut self, geom: &G, bounds: &Rect) -> Result<(), RTreeError> {
        let found = match self.find_leaf(self.root, geom, bounds) {
            Some(hit) => Some(hit),
            None => {
                let hit = self.find_anywhere(geom);
                if hit.is_some() {
                    tracing::warn!(?geom, %bounds, "geometry not in proper R-tree location");
                }
                hit
            }
        };
        let Some((leaf, pos)) = found else {
            return Err(RTreeError::NotFound(format!("{geom:?}")));
        };
        self.nodes[leaf].children.remove(pos);
        self.len -= 1;
        self.condense(leaf);
        Ok(())
    }

    /// Returns `true` if `geom` is stored anywhere.
    pub fn contains(&self, geom: &G) -> bool {
        self.find_anywhere(geom).is_some()
    }

    fn find_leaf(&self, n: usize, geom: &G, bounds: &Rect) -> Option<(usize, usize)> {
        let node = &self.nodes[n];
        if node.leaf {
            return node
                .children
                .iter()
                .position(|c| matches!(c, Child::Geom { geom: g, .. } if g == geom))
                .map(|pos| (n, pos));
        }
        node.children.iter().find_map(|c| match c {
            Child::Node(i) if self.nodes[*i].bounds.contains_rect(bounds, EPSILON) => {
                self.find_leaf(*i, geom, bounds)
            }
            _ => None,
        })
    }

    fn find_anywhere(&self, geom: &G) -> Option<(usize, usize)> {
        let mut stack = vec![self.root];
        while let Some(n) = stack.pop() {
            for (pos, child) in self.nodes[n].children.iter().enumerate() {
                match child {
                    Child::Geom { geom: g, .. } if g == geom => return Some((n, pos)),
                    Child::Geom { .. } => {}
                    Child::Node(c) => stack.push(*c),
                }
            }
        }
        None
    }

    /// Verifies every structural invariant.
    ///
    /// Each node's box must equal the union of its children's boxes within
    /// epsilon, parent links must match, non-root nodes must hold between
    /// [`MIN_DEGREE`] and [`MAX_DEGREE`] children, and all leaves must sit at
    /// the same depth.
    pub fn check(&self) -> Result<(), RTreeError> {
        if self.nodes[self.root].parent.is_some() {
            return Err(corrupt(self.root, "root has a parent"));
        }
        let mut leaf_depth = None;
        let mut count = 0;
        self.check_node(self.root, 0, &mut leaf_depth, &mut count)?;
        if count != self.len {
            return Err(corrupt(
                self.root,
                format!("holds {count} geometries but len is {}", self.len),
            ));
        }
        Ok(())
    }

    fn check_node(
        &self,
        n: usize,
        depth: usize,
        leaf_depth: &mut Option<usize>,
        count: &mut usize,
    ) -> Result<(), RTreeError> {
        let node = &self.nodes[n];
        let total = node.children.len();
        if total > MAX_DEGREE {
            return Err(corrupt(n, format!("{total} children exceeds maximum")));
        }
        if n != self.root && total < MIN_DEGREE {
            return Err(corrupt(n, format!("{total} children is below minimum")));
        }
        if total == 0 {
            return if n == self.root && node.leaf {
                Ok(())
            } else {
                Err(corrupt(n, "empty non-leaf node"))
            };
        }
        let union = Rect::union_all(node.children.iter().map(|c| self.child_bounds(c)));
        if !union.is_some_and(|u| u.approx_eq(&node.bounds)) {
            return Err(corrupt(n, "bounds differ from union of children"));
        }
        if node.leaf {
            match *leaf_depth {
                Some(d) if d != depth => {
                    return Err(corrupt(n, format!("leaf at depth {depth}, expected {d}")))
                }
                _ => *leaf_depth = Some(depth),
            }
        }
        for child in &node.children {
            match (node.leaf, child) {
                (true, Child::Geom { .. }) => *count += 1,
                (false, Child::Node(c)) => {
                    if self.nodes[*c].parent != Some(n) {
                        return Err(corrupt(*c, "parent link mismatch"));
                    }
                    self.check_node(*c, depth + 1, leaf_depth, count)?;
                }
                _ => return Err(corrupt(n, "child kind does not match leaf flag")),
            }
        }
        Ok(())
    }
}

fn corrupt(node: usize, message: impl Into<String>) -> RTreeError {
    RTreeError::Corrupt {
        node,
        message: message.into(),
    }
}

/// Indices `(i, j)`, `i < j`, of the two entries with the farthest centers.
fn farthest_pair<C>(entries: &[(C, Rect)]) -> (usize, usize) {
    let mut best = (0, 1);
    let mut best_dist = f64::NEG_INFINITY;
    for i in 0..entries.len() {
        for j in i + 1..entries.len() {
            let d = entries[i].1.center_distance(&entries[j].1);
            if d > best_dist {
                best_dist = d;
                best = (i, j);
            }
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(i: u32) -> Rect {
        let x = f64::from(i % 10) * 10.0;
        let y = f64::from(i / 10) * 10.0;
        Rect::new(x, y, x + 5.0, y + 5.0)
    }

    fn filled(n: u32) -> RTree<u32> {
        let mut tree = RTree::new();
        for i in 0..n {
            tree.insert(i, square(i));
        }
        tree
    }

    #[test]
    fn empty_tree() {
        let tree: RTree<u32> = RTree::new();
        assert!(tree.is_empty());
        assert!(tree.bounds().is_none());
        assert_eq!(tree.depth(), 1);
        tree.check().unwrap();
        assert_eq!(tree.iter().count(), 0);
    }

    #[test]
    fn ninth_insert_splits_root() {
        let tree = filled(MAX_DEGREE as u32);
        assert_eq!(tree.depth(), 1);
        let tree = filled(MAX_DEGREE as u32 + 1);
        assert_eq!(tree.depth(), 2);
        let mut occupancy = tree.leaf_occupancy();
        occupancy.sort_unstable();
        assert_eq!(occupancy, vec![4, 5]);
        tree.check().unwrap();
    }

    #[test]
    fn bounds_cover_everything() {
        let tree = filled(37);
        tree.check().unwrap();
        let b = tree.bounds().unwrap();
        assert!(b.approx_eq(&Rect::new(0.0, 0.0, 95.0, 35.0)));
    }

    #[test]
    fn remove_down_to_empty() {
        let mut tree = filled(50);
        for i in 0..50 {
            tree.remove(&i, &square(i)).unwrap();
            tree.check().unwrap();
            assert_eq!(tree.len(), (49 - i) as usize);
        }
        assert!(tree.is_empty());
        assert_eq!(tree.depth(), 1);
    }

    #[test]
    fn remove_missing_reports_not_found() {
        let mut tree = filled(10);
        let err = tree.remove(&99, &square(99)).unwrap_err();
        assert!(matches!(err, RTreeError::NotFound(_)));
        assert_eq!(tree.len(), 10);
        tree.check().unwrap();
    }

    #[test]
    fn remove_with_stale_bounds_still_finds_entry() {
        let mut tree = filled(30);
        let stale = Rect::new(500.0, 500.0, 501.0, 501.0);
        tree.remove(&7, &stale).unwrap();
        assert!(!tree.contains(&7));
        tree.check().unwrap();
    }

    #[test]
    fn rebuild_replaces_contents() {
        let mut tree = filled(20);
        tree.rebuild((100..105).map(|i| (i, square(i - 100))));
        assert_eq!(tree.len(), 5);
        assert!(tree.contains(&103));
        assert!(!tree.contains(&3));
        tree.check().unwrap();
    }

    #[test]
    fn arena_slots_are_recycled() {
        let mut tree = filled(64);
        let arena = tree.nodes.len();
        for i in 0..64 {
            tree.remove(&i, &square(i)).unwrap();
        }
        for i in 0..64 {
            tree.insert(i, square(i));
        }
        assert!(tree.nodes.len() <= 2 * arena);
        tree.check().unwrap();
    }

    #[test]
    fn farthest_pair_picks_extremes() {
        let entries: Vec<((), Rect)> = [0.0, 50.0, 3.0, -40.0]
            .iter()
            .map(|&x| ((), Rect::new(x, 0.0, x + 1.0, 1.0)))
            .collect();
        assert_eq!(farthest_pair(&entries), (1, 3));
    }
}
