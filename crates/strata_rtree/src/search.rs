//! Lazy area queries over an [`RTree`].

use strata_common::Rect;

use crate::tree::{Child, RTree};

/// Depth-first iterator over the geometries whose bounds meet an area.
///
/// Created by [`RTree::search`] or [`RTree::iter`]. Holds a shared borrow
/// of the tree, so the tree cannot change while a search is live.
pub struct Search<'a, G> {
    tree: &'a RTree<G>,
    area: Option<Rect>,
    include_edges: bool,
    stack: Vec<(usize, usize)>,
}

impl<'a, G> Search<'a, G> {
    pub(crate) fn new(tree: &'a RTree<G>, area: Option<Rect>, include_edges: bool) -> Self {
        let mut search = Self {
            tree,
            area,
            include_edges,
            stack: Vec::new(),
        };
        search.reset();
        search
    }

    /// Starts over with a new query area.
    pub fn restart(&mut self, area: Rect) {
        self.area = Some(area);
        self.reset();
    }

    fn reset(&mut self) {
        self.stack.clear();
        if !self.tree.is_empty() {
            self.stack.push((self.tree.root, 0));
        }
    }

    fn hits(&self, bounds: &Rect) -> bool {
        match &self.area {
            None => true,
            Some(area) => area.intersects(bounds, self.include_edges),
        }
    }
}

impl<'a, G> Iterator for Search<'a, G> {
    type Item = &'a G;

    fn next(&mut self) -> Option<&'a G> {
        let tree = self.tree;
        while let Some(top) = self.stack.last_mut() {
            let (n, pos) = *top;
            let children = &tree.nodes[n].children;
            if pos >= children.len() {
                self.stack.pop();
                continue;
            }
            top.1 += 1;
            match &children[pos] {
                Child::Geom { geom, bounds } => {
                    if self.hits(bounds) {
                        return Some(geom);
                    }
                }
                Child::Node(c) => {
                    if self.hits(&tree.nodes[*c].bounds) {
                        self.stack.push((*c, 0));
                    }
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use crate::RTree;
    use strata_common::Rect;

    fn grid() -> RTree<(u32, u32)> {
        let mut tree = RTree::new();
        for x in 0..6 {
            for y in 0..6 {
                let (fx, fy) = (f64::from(x) * 10.0, f64::from(y) * 10.0);
                tree.insert((x, y), Rect::new(fx, fy, fx + 10.0, fy + 10.0));
            }
        }
        tree
    }

    #[test]
    fn iter_visits_everything_once() {
        let tree = grid();
        let mut all: Vec<_> = tree.iter().copied().collect();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 36);
    }

    #[test]
    fn edge_touching_depends_on_flag() {
        let tree = grid();
        // Shares one edge with cells in column 2 and column 3.
        let point = Rect::new(30.0, 5.0, 30.0, 5.0);
        let mut touching: Vec<_> = tree.search(point, true).copied().collect();
        touching.sort_unstable();
        assert_eq!(touching, vec![(2, 0), (3, 0)]);
        assert_eq!(tree.search(point, false).count(), 0);
    }

    #[test]
    fn interior_query() {
        let tree = grid();
        let mut hits: Vec<_> = tree
            .search(Rect::new(12.0, 12.0, 28.0, 18.0), false)
            .copied()
            .collect();
        hits.sort_unstable();
        assert_eq!(hits, vec![(1, 1), (2, 1)]);
    }

    #[test]
    fn restart_changes_area() {
        let tree = grid();
        let mut search = tree.search(Rect::new(1.0, 1.0, 2.0, 2.0), false);
        assert_eq!(search.next(), Some(&(0, 0)));
        assert_eq!(search.next(), None);
        search.restart(Rect::new(51.0, 51.0, 52.0, 52.0));
        assert_eq!(search.next(), Some(&(5, 5)));
        assert_eq!(search.next(), None);
    }
}
