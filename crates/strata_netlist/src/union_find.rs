//! Disjoint sets over dense slot indices.

/// A union-find forest over slots `0..len`.
///
/// The root of every set is its smallest slot, so after
/// [`close`](Self::close) a slot's representative is the lowest-numbered
/// slot it is connected to.
#[derive(Debug, Clone)]
pub struct UnionFind {
    parent: Vec<u32>,
}

impl UnionFind {
    /// `len` singleton sets.
    pub fn new(len: usize) -> Self {
        Self {
            parent: (0..len as u32).collect(),
        }
    }

    /// Number of slots.
    pub fn len(&self) -> usize {
        self.parent.len()
    }

    /// Returns `true` if there are no slots.
    pub fn is_empty(&self) -> bool {
        self.parent.is_empty()
    }

    /// Root of the set holding `x`. Every slot on the walk is repointed at
    /// the root.
    pub fn find(&mut self, x: u32) -> u32 {
        let mut root = x;
        while self.parent[root as usize] != root {
            root = self.parent[root as usize];
        }
        let mut cur = x;
        while cur != root {
            let next = self.parent[cur as usize];
            self.parent[cur as usize] = root;
            cur = next;
        }
        root
    }

    /// Merges the sets holding `a` and `b`. Returns `true` if they were
    /// distinct.
    pub fn union(&mut self, a: u32, b: u32) -> bool {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra == rb {
            return false;
        }
        let (lo, hi) = if ra < rb { (ra, rb) } else { (rb, ra) };
        self.parent[hi as usize] = lo;
        true
    }

    /// Points every slot directly at its root.
    ///
    /// Parents never exceed their children, so one ascending sweep is
    /// enough.
    pub fn close(&mut self) {
        for i in 0..self.parent.len() {
            let p = self.parent[i] as usize;
            self.parent[i] = self.parent[p];
        }
    }

    /// Representative of `x`. Exact only after [`close`](Self::close).
    pub fn representative(&self, x: u32) -> u32 {
        self.parent[x as usize]
    }

    /// Representatives of the first `n` slots.
    pub fn prefix(&self, n: usize) -> Vec<u32> {
        self.parent[..n].to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roots_are_smallest_members() {
        let mut uf = UnionFind::new(6);
        assert!(uf.union(4, 2));
        assert!(uf.union(5, 4));
        assert!(!uf.union(2, 5));
        uf.union(3, 1);
        uf.close();
        assert_eq!(uf.prefix(6), vec![0, 1, 2, 1, 2, 2]);
    }

    #[test]
    fn find_compresses_paths() {
        let mut uf = UnionFind::new(4);
        uf.union(2, 3);
        uf.union(1, 2);
        uf.union(0, 1);
        assert_eq!(uf.find(3), 0);
        assert_eq!(uf.representative(3), 0);
    }
}
