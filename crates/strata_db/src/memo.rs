//! Derived connectivity and export indices of one cell revision.

use std::sync::Arc;

use fixedbitset::FixedBitSet;
use strata_ids::{ArcId, NodeId, NodeProtoId, PortProtoId};
use strata_tech::TechPool;

use crate::arc::{ArcEnd, ImmutableArcInst};
use crate::error::DbError;
use crate::export::ImmutableExport;
use crate::node::ImmutableNodeInst;
use crate::revision::CellRevision;

/// Buckets shorter than this are finished with binary insertion sort.
pub const BINARY_SORT_THRESHOLD: usize = 32;

/// Lookup tables derived from a [`CellRevision`] and the technologies it
/// resolves against.
///
/// Arc ends are encoded as `arc_index * 2 + head` and kept sorted by
/// `(node id, port chronological index, encoded end)`, so every query for a
/// node or a node port is a binary search followed by a scan of one run.
/// Exports are kept sorted the same way by their original node and port.
#[derive(Debug)]
pub struct Memoization {
    revision: Arc<CellRevision>,
    node_index_by_id: Vec<Option<u32>>,
    arc_index_by_id: Vec<Option<u32>>,
    connections: Vec<u32>,
    exports_by_original_port: Vec<u32>,
    wiped: FixedBitSet,
    hard_arcs: FixedBitSet,
}

impl Memoization {
    /// Builds every index from scratch.
    pub fn new(revision: Arc<CellRevision>, pool: &TechPool) -> Self {
        let nodes = revision.nodes();
        let arcs = revision.arcs();

        let mut node_index_by_id = Vec::new();
        for (i, n) in nodes.iter().enumerate() {
            put_index(&mut node_index_by_id, n.node_id.index(), i);
        }
        let mut arc_index_by_id = Vec::new();
        for (i, a) in arcs.iter().enumerate() {
            put_index(&mut arc_index_by_id, a.arc_id.index(), i);
        }

        let connections = sort_connections(arcs, node_index_by_id.len());

        let mut exports_by_original_port: Vec<u32> = (0..revision.exports().len() as u32).collect();
        let exports = revision.exports();
        exports_by_original_port.sort_unstable_by_key(|&i| export_key(&exports[i as usize]));

        let mut hard_arcs = FixedBitSet::with_capacity(arcs.len());
        for (i, a) in arcs.iter().enumerate() {
            let easy = pool.arc_proto(a.proto).is_some_and(|p| p.easy_shape);
            hard_arcs.set(i, !easy);
        }

        let (num_nodes, num_arcs) = (nodes.len(), arcs.len());
        let mut memo = Self {
            revision,
            node_index_by_id,
            arc_index_by_id,
            connections,
            exports_by_original_port,
            wiped: FixedBitSet::new(),
            hard_arcs,
        };
        memo.wiped = memo.compute_wiped(pool);
        tracing::trace!(
            cell = %memo.revision.cell_id(),
            nodes = num_nodes,
            arcs = num_arcs,
            "memoization built"
        );
        memo
    }

    fn compute_wiped(&self, pool: &TechPool) -> FixedBitSet {
        let arcs = self.revision.arcs();
        let mut wiped = FixedBitSet::with_capacity(self.revision.nodes().len());
        for (i, n) in self.revision.nodes().iter().enumerate() {
            let NodeProtoId::Primitive(p) = n.proto else {
                continue;
            };
            if !pool.primitive_node(p).is_some_and(|pn| pn.arcs_wipe) {
                continue;
            }
            let run = self.node_run(n.node_id);
            let all_wipable = run.iter().all(|&con| {
                let proto = arcs[(con >> 1) as usize].proto;
                pool.arc_proto(proto).is_some_and(|ap| ap.wipable)
            });
            wiped.set(i, !run.is_empty() && all_wipable);
        }
        wiped
    }

    /// The revision these indices describe.
    pub fn revision(&self) -> &Arc<CellRevision> {
        &self.revision
    }

    /// Position of a node in the revision's node list.
    pub fn node_index(&self, id: NodeId) -> Option<usize> {
        index_of(&self.node_index_by_id, id.index())
    }

    /// Position of an arc in the revision's arc list.
    pub fn arc_index(&self, id: ArcId) -> Option<usize> {
        index_of(&self.arc_index_by_id, id.index())
    }

    /// Looks up a node by id.
    pub fn get_node(&self, id: NodeId) -> Option<&Arc<ImmutableNodeInst>> {
        self.node_index(id).map(|i| &self.revision.nodes()[i])
    }

    /// Looks up an arc by id.
    pub fn get_arc(&self, id: ArcId) -> Option<&Arc<ImmutableArcInst>> {
        self.arc_index(id).map(|i| &self.revision.arcs()[i])
    }

    fn end(&self, con: u32) -> &ArcEnd {
        self.revision.arcs()[(con >> 1) as usize].end(con & 1 == 1)
    }

    fn con_key(&self, con: u32) -> (NodeId, u32, u32) {
        let end = self.end(con);
        (end.node, end.port.chron_index(), con)
    }

    fn node_run(&self, node: NodeId) -> &[u32] {
        let lo = self.connections.partition_point(|&c| self.end(c).node < node);
        let hi = self.connections.partition_point(|&c| self.end(c).node <= node);
        &self.connections[lo..hi]
    }

    fn port_run(&self, node: NodeId, port: PortProtoId) -> &[u32] {
        let chron = port.chron_index();
        let lo = self
            .connections
            .partition_point(|&c| self.con_key(c) < (node, chron, 0));
        let hi = self
            .connections
            .partition_point(|&c| self.con_key(c) <= (node, chron, u32::MAX));
        &self.connections[lo..hi]
    }

    /// Arcs attached to `node`, or to one port of it, in port order.
    ///
    /// When `head_ends` is given, bit `i` is set exactly when the `i`-th
    /// returned arc attaches by its head.
    pub fn get_connections(
        &self,
        head_ends: Option<&mut FixedBitSet>,
        node: NodeId,
        port: Option<PortProtoId>,
    ) -> Vec<&Arc<ImmutableArcInst>> {
        let run = match port {
            Some(port) => self.port_run(node, port),
            None => self.node_run(node),
        };
        if let Some(bits) = head_ends {
            bits.clear();
            bits.grow(run.len());
            for (i, &con) in run.iter().enumerate() {
                bits.set(i, con & 1 == 1);
            }
        }
        let arcs = self.revision.arcs();
        run.iter().map(|&con| &arcs[(con >> 1) as usize]).collect()
    }

    /// Number of arc ends on `node`.
    pub fn num_connections(&self, node: NodeId) -> usize {
        self.node_run(node).len()
    }

    /// Returns `true` if any arc attaches to `node`.
    pub fn has_connections(&self, node: NodeId) -> bool {
        !self.node_run(node).is_empty()
    }

    fn export_run(&self, node: NodeId, port: Option<PortProtoId>) -> &[u32] {
        let exports = self.revision.exports();
        let key = |i: u32| export_key(&exports[i as usize]);
        let (lo, hi) = match port {
            Some(port) => {
                let chron = port.chron_index();
                (
                    self.exports_by_original_port
                        .partition_point(|&i| key(i) < (node, chron, 0)),
                    self.exports_by_original_port
                        .partition_point(|&i| key(i) <= (node, chron, u32::MAX)),
                )
            }
            None => (
                self.exports_by_original_port.partition_point(|&i| key(i).0 < node),
                self.exports_by_original_port.partition_point(|&i| key(i).0 <= node),
            ),
        };
        &self.exports_by_original_port[lo..hi]
    }

    /// Returns `true` if `node` is the original of some export.
    pub fn has_exports(&self, node: NodeId) -> bool {
        !self.export_run(node, None).is_empty()
    }

    /// Number of exports on `node`.
    pub fn num_exports(&self, node: NodeId) -> usize {
        self.export_run(node, None).len()
    }

    /// Exports on `node`, or on one port of it.
    pub fn get_exports(&self, node: NodeId, port: Option<PortProtoId>) -> Vec<&Arc<ImmutableExport>> {
        let exports = self.revision.exports();
        self.export_run(node, port)
            .iter()
            .map(|&i| &exports[i as usize])
            .collect()
    }

    /// Returns `true` if a pin instance should be drawn.
    ///
    /// A pin joining one or two arcs with nothing exported on it is a wire
    /// bend and stays hidden. Unconnected pins, junctions of three or more
    /// arcs, and exported pins are drawn.
    pub fn pin_use_count(&self, node: &ImmutableNodeInst) -> bool {
        if self.has_exports(node.node_id) {
            return true;
        }
        !(1..=2).contains(&self.num_connections(node.node_id))
    }

    /// Returns `true` if the node at `node_index` is a wiped pin.
    pub fn is_wiped(&self, node_index: usize) -> bool {
        self.wiped.contains(node_index)
    }

    /// Returns `true` if the arc at `arc_index` needs full outline bounds.
    pub fn is_hard_arc(&self, arc_index: usize) -> bool {
        self.hard_arcs.contains(arc_index)
    }

    /// Rebuilds every index and compares it with this one.
    pub fn check(&self, pool: &TechPool) -> Result<(), DbError> {
        let fresh = Memoization::new(Arc::clone(&self.revision), pool);
        let cell = self.revision.cell_id();
        if fresh.node_index_by_id != self.node_index_by_id {
            return Err(DbError::check(cell, "node index by id"));
        }
        if fresh.arc_index_by_id != self.arc_index_by_id {
            return Err(DbError::check(cell, "arc index by id"));
        }
        if fresh.connections != self.connections {
            return Err(DbError::check(cell, "connections"));
        }
        if fresh.exports_by_original_port != self.exports_by_original_port {
            return Err(DbError::check(cell, "exports by original port"));
        }
        if fresh.wiped != self.wiped || fresh.hard_arcs != self.hard_arcs {
            return Err(DbError::check(cell, "wiped or hard arc bits"));
        }
        for pair in self.connections.windows(2) {
            if self.con_key(pair[0]) >= self.con_key(pair[1]) {
                return Err(DbError::check(cell, "connections out of order"));
            }
        }
        Ok(())
    }
}

fn put_index(table: &mut Vec<Option<u32>>, slot: usize, index: usize) {
    if table.len() <= slot {
        table.resize(slot + 1, None);
    }
    table[slot] = Some(index as u32);
}

fn index_of(table: &[Option<u32>], slot: usize) -> Option<usize> {
    table.get(slot).copied().flatten().map(|i| i as usize)
}

fn export_key(e: &ImmutableExport) -> (NodeId, u32, u32) {
    (e.original_node, e.original_port.chron_index(), e.export_id.chron())
}

/// Counting sort of every arc end by node id, then a per-node sort by port.
fn sort_connections(arcs: &[Arc<ImmutableArcInst>], num_node_ids: usize) -> Vec<u32> {
    let mut starts = vec![0usize; num_node_ids + 1];
    for a in arcs {
        for end in [&a.tail, &a.head] {
            if let Some(count) = starts.get_mut(end.node.index() + 1) {
                *count += 1;
            }
        }
    }
    for i in 1..starts.len() {
        starts[i] += starts[i - 1];
    }
    let mut fill = starts.clone();
    let mut connections = vec![0u32; starts[num_node_ids]];
    for (i, a) in arcs.iter().enumerate() {
        for (head, end) in [(false, &a.tail), (true, &a.head)] {
            if let Some(pos) = fill.get_mut(end.node.index()) {
                connections[*pos] = (i as u32) * 2 + u32::from(head);
                *pos += 1;
            }
        }
    }
    let key = |con: u32| {
        let end = arcs[(con >> 1) as usize].end(con & 1 == 1);
        (end.port.chron_index(), con)
    };
    for w in starts.windows(2) {
        let bucket = &mut connections[w[0]..w[1]];
        if bucket.len() > 1 {
            hybrid_sort(bucket, &key);
        }
    }
    connections
}

/// Quicksort down to [`BINARY_SORT_THRESHOLD`], then binary insertion.
pub(crate) fn hybrid_sort<K: Ord>(v: &mut [u32], key: &impl Fn(u32) -> K) {
    if v.len() < BINARY_SORT_THRESHOLD {
        binary_insertion_sort(v, key);
        return;
    }
    let last = v.len() - 1;
    v.swap(v.len() / 2, last);
    let pivot = key(v[last]);
    let mut store = 0;
    for i in 0..last {
        if key(v[i]) < pivot {
            v.swap(i, store);
            store += 1;
        }
    }
    v.swap(store, last);
    let (lo, hi) = v.split_at_mut(store);
    hybrid_sort(lo, key);
    hybrid_sort(&mut hi[1..], key);
}

fn binary_insertion_sort<K: Ord>(v: &mut [u32], key: &impl Fn(u32) -> K) {
    for i in 1..v.len() {
        let x = v[i];
        let k = key(x);
        let pos = v[..i].partition_point(|&y| key(y) <= k);
        v.copy_within(pos..i, pos + 1);
        v[pos] = x;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::ImmutableCell;
    use rand::rngs::StdRng;
    use rand::seq::SliceRandom;
    use rand::SeedableRng;
    use strata_common::Point;
    use strata_ids::{ArcProtoId, CellId, CellName, IdRegistry, PrimitiveNodeId, View};
    use strata_tech::load_technology;

    struct Fixture {
        registry: IdRegistry,
        pool: Arc<TechPool>,
        cell: CellId,
        pin: PrimitiveNodeId,
        res: PrimitiveNodeId,
        m1: ArcProtoId,
    }

    fn fixture() -> Fixture {
        let registry = IdRegistry::new();
        let generic = load_technology(&registry, "generic").unwrap();
        let cmos = load_technology(&registry, "cmos").unwrap();
        let lib = registry.new_lib_id("work").unwrap();
        let cell = registry.new_cell_id(lib, &CellName::new("top", View::Layout)).unwrap();
        Fixture {
            cell,
            pin: cmos.find_node("Metal-1-Pin").unwrap().id,
            res: cmos.find_node("Resistor").unwrap().id,
            m1: cmos.find_arc("Metal-1").unwrap().id,
            pool: TechPool::new([generic, cmos]),
            registry,
        }
    }

    const RES: u32 = 0;

    /// A resistor with ports `a` and `b` and five pins. Pin 3 is a
    /// junction of three arcs, pin 4 carries an export, pin 5 is loose.
    fn nodes(f: &Fixture) -> Vec<Arc<ImmutableNodeInst>> {
        let mut nodes = vec![ImmutableNodeInst::new(NodeId::from_raw(RES), f.res.into(), "r", Point::ORIGIN, 4.0, 8.0).unwrap()];
        for id in 1..=5 {
            let at = Point::new(f64::from(id) * 10.0, 0.0);
            nodes.push(ImmutableNodeInst::new(NodeId::from_raw(id), f.pin.into(), "p", at, 3.0, 3.0).unwrap());
        }
        nodes
    }

    fn end(f: &Fixture, node: u32) -> ArcEnd {
        let port = match node {
            RES => f.res.port(0),
            _ => f.pin.port(0),
        };
        ArcEnd::new(NodeId::from_raw(node), port, Point::new(f64::from(node) * 10.0, 0.0))
    }

    fn arcs(f: &Fixture) -> Vec<Arc<ImmutableArcInst>> {
        let mut b_end = end(f, RES);
        b_end.port = f.res.port(1).into();
        let ends = [
            (end(f, RES), end(f, 1)),
            (end(f, 2), b_end),
            (end(f, RES), end(f, 3)),
            (end(f, 1), end(f, 4)),
            (end(f, 3), end(f, 4)),
            (end(f, 3), end(f, 2)),
        ];
        ends.into_iter()
            .enumerate()
            .map(|(i, (tail, head))| ImmutableArcInst::new(ArcId::from_raw(i as u32), f.m1, "w", tail, head, 3.0).unwrap())
            .collect()
    }

    fn exports(f: &Fixture) -> Vec<Arc<ImmutableExport>> {
        let id = |name| f.registry.new_export_id(f.cell, name).unwrap();
        vec![
            ImmutableExport::new(id("out"), "out", NodeId::from_raw(RES), f.res.port(1)),
            ImmutableExport::new(id("in"), "in", NodeId::from_raw(RES), f.res.port(0)),
            ImmutableExport::new(id("tap"), "tap", NodeId::from_raw(4), f.pin.port(0)),
        ]
    }

    fn memo(f: &Fixture, arcs: &[Arc<ImmutableArcInst>]) -> Memoization {
        let rev = CellRevision::new(ImmutableCell::new(f.cell, "top"));
        let rev = rev
            .with(&f.registry, &rev.d, Some(nodes(f).as_slice()), Some(arcs), Some(exports(f).as_slice()))
            .unwrap();
        Memoization::new(rev, &f.pool)
    }

    fn arc_ids(arcs: &[&Arc<ImmutableArcInst>]) -> Vec<u32> {
        arcs.iter().map(|a| a.arc_id.as_raw()).collect()
    }

    #[test]
    fn connections_filter_by_port_and_flag_heads() {
        let f = fixture();
        let m = memo(&f, &arcs(&f));
        let res = NodeId::from_raw(RES);
        let mut heads = FixedBitSet::new();

        let on_a = m.get_connections(Some(&mut heads), res, Some(f.res.port(0).into()));
        assert_eq!(arc_ids(&on_a), vec![0, 2]);
        assert_eq!(heads.ones().count(), 0);

        let on_b = m.get_connections(Some(&mut heads), res, Some(f.res.port(1).into()));
        assert_eq!(arc_ids(&on_b), vec![1]);
        assert_eq!(heads.ones().collect::<Vec<_>>(), vec![0]);

        let all = m.get_connections(Some(&mut heads), res, None);
        assert_eq!(arc_ids(&all), vec![0, 2, 1]);
        assert_eq!(heads.ones().collect::<Vec<_>>(), vec![2]);
        assert_eq!(m.num_connections(res), 3);

        let pin3 = m.get_connections(Some(&mut heads), NodeId::from_raw(3), None);
        assert_eq!(arc_ids(&pin3), vec![2, 4, 5]);
        assert_eq!(heads.ones().collect::<Vec<_>>(), vec![0]);
        assert!(!m.has_connections(NodeId::from_raw(5)));
        assert!(m.get_connections(None, NodeId::from_raw(5), None).is_empty());
    }

    #[test]
    fn exports_are_found_by_original_node_and_port() {
        let f = fixture();
        let m = memo(&f, &arcs(&f));
        let res = NodeId::from_raw(RES);

        assert!(m.has_exports(res));
        assert_eq!(m.num_exports(res), 2);
        let names = |exports: Vec<&Arc<ImmutableExport>>| {
            exports.iter().map(|e| e.name.as_str().to_string()).collect::<Vec<_>>()
        };
        assert_eq!(names(m.get_exports(res, None)), vec!["in", "out"]);
        assert_eq!(names(m.get_exports(res, Some(f.res.port(1).into()))), vec!["out"]);
        assert_eq!(m.num_exports(NodeId::from_raw(4)), 1);
        assert!(!m.has_exports(NodeId::from_raw(1)));
        assert!(m.get_exports(NodeId::from_raw(1), None).is_empty());
    }

    #[test]
    fn pins_are_drawn_unless_they_bend_a_wire() {
        let f = fixture();
        let m = memo(&f, &arcs(&f));
        let drawn = |id: usize| m.pin_use_count(&m.revision.nodes()[id]);
        // two arcs
        assert!(!drawn(1));
        assert!(!drawn(2));
        // three arcs
        assert!(drawn(3));
        // two arcs and an export
        assert!(drawn(4));
        // no arcs
        assert!(drawn(5));

        let one_arc = memo(&f, &arcs(&f)[..1]);
        assert_eq!(one_arc.num_connections(NodeId::from_raw(1)), 1);
        assert!(!one_arc.pin_use_count(&one_arc.revision.nodes()[1]));
    }

    #[test]
    fn connections_do_not_depend_on_arc_order() {
        let f = fixture();
        let reference = memo(&f, &arcs(&f));
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..8 {
            let mut shuffled = arcs(&f);
            shuffled.shuffle(&mut rng);
            let m = memo(&f, &shuffled);
            for node in (0..=5).map(NodeId::from_raw) {
                let mut heads = FixedBitSet::new();
                let found = m.get_connections(Some(&mut heads), node, None);
                for (i, arc) in found.iter().enumerate() {
                    assert_eq!(heads.contains(i), arc.head.node == node, "{node} arc {}", arc.arc_id);
                }
                let mut ids = arc_ids(&found);
                ids.sort_unstable();
                let mut expected = arc_ids(&reference.get_connections(None, node, None));
                expected.sort_unstable();
                assert_eq!(ids, expected, "{node}");
                assert_eq!(m.pin_use_count(&m.revision.nodes()[node.index()]), reference.pin_use_count(&reference.revision.nodes()[node.index()]));
            }
        }
    }

    #[test]
    fn hybrid_sort_sorts_long_and_short_runs() {
        let mut rng = StdRng::seed_from_u64(7);
        for len in [0usize, 1, 5, 31, 32, 33, 200] {
            let mut v: Vec<u32> = (0..len as u32).collect();
            v.shuffle(&mut rng);
            hybrid_sort(&mut v, &|x| x);
            assert_eq!(v, (0..len as u32).collect::<Vec<_>>(), "len {len}");
        }
    }

    #[test]
    fn hybrid_sort_uses_key() {
        let mut v = vec![1, 2, 3, 4, 5, 6];
        hybrid_sort(&mut v, &|x| (x % 3, x));
        assert_eq!(v, vec![3, 6, 1, 4, 2, 5]);
    }
}
