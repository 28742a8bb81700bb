//! Per-cell export equivalence.
//!
//! Every export and every port of every node instance gets one slot in a
//! union-find domain. Exports occupy the first slots, in revision order,
//! followed by the ports of each node. A primitive contributes one slot per
//! technology port and a subcell instance one slot per export chron index
//! of the subcell.

use std::collections::HashMap;
use std::sync::Arc;

use strata_db::{CellBackup, ImmutableNodeInst, Memoization, NodeFlags};
use strata_ids::{CellId, ExportId, NodeId, NodeProtoId, PortProtoId};
use strata_tech::{EquivPolicy, PrimitiveNode};

use crate::error::NetlistError;
use crate::union_find::UnionFind;

/// Which exports of one cell are connected under each policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EquivalentExports {
    cell: CellId,
    export_ids: Vec<ExportId>,
    chron_bound: u32,
    classes: [Vec<u32>; 3],
}

enum NodePorts<'a> {
    Primitive(&'a PrimitiveNode, bool),
    Subcell(&'a EquivalentExports),
}

impl NodePorts<'_> {
    fn count(&self) -> u32 {
        match self {
            NodePorts::Primitive(pn, _) => pn.num_ports() as u32,
            NodePorts::Subcell(sub) => sub.chron_bound,
        }
    }

    /// Pairs `(port chron, representative port chron)` to merge under
    /// `policy`, or `None` when nothing changes since `prev`.
    fn merges(&self, policy: EquivPolicy, prev: Option<EquivPolicy>) -> Option<Vec<(u32, u32)>> {
        match self {
            NodePorts::Primitive(pn, real_resistor) => {
                let table = |p: EquivPolicy| {
                    let p = if *real_resistor && p == EquivPolicy::P { EquivPolicy::N } else { p };
                    pn.port_equivalence(p)
                };
                let now = table(policy);
                if prev.is_some_and(|prev| table(prev) == now) {
                    return None;
                }
                Some(now.iter().enumerate().map(|(k, &r)| (k as u32, r)).collect())
            }
            NodePorts::Subcell(sub) => {
                let now = sub.classes(policy);
                if prev.is_some_and(|prev| sub.classes(prev) == now) {
                    return None;
                }
                Some(
                    now.iter()
                        .enumerate()
                        .map(|(i, &r)| (sub.export_ids[i].chron(), sub.export_ids[r as usize].chron()))
                        .collect(),
                )
            }
        }
    }
}

struct Slots<'a> {
    cell: CellId,
    memo: &'a Memoization,
    base: Vec<u32>,
    count: Vec<u32>,
}

impl Slots<'_> {
    fn slot(&self, node: NodeId, port: PortProtoId) -> Result<u32, NetlistError> {
        let out_of_range = || NetlistError::PortOutOfRange {
            cell: self.cell,
            node,
            port,
        };
        let idx = self.memo.node_index(node).ok_or_else(out_of_range)?;
        let chron = port.chron_index();
        if chron >= self.count[idx] {
            return Err(out_of_range());
        }
        Ok(self.base[idx] + chron)
    }
}

impl EquivalentExports {
    /// Computes the classes of `backup`. Every subcell it places must
    /// already be in `subcells`.
    pub fn compute(
        backup: &CellBackup,
        subcells: &HashMap<CellId, Arc<EquivalentExports>>,
    ) -> Result<Self, NetlistError> {
        let rev = &backup.revision;
        let cell = rev.cell_id();
        let memo = backup.memoization();
        let num_exports = rev.exports().len() as u32;

        let mut ports = Vec::with_capacity(rev.nodes().len());
        for n in rev.nodes() {
            ports.push(node_ports(cell, backup, n, subcells)?);
        }
        let mut base = Vec::with_capacity(ports.len());
        let mut count = Vec::with_capacity(ports.len());
        let mut next = num_exports;
        for p in &ports {
            base.push(next);
            count.push(p.count());
            next += p.count();
        }
        let slots = Slots { cell, memo, base, count };

        let mut uf = UnionFind::new(next as usize);
        for a in rev.arcs() {
            uf.union(
                slots.slot(a.tail.node, a.tail.port)?,
                slots.slot(a.head.node, a.head.port)?,
            );
        }
        for (i, e) in rev.exports().iter().enumerate() {
            uf.union(i as u32, slots.slot(e.original_node, e.original_port)?);
        }

        let mut classes: [Vec<u32>; 3] = Default::default();
        let mut prev = None;
        for policy in EquivPolicy::ALL {
            for (i, p) in ports.iter().enumerate() {
                if let Some(merges) = p.merges(policy, prev) {
                    let b = slots.base[i];
                    for (k, r) in merges {
                        uf.union(b + k, b + r);
                    }
                }
            }
            uf.close();
            classes[policy_slot(policy)] = uf.prefix(num_exports as usize);
            prev = Some(policy);
        }

        tracing::trace!(%cell, slots = uf.len(), exports = num_exports, "export equivalence computed");
        Ok(Self {
            cell,
            export_ids: rev.exports().iter().map(|e| e.export_id).collect(),
            chron_bound: rev.export_chron_bound() as u32,
            classes,
        })
    }

    /// The cell.
    pub fn cell(&self) -> CellId {
        self.cell
    }

    /// Export ids in revision order.
    pub fn export_ids(&self) -> &[ExportId] {
        &self.export_ids
    }

    /// Entry `i` is the smallest export index connected to export `i`.
    pub fn classes(&self, policy: EquivPolicy) -> &[u32] {
        &self.classes[policy_slot(policy)]
    }

    /// Returns `true` if exports `a` and `b` (revision indices) are connected.
    pub fn equivalent(&self, policy: EquivPolicy, a: usize, b: usize) -> bool {
        let c = self.classes(policy);
        matches!((c.get(a), c.get(b)), (Some(x), Some(y)) if x == y)
    }

    /// Like [`equivalent`](Self::equivalent) but by export id. `None` if
    /// either export is not in the cell.
    pub fn equivalent_exports(&self, policy: EquivPolicy, a: ExportId, b: ExportId) -> Option<bool> {
        let ia = self.export_ids.iter().position(|&e| e == a)?;
        let ib = self.export_ids.iter().position(|&e| e == b)?;
        Some(self.equivalent(policy, ia, ib))
    }

    /// Number of distinct classes.
    pub fn num_classes(&self, policy: EquivPolicy) -> usize {
        self.classes(policy)
            .iter()
            .enumerate()
            .filter(|&(i, &r)| i as u32 == r)
            .count()
    }

    /// Confirms every table is a partition keyed by its smallest member and
    /// that each policy only merges classes of the previous one.
    pub fn check(&self) -> Result<(), NetlistError> {
        let fail = |detail: String| {
            Err(NetlistError::Check {
                cell: self.cell,
                detail,
            })
        };
        let n = self.export_ids.len();
        for policy in EquivPolicy::ALL {
            let c = self.classes(policy);
            if c.len() != n {
                return fail(format!("{policy:?} table has {} entries for {n} exports", c.len()));
            }
            for (i, &r) in c.iter().enumerate() {
                if r as usize > i || c[r as usize] != r {
                    return fail(format!("{policy:?}: export {i} maps to non-root {r}"));
                }
            }
        }
        for pair in EquivPolicy::ALL.windows(2) {
            let (fine, coarse) = (self.classes(pair[0]), self.classes(pair[1]));
            if let Some(i) = (0..n).find(|&i| coarse[fine[i] as usize] != coarse[i]) {
                return fail(format!("{:?} splits export {i} from its {:?} class", pair[1], pair[0]));
            }
        }
        Ok(())
    }
}

fn policy_slot(policy: EquivPolicy) -> usize {
    match policy {
        EquivPolicy::N => 0,
        EquivPolicy::P => 1,
        EquivPolicy::A => 2,
    }
}

fn node_ports<'a>(
    cell: CellId,
    backup: &'a CellBackup,
    n: &ImmutableNodeInst,
    subcells: &'a HashMap<CellId, Arc<EquivalentExports>>,
) -> Result<NodePorts<'a>, NetlistError> {
    match n.proto {
        NodeProtoId::Primitive(p) => {
            let pn = backup
                .tech_pool
                .primitive_node(p)
                .ok_or(NetlistError::UnknownPrimitive {
                    cell,
                    node: n.node_id,
                    proto: p,
                })?;
            Ok(NodePorts::Primitive(pn, n.flags.contains(NodeFlags::REAL_RESISTOR)))
        }
        NodeProtoId::Cell(sub) => subcells
            .get(&sub)
            .map(|s| NodePorts::Subcell(s.as_ref()))
            .ok_or(NetlistError::MissingSubcell { cell, subcell: sub }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_common::Point;
    use strata_db::{ArcEnd, CellRevision, ImmutableArcInst, ImmutableCell, ImmutableExport};
    use strata_ids::{ArcId, CellName, IdRegistry, View};
    use strata_tech::{load_technology, TechPool, Technology};

    struct Fixture {
        registry: IdRegistry,
        cmos: Arc<Technology>,
        pool: Arc<TechPool>,
    }

    fn fixture() -> Fixture {
        let registry = IdRegistry::new();
        let cmos = load_technology(&registry, "cmos").unwrap();
        let pool = TechPool::new([Arc::clone(&cmos)]);
        Fixture { registry, cmos, pool }
    }

    fn node(f: &Fixture, id: u32, name: &str) -> Arc<ImmutableNodeInst> {
        let proto = f.cmos.find_node(name).unwrap().id;
        ImmutableNodeInst::new(NodeId::from_raw(id), proto.into(), "n", Point::ORIGIN, 1.0, 1.0).unwrap()
    }

    fn port(f: &Fixture, name: &str, chron: u32) -> PortProtoId {
        f.cmos.find_node(name).unwrap().id.port(chron).into()
    }

    fn wire(f: &Fixture, id: u32, a: (u32, PortProtoId), b: (u32, PortProtoId)) -> Arc<ImmutableArcInst> {
        ImmutableArcInst::new(
            ArcId::from_raw(id),
            f.cmos.find_arc("Metal-1").unwrap().id,
            "w",
            ArcEnd::new(NodeId::from_raw(a.0), a.1, Point::ORIGIN),
            ArcEnd::new(NodeId::from_raw(b.0), b.1, Point::ORIGIN),
            1.0,
        )
        .unwrap()
    }

    fn backup(
        f: &Fixture,
        name: &str,
        nodes: Vec<Arc<ImmutableNodeInst>>,
        arcs: Vec<Arc<ImmutableArcInst>>,
        exports: &[(&str, u32, PortProtoId)],
    ) -> Arc<CellBackup> {
        let lib = f.registry.new_lib_id("work").unwrap();
        let cell = f.registry.new_cell_id(lib, &CellName::new(name, View::Layout)).unwrap();
        let exports: Vec<_> = exports
            .iter()
            .map(|&(n, node, p)| {
                let id = f.registry.new_export_id(cell, n).unwrap();
                ImmutableExport::new(id, n, NodeId::from_raw(node), p)
            })
            .collect();
        let d = ImmutableCell::new(cell, name);
        let rev = CellRevision::new(Arc::clone(&d))
            .with(&f.registry, &d, Some(&nodes), Some(&arcs), Some(&exports))
            .unwrap();
        CellBackup::new_instance(rev, &f.pool).unwrap()
    }

    #[test]
    fn transistor_diffusions_stay_apart() {
        let f = fixture();
        let b = backup(
            &f,
            "t",
            vec![node(&f, 0, "Transistor")],
            vec![],
            &[
                ("g1", 0, port(&f, "Transistor", 0)),
                ("s", 0, port(&f, "Transistor", 1)),
                ("g2", 0, port(&f, "Transistor", 2)),
                ("d", 0, port(&f, "Transistor", 3)),
            ],
        );
        let eq = EquivalentExports::compute(&b, &HashMap::new()).unwrap();
        for policy in EquivPolicy::ALL {
            assert_eq!(eq.classes(policy), &[0, 1, 0, 3]);
        }
        assert_eq!(eq.num_classes(EquivPolicy::A), 3);
        eq.check().unwrap();
    }

    #[test]
    fn real_resistor_flag_holds_under_parasitic_policy() {
        let f = fixture();
        let r = node(&f, 0, "Resistor").with_flag(NodeFlags::REAL_RESISTOR, true);
        let b = backup(
            &f,
            "r",
            vec![r],
            vec![],
            &[("a", 0, port(&f, "Resistor", 0)), ("b", 0, port(&f, "Resistor", 1))],
        );
        let eq = EquivalentExports::compute(&b, &HashMap::new()).unwrap();
        assert!(!eq.equivalent(EquivPolicy::N, 0, 1));
        assert!(!eq.equivalent(EquivPolicy::P, 0, 1));
        assert!(eq.equivalent(EquivPolicy::A, 0, 1));
    }

    #[test]
    fn arcs_join_ports() {
        let f = fixture();
        let pin = port(&f, "Metal-1-Pin", 0);
        let b = backup(
            &f,
            "w",
            vec![node(&f, 0, "Metal-1-Pin"), node(&f, 1, "Metal-1-Pin"), node(&f, 2, "Metal-1-Pin")],
            vec![wire(&f, 0, (0, pin), (1, pin))],
            &[("a", 0, pin), ("b", 1, pin), ("c", 2, pin)],
        );
        let eq = EquivalentExports::compute(&b, &HashMap::new()).unwrap();
        assert_eq!(eq.classes(EquivPolicy::N), &[0, 0, 2]);
        let ids = eq.export_ids().to_vec();
        assert_eq!(eq.equivalent_exports(EquivPolicy::N, ids[1], ids[0]), Some(true));
        assert_eq!(eq.equivalent_exports(EquivPolicy::N, ids[1], ids[2]), Some(false));
    }

    #[test]
    fn missing_subcell_is_reported() {
        let f = fixture();
        let leaf = backup(&f, "leaf", vec![], vec![], &[]);
        let inst = ImmutableNodeInst::new(
            NodeId::from_raw(0),
            leaf.revision.cell_id().into(),
            "x",
            Point::ORIGIN,
            0.0,
            0.0,
        )
        .unwrap();
        let top = backup(&f, "top", vec![inst], vec![], &[]);
        assert!(matches!(
            EquivalentExports::compute(&top, &HashMap::new()),
            Err(NetlistError::MissingSubcell { .. })
        ));
    }
}
