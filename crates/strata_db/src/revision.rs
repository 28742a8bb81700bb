//! Cell revisions: one immutable version of a cell's contents.
//!
//! A [`CellRevision`] holds the node, arc, and export lists of a cell in
//! insertion order together with summaries derived while validating them:
//! which technologies the cell uses and, for every subcell it places, how
//! many instances there are and which of the subcell's exports are wired.

use std::collections::BTreeMap;
use std::sync::Arc;

use fixedbitset::FixedBitSet;
use strata_ids::{ArcProtoId, CellId, ExportId, IdRegistry, NodeId, NodeProtoId, PortProtoId, TechId, View};
use strata_tech::CELL_CENTER;

use crate::arc::{check_width, ImmutableArcInst};
use crate::cell::ImmutableCell;
use crate::error::DbError;
use crate::export::ImmutableExport;
use crate::node::{check_size, ImmutableNodeInst};

/// How a cell uses one of its subcells.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellUsageInfo {
    /// The subcell.
    pub proto: CellId,
    /// Number of instances placed.
    pub inst_count: u32,
    /// Chronological indices of the subcell exports that arcs or exports
    /// of this cell attach to.
    pub used_exports: FixedBitSet,
}

/// One version of a cell's contents.
#[derive(Debug)]
pub struct CellRevision {
    /// Cell header.
    pub d: Arc<ImmutableCell>,
    nodes: Arc<[Arc<ImmutableNodeInst>]>,
    arcs: Arc<[Arc<ImmutableArcInst>]>,
    exports: Arc<[Arc<ImmutableExport>]>,
    export_index_by_chron: Arc<[Option<u32>]>,
    defined_exports: FixedBitSet,
    deleted_exports: FixedBitSet,
    tech_usages: FixedBitSet,
    cell_usages: Arc<[Option<CellUsageInfo>]>,
}

impl CellRevision {
    /// Creates an empty revision.
    pub fn new(d: Arc<ImmutableCell>) -> Arc<Self> {
        let mut tech_usages = FixedBitSet::new();
        if let Some(tech) = d.tech {
            tech_usages.grow(tech.index() + 1);
            tech_usages.insert(tech.index());
        }
        Arc::new(Self {
            d,
            nodes: Arc::from(Vec::new()),
            arcs: Arc::from(Vec::new()),
            exports: Arc::from(Vec::new()),
            export_index_by_chron: Arc::from(Vec::new()),
            defined_exports: FixedBitSet::new(),
            deleted_exports: FixedBitSet::new(),
            tech_usages,
            cell_usages: Arc::from(Vec::new()),
        })
    }

    /// Returns a revision with new contents.
    ///
    /// `None` keeps a list as it is. A list whose elements are all the same
    /// instances as the current ones is also kept, so when nothing changes
    /// the same revision is returned. The whole result is validated: ids
    /// must be unique, every arc end and export must name an existing node
    /// and a port of that node's prototype, at most one cell-center node is
    /// allowed, and icon cells may not place subcells.
    pub fn with(
        self: &Arc<Self>,
        registry: &IdRegistry,
        d: &Arc<ImmutableCell>,
        nodes: Option<&[Arc<ImmutableNodeInst>]>,
        arcs: Option<&[Arc<ImmutableArcInst>]>,
        exports: Option<&[Arc<ImmutableExport>]>,
    ) -> Result<Arc<Self>, DbError> {
        if d.cell_id != self.d.cell_id {
            return Err(DbError::IdChanged {
                from: self.d.cell_id.to_string(),
                to: d.cell_id.to_string(),
            });
        }
        let new_nodes = nodes.and_then(|n| changed_list(&self.nodes, n));
        let new_arcs = arcs.and_then(|a| changed_list(&self.arcs, a));
        let new_exports = exports.and_then(|e| changed_list(&self.exports, e));
        if Arc::ptr_eq(d, &self.d) && new_nodes.is_none() && new_arcs.is_none() && new_exports.is_none() {
            return Ok(Arc::clone(self));
        }
        let exports_changed = new_exports.is_some();
        let rev = build(
            registry,
            Arc::clone(d),
            new_nodes.unwrap_or_else(|| Arc::clone(&self.nodes)),
            new_arcs.unwrap_or_else(|| Arc::clone(&self.arcs)),
            new_exports.unwrap_or_else(|| Arc::clone(&self.exports)),
            Some(self),
            exports_changed,
        )?;
        Ok(Arc::new(rev))
    }

    /// Returns the revision with another revision date, sharing all contents.
    pub fn with_revision_date(self: &Arc<Self>, revision_date: i64) -> Arc<Self> {
        let d = self.d.with_revision_date(revision_date);
        if Arc::ptr_eq(&d, &self.d) {
            return Arc::clone(self);
        }
        Arc::new(Self {
            d,
            nodes: Arc::clone(&self.nodes),
            arcs: Arc::clone(&self.arcs),
            exports: Arc::clone(&self.exports),
            export_index_by_chron: Arc::clone(&self.export_index_by_chron),
            defined_exports: self.defined_exports.clone(),
            deleted_exports: self.deleted_exports.clone(),
            tech_usages: self.tech_usages.clone(),
            cell_usages: Arc::clone(&self.cell_usages),
        })
    }

    /// The cell.
    pub fn cell_id(&self) -> CellId {
        self.d.cell_id
    }

    /// Nodes in insertion order.
    pub fn nodes(&self) -> &[Arc<ImmutableNodeInst>] {
        &self.nodes
    }

    /// Arcs in insertion order.
    pub fn arcs(&self) -> &[Arc<ImmutableArcInst>] {
        &self.arcs
    }

    /// Exports in insertion order.
    pub fn exports(&self) -> &[Arc<ImmutableExport>] {
        &self.exports
    }

    /// Returns `true` if the node lists of both revisions are the same storage.
    pub fn same_nodes(&self, other: &CellRevision) -> bool {
        Arc::ptr_eq(&self.nodes, &other.nodes)
    }

    /// Returns `true` if the arc lists of both revisions are the same storage.
    pub fn same_arcs(&self, other: &CellRevision) -> bool {
        Arc::ptr_eq(&self.arcs, &other.arcs)
    }

    /// Returns `true` if both revisions define the same exports in the same
    /// order, whatever their names and attributes.
    pub fn same_exports(&self, other: &CellRevision) -> bool {
        Arc::ptr_eq(&self.exports, &other.exports)
            || (self.exports.len() == other.exports.len()
                && self
                    .exports
                    .iter()
                    .zip(other.exports.iter())
                    .all(|(a, b)| a.export_id == b.export_id))
    }

    /// Looks up an export of this cell by id.
    pub fn get_export(&self, id: ExportId) -> Option<&Arc<ImmutableExport>> {
        if id.cell() != self.d.cell_id {
            return None;
        }
        let index = (*self.export_index_by_chron.get(id.chron() as usize)?)?;
        self.exports.get(index as usize)
    }

    /// Position of an export in [`exports`](Self::exports), by chronological index.
    pub fn export_index(&self, chron: u32) -> Option<usize> {
        self.export_index_by_chron
            .get(chron as usize)
            .copied()
            .flatten()
            .map(|i| i as usize)
    }

    /// One past the largest export chronological index in use.
    pub fn export_chron_bound(&self) -> usize {
        self.export_index_by_chron.len()
    }

    /// Chronological indices of the current exports.
    pub fn defined_exports(&self) -> &FixedBitSet {
        &self.defined_exports
    }

    /// Chronological indices of exports that existed in an earlier revision
    /// of this lineage and are gone now.
    pub fn deleted_exports(&self) -> &FixedBitSet {
        &self.deleted_exports
    }

    /// Technologies used by the header, the nodes, and the arcs.
    pub fn tech_usages(&self) -> &FixedBitSet {
        &self.tech_usages
    }

    /// Subcell usage summaries indexed by the registry's usage index.
    pub fn cell_usages(&self) -> &[Option<CellUsageInfo>] {
        &self.cell_usages
    }

    /// Subcells placed in this revision with their instance counts.
    pub fn inst_counts(&self) -> impl Iterator<Item = (CellId, u32)> + '_ {
        self.cell_usages
            .iter()
            .flatten()
            .map(|u| (u.proto, u.inst_count))
    }

    /// Subcells placed in this revision.
    pub fn subcells(&self) -> impl Iterator<Item = CellId> + '_ {
        self.cell_usages.iter().flatten().map(|u| u.proto)
    }

    /// Recomputes every derived summary from scratch and compares.
    pub fn check(&self, registry: &IdRegistry) -> Result<(), DbError> {
        let fresh = build(
            registry,
            Arc::clone(&self.d),
            Arc::clone(&self.nodes),
            Arc::clone(&self.arcs),
            Arc::clone(&self.exports),
            None,
            true,
        )?;
        let cell = self.d.cell_id;
        if fresh.export_index_by_chron != self.export_index_by_chron {
            return Err(DbError::check(cell, "export index by chron"));
        }
        if !same_bits(&fresh.defined_exports, &self.defined_exports) {
            return Err(DbError::check(cell, "defined exports"));
        }
        if self.deleted_exports.intersection(&self.defined_exports).next().is_some() {
            return Err(DbError::check(cell, "export both defined and deleted"));
        }
        if !same_bits(&fresh.tech_usages, &self.tech_usages) {
            return Err(DbError::check(cell, "technology usages"));
        }
        if fresh.cell_usages != self.cell_usages {
            return Err(DbError::check(cell, "cell usages"));
        }
        Ok(())
    }
}

/// The new list if `new` differs from `old` by any element instance.
fn changed_list<T>(old: &Arc<[Arc<T>]>, new: &[Arc<T>]) -> Option<Arc<[Arc<T>]>> {
    let same = old.len() == new.len() && old.iter().zip(new).all(|(a, b)| Arc::ptr_eq(a, b));
    (!same).then(|| Arc::from(new.to_vec()))
}

fn build(
    registry: &IdRegistry,
    d: Arc<ImmutableCell>,
    nodes: Arc<[Arc<ImmutableNodeInst>]>,
    arcs: Arc<[Arc<ImmutableArcInst>]>,
    exports: Arc<[Arc<ImmutableExport>]>,
    old: Option<&CellRevision>,
    exports_changed: bool,
) -> Result<CellRevision, DbError> {
    let cell = d.cell_id;
    let mut usages = UsageCollector::new(registry, &d)?;

    let is_icon = registry.cell_view(cell)? == View::Icon;
    let mut node_by_id: Vec<Option<u32>> = Vec::new();
    let mut has_center = false;
    for (i, n) in nodes.iter().enumerate() {
        let slot = n.node_id.index();
        if node_by_id.len() <= slot {
            node_by_id.resize(slot + 1, None);
        }
        if node_by_id[slot].replace(i as u32).is_some() {
            return Err(DbError::DuplicateNode { cell, node: n.node_id });
        }
        check_size(n.width, n.height)?;
        match n.proto {
            NodeProtoId::Primitive(p) => {
                if registry.primitive_node_name(p)? == CELL_CENTER {
                    if has_center {
                        return Err(DbError::DuplicateCellCenter { cell });
                    }
                    has_center = true;
                }
            }
            NodeProtoId::Cell(sub) => {
                if sub == cell {
                    return Err(DbError::SelfInstance { cell });
                }
                if is_icon {
                    return Err(DbError::IconSubcell { cell, proto: sub });
                }
            }
        }
        usages.add_node(n)?;
    }

    let mut seen_arcs = FixedBitSet::new();
    for a in arcs.iter() {
        let slot = a.arc_id.index();
        seen_arcs.grow(slot + 1);
        if seen_arcs.put(slot) {
            return Err(DbError::DuplicateArc { cell, arc: a.arc_id });
        }
        check_width(a.width)?;
        if a.angle >= 3600 {
            return Err(DbError::InvalidAngle { cell, arc: a.arc_id, angle: a.angle });
        }
        registry.arc_proto_name(a.proto)?;
        usages.add_arc_proto(a.proto);
        for (end, label) in [(&a.tail, "tail"), (&a.head, "head")] {
            let n = lookup(&nodes, &node_by_id, cell, end.node, || format!("{label} of {}", a.arc_id))?;
            check_port(registry, cell, n, end.port)?;
            usages.add_port(n.proto, end.port)?;
        }
    }

    let mut export_index_by_chron: Vec<Option<u32>> = Vec::new();
    let mut defined_exports = FixedBitSet::new();
    for (i, e) in exports.iter().enumerate() {
        if e.export_id.cell() != cell {
            return Err(DbError::ForeignExport { cell, export: e.export_id });
        }
        if !registry.export_exists(e.export_id) {
            return Err(strata_ids::IdError::UnknownExport(e.export_id).into());
        }
        let chron = e.export_id.chron() as usize;
        if export_index_by_chron.len() <= chron {
            export_index_by_chron.resize(chron + 1, None);
        }
        if export_index_by_chron[chron].replace(i as u32).is_some() {
            return Err(DbError::DuplicateExport { cell, export: e.export_id });
        }
        defined_exports.grow(chron + 1);
        defined_exports.insert(chron);
        let n = lookup(&nodes, &node_by_id, cell, e.original_node, || format!("export {}", e.export_id))?;
        check_port(registry, cell, n, e.original_port)?;
        usages.add_port(n.proto, e.original_port)?;
    }

    let (export_index_by_chron, defined_exports, deleted_exports) = match old {
        Some(old) if !exports_changed => (
            Arc::clone(&old.export_index_by_chron),
            old.defined_exports.clone(),
            old.deleted_exports.clone(),
        ),
        Some(old) => {
            let mut deleted = old.deleted_exports.clone();
            deleted.union_with(&old.defined_exports);
            deleted.grow(defined_exports.len());
            deleted.difference_with(&defined_exports);
            (Arc::from(export_index_by_chron), defined_exports, deleted)
        }
        None => (Arc::from(export_index_by_chron), defined_exports, FixedBitSet::new()),
    };
    let (tech_usages, cell_usages) = usages.finish(old);

    Ok(CellRevision {
        d,
        nodes,
        arcs,
        exports,
        export_index_by_chron,
        defined_exports,
        deleted_exports,
        tech_usages,
        cell_usages,
    })
}

fn lookup<'a>(
    nodes: &'a [Arc<ImmutableNodeInst>],
    node_by_id: &[Option<u32>],
    cell: CellId,
    id: NodeId,
    what: impl FnOnce() -> String,
) -> Result<&'a Arc<ImmutableNodeInst>, DbError> {
    node_by_id
        .get(id.index())
        .copied()
        .flatten()
        .map(|i| &nodes[i as usize])
        .ok_or_else(|| DbError::MissingNode { cell, node: id, what: what() })
}

/// Compares set members, ignoring capacity.
pub(crate) fn same_bits(a: &FixedBitSet, b: &FixedBitSet) -> bool {
    a.ones().eq(b.ones())
}

fn check_port(
    registry: &IdRegistry,
    cell: CellId,
    node: &ImmutableNodeInst,
    port: PortProtoId,
) -> Result<(), DbError> {
    if port.parent() != node.proto {
        return Err(DbError::PortMismatch { cell, node: node.node_id, port });
    }
    let exists = match port {
        PortProtoId::Primitive(p) => registry.primitive_port_exists(p),
        PortProtoId::Export(e) => registry.export_exists(e),
    };
    if !exists {
        return Err(DbError::UnknownPort { cell, port });
    }
    Ok(())
}

/// Accumulates technology and subcell usage while a revision is built.
pub struct UsageCollector<'r> {
    registry: &'r IdRegistry,
    cell: CellId,
    tech_usages: FixedBitSet,
    usages: BTreeMap<u32, CellUsageInfo>,
}

impl<'r> UsageCollector<'r> {
    /// Starts collecting for the cell described by `d`.
    pub fn new(registry: &'r IdRegistry, d: &ImmutableCell) -> Result<Self, DbError> {
        registry.cell_name(d.cell_id)?;
        let mut collector = Self {
            registry,
            cell: d.cell_id,
            tech_usages: FixedBitSet::new(),
            usages: BTreeMap::new(),
        };
        if let Some(tech) = d.tech {
            collector.add_tech(tech);
        }
        Ok(collector)
    }

    fn add_tech(&mut self, tech: TechId) {
        self.tech_usages.grow(tech.index() + 1);
        self.tech_usages.insert(tech.index());
    }

    fn usage(&mut self, proto: CellId) -> Result<&mut CellUsageInfo, DbError> {
        let index = self.registry.cell_usage(self.cell, proto)?.index_in_parent;
        Ok(self.usages.entry(index).or_insert_with(|| CellUsageInfo {
            proto,
            inst_count: 0,
            used_exports: FixedBitSet::new(),
        }))
    }

    /// Records a node instance.
    pub fn add_node(&mut self, n: &ImmutableNodeInst) -> Result<(), DbError> {
        match n.proto {
            NodeProtoId::Primitive(p) => self.add_tech(p.tech()),
            NodeProtoId::Cell(sub) => {
                self.registry.cell_name(sub)?;
                self.usage(sub)?.inst_count += 1;
            }
        }
        Ok(())
    }

    /// Records an arc prototype.
    pub fn add_arc_proto(&mut self, proto: ArcProtoId) {
        self.add_tech(proto.tech());
    }

    /// Records a connection to a port of a node whose prototype is `proto`.
    pub fn add_port(&mut self, proto: NodeProtoId, port: PortProtoId) -> Result<(), DbError> {
        if let (NodeProtoId::Cell(sub), PortProtoId::Export(e)) = (proto, port) {
            let chron = e.chron() as usize;
            let usage = self.usage(sub)?;
            usage.used_exports.grow(chron + 1);
            usage.used_exports.insert(chron);
        }
        Ok(())
    }

    /// Produces the technology bitset and usage array, reusing `old`'s
    /// storage when the contents are equal.
    pub fn finish(self, old: Option<&CellRevision>) -> (FixedBitSet, Arc<[Option<CellUsageInfo>]>) {
        let len = self.usages.keys().next_back().map_or(0, |&i| i as usize + 1);
        let mut cell_usages: Vec<Option<CellUsageInfo>> = vec![None; len];
        for (index, info) in self.usages {
            cell_usages[index as usize] = Some(info);
        }
        let cell_usages = match old {
            Some(old) if *old.cell_usages == *cell_usages => Arc::clone(&old.cell_usages),
            _ => Arc::from(cell_usages),
        };
        let tech_usages = match old {
            Some(old) if same_bits(&old.tech_usages, &self.tech_usages) => old.tech_usages.clone(),
            _ => self.tech_usages,
        };
        (tech_usages, cell_usages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arc::ArcEnd;
    use strata_common::Point;
    use strata_ids::{CellName, PrimitiveNodeId};
    use strata_tech::load_technology;

    struct Fixture {
        registry: IdRegistry,
        cell: CellId,
        pin: PrimitiveNodeId,
        center: PrimitiveNodeId,
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
            center: generic.find_node(CELL_CENTER).unwrap().id,
            m1: cmos.find_arc("Metal-1").unwrap().id,
            registry,
        }
    }

    fn node(f: &Fixture, id: u32, proto: impl Into<NodeProtoId>) -> Arc<ImmutableNodeInst> {
        ImmutableNodeInst::new(NodeId::from_raw(id), proto.into(), "n", Point::new(f64::from(id) * 10.0, 0.0), 3.0, 3.0)
            .unwrap()
    }

    fn wire(f: &Fixture, id: u32, tail: u32, head: u32) -> Arc<ImmutableArcInst> {
        let port = f.pin.port(0);
        ImmutableArcInst::new(
            strata_ids::ArcId::from_raw(id),
            f.m1,
            "w",
            ArcEnd::new(NodeId::from_raw(tail), port, Point::new(f64::from(tail) * 10.0, 0.0)),
            ArcEnd::new(NodeId::from_raw(head), port, Point::new(f64::from(head) * 10.0, 0.0)),
            3.0,
        )
        .unwrap()
    }

    fn empty(f: &Fixture) -> Arc<CellRevision> {
        CellRevision::new(ImmutableCell::new(f.cell, "top"))
    }

    #[test]
    fn unchanged_lists_return_same_revision() {
        let f = fixture();
        let rev = empty(&f);
        let nodes = vec![node(&f, 0, f.pin), node(&f, 1, f.pin)];
        let arcs = vec![wire(&f, 0, 0, 1)];
        let r1 = rev.with(&f.registry, &rev.d, Some(&nodes), Some(&arcs), None).unwrap();
        assert!(!Arc::ptr_eq(&rev, &r1));
        let again = r1
            .with(&f.registry, &r1.d, Some(&nodes), Some(&arcs), Some(&[]))
            .unwrap();
        assert!(Arc::ptr_eq(&r1, &again));
    }

    #[test]
    fn tech_usage_is_collected() {
        let f = fixture();
        let rev = empty(&f);
        let r = rev
            .with(&f.registry, &rev.d, Some(&[node(&f, 0, f.pin)]), None, None)
            .unwrap();
        assert!(r.tech_usages().contains(f.pin.tech().index()));
        assert!(!r.tech_usages().contains(f.center.tech().index()));
    }

    #[test]
    fn duplicate_node_id_is_fatal() {
        let f = fixture();
        let rev = empty(&f);
        let nodes = vec![node(&f, 3, f.pin), node(&f, 3, f.pin)];
        let err = rev.with(&f.registry, &rev.d, Some(&nodes), None, None).unwrap_err();
        assert!(matches!(err, DbError::DuplicateNode { .. }));
    }

    #[test]
    fn second_cell_center_is_fatal() {
        let f = fixture();
        let rev = empty(&f);
        let nodes = vec![node(&f, 0, f.center), node(&f, 1, f.center)];
        let err = rev.with(&f.registry, &rev.d, Some(&nodes), None, None).unwrap_err();
        assert_eq!(err, DbError::DuplicateCellCenter { cell: f.cell });
    }

    #[test]
    fn out_of_range_records_are_fatal() {
        let f = fixture();
        let rev = empty(&f);
        let nodes = vec![node(&f, 0, f.pin), node(&f, 1, f.pin)];
        let turned = Arc::new(ImmutableArcInst {
            angle: 3600,
            ..ImmutableArcInst::clone(&wire(&f, 0, 0, 1))
        });
        let err = rev
            .with(&f.registry, &rev.d, Some(&nodes), Some(&[turned]), None)
            .unwrap_err();
        assert!(matches!(err, DbError::InvalidAngle { angle: 3600, .. }));

        let unsized_node = Arc::new(ImmutableNodeInst {
            width: f64::NAN,
            ..ImmutableNodeInst::clone(&nodes[0])
        });
        let err = rev
            .with(&f.registry, &rev.d, Some(&[unsized_node]), None, None)
            .unwrap_err();
        assert!(matches!(err, DbError::InvalidSize { what: "node width", .. }));
    }

    #[test]
    fn arc_to_missing_node_is_fatal() {
        let f = fixture();
        let rev = empty(&f);
        let nodes = vec![node(&f, 0, f.pin)];
        let arcs = vec![wire(&f, 0, 0, 5)];
        let err = rev
            .with(&f.registry, &rev.d, Some(&nodes), Some(&arcs), None)
            .unwrap_err();
        assert!(matches!(err, DbError::MissingNode { .. }));
    }

    #[test]
    fn subcell_usage_and_exports() {
        let f = fixture();
        let lib = f.registry.cell_lib(f.cell).unwrap();
        let sub = f.registry.new_cell_id(lib, &CellName::new("inv", View::Layout)).unwrap();
        let sub_out = f.registry.new_export_id(sub, "out").unwrap();
        let top_io = f.registry.new_export_id(f.cell, "io").unwrap();

        let rev = empty(&f);
        let nodes = vec![node(&f, 0, sub), node(&f, 1, sub), node(&f, 2, f.pin)];
        let exports = vec![ImmutableExport::new(top_io, "io", NodeId::from_raw(1), sub_out)];
        let r = rev
            .with(&f.registry, &rev.d, Some(&nodes), None, Some(&exports))
            .unwrap();
        let counts: Vec<(CellId, u32)> = r.inst_counts().collect();
        assert_eq!(counts, vec![(sub, 2)]);
        let usage = r.cell_usages().iter().flatten().next().unwrap();
        assert!(usage.used_exports.contains(sub_out.chron() as usize));
        assert_eq!(r.get_export(top_io).unwrap().name.as_str(), "io");
        r.check(&f.registry).unwrap();

        let gone = r.with(&f.registry, &r.d, None, None, Some(&[])).unwrap();
        assert!(gone.deleted_exports().contains(top_io.chron() as usize));
        assert!(gone.get_export(top_io).is_none());
        assert!(!gone.same_exports(&r));
    }

    #[test]
    fn port_of_wrong_prototype_is_fatal() {
        let f = fixture();
        let lib = f.registry.cell_lib(f.cell).unwrap();
        let sub = f.registry.new_cell_id(lib, &CellName::new("inv", View::Layout)).unwrap();
        let top_io = f.registry.new_export_id(f.cell, "io").unwrap();
        let rev = empty(&f);
        let nodes = vec![node(&f, 0, sub)];
        let exports = vec![ImmutableExport::new(top_io, "io", NodeId::from_raw(0), f.pin.port(0))];
        let err = rev
            .with(&f.registry, &rev.d, Some(&nodes), None, Some(&exports))
            .unwrap_err();
        assert!(matches!(err, DbError::PortMismatch { .. }));
    }

    #[test]
    fn icons_cannot_hold_instances() {
        let f = fixture();
        let lib = f.registry.cell_lib(f.cell).unwrap();
        let icon = f.registry.new_cell_id(lib, &CellName::new("top", View::Icon)).unwrap();
        let rev = CellRevision::new(ImmutableCell::new(icon, "top"));
        let err = rev
            .with(&f.registry, &rev.d, Some(&[node(&f, 0, f.cell)]), None, None)
            .unwrap_err();
        assert!(matches!(err, DbError::IconSubcell { .. }));
    }

    #[test]
    fn revision_date_shares_contents() {
        let f = fixture();
        let rev = empty(&f);
        let r = rev
            .with(&f.registry, &rev.d, Some(&[node(&f, 0, f.pin)]), None, None)
            .unwrap();
        let dated = r.with_revision_date(42);
        assert_eq!(dated.d.revision_date, 42);
        assert!(dated.same_nodes(&r));
        assert!(Arc::ptr_eq(&dated, &dated.with_revision_date(42)));
    }
}
