//! Live, editable cells and libraries.
//!
//! A live [`Cell`] holds the current node, arc, and export lists together
//! with the backup they were last frozen into and a spatial index over the
//! node and arc bounds. Edits go through
//! [`LiveState`](crate::database::LiveState); this module keeps the lists
//! and the index in step.

use std::collections::BTreeSet;
use std::sync::Arc;

use strata_common::Rect;
use strata_ids::{ArcId, CellId, ExportId, IdRegistry, LibId, NodeId, NodeProtoId};
use strata_rtree::{RTree, Search};
use strata_tech::TechPool;

use crate::arc::ImmutableArcInst;
use crate::backup::{CellBackup, LibraryBackup};
use crate::cell::{ImmutableCell, ImmutableLibrary};
use crate::error::DbError;
use crate::export::ImmutableExport;
use crate::node::ImmutableNodeInst;
use crate::snapshot::Snapshot;

/// A node or arc stored in a cell's spatial index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Geom {
    /// A node instance.
    Node(NodeId),
    /// An arc instance.
    Arc(ArcId),
}

/// Computes the spatial-index bounds of nodes and arcs.
///
/// Subcell instances take the subcell bounds recorded in `snapshot`; an
/// instance of a cell with no bounds occupies its anchor point.
#[derive(Clone, Copy)]
pub(crate) struct GeomBounds<'a> {
    pub(crate) pool: &'a TechPool,
    pub(crate) snapshot: &'a Snapshot,
}

impl GeomBounds<'_> {
    pub(crate) fn node(&self, n: &ImmutableNodeInst) -> Rect {
        match n.proto {
            NodeProtoId::Cell(sub) => self
                .snapshot
                .cell_bounds(sub)
                .map_or_else(|| Rect::from_point(n.anchor), |b| n.placed_bounds(&b)),
            NodeProtoId::Primitive(_) => n.primitive_bounds(),
        }
    }

    pub(crate) fn arc(&self, a: &ImmutableArcInst) -> Rect {
        let easy = self.pool.arc_proto(a.proto).is_some_and(|p| p.easy_shape);
        a.bounds(easy)
    }
}

/// A live library.
#[derive(Debug, Clone)]
pub struct Library {
    pub(crate) d: Arc<ImmutableLibrary>,
    pub(crate) backup: Arc<LibraryBackup>,
    pub(crate) cells: BTreeSet<CellId>,
}

impl Library {
    pub(crate) fn new(backup: Arc<LibraryBackup>) -> Self {
        Self {
            d: Arc::clone(&backup.d),
            backup,
            cells: BTreeSet::new(),
        }
    }

    /// The library id.
    pub fn lib_id(&self) -> LibId {
        self.d.lib_id
    }

    /// Current header.
    pub fn d(&self) -> &Arc<ImmutableLibrary> {
        &self.d
    }

    /// Cells of this library.
    pub fn cells(&self) -> impl Iterator<Item = CellId> + '_ {
        self.cells.iter().copied()
    }

    pub(crate) fn freeze(&mut self) -> Arc<LibraryBackup> {
        self.backup = self.backup.with(&self.d);
        Arc::clone(&self.backup)
    }
}

/// A live cell.
#[derive(Debug, Clone)]
pub struct Cell {
    pub(crate) d: Arc<ImmutableCell>,
    pub(crate) nodes: Vec<Arc<ImmutableNodeInst>>,
    pub(crate) arcs: Vec<Arc<ImmutableArcInst>>,
    pub(crate) exports: Vec<Arc<ImmutableExport>>,
    pub(crate) backup: Arc<CellBackup>,
    pub(crate) dirty: bool,
    tree: RTree<Geom>,
    node_bounds: Vec<Option<Rect>>,
    arc_bounds: Vec<Option<Rect>>,
    needs_rebuild: bool,
    next_node_id: u32,
    next_arc_id: u32,
}

impl Cell {
    /// A live cell showing `backup`.
    pub(crate) fn from_backup(backup: Arc<CellBackup>, geom: GeomBounds<'_>) -> Self {
        let rev = &backup.revision;
        let mut cell = Self {
            d: Arc::clone(&rev.d),
            nodes: rev.nodes().to_vec(),
            arcs: rev.arcs().to_vec(),
            exports: rev.exports().to_vec(),
            dirty: false,
            tree: RTree::new(),
            node_bounds: Vec::new(),
            arc_bounds: Vec::new(),
            needs_rebuild: false,
            next_node_id: 0,
            next_arc_id: 0,
            backup,
        };
        cell.rebuild_tree(geom);
        cell.bump_ids();
        cell
    }

    /// The cell id.
    pub fn cell_id(&self) -> CellId {
        self.d.cell_id
    }

    /// Current header.
    pub fn d(&self) -> &Arc<ImmutableCell> {
        &self.d
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

    /// The backup of the last frozen state.
    pub fn backup(&self) -> &Arc<CellBackup> {
        &self.backup
    }

    /// Returns `true` if the cell was edited since its last backup.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Looks up a node.
    pub fn node(&self, id: NodeId) -> Option<&Arc<ImmutableNodeInst>> {
        self.nodes.iter().find(|n| n.node_id == id)
    }

    /// Looks up an arc.
    pub fn arc(&self, id: ArcId) -> Option<&Arc<ImmutableArcInst>> {
        self.arcs.iter().find(|a| a.arc_id == id)
    }

    /// Looks up an export.
    pub fn export(&self, id: ExportId) -> Option<&Arc<ImmutableExport>> {
        self.exports.iter().find(|e| e.export_id == id)
    }

    /// Geometry whose bounds intersect `area`.
    pub fn search(&self, area: Rect, include_edges: bool) -> Search<'_, Geom> {
        self.tree.search(area, include_edges)
    }

    /// Bounds of everything in the spatial index.
    pub fn tree_bounds(&self) -> Option<Rect> {
        self.tree.bounds()
    }

    /// A node id that was never used in this cell.
    pub(crate) fn new_node_id(&mut self) -> NodeId {
        let id = NodeId::from_raw(self.next_node_id);
        self.next_node_id += 1;
        id
    }

    /// An arc id that was never used in this cell.
    pub(crate) fn new_arc_id(&mut self) -> ArcId {
        let id = ArcId::from_raw(self.next_arc_id);
        self.next_arc_id += 1;
        id
    }

    fn bump_ids(&mut self) {
        if let Some(max) = self.nodes.iter().map(|n| n.node_id.as_raw()).max() {
            self.next_node_id = self.next_node_id.max(max + 1);
        }
        if let Some(max) = self.arcs.iter().map(|a| a.arc_id.as_raw()).max() {
            self.next_arc_id = self.next_arc_id.max(max + 1);
        }
    }

    // ---- spatial index ----

    pub(crate) fn link_node(&mut self, n: &ImmutableNodeInst, geom: GeomBounds<'_>) {
        let rect = geom.node(n);
        put(&mut self.node_bounds, n.node_id.index(), rect);
        self.tree.insert(Geom::Node(n.node_id), rect);
    }

    pub(crate) fn link_arc(&mut self, a: &ImmutableArcInst, geom: GeomBounds<'_>) {
        let rect = geom.arc(a);
        put(&mut self.arc_bounds, a.arc_id.index(), rect);
        self.tree.insert(Geom::Arc(a.arc_id), rect);
    }

    pub(crate) fn unlink_node(&mut self, id: NodeId, rebuild_on_miss: bool) -> Result<(), DbError> {
        match self.node_bounds.get_mut(id.index()).and_then(Option::take) {
            Some(rect) => self.remove_geom(Geom::Node(id), rect, rebuild_on_miss),
            None => Ok(()),
        }
    }

    pub(crate) fn unlink_arc(&mut self, id: ArcId, rebuild_on_miss: bool) -> Result<(), DbError> {
        match self.arc_bounds.get_mut(id.index()).and_then(Option::take) {
            Some(rect) => self.remove_geom(Geom::Arc(id), rect, rebuild_on_miss),
            None => Ok(()),
        }
    }

    fn remove_geom(&mut self, geom: Geom, rect: Rect, rebuild_on_miss: bool) -> Result<(), DbError> {
        match self.tree.remove(&geom, &rect) {
            Ok(()) => Ok(()),
            Err(err) if rebuild_on_miss => {
                tracing::warn!(
                    cell = %self.d.cell_id,
                    ?geom,
                    error = %err,
                    "spatial index lookup missed, rebuilding"
                );
                self.needs_rebuild = true;
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Rebuilds the spatial index if a lookup missed during the last edit.
    pub(crate) fn finish_edit(&mut self, geom: GeomBounds<'_>) {
        if self.needs_rebuild {
            self.rebuild_tree(geom);
        }
    }

    /// Rebuilds the spatial index and the recorded bounds from the live
    /// node and arc lists.
    pub(crate) fn rebuild_tree(&mut self, geom: GeomBounds<'_>) {
        self.node_bounds.clear();
        self.arc_bounds.clear();
        let mut items = Vec::with_capacity(self.nodes.len() + self.arcs.len());
        for n in &self.nodes {
            let rect = geom.node(n);
            put(&mut self.node_bounds, n.node_id.index(), rect);
            items.push((Geom::Node(n.node_id), rect));
        }
        for a in &self.arcs {
            let rect = geom.arc(a);
            put(&mut self.arc_bounds, a.arc_id.index(), rect);
            items.push((Geom::Arc(a.arc_id), rect));
        }
        self.tree.rebuild(items);
        self.needs_rebuild = false;
    }

    /// Moves subcell instances whose placed bounds changed.
    pub(crate) fn refresh_instances(&mut self, geom: GeomBounds<'_>, rebuild_on_miss: bool) -> Result<(), DbError> {
        let instances: Vec<Arc<ImmutableNodeInst>> = self
            .nodes
            .iter()
            .filter(|n| n.is_cell_instance())
            .cloned()
            .collect();
        for n in instances {
            let rect = geom.node(&n);
            if self.node_bounds.get(n.node_id.index()).copied().flatten() != Some(rect) {
                self.unlink_node(n.node_id, rebuild_on_miss)?;
                self.link_node(&n, geom);
            }
        }
        self.finish_edit(geom);
        Ok(())
    }

    // ---- freezing and restoring ----

    /// Freezes the live lists into a backup, reusing the current one when
    /// nothing was edited.
    pub(crate) fn freeze(&mut self, registry: &IdRegistry, pool: &TechPool) -> Result<Arc<CellBackup>, DbError> {
        if self.dirty {
            self.backup = self.backup.with(
                registry,
                &self.d,
                Some(self.nodes.as_slice()),
                Some(self.arcs.as_slice()),
                Some(self.exports.as_slice()),
                pool,
            )?;
            self.dirty = false;
        }
        Ok(Arc::clone(&self.backup))
    }

    /// Makes the live lists equal to `backup`, touching the spatial index
    /// only for records that differ.
    pub(crate) fn restore(
        &mut self,
        backup: &Arc<CellBackup>,
        geom: GeomBounds<'_>,
        rebuild_on_miss: bool,
    ) -> Result<(), DbError> {
        let rev = &backup.revision;

        let mut new_nodes: Vec<Option<&Arc<ImmutableNodeInst>>> = Vec::new();
        for n in rev.nodes() {
            put(&mut new_nodes, n.node_id.index(), n);
        }
        let old_nodes = std::mem::take(&mut self.nodes);
        for old in &old_nodes {
            match new_nodes.get(old.node_id.index()).copied().flatten() {
                Some(new) if Arc::ptr_eq(old, new) && !new.is_cell_instance() => {}
                Some(new) => {
                    if self.node_bounds.get(old.node_id.index()).copied().flatten() != Some(geom.node(new)) {
                        self.unlink_node(old.node_id, rebuild_on_miss)?;
                        self.link_node(new, geom);
                    }
                }
                None => self.unlink_node(old.node_id, rebuild_on_miss)?,
            }
        }
        for n in rev.nodes() {
            if self.node_bounds.get(n.node_id.index()).copied().flatten().is_none() {
                self.link_node(n, geom);
            }
        }

        let mut new_arcs: Vec<Option<&Arc<ImmutableArcInst>>> = Vec::new();
        for a in rev.arcs() {
            put(&mut new_arcs, a.arc_id.index(), a);
        }
        let old_arcs = std::mem::take(&mut self.arcs);
        for old in &old_arcs {
            match new_arcs.get(old.arc_id.index()).copied().flatten() {
                Some(new) if Arc::ptr_eq(old, new) => {}
                Some(new) => {
                    self.unlink_arc(old.arc_id, rebuild_on_miss)?;
                    self.link_arc(new, geom);
                }
                None => self.unlink_arc(old.arc_id, rebuild_on_miss)?,
            }
        }
        for a in rev.arcs() {
            if self.arc_bounds.get(a.arc_id.index()).copied().flatten().is_none() {
                self.link_arc(a, geom);
            }
        }

        self.d = Arc::clone(&rev.d);
        self.nodes = rev.nodes().to_vec();
        self.arcs = rev.arcs().to_vec();
        self.exports = rev.exports().to_vec();
        self.backup = Arc::clone(backup);
        self.dirty = false;
        self.bump_ids();
        self.finish_edit(geom);
        Ok(())
    }

    /// Confirms the live lists equal `backup` and the spatial index holds
    /// exactly the live geometry.
    pub(crate) fn check_fresh(&self, backup: &CellBackup) -> Result<(), DbError> {
        let cell = self.d.cell_id;
        let rev = &backup.revision;
        if *self.d != *rev.d {
            return Err(DbError::stale(cell, "cell header"));
        }
        if self.nodes.as_slice() != rev.nodes() {
            return Err(DbError::stale(cell, "node list"));
        }
        if self.arcs.as_slice() != rev.arcs() {
            return Err(DbError::stale(cell, "arc list"));
        }
        if self.exports.as_slice() != rev.exports() {
            return Err(DbError::stale(cell, "export list"));
        }
        self.tree.check()?;
        if self.tree.len() != self.nodes.len() + self.arcs.len() {
            return Err(DbError::stale(
                cell,
                format!(
                    "spatial index holds {} entries for {} nodes and {} arcs",
                    self.tree.len(),
                    self.nodes.len(),
                    self.arcs.len()
                ),
            ));
        }
        let missing = self
            .nodes
            .iter()
            .map(|n| Geom::Node(n.node_id))
            .chain(self.arcs.iter().map(|a| Geom::Arc(a.arc_id)))
            .find(|g| !self.tree.contains(g));
        if let Some(geom) = missing {
            return Err(DbError::stale(cell, format!("{geom:?} missing from spatial index")));
        }
        Ok(())
    }
}

#[cfg(test)]
impl Cell {
    /// Drops `geom` from the spatial index, keeping its recorded bounds.
    pub(crate) fn drop_from_tree(&mut self, geom: Geom) {
        let rect = match geom {
            Geom::Node(id) => self.node_bounds.get(id.index()),
            Geom::Arc(id) => self.arc_bounds.get(id.index()),
        };
        if let Some(rect) = rect.copied().flatten() {
            self.tree.remove(&geom, &rect).unwrap();
        }
    }

    /// Overwrites the recorded bounds of a node without touching the index.
    pub(crate) fn record_node_bounds(&mut self, id: NodeId, rect: Rect) {
        put(&mut self.node_bounds, id.index(), rect);
    }
}

pub(crate) fn put<T>(table: &mut Vec<Option<T>>, slot: usize, value: T) {
    if table.len() <= slot {
        table.resize_with(slot + 1, || None);
    }
    table[slot] = Some(value);
}
