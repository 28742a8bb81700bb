//! The live database: editable cells behind one read/write lock, frozen
//! into snapshots by [`LiveState::backup`] and restored by
//! [`LiveState::undo`].

use std::collections::{BTreeSet, HashSet};
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, TryLockError};
use std::time::Instant;

use strata_common::{InternalError, Point, Rect, StrataResult};
use strata_config::{load_config, ConfigError, DatabaseConfig};
use strata_ids::{
    ArcId, ArcProtoId, CellId, CellName, ExportId, IdError, IdRegistry, LibId, NodeId, NodeProtoId,
    PortProtoId, View,
};
use strata_rtree::Search;
use strata_tech::{TechError, TechPool};

use crate::arc::{ArcEnd, ImmutableArcInst};
use crate::backup::{CellBackup, LibraryBackup};
use crate::cell::{ImmutableCell, ImmutableLibrary};
use crate::error::DbError;
use crate::export::ImmutableExport;
use crate::live::{put, Cell, Geom, GeomBounds, Library};
use crate::node::ImmutableNodeInst;
use crate::revision::CellRevision;
use crate::snapshot::Snapshot;

/// Everything guarded by the database lock.
///
/// Methods taking `&self` need the shared lock and methods taking
/// `&mut self` the exclusive one. Holding a guard and calling further
/// methods on it never locks again.
#[derive(Debug)]
pub struct LiveState {
    registry: Arc<IdRegistry>,
    config: DatabaseConfig,
    tech_pool: Arc<TechPool>,
    libs: Vec<Option<Library>>,
    cells: Vec<Option<Cell>>,
    snapshot: Arc<Snapshot>,
}

impl LiveState {
    fn new(registry: Arc<IdRegistry>, tech_pool: Arc<TechPool>, config: DatabaseConfig) -> Self {
        let snapshot = Snapshot::empty(&registry, Arc::clone(&tech_pool));
        Self {
            registry,
            config,
            tech_pool,
            libs: Vec::new(),
            cells: Vec::new(),
            snapshot,
        }
    }

    /// The identity registry.
    pub fn registry(&self) -> &Arc<IdRegistry> {
        &self.registry
    }

    /// The configuration in effect.
    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// Technologies available to cells.
    pub fn tech_pool(&self) -> &Arc<TechPool> {
        &self.tech_pool
    }

    /// The snapshot of the last backup, undo, or recover.
    pub fn snapshot(&self) -> &Arc<Snapshot> {
        &self.snapshot
    }

    /// Replaces the available technologies. Cells pick up the new pool at
    /// the next backup.
    pub fn set_tech_pool(&mut self, tech_pool: Arc<TechPool>) {
        self.tech_pool = tech_pool;
    }

    /// A live library.
    pub fn library(&self, id: LibId) -> Result<&Library, DbError> {
        self.libs
            .get(id.index())
            .and_then(Option::as_ref)
            .ok_or(DbError::NoSuchLibrary(id))
    }

    /// A live cell.
    pub fn cell(&self, id: CellId) -> Result<&Cell, DbError> {
        self.cells
            .get(id.index())
            .and_then(Option::as_ref)
            .ok_or(DbError::NoSuchCell(id))
    }

    /// Live libraries in id order.
    pub fn libraries(&self) -> impl Iterator<Item = &Library> {
        self.libs.iter().flatten()
    }

    /// Live cells in id order.
    pub fn cells(&self) -> impl Iterator<Item = &Cell> {
        self.cells.iter().flatten()
    }

    /// Nodes and arcs of `cell` whose bounds intersect `area`.
    pub fn search(&self, cell: CellId, area: Rect, include_edges: bool) -> Result<Search<'_, Geom>, DbError> {
        Ok(self.cell(cell)?.search(area, include_edges))
    }

    fn cell_and_bounds(&mut self, id: CellId) -> Result<(&mut Cell, GeomBounds<'_>), DbError> {
        let geom = GeomBounds {
            pool: &self.tech_pool,
            snapshot: &self.snapshot,
        };
        let cell = self
            .cells
            .get_mut(id.index())
            .and_then(Option::as_mut)
            .ok_or(DbError::NoSuchCell(id))?;
        Ok((cell, geom))
    }

    fn rebuild_on_miss(&self) -> bool {
        self.config.rtree.rebuild_on_miss
    }

    // ---- libraries and cells ----

    /// Creates a library, or returns the live one with that name.
    pub fn new_library(&mut self, name: &str) -> Result<LibId, DbError> {
        let id = self.registry.new_lib_id(name)?;
        if self.library(id).is_err() {
            let backup = LibraryBackup::new(ImmutableLibrary::new(id, name));
            put(&mut self.libs, id.index(), Library::new(backup));
        }
        Ok(id)
    }

    /// Applies `f` to a library header.
    pub fn modify_library(
        &mut self,
        id: LibId,
        f: impl FnOnce(&Arc<ImmutableLibrary>) -> Arc<ImmutableLibrary>,
    ) -> Result<(), DbError> {
        let lib = self
            .libs
            .get_mut(id.index())
            .and_then(Option::as_mut)
            .ok_or(DbError::NoSuchLibrary(id))?;
        let d = f(&lib.d);
        if d.lib_id != id {
            return Err(DbError::IdChanged {
                from: id.to_string(),
                to: d.lib_id.to_string(),
            });
        }
        lib.d = d;
        Ok(())
    }

    /// Creates an empty cell.
    pub fn new_cell(&mut self, lib: LibId, name: &CellName) -> Result<CellId, DbError> {
        self.library(lib)?;
        let id = self.registry.new_cell_id(lib, name)?;
        if self.cell(id).is_ok() {
            return Err(DbError::CellExists(id));
        }
        let revision = CellRevision::new(ImmutableCell::new(id, &name.name));
        let backup = CellBackup::new_instance(revision, &self.tech_pool)?;
        let geom = GeomBounds {
            pool: &self.tech_pool,
            snapshot: &self.snapshot,
        };
        let mut cell = Cell::from_backup(backup, geom);
        cell.dirty = true;
        put(&mut self.cells, id.index(), cell);
        if let Some(library) = self.libs.get_mut(lib.index()).and_then(Option::as_mut) {
            library.cells.insert(id);
        }
        Ok(id)
    }

    /// Deletes a cell that no other live cell places.
    pub fn remove_cell(&mut self, id: CellId) -> Result<(), DbError> {
        self.cell(id)?;
        if let Some(parent) = self
            .cells()
            .find(|c| c.nodes.iter().any(|n| n.proto == NodeProtoId::Cell(id)))
        {
            return Err(DbError::CellInUse {
                cell: id,
                parent: parent.cell_id(),
            });
        }
        self.cells[id.index()] = None;
        let lib = self.registry.cell_lib(id)?;
        if let Some(library) = self.libs.get_mut(lib.index()).and_then(Option::as_mut) {
            library.cells.remove(&id);
        }
        Ok(())
    }

    /// Applies `f` to a cell header.
    pub fn modify_cell(
        &mut self,
        id: CellId,
        f: impl FnOnce(&Arc<ImmutableCell>) -> Arc<ImmutableCell>,
    ) -> Result<(), DbError> {
        let pool = Arc::clone(&self.tech_pool);
        let cell = self
            .cells
            .get_mut(id.index())
            .and_then(Option::as_mut)
            .ok_or(DbError::NoSuchCell(id))?;
        let d = f(&cell.d);
        if Arc::ptr_eq(&d, &cell.d) {
            return Ok(());
        }
        if d.cell_id != id {
            return Err(DbError::IdChanged {
                from: id.to_string(),
                to: d.cell_id.to_string(),
            });
        }
        if let Some(tech) = d.tech {
            if !pool.contains(tech) {
                return Err(TechError::NotInPool(tech).into());
            }
        }
        cell.d = d;
        cell.dirty = true;
        Ok(())
    }

    // ---- nodes ----

    /// Returns `true` if `from`, or anything it places, places `target`.
    fn reaches(&self, from: CellId, target: CellId) -> Result<bool, DbError> {
        let mut stack = vec![from];
        let mut seen = HashSet::new();
        while let Some(c) = stack.pop() {
            if c == target {
                return Ok(true);
            }
            if !seen.insert(c) {
                continue;
            }
            let Ok(cell) = self.cell(c) else {
                continue;
            };
            for sub in cell.nodes.iter().filter_map(|n| n.proto.as_cell()) {
                stack.push(sub);
                if self.registry.cell_view(sub)? == View::Icon {
                    if let Some(schematic) = self.registry.cell_in_view(sub, View::Schematic)? {
                        if schematic != c {
                            stack.push(schematic);
                        }
                    }
                }
            }
        }
        Ok(false)
    }

    fn check_node_proto(&self, parent: CellId, proto: NodeProtoId) -> Result<(), DbError> {
        match proto {
            NodeProtoId::Primitive(p) => {
                if self.tech_pool.primitive_node(p).is_none() {
                    return Err(IdError::UnknownPrimitiveNode(p).into());
                }
            }
            NodeProtoId::Cell(sub) => {
                if sub == parent {
                    return Err(DbError::SelfInstance { cell: parent });
                }
                self.cell(sub)?;
                if self.registry.cell_view(parent)? == View::Icon {
                    return Err(DbError::IconSubcell { cell: parent, proto: sub });
                }
                let mut roots = vec![sub];
                if self.registry.cell_view(sub)? == View::Icon {
                    if let Some(schematic) = self.registry.cell_in_view(sub, View::Schematic)? {
                        if schematic != parent {
                            roots.push(schematic);
                        }
                    }
                }
                for root in roots {
                    if self.reaches(root, parent)? {
                        return Err(DbError::RecursiveHierarchy(parent));
                    }
                }
            }
        }
        Ok(())
    }

    /// Places a node with default orientation and returns its new id.
    pub fn add_node(
        &mut self,
        cell: CellId,
        proto: NodeProtoId,
        name: &str,
        anchor: Point,
        width: f64,
        height: f64,
    ) -> Result<NodeId, DbError> {
        self.check_node_proto(cell, proto)?;
        let (live, geom) = self.cell_and_bounds(cell)?;
        let id = live.new_node_id();
        let node = ImmutableNodeInst::new(id, proto, name, anchor, width, height)?;
        live.link_node(&node, geom);
        live.nodes.push(node);
        live.dirty = true;
        Ok(id)
    }

    /// Replaces a node by `f(node)`. The id and prototype must not change.
    pub fn modify_node(
        &mut self,
        cell: CellId,
        id: NodeId,
        f: impl FnOnce(&Arc<ImmutableNodeInst>) -> Result<Arc<ImmutableNodeInst>, DbError>,
    ) -> Result<(), DbError> {
        let rebuild = self.rebuild_on_miss();
        let (live, geom) = self.cell_and_bounds(cell)?;
        let pos = live
            .nodes
            .iter()
            .position(|n| n.node_id == id)
            .ok_or(DbError::NoSuchNode { cell, node: id })?;
        let old = Arc::clone(&live.nodes[pos]);
        let new = f(&old)?;
        if Arc::ptr_eq(&old, &new) {
            return Ok(());
        }
        if new.node_id != old.node_id || new.proto != old.proto {
            return Err(DbError::IdChanged {
                from: format!("{} ({})", old.node_id, old.proto),
                to: format!("{} ({})", new.node_id, new.proto),
            });
        }
        if geom.node(&old) != geom.node(&new) {
            live.unlink_node(id, rebuild)?;
            live.link_node(&new, geom);
        }
        live.nodes[pos] = new;
        live.dirty = true;
        live.finish_edit(geom);
        Ok(())
    }

    /// Deletes a node together with its arcs and exports.
    pub fn remove_node(&mut self, cell: CellId, id: NodeId) -> Result<(), DbError> {
        let live = self.cell(cell)?;
        live.node(id).ok_or(DbError::NoSuchNode { cell, node: id })?;
        let arcs: Vec<ArcId> = live
            .arcs
            .iter()
            .filter(|a| a.tail.node == id || a.head.node == id)
            .map(|a| a.arc_id)
            .collect();
        let exports: Vec<ExportId> = live
            .exports
            .iter()
            .filter(|e| e.original_node == id)
            .map(|e| e.export_id)
            .collect();
        for arc in arcs {
            self.remove_arc(cell, arc)?;
        }
        for export in exports {
            self.remove_export(export)?;
        }
        let rebuild = self.rebuild_on_miss();
        let (live, geom) = self.cell_and_bounds(cell)?;
        live.unlink_node(id, rebuild)?;
        live.nodes.retain(|n| n.node_id != id);
        live.dirty = true;
        live.finish_edit(geom);
        Ok(())
    }

    // ---- arcs ----

    fn check_port(&self, cell: CellId, node: &ImmutableNodeInst, port: PortProtoId) -> Result<(), DbError> {
        if port.parent() != node.proto {
            return Err(DbError::PortMismatch {
                cell,
                node: node.node_id,
                port,
            });
        }
        let exists = match port {
            PortProtoId::Primitive(p) => self.tech_pool.primitive_port(p).is_some(),
            PortProtoId::Export(e) => self.cell(e.cell())?.export(e).is_some(),
        };
        if !exists {
            return Err(DbError::UnknownPort { cell, port });
        }
        Ok(())
    }

    fn check_arc_end(&self, cell: CellId, arc: ArcId, proto: ArcProtoId, end: &ArcEnd) -> Result<(), DbError> {
        let node = self
            .cell(cell)?
            .node(end.node)
            .ok_or_else(|| DbError::MissingNode {
                cell,
                node: end.node,
                what: format!("end of {arc}"),
            })?;
        self.check_port(cell, node, end.port)?;
        if let PortProtoId::Primitive(p) = end.port {
            if !self.tech_pool.primitive_port(p).is_some_and(|pp| pp.connects(proto)) {
                return Err(DbError::ArcPortMismatch {
                    cell,
                    arc,
                    proto,
                    port: end.port,
                });
            }
        }
        Ok(())
    }

    /// Connects two node ports with a new arc and returns its id.
    pub fn add_arc(
        &mut self,
        cell: CellId,
        proto: ArcProtoId,
        name: &str,
        tail: ArcEnd,
        head: ArcEnd,
        width: f64,
    ) -> Result<ArcId, DbError> {
        if self.tech_pool.arc_proto(proto).is_none() {
            return Err(IdError::UnknownArcProto(proto).into());
        }
        let (live, _) = self.cell_and_bounds(cell)?;
        let id = live.new_arc_id();
        self.check_arc_end(cell, id, proto, &tail)?;
        self.check_arc_end(cell, id, proto, &head)?;
        let arc = ImmutableArcInst::new(id, proto, name, tail, head, width)?;
        let (live, geom) = self.cell_and_bounds(cell)?;
        live.link_arc(&arc, geom);
        live.arcs.push(arc);
        live.dirty = true;
        Ok(id)
    }

    /// Replaces an arc by `f(arc)`. The id and prototype must not change.
    pub fn modify_arc(
        &mut self,
        cell: CellId,
        id: ArcId,
        f: impl FnOnce(&Arc<ImmutableArcInst>) -> Result<Arc<ImmutableArcInst>, DbError>,
    ) -> Result<(), DbError> {
        let old = Arc::clone(
            self.cell(cell)?
                .arc(id)
                .ok_or(DbError::NoSuchArc { cell, arc: id })?,
        );
        let new = f(&old)?;
        if Arc::ptr_eq(&old, &new) {
            return Ok(());
        }
        if new.arc_id != old.arc_id || new.proto != old.proto {
            return Err(DbError::IdChanged {
                from: format!("{} ({})", old.arc_id, old.proto),
                to: format!("{} ({})", new.arc_id, new.proto),
            });
        }
        self.check_arc_end(cell, id, new.proto, &new.tail)?;
        self.check_arc_end(cell, id, new.proto, &new.head)?;
        let rebuild = self.rebuild_on_miss();
        let (live, geom) = self.cell_and_bounds(cell)?;
        if geom.arc(&old) != geom.arc(&new) {
            live.unlink_arc(id, rebuild)?;
            live.link_arc(&new, geom);
        }
        if let Some(slot) = live.arcs.iter_mut().find(|a| a.arc_id == id) {
            *slot = new;
        }
        live.dirty = true;
        live.finish_edit(geom);
        Ok(())
    }

    /// Deletes an arc.
    pub fn remove_arc(&mut self, cell: CellId, id: ArcId) -> Result<(), DbError> {
        let rebuild = self.rebuild_on_miss();
        let (live, geom) = self.cell_and_bounds(cell)?;
        live.arc(id).ok_or(DbError::NoSuchArc { cell, arc: id })?;
        live.unlink_arc(id, rebuild)?;
        live.arcs.retain(|a| a.arc_id != id);
        live.dirty = true;
        live.finish_edit(geom);
        Ok(())
    }

    // ---- exports ----

    /// Exports a node port under `name` and returns the export id.
    pub fn add_export(
        &mut self,
        cell: CellId,
        name: &str,
        node: NodeId,
        port: PortProtoId,
    ) -> Result<ExportId, DbError> {
        let live = self.cell(cell)?;
        let original = live.node(node).ok_or_else(|| DbError::MissingNode {
            cell,
            node,
            what: format!("export '{name}'"),
        })?;
        self.check_port(cell, original, port)?;
        let id = self.registry.new_export_id(cell, name)?;
        if live.export(id).is_some() {
            return Err(DbError::DuplicateExport { cell, export: id });
        }
        let (live, _) = self.cell_and_bounds(cell)?;
        live.exports.push(ImmutableExport::new(id, name, node, port));
        live.dirty = true;
        Ok(id)
    }

    /// Replaces an export by `f(export)`. The id must not change.
    pub fn modify_export(
        &mut self,
        id: ExportId,
        f: impl FnOnce(&Arc<ImmutableExport>) -> Arc<ImmutableExport>,
    ) -> Result<(), DbError> {
        let cell = id.cell();
        let old = Arc::clone(self.cell(cell)?.export(id).ok_or(DbError::NoSuchExport(id))?);
        let new = f(&old);
        if Arc::ptr_eq(&old, &new) {
            return Ok(());
        }
        if new.export_id != id {
            return Err(DbError::IdChanged {
                from: id.to_string(),
                to: new.export_id.to_string(),
            });
        }
        let live = self.cell(cell)?;
        let original = live.node(new.original_node).ok_or_else(|| DbError::MissingNode {
            cell,
            node: new.original_node,
            what: format!("export {id}"),
        })?;
        self.check_port(cell, original, new.original_port)?;
        let (live, _) = self.cell_and_bounds(cell)?;
        if let Some(slot) = live.exports.iter_mut().find(|e| e.export_id == id) {
            *slot = new;
        }
        live.dirty = true;
        Ok(())
    }

    /// Deletes an export. Arcs attached to it on instances of its cell are
    /// deleted, and exports of it are deleted in turn.
    pub fn remove_export(&mut self, id: ExportId) -> Result<(), DbError> {
        self.cell(id.cell())?
            .export(id)
            .ok_or(DbError::NoSuchExport(id))?;
        let rebuild = self.rebuild_on_miss();
        let geom = GeomBounds {
            pool: &self.tech_pool,
            snapshot: &self.snapshot,
        };
        let mut pending = vec![id];
        while let Some(export) = pending.pop() {
            if let Some(owner) = self.cells.get_mut(export.cell().index()).and_then(Option::as_mut) {
                let before = owner.exports.len();
                owner.exports.retain(|e| e.export_id != export);
                owner.dirty |= owner.exports.len() != before;
            }
            let port = PortProtoId::Export(export);
            for live in self.cells.iter_mut().flatten() {
                let attached: Vec<ArcId> = live
                    .arcs
                    .iter()
                    .filter(|a| a.tail.port == port || a.head.port == port)
                    .map(|a| a.arc_id)
                    .collect();
                for arc in &attached {
                    live.unlink_arc(*arc, rebuild)?;
                }
                if !attached.is_empty() {
                    live.arcs.retain(|a| !attached.contains(&a.arc_id));
                    live.dirty = true;
                    live.finish_edit(geom);
                }
                pending.extend(
                    live.exports
                        .iter()
                        .filter(|e| e.original_port == port)
                        .map(|e| e.export_id),
                );
            }
        }
        Ok(())
    }

    // ---- snapshots ----

    /// Freezes the live state into a snapshot.
    ///
    /// Unedited cells and libraries keep their backups, so the cost follows
    /// the number of edited entities.
    pub fn backup(&mut self) -> Result<Arc<Snapshot>, DbError> {
        let start = Instant::now();
        let mut cells: Vec<Option<Arc<CellBackup>>> = Vec::with_capacity(self.cells.len());
        let mut edited = 0usize;
        for slot in self.cells.iter_mut() {
            let backup = match slot {
                Some(cell) => {
                    edited += usize::from(cell.dirty);
                    let backup = cell.freeze(&self.registry, &self.tech_pool)?;
                    let backup = backup.with_tech_pool(&self.tech_pool)?;
                    cell.backup = Arc::clone(&backup);
                    Some(backup)
                }
                None => None,
            };
            cells.push(backup);
        }
        let libs: Vec<Option<Arc<LibraryBackup>>> = self
            .libs
            .iter_mut()
            .map(|slot| slot.as_mut().map(Library::freeze))
            .collect();

        let old = Arc::clone(&self.snapshot);
        let snapshot = old.with(&self.registry, &self.tech_pool, &cells, &libs)?;
        if Arc::ptr_eq(&snapshot, &old) {
            return Ok(snapshot);
        }
        if self.config.database.verify {
            snapshot.check(&self.registry)?;
        }
        self.snapshot = Arc::clone(&snapshot);
        self.refresh_instances(&old)?;
        tracing::debug!(
            database = %self.config.database.name,
            snapshot = snapshot.id,
            edited_cells = edited,
            elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
            "backup"
        );
        Ok(snapshot)
    }

    /// Moves instances of cells whose bounds differ between `old` and the
    /// current snapshot.
    fn refresh_instances(&mut self, old: &Snapshot) -> Result<(), DbError> {
        let moved = moved_cells(&self.snapshot, old);
        if moved.is_empty() {
            return Ok(());
        }
        let rebuild = self.rebuild_on_miss();
        let geom = GeomBounds {
            pool: &self.tech_pool,
            snapshot: &self.snapshot,
        };
        for cell in self.cells.iter_mut().flatten() {
            if places_any(cell, &moved) {
                cell.refresh_instances(geom, rebuild)?;
            }
        }
        Ok(())
    }

    /// Makes the live state equal to `target`.
    ///
    /// Pending edits are backed up first. Cells are restored subcells
    /// first; a cell present only in `target` is created and a cell absent
    /// from it is dropped. Every changed cell and library is prepared aside
    /// and swapped in at the end, so on error the live state is unchanged.
    pub fn undo(&mut self, target: &Arc<Snapshot>) -> Result<(), DbError> {
        self.backup()?;
        let current = Arc::clone(&self.snapshot);
        if Arc::ptr_eq(&current, target) {
            return Ok(());
        }
        let start = Instant::now();
        let rebuild = self.rebuild_on_miss();
        let order = target.dependency_order(&self.registry)?;
        let changed: HashSet<CellId> = target.changed_cells(&current).into_iter().collect();
        let moved = moved_cells(target, &current);
        let geom = GeomBounds {
            pool: &target.tech_pool,
            snapshot: target,
        };

        let mut cells: Vec<(CellId, Option<Cell>)> = Vec::with_capacity(changed.len());
        for cell in order {
            if !changed.contains(&cell) {
                continue;
            }
            let backup = ordered_backup(target, cell)?;
            let live = match self.cells.get(cell.index()).and_then(Option::as_ref) {
                Some(live) => {
                    let mut live = live.clone();
                    live.restore(backup, geom, rebuild)?;
                    live
                }
                None => Cell::from_backup(Arc::clone(backup), geom),
            };
            cells.push((cell, Some(live)));
        }
        for &cell in &changed {
            if target.cell(cell).is_none() {
                cells.push((cell, None));
            }
        }
        if !moved.is_empty() {
            for live in self.cells.iter().flatten() {
                if changed.contains(&live.cell_id()) || !places_any(live, &moved) {
                    continue;
                }
                let mut live = live.clone();
                live.refresh_instances(geom, rebuild)?;
                cells.push((live.cell_id(), Some(live)));
            }
        }

        let mut libs: Vec<(LibId, Option<Library>)> = Vec::new();
        for lib in target.changed_libs(&current) {
            let live = target.library(lib).map(|backup| {
                let mut live = Library::new(Arc::clone(backup));
                if let Some(old) = self.libs.get(lib.index()).and_then(Option::as_ref) {
                    live.cells = old.cells.clone();
                }
                live
            });
            libs.push((lib, live));
        }

        let num_changed = changed.len();
        let saved = self.swap_in(Arc::clone(target), cells, libs);
        if let Err(err) = self.relink_libraries() {
            self.swap_in(saved.snapshot, saved.cells, saved.libs);
            return Err(err);
        }
        tracing::debug!(
            database = %self.config.database.name,
            from = current.id,
            to = target.id,
            changed_cells = num_changed,
            elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
            "undo"
        );
        Ok(())
    }

    /// Installs `snapshot` with its pool and the given cell and library
    /// slots, returning what was replaced.
    fn swap_in(
        &mut self,
        snapshot: Arc<Snapshot>,
        cells: Vec<(CellId, Option<Cell>)>,
        libs: Vec<(LibId, Option<Library>)>,
    ) -> Replaced {
        let old_snapshot = std::mem::replace(&mut self.snapshot, snapshot);
        self.tech_pool = Arc::clone(&self.snapshot.tech_pool);
        let cells = cells
            .into_iter()
            .map(|(id, live)| (id, swap_slot(&mut self.cells, id.index(), live)))
            .collect();
        let libs = libs
            .into_iter()
            .map(|(id, live)| (id, swap_slot(&mut self.libs, id.index(), live)))
            .collect();
        Replaced {
            snapshot: old_snapshot,
            cells,
            libs,
        }
    }

    /// Discards the live state and rebuilds it from `snapshot`. On error
    /// the live state is unchanged.
    pub fn recover(&mut self, snapshot: Arc<Snapshot>) -> Result<(), DbError> {
        let order = snapshot.dependency_order(&self.registry)?;
        let geom = GeomBounds {
            pool: &snapshot.tech_pool,
            snapshot: &snapshot,
        };
        let mut cells = Vec::new();
        for cell in order {
            let backup = ordered_backup(&snapshot, cell)?;
            put(&mut cells, cell.index(), Cell::from_backup(Arc::clone(backup), geom));
        }
        let libs = snapshot
            .lib_backups()
            .iter()
            .map(|b| b.as_ref().map(|b| Library::new(Arc::clone(b))))
            .collect();

        let old_pool = std::mem::replace(&mut self.tech_pool, Arc::clone(&snapshot.tech_pool));
        let old_snapshot = std::mem::replace(&mut self.snapshot, snapshot);
        let old_libs = std::mem::replace(&mut self.libs, libs);
        let old_cells = std::mem::replace(&mut self.cells, cells);
        if let Err(err) = self.relink_libraries() {
            self.tech_pool = old_pool;
            self.snapshot = old_snapshot;
            self.libs = old_libs;
            self.cells = old_cells;
            return Err(err);
        }
        Ok(())
    }

    fn relink_libraries(&mut self) -> Result<(), DbError> {
        let mut members: Vec<BTreeSet<CellId>> = vec![BTreeSet::new(); self.libs.len()];
        for cell in self.cells.iter().flatten() {
            let lib = self.registry.cell_lib(cell.cell_id())?;
            match members.get_mut(lib.index()) {
                Some(set) => {
                    set.insert(cell.cell_id());
                }
                None => return Err(DbError::NoSuchLibrary(lib)),
            }
        }
        for (slot, cells) in self.libs.iter_mut().zip(members) {
            if let Some(lib) = slot {
                lib.cells = cells;
            }
        }
        Ok(())
    }

    /// Confirms that every live object equals what `expected` records.
    pub fn check_fresh(&self, expected: &Snapshot) -> Result<(), DbError> {
        let len = self.cells.len().max(expected.cell_backups().len());
        for i in 0..len {
            let id = CellId::from_raw(i as u32);
            let live = self.cells.get(i).and_then(Option::as_ref);
            match (live, expected.cell(id)) {
                (None, None) => {}
                (Some(live), Some(backup)) => live.check_fresh(backup)?,
                (Some(_), None) => return Err(DbError::stale(id, "cell is not in the snapshot")),
                (None, Some(_)) => return Err(DbError::stale(id, "cell is missing")),
            }
        }
        let len = self.libs.len().max(expected.lib_backups().len());
        for i in 0..len {
            let id = LibId::from_raw(i as u32);
            let live = self.libs.get(i).and_then(Option::as_ref);
            match (live, expected.library(id)) {
                (None, None) => {}
                (Some(live), Some(backup)) if *live.d == *backup.d => {}
                (Some(_), Some(_)) => return Err(DbError::stale(id, "library header")),
                (Some(_), None) => return Err(DbError::stale(id, "library is not in the snapshot")),
                (None, Some(_)) => return Err(DbError::stale(id, "library is missing")),
            }
        }
        Ok(())
    }

    /// Recomputes every derived structure and compares it with the cached one.
    pub fn check(&self) -> Result<(), DbError> {
        self.registry.check_invariants()?;
        self.snapshot.check(&self.registry)?;
        for cell in self.cells() {
            if cell.dirty {
                continue;
            }
            if let Some(backup) = self.snapshot.cell(cell.cell_id()) {
                if Arc::ptr_eq(backup, &cell.backup) {
                    cell.check_fresh(backup)?;
                }
            }
        }
        Ok(())
    }
}

/// A design database: libraries and cells behind one read/write lock.
///
/// Any number of readers or one writer hold the lock at a time. Guards
/// release on every exit path. Snapshots handed out stay valid and
/// immutable after the lock is released.
#[derive(Debug)]
pub struct Database {
    registry: Arc<IdRegistry>,
    state: RwLock<LiveState>,
    name: String,
    report_once: bool,
    invariants_failed: AtomicBool,
    invariant_reports: AtomicUsize,
}

impl Database {
    /// Creates an empty database.
    pub fn new(registry: Arc<IdRegistry>, tech_pool: Arc<TechPool>, config: DatabaseConfig) -> Self {
        let name = config.database.name.clone();
        let report_once = config.invariants.report_once;
        Self {
            state: RwLock::new(LiveState::new(Arc::clone(&registry), tech_pool, config)),
            registry,
            name,
            report_once,
            invariants_failed: AtomicBool::new(false),
            invariant_reports: AtomicUsize::new(0),
        }
    }

    /// Creates an empty database configured by `<dir>/strata.toml`.
    pub fn open(dir: &Path, registry: Arc<IdRegistry>, tech_pool: Arc<TechPool>) -> Result<Self, ConfigError> {
        let config = load_config(dir)?;
        Ok(Self::new(registry, tech_pool, config))
    }

    /// The identity registry.
    pub fn registry(&self) -> &Arc<IdRegistry> {
        &self.registry
    }

    // State is only ever replaced wholesale by the writer, so a guard
    // poisoned by a panicking writer still protects a usable value.

    /// Takes the shared lock.
    pub fn lock_read(&self) -> RwLockReadGuard<'_, LiveState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Takes the exclusive lock.
    pub fn lock_write(&self) -> RwLockWriteGuard<'_, LiveState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// The snapshot of the last backup, undo, or recover.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(self.lock_read().snapshot())
    }

    /// See [`LiveState::backup`].
    pub fn backup(&self) -> Result<Arc<Snapshot>, DbError> {
        self.lock_write().backup()
    }

    /// See [`LiveState::undo`].
    pub fn undo(&self, target: &Arc<Snapshot>) -> Result<(), DbError> {
        self.lock_write().undo(target)
    }

    /// See [`LiveState::recover`].
    pub fn recover(&self, snapshot: Arc<Snapshot>) -> Result<(), DbError> {
        self.lock_write().recover(snapshot)
    }

    /// See [`LiveState::check_fresh`].
    pub fn check_fresh(&self, expected: &Snapshot) -> Result<(), DbError> {
        self.lock_read().check_fresh(expected)
    }

    /// See [`LiveState::check`]. Blocks while a writer holds the lock, so it
    /// must not be called by a thread holding [`lock_write`](Self::lock_write).
    pub fn verify(&self) -> Result<(), DbError> {
        self.lock_read().check()
    }

    /// Runs [`LiveState::check`] and reports the outcome as a boolean.
    ///
    /// Errors and panics are caught and logged. With `report_once` set
    /// only the first failure of this database is logged. If the lock is
    /// held for writing, including by the calling thread, nothing is
    /// checked and `false` is returned.
    pub fn check_invariants(&self) -> bool {
        let state = match self.state.try_read() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => {
                tracing::warn!(database = %self.name, "invariant check skipped, state is locked for writing");
                return false;
            }
        };
        let failure = match panic::catch_unwind(AssertUnwindSafe(|| state.check())) {
            Ok(Ok(())) => return true,
            Ok(Err(err)) => err.to_string(),
            Err(payload) => panic_message(payload.as_ref()),
        };
        drop(state);
        let first = !self.invariants_failed.swap(true, Ordering::Relaxed);
        if first || !self.report_once {
            self.invariant_reports.fetch_add(1, Ordering::Relaxed);
            tracing::error!(database = %self.name, error = %failure, "invariant check failed");
        }
        false
    }

    /// Number of invariant failures logged by
    /// [`check_invariants`](Self::check_invariants).
    pub fn invariant_reports(&self) -> usize {
        self.invariant_reports.load(Ordering::Relaxed)
    }
}

/// Slots displaced by [`LiveState::swap_in`].
struct Replaced {
    snapshot: Arc<Snapshot>,
    cells: Vec<(CellId, Option<Cell>)>,
    libs: Vec<(LibId, Option<Library>)>,
}

fn swap_slot<T>(table: &mut Vec<Option<T>>, slot: usize, value: Option<T>) -> Option<T> {
    if table.len() <= slot {
        table.resize_with(slot + 1, || None);
    }
    std::mem::replace(&mut table[slot], value)
}

/// The backup of a cell taken from the snapshot's own dependency order.
fn ordered_backup(snapshot: &Snapshot, cell: CellId) -> StrataResult<&Arc<CellBackup>> {
    snapshot
        .cell(cell)
        .ok_or_else(|| InternalError::new(format!("ordered cell {cell} has no backup")))
}

/// Cells whose bounds differ between two snapshots.
fn moved_cells(new: &Snapshot, old: &Snapshot) -> HashSet<CellId> {
    new.cell_ids()
        .chain(old.cell_ids())
        .filter(|&c| new.cell_bounds(c) != old.cell_bounds(c))
        .collect()
}

fn places_any(cell: &Cell, protos: &HashSet<CellId>) -> bool {
    cell.nodes
        .iter()
        .any(|n| n.proto.as_cell().is_some_and(|s| protos.contains(&s)))
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic".to_string()
    }
}
