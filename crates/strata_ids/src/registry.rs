//! The id registry: allocation, interning, and the cell usage graph.
//!
//! All `new_*_id` factories are idempotent. A name seen before returns the id
//! allocated the first time; an unseen name takes the next dense index and is
//! recorded both in the index-ordered table and in the name map. Nothing is
//! ever removed, so an id stays valid for the lifetime of the registry.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use strata_common::{Ident, Interner};

use crate::arena::Arena;
use crate::cell_name::{CellName, View};
use crate::error::IdError;
use crate::ids::{
    ArcProtoId, CellId, ExportId, LibId, PrimitiveNodeId, PrimitivePortId, TechId,
};

/// A usage edge: `parent` instantiates `proto` somewhere in its content.
///
/// Usages are numbered per parent in creation order. Revisions index their
/// per-subcell instance counts by `index_in_parent`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct CellUsage {
    /// The instantiating cell.
    pub parent: CellId,
    /// The instantiated cell.
    pub proto: CellId,
    /// Position of this edge in the parent's usage list.
    pub index_in_parent: u32,
}

struct PrimitiveEntry {
    name: Ident,
    ports: Vec<Ident>,
    port_by_name: HashMap<Ident, u32>,
}

struct TechEntry {
    name: Ident,
    nodes: Vec<PrimitiveEntry>,
    node_by_name: HashMap<Ident, u32>,
    arcs: Vec<Ident>,
    arc_by_name: HashMap<Ident, u32>,
}

struct LibEntry {
    name: Ident,
}

struct CellEntry {
    lib: LibId,
    name: Ident,
    view: View,
    exports: Vec<Ident>,
    export_by_name: HashMap<Ident, u32>,
    usages_in: Vec<CellUsage>,
    usage_by_proto: HashMap<CellId, u32>,
    usages_of: Vec<CellUsage>,
}

#[derive(Default)]
struct Tables {
    techs: Arena<TechId, TechEntry>,
    tech_by_name: HashMap<Ident, TechId>,
    libs: Arena<LibId, LibEntry>,
    lib_by_name: HashMap<Ident, LibId>,
    cells: Arena<CellId, CellEntry>,
    cell_by_name: HashMap<(LibId, Ident, View), CellId>,
}

impl Tables {
    fn tech(&self, id: TechId) -> Result<&TechEntry, IdError> {
        self.techs.get(id).ok_or(IdError::UnknownTech(id))
    }

    fn cell(&self, id: CellId) -> Result<&CellEntry, IdError> {
        self.cells.get(id).ok_or(IdError::UnknownCell(id))
    }

    fn cell_mut(&mut self, id: CellId) -> Result<&mut CellEntry, IdError> {
        self.cells.get_mut(id).ok_or(IdError::UnknownCell(id))
    }

    fn primitive(&self, id: PrimitiveNodeId) -> Result<&PrimitiveEntry, IdError> {
        self.tech(id.tech())?
            .nodes
            .get(id.index() as usize)
            .ok_or(IdError::UnknownPrimitiveNode(id))
    }
}

/// Allocator and name table for every identity in one database.
///
/// The registry is shared by reference between the live database, snapshots
/// being read back from storage, and technology builders. Lookups take a
/// shared lock; allocation takes the exclusive lock only for the insert.
pub struct IdRegistry {
    interner: Interner,
    tables: RwLock<Tables>,
    read_only: AtomicBool,
    snapshot_counter: AtomicU64,
}

impl Default for IdRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for IdRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let t = self.read();
        f.debug_struct("IdRegistry")
            .field("techs", &t.techs.len())
            .field("libs", &t.libs.len())
            .field("cells", &t.cells.len())
            .field("read_only", &self.is_read_only())
            .finish()
    }
}

impl IdRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            interner: Interner::new(),
            tables: RwLock::new(Tables::default()),
            read_only: AtomicBool::new(false),
            snapshot_counter: AtomicU64::new(0),
        }
    }

    // The tables are only changed by single pushes/inserts, so a guard
    // poisoned by a panicking reader still protects consistent data.
    fn read(&self) -> RwLockReadGuard<'_, Tables> {
        self.tables.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Tables> {
        self.tables.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_writable(&self, kind: &'static str, name: impl Into<String>) -> Result<(), IdError> {
        if self.read_only.load(Ordering::Acquire) {
            return Err(IdError::ReadOnly {
                kind,
                name: name.into(),
            });
        }
        Ok(())
    }

    /// Freezes the registry. Every later attempt to allocate an unseen
    /// identity fails with [`IdError::ReadOnly`]; lookups keep working.
    pub fn set_read_only(&self) {
        self.read_only.store(true, Ordering::Release);
    }

    /// Returns `true` once [`set_read_only`](Self::set_read_only) was called.
    pub fn is_read_only(&self) -> bool {
        self.read_only.load(Ordering::Acquire)
    }

    /// Hands out the next snapshot sequence number.
    pub fn next_snapshot_id(&self) -> u64 {
        self.snapshot_counter.fetch_add(1, Ordering::Relaxed) + 1
    }

    // ---- technologies ----

    /// Returns the technology named `name`, allocating it if unseen.
    pub fn new_tech_id(&self, name: &str) -> Result<TechId, IdError> {
        let ident = self.interner.get_or_intern(name);
        let mut t = self.write();
        if let Some(&id) = t.tech_by_name.get(&ident) {
            return Ok(id);
        }
        self.ensure_writable("technology", name)?;
        let id = t.techs.alloc(TechEntry {
            name: ident,
            nodes: Vec::new(),
            node_by_name: HashMap::new(),
            arcs: Vec::new(),
            arc_by_name: HashMap::new(),
        });
        t.tech_by_name.insert(ident, id);
        Ok(id)
    }

    /// Looks up a technology by name.
    pub fn find_tech(&self, name: &str) -> Option<TechId> {
        let ident = self.interner.get(name)?;
        self.read().tech_by_name.get(&ident).copied()
    }

    /// Name of a technology.
    pub fn tech_name(&self, id: TechId) -> Result<&str, IdError> {
        let ident = self.read().tech(id)?.name;
        Ok(self.interner.resolve(ident))
    }

    /// Number of technologies allocated so far.
    pub fn num_techs(&self) -> usize {
        self.read().techs.len()
    }

    /// Returns the primitive node `name` of `tech`, allocating it if unseen.
    pub fn new_primitive_node_id(
        &self,
        tech: TechId,
        name: &str,
    ) -> Result<PrimitiveNodeId, IdError> {
        let ident = self.interner.get_or_intern(name);
        let mut t = self.write();
        let entry = t.techs.get_mut(tech).ok_or(IdError::UnknownTech(tech))?;
        if let Some(&index) = entry.node_by_name.get(&ident) {
            return Ok(PrimitiveNodeId::new(tech, index));
        }
        self.ensure_writable("primitive node", name)?;
        let index = entry.nodes.len() as u32;
        entry.nodes.push(PrimitiveEntry {
            name: ident,
            ports: Vec::new(),
            port_by_name: HashMap::new(),
        });
        entry.node_by_name.insert(ident, index);
        Ok(PrimitiveNodeId::new(tech, index))
    }

    /// Looks up a primitive node by name.
    pub fn find_primitive_node(&self, tech: TechId, name: &str) -> Option<PrimitiveNodeId> {
        let ident = self.interner.get(name)?;
        let t = self.read();
        let index = *t.techs.get(tech)?.node_by_name.get(&ident)?;
        Some(PrimitiveNodeId::new(tech, index))
    }

    /// Name of a primitive node.
    pub fn primitive_node_name(&self, id: PrimitiveNodeId) -> Result<&str, IdError> {
        let ident = self.read().primitive(id)?.name;
        Ok(self.interner.resolve(ident))
    }

    /// Number of primitive nodes in a technology.
    pub fn num_primitive_nodes(&self, tech: TechId) -> Result<u32, IdError> {
        Ok(self.read().tech(tech)?.nodes.len() as u32)
    }

    /// Returns the port `name` of a primitive node, allocating it if unseen.
    pub fn new_primitive_port_id(
        &self,
        node: PrimitiveNodeId,
        name: &str,
    ) -> Result<PrimitivePortId, IdError> {
        let ident = self.interner.get_or_intern(name);
        let mut t = self.write();
        let entry = t
            .techs
            .get_mut(node.tech())
            .and_then(|tech| tech.nodes.get_mut(node.index() as usize))
            .ok_or(IdError::UnknownPrimitiveNode(node))?;
        if let Some(&chron) = entry.port_by_name.get(&ident) {
            return Ok(node.port(chron));
        }
        self.ensure_writable("primitive port", name)?;
        let chron = entry.ports.len() as u32;
        entry.ports.push(ident);
        entry.port_by_name.insert(ident, chron);
        Ok(node.port(chron))
    }

    /// Looks up a primitive port by name.
    pub fn find_primitive_port(&self, node: PrimitiveNodeId, name: &str) -> Option<PrimitivePortId> {
        let ident = self.interner.get(name)?;
        let t = self.read();
        let chron = *t.primitive(node).ok()?.port_by_name.get(&ident)?;
        Some(node.port(chron))
    }

    /// Name of a primitive port.
    pub fn primitive_port_name(&self, id: PrimitivePortId) -> Result<&str, IdError> {
        let ident = {
            let t = self.read();
            *t.primitive(id.node())?
                .ports
                .get(id.chron() as usize)
                .ok_or(IdError::UnknownPrimitivePort(id))?
        };
        Ok(self.interner.resolve(ident))
    }

    /// Number of ports allocated on a primitive node.
    pub fn num_primitive_ports(&self, node: PrimitiveNodeId) -> Result<u32, IdError> {
        Ok(self.read().primitive(node)?.ports.len() as u32)
    }

    /// Returns the arc prototype `name` of `tech`, allocating it if unseen.
    pub fn new_arc_proto_id(&self, tech: TechId, name: &str) -> Result<ArcProtoId, IdError> {
        let ident = self.interner.get_or_intern(name);
        let mut t = self.write();
        let entry = t.techs.get_mut(tech).ok_or(IdError::UnknownTech(tech))?;
        if let Some(&index) = entry.arc_by_name.get(&ident) {
            return Ok(ArcProtoId::new(tech, index));
        }
        self.ensure_writable("arc prototype", name)?;
        let index = entry.arcs.len() as u32;
        entry.arcs.push(ident);
        entry.arc_by_name.insert(ident, index);
        Ok(ArcProtoId::new(tech, index))
    }

    /// Looks up an arc prototype by name.
    pub fn find_arc_proto(&self, tech: TechId, name: &str) -> Option<ArcProtoId> {
        let ident = self.interner.get(name)?;
        let index = *self.read().techs.get(tech)?.arc_by_name.get(&ident)?;
        Some(ArcProtoId::new(tech, index))
    }

    /// Name of an arc prototype.
    pub fn arc_proto_name(&self, id: ArcProtoId) -> Result<&str, IdError> {
        let ident = {
            let t = self.read();
            *t.tech(id.tech())?
                .arcs
                .get(id.index() as usize)
                .ok_or(IdError::UnknownArcProto(id))?
        };
        Ok(self.interner.resolve(ident))
    }

    // ---- libraries and cells ----

    /// Returns the library named `name`, allocating it if unseen.
    pub fn new_lib_id(&self, name: &str) -> Result<LibId, IdError> {
        let ident = self.interner.get_or_intern(name);
        let mut t = self.write();
        if let Some(&id) = t.lib_by_name.get(&ident) {
            return Ok(id);
        }
        self.ensure_writable("library", name)?;
        let id = t.libs.alloc(LibEntry { name: ident });
        t.lib_by_name.insert(ident, id);
        Ok(id)
    }

    /// Looks up a library by name.
    pub fn find_lib(&self, name: &str) -> Option<LibId> {
        let ident = self.interner.get(name)?;
        self.read().lib_by_name.get(&ident).copied()
    }

    /// Name of a library.
    pub fn lib_name(&self, id: LibId) -> Result<&str, IdError> {
        let ident = self.read().libs.get(id).ok_or(IdError::UnknownLib(id))?.name;
        Ok(self.interner.resolve(ident))
    }

    /// Number of libraries allocated so far.
    pub fn num_libs(&self) -> usize {
        self.read().libs.len()
    }

    /// Returns the cell `name` in `lib`, allocating it if unseen.
    pub fn new_cell_id(&self, lib: LibId, name: &CellName) -> Result<CellId, IdError> {
        let ident = self.interner.get_or_intern(&name.name);
        let mut t = self.write();
        if t.libs.get(lib).is_none() {
            return Err(IdError::UnknownLib(lib));
        }
        let key = (lib, ident, name.view);
        if let Some(&id) = t.cell_by_name.get(&key) {
            return Ok(id);
        }
        self.ensure_writable("cell", name.to_string())?;
        let id = t.cells.alloc(CellEntry {
            lib,
            name: ident,
            view: name.view,
            exports: Vec::new(),
            export_by_name: HashMap::new(),
            usages_in: Vec::new(),
            usage_by_proto: HashMap::new(),
            usages_of: Vec::new(),
        });
        t.cell_by_name.insert(key, id);
        Ok(id)
    }

    /// Looks up a cell by library and name.
    pub fn find_cell(&self, lib: LibId, name: &CellName) -> Option<CellId> {
        let ident = self.interner.get(&name.name)?;
        self.read()
            .cell_by_name
            .get(&(lib, ident, name.view))
            .copied()
    }

    /// Full name of a cell.
    pub fn cell_name(&self, id: CellId) -> Result<CellName, IdError> {
        let (ident, view) = {
            let t = self.read();
            let c = t.cell(id)?;
            (c.name, c.view)
        };
        Ok(CellName::new(self.interner.resolve(ident), view))
    }

    /// Library that owns a cell.
    pub fn cell_lib(&self, id: CellId) -> Result<LibId, IdError> {
        Ok(self.read().cell(id)?.lib)
    }

    /// View of a cell.
    pub fn cell_view(&self, id: CellId) -> Result<View, IdError> {
        Ok(self.read().cell(id)?.view)
    }

    /// Other view of the same cell group, if that cell was ever allocated.
    pub fn cell_in_view(&self, id: CellId, view: View) -> Result<Option<CellId>, IdError> {
        let t = self.read();
        let c = t.cell(id)?;
        Ok(t.cell_by_name.get(&(c.lib, c.name, view)).copied())
    }

    /// Number of cells allocated so far.
    pub fn num_cells(&self) -> usize {
        self.read().cells.len()
    }

    // ---- exports ----

    /// Returns the export `name` of `cell`, allocating it if unseen.
    pub fn new_export_id(&self, cell: CellId, name: &str) -> Result<ExportId, IdError> {
        let ident = self.interner.get_or_intern(name);
        let mut t = self.write();
        let entry = t.cell_mut(cell)?;
        if let Some(&chron) = entry.export_by_name.get(&ident) {
            return Ok(ExportId::new(cell, chron));
        }
        self.ensure_writable("export", name)?;
        Ok(ExportId::new(cell, push_export(entry, ident)))
    }

    /// Allocates a fresh export on `cell` whose name starts with `suggested`.
    ///
    /// If `suggested` is taken, `@1`, `@2`, ... are appended until the name
    /// is unused. Unlike [`new_export_id`](Self::new_export_id) this never
    /// returns an existing export.
    pub fn new_unique_export_id(&self, cell: CellId, suggested: &str) -> Result<ExportId, IdError> {
        self.ensure_writable("export", suggested)?;
        let mut t = self.write();
        let entry = t.cell_mut(cell)?;
        let mut candidate = suggested.to_string();
        let mut suffix = 0u32;
        loop {
            let taken = self
                .interner
                .get(&candidate)
                .is_some_and(|ident| entry.export_by_name.contains_key(&ident));
            if !taken {
                break;
            }
            suffix += 1;
            candidate = format!("{suggested}@{suffix}");
        }
        let ident = self.interner.get_or_intern(&candidate);
        Ok(ExportId::new(cell, push_export(entry, ident)))
    }

    /// Allocates a batch of new exports, failing if any name repeats within
    /// the batch or names an export `cell` already has.
    pub fn new_export_ids(&self, cell: CellId, names: &[&str]) -> Result<Vec<ExportId>, IdError> {
        if let Some(first) = names.first() {
            self.ensure_writable("export", *first)?;
        }
        let idents: Vec<Ident> = names
            .iter()
            .map(|n| self.interner.get_or_intern(n))
            .collect();
        let mut t = self.write();
        let entry = t.cell_mut(cell)?;
        for (i, ident) in idents.iter().enumerate() {
            if entry.export_by_name.contains_key(ident) || idents[..i].contains(ident) {
                return Err(IdError::DuplicateExport {
                    cell,
                    name: names[i].to_string(),
                });
            }
        }
        Ok(idents
            .into_iter()
            .map(|ident| ExportId::new(cell, push_export(entry, ident)))
            .collect())
    }

    /// Looks up an export by name.
    pub fn find_export(&self, cell: CellId, name: &str) -> Option<ExportId> {
        let ident = self.interner.get(name)?;
        let chron = *self.read().cells.get(cell)?.export_by_name.get(&ident)?;
        Some(ExportId::new(cell, chron))
    }

    /// Name the export was allocated with.
    pub fn export_name(&self, id: ExportId) -> Result<&str, IdError> {
        let ident = {
            let t = self.read();
            *t.cell(id.cell())?
                .exports
                .get(id.chron() as usize)
                .ok_or(IdError::UnknownExport(id))?
        };
        Ok(self.interner.resolve(ident))
    }

    /// Number of export ids allocated on `cell`.
    pub fn num_exports(&self, cell: CellId) -> Result<u32, IdError> {
        Ok(self.read().cell(cell)?.exports.len() as u32)
    }

    /// Returns `true` if `id` was allocated.
    pub fn export_exists(&self, id: ExportId) -> bool {
        self.read()
            .cells
            .get(id.cell())
            .is_some_and(|c| (id.chron() as usize) < c.exports.len())
    }

    /// Returns `true` if `id` was allocated.
    pub fn primitive_port_exists(&self, id: PrimitivePortId) -> bool {
        self.read()
            .primitive(id.node())
            .is_ok_and(|p| (id.chron() as usize) < p.ports.len())
    }

    // ---- usage graph ----

    /// Returns the usage edge `parent → proto`, creating it if unseen.
    pub fn cell_usage(&self, parent: CellId, proto: CellId) -> Result<CellUsage, IdError> {
        {
            let t = self.read();
            let p = t.cell(parent)?;
            if let Some(&index) = p.usage_by_proto.get(&proto) {
                return Ok(p.usages_in[index as usize]);
            }
        }
        let mut t = self.write();
        t.cell(proto)?;
        if let Some(&index) = t.cell(parent)?.usage_by_proto.get(&proto) {
            return Ok(t.cell(parent)?.usages_in[index as usize]);
        }
        if self.is_read_only() {
            let name = format!("{parent}->{proto}");
            return Err(IdError::ReadOnly { kind: "cell usage", name });
        }
        let entry = t.cell_mut(parent)?;
        let usage = CellUsage {
            parent,
            proto,
            index_in_parent: entry.usages_in.len() as u32,
        };
        entry.usages_in.push(usage);
        entry.usage_by_proto.insert(proto, usage.index_in_parent);
        t.cell_mut(proto)?.usages_of.push(usage);
        Ok(usage)
    }

    /// The `index`-th usage edge of `parent`.
    pub fn usage(&self, parent: CellId, index: u32) -> Result<CellUsage, IdError> {
        self.read()
            .cell(parent)?
            .usages_in
            .get(index as usize)
            .copied()
            .ok_or(IdError::UnknownUsage { parent, index })
    }

    /// Usage edges out of `cell` (the subcells it has ever instantiated).
    pub fn usages_in(&self, cell: CellId) -> Result<Vec<CellUsage>, IdError> {
        Ok(self.read().cell(cell)?.usages_in.clone())
    }

    /// Usage edges into `cell` (the cells that have ever instantiated it).
    pub fn usages_of(&self, cell: CellId) -> Result<Vec<CellUsage>, IdError> {
        Ok(self.read().cell(cell)?.usages_of.clone())
    }

    /// Verifies that every index-ordered table agrees with its name map and
    /// that the usage graph is mirrored in both directions.
    ///
    /// Runs in time linear in the number of ids. Never repairs anything.
    pub fn check_invariants(&self) -> Result<(), IdError> {
        let t = self.read();
        let corrupt = |msg: String| Err(IdError::Corrupt(msg));

        if t.tech_by_name.len() != t.techs.len() {
            return corrupt("technology name map size mismatch".into());
        }
        for (id, tech) in t.techs.iter() {
            if t.tech_by_name.get(&tech.name) != Some(&id) {
                return corrupt(format!("{id} not found under its name"));
            }
            check_dense(&tech.nodes, &tech.node_by_name, |n| n.name)
                .map_err(|i| IdError::Corrupt(format!("{id} primitive node #{i} misindexed")))?;
            check_dense(&tech.arcs, &tech.arc_by_name, |a| *a)
                .map_err(|i| IdError::Corrupt(format!("{id} arc prototype #{i} misindexed")))?;
            for (n, node) in tech.nodes.iter().enumerate() {
                check_dense(&node.ports, &node.port_by_name, |p| *p).map_err(|i| {
                    IdError::Corrupt(format!("{id} node #{n} port #{i} misindexed"))
                })?;
            }
        }

        if t.lib_by_name.len() != t.libs.len() {
            return corrupt("library name map size mismatch".into());
        }
        for (id, lib) in t.libs.iter() {
            if t.lib_by_name.get(&lib.name) != Some(&id) {
                return corrupt(format!("{id} not found under its name"));
            }
        }

        if t.cell_by_name.len() != t.cells.len() {
            return corrupt("cell name map size mismatch".into());
        }
        for (id, cell) in t.cells.iter() {
            if t.libs.get(cell.lib).is_none() {
                return corrupt(format!("{id} belongs to missing {}", cell.lib));
            }
            if t.cell_by_name.get(&(cell.lib, cell.name, cell.view)) != Some(&id) {
                return corrupt(format!("{id} not found under its name"));
            }
            check_dense(&cell.exports, &cell.export_by_name, |e| *e)
                .map_err(|i| IdError::Corrupt(format!("{id} export #{i} misindexed")))?;
            if cell.usage_by_proto.len() != cell.usages_in.len() {
                return corrupt(format!("{id} usage map size mismatch"));
            }
            for (i, u) in cell.usages_in.iter().enumerate() {
                if u.parent != id || u.index_in_parent as usize != i {
                    return corrupt(format!("{id} usage #{i} has wrong parent or index"));
                }
                if cell.usage_by_proto.get(&u.proto) != Some(&u.index_in_parent) {
                    return corrupt(format!("{id} usage #{i} missing from proto map"));
                }
                let Some(proto) = t.cells.get(u.proto) else {
                    return corrupt(format!("{id} usage #{i} names missing {}", u.proto));
                };
                if !proto.usages_of.contains(u) {
                    return corrupt(format!("{} does not list usage from {id}", u.proto));
                }
            }
            for u in &cell.usages_of {
                let parent_usage = t
                    .cells
                    .get(u.parent)
                    .and_then(|p| p.usages_in.get(u.index_in_parent as usize));
                if u.proto != id || parent_usage != Some(u) {
                    return corrupt(format!("{id} lists a usage its parent lacks"));
                }
            }
        }
        Ok(())
    }
}

fn push_export(entry: &mut CellEntry, ident: Ident) -> u32 {
    let chron = entry.exports.len() as u32;
    entry.exports.push(ident);
    entry.export_by_name.insert(ident, chron);
    chron
}

/// Checks that `items[i]` is found under its name at index `i`.
/// Returns the first bad index.
fn check_dense<T>(
    items: &[T],
    by_name: &HashMap<Ident, u32>,
    name: impl Fn(&T) -> Ident,
) -> Result<(), usize> {
    if items.len() != by_name.len() {
        return Err(items.len().min(by_name.len()));
    }
    for (i, item) in items.iter().enumerate() {
        if by_name.get(&name(item)) != Some(&(i as u32)) {
            return Err(i);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn registry_with_lib() -> (IdRegistry, LibId) {
        let reg = IdRegistry::new();
        let lib = reg.new_lib_id("work").unwrap();
        (reg, lib)
    }

    #[test]
    fn factories_are_idempotent() {
        let (reg, lib) = registry_with_lib();
        let a = reg.new_cell_id(lib, &CellName::new("inv", View::Layout)).unwrap();
        let b = reg.new_cell_id(lib, &CellName::new("inv", View::Layout)).unwrap();
        assert_eq!(a, b);
        assert_eq!(reg.num_cells(), 1);
        assert_eq!(reg.new_lib_id("work").unwrap(), lib);
    }

    #[test]
    fn indices_are_dense_and_ordered() {
        let reg = IdRegistry::new();
        let ids: Vec<_> = ["a", "b", "c"]
            .iter()
            .map(|n| reg.new_lib_id(n).unwrap())
            .collect();
        assert_eq!(ids.iter().map(|i| i.as_raw()).collect::<Vec<_>>(), [0, 1, 2]);
        assert_eq!(reg.lib_name(ids[1]).unwrap(), "b");
        assert_eq!(reg.find_lib("c"), Some(ids[2]));
        assert_eq!(reg.find_lib("zzz"), None);
    }

    #[test]
    fn views_are_distinct_cells() {
        let (reg, lib) = registry_with_lib();
        let sch = reg.new_cell_id(lib, &CellName::new("nand", View::Schematic)).unwrap();
        let ic = reg.new_cell_id(lib, &CellName::new("nand", View::Icon)).unwrap();
        assert_ne!(sch, ic);
        assert_eq!(reg.cell_in_view(sch, View::Icon).unwrap(), Some(ic));
        assert_eq!(reg.cell_in_view(sch, View::Layout).unwrap(), None);
        assert_eq!(reg.cell_name(ic).unwrap().to_string(), "nand{ic}");
    }

    #[test]
    fn cell_in_unknown_lib_fails() {
        let reg = IdRegistry::new();
        let err = reg
            .new_cell_id(LibId::from_raw(3), &CellName::new("x", View::Layout))
            .unwrap_err();
        assert_eq!(err, IdError::UnknownLib(LibId::from_raw(3)));
    }

    #[test]
    fn read_only_rejects_new_names_only() {
        let (reg, lib) = registry_with_lib();
        let name = CellName::new("top", View::Layout);
        let top = reg.new_cell_id(lib, &name).unwrap();
        reg.set_read_only();
        assert!(reg.is_read_only());
        assert_eq!(reg.new_cell_id(lib, &name).unwrap(), top);
        let err = reg
            .new_cell_id(lib, &CellName::new("other", View::Layout))
            .unwrap_err();
        assert!(matches!(err, IdError::ReadOnly { kind: "cell", .. }));
        assert!(matches!(
            reg.new_lib_id("fresh"),
            Err(IdError::ReadOnly { .. })
        ));
        assert_eq!(reg.num_cells(), 1);
    }

    #[test]
    fn exports_are_chronological() {
        let (reg, lib) = registry_with_lib();
        let cell = reg.new_cell_id(lib, &CellName::new("buf", View::Layout)).unwrap();
        let a = reg.new_export_id(cell, "in").unwrap();
        let b = reg.new_export_id(cell, "out").unwrap();
        assert_eq!((a.chron(), b.chron()), (0, 1));
        assert_eq!(reg.new_export_id(cell, "in").unwrap(), a);
        assert_eq!(reg.export_name(b).unwrap(), "out");
        assert_eq!(reg.num_exports(cell).unwrap(), 2);
        assert!(reg.export_exists(b));
        assert!(!reg.export_exists(ExportId::new(cell, 2)));
    }

    #[test]
    fn unique_export_appends_suffix() {
        let (reg, lib) = registry_with_lib();
        let cell = reg.new_cell_id(lib, &CellName::new("buf", View::Layout)).unwrap();
        reg.new_export_id(cell, "a").unwrap();
        let b = reg.new_unique_export_id(cell, "a").unwrap();
        let c = reg.new_unique_export_id(cell, "a").unwrap();
        assert_eq!(reg.export_name(b).unwrap(), "a@1");
        assert_eq!(reg.export_name(c).unwrap(), "a@2");
    }

    #[test]
    fn export_batch_rejects_duplicates() {
        let (reg, lib) = registry_with_lib();
        let cell = reg.new_cell_id(lib, &CellName::new("buf", View::Layout)).unwrap();
        let ids = reg.new_export_ids(cell, &["x", "y"]).unwrap();
        assert_eq!(ids.len(), 2);
        let err = reg.new_export_ids(cell, &["z", "z"]).unwrap_err();
        assert!(matches!(err, IdError::DuplicateExport { .. }));
        let err = reg.new_export_ids(cell, &["x"]).unwrap_err();
        assert!(matches!(err, IdError::DuplicateExport { .. }));
        assert_eq!(reg.num_exports(cell).unwrap(), 2);
    }

    #[test]
    fn primitives_hang_off_their_technology() {
        let reg = IdRegistry::new();
        let tech = reg.new_tech_id("cmos").unwrap();
        let pin = reg.new_primitive_node_id(tech, "Metal-1-Pin").unwrap();
        let port = reg.new_primitive_port_id(pin, "m1").unwrap();
        let arc = reg.new_arc_proto_id(tech, "Metal-1").unwrap();
        assert_eq!(pin.tech(), tech);
        assert_eq!(port.node(), pin);
        assert_eq!(reg.primitive_port_name(port).unwrap(), "m1");
        assert_eq!(reg.arc_proto_name(arc).unwrap(), "Metal-1");
        assert_eq!(reg.find_primitive_node(tech, "Metal-1-Pin"), Some(pin));
        assert!(reg.primitive_port_exists(port));
        assert!(!reg.primitive_port_exists(pin.port(1)));
        assert_eq!(reg.num_primitive_ports(pin).unwrap(), 1);
    }

    #[test]
    fn usage_edges_are_mirrored() {
        let (reg, lib) = registry_with_lib();
        let top = reg.new_cell_id(lib, &CellName::new("top", View::Layout)).unwrap();
        let inv = reg.new_cell_id(lib, &CellName::new("inv", View::Layout)).unwrap();
        let nand = reg.new_cell_id(lib, &CellName::new("nand", View::Layout)).unwrap();
        let u0 = reg.cell_usage(top, inv).unwrap();
        let u1 = reg.cell_usage(top, nand).unwrap();
        assert_eq!(reg.cell_usage(top, inv).unwrap(), u0);
        assert_eq!((u0.index_in_parent, u1.index_in_parent), (0, 1));
        assert_eq!(reg.usages_in(top).unwrap(), vec![u0, u1]);
        assert_eq!(reg.usages_of(inv).unwrap(), vec![u0]);
        assert_eq!(reg.usage(top, 1).unwrap(), u1);
        assert!(matches!(
            reg.usage(top, 2),
            Err(IdError::UnknownUsage { index: 2, .. })
        ));
        reg.check_invariants().unwrap();
    }

    #[test]
    fn concurrent_allocation_agrees() {
        let reg = Arc::new(IdRegistry::new());
        let lib = reg.new_lib_id("work").unwrap();
        let names: Vec<String> = (0..64).map(|i| format!("c{i}")).collect();
        let results: Vec<Vec<CellId>> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    let reg = Arc::clone(&reg);
                    let names = &names;
                    s.spawn(move || {
                        names
                            .iter()
                            .map(|n| {
                                reg.new_cell_id(lib, &CellName::new(n.as_str(), View::Layout))
                                    .unwrap()
                            })
                            .collect::<Vec<CellId>>()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        for r in &results[1..] {
            assert_eq!(r, &results[0]);
        }
        assert_eq!(reg.num_cells(), 64);
        reg.check_invariants().unwrap();
    }

    #[test]
    fn snapshot_ids_increase() {
        let reg = IdRegistry::new();
        let a = reg.next_snapshot_id();
        let b = reg.next_snapshot_id();
        assert!(b > a);
    }
}
