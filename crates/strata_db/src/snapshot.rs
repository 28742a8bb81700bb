//! Whole-database immutable states.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use strata_common::{Name, Rect};
use strata_ids::{CellId, IdRegistry, LibId};
use strata_tech::TechPool;

use crate::backup::{CellBackup, LibraryBackup};
use crate::error::DbError;
use crate::hierarchy::dependency_order;
use crate::revision::CellRevision;

/// An immutable state of every library and cell.
///
/// Backups live in dense arrays indexed by cell and library id. A new
/// snapshot shares every array, and every array slot, that did not change.
#[derive(Debug)]
pub struct Snapshot {
    /// Increases with every snapshot built from the same registry.
    pub id: u64,
    /// All technologies available to cells.
    pub tech_pool: Arc<TechPool>,
    cell_backups: Arc<[Option<Arc<CellBackup>>]>,
    cell_bounds: Arc<[Option<Rect>]>,
    cell_groups: Arc<[Option<u32>]>,
    lib_backups: Arc<[Option<Arc<LibraryBackup>>]>,
}

impl Snapshot {
    /// A snapshot with no libraries and no cells.
    pub fn empty(registry: &IdRegistry, tech_pool: Arc<TechPool>) -> Arc<Self> {
        Arc::new(Self {
            id: registry.next_snapshot_id(),
            tech_pool,
            cell_backups: Arc::from(Vec::new()),
            cell_bounds: Arc::from(Vec::new()),
            cell_groups: Arc::from(Vec::new()),
            lib_backups: Arc::from(Vec::new()),
        })
    }

    /// Returns a snapshot holding the given backups.
    ///
    /// Slot `i` of `cells` must hold the backup of the cell with index `i`,
    /// and likewise for `libs`. When every slot holds the same backup as
    /// this snapshot and the pool is the same, this snapshot is returned.
    pub fn with(
        self: &Arc<Self>,
        registry: &IdRegistry,
        tech_pool: &Arc<TechPool>,
        cells: &[Option<Arc<CellBackup>>],
        libs: &[Option<Arc<LibraryBackup>>],
    ) -> Result<Arc<Self>, DbError> {
        let new_cells = changed_slots(&self.cell_backups, cells);
        let new_libs = changed_slots(&self.lib_backups, libs);
        if new_cells.is_none() && new_libs.is_none() && Arc::ptr_eq(tech_pool, &self.tech_pool) {
            return Ok(Arc::clone(self));
        }
        let cell_backups = new_cells.unwrap_or_else(|| Arc::clone(&self.cell_backups));
        let lib_backups = new_libs.unwrap_or_else(|| Arc::clone(&self.lib_backups));
        check_slots(registry, &cell_backups, &lib_backups)?;

        let bounds = compute_bounds(registry, &cell_backups, Some(self))?;
        let cell_bounds = if *bounds == *self.cell_bounds {
            Arc::clone(&self.cell_bounds)
        } else {
            Arc::from(bounds)
        };
        let groups = compute_groups(registry, &cell_backups)?;
        let cell_groups = if *groups == *self.cell_groups {
            Arc::clone(&self.cell_groups)
        } else {
            Arc::from(groups)
        };

        Ok(Arc::new(Self {
            id: registry.next_snapshot_id(),
            tech_pool: Arc::clone(tech_pool),
            cell_backups,
            cell_bounds,
            cell_groups,
            lib_backups,
        }))
    }

    /// Backup of a cell.
    pub fn cell(&self, id: CellId) -> Option<&Arc<CellBackup>> {
        self.cell_backups.get(id.index())?.as_ref()
    }

    /// Revision of a cell.
    pub fn cell_revision(&self, id: CellId) -> Option<&Arc<CellRevision>> {
        self.cell(id).map(|b| &b.revision)
    }

    /// Bounds of a cell including its placed subcells.
    pub fn cell_bounds(&self, id: CellId) -> Option<Rect> {
        self.cell_bounds.get(id.index()).copied().flatten()
    }

    /// Group number shared by every view of one circuit in one library.
    pub fn cell_group(&self, id: CellId) -> Option<u32> {
        self.cell_groups.get(id.index()).copied().flatten()
    }

    /// Backup of a library.
    pub fn library(&self, id: LibId) -> Option<&Arc<LibraryBackup>> {
        self.lib_backups.get(id.index())?.as_ref()
    }

    /// Cell backups by cell index.
    pub fn cell_backups(&self) -> &[Option<Arc<CellBackup>>] {
        &self.cell_backups
    }

    /// Library backups by library index.
    pub fn lib_backups(&self) -> &[Option<Arc<LibraryBackup>>] {
        &self.lib_backups
    }

    /// Ids of the cells present.
    pub fn cell_ids(&self) -> impl Iterator<Item = CellId> + '_ {
        self.cell_backups
            .iter()
            .flatten()
            .map(|b| b.revision.cell_id())
    }

    /// Cells whose backup differs from the one in `old`, including cells
    /// present in only one of the two.
    pub fn changed_cells(&self, old: &Snapshot) -> Vec<CellId> {
        let len = self.cell_backups.len().max(old.cell_backups.len());
        (0..len)
            .filter(|&i| !same_slot(self.cell_backups.get(i), old.cell_backups.get(i)))
            .map(|i| CellId::from_raw(i as u32))
            .collect()
    }

    /// Libraries whose backup differs from the one in `old`.
    pub fn changed_libs(&self, old: &Snapshot) -> Vec<LibId> {
        let len = self.lib_backups.len().max(old.lib_backups.len());
        (0..len)
            .filter(|&i| !same_slot(self.lib_backups.get(i), old.lib_backups.get(i)))
            .map(|i| LibId::from_raw(i as u32))
            .collect()
    }

    /// Cells present, subcells before the cells that place them.
    pub fn dependency_order(&self, registry: &IdRegistry) -> Result<Vec<CellId>, DbError> {
        dependency_order(
            registry,
            self.cell_backups.iter().flatten().map(|b| &*b.revision),
        )
    }

    /// Checks every backup and recomputes bounds and groups.
    pub fn check(&self, registry: &IdRegistry) -> Result<(), DbError> {
        check_slots(registry, &self.cell_backups, &self.lib_backups)?;
        for backup in self.cell_backups.iter().flatten() {
            backup.check(registry)?;
            if !backup.tech_pool.iter().all(|t| {
                self.tech_pool
                    .get(t.id())
                    .is_some_and(|own| Arc::ptr_eq(own, t))
            }) {
                return Err(DbError::check(backup.revision.cell_id(), "technology not in snapshot pool"));
            }
        }
        let bounds = compute_bounds(registry, &self.cell_backups, None)?;
        let same_bounds = bounds.len() == self.cell_bounds.len()
            && bounds
                .iter()
                .zip(self.cell_bounds.iter())
                .all(|(a, b)| match (a, b) {
                    (None, None) => true,
                    (Some(a), Some(b)) => a.approx_eq(b),
                    _ => false,
                });
        if !same_bounds {
            return Err(DbError::check(format!("snapshot {}", self.id), "cell bounds"));
        }
        if *compute_groups(registry, &self.cell_backups)? != *self.cell_groups {
            return Err(DbError::check(format!("snapshot {}", self.id), "cell groups"));
        }
        Ok(())
    }
}

fn same_slot<T>(a: Option<&Option<Arc<T>>>, b: Option<&Option<Arc<T>>>) -> bool {
    match (a.and_then(Option::as_ref), b.and_then(Option::as_ref)) {
        (None, None) => true,
        (Some(a), Some(b)) => Arc::ptr_eq(a, b),
        _ => false,
    }
}

/// The new slot array if any slot differs from `old`. Trailing empty slots
/// are dropped.
fn changed_slots<T>(old: &Arc<[Option<Arc<T>>]>, new: &[Option<Arc<T>>]) -> Option<Arc<[Option<Arc<T>>]>> {
    let len = new.iter().rposition(Option::is_some).map_or(0, |i| i + 1);
    let new = &new[..len];
    let same = old.len() == new.len()
        && old
            .iter()
            .zip(new)
            .all(|(a, b)| same_slot(Some(a), Some(b)));
    (!same).then(|| Arc::from(new.to_vec()))
}

fn check_slots(
    registry: &IdRegistry,
    cells: &[Option<Arc<CellBackup>>],
    libs: &[Option<Arc<LibraryBackup>>],
) -> Result<(), DbError> {
    for (i, lib) in libs.iter().enumerate() {
        if let Some(lib) = lib {
            if lib.d.lib_id.index() != i {
                return Err(DbError::check(lib.d.lib_id, format!("stored in library slot {i}")));
            }
        }
    }
    for (i, backup) in cells.iter().enumerate() {
        let Some(backup) = backup else {
            continue;
        };
        let cell = backup.revision.cell_id();
        if cell.index() != i {
            return Err(DbError::check(cell, format!("stored in cell slot {i}")));
        }
        let lib = registry.cell_lib(cell)?;
        if libs.get(lib.index()).and_then(Option::as_ref).is_none() {
            return Err(DbError::NoSuchLibrary(lib));
        }
        for sub in backup.revision.subcells() {
            if cells.get(sub.index()).and_then(Option::as_ref).is_none() {
                return Err(DbError::NoSuchCell(sub));
            }
        }
    }
    Ok(())
}

/// Computes cell bounds bottom-up. With `old`, a cell whose backup and
/// subcell bounds are unchanged keeps its previous value.
fn compute_bounds(
    registry: &IdRegistry,
    cells: &[Option<Arc<CellBackup>>],
    old: Option<&Snapshot>,
) -> Result<Vec<Option<Rect>>, DbError> {
    let order = dependency_order(registry, cells.iter().flatten().map(|b| &*b.revision))?;
    let mut bounds: Vec<Option<Rect>> = vec![None; cells.len()];
    let mut changed: HashSet<CellId> = HashSet::new();
    for cell in order {
        let Some(backup) = cells[cell.index()].as_ref() else {
            continue;
        };
        let reusable = old.filter(|old| {
            old.cell(cell).is_some_and(|b| Arc::ptr_eq(b, backup))
                && !backup.revision.subcells().any(|s| changed.contains(&s))
        });
        let value = match reusable {
            Some(old) => old.cell_bounds(cell),
            None => {
                let placed = backup.revision.nodes().iter().filter_map(|n| {
                    let sub = n.proto.as_cell()?;
                    bounds.get(sub.index()).copied().flatten().map(|b| n.placed_bounds(&b))
                });
                let value = Rect::union_all(backup.primitive_bounds().into_iter().chain(placed));
                let previous = old.and_then(|old| old.cell_bounds(cell));
                if old.is_none() || value != previous {
                    changed.insert(cell);
                }
                value
            }
        };
        bounds[cell.index()] = value;
    }
    Ok(bounds)
}

/// Numbers cell groups in cell index order. A group is every cell of one
/// library sharing a group name.
fn compute_groups(registry: &IdRegistry, cells: &[Option<Arc<CellBackup>>]) -> Result<Vec<Option<u32>>, DbError> {
    let mut numbers: HashMap<(LibId, Name), u32> = HashMap::new();
    let mut groups = Vec::with_capacity(cells.len());
    for backup in cells {
        let Some(backup) = backup else {
            groups.push(None);
            continue;
        };
        let d = &backup.revision.d;
        let key = (registry.cell_lib(d.cell_id)?, d.group_name.clone());
        let next = numbers.len() as u32;
        groups.push(Some(*numbers.entry(key).or_insert(next)));
    }
    Ok(groups)
}
