//! Snapshot-wide export equivalence.

use std::collections::HashMap;
use std::sync::Arc;

use rayon::prelude::*;
use strata_db::{DbError, Snapshot};
use strata_ids::{CellId, IdRegistry};

use crate::equiv::EquivalentExports;
use crate::error::NetlistError;

/// Equivalence tables of every cell in one snapshot.
#[derive(Debug, Clone)]
pub struct NetworkTable {
    snapshot: Arc<Snapshot>,
    cells: HashMap<CellId, Arc<EquivalentExports>>,
}

impl NetworkTable {
    /// Computes every cell of `snapshot`, subcells first. Cells at the same
    /// hierarchy depth are computed in parallel.
    pub fn build(snapshot: &Arc<Snapshot>, registry: &IdRegistry) -> Result<Self, NetlistError> {
        compute(snapshot, registry, None)
    }

    /// Computes `snapshot`, reusing the table of every cell whose backup and
    /// subcell tables are unchanged since this table's snapshot.
    pub fn update(&self, snapshot: &Arc<Snapshot>, registry: &IdRegistry) -> Result<Self, NetlistError> {
        if Arc::ptr_eq(snapshot, &self.snapshot) {
            return Ok(self.clone());
        }
        compute(snapshot, registry, Some(self))
    }

    /// The snapshot these tables describe.
    pub fn snapshot(&self) -> &Arc<Snapshot> {
        &self.snapshot
    }

    /// The table of one cell.
    pub fn get(&self, cell: CellId) -> Option<&Arc<EquivalentExports>> {
        self.cells.get(&cell)
    }

    /// Number of cells.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Returns `true` if the snapshot has no cells.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Checks every table.
    pub fn check(&self) -> Result<(), NetlistError> {
        self.cells.values().try_for_each(|eq| eq.check())
    }
}

fn compute(
    snapshot: &Arc<Snapshot>,
    registry: &IdRegistry,
    old: Option<&NetworkTable>,
) -> Result<NetworkTable, NetlistError> {
    let order = snapshot.dependency_order(registry)?;

    let mut depth: HashMap<CellId, usize> = HashMap::with_capacity(order.len());
    let mut levels: Vec<Vec<CellId>> = Vec::new();
    for &cell in &order {
        let Some(rev) = snapshot.cell_revision(cell) else {
            continue;
        };
        let d = rev
            .subcells()
            .filter_map(|s| depth.get(&s))
            .max()
            .map_or(0, |d| d + 1);
        depth.insert(cell, d);
        if levels.len() <= d {
            levels.resize_with(d + 1, Vec::new);
        }
        levels[d].push(cell);
    }

    let mut cells: HashMap<CellId, Arc<EquivalentExports>> = HashMap::with_capacity(order.len());
    let mut reused = 0usize;
    for level in &levels {
        let done = &cells;
        let results: Vec<(CellId, Arc<EquivalentExports>, bool)> = level
            .par_iter()
            .map(|&cell| -> Result<_, NetlistError> {
                if let Some(prev) = old.and_then(|old| reusable(old, snapshot, done, cell)) {
                    return Ok((cell, prev, true));
                }
                let backup = snapshot.cell(cell).ok_or(DbError::NoSuchCell(cell))?;
                let eq = EquivalentExports::compute(backup, done)?;
                Ok((cell, Arc::new(eq), false))
            })
            .collect::<Result<_, _>>()?;
        for (cell, eq, was_reused) in results {
            reused += usize::from(was_reused);
            cells.insert(cell, eq);
        }
    }

    tracing::debug!(
        snapshot = snapshot.id,
        cells = cells.len(),
        reused,
        levels = levels.len(),
        "network tables computed"
    );
    Ok(NetworkTable {
        snapshot: Arc::clone(snapshot),
        cells,
    })
}

/// The previous table of `cell` if its backup is unchanged and every subcell
/// it places kept its previous table.
fn reusable(
    old: &NetworkTable,
    snapshot: &Snapshot,
    done: &HashMap<CellId, Arc<EquivalentExports>>,
    cell: CellId,
) -> Option<Arc<EquivalentExports>> {
    let now = snapshot.cell(cell)?;
    let before = old.snapshot.cell(cell)?;
    if !Arc::ptr_eq(now, before) {
        return None;
    }
    let same_subcells = now.revision.subcells().all(|s| match (done.get(&s), old.cells.get(&s)) {
        (Some(a), Some(b)) => Arc::ptr_eq(a, b),
        _ => false,
    });
    if !same_subcells {
        return None;
    }
    old.cells.get(&cell).cloned()
}
