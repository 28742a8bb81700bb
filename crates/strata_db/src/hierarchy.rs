//! Cell dependency ordering.

use std::collections::HashMap;

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use strata_ids::{CellId, IdRegistry, View};

use crate::error::DbError;
use crate::revision::CellRevision;

/// Orders cells so that every cell comes after the cells it places.
///
/// An icon instance also depends on the schematic the icon belongs to,
/// except inside that schematic itself: a schematic may show its own icon.
/// Subcells outside `cells` are ignored. Any other cycle is an error.
pub fn dependency_order<'a>(
    registry: &IdRegistry,
    cells: impl IntoIterator<Item = &'a CellRevision>,
) -> Result<Vec<CellId>, DbError> {
    let mut revisions: Vec<&CellRevision> = cells.into_iter().collect();
    revisions.sort_by_key(|r| r.cell_id());

    let mut graph: DiGraph<CellId, ()> = DiGraph::with_capacity(revisions.len(), 0);
    let mut index: HashMap<CellId, NodeIndex> = HashMap::with_capacity(revisions.len());
    for rev in &revisions {
        index.insert(rev.cell_id(), graph.add_node(rev.cell_id()));
    }
    for rev in &revisions {
        let parent = rev.cell_id();
        let to = index[&parent];
        for sub in rev.subcells() {
            if let Some(&from) = index.get(&sub) {
                graph.update_edge(from, to, ());
            }
            if registry.cell_view(sub)? != View::Icon {
                continue;
            }
            let Some(schematic) = registry.cell_in_view(sub, View::Schematic)? else {
                continue;
            };
            if schematic == parent {
                continue;
            }
            if let Some(&from) = index.get(&schematic) {
                graph.update_edge(from, to, ());
            }
        }
    }

    toposort(&graph, None)
        .map(|order| order.into_iter().map(|n| graph[n]).collect())
        .map_err(|cycle| DbError::RecursiveHierarchy(graph[cycle.node_id()]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::ImmutableCell;
    use crate::node::ImmutableNodeInst;
    use std::sync::Arc;
    use strata_common::Point;
    use strata_ids::{CellName, NodeId};

    fn cell(reg: &IdRegistry, name: &str, view: View) -> Arc<CellRevision> {
        let lib = reg.new_lib_id("work").unwrap();
        let id = reg.new_cell_id(lib, &CellName::new(name, view)).unwrap();
        CellRevision::new(ImmutableCell::new(id, name))
    }

    fn place(reg: &IdRegistry, parent: &Arc<CellRevision>, subs: &[CellId]) -> Arc<CellRevision> {
        let nodes: Vec<_> = subs
            .iter()
            .enumerate()
            .map(|(i, &s)| {
                ImmutableNodeInst::new(NodeId::from_raw(i as u32), s.into(), "i", Point::ORIGIN, 0.0, 0.0).unwrap()
            })
            .collect();
        parent.with(reg, &parent.d, Some(&nodes), None, None).unwrap()
    }

    #[test]
    fn subcells_come_first() {
        let reg = IdRegistry::new();
        let top = cell(&reg, "top", View::Layout);
        let mid = cell(&reg, "mid", View::Layout);
        let leaf = cell(&reg, "leaf", View::Layout);
        let top = place(&reg, &top, &[mid.cell_id(), leaf.cell_id()]);
        let mid = place(&reg, &mid, &[leaf.cell_id()]);
        let order = dependency_order(&reg, [&*top, &*mid, &*leaf]).unwrap();
        assert_eq!(order, vec![leaf.cell_id(), mid.cell_id(), top.cell_id()]);
    }

    #[test]
    fn schematic_may_hold_its_own_icon() {
        let reg = IdRegistry::new();
        let sch = cell(&reg, "inv", View::Schematic);
        let icon = cell(&reg, "inv", View::Icon);
        let user = cell(&reg, "top", View::Schematic);
        let sch = place(&reg, &sch, &[icon.cell_id()]);
        let user = place(&reg, &user, &[icon.cell_id()]);
        let order = dependency_order(&reg, [&*user, &*icon, &*sch]).unwrap();
        let pos = |c: CellId| order.iter().position(|&x| x == c).unwrap();
        assert!(pos(icon.cell_id()) < pos(sch.cell_id()));
        assert!(pos(sch.cell_id()) < pos(user.cell_id()));
    }

    #[test]
    fn cycles_are_rejected() {
        let reg = IdRegistry::new();
        let a = cell(&reg, "a", View::Layout);
        let b = cell(&reg, "b", View::Layout);
        let a = place(&reg, &a, &[b.cell_id()]);
        let b = place(&reg, &b, &[a.cell_id()]);
        let err = dependency_order(&reg, [&*a, &*b]).unwrap_err();
        assert!(matches!(err, DbError::RecursiveHierarchy(_)));
    }
}
