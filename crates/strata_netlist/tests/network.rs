//! Export equivalence across a small hierarchy.

use std::sync::Arc;

use strata_common::Point;
use strata_config::DatabaseConfig;
use strata_db::{ArcEnd, Database, LiveState};
use strata_ids::{CellId, CellName, ExportId, IdRegistry, NodeProtoId, View};
use strata_netlist::NetworkTable;
use strata_tech::{load_technology, EquivPolicy, TechPool, Technology};

struct Fixture {
    db: Database,
    cmos: Arc<Technology>,
}

fn fixture() -> Fixture {
    let registry = Arc::new(IdRegistry::new());
    let cmos = load_technology(&registry, "cmos").unwrap();
    let pool = TechPool::new([Arc::clone(&cmos)]);
    Fixture {
        db: Database::new(registry, pool, DatabaseConfig::default()),
        cmos,
    }
}

/// A cell holding one two-terminal resistor exported as `a` and `b`.
fn resistor_cell(f: &Fixture, state: &mut LiveState, name: &str, kind: &str) -> (CellId, ExportId, ExportId) {
    let lib = state.new_library("work").unwrap();
    let cell = state.new_cell(lib, &CellName::new(name, View::Layout)).unwrap();
    let r = f.cmos.find_node(kind).unwrap().id;
    let node = state
        .add_node(cell, r.into(), "r", Point::ORIGIN, 4.0, 8.0)
        .unwrap();
    let a = state.add_export(cell, "a", node, r.port(0).into()).unwrap();
    let b = state.add_export(cell, "b", node, r.port(1).into()).unwrap();
    (cell, a, b)
}

/// Two instances of `leaf` in series, exported as `in` and `out`.
fn series_cell(f: &Fixture, state: &mut LiveState, leaf: (CellId, ExportId, ExportId)) -> CellId {
    let (leaf, a, b) = leaf;
    let lib = state.new_library("work").unwrap();
    let name = format!("series-{}", leaf.index());
    let cell = state.new_cell(lib, &CellName::new(name, View::Layout)).unwrap();
    let r1 = state
        .add_node(cell, NodeProtoId::Cell(leaf), "r1", Point::ORIGIN, 0.0, 0.0)
        .unwrap();
    let r2 = state
        .add_node(cell, NodeProtoId::Cell(leaf), "r2", Point::new(0.0, 20.0), 0.0, 0.0)
        .unwrap();
    let m1 = f.cmos.find_arc("Metal-1").unwrap().id;
    state
        .add_arc(
            cell,
            m1,
            "mid",
            ArcEnd::new(r1, b, Point::new(0.0, 4.0)),
            ArcEnd::new(r2, a, Point::new(0.0, 16.0)),
            3.0,
        )
        .unwrap();
    state.add_export(cell, "in", r1, a.into()).unwrap();
    state.add_export(cell, "out", r2, b.into()).unwrap();
    cell
}

#[test]
fn series_resistors_merge_under_parasitic_policy() {
    let f = fixture();
    let (leaf, top) = {
        let mut state = f.db.lock_write();
        let leaf = resistor_cell(&f, &mut state, "res", "Resistor");
        let top = series_cell(&f, &mut state, leaf);
        (leaf.0, top)
    };
    let snapshot = f.db.backup().unwrap();
    let table = NetworkTable::build(&snapshot, f.db.registry()).unwrap();
    table.check().unwrap();

    let leaf_eq = table.get(leaf).unwrap();
    assert!(!leaf_eq.equivalent(EquivPolicy::N, 0, 1));
    assert!(leaf_eq.equivalent(EquivPolicy::P, 0, 1));

    let top_eq = table.get(top).unwrap();
    assert!(!top_eq.equivalent(EquivPolicy::N, 0, 1));
    assert!(top_eq.equivalent(EquivPolicy::P, 0, 1));
    assert!(top_eq.equivalent(EquivPolicy::A, 0, 1));
    assert_eq!(top_eq.num_classes(EquivPolicy::N), 2);
}

#[test]
fn complex_resistors_merge_only_under_all_policy() {
    let f = fixture();
    let top = {
        let mut state = f.db.lock_write();
        let leaf = resistor_cell(&f, &mut state, "cres", "Complex-Resistor");
        series_cell(&f, &mut state, leaf)
    };
    let snapshot = f.db.backup().unwrap();
    let table = NetworkTable::build(&snapshot, f.db.registry()).unwrap();
    let top_eq = table.get(top).unwrap();
    assert!(!top_eq.equivalent(EquivPolicy::P, 0, 1));
    assert!(top_eq.equivalent(EquivPolicy::A, 0, 1));
}

#[test]
fn update_reuses_untouched_cells() {
    let f = fixture();
    let (leaf, top) = {
        let mut state = f.db.lock_write();
        let leaf = resistor_cell(&f, &mut state, "res", "Resistor");
        let top = series_cell(&f, &mut state, leaf);
        (leaf.0, top)
    };
    let s1 = f.db.backup().unwrap();
    let t1 = NetworkTable::build(&s1, f.db.registry()).unwrap();

    {
        let mut state = f.db.lock_write();
        let pin = f.cmos.find_node("Metal-1-Pin").unwrap().id;
        state
            .add_node(top, pin.into(), "spare", Point::new(50.0, 0.0), 3.0, 3.0)
            .unwrap();
    }
    let s2 = f.db.backup().unwrap();
    let t2 = t1.update(&s2, f.db.registry()).unwrap();
    assert!(Arc::ptr_eq(t1.get(leaf).unwrap(), t2.get(leaf).unwrap()));
    assert!(!Arc::ptr_eq(t1.get(top).unwrap(), t2.get(top).unwrap()));
    assert_eq!(t1.get(top).unwrap().classes(EquivPolicy::P), t2.get(top).unwrap().classes(EquivPolicy::P));
}
