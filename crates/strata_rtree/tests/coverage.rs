//! Randomized structural tests for the R-tree.

use std::collections::HashMap;

use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use strata_common::{Point, Rect};
use strata_rtree::{RTree, MAX_DEGREE, MIN_DEGREE};

#[derive(Debug, Clone)]
enum Op {
    Insert(u32, Rect),
    Remove(u32),
}

fn rect() -> impl Strategy<Value = Rect> {
    (-500i32..500, -500i32..500, 0i32..60, 0i32..60).prop_map(|(x, y, w, h)| {
        let (x, y) = (f64::from(x), f64::from(y));
        Rect::new(x, y, x + f64::from(w), y + f64::from(h))
    })
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0u32..64, rect()).prop_map(|(id, r)| Op::Insert(id, r)),
        2 => (0u32..64).prop_map(Op::Remove),
    ]
}

fn sorted(mut v: Vec<u32>) -> Vec<u32> {
    v.sort_unstable();
    v
}

proptest! {
    /// Any insert/remove sequence leaves a tree that passes `check` and
    /// holds exactly what a plain map would.
    #[test]
    fn matches_model(ops in prop::collection::vec(op(), 1..200)) {
        let mut tree: RTree<u32> = RTree::new();
        let mut model: HashMap<u32, Rect> = HashMap::new();
        for op in ops {
            match op {
                Op::Insert(id, r) => {
                    if let Some(old) = model.insert(id, r) {
                        tree.remove(&id, &old).unwrap();
                    }
                    tree.insert(id, r);
                }
                Op::Remove(id) => match model.remove(&id) {
                    Some(old) => tree.remove(&id, &old).unwrap(),
                    None => {
                        prop_assert!(tree.remove(&id, &Rect::new(0.0, 0.0, 1.0, 1.0)).is_err());
                    }
                },
            }
            prop_assert!(tree.check().is_ok());
        }
        prop_assert_eq!(tree.len(), model.len());
        let expected = sorted(model.keys().copied().collect());
        prop_assert_eq!(sorted(tree.iter().copied().collect()), expected.clone());
        if let Some(b) = tree.bounds() {
            prop_assert_eq!(sorted(tree.search(b, true).copied().collect()), expected);
        }
    }

    /// Area queries return exactly the boxes a linear scan finds.
    #[test]
    fn search_matches_scan(boxes in prop::collection::vec(rect(), 0..120), area in rect()) {
        let mut tree = RTree::new();
        for (i, r) in boxes.iter().enumerate() {
            tree.insert(i, *r);
        }
        for include_edges in [true, false] {
            let mut got: Vec<usize> = tree.search(area, include_edges).copied().collect();
            got.sort_unstable();
            let want: Vec<usize> = boxes
                .iter()
                .enumerate()
                .filter(|(_, r)| area.intersects(r, include_edges))
                .map(|(i, _)| i)
                .collect();
            prop_assert_eq!(got, want);
        }
    }
}

#[test]
fn leaves_stay_within_fanout() {
    let mut tree = RTree::new();
    for i in 0..100u32 {
        let x = f64::from(i) * 20.0;
        tree.insert(i, Rect::new(x, 0.0, x + 10.0, 10.0));
    }
    tree.check().unwrap();
    let occupancy = tree.leaf_occupancy();
    assert!(occupancy.len() > 1);
    assert!(occupancy.iter().all(|&n| (MIN_DEGREE..=MAX_DEGREE).contains(&n)));
}

#[test]
fn point_queries_find_containing_boxes() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let boxes: Vec<Rect> = (0..300)
        .map(|_| {
            let x = rng.gen_range(0.0..1000.0);
            let y = rng.gen_range(0.0..1000.0);
            Rect::new(x, y, x + rng.gen_range(1.0..80.0), y + rng.gen_range(1.0..80.0))
        })
        .collect();
    let mut tree = RTree::new();
    for (i, r) in boxes.iter().enumerate() {
        tree.insert(i, *r);
    }
    for _ in 0..200 {
        let p = Point::new(rng.gen_range(0.0..1080.0), rng.gen_range(0.0..1080.0));
        let mut got: Vec<usize> = tree.search(Rect::from_point(p), true).copied().collect();
        got.sort_unstable();
        let want: Vec<usize> = boxes
            .iter()
            .enumerate()
            .filter(|(_, r)| r.contains_point(p))
            .map(|(i, _)| i)
            .collect();
        assert_eq!(got, want);
    }
}

#[test]
fn shrinking_and_regrowing_keeps_balance() {
    let mut rng = StdRng::seed_from_u64(7);
    let mut tree = RTree::new();
    let mut live: Vec<(u32, Rect)> = Vec::new();
    for id in 0..400u32 {
        let x = rng.gen_range(-200.0..200.0);
        let y = rng.gen_range(-200.0..200.0);
        let r = Rect::new(x, y, x + 5.0, y + 5.0);
        tree.insert(id, r);
        live.push((id, r));
    }
    while live.len() > 20 {
        let (id, r) = live.swap_remove(rng.gen_range(0..live.len()));
        tree.remove(&id, &r).unwrap();
    }
    tree.check().unwrap();
    assert_eq!(tree.len(), 20);
    let mut ids: Vec<u32> = tree.iter().copied().collect();
    ids.sort_unstable();
    let mut want: Vec<u32> = live.iter().map(|(id, _)| *id).collect();
    want.sort_unstable();
    assert_eq!(ids, want);
}
