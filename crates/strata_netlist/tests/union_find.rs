//! Property tests: union-find output is the connected-component partition.

use proptest::prelude::*;
use strata_netlist::UnionFind;

/// Component labels by repeated relaxation, smallest member as label.
fn components(len: usize, edges: &[(u32, u32)]) -> Vec<u32> {
    let mut label: Vec<u32> = (0..len as u32).collect();
    loop {
        let mut changed = false;
        for &(a, b) in edges {
            let m = label[a as usize].min(label[b as usize]);
            for x in [a, b] {
                if label[x as usize] != m {
                    label[x as usize] = m;
                    changed = true;
                }
            }
        }
        if !changed {
            return label;
        }
    }
}

fn edges() -> impl Strategy<Value = (usize, Vec<(u32, u32)>)> {
    (1usize..40).prop_flat_map(|len| {
        let slot = 0..len as u32;
        (Just(len), prop::collection::vec((slot.clone(), slot), 0..60))
    })
}

proptest! {
    #[test]
    fn closed_forest_matches_components((len, edges) in edges()) {
        let mut uf = UnionFind::new(len);
        for &(a, b) in &edges {
            uf.union(a, b);
        }
        uf.close();
        prop_assert_eq!(uf.prefix(len), components(len, &edges));
    }

    #[test]
    fn find_agrees_with_closure((len, edges) in edges()) {
        let mut uf = UnionFind::new(len);
        for &(a, b) in &edges {
            uf.union(a, b);
        }
        let roots: Vec<u32> = (0..len as u32).map(|x| uf.find(x)).collect();
        uf.close();
        for x in 0..len as u32 {
            prop_assert_eq!(uf.representative(x), roots[x as usize]);
            prop_assert!(uf.representative(x) <= x);
        }
    }
}
