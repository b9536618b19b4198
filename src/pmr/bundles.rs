use crate::pmr::hamiltonian::TermStore;
use crate::pmr::mask::FlipMask;
use crate::util::unionfind::UnionFind;
use itertools::Itertools;
use num_complex::Complex64;
use std::collections::HashMap;

/// Permutation operators grouped into bundles: operators sharing the exact
/// same flip mask act identically on basis states up to their diagonal
/// prefactors, so swapping one for another inside an operator string never
/// changes which states the string visits.
#[derive(Clone, Debug)]
pub struct BundleIndex {
    bundle_of: Vec<usize>,
    members: Vec<Vec<usize>>,
    masks: Vec<FlipMask>,
}

impl BundleIndex {
    /// Group the store's permutation operators by flip mask.
    pub fn new(store: &TermStore) -> Self {
        let nops = store.num_ops();
        let mut uf = UnionFind::new(nops);
        let mut first_with_mask: HashMap<&FlipMask, usize> = HashMap::new();
        for idx in 0..nops {
            match first_with_mask.entry(&store.op(idx).mask) {
                std::collections::hash_map::Entry::Occupied(e) => {
                    uf.union(*e.get(), idx);
                }
                std::collections::hash_map::Entry::Vacant(e) => {
                    e.insert(idx);
                }
            }
        }
        let (bundle_of, nbundles) = uf.dense_groups();
        let mut members = vec![Vec::new(); nbundles];
        for (idx, &b) in bundle_of.iter().enumerate() {
            members[b].push(idx);
        }
        let masks = members
            .iter()
            .map(|m| store.op(m[0]).mask.clone())
            .collect();
        Self {
            bundle_of,
            members,
            masks,
        }
    }

    /// Number of bundles.
    pub fn num_bundles(&self) -> usize {
        self.members.len()
    }

    /// The bundle containing operator `op`.
    pub fn bundle_of(&self, op: usize) -> usize {
        self.bundle_of[op]
    }

    /// Operators in bundle `b`.
    pub fn members(&self, b: usize) -> &[usize] {
        &self.members[b]
    }

    /// Number of operators in bundle `b`.
    pub fn bundle_size(&self, b: usize) -> usize {
        self.members[b].len()
    }

    /// The shared flip mask of bundle `b`.
    pub fn mask(&self, b: usize) -> &FlipMask {
        &self.masks[b]
    }

    /// The summed matrix element of every operator in bundle `b`, evaluated
    /// on the shared output state.
    pub fn diag_sum(&self, store: &TermStore, b: usize, out_state: &[bool]) -> Complex64 {
        self.members[b]
            .iter()
            .map(|&idx| store.op(idx).matrix_element(out_state))
            .sum()
    }
}

/// Sets of distinct bundles whose flip masks compose to the identity. A
/// closed operator string stays closed when such a set is inserted (in any
/// order) or when a contiguous run matching one is removed, which is how the
/// chain reaches string lengths unreachable by adjacent-pair moves alone.
#[derive(Clone, Debug)]
pub struct CycleSet {
    /// Each cycle as a sorted list of distinct bundle ids.
    cycles: Vec<Vec<usize>>,
    by_members: HashMap<Vec<usize>, usize>,
    max_length: usize,
}

impl CycleSet {
    /// Compute fundamental cycles as a GF(2) nullspace basis of the bundle
    /// masks. With `exhaustive` set, pairwise and triple combinations of
    /// basis elements are added as well, which matters for Hamiltonians
    /// whose short physical loops are sums of longer basis elements.
    /// Cycles longer than `max_length` are discarded.
    pub fn new(bundles: &BundleIndex, exhaustive: bool, max_length: usize) -> Self {
        let nbundles = bundles.num_bundles();
        // Echelon rows over site space, each tagged with the bundle
        // combination that produced it.
        let mut rows: Vec<(FlipMask, FlipMask)> = Vec::new();
        let mut pivot_row: HashMap<usize, usize> = HashMap::new();
        let mut basis: Vec<FlipMask> = Vec::new();
        for b in 0..nbundles {
            let mut cur = bundles.mask(b).clone();
            let mut combo = FlipMask::empty(nbundles);
            combo.set(b);
            while let Some(p) = cur.first_site() {
                match pivot_row.get(&p) {
                    Some(&r) => {
                        cur.xor_assign(&rows[r].0);
                        combo.xor_assign(&rows[r].1);
                    }
                    None => break,
                }
            }
            match cur.first_site() {
                None => basis.push(combo),
                Some(p) => {
                    pivot_row.insert(p, rows.len());
                    rows.push((cur, combo));
                }
            }
        }

        let mut combos: Vec<FlipMask> = basis.clone();
        if exhaustive {
            for k in 2..=3usize {
                for pick in basis.iter().combinations(k) {
                    let mut acc = pick[0].clone();
                    for extra in &pick[1..] {
                        acc.xor_assign(extra);
                    }
                    combos.push(acc);
                }
            }
        }

        let mut cycles = Vec::new();
        let mut by_members = HashMap::new();
        for combo in combos {
            let w = combo.weight();
            if w < 3 || w > max_length {
                continue;
            }
            let members: Vec<usize> = combo.iter_sites().collect();
            if !by_members.contains_key(&members) {
                by_members.insert(members.clone(), cycles.len());
                cycles.push(members);
            }
        }
        Self {
            cycles,
            by_members,
            max_length,
        }
    }

    /// Number of cycles available to the cycle moves.
    pub fn num_cycles(&self) -> usize {
        self.cycles.len()
    }

    /// True when no cycle moves are possible.
    pub fn is_empty(&self) -> bool {
        self.cycles.is_empty()
    }

    /// The sorted bundle ids of cycle `idx`.
    pub fn cycle(&self, idx: usize) -> &[usize] {
        &self.cycles[idx]
    }

    /// Longest cycle the moves may insert or remove.
    pub fn max_length(&self) -> usize {
        self.max_length
    }

    /// Look up a cycle by its sorted distinct bundle ids.
    pub fn find(&self, sorted_members: &[usize]) -> Option<usize> {
        self.by_members.get(sorted_members).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pmr::hamiltonian::{PauliAxis, PauliTerm};

    #[test]
    fn x_and_y_on_one_site_share_a_bundle() {
        let terms = vec![
            PauliTerm::new(1.0, [(0, PauliAxis::X)]),
            PauliTerm::new(0.5, [(0, PauliAxis::Y)]),
            PauliTerm::new(0.25, [(1, PauliAxis::X)]),
        ];
        let store = TermStore::from_terms(2, &terms).unwrap();
        let bundles = BundleIndex::new(&store);
        assert_eq!(bundles.num_bundles(), 2);
        assert_eq!(bundles.bundle_of(0), bundles.bundle_of(1));
        assert_ne!(bundles.bundle_of(0), bundles.bundle_of(2));
        assert_eq!(bundles.bundle_size(bundles.bundle_of(0)), 2);
    }

    #[test]
    fn triangle_of_two_site_flips_forms_one_cycle() {
        let terms = vec![
            PauliTerm::new(1.0, [(0, PauliAxis::X), (1, PauliAxis::X)]),
            PauliTerm::new(1.0, [(1, PauliAxis::X), (2, PauliAxis::X)]),
            PauliTerm::new(1.0, [(0, PauliAxis::X), (2, PauliAxis::X)]),
        ];
        let store = TermStore::from_terms(3, &terms).unwrap();
        let bundles = BundleIndex::new(&store);
        let cycles = CycleSet::new(&bundles, true, 6);
        assert_eq!(cycles.num_cycles(), 1);
        assert_eq!(cycles.cycle(0), &[0, 1, 2]);
        assert_eq!(cycles.find(&[0, 1, 2]), Some(0));
    }

    #[test]
    fn exhaustive_search_finds_combined_cycles() {
        // A square of bond flips plus one diagonal: the two triangles are
        // cycles, and their sum (the square) as well.
        let bond = |a: usize, b: usize| {
            PauliTerm::new(1.0, [(a, PauliAxis::X), (b, PauliAxis::X)])
        };
        let terms = vec![bond(0, 1), bond(1, 2), bond(2, 3), bond(3, 0), bond(0, 2)];
        let store = TermStore::from_terms(4, &terms).unwrap();
        let bundles = BundleIndex::new(&store);
        let cycles = CycleSet::new(&bundles, true, 6);
        assert_eq!(cycles.num_cycles(), 3);
        assert!(cycles.find(&[0, 1, 4]).is_some());
        assert!(cycles.find(&[2, 3, 4]).is_some());
        assert!(cycles.find(&[0, 1, 2, 3]).is_some());
    }

    #[test]
    fn length_cap_filters_cycles() {
        let bond = |a: usize, b: usize| {
            PauliTerm::new(1.0, [(a, PauliAxis::X), (b, PauliAxis::X)])
        };
        let terms = vec![bond(0, 1), bond(1, 2), bond(2, 3), bond(3, 0)];
        let store = TermStore::from_terms(4, &terms).unwrap();
        let bundles = BundleIndex::new(&store);
        assert_eq!(CycleSet::new(&bundles, true, 6).num_cycles(), 1);
        assert!(CycleSet::new(&bundles, true, 3).is_empty());
    }

    #[test]
    fn single_site_flips_have_no_cycles() {
        let terms = vec![
            PauliTerm::new(1.0, [(0, PauliAxis::X)]),
            PauliTerm::new(1.0, [(1, PauliAxis::X)]),
        ];
        let store = TermStore::from_terms(2, &terms).unwrap();
        let bundles = BundleIndex::new(&store);
        assert!(CycleSet::new(&bundles, true, 6).is_empty());
    }
}
