use crate::pmr::error::ClosureViolation;
use crate::pmr::hamiltonian::TermStore;
use crate::pmr::mask::FlipMask;

/// A PMR configuration: the reference basis state `z_0` together with the
/// string of permutation operators applied to it, plus the diagonal energy
/// at every state along the path.
///
/// For a string of length `q` there are `q + 1` stored energies: `E(z_0)`,
/// the energy after each prefix of the string, and (for a closed string) the
/// final entry equal to `E(z_0)` again. The energies are kept in lockstep
/// with the operator list so the weight's divided-difference stack can be
/// edited span-wise instead of rebuilt.
#[derive(Clone, Debug)]
pub struct OperatorString {
    start: Vec<bool>,
    ops: Vec<usize>,
    energies: Vec<f64>,
}

impl OperatorString {
    /// An empty string over the given reference state.
    pub fn new(store: &TermStore, start: Vec<bool>) -> Self {
        let e0 = store.diagonal_energy(&start);
        Self {
            start,
            ops: Vec::new(),
            energies: vec![e0],
        }
    }

    /// String length `q`.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// True when no operators are in the string.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// The reference state `z_0`.
    pub fn start(&self) -> &[bool] {
        &self.start
    }

    /// The operator indices, in application order.
    pub fn ops(&self) -> &[usize] {
        &self.ops
    }

    /// The diagonal energies along the path, `q + 1` entries.
    pub fn energies(&self) -> &[f64] {
        &self.energies
    }

    /// The basis state after the first `p` operators.
    pub fn state_at(&self, store: &TermStore, p: usize) -> Vec<bool> {
        let mut state = self.start.clone();
        for &idx in self.ops[..p].iter() {
            store.op(idx).mask.apply(&mut state);
        }
        state
    }

    /// Insert operators before position `p`. Their combined flip mask must
    /// be the identity, so every energy after the inserted span is
    /// unchanged. Returns the energies added at positions `p+1 ..= p+k`.
    pub fn insert_ops(&mut self, store: &TermStore, p: usize, inserted: &[usize]) -> Vec<f64> {
        let mut state = self.state_at(store, p);
        let mut added = Vec::with_capacity(inserted.len());
        for &idx in inserted {
            store.op(idx).mask.apply(&mut state);
            added.push(store.diagonal_energy(&state));
        }
        debug_assert!(added
            .last()
            .map_or(true, |&last| (last - self.energies[p]).abs()
                < 1e-9 * (1.0 + last.abs())));
        let tail: Vec<usize> = self.ops.split_off(p);
        self.ops.extend_from_slice(inserted);
        self.ops.extend(tail);
        let etail: Vec<f64> = self.energies.split_off(p + 1);
        self.energies.extend_from_slice(&added);
        self.energies.extend(etail);
        added
    }

    /// Remove the `k` operators at positions `p .. p+k`. Their combined
    /// flip mask must be the identity.
    pub fn remove_ops(&mut self, p: usize, k: usize) {
        self.ops.drain(p..p + k);
        self.energies.drain(p + 1..p + 1 + k);
    }

    /// Swap the adjacent operators at `p` and `p+1`. Only valid for
    /// operators with equal flip masks, which leaves every path state (and
    /// so every energy) unchanged.
    pub fn swap_adjacent(&mut self, store: &TermStore, p: usize) {
        debug_assert_eq!(store.op(self.ops[p]).mask, store.op(self.ops[p + 1]).mask);
        self.ops.swap(p, p + 1);
    }

    /// Flip one site of the reference state. Every state along the path
    /// flips with it, so all energies are recomputed.
    pub fn flip_site(&mut self, store: &TermStore, site: usize) {
        self.start[site] = !self.start[site];
        let mut state = self.start.clone();
        self.energies[0] = store.diagonal_energy(&state);
        for (j, &idx) in self.ops.iter().enumerate() {
            store.op(idx).mask.apply(&mut state);
            self.energies[j + 1] = store.diagonal_energy(&state);
        }
    }

    /// The combined flip mask of the whole string.
    pub fn net_mask(&self, store: &TermStore) -> FlipMask {
        let mut net = FlipMask::empty(self.start.len());
        for &idx in self.ops.iter() {
            net.xor_assign(&store.op(idx).mask);
        }
        net
    }

    /// Check that the string maps the reference state back to itself.
    pub fn check_closure(&self, store: &TermStore) -> Result<(), ClosureViolation> {
        match self.net_mask(store).first_site() {
            None => Ok(()),
            Some(site) => Err(ClosureViolation { site }),
        }
    }
}
