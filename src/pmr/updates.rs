use crate::pmr::bundles::{BundleIndex, CycleSet};
use crate::pmr::error::RunError;
use crate::pmr::hamiltonian::TermStore;
use crate::pmr::state::OperatorString;
use crate::pmr::weight::WeightCache;
use rand::seq::SliceRandom;
use rand::Rng;

/// The update moves. Selection weights are fixed; a move drawn in a state
/// where it has no valid proposal counts as a rejected proposal, which keeps
/// the chain's transition kernel well defined for any Hamiltonian (a purely
/// diagonal one only ever accepts reference-state flips).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum MoveKind {
    /// Flip one site of the reference state.
    SpinFlip,
    /// Insert an adjacent same-bundle operator pair.
    InsertPair,
    /// Remove an adjacent same-bundle operator pair.
    RemovePair,
    /// Swap two adjacent operators sharing a flip mask.
    Swap,
    /// Insert a fundamental cycle in a random order.
    CycleInsert,
    /// Remove a contiguous run matching a fundamental cycle.
    CycleRemove,
}

impl MoveKind {
    /// Every move, in selection order.
    pub const ALL: [MoveKind; 6] = [
        MoveKind::SpinFlip,
        MoveKind::InsertPair,
        MoveKind::RemovePair,
        MoveKind::Swap,
        MoveKind::CycleInsert,
        MoveKind::CycleRemove,
    ];
}

/// Proposal and acceptance counters per move kind.
#[derive(Clone, Copy, Debug, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct MoveStats {
    proposed: [u64; 6],
    accepted: [u64; 6],
}

impl MoveStats {
    /// Record one proposal outcome.
    pub fn record(&mut self, kind: MoveKind, accepted: bool) {
        self.proposed[kind as usize] += 1;
        if accepted {
            self.accepted[kind as usize] += 1;
        }
    }

    /// Proposals of the given kind.
    pub fn proposed(&self, kind: MoveKind) -> u64 {
        self.proposed[kind as usize]
    }

    /// Accepted proposals of the given kind.
    pub fn accepted(&self, kind: MoveKind) -> u64 {
        self.accepted[kind as usize]
    }

    /// Acceptance fraction, zero when nothing was proposed.
    pub fn acceptance_rate(&self, kind: MoveKind) -> f64 {
        let p = self.proposed[kind as usize];
        if p == 0 {
            0.0
        } else {
            self.accepted[kind as usize] as f64 / p as f64
        }
    }

    /// Merge counters from another chain.
    pub fn merge(&mut self, other: &MoveStats) {
        for i in 0..6 {
            self.proposed[i] += other.proposed[i];
            self.accepted[i] += other.accepted[i];
        }
    }
}

/// Executes single Metropolis steps against a configuration and its weight
/// cache. The chain samples `|W|`; phases are reweighted at measurement.
#[derive(Clone, Copy, Debug)]
pub struct UpdateEngine<'a> {
    store: &'a TermStore,
    bundles: &'a BundleIndex,
    cycles: &'a CycleSet,
    qmax: usize,
}

/// Decide a Metropolis proposal from its log acceptance ratio. A NaN ratio
/// means the weight bookkeeping has left the representable range.
fn metropolis<R: Rng>(ln_accept: f64, rng: &mut R) -> Result<bool, RunError> {
    if ln_accept.is_nan() {
        return Err(RunError::WeightOverflow {
            ln_magnitude: ln_accept,
        });
    }
    Ok(ln_accept >= 0.0 || rng.gen_bool(ln_accept.exp()))
}

fn ln_factorial(n: usize) -> f64 {
    (2..=n).map(|k| (k as f64).ln()).sum()
}

impl<'a> UpdateEngine<'a> {
    /// Bind an engine to a decomposed Hamiltonian. Strings never grow past
    /// `qmax` operators.
    pub fn new(
        store: &'a TermStore,
        bundles: &'a BundleIndex,
        cycles: &'a CycleSet,
        qmax: usize,
    ) -> Self {
        Self {
            store,
            bundles,
            cycles,
            qmax,
        }
    }

    /// Draw a move kind and execute it. Returns the kind and whether it was
    /// accepted.
    pub fn metropolis_step<R: Rng>(
        &self,
        string: &mut OperatorString,
        cache: &mut WeightCache,
        rng: &mut R,
    ) -> Result<(MoveKind, bool), RunError> {
        let r: f64 = rng.gen();
        let kind = if r < 0.30 {
            MoveKind::SpinFlip
        } else if r < 0.50 {
            MoveKind::InsertPair
        } else if r < 0.70 {
            MoveKind::RemovePair
        } else if r < 0.80 {
            MoveKind::Swap
        } else if r < 0.90 {
            MoveKind::CycleInsert
        } else {
            MoveKind::CycleRemove
        };
        let accepted = match kind {
            MoveKind::SpinFlip => self.spin_flip(string, cache, rng)?,
            MoveKind::InsertPair => self.insert_pair(string, cache, rng)?,
            MoveKind::RemovePair => self.remove_pair(string, cache, rng)?,
            MoveKind::Swap => self.swap(string, rng),
            MoveKind::CycleInsert => self.cycle_insert(string, cache, rng)?,
            MoveKind::CycleRemove => self.cycle_remove(string, cache, rng)?,
        };
        Ok((kind, accepted))
    }

    /// Positions `j` with `bundle(ops[j]) == bundle(ops[j+1])`, the shared
    /// candidate set of the pair-remove and swap moves.
    fn pair_candidates(&self, string: &OperatorString) -> Vec<usize> {
        let ops = string.ops();
        (0..ops.len().saturating_sub(1))
            .filter(|&j| self.bundles.bundle_of(ops[j]) == self.bundles.bundle_of(ops[j + 1]))
            .collect()
    }

    /// Contiguous duplicate-free runs whose sorted bundle set matches a
    /// known cycle: `(position, length, product of member bundle sizes)`.
    fn cycle_run_candidates(&self, string: &OperatorString) -> Vec<(usize, usize, f64)> {
        let ops = string.ops();
        let q = ops.len();
        let max_w = self.cycles.max_length().min(q);
        let mut runs = Vec::new();
        let mut window: Vec<usize> = Vec::with_capacity(max_w);
        for j in 0..q {
            window.clear();
            for w in 1..=max_w.min(q - j) {
                let b = self.bundles.bundle_of(ops[j + w - 1]);
                if window.contains(&b) {
                    // Longer windows from here repeat a bundle too.
                    break;
                }
                window.push(b);
                if w < 3 {
                    continue;
                }
                let mut sorted = window.clone();
                sorted.sort_unstable();
                if self.cycles.find(&sorted).is_some() {
                    let prod: f64 = sorted
                        .iter()
                        .map(|&b| self.bundles.bundle_size(b) as f64)
                        .product();
                    runs.push((j, w, prod));
                }
            }
        }
        runs
    }

    /// Replay the divided-difference stack from path position `from`.
    fn replay_from(&self, cache: &mut WeightCache, string: &OperatorString, from: usize) {
        cache.dd.truncate(from);
        let beta = cache.beta;
        for &e in &string.energies()[from..] {
            cache.dd.push(-beta * e);
        }
    }

    fn spin_flip<R: Rng>(
        &self,
        string: &mut OperatorString,
        cache: &mut WeightCache,
        rng: &mut R,
    ) -> Result<bool, RunError> {
        let site = rng.gen_range(0..string.start().len());
        let ln_before = cache.dd.ln_value();
        string.flip_site(self.store, site);
        self.replay_from(cache, string, 0);
        let ln_after = cache.dd.ln_value();
        if metropolis(ln_after - ln_before, rng)? {
            Ok(true)
        } else {
            string.flip_site(self.store, site);
            self.replay_from(cache, string, 0);
            Ok(false)
        }
    }

    fn insert_pair<R: Rng>(
        &self,
        string: &mut OperatorString,
        cache: &mut WeightCache,
        rng: &mut R,
    ) -> Result<bool, RunError> {
        let q = string.len();
        let m = self.store.num_ops();
        if m == 0 || q + 2 > self.qmax {
            return Ok(false);
        }
        let p = rng.gen_range(0..=q);
        let a = rng.gen_range(0..m);
        let bundle = self.bundles.bundle_of(a);
        let members = self.bundles.members(bundle);
        let mb = members.len();
        let b = members[rng.gen_range(0..mb)];
        let ln_coeffs = self.store.ln_coeff_abs(a) + self.store.ln_coeff_abs(b);

        let ln_before = cache.ln_weight();
        string.insert_ops(self.store, p, &[a, b]);
        self.replay_from(cache, string, p + 1);
        cache.ln_mat += ln_coeffs;
        let ln_after = cache.ln_weight();

        let removable = self.pair_candidates(string).len();
        let ln_accept = ln_after - ln_before
            + (((q + 1) * m * mb) as f64).ln()
            - (removable as f64).ln();
        if metropolis(ln_accept, rng)? {
            Ok(true)
        } else {
            string.remove_ops(p, 2);
            self.replay_from(cache, string, p + 1);
            cache.ln_mat -= ln_coeffs;
            Ok(false)
        }
    }

    fn remove_pair<R: Rng>(
        &self,
        string: &mut OperatorString,
        cache: &mut WeightCache,
        rng: &mut R,
    ) -> Result<bool, RunError> {
        let candidates = self.pair_candidates(string);
        if candidates.is_empty() {
            return Ok(false);
        }
        let j = candidates[rng.gen_range(0..candidates.len())];
        let removable = candidates.len();
        let q = string.len();
        let m = self.store.num_ops();
        let (a, b) = (string.ops()[j], string.ops()[j + 1]);
        let mb = self.bundles.bundle_size(self.bundles.bundle_of(a));
        let ln_coeffs = self.store.ln_coeff_abs(a) + self.store.ln_coeff_abs(b);

        let ln_before = cache.ln_weight();
        string.remove_ops(j, 2);
        self.replay_from(cache, string, j + 1);
        cache.ln_mat -= ln_coeffs;
        let ln_after = cache.ln_weight();

        let ln_accept = ln_after - ln_before + (removable as f64).ln()
            - (((q - 1) * m * mb) as f64).ln();
        if metropolis(ln_accept, rng)? {
            Ok(true)
        } else {
            string.insert_ops(self.store, j, &[a, b]);
            self.replay_from(cache, string, j + 1);
            cache.ln_mat += ln_coeffs;
            Ok(false)
        }
    }

    /// Exchange two adjacent operators from the same bundle. The visited
    /// states, energies, and coefficient magnitudes are all unchanged, and
    /// the candidate set is symmetric, so the move always accepts.
    fn swap<R: Rng>(&self, string: &mut OperatorString, rng: &mut R) -> bool {
        let candidates = self.pair_candidates(string);
        if candidates.is_empty() {
            return false;
        }
        let j = candidates[rng.gen_range(0..candidates.len())];
        string.swap_adjacent(self.store, j);
        true
    }

    fn cycle_insert<R: Rng>(
        &self,
        string: &mut OperatorString,
        cache: &mut WeightCache,
        rng: &mut R,
    ) -> Result<bool, RunError> {
        if self.cycles.is_empty() {
            return Ok(false);
        }
        let q = string.len();
        let c = rng.gen_range(0..self.cycles.num_cycles());
        let cycle = self.cycles.cycle(c);
        let k = cycle.len();
        if q + k > self.qmax {
            return Ok(false);
        }
        let p = rng.gen_range(0..=q);
        let mut order: Vec<usize> = cycle.to_vec();
        order.shuffle(rng);
        let mut inserted = Vec::with_capacity(k);
        let mut prod_mb = 1.0f64;
        let mut ln_coeffs = 0.0;
        for &b in order.iter() {
            let members = self.bundles.members(b);
            let op = members[rng.gen_range(0..members.len())];
            prod_mb *= members.len() as f64;
            ln_coeffs += self.store.ln_coeff_abs(op);
            inserted.push(op);
        }

        let ln_before = cache.ln_weight();
        string.insert_ops(self.store, p, &inserted);
        self.replay_from(cache, string, p + 1);
        cache.ln_mat += ln_coeffs;
        let ln_after = cache.ln_weight();

        let runs = self.cycle_run_candidates(string).len();
        let ln_accept = ln_after - ln_before
            + (self.cycles.num_cycles() as f64).ln()
            + ((q + 1) as f64).ln()
            + ln_factorial(k)
            + prod_mb.ln()
            - (runs as f64).ln();
        if metropolis(ln_accept, rng)? {
            Ok(true)
        } else {
            string.remove_ops(p, k);
            self.replay_from(cache, string, p + 1);
            cache.ln_mat -= ln_coeffs;
            Ok(false)
        }
    }

    fn cycle_remove<R: Rng>(
        &self,
        string: &mut OperatorString,
        cache: &mut WeightCache,
        rng: &mut R,
    ) -> Result<bool, RunError> {
        let runs = self.cycle_run_candidates(string);
        if runs.is_empty() {
            return Ok(false);
        }
        let (j, k, prod_mb) = runs[rng.gen_range(0..runs.len())];
        let q = string.len();
        let removed: Vec<usize> = string.ops()[j..j + k].to_vec();
        let ln_coeffs: f64 = removed.iter().map(|&op| self.store.ln_coeff_abs(op)).sum();

        let ln_before = cache.ln_weight();
        string.remove_ops(j, k);
        self.replay_from(cache, string, j + 1);
        cache.ln_mat -= ln_coeffs;
        let ln_after = cache.ln_weight();

        let ln_accept = ln_after - ln_before + (runs.len() as f64).ln()
            - (self.cycles.num_cycles() as f64).ln()
            - ((q - k + 1) as f64).ln()
            - ln_factorial(k)
            - prod_mb.ln();
        if metropolis(ln_accept, rng)? {
            Ok(true)
        } else {
            string.insert_ops(self.store, j, &removed);
            self.replay_from(cache, string, j + 1);
            cache.ln_mat += ln_coeffs;
            Ok(false)
        }
    }
}
