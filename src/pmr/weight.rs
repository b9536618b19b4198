use crate::pmr::divdiff::DivDiff;
use crate::pmr::error::ClosureViolation;
use crate::pmr::hamiltonian::TermStore;
use crate::pmr::state::OperatorString;
use num_complex::Complex64;

/// The weight of a configuration, split into a log-magnitude and a
/// quarter-turn sign. The magnitude drives the Metropolis chain; the sign is
/// folded back in at measurement time by reweighting.
#[derive(Clone, Copy, Debug)]
pub struct Weight {
    /// `ln |W|`.
    pub ln_magnitude: f64,
    /// `W / |W|`, one of `1`, `-1`, `i`, `-i` for real-coefficient terms.
    pub sign: Complex64,
}

/// Evaluate a configuration's weight from scratch.
///
/// The weight of a closed string `o_1 .. o_q` is the product of the
/// operators' matrix elements along the path times the divided difference of
/// `e^(-beta x)` over the path energies. The divided difference of the plain
/// exponential over `-beta E_j` is strictly positive, and rescaling it to
/// `e^(-beta x)` contributes `(-beta)^q`, so the sign is the matrix-element
/// phase times `(-1)^q`.
pub fn evaluate(
    store: &TermStore,
    string: &OperatorString,
    beta: f64,
) -> Result<Weight, ClosureViolation> {
    string.check_closure(store)?;
    let q = string.len();
    let mut state = string.start().to_vec();
    let mut phase = Complex64::new(1.0, 0.0);
    let mut ln_mat = 0.0;
    for &idx in string.ops() {
        let op = store.op(idx);
        op.mask.apply(&mut state);
        phase *= op.phase(&state);
        ln_mat += store.ln_coeff_abs(idx);
    }
    let mut dd = DivDiff::new();
    for &e in string.energies() {
        dd.push(-beta * e);
    }
    let ln_magnitude = ln_mat + q as f64 * beta.ln() + dd.ln_value();
    let sign = if q % 2 == 0 { phase } else { -phase };
    Ok(Weight { ln_magnitude, sign })
}

/// The incrementally maintained log-magnitude of the current configuration.
///
/// The divided-difference stack mirrors the string's energy path entry for
/// entry. Moves edit a contiguous span of the path, so they truncate the
/// stack to the first changed entry and replay from there; rejected
/// proposals roll back the same way.
#[derive(Clone, Debug)]
pub struct WeightCache {
    pub(crate) dd: DivDiff,
    /// Sum of `ln |c|` over the operators in the string.
    pub(crate) ln_mat: f64,
    pub(crate) beta: f64,
    pub(crate) ln_beta: f64,
}

impl WeightCache {
    /// Build the cache for the given configuration.
    pub fn new(store: &TermStore, string: &OperatorString, beta: f64) -> Self {
        let mut cache = Self {
            dd: DivDiff::new(),
            ln_mat: 0.0,
            beta,
            ln_beta: beta.ln(),
        };
        cache.rebuild(store, string);
        cache
    }

    /// Recompute everything from the configuration.
    pub fn rebuild(&mut self, store: &TermStore, string: &OperatorString) {
        self.ln_mat = string.ops().iter().map(|&i| store.ln_coeff_abs(i)).sum();
        self.dd.truncate(0);
        for &e in string.energies() {
            self.dd.push(-self.beta * e);
        }
    }

    /// Inverse temperature the cache was built for.
    pub fn beta(&self) -> f64 {
        self.beta
    }

    /// `ln |W|` of the current configuration.
    pub fn ln_weight(&self) -> f64 {
        let q = self.dd.len() - 1;
        self.ln_mat + q as f64 * self.ln_beta + self.dd.ln_value()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pmr::hamiltonian::{PauliAxis, PauliTerm};

    #[test]
    fn empty_string_weight_is_gibbs_factor() {
        let terms = vec![PauliTerm::new(-0.5, [(0, PauliAxis::Z)])];
        let store = TermStore::from_terms(1, &terms).unwrap();
        let string = OperatorString::new(&store, vec![false]);
        let w = evaluate(&store, &string, 2.0).unwrap();
        // E(|0>) = -0.5, so W = e^(1.0).
        assert!((w.ln_magnitude - 1.0).abs() < 1e-12);
        assert!((w.sign - Complex64::new(1.0, 0.0)).norm() < 1e-15);
    }

    #[test]
    fn x_pair_weight() {
        // H = -X on one spin. Two copies of the flip with E = 0 everywhere:
        // |W| = beta^2 * exp[0,0,0] = beta^2 / 2, matrix phase (-1)(-1) = 1,
        // times (-1)^2.
        let terms = vec![PauliTerm::new(-1.0, [(0, PauliAxis::X)])];
        let store = TermStore::from_terms(1, &terms).unwrap();
        let mut string = OperatorString::new(&store, vec![false]);
        string.insert_ops(&store, 0, &[0, 0]);
        let beta = 1.5;
        let w = evaluate(&store, &string, beta).unwrap();
        let expect = 2.0 * beta.ln() - 2f64.ln();
        assert!((w.ln_magnitude - expect).abs() < 1e-12);
        assert!((w.sign - Complex64::new(1.0, 0.0)).norm() < 1e-15);
    }

    #[test]
    fn y_pair_phases_cancel() {
        let terms = vec![PauliTerm::new(1.0, [(0, PauliAxis::Y)])];
        let store = TermStore::from_terms(1, &terms).unwrap();
        let mut string = OperatorString::new(&store, vec![false]);
        string.insert_ops(&store, 0, &[0, 0]);
        let w = evaluate(&store, &string, 1.0).unwrap();
        assert!((w.sign - Complex64::new(1.0, 0.0)).norm() < 1e-15);
    }

    #[test]
    fn cache_tracks_scratch_evaluation() {
        let terms = vec![
            PauliTerm::new(0.7, [(0, PauliAxis::Z)]),
            PauliTerm::new(-1.0, [(0, PauliAxis::X)]),
            PauliTerm::new(-0.3, [(1, PauliAxis::X)]),
        ];
        let store = TermStore::from_terms(2, &terms).unwrap();
        let beta = 0.8;
        let mut string = OperatorString::new(&store, vec![true, false]);
        let mut cache = WeightCache::new(&store, &string, beta);
        assert!(
            (cache.ln_weight() - evaluate(&store, &string, beta).unwrap().ln_magnitude).abs()
                < 1e-12
        );

        string.insert_ops(&store, 0, &[1, 1]);
        string.insert_ops(&store, 1, &[0, 0]);
        cache.rebuild(&store, &string);
        let scratch = evaluate(&store, &string, beta).unwrap();
        assert!((cache.ln_weight() - scratch.ln_magnitude).abs() < 1e-12);
    }
}
