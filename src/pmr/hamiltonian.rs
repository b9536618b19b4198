use crate::pmr::error::MalformedHamiltonian;
use crate::pmr::mask::FlipMask;
use num_complex::Complex64;
use smallvec::SmallVec;

/// A single-site Pauli factor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum PauliAxis {
    /// Bit flip.
    X,
    /// Bit flip with a state-dependent imaginary phase.
    Y,
    /// Diagonal sign.
    Z,
}

/// One term of a Hamiltonian or observable: a real coefficient times a
/// product of single-site Pauli factors.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct PauliTerm {
    /// The real prefactor.
    pub coefficient: f64,
    /// The Pauli factors, at most one per site.
    pub factors: SmallVec<[(usize, PauliAxis); 4]>,
}

impl PauliTerm {
    /// Make a term from a coefficient and `(site, axis)` factors.
    pub fn new<I>(coefficient: f64, factors: I) -> Self
    where
        I: IntoIterator<Item = (usize, PauliAxis)>,
    {
        Self {
            coefficient,
            factors: factors.into_iter().collect(),
        }
    }
}

/// A purely diagonal term: a coefficient times a product of Z factors.
#[derive(Clone, Debug)]
pub(crate) struct DiagonalTerm {
    pub(crate) coefficient: f64,
    pub(crate) z_sites: SmallVec<[usize; 4]>,
}

/// An off-diagonal term in PMR form: a permutation operator (the flip mask)
/// together with the diagonal operator multiplying it. Acting on a basis
/// state `z`, the term contributes `d(P z)` where `d` is evaluated on the
/// flipped (output) state.
#[derive(Clone, Debug)]
pub struct PermOp {
    /// Sites flipped by the permutation part.
    pub mask: FlipMask,
    /// The real prefactor.
    pub coefficient: f64,
    /// Sites carrying a Y factor (flip plus phase).
    pub y_sites: SmallVec<[usize; 4]>,
    /// Sites carrying a Z factor (diagonal sign only).
    pub z_sites: SmallVec<[usize; 4]>,
    /// Index of the source term in the input list.
    pub term: usize,
}

/// `+1` for bit `false` (spin up), `-1` for bit `true`.
#[inline]
pub(crate) fn sz(bit: bool) -> f64 {
    if bit {
        -1.0
    } else {
        1.0
    }
}

impl PermOp {
    /// The matrix element `<P z | term | z>`, a quarter-turn multiple of the
    /// coefficient: each Z factor contributes `sz`, each Y factor `-i sz`,
    /// both evaluated on the output state.
    pub fn matrix_element(&self, out_state: &[bool]) -> Complex64 {
        let mut val = Complex64::new(self.coefficient, 0.0);
        for &site in self.z_sites.iter() {
            val *= sz(out_state[site]);
        }
        for &site in self.y_sites.iter() {
            val *= Complex64::new(0.0, -sz(out_state[site]));
        }
        val
    }

    /// The matrix element's phase `d / |d|`, exact: every factor is a
    /// quarter-turn unit.
    pub fn phase(&self, out_state: &[bool]) -> Complex64 {
        let mut val = Complex64::new(self.coefficient.signum(), 0.0);
        for &site in self.z_sites.iter() {
            val *= sz(out_state[site]);
        }
        for &site in self.y_sites.iter() {
            val *= Complex64::new(0.0, -sz(out_state[site]));
        }
        val
    }
}

/// The PMR decomposition of a term list: the diagonal part `D_0` plus the
/// permutation operators, over a fixed number of sites.
#[derive(Clone, Debug)]
pub struct TermStore {
    nvars: usize,
    diagonal: Vec<DiagonalTerm>,
    ops: Vec<PermOp>,
}

impl TermStore {
    /// Decompose `terms` over `nvars` sites. Terms whose coefficient is
    /// exactly zero are dropped.
    pub fn from_terms(nvars: usize, terms: &[PauliTerm]) -> Result<Self, MalformedHamiltonian> {
        if nvars == 0 {
            return Err(MalformedHamiltonian::EmptySystem);
        }
        let mut diagonal = Vec::new();
        let mut ops = Vec::new();
        for (t, term) in terms.iter().enumerate() {
            if !term.coefficient.is_finite() {
                return Err(MalformedHamiltonian::NonFiniteCoefficient { term: t });
            }
            let mut seen = FlipMask::empty(nvars);
            let mut flip_sites: SmallVec<[usize; 4]> = SmallVec::new();
            let mut y_sites: SmallVec<[usize; 4]> = SmallVec::new();
            let mut z_sites: SmallVec<[usize; 4]> = SmallVec::new();
            for &(site, axis) in term.factors.iter() {
                if site >= nvars {
                    return Err(MalformedHamiltonian::SiteOutOfRange {
                        term: t,
                        site,
                        nvars,
                    });
                }
                if seen.get(site) {
                    return Err(MalformedHamiltonian::DuplicateSite { term: t, site });
                }
                seen.set(site);
                match axis {
                    PauliAxis::X => flip_sites.push(site),
                    PauliAxis::Y => {
                        flip_sites.push(site);
                        y_sites.push(site);
                    }
                    PauliAxis::Z => z_sites.push(site),
                }
            }
            if term.coefficient == 0.0 {
                log::warn!("dropping term {} with zero coefficient", t);
                continue;
            }
            if flip_sites.is_empty() {
                diagonal.push(DiagonalTerm {
                    coefficient: term.coefficient,
                    z_sites,
                });
            } else {
                ops.push(PermOp {
                    mask: FlipMask::from_sites(nvars, flip_sites),
                    coefficient: term.coefficient,
                    y_sites,
                    z_sites,
                    term: t,
                });
            }
        }
        Ok(Self {
            nvars,
            diagonal,
            ops,
        })
    }

    /// Number of sites.
    pub fn nvars(&self) -> usize {
        self.nvars
    }

    /// Number of permutation operators.
    pub fn num_ops(&self) -> usize {
        self.ops.len()
    }

    /// The permutation operator at `idx`.
    pub fn op(&self, idx: usize) -> &PermOp {
        &self.ops[idx]
    }

    /// All permutation operators.
    pub fn ops(&self) -> &[PermOp] {
        &self.ops
    }

    /// The diagonal energy `<z | D_0 | z>`.
    pub fn diagonal_energy(&self, state: &[bool]) -> f64 {
        self.diagonal
            .iter()
            .map(|term| {
                term.z_sites
                    .iter()
                    .fold(term.coefficient, |acc, &site| acc * sz(state[site]))
            })
            .sum()
    }

    /// `ln |c|` of operator `idx`'s coefficient. Matrix elements of a
    /// permutation operator are quarter-turn rotations of its coefficient,
    /// so this is the log-magnitude of any of them.
    pub fn ln_coeff_abs(&self, idx: usize) -> f64 {
        self.ops[idx].coefficient.abs().ln()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_diagonal_and_offdiagonal() {
        let terms = vec![
            PauliTerm::new(0.5, [(0, PauliAxis::Z), (1, PauliAxis::Z)]),
            PauliTerm::new(-1.0, [(0, PauliAxis::X)]),
            PauliTerm::new(0.25, [(1, PauliAxis::Y), (0, PauliAxis::Z)]),
        ];
        let store = TermStore::from_terms(2, &terms).unwrap();
        assert_eq!(store.num_ops(), 2);
        // ZZ on |00>: +0.5, on |01>: -0.5.
        assert!((store.diagonal_energy(&[false, false]) - 0.5).abs() < 1e-15);
        assert!((store.diagonal_energy(&[false, true]) + 0.5).abs() < 1e-15);
    }

    #[test]
    fn y_matrix_element_phase() {
        let terms = vec![PauliTerm::new(2.0, [(0, PauliAxis::Y)])];
        let store = TermStore::from_terms(1, &terms).unwrap();
        let op = store.op(0);
        // <1|Y|0> = i, so with c = 2: out state is |1>, -i * sz(1) = +i.
        let elem = op.matrix_element(&[true]);
        assert!((elem - Complex64::new(0.0, 2.0)).norm() < 1e-15);
        // <0|Y|1> = -i.
        let elem = op.matrix_element(&[false]);
        assert!((elem - Complex64::new(0.0, -2.0)).norm() < 1e-15);
    }

    #[test]
    fn rejects_bad_terms() {
        let dup = vec![PauliTerm::new(1.0, [(0, PauliAxis::X), (0, PauliAxis::Z)])];
        assert_eq!(
            TermStore::from_terms(1, &dup).err(),
            Some(MalformedHamiltonian::DuplicateSite { term: 0, site: 0 })
        );
        let oob = vec![PauliTerm::new(1.0, [(3, PauliAxis::X)])];
        assert_eq!(
            TermStore::from_terms(2, &oob).err(),
            Some(MalformedHamiltonian::SiteOutOfRange {
                term: 0,
                site: 3,
                nvars: 2
            })
        );
        let nan = vec![PauliTerm::new(f64::NAN, [(0, PauliAxis::X)])];
        assert_eq!(
            TermStore::from_terms(1, &nan).err(),
            Some(MalformedHamiltonian::NonFiniteCoefficient { term: 0 })
        );
        assert_eq!(
            TermStore::from_terms(0, &[]).err(),
            Some(MalformedHamiltonian::EmptySystem)
        );
    }

    #[test]
    fn zero_coefficient_terms_dropped() {
        let terms = vec![
            PauliTerm::new(0.0, [(0, PauliAxis::X)]),
            PauliTerm::new(1.0, [(0, PauliAxis::X)]),
        ];
        let store = TermStore::from_terms(1, &terms).unwrap();
        assert_eq!(store.num_ops(), 1);
        assert_eq!(store.op(0).term, 1);
    }
}
