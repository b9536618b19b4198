use crate::pmr::bundles::BundleIndex;
use crate::pmr::divdiff::DivDiff;
use crate::pmr::error::MalformedHamiltonian;
use crate::pmr::hamiltonian::{sz, PauliTerm, TermStore};
use crate::pmr::state::OperatorString;
use num_complex::Complex64;

/// Names of the always-measured observables, in sample order. The specific
/// heat is derived from the energy bins at finalization and appended after
/// any user observables.
pub(crate) const STANDARD_NAMES: [&str; 7] = [
    "H",
    "H^2",
    "Hdiag",
    "Hdiag^2",
    "Hoffdiag",
    "Hoffdiag^2",
    "Mz",
];

/// A user-supplied observable, decomposed the same way as the Hamiltonian.
/// Its diagonal part is evaluated on the reference state; its off-diagonal
/// terms contribute only through operators sharing the flip mask of the
/// string's last operator.
#[derive(Clone, Debug)]
pub struct CustomObservable {
    name: String,
    store: TermStore,
}

impl CustomObservable {
    /// Decompose `terms` over `nvars` sites under the given name.
    pub fn new(
        name: impl Into<String>,
        nvars: usize,
        terms: &[PauliTerm],
    ) -> Result<Self, MalformedHamiltonian> {
        Ok(Self {
            name: name.into(),
            store: TermStore::from_terms(nvars, terms)?,
        })
    }

    /// The reporting name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of sites the decomposition covers.
    pub fn nvars(&self) -> usize {
        self.store.nvars()
    }
}

/// One reported estimate: the grand mean over bins and the standard error
/// from the inter-bin variance.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct ObservableResult {
    /// Observable name.
    pub name: String,
    /// Mean over completed bins.
    pub mean: f64,
    /// Standard error from the scatter of bin means.
    pub std_error: f64,
    /// The sign-reweighted mean of each completed bin.
    pub bin_means: Vec<f64>,
}

impl ObservableResult {
    pub(crate) fn from_bins(name: &str, bin_means: Vec<f64>) -> Self {
        let b = bin_means.len();
        let mean = bin_means.iter().sum::<f64>() / b as f64;
        let std_error = if b < 2 {
            0.0
        } else {
            let ss: f64 = bin_means.iter().map(|m| (m - mean) * (m - mean)).sum();
            (ss / (b * (b - 1)) as f64).sqrt()
        };
        Self {
            name: name.to_string(),
            mean,
            std_error,
            bin_means,
        }
    }
}

/// Evaluate every observable on the current configuration. `samples` is
/// cleared and filled in [`STANDARD_NAMES`] order followed by the custom
/// observables; the configuration's sign is returned.
///
/// All estimators are built from ratios of exponential divided differences
/// over subsets of the energy path: dropping the path endpoint gives the
/// first-order ratio `R1` (the off-diagonal energy), dropping both endpoint
/// copies gives the second-order `R2`, and dropping the two top entries
/// gives the mixed ratio for the squared off-diagonal part.
pub(crate) fn measure(
    store: &TermStore,
    bundles: &BundleIndex,
    customs: &[CustomObservable],
    string: &OperatorString,
    beta: f64,
    samples: &mut Vec<Complex64>,
) -> Complex64 {
    samples.clear();
    let q = string.len();
    let energies = string.energies();
    let e0 = energies[0];
    let z0 = string.start();

    // The configuration sign: matrix-element phases along the path times
    // (-1)^q. Every factor is a quarter-turn unit, so this is exact.
    let mut state = z0.to_vec();
    let mut phase = Complex64::new(1.0, 0.0);
    for &idx in string.ops() {
        let op = store.op(idx);
        op.mask.apply(&mut state);
        phase *= op.phase(&state);
    }
    let sign = if q % 2 == 0 { phase } else { -phase };

    let (r1, r2, hoffdiag_sq) = if q == 0 {
        (0.0, 0.0, Complex64::new(0.0, 0.0))
    } else {
        let mut dd = DivDiff::new();
        for &e in &energies[1..q] {
            dd.push(-beta * e);
        }
        let ln_a = if q >= 2 { dd.ln_value() } else { 0.0 };
        dd.push(-beta * energies[q]);
        let ln_b = dd.ln_value();
        dd.push(-beta * energies[0]);
        let ln_c = dd.ln_value();
        let r1 = -((ln_b - ln_c).exp()) / beta;
        if q < 2 {
            (r1, 0.0, Complex64::new(0.0, 0.0))
        } else {
            let r2 = (ln_a - ln_c).exp() / (beta * beta);
            let mut dd = DivDiff::new();
            for &e in &energies[..q - 1] {
                dd.push(-beta * e);
            }
            let rmix = (dd.ln_value() - ln_c).exp() / (beta * beta);
            let o_last = string.ops()[q - 1];
            let o_prev = string.ops()[q - 2];
            let z_prev = string.state_at(store, q - 1);
            let f_last = bundles.diag_sum(store, bundles.bundle_of(o_last), z0)
                / store.op(o_last).matrix_element(z0);
            let f_prev = bundles.diag_sum(store, bundles.bundle_of(o_prev), &z_prev)
                / store.op(o_prev).matrix_element(&z_prev);
            (r1, r2, f_last * f_prev * rmix)
        }
    };

    let mz = z0.iter().map(|&b| sz(b)).sum::<f64>() / z0.len() as f64;

    samples.push(Complex64::new(e0 + r1, 0.0));
    samples.push(Complex64::new(e0 * e0 + 2.0 * e0 * r1 + r2, 0.0));
    samples.push(Complex64::new(e0, 0.0));
    samples.push(Complex64::new(e0 * e0, 0.0));
    samples.push(Complex64::new(r1, 0.0));
    samples.push(hoffdiag_sq);
    samples.push(Complex64::new(mz, 0.0));

    for custom in customs {
        let mut val = Complex64::new(custom.store.diagonal_energy(z0), 0.0);
        if q > 0 {
            let o_last = store.op(string.ops()[q - 1]);
            let denom = o_last.matrix_element(z0);
            for t in custom.store.ops() {
                if t.mask == o_last.mask {
                    val += t.matrix_element(z0) / denom * r1;
                }
            }
        }
        samples.push(val);
    }
    sign
}

/// Bins sign-weighted samples and turns them into means with error bars.
///
/// Each measurement contributes `O * s` to every observable's current bin
/// and `s` to the bin's sign sum; a bin's estimate is the ratio of the two
/// real parts. Error bars come from the scatter of bin means, so they absorb
/// autocorrelation at scales shorter than a bin. A trailing partial bin is
/// discarded.
#[derive(Clone, Debug)]
pub(crate) struct Accumulator {
    names: Vec<String>,
    per_bin: usize,
    cur_num: Vec<Complex64>,
    cur_sign: Complex64,
    cur_count: usize,
    bin_num: Vec<Vec<Complex64>>,
    bin_sign: Vec<Complex64>,
    sign_total: Complex64,
    total_count: usize,
    length_hist: Vec<u64>,
}

impl Accumulator {
    pub(crate) fn new(customs: &[CustomObservable], measurements: usize, bins: usize) -> Self {
        let mut names: Vec<String> = STANDARD_NAMES.iter().map(|s| s.to_string()).collect();
        names.extend(customs.iter().map(|c| c.name.clone()));
        let n = names.len();
        Self {
            names,
            per_bin: (measurements / bins).max(1),
            cur_num: vec![Complex64::new(0.0, 0.0); n],
            cur_sign: Complex64::new(0.0, 0.0),
            cur_count: 0,
            bin_num: vec![Vec::new(); n],
            bin_sign: Vec::new(),
            sign_total: Complex64::new(0.0, 0.0),
            total_count: 0,
            length_hist: Vec::new(),
        }
    }

    pub(crate) fn record(&mut self, samples: &[Complex64], sign: Complex64, q: usize) {
        debug_assert_eq!(samples.len(), self.cur_num.len());
        for (acc, &s) in self.cur_num.iter_mut().zip(samples.iter()) {
            *acc += s * sign;
        }
        self.cur_sign += sign;
        self.cur_count += 1;
        self.sign_total += sign;
        self.total_count += 1;
        if self.length_hist.len() <= q {
            self.length_hist.resize(q + 1, 0);
        }
        self.length_hist[q] += 1;
        if self.cur_count == self.per_bin {
            for (bins, acc) in self.bin_num.iter_mut().zip(self.cur_num.iter_mut()) {
                bins.push(*acc);
                *acc = Complex64::new(0.0, 0.0);
            }
            self.bin_sign.push(self.cur_sign);
            self.cur_sign = Complex64::new(0.0, 0.0);
            self.cur_count = 0;
        }
    }

    /// Average sign over every recorded measurement.
    pub(crate) fn average_sign(&self) -> Complex64 {
        if self.total_count == 0 {
            Complex64::new(0.0, 0.0)
        } else {
            self.sign_total / self.total_count as f64
        }
    }

    pub(crate) fn length_histogram(&self) -> &[u64] {
        &self.length_hist
    }

    /// Produce the per-observable results, appending the specific heat
    /// derived from the energy bins.
    pub(crate) fn finalize(&self, beta: f64) -> Vec<ObservableResult> {
        let nbins = self.bin_sign.len();
        let mut results = Vec::with_capacity(self.names.len() + 1);
        let bin_means = |obs: usize| -> Vec<f64> {
            (0..nbins)
                .map(|b| self.bin_num[obs][b].re / self.bin_sign[b].re)
                .collect()
        };
        for (obs, name) in self.names.iter().enumerate() {
            results.push(ObservableResult::from_bins(name, bin_means(obs)));
        }
        let h = bin_means(0);
        let h2 = bin_means(1);
        let c: Vec<f64> = h
            .iter()
            .zip(h2.iter())
            .map(|(&h, &h2)| beta * beta * (h2 - h * h))
            .collect();
        results.push(ObservableResult::from_bins("C", c));
        results
    }
}
