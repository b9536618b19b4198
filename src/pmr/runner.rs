use crate::pmr::bundles::{BundleIndex, CycleSet};
use crate::pmr::error::{
    BuildError, MalformedHamiltonian, ParameterError, RunError, SimulationError,
};
use crate::pmr::estimators::{measure, Accumulator, CustomObservable, ObservableResult};
use crate::pmr::hamiltonian::{PauliTerm, TermStore};
use crate::pmr::state::OperatorString;
use crate::pmr::updates::{MoveStats, UpdateEngine};
use crate::pmr::weight::WeightCache;
use num_complex::Complex64;
use rand::{Rng, SeedableRng};
#[cfg(feature = "parallel")]
use rayon::prelude::*;
use std::collections::HashMap;

/// Everything a run needs besides the Hamiltonian and the observables.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct RunParams {
    /// Inverse temperature.
    pub beta: f64,
    /// Sweeps discarded before any measurement.
    pub therm_sweeps: usize,
    /// Sweeps in the measurement phase.
    pub measure_sweeps: usize,
    /// Sweeps between consecutive measurements.
    pub sweeps_per_measurement: usize,
    /// Number of bins the measurements are grouped into for error bars.
    pub bins: usize,
    /// Hard cap on the operator-string length.
    pub qmax: usize,
    /// Base seed; replica `i` runs with `seed + i`.
    pub seed: u64,
    /// Also try short combinations of fundamental cycles, not just the
    /// GF(2) basis itself.
    pub exhaustive_cycle_search: bool,
    /// Longest cycle the cycle moves may insert or remove.
    pub max_cycle_length: usize,
    /// Below this average-sign magnitude the results are flagged as
    /// unreliable.
    pub sign_threshold: f64,
}

impl Default for RunParams {
    fn default() -> Self {
        Self {
            beta: 1.0,
            therm_sweeps: 1_000,
            measure_sweeps: 10_000,
            sweeps_per_measurement: 10,
            bins: 250,
            qmax: 1_000,
            seed: 0,
            exhaustive_cycle_search: true,
            max_cycle_length: 6,
            sign_threshold: 0.01,
        }
    }
}

impl RunParams {
    /// Number of measurements the run will record.
    pub fn measurements(&self) -> usize {
        self.measure_sweeps / self.sweeps_per_measurement.max(1)
    }

    /// Check the parameters before building anything with them.
    pub fn validate(&self) -> Result<(), ParameterError> {
        if !self.beta.is_finite() || self.beta <= 0.0 {
            return Err(ParameterError::BadBeta);
        }
        if self.measure_sweeps == 0 {
            return Err(ParameterError::ZeroSweeps);
        }
        if self.therm_sweeps == 0 {
            return Err(ParameterError::ZeroThermSweeps);
        }
        if self.sweeps_per_measurement == 0 {
            return Err(ParameterError::ZeroMeasurementStride);
        }
        if self.bins == 0 {
            return Err(ParameterError::ZeroBins);
        }
        if self.bins > self.measurements() {
            return Err(ParameterError::TooManyBins);
        }
        if self.qmax < 2 {
            return Err(ParameterError::BadQmax);
        }
        if !(0.0..=1.0).contains(&self.sign_threshold) {
            return Err(ParameterError::BadSignThreshold);
        }
        Ok(())
    }
}

/// The results of one run (or of several merged replicas).
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct RunSummary {
    /// Estimates per observable, standard ones first.
    pub observables: Vec<ObservableResult>,
    /// Mean configuration sign over all measurements.
    pub average_sign: Complex64,
    /// Whether the average sign cleared the configured threshold.
    pub sign_is_reliable: bool,
    /// How often each operator-string length was seen at measurement.
    pub length_histogram: Vec<u64>,
    /// Proposal and acceptance counts per move.
    pub moves: MoveStats,
}

impl RunSummary {
    /// Look up an observable by name.
    pub fn observable(&self, name: &str) -> Option<&ObservableResult> {
        self.observables.iter().find(|o| o.name == name)
    }
}

/// One Markov chain over PMR configurations.
#[derive(Clone, Debug)]
pub struct Simulation<R: Rng> {
    store: TermStore,
    bundles: BundleIndex,
    cycles: CycleSet,
    customs: Vec<CustomObservable>,
    params: RunParams,
    string: OperatorString,
    cache: WeightCache,
    stats: MoveStats,
    rng: R,
}

impl<R: Rng> Simulation<R> {
    /// Build a chain for `terms` over `nvars` sites, starting from a random
    /// reference state and an empty operator string.
    pub fn new(
        nvars: usize,
        terms: &[PauliTerm],
        customs: Vec<CustomObservable>,
        params: RunParams,
        mut rng: R,
    ) -> Result<Self, BuildError> {
        params.validate()?;
        let store = TermStore::from_terms(nvars, terms)?;
        for custom in customs.iter() {
            if custom.nvars() != nvars {
                return Err(MalformedHamiltonian::ObservableSizeMismatch {
                    observable: custom.nvars(),
                    system: nvars,
                }
                .into());
            }
        }
        let bundles = BundleIndex::new(&store);
        let cycles = CycleSet::new(
            &bundles,
            params.exhaustive_cycle_search,
            params.max_cycle_length,
        );
        let start: Vec<bool> = (0..nvars).map(|_| rng.gen_bool(0.5)).collect();
        let string = OperatorString::new(&store, start);
        let cache = WeightCache::new(&store, &string, params.beta);
        Ok(Self {
            store,
            bundles,
            cycles,
            customs,
            params,
            string,
            cache,
            stats: MoveStats::default(),
            rng,
        })
    }

    /// Thermalize, then sweep and measure. The chain keeps its state across
    /// calls, so calling again extends the same chain (with a fresh
    /// thermalization phase, fresh bins, and fresh move counters).
    pub fn run(&mut self) -> Result<RunSummary, RunError> {
        let Self {
            store,
            bundles,
            cycles,
            customs,
            params,
            string,
            cache,
            stats,
            rng,
        } = self;
        *stats = MoveStats::default();
        let engine = UpdateEngine::new(store, bundles, cycles, params.qmax);
        for _ in 0..params.therm_sweeps {
            sweep(&engine, string, cache, stats, rng)?;
        }
        let mut acc = Accumulator::new(customs, params.measurements(), params.bins);
        let mut samples = Vec::new();
        for s in 0..params.measure_sweeps {
            sweep(&engine, string, cache, stats, rng)?;
            if (s + 1) % params.sweeps_per_measurement == 0 {
                string.check_closure(store)?;
                let sign = measure(store, bundles, customs, string, params.beta, &mut samples);
                acc.record(&samples, sign, string.len());
            }
        }
        let average_sign = acc.average_sign();
        let sign_is_reliable = average_sign.norm() >= params.sign_threshold;
        if !sign_is_reliable {
            log::warn!(
                "average sign {:.3e} below threshold {:.3e}; error bars are not trustworthy",
                average_sign.norm(),
                params.sign_threshold
            );
        }
        Ok(RunSummary {
            observables: acc.finalize(params.beta),
            average_sign,
            sign_is_reliable,
            length_histogram: acc.length_histogram().to_vec(),
            moves: *stats,
        })
    }

    /// The current operator-string length.
    pub fn string_len(&self) -> usize {
        self.string.len()
    }
}

/// One sweep: a number of Metropolis steps scaled to both the system size
/// and the current string length, so long strings get enough chances to
/// rearrange.
fn sweep<R: Rng>(
    engine: &UpdateEngine,
    string: &mut OperatorString,
    cache: &mut WeightCache,
    stats: &mut MoveStats,
    rng: &mut R,
) -> Result<(), RunError> {
    let steps = string.start().len() + string.len().max(1);
    for _ in 0..steps {
        let (kind, accepted) = engine.metropolis_step(string, cache, rng)?;
        stats.record(kind, accepted);
    }
    Ok(())
}

/// Run independent replicas with consecutive seeds and merge their bins.
/// With the `parallel` feature the replicas run on the rayon pool.
pub fn run_replicas<R>(
    nvars: usize,
    terms: &[PauliTerm],
    customs: &[CustomObservable],
    params: RunParams,
    replicas: usize,
) -> Result<RunSummary, SimulationError>
where
    R: Rng + SeedableRng + Send,
{
    let mut sims = Vec::with_capacity(replicas.max(1));
    for i in 0..replicas.max(1) as u64 {
        let mut p = params;
        p.seed = params.seed.wrapping_add(i);
        let rng = R::seed_from_u64(p.seed);
        sims.push(Simulation::new(nvars, terms, customs.to_vec(), p, rng)?);
    }
    #[cfg(feature = "parallel")]
    let ran: Result<Vec<RunSummary>, RunError> =
        sims.into_par_iter().map(|mut sim| sim.run()).collect();
    #[cfg(not(feature = "parallel"))]
    let ran: Result<Vec<RunSummary>, RunError> =
        sims.into_iter().map(|mut sim| sim.run()).collect();
    Ok(merge_summaries(ran?, params.sign_threshold))
}

/// Pool the bins of several summaries into one. Every replica contributes
/// the same number of measurements, so signs and histograms average and add
/// directly.
pub fn merge_summaries(summaries: Vec<RunSummary>, sign_threshold: f64) -> RunSummary {
    debug_assert!(!summaries.is_empty());
    let mut pooled: Vec<(String, Vec<f64>)> = Vec::new();
    let mut order: HashMap<String, usize> = HashMap::new();
    let mut average_sign = Complex64::new(0.0, 0.0);
    let mut length_histogram: Vec<u64> = Vec::new();
    let mut moves = MoveStats::default();
    let count = summaries.len() as f64;
    for summary in summaries {
        for obs in summary.observables {
            let at = *order.entry(obs.name.clone()).or_insert_with(|| {
                pooled.push((obs.name.clone(), Vec::new()));
                pooled.len() - 1
            });
            pooled[at].1.extend(obs.bin_means);
        }
        average_sign += summary.average_sign / count;
        if length_histogram.len() < summary.length_histogram.len() {
            length_histogram.resize(summary.length_histogram.len(), 0);
        }
        for (acc, &h) in length_histogram
            .iter_mut()
            .zip(summary.length_histogram.iter())
        {
            *acc += h;
        }
        moves.merge(&summary.moves);
    }
    let observables = pooled
        .into_iter()
        .map(|(name, bins)| ObservableResult::from_bins(&name, bins))
        .collect();
    RunSummary {
        observables,
        average_sign,
        sign_is_reliable: average_sign.norm() >= sign_threshold,
        length_histogram,
        moves,
    }
}
