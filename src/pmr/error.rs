use thiserror::Error;

/// A structural problem in a supplied Hamiltonian or observable term list,
/// detected at construction time before any sampling.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum MalformedHamiltonian {
    /// The system has no sites at all.
    #[error("the system must have at least one site")]
    EmptySystem,
    /// A site index appears more than once within one term.
    #[error("term {term}: site {site} appears more than once")]
    DuplicateSite {
        /// Index of the offending term in the input list.
        term: usize,
        /// The repeated site.
        site: usize,
    },
    /// A coefficient is NaN or infinite.
    #[error("term {term}: coefficient is not finite")]
    NonFiniteCoefficient {
        /// Index of the offending term in the input list.
        term: usize,
    },
    /// A site index is not below the declared number of sites.
    #[error("term {term}: site {site} is outside 0..{nvars}")]
    SiteOutOfRange {
        /// Index of the offending term in the input list.
        term: usize,
        /// The out-of-range site.
        site: usize,
        /// Declared number of sites.
        nvars: usize,
    },
    /// An observable was decomposed over a different number of sites than
    /// the Hamiltonian it is measured against.
    #[error("observable covers {observable} sites but the system has {system}")]
    ObservableSizeMismatch {
        /// Sites of the observable decomposition.
        observable: usize,
        /// Sites of the system.
        system: usize,
    },
}

/// An invalid run parameter, detected before any sampling.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum ParameterError {
    /// Inverse temperature must be positive and finite.
    #[error("inverse temperature must be positive and finite")]
    BadBeta,
    /// At least one measurement sweep is required.
    #[error("measurement sweep count must be nonzero")]
    ZeroSweeps,
    /// At least one thermalization sweep is required.
    #[error("thermalization sweep count must be nonzero")]
    ZeroThermSweeps,
    /// Measurement stride must be nonzero.
    #[error("sweeps_per_measurement must be nonzero")]
    ZeroMeasurementStride,
    /// At least one bin is required.
    #[error("bin count must be nonzero")]
    ZeroBins,
    /// Each bin must receive at least one measurement.
    #[error("bin count exceeds the number of measurements")]
    TooManyBins,
    /// The operator-string cap must admit at least one pair.
    #[error("qmax must be at least 2")]
    BadQmax,
    /// The sign-quality threshold must lie in [0, 1].
    #[error("sign threshold must lie in [0, 1]")]
    BadSignThreshold,
}

/// The operator string failed to return to its reference state. This is an
/// internal invariant: it can only be produced by a bug in the update moves,
/// and aborts the run rather than sampling a wrong distribution.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
#[error("operator string does not return to its reference state (first mismatched site {site})")]
pub struct ClosureViolation {
    /// Lowest site at which the walked final state differs from the
    /// reference state.
    pub site: usize,
}

/// A fatal condition raised while sampling.
#[derive(Clone, Copy, Debug, PartialEq, Error)]
pub enum RunError {
    /// See [`ClosureViolation`].
    #[error(transparent)]
    Closure(#[from] ClosureViolation),
    /// The configuration weight left the representable log-magnitude range.
    #[error("weight magnitude left the representable range (log-magnitude {ln_magnitude})")]
    WeightOverflow {
        /// The non-finite or out-of-range log-magnitude encountered.
        ln_magnitude: f64,
    },
}

/// A failure while assembling a simulation from its inputs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum BuildError {
    /// The Hamiltonian or an observable term list is malformed.
    #[error(transparent)]
    Hamiltonian(#[from] MalformedHamiltonian),
    /// A run parameter is invalid.
    #[error(transparent)]
    Parameter(#[from] ParameterError),
}

/// Any failure from the one-call replica driver, which both builds and runs.
#[derive(Clone, Copy, Debug, PartialEq, Error)]
pub enum SimulationError {
    /// The simulation could not be assembled.
    #[error(transparent)]
    Build(#[from] BuildError),
    /// A chain failed while sampling.
    #[error(transparent)]
    Run(#[from] RunError),
}
