//! The permutation matrix representation (PMR) engine. A Hamiltonian given as
//! Pauli-product terms is split into a diagonal operator plus off-diagonal
//! permutation operators; closed strings of permutation operators are sampled
//! with a Metropolis chain whose configuration weights are divided differences
//! of the exponential along the path of diagonal energies.

/// Equivalence classes of permutation operators and the fundamental cycles
/// used by the cycle updates.
pub mod bundles;
/// Incremental divided differences of the exponential.
pub mod divdiff;
/// Errors raised while building or running a simulation.
pub mod error;
/// Pauli-term input and the PMR decomposition.
pub mod hamiltonian;
/// Packed site sets acting as GF(2) vectors.
pub mod mask;
/// Binned measurement accumulation and the standard observables.
pub mod estimators;
/// The reference state and the operator string.
pub mod state;
/// The Metropolis moves.
pub mod updates;
/// Configuration weights.
pub mod weight;
/// The simulation driver.
pub mod runner;

pub use bundles::{BundleIndex, CycleSet};
pub use divdiff::DivDiff;
pub use error::{
    BuildError, ClosureViolation, MalformedHamiltonian, ParameterError, RunError, SimulationError,
};
pub use estimators::{CustomObservable, ObservableResult};
pub use hamiltonian::{PauliAxis, PauliTerm, PermOp, TermStore};
pub use mask::FlipMask;
pub use runner::{run_replicas, RunParams, RunSummary, Simulation};
pub use state::OperatorString;
pub use updates::{MoveKind, MoveStats, UpdateEngine};
pub use weight::{evaluate, Weight, WeightCache};
