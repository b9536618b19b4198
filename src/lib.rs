#![deny(
    missing_docs,
    unreachable_pub,
    missing_debug_implementations,
    missing_copy_implementations,
    trivial_casts,
    trivial_numeric_casts,
    unsafe_code,
    unused_import_braces,
    unused_qualifications
)]

//! `pmrqmc` is a library for estimating finite-temperature expectation values
//! of arbitrary spin-1/2 Hamiltonians with quantum Monte Carlo in the
//! permutation matrix representation (PMR).
//!
//! A Hamiltonian is supplied as a list of Pauli-product terms. The library
//! decomposes it into a diagonal part plus permutation operators, samples
//! closed operator strings with a Metropolis chain whose weights are divided
//! differences of the exponential, and reports binned estimates with error
//! bars for the energy, its decomposition, and arbitrary user-supplied
//! observables. Signed or complex weights are handled by sign reweighting;
//! the average sign is always reported.
//!
//! It offers two feature gated additions:
//! - independent-replica parallelism on a rayon pool: use `parallel`
//! - parameter/result serialization using serde: use `serialize`
//!
//! # Basic example
//! ```
//! use pmrqmc::pmr::*;
//! use rand::prelude::*;
//!
//! // H = -X - 0.5 Z on a single spin.
//! let terms = vec![
//!     PauliTerm::new(-1.0, [(0, PauliAxis::X)]),
//!     PauliTerm::new(-0.5, [(0, PauliAxis::Z)]),
//! ];
//!
//! let params = RunParams {
//!     beta: 1.0,
//!     therm_sweeps: 200,
//!     measure_sweeps: 2000,
//!     sweeps_per_measurement: 1,
//!     bins: 10,
//!     ..RunParams::default()
//! };
//!
//! let rng = StdRng::seed_from_u64(42);
//! let mut sim = Simulation::new(1, &terms, Vec::new(), params, rng).unwrap();
//! let summary = sim.run().unwrap();
//!
//! // This model is sign-problem free.
//! assert!((summary.average_sign.re - 1.0).abs() < 1e-12);
//! ```

/// The PMR sampling engine and its supporting types.
pub mod pmr;
/// Small shared helpers.
pub mod util;
