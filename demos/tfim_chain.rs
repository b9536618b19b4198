use pmrqmc::pmr::*;
use rand::prelude::*;

fn main() {
    env_logger::init();

    // Transverse-field Ising chain at the critical coupling, periodic.
    let n = 8;
    let j = 1.0;
    let g = 1.0;
    let mut terms = Vec::new();
    for i in 0..n {
        terms.push(PauliTerm::new(
            -j,
            [(i, PauliAxis::Z), ((i + 1) % n, PauliAxis::Z)],
        ));
        terms.push(PauliTerm::new(-g, [(i, PauliAxis::X)]));
    }

    let params = RunParams {
        beta: 2.0,
        ..RunParams::default()
    };
    let rng = StdRng::seed_from_u64(1234);
    let mut sim = Simulation::new(n, &terms, Vec::new(), params, rng).expect("valid inputs");
    let summary = sim.run().expect("sampling failed");

    for name in ["H", "Hdiag", "Hoffdiag", "H^2", "Mz", "C"] {
        if let Some(obs) = summary.observable(name) {
            println!(
                "{:>10}: {:>12.6} +/- {:.6}",
                obs.name, obs.mean, obs.std_error
            );
        }
    }
    println!("average sign: {:.4}", summary.average_sign.re);
    println!(
        "max string length seen: {}",
        summary.length_histogram.len().saturating_sub(1)
    );
}
