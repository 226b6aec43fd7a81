use std::hint::black_box;
use std::process;

use log::{error, info};
use pi_lorenz::{
    lorenz_derivatives, solve, time_cell, BenchConfig, BenchmarkRecord, LorenzSystem, Result,
    Rk4Integrator, State,
};

const FIELD_EVALUATIONS: usize = 1_000_000;

fn main() {
    env_logger::init();

    let mut config_path = None;
    let mut emit_json = false;
    for arg in std::env::args().skip(1) {
        if arg == "--json" {
            emit_json = true;
        } else {
            config_path = Some(arg);
        }
    }

    let config = match config_path {
        Some(path) => {
            info!("loading benchmark config from {}", path);
            BenchConfig::from_file(&path)
        }
        None => Ok(BenchConfig::default()),
    };
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            process::exit(1);
        }
    };

    println!("# Performance Benchmark Results\n");

    let mut records = Vec::new();
    if let Err(e) = run(&config, &mut records) {
        error!("benchmark failed: {}", e);
        process::exit(1);
    }

    if emit_json {
        match serde_json::to_string_pretty(&records) {
            Ok(json) => println!("{}", json),
            Err(e) => error!("could not serialize records: {}", e),
        }
    }

    println!("\nBenchmark complete.");
}

fn run(config: &BenchConfig, records: &mut Vec<BenchmarkRecord>) -> Result<()> {
    benchmark_pi(config, records)?;
    benchmark_vector_field(config, records)?;
    benchmark_lorenz(config, records)?;
    Ok(())
}

fn benchmark_pi(config: &BenchConfig, records: &mut Vec<BenchmarkRecord>) -> Result<()> {
    println!("### Monte Carlo Estimation of Pi\n");
    println!(
        "Radius {}, seed {}, best of {} runs, {} rayon threads\n",
        config.pi.radius,
        config.seed,
        config.repeats,
        rayon::current_num_threads()
    );
    println!("| Method | Trials | Estimate | Std error | Time (ms) |");
    println!("|--------|--------|----------|-----------|-----------|");

    for &trials in &config.pi.trial_counts {
        for method in &config.pi.methods {
            let (estimate, timing) = time_cell(config.repeats, || {
                method.run(trials, config.pi.radius, config.seed)
            })?;

            println!(
                "| {} | {} | {:.6} | {:.6} | {:.2} |",
                method.name(),
                trials,
                estimate.estimate,
                estimate.std_error,
                timing.best_ms()
            );
            records.push(BenchmarkRecord::new("pi", method.name(), &timing, &estimate));
        }
    }
    println!();
    Ok(())
}

fn benchmark_vector_field(config: &BenchConfig, records: &mut Vec<BenchmarkRecord>) -> Result<()> {
    println!("### Lorenz Vector Field Evaluation\n");

    let params = config.lorenz.params;
    let (sum, timing) = time_cell(config.repeats, || {
        let mut state = config.lorenz.initial_state();
        let mut acc = State::zeros();
        for _ in 0..FIELD_EVALUATIONS {
            let d = lorenz_derivatives(black_box(&state), black_box(&params));
            acc += d;
            // small perturbation so the call cannot be hoisted
            state.x += 1e-12;
        }
        Ok(acc)
    })?;

    println!(
        "- {} evaluations: {:.2} ms ({:.1} ns/eval, checksum {:.4e})",
        FIELD_EVALUATIONS,
        timing.best_ms(),
        timing.best.as_nanos() as f64 / FIELD_EVALUATIONS as f64,
        sum.sum()
    );
    println!();
    records.push(BenchmarkRecord::new(
        "lorenz",
        "vector_field",
        &timing,
        &FIELD_EVALUATIONS,
    ));
    Ok(())
}

fn benchmark_lorenz(config: &BenchConfig, records: &mut Vec<BenchmarkRecord>) -> Result<()> {
    println!("### Lorenz Attractor Integration\n");

    let lorenz = &config.lorenz;
    let system = LorenzSystem::new(lorenz.params);
    let grid = lorenz.grid()?;
    let initial = lorenz.initial_state();
    let (t0, t1) = grid.span();

    println!(
        "sigma={}, rho={}, beta={:.4}, t in [{}, {}], {} samples, abs_tol={:e}, rel_tol={:e}\n",
        lorenz.params.sigma,
        lorenz.params.rho,
        lorenz.params.beta,
        t0,
        t1,
        grid.len(),
        lorenz.tolerances.abs,
        lorenz.tolerances.rel
    );
    println!("| Solver | Steps | RHS evals | Final state | Time (ms) |");
    println!("|--------|-------|-----------|-------------|-----------|");

    let rk4 = Rk4Integrator::new(system, lorenz.rk4_dt)?;
    let (fixed, fixed_timing) = time_cell(config.repeats, || rk4.integrate(initial, &grid))?;

    let (adaptive, adaptive_timing) = time_cell(config.repeats, || {
        solve(system, initial, &grid, lorenz.tolerances)
    })?;

    let cells = [
        (format!("rk4 (dt={})", lorenz.rk4_dt), "rk4", &fixed, &fixed_timing),
        ("dopri5".to_string(), "dopri5", &adaptive, &adaptive_timing),
    ];
    for (label, cell, trajectory, timing) in cells {
        let summary = trajectory.summary();
        let final_state = trajectory
            .final_state()
            .map(|s| format!("({:.4}, {:.4}, {:.4})", s.x, s.y, s.z))
            .unwrap_or_default();

        println!(
            "| {} | {} | {} | {} | {:.2} |",
            label,
            trajectory.stats.accepted_steps + trajectory.stats.rejected_steps,
            trajectory.stats.rhs_evals,
            final_state,
            timing.best_ms()
        );
        records.push(BenchmarkRecord::new("lorenz", cell, timing, &summary));
    }

    if let (Some(a), Some(b)) = (fixed.final_state(), adaptive.final_state()) {
        // chaotic divergence over long horizons is expected here
        info!("rk4 vs dopri5 final-state distance: {:.4e}", (a - b).norm());
    }
    println!();
    Ok(())
}
