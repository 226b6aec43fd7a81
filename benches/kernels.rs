// Criterion micro-benchmarks for the pi and Lorenz kernels

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use pi_lorenz::{
    lorenz_derivatives, solve, LorenzParameters, LorenzSystem, PiMethod, Rk4Integrator, State,
    TimeGrid, Tolerances,
};

fn benchmark_pi_methods(c: &mut Criterion) {
    let mut group = c.benchmark_group("pi_estimate");
    group.sample_size(20);

    for trials in [10_000u64, 1_000_000].iter() {
        for method in PiMethod::ALL {
            group.bench_with_input(BenchmarkId::new(method.name(), trials), trials, |b, &trials| {
                b.iter(|| black_box(method.run(trials, 1.0, 42)))
            });
        }
    }

    group.finish();
}

fn benchmark_vector_field(c: &mut Criterion) {
    let params = LorenzParameters::default();
    let state = State::new(1.0, 2.0, 3.0);

    c.bench_function("lorenz_derivatives", |b| {
        b.iter(|| lorenz_derivatives(black_box(&state), black_box(&params)))
    });
}

fn benchmark_solvers(c: &mut Criterion) {
    let mut group = c.benchmark_group("lorenz_integrate");
    group.sample_size(10);

    let system = LorenzSystem::default();
    let initial = State::new(1.0, 0.0, 0.0);

    for t_end in [1.0, 10.0].iter() {
        let grid = TimeGrid::linspace(0.0, *t_end, (*t_end * 100.0) as usize + 1).unwrap();

        group.bench_with_input(BenchmarkId::new("rk4", t_end), &grid, |b, grid| {
            let rk4 = Rk4Integrator::new(system, 1e-3).unwrap();
            b.iter(|| black_box(rk4.integrate(initial, grid)))
        });

        group.bench_with_input(BenchmarkId::new("dopri5", t_end), &grid, |b, grid| {
            b.iter(|| black_box(solve(system, initial, grid, Tolerances::default())))
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_pi_methods,
    benchmark_vector_field,
    benchmark_solvers
);
criterion_main!(benches);
