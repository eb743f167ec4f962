//! Benchmarks for the pivoting solvers on randomly generated PSD problems.
//!
//! Run with: cargo bench -p impact-lcp

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use impact_lcp::{FastSolver, KellerSolver, LemkeSolver};
use nalgebra::{DMatrix, DVector};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Random PSD matrix A A^T + 0.1 I and mixed-sign q.
fn random_psd_problem(n: usize, seed: u64) -> (DMatrix<f64>, DVector<f64>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let a = DMatrix::from_fn(n, n, |_, _| rng.gen_range(-1.0..1.0));
    let mut m = &a * a.transpose();
    for i in 0..n {
        m[(i, i)] += 0.1;
    }
    let q = DVector::from_fn(n, |_, _| rng.gen_range(-1.0..1.0));
    (m, q)
}

fn bench_lemke(c: &mut Criterion) {
    let mut group = c.benchmark_group("lemke");
    for &n in &[4usize, 8, 16, 32] {
        let (m, q) = random_psd_problem(n, 0xBEEF);
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            let mut solver = LemkeSolver::default();
            b.iter(|| {
                let mut z = DVector::zeros(q.len());
                black_box(solver.solve(&m, &q, &mut z, -1.0, -1.0))
            });
        });
    }
    group.finish();
}

fn bench_fast(c: &mut Criterion) {
    let mut group = c.benchmark_group("lcp_fast");
    for &n in &[4usize, 8, 16, 32] {
        let (m, q) = random_psd_problem(n, 0xBEEF);
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            let mut solver = FastSolver::default();
            b.iter(|| {
                let mut z = DVector::zeros(0);
                black_box(solver.solve_lcp(&m, &q, &mut z, -1.0))
            });
        });
    }
    group.finish();
}

fn bench_keller(c: &mut Criterion) {
    let mut group = c.benchmark_group("keller_mlcp");
    for &n in &[4usize, 8, 16, 32] {
        let (m, q) = random_psd_problem(n, 0xBEEF);
        let l = DVector::zeros(n);
        let u = DVector::from_element(n, f64::INFINITY);
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            let mut solver = KellerSolver::default();
            b.iter(|| {
                let mut z = DVector::zeros(n);
                black_box(solver.solve(&m, &q, &l, &u, &mut z, -1.0))
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_lemke, bench_fast, bench_keller);
criterion_main!(benches);
