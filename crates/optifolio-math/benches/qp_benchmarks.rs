//! Benchmarks for the quadratic programming solver.
//!
//! Run with: cargo bench -p optifolio-math

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use nalgebra::{DMatrix, DVector};

use optifolio_math::optimization::{QpSettings, QuadraticProgram};

// =============================================================================
// TEST DATA GENERATORS
// =============================================================================

/// Deterministic covariance with a one-factor structure plus idiosyncratic
/// variance, in daily-return units.
fn factor_covariance(n: usize) -> DMatrix<f64> {
    let betas: Vec<f64> = (0..n).map(|i| 0.6 + 0.8 * ((i * 37) % 11) as f64 / 10.0).collect();
    let market_var = 1.0e-4;
    DMatrix::from_fn(n, n, |i, j| {
        let systematic = betas[i] * betas[j] * market_var;
        if i == j {
            systematic + 5.0e-5 * (1.0 + (i % 5) as f64)
        } else {
            systematic
        }
    })
}

fn min_variance_problem(n: usize, cap: f64) -> QuadraticProgram {
    let mut qp = QuadraticProgram::new(factor_covariance(n), DVector::zeros(n))
        .expect("valid covariance");
    qp.add_equality(DVector::from_element(n, 1.0), 1.0)
        .expect("budget row");
    qp.add_variable_bounds(0.0, cap).expect("bounds");
    qp
}

// =============================================================================
// BENCHMARKS
// =============================================================================

fn bench_min_variance(c: &mut Criterion) {
    let mut group = c.benchmark_group("qp_min_variance");
    let settings = QpSettings::default();

    for n in [5, 20, 50, 100] {
        let qp = min_variance_problem(n, 0.25_f64.max(2.0 / n as f64));
        group.bench_with_input(BenchmarkId::from_parameter(n), &qp, |b, qp| {
            b.iter(|| black_box(qp.solve(black_box(&settings))))
        });
    }

    group.finish();
}

fn bench_linear_program(c: &mut Criterion) {
    let mut group = c.benchmark_group("qp_max_return_lp");
    let settings = QpSettings::default();

    for n in [5, 50] {
        let q = DVector::from_fn(n, |i, _| -0.0004 * (1.0 + (i * 7 % 13) as f64));
        let mut lp = QuadraticProgram::linear(q).expect("valid objective");
        lp.add_equality(DVector::from_element(n, 1.0), 1.0)
            .expect("budget row");
        lp.add_variable_bounds(0.0, 0.3).expect("bounds");

        group.bench_with_input(BenchmarkId::from_parameter(n), &lp, |b, lp| {
            b.iter(|| black_box(lp.solve(black_box(&settings))))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_min_variance, bench_linear_program);
criterion_main!(benches);
