//! Ledoit-Wolf covariance shrinkage.

use nalgebra::{DMatrix, DVector};

use super::{column_means, demean};

/// Shrunk covariance and the intensity that produced it.
#[derive(Debug, Clone)]
pub struct ShrinkageEstimate {
    /// `δ·m·I + (1 - δ)·S`.
    pub covariance: DMatrix<f64>,
    /// Shrinkage intensity `δ` in [0, 1].
    pub shrinkage: f64,
}

/// Shrinks the maximum-likelihood covariance of `x` (`periods × assets`)
/// towards `m·I`, `m = tr(S) / M`, with the Ledoit-Wolf (2004) optimal
/// intensity.
///
/// The sample covariance uses the `1/N` divisor of the published
/// estimator, so the trace of the result equals the trace of `S`.
pub fn ledoit_wolf(x: &DMatrix<f64>) -> ShrinkageEstimate {
    let n = x.nrows() as f64;
    let p = x.ncols();

    let mu = column_means(x);
    let centered = demean(x, &mu);
    let sample = centered.transpose() * &centered / n;

    let m = sample.trace() / p as f64;
    let target = DMatrix::identity(p, p) * m;

    let d2 = (&sample - &target).norm_squared() / p as f64;

    let sample_norm2 = sample.norm_squared();
    let mut b_bar2 = 0.0;
    for t in 0..x.nrows() {
        let row: DVector<f64> = centered.row(t).transpose();
        let sq = row.norm_squared();
        // ‖xxᵀ - S‖² = ‖x‖⁴ - 2 xᵀSx + ‖S‖²
        b_bar2 += sq * sq - 2.0 * row.dot(&(&sample * &row)) + sample_norm2;
    }
    b_bar2 /= n * n * p as f64;

    let b2 = b_bar2.min(d2);
    let shrinkage = if d2 > 0.0 { (b2 / d2).clamp(0.0, 1.0) } else { 0.0 };

    let covariance = target * shrinkage + sample * (1.0 - shrinkage);
    ShrinkageEstimate {
        covariance,
        shrinkage,
    }
}
