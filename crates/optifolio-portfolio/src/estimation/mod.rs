//! Moment estimation from historical returns.
//!
//! [`estimate`] turns a [`ReturnsMatrix`] into a [`MomentsEstimate`]:
//!
//! - `Historical`: column means and the unbiased (`N - 1`) sample covariance
//! - `Ewma`: exponentially weighted means and the bias-corrected weighted
//!   covariance `Σ wₜ (rₜ - μ)(rₜ - μ)ᵀ / (1 - Σ wₜ²)`, which reduces to the
//!   historical estimate when `decay = 1`
//! - `LedoitWolf`: historical means with the covariance shrunk towards
//!   `(tr S / M)·I`
//!
//! Estimation never imputes: a NaN or infinite return fails with
//! `NonFiniteInput`.

mod shrinkage;

use nalgebra::{DMatrix, DVector};
use tracing::debug;

use crate::error::{PortfolioError, PortfolioResult};
use crate::types::{EstimationMethod, MomentsEstimate, ReturnsMatrix, Validate};

pub use shrinkage::{ledoit_wolf, ShrinkageEstimate};

/// Minimum number of periods for any estimate.
pub const MIN_OBSERVATIONS: usize = 2;

/// Estimates expected returns and covariance.
///
/// # Errors
///
/// - `InsufficientData` with fewer than two periods
/// - `NonFiniteInput` if any return is NaN or infinite
/// - `InvalidInput` for an invalid EWMA decay
pub fn estimate(returns: &ReturnsMatrix, method: &EstimationMethod) -> PortfolioResult<MomentsEstimate> {
    method.validate_or_error()?;
    check_returns(returns)?;

    let x = returns.values();
    let (mu, cov) = match *method {
        EstimationMethod::Historical => historical(x),
        EstimationMethod::Ewma { decay } => ewma(x, decay),
        EstimationMethod::LedoitWolf => {
            let shrunk = ledoit_wolf(x);
            debug!(shrinkage = shrunk.shrinkage, "Ledoit-Wolf shrinkage intensity");
            (column_means(x), shrunk.covariance)
        }
    };

    debug!(
        method = method.name(),
        periods = returns.n_periods(),
        assets = returns.n_assets(),
        "estimated moments"
    );

    MomentsEstimate::new(returns.assets().to_vec(), mu, cov)
}

fn check_returns(returns: &ReturnsMatrix) -> PortfolioResult<()> {
    let n = returns.n_periods();
    if n < MIN_OBSERVATIONS {
        return Err(PortfolioError::insufficient_data(MIN_OBSERVATIONS, n));
    }

    let x = returns.values();
    for t in 0..n {
        for j in 0..returns.n_assets() {
            if !x[(t, j)].is_finite() {
                let when = returns
                    .dates()
                    .map_or_else(|| format!("period {t}"), |d| d[t].to_string());
                return Err(PortfolioError::non_finite(format!(
                    "return of '{}' at {when}",
                    returns.assets()[j]
                )));
            }
        }
    }
    Ok(())
}

pub(crate) fn column_means(x: &DMatrix<f64>) -> DVector<f64> {
    let n = x.nrows() as f64;
    DVector::from_fn(x.ncols(), |j, _| x.column(j).sum() / n)
}

/// Centers every column of `x` on `mu`.
pub(crate) fn demean(x: &DMatrix<f64>, mu: &DVector<f64>) -> DMatrix<f64> {
    DMatrix::from_fn(x.nrows(), x.ncols(), |t, j| x[(t, j)] - mu[j])
}

fn historical(x: &DMatrix<f64>) -> (DVector<f64>, DMatrix<f64>) {
    let mu = column_means(x);
    let centered = demean(x, &mu);
    let cov = centered.transpose() * &centered / (x.nrows() as f64 - 1.0);
    (mu, cov)
}

fn ewma(x: &DMatrix<f64>, decay: f64) -> (DVector<f64>, DMatrix<f64>) {
    let n = x.nrows();
    let raw = DVector::from_fn(n, |t, _| decay.powi((n - 1 - t) as i32));
    let weights = &raw / raw.sum();

    let mu = DVector::from_fn(x.ncols(), |j, _| x.column(j).dot(&weights));
    let centered = demean(x, &mu);

    let mut weighted = centered.clone();
    for t in 0..n {
        weighted.row_mut(t).scale_mut(weights[t]);
    }
    let correction = 1.0 - weights.dot(&weights);
    let cov = centered.transpose() * weighted / correction;

    (mu, cov)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sample() -> ReturnsMatrix {
        ReturnsMatrix::from_rows(
            vec!["A".into(), "B".into()],
            &[
                vec![0.01, 0.02],
                vec![0.03, -0.01],
                vec![-0.02, 0.00],
                vec![0.02, 0.03],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_historical_moments() {
        let m = estimate(&sample(), &EstimationMethod::Historical).unwrap();

        assert_relative_eq!(m.mu()[0], 0.01, epsilon = 1e-15);
        assert_relative_eq!(m.mu()[1], 0.01, epsilon = 1e-15);

        // A deviations: 0, .02, -.03, .01 -> sum sq .0014 / 3
        assert_relative_eq!(m.cov()[(0, 0)], 0.0014 / 3.0, epsilon = 1e-15);
        // cross: 0*.01 + .02*-.02 + -.03*-.01 + .01*.02 = .0001
        assert_relative_eq!(m.cov()[(0, 1)], 0.0001 / 3.0, epsilon = 1e-15);
        assert_relative_eq!(m.cov()[(1, 0)], m.cov()[(0, 1)]);
    }

    #[test]
    fn test_ewma_with_unit_decay_is_historical() {
        let hist = estimate(&sample(), &EstimationMethod::Historical).unwrap();
        let ewma = estimate(&sample(), &EstimationMethod::Ewma { decay: 1.0 }).unwrap();

        for (a, b) in hist.cov().iter().zip(ewma.cov().iter()) {
            assert_relative_eq!(*a, *b, epsilon = 1e-15);
        }
    }

    #[test]
    fn test_ewma_favours_recent_periods() {
        let m = estimate(&sample(), &EstimationMethod::Ewma { decay: 0.5 }).unwrap();
        // Last period returns 0.02 / 0.03 carry weight 8/15.
        assert!(m.mu()[1] > 0.01);
        assert!(m.cov()[(0, 0)] > 0.0);
    }

    #[test]
    fn test_insufficient_data() {
        let one = ReturnsMatrix::from_rows(vec!["A".into()], &[vec![0.01]]).unwrap();
        assert!(matches!(
            estimate(&one, &EstimationMethod::Historical),
            Err(PortfolioError::InsufficientData {
                required: 2,
                actual: 1
            })
        ));
    }

    #[test]
    fn test_non_finite_rejected() {
        let r = ReturnsMatrix::from_rows(
            vec!["A".into(), "B".into()],
            &[vec![0.01, 0.02], vec![f64::NAN, 0.01], vec![0.0, 0.0]],
        )
        .unwrap();

        let err = estimate(&r, &EstimationMethod::Historical).unwrap_err();
        assert!(matches!(err, PortfolioError::NonFiniteInput { .. }));
        assert!(err.to_string().contains("'A'"));
    }

    #[test]
    fn test_invalid_decay() {
        assert!(matches!(
            estimate(&sample(), &EstimationMethod::Ewma { decay: 0.0 }),
            Err(PortfolioError::InvalidInput { .. })
        ));
    }
}
