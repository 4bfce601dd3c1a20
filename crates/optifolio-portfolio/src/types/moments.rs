//! Estimated return moments.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::error::{PortfolioError, PortfolioResult};

/// Relative asymmetry tolerated before a covariance is rejected.
const SYMMETRY_TOLERANCE: f64 = 1e-10;

/// Expected returns and covariance of an asset universe.
///
/// `cov` is square, symmetric and indexed in the same order as `assets`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MomentsEstimate {
    assets: Vec<String>,
    mu: DVector<f64>,
    cov: DMatrix<f64>,
}

impl MomentsEstimate {
    /// Creates an estimate from explicit moments.
    ///
    /// The covariance is symmetrized after checking that it is symmetric up
    /// to rounding.
    ///
    /// # Errors
    ///
    /// - `InvalidInput` on shape mismatches, an empty universe, a visibly
    ///   asymmetric covariance or a negative variance
    /// - `NonFiniteInput` if any entry is NaN or infinite
    pub fn new(assets: Vec<String>, mu: DVector<f64>, cov: DMatrix<f64>) -> PortfolioResult<Self> {
        let n = assets.len();
        if n == 0 {
            return Err(PortfolioError::invalid_input("asset universe is empty"));
        }
        if mu.len() != n || cov.nrows() != n || cov.ncols() != n {
            return Err(PortfolioError::invalid_input(format!(
                "{n} assets but mu has length {} and cov is {}x{}",
                mu.len(),
                cov.nrows(),
                cov.ncols()
            )));
        }
        if let Some(j) = mu.iter().position(|v| !v.is_finite()) {
            return Err(PortfolioError::non_finite(format!(
                "expected return of '{}'",
                assets[j]
            )));
        }
        if cov.iter().any(|v| !v.is_finite()) {
            return Err(PortfolioError::non_finite("covariance matrix"));
        }

        let scale = cov.amax().max(f64::MIN_POSITIVE);
        for i in 0..n {
            if cov[(i, i)] < 0.0 {
                return Err(PortfolioError::invalid_input(format!(
                    "negative variance for '{}'",
                    assets[i]
                )));
            }
            for j in (i + 1)..n {
                if (cov[(i, j)] - cov[(j, i)]).abs() > SYMMETRY_TOLERANCE * scale {
                    return Err(PortfolioError::invalid_input(format!(
                        "covariance is not symmetric at ({i}, {j})"
                    )));
                }
            }
        }
        let cov = (&cov + cov.transpose()) * 0.5;

        Ok(Self { assets, mu, cov })
    }

    /// Asset identifiers.
    pub fn assets(&self) -> &[String] {
        &self.assets
    }

    /// Expected returns.
    pub fn mu(&self) -> &DVector<f64> {
        &self.mu
    }

    /// Covariance matrix.
    pub fn cov(&self) -> &DMatrix<f64> {
        &self.cov
    }

    /// Number of assets.
    pub fn n_assets(&self) -> usize {
        self.assets.len()
    }

    /// Expected return of a named asset.
    pub fn expected_return(&self, asset: &str) -> Option<f64> {
        self.asset_index(asset).map(|j| self.mu[j])
    }

    /// Column index of an asset.
    pub fn asset_index(&self, asset: &str) -> Option<usize> {
        self.assets.iter().position(|a| a == asset)
    }

    /// Per-asset volatilities (square roots of the diagonal).
    pub fn volatilities(&self) -> DVector<f64> {
        DVector::from_fn(self.n_assets(), |j, _| self.cov[(j, j)].sqrt())
    }

    /// `wᵀμ`.
    pub fn portfolio_return(&self, weights: &DVector<f64>) -> f64 {
        self.mu.dot(weights)
    }

    /// `wᵀΣw`, floored at zero.
    pub fn portfolio_variance(&self, weights: &DVector<f64>) -> f64 {
        weights.dot(&(&self.cov * weights)).max(0.0)
    }
}
