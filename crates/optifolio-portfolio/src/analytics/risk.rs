//! Risk contribution analysis.
//!
//! Decomposes portfolio volatility into per-asset contributions
//! `RC_i = w_i (Σw)_i / σ_p`, which sum to `σ_p`.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::error::{PortfolioError, PortfolioResult};

/// Risk decomposition of one weight vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskContributions {
    /// Portfolio volatility `sqrt(wᵀΣw)`.
    pub volatility: f64,
    /// Marginal risk `(Σw)_i / σ_p`.
    pub marginal: Vec<f64>,
    /// Absolute contributions; they sum to `volatility`.
    pub absolute: Vec<f64>,
    /// Contributions as fractions of `volatility`; they sum to 1.
    pub relative: Vec<f64>,
}

impl RiskContributions {
    /// Largest absolute difference between two assets' contributions.
    pub fn max_spread(&self) -> f64 {
        let max = self.absolute.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let min = self.absolute.iter().copied().fold(f64::INFINITY, f64::min);
        if self.absolute.is_empty() {
            0.0
        } else {
            max - min
        }
    }
}

/// Computes risk contributions of `weights` under `cov`.
///
/// A riskless portfolio has zero volatility and all contributions zero.
///
/// # Errors
///
/// Returns `InvalidInput` if the shapes disagree.
pub fn risk_contributions(weights: &[f64], cov: &DMatrix<f64>) -> PortfolioResult<RiskContributions> {
    let n = weights.len();
    if cov.nrows() != n || cov.ncols() != n {
        return Err(PortfolioError::invalid_input(format!(
            "{n} weights for a {}x{} covariance",
            cov.nrows(),
            cov.ncols()
        )));
    }

    let w = DVector::from_column_slice(weights);
    let sigma_w = cov * &w;
    let volatility = w.dot(&sigma_w).max(0.0).sqrt();

    if volatility == 0.0 {
        return Ok(RiskContributions {
            volatility,
            marginal: vec![0.0; n],
            absolute: vec![0.0; n],
            relative: vec![0.0; n],
        });
    }

    let marginal: Vec<f64> = sigma_w.iter().map(|m| m / volatility).collect();
    let absolute: Vec<f64> = weights.iter().zip(&marginal).map(|(w, m)| w * m).collect();
    let relative = absolute.iter().map(|c| c / volatility).collect();

    Ok(RiskContributions {
        volatility,
        marginal,
        absolute,
        relative,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_contributions_sum_to_volatility() {
        let cov = DMatrix::from_row_slice(3, 3, &[0.04, 0.01, 0.0, 0.01, 0.09, 0.02, 0.0, 0.02, 0.16]);
        let rc = risk_contributions(&[0.5, 0.3, 0.2], &cov).unwrap();

        let total: f64 = rc.absolute.iter().sum();
        assert_relative_eq!(total, rc.volatility, epsilon = 1e-15);
        assert_relative_eq!(rc.relative.iter().sum::<f64>(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_diagonal_case() {
        let cov = DMatrix::from_diagonal(&DVector::from_vec(vec![0.04, 0.01]));
        let rc = risk_contributions(&[1.0 / 3.0, 2.0 / 3.0], &cov).unwrap();

        // w_i σ_i equal -> equal contributions
        assert_relative_eq!(rc.absolute[0], rc.absolute[1], epsilon = 1e-15);
        assert!(rc.max_spread() < 1e-15);
    }

    #[test]
    fn test_riskless_and_shape() {
        let cov = DMatrix::zeros(2, 2);
        let rc = risk_contributions(&[0.5, 0.5], &cov).unwrap();
        assert_eq!(rc.volatility, 0.0);
        assert_eq!(rc.relative, vec![0.0, 0.0]);

        assert!(risk_contributions(&[1.0], &cov).is_err());
    }
}
