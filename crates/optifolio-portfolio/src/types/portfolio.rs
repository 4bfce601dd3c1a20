//! Optimizer outputs.

use nalgebra::DVector;
use serde::{Deserialize, Serialize};

use super::MomentsEstimate;

/// Portfolio weights with their statistics under the estimate they were
/// solved with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Portfolio {
    /// Asset identifiers.
    pub assets: Vec<String>,
    /// Weights in asset order; they sum to 1.
    pub weights: Vec<f64>,
    /// `wᵀμ`.
    pub expected_return: f64,
    /// `sqrt(wᵀΣw)`.
    pub volatility: f64,
    /// `(wᵀμ - r_f) / sqrt(wᵀΣw)`, absent for a riskless portfolio.
    pub sharpe_ratio: Option<f64>,
}

impl Portfolio {
    /// Evaluates `weights` under `moments`.
    pub fn from_weights(moments: &MomentsEstimate, weights: &DVector<f64>, risk_free_rate: f64) -> Self {
        let expected_return = moments.portfolio_return(weights);
        let volatility = moments.portfolio_variance(weights).sqrt();
        let sharpe_ratio = (volatility > 0.0).then(|| (expected_return - risk_free_rate) / volatility);

        Self {
            assets: moments.assets().to_vec(),
            weights: weights.iter().copied().collect(),
            expected_return,
            volatility,
            sharpe_ratio,
        }
    }

    /// Weight of a named asset.
    pub fn weight(&self, asset: &str) -> Option<f64> {
        self.assets
            .iter()
            .position(|a| a == asset)
            .map(|j| self.weights[j])
    }

    /// `(asset, weight)` pairs in asset order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.assets
            .iter()
            .map(String::as_str)
            .zip(self.weights.iter().copied())
    }

    /// Weights as a vector.
    pub fn weight_vector(&self) -> DVector<f64> {
        DVector::from_column_slice(&self.weights)
    }

    /// Sum of the weights.
    pub fn total_weight(&self) -> f64 {
        self.weights.iter().sum()
    }
}

/// One point of an efficient-frontier sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrontierPoint {
    /// Return level the point was solved for.
    pub target_return: f64,
    /// Minimum-variance portfolio at that level.
    pub portfolio: Portfolio,
}

impl FrontierPoint {
    /// Realized expected return.
    pub fn expected_return(&self) -> f64 {
        self.portfolio.expected_return
    }

    /// Realized volatility.
    pub fn volatility(&self) -> f64 {
        self.portfolio.volatility
    }
}

/// Frontier points ordered by ascending target return.
///
/// Targets that could not be solved are omitted, so `len()` may be smaller
/// than the number requested.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrontierSample {
    /// Solved points.
    pub points: Vec<FrontierPoint>,
    /// Number of targets that were attempted.
    pub requested: usize,
}

impl FrontierSample {
    /// Number of solved points.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// True if no point was solved.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Number of targets skipped as infeasible or unsolved.
    pub fn omitted(&self) -> usize {
        self.requested.saturating_sub(self.points.len())
    }

    /// Iterates over the points.
    pub fn iter(&self) -> std::slice::Iter<'_, FrontierPoint> {
        self.points.iter()
    }

    /// The lowest-volatility point.
    pub fn min_volatility(&self) -> Option<&FrontierPoint> {
        self.points
            .iter()
            .min_by(|a, b| a.volatility().total_cmp(&b.volatility()))
    }

    /// The point with the highest Sharpe ratio.
    pub fn max_sharpe(&self) -> Option<&FrontierPoint> {
        self.points
            .iter()
            .filter(|p| p.portfolio.sharpe_ratio.is_some())
            .max_by(|a, b| {
                let sa = a.portfolio.sharpe_ratio.unwrap_or(f64::NEG_INFINITY);
                let sb = b.portfolio.sharpe_ratio.unwrap_or(f64::NEG_INFINITY);
                sa.total_cmp(&sb)
            })
    }
}

impl<'a> IntoIterator for &'a FrontierSample {
    type Item = &'a FrontierPoint;
    type IntoIter = std::slice::Iter<'a, FrontierPoint>;

    fn into_iter(self) -> Self::IntoIter {
        self.points.iter()
    }
}
