//! Risk budgeting.
//!
//! Finds long-only weights whose risk contributions
//! `RC_i = w_i (Σw)_i / sqrt(wᵀΣw)` are proportional to positive budgets
//! `b_i` (`Σb = 1`). Following Spinu (2013), the problem is solved through
//! the strictly convex program
//!
//! ```text
//! minimize  f(x) = ½ xᵀΣx - Σ b_i ln x_i,   x > 0
//! ```
//!
//! whose minimizer satisfies `x_i (Σx)_i = b_i`; normalizing `w = x / Σx`
//! gives the budgeted portfolio. Newton steps with a positivity-preserving
//! backtracking line search start from inverse-volatility weights, so the
//! result is deterministic.
//!
//! Stopping rule: `max_i |RC_i - b_i·σ_p| ≤ tolerance / 2`, evaluated in the
//! units of the input covariance. With equal budgets this bounds the spread
//! between any two contributions by `tolerance`.

use nalgebra::{DMatrix, DVector};
use tracing::debug;

use crate::error::{PortfolioError, PortfolioResult};
use crate::types::{CovarianceRegularization, MomentsEstimate, OptimizerConfig, Portfolio, Validate};

const ARMIJO: f64 = 1e-4;
const BOUNDARY_FRACTION: f64 = 0.99;
const MAX_BACKTRACKS: usize = 60;

/// Equal-risk-contribution portfolio.
pub fn risk_parity(moments: &MomentsEstimate, config: &OptimizerConfig) -> PortfolioResult<Portfolio> {
    risk_budget(moments, None, config)
}

/// Portfolio whose risk contributions match `budgets` (equal if `None`).
///
/// # Errors
///
/// - `InvalidInput` if budgets are not positive or have the wrong length
/// - `SingularCovariance` if an asset has zero variance
/// - `ConvergenceFailure` if the stopping rule is not met within
///   `config.risk_budget.max_iterations`
pub fn risk_budget(
    moments: &MomentsEstimate,
    budgets: Option<&[f64]>,
    config: &OptimizerConfig,
) -> PortfolioResult<Portfolio> {
    config.validate_or_error()?;
    let n = moments.n_assets();
    let budgets = normalized_budgets(budgets, n)?;

    let cov = match config.covariance_regularization {
        CovarianceRegularization::Ridge { lambda } => {
            optifolio_math::linear_algebra::ridge(moments.cov(), lambda)?
        }
        _ => moments.cov().clone(),
    };

    for j in 0..n {
        if cov[(j, j)] <= 0.0 {
            return Err(PortfolioError::singular_covariance(format!(
                "asset '{}' has zero variance, so its risk contribution cannot match a positive budget",
                moments.assets()[j]
            )));
        }
    }

    let weights = solve(&cov, &budgets, config)?;
    Ok(Portfolio::from_weights(moments, &weights, config.risk_free_rate))
}

fn normalized_budgets(budgets: Option<&[f64]>, n: usize) -> PortfolioResult<DVector<f64>> {
    let Some(budgets) = budgets else {
        return Ok(DVector::from_element(n, 1.0 / n as f64));
    };

    if budgets.len() != n {
        return Err(PortfolioError::invalid_input(format!(
            "{} risk budgets for {n} assets",
            budgets.len()
        )));
    }
    if let Some(b) = budgets.iter().find(|b| !(b.is_finite() && **b > 0.0)) {
        return Err(PortfolioError::invalid_input(format!(
            "risk budgets must be positive, got {b}"
        )));
    }

    let total: f64 = budgets.iter().sum();
    Ok(DVector::from_iterator(n, budgets.iter().map(|b| b / total)))
}

fn solve(cov: &DMatrix<f64>, budgets: &DVector<f64>, config: &OptimizerConfig) -> PortfolioResult<DVector<f64>> {
    let n = budgets.len();
    let settings = config.risk_budget;

    // Work on a unit-scaled covariance; weights are scale invariant.
    let scale = cov.diagonal().mean();
    let sigma = cov / scale;

    let mut x = DVector::from_fn(n, |j, _| 1.0 / sigma[(j, j)].sqrt());
    let level = x.dot(&(&sigma * &x)).sqrt();
    x /= level;

    let objective = |x: &DVector<f64>| -> f64 {
        0.5 * x.dot(&(&sigma * x)) - budgets.iter().zip(x.iter()).map(|(b, v)| b * v.ln()).sum::<f64>()
    };

    let mut residual = f64::INFINITY;
    for iteration in 0..settings.max_iterations {
        let weights = &x / x.sum();
        residual = budget_residual(cov, &weights, budgets);
        if residual <= settings.tolerance / 2.0 {
            debug!(iterations = iteration, residual, "risk budget converged");
            return Ok(weights);
        }

        let sx = &sigma * &x;
        let gradient = DVector::from_fn(n, |i, _| sx[i] - budgets[i] / x[i]);
        let mut hessian = sigma.clone();
        for i in 0..n {
            hessian[(i, i)] += budgets[i] / (x[i] * x[i]);
        }

        let chol = hessian.cholesky().ok_or_else(|| {
            PortfolioError::singular_covariance("covariance is not positive semidefinite")
        })?;
        let step = -chol.solve(&gradient);

        let mut t: f64 = 1.0;
        for i in 0..n {
            if step[i] < 0.0 {
                t = t.min(-BOUNDARY_FRACTION * x[i] / step[i]);
            }
        }

        let f0 = objective(&x);
        let slope = gradient.dot(&step);
        let mut accepted = false;
        for _ in 0..MAX_BACKTRACKS {
            let candidate = &x + &step * t;
            if objective(&candidate) <= f0 + ARMIJO * t * slope {
                x = candidate;
                accepted = true;
                break;
            }
            t *= 0.5;
        }

        if !accepted {
            // Newton has stalled at machine precision.
            debug!(iteration, residual, "risk budget line search stalled");
            break;
        }
    }

    let weights = &x / x.sum();
    let final_residual = budget_residual(cov, &weights, budgets);
    if final_residual <= settings.tolerance / 2.0 {
        return Ok(weights);
    }

    Err(PortfolioError::ConvergenceFailure {
        iterations: settings.max_iterations,
        residual: final_residual.min(residual),
    })
}

/// `max_i |RC_i - b_i σ_p|`.
fn budget_residual(cov: &DMatrix<f64>, weights: &DVector<f64>, budgets: &DVector<f64>) -> f64 {
    let marginal = cov * weights;
    let vol = weights.dot(&marginal).max(0.0).sqrt();
    if vol == 0.0 {
        return f64::INFINITY;
    }

    (0..weights.len())
        .map(|i| (weights[i] * marginal[i] / vol - budgets[i] * vol).abs())
        .fold(0.0, f64::max)
}
