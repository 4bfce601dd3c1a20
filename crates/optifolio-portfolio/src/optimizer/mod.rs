//! Portfolio optimizers.
//!
//! Every mode is a pure function of a [`MomentsEstimate`], optional
//! [`CompiledConstraints`] and an [`OptimizerConfig`]:
//!
//! - [`optimize`] dispatches on an [`Objective`] and returns one [`Portfolio`]
//! - [`efficient_frontier`] sweeps target returns and returns a
//!   [`FrontierSample`](crate::types::FrontierSample)
//! - [`risk_budget`] / [`risk_parity`] solve for prescribed risk
//!   contributions
//!
//! The feasible region of the mean-variance modes is always
//! `{w : Σw = 1, A·w ≥ B}` intersected with `w ≥ 0` unless short selling is
//! allowed.

mod frontier;
mod mean_variance;
mod risk_budget;

use std::fmt;

use nalgebra::{DMatrix, DVector};
use optifolio_math::linear_algebra::ridge;
use optifolio_math::optimization::{QpSolution, QuadraticProgram};
use optifolio_math::{MathError, MathResult};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::constraints::CompiledConstraints;
use crate::error::{PortfolioError, PortfolioResult};
use crate::types::{CovarianceRegularization, MomentsEstimate, OptimizerConfig, Portfolio, Validate};

pub use frontier::efficient_frontier;
pub use risk_budget::{risk_budget, risk_parity};

/// Slack allowed in the presolve feasibility checks.
const PRESOLVE_TOLERANCE: f64 = 1e-9;

/// What a single optimization maximizes or minimizes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Objective {
    /// Maximize `(wᵀμ - r_f) / sqrt(wᵀΣw)`.
    MaxSharpe,
    /// Minimize `wᵀΣw`.
    MinVariance,
    /// Maximize `wᵀμ`.
    MaxReturn,
    /// Maximize `wᵀμ - λ·wᵀΣw`.
    Utility {
        /// Risk aversion `λ > 0`.
        risk_aversion: f64,
    },
    /// Equal risk contributions.
    RiskParity,
    /// Risk contributions proportional to `budgets`.
    RiskBudget {
        /// Positive budgets, normalized to sum to 1.
        budgets: Vec<f64>,
    },
}

impl Objective {
    /// Short name used in reports.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::MaxSharpe => "max-sharpe",
            Self::MinVariance => "min-variance",
            Self::MaxReturn => "max-return",
            Self::Utility { .. } => "utility",
            Self::RiskParity => "risk-parity",
            Self::RiskBudget { .. } => "risk-budget",
        }
    }
}

impl fmt::Display for Objective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Utility { risk_aversion } => write!(f, "utility(λ={risk_aversion})"),
            other => f.write_str(other.name()),
        }
    }
}

/// Solves one portfolio.
///
/// # Errors
///
/// - `InfeasibleConstraints` if no portfolio satisfies the constraints
/// - `SingularCovariance` if max-Sharpe with short selling needs to invert a
///   singular covariance and no regularization is configured
/// - `ConvergenceFailure` if a solver hits its iteration cap
/// - `InvalidInput` for shape mismatches or invalid settings
pub fn optimize(
    moments: &MomentsEstimate,
    objective: &Objective,
    constraints: Option<&CompiledConstraints>,
    config: &OptimizerConfig,
) -> PortfolioResult<Portfolio> {
    let portfolio = match objective {
        Objective::RiskParity => {
            reject_constraints(constraints)?;
            risk_parity(moments, config)?
        }
        Objective::RiskBudget { budgets } => {
            reject_constraints(constraints)?;
            risk_budget(moments, Some(budgets), config)?
        }
        Objective::MaxSharpe => {
            solve_with(moments, constraints, config, mean_variance::max_sharpe)?
        }
        Objective::MinVariance => solve_with(moments, constraints, config, Setup::min_variance)?,
        Objective::MaxReturn => {
            solve_with(moments, constraints, config, mean_variance::max_return)?
        }
        Objective::Utility { risk_aversion } => solve_with(moments, constraints, config, |setup| {
            mean_variance::max_utility(setup, *risk_aversion)
        })?,
    };

    info!(
        objective = %objective,
        expected_return = portfolio.expected_return,
        volatility = portfolio.volatility,
        "portfolio optimized"
    );
    Ok(portfolio)
}

/// Minimum-variance portfolio.
pub fn min_variance(
    moments: &MomentsEstimate,
    constraints: Option<&CompiledConstraints>,
    config: &OptimizerConfig,
) -> PortfolioResult<Portfolio> {
    optimize(moments, &Objective::MinVariance, constraints, config)
}

/// Maximum-Sharpe (tangency) portfolio.
pub fn max_sharpe(
    moments: &MomentsEstimate,
    constraints: Option<&CompiledConstraints>,
    config: &OptimizerConfig,
) -> PortfolioResult<Portfolio> {
    optimize(moments, &Objective::MaxSharpe, constraints, config)
}

fn solve_with<'a, F>(
    moments: &'a MomentsEstimate,
    constraints: Option<&CompiledConstraints>,
    config: &'a OptimizerConfig,
    solve: F,
) -> PortfolioResult<Portfolio>
where
    F: FnOnce(&Setup<'a>) -> PortfolioResult<DVector<f64>>,
{
    let setup = Setup::new(moments, constraints, config)?;
    let weights = solve(&setup)?;
    Ok(setup.portfolio(&weights))
}

fn reject_constraints(constraints: Option<&CompiledConstraints>) -> PortfolioResult<()> {
    match constraints {
        Some(c) if !c.is_empty() => Err(PortfolioError::invalid_input(
            "risk budgeting does not accept linear constraints",
        )),
        _ => Ok(()),
    }
}

/// Validated inputs shared by the QP-based modes.
pub(crate) struct Setup<'a> {
    pub(crate) moments: &'a MomentsEstimate,
    pub(crate) config: &'a OptimizerConfig,
    /// Covariance with ridge regularization applied, if configured.
    pub(crate) cov: DMatrix<f64>,
    pub(crate) constraints: CompiledConstraints,
}

impl<'a> Setup<'a> {
    pub(crate) fn new(
        moments: &'a MomentsEstimate,
        constraints: Option<&CompiledConstraints>,
        config: &'a OptimizerConfig,
    ) -> PortfolioResult<Self> {
        config.validate_or_error()?;
        let n = moments.n_assets();

        let constraints = match constraints {
            Some(c) if c.num_assets() != n => {
                return Err(PortfolioError::invalid_input(format!(
                    "constraints cover {} assets, moments cover {n}",
                    c.num_assets()
                )))
            }
            Some(c) => c.clone(),
            None => CompiledConstraints::empty(n),
        };

        let cov = match config.covariance_regularization {
            CovarianceRegularization::Ridge { lambda } => ridge(moments.cov(), lambda)?,
            _ => moments.cov().clone(),
        };

        let setup = Self {
            moments,
            config,
            cov,
            constraints,
        };
        setup.presolve()?;
        Ok(setup)
    }

    pub(crate) fn n(&self) -> usize {
        self.moments.n_assets()
    }

    /// Rejects bound systems that are infeasible on their face.
    fn presolve(&self) -> PortfolioResult<()> {
        let assets = self.moments.assets();
        let mut bounds = self.constraints.asset_bounds();
        if !self.config.allow_short {
            for b in &mut bounds {
                b.0 = b.0.max(0.0);
            }
        }

        for (j, &(lo, hi)) in bounds.iter().enumerate() {
            if lo > hi + PRESOLVE_TOLERANCE {
                return Err(PortfolioError::infeasible(format!(
                    "asset '{}' has minimum {lo} above maximum {hi}",
                    assets[j]
                )));
            }
        }

        if bounds.iter().all(|b| b.0.is_finite()) {
            let min_total: f64 = bounds.iter().map(|b| b.0).sum();
            if min_total > 1.0 + PRESOLVE_TOLERANCE {
                return Err(PortfolioError::infeasible(format!(
                    "per-asset minimums sum to {min_total}, above 1"
                )));
            }
        }

        if bounds.iter().all(|b| b.1.is_finite()) {
            let max_total: f64 = bounds.iter().map(|b| b.1).sum();
            if max_total < 1.0 - PRESOLVE_TOLERANCE {
                return Err(PortfolioError::infeasible(format!(
                    "per-asset maximums sum to {max_total}, below 1"
                )));
            }
        }
        Ok(())
    }

    /// `min ½ wᵀPw + qᵀw` over the feasible region.
    pub(crate) fn program(&self, p: DMatrix<f64>, q: DVector<f64>) -> MathResult<QuadraticProgram> {
        let n = self.n();
        let mut qp = QuadraticProgram::new(p, q)?;
        qp.add_equality(DVector::from_element(n, 1.0), 1.0)?;
        if !self.config.allow_short {
            qp.add_variable_bounds(0.0, f64::INFINITY)?;
        }
        for r in 0..self.constraints.num_rows() {
            qp.add_greater_equal(self.constraints.a.row(r).transpose(), self.constraints.b[r])?;
        }
        Ok(qp)
    }

    pub(crate) fn solve(&self, qp: &QuadraticProgram) -> MathResult<QpSolution> {
        let solution = qp.solve(&self.config.qp)?;
        debug!(
            iterations = solution.iterations,
            polished = solution.polished,
            violation = qp.max_violation(&solution.x),
            "QP solved"
        );
        Ok(solution)
    }

    /// Global minimum-variance weights.
    pub(crate) fn min_variance(&self) -> PortfolioResult<DVector<f64>> {
        let qp = self.program(self.cov.clone(), DVector::zeros(self.n()))?;
        let solution = self.solve(&qp).map_err(infeasible_context)?;
        Ok(self.clean(solution.x))
    }

    /// Minimum-variance weights with `wᵀμ = target`.
    pub(crate) fn min_variance_at(&self, target: f64) -> PortfolioResult<DVector<f64>> {
        let mut qp = self.program(self.cov.clone(), DVector::zeros(self.n()))?;
        qp.add_equality(self.moments.mu().clone(), target)?;
        let solution = self.solve(&qp)?;
        Ok(self.clean(solution.x))
    }

    /// Extreme expected return over the feasible region; `None` if unbounded.
    pub(crate) fn extreme_return(&self, maximize: bool) -> PortfolioResult<Option<DVector<f64>>> {
        let sign = if maximize { -1.0 } else { 1.0 };
        let n = self.n();
        let qp = self.program(DMatrix::zeros(n, n), self.moments.mu() * sign)?;
        match self.solve(&qp) {
            Ok(solution) => Ok(Some(self.clean(solution.x))),
            Err(MathError::Unbounded { .. }) => Ok(None),
            Err(err) => Err(infeasible_context(err)),
        }
    }

    /// Removes solver noise below zero for long-only portfolios.
    pub(crate) fn clean(&self, mut weights: DVector<f64>) -> DVector<f64> {
        if !self.config.allow_short {
            weights.apply(|w| *w = w.max(0.0));
            let total = weights.sum();
            if total > 0.0 {
                weights /= total;
            }
        }
        weights
    }

    pub(crate) fn portfolio(&self, weights: &DVector<f64>) -> Portfolio {
        Portfolio::from_weights(self.moments, weights, self.config.risk_free_rate)
    }
}

/// Adds context to an infeasibility reported by the QP solver.
fn infeasible_context(err: MathError) -> PortfolioError {
    match err {
        MathError::Infeasible { .. } => PortfolioError::infeasible(
            "no fully invested portfolio satisfies every constraint",
        ),
        other => other.into(),
    }
}
