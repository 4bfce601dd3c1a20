//! Mean-variance objectives solved through the QP solver.

use nalgebra::{DMatrix, DVector};
use optifolio_math::linear_algebra::{cholesky_solve, pseudo_inverse};
use optifolio_math::MathError;
use tracing::debug;

use super::Setup;
use crate::error::{PortfolioError, PortfolioResult};
use crate::types::CovarianceRegularization;

/// Homogenizing variable below which the max-Sharpe problem is degenerate.
const MIN_KAPPA: f64 = 1e-12;

/// Maximum-Sharpe weights.
///
/// Without constraints the tangency portfolio `Σ⁻¹(μ - r_f)`, normalized to
/// sum to 1, is used whenever it is admissible (short selling allowed, or all
/// weights non-negative). Otherwise, including a long-only problem with a
/// singular `Σ`, the ratio is maximized exactly through the homogenized QP
///
/// ```text
/// minimize    yᵀΣy
/// subject to  (μ - r_f)ᵀy = 1,  Σy = κ,  κ ≥ 0,  A·y ≥ B·κ,  y ≥ 0
/// ```
///
/// whose solution gives `w = y / κ`.
pub(crate) fn max_sharpe(setup: &Setup<'_>) -> PortfolioResult<DVector<f64>> {
    let excess = setup
        .moments
        .mu()
        .map(|m| m - setup.config.risk_free_rate);

    if !setup.config.allow_short && excess.max() <= 0.0 {
        return Err(PortfolioError::infeasible(
            "no asset has an expected return above the risk-free rate",
        ));
    }

    if setup.constraints.is_empty() {
        if let Some(weights) = tangency(setup, &excess)? {
            debug!("max Sharpe from closed-form tangency portfolio");
            return Ok(weights);
        }
    }

    homogenized(setup, &excess)
}

fn tangency(setup: &Setup<'_>, excess: &DVector<f64>) -> PortfolioResult<Option<DVector<f64>>> {
    let direction = match setup.config.covariance_regularization {
        CovarianceRegularization::PseudoInverse => pseudo_inverse(&setup.cov)? * excess,
        // setup.cov already carries the ridge term.
        CovarianceRegularization::None | CovarianceRegularization::Ridge { .. } => {
            match cholesky_solve(&setup.cov, excess) {
                Ok(direction) => direction,
                // Long-only problems fall through to the homogenized QP,
                // which never inverts Σ.
                Err(MathError::SingularMatrix) if !setup.config.allow_short => {
                    debug!("covariance is singular, skipping closed-form tangency");
                    return Ok(None);
                }
                Err(MathError::SingularMatrix) => {
                    return Err(PortfolioError::singular_covariance(
                        "with short selling the tangency portfolio needs Σ⁻¹; configure ridge or pseudo-inverse regularization",
                    ));
                }
                Err(other) => return Err(other.into()),
            }
        }
    };

    let total = direction.sum();
    let scale = direction.amax();
    if total <= scale * 1e-12 {
        if setup.config.allow_short {
            return Err(PortfolioError::infeasible(
                "no fully invested portfolio has a positive excess return",
            ));
        }
        return Ok(None);
    }

    let weights = direction / total;
    if setup.config.allow_short || weights.iter().all(|&w| w >= -1e-12) {
        Ok(Some(setup.clean(weights)))
    } else {
        Ok(None)
    }
}

fn homogenized(setup: &Setup<'_>, excess: &DVector<f64>) -> PortfolioResult<DVector<f64>> {
    let n = setup.n();
    let dim = n + 1;

    let mut p = DMatrix::zeros(dim, dim);
    p.view_mut((0, 0), (n, n)).copy_from(&setup.cov);

    let mut qp = optifolio_math::optimization::QuadraticProgram::new(p, DVector::zeros(dim))?;

    let mut return_row = DVector::zeros(dim);
    return_row.rows_mut(0, n).copy_from(excess);
    qp.add_equality(return_row, 1.0)?;

    let mut budget_row = DVector::from_element(dim, 1.0);
    budget_row[n] = -1.0;
    qp.add_equality(budget_row, 0.0)?;

    let mut kappa_row = DVector::zeros(dim);
    kappa_row[n] = 1.0;
    qp.add_greater_equal(kappa_row, 0.0)?;

    if !setup.config.allow_short {
        for j in 0..n {
            let mut row = DVector::zeros(dim);
            row[j] = 1.0;
            qp.add_greater_equal(row, 0.0)?;
        }
    }

    let constraints = &setup.constraints;
    for r in 0..constraints.num_rows() {
        let mut row = DVector::zeros(dim);
        row.rows_mut(0, n).copy_from(&constraints.a.row(r).transpose());
        row[n] = -constraints.b[r];
        qp.add_greater_equal(row, 0.0)?;
    }

    let solution = setup.solve(&qp).map_err(|err| match err {
        MathError::Infeasible { .. } => PortfolioError::infeasible(
            "no feasible portfolio has an expected return above the risk-free rate",
        ),
        MathError::Unbounded { .. } => {
            PortfolioError::invalid_input("the Sharpe ratio is unbounded over the feasible set")
        }
        other => other.into(),
    })?;

    let kappa = solution.x[n];
    if kappa <= MIN_KAPPA {
        return Err(PortfolioError::invalid_input(
            "the Sharpe ratio is unbounded over the feasible set",
        ));
    }

    let weights = solution.x.rows(0, n) / kappa;
    Ok(setup.clean(weights))
}

/// Maximum expected return.
pub(crate) fn max_return(setup: &Setup<'_>) -> PortfolioResult<DVector<f64>> {
    setup.extreme_return(true)?.ok_or_else(|| {
        PortfolioError::invalid_input(
            "expected return is unbounded; add asset bounds when short selling is allowed",
        )
    })
}

/// Maximum of `wᵀμ - λ·wᵀΣw`.
pub(crate) fn max_utility(setup: &Setup<'_>, risk_aversion: f64) -> PortfolioResult<DVector<f64>> {
    if !(risk_aversion.is_finite() && risk_aversion > 0.0) {
        return Err(PortfolioError::invalid_input(format!(
            "risk aversion must be positive, got {risk_aversion}"
        )));
    }

    let p = &setup.cov * (2.0 * risk_aversion);
    let q = -setup.moments.mu();
    let qp = setup.program(p, q)?;
    let solution = setup.solve(&qp).map_err(super::infeasible_context)?;
    Ok(setup.clean(solution.x))
}
