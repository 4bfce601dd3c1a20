//! Efficient-frontier sweep.

use nalgebra::DVector;
use tracing::debug;

use super::Setup;
use crate::analytics::maybe_parallel_map;
use crate::constraints::CompiledConstraints;
use crate::error::{ErrorKind, PortfolioResult};
use crate::types::{FrontierPoint, FrontierSample, FrontierSpan, MomentsEstimate, OptimizerConfig};

/// Return ranges narrower than this collapse to a single point.
const DEGENERATE_RANGE: f64 = 1e-12;

/// Sweeps `config.frontier.points` evenly spaced target returns and solves
/// the minimum-variance portfolio at each.
///
/// The sweep starts at the global minimum-variance portfolio
/// ([`FrontierSpan::Efficient`]) or at the minimum achievable return
/// ([`FrontierSpan::Full`]) and ends at the maximum achievable return. When
/// short selling makes the maximum unbounded the sweep ends at the largest
/// single-asset expected return.
///
/// The end points are the minimum-variance (or minimum-return) and
/// maximum-return portfolios themselves. An infeasible interior target is
/// omitted from the sample; any other error, including a solver that does
/// not converge, aborts the sweep.
pub fn efficient_frontier(
    moments: &MomentsEstimate,
    constraints: Option<&CompiledConstraints>,
    config: &OptimizerConfig,
) -> PortfolioResult<FrontierSample> {
    let setup = Setup::new(moments, constraints, config)?;
    let mu = moments.mu();

    let gmv = setup.min_variance()?;
    let top = setup.extreme_return(true)?;
    let high = top.as_ref().map_or_else(|| mu.max(), |w| mu.dot(w));

    let (low, bottom) = match config.frontier.span {
        FrontierSpan::Efficient => (mu.dot(&gmv), None),
        FrontierSpan::Full => {
            let bottom = setup.extreme_return(false)?;
            let low = bottom.as_ref().map_or_else(|| mu.min(), |w| mu.dot(w));
            (low, bottom)
        }
    };

    if high - low <= DEGENERATE_RANGE * high.abs().max(low.abs()).max(1.0) {
        debug!(low, high, "frontier collapses to a single point");
        let point = FrontierPoint {
            target_return: mu.dot(&gmv),
            portfolio: setup.portfolio(&gmv),
        };
        return Ok(FrontierSample {
            points: vec![point],
            requested: 1,
        });
    }

    let count = config.frontier.points;
    let last = count - 1;
    let targets: Vec<(usize, f64)> = (0..count)
        .map(|k| {
            let target = if k == last {
                high
            } else {
                low + (high - low) * k as f64 / last as f64
            };
            (k, target)
        })
        .collect();

    let solve_point = |&(k, target): &(usize, f64)| -> PortfolioResult<Option<FrontierPoint>> {
        let anchored = |w: &DVector<f64>| FrontierPoint {
            target_return: target,
            portfolio: setup.portfolio(w),
        };

        // The endpoints are the solutions that define the range.
        let endpoint = match k {
            0 => match config.frontier.span {
                FrontierSpan::Efficient => Some(&gmv),
                FrontierSpan::Full => bottom.as_ref(),
            },
            k if k == last => top.as_ref(),
            _ => None,
        };
        if let Some(w) = endpoint {
            return Ok(Some(anchored(w)));
        }

        match setup.min_variance_at(target) {
            Ok(w) => Ok(Some(anchored(&w))),
            Err(err) if err.kind() == ErrorKind::InfeasibleConstraints => {
                debug!(target, error = %err, "omitting frontier point");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    };

    let solved = maybe_parallel_map(&targets, config, solve_point);

    let mut points = Vec::with_capacity(count);
    for result in solved {
        if let Some(point) = result? {
            points.push(point);
        }
    }

    debug!(
        requested = count,
        solved = points.len(),
        low,
        high,
        "efficient frontier sampled"
    );

    Ok(FrontierSample {
        points,
        requested: count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::compile_constraints;
    use crate::types::{AssetClasses, Constraint};
    use approx::assert_relative_eq;
    use nalgebra::DMatrix;

    fn moments() -> MomentsEstimate {
        MomentsEstimate::new(
            vec!["A".into(), "B".into(), "C".into()],
            DVector::from_vec(vec![0.04, 0.07, 0.11]),
            DMatrix::from_row_slice(3, 3, &[0.01, 0.002, 0.0, 0.002, 0.04, 0.01, 0.0, 0.01, 0.09]),
        )
        .unwrap()
    }

    #[test]
    fn test_efficient_span() {
        let config = OptimizerConfig::sequential().with_frontier_points(10);
        let sample = efficient_frontier(&moments(), None, &config).unwrap();

        assert_eq!(sample.len(), 10);
        assert_eq!(sample.omitted(), 0);

        let first = &sample.points[0];
        let last = &sample.points[9];
        // Long-only maximum return is all-in on C.
        assert_relative_eq!(last.expected_return(), 0.11, epsilon = 1e-7);
        assert_relative_eq!(last.portfolio.weights[2], 1.0, epsilon = 1e-6);
        assert!(first.volatility() <= sample.points[1].volatility() + 1e-10);

        for point in &sample {
            assert_relative_eq!(point.portfolio.total_weight(), 1.0, epsilon = 1e-9);
            assert_relative_eq!(point.expected_return(), point.target_return, epsilon = 1e-7);
        }
    }

    #[test]
    fn test_full_span_starts_at_min_return() {
        let config = OptimizerConfig::sequential()
            .with_frontier_points(5)
            .with_frontier_span(FrontierSpan::Full);
        let sample = efficient_frontier(&moments(), None, &config).unwrap();

        assert_eq!(sample.len(), 5);
        assert_relative_eq!(sample.points[0].expected_return(), 0.04, epsilon = 1e-7);
    }

    #[test]
    fn test_constraints_narrow_the_range() {
        let m = moments();
        let cap = compile_constraints(&[Constraint::asset_max("C", 0.5)], m.assets(), &AssetClasses::new())
            .unwrap();
        let config = OptimizerConfig::sequential().with_frontier_points(6);
        let sample = efficient_frontier(&m, Some(&cap), &config).unwrap();

        // Max return: 0.5 in C, 0.5 in B.
        let top = sample.points.last().unwrap();
        assert_relative_eq!(top.expected_return(), 0.09, epsilon = 1e-7);
        assert_relative_eq!(top.portfolio.weights[2], 0.5, epsilon = 1e-9);
        for point in &sample {
            assert!(point.portfolio.weights[2] <= 0.5 + 1e-6);
        }
    }

    #[test]
    fn test_equal_returns_collapse() {
        let m = MomentsEstimate::new(
            vec!["A".into(), "B".into()],
            DVector::from_vec(vec![0.05, 0.05]),
            DMatrix::from_diagonal(&DVector::from_vec(vec![0.01, 0.04])),
        )
        .unwrap();
        let sample = efficient_frontier(&m, None, &OptimizerConfig::sequential()).unwrap();

        assert_eq!(sample.len(), 1);
        assert_relative_eq!(sample.points[0].portfolio.weights[0], 0.8, epsilon = 1e-7);
    }
}
