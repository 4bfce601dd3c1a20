//! Compilation of declarative constraints into `A·w ≥ B`.
//!
//! Sign convention: every row is stored as a `≥` inequality. A `≤ bound`
//! constraint with coefficient row `a` is stored as `-a·w ≥ -bound`.
//!
//! | Constraint | Rows |
//! |------------|------|
//! | single asset | one row, `±1` in the asset's column |
//! | class bound | one row, `±1` in every column of the class |
//! | uniform bound | one row per asset, as if each were a single-asset bound |

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::error::{PortfolioError, PortfolioResult};
use crate::types::{AssetClasses, Constraint, Relation};

/// Linear inequality system `A·w ≥ B` over an asset universe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledConstraints {
    /// Coefficients, `rows × assets`.
    pub a: DMatrix<f64>,
    /// Right-hand sides.
    pub b: DVector<f64>,
}

impl CompiledConstraints {
    /// A system with no rows over `n_assets` assets.
    #[must_use]
    pub fn empty(n_assets: usize) -> Self {
        Self {
            a: DMatrix::zeros(0, n_assets),
            b: DVector::zeros(0),
        }
    }

    /// Number of inequality rows.
    pub fn num_rows(&self) -> usize {
        self.a.nrows()
    }

    /// Number of assets (columns).
    pub fn num_assets(&self) -> usize {
        self.a.ncols()
    }

    /// True if there are no rows.
    pub fn is_empty(&self) -> bool {
        self.a.nrows() == 0
    }

    /// Largest violation `max(B - A·w, 0)`.
    pub fn max_violation(&self, weights: &DVector<f64>) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        (&self.b - &self.a * weights).max().max(0.0)
    }

    /// True if every row holds within `tolerance`.
    pub fn is_satisfied_by(&self, weights: &DVector<f64>, tolerance: f64) -> bool {
        self.max_violation(weights) <= tolerance
    }

    /// Per-asset `[lower, upper]` bounds implied by rows that touch a single
    /// asset.
    ///
    /// Rows spanning several assets are ignored, so the bounds are a relaxation
    /// of the full system.
    pub fn asset_bounds(&self) -> Vec<(f64, f64)> {
        let mut bounds = vec![(f64::NEG_INFINITY, f64::INFINITY); self.num_assets()];

        for r in 0..self.num_rows() {
            let row = self.a.row(r);
            let mut nonzero = row.iter().enumerate().filter(|(_, c)| **c != 0.0);
            let (Some((j, &c)), None) = (nonzero.next(), nonzero.next()) else {
                continue;
            };

            let value = self.b[r] / c;
            if c > 0.0 {
                bounds[j].0 = bounds[j].0.max(value);
            } else {
                bounds[j].1 = bounds[j].1.min(value);
            }
        }
        bounds
    }
}

/// Compiles `constraints` over the asset universe `assets`.
///
/// # Errors
///
/// - `UnknownAsset` if a single-asset constraint names an asset outside
///   `assets`
/// - `UnknownClass` if a class constraint names a class absent from
///   `classes`
/// - `EmptyClass` if a class has no member in `assets`
/// - `NonFiniteInput` if a bound is NaN or infinite
/// - `InvalidInput` if `assets` is empty
pub fn compile_constraints(
    constraints: &[Constraint],
    assets: &[String],
    classes: &AssetClasses,
) -> PortfolioResult<CompiledConstraints> {
    let n = assets.len();
    if n == 0 {
        return Err(PortfolioError::invalid_input("asset universe is empty"));
    }

    let mut rows: Vec<DVector<f64>> = Vec::new();
    let mut rhs: Vec<f64> = Vec::new();

    let mut push = |columns: &[usize], relation: Relation, bound: f64| {
        let sign = match relation {
            Relation::GreaterEqual => 1.0,
            Relation::LessEqual => -1.0,
        };
        let mut row = DVector::zeros(n);
        for &j in columns {
            row[j] = sign;
        }
        rows.push(row);
        rhs.push(sign * bound);
    };

    for constraint in constraints {
        if !constraint.bound().is_finite() {
            return Err(PortfolioError::non_finite(format!(
                "bound of constraint '{constraint}'"
            )));
        }

        match constraint {
            Constraint::SingleAsset {
                asset,
                relation,
                bound,
            } => {
                let j = assets
                    .iter()
                    .position(|a| a == asset)
                    .ok_or_else(|| PortfolioError::unknown_asset(asset.as_str()))?;
                push(&[j], *relation, *bound);
            }
            Constraint::ClassBound {
                class,
                relation,
                bound,
            } => {
                if !classes.contains_class(class) {
                    return Err(PortfolioError::unknown_class(class.as_str()));
                }
                let members = classes.members(class, assets);
                if members.is_empty() {
                    return Err(PortfolioError::empty_class(class.as_str()));
                }
                push(&members, *relation, *bound);
            }
            Constraint::UniformBound { relation, bound } => {
                for j in 0..n {
                    push(&[j], *relation, *bound);
                }
            }
        }
    }

    let a = DMatrix::from_fn(rows.len(), n, |i, j| rows[i][j]);
    let b = DVector::from_vec(rhs);
    Ok(CompiledConstraints { a, b })
}
