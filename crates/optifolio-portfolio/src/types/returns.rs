//! Historical returns matrix.

use chrono::NaiveDate;
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::{PortfolioError, PortfolioResult};

/// Periodic returns: one row per period, one column per asset.
///
/// The matrix may contain missing values (NaN) as loaded; the estimators
/// reject them, so callers either clean the data with
/// [`drop_incomplete_rows`](Self::drop_incomplete_rows) or fail loudly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnsMatrix {
    assets: Vec<String>,
    dates: Option<Vec<NaiveDate>>,
    values: DMatrix<f64>,
}

impl ReturnsMatrix {
    /// Creates a returns matrix from asset identifiers and a `periods × assets`
    /// matrix.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if there are no assets, an identifier is
    /// repeated or the column count does not match.
    pub fn new(assets: Vec<String>, values: DMatrix<f64>) -> PortfolioResult<Self> {
        validate_assets(&assets)?;
        if values.ncols() != assets.len() {
            return Err(PortfolioError::invalid_input(format!(
                "returns have {} columns but {} assets were named",
                values.ncols(),
                assets.len()
            )));
        }

        Ok(Self {
            assets,
            dates: None,
            values,
        })
    }

    /// Creates a returns matrix from row vectors.
    pub fn from_rows(assets: Vec<String>, rows: &[Vec<f64>]) -> PortfolioResult<Self> {
        let m = assets.len();
        if let Some((i, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != m) {
            return Err(PortfolioError::invalid_input(format!(
                "row {i} has {} values, expected {m}",
                row.len()
            )));
        }

        let values = DMatrix::from_fn(rows.len(), m, |i, j| rows[i][j]);
        Self::new(assets, values)
    }

    /// Computes simple returns `p_t / p_{t-1} - 1` from a price matrix and
    /// drops every period with a missing or non-finite return.
    ///
    /// A missing price is not forward-filled: both returns that touch it are
    /// undefined, so the periods on either side of the gap are dropped
    /// rather than one return spanning the gap.
    ///
    /// `dates`, when given, label the price rows; each return keeps the date
    /// of the later price.
    pub fn from_prices(
        assets: Vec<String>,
        dates: Option<Vec<NaiveDate>>,
        prices: &DMatrix<f64>,
    ) -> PortfolioResult<Self> {
        if let Some(d) = &dates {
            if d.len() != prices.nrows() {
                return Err(PortfolioError::invalid_input(format!(
                    "{} dates for {} price rows",
                    d.len(),
                    prices.nrows()
                )));
            }
        }

        let periods = prices.nrows().saturating_sub(1);
        let values = DMatrix::from_fn(periods, prices.ncols(), |t, j| {
            let previous = prices[(t, j)];
            let current = prices[(t + 1, j)];
            if previous.is_finite() && current.is_finite() && previous != 0.0 {
                current / previous - 1.0
            } else {
                f64::NAN
            }
        });

        let mut returns = Self::new(assets, values)?;
        if let Some(d) = dates {
            returns.dates = Some(d.into_iter().skip(1).collect());
        }
        Ok(returns.drop_incomplete_rows())
    }

    /// Attaches period dates.
    pub fn with_dates(mut self, dates: Vec<NaiveDate>) -> PortfolioResult<Self> {
        if dates.len() != self.values.nrows() {
            return Err(PortfolioError::invalid_input(format!(
                "{} dates for {} periods",
                dates.len(),
                self.values.nrows()
            )));
        }
        self.dates = Some(dates);
        Ok(self)
    }

    /// Returns a copy without the periods that contain a NaN or infinite
    /// value.
    #[must_use]
    pub fn drop_incomplete_rows(&self) -> Self {
        let keep: Vec<usize> = (0..self.values.nrows())
            .filter(|&t| self.values.row(t).iter().all(|v| v.is_finite()))
            .collect();

        let values = DMatrix::from_fn(keep.len(), self.values.ncols(), |i, j| {
            self.values[(keep[i], j)]
        });
        let dates = self
            .dates
            .as_ref()
            .map(|d| keep.iter().map(|&t| d[t]).collect());

        Self {
            assets: self.assets.clone(),
            dates,
            values,
        }
    }

    /// Asset identifiers in column order.
    pub fn assets(&self) -> &[String] {
        &self.assets
    }

    /// Period dates, if known.
    pub fn dates(&self) -> Option<&[NaiveDate]> {
        self.dates.as_deref()
    }

    /// The `periods × assets` matrix.
    pub fn values(&self) -> &DMatrix<f64> {
        &self.values
    }

    /// Number of periods.
    pub fn n_periods(&self) -> usize {
        self.values.nrows()
    }

    /// Number of assets.
    pub fn n_assets(&self) -> usize {
        self.assets.len()
    }

    /// Column index of an asset.
    pub fn asset_index(&self, asset: &str) -> Option<usize> {
        self.assets.iter().position(|a| a == asset)
    }
}

fn validate_assets(assets: &[String]) -> PortfolioResult<()> {
    if assets.is_empty() {
        return Err(PortfolioError::invalid_input("asset universe is empty"));
    }

    let mut seen = HashSet::with_capacity(assets.len());
    for asset in assets {
        if !seen.insert(asset.as_str()) {
            return Err(PortfolioError::invalid_input(format!(
                "asset '{asset}' appears more than once"
            )));
        }
    }
    Ok(())
}
