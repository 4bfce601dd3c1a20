//! Domain types for portfolio construction.
//!
//! - [`ReturnsMatrix`]: Periodic returns, one column per asset
//! - [`MomentsEstimate`]: Expected returns and covariance
//! - [`Constraint`], [`ConstraintRow`], [`AssetClasses`]: Declarative bounds
//! - [`Portfolio`], [`FrontierSample`]: Optimizer outputs
//! - [`OptimizerConfig`], [`EstimationMethod`]: Configuration

mod config;
mod constraint;
mod moments;
mod portfolio;
mod returns;

pub use config::{
    CovarianceRegularization, EstimationMethod, FrontierSettings, FrontierSpan,
    OptimizerConfig, RiskBudgetSettings, Validate, ValidationError,
};
pub use constraint::{AssetClasses, Constraint, ConstraintRow, Relation};
pub use moments::MomentsEstimate;
pub use portfolio::{FrontierPoint, FrontierSample, Portfolio};
pub use returns::ReturnsMatrix;
