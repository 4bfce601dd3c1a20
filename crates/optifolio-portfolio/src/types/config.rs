//! Configuration for estimation and optimization.

use std::fmt;

use optifolio_math::optimization::QpSettings;
use serde::{Deserialize, Serialize};

use crate::error::{PortfolioError, PortfolioResult};

/// How expected returns and covariances are estimated from history.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum EstimationMethod {
    /// Sample mean and unbiased sample covariance.
    #[default]
    Historical,
    /// Exponentially weighted moments; observation `t` of `N` gets weight
    /// proportional to `decay^(N-1-t)`.
    Ewma {
        /// Decay factor in (0, 1].
        decay: f64,
    },
    /// Sample mean with Ledoit-Wolf shrinkage of the covariance towards a
    /// scaled identity.
    LedoitWolf,
}

impl EstimationMethod {
    /// Short name used in reports.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Historical => "historical",
            Self::Ewma { .. } => "ewma",
            Self::LedoitWolf => "ledoit-wolf",
        }
    }
}

impl fmt::Display for EstimationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ewma { decay } => write!(f, "ewma(decay={decay})"),
            other => f.write_str(other.name()),
        }
    }
}

/// Treatment of a covariance matrix that cannot be inverted.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum CovarianceRegularization {
    /// Use the covariance as estimated; inversion of a singular matrix fails
    /// with `SingularCovariance`.
    #[default]
    None,
    /// Add `lambda·I` to the covariance before every solve.
    Ridge {
        /// Ridge penalty.
        lambda: f64,
    },
    /// Use the Moore-Penrose pseudo-inverse where an inverse is required.
    PseudoInverse,
}

/// Range of target returns covered by a frontier sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrontierSpan {
    /// From the global minimum-variance portfolio to the maximum return.
    #[default]
    Efficient,
    /// From the minimum to the maximum achievable return.
    Full,
}

/// Frontier sweep settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrontierSettings {
    /// Number of evenly spaced target returns.
    pub points: usize,
    /// Range of targets.
    pub span: FrontierSpan,
}

impl Default for FrontierSettings {
    fn default() -> Self {
        Self {
            points: 50,
            span: FrontierSpan::Efficient,
        }
    }
}

/// Risk-budget solver settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskBudgetSettings {
    /// Largest allowed spread between realized and target risk
    /// contributions, in volatility units.
    pub tolerance: f64,
    /// Newton iteration cap.
    pub max_iterations: u32,
}

impl Default for RiskBudgetSettings {
    fn default() -> Self {
        Self {
            tolerance: 1e-8,
            max_iterations: 200,
        }
    }
}

/// Configuration shared by every optimizer mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Risk-free rate for Sharpe ratios, in the units of the returns.
    pub risk_free_rate: f64,

    /// Drop the `w ≥ 0` constraint.
    pub allow_short: bool,

    /// Singular-covariance policy.
    pub covariance_regularization: CovarianceRegularization,

    /// Quadratic programming solver settings.
    pub qp: QpSettings,

    /// Risk-budget solver settings.
    pub risk_budget: RiskBudgetSettings,

    /// Frontier sweep settings.
    pub frontier: FrontierSettings,

    /// Solve frontier points in parallel (requires the 'parallel' feature).
    pub parallel: bool,

    /// Minimum number of frontier points to trigger parallel solving.
    pub parallel_threshold: usize,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            risk_free_rate: 0.0,
            allow_short: false,
            covariance_regularization: CovarianceRegularization::None,
            qp: QpSettings::default(),
            risk_budget: RiskBudgetSettings::default(),
            frontier: FrontierSettings::default(),
            parallel: true,
            parallel_threshold: 8,
        }
    }
}

impl OptimizerConfig {
    /// Creates a new config with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a config that always solves sequentially.
    #[must_use]
    pub fn sequential() -> Self {
        Self {
            parallel: false,
            ..Self::default()
        }
    }

    /// Sets the risk-free rate.
    #[must_use]
    pub fn with_risk_free_rate(mut self, rate: f64) -> Self {
        self.risk_free_rate = rate;
        self
    }

    /// Allows or forbids short positions.
    #[must_use]
    pub fn with_allow_short(mut self, allow: bool) -> Self {
        self.allow_short = allow;
        self
    }

    /// Sets the singular-covariance policy.
    #[must_use]
    pub fn with_regularization(mut self, regularization: CovarianceRegularization) -> Self {
        self.covariance_regularization = regularization;
        self
    }

    /// Sets the QP settings.
    #[must_use]
    pub fn with_qp_settings(mut self, qp: QpSettings) -> Self {
        self.qp = qp;
        self
    }

    /// Sets the risk-budget tolerance.
    #[must_use]
    pub fn with_risk_budget_tolerance(mut self, tolerance: f64) -> Self {
        self.risk_budget.tolerance = tolerance;
        self
    }

    /// Sets the risk-budget iteration cap.
    #[must_use]
    pub fn with_risk_budget_max_iterations(mut self, max_iterations: u32) -> Self {
        self.risk_budget.max_iterations = max_iterations;
        self
    }

    /// Sets the number of frontier points.
    #[must_use]
    pub fn with_frontier_points(mut self, points: usize) -> Self {
        self.frontier.points = points;
        self
    }

    /// Sets the frontier span.
    #[must_use]
    pub fn with_frontier_span(mut self, span: FrontierSpan) -> Self {
        self.frontier.span = span;
        self
    }

    /// Sets whether to use parallel processing.
    #[must_use]
    pub fn with_parallel(mut self, enabled: bool) -> Self {
        self.parallel = enabled;
        self
    }

    /// Sets the threshold for parallel processing.
    #[must_use]
    pub fn with_threshold(mut self, threshold: usize) -> Self {
        self.parallel_threshold = threshold;
        self
    }

    /// Returns true if parallel processing should be used for the given count.
    #[must_use]
    pub fn should_parallelize(&self, count: usize) -> bool {
        cfg!(feature = "parallel") && self.parallel && count >= self.parallel_threshold
    }
}

/// A single validation error.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    /// Field that failed validation.
    pub field: String,
    /// Validation error message.
    pub message: String,
}

impl ValidationError {
    /// Creates a new validation error.
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Trait for validatable configurations.
pub trait Validate {
    /// Returns every validation error, or an empty vector if valid.
    fn validate(&self) -> Vec<ValidationError>;

    /// Returns true if the configuration is valid.
    fn is_valid(&self) -> bool {
        self.validate().is_empty()
    }

    /// Validates and folds all errors into one `InvalidInput`.
    fn validate_or_error(&self) -> PortfolioResult<()> {
        let errors = self.validate();
        if errors.is_empty() {
            return Ok(());
        }

        let joined = errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        Err(PortfolioError::invalid_input(joined))
    }
}

impl Validate for EstimationMethod {
    fn validate(&self) -> Vec<ValidationError> {
        match self {
            Self::Ewma { decay } if !(*decay > 0.0 && *decay <= 1.0) => vec![ValidationError::new(
                "estimation.decay",
                format!("must lie in (0, 1], got {decay}"),
            )],
            _ => Vec::new(),
        }
    }
}

impl Validate for OptimizerConfig {
    fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if !self.risk_free_rate.is_finite() {
            errors.push(ValidationError::new("risk_free_rate", "must be finite"));
        }
        if let CovarianceRegularization::Ridge { lambda } = self.covariance_regularization {
            if !(lambda.is_finite() && lambda >= 0.0) {
                errors.push(ValidationError::new(
                    "covariance_regularization.lambda",
                    format!("must be a non-negative number, got {lambda}"),
                ));
            }
        }
        if let Err(err) = self.qp.validate() {
            errors.push(ValidationError::new("qp", err.to_string()));
        }
        if !(self.risk_budget.tolerance.is_finite() && self.risk_budget.tolerance > 0.0) {
            errors.push(ValidationError::new("risk_budget.tolerance", "must be positive"));
        }
        if self.risk_budget.max_iterations == 0 {
            errors.push(ValidationError::new(
                "risk_budget.max_iterations",
                "must be at least 1",
            ));
        }
        if self.frontier.points < 2 {
            errors.push(ValidationError::new("frontier.points", "must be at least 2"));
        }

        errors
    }
}
