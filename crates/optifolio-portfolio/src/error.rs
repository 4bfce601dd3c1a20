//! Error types for portfolio construction.
//!
//! Every failure aborts the current solve; partial results are never
//! returned. [`PortfolioError::kind`] gives a stable, fieldless
//! classification that front ends map to exit or status codes.

use std::fmt;

use optifolio_math::MathError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for portfolio operations.
pub type PortfolioResult<T> = Result<T, PortfolioError>;

/// Errors that can occur during portfolio construction.
#[derive(Error, Debug, Clone)]
pub enum PortfolioError {
    /// Too few observations to estimate moments.
    #[error("Insufficient data: need at least {required} observations, got {actual}")]
    InsufficientData {
        /// Minimum number of observations.
        required: usize,
        /// Number of observations supplied.
        actual: usize,
    },

    /// A return (or other numeric input) is NaN or infinite.
    #[error("Non-finite input at {location}")]
    NonFiniteInput {
        /// Where the offending value was found.
        location: String,
    },

    /// A constraint references an asset outside the universe.
    #[error("Unknown asset '{asset}'")]
    UnknownAsset {
        /// The asset identifier.
        asset: String,
    },

    /// A constraint references a class absent from the class table.
    #[error("Unknown asset class '{class}'")]
    UnknownClass {
        /// The class identifier.
        class: String,
    },

    /// A class resolves to no asset of the universe.
    #[error("Asset class '{class}' contains no asset of the universe")]
    EmptyClass {
        /// The class identifier.
        class: String,
    },

    /// No portfolio satisfies the constraints.
    #[error("Infeasible constraints: {reason}")]
    InfeasibleConstraints {
        /// Why the feasible region is empty.
        reason: String,
    },

    /// The covariance matrix cannot be inverted where inversion is required.
    #[error("Singular covariance matrix: {reason}")]
    SingularCovariance {
        /// Context of the failure.
        reason: String,
    },

    /// An iterative solver hit its iteration cap.
    #[error("Solver did not converge after {iterations} iterations (residual: {residual:.2e})")]
    ConvergenceFailure {
        /// Iterations performed.
        iterations: u32,
        /// Final residual.
        residual: f64,
    },

    /// An argument has the wrong shape or an inadmissible value.
    #[error("Invalid input: {reason}")]
    InvalidInput {
        /// Description of the problem.
        reason: String,
    },
}

/// Fieldless classification of [`PortfolioError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// See [`PortfolioError::InsufficientData`].
    InsufficientData,
    /// See [`PortfolioError::NonFiniteInput`].
    NonFiniteInput,
    /// See [`PortfolioError::UnknownAsset`].
    UnknownAsset,
    /// See [`PortfolioError::UnknownClass`].
    UnknownClass,
    /// See [`PortfolioError::EmptyClass`].
    EmptyClass,
    /// See [`PortfolioError::InfeasibleConstraints`].
    InfeasibleConstraints,
    /// See [`PortfolioError::SingularCovariance`].
    SingularCovariance,
    /// See [`PortfolioError::ConvergenceFailure`].
    ConvergenceFailure,
    /// See [`PortfolioError::InvalidInput`].
    InvalidInput,
}

impl ErrorKind {
    /// Stable snake_case name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InsufficientData => "insufficient_data",
            Self::NonFiniteInput => "non_finite_input",
            Self::UnknownAsset => "unknown_asset",
            Self::UnknownClass => "unknown_class",
            Self::EmptyClass => "empty_class",
            Self::InfeasibleConstraints => "infeasible_constraints",
            Self::SingularCovariance => "singular_covariance",
            Self::ConvergenceFailure => "convergence_failure",
            Self::InvalidInput => "invalid_input",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl PortfolioError {
    /// Returns the kind of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InsufficientData { .. } => ErrorKind::InsufficientData,
            Self::NonFiniteInput { .. } => ErrorKind::NonFiniteInput,
            Self::UnknownAsset { .. } => ErrorKind::UnknownAsset,
            Self::UnknownClass { .. } => ErrorKind::UnknownClass,
            Self::EmptyClass { .. } => ErrorKind::EmptyClass,
            Self::InfeasibleConstraints { .. } => ErrorKind::InfeasibleConstraints,
            Self::SingularCovariance { .. } => ErrorKind::SingularCovariance,
            Self::ConvergenceFailure { .. } => ErrorKind::ConvergenceFailure,
            Self::InvalidInput { .. } => ErrorKind::InvalidInput,
        }
    }

    /// Create an insufficient data error.
    #[must_use]
    pub fn insufficient_data(required: usize, actual: usize) -> Self {
        Self::InsufficientData { required, actual }
    }

    /// Create a non-finite input error.
    #[must_use]
    pub fn non_finite(location: impl Into<String>) -> Self {
        Self::NonFiniteInput {
            location: location.into(),
        }
    }

    /// Create an unknown asset error.
    #[must_use]
    pub fn unknown_asset(asset: impl Into<String>) -> Self {
        Self::UnknownAsset {
            asset: asset.into(),
        }
    }

    /// Create an unknown class error.
    #[must_use]
    pub fn unknown_class(class: impl Into<String>) -> Self {
        Self::UnknownClass {
            class: class.into(),
        }
    }

    /// Create an empty class error.
    #[must_use]
    pub fn empty_class(class: impl Into<String>) -> Self {
        Self::EmptyClass {
            class: class.into(),
        }
    }

    /// Create an infeasible constraints error.
    #[must_use]
    pub fn infeasible(reason: impl Into<String>) -> Self {
        Self::InfeasibleConstraints {
            reason: reason.into(),
        }
    }

    /// Create a singular covariance error.
    #[must_use]
    pub fn singular_covariance(reason: impl Into<String>) -> Self {
        Self::SingularCovariance {
            reason: reason.into(),
        }
    }

    /// Create an invalid input error.
    #[must_use]
    pub fn invalid_input(reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            reason: reason.into(),
        }
    }
}

impl From<MathError> for PortfolioError {
    fn from(err: MathError) -> Self {
        match err {
            MathError::ConvergenceFailed {
                iterations,
                residual,
            } => Self::ConvergenceFailure {
                iterations,
                residual,
            },
            MathError::SingularMatrix => {
                Self::singular_covariance("matrix is not positive definite")
            }
            MathError::InsufficientData { required, actual } => {
                Self::InsufficientData { required, actual }
            }
            MathError::Infeasible { reason } => Self::InfeasibleConstraints { reason },
            MathError::Unbounded { reason } => Self::InvalidInput { reason },
            MathError::InvalidInput { reason } => Self::InvalidInput { reason },
            err @ MathError::DimensionMismatch { .. } => Self::invalid_input(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PortfolioError::unknown_asset("XYZ");
        assert!(err.to_string().contains("XYZ"));

        let err = PortfolioError::insufficient_data(2, 1);
        assert!(err.to_string().contains("at least 2"));

        let err = PortfolioError::infeasible("minimums exceed 1");
        assert!(err.to_string().contains("minimums exceed 1"));
    }

    #[test]
    fn test_kind_is_stable() {
        assert_eq!(
            PortfolioError::empty_class("Bonds").kind(),
            ErrorKind::EmptyClass
        );
        assert_eq!(ErrorKind::InfeasibleConstraints.as_str(), "infeasible_constraints");
        assert_eq!(
            serde_json::to_string(&ErrorKind::SingularCovariance).unwrap(),
            "\"singular_covariance\""
        );
    }

    #[test]
    fn test_from_math_error() {
        let err: PortfolioError = MathError::infeasible("crossed").into();
        assert_eq!(err.kind(), ErrorKind::InfeasibleConstraints);

        let err: PortfolioError = MathError::convergence_failed(10, 1e-3).into();
        assert_eq!(err.kind(), ErrorKind::ConvergenceFailure);

        let err: PortfolioError = MathError::SingularMatrix.into();
        assert_eq!(err.kind(), ErrorKind::SingularCovariance);

        let err: PortfolioError = MathError::DimensionMismatch {
            rows1: 2,
            cols1: 2,
            rows2: 3,
            cols2: 1,
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }
}
