//! # Optifolio Portfolio
//!
//! Mean-variance and risk-budget portfolio construction.
//!
//! This crate turns a matrix of historical asset returns into portfolio
//! weights. Three components cooperate:
//!
//! - **Statistics Estimator** ([`estimation`]): returns → expected returns
//!   and covariance
//! - **Constraint Compiler** ([`constraints`]): asset, class and uniform
//!   bounds → `A·w ≥ B`
//! - **Optimizer** ([`optimizer`]): moments (+ constraints) → weights or an
//!   efficient frontier
//!
//! ## Design Philosophy
//!
//! - **Pure functions**: Every call is self-contained; nothing is cached
//!   between calls and no input is mutated
//! - **Tagged constraints**: Bounds are a closed enum, not free-form rows
//! - **Explicit failure**: Infeasible constraints, singular covariances and
//!   solver non-convergence are distinct error kinds; partial results are
//!   never returned
//! - **Config-driven parallelism**: Optional rayon support for frontier
//!   sweeps with threshold-based switching
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use optifolio_portfolio::prelude::*;
//!
//! let returns = ReturnsMatrix::from_rows(assets, &rows)?;
//! let moments = estimate(&returns, &EstimationMethod::Historical)?;
//!
//! let classes = AssetClasses::from_pairs([("SPY", "Equity"), ("TLT", "Bonds")])?;
//! let constraints = compile_constraints(
//!     &[Constraint::class_min("Equity", 0.4), Constraint::all_assets_max(0.6)],
//!     moments.assets(),
//!     &classes,
//! )?;
//!
//! let config = OptimizerConfig::default();
//! let tangency = optimize(&moments, &Objective::MaxSharpe, Some(&constraints), &config)?;
//! let frontier = efficient_frontier(&moments, Some(&constraints), &config)?;
//! let parity = risk_parity(&moments, &config)?;
//! ```
//!
//! ## Module Overview
//!
//! - [`analytics`] - Risk contributions and class aggregation
//! - [`constraints`] - Constraint compilation
//! - [`estimation`] - Moment estimation
//! - [`optimizer`] - Optimizer modes, frontier sweep, risk budgeting
//! - [`types`] - Core types (ReturnsMatrix, MomentsEstimate, Constraint, Portfolio, Config)
//!
//! ## Feature Flags
//!
//! - `parallel`: Enable rayon-based parallel solving of frontier points

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![allow(clippy::module_name_repetitions)]

// Module declarations
pub mod analytics;
pub mod constraints;
pub mod error;
pub mod estimation;
pub mod optimizer;
pub mod types;

// Re-export error types at crate root
pub use error::{ErrorKind, PortfolioError, PortfolioResult};

// Re-export main types
pub use types::{
    // Constraints
    AssetClasses,
    Constraint,
    ConstraintRow,
    // Config
    CovarianceRegularization,
    EstimationMethod,
    // Outputs
    FrontierPoint,
    FrontierSample,
    FrontierSettings,
    FrontierSpan,
    // Inputs
    MomentsEstimate,
    OptimizerConfig,
    Portfolio,
    Relation,
    ReturnsMatrix,
    RiskBudgetSettings,
    Validate,
    ValidationError,
};

// Re-export the engine functions
pub use analytics::{class_weights, maybe_parallel_map, risk_contributions, RiskContributions};
pub use constraints::{compile_constraints, CompiledConstraints};
pub use estimation::{estimate, ledoit_wolf, ShrinkageEstimate};
pub use optimizer::{
    efficient_frontier, max_sharpe, min_variance, optimize, risk_budget, risk_parity, Objective,
};

/// Prelude module for convenient imports.
pub mod prelude {
    // Errors
    pub use crate::error::{ErrorKind, PortfolioError, PortfolioResult};

    // Types
    pub use crate::types::{
        AssetClasses, Constraint, ConstraintRow, CovarianceRegularization, EstimationMethod,
        FrontierPoint, FrontierSample, FrontierSpan, MomentsEstimate, OptimizerConfig, Portfolio,
        Relation, ReturnsMatrix, Validate,
    };

    // Engine
    pub use crate::analytics::{class_weights, risk_contributions, RiskContributions};
    pub use crate::constraints::{compile_constraints, CompiledConstraints};
    pub use crate::estimation::estimate;
    pub use crate::optimizer::{
        efficient_frontier, max_sharpe, min_variance, optimize, risk_budget, risk_parity,
        Objective,
    };

    // Solver settings from the math crate
    pub use optifolio_math::optimization::QpSettings;
}
