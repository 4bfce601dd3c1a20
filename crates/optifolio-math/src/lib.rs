//! # Optifolio Math
//!
//! Numerical kernels for the Optifolio portfolio construction library.
//!
//! This crate provides:
//!
//! - **Linear Algebra**: Symmetric positive-definite solves, pseudo-inverses,
//!   ridge regularization and singularity detection
//! - **Optimization**: A convex quadratic programming solver (ADMM with
//!   equilibration, infeasibility detection and active-set polishing, backed
//!   by an interior-point solve when ADMM stalls)
//!
//! ## Design Philosophy
//!
//! - **Tight at the boundary**: A successful polish puts active constraints
//!   at machine precision; when the polish is rejected the returned point
//!   only meets the solver tolerance (about `1e-9` on each bound)
//! - **Unit-free**: Scaling makes daily and annualized covariances behave the
//!   same way
//! - **Typed failures**: Infeasible and unbounded problems are reported as
//!   distinct errors rather than as a failed iteration count

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::similar_names)]
#![allow(clippy::many_single_char_names)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::needless_range_loop)]
#![allow(clippy::unreadable_literal)]
#![allow(clippy::float_cmp)]

pub mod error;
pub mod linear_algebra;
pub mod optimization;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::error::{MathError, MathResult};
    pub use crate::linear_algebra::{
        cholesky_solve, is_singular_symmetric, pseudo_inverse, ridge, symmetrize,
    };
    pub use crate::optimization::{QpSettings, QpSolution, QuadraticProgram};
}

pub use error::{MathError, MathResult};
