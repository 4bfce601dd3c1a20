//! Constrained optimization.
//!
//! The portfolio optimizers reduce every mean-variance problem to a convex
//! quadratic program (or a linear program, its `P = 0` special case) and
//! hand it to [`QuadraticProgram::solve`].

mod qp;

pub use qp::{QpSettings, QpSolution, QuadraticProgram};
