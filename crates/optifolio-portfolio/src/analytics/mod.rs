//! Portfolio analytics.
//!
//! This module provides post-solve diagnostics for weight vectors:
//! - Risk contributions (absolute and relative) and portfolio volatility
//! - Aggregated weights by asset class
//!
//! All functions are pure - they take weights and inputs explicitly and
//! return computed results. No caching, no I/O, no side effects.

mod allocation;
mod parallel;
mod risk;

pub use allocation::*;
pub use parallel::*;
pub use risk::*;
