//! CLI command implementations.

pub mod frontier;
pub mod optimize;
pub mod risk_budget;
pub mod stats;

// Re-export submodules for convenience
pub use frontier::FrontierArgs;
pub use optimize::OptimizeArgs;
pub use risk_budget::RiskBudgetArgs;
pub use stats::StatsArgs;

use anyhow::{Context as _, Result};
use optifolio_portfolio::{
    compile_constraints, estimate, AssetClasses, CompiledConstraints, EstimationMethod,
    MomentsEstimate, OptimizerConfig,
};

use crate::cli::{ConstraintArgs, InputArgs, OutputFormat};
use crate::error::CliError;
use crate::input::{read_classes, read_constraints, read_optional, read_returns, FileConfig};

/// Settings shared by every command.
#[derive(Debug, Clone)]
pub struct Context {
    /// Output format.
    pub format: OutputFormat,
    /// Suppress headers and warnings.
    pub quiet: bool,
    /// Parsed `--config` file (defaults when absent).
    pub config: FileConfig,
}

impl Context {
    /// Prints a section header unless quiet or machine-readable.
    pub fn header(&self, title: &str) {
        if !self.quiet && self.format == OutputFormat::Table {
            crate::output::print_header(title);
        }
    }

    /// Prints a warning unless quiet.
    pub fn warn(&self, message: &str) {
        if !self.quiet {
            crate::output::print_warning(message);
        }
    }
}

/// Reads the returns file and estimates moments.
pub fn load_moments(input: &InputArgs, ctx: &Context) -> Result<(MomentsEstimate, EstimationMethod, usize)> {
    let method = ctx.config.estimation_for(input)?;
    let returns = read_returns(&input.returns, input.prices)?;
    let periods = returns.n_periods();
    let moments = estimate(&returns, &method)
        .with_context(|| format!("estimating moments from {}", input.returns.display()))?;
    Ok((moments, method, periods))
}

/// Reads the class table (empty when absent).
pub fn load_classes(args: &ConstraintArgs) -> Result<AssetClasses> {
    Ok(read_optional(args.classes.as_ref(), read_classes)?.unwrap_or_default())
}

/// Reads and compiles the constraint table, if any.
pub fn load_constraints(
    args: &ConstraintArgs,
    moments: &MomentsEstimate,
    classes: &AssetClasses,
) -> Result<Option<CompiledConstraints>> {
    let Some(constraints) = read_optional(args.constraints.as_ref(), read_constraints)? else {
        return Ok(None);
    };
    let compiled = compile_constraints(&constraints, moments.assets(), classes)
        .context("compiling constraints")?;
    Ok(Some(compiled))
}

/// Optimizer settings from the config file with command-line overrides.
pub fn optimizer_config(
    ctx: &Context,
    risk_free: Option<f64>,
    allow_short: bool,
) -> Result<OptimizerConfig> {
    let mut config = ctx.config.optimizer.clone();
    if let Some(rate) = risk_free {
        if !rate.is_finite() {
            return Err(CliError::InvalidArgument(format!("--risk-free must be finite, got {rate}")).into());
        }
        config = config.with_risk_free_rate(rate);
    }
    if allow_short {
        config = config.with_allow_short(true);
    }
    Ok(config)
}
