//! CLI argument definitions.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::commands::{FrontierArgs, OptimizeArgs, RiskBudgetArgs, StatsArgs};

/// Optifolio - Portfolio construction from historical returns
#[derive(Parser)]
#[command(name = "optifolio")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output format
    #[arg(short, long, value_enum, default_value = "table", global = true)]
    pub format: OutputFormat,

    /// Estimation and optimizer settings (TOML, or JSON by extension)
    #[arg(short, long, global = true, env = "OPTIFOLIO_CONFIG")]
    pub config: Option<PathBuf>,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Log solver progress to stderr (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Estimate expected returns and covariance
    Stats(StatsArgs),

    /// Solve one portfolio (max Sharpe, min variance, max return, utility)
    Optimize(OptimizeArgs),

    /// Sample the efficient frontier
    Frontier(FrontierArgs),

    /// Risk parity or custom risk budgets
    RiskBudget(RiskBudgetArgs),
}

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table format
    #[default]
    Table,
    /// JSON format
    Json,
    /// CSV format
    Csv,
    /// Minimal output (bare values)
    Minimal,
}

/// Estimator selection on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum MethodArg {
    /// Sample mean and N-1 covariance
    Historical,
    /// Exponentially weighted moments
    Ewma,
    /// Ledoit-Wolf shrinkage covariance
    LedoitWolf,
}

/// Returns input shared by every command.
#[derive(Args, Debug, Clone)]
pub struct InputArgs {
    /// CSV of periodic returns (header: date,ASSET1,ASSET2,...)
    #[arg(short, long)]
    pub returns: PathBuf,

    /// Treat the file as prices and compute simple returns
    #[arg(long)]
    pub prices: bool,

    /// Moment estimator (overrides the config file)
    #[arg(short, long, value_enum)]
    pub method: Option<MethodArg>,

    /// EWMA decay factor
    #[arg(long, requires = "method")]
    pub decay: Option<f64>,
}

/// Constraint input shared by the mean-variance commands.
#[derive(Args, Debug, Clone, Default)]
pub struct ConstraintArgs {
    /// CSV of constraint rows (disabled,type,position,sign,weight)
    #[arg(long)]
    pub constraints: Option<PathBuf>,

    /// CSV mapping assets to classes (asset,class)
    #[arg(long)]
    pub classes: Option<PathBuf>,

    /// Allow negative weights
    #[arg(long)]
    pub allow_short: bool,
}
