//! Optifolio CLI - Command-line interface for portfolio construction.
//!
//! # Usage
//!
//! ```bash
//! # Expected returns and covariance
//! optifolio stats --returns returns.csv --method ledoit-wolf
//!
//! # Maximum Sharpe portfolio under a constraint table
//! optifolio optimize --returns returns.csv --constraints bounds.csv --classes classes.csv
//!
//! # Efficient frontier as CSV
//! optifolio --format csv frontier --prices --returns prices.csv --points 25
//!
//! # Risk parity
//! optifolio risk-budget --returns returns.csv
//! ```
//!
//! Exit codes: 0 success, 2 usage or input error, 10-40 one per engine error
//! kind (see [`error::kind_code`]), 1 anything else.

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod cli;
mod commands;
mod error;
mod input;
mod output;

use cli::{Cli, Commands};
use commands::Context;
use input::FileConfig;

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "optifolio_portfolio=debug,optifolio_math=debug,optifolio_cli=debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    // stdout carries the results
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let ctx = Context {
        format: cli.format,
        quiet: cli.quiet,
        config: FileConfig::load(cli.config.as_deref())?,
    };

    match cli.command {
        Commands::Stats(args) => commands::stats::execute(args, &ctx)?,
        Commands::Optimize(args) => commands::optimize::execute(args, &ctx)?,
        Commands::Frontier(args) => commands::frontier::execute(args, &ctx)?,
        Commands::RiskBudget(args) => commands::risk_budget::execute(args, &ctx)?,
    }

    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            output::print_error(&format!("{err:#}"));
            ExitCode::from(error::exit_code(&err))
        }
    }
}
