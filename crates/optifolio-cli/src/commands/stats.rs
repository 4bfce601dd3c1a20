//! Stats command implementation.
//!
//! Prints the estimated expected returns, volatilities and covariance matrix.

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use crate::cli::{InputArgs, OutputFormat};
use crate::commands::{load_moments, Context};
use crate::output::{print_json, Grid};

/// Arguments for the stats command.
#[derive(Args, Debug)]
pub struct StatsArgs {
    #[command(flatten)]
    pub input: InputArgs,
}

#[derive(Debug, Serialize)]
struct StatsReport<'a> {
    method: String,
    periods: usize,
    assets: &'a [String],
    expected_returns: Vec<f64>,
    volatilities: Vec<f64>,
    covariance: Vec<Vec<f64>>,
}

/// Execute the stats command.
pub fn execute(args: StatsArgs, ctx: &Context) -> Result<()> {
    let (moments, method, periods) = load_moments(&args.input, ctx)?;
    let n = moments.n_assets();
    let cov = moments.cov();

    match ctx.format {
        OutputFormat::Json => {
            let report = StatsReport {
                method: method.to_string(),
                periods,
                assets: moments.assets(),
                expected_returns: moments.mu().iter().copied().collect(),
                volatilities: moments.volatilities().iter().copied().collect(),
                covariance: (0..n).map(|i| cov.row(i).iter().copied().collect()).collect(),
            };
            print_json(&report)?;
        }
        OutputFormat::Minimal => {
            let mu: Vec<String> = moments.mu().iter().map(|m| format!("{m:.8}")).collect();
            println!("{}", mu.join(","));
        }
        format => {
            ctx.header(&format!("Moments ({method}, {periods} periods)"));

            let mut header = vec!["Asset".to_string(), "Mean".to_string(), "Volatility".to_string()];
            header.extend(moments.assets().iter().cloned());
            let mut grid = Grid::new(header);

            let vols = moments.volatilities();
            for (i, asset) in moments.assets().iter().enumerate() {
                let mut row = vec![
                    asset.clone(),
                    format!("{:.8}", moments.mu()[i]),
                    format!("{:.8}", vols[i]),
                ];
                row.extend((0..n).map(|j| format!("{:.8e}", cov[(i, j)])));
                grid.push(row);
            }
            grid.print(format)?;
        }
    }

    Ok(())
}
