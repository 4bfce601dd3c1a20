//! Risk-budget command implementation.
//!
//! Solves for weights whose risk contributions match the given budgets
//! (equal budgets when none are given) and prints the decomposition.

use anyhow::{Context as _, Result};
use clap::Args;
use serde::Serialize;
use tabled::Tabled;

use optifolio_portfolio::{risk_budget, Portfolio, RiskContributions};

use crate::cli::{InputArgs, OutputFormat};
use crate::commands::optimize::{risk_of, summary};
use crate::commands::{load_moments, optimizer_config, Context};
use crate::output::{format_percent, print_csv, print_json, print_output};

/// Arguments for the risk-budget command.
#[derive(Args, Debug)]
pub struct RiskBudgetArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// Comma-separated risk budgets in asset order (default: equal)
    #[arg(short, long, value_delimiter = ',')]
    pub budgets: Option<Vec<f64>>,
}

/// One asset's weight and risk decomposition.
#[derive(Debug, Serialize)]
struct BudgetRecord {
    asset: String,
    budget: f64,
    weight: f64,
    risk_contribution: f64,
    risk_share: f64,
}

#[derive(Debug, Serialize, Tabled)]
struct BudgetRow {
    #[tabled(rename = "Asset")]
    asset: String,
    #[tabled(rename = "Budget")]
    budget: String,
    #[tabled(rename = "Weight")]
    weight: String,
    #[tabled(rename = "Risk Share")]
    risk_share: String,
}

#[derive(Debug, Serialize)]
struct BudgetReport<'a> {
    budgets: &'a [f64],
    portfolio: &'a Portfolio,
    risk: &'a RiskContributions,
}

/// Execute the risk-budget command.
pub fn execute(args: RiskBudgetArgs, ctx: &Context) -> Result<()> {
    let (moments, _, _) = load_moments(&args.input, ctx)?;
    let config = optimizer_config(ctx, None, false)?;

    let portfolio = risk_budget(&moments, args.budgets.as_deref(), &config)
        .context("solving risk budgets")?;
    let risk = risk_of(&portfolio, &moments)?;

    let n = moments.n_assets();
    let budgets: Vec<f64> = match &args.budgets {
        Some(b) => {
            let total: f64 = b.iter().sum();
            b.iter().map(|x| x / total).collect()
        }
        None => vec![1.0 / n as f64; n],
    };

    let records: Vec<BudgetRecord> = portfolio
        .iter()
        .enumerate()
        .map(|(i, (asset, weight))| BudgetRecord {
            asset: asset.to_string(),
            budget: budgets[i],
            weight,
            risk_contribution: risk.absolute[i],
            risk_share: risk.relative[i],
        })
        .collect();

    match ctx.format {
        OutputFormat::Json => {
            let report = BudgetReport {
                budgets: &budgets,
                portfolio: &portfolio,
                risk: &risk,
            };
            print_json(&report)?;
        }
        OutputFormat::Csv => print_csv(&records)?,
        OutputFormat::Minimal => {
            let weights: Vec<String> = records.iter().map(|r| format!("{:.8}", r.weight)).collect();
            println!("{}", weights.join(","));
        }
        OutputFormat::Table => {
            let label = if args.budgets.is_some() { "risk budget" } else { "risk parity" };
            ctx.header("Portfolio");
            print_output(&summary(&portfolio, label), ctx.format)?;

            ctx.header("Risk Decomposition");
            let rows: Vec<BudgetRow> = records
                .iter()
                .map(|r| BudgetRow {
                    asset: r.asset.clone(),
                    budget: format_percent(r.budget),
                    weight: format_percent(r.weight),
                    risk_share: format_percent(r.risk_share),
                })
                .collect();
            print_output(&rows, ctx.format)?;
        }
    }

    Ok(())
}
