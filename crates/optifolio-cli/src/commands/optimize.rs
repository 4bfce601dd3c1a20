//! Optimize command implementation.
//!
//! Solves a single mean-variance portfolio and prints its weights, risk
//! contributions and summary statistics.

use std::collections::BTreeMap;

use anyhow::{Context as _, Result};
use clap::{Args, ValueEnum};
use serde::Serialize;
use tabled::Tabled;

use optifolio_portfolio::{
    class_weights, optimize, risk_contributions, AssetClasses, MomentsEstimate, Objective,
    Portfolio, RiskContributions,
};

use crate::cli::{ConstraintArgs, InputArgs, OutputFormat};
use crate::commands::{load_classes, load_constraints, load_moments, optimizer_config, Context};
use crate::error::CliError;
use crate::output::{format_percent, format_ratio, print_csv, print_json, print_output, KeyValue};

/// Objective selection on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ObjectiveArg {
    /// Maximum Sharpe ratio (tangency portfolio)
    Sharpe,
    /// Global minimum variance
    MinVariance,
    /// Maximum expected return
    MaxReturn,
    /// Maximum mean-variance utility (needs --risk-aversion)
    Utility,
}

/// Arguments for the optimize command.
#[derive(Args, Debug)]
pub struct OptimizeArgs {
    #[command(flatten)]
    pub input: InputArgs,

    #[command(flatten)]
    pub constraints: ConstraintArgs,

    /// Optimization objective
    #[arg(short, long, value_enum, default_value = "sharpe")]
    pub objective: ObjectiveArg,

    /// Risk aversion λ for the utility objective
    #[arg(long)]
    pub risk_aversion: Option<f64>,

    /// Risk-free rate per period (overrides the config file)
    #[arg(long)]
    pub risk_free: Option<f64>,
}

impl OptimizeArgs {
    fn objective(&self) -> Result<Objective> {
        Ok(match self.objective {
            ObjectiveArg::Sharpe => Objective::MaxSharpe,
            ObjectiveArg::MinVariance => Objective::MinVariance,
            ObjectiveArg::MaxReturn => Objective::MaxReturn,
            ObjectiveArg::Utility => {
                let risk_aversion = self.risk_aversion.ok_or_else(|| {
                    CliError::InvalidArgument("--objective utility needs --risk-aversion".into())
                })?;
                Objective::Utility { risk_aversion }
            }
        })
    }
}

/// One asset of the solved portfolio.
#[derive(Debug, Serialize)]
pub struct WeightRecord {
    pub asset: String,
    pub class: Option<String>,
    pub weight: f64,
    pub risk_contribution: f64,
}

#[derive(Debug, Serialize, Tabled)]
struct WeightRow {
    #[tabled(rename = "Asset")]
    asset: String,
    #[tabled(rename = "Class")]
    class: String,
    #[tabled(rename = "Weight")]
    weight: String,
    #[tabled(rename = "Risk Share")]
    risk_share: String,
}

#[derive(Debug, Serialize)]
struct OptimizeReport<'a> {
    objective: &'a Objective,
    portfolio: &'a Portfolio,
    risk: &'a RiskContributions,
    class_weights: BTreeMap<String, f64>,
}

/// Weight records with class labels and relative risk contributions.
pub fn weight_records(
    portfolio: &Portfolio,
    risk: &RiskContributions,
    classes: &AssetClasses,
) -> Vec<WeightRecord> {
    portfolio
        .iter()
        .zip(&risk.relative)
        .map(|((asset, weight), share)| WeightRecord {
            asset: asset.to_string(),
            class: classes.class_of(asset).map(str::to_string),
            weight,
            risk_contribution: *share,
        })
        .collect()
}

/// Summary lines shared with the risk-budget command.
pub fn summary(portfolio: &Portfolio, label: &str) -> Vec<KeyValue> {
    vec![
        KeyValue::new("Objective", label),
        KeyValue::from_percent("Expected Return", portfolio.expected_return),
        KeyValue::from_percent("Volatility", portfolio.volatility),
        KeyValue::new("Sharpe Ratio", format_ratio(portfolio.sharpe_ratio)),
    ]
}

pub(crate) fn class_totals(portfolio: &Portfolio, classes: &AssetClasses) -> BTreeMap<String, f64> {
    class_weights(portfolio, classes)
        .into_iter()
        .map(|(class, w)| (class.unwrap_or_else(|| "(unclassified)".to_string()), w))
        .collect()
}

pub(crate) fn risk_of(portfolio: &Portfolio, moments: &MomentsEstimate) -> Result<RiskContributions> {
    Ok(risk_contributions(&portfolio.weights, moments.cov())?)
}

/// Execute the optimize command.
pub fn execute(args: OptimizeArgs, ctx: &Context) -> Result<()> {
    let objective = args.objective()?;
    let (moments, _, _) = load_moments(&args.input, ctx)?;
    let classes = load_classes(&args.constraints)?;
    let constraints = load_constraints(&args.constraints, &moments, &classes)?;
    let config = optimizer_config(ctx, args.risk_free, args.constraints.allow_short)?;

    let portfolio = optimize(&moments, &objective, constraints.as_ref(), &config)
        .with_context(|| format!("solving {objective} portfolio"))?;
    let risk = risk_of(&portfolio, &moments)?;

    match ctx.format {
        OutputFormat::Json => {
            let report = OptimizeReport {
                objective: &objective,
                portfolio: &portfolio,
                risk: &risk,
                class_weights: class_totals(&portfolio, &classes),
            };
            print_json(&report)?;
        }
        OutputFormat::Csv => {
            print_csv(&weight_records(&portfolio, &risk, &classes))?;
        }
        OutputFormat::Minimal => {
            let weights: Vec<String> = portfolio.weights.iter().map(|w| format!("{w:.8}")).collect();
            println!("{}", weights.join(","));
        }
        OutputFormat::Table => {
            ctx.header("Portfolio");
            print_output(&summary(&portfolio, &objective.to_string()), ctx.format)?;

            ctx.header("Weights");
            let rows: Vec<WeightRow> = weight_records(&portfolio, &risk, &classes)
                .into_iter()
                .map(|r| WeightRow {
                    asset: r.asset,
                    class: r.class.unwrap_or_default(),
                    weight: format_percent(r.weight),
                    risk_share: format_percent(r.risk_contribution),
                })
                .collect();
            print_output(&rows, ctx.format)?;

            if !classes.is_empty() {
                ctx.header("Classes");
                let rows: Vec<KeyValue> = class_totals(&portfolio, &classes)
                    .into_iter()
                    .map(|(class, w)| KeyValue::new(class, format_percent(w)))
                    .collect();
                print_output(&rows, ctx.format)?;
            }
        }
    }

    Ok(())
}
