//! Frontier command implementation.
//!
//! Samples the efficient frontier and prints one row per solved point.

use anyhow::{Context as _, Result};
use clap::{Args, ValueEnum};
use serde::Serialize;

use optifolio_portfolio::{efficient_frontier, FrontierSample, FrontierSpan};

use crate::cli::{ConstraintArgs, InputArgs, OutputFormat};
use crate::commands::{load_classes, load_constraints, load_moments, optimizer_config, Context};
use crate::error::CliError;
use crate::output::{format_percent, format_ratio, print_json, Grid};

/// Frontier range on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SpanArg {
    /// From the minimum-variance portfolio to the maximum return
    Efficient,
    /// From the minimum to the maximum achievable return
    Full,
}

impl From<SpanArg> for FrontierSpan {
    fn from(span: SpanArg) -> Self {
        match span {
            SpanArg::Efficient => FrontierSpan::Efficient,
            SpanArg::Full => FrontierSpan::Full,
        }
    }
}

/// Arguments for the frontier command.
#[derive(Args, Debug)]
pub struct FrontierArgs {
    #[command(flatten)]
    pub input: InputArgs,

    #[command(flatten)]
    pub constraints: ConstraintArgs,

    /// Number of target returns (overrides the config file)
    #[arg(short, long)]
    pub points: Option<usize>,

    /// Target return range (overrides the config file)
    #[arg(long, value_enum)]
    pub span: Option<SpanArg>,

    /// Risk-free rate per period for the Sharpe column
    #[arg(long)]
    pub risk_free: Option<f64>,
}

#[derive(Debug, Serialize)]
struct FrontierReport<'a> {
    assets: &'a [String],
    requested: usize,
    omitted: usize,
    sample: &'a FrontierSample,
}

/// Execute the frontier command.
pub fn execute(args: FrontierArgs, ctx: &Context) -> Result<()> {
    let (moments, _, _) = load_moments(&args.input, ctx)?;
    let classes = load_classes(&args.constraints)?;
    let constraints = load_constraints(&args.constraints, &moments, &classes)?;

    let mut config = optimizer_config(ctx, args.risk_free, args.constraints.allow_short)?;
    if let Some(points) = args.points {
        if points < 2 {
            return Err(CliError::InvalidArgument(format!("--points must be at least 2, got {points}")).into());
        }
        config = config.with_frontier_points(points);
    }
    if let Some(span) = args.span {
        config = config.with_frontier_span(span.into());
    }

    let sample = efficient_frontier(&moments, constraints.as_ref(), &config)
        .context("sampling the efficient frontier")?;

    if sample.omitted() > 0 {
        ctx.warn(&format!(
            "{} of {} frontier targets were infeasible and omitted",
            sample.omitted(),
            sample.requested
        ));
    }

    match ctx.format {
        OutputFormat::Json => {
            let report = FrontierReport {
                assets: moments.assets(),
                requested: sample.requested,
                omitted: sample.omitted(),
                sample: &sample,
            };
            print_json(&report)?;
        }
        OutputFormat::Minimal => {
            for point in &sample {
                println!("{:.8},{:.8}", point.expected_return(), point.volatility());
            }
        }
        format => {
            ctx.header(&format!("Efficient Frontier ({} points)", sample.len()));

            let machine = format == OutputFormat::Csv;
            let labels = if machine {
                ["point", "target_return", "expected_return", "volatility", "sharpe_ratio"]
            } else {
                ["#", "Target", "Return", "Volatility", "Sharpe"]
            };
            let mut header: Vec<String> = labels.into_iter().map(String::from).collect();
            header.extend(moments.assets().iter().cloned());
            let mut grid = Grid::new(header);

            for (k, point) in sample.iter().enumerate() {
                let p = &point.portfolio;
                let mut row = if machine {
                    vec![
                        k.to_string(),
                        point.target_return.to_string(),
                        p.expected_return.to_string(),
                        p.volatility.to_string(),
                        p.sharpe_ratio.map(|s| s.to_string()).unwrap_or_default(),
                    ]
                } else {
                    vec![
                        (k + 1).to_string(),
                        format_percent(point.target_return),
                        format_percent(p.expected_return),
                        format_percent(p.volatility),
                        format_ratio(p.sharpe_ratio),
                    ]
                };
                row.extend(p.weights.iter().map(|&w| {
                    if machine {
                        w.to_string()
                    } else {
                        format_percent(w)
                    }
                }));
                grid.push(row);
            }
            grid.print(format)?;
        }
    }

    Ok(())
}
