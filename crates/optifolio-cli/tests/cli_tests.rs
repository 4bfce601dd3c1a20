//! End-to-end tests for the optifolio binary.

use std::io::Write;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::NamedTempFile;

// =============================================================================
// TEST FIXTURES
// =============================================================================

/// Uncorrelated assets with variances 0.01, 0.04 and 0.09.
const RETURNS: &str = "\
date,A,B,C
2024-01-31,0.096602540378,0.193205080757,0.289807621135
2024-02-29,0.096602540378,-0.153205080757,-0.229807621135
2024-03-31,-0.076602540378,0.193205080757,-0.229807621135
2024-04-30,-0.076602540378,-0.153205080757,0.289807621135
";

fn file(contents: &str, suffix: &str) -> NamedTempFile {
    let mut f = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
    f.write_all(contents.as_bytes()).unwrap();
    f
}

fn optifolio() -> Command {
    let mut cmd = Command::cargo_bin("optifolio").unwrap();
    cmd.env_remove("RUST_LOG").env_remove("OPTIFOLIO_CONFIG");
    cmd
}

fn stdout_of(cmd: &mut Command) -> String {
    let output = cmd.output().unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    String::from_utf8(output.stdout).unwrap()
}

fn parse_weights(line: &str) -> Vec<f64> {
    line.trim().split(',').map(|w| w.parse().unwrap()).collect()
}

// =============================================================================
// COMMANDS
// =============================================================================

#[test]
fn test_help_lists_commands() {
    optifolio()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("optimize"))
        .stdout(predicate::str::contains("frontier"))
        .stdout(predicate::str::contains("risk-budget"));
}

#[test]
fn test_min_variance_weights() {
    let returns = file(RETURNS, ".csv");
    let out = stdout_of(optifolio().args(["--format", "minimal", "optimize", "--objective", "min-variance", "--returns"]).arg(returns.path()));

    let w = parse_weights(&out);
    assert_eq!(w.len(), 3);
    assert!((w[0] - 0.7347).abs() < 1e-3, "{out}");
    assert!((w[1] - 0.1837).abs() < 1e-3, "{out}");
    assert!((w[2] - 0.0816).abs() < 1e-3, "{out}");
}

#[test]
fn test_optimize_table_with_constraints() {
    let returns = file(RETURNS, ".csv");
    let classes = file("asset,class\nA,Cash\nB,Equity\nC,Equity\n", ".csv");
    let constraints = file(
        "disabled,type,position,sign,weight\nfalse,Assets,A,<=,0.2\nfalse,Classes,Equity,>=,0.5\n",
        ".csv",
    );

    optifolio()
        .args(["optimize", "--objective", "min-variance", "--returns"])
        .arg(returns.path())
        .arg("--constraints")
        .arg(constraints.path())
        .arg("--classes")
        .arg(classes.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("20.00%"))
        .stdout(predicate::str::contains("Equity"));
}

#[test]
fn test_risk_parity_json() {
    let returns = file(RETURNS, ".csv");
    let out = stdout_of(optifolio().args(["--format", "json", "risk-budget", "--returns"]).arg(returns.path()));

    let report: serde_json::Value = serde_json::from_str(&out).unwrap();
    let weights: Vec<f64> = report["portfolio"]["weights"]
        .as_array()
        .unwrap()
        .iter()
        .map(|w| w.as_f64().unwrap())
        .collect();

    // Inverse volatility 10 : 5 : 3.33
    assert!((weights[0] - 6.0 / 11.0).abs() < 1e-6);
    assert!((weights[1] - 3.0 / 11.0).abs() < 1e-6);
    assert!((weights[2] - 2.0 / 11.0).abs() < 1e-6);
}

#[test]
fn test_frontier_csv_has_one_row_per_point() {
    let returns = file(RETURNS, ".csv");
    let out = stdout_of(
        optifolio()
            .args(["--format", "csv", "frontier", "--points", "6", "--returns"])
            .arg(returns.path()),
    );

    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(lines[0], "point,target_return,expected_return,volatility,sharpe_ratio,A,B,C");
    assert_eq!(lines.len(), 7);
}

#[test]
fn test_stats_json_reports_covariance() {
    let returns = file(RETURNS, ".csv");
    let out = stdout_of(optifolio().args(["--format", "json", "stats", "--returns"]).arg(returns.path()));

    let report: serde_json::Value = serde_json::from_str(&out).unwrap();
    assert_eq!(report["periods"], 4);
    assert_eq!(report["method"], "historical");
    let var_b = report["covariance"][1][1].as_f64().unwrap();
    assert!((var_b - 0.04).abs() < 1e-9);
}

#[test]
fn test_prices_input() {
    let prices = file("date,X,Y\n2024-01-01,100,50\n2024-01-02,101,49\n2024-01-03,103,50\n2024-01-04,102,52\n", ".csv");
    let out = stdout_of(
        optifolio()
            .args(["--format", "json", "stats", "--prices", "--returns"])
            .arg(prices.path()),
    );

    let report: serde_json::Value = serde_json::from_str(&out).unwrap();
    assert_eq!(report["periods"], 3);
}

#[test]
fn test_config_file_selects_estimator() {
    let returns = file(RETURNS, ".csv");
    let config = file("[estimation]\nmethod = \"ledoit_wolf\"\n", ".toml");

    optifolio()
        .args(["--format", "json", "--config"])
        .arg(config.path())
        .args(["stats", "--returns"])
        .arg(returns.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("ledoit-wolf"));
}

// =============================================================================
// EXIT CODES
// =============================================================================

#[test]
fn test_usage_error_exit_code() {
    optifolio().args(["optimize"]).assert().code(2);

    let returns = file(RETURNS, ".csv");
    optifolio()
        .args(["optimize", "--objective", "utility", "--returns"])
        .arg(returns.path())
        .assert()
        .code(2)
        .stderr(predicate::str::contains("--risk-aversion"));
}

#[test]
fn test_insufficient_data_exit_code() {
    let returns = file("date,A,B\n2024-01-31,0.01,0.02\n", ".csv");
    optifolio()
        .args(["stats", "--returns"])
        .arg(returns.path())
        .assert()
        .code(10);
}

#[test]
fn test_non_finite_exit_code_names_period() {
    let returns = file("date,A,B\n2024-01-31,0.01,0.02\n2024-02-29,,0.01\n2024-03-31,0.02,0.00\n", ".csv");
    optifolio()
        .args(["stats", "--returns"])
        .arg(returns.path())
        .assert()
        .code(11)
        .stderr(predicate::str::contains("2024-02-29"));
}

#[test]
fn test_unknown_asset_exit_code() {
    let returns = file(RETURNS, ".csv");
    let constraints = file("disabled,type,position,sign,weight\nfalse,Assets,Z,<=,0.2\n", ".csv");
    optifolio()
        .args(["optimize", "--returns"])
        .arg(returns.path())
        .arg("--constraints")
        .arg(constraints.path())
        .assert()
        .code(20)
        .stderr(predicate::str::contains("Z"));
}

#[test]
fn test_infeasible_exit_code() {
    let returns = file(RETURNS, ".csv");
    let constraints = file(
        "disabled,type,position,sign,weight\nfalse,Assets,A,>=,0.7\nfalse,Assets,B,>=,0.5\n",
        ".csv",
    );
    optifolio()
        .args(["optimize", "--objective", "min-variance", "--returns"])
        .arg(returns.path())
        .arg("--constraints")
        .arg(constraints.path())
        .assert()
        .code(30);
}

#[test]
fn test_malformed_csv_exit_code() {
    let returns = file("date,A\n2024-01-31,abc\n", ".csv");
    optifolio()
        .args(["stats", "--returns"])
        .arg(returns.path())
        .assert()
        .code(2)
        .stderr(predicate::str::contains("line 2"));
}
