//! File readers for returns, constraints, asset classes and config.

use std::fs::File;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use csv::{ReaderBuilder, StringRecord, Trim};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use tracing::debug;

use optifolio_portfolio::{
    AssetClasses, Constraint, ConstraintRow, EstimationMethod, OptimizerConfig, ReturnsMatrix,
};

use crate::cli::{InputArgs, MethodArg};
use crate::error::{CliError, CliResult};

/// RiskMetrics decay used when `--method ewma` is given without `--decay`.
pub const DEFAULT_EWMA_DECAY: f64 = 0.94;

/// Contents of a `--config` file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    /// Moment estimator.
    pub estimation: EstimationMethod,
    /// Optimizer settings.
    pub optimizer: OptimizerConfig,
}

impl FileConfig {
    /// Loads a config file, or the defaults when no path is given.
    ///
    /// Files ending in `.json` are parsed as JSON, everything else as TOML.
    pub fn load(path: Option<&Path>) -> CliResult<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let text = std::fs::read_to_string(path).map_err(|source| CliError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config_error = |message: String| CliError::Config {
            path: path.to_path_buf(),
            message,
        };

        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let config: Self = if is_json {
            serde_json::from_str(&text).map_err(|e| config_error(e.to_string()))?
        } else {
            toml::from_str(&text).map_err(|e| config_error(e.to_string()))?
        };

        debug!(path = %path.display(), estimation = %config.estimation, "loaded config file");
        Ok(config)
    }

    /// Estimator after applying `--method` / `--decay`.
    pub fn estimation_for(&self, input: &InputArgs) -> CliResult<EstimationMethod> {
        let method = match input.method {
            None => self.estimation,
            Some(MethodArg::Historical) => EstimationMethod::Historical,
            Some(MethodArg::LedoitWolf) => EstimationMethod::LedoitWolf,
            Some(MethodArg::Ewma) => {
                let configured = match self.estimation {
                    EstimationMethod::Ewma { decay } => decay,
                    _ => DEFAULT_EWMA_DECAY,
                };
                EstimationMethod::Ewma {
                    decay: input.decay.unwrap_or(configured),
                }
            }
        };

        if input.decay.is_some() && !matches!(method, EstimationMethod::Ewma { .. }) {
            return Err(CliError::InvalidArgument(
                "--decay only applies to --method ewma".into(),
            ));
        }
        Ok(method)
    }
}

fn open_csv(path: &Path) -> CliResult<csv::Reader<File>> {
    ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(false)
        .from_path(path)
        .map_err(|e| csv_error(path, &e))
}

fn csv_error(path: &Path, err: &csv::Error) -> CliError {
    match err.kind() {
        csv::ErrorKind::Io(io) => CliError::Io {
            path: path.to_path_buf(),
            source: std::io::Error::new(io.kind(), io.to_string()),
        },
        _ => CliError::Csv {
            path: path.to_path_buf(),
            message: err.to_string(),
        },
    }
}

fn lowercase_headers(reader: &mut csv::Reader<File>, path: &Path) -> CliResult<()> {
    let headers: StringRecord = reader
        .headers()
        .map_err(|e| csv_error(path, &e))?
        .iter()
        .map(str::to_ascii_lowercase)
        .collect();
    reader.set_headers(headers);
    Ok(())
}

/// Parses one cell; blanks and `NaN`/`NA` become NaN so that the engine can
/// report the offending period.
fn parse_value(cell: &str) -> Option<f64> {
    match cell {
        "" => Some(f64::NAN),
        c if c.eq_ignore_ascii_case("nan") || c.eq_ignore_ascii_case("na") => Some(f64::NAN),
        c => c.parse().ok(),
    }
}

fn parse_date(cell: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(cell, "%Y-%m-%d").ok()
}

/// Reads a returns (or, with `prices`, a price) table.
///
/// The header names the assets. A leading `date` column is optional; when
/// present its values (YYYY-MM-DD) label the periods in error messages.
pub fn read_returns(path: &Path, prices: bool) -> CliResult<ReturnsMatrix> {
    let mut reader = open_csv(path)?;
    let headers = reader.headers().map_err(|e| csv_error(path, &e))?.clone();

    let has_dates = headers
        .get(0)
        .is_some_and(|h| h.eq_ignore_ascii_case("date"));
    let offset = usize::from(has_dates);
    let assets: Vec<String> = headers.iter().skip(offset).map(str::to_string).collect();
    if assets.is_empty() {
        return Err(CliError::Csv {
            path: path.to_path_buf(),
            message: "header names no assets".into(),
        });
    }

    let mut dates = Vec::new();
    let mut cells = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record.map_err(|e| csv_error(path, &e))?;
        // Line 1 is the header.
        let line = line + 2;

        if has_dates {
            let raw = record.get(0).unwrap_or_default();
            let date = parse_date(raw).ok_or_else(|| CliError::Csv {
                path: path.to_path_buf(),
                message: format!("line {line}: invalid date '{raw}', expected YYYY-MM-DD"),
            })?;
            dates.push(date);
        }

        for (j, cell) in record.iter().skip(offset).enumerate() {
            let value = parse_value(cell).ok_or_else(|| CliError::Csv {
                path: path.to_path_buf(),
                message: format!("line {line}: '{cell}' is not a number (column {})", assets[j]),
            })?;
            cells.push(value);
        }
    }

    let periods = cells.len() / assets.len();
    let values = DMatrix::from_row_slice(periods, assets.len(), &cells);
    let dates = has_dates.then_some(dates);
    debug!(path = %path.display(), assets = assets.len(), periods, prices, "read input table");

    let engine_input = |err: optifolio_portfolio::PortfolioError| CliError::Csv {
        path: path.to_path_buf(),
        message: err.to_string(),
    };

    if prices {
        return ReturnsMatrix::from_prices(assets, dates, &values).map_err(engine_input);
    }

    let returns = ReturnsMatrix::new(assets, values).map_err(engine_input)?;
    match dates {
        Some(d) => returns.with_dates(d).map_err(engine_input),
        None => Ok(returns),
    }
}

#[derive(Debug, Deserialize)]
struct RawConstraintRow {
    #[serde(default)]
    disabled: Option<String>,
    #[serde(rename = "type")]
    scope: String,
    #[serde(default)]
    position: Option<String>,
    sign: String,
    weight: f64,
}

fn parse_flag(value: Option<&str>) -> Option<bool> {
    match value.map(str::to_ascii_lowercase).as_deref() {
        None | Some("" | "false" | "0" | "no" | "n") => Some(false),
        Some("true" | "1" | "yes" | "y" | "x") => Some(true),
        Some(_) => None,
    }
}

/// Reads constraint rows with the header `disabled,type,position,sign,weight`
/// (any case). Disabled rows are skipped.
pub fn read_constraints(path: &Path) -> CliResult<Vec<Constraint>> {
    let mut reader = open_csv(path)?;
    lowercase_headers(&mut reader, path)?;

    let mut rows = Vec::new();
    for (line, raw) in reader.deserialize::<RawConstraintRow>().enumerate() {
        let raw = raw.map_err(|e| csv_error(path, &e))?;
        let disabled = parse_flag(raw.disabled.as_deref()).ok_or_else(|| CliError::Csv {
            path: path.to_path_buf(),
            message: format!(
                "line {}: disabled must be true or false, got '{}'",
                line + 2,
                raw.disabled.as_deref().unwrap_or_default()
            ),
        })?;
        rows.push(ConstraintRow {
            disabled,
            scope: raw.scope,
            position: raw.position.unwrap_or_default(),
            sign: raw.sign,
            weight: raw.weight,
        });
    }

    let constraints = Constraint::from_rows(&rows).map_err(|err| CliError::Csv {
        path: path.to_path_buf(),
        message: err.to_string(),
    })?;
    debug!(path = %path.display(), rows = rows.len(), active = constraints.len(), "read constraints");
    Ok(constraints)
}

#[derive(Debug, Deserialize)]
struct ClassRow {
    asset: String,
    class: String,
}

/// Reads an `asset,class` table.
pub fn read_classes(path: &Path) -> CliResult<AssetClasses> {
    let mut reader = open_csv(path)?;
    lowercase_headers(&mut reader, path)?;

    let mut classes = AssetClasses::new();
    for row in reader.deserialize::<ClassRow>() {
        let row = row.map_err(|e| csv_error(path, &e))?;
        classes
            .insert(row.asset, row.class)
            .map_err(|err| CliError::Csv {
                path: path.to_path_buf(),
                message: err.to_string(),
            })?;
    }
    Ok(classes)
}

/// Optional file path argument, read with `read`.
pub fn read_optional<T>(
    path: Option<&PathBuf>,
    read: impl FnOnce(&Path) -> CliResult<T>,
) -> CliResult<Option<T>> {
    path.map(|p| read(p)).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(contents: &str, suffix: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_read_returns_with_dates() {
        let file = write_temp(
            "date,SPY,TLT\n2024-01-31,0.01,-0.02\n2024-02-29,0.03,0.01\n2024-03-31,,0.00\n",
            ".csv",
        );
        let returns = read_returns(file.path(), false).unwrap();

        assert_eq!(returns.assets(), ["SPY".to_string(), "TLT".to_string()]);
        assert_eq!(returns.n_periods(), 3);
        assert!(returns.values()[(2, 0)].is_nan());
        assert_eq!(
            returns.dates().unwrap()[1],
            NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()
        );
    }

    #[test]
    fn test_read_prices_drops_incomplete_periods() {
        let file = write_temp("A,B\n100,50\n110,\n121,55\n", ".csv");
        let returns = read_returns(file.path(), true).unwrap();

        // 100→110 is dropped with B's gap, 110→121 / blank→55 likewise.
        assert_eq!(returns.n_periods(), 0);

        let file = write_temp("A,B\n100,50\n110,55\n121,44\n", ".csv");
        let returns = read_returns(file.path(), true).unwrap();
        assert_eq!(returns.n_periods(), 2);
        assert!((returns.values()[(1, 1)] + 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_bad_cells_are_reported_with_line() {
        let file = write_temp("date,A\n2024-01-01,0.1\n2024-01-02,abc\n", ".csv");
        let err = read_returns(file.path(), false).unwrap_err();
        assert!(err.to_string().contains("line 3"));

        let file = write_temp("date,A\n01/02/2024,0.1\n", ".csv");
        assert!(matches!(read_returns(file.path(), false), Err(CliError::Csv { .. })));
    }

    #[test]
    fn test_read_constraints_table() {
        let file = write_temp(
            "Disabled,Type,Position,Sign,Weight\n\
             False,Assets,SPY,<=,0.6\n\
             True,Assets,TLT,>=,0.9\n\
             False,Classes,Bonds,>=,0.2\n\
             False,All Assets,,<=,0.7\n",
            ".csv",
        );
        let constraints = read_constraints(file.path()).unwrap();

        assert_eq!(constraints.len(), 3);
        assert_eq!(constraints[0], Constraint::asset_max("SPY", 0.6));
        assert_eq!(constraints[1], Constraint::class_min("Bonds", 0.2));
        assert_eq!(constraints[2], Constraint::all_assets_max(0.7));
    }

    #[test]
    fn test_read_classes() {
        let file = write_temp("asset,class\nSPY,Equity\nTLT,Bonds\nIEF,Bonds\n", ".csv");
        let classes = read_classes(file.path()).unwrap();

        assert_eq!(classes.len(), 3);
        assert_eq!(classes.class_of("IEF"), Some("Bonds"));
    }

    #[test]
    fn test_config_file_and_overrides() {
        let file = write_temp(
            "[estimation]\nmethod = \"ewma\"\ndecay = 0.97\n\n[optimizer]\nrisk_free_rate = 0.001\n",
            ".toml",
        );
        let config = FileConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.estimation, EstimationMethod::Ewma { decay: 0.97 });
        assert!((config.optimizer.risk_free_rate - 0.001).abs() < 1e-15);

        let input = InputArgs {
            returns: PathBuf::from("r.csv"),
            prices: false,
            method: Some(MethodArg::LedoitWolf),
            decay: None,
        };
        assert_eq!(config.estimation_for(&input).unwrap(), EstimationMethod::LedoitWolf);

        let json = write_temp(r#"{"estimation": {"method": "ledoit_wolf"}}"#, ".json");
        let config = FileConfig::load(Some(json.path())).unwrap();
        assert_eq!(config.estimation, EstimationMethod::LedoitWolf);
        assert_eq!(config.optimizer, OptimizerConfig::default());
    }
}
