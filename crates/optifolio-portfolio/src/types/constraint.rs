//! Declarative portfolio constraints and asset-class membership.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{PortfolioError, PortfolioResult};

/// Direction of a bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Relation {
    /// `≥ bound` (a minimum).
    #[serde(rename = ">=")]
    GreaterEqual,
    /// `≤ bound` (a maximum).
    #[serde(rename = "<=")]
    LessEqual,
}

impl Relation {
    /// The relation symbol.
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            Self::GreaterEqual => ">=",
            Self::LessEqual => "<=",
        }
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for Relation {
    type Err = PortfolioError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            ">=" | "≥" | "ge" => Ok(Self::GreaterEqual),
            "<=" | "≤" | "le" => Ok(Self::LessEqual),
            other => Err(PortfolioError::invalid_input(format!(
                "unrecognized relation '{other}' (expected >= or <=)"
            ))),
        }
    }
}

/// A single linear bound on portfolio weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum Constraint {
    /// Bound on the weight of one asset.
    #[serde(rename = "asset")]
    SingleAsset {
        /// Asset identifier.
        asset: String,
        /// Direction of the bound.
        relation: Relation,
        /// Bound value.
        bound: f64,
    },
    /// Bound on the summed weight of every asset in a class.
    #[serde(rename = "class")]
    ClassBound {
        /// Class identifier.
        class: String,
        /// Direction of the bound.
        relation: Relation,
        /// Bound value.
        bound: f64,
    },
    /// The same bound applied to each asset individually.
    #[serde(rename = "all_assets")]
    UniformBound {
        /// Direction of the bound.
        relation: Relation,
        /// Bound value.
        bound: f64,
    },
}

impl Constraint {
    /// `w[asset] ≥ bound`.
    pub fn asset_min(asset: impl Into<String>, bound: f64) -> Self {
        Self::SingleAsset {
            asset: asset.into(),
            relation: Relation::GreaterEqual,
            bound,
        }
    }

    /// `w[asset] ≤ bound`.
    pub fn asset_max(asset: impl Into<String>, bound: f64) -> Self {
        Self::SingleAsset {
            asset: asset.into(),
            relation: Relation::LessEqual,
            bound,
        }
    }

    /// `Σ w[class] ≥ bound`.
    pub fn class_min(class: impl Into<String>, bound: f64) -> Self {
        Self::ClassBound {
            class: class.into(),
            relation: Relation::GreaterEqual,
            bound,
        }
    }

    /// `Σ w[class] ≤ bound`.
    pub fn class_max(class: impl Into<String>, bound: f64) -> Self {
        Self::ClassBound {
            class: class.into(),
            relation: Relation::LessEqual,
            bound,
        }
    }

    /// `w[i] ≥ bound` for every asset.
    pub fn all_assets_min(bound: f64) -> Self {
        Self::UniformBound {
            relation: Relation::GreaterEqual,
            bound,
        }
    }

    /// `w[i] ≤ bound` for every asset.
    pub fn all_assets_max(bound: f64) -> Self {
        Self::UniformBound {
            relation: Relation::LessEqual,
            bound,
        }
    }

    /// Direction of the bound.
    pub fn relation(&self) -> Relation {
        match self {
            Self::SingleAsset { relation, .. }
            | Self::ClassBound { relation, .. }
            | Self::UniformBound { relation, .. } => *relation,
        }
    }

    /// Bound value.
    pub fn bound(&self) -> f64 {
        match self {
            Self::SingleAsset { bound, .. }
            | Self::ClassBound { bound, .. }
            | Self::UniformBound { bound, .. } => *bound,
        }
    }

    /// Converts tabular rows, skipping disabled ones.
    pub fn from_rows(rows: &[ConstraintRow]) -> PortfolioResult<Vec<Self>> {
        rows.iter()
            .filter_map(|row| row.to_constraint().transpose())
            .collect()
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SingleAsset {
                asset,
                relation,
                bound,
            } => write!(f, "asset {asset} {relation} {bound}"),
            Self::ClassBound {
                class,
                relation,
                bound,
            } => write!(f, "class {class} {relation} {bound}"),
            Self::UniformBound { relation, bound } => write!(f, "all assets {relation} {bound}"),
        }
    }
}

/// Constraint in the spreadsheet layout `Disabled | Type | Position | Sign | Weight`.
///
/// `Type` is one of `Assets`, `Classes` or `All Assets`; `Position` names the
/// asset or class and is blank for `All Assets`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintRow {
    /// Skip this row when true.
    #[serde(default)]
    pub disabled: bool,
    /// Scope column.
    #[serde(rename = "type")]
    pub scope: String,
    /// Asset or class identifier.
    #[serde(default)]
    pub position: String,
    /// `>=` or `<=`.
    pub sign: String,
    /// Bound value.
    pub weight: f64,
}

impl ConstraintRow {
    /// Creates an enabled row.
    pub fn new(
        scope: impl Into<String>,
        position: impl Into<String>,
        sign: impl Into<String>,
        weight: f64,
    ) -> Self {
        Self {
            disabled: false,
            scope: scope.into(),
            position: position.into(),
            sign: sign.into(),
            weight,
        }
    }

    /// Converts the row, returning `None` when it is disabled.
    pub fn to_constraint(&self) -> PortfolioResult<Option<Constraint>> {
        if self.disabled {
            return Ok(None);
        }

        let relation: Relation = self.sign.parse()?;
        let position = self.position.trim();
        let bound = self.weight;

        let scope = self.scope.trim().to_ascii_lowercase().replace(['_', '-'], " ");
        let constraint = match scope.as_str() {
            "assets" | "asset" => {
                require_position(position, &self.scope)?;
                Constraint::SingleAsset {
                    asset: position.to_string(),
                    relation,
                    bound,
                }
            }
            "classes" | "class" => {
                require_position(position, &self.scope)?;
                Constraint::ClassBound {
                    class: position.to_string(),
                    relation,
                    bound,
                }
            }
            "all assets" | "all" => Constraint::UniformBound { relation, bound },
            _ => {
                return Err(PortfolioError::invalid_input(format!(
                    "unrecognized constraint type '{}'",
                    self.scope
                )))
            }
        };
        Ok(Some(constraint))
    }
}

fn require_position(position: &str, scope: &str) -> PortfolioResult<()> {
    if position.is_empty() {
        return Err(PortfolioError::invalid_input(format!(
            "constraint of type '{scope}' needs a position"
        )));
    }
    Ok(())
}

/// Asset → class membership table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetClasses {
    membership: BTreeMap<String, String>,
}

impl AssetClasses {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a table from `(asset, class)` pairs.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if an asset is assigned two different classes.
    pub fn from_pairs<I, A, C>(pairs: I) -> PortfolioResult<Self>
    where
        I: IntoIterator<Item = (A, C)>,
        A: Into<String>,
        C: Into<String>,
    {
        let mut table = Self::new();
        for (asset, class) in pairs {
            table.insert(asset, class)?;
        }
        Ok(table)
    }

    /// Assigns an asset to a class.
    pub fn insert(&mut self, asset: impl Into<String>, class: impl Into<String>) -> PortfolioResult<()> {
        let asset = asset.into();
        let class = class.into();
        match self.membership.get(&asset) {
            Some(existing) if *existing != class => Err(PortfolioError::invalid_input(format!(
                "asset '{asset}' assigned to both '{existing}' and '{class}'"
            ))),
            _ => {
                self.membership.insert(asset, class);
                Ok(())
            }
        }
    }

    /// Class of an asset.
    pub fn class_of(&self, asset: &str) -> Option<&str> {
        self.membership.get(asset).map(String::as_str)
    }

    /// True if any asset belongs to `class`.
    pub fn contains_class(&self, class: &str) -> bool {
        self.membership.values().any(|c| c == class)
    }

    /// Distinct class names.
    pub fn classes(&self) -> BTreeSet<&str> {
        self.membership.values().map(String::as_str).collect()
    }

    /// Column indices of the `assets` that belong to `class`.
    pub fn members(&self, class: &str, assets: &[String]) -> Vec<usize> {
        assets
            .iter()
            .enumerate()
            .filter(|(_, a)| self.class_of(a) == Some(class))
            .map(|(j, _)| j)
            .collect()
    }

    /// Number of classified assets.
    pub fn len(&self) -> usize {
        self.membership.len()
    }

    /// True if no asset is classified.
    pub fn is_empty(&self) -> bool {
        self.membership.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relation_parse() {
        assert_eq!(">=".parse::<Relation>().unwrap(), Relation::GreaterEqual);
        assert_eq!(" <= ".parse::<Relation>().unwrap(), Relation::LessEqual);
        assert!("=".parse::<Relation>().is_err());
    }

    #[test]
    fn test_rows_to_constraints() {
        let mut disabled = ConstraintRow::new("Assets", "SPY", "<=", 0.5);
        disabled.disabled = true;
        let rows = vec![
            ConstraintRow::new("Classes", "Equity", ">=", 0.4),
            disabled,
            ConstraintRow::new("All Assets", "", "<=", 0.3),
            ConstraintRow::new("Assets", "TLT", ">=", 0.05),
        ];

        let constraints = Constraint::from_rows(&rows).unwrap();

        assert_eq!(
            constraints,
            vec![
                Constraint::class_min("Equity", 0.4),
                Constraint::all_assets_max(0.3),
                Constraint::asset_min("TLT", 0.05),
            ]
        );
    }

    #[test]
    fn test_bad_rows() {
        assert!(ConstraintRow::new("Sectors", "X", ">=", 0.1).to_constraint().is_err());
        assert!(ConstraintRow::new("Assets", "", ">=", 0.1).to_constraint().is_err());
        assert!(ConstraintRow::new("Assets", "X", "==", 0.1).to_constraint().is_err());
    }

    #[test]
    fn test_constraint_serde_is_tagged() {
        let c = Constraint::class_max("Bonds", 0.6);
        let json = serde_json::to_string(&c).unwrap();
        assert!(json.contains("\"scope\":\"class\""));
        assert!(json.contains("\"relation\":\"<=\""));

        let parsed: Constraint = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, c);
    }

    #[test]
    fn test_asset_classes() {
        let classes =
            AssetClasses::from_pairs([("SPY", "Equity"), ("QQQ", "Equity"), ("TLT", "Bonds")])
                .unwrap();
        let assets: Vec<String> = ["TLT", "SPY", "GLD", "QQQ"]
            .iter()
            .map(|s| (*s).to_string())
            .collect();

        assert_eq!(classes.members("Equity", &assets), vec![1, 3]);
        assert_eq!(classes.class_of("GLD"), None);
        assert!(classes.contains_class("Bonds"));
        assert_eq!(classes.classes().len(), 2);

        assert!(AssetClasses::from_pairs([("SPY", "Equity"), ("SPY", "Bonds")]).is_err());
    }
}
