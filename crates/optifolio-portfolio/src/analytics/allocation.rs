//! Weight aggregation by asset class.

use std::collections::BTreeMap;

use crate::types::{AssetClasses, Portfolio};

/// Sums portfolio weights per class.
///
/// Assets without a class are collected under `None`.
pub fn class_weights(portfolio: &Portfolio, classes: &AssetClasses) -> BTreeMap<Option<String>, f64> {
    let mut totals = BTreeMap::new();
    for (asset, weight) in portfolio.iter() {
        let class = classes.class_of(asset).map(str::to_string);
        *totals.entry(class).or_insert(0.0) += weight;
    }
    totals
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_class_weights() {
        let portfolio = Portfolio {
            assets: vec!["SPY".into(), "QQQ".into(), "TLT".into(), "GLD".into()],
            weights: vec![0.3, 0.2, 0.4, 0.1],
            expected_return: 0.0,
            volatility: 0.0,
            sharpe_ratio: None,
        };
        let classes =
            AssetClasses::from_pairs([("SPY", "Equity"), ("QQQ", "Equity"), ("TLT", "Bonds")]).unwrap();

        let totals = class_weights(&portfolio, &classes);

        assert_relative_eq!(totals[&Some("Equity".to_string())], 0.5);
        assert_relative_eq!(totals[&Some("Bonds".to_string())], 0.4);
        assert_relative_eq!(totals[&None], 0.1);
    }
}
