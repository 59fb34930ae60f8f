use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::ConfigError;

/// One scraped quote: where it lives and how its column is labelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub key: String,
    pub label: String,
    pub url: String,
    pub selector: String,
}

impl Target {
    pub fn new(
        key: impl Into<String>,
        label: impl Into<String>,
        url: impl Into<String>,
        selector: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
            url: url.into(),
            selector: selector.into(),
        }
    }
}

/// The quotes tracked out of the box.
pub fn default_targets() -> Vec<Target> {
    vec![
        Target::new(
            "gold",
            "Gold",
            "https://www.gold.co.uk/gold-price/",
            r#"span[name="current_price_field"]"#,
        ),
        Target::new(
            "bitcoin",
            "Bitcoin",
            "https://www.bullionbypost.co.uk/bitcoin-price/bitcoin-price/",
            r#"span[name="current_price_field"]"#,
        ),
        Target::new(
            "ethereum",
            "Ethereum",
            "https://www.coingecko.com/en/coins/ethereum/gbp",
            r#"span[data-converter-target="price"]"#,
        ),
        Target::new(
            "sp500",
            "S&P 500",
            "https://www.hl.co.uk/shares/shares-search-results/v/vanguard-funds-plc-s-and-p-500-etf-usdgbp",
            "#ls-ask-VUSA-L",
        ),
        Target::new(
            "dowjones",
            "Dow Jones",
            "https://www.hl.co.uk/shares/shares-search-results/i/ishares-vii-plc-dow-jones-ind-avg-ucits2",
            "#ls-ask-CIND-L",
        ),
        Target::new(
            "nasdaq",
            "Nasdaq",
            "https://www.hl.co.uk/shares/stock-market-summary/nasdaq",
            "#indices-val-NDX",
        ),
    ]
}

/// Ordered, validated set of targets. Order drives both fetch order and
/// column order in the workbook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetRegistry {
    targets: Vec<Target>,
}

impl TargetRegistry {
    pub fn new(targets: Vec<Target>) -> Result<Self, ConfigError> {
        let mut seen = HashSet::with_capacity(targets.len());
        for target in &targets {
            if target.key.trim().is_empty() {
                return Err(ConfigError::EmptyKey);
            }
            if !seen.insert(target.key.as_str()) {
                return Err(ConfigError::DuplicateKey(target.key.clone()));
            }
            Url::parse(&target.url).map_err(|err| ConfigError::InvalidUrl {
                key: target.key.clone(),
                message: err.to_string(),
            })?;
        }
        Ok(Self { targets })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Target> {
        self.targets.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.targets.iter().map(|t| t.key.as_str())
    }

    pub fn get(&self, key: &str) -> Option<&Target> {
        self.targets.iter().find(|t| t.key == key)
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

impl Default for TargetRegistry {
    fn default() -> Self {
        Self {
            targets: default_targets(),
        }
    }
}
