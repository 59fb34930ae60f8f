use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::TargetRegistry;

/// Header text of the first column.
pub const DATE_COLUMN: &str = "Date";
/// Date cell format, e.g. `2024-03-01`.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Normalized prices gathered during one run, keyed by target key.
/// Failed targets are simply absent.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PriceSnapshot {
    prices: BTreeMap<String, String>,
}

impl PriceSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, price: impl Into<String>) {
        self.prices.insert(key.into(), price.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.prices.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.prices.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// One data row: the run date followed by one cell per target in registry order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceRow {
    pub date: String,
    pub cells: Vec<Option<String>>,
}

impl PriceRow {
    pub fn from_snapshot(
        date: NaiveDate,
        snapshot: &PriceSnapshot,
        registry: &TargetRegistry,
    ) -> Self {
        let cells = registry
            .keys()
            .map(|key| snapshot.get(key).map(ToOwned::to_owned))
            .collect();
        Self {
            date: date.format(DATE_FORMAT).to_string(),
            cells,
        }
    }
}

/// `Date` followed by every target label, in registry order.
pub fn header_row(registry: &TargetRegistry) -> Vec<String> {
    std::iter::once(DATE_COLUMN.to_string())
        .chain(registry.iter().map(|t| t.label.clone()))
        .collect()
}
