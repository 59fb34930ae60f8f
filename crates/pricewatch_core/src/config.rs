use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{default_targets, DailySchedule, Target, TargetRegistry};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("target key must not be empty")]
    EmptyKey,
    #[error("duplicate target key: {0}")]
    DuplicateKey(String),
    #[error("invalid url for target {key}: {message}")]
    InvalidUrl { key: String, message: String },
    #[error("sheet name must be 1-31 characters without []:*?/\\, got {0:?}")]
    InvalidSheetName(String),
}

/// Which engine renders target pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RendererKind {
    /// Full browser with JavaScript; required for client-side rendered quotes.
    #[default]
    Chromium,
    /// Plain HTTP GET of the served HTML.
    Http,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserOptions {
    pub renderer: RendererKind,
    pub headless: bool,
    pub chrome_executable: Option<PathBuf>,
    /// Cookie-consent control clicked when present. `None` disables the check.
    pub consent_selector: Option<String>,
    pub navigation_timeout_secs: u64,
    pub selector_timeout_secs: u64,
}

impl Default for BrowserOptions {
    fn default() -> Self {
        Self {
            renderer: RendererKind::Chromium,
            headless: true,
            chrome_executable: None,
            consent_selector: Some("#acceptCookieButton".to_string()),
            navigation_timeout_secs: 30,
            selector_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreOptions {
    pub workbook_path: PathBuf,
    pub sheet_name: String,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            workbook_path: PathBuf::from("prices.xlsx"),
            sheet_name: "Prices".to_string(),
        }
    }
}

/// Everything a pipeline run and its scheduler need, passed in at construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub targets: Vec<Target>,
    pub schedule: DailySchedule,
    pub run_on_start: bool,
    pub browser: BrowserOptions,
    pub store: StoreOptions,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            targets: default_targets(),
            schedule: DailySchedule::default(),
            run_on_start: true,
            browser: BrowserOptions::default(),
            store: StoreOptions::default(),
        }
    }
}

impl TrackerConfig {
    /// Validate the configured targets and sheet name, returning the registry.
    pub fn registry(&self) -> Result<TargetRegistry, ConfigError> {
        validate_sheet_name(&self.store.sheet_name)?;
        TargetRegistry::new(self.targets.clone())
    }
}

// Excel limits: 31 chars, none of []:*?/\ .
fn validate_sheet_name(name: &str) -> Result<(), ConfigError> {
    let len = name.chars().count();
    let forbidden = name
        .chars()
        .any(|c| matches!(c, '[' | ']' | ':' | '*' | '?' | '/' | '\\'));
    if len == 0 || len > 31 || forbidden {
        return Err(ConfigError::InvalidSheetName(name.to_string()));
    }
    Ok(())
}
