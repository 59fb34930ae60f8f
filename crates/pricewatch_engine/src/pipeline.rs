use std::sync::Arc;

use chrono::{Local, NaiveDate};
use pricewatch_core::{
    header_row, normalize_price, ConfigError, PriceRow, PriceSnapshot, TargetRegistry,
    TrackerConfig,
};
use pricewatch_logging::{watch_info, watch_warn};
use thiserror::Error;

use crate::fetch::{Browser, FetchSettings, PageFetcher};
use crate::store::{AppendOutcome, StoreError, WorkbookStore};
use crate::FetchError;

/// Supplies the date stamped on each row.
pub type DateSource = Arc<dyn Fn() -> NaiveDate + Send + Sync>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("could not open a browser session: {0}")]
    Browser(FetchError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("store task aborted: {0}")]
    StoreTask(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetFailure {
    pub key: String,
    pub error: FetchError,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub date: NaiveDate,
    pub snapshot: PriceSnapshot,
    pub failures: Vec<TargetFailure>,
    pub store: AppendOutcome,
}

/// Fetch every target once, in order, over a single browser session, then
/// append the resulting row to the workbook.
pub struct PricePipeline {
    registry: TargetRegistry,
    fetcher: PageFetcher,
    browser: Arc<dyn Browser>,
    store: WorkbookStore,
    today: DateSource,
}

impl PricePipeline {
    pub fn new(config: &TrackerConfig, browser: Arc<dyn Browser>) -> Result<Self, ConfigError> {
        let registry = config.registry()?;
        Ok(Self {
            registry,
            fetcher: PageFetcher::new(
                FetchSettings::from(&config.browser),
                config.browser.consent_selector.clone(),
            ),
            browser,
            store: WorkbookStore::new(&config.store.workbook_path, &config.store.sheet_name),
            today: Arc::new(|| Local::now().date_naive()),
        })
    }

    pub fn with_fetch_settings(mut self, settings: FetchSettings) -> Self {
        let consent = self.fetcher.consent_selector().map(ToOwned::to_owned);
        self.fetcher = PageFetcher::new(settings, consent);
        self
    }

    pub fn with_date_source(mut self, today: DateSource) -> Self {
        self.today = today;
        self
    }

    pub fn registry(&self) -> &TargetRegistry {
        &self.registry
    }

    pub fn store(&self) -> &WorkbookStore {
        &self.store
    }

    pub async fn run(&self) -> Result<RunReport, PipelineError> {
        let date = (self.today)();
        watch_info!("Price run for {} started ({} targets)", date, self.registry.len());

        let mut session = self
            .browser
            .open_session()
            .await
            .map_err(PipelineError::Browser)?;

        let mut snapshot = PriceSnapshot::new();
        let mut failures = Vec::new();
        for target in self.registry.iter() {
            match self.fetcher.fetch(session.as_mut(), target).await {
                Ok(raw) => {
                    let price = normalize_price(&raw);
                    watch_info!("{} price: {}", target.key, price);
                    snapshot.insert(target.key.clone(), price);
                }
                Err(error) => {
                    watch_warn!("Error getting price for {}: {}", target.key, error);
                    failures.push(TargetFailure {
                        key: target.key.clone(),
                        error,
                    });
                }
            }
        }

        if let Err(err) = session.close().await {
            watch_warn!("Closing browser session failed: {}", err);
        }
        watch_info!("Prices: {:?}", snapshot);

        let header = header_row(&self.registry);
        let row = PriceRow::from_snapshot(date, &snapshot, &self.registry);
        let store = self.store.clone();
        let outcome = tokio::task::spawn_blocking(move || store.append_row(&header, &row))
            .await
            .map_err(|err| PipelineError::StoreTask(err.to_string()))??;

        Ok(RunReport {
            date,
            snapshot,
            failures,
            store: outcome,
        })
    }
}
