use std::time::Duration;

use pricewatch_core::{BrowserOptions, Target};
use pricewatch_logging::{watch_debug, watch_info};
use tokio::time::Instant;

use crate::extract::{Extractor, SelectorExtractor};
use crate::{FailureKind, FetchError};

#[derive(Debug, Clone)]
pub struct FetchSettings {
    /// Upper bound for loading a page until its DOM is parsed.
    pub navigation_timeout: Duration,
    /// Upper bound for the price element to show up after navigation.
    pub selector_timeout: Duration,
    pub poll_interval: Duration,
    pub connect_timeout: Duration,
    pub redirect_limit: usize,
    pub max_bytes: u64,
    pub allowed_content_types: Vec<String>,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            navigation_timeout: Duration::from_secs(30),
            selector_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(250),
            connect_timeout: Duration::from_secs(10),
            redirect_limit: 5,
            max_bytes: 5 * 1024 * 1024,
            allowed_content_types: vec![
                "text/html".to_string(),
                "application/xhtml+xml".to_string(),
            ],
        }
    }
}

impl From<&BrowserOptions> for FetchSettings {
    fn from(options: &BrowserOptions) -> Self {
        Self {
            navigation_timeout: Duration::from_secs(options.navigation_timeout_secs),
            selector_timeout: Duration::from_secs(options.selector_timeout_secs),
            ..Self::default()
        }
    }
}

/// Something that can open a page-rendering session.
#[async_trait::async_trait]
pub trait Browser: Send + Sync {
    async fn open_session(&self) -> Result<Box<dyn BrowserSession>, FetchError>;
}

/// One open tab, reused for every target of a run.
///
/// Dropping a session must release its resources; `close` is the orderly path.
#[async_trait::async_trait]
pub trait BrowserSession: Send {
    /// Load `url` and return once the initial DOM is parsed.
    async fn goto(&mut self, url: &str) -> Result<(), FetchError>;
    /// Click the first element matching `selector`. `Ok(false)` if there is none.
    async fn click(&mut self, selector: &str) -> Result<bool, FetchError>;
    /// Current document markup, including script-rendered content.
    async fn content(&mut self) -> Result<String, FetchError>;
    /// Static sessions never change after `goto`, so waiting on them is pointless.
    fn renders_dynamically(&self) -> bool {
        true
    }
    async fn close(self: Box<Self>) -> Result<(), FetchError>;
}

/// Loads one target in an open session and pulls out its raw price text.
#[derive(Debug, Clone)]
pub struct PageFetcher {
    settings: FetchSettings,
    consent_selector: Option<String>,
}

impl PageFetcher {
    pub fn new(settings: FetchSettings, consent_selector: Option<String>) -> Self {
        Self {
            settings,
            consent_selector,
        }
    }

    pub fn settings(&self) -> &FetchSettings {
        &self.settings
    }

    pub fn consent_selector(&self) -> Option<&str> {
        self.consent_selector.as_deref()
    }

    pub async fn fetch(
        &self,
        session: &mut dyn BrowserSession,
        target: &Target,
    ) -> Result<String, FetchError> {
        let extractor = SelectorExtractor::parse(&target.selector)?;
        self.fetch_with(session, &target.url, &extractor).await
    }

    pub async fn fetch_with(
        &self,
        session: &mut dyn BrowserSession,
        url: &str,
        extractor: &dyn Extractor,
    ) -> Result<String, FetchError> {
        session.goto(url).await?;
        self.dismiss_consent(session, url).await;
        self.wait_for_text(session, extractor).await
    }

    // A missing or unclickable consent control is never an error.
    async fn dismiss_consent(&self, session: &mut dyn BrowserSession, url: &str) {
        let Some(selector) = self.consent_selector.as_deref() else {
            return;
        };
        match session.click(selector).await {
            Ok(true) => watch_info!("Accepted cookies on {}", url),
            Ok(false) => watch_debug!("No cookie button on {}", url),
            Err(err) => watch_info!("No cookie button appeared on {}: {}", url, err),
        }
    }

    async fn wait_for_text(
        &self,
        session: &mut dyn BrowserSession,
        extractor: &dyn Extractor,
    ) -> Result<String, FetchError> {
        let deadline = Instant::now() + self.settings.selector_timeout;
        loop {
            let html = session.content().await?;
            if let Some(text) = extractor.extract(&html) {
                return Ok(text);
            }
            if !session.renders_dynamically() || Instant::now() >= deadline {
                return Err(FetchError::new(
                    FailureKind::SelectorNotFound,
                    format!(
                        "{} not found within {:?}",
                        extractor.describe(),
                        self.settings.selector_timeout
                    ),
                ));
            }
            tokio::time::sleep(self.settings.poll_interval).await;
        }
    }
}
