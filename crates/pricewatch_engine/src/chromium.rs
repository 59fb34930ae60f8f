//! Chromium-backed sessions for pages that render their quotes client-side.

use std::path::{Path, PathBuf};

use chromiumoxide::browser::{Browser as CdpBrowser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::NavigateParams;
use chromiumoxide::page::Page;
use futures_util::StreamExt;
use pricewatch_core::BrowserOptions;
use pricewatch_logging::{watch_debug, watch_warn};
use tokio::task::JoinHandle;

use crate::fetch::{Browser, BrowserSession, FetchSettings};
use crate::{FailureKind, FetchError};

/// Locate a Chrome/Chromium binary.
///
/// An explicitly configured path wins; otherwise the usual binary names are
/// looked up on `PATH`. `None` lets chromiumoxide run its own detection.
pub fn find_chromium(configured: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = configured {
        if path.exists() {
            return Some(path.to_path_buf());
        }
        watch_warn!("Configured Chromium {:?} does not exist", path);
    }

    ["google-chrome", "google-chrome-stable", "chromium", "chromium-browser"]
        .iter()
        .find_map(|name| which::which(name).ok())
}

/// Launches a fresh Chromium process per session.
#[derive(Debug, Clone)]
pub struct ChromiumBrowser {
    headless: bool,
    executable: Option<PathBuf>,
    settings: FetchSettings,
}

impl ChromiumBrowser {
    pub fn new(options: &BrowserOptions, settings: FetchSettings) -> Self {
        Self {
            headless: options.headless,
            executable: find_chromium(options.chrome_executable.as_deref()),
            settings,
        }
    }

    fn browser_config(&self) -> Result<BrowserConfig, FetchError> {
        let mut builder = BrowserConfig::builder()
            .request_timeout(self.settings.navigation_timeout)
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions");
        if !self.headless {
            builder = builder.with_head();
        }
        if let Some(path) = &self.executable {
            builder = builder.chrome_executable(path);
        }
        builder
            .build()
            .map_err(|err| FetchError::new(FailureKind::Browser, err))
    }
}

#[async_trait::async_trait]
impl Browser for ChromiumBrowser {
    async fn open_session(&self) -> Result<Box<dyn BrowserSession>, FetchError> {
        let config = self.browser_config()?;
        let (browser, mut handler) = CdpBrowser::launch(config)
            .await
            .map_err(|err| FetchError::new(FailureKind::Browser, err.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    watch_debug!("Chromium handler event error: {}", err);
                }
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(err) => {
                handler_task.abort();
                return Err(FetchError::new(FailureKind::Browser, err.to_string()));
            }
        };

        Ok(Box::new(ChromiumSession {
            browser,
            page,
            handler_task,
            settings: self.settings.clone(),
        }))
    }
}

/// One Chromium process with a single tab.
///
/// Dropping the session kills the process; `close` shuts it down cleanly.
pub struct ChromiumSession {
    browser: CdpBrowser,
    page: Page,
    handler_task: JoinHandle<()>,
    settings: FetchSettings,
}

impl ChromiumSession {
    // Equivalent of waiting for DOMContentLoaded: anything past "loading".
    async fn wait_for_dom(&self) {
        loop {
            let state = match self.page.evaluate("document.readyState").await {
                Ok(result) => result.into_value::<String>().ok(),
                // The execution context is swapped out while the document commits.
                Err(_) => None,
            };
            if matches!(state.as_deref(), Some("interactive") | Some("complete")) {
                return;
            }
            tokio::time::sleep(self.settings.poll_interval).await;
        }
    }
}

#[async_trait::async_trait]
impl BrowserSession for ChromiumSession {
    async fn goto(&mut self, url: &str) -> Result<(), FetchError> {
        let timeout = self.settings.navigation_timeout;
        let navigation = async {
            let response = self
                .page
                .execute(NavigateParams::new(url))
                .await
                .map_err(|err| FetchError::new(FailureKind::Navigation, err.to_string()))?;
            if let Some(error_text) = response.result.error_text.clone() {
                return Err(FetchError::new(FailureKind::Navigation, error_text));
            }
            self.wait_for_dom().await;
            Ok(())
        };

        match tokio::time::timeout(timeout, navigation).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::new(
                FailureKind::Timeout,
                format!("navigation to {url} timed out after {timeout:?}"),
            )),
        }
    }

    async fn click(&mut self, selector: &str) -> Result<bool, FetchError> {
        let Ok(element) = self.page.find_element(selector).await else {
            return Ok(false);
        };
        element
            .click()
            .await
            .map_err(|err| FetchError::new(FailureKind::Browser, err.to_string()))?;
        Ok(true)
    }

    async fn content(&mut self) -> Result<String, FetchError> {
        self.page
            .content()
            .await
            .map_err(|err| FetchError::new(FailureKind::Browser, err.to_string()))
    }

    async fn close(self: Box<Self>) -> Result<(), FetchError> {
        let mut session = self;
        let closed = session
            .browser
            .close()
            .await
            .map(|_| ())
            .map_err(|err| FetchError::new(FailureKind::Browser, err.to_string()));
        if closed.is_ok() {
            if let Err(err) = session.browser.wait().await {
                watch_warn!("Waiting for Chromium to exit failed: {}", err);
            }
        }
        closed
    }
}

impl Drop for ChromiumSession {
    fn drop(&mut self) {
        self.handler_task.abort();
    }
}
