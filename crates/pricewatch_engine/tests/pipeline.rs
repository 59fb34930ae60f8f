use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::NaiveDate;
use pretty_assertions::assert_eq;
use pricewatch_core::{StoreOptions, Target, TrackerConfig};
use pricewatch_engine::{
    Browser, BrowserSession, FailureKind, FetchError, FetchSettings, HttpBrowser, PipelineError,
    PricePipeline,
};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CONSENT_MARKUP: &str = r#"<button id="acceptCookieButton">OK</button>"#;
// Consent control that is present but detached when clicked.
const STALE_CONSENT_MARKUP: &str = r#"<button id="acceptCookieButton" data-stale>OK</button>"#;

#[derive(Default)]
struct Counters {
    opened: AtomicUsize,
    closed: AtomicUsize,
    released: AtomicUsize,
    clicks: AtomicUsize,
}

/// Serves canned pages. A page can take a few polls before its content shows up,
/// like a client-side rendered quote.
struct FakeBrowser {
    pages: HashMap<String, (String, usize)>,
    counters: Arc<Counters>,
    fail_launch: bool,
}

impl FakeBrowser {
    fn new() -> Self {
        Self {
            pages: HashMap::new(),
            counters: Arc::new(Counters::default()),
            fail_launch: false,
        }
    }

    fn page(mut self, url: &str, html: &str, polls_until_rendered: usize) -> Self {
        self.pages
            .insert(url.to_string(), (html.to_string(), polls_until_rendered));
        self
    }
}

#[async_trait::async_trait]
impl Browser for FakeBrowser {
    async fn open_session(&self) -> Result<Box<dyn BrowserSession>, FetchError> {
        if self.fail_launch {
            return Err(FetchError::new(FailureKind::Browser, "no chromium here"));
        }
        self.counters.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeSession {
            pages: self.pages.clone(),
            counters: Arc::clone(&self.counters),
            current: None,
        }))
    }
}

struct FakeSession {
    pages: HashMap<String, (String, usize)>,
    counters: Arc<Counters>,
    current: Option<(String, usize)>,
}

#[async_trait::async_trait]
impl BrowserSession for FakeSession {
    async fn goto(&mut self, url: &str) -> Result<(), FetchError> {
        if url.ends_with("/panic") {
            panic!("renderer crashed");
        }
        let page = self.pages.get(url).cloned().ok_or_else(|| {
            FetchError::new(FailureKind::Navigation, "net::ERR_NAME_NOT_RESOLVED")
        })?;
        self.current = Some(page);
        Ok(())
    }

    async fn click(&mut self, selector: &str) -> Result<bool, FetchError> {
        assert_eq!(selector, "#acceptCookieButton");
        let stale = self
            .current
            .as_ref()
            .is_some_and(|(html, _)| html.contains(STALE_CONSENT_MARKUP));
        if stale {
            return Err(FetchError::new(FailureKind::Browser, "node is detached from document"));
        }
        let present = self
            .current
            .as_ref()
            .is_some_and(|(html, _)| html.contains(CONSENT_MARKUP));
        if present {
            self.counters.clicks.fetch_add(1, Ordering::SeqCst);
        }
        Ok(present)
    }

    async fn content(&mut self) -> Result<String, FetchError> {
        let (html, pending) = self
            .current
            .as_mut()
            .ok_or_else(|| FetchError::new(FailureKind::Navigation, "no page"))?;
        if *pending > 0 {
            *pending -= 1;
            return Ok("<html><body>loading</body></html>".to_string());
        }
        Ok(html.clone())
    }

    async fn close(self: Box<Self>) -> Result<(), FetchError> {
        self.counters.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl Drop for FakeSession {
    fn drop(&mut self) {
        self.counters.released.fetch_add(1, Ordering::SeqCst);
    }
}

fn targets() -> Vec<Target> {
    vec![
        Target::new("gold", "Gold", "https://quotes.test/gold", "#gold"),
        Target::new("sp500", "S&P 500", "https://quotes.test/sp500", "#ls-ask-VUSA-L"),
        Target::new("nasdaq", "Nasdaq", "https://quotes.test/nasdaq", "#indices-val-NDX"),
    ]
}

fn config(workbook: &Path, targets: Vec<Target>) -> TrackerConfig {
    TrackerConfig {
        targets,
        store: StoreOptions {
            workbook_path: workbook.to_path_buf(),
            sheet_name: "Prices".to_string(),
        },
        ..TrackerConfig::default()
    }
}

fn fast_settings() -> FetchSettings {
    FetchSettings {
        selector_timeout: Duration::from_millis(150),
        poll_interval: Duration::from_millis(5),
        ..FetchSettings::default()
    }
}

fn dates(days: &[(i32, u32, u32)]) -> Arc<dyn Fn() -> NaiveDate + Send + Sync> {
    let queue: VecDeque<NaiveDate> = days
        .iter()
        .map(|&(y, m, d)| NaiveDate::from_ymd_opt(y, m, d).unwrap())
        .collect();
    let queue = Mutex::new(queue);
    Arc::new(move || queue.lock().unwrap().pop_front().expect("date available"))
}

fn row_texts(pipeline: &PricePipeline) -> Vec<Vec<String>> {
    pipeline
        .store()
        .load_price_sheet()
        .unwrap()
        .expect("price sheet")
        .rows
        .iter()
        .map(|row| row.iter().map(|cell| cell.to_string()).collect())
        .collect()
}

fn standard_browser() -> FakeBrowser {
    FakeBrowser::new()
        .page(
            "https://quotes.test/gold",
            &format!("{CONSENT_MARKUP}<span id=\"gold\">£1,834.22</span>"),
            0,
        )
        .page(
            "https://quotes.test/sp500",
            "<span id=\"something-else\">71.20</span>",
            0,
        )
        .page(
            "https://quotes.test/nasdaq",
            "<td id=\"indices-val-NDX\"> 17,890.10 </td>",
            3,
        )
}

#[tokio::test]
async fn failed_target_leaves_only_its_cell_empty() {
    pricewatch_logging::initialize_for_tests();
    let temp = TempDir::new().unwrap();
    let browser = Arc::new(standard_browser());
    let counters = Arc::clone(&browser.counters);

    let pipeline = PricePipeline::new(&config(&temp.path().join("prices.xlsx"), targets()), browser)
        .unwrap()
        .with_fetch_settings(fast_settings())
        .with_date_source(dates(&[(2024, 3, 1)]));

    let report = pipeline.run().await.expect("run ok");

    assert_eq!(report.snapshot.get("gold"), Some("1834.22"));
    assert_eq!(report.snapshot.get("sp500"), None);
    assert_eq!(report.snapshot.get("nasdaq"), Some("17890.10"));
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].key, "sp500");
    assert_eq!(report.failures[0].error.kind, FailureKind::SelectorNotFound);
    assert!(report.store.created_sheet);

    assert_eq!(
        row_texts(&pipeline),
        vec![
            vec!["Date", "Gold", "S&P 500", "Nasdaq"],
            vec!["2024-03-01", "1834.22", "", "17890.10"],
        ]
    );

    // One shared session per run, closed once, cookie wall dismissed once.
    assert_eq!(counters.opened.load(Ordering::SeqCst), 1);
    assert_eq!(counters.closed.load(Ordering::SeqCst), 1);
    assert_eq!(counters.released.load(Ordering::SeqCst), 1);
    assert_eq!(counters.clicks.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failing_consent_click_does_not_fail_the_target() {
    let temp = TempDir::new().unwrap();
    let browser = FakeBrowser::new()
        .page(
            "https://quotes.test/gold",
            &format!("{STALE_CONSENT_MARKUP}<span id=\"gold\">£1,901.05</span>"),
            1,
        )
        .page(
            "https://quotes.test/sp500",
            &format!("{CONSENT_MARKUP}<span id=\"ls-ask-VUSA-L\">78.31</span>"),
            0,
        );
    let browser = Arc::new(browser);
    let counters = Arc::clone(&browser.counters);
    let targets = targets().into_iter().take(2).collect();

    let pipeline = PricePipeline::new(&config(&temp.path().join("prices.xlsx"), targets), browser)
        .unwrap()
        .with_fetch_settings(fast_settings())
        .with_date_source(dates(&[(2024, 3, 1)]));

    let report = pipeline.run().await.unwrap();
    assert_eq!(report.snapshot.get("gold"), Some("1901.05"));
    assert_eq!(report.snapshot.get("sp500"), Some("78.31"));
    assert!(report.failures.is_empty(), "unexpected failures: {:?}", report.failures);
    assert_eq!(counters.clicks.load(Ordering::SeqCst), 1);
    assert_eq!(counters.closed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn navigation_failure_does_not_abort_the_run() {
    let temp = TempDir::new().unwrap();
    let mut all = targets();
    all.insert(
        0,
        Target::new("bitcoin", "Bitcoin", "https://unreachable.test/btc", "span"),
    );
    let pipeline = PricePipeline::new(
        &config(&temp.path().join("prices.xlsx"), all),
        Arc::new(standard_browser()),
    )
    .unwrap()
    .with_fetch_settings(fast_settings())
    .with_date_source(dates(&[(2024, 3, 1)]));

    let report = pipeline.run().await.unwrap();
    assert_eq!(report.failures[0].key, "bitcoin");
    assert_eq!(report.failures[0].error.kind, FailureKind::Navigation);
    assert_eq!(report.snapshot.len(), 2);
}

#[tokio::test]
async fn two_runs_append_two_dated_rows() {
    let temp = TempDir::new().unwrap();
    let pipeline = PricePipeline::new(
        &config(&temp.path().join("prices.xlsx"), targets()),
        Arc::new(standard_browser()),
    )
    .unwrap()
    .with_fetch_settings(fast_settings())
    .with_date_source(dates(&[(2024, 3, 1), (2024, 3, 2), (2024, 3, 3)]));

    pipeline.run().await.unwrap();
    let history = row_texts(&pipeline);
    assert_eq!(history.len(), 2);

    let second = pipeline.run().await.unwrap();
    let third = pipeline.run().await.unwrap();
    assert!(!second.store.created_sheet);
    assert_eq!(third.store.total_rows, 4);

    let rows = row_texts(&pipeline);
    assert_eq!(rows[..2], history[..]);
    let stamped: Vec<_> = rows[2..].iter().map(|r| r[0].as_str()).collect();
    assert_eq!(stamped, ["2024-03-02", "2024-03-03"]);
}

#[tokio::test]
async fn browser_launch_failure_writes_nothing() {
    let temp = TempDir::new().unwrap();
    let workbook = temp.path().join("prices.xlsx");
    let mut browser = standard_browser();
    browser.fail_launch = true;

    let pipeline = PricePipeline::new(&config(&workbook, targets()), Arc::new(browser))
        .unwrap()
        .with_date_source(dates(&[(2024, 3, 1)]));

    let err = pipeline.run().await.unwrap_err();
    assert!(matches!(err, PipelineError::Browser(_)), "unexpected error: {err}");
    assert!(!workbook.exists());
}

#[tokio::test]
async fn store_failure_fails_the_run_after_closing_the_session() {
    let temp = TempDir::new().unwrap();
    let workbook = temp.path().join("prices.xlsx");
    std::fs::write(&workbook, b"corrupt").unwrap();
    let browser = Arc::new(standard_browser());
    let counters = Arc::clone(&browser.counters);

    let pipeline = PricePipeline::new(&config(&workbook, targets()), browser)
        .unwrap()
        .with_fetch_settings(fast_settings())
        .with_date_source(dates(&[(2024, 3, 1)]));

    let err = pipeline.run().await.unwrap_err();
    assert!(matches!(err, PipelineError::Store(_)), "unexpected error: {err}");
    assert_eq!(counters.closed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn panicking_target_still_releases_the_session() {
    let temp = TempDir::new().unwrap();
    let browser = Arc::new(standard_browser());
    let counters = Arc::clone(&browser.counters);
    let mut all = targets();
    all.push(Target::new("crash", "Crash", "https://quotes.test/panic", "span"));

    let pipeline = PricePipeline::new(&config(&temp.path().join("prices.xlsx"), all), browser)
        .unwrap()
        .with_fetch_settings(fast_settings())
        .with_date_source(dates(&[(2024, 3, 1)]));

    let joined = tokio::spawn(async move { pipeline.run().await }).await;
    assert!(joined.unwrap_err().is_panic());
    assert_eq!(counters.closed.load(Ordering::SeqCst), 0);
    assert_eq!(counters.released.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn end_to_end_over_http() {
    let server = MockServer::start().await;
    for (route, body) in [
        ("/gold", r#"<span name="current_price_field">£1,834.22</span>"#),
        ("/eth", r#"<span data-converter-target="price">£2,510.07</span>"#),
        ("/sp500", r#"<p>maintenance</p>"#),
    ] {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(body, "text/html; charset=utf-8"),
            )
            .mount(&server)
            .await;
    }
    let uri = server.uri();
    let targets = vec![
        Target::new(
            "gold",
            "Gold",
            format!("{uri}/gold"),
            r#"span[name="current_price_field"]"#,
        ),
        Target::new(
            "ethereum",
            "Ethereum",
            format!("{uri}/eth"),
            r#"span[data-converter-target="price"]"#,
        ),
        Target::new("sp500", "S&P 500", format!("{uri}/sp500"), "#ls-ask-VUSA-L"),
    ];

    let temp = TempDir::new().unwrap();
    let config = config(&temp.path().join("prices.xlsx"), targets);
    let settings = FetchSettings::from(&config.browser);
    let pipeline = PricePipeline::new(&config, Arc::new(HttpBrowser::new(settings)))
        .unwrap()
        .with_date_source(dates(&[(2024, 3, 1)]));

    let report = pipeline.run().await.unwrap();
    assert_eq!(report.failures.len(), 1);
    assert_eq!(
        row_texts(&pipeline),
        vec![
            vec!["Date", "Gold", "Ethereum", "S&P 500"],
            vec!["2024-03-01", "1834.22", "2510.07", ""],
        ]
    );
}
