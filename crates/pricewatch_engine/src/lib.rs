//! Pricewatch engine: page fetching, workbook storage and the scheduled pipeline.
mod chromium;
mod decode;
mod extract;
mod fetch;
mod http;
mod persist;
mod pipeline;
mod scheduler;
mod store;
mod types;

pub use chromium::{find_chromium, ChromiumBrowser};
pub use decode::{decode_html, DecodeError, DecodedHtml};
pub use extract::{Extractor, SelectorExtractor};
pub use fetch::{Browser, BrowserSession, FetchSettings, PageFetcher};
pub use http::{HttpBrowser, HttpSession};
pub use persist::{AtomicFileWriter, PersistError};
pub use pipeline::{DateSource, PipelineError, PricePipeline, RunReport, TargetFailure};
pub use scheduler::{RunGuard, RunPermit, Scheduler, TriggerOutcome};
pub use store::{AppendOutcome, CellValue, Sheet, StoreError, WorkbookStore};
pub use types::{FailureKind, FetchError};
