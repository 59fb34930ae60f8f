use scraper::{Html, Selector};

use crate::{FailureKind, FetchError};

/// Pulls the price text out of a rendered page.
///
/// One strategy per target keeps site-specific markup out of the pipeline.
pub trait Extractor: Send + Sync {
    /// Text of the price element, or `None` if it is not on the page (yet).
    fn extract(&self, html: &str) -> Option<String>;
    fn describe(&self) -> &str;
}

/// Text content of the first element matching a CSS/attribute selector.
#[derive(Debug, Clone)]
pub struct SelectorExtractor {
    raw: String,
    selector: Selector,
}

impl SelectorExtractor {
    pub fn parse(raw: &str) -> Result<Self, FetchError> {
        let selector = Selector::parse(raw).map_err(|err| {
            FetchError::new(FailureKind::InvalidSelector, format!("{raw}: {err}"))
        })?;
        Ok(Self {
            raw: raw.to_string(),
            selector,
        })
    }
}

impl Extractor for SelectorExtractor {
    fn extract(&self, html: &str) -> Option<String> {
        let doc = Html::parse_document(html);
        doc.select(&self.selector)
            .next()
            .map(|node| node.text().collect::<String>())
    }

    fn describe(&self) -> &str {
        &self.raw
    }
}
