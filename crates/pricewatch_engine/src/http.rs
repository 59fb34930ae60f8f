use futures_util::StreamExt;
use pricewatch_logging::watch_debug;
use reqwest::header::CONTENT_TYPE;

use crate::decode::decode_html;
use crate::fetch::{Browser, BrowserSession, FetchSettings};
use crate::{FailureKind, FetchError};

/// Renders nothing: serves the page HTML exactly as the server sends it.
///
/// Good enough for quotes that are part of the served markup.
#[derive(Debug, Clone)]
pub struct HttpBrowser {
    settings: FetchSettings,
}

impl HttpBrowser {
    pub fn new(settings: FetchSettings) -> Self {
        Self { settings }
    }

    fn build_client(&self) -> Result<reqwest::Client, FetchError> {
        reqwest::Client::builder()
            .connect_timeout(self.settings.connect_timeout)
            .timeout(self.settings.navigation_timeout)
            .redirect(reqwest::redirect::Policy::limited(self.settings.redirect_limit))
            .build()
            .map_err(|err| FetchError::new(FailureKind::Network, err.to_string()))
    }
}

#[async_trait::async_trait]
impl Browser for HttpBrowser {
    async fn open_session(&self) -> Result<Box<dyn BrowserSession>, FetchError> {
        Ok(Box::new(HttpSession {
            client: self.build_client()?,
            settings: self.settings.clone(),
            page: None,
        }))
    }
}

pub struct HttpSession {
    client: reqwest::Client,
    settings: FetchSettings,
    page: Option<String>,
}

impl HttpSession {
    fn is_content_type_allowed(&self, content_type: &str) -> bool {
        let ct = content_type.split(';').next().unwrap_or(content_type).trim();
        self.settings
            .allowed_content_types
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(ct))
    }

    async fn download(&self, url: &str) -> Result<String, FetchError> {
        let parsed = reqwest::Url::parse(url)
            .map_err(|err| FetchError::new(FailureKind::InvalidUrl, err.to_string()))?;

        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::new(
                FailureKind::HttpStatus(status.as_u16()),
                status.to_string(),
            ));
        }

        let max_bytes = self.settings.max_bytes;
        if let Some(content_len) = response.content_length() {
            if content_len > max_bytes {
                return Err(too_large(max_bytes, content_len));
            }
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_string());

        if let Some(ct) = content_type.as_deref() {
            if !self.is_content_type_allowed(ct) {
                return Err(FetchError::new(
                    FailureKind::UnsupportedContentType {
                        content_type: ct.to_string(),
                    },
                    "unsupported content type",
                ));
            }
        }

        let mut bytes = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(map_reqwest_error)?;
            let next_len = bytes.len() as u64 + chunk.len() as u64;
            if next_len > max_bytes {
                return Err(too_large(max_bytes, next_len));
            }
            bytes.extend_from_slice(&chunk);
        }
        watch_debug!("Downloaded {} bytes from {}", bytes.len(), url);

        decode_html(&bytes, content_type.as_deref())
            .map(|decoded| decoded.html)
            .map_err(|err| FetchError::new(FailureKind::Decode, err.to_string()))
    }
}

#[async_trait::async_trait]
impl BrowserSession for HttpSession {
    async fn goto(&mut self, url: &str) -> Result<(), FetchError> {
        // Never serve the previous target's markup after a failed load.
        self.page = None;
        self.page = Some(self.download(url).await?);
        Ok(())
    }

    async fn click(&mut self, _selector: &str) -> Result<bool, FetchError> {
        Ok(false)
    }

    async fn content(&mut self) -> Result<String, FetchError> {
        self.page
            .clone()
            .ok_or_else(|| FetchError::new(FailureKind::Navigation, "no page loaded"))
    }

    fn renders_dynamically(&self) -> bool {
        false
    }

    async fn close(self: Box<Self>) -> Result<(), FetchError> {
        Ok(())
    }
}

fn too_large(max_bytes: u64, actual: u64) -> FetchError {
    FetchError::new(
        FailureKind::TooLarge {
            max_bytes,
            actual: Some(actual),
        },
        "response too large",
    )
}

fn map_reqwest_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        return FetchError::new(FailureKind::Timeout, err.to_string());
    }
    if err.is_redirect() {
        return FetchError::new(FailureKind::RedirectLimitExceeded, err.to_string());
    }
    FetchError::new(FailureKind::Network, err.to_string())
}
