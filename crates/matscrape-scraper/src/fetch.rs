//! HTTP page fetching for rule-driven scrapes.

use std::time::Duration;

use reqwest::{Client, Url};

use crate::error::ScrapeError;

/// Connection establishment is capped separately from the whole request.
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// A fetched page, body already read.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// URL after redirects; relative links on the page resolve against it.
    pub final_url: Url,
    pub status: u16,
    pub content_type: Option<String>,
    pub body: String,
}

impl FetchedPage {
    /// `true` when the declared content type is something an HTML parser can
    /// make sense of. A missing header is given the benefit of the doubt.
    #[must_use]
    pub fn is_html_like(&self) -> bool {
        let Some(content_type) = self.content_type.as_deref() else {
            return true;
        };
        let mime = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        matches!(
            mime.as_str(),
            "" | "text/html" | "application/xhtml+xml" | "text/plain" | "application/xml" | "text/xml"
        )
    }
}

/// Thin `reqwest` wrapper with a bounded per-request timeout.
///
/// Performs a single attempt per call. Retrying is left to the caller.
#[derive(Debug, Clone)]
pub struct PageFetcher {
    client: Client,
}

impl PageFetcher {
    /// Builds a fetcher whose requests give up after `timeout_secs`.
    ///
    /// # Errors
    ///
    /// Returns [`reqwest::Error`] if the underlying client cannot be built
    /// (e.g., TLS backend initialisation failure).
    pub fn new(timeout_secs: u64, user_agent: &str) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS.min(timeout_secs)))
            .user_agent(user_agent)
            .build()?;
        Ok(Self { client })
    }

    /// GETs `url` and reads the body as text.
    ///
    /// # Errors
    ///
    /// Returns [`ScrapeError::FetchFailed`] for non-2xx responses (with the
    /// status), and for transport errors, timeouts, or unreadable bodies
    /// (status `None` unless the server already answered).
    pub async fn fetch(&self, url: &Url) -> Result<FetchedPage, ScrapeError> {
        let response = self
            .client
            .get(url.clone())
            .header(
                reqwest::header::ACCEPT,
                "text/html,application/xhtml+xml;q=0.9,*/*;q=0.8",
            )
            .header(reqwest::header::ACCEPT_LANGUAGE, "tr-TR,tr;q=0.9,en;q=0.8")
            .header(reqwest::header::CACHE_CONTROL, "no-cache")
            .send()
            .await
            .map_err(|e| transport_error(url, &e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ScrapeError::FetchFailed {
                url: url.to_string(),
                status: Some(status.as_u16()),
                reason: format!("HTTP {status}"),
            });
        }

        let final_url = response.url().clone();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);

        let body = response.text().await.map_err(|e| ScrapeError::FetchFailed {
            url: url.to_string(),
            status: Some(status.as_u16()),
            reason: format!("failed to read body: {e}"),
        })?;

        Ok(FetchedPage {
            final_url,
            status: status.as_u16(),
            content_type,
            body,
        })
    }
}

fn transport_error(url: &Url, err: &reqwest::Error) -> ScrapeError {
    let reason = if err.is_timeout() {
        "request timed out".to_string()
    } else if err.is_connect() {
        format!("connection failed: {err}")
    } else {
        err.to_string()
    };
    ScrapeError::FetchFailed {
        url: url.to_string(),
        status: err.status().map(|s| s.as_u16()),
        reason,
    }
}
