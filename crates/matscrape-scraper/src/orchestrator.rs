//! Rule-driven scrape orchestration: validate → fetch → parse → extract.

use async_trait::async_trait;
use matscrape_core::ScrapingRule;
use reqwest::Url;

use crate::error::ScrapeError;
use crate::extract::extract_page;
use crate::fetch::PageFetcher;
use crate::types::{ScrapeResult, ScrapedData};

/// Applies a [`ScrapingRule`] to a URL.
///
/// Implementations never return errors through a `Result`; every failure is
/// reported as [`ScrapeResult::Failure`]. Callers such as the HTTP handlers
/// and the auto-scrape job depend only on this trait, so an extraction
/// backend can be swapped without touching them.
#[async_trait]
pub trait RuleScraper: Send + Sync {
    async fn scrape_with_rules(&self, rule: &ScrapingRule, target_url: &str) -> ScrapeResult;
}

/// Default [`RuleScraper`]: fetches over HTTP and extracts with CSS selectors.
///
/// Stateless between calls; one instance can serve concurrent scrapes.
#[derive(Debug, Clone)]
pub struct ConfigurableScraper {
    fetcher: PageFetcher,
}

impl ConfigurableScraper {
    #[must_use]
    pub fn new(fetcher: PageFetcher) -> Self {
        Self { fetcher }
    }

    /// Builds a scraper with its own HTTP client.
    ///
    /// # Errors
    ///
    /// Returns [`reqwest::Error`] if the HTTP client cannot be constructed.
    pub fn from_settings(timeout_secs: u64, user_agent: &str) -> Result<Self, reqwest::Error> {
        PageFetcher::new(timeout_secs, user_agent).map(Self::new)
    }

    async fn try_scrape(
        &self,
        rule: &ScrapingRule,
        target_url: &str,
    ) -> Result<ScrapedData, ScrapeError> {
        let url = prepare_target(rule, target_url)?;

        let page = self.fetcher.fetch(&url).await?;
        if !page.is_html_like() {
            return Err(ScrapeError::ParseFailed {
                reason: format!(
                    "unsupported content type '{}'",
                    page.content_type.as_deref().unwrap_or_default()
                ),
            });
        }

        extract_page(rule, &page.body, Some(&page.final_url))
    }
}

#[async_trait]
impl RuleScraper for ConfigurableScraper {
    async fn scrape_with_rules(&self, rule: &ScrapingRule, target_url: &str) -> ScrapeResult {
        let result = self.try_scrape(rule, target_url).await;

        match &result {
            Ok(data) => tracing::debug!(
                rule = %rule.name,
                url = target_url,
                price = data.price,
                "scrape succeeded"
            ),
            Err(err) => tracing::info!(
                rule = %rule.name,
                url = target_url,
                kind = %err.kind(),
                error = %err,
                "scrape failed"
            ),
        }

        result.into()
    }
}

/// Checks the rule and target before any network traffic happens.
///
/// # Errors
///
/// Returns [`ScrapeError::InvalidRule`] when the rule fails validation, the
/// URL is blank or unparsable, or the URL falls outside `url_pattern`.
fn prepare_target(rule: &ScrapingRule, target_url: &str) -> Result<Url, ScrapeError> {
    rule.validate()
        .map_err(|e| ScrapeError::invalid_rule(e.to_string()))?;

    let target = target_url.trim();
    if target.is_empty() {
        return Err(ScrapeError::invalid_rule("target URL is empty"));
    }

    let url = Url::parse(target)
        .map_err(|e| ScrapeError::invalid_rule(format!("target URL \"{target}\" is invalid: {e}")))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ScrapeError::invalid_rule(format!(
            "target URL \"{target}\" must use http or https"
        )));
    }

    if !rule.matches_url(target) {
        return Err(ScrapeError::invalid_rule(format!(
            "target URL \"{target}\" does not match pattern \"{}\" of rule '{}'",
            rule.url_pattern, rule.name
        )));
    }

    Ok(url)
}
