//! Bounded-concurrency execution of many independent scrapes.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use matscrape_core::ScrapingRule;

use crate::orchestrator::RuleScraper;
use crate::types::ScrapeResult;

/// One unit of work: apply `rule` to `url`, tagged with the caller's `id`.
#[derive(Debug, Clone)]
pub struct ScrapeJob {
    pub id: i64,
    pub rule: Arc<ScrapingRule>,
    pub url: String,
}

/// Runs `jobs` with at most `max_concurrent` scrapes in flight.
///
/// Results arrive in completion order, each paired with its job id. A
/// `max_concurrent` of zero is treated as one.
pub async fn scrape_many<S>(
    scraper: &S,
    jobs: Vec<ScrapeJob>,
    max_concurrent: usize,
) -> Vec<(i64, ScrapeResult)>
where
    S: RuleScraper + ?Sized,
{
    stream::iter(jobs)
        .map(|job| async move {
            let result = scraper.scrape_with_rules(&job.rule, &job.url).await;
            (job.id, result)
        })
        .buffer_unordered(max_concurrent.max(1))
        .collect()
        .await
}
