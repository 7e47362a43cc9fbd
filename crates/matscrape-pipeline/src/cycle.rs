//! One auto-scrape cycle: load due URLs, scrape them, record outcomes.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use matscrape_core::{AppConfig, ScrapingRule};
use matscrape_db::{DbError, NewScrapeResult};
use matscrape_scraper::{scrape_many, RuleScraper, ScrapeError, ScrapeJob, ScrapeResult};
use serde::Serialize;
use sqlx::PgPool;

/// Counts for one cycle. `not_recorded` are outcomes that could not be
/// written; they stay due and are picked up again next cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CycleSummary {
    pub due: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub not_recorded: usize,
}

enum Recorded {
    Succeeded,
    Failed,
}

/// Runs one auto-scrape cycle as of `now`.
///
/// Loads up to `limit` due URLs, scrapes them with at most
/// `scraper_max_concurrent` in flight, records every outcome and sets each
/// processed entry's next run to `now + schedule_interval_minutes`.
///
/// # Errors
///
/// Returns [`DbError`] only when the due URLs or the rules cannot be
/// loaded. Failures to record single outcomes are logged and counted.
pub async fn run_auto_scrape_cycle(
    pool: &PgPool,
    scraper: &dyn RuleScraper,
    config: &AppConfig,
    limit: i64,
    now: DateTime<Utc>,
) -> Result<CycleSummary, DbError> {
    let due = matscrape_db::list_due_scraping_urls(pool, now, limit).await?;
    let mut summary = CycleSummary {
        due: due.len(),
        ..CycleSummary::default()
    };
    if due.is_empty() {
        return Ok(summary);
    }

    let rules = load_rules(pool).await?;
    let next_at = TimeDelta::try_minutes(config.schedule_interval_minutes)
        .and_then(|interval| now.checked_add_signed(interval));

    let mut outcomes = Vec::with_capacity(due.len());
    let mut jobs = Vec::with_capacity(due.len());
    for row in &due {
        match rules.get(&row.rule_name) {
            Some(Ok(rule)) => jobs.push(ScrapeJob {
                id: row.id,
                rule: Arc::clone(rule),
                url: row.url.clone(),
            }),
            Some(Err(reason)) => outcomes.push((row.id, invalid_rule(reason.clone()))),
            None => outcomes.push((
                row.id,
                invalid_rule(format!("scraping rule '{}' does not exist", row.rule_name)),
            )),
        }
    }

    outcomes.extend(scrape_many(scraper, jobs, config.scraper_max_concurrent).await);

    for (id, result) in &outcomes {
        if let ScrapeResult::Failure(err) = result {
            tracing::warn!(url_id = id, kind = err.kind().as_str(), error = %err, "scrape failed");
        }
        match record(pool, *id, result, next_at).await {
            Ok(Recorded::Succeeded) => summary.succeeded += 1,
            Ok(Recorded::Failed) => summary.failed += 1,
            Err(e) => {
                tracing::error!(url_id = id, error = %e, "failed to record scrape result");
                summary.not_recorded += 1;
            }
        }
    }

    Ok(summary)
}

/// Writes one outcome. A price the store cannot hold is written as a
/// `price_out_of_range` failure so the entry still moves forward.
async fn record(
    pool: &PgPool,
    id: i64,
    result: &ScrapeResult,
    next_at: Option<DateTime<Utc>>,
) -> Result<Recorded, DbError> {
    match matscrape_db::record_scrape_result(pool, id, &to_new_result(result), Utc::now(), next_at)
        .await
    {
        Ok(_) if result.is_success() => Ok(Recorded::Succeeded),
        Ok(_) => Ok(Recorded::Failed),
        Err(DbError::PriceOutOfRange(value)) => {
            let err = ScrapeError::PriceOutOfRange { value };
            tracing::warn!(url_id = id, value, "price too large to store; recording as failure");
            let failure = NewScrapeResult::Failure {
                error_kind: err.kind().as_str(),
                error_message: err.to_string(),
            };
            matscrape_db::record_scrape_result(pool, id, &failure, Utc::now(), next_at).await?;
            Ok(Recorded::Failed)
        }
        Err(e) => Err(e),
    }
}

/// Loads every rule keyed by name. Rows that no longer convert keep their
/// conversion error so the URLs using them are recorded as failures.
async fn load_rules(
    pool: &PgPool,
) -> Result<HashMap<String, Result<Arc<ScrapingRule>, String>>, DbError> {
    let rows = matscrape_db::list_scraping_rules(pool).await?;
    Ok(rows
        .into_iter()
        .map(|row| {
            let rule = row.to_rule().map(Arc::new).map_err(|e| e.to_string());
            (row.name, rule)
        })
        .collect())
}

fn invalid_rule(reason: String) -> ScrapeResult {
    ScrapeResult::Failure(ScrapeError::InvalidRule { reason })
}

fn to_new_result(result: &ScrapeResult) -> NewScrapeResult<'_> {
    match result {
        ScrapeResult::Success(data) => NewScrapeResult::Success {
            price: data.price,
            title: data.title.as_deref(),
            availability: data.availability.as_deref(),
            image_url: data.image.as_deref(),
        },
        ScrapeResult::Failure(err) => NewScrapeResult::Failure {
            error_kind: err.kind().as_str(),
            error_message: err.to_string(),
        },
    }
}

#[cfg(test)]
#[path = "cycle_test.rs"]
mod tests;
