//! `run-due` command handler: one manual auto-scrape cycle.
//!
//! Runs the same cycle as the server's scheduled job so it can be driven
//! from cron or by hand without the server.

use anyhow::Context;
use chrono::Utc;
use matscrape_core::AppConfig;
use matscrape_pipeline::CycleSummary;
use matscrape_scraper::ConfigurableScraper;

/// Scrapes up to `limit` due URLs (default `auto_scrape_batch_limit`),
/// records each outcome and prints the cycle summary as JSON.
///
/// # Errors
///
/// Returns an error if the HTTP client cannot be built, the due URLs or
/// rules cannot be loaded, or no outcome could be recorded.
pub(crate) async fn run_due(
    pool: &sqlx::PgPool,
    config: &AppConfig,
    limit: Option<i64>,
) -> anyhow::Result<()> {
    let scraper = ConfigurableScraper::from_settings(
        config.scraper_request_timeout_secs,
        &config.scraper_user_agent,
    )
    .context("failed to build HTTP client")?;

    let limit = limit.unwrap_or(config.auto_scrape_batch_limit);
    let summary =
        matscrape_pipeline::run_auto_scrape_cycle(pool, &scraper, config, limit, Utc::now())
            .await?;

    println!("{}", serde_json::to_string_pretty(&summary)?);
    check_recorded(&summary)
}

fn check_recorded(summary: &CycleSummary) -> anyhow::Result<()> {
    if summary.due > 0 && summary.not_recorded == summary.due {
        anyhow::bail!(
            "none of the {} scrape results could be recorded",
            summary.not_recorded
        );
    }
    Ok(())
}
