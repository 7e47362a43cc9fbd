//! `schedule` command handler.

use chrono::{TimeDelta, Utc};
use matscrape_core::ScrapingUrlConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ScheduleMode {
    Staggered { interval_minutes: i64 },
    Immediate,
}

/// Computes a schedule for every eligible custom URL and persists it in one
/// transaction, then prints a JSON summary.
///
/// # Errors
///
/// Returns an error if the interval is not positive, no URL is eligible, or
/// the schedule cannot be written.
pub(crate) async fn run_schedule(pool: &sqlx::PgPool, mode: ScheduleMode) -> anyhow::Result<()> {
    let eligible: Vec<ScrapingUrlConfig> = matscrape_db::list_eligible_scraping_urls(pool)
        .await?
        .iter()
        .map(matscrape_db::ScrapingUrlRow::to_config)
        .collect();

    let now = Utc::now();
    let schedule = match mode {
        ScheduleMode::Staggered { interval_minutes } => {
            let interval = TimeDelta::try_minutes(interval_minutes).ok_or_else(|| {
                anyhow::anyhow!("interval of {interval_minutes} minutes is out of range")
            })?;
            matscrape_core::schedule_batch(&eligible, interval, now)?
        }
        ScheduleMode::Immediate => matscrape_core::schedule_immediate(&eligible, now),
    };

    let (Some(first), Some(last)) = (schedule.first(), schedule.last()) else {
        anyhow::bail!("no active custom URLs with auto-scraping enabled");
    };

    let updated = matscrape_db::apply_schedule(pool, &schedule).await?;
    tracing::info!(updated, ?mode, "custom urls scheduled");

    let summary = serde_json::json!({
        "scheduled": updated,
        "first_at": first.next_auto_scrape_at,
        "last_at": last.next_auto_scrape_at,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
