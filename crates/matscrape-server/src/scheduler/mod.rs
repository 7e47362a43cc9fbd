//! Background job scheduler.
//!
//! Initialises a [`JobScheduler`] at server startup and registers the
//! recurring auto-scrape job.

use std::sync::Arc;

use chrono::Utc;
use matscrape_core::AppConfig;
use matscrape_pipeline::run_auto_scrape_cycle;
use matscrape_scraper::RuleScraper;
use sqlx::PgPool;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

/// Builds and starts the background job scheduler.
///
/// Returns the running [`JobScheduler`] handle, which must be kept alive
/// for the lifetime of the process. Dropping it shuts down all jobs.
///
/// # Errors
///
/// Returns [`JobSchedulerError`] if the scheduler cannot be initialised,
/// the cron expression is rejected, or the scheduler fails to start.
pub async fn build_scheduler(
    pool: PgPool,
    scraper: Arc<dyn RuleScraper>,
    config: Arc<AppConfig>,
) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;

    register_auto_scrape_job(&scheduler, pool, scraper, config).await?;

    scheduler.start().await?;
    Ok(scheduler)
}

/// Registers the auto-scrape job on `config.auto_scrape_cron`.
///
/// Each run scrapes the URLs that are due, records every outcome and moves
/// the processed entries one interval forward. There is no retry within a
/// run; a failed URL is simply due again on a later run.
async fn register_auto_scrape_job(
    scheduler: &JobScheduler,
    pool: PgPool,
    scraper: Arc<dyn RuleScraper>,
    config: Arc<AppConfig>,
) -> Result<(), JobSchedulerError> {
    let cron = config.auto_scrape_cron.clone();

    let job = Job::new_async(cron.as_str(), move |_uuid, _lock| {
        let pool = pool.clone();
        let scraper = Arc::clone(&scraper);
        let config = Arc::clone(&config);

        Box::pin(async move {
            match run_auto_scrape_cycle(
                &pool,
                scraper.as_ref(),
                &config,
                config.auto_scrape_batch_limit,
                Utc::now(),
            )
            .await
            {
                Ok(summary) if summary.due == 0 => {
                    tracing::debug!("scheduler: no custom urls due");
                }
                Ok(summary) => {
                    tracing::info!(
                        due = summary.due,
                        succeeded = summary.succeeded,
                        failed = summary.failed,
                        not_recorded = summary.not_recorded,
                        "scheduler: auto-scrape run complete"
                    );
                }
                Err(e) => {
                    tracing::error!(error = %e, "scheduler: auto-scrape run aborted");
                }
            }
        })
    })?;

    scheduler.add(job).await?;
    tracing::info!(cron = %cron, "scheduler: auto-scrape job registered");
    Ok(())
}
