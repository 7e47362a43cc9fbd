//! Database operations for the `custom_scraping_urls` table.

use chrono::{DateTime, Utc};
use matscrape_core::{ScheduledScrape, ScrapingUrlConfig};
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A row from `custom_scraping_urls`, joined with the name of its rule.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ScrapingUrlRow {
    pub id: i64,
    pub public_id: Uuid,
    pub url: String,
    pub material_type: String,
    pub rule_id: i64,
    pub rule_name: String,
    pub is_active: bool,
    pub auto_scraping_enabled: bool,
    pub next_auto_scrape_at: Option<DateTime<Utc>>,
    pub last_scraped_at: Option<DateTime<Utc>>,
    /// `success` or `failure`; `None` until the first scrape is recorded.
    pub last_status: Option<String>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ScrapingUrlRow {
    /// The scheduling-relevant view of this row.
    #[must_use]
    pub fn to_config(&self) -> ScrapingUrlConfig {
        ScrapingUrlConfig {
            id: self.id,
            url: self.url.clone(),
            material_type: self.material_type.clone(),
            rule_name: self.rule_name.clone(),
            is_active: self.is_active,
            auto_scraping_enabled: self.auto_scraping_enabled,
            next_auto_scrape_at: self.next_auto_scrape_at,
        }
    }
}

/// Input for [`create_scraping_url`].
#[derive(Debug, Clone)]
pub struct NewScrapingUrl<'a> {
    pub url: &'a str,
    pub material_type: &'a str,
    pub rule_name: &'a str,
    pub is_active: bool,
    pub auto_scraping_enabled: bool,
}

const URL_SELECT: &str = "SELECT u.id, u.public_id, u.url, u.material_type, u.rule_id, \
            r.name AS rule_name, u.is_active, u.auto_scraping_enabled, \
            u.next_auto_scrape_at, u.last_scraped_at, u.last_status, u.last_error, \
            u.created_at, u.updated_at";

// ---------------------------------------------------------------------------
// Writes
// ---------------------------------------------------------------------------

/// Creates a URL entry bound to the rule named `new.rule_name`.
///
/// The entry starts unscheduled (`next_auto_scrape_at` is `NULL`), which
/// makes it due on the next auto-scrape cycle if it is eligible.
///
/// # Errors
///
/// Returns [`DbError::UnknownRule`] if no rule has that name, or
/// [`DbError::Sqlx`] if the insert fails.
pub async fn create_scraping_url(
    pool: &PgPool,
    new: &NewScrapingUrl<'_>,
) -> Result<ScrapingUrlRow, DbError> {
    let row = sqlx::query_as::<_, ScrapingUrlRow>(&format!(
        "WITH u AS ( \
             INSERT INTO custom_scraping_urls \
                 (public_id, url, material_type, rule_id, is_active, auto_scraping_enabled) \
             SELECT $1, $2, $3, r.id, $5, $6 FROM scraping_rules r WHERE r.name = $4 \
             RETURNING * \
         ) \
         {URL_SELECT} FROM u JOIN scraping_rules r ON r.id = u.rule_id"
    ))
    .bind(Uuid::new_v4())
    .bind(new.url.trim())
    .bind(new.material_type.trim())
    .bind(new.rule_name)
    .bind(new.is_active)
    .bind(new.auto_scraping_enabled)
    .fetch_optional(pool)
    .await?;

    row.ok_or_else(|| DbError::UnknownRule(new.rule_name.to_string()))
}

/// Writes every `(id, next_auto_scrape_at)` pair in one transaction.
///
/// Either all entries are updated or none are: if any id does not exist the
/// transaction is rolled back and [`DbError::NotFound`] is returned.
///
/// Returns the number of rows updated.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] for an unknown id, or [`DbError::Sqlx`] if
/// the update fails.
pub async fn apply_schedule(pool: &PgPool, schedule: &[ScheduledScrape]) -> Result<u64, DbError> {
    if schedule.is_empty() {
        return Ok(0);
    }

    let ids: Vec<i64> = schedule.iter().map(|s| s.id).collect();
    let times: Vec<DateTime<Utc>> = schedule.iter().map(|s| s.next_auto_scrape_at).collect();

    let mut tx = pool.begin().await?;

    let result = sqlx::query(
        "UPDATE custom_scraping_urls AS u \
         SET next_auto_scrape_at = s.next_at, updated_at = NOW() \
         FROM UNNEST($1::BIGINT[], $2::TIMESTAMPTZ[]) AS s(id, next_at) \
         WHERE u.id = s.id",
    )
    .bind(&ids)
    .bind(&times)
    .execute(&mut *tx)
    .await?;

    let expected = u64::try_from(schedule.len()).unwrap_or(u64::MAX);
    if result.rows_affected() != expected {
        tx.rollback().await?;
        tracing::warn!(
            expected,
            updated = result.rows_affected(),
            "schedule references missing url entries; rolled back"
        );
        return Err(DbError::NotFound);
    }

    tx.commit().await?;
    Ok(result.rows_affected())
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

/// Returns the entry with `id`, or `None` if not found.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_scraping_url(pool: &PgPool, id: i64) -> Result<Option<ScrapingUrlRow>, DbError> {
    let row = sqlx::query_as::<_, ScrapingUrlRow>(&format!(
        "{URL_SELECT} FROM custom_scraping_urls u \
         JOIN scraping_rules r ON r.id = u.rule_id \
         WHERE u.id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Returns every entry, ordered by id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_scraping_urls(pool: &PgPool) -> Result<Vec<ScrapingUrlRow>, DbError> {
    let rows = sqlx::query_as::<_, ScrapingUrlRow>(&format!(
        "{URL_SELECT} FROM custom_scraping_urls u \
         JOIN scraping_rules r ON r.id = u.rule_id \
         ORDER BY u.id"
    ))
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Returns active entries with auto-scraping enabled, ordered by id. This is
/// the input order for staggered scheduling.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_eligible_scraping_urls(pool: &PgPool) -> Result<Vec<ScrapingUrlRow>, DbError> {
    let rows = sqlx::query_as::<_, ScrapingUrlRow>(&format!(
        "{URL_SELECT} FROM custom_scraping_urls u \
         JOIN scraping_rules r ON r.id = u.rule_id \
         WHERE u.is_active AND u.auto_scraping_enabled \
         ORDER BY u.id"
    ))
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Returns up to `limit` eligible entries that are due at `now`: never
/// scheduled, or scheduled at or before `now`. Never-scheduled entries come
/// first, then the most overdue.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_due_scraping_urls(
    pool: &PgPool,
    now: DateTime<Utc>,
    limit: i64,
) -> Result<Vec<ScrapingUrlRow>, DbError> {
    let rows = sqlx::query_as::<_, ScrapingUrlRow>(&format!(
        "{URL_SELECT} FROM custom_scraping_urls u \
         JOIN scraping_rules r ON r.id = u.rule_id \
         WHERE u.is_active AND u.auto_scraping_enabled \
           AND (u.next_auto_scrape_at IS NULL OR u.next_auto_scrape_at <= $1) \
         ORDER BY u.next_auto_scrape_at NULLS FIRST, u.id \
         LIMIT $2"
    ))
    .bind(now)
    .bind(limit.max(0))
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
