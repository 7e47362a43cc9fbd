//! Database operations for `scrape_results`, plus the `last_*` bookkeeping
//! columns on `custom_scraping_urls` that every recorded result updates.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;

use crate::DbError;

/// `scrape_results.price` is `NUMERIC(20, 4)`.
const PRICE_SCALE: u32 = 4;
const PRICE_LIMIT: f64 = 1e16;

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A row from the `scrape_results` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ScrapeResultRow {
    pub id: i64,
    pub custom_url_id: i64,
    pub success: bool,
    pub price: Option<Decimal>,
    pub title: Option<String>,
    pub availability: Option<String>,
    pub image_url: Option<String>,
    pub error_kind: Option<String>,
    pub error_message: Option<String>,
    pub scraped_at: DateTime<Utc>,
}

/// A scrape outcome flattened into storable columns.
#[derive(Debug, Clone, PartialEq)]
pub enum NewScrapeResult<'a> {
    Success {
        price: f64,
        title: Option<&'a str>,
        availability: Option<&'a str>,
        image_url: Option<&'a str>,
    },
    Failure {
        error_kind: &'a str,
        error_message: String,
    },
}

impl NewScrapeResult<'_> {
    fn status(&self) -> &'static str {
        match self {
            NewScrapeResult::Success { .. } => "success",
            NewScrapeResult::Failure { .. } => "failure",
        }
    }
}

fn price_to_decimal(price: f64) -> Result<Decimal, DbError> {
    if !price.is_finite() || !(0.0..PRICE_LIMIT).contains(&price) {
        return Err(DbError::PriceOutOfRange(price));
    }
    Decimal::try_from(price)
        .map(|d| d.round_dp(PRICE_SCALE))
        .map_err(|_| DbError::PriceOutOfRange(price))
}

const RESULT_COLUMNS: &str = "id, custom_url_id, success, price, title, availability, image_url, \
     error_kind, error_message, scraped_at";

// ---------------------------------------------------------------------------
// Writes
// ---------------------------------------------------------------------------

/// Stores one scrape outcome for `custom_url_id` and updates the entry's
/// `last_scraped_at`, `last_status` and `last_error` in the same
/// transaction. When `next_auto_scrape_at` is given it is written too.
///
/// # Errors
///
/// Returns [`DbError::PriceOutOfRange`] if the price cannot be stored,
/// [`DbError::NotFound`] if the entry does not exist (nothing is written),
/// or [`DbError::Sqlx`] if any statement fails.
pub async fn record_scrape_result(
    pool: &PgPool,
    custom_url_id: i64,
    result: &NewScrapeResult<'_>,
    scraped_at: DateTime<Utc>,
    next_auto_scrape_at: Option<DateTime<Utc>>,
) -> Result<ScrapeResultRow, DbError> {
    let (price, title, availability, image_url, error_kind, error_message) = match result {
        NewScrapeResult::Success {
            price,
            title,
            availability,
            image_url,
        } => (
            Some(price_to_decimal(*price)?),
            *title,
            *availability,
            *image_url,
            None,
            None,
        ),
        NewScrapeResult::Failure {
            error_kind,
            error_message,
        } => (
            None,
            None,
            None,
            None,
            Some(*error_kind),
            Some(error_message.as_str()),
        ),
    };

    let mut tx = pool.begin().await?;

    let updated = sqlx::query(
        "UPDATE custom_scraping_urls \
         SET last_scraped_at = $2, \
             last_status = $3, \
             last_error = $4, \
             next_auto_scrape_at = COALESCE($5, next_auto_scrape_at), \
             updated_at = NOW() \
         WHERE id = $1",
    )
    .bind(custom_url_id)
    .bind(scraped_at)
    .bind(result.status())
    .bind(error_message)
    .bind(next_auto_scrape_at)
    .execute(&mut *tx)
    .await?;

    if updated.rows_affected() == 0 {
        tx.rollback().await?;
        return Err(DbError::NotFound);
    }

    let row = sqlx::query_as::<_, ScrapeResultRow>(&format!(
        "INSERT INTO scrape_results \
             (custom_url_id, success, price, title, availability, image_url, \
              error_kind, error_message, scraped_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
         RETURNING {RESULT_COLUMNS}"
    ))
    .bind(custom_url_id)
    .bind(matches!(result, NewScrapeResult::Success { .. }))
    .bind(price)
    .bind(title)
    .bind(availability)
    .bind(image_url)
    .bind(error_kind)
    .bind(error_message)
    .bind(scraped_at)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(row)
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

/// Returns the most recent results for one entry, newest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_scrape_results_for_url(
    pool: &PgPool,
    custom_url_id: i64,
    limit: i64,
) -> Result<Vec<ScrapeResultRow>, DbError> {
    let rows = sqlx::query_as::<_, ScrapeResultRow>(&format!(
        "SELECT {RESULT_COLUMNS} FROM scrape_results \
         WHERE custom_url_id = $1 \
         ORDER BY scraped_at DESC, id DESC \
         LIMIT $2"
    ))
    .bind(custom_url_id)
    .bind(limit.max(0))
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
