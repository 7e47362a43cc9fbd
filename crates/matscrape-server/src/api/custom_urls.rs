//! Custom scraping URL handlers: rule testing, schedule assignment and
//! URL entry admin.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, TimeDelta, Utc};
use matscrape_core::{ScheduleError, ScrapingRule, ScrapingUrlConfig};
use matscrape_db::{NewScrapingUrl, ScrapeResultRow, ScrapingUrlRow};
use matscrape_scraper::ScrapeResult;
use reqwest::Url;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::middleware::RequestId;

use super::{map_db_error, ApiError, ApiResponse, AppState};

const RECENT_RESULTS_LIMIT: i64 = 10;

// ---------------------------------------------------------------------------
// Request bodies
// ---------------------------------------------------------------------------

/// Exactly one of `rule` (inline) or `rule_name` (stored) must be given.
#[derive(Debug, Deserialize)]
pub(super) struct TestScrapeRequest {
    pub url: String,
    #[serde(default)]
    pub rule: Option<ScrapingRule>,
    #[serde(default)]
    pub rule_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct ScheduleRequest {
    /// Defaults to `MATSCRAPE_SCHEDULE_INTERVAL_MINUTES`.
    pub interval_minutes: Option<i64>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub(super) struct CreateUrlRequest {
    pub url: String,
    pub material_type: String,
    pub rule_name: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default = "default_true")]
    pub auto_scraping_enabled: bool,
}

// ---------------------------------------------------------------------------
// Response bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub(super) struct ScheduleSummary {
    scheduled: usize,
    interval_minutes: i64,
    first_at: DateTime<Utc>,
    last_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub(super) struct ImmediateSummary {
    scheduled: usize,
    scheduled_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub(super) struct UrlItem {
    id: i64,
    public_id: Uuid,
    url: String,
    material_type: String,
    rule_name: String,
    is_active: bool,
    auto_scraping_enabled: bool,
    next_auto_scrape_at: Option<DateTime<Utc>>,
    last_scraped_at: Option<DateTime<Utc>>,
    last_status: Option<String>,
    last_error: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<ScrapingUrlRow> for UrlItem {
    fn from(row: ScrapingUrlRow) -> Self {
        Self {
            id: row.id,
            public_id: row.public_id,
            url: row.url,
            material_type: row.material_type,
            rule_name: row.rule_name,
            is_active: row.is_active,
            auto_scraping_enabled: row.auto_scraping_enabled,
            next_auto_scrape_at: row.next_auto_scrape_at,
            last_scraped_at: row.last_scraped_at,
            last_status: row.last_status,
            last_error: row.last_error,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub(super) struct ResultItem {
    success: bool,
    price: Option<Decimal>,
    title: Option<String>,
    availability: Option<String>,
    image_url: Option<String>,
    error_kind: Option<String>,
    error_message: Option<String>,
    scraped_at: DateTime<Utc>,
}

impl From<ScrapeResultRow> for ResultItem {
    fn from(row: ScrapeResultRow) -> Self {
        Self {
            success: row.success,
            price: row.price,
            title: row.title,
            availability: row.availability,
            image_url: row.image_url,
            error_kind: row.error_kind,
            error_message: row.error_message,
            scraped_at: row.scraped_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub(super) struct UrlDetail {
    #[serde(flatten)]
    url: UrlItem,
    recent_results: Vec<ResultItem>,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn validation_error(req_id: &str, message: impl Into<String>) -> ApiError {
    ApiError::new(req_id, "validation_error", message)
}

async fn resolve_rule(
    state: &AppState,
    req_id: &str,
    rule: Option<ScrapingRule>,
    rule_name: Option<&str>,
) -> Result<ScrapingRule, ApiError> {
    match (rule, rule_name) {
        (Some(rule), None) => Ok(rule),
        (None, Some(name)) => {
            let row = matscrape_db::get_scraping_rule_by_name(&state.pool, name)
                .await
                .map_err(|e| map_db_error(req_id.to_owned(), &e))?
                .ok_or_else(|| {
                    ApiError::new(
                        req_id,
                        "not_found",
                        format!("scraping rule '{name}' not found"),
                    )
                })?;
            row.to_rule()
                .map_err(|e| map_db_error(req_id.to_owned(), &e))
        }
        _ => Err(validation_error(
            req_id,
            "provide exactly one of 'rule' or 'rule_name'",
        )),
    }
}

fn interval_from_minutes(req_id: &str, minutes: i64) -> Result<TimeDelta, ApiError> {
    TimeDelta::try_minutes(minutes)
        .filter(|d| *d > TimeDelta::zero())
        .ok_or_else(|| {
            validation_error(
                req_id,
                format!("interval_minutes must be a positive number of minutes, got {minutes}"),
            )
        })
}

fn map_schedule_error(req_id: &str, err: &ScheduleError) -> ApiError {
    validation_error(req_id, err.to_string())
}

async fn load_eligible(state: &AppState, req_id: &str) -> Result<Vec<ScrapingUrlConfig>, ApiError> {
    let rows = matscrape_db::list_eligible_scraping_urls(&state.pool)
        .await
        .map_err(|e| map_db_error(req_id.to_owned(), &e))?;
    Ok(rows.iter().map(ScrapingUrlRow::to_config).collect())
}

fn no_eligible_urls(req_id: &str) -> ApiError {
    ApiError::new(
        req_id,
        "no_eligible_urls",
        "no active URLs with auto-scraping enabled",
    )
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /api/v1/custom-urls/test: Run a rule against a URL without
/// persisting anything.
pub(super) async fn test_scrape(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<TestScrapeRequest>,
) -> Result<Json<ApiResponse<ScrapeResult>>, ApiError> {
    let rid = &req_id.0;
    let rule = resolve_rule(&state, rid, body.rule, body.rule_name.as_deref()).await?;

    match state.scraper.scrape_with_rules(&rule, &body.url).await {
        success @ ScrapeResult::Success(_) => Ok(Json(ApiResponse::new(req_id.0, success))),
        ScrapeResult::Failure(err) => {
            let details = serde_json::to_value(&err).unwrap_or(serde_json::Value::Null);
            Err(ApiError::new(rid, "scrape_failed", err.to_string()).with_details(details))
        }
    }
}

/// POST /api/v1/custom-urls/schedule: Stagger every eligible URL
/// `interval_minutes` apart starting now. The body may be omitted.
pub(super) async fn schedule_batch(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    body: Option<Json<ScheduleRequest>>,
) -> Result<Json<ApiResponse<ScheduleSummary>>, ApiError> {
    let rid = &req_id.0;
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let minutes = body
        .interval_minutes
        .unwrap_or(state.config.schedule_interval_minutes);
    let interval = interval_from_minutes(rid, minutes)?;

    let eligible = load_eligible(&state, rid).await?;
    let schedule = matscrape_core::schedule_batch(&eligible, interval, Utc::now())
        .map_err(|e| map_schedule_error(rid, &e))?;

    let (Some(first), Some(last)) = (schedule.first(), schedule.last()) else {
        return Err(no_eligible_urls(rid));
    };
    let (first_at, last_at) = (first.next_auto_scrape_at, last.next_auto_scrape_at);

    matscrape_db::apply_schedule(&state.pool, &schedule)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;

    tracing::info!(
        scheduled = schedule.len(),
        interval_minutes = minutes,
        %first_at,
        %last_at,
        "staggered schedule applied"
    );

    Ok(Json(ApiResponse::new(
        req_id.0,
        ScheduleSummary {
            scheduled: schedule.len(),
            interval_minutes: minutes,
            first_at,
            last_at,
        },
    )))
}

/// POST /api/v1/custom-urls/schedule/immediate: Make every eligible URL
/// due now.
pub(super) async fn schedule_immediate(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Result<Json<ApiResponse<ImmediateSummary>>, ApiError> {
    let rid = &req_id.0;
    let now = Utc::now();

    let eligible = load_eligible(&state, rid).await?;
    let schedule = matscrape_core::schedule_immediate(&eligible, now);
    if schedule.is_empty() {
        return Err(no_eligible_urls(rid));
    }

    matscrape_db::apply_schedule(&state.pool, &schedule)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;

    tracing::info!(scheduled = schedule.len(), "immediate schedule applied");

    Ok(Json(ApiResponse::new(
        req_id.0,
        ImmediateSummary {
            scheduled: schedule.len(),
            scheduled_at: now,
        },
    )))
}

/// GET /api/v1/custom-urls
pub(super) async fn list_urls(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Result<Json<ApiResponse<Vec<UrlItem>>>, ApiError> {
    let rows = matscrape_db::list_scraping_urls(&state.pool)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let data = rows.into_iter().map(UrlItem::from).collect();
    Ok(Json(ApiResponse::new(req_id.0, data)))
}

/// GET /api/v1/custom-urls/{id}: The entry plus its latest results.
pub(super) async fn get_url(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<UrlDetail>>, ApiError> {
    let rid = &req_id.0;
    let row = matscrape_db::get_scraping_url(&state.pool, id)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?
        .ok_or_else(|| ApiError::new(rid, "not_found", format!("custom url {id} not found")))?;

    let results = matscrape_db::list_scrape_results_for_url(&state.pool, id, RECENT_RESULTS_LIMIT)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;

    Ok(Json(ApiResponse::new(
        req_id.0,
        UrlDetail {
            url: UrlItem::from(row),
            recent_results: results.into_iter().map(ResultItem::from).collect(),
        },
    )))
}

/// POST /api/v1/custom-urls: Register a URL under an existing rule.
pub(super) async fn create_url(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<CreateUrlRequest>,
) -> Result<(StatusCode, Json<ApiResponse<UrlItem>>), ApiError> {
    let rid = &req_id.0;

    let url = body.url.trim();
    match Url::parse(url) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
        _ => {
            return Err(validation_error(
                rid,
                format!("'url' must be an absolute http(s) URL, got '{url}'"),
            ))
        }
    }
    if body.material_type.trim().is_empty() {
        return Err(validation_error(rid, "'material_type' must be non-empty"));
    }

    let rule = resolve_rule(&state, rid, None, Some(&body.rule_name))
        .await
        .map_err(|e| {
            if e.error.code == "not_found" {
                validation_error(rid, e.error.message)
            } else {
                e
            }
        })?;
    if !rule.matches_url(url) {
        return Err(validation_error(
            rid,
            format!(
                "'{url}' does not match pattern '{}' of rule '{}'",
                rule.url_pattern, rule.name
            ),
        ));
    }

    let row = matscrape_db::create_scraping_url(
        &state.pool,
        &NewScrapingUrl {
            url,
            material_type: &body.material_type,
            rule_name: &body.rule_name,
            is_active: body.is_active,
            auto_scraping_enabled: body.auto_scraping_enabled,
        },
    )
    .await
    .map_err(|e| match e {
        matscrape_db::DbError::UnknownRule(name) => {
            validation_error(rid, format!("scraping rule '{name}' not found"))
        }
        other => map_db_error(rid.clone(), &other),
    })?;

    tracing::info!(id = row.id, url = %row.url, rule = %row.rule_name, "custom url created");

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::new(req_id.0, UrlItem::from(row))),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_rejects_zero_and_negative() {
        assert!(interval_from_minutes("r", 0).is_err());
        assert!(interval_from_minutes("r", -5).is_err());
        assert!(interval_from_minutes("r", i64::MAX).is_err());
        assert_eq!(
            interval_from_minutes("r", 5).unwrap(),
            TimeDelta::minutes(5)
        );
    }

    #[test]
    fn create_request_defaults_flags_to_true() {
        let body: CreateUrlRequest = serde_json::from_str(
            r#"{"url":"https://shop.example/p/1","material_type":"cement","rule_name":"shop"}"#,
        )
        .unwrap();
        assert!(body.is_active);
        assert!(body.auto_scraping_enabled);
    }
}
