//! Scraping rule admin handlers.

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use matscrape_core::{PriceFormat, RuleSelectors, ScrapingRule};
use matscrape_db::{DbError, ScrapingRuleRow};
use serde::Serialize;

use crate::middleware::RequestId;

use super::{map_db_error, ApiError, ApiResponse, AppState};

#[derive(Debug, Serialize)]
pub(super) struct RuleItem {
    id: i64,
    name: String,
    url_pattern: String,
    selectors: RuleSelectors,
    price_format: PriceFormat,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

fn to_item(req_id: &str, row: ScrapingRuleRow) -> Result<RuleItem, ApiError> {
    let rule = row
        .to_rule()
        .map_err(|e| map_db_error(req_id.to_owned(), &e))?;
    Ok(RuleItem {
        id: row.id,
        name: rule.name,
        url_pattern: rule.url_pattern,
        selectors: rule.selectors,
        price_format: rule.price_format,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

/// GET /api/v1/scraping-rules
pub(super) async fn list_rules(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Result<Json<ApiResponse<Vec<RuleItem>>>, ApiError> {
    let rows = matscrape_db::list_scraping_rules(&state.pool)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let data = rows
        .into_iter()
        .map(|row| to_item(&req_id.0, row))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(ApiResponse::new(req_id.0, data)))
}

/// GET /api/v1/scraping-rules/{name}
pub(super) async fn get_rule(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(name): Path<String>,
) -> Result<Json<ApiResponse<RuleItem>>, ApiError> {
    let row = matscrape_db::get_scraping_rule_by_name(&state.pool, &name)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?
        .ok_or_else(|| {
            ApiError::new(
                req_id.0.clone(),
                "not_found",
                format!("scraping rule '{name}' not found"),
            )
        })?;

    let item = to_item(&req_id.0, row)?;
    Ok(Json(ApiResponse::new(req_id.0, item)))
}

/// POST /api/v1/scraping-rules: Create or replace a rule by name.
pub(super) async fn upsert_rule(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(rule): Json<ScrapingRule>,
) -> Result<Json<ApiResponse<RuleItem>>, ApiError> {
    let row = matscrape_db::upsert_scraping_rule(&state.pool, &rule)
        .await
        .map_err(|e| match e {
            DbError::InvalidRule(err) => {
                ApiError::new(req_id.0.clone(), "validation_error", err.to_string())
            }
            other => map_db_error(req_id.0.clone(), &other),
        })?;

    tracing::info!(rule = %row.name, "scraping rule saved");

    let item = to_item(&req_id.0, row)?;
    Ok(Json(ApiResponse::new(req_id.0, item)))
}
