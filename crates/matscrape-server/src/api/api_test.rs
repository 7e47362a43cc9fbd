use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::Request;
use matscrape_core::{Environment, ScrapingRule};
use matscrape_scraper::{ScrapeError, ScrapeResult, ScrapedData};
use serde_json::{json, Value};
use sqlx::postgres::PgPoolOptions;
use tower::ServiceExt;

use super::*;

/// Succeeds for URLs containing `/ok`; every other URL fails as if the
/// price element were missing.
struct StubScraper;

#[async_trait]
impl RuleScraper for StubScraper {
    async fn scrape_with_rules(&self, rule: &ScrapingRule, target_url: &str) -> ScrapeResult {
        if rule.selectors.price.is_none() {
            return ScrapeResult::Failure(ScrapeError::InvalidRule {
                reason: format!("rule '{}' has no price selector", rule.name),
            });
        }
        if target_url.contains("/ok") {
            ScrapeResult::Success(ScrapedData {
                price: 1234.56,
                title: Some("Portland Cement 50 kg".to_string()),
                availability: None,
                image: None,
            })
        } else {
            ScrapeResult::Failure(ScrapeError::SelectorNotFound {
                field: matscrape_core::FieldName::Price,
                selector: ".price".to_string(),
            })
        }
    }
}

fn test_config() -> AppConfig {
    AppConfig {
        database_url: "postgres://unused".to_string(),
        env: Environment::Test,
        bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 3000),
        log_level: "info".to_string(),
        rules_path: PathBuf::from("./config/rules.yaml"),
        api_keys: vec![],
        db_max_connections: 5,
        db_min_connections: 1,
        db_acquire_timeout_secs: 5,
        scraper_request_timeout_secs: 5,
        scraper_user_agent: "matscrape-test/0.1".to_string(),
        scraper_max_concurrent: 2,
        schedule_interval_minutes: 5,
        auto_scrape_cron: "0 */5 * * * *".to_string(),
        auto_scrape_batch_limit: 50,
    }
}

fn state_with(pool: PgPool) -> AppState {
    AppState {
        pool,
        scraper: Arc::new(StubScraper),
        config: Arc::new(test_config()),
    }
}

/// A pool that never connects; fine for routes that do not touch the DB.
fn lazy_pool() -> PgPool {
    PgPoolOptions::new()
        .connect_lazy("postgres://localhost/matscrape_unused")
        .expect("lazy pool")
}

fn app(pool: PgPool) -> Router {
    build_app(state_with(pool), AuthState::disabled(), default_rate_limit_state())
}

fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("request")
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.expect("response");
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body bytes");
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap_or(Value::Null)
    };
    (status, json)
}

fn inline_rule() -> Value {
    json!({
        "name": "inline",
        "url_pattern": "https://shop.example/*",
        "selectors": {
            "price": { "selector": ".price" },
            "title": { "selector": "h1" }
        },
        "price_format": "decimal"
    })
}

// -------------------------------------------------------------------------
// Envelope and middleware (no DB)
// -------------------------------------------------------------------------

#[test]
fn api_error_codes_map_to_statuses() {
    let cases = [
        ("validation_error", StatusCode::BAD_REQUEST),
        ("not_found", StatusCode::NOT_FOUND),
        ("no_eligible_urls", StatusCode::NOT_FOUND),
        ("scrape_failed", StatusCode::UNPROCESSABLE_ENTITY),
        ("rate_limited", StatusCode::TOO_MANY_REQUESTS),
        ("internal_error", StatusCode::INTERNAL_SERVER_ERROR),
    ];
    for (code, status) in cases {
        let response = ApiError::new("req-1", code, "message").into_response();
        assert_eq!(response.status(), status, "code {code}");
    }
}

#[test]
fn error_details_are_omitted_when_absent() {
    let json = serde_json::to_value(ApiError::new("req-1", "not_found", "gone")).unwrap();
    assert!(json["error"].get("details").is_none());
    assert_eq!(json["meta"]["request_id"], "req-1");
}

#[tokio::test]
async fn request_id_header_is_echoed() {
    let response = app(lazy_pool())
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/custom-urls/test")
                .header("content-type", "application/json")
                .header("x-request-id", "trace-me")
                .body(Body::from(
                    json!({"url": "https://shop.example/ok", "rule": inline_rule()}).to_string(),
                ))
                .expect("request"),
        )
        .await
        .expect("response");

    assert_eq!(
        response
            .headers()
            .get("x-request-id")
            .and_then(|v| v.to_str().ok()),
        Some("trace-me")
    );
}

#[tokio::test]
async fn protected_routes_require_bearer_token() {
    let auth = AuthState::new(&["s3cret".to_string()], false).expect("auth");
    let app = build_app(state_with(lazy_pool()), auth, default_rate_limit_state());
    let body = json!({"url": "https://shop.example/ok", "rule": inline_rule()});

    let (status, json) = send(app.clone(), post_json("/api/v1/custom-urls/test", &body)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["error"]["code"], "unauthorized");

    let mut request = post_json("/api/v1/custom-urls/test", &body);
    request.headers_mut().insert(
        header::AUTHORIZATION,
        "Bearer s3cret".parse().expect("header value"),
    );
    let (status, _) = send(app, request).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn rate_limit_rejects_excess_requests() {
    let app = build_app(
        state_with(lazy_pool()),
        AuthState::disabled(),
        RateLimitState::new(1, Duration::from_secs(60)),
    );
    let body = json!({"url": "https://shop.example/ok", "rule": inline_rule()});

    let (first, _) = send(app.clone(), post_json("/api/v1/custom-urls/test", &body)).await;
    let (second, json) = send(app, post_json("/api/v1/custom-urls/test", &body)).await;
    assert_eq!(first, StatusCode::OK);
    assert_eq!(second, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(json["error"]["code"], "rate_limited");
}

// -------------------------------------------------------------------------
// POST /api/v1/custom-urls/test with an inline rule (no DB)
// -------------------------------------------------------------------------

#[tokio::test]
async fn test_scrape_returns_result_on_success() {
    let body = json!({"url": "https://shop.example/ok", "rule": inline_rule()});
    let (status, json) = send(app(lazy_pool()), post_json("/api/v1/custom-urls/test", &body)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["success"], true);
    assert_eq!(json["data"]["data"]["price"], 1234.56);
    assert_eq!(json["data"]["data"]["title"], "Portland Cement 50 kg");
    assert!(json["meta"]["request_id"].is_string());
}

#[tokio::test]
async fn test_scrape_failure_is_unprocessable_with_kind() {
    let body = json!({"url": "https://shop.example/missing", "rule": inline_rule()});
    let (status, json) = send(app(lazy_pool()), post_json("/api/v1/custom-urls/test", &body)).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["error"]["code"], "scrape_failed");
    assert_eq!(json["error"]["details"]["kind"], "selector_not_found");
    assert_eq!(json["error"]["details"]["field"], "price");
    assert!(json["error"]["message"]
        .as_str()
        .is_some_and(|m| m.contains(".price")));
}

#[tokio::test]
async fn test_scrape_rule_without_price_is_invalid_rule() {
    let mut rule = inline_rule();
    rule["selectors"]
        .as_object_mut()
        .expect("selectors object")
        .remove("price");
    let body = json!({"url": "https://shop.example/ok", "rule": rule});
    let (status, json) = send(app(lazy_pool()), post_json("/api/v1/custom-urls/test", &body)).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["error"]["details"]["kind"], "invalid_rule");
}

#[tokio::test]
async fn test_scrape_requires_exactly_one_rule_source() {
    let both = json!({
        "url": "https://shop.example/ok",
        "rule": inline_rule(),
        "rule_name": "stored"
    });
    let (status, json) = send(app(lazy_pool()), post_json("/api/v1/custom-urls/test", &both)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "validation_error");

    let neither = json!({"url": "https://shop.example/ok"});
    let (status, _) = send(app(lazy_pool()), post_json("/api/v1/custom-urls/test", &neither)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// -------------------------------------------------------------------------
// Routes backed by the database
// -------------------------------------------------------------------------

async fn seed_rule(pool: &PgPool, name: &str) {
    let rule: ScrapingRule = serde_json::from_value(json!({
        "name": name,
        "url_pattern": format!("https://{name}.example/*"),
        "selectors": { "price": { "selector": ".price" } }
    }))
    .expect("rule json");
    matscrape_db::upsert_scraping_rule(pool, &rule)
        .await
        .expect("seed rule");
}

async fn seed_url(pool: &PgPool, rule: &str, path: &str, is_active: bool, auto: bool) -> i64 {
    let url = format!("https://{rule}.example{path}");
    matscrape_db::create_scraping_url(
        pool,
        &matscrape_db::NewScrapingUrl {
            url: &url,
            material_type: "cement",
            rule_name: rule,
            is_active,
            auto_scraping_enabled: auto,
        },
    )
    .await
    .expect("seed url")
    .id
}

#[sqlx::test(migrations = "../../migrations")]
async fn health_reports_database_ok(pool: PgPool) {
    let (status, json) = send(app(pool), get("/api/v1/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["database"], "ok");
}

#[sqlx::test(migrations = "../../migrations")]
async fn schedule_without_eligible_urls_is_404(pool: PgPool) {
    seed_rule(&pool, "shop").await;
    seed_url(&pool, "shop", "/p/1", false, true).await;

    let (status, json) = send(
        app(pool),
        post_json("/api/v1/custom-urls/schedule", &json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"]["code"], "no_eligible_urls");
}

#[sqlx::test(migrations = "../../migrations")]
async fn schedule_without_body_uses_configured_interval(pool: PgPool) {
    seed_rule(&pool, "shop").await;
    seed_url(&pool, "shop", "/p/1", true, true).await;
    seed_url(&pool, "shop", "/p/2", true, true).await;

    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/custom-urls/schedule")
        .body(Body::empty())
        .expect("request");
    let (status, json) = send(app(pool), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["scheduled"], 2);
    assert_eq!(json["data"]["interval_minutes"], 5);

    let first: DateTime<Utc> =
        serde_json::from_value(json["data"]["first_at"].clone()).expect("first_at");
    let last: DateTime<Utc> =
        serde_json::from_value(json["data"]["last_at"].clone()).expect("last_at");
    assert_eq!(last - first, chrono::TimeDelta::minutes(5));
}

#[sqlx::test(migrations = "../../migrations")]
async fn schedule_staggers_eligible_urls(pool: PgPool) {
    seed_rule(&pool, "shop").await;
    for i in 0..5 {
        seed_url(&pool, "shop", &format!("/p/{i}"), true, true).await;
    }
    seed_url(&pool, "shop", "/p/manual", true, false).await;

    let (status, json) = send(
        app(pool.clone()),
        post_json("/api/v1/custom-urls/schedule", &json!({"interval_minutes": 5})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["scheduled"], 5);

    let first: DateTime<Utc> =
        serde_json::from_value(json["data"]["first_at"].clone()).expect("first_at");
    let last: DateTime<Utc> =
        serde_json::from_value(json["data"]["last_at"].clone()).expect("last_at");
    assert_eq!(last - first, chrono::TimeDelta::minutes(20));

    let scheduled: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM custom_scraping_urls WHERE next_auto_scrape_at IS NOT NULL",
    )
    .fetch_one(&pool)
    .await
    .expect("count");
    assert_eq!(scheduled, 5);
}

#[sqlx::test(migrations = "../../migrations")]
async fn schedule_rejects_non_positive_interval(pool: PgPool) {
    seed_rule(&pool, "shop").await;
    seed_url(&pool, "shop", "/p/1", true, true).await;

    let (status, json) = send(
        app(pool),
        post_json("/api/v1/custom-urls/schedule", &json!({"interval_minutes": 0})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "validation_error");
}

#[sqlx::test(migrations = "../../migrations")]
async fn immediate_schedule_marks_eligible_due(pool: PgPool) {
    seed_rule(&pool, "shop").await;
    for (i, (active, auto)) in [(true, true), (true, false), (true, true), (false, true), (true, true)]
        .into_iter()
        .enumerate()
    {
        seed_url(&pool, "shop", &format!("/p/{i}"), active, auto).await;
    }

    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/custom-urls/schedule/immediate")
        .body(Body::empty())
        .expect("request");
    let (status, json) = send(app(pool), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["scheduled"], 3);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_scrape_with_stored_rule(pool: PgPool) {
    seed_rule(&pool, "shop").await;

    let body = json!({"url": "https://shop.example/ok", "rule_name": "shop"});
    let (status, json) = send(app(pool.clone()), post_json("/api/v1/custom-urls/test", &body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["success"], true);

    let missing = json!({"url": "https://shop.example/ok", "rule_name": "nope"});
    let (status, _) = send(app(pool), post_json("/api/v1/custom-urls/test", &missing)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[sqlx::test(migrations = "../../migrations")]
async fn rules_can_be_saved_and_fetched(pool: PgPool) {
    let (status, json) = send(
        app(pool.clone()),
        post_json("/api/v1/scraping-rules", &inline_rule()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["name"], "inline");

    let (status, json) = send(app(pool.clone()), get("/api/v1/scraping-rules/inline")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["selectors"]["price"]["selector"], ".price");

    let (status, json) = send(app(pool.clone()), get("/api/v1/scraping-rules")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"].as_array().map(Vec::len), Some(1));

    let (status, _) = send(app(pool), get("/api/v1/scraping-rules/unknown")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[sqlx::test(migrations = "../../migrations")]
async fn saving_rule_without_price_is_validation_error(pool: PgPool) {
    let body = json!({"name": "bad", "selectors": {"title": {"selector": "h1"}}});
    let (status, json) = send(app(pool), post_json("/api/v1/scraping-rules", &body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "validation_error");
}

#[sqlx::test(migrations = "../../migrations")]
async fn custom_urls_can_be_created_and_fetched(pool: PgPool) {
    seed_rule(&pool, "shop").await;

    let body = json!({
        "url": "https://shop.example/p/42",
        "material_type": "cement",
        "rule_name": "shop"
    });
    let (status, json) = send(app(pool.clone()), post_json("/api/v1/custom-urls", &body)).await;
    assert_eq!(status, StatusCode::CREATED);
    let id = json["data"]["id"].as_i64().expect("id");
    assert_eq!(json["data"]["rule_name"], "shop");
    assert_eq!(json["data"]["auto_scraping_enabled"], true);

    let (status, json) = send(app(pool.clone()), get(&format!("/api/v1/custom-urls/{id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["url"], "https://shop.example/p/42");
    assert!(json["data"]["recent_results"].is_array());

    let (status, json) = send(app(pool.clone()), get("/api/v1/custom-urls")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"].as_array().map(Vec::len), Some(1));

    let (status, _) = send(app(pool), get("/api/v1/custom-urls/999999")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[sqlx::test(migrations = "../../migrations")]
async fn custom_url_must_match_rule_pattern(pool: PgPool) {
    seed_rule(&pool, "shop").await;

    let body = json!({
        "url": "https://elsewhere.example/p/1",
        "material_type": "cement",
        "rule_name": "shop"
    });
    let (status, json) = send(app(pool.clone()), post_json("/api/v1/custom-urls", &body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "validation_error");

    let unknown_rule = json!({
        "url": "https://shop.example/p/1",
        "material_type": "cement",
        "rule_name": "ghost"
    });
    let (status, _) = send(app(pool), post_json("/api/v1/custom-urls", &unknown_rule)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
