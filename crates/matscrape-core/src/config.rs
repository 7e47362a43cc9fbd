use crate::app_config::{AppConfig, Environment};
use crate::ConfigError;

/// Upper bound for the per-request scrape timeout. A fetch that takes longer
/// than this is treated as a failed fetch, never waited on.
const MAX_REQUEST_TIMEOUT_SECS: u64 = 120;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// Decoupled from the real environment so tests can feed a `HashMap`.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::net::SocketAddr;
    use std::path::PathBuf;

    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var).map_err(|_| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let invalid = |var: &str, reason: String| ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason,
    };

    let parse_addr = |var: &str, default: &str| -> Result<SocketAddr, ConfigError> {
        or_default(var, default)
            .parse::<SocketAddr>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        or_default(var, default)
            .parse::<u32>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        or_default(var, default)
            .parse::<u64>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_positive_i64 = |var: &str, default: &str| -> Result<i64, ConfigError> {
        let value = or_default(var, default)
            .parse::<i64>()
            .map_err(|e| invalid(var, e.to_string()))?;
        if value <= 0 {
            return Err(invalid(var, format!("must be positive, got {value}")));
        }
        Ok(value)
    };

    let database_url = require("DATABASE_URL")?;
    let env = parse_environment(&or_default("MATSCRAPE_ENV", "development"))?;

    let bind_addr = parse_addr("MATSCRAPE_BIND_ADDR", "0.0.0.0:3000")?;
    let log_level = or_default("MATSCRAPE_LOG_LEVEL", "info");
    let rules_path = PathBuf::from(or_default("MATSCRAPE_RULES_PATH", "./config/rules.yaml"));
    let api_keys = parse_api_keys(&or_default("MATSCRAPE_API_KEYS", ""));

    let db_max_connections = parse_u32("MATSCRAPE_DB_MAX_CONNECTIONS", "10")?;
    let db_min_connections = parse_u32("MATSCRAPE_DB_MIN_CONNECTIONS", "1")?;
    let db_acquire_timeout_secs = parse_u64("MATSCRAPE_DB_ACQUIRE_TIMEOUT_SECS", "10")?;

    let scraper_request_timeout_secs = parse_u64("MATSCRAPE_SCRAPER_REQUEST_TIMEOUT_SECS", "30")?;
    if !(1..=MAX_REQUEST_TIMEOUT_SECS).contains(&scraper_request_timeout_secs) {
        return Err(invalid(
            "MATSCRAPE_SCRAPER_REQUEST_TIMEOUT_SECS",
            format!(
                "must be between 1 and {MAX_REQUEST_TIMEOUT_SECS}, got {scraper_request_timeout_secs}"
            ),
        ));
    }
    let scraper_user_agent = or_default(
        "MATSCRAPE_SCRAPER_USER_AGENT",
        "matscrape/0.1 (material-price-monitor)",
    );
    let scraper_max_concurrent = or_default("MATSCRAPE_SCRAPER_MAX_CONCURRENT", "4")
        .parse::<usize>()
        .map_err(|e| invalid("MATSCRAPE_SCRAPER_MAX_CONCURRENT", e.to_string()))?;

    let schedule_interval_minutes = parse_positive_i64("MATSCRAPE_SCHEDULE_INTERVAL_MINUTES", "5")?;
    let auto_scrape_cron = or_default("MATSCRAPE_AUTO_SCRAPE_CRON", "0 */5 * * * *");
    let auto_scrape_batch_limit = parse_positive_i64("MATSCRAPE_AUTO_SCRAPE_BATCH_LIMIT", "50")?;

    Ok(AppConfig {
        database_url,
        env,
        bind_addr,
        log_level,
        rules_path,
        api_keys,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        scraper_request_timeout_secs,
        scraper_user_agent,
        scraper_max_concurrent,
        schedule_interval_minutes,
        auto_scrape_cron,
        auto_scrape_batch_limit,
    })
}

/// Parse a string into an `Environment` variant.
fn parse_environment(s: &str) -> Result<Environment, ConfigError> {
    match s {
        "development" => Ok(Environment::Development),
        "test" => Ok(Environment::Test),
        "production" => Ok(Environment::Production),
        other => Err(ConfigError::InvalidEnvVar {
            var: "MATSCRAPE_ENV".to_string(),
            reason: format!("expected development, test, or production, got '{other}'"),
        }),
    }
}

/// Split a comma-separated key list, dropping blanks.
fn parse_api_keys(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
