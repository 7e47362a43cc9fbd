//! Database operations for the `scraping_rules` table.

use chrono::{DateTime, Utc};
use matscrape_core::{PriceFormat, RuleSelectors, ScrapingRule};
use sqlx::types::Json;
use sqlx::{PgExecutor, PgPool};

use crate::DbError;

// ---------------------------------------------------------------------------
// Row type
// ---------------------------------------------------------------------------

/// A row from the `scraping_rules` table. Selectors are stored as JSONB in
/// the same shape as the rules file.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ScrapingRuleRow {
    pub id: i64,
    pub name: String,
    pub url_pattern: String,
    pub selectors: Json<RuleSelectors>,
    pub price_format: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ScrapingRuleRow {
    /// Converts the row back into the domain rule.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::CorruptRow`] if `price_format` holds an unknown value.
    pub fn to_rule(&self) -> Result<ScrapingRule, DbError> {
        let price_format =
            PriceFormat::from_name(&self.price_format).ok_or_else(|| DbError::CorruptRow {
                table: "scraping_rules",
                id: self.id,
                reason: format!("unknown price_format '{}'", self.price_format),
            })?;

        Ok(ScrapingRule {
            name: self.name.clone(),
            url_pattern: self.url_pattern.clone(),
            selectors: self.selectors.0.clone(),
            price_format,
        })
    }
}

const RULE_COLUMNS: &str =
    "id, name, url_pattern, selectors, price_format, created_at, updated_at";

// ---------------------------------------------------------------------------
// Writes
// ---------------------------------------------------------------------------

/// Inserts a rule, or replaces the stored definition of a rule with the
/// same name.
///
/// # Errors
///
/// Returns [`DbError::InvalidRule`] if the rule fails validation, or
/// [`DbError::Sqlx`] if the upsert fails.
pub async fn upsert_scraping_rule(
    pool: &PgPool,
    rule: &ScrapingRule,
) -> Result<ScrapingRuleRow, DbError> {
    rule.validate()?;
    upsert_rule(pool, rule).await
}

/// Upserts every rule inside a single transaction; if any rule is invalid
/// or any statement fails the whole batch is rolled back.
///
/// Returns the number of rules written.
///
/// # Errors
///
/// Returns [`DbError::InvalidRule`] for the first invalid rule, or
/// [`DbError::Sqlx`] if any database operation fails.
pub async fn seed_scraping_rules(pool: &PgPool, rules: &[ScrapingRule]) -> Result<usize, DbError> {
    for rule in rules {
        rule.validate()?;
    }

    let mut tx = pool.begin().await?;
    for rule in rules {
        upsert_rule(&mut *tx, rule).await?;
    }
    tx.commit().await?;

    Ok(rules.len())
}

async fn upsert_rule<'e, E>(executor: E, rule: &ScrapingRule) -> Result<ScrapingRuleRow, DbError>
where
    E: PgExecutor<'e>,
{
    let row = sqlx::query_as::<_, ScrapingRuleRow>(&format!(
        "INSERT INTO scraping_rules (name, url_pattern, selectors, price_format) \
         VALUES ($1, $2, $3, $4) \
         ON CONFLICT (name) DO UPDATE SET \
             url_pattern = EXCLUDED.url_pattern, \
             selectors = EXCLUDED.selectors, \
             price_format = EXCLUDED.price_format, \
             updated_at = NOW() \
         RETURNING {RULE_COLUMNS}"
    ))
    .bind(rule.name.trim())
    .bind(&rule.url_pattern)
    .bind(Json(&rule.selectors))
    .bind(rule.price_format.as_str())
    .fetch_one(executor)
    .await?;

    Ok(row)
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

/// Returns the rule named `name`, or `None` if there is none.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_scraping_rule_by_name(
    pool: &PgPool,
    name: &str,
) -> Result<Option<ScrapingRuleRow>, DbError> {
    let row = sqlx::query_as::<_, ScrapingRuleRow>(&format!(
        "SELECT {RULE_COLUMNS} FROM scraping_rules WHERE name = $1"
    ))
    .bind(name)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Returns every rule, ordered by name.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_scraping_rules(pool: &PgPool) -> Result<Vec<ScrapingRuleRow>, DbError> {
    let rows = sqlx::query_as::<_, ScrapingRuleRow>(&format!(
        "SELECT {RULE_COLUMNS} FROM scraping_rules ORDER BY name"
    ))
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
