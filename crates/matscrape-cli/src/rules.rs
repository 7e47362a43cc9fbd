//! Rule command handlers: seeding the database from the YAML file and
//! trying a single rule against a live page.

use std::path::Path;

use anyhow::Context;
use matscrape_core::RulesFile;
use matscrape_scraper::{ConfigurableScraper, RuleScraper, ScrapeResult};

/// Loads and validates the rules file, then upserts every rule in one
/// transaction.
///
/// # Errors
///
/// Returns an error if the file is unreadable or invalid, or if any upsert
/// fails. On failure nothing is written.
pub(crate) async fn run_seed_rules(pool: &sqlx::PgPool, path: &Path) -> anyhow::Result<()> {
    let rules_file = matscrape_core::load_rules(path)
        .with_context(|| format!("failed to load rules from {}", path.display()))?;

    let seeded = matscrape_db::seed_scraping_rules(pool, &rules_file.rules).await?;
    tracing::info!(seeded, path = %path.display(), "scraping rules seeded");
    println!("seeded {seeded} scraping rule(s) from {}", path.display());
    Ok(())
}

/// Applies the named rule from `rules_path` to `url` and prints the result
/// as JSON on stdout.
///
/// # Errors
///
/// Returns an error if the rules file cannot be loaded, the rule is not in
/// it, or the scrape itself fails. The JSON result is printed either way.
pub(crate) async fn run_test_rule(
    rules_path: &Path,
    rule_name: &str,
    url: &str,
    timeout_secs: u64,
    user_agent: &str,
) -> anyhow::Result<()> {
    let rules_file = matscrape_core::load_rules(rules_path)
        .with_context(|| format!("failed to load rules from {}", rules_path.display()))?;
    let scraper = ConfigurableScraper::from_settings(timeout_secs, user_agent)
        .context("failed to build HTTP client")?;

    let result = test_rule(&scraper, &rules_file, rule_name, url).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);

    match result {
        ScrapeResult::Success(_) => Ok(()),
        ScrapeResult::Failure(err) => Err(anyhow::anyhow!("scrape failed: {err}")),
    }
}

/// Looks up `rule_name` and runs it once against `url`.
pub(crate) async fn test_rule<S: RuleScraper + ?Sized>(
    scraper: &S,
    rules_file: &RulesFile,
    rule_name: &str,
    url: &str,
) -> anyhow::Result<ScrapeResult> {
    let Some(rule) = rules_file.find(rule_name) else {
        let known: Vec<&str> = rules_file.rules.iter().map(|r| r.name.as_str()).collect();
        anyhow::bail!(
            "rule '{rule_name}' not found; known rules: [{}]",
            known.join(", ")
        );
    };
    Ok(scraper.scrape_with_rules(rule, url).await)
}
