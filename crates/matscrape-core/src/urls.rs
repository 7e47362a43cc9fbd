use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A user-managed scrape target: one URL bound to one scraping rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapingUrlConfig {
    pub id: i64,
    pub url: String,
    /// Material this URL prices, e.g. `"cement"` or `"rebar_12mm"`.
    pub material_type: String,
    /// Name of the [`crate::ScrapingRule`] used to extract this page.
    pub rule_name: String,
    pub is_active: bool,
    pub auto_scraping_enabled: bool,
    /// `None` until the entry is first scheduled.
    pub next_auto_scrape_at: Option<DateTime<Utc>>,
}

impl ScrapingUrlConfig {
    /// Only active entries with auto-scraping switched on are scheduled or run.
    #[must_use]
    pub fn is_eligible(&self) -> bool {
        self.is_active && self.auto_scraping_enabled
    }

    /// Eligible and either never scheduled or scheduled at or before `now`.
    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.is_eligible() && self.next_auto_scrape_at.is_none_or(|at| at <= now)
    }
}
