//! Auto-scrape pipeline shared by the server's cron job and the CLI.
//!
//! Joins the scraper and the database: loads due URLs, runs their rules
//! with bounded concurrency and records every outcome.

pub mod cycle;

pub use cycle::{run_auto_scrape_cycle, CycleSummary};
