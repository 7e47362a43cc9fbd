mod rules;
mod run_due;
mod schedule;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use matscrape_core::AppConfig;
use sqlx::PgPool;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "matscrape-cli")]
#[command(about = "Material price scraper command line interface")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Apply pending database migrations
    Migrate,
    /// Load rules from the YAML file into the database
    SeedRules {
        /// Rules file; defaults to `MATSCRAPE_RULES_PATH`
        #[arg(long)]
        path: Option<PathBuf>,
    },
    /// Apply one rule from the rules file to a URL and print the result.
    /// Does not touch the database.
    TestRule {
        /// Name of the rule in the rules file
        #[arg(long)]
        rule: String,
        /// Page to scrape
        #[arg(long)]
        url: String,
        /// Rules file
        #[arg(
            long,
            env = "MATSCRAPE_RULES_PATH",
            default_value = "./config/rules.yaml"
        )]
        rules: PathBuf,
        /// Per-request timeout in seconds
        #[arg(
            long,
            env = "MATSCRAPE_SCRAPER_REQUEST_TIMEOUT_SECS",
            default_value_t = 30
        )]
        timeout_secs: u64,
        #[arg(
            long,
            env = "MATSCRAPE_SCRAPER_USER_AGENT",
            default_value = "matscrape/0.1 (material-price-monitor)"
        )]
        user_agent: String,
    },
    /// Stagger every eligible custom URL, or mark them all due now
    Schedule {
        /// Minutes between consecutive scrapes; defaults to
        /// `MATSCRAPE_SCHEDULE_INTERVAL_MINUTES`
        #[arg(long, conflicts_with = "immediate")]
        interval_minutes: Option<i64>,
        /// Mark every eligible URL due immediately
        #[arg(long)]
        immediate: bool,
    },
    /// Run one auto-scrape cycle over the URLs that are due
    RunDue {
        /// Maximum URLs to process; defaults to `MATSCRAPE_AUTO_SCRAPE_BATCH_LIMIT`
        #[arg(long)]
        limit: Option<i64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::TestRule {
            rule,
            url,
            rules: rules_path,
            timeout_secs,
            user_agent,
        } => rules::run_test_rule(&rules_path, &rule, &url, timeout_secs, &user_agent).await,
        Commands::Migrate => {
            let (_, pool) = connect().await?;
            let applied = matscrape_db::run_migrations(&pool).await?;
            println!("applied {applied} migration(s)");
            Ok(())
        }
        Commands::SeedRules { path } => {
            let (config, pool) = connect().await?;
            let path = path.unwrap_or(config.rules_path);
            rules::run_seed_rules(&pool, &path).await
        }
        Commands::Schedule {
            interval_minutes,
            immediate,
        } => {
            let (config, pool) = connect().await?;
            let mode = if immediate {
                schedule::ScheduleMode::Immediate
            } else {
                schedule::ScheduleMode::Staggered {
                    interval_minutes: interval_minutes.unwrap_or(config.schedule_interval_minutes),
                }
            };
            schedule::run_schedule(&pool, mode).await
        }
        Commands::RunDue { limit } => {
            let (config, pool) = connect().await?;
            run_due::run_due(&pool, &config, limit).await
        }
    }
}

/// Loads config and opens the pool. Only the DB-backed commands call this.
async fn connect() -> anyhow::Result<(AppConfig, PgPool)> {
    let config = matscrape_core::load_app_config()?;
    let pool_config = matscrape_db::PoolConfig::from_app_config(&config);
    let pool = matscrape_db::connect_pool(&config.database_url, pool_config).await?;
    Ok((config, pool))
}
