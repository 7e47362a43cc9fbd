pub mod app_config;
pub mod config;
pub mod rules;
pub mod schedule;
pub mod urls;

use thiserror::Error;

pub use app_config::{AppConfig, Environment};
pub use config::{load_app_config, load_app_config_from_env};
pub use rules::{
    load_rules, FieldName, FieldSelector, PriceFormat, RuleError, RuleSelectors, RulesFile,
    ScrapingRule, SelectorType,
};
pub use schedule::{schedule_batch, schedule_immediate, ScheduleError, ScheduledScrape};
pub use urls::ScrapingUrlConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("failed to read rules file {path}: {source}")]
    RulesFileIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse rules file: {0}")]
    RulesFileParse(#[from] serde_yaml::Error),

    #[error("duplicate rule name: '{0}'")]
    DuplicateRule(String),

    #[error(transparent)]
    InvalidRule(#[from] RuleError),
}
