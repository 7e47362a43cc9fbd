mod api;
mod middleware;
mod scheduler;

use std::sync::Arc;

use anyhow::Context;
use matscrape_scraper::{ConfigurableScraper, RuleScraper};
use tracing_subscriber::EnvFilter;

use crate::{
    api::{build_app, default_rate_limit_state, AppState},
    middleware::AuthState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Arc::new(matscrape_core::load_app_config()?);
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    tracing::info!(env = %config.env, bind_addr = %config.bind_addr, "starting matscrape-server");

    let pool_config = matscrape_db::PoolConfig::from_app_config(&config);
    let pool = matscrape_db::connect_pool(&config.database_url, pool_config).await?;
    let applied = matscrape_db::run_migrations(&pool).await?;
    tracing::info!(applied, "migrations up to date");

    let scraper: Arc<dyn RuleScraper> = Arc::new(
        ConfigurableScraper::from_settings(
            config.scraper_request_timeout_secs,
            &config.scraper_user_agent,
        )
        .context("failed to build HTTP client")?,
    );

    let _scheduler =
        scheduler::build_scheduler(pool.clone(), Arc::clone(&scraper), Arc::clone(&config))
            .await?;

    let auth = AuthState::new(
        &config.api_keys,
        matches!(config.env, matscrape_core::Environment::Development),
    )?;
    let state = AppState {
        pool,
        scraper,
        config: Arc::clone(&config),
    };
    let app = build_app(state, auth, default_rate_limit_state());

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, starting graceful shutdown");
}
