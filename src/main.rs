use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::Router;
use band_governance::config::ServiceConfig;
use band_governance::governance::tally::TallyRules;
use band_governance::governance::{Collaborators, GovernanceEngine};
use band_governance::http;
use band_governance::ports::SystemClock;
use band_governance::rpc::PlatformRpc;
use band_governance::state::{ApiCache, AppState};
use band_governance::store::DatabaseStore;
use migration::MigratorTrait;
use sea_orm::ConnectOptions;
use sea_orm::Database;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let config = ServiceConfig::load().context("Failed to load configuration")?;
    let database = connect_database(&config).await?;
    run_migrations(&database).await?;

    let platform = Arc::new(
        PlatformRpc::new(&config.platform.rpc_url, config.platform.request_timeout())
            .context("Failed to initialize platform RPC client")?,
    );

    let engine = Arc::new(GovernanceEngine::new(
        Arc::new(DatabaseStore::new(database)),
        Collaborators {
            membership: platform.clone(),
            integrity: platform.clone(),
            notifier: platform.clone(),
            audit: platform,
            clock: Arc::new(SystemClock),
        },
        TallyRules::standard(),
        config.governance.engine_settings(),
    ));

    let cache = Arc::new(ApiCache::new(&config.cache));
    let app_state = AppState::new(engine, cache);

    let listener = TcpListener::bind(config.server.address())
        .await
        .context("Failed to bind HTTP listener")?;
    let local_addr = listener
        .local_addr()
        .context("Failed to obtain listener address")?;
    info!(
        voting_period_hours = config.governance.voting_period_hours,
        "Band governance listening on {local_addr}"
    );

    let router: Router = http::router(app_state);
    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server exited with error")?;

    info!("Band governance stopped");
    Ok(())
}

fn init_tracing() {
    let default_filter = "info";
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.to_string());
    assert!(!filter.is_empty(), "Tracing filter must not be empty");
    assert!(filter.len() < 256, "Tracing filter length exceeds bounds");

    let builder = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false);

    // LOG_FORMAT=json for log shippers, compact lines otherwise
    match std::env::var("LOG_FORMAT").as_deref() {
        Ok("json") => builder.json().init(),
        _ => builder.compact().init(),
    }
}

async fn connect_database(config: &ServiceConfig) -> Result<sea_orm::DatabaseConnection> {
    let mut options = ConnectOptions::new(config.database.url.clone());
    options
        .max_connections(config.database.max_connections)
        .sqlx_logging(true)
        .sqlx_logging_level(tracing::log::LevelFilter::Debug)
        .acquire_timeout(Duration::from_secs(10));

    if let Some(min) = config.database.min_connections {
        options.min_connections(min);
    }

    assert!(
        config.database.max_connections >= config.database.min_connections.unwrap_or(1),
        "Max connections must be >= min connections"
    );
    assert!(
        config.database.max_connections <= 128,
        "Connection pool oversized"
    );

    Database::connect(options)
        .await
        .context("Failed to connect to PostgreSQL")
}

async fn run_migrations(database: &sea_orm::DatabaseConnection) -> Result<()> {
    migration::Migrator::up(database, None)
        .await
        .context("Database migrations failed")
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {err}");
        return;
    }
    info!("Shutdown signal received");
}
