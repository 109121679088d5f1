//! Horizon webhook notification service.
//!
//! Loads configuration, connects to PostgreSQL, bootstraps the schema and
//! runs the pipeline until SIGINT or SIGTERM.

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use horizon::{
    pipeline::{self, Backends, Settings},
    Config,
};
use horizon_core::{RealClock, Storage};
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing()?;

    info!("starting horizon webhook pipeline");

    let config = Config::load()?;
    info!(
        database_url = %config.database_url_masked(),
        instance_id = %config.instance_id,
        cleaner_enabled = config.cleaner_enabled,
        "configuration loaded"
    );

    let pool = create_database_pool(&config).await?;
    let storage = Arc::new(Storage::new(pool));
    storage.migrate().await.context("failed to bootstrap database schema")?;
    info!("database schema ready");

    let lease = config.to_lease_config();
    let backends = Backends::postgres(storage.clone(), &lease, &config.lease_namespace);
    let settings = Settings {
        consumer: config.to_consumer_config(),
        lease,
        delivery: config.to_delivery_config(),
        cleaner: config.cleaner_enabled.then(|| config.to_cleaner_config()),
    };

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            shutdown_signal().await;
            info!("shutdown signal received, starting graceful shutdown");
            shutdown.cancel();
        }
    });

    let result = pipeline::run(backends, settings, Arc::new(RealClock::new()), shutdown).await;

    storage.pool().close().await;
    info!("database connections closed");

    result
}

/// Initializes tracing with environment-based configuration.
fn init_tracing() -> Result<()> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info,horizon=debug"))
        .context("invalid RUST_LOG filter")?;

    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    tracing_subscriber::registry().with(filter).with(fmt_layer).init();
    Ok(())
}

/// Creates the database connection pool, retrying while the database comes
/// up.
async fn create_database_pool(config: &Config) -> Result<sqlx::PgPool> {
    const MAX_RETRIES: u32 = 5;
    const RETRY_DELAY: Duration = Duration::from_secs(2);

    let mut retries = 0;
    loop {
        match PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .min_connections(config.database_min_connections)
            .acquire_timeout(Duration::from_secs(config.database_acquire_timeout_seconds))
            .idle_timeout(Duration::from_secs(600))
            .max_lifetime(Duration::from_secs(1800))
            .connect(&config.database_url)
            .await
        {
            Ok(pool) => {
                Storage::new(pool.clone()).health_check().await.context("database health check failed")?;
                info!(max_connections = config.database_max_connections, "database connection pool established");
                return Ok(pool);
            },
            Err(err) if retries < MAX_RETRIES => {
                retries += 1;
                warn!(attempt = retries, max_retries = MAX_RETRIES, error = %err, "database connection failed, retrying");
                tokio::time::sleep(RETRY_DELAY).await;
            },
            Err(err) => {
                return Err(err).context("failed to create database connection pool after retries");
            },
        }
    }
}

/// Waits for SIGINT or SIGTERM.
#[allow(clippy::expect_used)]
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received Ctrl+C"),
        () = terminate => info!("received SIGTERM"),
    }
}
