//! genealogy_ledger - event-sourced genealogy records
//!
//! Connects the configured storage backend, runs the optional GEDCOM
//! import/export, then keeps the read models caught up until shutdown.

use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use genealogy_ledger::config::{Config, StorageBackend};
use genealogy_ledger::db;
use genealogy_ledger::jobs::{JobSchedulerConfig, ProjectionScheduler};
use genealogy_ledger::{Genealogy, OperationContext};

/// Initialize tracing/logging
fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "genealogy_ledger=debug".into());

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    init_tracing(config.log_json);

    tracing::info!(
        "Starting genealogy_ledger ({}, {:?} backend)",
        config.environment,
        config.storage_backend
    );

    let mut pool = None;
    let ledger = match config.storage_backend {
        StorageBackend::Memory => Genealogy::in_memory(config.engine.clone()),
        StorageBackend::Postgres => {
            let url = config
                .database_url
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("DATABASE_URL is required for the postgres backend"))?;

            tracing::info!("Connecting to database...");
            let pg = PgPoolOptions::new()
                .max_connections(config.database_max_connections)
                .connect(url)
                .await?;

            db::verify_connection(&pg).await?;
            if !db::check_schema(&pg).await? {
                tracing::error!("Database schema is not complete. Please run migrations.");
                return Err(anyhow::anyhow!("Database schema incomplete"));
            }
            tracing::info!("Database connected successfully");

            pool = Some(pg.clone());
            Genealogy::postgres(pg, config.engine.clone())
        }
    };

    // Bring read models up to date with anything appended while we were down
    let report = ledger.catch_up().await?;
    tracing::info!(
        "Startup catch-up applied {} events across {} streams",
        report.events_applied,
        report.streams_advanced
    );

    if let Some(path) = &config.gedcom_import_path {
        let context = OperationContext::new().with_actor("startup");
        let result = ledger.import_gedcom_file(path, &context).await?;
        tracing::info!(
            "Imported {} records from {} ({} warnings)",
            result.created_count,
            path.display(),
            result.warnings.len()
        );
    }

    if let Some(path) = &config.gedcom_export_path {
        ledger.export_gedcom_file(path).await?;
    }

    let scheduler = ProjectionScheduler::with_config(
        ledger.projector(),
        JobSchedulerConfig {
            catch_up_interval: config.projection_interval,
        },
    );
    scheduler.run_until(shutdown_signal()).await;

    // Cleanup
    if let Some(pool) = pool {
        pool.close().await;
        tracing::info!("Database connections closed");
    }
    tracing::info!("Goodbye!");

    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
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
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}
