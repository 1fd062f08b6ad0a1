//! Courier delivery daemon.
//!
//! Drains the shared delivery queue. Producers enqueue through
//! [`courier_queue::DeliveryCoordinator`] in their own process; this process
//! picks their jobs up on its sweep interval, and any jobs left over from a
//! previous run at startup.

use std::sync::Arc;

use anyhow::Context;
use courier_common::{Config, LogFormat, LoggingConfig, get_metrics};
use courier_queue::{
    DatabaseQueueStore, DeliveryQueueStore, DeliveryTrigger, DeliveryWorker, DeliveryWorkerPool,
    HttpDeliveryTransport, RetryPolicy,
};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Waits for a shutdown signal (SIGINT or SIGTERM).
///
/// On Unix systems, this listens for both SIGINT (Ctrl+C) and SIGTERM.
/// On Windows, this only listens for Ctrl+C.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received SIGINT, initiating graceful shutdown...");
        },
        () = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}

fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.filter));
    let registry = tracing_subscriber::registry().with(filter);

    match logging.format {
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::load().context("Failed to load configuration")?;
    init_tracing(&config.logging);

    info!("Starting courier...");

    let db = courier_db::init(&config).await?;
    info!("Connected to database");

    info!("Running database migrations...");
    courier_db::migrate(&db).await?;
    info!("Migrations completed");

    let db = Arc::new(db);
    let store = Arc::new(DatabaseQueueStore::new(db).with_lease(config.delivery.claim_lease()));
    let pending = store.pending_count().await?;
    info!(pending, "Delivery queue opened");

    let transport = Arc::new(HttpDeliveryTransport::new(&config.delivery)?);
    let worker = DeliveryWorker::new(store, transport)
        .with_policy(RetryPolicy::from(&config.delivery));

    let pool = DeliveryWorkerPool::spawn(
        config.delivery.workers,
        worker,
        DeliveryTrigger::new(),
        config.delivery.sweep_interval(),
    );

    shutdown_signal().await;
    pool.shutdown().await;

    let metrics = get_metrics().snapshot();
    info!(
        delivered = metrics.deliveries_succeeded,
        rejected = metrics.deliveries_failed_permanent,
        requeued = metrics.jobs_requeued,
        dead_lettered = metrics.jobs_dead_lettered,
        "Courier shutdown complete"
    );

    Ok(())
}
