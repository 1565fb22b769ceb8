use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use domain::clock::SystemClock;
use domain::ports::Capabilities;
use persistence::{ChangeFeed, PgAuthProvider, PgDirectory, PgSampleStore};
use tracing::{info, warn};

use workforce_tracker_api::app::{create_app, AppState};
use workforce_tracker_api::config::Config;
use workforce_tracker_api::jobs::{
    JobScheduler, PoolMetricsJob, PresenceRefreshJob, SessionCleanupJob,
};
use workforce_tracker_api::middleware::{init_metrics, logging::init_logging};
use workforce_tracker_api::services::bootstrap_admin;

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let config = Config::load()?;

    init_logging(&config.logging).context("Failed to initialize logging")?;
    init_metrics()?;

    info!("Starting Workforce Tracker API v{}", env!("CARGO_PKG_VERSION"));

    let pool = persistence::db::create_pool(&config.db_config()).await?;

    info!("Running database migrations...");
    persistence::db::run_migrations(&pool).await?;
    info!("Migrations completed");

    let mut scheduler = JobScheduler::new();
    let shutdown = scheduler.shutdown_signal();

    // The feed is the only publisher of store changes, so start it before
    // anything subscribes.
    let feed = ChangeFeed::new();
    let feed_handle = feed.spawn(&pool, shutdown.clone()).await?;

    let auth = PgAuthProvider::new(pool.clone(), config.auth.session_ttl());
    let capabilities = Capabilities::builder()
        .auth(Arc::new(auth.clone()))
        .directory(Arc::new(PgDirectory::new(pool.clone(), feed.clone())))
        .samples(Arc::new(PgSampleStore::new(pool.clone(), feed)))
        .clock(Arc::new(SystemClock))
        .build()?;

    bootstrap_admin(&capabilities, &config.admin).await?;

    let state = AppState::new(config.clone(), capabilities.clone(), Some(pool.clone()));

    let monitor_handle = state.services.monitor.clone().spawn(
        capabilities.directory.clone(),
        capabilities.samples.clone(),
        shutdown,
    );

    scheduler.register(PresenceRefreshJob::new(
        state.services.monitor.clone(),
        config.jobs.presence_refresh_secs,
    ));
    scheduler.register(SessionCleanupJob::new(auth, config.jobs.session_cleanup_minutes));
    scheduler.register(PoolMetricsJob::new(pool));
    scheduler.start();

    let app = create_app(state);

    let addr = config.socket_addr()?;
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scheduler.shutdown();
    scheduler.wait_for_shutdown(SHUTDOWN_TIMEOUT).await;
    for (name, handle) in [("status monitor", monitor_handle), ("change feed", feed_handle)] {
        if let Err(e) = handle.await {
            warn!(task = name, error = %e, "Background task ended abnormally");
        }
    }

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
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
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
