// Main entry point for the briefcast server

use anyhow::{Context, Result};
use briefcast_core::kernel::{start_scheduler, Schedules, ServerDeps};
use briefcast_core::server::{build_app, AppState};
use briefcast_core::Config;
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,briefcast_core=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting briefcast server");

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!("Configuration loaded");

    // Connect to database
    tracing::info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    tracing::info!("Database connected");

    // Run migrations
    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;
    tracing::info!("Migrations complete");

    let deps = ServerDeps::from_config(&config, pool.clone())
        .context("Failed to build server dependencies")?;
    let services = deps.services(config.worker_pool(), config.podcast(), config.digest());

    let shutdown = CancellationToken::new();

    services
        .worker_pool
        .start(&shutdown)
        .context("Failed to start worker pool")?;

    let mut scheduler = start_scheduler(
        services.digest.clone(),
        services.queue.clone(),
        Schedules {
            digest: config.digest_cron.clone(),
            retry: config.retry_cron.clone(),
        },
        shutdown.clone(),
    )
    .await
    .context("Failed to start scheduler")?;

    let app = build_app(AppState {
        db_pool: pool,
        worker_pool: services.worker_pool.clone(),
        stream_hub: deps.stream_hub.clone(),
    });

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("Starting server on {}", addr);
    tracing::info!("Health check: http://localhost:{}/health", config.port);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    let server_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => tracing::info!("Shutdown signal received"),
                _ = server_shutdown.cancelled() => {}
            }
        })
        .await
        .context("Server error")?;

    shutdown.cancel();
    if let Err(e) = scheduler.shutdown().await {
        tracing::warn!(error = %e, "Scheduler did not shut down cleanly");
    }
    if let Err(e) = services.worker_pool.stop().await {
        tracing::warn!(error = %e, "Worker pool did not stop cleanly");
    }

    tracing::info!("Server stopped");
    Ok(())
}
