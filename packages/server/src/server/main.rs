// Main entry point for API server

use std::sync::Arc;

use anyhow::{Context, Result};
use pipeline_core::domains::analysis::QueryExecutor;
use pipeline_core::kernel::jobs::{ChannelTrigger, HttpWorkerTrigger, QueryWorker};
use pipeline_core::kernel::{PipelineDeps, WorkerTrigger};
use pipeline_core::server::{build_app, AppState};
use pipeline_core::Config;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,pipeline_core=debug,page_fetch=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting citation pipeline API");

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

    // Continuation: call back into our own /worker route when a public URL is
    // known, otherwise hand invocations to an in-process loop
    let (trigger, local_invocations): (Arc<dyn WorkerTrigger>, _) =
        match &config.public_worker_url {
            Some(url) => {
                let trigger = HttpWorkerTrigger::new(url);
                tracing::info!(url = %trigger.url(), "continuations go over HTTP");
                (Arc::new(trigger), None)
            }
            None => {
                let (trigger, rx) = ChannelTrigger::channel();
                tracing::info!("PUBLIC_WORKER_URL not set, continuations run in-process");
                (Arc::new(trigger), Some(rx))
            }
        };

    let deps = PipelineDeps::from_config(&config, pool.clone(), trigger.clone())?;
    let worker = Arc::new(QueryWorker::new(
        deps.queue.clone(),
        deps.runs.clone(),
        Arc::new(QueryExecutor::new(deps.clone())),
        trigger,
        config.worker_config(),
    ));

    if let Some(mut rx) = local_invocations {
        let worker = worker.clone();
        tokio::spawn(async move {
            while let Some(invocation) = rx.recv().await {
                if let Err(e) = worker.run(invocation).await {
                    tracing::error!(error = %e, "continuation invocation aborted");
                }
            }
        });
    }

    // Build application
    let app = build_app(AppState::new(deps, worker, Some(pool)));

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("Starting server on {}", addr);
    tracing::info!("Health check: http://localhost:{}/health", config.port);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
