//! Long-running queue drainer
//!
//! Runs worker invocations back to back instead of chaining them through
//! HTTP continuations. Suited to hosts without an execution-time ceiling.
//! With `--in-memory` it enqueues a demo run against in-memory stores and
//! scripted collaborators, drains it and prints the run report.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use page_fetch::testing::MockTierClient;
use page_fetch::TierResponse;
use pipeline_core::common::{BrandContext, Platform};
use pipeline_core::domains::analysis::{build_run_report, enqueue_run, QueryExecutor, RunRequest};
use pipeline_core::kernel::jobs::{NoopTrigger, QueryWorker, WorkerConfig, WorkerInvocation};
use pipeline_core::kernel::test_dependencies::{MockQueryDispatcher, TestDependencies};
use pipeline_core::kernel::PipelineDeps;
use pipeline_core::Config;
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "drain")]
#[command(about = "Drain the citation work queue in a single long-running loop")]
struct Cli {
    /// Run a demo batch against in-memory stores instead of Postgres
    #[arg(long)]
    in_memory: bool,

    /// Exit once the queue is empty instead of polling for new work
    #[arg(long)]
    exit_when_empty: bool,

    /// Seconds to wait before polling again when the queue is empty
    #[arg(long, default_value_t = 5)]
    idle_backoff_secs: u64,

    /// Items claimed per batch (defaults to WORKER_BATCH_SIZE)
    #[arg(long)]
    batch_size: Option<usize>,

    /// Wall-clock budget per invocation in seconds
    #[arg(long)]
    max_runtime_secs: Option<u64>,

    /// Queries for the in-memory demo run
    #[arg(long = "query")]
    queries: Vec<String>,
}

const DEMO_ANSWER: &str = "Popular options include [Acme CRM](https://acme-crm.io/pricing) \
and [Globex](https://globex.dev/crm?ref=ai). Acme is often recommended for small teams.";

const DEMO_PAGE: &str = "<html><head><title>CRM pricing</title></head><body><main>\
<h1>CRM pricing</h1><p>Plans start at ten dollars per seat per month and include \
contact management, pipelines and reporting for growing sales teams.</p></main></body></html>";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,pipeline_core=debug,page_fetch=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let invocation = WorkerInvocation {
        batch_size: cli.batch_size,
        max_runtime_secs: cli.max_runtime_secs,
    };

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Shutdown requested, finishing current invocation");
                shutdown.cancel();
            }
        });
    }

    if cli.in_memory {
        return run_demo(&cli, invocation, shutdown).await;
    }

    let config = Config::from_env().context("Failed to load configuration")?;
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;

    let deps = PipelineDeps::from_config(&config, pool, Arc::new(NoopTrigger))?;
    let worker = build_worker(&deps, config.worker_config());

    drain(
        &worker,
        invocation,
        cli.exit_when_empty,
        Duration::from_secs(cli.idle_backoff_secs),
        &shutdown,
    )
    .await
}

fn build_worker(deps: &PipelineDeps, config: WorkerConfig) -> QueryWorker {
    QueryWorker::new(
        deps.queue.clone(),
        deps.runs.clone(),
        Arc::new(QueryExecutor::new(deps.clone())),
        Arc::new(NoopTrigger),
        config,
    )
}

/// Run invocations until the queue is empty (when `exit_when_empty`) or
/// shutdown is requested.
async fn drain(
    worker: &QueryWorker,
    invocation: WorkerInvocation,
    exit_when_empty: bool,
    idle_backoff: Duration,
    shutdown: &CancellationToken,
) -> Result<()> {
    let mut invocations = 0u64;
    while !shutdown.is_cancelled() {
        invocations += 1;
        let idle = match worker.run(invocation).await {
            Ok(report) => {
                tracing::info!(
                    invocation = invocations,
                    claimed = report.claimed,
                    completed = report.completed,
                    retried = report.retried,
                    failed = report.failed,
                    superseded = report.superseded,
                    "invocation finished"
                );
                report.claimed == 0
            }
            Err(e) => {
                // Nothing was mutated past the failed claim; back off and retry
                tracing::error!(error = %e, "invocation aborted");
                true
            }
        };

        if !idle {
            continue;
        }
        if exit_when_empty && worker.pending_count().await? == 0 {
            tracing::info!(invocations, "queue drained");
            break;
        }
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(idle_backoff) => {}
        }
    }
    Ok(())
}

async fn run_demo(
    cli: &Cli,
    invocation: WorkerInvocation,
    shutdown: CancellationToken,
) -> Result<()> {
    let queries = if cli.queries.is_empty() {
        vec![
            "best crm for small business".to_string(),
            "cheapest crm with pipelines".to_string(),
        ]
    } else {
        cli.queries.clone()
    };

    let test_deps = TestDependencies::new()
        .mock_dispatcher(MockQueryDispatcher::new().with_default(DEMO_ANSWER))
        .mock_tiers(MockTierClient::new().with_fallback(Ok(TierResponse::ok(DEMO_PAGE))));
    let deps = test_deps.deps();

    let request = RunRequest {
        queries,
        platforms: Platform::ALL.to_vec(),
        brand: BrandContext::new("Acme").with_domain("acme-crm.io"),
        competitors: vec!["Globex".to_string()],
    };
    let run = enqueue_run(&request, &deps, invocation).await?;
    tracing::info!(run_id = %run.id, items = run.queries_total, "demo run enqueued");

    let worker = build_worker(
        &deps,
        WorkerConfig {
            item_delay: Duration::ZERO,
            ..Default::default()
        },
    );
    drain(&worker, invocation, true, Duration::from_millis(100), &shutdown).await?;

    let report = build_run_report(&deps, run.id)
        .await?
        .context("demo run disappeared")?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
