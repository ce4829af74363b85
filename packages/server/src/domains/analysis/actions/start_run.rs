//! Run creation: one work item per (query, platform), then wake a worker.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

use crate::common::{BrandContext, Platform};
use crate::domains::analysis::models::AnalysisRun;
use crate::kernel::jobs::{QueryPayload, WorkerInvocation};
use crate::kernel::PipelineDeps;

/// Request to analyze a set of queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRequest {
    pub queries: Vec<String>,
    #[serde(default = "default_platforms")]
    pub platforms: Vec<Platform>,
    pub brand: BrandContext,
    #[serde(default)]
    pub competitors: Vec<String>,
}

fn default_platforms() -> Vec<Platform> {
    Platform::ALL.to_vec()
}

impl RunRequest {
    /// Expand into one payload per (query, platform), skipping blank and duplicate queries.
    pub fn payloads(&self) -> Vec<QueryPayload> {
        let mut queries: Vec<&str> = Vec::new();
        for query in self.queries.iter().map(|q| q.trim()).filter(|q| !q.is_empty()) {
            if !queries.contains(&query) {
                queries.push(query);
            }
        }

        let mut platforms: Vec<Platform> = Vec::new();
        for platform in &self.platforms {
            if !platforms.contains(platform) {
                platforms.push(*platform);
            }
        }

        queries
            .iter()
            .flat_map(|query| {
                platforms.iter().map(move |platform| QueryPayload {
                    query_text: query.to_string(),
                    platform: *platform,
                    brand: self.brand.clone(),
                    competitors: self.competitors.clone(),
                })
            })
            .collect()
    }

    /// Check the request and return its payloads.
    pub fn validate(&self) -> Result<Vec<QueryPayload>> {
        if self.brand.name.trim().is_empty() {
            bail!("brand name is required");
        }
        let payloads = self.payloads();
        if payloads.is_empty() {
            bail!("at least one query and one platform are required");
        }
        Ok(payloads)
    }
}

/// Create a run, enqueue its items and trigger a worker.
///
/// If enqueueing fails part-way the run is marked failed, since its total
/// would never be reached.
pub async fn enqueue_run(
    request: &RunRequest,
    deps: &PipelineDeps,
    invocation: WorkerInvocation,
) -> Result<AnalysisRun> {
    let payloads = request.validate()?;

    let run = deps
        .runs
        .create(payloads.len() as i32)
        .await
        .context("failed to create analysis run")?;

    if let Err(e) = deps
        .queue
        .enqueue_many(run.id, payloads, deps.max_attempts)
        .await
    {
        error!(run_id = %run.id, error = %e, "failed to enqueue run items");
        mark_run_failed(deps, run.id, &format!("enqueue failed: {e:#}")).await?;
        return Err(e.context("failed to enqueue run items"));
    }

    deps.runs.mark_queued(run.id).await?;
    info!(run_id = %run.id, items = run.queries_total, "analysis run queued");

    deps.trigger.trigger(invocation);

    deps.runs
        .find(run.id)
        .await?
        .context("analysis run disappeared after creation")
}

/// Mark a run failed with a reason.
pub async fn mark_run_failed(deps: &PipelineDeps, run_id: Uuid, reason: &str) -> Result<()> {
    deps.runs
        .mark_failed(run_id, reason)
        .await
        .with_context(|| format!("failed to mark run {} as failed", run_id))
}
