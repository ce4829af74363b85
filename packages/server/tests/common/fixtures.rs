//! Test fixtures for building runs, payloads and workers.

use std::sync::Arc;
use std::time::Duration;

use pipeline_core::common::{BrandContext, Platform};
use pipeline_core::domains::analysis::{QueryExecutor, RunRequest};
use pipeline_core::kernel::jobs::{QueryPayload, QueryWorker, WorkerConfig};
use pipeline_core::kernel::{PipelineDeps, WorkerTrigger};

/// Long enough to pass the thin-content check, no client-rendering markers.
pub const ARTICLE: &str = "<html><head><title>Choosing a CRM</title></head><body><article>\
<h1>Choosing a CRM</h1><p>Acme and Globex both offer pipelines, reporting and contact \
management. Small teams usually care most about price per seat, onboarding time and the \
quality of the mobile app. Larger teams look at permissions, audit trails and integrations \
with their billing and support tools. This guide compares the plans side by side, lists the \
hidden costs of each tier and explains which add-ons are worth paying for in the first year. \
We also cover migration from spreadsheets, the import tools each vendor provides, and how \
long a typical rollout takes for a team of ten to fifty people working across two or three \
offices in different time zones.</p></article></body></html>";

pub fn payload(query: &str) -> QueryPayload {
    QueryPayload {
        query_text: query.to_string(),
        platform: Platform::ChatGpt,
        brand: BrandContext::new("Acme"),
        competitors: vec!["Globex".to_string()],
    }
}

/// One query per platform entry, brand "Acme".
pub fn run_request(queries: &[&str], platforms: &[Platform]) -> RunRequest {
    RunRequest {
        queries: queries.iter().map(|q| q.to_string()).collect(),
        platforms: platforms.to_vec(),
        brand: BrandContext::new("Acme").with_domain("acme.io"),
        competitors: vec!["Globex".to_string()],
    }
}

/// Worker with no inter-item delay, using the deps' trigger for continuation.
pub fn fast_worker(deps: &PipelineDeps) -> QueryWorker {
    fast_worker_with(deps, deps.trigger.clone(), WorkerConfig::default())
}

pub fn fast_worker_with(
    deps: &PipelineDeps,
    trigger: Arc<dyn WorkerTrigger>,
    config: WorkerConfig,
) -> QueryWorker {
    QueryWorker::new(
        deps.queue.clone(),
        deps.runs.clone(),
        Arc::new(QueryExecutor::new(deps.clone())),
        trigger,
        WorkerConfig {
            item_delay: Duration::ZERO,
            ..config
        },
    )
}
