//! Persistence for runs, query results and page analyses.

mod memory;
mod postgres;

use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use super::models::{AnalysisRun, PageAnalysis, QueryResult};

pub use memory::{MemoryResultStore, MemoryRunStore};
pub use postgres::{PostgresResultStore, PostgresRunStore};

/// Run records and their progress counters.
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Create a run in `pending` with the expected item count.
    async fn create(&self, queries_total: i32) -> Result<AnalysisRun>;

    async fn find(&self, id: Uuid) -> Result<Option<AnalysisRun>>;

    /// `pending` -> `queued`, once its items are enqueued.
    async fn mark_queued(&self, id: Uuid) -> Result<()>;

    /// `pending`/`queued` -> `running`. No-op for any other status.
    async fn mark_running(&self, id: Uuid) -> Result<()>;

    /// Count one item as finished. Must be atomic under concurrent workers.
    async fn record_item_finished(&self, id: Uuid, failed: bool) -> Result<AnalysisRun>;

    async fn mark_failed(&self, id: Uuid, reason: &str) -> Result<()>;
}

/// Query results and page analyses. Writes are upserts so re-executing an
/// item replaces its earlier output.
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Upsert keyed by work item; returns the stored result id.
    async fn save_query_result(&self, result: &QueryResult) -> Result<Uuid>;

    /// Upsert keyed by (query result, url).
    async fn save_page_analyses(&self, analyses: &[PageAnalysis]) -> Result<()>;

    async fn query_results_for_run(&self, run_id: Uuid) -> Result<Vec<QueryResult>>;

    async fn page_analyses_for_result(&self, query_result_id: Uuid) -> Result<Vec<PageAnalysis>>;
}
