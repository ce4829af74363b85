//! Bounded-runtime worker that drains the work queue.
//!
//! One invocation:
//!
//! ```text
//! ┌─► time left? ──no──────────────┐
//! │       │ yes                    │
//! │       ▼                        │
//! │   reclaim stuck items          │
//! │   claim batch ──empty──────────┤
//! │       │                        │
//! │       ▼                        │
//! │   execute items                │
//! │   complete / fail_or_retry     │
//! │   update run counters          │
//! └───────┘                        ▼
//!                     pending items left? ──yes──► trigger continuation
//!                     (or unknown)
//! ```
//!
//! The continuation is fire-and-forget, so a chain of invocations drains an
//! arbitrarily large queue while each one stays inside its runtime budget.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::queue::WorkQueue;
use super::work_item::{ErrorKind, FailureOutcome, WorkItem};
use crate::domains::analysis::models::RunStatus;
use crate::domains::analysis::store::RunStore;
use crate::kernel::traits::WorkerTrigger;

/// Configuration for the query worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum number of items to claim at once
    pub batch_size: usize,
    /// Total wall-clock budget for one invocation
    pub max_runtime: Duration,
    /// Stop claiming this long before the budget runs out
    pub safety_margin: Duration,
    /// Pause between sequentially processed items
    pub item_delay: Duration,
    /// Items processed at once within a batch
    pub item_concurrency: usize,
    /// Processing items older than this are considered abandoned
    pub liveness_threshold: Duration,
    /// Worker ID for this instance
    pub worker_id: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            batch_size: 5,
            max_runtime: Duration::from_secs(300),
            safety_margin: Duration::from_secs(5),
            item_delay: Duration::from_millis(500),
            item_concurrency: 1,
            liveness_threshold: Duration::from_secs(600),
            worker_id: format!("worker-{}", Uuid::new_v4()),
        }
    }
}

impl WorkerConfig {
    /// Create a new config with a specific worker ID.
    pub fn with_worker_id(worker_id: impl Into<String>) -> Self {
        Self {
            worker_id: worker_id.into(),
            ..Default::default()
        }
    }
}

/// Parameters for one invocation. Unset fields fall back to [`WorkerConfig`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerInvocation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_runtime_secs: Option<u64>,
}

/// Failure from executing a single item.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct HandlerError {
    pub message: String,
    pub kind: ErrorKind,
}

impl HandlerError {
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: ErrorKind::Retryable,
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: ErrorKind::NonRetryable,
        }
    }
}

/// Executes the business logic for one claimed item.
#[async_trait]
pub trait WorkItemHandler: Send + Sync {
    async fn execute(&self, item: &WorkItem) -> Result<(), HandlerError>;
}

/// Why an invocation stopped claiming.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    #[default]
    QueueEmpty,
    TimeBudget,
}

/// Summary of one invocation.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WorkerReport {
    pub worker_id: String,
    pub reclaimed: u64,
    pub batches: u32,
    pub claimed: u32,
    pub completed: u32,
    pub retried: u32,
    pub failed: u32,
    /// Items whose claim was lost to stuck-item recovery before they finished
    pub superseded: u32,
    /// Items whose outcome could not be recorded; stuck-item recovery picks them up
    pub unrecorded: u32,
    pub stop_reason: StopReason,
    pub continued: bool,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ItemOutcome {
    Completed,
    Retrying,
    Failed,
    Superseded,
    Unrecorded,
}

impl WorkerReport {
    fn tally(&mut self, outcome: ItemOutcome) {
        match outcome {
            ItemOutcome::Completed => self.completed += 1,
            ItemOutcome::Retrying => self.retried += 1,
            ItemOutcome::Failed => self.failed += 1,
            ItemOutcome::Superseded => self.superseded += 1,
            ItemOutcome::Unrecorded => self.unrecorded += 1,
        }
    }
}

/// Claims and executes work items until the queue is empty or the time budget
/// is spent, then hands off to a continuation if work remains.
pub struct QueryWorker {
    queue: Arc<dyn WorkQueue>,
    runs: Arc<dyn RunStore>,
    handler: Arc<dyn WorkItemHandler>,
    trigger: Arc<dyn WorkerTrigger>,
    config: WorkerConfig,
}

impl QueryWorker {
    pub fn new(
        queue: Arc<dyn WorkQueue>,
        runs: Arc<dyn RunStore>,
        handler: Arc<dyn WorkItemHandler>,
        trigger: Arc<dyn WorkerTrigger>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            queue,
            runs,
            handler,
            trigger,
            config,
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Items still waiting to be claimed.
    pub async fn pending_count(&self) -> Result<i64> {
        self.queue.pending_count().await
    }

    /// Run one invocation.
    ///
    /// Returns an error only when the queue itself is unusable (claiming
    /// fails); no continuation is triggered in that case.
    pub async fn run(&self, invocation: WorkerInvocation) -> Result<WorkerReport> {
        let started = Instant::now();
        let batch_size = invocation.batch_size.unwrap_or(self.config.batch_size).max(1);
        let max_runtime = invocation
            .max_runtime_secs
            .map(Duration::from_secs)
            .unwrap_or(self.config.max_runtime);
        let deadline = started + max_runtime.saturating_sub(self.config.safety_margin);

        info!(
            worker_id = %self.config.worker_id,
            batch_size,
            max_runtime_secs = max_runtime.as_secs(),
            "worker invocation starting"
        );

        let mut report = WorkerReport {
            worker_id: self.config.worker_id.clone(),
            ..Default::default()
        };

        loop {
            if Instant::now() >= deadline {
                report.stop_reason = StopReason::TimeBudget;
                break;
            }

            match self.queue.reclaim_stuck(self.config.liveness_threshold).await {
                Ok(reclaimed) => report.reclaimed += reclaimed,
                Err(e) => warn!(error = %e, "failed to reclaim stuck items"),
            }

            let processor_id = format!("{}:{}", self.config.worker_id, Uuid::new_v4());
            let items = match self.queue.claim_batch(batch_size, &processor_id).await {
                Ok(items) => items,
                Err(e) => {
                    error!(worker_id = %self.config.worker_id, error = %e, "failed to claim work items");
                    return Err(e);
                }
            };

            if items.is_empty() {
                report.stop_reason = StopReason::QueueEmpty;
                break;
            }

            debug!(processor_id = %processor_id, count = items.len(), "claimed work items");
            report.batches += 1;
            report.claimed += items.len() as u32;
            self.mark_runs_started(&items).await;

            if self.config.item_concurrency <= 1 {
                for (index, item) in items.into_iter().enumerate() {
                    if index > 0 && !self.config.item_delay.is_zero() {
                        tokio::time::sleep(self.config.item_delay).await;
                    }
                    report.tally(self.process_item(item, &processor_id).await);
                }
            } else {
                let outcomes: Vec<ItemOutcome> = stream::iter(items)
                    .map(|item| self.process_item(item, &processor_id))
                    .buffer_unordered(self.config.item_concurrency)
                    .collect()
                    .await;
                outcomes.into_iter().for_each(|o| report.tally(o));
            }
        }

        // Continue when the count is unknown
        let work_remains = match self.queue.pending_count().await {
            Ok(pending) => pending > 0,
            Err(e) => {
                warn!(error = %e, "failed to count pending items, continuing anyway");
                true
            }
        };
        if work_remains {
            info!("work remains, triggering continuation");
            self.trigger.trigger(WorkerInvocation {
                batch_size: Some(batch_size),
                max_runtime_secs: Some(max_runtime.as_secs()),
            });
            report.continued = true;
        }

        report.elapsed_ms = started.elapsed().as_millis() as u64;
        info!(
            worker_id = %self.config.worker_id,
            claimed = report.claimed,
            completed = report.completed,
            retried = report.retried,
            failed = report.failed,
            stop_reason = ?report.stop_reason,
            continued = report.continued,
            elapsed_ms = report.elapsed_ms,
            "worker invocation finished"
        );
        Ok(report)
    }

    async fn mark_runs_started(&self, items: &[WorkItem]) {
        let run_ids: HashSet<Uuid> = items.iter().map(|i| i.run_id).collect();
        for run_id in run_ids {
            if let Err(e) = self.runs.mark_running(run_id).await {
                warn!(run_id = %run_id, error = %e, "failed to mark run as running");
            }
        }
    }

    /// Process a single claimed item.
    async fn process_item(&self, item: WorkItem, processor_id: &str) -> ItemOutcome {
        let item_id = item.id;
        let run_id = item.run_id;

        match self.handler.execute(&item).await {
            Ok(()) => match self.queue.complete(item_id, processor_id).await {
                Ok(true) => {
                    debug!(item_id = %item_id, "work item completed");
                    self.record_finished(run_id, false).await;
                    ItemOutcome::Completed
                }
                Ok(false) => {
                    // Reclaimed while we worked; the new claimer owns the outcome
                    debug!(item_id = %item_id, "work item claim superseded");
                    ItemOutcome::Superseded
                }
                Err(e) => {
                    error!(item_id = %item_id, error = %e, "failed to mark work item as completed");
                    ItemOutcome::Unrecorded
                }
            },
            Err(err) => {
                warn!(item_id = %item_id, kind = ?err.kind, error = %err, "work item failed");
                match self
                    .queue
                    .fail_or_retry(item_id, processor_id, &err.message, err.kind)
                    .await
                {
                    Ok(FailureOutcome::Failed { attempts }) => {
                        warn!(item_id = %item_id, attempts, "work item failed permanently");
                        self.record_finished(run_id, true).await;
                        ItemOutcome::Failed
                    }
                    Ok(FailureOutcome::Retrying { attempts }) => {
                        debug!(item_id = %item_id, attempts, "work item returned to queue");
                        ItemOutcome::Retrying
                    }
                    Ok(FailureOutcome::Ignored) => {
                        debug!(item_id = %item_id, "work item claim superseded");
                        ItemOutcome::Superseded
                    }
                    Err(e) => {
                        error!(item_id = %item_id, error = %e, "failed to record work item failure");
                        ItemOutcome::Unrecorded
                    }
                }
            }
        }
    }

    async fn record_finished(&self, run_id: Uuid, failed: bool) {
        match self.runs.record_item_finished(run_id, failed).await {
            Ok(run) if run.status == RunStatus::Completed => {
                info!(
                    run_id = %run_id,
                    total = run.queries_total,
                    failed = run.queries_failed,
                    "analysis run completed"
                );
            }
            Ok(_) => {}
            Err(e) => error!(run_id = %run_id, error = %e, "failed to update run progress"),
        }
    }
}
