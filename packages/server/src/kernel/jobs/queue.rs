//! PostgreSQL-backed work queue.
//!
//! Claims use `FOR UPDATE SKIP LOCKED` so concurrent workers never receive the
//! same item. Every state transition is a single conditional `UPDATE` guarded
//! on the claimer's `processor_id`, so a worker whose claim was reclaimed and
//! handed to someone else cannot finish or reset the new claim.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{debug, info};
use uuid::Uuid;

use super::work_item::{ErrorKind, FailureOutcome, QueryPayload, QueueCounts, WorkItem, WorkItemStatus};

/// Durable queue of work items.
#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Insert a pending item for `run_id`.
    async fn enqueue(&self, run_id: Uuid, payload: QueryPayload, max_attempts: i32) -> Result<Uuid>;

    /// Insert several items for the same run. Either all are enqueued or none.
    async fn enqueue_many(
        &self,
        run_id: Uuid,
        payloads: Vec<QueryPayload>,
        max_attempts: i32,
    ) -> Result<Vec<Uuid>> {
        let mut ids = Vec::with_capacity(payloads.len());
        for payload in payloads {
            ids.push(self.enqueue(run_id, payload, max_attempts).await?);
        }
        Ok(ids)
    }

    /// Atomically move up to `batch_size` pending items to processing, oldest first.
    async fn claim_batch(&self, batch_size: usize, processor_id: &str) -> Result<Vec<WorkItem>>;

    /// Mark an item completed. Returns `false` unless the item is still
    /// processing under `processor_id`.
    async fn complete(&self, id: Uuid, processor_id: &str) -> Result<bool>;

    /// Record a failed attempt: back to pending while attempts remain, otherwise
    /// failed. Reports from anyone but the current claimer are ignored.
    async fn fail_or_retry(
        &self,
        id: Uuid,
        processor_id: &str,
        error: &str,
        kind: ErrorKind,
    ) -> Result<FailureOutcome>;

    /// Return items stuck in processing longer than `threshold` to pending.
    async fn reclaim_stuck(&self, threshold: Duration) -> Result<u64>;

    /// Number of pending items across all runs.
    async fn pending_count(&self) -> Result<i64>;

    async fn counts_for_run(&self, run_id: Uuid) -> Result<QueueCounts>;

    async fn find(&self, id: Uuid) -> Result<Option<WorkItem>>;
}

const RETURNING: &str = "id, run_id, payload, status, attempts, max_attempts, processor_id, \
                         claimed_at, completed_at, last_error, created_at, updated_at";

/// PostgreSQL-backed implementation of [`WorkQueue`].
#[derive(Clone)]
pub struct PostgresWorkQueue {
    pool: PgPool,
}

impl PostgresWorkQueue {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WorkQueue for PostgresWorkQueue {
    async fn enqueue(&self, run_id: Uuid, payload: QueryPayload, max_attempts: i32) -> Result<Uuid> {
        let id = Uuid::now_v7();
        sqlx::query(
            r#"
            INSERT INTO work_items (id, run_id, payload, status, attempts, max_attempts)
            VALUES ($1, $2, $3, 'pending', 0, $4)
            "#,
        )
        .bind(id)
        .bind(run_id)
        .bind(sqlx::types::Json(&payload))
        .bind(max_attempts)
        .execute(&self.pool)
        .await?;

        debug!(item_id = %id, run_id = %run_id, platform = %payload.platform, "enqueued work item");
        Ok(id)
    }

    async fn enqueue_many(
        &self,
        run_id: Uuid,
        payloads: Vec<QueryPayload>,
        max_attempts: i32,
    ) -> Result<Vec<Uuid>> {
        let mut tx = self.pool.begin().await?;
        let mut ids = Vec::with_capacity(payloads.len());
        for payload in &payloads {
            let id = Uuid::now_v7();
            sqlx::query(
                r#"
                INSERT INTO work_items (id, run_id, payload, status, attempts, max_attempts)
                VALUES ($1, $2, $3, 'pending', 0, $4)
                "#,
            )
            .bind(id)
            .bind(run_id)
            .bind(sqlx::types::Json(payload))
            .bind(max_attempts)
            .execute(&mut *tx)
            .await?;
            ids.push(id);
        }
        tx.commit().await?;

        debug!(run_id = %run_id, count = ids.len(), "enqueued work items");
        Ok(ids)
    }

    async fn claim_batch(&self, batch_size: usize, processor_id: &str) -> Result<Vec<WorkItem>> {
        let sql = format!(
            r#"
            WITH next_items AS (
                SELECT id
                FROM work_items
                WHERE status = 'pending'
                ORDER BY created_at, id
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE work_items
            SET
                status = 'processing',
                processor_id = $2,
                claimed_at = NOW(),
                updated_at = NOW()
            WHERE id IN (SELECT id FROM next_items)
            RETURNING {RETURNING}
            "#
        );

        let mut items = sqlx::query_as::<_, WorkItem>(&sql)
            .bind(batch_size as i64)
            .bind(processor_id)
            .fetch_all(&self.pool)
            .await?;

        // RETURNING does not preserve the CTE ordering
        items.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(items)
    }

    async fn complete(&self, id: Uuid, processor_id: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE work_items
            SET status = 'completed',
                completed_at = NOW(),
                last_error = NULL,
                updated_at = NOW()
            WHERE id = $1 AND status = 'processing' AND processor_id = $2
            "#,
        )
        .bind(id)
        .bind(processor_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn fail_or_retry(
        &self,
        id: Uuid,
        processor_id: &str,
        error: &str,
        kind: ErrorKind,
    ) -> Result<FailureOutcome> {
        let row: Option<(WorkItemStatus, i32)> = sqlx::query_as(
            r#"
            UPDATE work_items
            SET
                attempts = attempts + 1,
                status = CASE
                    WHEN $3 OR attempts + 1 >= max_attempts THEN 'failed'::work_item_status
                    ELSE 'pending'::work_item_status
                END,
                completed_at = CASE
                    WHEN $3 OR attempts + 1 >= max_attempts THEN NOW()
                    ELSE NULL
                END,
                processor_id = NULL,
                claimed_at = NULL,
                last_error = $2,
                updated_at = NOW()
            WHERE id = $1 AND status = 'processing' AND processor_id = $4
            RETURNING status, attempts
            "#,
        )
        .bind(id)
        .bind(error)
        .bind(!kind.should_retry())
        .bind(processor_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(match row {
            Some((WorkItemStatus::Failed, attempts)) => FailureOutcome::Failed { attempts },
            Some((_, attempts)) => FailureOutcome::Retrying { attempts },
            None => FailureOutcome::Ignored,
        })
    }

    async fn reclaim_stuck(&self, threshold: Duration) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE work_items
            SET status = 'pending',
                processor_id = NULL,
                claimed_at = NULL,
                updated_at = NOW()
            WHERE status = 'processing'
              AND claimed_at < NOW() - ($1 || ' milliseconds')::INTERVAL
            "#,
        )
        .bind(threshold.as_millis().to_string())
        .execute(&self.pool)
        .await?;

        let reclaimed = result.rows_affected();
        if reclaimed > 0 {
            info!(reclaimed, "reclaimed stuck work items");
        }
        Ok(reclaimed)
    }

    async fn pending_count(&self) -> Result<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM work_items WHERE status = 'pending'")
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    async fn counts_for_run(&self, run_id: Uuid) -> Result<QueueCounts> {
        let rows: Vec<(WorkItemStatus, i64)> = sqlx::query_as(
            "SELECT status, COUNT(*) FROM work_items WHERE run_id = $1 GROUP BY status",
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await?;

        let mut counts = QueueCounts::default();
        for (status, count) in rows {
            match status {
                WorkItemStatus::Pending => counts.pending = count,
                WorkItemStatus::Processing => counts.processing = count,
                WorkItemStatus::Completed => counts.completed = count,
                WorkItemStatus::Failed => counts.failed = count,
            }
        }
        Ok(counts)
    }

    async fn find(&self, id: Uuid) -> Result<Option<WorkItem>> {
        let sql = format!("SELECT {RETURNING} FROM work_items WHERE id = $1");
        let item = sqlx::query_as::<_, WorkItem>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(item)
    }
}
