//! In-memory work queue for tests, local demos, and the `drain --in-memory` mode.

use std::sync::Mutex;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use super::queue::WorkQueue;
use super::work_item::{ErrorKind, FailureOutcome, QueryPayload, QueueCounts, WorkItem, WorkItemStatus};

/// Items are kept in insertion order; every operation runs under one lock, so
/// claims are atomic with respect to each other.
#[derive(Default)]
pub struct MemoryWorkQueue {
    items: Mutex<Vec<WorkItem>>,
}

impl MemoryWorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every item, in insertion order.
    pub fn items(&self) -> Vec<WorkItem> {
        self.items.lock().map(|items| items.clone()).unwrap_or_default()
    }

    /// Backdate an item's claim time. Lets tests simulate a crashed worker.
    pub fn backdate_claim(&self, id: Uuid, by: Duration) -> Result<()> {
        let mut items = self.lock()?;
        let item = items
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or_else(|| anyhow!("work item {} not found", id))?;
        if let Some(claimed_at) = item.claimed_at {
            item.claimed_at = Some(claimed_at - chrono::Duration::from_std(by)?);
        }
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<WorkItem>>> {
        self.items
            .lock()
            .map_err(|_| anyhow!("work queue lock poisoned"))
    }
}

#[async_trait]
impl WorkQueue for MemoryWorkQueue {
    async fn enqueue(&self, run_id: Uuid, payload: QueryPayload, max_attempts: i32) -> Result<Uuid> {
        let item = WorkItem::builder()
            .run_id(run_id)
            .payload(payload)
            .max_attempts(max_attempts)
            .build();
        let id = item.id;
        self.lock()?.push(item);
        Ok(id)
    }

    async fn claim_batch(&self, batch_size: usize, processor_id: &str) -> Result<Vec<WorkItem>> {
        let now = Utc::now();
        let mut items = self.lock()?;
        let claimed = items
            .iter_mut()
            .filter(|i| i.status == WorkItemStatus::Pending)
            .take(batch_size)
            .map(|item| {
                item.status = WorkItemStatus::Processing;
                item.processor_id = Some(processor_id.to_string());
                item.claimed_at = Some(now);
                item.updated_at = now;
                item.clone()
            })
            .collect();
        Ok(claimed)
    }

    async fn complete(&self, id: Uuid, processor_id: &str) -> Result<bool> {
        let now = Utc::now();
        let mut items = self.lock()?;
        match items.iter_mut().find(|i| i.id == id) {
            Some(item) if item.is_claimed_by(processor_id) => {
                item.status = WorkItemStatus::Completed;
                item.completed_at = Some(now);
                item.last_error = None;
                item.updated_at = now;
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(anyhow!("work item {} not found", id)),
        }
    }

    async fn fail_or_retry(
        &self,
        id: Uuid,
        processor_id: &str,
        error: &str,
        kind: ErrorKind,
    ) -> Result<FailureOutcome> {
        let now = Utc::now();
        let mut items = self.lock()?;
        let Some(item) = items.iter_mut().find(|i| i.id == id) else {
            return Err(anyhow!("work item {} not found", id));
        };
        if !item.is_claimed_by(processor_id) {
            return Ok(FailureOutcome::Ignored);
        }

        item.attempts += 1;
        item.processor_id = None;
        item.claimed_at = None;
        item.last_error = Some(error.to_string());
        item.updated_at = now;

        if !kind.should_retry() || item.attempts >= item.max_attempts {
            item.status = WorkItemStatus::Failed;
            item.completed_at = Some(now);
            Ok(FailureOutcome::Failed { attempts: item.attempts })
        } else {
            item.status = WorkItemStatus::Pending;
            Ok(FailureOutcome::Retrying { attempts: item.attempts })
        }
    }

    async fn reclaim_stuck(&self, threshold: Duration) -> Result<u64> {
        let now = Utc::now();
        let cutoff = now - chrono::Duration::from_std(threshold)?;
        let mut items = self.lock()?;
        let mut reclaimed = 0;
        for item in items.iter_mut() {
            let stuck = item.status == WorkItemStatus::Processing
                && item.claimed_at.is_some_and(|at| at < cutoff);
            if stuck {
                item.status = WorkItemStatus::Pending;
                item.processor_id = None;
                item.claimed_at = None;
                item.updated_at = now;
                reclaimed += 1;
            }
        }
        Ok(reclaimed)
    }

    async fn pending_count(&self) -> Result<i64> {
        let items = self.lock()?;
        Ok(items
            .iter()
            .filter(|i| i.status == WorkItemStatus::Pending)
            .count() as i64)
    }

    async fn counts_for_run(&self, run_id: Uuid) -> Result<QueueCounts> {
        let items = self.lock()?;
        let mut counts = QueueCounts::default();
        for item in items.iter().filter(|i| i.run_id == run_id) {
            match item.status {
                WorkItemStatus::Pending => counts.pending += 1,
                WorkItemStatus::Processing => counts.processing += 1,
                WorkItemStatus::Completed => counts.completed += 1,
                WorkItemStatus::Failed => counts.failed += 1,
            }
        }
        Ok(counts)
    }

    async fn find(&self, id: Uuid) -> Result<Option<WorkItem>> {
        Ok(self.lock()?.iter().find(|i| i.id == id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{BrandContext, Platform};

    fn payload(query: &str) -> QueryPayload {
        QueryPayload {
            query_text: query.to_string(),
            platform: Platform::ChatGpt,
            brand: BrandContext::new("Acme"),
            competitors: vec![],
        }
    }

    #[tokio::test]
    async fn test_claim_is_oldest_first_and_exclusive() {
        let queue = MemoryWorkQueue::new();
        let run_id = Uuid::new_v4();
        let first = queue.enqueue(run_id, payload("a"), 3).await.unwrap();
        let second = queue.enqueue(run_id, payload("b"), 3).await.unwrap();
        queue.enqueue(run_id, payload("c"), 3).await.unwrap();

        let batch_a = queue.claim_batch(2, "worker-a").await.unwrap();
        let batch_b = queue.claim_batch(2, "worker-b").await.unwrap();

        assert_eq!(batch_a.iter().map(|i| i.id).collect::<Vec<_>>(), vec![first, second]);
        assert_eq!(batch_b.len(), 1);
        assert_eq!(batch_b[0].processor_id.as_deref(), Some("worker-b"));
        assert!(queue.claim_batch(5, "worker-c").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_retry_until_exhausted() {
        let queue = MemoryWorkQueue::new();
        let id = queue.enqueue(Uuid::new_v4(), payload("a"), 2).await.unwrap();

        queue.claim_batch(1, "w").await.unwrap();
        let first = queue.fail_or_retry(id, "w", "boom", ErrorKind::Retryable).await.unwrap();
        assert_eq!(first, FailureOutcome::Retrying { attempts: 1 });

        queue.claim_batch(1, "w").await.unwrap();
        let second = queue.fail_or_retry(id, "w", "boom", ErrorKind::Retryable).await.unwrap();
        assert_eq!(second, FailureOutcome::Failed { attempts: 2 });

        let item = queue.find(id).await.unwrap().unwrap();
        assert_eq!(item.status, WorkItemStatus::Failed);
        assert_eq!(item.last_error.as_deref(), Some("boom"));
        assert!(queue.claim_batch(1, "w").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_non_retryable_fails_immediately() {
        let queue = MemoryWorkQueue::new();
        let id = queue.enqueue(Uuid::new_v4(), payload("a"), 3).await.unwrap();
        queue.claim_batch(1, "w").await.unwrap();

        let outcome = queue.fail_or_retry(id, "w", "bad request", ErrorKind::NonRetryable).await.unwrap();
        assert_eq!(outcome, FailureOutcome::Failed { attempts: 1 });
    }

    #[tokio::test]
    async fn test_complete_is_idempotent() {
        let queue = MemoryWorkQueue::new();
        let id = queue.enqueue(Uuid::new_v4(), payload("a"), 3).await.unwrap();
        queue.claim_batch(1, "w").await.unwrap();

        assert!(queue.complete(id, "w").await.unwrap());
        assert!(!queue.complete(id, "w").await.unwrap());
        assert_eq!(
            queue.fail_or_retry(id, "w", "late", ErrorKind::Retryable).await.unwrap(),
            FailureOutcome::Ignored
        );
    }

    #[tokio::test]
    async fn test_unclaimed_item_cannot_be_completed() {
        let queue = MemoryWorkQueue::new();
        let id = queue.enqueue(Uuid::new_v4(), payload("a"), 3).await.unwrap();

        assert!(!queue.complete(id, "w").await.unwrap());
        let item = queue.find(id).await.unwrap().unwrap();
        assert_eq!(item.status, WorkItemStatus::Pending);
        assert!(item.completed_at.is_none());
    }

    #[tokio::test]
    async fn test_stale_claimer_cannot_touch_reassigned_item() {
        let queue = MemoryWorkQueue::new();
        let id = queue.enqueue(Uuid::new_v4(), payload("a"), 3).await.unwrap();
        queue.claim_batch(1, "slow").await.unwrap();
        queue.backdate_claim(id, Duration::from_secs(900)).unwrap();
        queue.reclaim_stuck(Duration::from_secs(600)).await.unwrap();
        queue.claim_batch(1, "rescuer").await.unwrap();

        let outcome = queue.fail_or_retry(id, "slow", "timeout", ErrorKind::Retryable).await.unwrap();
        assert_eq!(outcome, FailureOutcome::Ignored);
        assert!(!queue.complete(id, "slow").await.unwrap());

        let item = queue.find(id).await.unwrap().unwrap();
        assert_eq!(item.status, WorkItemStatus::Processing);
        assert_eq!(item.processor_id.as_deref(), Some("rescuer"));
        assert_eq!(item.attempts, 0);
        assert!(queue.claim_batch(1, "third").await.unwrap().is_empty());

        assert!(queue.complete(id, "rescuer").await.unwrap());
    }

    #[tokio::test]
    async fn test_reclaim_only_touches_stale_claims() {
        let queue = MemoryWorkQueue::new();
        let run_id = Uuid::new_v4();
        let stale = queue.enqueue(run_id, payload("a"), 3).await.unwrap();
        let fresh = queue.enqueue(run_id, payload("b"), 3).await.unwrap();
        queue.claim_batch(2, "w").await.unwrap();
        queue.backdate_claim(stale, Duration::from_secs(900)).unwrap();

        let reclaimed = queue.reclaim_stuck(Duration::from_secs(600)).await.unwrap();
        assert_eq!(reclaimed, 1);

        let stale_item = queue.find(stale).await.unwrap().unwrap();
        assert_eq!(stale_item.status, WorkItemStatus::Pending);
        assert!(stale_item.processor_id.is_none());
        assert_eq!(stale_item.attempts, 0);

        let fresh_item = queue.find(fresh).await.unwrap().unwrap();
        assert_eq!(fresh_item.status, WorkItemStatus::Processing);

        let counts = queue.counts_for_run(run_id).await.unwrap();
        assert_eq!(counts, QueueCounts { pending: 1, processing: 1, completed: 0, failed: 0 });
    }
}
