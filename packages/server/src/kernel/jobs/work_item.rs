//! Work item model: one (query, platform) unit of work belonging to a run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use typed_builder::TypedBuilder;
use uuid::Uuid;

use crate::common::{BrandContext, Platform};

// ============================================================================
// Enums
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "work_item_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum WorkItemStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Transient error - will retry if attempts remain
    #[default]
    Retryable,
    /// Permanent error - fails the item on this attempt
    NonRetryable,
}

impl ErrorKind {
    /// Whether this error kind should trigger a retry
    pub fn should_retry(&self) -> bool {
        matches!(self, ErrorKind::Retryable)
    }
}

/// What `fail_or_retry` did with an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Returned to pending for another attempt
    Retrying { attempts: i32 },
    /// Attempts exhausted (or error was permanent); item is now failed
    Failed { attempts: i32 },
    /// Item was not processing (already completed, failed, or reclaimed)
    Ignored,
}

// ============================================================================
// Payload
// ============================================================================

/// Everything the executor needs to run one query on one platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryPayload {
    pub query_text: String,
    pub platform: Platform,
    pub brand: BrandContext,
    #[serde(default)]
    pub competitors: Vec<String>,
}

// ============================================================================
// Work Item Model
// ============================================================================

#[derive(FromRow, Debug, Clone, Serialize, Deserialize, TypedBuilder)]
pub struct WorkItem {
    #[builder(default = Uuid::now_v7())]
    pub id: Uuid,
    pub run_id: Uuid,
    #[sqlx(json)]
    pub payload: QueryPayload,

    #[builder(default)]
    pub status: WorkItemStatus,
    #[builder(default)]
    pub attempts: i32,
    #[builder(default = 3)]
    pub max_attempts: i32,

    // Claim bookkeeping
    #[builder(default, setter(strip_option))]
    pub processor_id: Option<String>,
    #[builder(default, setter(strip_option))]
    pub claimed_at: Option<DateTime<Utc>>,
    #[builder(default, setter(strip_option))]
    pub completed_at: Option<DateTime<Utc>>,
    #[builder(default, setter(strip_option))]
    pub last_error: Option<String>,

    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,
    #[builder(default = Utc::now())]
    pub updated_at: DateTime<Utc>,
}

impl WorkItem {
    /// Whether the item is processing under this claim.
    pub fn is_claimed_by(&self, processor_id: &str) -> bool {
        self.status == WorkItemStatus::Processing
            && self.processor_id.as_deref() == Some(processor_id)
    }
}

/// Per-status item counts for a single run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounts {
    pub pending: i64,
    pub processing: i64,
    pub completed: i64,
    pub failed: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> QueryPayload {
        QueryPayload {
            query_text: "best crm for startups".into(),
            platform: Platform::Perplexity,
            brand: BrandContext::new("Acme"),
            competitors: vec![],
        }
    }

    #[test]
    fn test_builder_defaults() {
        let item = WorkItem::builder()
            .run_id(Uuid::new_v4())
            .payload(payload())
            .build();

        assert_eq!(item.status, WorkItemStatus::Pending);
        assert_eq!(item.attempts, 0);
        assert_eq!(item.max_attempts, 3);
        assert!(item.processor_id.is_none());
        assert!(!item.is_claimed_by("w"));
    }

    #[test]
    fn test_error_kind_retry() {
        assert!(ErrorKind::Retryable.should_retry());
        assert!(!ErrorKind::NonRetryable.should_retry());
    }
}
