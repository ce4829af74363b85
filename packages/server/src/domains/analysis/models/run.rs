use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of an analysis run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "run_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    #[default]
    Pending,
    Queued,
    Running,
    Completed,
    Failed,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Pending => write!(f, "pending"),
            RunStatus::Queued => write!(f, "queued"),
            RunStatus::Running => write!(f, "running"),
            RunStatus::Completed => write!(f, "completed"),
            RunStatus::Failed => write!(f, "failed"),
        }
    }
}

/// AnalysisRun - aggregate progress for a batch of queries
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AnalysisRun {
    pub id: Uuid,
    pub status: RunStatus,
    pub queries_total: i32,
    /// Items that reached a terminal state, successful or not
    pub queries_completed: i32,
    /// Subset of `queries_completed` that ended in failure
    pub queries_failed: i32,
    pub error_message: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AnalysisRun {
    pub fn new(queries_total: i32) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            status: RunStatus::Pending,
            queries_total,
            queries_completed: 0,
            queries_failed: 0,
            error_message: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply one terminal item transition. Mirrors the SQL in `PostgresRunStore`.
    pub fn record_item_finished(&mut self, failed: bool) {
        let now = Utc::now();
        self.queries_completed = (self.queries_completed + 1).min(self.queries_total);
        if failed {
            self.queries_failed += 1;
        }
        if self.status != RunStatus::Failed {
            if self.queries_completed >= self.queries_total {
                self.status = RunStatus::Completed;
                self.completed_at.get_or_insert(now);
            } else {
                self.status = RunStatus::Running;
            }
        }
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completes_only_when_all_items_finish() {
        let mut run = AnalysisRun::new(2);
        run.record_item_finished(false);
        assert_eq!(run.status, RunStatus::Running);
        assert!(run.completed_at.is_none());

        run.record_item_finished(true);
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.queries_completed, 2);
        assert_eq!(run.queries_failed, 1);
        assert!(run.completed_at.is_some());
    }

    #[test]
    fn test_counter_never_exceeds_total() {
        let mut run = AnalysisRun::new(1);
        run.record_item_finished(false);
        run.record_item_finished(false);
        assert_eq!(run.queries_completed, 1);
    }

    #[test]
    fn test_failed_run_stays_failed() {
        let mut run = AnalysisRun::new(1);
        run.status = RunStatus::Failed;
        run.record_item_finished(false);
        assert_eq!(run.status, RunStatus::Failed);
    }
}
