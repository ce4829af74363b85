use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::quality::ResponseClassification;
use crate::common::Platform;
use crate::domains::citations::Citation;

/// QueryResult - the platform's answer to one work item, with its citations
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct QueryResult {
    pub id: Uuid,
    pub run_id: Uuid,
    /// One result per work item; re-executions overwrite it
    pub work_item_id: Uuid,
    pub query_text: String,
    pub platform: Platform,
    pub response_text: String,
    #[sqlx(json)]
    pub citations: Vec<Citation>,
    #[sqlx(json)]
    pub classification: ResponseClassification,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl QueryResult {
    pub fn new(
        run_id: Uuid,
        work_item_id: Uuid,
        query_text: impl Into<String>,
        platform: Platform,
        response_text: impl Into<String>,
        citations: Vec<Citation>,
        classification: ResponseClassification,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            run_id,
            work_item_id,
            query_text: query_text.into(),
            platform,
            response_text: response_text.into(),
            citations,
            classification,
            created_at: now,
            updated_at: now,
        }
    }
}
