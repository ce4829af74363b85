// Trait definitions for dependency injection
//
// These are INFRASTRUCTURE traits only - no business logic.
// The query pipeline itself lives in domains/analysis/actions and uses these traits.
//
// Naming convention: Base* for external collaborator traits (e.g., BaseQueryDispatcher)

use async_trait::async_trait;

use crate::common::{BrandContext, Platform};
use crate::domains::analysis::models::{ContentQualityRecord, ResponseClassification};
use crate::kernel::dispatch::{DispatchError, DispatchResponse};
use crate::kernel::jobs::{QueryPayload, WorkerInvocation};

// =============================================================================
// Query Dispatch (Infrastructure - AI answer platforms)
// =============================================================================

#[async_trait]
pub trait BaseQueryDispatcher: Send + Sync {
    /// Send a query to a platform and return its answer plus any native citations.
    ///
    /// Implementations retry transient failures internally; an error returned
    /// here is either exhausted-transient or permanent, see [`DispatchError::is_retryable`].
    async fn dispatch(
        &self,
        platform: Platform,
        query_text: &str,
    ) -> Result<DispatchResponse, DispatchError>;
}

// =============================================================================
// Content Scoring (Infrastructure - LLM page quality)
// =============================================================================

/// What the scorer sees of a cited page.
#[derive(Debug, Clone)]
pub struct ScoringRequest<'a> {
    pub url: &'a str,
    pub title: Option<&'a str>,
    pub markdown: &'a str,
    pub query_text: &'a str,
    pub brand: &'a BrandContext,
}

#[async_trait]
pub trait BaseContentScorer: Send + Sync {
    /// Score page content. Never fails: scoring problems yield
    /// [`ContentQualityRecord::fallback`].
    async fn score(&self, request: &ScoringRequest<'_>) -> ContentQualityRecord;
}

// =============================================================================
// Response Classification
// =============================================================================

pub trait BaseResponseClassifier: Send + Sync {
    fn classify(&self, content: &str, payload: &QueryPayload) -> ResponseClassification;
}

// =============================================================================
// Worker Continuation
// =============================================================================

/// Starts another worker invocation without waiting for it.
pub trait WorkerTrigger: Send + Sync {
    fn trigger(&self, invocation: WorkerInvocation);
}
