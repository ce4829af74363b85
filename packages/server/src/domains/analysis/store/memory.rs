use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use super::{ResultStore, RunStore};
use crate::domains::analysis::models::{AnalysisRun, PageAnalysis, QueryResult, RunStatus};

/// In-memory run store for testing and local demos.
#[derive(Default)]
pub struct MemoryRunStore {
    runs: RwLock<HashMap<Uuid, AnalysisRun>>,
}

impl MemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn update<F>(&self, id: Uuid, apply: F) -> Result<AnalysisRun>
    where
        F: FnOnce(&mut AnalysisRun),
    {
        let mut runs = self.runs.write().map_err(|_| anyhow!("run store lock poisoned"))?;
        let run = runs
            .get_mut(&id)
            .ok_or_else(|| anyhow!("analysis run {} not found", id))?;
        apply(run);
        Ok(run.clone())
    }
}

#[async_trait]
impl RunStore for MemoryRunStore {
    async fn create(&self, queries_total: i32) -> Result<AnalysisRun> {
        let run = AnalysisRun::new(queries_total);
        self.runs
            .write()
            .map_err(|_| anyhow!("run store lock poisoned"))?
            .insert(run.id, run.clone());
        Ok(run)
    }

    async fn find(&self, id: Uuid) -> Result<Option<AnalysisRun>> {
        let runs = self.runs.read().map_err(|_| anyhow!("run store lock poisoned"))?;
        Ok(runs.get(&id).cloned())
    }

    async fn mark_queued(&self, id: Uuid) -> Result<()> {
        self.update(id, |run| {
            if run.status == RunStatus::Pending {
                run.status = RunStatus::Queued;
                run.updated_at = Utc::now();
            }
        })?;
        Ok(())
    }

    async fn mark_running(&self, id: Uuid) -> Result<()> {
        self.update(id, |run| {
            if matches!(run.status, RunStatus::Pending | RunStatus::Queued) {
                run.status = RunStatus::Running;
                run.updated_at = Utc::now();
            }
        })?;
        Ok(())
    }

    async fn record_item_finished(&self, id: Uuid, failed: bool) -> Result<AnalysisRun> {
        self.update(id, |run| run.record_item_finished(failed))
    }

    async fn mark_failed(&self, id: Uuid, reason: &str) -> Result<()> {
        self.update(id, |run| {
            let now = Utc::now();
            run.status = RunStatus::Failed;
            run.error_message = Some(reason.to_string());
            run.completed_at = Some(now);
            run.updated_at = now;
        })?;
        Ok(())
    }
}

/// In-memory result store for testing and local demos.
#[derive(Default)]
pub struct MemoryResultStore {
    results: RwLock<Vec<QueryResult>>,
    pages: RwLock<Vec<PageAnalysis>>,
}

impl MemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored page analysis, across all runs.
    pub fn all_page_analyses(&self) -> Vec<PageAnalysis> {
        self.pages.read().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ResultStore for MemoryResultStore {
    async fn save_query_result(&self, result: &QueryResult) -> Result<Uuid> {
        let mut results = self
            .results
            .write()
            .map_err(|_| anyhow!("result store lock poisoned"))?;

        if let Some(existing) = results
            .iter_mut()
            .find(|r| r.work_item_id == result.work_item_id)
        {
            existing.response_text = result.response_text.clone();
            existing.citations = result.citations.clone();
            existing.classification = result.classification.clone();
            existing.updated_at = Utc::now();
            return Ok(existing.id);
        }

        results.push(result.clone());
        Ok(result.id)
    }

    async fn save_page_analyses(&self, analyses: &[PageAnalysis]) -> Result<()> {
        let mut pages = self
            .pages
            .write()
            .map_err(|_| anyhow!("result store lock poisoned"))?;

        for analysis in analyses {
            match pages
                .iter_mut()
                .find(|p| p.query_result_id == analysis.query_result_id && p.url == analysis.url)
            {
                Some(existing) => {
                    let id = existing.id;
                    let created_at = existing.created_at;
                    *existing = analysis.clone();
                    existing.id = id;
                    existing.created_at = created_at;
                }
                None => pages.push(analysis.clone()),
            }
        }
        Ok(())
    }

    async fn query_results_for_run(&self, run_id: Uuid) -> Result<Vec<QueryResult>> {
        let results = self
            .results
            .read()
            .map_err(|_| anyhow!("result store lock poisoned"))?;
        Ok(results.iter().filter(|r| r.run_id == run_id).cloned().collect())
    }

    async fn page_analyses_for_result(&self, query_result_id: Uuid) -> Result<Vec<PageAnalysis>> {
        let pages = self
            .pages
            .read()
            .map_err(|_| anyhow!("result store lock poisoned"))?;
        let mut found: Vec<PageAnalysis> = pages
            .iter()
            .filter(|p| p.query_result_id == query_result_id)
            .cloned()
            .collect();
        found.sort_by_key(|p| p.position);
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Platform;
    use crate::domains::analysis::models::ResponseClassification;

    #[tokio::test]
    async fn test_run_lifecycle() {
        let store = MemoryRunStore::new();
        let run = store.create(2).await.unwrap();
        assert_eq!(run.status, RunStatus::Pending);

        store.mark_queued(run.id).await.unwrap();
        store.mark_running(run.id).await.unwrap();
        store.mark_queued(run.id).await.unwrap();
        assert_eq!(store.find(run.id).await.unwrap().unwrap().status, RunStatus::Running);

        store.record_item_finished(run.id, false).await.unwrap();
        let done = store.record_item_finished(run.id, true).await.unwrap();
        assert_eq!(done.status, RunStatus::Completed);
        assert_eq!(done.queries_failed, 1);
    }

    #[tokio::test]
    async fn test_query_result_upsert_by_work_item() {
        let store = MemoryResultStore::new();
        let run_id = Uuid::new_v4();
        let item_id = Uuid::new_v4();

        let first = QueryResult::new(run_id, item_id, "q", Platform::Gemini, "v1", vec![], ResponseClassification::default());
        let second = QueryResult::new(run_id, item_id, "q", Platform::Gemini, "v2", vec![], ResponseClassification::default());

        let first_id = store.save_query_result(&first).await.unwrap();
        let second_id = store.save_query_result(&second).await.unwrap();

        assert_eq!(first_id, second_id);
        let stored = store.query_results_for_run(run_id).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].response_text, "v2");
    }
}
