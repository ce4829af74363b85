use anyhow::{anyhow, Result};
use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use super::{ResultStore, RunStore};
use crate::domains::analysis::models::{AnalysisRun, PageAnalysis, QueryResult};

const RUN_COLUMNS: &str = "id, status, queries_total, queries_completed, queries_failed, \
                           error_message, completed_at, created_at, updated_at";

#[derive(Clone)]
pub struct PostgresRunStore {
    pool: PgPool,
}

impl PostgresRunStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RunStore for PostgresRunStore {
    async fn create(&self, queries_total: i32) -> Result<AnalysisRun> {
        let run = AnalysisRun::new(queries_total);
        let sql = format!(
            "INSERT INTO analysis_runs (id, status, queries_total) VALUES ($1, 'pending', $2) RETURNING {RUN_COLUMNS}"
        );
        let run = sqlx::query_as::<_, AnalysisRun>(&sql)
            .bind(run.id)
            .bind(run.queries_total)
            .fetch_one(&self.pool)
            .await?;
        Ok(run)
    }

    async fn find(&self, id: Uuid) -> Result<Option<AnalysisRun>> {
        let sql = format!("SELECT {RUN_COLUMNS} FROM analysis_runs WHERE id = $1");
        let run = sqlx::query_as::<_, AnalysisRun>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(run)
    }

    async fn mark_queued(&self, id: Uuid) -> Result<()> {
        sqlx::query(
            "UPDATE analysis_runs SET status = 'queued', updated_at = NOW() WHERE id = $1 AND status = 'pending'",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_running(&self, id: Uuid) -> Result<()> {
        sqlx::query(
            "UPDATE analysis_runs SET status = 'running', updated_at = NOW() WHERE id = $1 AND status IN ('pending', 'queued')",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_item_finished(&self, id: Uuid, failed: bool) -> Result<AnalysisRun> {
        // Single statement so concurrent workers never lose an increment
        let sql = format!(
            r#"
            UPDATE analysis_runs
            SET
                queries_completed = LEAST(queries_completed + 1, queries_total),
                queries_failed = queries_failed + CASE WHEN $2 THEN 1 ELSE 0 END,
                status = CASE
                    WHEN status = 'failed' THEN status
                    WHEN queries_completed + 1 >= queries_total THEN 'completed'::run_status
                    ELSE 'running'::run_status
                END,
                completed_at = CASE
                    WHEN status <> 'failed' AND queries_completed + 1 >= queries_total
                        THEN COALESCE(completed_at, NOW())
                    ELSE completed_at
                END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {RUN_COLUMNS}
            "#
        );
        sqlx::query_as::<_, AnalysisRun>(&sql)
            .bind(id)
            .bind(failed)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| anyhow!("analysis run {} not found", id))
    }

    async fn mark_failed(&self, id: Uuid, reason: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE analysis_runs
            SET status = 'failed', error_message = $2, completed_at = NOW(), updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(reason)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

const RESULT_COLUMNS: &str = "id, run_id, work_item_id, query_text, platform, response_text, \
                              citations, classification, created_at, updated_at";

const PAGE_COLUMNS: &str = "id, query_result_id, run_id, url, domain, position, citation_source, \
                            title, status, crawl_method, status_code, word_count, credits_spent, \
                            crawl_attempts, error_message, quality, created_at";

#[derive(Clone)]
pub struct PostgresResultStore {
    pool: PgPool,
}

impl PostgresResultStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ResultStore for PostgresResultStore {
    async fn save_query_result(&self, result: &QueryResult) -> Result<Uuid> {
        let id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO query_results
                (id, run_id, work_item_id, query_text, platform, response_text, citations, classification)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (work_item_id) DO UPDATE SET
                response_text = EXCLUDED.response_text,
                citations = EXCLUDED.citations,
                classification = EXCLUDED.classification,
                updated_at = NOW()
            RETURNING id
            "#,
        )
        .bind(result.id)
        .bind(result.run_id)
        .bind(result.work_item_id)
        .bind(&result.query_text)
        .bind(result.platform)
        .bind(&result.response_text)
        .bind(Json(&result.citations))
        .bind(Json(&result.classification))
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    async fn save_page_analyses(&self, analyses: &[PageAnalysis]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for page in analyses {
            sqlx::query(
                r#"
                INSERT INTO page_analyses
                    (id, query_result_id, run_id, url, domain, position, citation_source, title, status,
                     crawl_method, status_code, word_count, credits_spent, crawl_attempts, error_message, quality)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
                ON CONFLICT (query_result_id, url) DO UPDATE SET
                    position = EXCLUDED.position,
                    citation_source = EXCLUDED.citation_source,
                    title = EXCLUDED.title,
                    status = EXCLUDED.status,
                    crawl_method = EXCLUDED.crawl_method,
                    status_code = EXCLUDED.status_code,
                    word_count = EXCLUDED.word_count,
                    credits_spent = EXCLUDED.credits_spent,
                    crawl_attempts = EXCLUDED.crawl_attempts,
                    error_message = EXCLUDED.error_message,
                    quality = EXCLUDED.quality
                "#,
            )
            .bind(page.id)
            .bind(page.query_result_id)
            .bind(page.run_id)
            .bind(&page.url)
            .bind(&page.domain)
            .bind(page.position)
            .bind(&page.citation_source)
            .bind(&page.title)
            .bind(page.status)
            .bind(&page.crawl_method)
            .bind(page.status_code)
            .bind(page.word_count)
            .bind(page.credits_spent)
            .bind(Json(&page.crawl_attempts))
            .bind(&page.error_message)
            .bind(Json(&page.quality))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn query_results_for_run(&self, run_id: Uuid) -> Result<Vec<QueryResult>> {
        let sql = format!(
            "SELECT {RESULT_COLUMNS} FROM query_results WHERE run_id = $1 ORDER BY created_at, id"
        );
        let results = sqlx::query_as::<_, QueryResult>(&sql)
            .bind(run_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(results)
    }

    async fn page_analyses_for_result(&self, query_result_id: Uuid) -> Result<Vec<PageAnalysis>> {
        let sql = format!(
            "SELECT {PAGE_COLUMNS} FROM page_analyses WHERE query_result_id = $1 ORDER BY position"
        );
        let pages = sqlx::query_as::<_, PageAnalysis>(&sql)
            .bind(query_result_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(pages)
    }
}
