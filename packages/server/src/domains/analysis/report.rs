//! Run aggregation: progress counters plus a summary of stored results.

use std::collections::{BTreeMap, HashMap};

use anyhow::{Context, Result};
use serde::Serialize;
use uuid::Uuid;

use crate::common::Platform;
use crate::domains::analysis::models::{AnalysisRun, PageAnalysisStatus};
use crate::kernel::jobs::QueueCounts;
use crate::kernel::PipelineDeps;

/// How many top cited domains a report lists.
const TOP_DOMAINS: usize = 10;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PlatformStats {
    pub queries: usize,
    pub brand_mentions: usize,
    pub citations: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DomainCount {
    pub domain: String,
    pub citations: usize,
}

/// Pollable view of a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run: AnalysisRun,
    /// Item states straight from the queue, useful while counters lag
    pub items: QueueCounts,
    pub platforms: BTreeMap<Platform, PlatformStats>,
    pub total_citations: usize,
    pub pages_analyzed: usize,
    pub pages_degraded: usize,
    pub credits_spent: i64,
    pub top_domains: Vec<DomainCount>,
    /// Share of answered queries mentioning the brand, 0.0 when none answered
    pub brand_mention_rate: f64,
}

/// Build the report for a run, or `None` if the run does not exist.
pub async fn build_run_report(deps: &PipelineDeps, run_id: Uuid) -> Result<Option<RunReport>> {
    let Some(run) = deps.runs.find(run_id).await? else {
        return Ok(None);
    };

    let items = deps
        .queue
        .counts_for_run(run_id)
        .await
        .context("failed to count run items")?;
    let results = deps
        .results
        .query_results_for_run(run_id)
        .await
        .context("failed to load query results")?;

    let mut platforms: BTreeMap<Platform, PlatformStats> = BTreeMap::new();
    let mut domains: HashMap<String, usize> = HashMap::new();
    let mut total_citations = 0;
    let mut brand_mentions = 0;
    let mut pages_analyzed = 0;
    let mut pages_degraded = 0;
    let mut credits_spent = 0i64;

    for result in &results {
        let stats = platforms.entry(result.platform).or_default();
        stats.queries += 1;
        stats.citations += result.citations.len();
        if result.classification.brand_mentioned {
            stats.brand_mentions += 1;
            brand_mentions += 1;
        }
        total_citations += result.citations.len();
        for citation in &result.citations {
            *domains.entry(citation.domain.clone()).or_default() += 1;
        }

        let pages = deps
            .results
            .page_analyses_for_result(result.id)
            .await
            .context("failed to load page analyses")?;
        for page in &pages {
            credits_spent += i64::from(page.credits_spent);
            if page.status == PageAnalysisStatus::Analyzed {
                pages_analyzed += 1;
            }
            if page.is_degraded() {
                pages_degraded += 1;
            }
        }
    }

    let mut top_domains: Vec<DomainCount> = domains
        .into_iter()
        .map(|(domain, citations)| DomainCount { domain, citations })
        .collect();
    top_domains.sort_by(|a, b| b.citations.cmp(&a.citations).then(a.domain.cmp(&b.domain)));
    top_domains.truncate(TOP_DOMAINS);

    let brand_mention_rate = if results.is_empty() {
        0.0
    } else {
        brand_mentions as f64 / results.len() as f64
    };

    Ok(Some(RunReport {
        run,
        items,
        platforms,
        total_citations,
        pages_analyzed,
        pages_degraded,
        credits_spent,
        top_domains,
        brand_mention_rate,
    }))
}
