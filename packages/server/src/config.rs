use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use dotenvy::dotenv;

use crate::kernel::jobs::WorkerConfig;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    /// Base URL the worker calls to start its own continuation
    pub public_worker_url: Option<String>,

    // Worker
    pub worker_batch_size: usize,
    pub worker_max_runtime: Duration,
    pub worker_safety_margin: Duration,
    pub worker_item_delay: Duration,
    pub worker_item_concurrency: usize,
    pub external_concurrency: usize,
    pub liveness_threshold: Duration,
    pub max_attempts: i32,
    pub cache_ttl: Duration,
    /// Per-request timeout for platform dispatch calls
    pub dispatch_timeout: Duration,
    /// Per-request timeout for content scoring calls
    pub scoring_timeout: Duration,

    // Collaborators
    pub openai_api_key: Option<String>,
    pub perplexity_api_key: Option<String>,
    pub gemini_api_key: Option<String>,
    pub scraping_api_key: Option<String>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            port: parse_or("PORT", 8080)?,
            public_worker_url: optional("PUBLIC_WORKER_URL"),
            worker_batch_size: parse_or("WORKER_BATCH_SIZE", 5)?,
            worker_max_runtime: Duration::from_secs(parse_or("WORKER_MAX_RUNTIME_SECS", 300)?),
            worker_safety_margin: Duration::from_secs(parse_or("WORKER_SAFETY_MARGIN_SECS", 5)?),
            worker_item_delay: Duration::from_millis(parse_or("WORKER_ITEM_DELAY_MS", 500)?),
            worker_item_concurrency: parse_or("WORKER_ITEM_CONCURRENCY", 1)?,
            external_concurrency: parse_or("EXTERNAL_CONCURRENCY", 4)?,
            liveness_threshold: Duration::from_secs(parse_or("LIVENESS_THRESHOLD_SECS", 600)?),
            max_attempts: parse_or("MAX_ATTEMPTS", 3)?,
            cache_ttl: Duration::from_secs(parse_or::<u64>("CACHE_TTL_HOURS", 24)? * 3600),
            dispatch_timeout: Duration::from_secs(parse_or("DISPATCH_TIMEOUT_SECS", 30)?),
            scoring_timeout: Duration::from_secs(parse_or("SCORING_TIMEOUT_SECS", 20)?),
            openai_api_key: optional("OPENAI_API_KEY"),
            perplexity_api_key: optional("PERPLEXITY_API_KEY"),
            gemini_api_key: optional("GEMINI_API_KEY"),
            scraping_api_key: optional("SCRAPING_API_KEY"),
        })
    }
}

impl Config {
    /// Worker settings for this process.
    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            batch_size: self.worker_batch_size.max(1),
            max_runtime: self.worker_max_runtime,
            safety_margin: self.worker_safety_margin,
            item_delay: self.worker_item_delay,
            item_concurrency: self.worker_item_concurrency.max(1),
            liveness_threshold: self.liveness_threshold,
            ..Default::default()
        }
    }
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} must be a valid number", key)),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_or_uses_default_when_unset() {
        let value: u64 = parse_or("CITATION_PIPELINE_TEST_UNSET_KEY", 42).unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn test_parse_or_rejects_garbage() {
        env::set_var("CITATION_PIPELINE_TEST_GARBAGE", "soon");
        let result: Result<u64> = parse_or("CITATION_PIPELINE_TEST_GARBAGE", 1);
        assert!(result.is_err());
        env::remove_var("CITATION_PIPELINE_TEST_GARBAGE");
    }
}
