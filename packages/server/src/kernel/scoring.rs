//! LLM-backed content quality scoring.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::domains::analysis::models::ContentQualityRecord;
use crate::kernel::traits::{BaseContentScorer, ScoringRequest};

const SYSTEM_PROMPT: &str = r#"You rate web pages that an AI assistant cited when answering a user's question.
Score the page from 0 to 100 on:
- relevance: how directly it answers the question
- depth: how thorough and specific the content is
- authority: how credible and well-sourced it appears
- readability: how clear and well-structured it is
- overall: your overall quality judgement
Return JSON only: {"relevance": n, "depth": n, "authority": n, "readability": n, "overall": n, "summary": "one sentence"}"#;

/// Scores as the model returned them; models sometimes emit floats or out-of-range values.
#[derive(Debug, Deserialize)]
struct RawScores {
    relevance: f64,
    depth: f64,
    authority: f64,
    readability: f64,
    overall: f64,
    summary: String,
}

fn clamp_score(value: f64) -> u8 {
    if value.is_nan() {
        0
    } else {
        value.round().clamp(0.0, 100.0) as u8
    }
}

impl RawScores {
    fn into_record(self) -> Option<ContentQualityRecord> {
        ContentQualityRecord {
            relevance: clamp_score(self.relevance),
            depth: clamp_score(self.depth),
            authority: clamp_score(self.authority),
            readability: clamp_score(self.readability),
            overall: clamp_score(self.overall),
            summary: self.summary,
            is_fallback: false,
        }
        .validated()
    }
}

/// Parse the model's message content into a record.
fn parse_scores(content: &str) -> Option<ContentQualityRecord> {
    let trimmed = content
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();
    serde_json::from_str::<RawScores>(trimmed).ok()?.into_record()
}

pub const DEFAULT_SCORING_TIMEOUT: Duration = Duration::from_secs(20);

fn http_client(timeout: Duration) -> Client {
    Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_default()
}

/// Scores pages through an OpenAI-compatible chat completion endpoint.
#[derive(Clone)]
pub struct LlmContentScorer {
    http_client: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_content_chars: usize,
}

impl LlmContentScorer {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http_client: http_client(DEFAULT_SCORING_TIMEOUT),
            api_key: api_key.into(),
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            max_content_chars: 12_000,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.http_client = http_client(timeout);
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    fn user_prompt(&self, request: &ScoringRequest<'_>) -> String {
        let content: String = request.markdown.chars().take(self.max_content_chars).collect();
        format!(
            "Question: {}\nBrand of interest: {}\nURL: {}\nTitle: {}\n\nPage content:\n{}",
            request.query_text,
            request.brand.name,
            request.url,
            request.title.unwrap_or("(none)"),
            content
        )
    }

    async fn request_scores(&self, request: &ScoringRequest<'_>) -> anyhow::Result<String> {
        let body = json!({
            "model": self.model,
            "response_format": {"type": "json_object"},
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": self.user_prompt(request)},
            ],
        });

        let response = self
            .http_client
            .post(format!("{}/chat/completions", self.base_url.trim_end_matches('/')))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;

        let raw: Value = response.json().await?;
        raw.pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("no message content"))
    }
}

#[async_trait]
impl BaseContentScorer for LlmContentScorer {
    async fn score(&self, request: &ScoringRequest<'_>) -> ContentQualityRecord {
        if request.markdown.trim().is_empty() {
            return ContentQualityRecord::fallback();
        }

        match self.request_scores(request).await {
            Ok(content) => match parse_scores(&content) {
                Some(record) => {
                    debug!(url = %request.url, overall = record.overall, "scored page");
                    record
                }
                None => {
                    warn!(url = %request.url, "scorer returned unparseable output");
                    ContentQualityRecord::fallback()
                }
            },
            Err(e) => {
                warn!(url = %request.url, error = %e, "content scoring failed");
                ContentQualityRecord::fallback()
            }
        }
    }
}

/// Scorer used when no LLM key is configured.
#[derive(Debug, Clone, Default)]
pub struct NoopContentScorer;

#[async_trait]
impl BaseContentScorer for NoopContentScorer {
    async fn score(&self, _request: &ScoringRequest<'_>) -> ContentQualityRecord {
        ContentQualityRecord::fallback()
    }
}
