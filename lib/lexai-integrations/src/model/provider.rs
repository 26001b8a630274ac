//! Production [`ModelClient`]: a chat-completion-style HTTP call against an
//! external LLM provider, wrapped in the two nested retry loops §4.7
//! specifies.
//!
//! Outer loop: try the primary model, then the fallback model once, then
//! give up with `PermanentUpstream`. Inner loop: within one model, retry on
//! HTTP 429/5xx with backoff 2s/4s/8s, up to 3 attempts total; any other
//! error fails fast (no retry) and falls through to the next model.

use std::time::Duration;

use async_trait::async_trait;
use lexai_core::error::{LexError, LexResult};
use reqwest::{Client, StatusCode};
use serde_json::json;
use tracing::{info, warn};

use super::sanitize::sanitize_analysis_json;
use super::{truncate_body, DiffExplanation, ModelClient, ModelOutcome};

const CALL_TIMEOUT: Duration = Duration::from_secs(60);
const MAX_ATTEMPTS_PER_MODEL: u32 = 3;
const BACKOFF_SCHEDULE: [Duration; 3] = [
    Duration::from_secs(2),
    Duration::from_secs(4),
    Duration::from_secs(8),
];
const MAX_RESPONSE_TOKENS: u32 = 2_000;
const TEMPERATURE: f64 = 0.2;

#[derive(Debug, Clone)]
pub struct ModelChainConfig {
    pub base_url: String,
    pub api_key: String,
    pub primary_model: String,
    pub fallback_model: String,
}

impl ModelChainConfig {
    pub fn from_env() -> Self {
        Self {
            base_url: std::env::var("LEXAI_LLM_BASE_URL")
                .unwrap_or_else(|_| "https://api.provider.example/v1/chat/completions".to_string()),
            api_key: std::env::var("LEXAI_LLM_API_KEY").unwrap_or_default(),
            primary_model: std::env::var("LEXAI_LLM_PRIMARY_MODEL")
                .unwrap_or_else(|_| "provider-large".to_string()),
            fallback_model: std::env::var("LEXAI_LLM_FALLBACK_MODEL")
                .unwrap_or_else(|_| "provider-small".to_string()),
        }
    }
}

pub struct ReqwestModelClient {
    client: Client,
    config: ModelChainConfig,
}

impl ReqwestModelClient {
    pub fn new(config: ModelChainConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    /// One HTTP attempt against `model`. Returns the raw content string and
    /// the reported token usage, or a `LexError` the caller classifies as
    /// retriable or fatal.
    async fn call_once(&self, model: &str, system_prompt: &str, user_prompt: &str) -> LexResult<(String, u64)> {
        let request_body = json!({
            "model": model,
            "messages": [
                { "role": "system", "content": system_prompt },
                { "role": "user", "content": user_prompt },
            ],
            "temperature": TEMPERATURE,
            "max_tokens": MAX_RESPONSE_TOKENS,
            "response_format": { "type": "json_object" },
        });

        let response = self
            .client
            .post(&self.config.base_url)
            .bearer_auth(&self.config.api_key)
            .json(&request_body)
            .timeout(CALL_TIMEOUT)
            .send()
            .await
            .map_err(|e| LexError::TransientUpstream(format!("provider request failed: {e}")))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return Err(LexError::TransientUpstream(format!(
                "provider returned retriable status {status}"
            )));
        }
        if !status.is_success() {
            return Err(LexError::PermanentUpstream(format!(
                "provider returned non-retriable status {status}"
            )));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LexError::PermanentUpstream(format!("provider response undecodable: {e}")))?;

        let content = body["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| LexError::PermanentUpstream("provider response missing content".to_string()))?
            .to_string();
        let tokens_used = body["usage"]["total_tokens"].as_u64().unwrap_or(0);

        Ok((content, tokens_used))
    }

    /// Inner retry loop for a single model (§4.7).
    async fn call_with_retry(&self, model: &str, system_prompt: &str, user_prompt: &str) -> LexResult<(String, u64)> {
        let mut last_err = None;
        for attempt in 0..MAX_ATTEMPTS_PER_MODEL {
            match self.call_once(model, system_prompt, user_prompt).await {
                Ok(outcome) => return Ok(outcome),
                Err(err @ LexError::TransientUpstream(_)) => {
                    warn!(model, attempt, error = %err, "transient provider failure, will retry");
                    last_err = Some(err);
                    let is_last_attempt = attempt + 1 == MAX_ATTEMPTS_PER_MODEL;
                    if !is_last_attempt {
                        if let Some(delay) = BACKOFF_SCHEDULE.get(attempt as usize) {
                            tokio::time::sleep(*delay).await;
                        }
                    }
                }
                Err(err) => return Err(err), // non-retriable: fail fast, fall through to next model
            }
        }
        Err(last_err.unwrap_or_else(|| LexError::TransientUpstream(format!("{model} exhausted retries"))))
    }

    /// Outer model-fallback loop (§4.7).
    async fn call_with_fallback(&self, system_prompt: &str, user_prompt: &str) -> LexResult<(String, u64, String)> {
        for model in [&self.config.primary_model, &self.config.fallback_model] {
            match self.call_with_retry(model, system_prompt, user_prompt).await {
                Ok((content, tokens)) => return Ok((content, tokens, model.clone())),
                Err(err) => {
                    info!(model, error = %err, "model exhausted, trying next in chain");
                }
            }
        }
        Err(LexError::PermanentUpstream(
            "both primary and fallback models failed".to_string(),
        ))
    }
}

const ANALYSIS_SYSTEM_PROMPT: &str = "You are a contract analysis assistant. Respond with a single JSON object containing: summary, riskScore (0-100), riskLevel (low|medium|high|critical), clauses, obligations.yourObligations, obligations.otherPartyObligations, parties, keyDates.";

const DIFF_SYSTEM_PROMPT: &str = "You are a contract redline assistant. Respond with a single JSON object containing: summary, changesAnalysis, newRisks (array of strings), recommendation.";

#[async_trait]
impl ModelClient for ReqwestModelClient {
    async fn analyze(&self, body: &str) -> LexResult<ModelOutcome> {
        let truncated = truncate_body(body);
        let (content, tokens_used, model) = self
            .call_with_fallback(ANALYSIS_SYSTEM_PROMPT, &truncated)
            .await?;
        let result = sanitize_analysis_json(&content);
        Ok(ModelOutcome {
            result,
            model,
            tokens_used,
        })
    }

    async fn explain_diff(&self, diff_text: &str) -> LexResult<(DiffExplanation, String, u64)> {
        let truncated = truncate_body(diff_text);
        let (content, tokens_used, model) = self.call_with_fallback(DIFF_SYSTEM_PROMPT, &truncated).await?;
        let value: serde_json::Value = serde_json::from_str(&content).unwrap_or(serde_json::Value::Null);
        let obj = value.as_object();
        let explanation = DiffExplanation {
            summary: obj
                .and_then(|o| o.get("summary"))
                .and_then(|v| v.as_str())
                .unwrap_or("No summary was returned by the model.")
                .to_string(),
            changes_analysis: obj
                .and_then(|o| o.get("changesAnalysis"))
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            new_risks: obj
                .and_then(|o| o.get("newRisks"))
                .and_then(|v| v.as_array())
                .map(|arr| arr.iter().filter_map(|v| v.as_str()).map(str::to_string).collect())
                .unwrap_or_default(),
            recommendation: obj
                .and_then(|o| o.get("recommendation"))
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
        };
        Ok((explanation, model, tokens_used))
    }
}
