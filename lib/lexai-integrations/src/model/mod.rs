//! The LLM provider client (§4.7): a black-box external collaborator. This
//! module owns model-chain fallback, per-model retry with backoff, the
//! bounded/truncated request shape, and defensive response sanitisation —
//! none of which is "legal reasoning", all of which is plumbing around one.

mod fake;
mod provider;
mod sanitize;

pub use fake::{FakeModelClient, Scripted};
pub use provider::{ModelChainConfig, ReqwestModelClient};
pub use sanitize::sanitize_analysis_json;

use async_trait::async_trait;
use lexai_core::domain::AnalysisResult;
use lexai_core::error::LexResult;

/// Character budget a contract body is truncated to before being sent to
/// the provider (§4.7).
pub const MAX_BODY_CHARS: usize = 15_000;
const TRUNCATION_MARKER: &str = "\n\n[... truncated for length ...]";

/// Truncate `body` to [`MAX_BODY_CHARS`] characters, appending an explicit
/// marker so the model (and any human reviewer) knows truncation happened.
pub fn truncate_body(body: &str) -> String {
    if body.chars().count() <= MAX_BODY_CHARS {
        return body.to_string();
    }
    let truncated: String = body.chars().take(MAX_BODY_CHARS).collect();
    format!("{truncated}{TRUNCATION_MARKER}")
}

#[derive(Debug, Clone)]
pub struct ModelOutcome {
    pub result: AnalysisResult,
    pub model: String,
    pub tokens_used: u64,
}

#[derive(Debug, Clone)]
pub struct DiffExplanation {
    pub summary: String,
    pub changes_analysis: String,
    pub new_risks: Vec<String>,
    pub recommendation: String,
}

/// The two calls the worker makes into the provider (§4.6, §4.11). Both run
/// the same outer-fallback / inner-retry machinery internally.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn analyze(&self, body: &str) -> LexResult<ModelOutcome>;

    async fn explain_diff(&self, diff_text: &str) -> LexResult<(DiffExplanation, String, u64)>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_below_limit_is_noop() {
        let body = "x".repeat(100);
        assert_eq!(truncate_body(&body), body);
    }

    #[test]
    fn truncation_above_limit_adds_marker() {
        let body = "x".repeat(MAX_BODY_CHARS + 500);
        let truncated = truncate_body(&body);
        assert!(truncated.len() < body.len());
        assert!(truncated.ends_with(TRUNCATION_MARKER));
    }
}
