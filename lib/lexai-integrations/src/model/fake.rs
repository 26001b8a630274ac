//! Test double for [`ModelClient`]: scripted responses and a call counter,
//! so the worker's retry/fallback/cache-recheck logic can be exercised
//! without a live provider (§8 end-to-end scenarios).

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use lexai_core::error::LexResult;
use parking_lot::Mutex;

use super::sanitize::sanitize_analysis_json;
use super::{DiffExplanation, ModelClient, ModelOutcome};

/// One scripted response: either a raw JSON body to sanitise, or an error
/// to return directly.
pub enum Scripted {
    Json(String),
    Err(lexai_core::error::LexError),
}

pub struct FakeModelClient {
    responses: Mutex<Vec<Scripted>>,
    pub call_count: AtomicUsize,
    model_name: String,
}

impl FakeModelClient {
    pub fn new(model_name: impl Into<String>) -> Self {
        Self {
            responses: Mutex::new(Vec::new()),
            call_count: AtomicUsize::new(0),
            model_name: model_name.into(),
        }
    }

    /// Queue responses in call order; each `analyze`/`explain_diff` call
    /// consumes the next one. Queuing more `Err` entries than the worker's
    /// retry budget exercises the dead-letter path.
    pub fn push(mut self, response: Scripted) -> Self {
        self.responses.get_mut().push(response);
        self
    }

    pub fn calls(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelClient for FakeModelClient {
    async fn analyze(&self, _body: &str) -> LexResult<ModelOutcome> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        let next = {
            let mut responses = self.responses.lock();
            if responses.is_empty() {
                None
            } else {
                Some(responses.remove(0))
            }
        };
        match next {
            Some(Scripted::Json(raw)) => Ok(ModelOutcome {
                result: sanitize_analysis_json(&raw),
                model: self.model_name.clone(),
                tokens_used: 128,
            }),
            Some(Scripted::Err(e)) => Err(e),
            None => Ok(ModelOutcome {
                result: sanitize_analysis_json(""),
                model: self.model_name.clone(),
                tokens_used: 0,
            }),
        }
    }

    async fn explain_diff(&self, _diff_text: &str) -> LexResult<(DiffExplanation, String, u64)> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        Ok((
            DiffExplanation {
                summary: "fake diff summary".to_string(),
                changes_analysis: "fake changes".to_string(),
                new_risks: vec![],
                recommendation: "fake recommendation".to_string(),
            },
            self.model_name.clone(),
            64,
        ))
    }
}
