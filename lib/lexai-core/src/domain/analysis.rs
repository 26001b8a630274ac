//! One attempt to analyse a specific (contract, version) pair.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisState {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl AnalysisState {
    pub fn is_terminal(self) -> bool {
        matches!(self, AnalysisState::Completed | AnalysisState::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// Derive a risk level from a numeric score when the model didn't
    /// return one or returned something unrecognised (§4.7).
    pub fn from_score(score: u8) -> Self {
        match score {
            0..=25 => RiskLevel::Low,
            26..=50 => RiskLevel::Medium,
            51..=75 => RiskLevel::High,
            _ => RiskLevel::Critical,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Some(RiskLevel::Low),
            "medium" => Some(RiskLevel::Medium),
            "high" => Some(RiskLevel::High),
            "critical" => Some(RiskLevel::Critical),
            _ => None,
        }
    }
}

/// Obligations extracted by the model, split by party.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Obligations {
    pub your_obligations: Vec<String>,
    pub other_party_obligations: Vec<String>,
}

/// The sanitised payload the model client hands back; persisted in full on
/// the Analysis row and, in compact form, in the cache entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub summary: String,
    pub risk_score: u8,
    pub risk_level: RiskLevel,
    pub clauses: Vec<String>,
    pub obligations: Obligations,
    pub parties: Vec<String>,
    pub key_dates: HashMap<String, String>,
}

/// The compact summary stored under `analysis:{fingerprint}` in the cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedSummary {
    pub analysis_id: String,
    pub summary: String,
    pub risk_score: u8,
    pub risk_level: RiskLevel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Analysis {
    pub id: String,
    pub tenant_id: String,
    pub contract_id: String,
    pub version: u32,
    pub state: AnalysisState,
    pub cache_key: String,
    pub result: Option<AnalysisResult>,
    pub ai_model: Option<String>,
    pub tokens_used: Option<u64>,
    pub processing_time_ms: Option<u64>,
    pub retry_count: u32,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Analysis {
    pub fn new_pending(
        tenant_id: impl Into<String>,
        contract_id: impl Into<String>,
        version: u32,
        fingerprint: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            tenant_id: tenant_id.into(),
            contract_id: contract_id.into(),
            version,
            state: AnalysisState::Pending,
            cache_key: fingerprint.into(),
            result: None,
            ai_model: None,
            tokens_used: None,
            processing_time_ms: None,
            retry_count: 0,
            failure_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn mark_processing(&mut self) {
        self.state = AnalysisState::Processing;
        self.updated_at = Utc::now();
    }

    pub fn mark_completed(
        &mut self,
        result: AnalysisResult,
        ai_model: impl Into<String>,
        tokens_used: u64,
        processing_time_ms: u64,
    ) {
        self.result = Some(result);
        self.ai_model = Some(ai_model.into());
        self.tokens_used = Some(tokens_used);
        self.processing_time_ms = Some(processing_time_ms);
        self.state = AnalysisState::Completed;
        self.updated_at = Utc::now();
    }

    pub fn mark_failed(&mut self, reason: impl Into<String>) {
        self.state = AnalysisState::Failed;
        self.failure_reason = Some(reason.into());
        self.updated_at = Utc::now();
    }

    pub fn to_cached_summary(&self) -> Option<CachedSummary> {
        let result = self.result.as_ref()?;
        Some(CachedSummary {
            analysis_id: self.id.clone(),
            summary: result.summary.clone(),
            risk_score: result.risk_score,
            risk_level: result.risk_level,
        })
    }
}
