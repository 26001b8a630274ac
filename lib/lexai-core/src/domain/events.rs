//! Wire shapes shared by the event bus bridge, the WebSocket hub, and the
//! job queue. These are the only contracts between the API and worker
//! processes (§2, §6).

use serde::{Deserialize, Serialize};

use super::analysis::RiskLevel;

/// Well-known pub/sub channel carrying `{event, room, payload}` records from
/// worker to API instances.
pub const SOCKET_EVENTS_CHANNEL: &str = "lexai:socket:events";

/// Outbound WebSocket event names.
pub mod event_names {
    pub const ANALYSIS_COMPLETE: &str = "analysis:complete";
    pub const ANALYSIS_FAILED: &str = "analysis:failed";
    pub const CONTRACT_EXPIRING: &str = "contract:expiring";
    pub const DIFF_COMPLETE: &str = "diff:complete";
}

/// A single record published on [`SOCKET_EVENTS_CHANNEL`]: an event name, the
/// room it targets, and its payload. The API-side bridge deserialises this
/// and fans it out to local sockets joined to `room` (§4.8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocketEvent {
    pub event: String,
    pub room: String,
    pub payload: serde_json::Value,
}

impl SocketEvent {
    pub fn new(event: impl Into<String>, room: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            event: event.into(),
            room: room.into(),
            payload,
        }
    }

    /// Room every connection for `tenant_id` joins by request (§4.9).
    pub fn org_room(tenant_id: &str) -> String {
        format!("org:{tenant_id}")
    }

    /// Room every connection auto-joins for its own user id (§4.9).
    pub fn user_room(user_id: &str) -> String {
        format!("user:{user_id}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisCompletePayload {
    pub contract_id: String,
    pub analysis_id: String,
    pub risk_score: u8,
    pub risk_level: RiskLevel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisFailedPayload {
    pub contract_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractExpiringPayload {
    pub contract_id: String,
    pub title: String,
    pub days_until_expiry: i64,
    pub expiry_date: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffCompletePayload {
    pub contract_id: String,
    pub version_a: u32,
    pub version_b: u32,
    pub summary: String,
    pub changes_analysis: String,
    pub new_risks: Vec<String>,
    pub recommendation: String,
}

/// Analysis queue job (`spec.md` §6, "Job shapes").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisJob {
    pub job_id: String,
    pub contract_id: String,
    pub analysis_id: String,
    pub tenant_id: String,
    pub user_id: String,
    pub content: String,
    pub content_hash: String,
    pub version: u32,
    pub retry_count: u32,
    pub queued_at: chrono::DateTime<chrono::Utc>,
}

/// Diff-variant job, routed to the simpler explanation-only path (§4.11).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffJob {
    pub job_id: String,
    #[serde(rename = "type")]
    pub job_type: String,
    pub contract_id: String,
    pub tenant_id: String,
    pub user_id: String,
    pub contract_title: String,
    pub diff_text: String,
    pub version_a: u32,
    pub version_b: u32,
    pub queued_at: chrono::DateTime<chrono::Utc>,
}

impl DiffJob {
    pub fn new(
        contract_id: impl Into<String>,
        tenant_id: impl Into<String>,
        user_id: impl Into<String>,
        contract_title: impl Into<String>,
        diff_text: impl Into<String>,
        version_a: u32,
        version_b: u32,
    ) -> Self {
        Self {
            job_id: uuid::Uuid::new_v4().to_string(),
            job_type: "diff".to_string(),
            contract_id: contract_id.into(),
            tenant_id: tenant_id.into(),
            user_id: user_id.into(),
            contract_title: contract_title.into(),
            diff_text: diff_text.into(),
            version_a,
            version_b,
            queued_at: chrono::Utc::now(),
        }
    }
}

/// Alert queue job (§4.10).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertJob {
    pub contract_id: String,
    pub tenant_id: String,
    pub title: String,
    pub expiry_date: chrono::DateTime<chrono::Utc>,
    pub days_until_expiry: i64,
    pub threshold: i64,
}

/// Names of the durable queues the system declares (§4.5, §6).
pub mod queues {
    pub const ANALYSIS: &str = "analysis";
    pub const ALERT: &str = "alert";
    pub const DLX_EXCHANGE: &str = "lexai.dlx";
    pub const ANALYSIS_DLQ: &str = "lexai.analysis.dlq";
    pub const ANALYSIS_FAILED_ROUTING_KEY: &str = "analysis.failed";
}
