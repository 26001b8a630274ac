//! Document store port: transactional document reads/writes, array appends,
//! and atomic counters over Contracts and Analyses (§6).
//!
//! `lexai-core` codes only to this trait; the production adapter
//! (`store::mongo::MongoDocumentStore`) and the in-memory fake
//! (`store::memory::InMemoryDocumentStore`) are the only two implementers,
//! selected by what the binary wires up at startup, not by a runtime flag
//! inside the trait's consumers.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{Analysis, AnalysisState, Contract};
use crate::error::LexResult;

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Load a contract scoped by tenant. Returns `Ok(None)` on miss.
    /// Soft-deleted contracts are still fetchable here; callers that must
    /// honor soft-delete (admission) check `contract.deleted` themselves so
    /// this port stays a thin storage primitive.
    async fn get_contract(&self, tenant_id: &str, contract_id: &str) -> LexResult<Option<Contract>>;

    async fn insert_contract(&self, contract: &Contract) -> LexResult<()>;

    /// Append a version and update `body`/`fingerprint` atomically.
    async fn append_version(&self, contract_id: &str, body: String) -> LexResult<Contract>;

    /// Merge AI-extracted dates/parties into the contract, never
    /// overwriting a known field with an empty extraction (§4.6c).
    async fn update_contract_extraction(
        &self,
        contract_id: &str,
        dates: crate::domain::ContractDates,
        parties: Vec<String>,
    ) -> LexResult<()>;

    /// Conditionally append `{threshold, firedAt}` to `alertsSent` iff no
    /// record for `threshold_days` already exists. Returns `true` if this
    /// call performed the append (i.e. this call "won" the race).
    async fn try_record_alert_fired(
        &self,
        contract_id: &str,
        threshold_days: i64,
        fired_at: DateTime<Utc>,
    ) -> LexResult<bool>;

    /// All non-deleted contracts with a known expiry date, for the daily
    /// scheduler scan (§4.10). Implementations may page internally; callers
    /// see the full logical set.
    async fn list_contracts_with_expiry(&self, tenant_id: Option<&str>) -> LexResult<Vec<Contract>>;

    async fn get_analysis(&self, tenant_id: &str, analysis_id: &str) -> LexResult<Option<Analysis>>;

    /// Find a non-terminal (pending/processing) analysis for (contract,
    /// version), used by the admission service's lock-failure fallback
    /// (§4.4 step 4) and by the invariant that at most one non-terminal
    /// analysis exists per (contract, version).
    async fn find_non_terminal_analysis(
        &self,
        contract_id: &str,
        version: u32,
    ) -> LexResult<Option<Analysis>>;

    async fn insert_analysis(&self, analysis: &Analysis) -> LexResult<()>;

    async fn set_analysis_state(&self, analysis_id: &str, state: AnalysisState) -> LexResult<()>;

    async fn complete_analysis(&self, analysis: &Analysis) -> LexResult<()>;

    async fn increment_retry(&self, analysis_id: &str) -> LexResult<u32>;
}
