//! Tenant member resolution for the alert worker (§4.10): "resolves tenant
//! members" needs *some* seam, even though user/tenant management proper is
//! out of scope (§1). Modeled as a narrow external collaborator, the same
//! way the model client and email dispatcher are, so the alert worker's
//! fan-out logic is testable without a real user directory.

mod fake;

pub use fake::FakeTenantDirectory;

use async_trait::async_trait;
use lexai_core::error::LexResult;

#[derive(Debug, Clone)]
pub struct TenantMember {
    pub user_id: String,
    pub email: String,
}

#[async_trait]
pub trait TenantDirectory: Send + Sync {
    async fn members(&self, tenant_id: &str) -> LexResult<Vec<TenantMember>>;
}

/// Placeholder wired by default in `lexai-worker`'s binary: user/tenant
/// management is a real external system this repo never had source for
/// (§1 non-goal). It logs and returns no members rather than failing the
/// alert job, so a misconfigured directory degrades to "no emails sent"
/// instead of dead-lettering every expiry alert.
pub struct NoopTenantDirectory;

#[async_trait]
impl TenantDirectory for NoopTenantDirectory {
    async fn members(&self, tenant_id: &str) -> LexResult<Vec<TenantMember>> {
        tracing::warn!(tenant_id, "NoopTenantDirectory has no real backing store wired");
        Ok(Vec::new())
    }
}
