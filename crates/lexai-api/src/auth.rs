//! Thin stand-in for the authentication layer (out of scope per §1): just
//! enough to attach `{userId, tenantId, role}` to a WebSocket handshake and
//! to an HTTP request. A production deployment replaces this with whatever
//! session/JWT verification the surrounding platform already has; this
//! crate never pretends to be that.

use async_trait::async_trait;
use lexai_ws::{AuthContext, TokenVerifier};

/// Treats the bearer token as an opaque `userId:tenantId:role` triple.
/// Good enough to exercise the hub's room-join and cross-tenant-refusal
/// logic in tests and local runs; not a real credential format.
pub struct DevTokenVerifier;

#[async_trait]
impl TokenVerifier for DevTokenVerifier {
    async fn verify(&self, bearer_token: &str) -> Option<AuthContext> {
        let mut parts = bearer_token.splitn(3, ':');
        let user_id = parts.next()?.to_string();
        let tenant_id = parts.next()?.to_string();
        let role = parts.next().unwrap_or("member").to_string();
        if user_id.is_empty() || tenant_id.is_empty() {
            return None;
        }
        Some(AuthContext {
            user_id,
            tenant_id,
            role,
        })
    }
}

/// Request-scoped identity extracted the same way, for the plain HTTP
/// admission endpoint.
#[derive(Debug, Clone)]
pub struct RequestIdentity {
    pub user_id: String,
    pub tenant_id: String,
    pub plan: lexai_core::quota::Plan,
}

pub fn parse_plan(raw: &str) -> lexai_core::quota::Plan {
    match raw.to_ascii_lowercase().as_str() {
        "pro" => lexai_core::quota::Plan::Pro,
        "enterprise" => lexai_core::quota::Plan::Enterprise,
        _ => lexai_core::quota::Plan::Free,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn verifies_a_well_formed_triple() {
        let auth = DevTokenVerifier.verify("user-1:tenant-1:admin").await.unwrap();
        assert_eq!(auth.user_id, "user-1");
        assert_eq!(auth.tenant_id, "tenant-1");
        assert!(auth.is_admin());
    }

    #[tokio::test]
    async fn defaults_to_member_role_when_omitted() {
        let auth = DevTokenVerifier.verify("user-1:tenant-1").await.unwrap();
        assert!(!auth.is_admin());
    }

    #[tokio::test]
    async fn rejects_an_empty_tenant() {
        assert!(DevTokenVerifier.verify("user-1:").await.is_none());
    }

    #[test]
    fn parse_plan_is_case_insensitive_and_defaults_to_free() {
        assert_eq!(parse_plan("PRO"), lexai_core::quota::Plan::Pro);
        assert_eq!(parse_plan("Enterprise"), lexai_core::quota::Plan::Enterprise);
        assert_eq!(parse_plan("garbage"), lexai_core::quota::Plan::Free);
    }
}
