//! A minimal admission HTTP surface (§1: "sufficient to exercise
//! admission"; full request validation/authn is modeled as a thin
//! extractor layer, not implemented here).

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use lexai_core::admission::{AdmissionOutcome, AdmissionRequest};
use serde::{Deserialize, Serialize};

use crate::auth::{parse_plan, RequestIdentity};
use crate::http_error::ApiError;
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health))
        .route("/contracts/:contract_id/analyze", post(analyze))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

#[derive(Debug, Deserialize)]
struct AnalyzeQuery {
    version: Option<u32>,
}

#[derive(Debug, Serialize)]
struct AnalyzeResponse {
    analysis_id: String,
    state: &'static str,
    cached: bool,
}

async fn analyze(
    State(state): State<AppState>,
    Path(contract_id): Path<String>,
    Query(query): Query<AnalyzeQuery>,
    headers: HeaderMap,
) -> Result<Json<AnalyzeResponse>, ApiError> {
    let identity = identity_from_headers(&headers)?;

    let outcome: AdmissionOutcome = state
        .admission
        .admit(AdmissionRequest {
            contract_id,
            tenant_id: identity.tenant_id,
            user_id: identity.user_id,
            plan: identity.plan,
            requested_version: query.version,
        })
        .await?;

    Ok(Json(AnalyzeResponse {
        analysis_id: outcome.analysis_id,
        state: match outcome.state {
            lexai_core::admission::AdmissionState::Completed => "completed",
            lexai_core::admission::AdmissionState::Pending => "pending",
        },
        cached: outcome.cached,
    }))
}

/// Stand-in for a real auth middleware: reads `x-tenant-id`/`x-user-id`/
/// `x-plan` headers directly. A production deployment replaces this with
/// whatever session/JWT layer sits in front (§1 non-goal).
fn identity_from_headers(headers: &HeaderMap) -> Result<RequestIdentity, ApiError> {
    let tenant_id = header_str(headers, "x-tenant-id")
        .ok_or_else(|| lexai_core::error::LexError::Validation("missing x-tenant-id header".into()))?;
    let user_id = header_str(headers, "x-user-id")
        .ok_or_else(|| lexai_core::error::LexError::Validation("missing x-user-id header".into()))?;
    let plan = header_str(headers, "x-plan")
        .map(|v| parse_plan(&v))
        .unwrap_or(lexai_core::quota::Plan::Free);
    Ok(RequestIdentity {
        user_id,
        tenant_id,
        plan,
    })
}

fn header_str(headers: &HeaderMap, key: &str) -> Option<String> {
    headers.get(key)?.to_str().ok().map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use lexai_core::domain::Contract;
    use lexai_core::store::memory::{InMemoryDocumentStore, InMemoryJobQueue, InMemoryKeyValueStore};
    use lexai_ws::WsHub;

    async fn state_with_contract() -> (AppState, Contract) {
        let documents = std::sync::Arc::new(InMemoryDocumentStore::new());
        let contract = Contract::new("tenant-1", "NDA", "x".repeat(80));
        documents.insert_contract(&contract).await.unwrap();
        let kv = std::sync::Arc::new(InMemoryKeyValueStore::new());
        let queue = std::sync::Arc::new(InMemoryJobQueue::new());
        let admission = std::sync::Arc::new(lexai_core::admission::AdmissionService::new(
            documents,
            kv,
            queue,
            lexai_core::lock::LOCK_TTL,
        ));
        (AppState { admission, hub: WsHub::new() }, contract)
    }

    #[tokio::test]
    async fn analyze_enqueues_and_returns_pending() {
        let (state, contract) = state_with_contract().await;
        let mut headers = HeaderMap::new();
        headers.insert("x-tenant-id", HeaderValue::from_static("tenant-1"));
        headers.insert("x-user-id", HeaderValue::from_static("user-1"));

        let response = analyze(
            State(state),
            Path(contract.id.clone()),
            Query(AnalyzeQuery { version: None }),
            headers,
        )
        .await
        .unwrap();
        assert_eq!(response.0.state, "pending");
        assert!(!response.0.cached);
    }

    #[tokio::test]
    async fn analyze_without_tenant_header_is_rejected() {
        let (state, contract) = state_with_contract().await;
        let headers = HeaderMap::new();

        let err = analyze(
            State(state),
            Path(contract.id),
            Query(AnalyzeQuery { version: None }),
            headers,
        )
        .await
        .unwrap_err();
        assert_eq!(err.0.code(), "validation_error");
    }
}
