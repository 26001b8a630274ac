//! Maps [`LexError`] to the stable `{code, message}` JSON envelope (§7).
//! Internal detail is stripped from `message` outside debug builds; `code`
//! is always the stable machine-readable tag and never changes between
//! builds.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use lexai_core::error::LexError;
use serde::Serialize;

#[derive(Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

pub struct ApiError(pub LexError);

impl From<LexError> for ApiError {
    fn from(err: LexError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            LexError::Validation(_) => StatusCode::BAD_REQUEST,
            LexError::NotFound(_) | LexError::VersionNotFound(_) => StatusCode::NOT_FOUND,
            LexError::Forbidden(_) => StatusCode::FORBIDDEN,
            LexError::QuotaExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            LexError::TransientUpstream(_) | LexError::InfrastructureDown(_) => StatusCode::SERVICE_UNAVAILABLE,
            LexError::PermanentUpstream(_) => StatusCode::BAD_GATEWAY,
        };

        let message = if cfg!(debug_assertions) {
            self.0.to_string()
        } else {
            "request could not be completed".to_string()
        };

        let mut response = (status, Json(ErrorBody { code: self.0.code(), message })).into_response();

        if let LexError::QuotaExceeded { resets_at, .. } = &self.0 {
            let retry_after = lexai_core::admission::retry_after_seconds(*resets_at);
            if let Ok(value) = axum::http::HeaderValue::from_str(&retry_after.to_string()) {
                response.headers_mut().insert(axum::http::header::RETRY_AFTER, value);
            }
        }

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_exceeded_maps_to_429_with_retry_after() {
        let response = ApiError(LexError::QuotaExceeded {
            used: 10,
            limit: 10,
            resets_at: chrono::Utc::now() + chrono::Duration::seconds(120),
        })
        .into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(response.headers().contains_key(axum::http::header::RETRY_AFTER));
    }

    #[test]
    fn not_found_maps_to_404_with_no_retry_after() {
        let response = ApiError(LexError::NotFound("contract".to_string())).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(!response.headers().contains_key(axum::http::header::RETRY_AFTER));
    }

    #[test]
    fn permanent_upstream_maps_to_bad_gateway() {
        let response = ApiError(LexError::PermanentUpstream("model exhausted".to_string())).into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }
}
