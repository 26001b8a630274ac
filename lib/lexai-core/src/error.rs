//! Domain error kinds shared across the admission path, the worker, and the
//! HTTP boundary. Transport-specific mapping (HTTP status codes, JSON
//! envelopes) lives at the edges; this enum stays transport-agnostic per the
//! error handling design.

/// Result alias used throughout `lexai-core`.
pub type LexResult<T> = Result<T, LexError>;

#[derive(Debug, thiserror::Error)]
pub enum LexError {
    /// Caller-supplied data rejected before admission (e.g. body too short).
    #[error("validation failed: {0}")]
    Validation(String),

    /// Tenant-scoped resource missing, or present but soft-deleted.
    #[error("not found: {0}")]
    NotFound(String),

    /// The requested contract version does not exist.
    #[error("version not found: {0}")]
    VersionNotFound(String),

    /// RBAC or plan-gate failure.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Monthly quota exhausted at admission time.
    #[error("quota exceeded: used {used}/{limit}, resets at {resets_at}")]
    QuotaExceeded {
        used: u64,
        limit: u64,
        resets_at: chrono::DateTime<chrono::Utc>,
    },

    /// LLM or broker returned a retriable failure; caller may retry.
    #[error("transient upstream failure: {0}")]
    TransientUpstream(String),

    /// LLM returned uninterpretable output after every model/retry was
    /// exhausted. Terminal: the Analysis enters `failed` and the job is
    /// dead-lettered.
    #[error("permanent upstream failure: {0}")]
    PermanentUpstream(String),

    /// Store, queue, or pub/sub unreachable. The caller is expected to retry.
    #[error("infrastructure unavailable: {0}")]
    InfrastructureDown(String),
}

impl LexError {
    /// Stable machine-readable code for the HTTP boundary. Server-side
    /// details are stripped from the human message in production by the
    /// caller, not here.
    pub fn code(&self) -> &'static str {
        match self {
            LexError::Validation(_) => "validation_error",
            LexError::NotFound(_) => "not_found",
            LexError::VersionNotFound(_) => "version_not_found",
            LexError::Forbidden(_) => "forbidden",
            LexError::QuotaExceeded { .. } => "quota_exceeded",
            LexError::TransientUpstream(_) => "transient_upstream",
            LexError::PermanentUpstream(_) => "permanent_upstream",
            LexError::InfrastructureDown(_) => "infrastructure_down",
        }
    }

    /// Whether a client should retry the same request unmodified.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            LexError::TransientUpstream(_) | LexError::InfrastructureDown(_)
        )
    }
}
