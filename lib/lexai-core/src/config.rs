//! Environment-driven configuration shared by both binaries: typed fields
//! with `FOO_BAR` env var lookups and explicit defaults, resolved once at
//! startup rather than read ad hoc.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct CoreConfig {
    pub mongo_uri: String,
    pub mongo_db: String,
    pub redis_url: String,
    pub amqp_url: String,

    /// Single-flight lock TTL (§3: 5 minutes).
    pub lock_ttl: Duration,
    /// Cache entry TTL (§3: 24 hours).
    pub cache_ttl: Duration,
    /// Maximum in-band retries before dead-lettering (§4.6: retryCount >= 2).
    pub max_retries: u32,
    /// Consumer loops per worker process (§4.6: "Runs N consumer loops").
    pub worker_concurrency: usize,
}

impl CoreConfig {
    pub fn from_env() -> Self {
        Self {
            mongo_uri: env_or("LEXAI_MONGO_URI", "mongodb://localhost:27017"),
            mongo_db: env_or("LEXAI_MONGO_DB", "lexai"),
            redis_url: env_or("LEXAI_REDIS_URL", "redis://localhost:6379"),
            amqp_url: env_or("LEXAI_AMQP_URL", "amqp://127.0.0.1:5672/%2f"),
            lock_ttl: Duration::from_secs(env_parse("LEXAI_LOCK_TTL_SECS", 5 * 60)),
            cache_ttl: Duration::from_secs(env_parse("LEXAI_CACHE_TTL_SECS", 24 * 60 * 60)),
            max_retries: env_parse("LEXAI_MAX_RETRIES", 2),
            worker_concurrency: env_parse("LEXAI_WORKER_CONCURRENCY", 4),
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
