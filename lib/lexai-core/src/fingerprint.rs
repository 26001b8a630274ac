//! Content fingerprinting and the key derivations built on top of it (§4.1).
//!
//! The fingerprint is a stable SHA-256 hex digest over a body's UTF-8 bytes.
//! Stability across processes and restarts is a hard requirement — this is a
//! pure function with no per-process state.

use sha2::{Digest, Sha256};

/// SHA-256 hex digest (lowercase, 64 chars) of `body`'s UTF-8 bytes.
pub fn fingerprint(body: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body.as_bytes());
    let digest = hasher.finalize();
    hex_lower(&digest)
}

fn hex_lower(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{:02x}", b));
    }
    out
}

/// Cache key for a completed analysis summary: `analysis:{fingerprint}`.
pub fn cache_key(fingerprint: &str) -> String {
    format!("analysis:{fingerprint}")
}

/// Single-flight lock key: `lock:analysis:{fingerprint}`.
pub fn lock_key(fingerprint: &str) -> String {
    format!("lock:analysis:{fingerprint}")
}

/// Quota key for a user in a given UTC calendar month: `quota:{userId}:{YYYY-MM}`.
pub fn quota_key(user_id: &str, month: &str) -> String {
    format!("quota:{user_id}:{month}")
}

/// Current UTC calendar month as `YYYY-MM`, used by [`quota_key`].
pub fn current_utc_month() -> String {
    chrono::Utc::now().format("%Y-%m").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_and_stable() {
        let a = fingerprint("hello world");
        let b = fingerprint("hello world");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn distinct_inputs_differ() {
        assert_ne!(fingerprint("a"), fingerprint("b"));
    }

    #[test]
    fn key_formats() {
        let fp = fingerprint("x");
        assert_eq!(cache_key(&fp), format!("analysis:{fp}"));
        assert_eq!(lock_key(&fp), format!("lock:analysis:{fp}"));
        assert_eq!(quota_key("u1", "2026-07"), "quota:u1:2026-07");
    }
}
