//! Per-tenant monthly quota accountant (§4.3).

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Datelike, TimeZone, Utc};

use crate::error::LexResult;
use crate::fingerprint::{current_utc_month, quota_key};
use crate::ports::KeyValueStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Plan {
    Free,
    Pro,
    Enterprise,
}

impl Plan {
    /// `None` means unbounded (enterprise).
    pub fn limit(self) -> Option<u64> {
        match self {
            Plan::Free => Some(3),
            Plan::Pro => Some(50),
            Plan::Enterprise => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct QuotaStatus {
    pub used: u64,
    /// `None` for unbounded plans.
    pub limit: Option<u64>,
    pub allowed: bool,
    pub resets_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct QuotaAccountant {
    kv: Arc<dyn KeyValueStore>,
}

impl QuotaAccountant {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    /// `check` never mutates state; `increment` does (§4.3).
    pub async fn check(&self, user_id: &str, plan: Plan) -> LexResult<QuotaStatus> {
        let resets_at = next_utc_month_start(Utc::now());
        let Some(limit) = plan.limit() else {
            return Ok(QuotaStatus {
                used: 0,
                limit: None,
                allowed: true,
                resets_at,
            });
        };

        let key = quota_key(user_id, &current_utc_month());
        let used = match self.kv.get(&key).await? {
            Some(v) => v.parse::<u64>().unwrap_or(0),
            None => 0,
        };
        Ok(QuotaStatus {
            used,
            limit: Some(limit),
            allowed: used < limit,
            resets_at,
        })
    }

    /// Atomically increment the counter. Sets expiry to the first instant
    /// of next UTC month only when this increment created the counter
    /// (post-value == 1), so a TTL race never resets an in-progress month
    /// (§4.3).
    pub async fn increment(&self, user_id: &str) -> LexResult<u64> {
        let key = quota_key(user_id, &current_utc_month());
        let post_value = self.kv.incr(&key).await?;
        if post_value == 1 {
            let ttl = seconds_until_utc_next_month(Utc::now());
            self.kv.expire(&key, Duration::from_secs(ttl)).await?;
        }
        Ok(post_value as u64)
    }
}

/// First instant of the next UTC calendar month.
pub fn next_utc_month_start(now: DateTime<Utc>) -> DateTime<Utc> {
    let (next_year, next_month) = if now.month() == 12 {
        (now.year() + 1, 1)
    } else {
        (now.year(), now.month() + 1)
    };
    Utc.with_ymd_and_hms(next_year, next_month, 1, 0, 0, 0)
        .single()
        .expect("valid first-of-month timestamp")
}

/// Seconds from `now` until the first instant of next UTC month, for TTL
/// use. Floors at 1 to avoid a zero/negative TTL meaning "no expiry" in
/// some store implementations.
pub fn seconds_until_utc_next_month(now: DateTime<Utc>) -> u64 {
    let next = next_utc_month_start(now);
    (next - now).num_seconds().max(1) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryKeyValueStore;

    #[tokio::test]
    async fn plan_limit_exactly_reached() {
        let kv: Arc<dyn KeyValueStore> = Arc::new(InMemoryKeyValueStore::new());
        let accountant = QuotaAccountant::new(kv);
        for _ in 0..3 {
            let status = accountant.check("u1", Plan::Free).await.unwrap();
            assert!(status.allowed);
            accountant.increment("u1").await.unwrap();
        }
        let status = accountant.check("u1", Plan::Free).await.unwrap();
        assert!(!status.allowed);
    }

    #[tokio::test]
    async fn enterprise_is_unbounded_without_touching_storage() {
        let kv: Arc<dyn KeyValueStore> = Arc::new(InMemoryKeyValueStore::new());
        let accountant = QuotaAccountant::new(kv);
        for _ in 0..1000 {
            let status = accountant.check("u-ent", Plan::Enterprise).await.unwrap();
            assert!(status.allowed);
            assert_eq!(status.limit, None);
        }
    }

    #[test]
    fn month_rollover_crosses_year_boundary() {
        let dec = Utc.with_ymd_and_hms(2026, 12, 15, 10, 0, 0).unwrap();
        let next = next_utc_month_start(dec);
        assert_eq!(next, Utc.with_ymd_and_hms(2027, 1, 1, 0, 0, 0).unwrap());
    }
}
