//! Single-flight lock (§4.2).
//!
//! Cooperative, not mutual-exclusion: correctness comes from the cache
//! recheck the worker performs before calling the LLM (§4.6 step 3), not
//! from holding this lock. A holder must not assume it still holds the lock
//! after `ttl` elapses (§9).

use std::sync::Arc;
use std::time::Duration;

use crate::error::LexResult;
use crate::ports::KeyValueStore;

/// Default lock lease: 5 minutes (§3).
pub const LOCK_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Clone)]
pub struct SingleFlightLock {
    kv: Arc<dyn KeyValueStore>,
}

impl SingleFlightLock {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    /// Attempt to create `key` iff absent, with `ttl`. Returns `true` iff
    /// this call created it.
    pub async fn acquire(&self, key: &str, ttl: Duration) -> LexResult<bool> {
        self.kv.set_if_absent(key, "1", ttl).await
    }

    /// Best-effort delete. Callers release on both success and terminal
    /// failure (§4.6 steps 3e, 5).
    pub async fn release(&self, key: &str) {
        if let Err(err) = self.kv.delete(key).await {
            tracing::warn!(error = %err, key, "single-flight lock release failed, will expire via TTL");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryKeyValueStore;

    #[tokio::test]
    async fn second_acquire_fails_until_released() {
        let kv: Arc<dyn KeyValueStore> = Arc::new(InMemoryKeyValueStore::new());
        let lock = SingleFlightLock::new(kv);
        assert!(lock.acquire("lock:analysis:abc", LOCK_TTL).await.unwrap());
        assert!(!lock.acquire("lock:analysis:abc", LOCK_TTL).await.unwrap());
        lock.release("lock:analysis:abc").await;
        assert!(lock.acquire("lock:analysis:abc", LOCK_TTL).await.unwrap());
    }
}
