//! Admission service (§4.4): dedup by content hash, single-flight lock,
//! quota enforcement, and job enqueue. The only entry point through which a
//! client-facing request produces a new analysis job.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::domain::{Analysis, AnalysisJob};
use crate::error::{LexError, LexResult};
use crate::fingerprint::{cache_key, lock_key};
use crate::lock::SingleFlightLock;
use crate::ports::{DocumentStore, JobQueue, KeyValueStore};
use crate::quota::{Plan, QuotaAccountant};

/// Minimum accepted contract body length (§8 boundary behaviour).
pub const MIN_BODY_LEN: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmissionState {
    Completed,
    Pending,
}

#[derive(Debug, Clone)]
pub struct AdmissionOutcome {
    pub analysis_id: String,
    pub state: AdmissionState,
    pub cached: bool,
}

#[derive(Debug, Clone)]
pub struct AdmissionRequest {
    pub contract_id: String,
    pub tenant_id: String,
    pub user_id: String,
    pub plan: Plan,
    pub requested_version: Option<u32>,
}

pub struct AdmissionService {
    documents: Arc<dyn DocumentStore>,
    kv: Arc<dyn KeyValueStore>,
    queue: Arc<dyn JobQueue>,
    lock: SingleFlightLock,
    lock_ttl: Duration,
    quota: QuotaAccountant,
}

impl AdmissionService {
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        kv: Arc<dyn KeyValueStore>,
        queue: Arc<dyn JobQueue>,
        lock_ttl: Duration,
    ) -> Self {
        let lock = SingleFlightLock::new(kv.clone());
        let quota = QuotaAccountant::new(kv.clone());
        Self {
            documents,
            kv,
            queue,
            lock,
            lock_ttl,
            quota,
        }
    }

    /// Runs the ordered, non-atomic algorithm of §4.4. Steps are not atomic
    /// with each other by design; the small windows between them are
    /// tolerated because correctness is ultimately anchored by the cache
    /// recheck in the worker (§4.2, §4.6).
    pub async fn admit(&self, req: AdmissionRequest) -> LexResult<AdmissionOutcome> {
        // Step 1: load contract, tenant-scoped, reject on miss/soft-delete.
        let contract = self
            .documents
            .get_contract(&req.tenant_id, &req.contract_id)
            .await?
            .filter(|c| !c.deleted)
            .ok_or_else(|| LexError::NotFound(format!("contract {}", req.contract_id)))?;

        // Step 2: resolve version, extract body + fingerprint.
        let version = contract
            .resolve_version(req.requested_version)
            .ok_or_else(|| {
                LexError::VersionNotFound(format!(
                    "version {:?} of contract {}",
                    req.requested_version, req.contract_id
                ))
            })?
            .clone();

        if version.body.len() < MIN_BODY_LEN {
            return Err(LexError::Validation(format!(
                "body must be at least {MIN_BODY_LEN} characters"
            )));
        }

        // Step 3: cache hit short-circuits — no new Analysis row.
        let cache_key = cache_key(&version.fingerprint);
        if let Some(cached_json) = self.kv.get(&cache_key).await? {
            let cached: crate::domain::CachedSummary = serde_json::from_str(&cached_json)
                .map_err(|e| LexError::InfrastructureDown(format!("corrupt cache entry: {e}")))?;
            return Ok(AdmissionOutcome {
                analysis_id: cached.analysis_id,
                state: AdmissionState::Completed,
                cached: true,
            });
        }

        // Step 4: attempt the single-flight lock.
        let lock_key = lock_key(&version.fingerprint);
        let acquired = self.lock.acquire(&lock_key, self.lock_ttl).await?;
        if !acquired {
            if let Some(existing) = self
                .documents
                .find_non_terminal_analysis(&contract.id, version.version)
                .await?
            {
                return Ok(AdmissionOutcome {
                    analysis_id: existing.id,
                    state: AdmissionState::Pending,
                    cached: false,
                });
            }
            // The in-flight holder will deduplicate via the cache recheck
            // (§4.4 step 4); proceed as if we held the lock.
        }

        // Step 5: create the Analysis row.
        let analysis = Analysis::new_pending(&req.tenant_id, &contract.id, version.version, &version.fingerprint);
        self.documents.insert_analysis(&analysis).await?;

        // Step 6: quota.
        let status = self.quota.check(&req.user_id, req.plan).await?;
        if !status.allowed {
            return Err(LexError::QuotaExceeded {
                used: status.used,
                limit: status.limit.unwrap_or(u64::MAX),
                resets_at: status.resets_at,
            });
        }
        self.quota.increment(&req.user_id).await?;

        // Step 7: enqueue.
        let job = AnalysisJob {
            job_id: uuid::Uuid::new_v4().to_string(),
            contract_id: contract.id.clone(),
            analysis_id: analysis.id.clone(),
            tenant_id: req.tenant_id.clone(),
            user_id: req.user_id.clone(),
            content: version.body.clone(),
            content_hash: version.fingerprint.clone(),
            version: version.version,
            retry_count: 0,
            queued_at: Utc::now(),
        };
        let payload = serde_json::to_vec(&job)
            .map_err(|e| LexError::InfrastructureDown(format!("job encode: {e}")))?;
        self.queue
            .publish(crate::domain::events::queues::ANALYSIS, &payload)
            .await?;

        Ok(AdmissionOutcome {
            analysis_id: analysis.id,
            state: AdmissionState::Pending,
            cached: false,
        })
    }
}

/// Seconds-until helper exposed for the HTTP boundary's `Retry-After`
/// header when surfacing `QuotaExceeded` (§7).
pub fn retry_after_seconds(resets_at: chrono::DateTime<Utc>) -> i64 {
    (resets_at - Utc::now()).num_seconds().max(0)
}

#[allow(unused)]
fn _assert_send_sync<T: Send + Sync>() {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Contract;
    use crate::store::memory::{InMemoryDocumentStore, InMemoryKeyValueStore};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use async_trait::async_trait;

    struct CountingQueue {
        published: AtomicUsize,
    }

    #[async_trait]
    impl JobQueue for CountingQueue {
        async fn publish(&self, _queue: &str, _payload: &[u8]) -> LexResult<()> {
            self.published.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        async fn consume(
            &self,
            _queue: &str,
            _consumer_tag: &str,
        ) -> LexResult<Box<dyn crate::ports::Consumer>> {
            unimplemented!("not exercised by admission tests")
        }
    }

    fn service() -> (AdmissionService, Arc<InMemoryDocumentStore>, Arc<CountingQueue>) {
        let documents = Arc::new(InMemoryDocumentStore::new());
        let kv: Arc<dyn KeyValueStore> = Arc::new(InMemoryKeyValueStore::new());
        let queue = Arc::new(CountingQueue {
            published: AtomicUsize::new(0),
        });
        let svc = AdmissionService::new(documents.clone(), kv, queue.clone(), crate::lock::LOCK_TTL);
        (svc, documents, queue)
    }

    #[tokio::test]
    async fn rejects_short_body() {
        let (svc, documents, _queue) = service();
        let contract = Contract::new("t1", "NDA", "short".to_string());
        documents.insert_contract(&contract).await.unwrap();
        let err = svc
            .admit(AdmissionRequest {
                contract_id: contract.id,
                tenant_id: "t1".into(),
                user_id: "u1".into(),
                plan: Plan::Free,
                requested_version: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, LexError::Validation(_)));
    }

    #[tokio::test]
    async fn cache_miss_happy_path_enqueues_once() {
        let (svc, documents, queue) = service();
        let contract = Contract::new("t1", "NDA", "x".repeat(80));
        documents.insert_contract(&contract).await.unwrap();
        let outcome = svc
            .admit(AdmissionRequest {
                contract_id: contract.id,
                tenant_id: "t1".into(),
                user_id: "u1".into(),
                plan: Plan::Free,
                requested_version: None,
            })
            .await
            .unwrap();
        assert_eq!(outcome.state, AdmissionState::Pending);
        assert!(!outcome.cached);
        assert_eq!(queue.published.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn quota_exceeded_on_fourth_distinct_contract() {
        let (svc, documents, _queue) = service();
        for i in 0..3 {
            let contract = Contract::new("t1", "NDA", format!("{}{}", "x".repeat(80), i));
            documents.insert_contract(&contract).await.unwrap();
            let outcome = svc
                .admit(AdmissionRequest {
                    contract_id: contract.id,
                    tenant_id: "t1".into(),
                    user_id: "u1".into(),
                    plan: Plan::Free,
                    requested_version: None,
                })
                .await
                .unwrap();
            assert_eq!(outcome.state, AdmissionState::Pending);
        }
        let contract = Contract::new("t1", "NDA", "y".repeat(90));
        documents.insert_contract(&contract).await.unwrap();
        let err = svc
            .admit(AdmissionRequest {
                contract_id: contract.id,
                tenant_id: "t1".into(),
                user_id: "u1".into(),
                plan: Plan::Free,
                requested_version: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, LexError::QuotaExceeded { .. }));
    }

    #[tokio::test]
    async fn cache_hit_short_circuits_without_enqueue() {
        let (svc, documents, queue) = service();
        let contract = Contract::new("t1", "NDA", "z".repeat(80));
        documents.insert_contract(&contract).await.unwrap();
        let fp = contract.fingerprint.clone();

        // Seed the cache directly, simulating a prior worker completion.
        let kv: Arc<dyn KeyValueStore> = Arc::new(InMemoryKeyValueStore::new());
        let svc2 = AdmissionService::new(documents.clone(), kv.clone(), queue.clone(), crate::lock::LOCK_TTL);
        let summary = crate::domain::CachedSummary {
            analysis_id: "A0".into(),
            summary: "cached".into(),
            risk_score: 10,
            risk_level: crate::domain::RiskLevel::Low,
        };
        kv.set(
            &cache_key(&fp),
            &serde_json::to_string(&summary).unwrap(),
            None,
        )
        .await
        .unwrap();

        let outcome = svc2
            .admit(AdmissionRequest {
                contract_id: contract.id,
                tenant_id: "t1".into(),
                user_id: "u1".into(),
                plan: Plan::Free,
                requested_version: None,
            })
            .await
            .unwrap();
        assert_eq!(outcome.state, AdmissionState::Completed);
        assert!(outcome.cached);
        assert_eq!(outcome.analysis_id, "A0");
        assert_eq!(queue.published.load(Ordering::SeqCst), 0);
        let _ = svc; // first service instance unused beyond setup
    }
}
