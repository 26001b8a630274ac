//! The analysis consumer loop (§4.6): cache recheck, model call, persist,
//! publish, retry-or-dead-letter.

use std::sync::Arc;
use std::time::{Duration, Instant};

use lexai_core::domain::events::{event_names, queues, AnalysisCompletePayload, AnalysisFailedPayload, SOCKET_EVENTS_CHANNEL};
use lexai_core::domain::{Analysis, AnalysisJob, AnalysisState, CachedSummary, ContractDates};
use lexai_core::fingerprint::{cache_key, lock_key};
use lexai_core::lock::SingleFlightLock;
use lexai_core::ports::{DocumentStore, JobQueue, KeyValueStore};
use lexai_integrations::ModelClient;
use tracing::{error, info, warn};

/// Default in-band retry ceiling before dead-lettering (§4.6 step 5:
/// "retryCount >= 2"); overridden by `AnalysisConsumer::max_retries`.
pub const MAX_IN_BAND_RETRIES: u32 = 2;

pub struct AnalysisConsumer {
    pub documents: Arc<dyn DocumentStore>,
    pub kv: Arc<dyn KeyValueStore>,
    pub queue: Arc<dyn JobQueue>,
    pub model: Arc<dyn ModelClient>,
    pub lock: SingleFlightLock,
    pub cache_ttl: Duration,
    pub max_retries: u32,
}

impl AnalysisConsumer {
    /// Runs consumer loops forever on the `analysis` queue at prefetch=1
    /// per loop, re-establishing the consumer if the broker connection
    /// drops (the queue adapter itself supervises reconnection; this loop
    /// only needs to keep asking for a fresh consumer handle).
    pub async fn run(self: Arc<Self>, concurrency: usize) {
        let mut handles = Vec::with_capacity(concurrency);
        for i in 0..concurrency {
            let worker = self.clone();
            handles.push(tokio::spawn(async move {
                worker.run_one(format!("analysis-{i}")).await;
            }));
        }
        futures::future::join_all(handles).await;
    }

    async fn run_one(&self, consumer_tag: String) {
        loop {
            let mut consumer = match self.queue.consume(queues::ANALYSIS, &consumer_tag).await {
                Ok(consumer) => consumer,
                Err(err) => {
                    error!(error = %err, "failed to start analysis consumer, retrying in 2s");
                    tokio::time::sleep(Duration::from_secs(2)).await;
                    continue;
                }
            };
            loop {
                match consumer.next().await {
                    Ok(Some(delivery)) => {
                        let payload = delivery.payload().to_vec();
                        self.handle_delivery(delivery, &payload).await;
                    }
                    Ok(None) => {
                        warn!("analysis consumer stream ended, reconnecting");
                        break;
                    }
                    Err(err) => {
                        error!(error = %err, "analysis consumer error, reconnecting");
                        break;
                    }
                }
            }
        }
    }

    async fn handle_delivery(&self, delivery: Box<dyn lexai_core::ports::Delivery>, payload: &[u8]) {
        // The analysis queue carries two job shapes (§6, §4.11), discriminated
        // by an optional `type` field; sniff it before committing to one.
        if is_diff_job(payload) {
            match serde_json::from_slice::<lexai_core::domain::events::DiffJob>(payload) {
                Ok(job) => {
                    if let Err(err) = crate::diff_worker::handle_diff_job(self.model.as_ref(), self.kv.as_ref(), &job).await {
                        warn!(error = %err, "diff job failed, dead-lettering without retry");
                    }
                }
                Err(err) => warn!(error = %err, "discarding malformed diff job"),
            }
            let _ = delivery.ack().await;
            return;
        }

        // Step 1: malformed payloads are acknowledged immediately, never retried.
        let job: AnalysisJob = match serde_json::from_slice(payload) {
            Ok(job) => job,
            Err(err) => {
                warn!(error = %err, "discarding malformed analysis job");
                let _ = delivery.ack().await;
                return;
            }
        };

        match self.process(&job).await {
            Outcome::Done => {
                let _ = delivery.ack().await;
            }
            Outcome::RetryInBand => {
                let _ = delivery.ack().await;
                self.republish_with_incremented_retry(job).await;
            }
            Outcome::DeadLetter => {
                let _ = delivery.nack_no_requeue().await;
            }
        }
    }

    async fn process(&self, job: &AnalysisJob) -> Outcome {
        // Step 2: transition to processing.
        if let Err(err) = self
            .documents
            .set_analysis_state(&job.analysis_id, AnalysisState::Processing)
            .await
        {
            error!(error = %err, analysis_id = %job.analysis_id, "failed to mark analysis processing");
            return self.fail_or_retry(job, format!("store error marking processing: {err}")).await;
        }

        let cache_key = cache_key(&job.content_hash);
        let lock_key = lock_key(&job.content_hash);

        // Step 3: cache recheck, the sole correctness boundary (§4.6, §9).
        match self.kv.get(&cache_key).await {
            Ok(Some(raw)) => {
                if let Ok(cached) = serde_json::from_str::<CachedSummary>(&raw) {
                    return self.complete_from_cache(job, cached, &lock_key).await;
                }
                warn!(analysis_id = %job.analysis_id, "corrupt cache entry, falling through to model call");
            }
            Ok(None) => {}
            Err(err) => {
                warn!(error = %err, "cache lookup failed, falling through to model call");
            }
        }

        // Step 4: model call.
        let started = Instant::now();
        match self.model.analyze(&job.content).await {
            Ok(outcome) => {
                self.complete_from_model(job, outcome, started.elapsed(), &lock_key).await
            }
            Err(err) => {
                warn!(error = %err, analysis_id = %job.analysis_id, "model call failed");
                self.fail_or_retry(job, err.to_string()).await
            }
        }
    }

    async fn complete_from_cache(&self, job: &AnalysisJob, cached: CachedSummary, lock_key: &str) -> Outcome {
        let analysis = match self.documents.get_analysis(&job.tenant_id, &job.analysis_id).await {
            Ok(Some(analysis)) => analysis,
            _ => Analysis::new_pending(&job.tenant_id, &job.contract_id, job.version, &job.content_hash),
        };
        let mut analysis = analysis;
        analysis.result = Some(lexai_core::domain::AnalysisResult {
            summary: cached.summary.clone(),
            risk_score: cached.risk_score,
            risk_level: cached.risk_level,
            clauses: Vec::new(),
            obligations: Default::default(),
            parties: Vec::new(),
            key_dates: Default::default(),
        });
        analysis.state = AnalysisState::Completed;

        if let Err(err) = self.documents.complete_analysis(&analysis).await {
            error!(error = %err, "failed to persist cache-hit completion");
            return self.fail_or_retry(job, format!("store error completing from cache: {err}")).await;
        }

        self.publish_complete(job, cached.risk_score, cached.risk_level).await;
        self.lock.release(lock_key).await;
        Outcome::Done
    }

    async fn complete_from_model(
        &self,
        job: &AnalysisJob,
        outcome: lexai_integrations::ModelOutcome,
        elapsed: Duration,
        lock_key: &str,
    ) -> Outcome {
        let mut analysis = match self.documents.get_analysis(&job.tenant_id, &job.analysis_id).await {
            Ok(Some(analysis)) => analysis,
            _ => Analysis::new_pending(&job.tenant_id, &job.contract_id, job.version, &job.content_hash),
        };
        analysis.mark_completed(
            outcome.result.clone(),
            outcome.model.clone(),
            outcome.tokens_used,
            elapsed.as_millis() as u64,
        );

        if let Err(err) = self.documents.complete_analysis(&analysis).await {
            error!(error = %err, "failed to persist model completion");
            return self.fail_or_retry(job, format!("store error completing analysis: {err}")).await;
        }

        // Step 4c: merge extracted dates/parties, never overwriting with empties.
        let dates = extract_contract_dates(&outcome.result.key_dates);
        if let Err(err) = self
            .documents
            .update_contract_extraction(&job.contract_id, dates, outcome.result.parties.clone())
            .await
        {
            warn!(error = %err, "failed to merge contract extraction, continuing");
        }

        // Step 4d: cache entry with 24h TTL.
        if let Some(summary) = analysis.to_cached_summary() {
            if let Ok(raw) = serde_json::to_string(&summary) {
                let cache_key = cache_key(&job.content_hash);
                if let Err(err) = self.kv.set(&cache_key, &raw, Some(self.cache_ttl)).await {
                    warn!(error = %err, "failed to write cache entry, continuing");
                }
            }
        }

        self.publish_complete(job, outcome.result.risk_score, outcome.result.risk_level).await;
        self.lock.release(lock_key).await;
        Outcome::Done
    }

    async fn fail_or_retry(&self, job: &AnalysisJob, reason: String) -> Outcome {
        if job.retry_count < self.max_retries {
            info!(analysis_id = %job.analysis_id, retry_count = job.retry_count, "retrying analysis job in-band");
            return Outcome::RetryInBand;
        }

        if let Err(err) = self
            .documents
            .set_analysis_state(&job.analysis_id, AnalysisState::Failed)
            .await
        {
            error!(error = %err, "failed to mark analysis failed");
        }
        self.publish_failed(job, &reason).await;
        self.lock.release(&lock_key(&job.content_hash)).await;
        Outcome::DeadLetter
    }

    async fn republish_with_incremented_retry(&self, mut job: AnalysisJob) {
        job.retry_count += 1;
        let _ = self.documents.increment_retry(&job.analysis_id).await;
        match serde_json::to_vec(&job) {
            Ok(payload) => {
                if let Err(err) = self.queue.publish(queues::ANALYSIS, &payload).await {
                    error!(error = %err, analysis_id = %job.analysis_id, "failed to republish retried job");
                }
            }
            Err(err) => error!(error = %err, "failed to encode retried job"),
        }
    }

    async fn publish_complete(&self, job: &AnalysisJob, risk_score: u8, risk_level: lexai_core::domain::RiskLevel) {
        let payload = AnalysisCompletePayload {
            contract_id: job.contract_id.clone(),
            analysis_id: job.analysis_id.clone(),
            risk_score,
            risk_level,
        };
        self.publish_socket_event(
            event_names::ANALYSIS_COMPLETE,
            &lexai_core::domain::events::SocketEvent::org_room(&job.tenant_id),
            payload,
        )
        .await;
    }

    async fn publish_failed(&self, job: &AnalysisJob, reason: &str) {
        let payload = AnalysisFailedPayload {
            contract_id: job.contract_id.clone(),
            reason: reason.to_string(),
        };
        self.publish_socket_event(
            event_names::ANALYSIS_FAILED,
            &lexai_core::domain::events::SocketEvent::org_room(&job.tenant_id),
            payload,
        )
        .await;
    }

    async fn publish_socket_event<T: serde::Serialize>(&self, event: &str, room: &str, payload: T) {
        let Ok(payload_value) = serde_json::to_value(payload) else {
            return;
        };
        let record = lexai_core::domain::events::SocketEvent::new(event, room, payload_value);
        if let Ok(raw) = serde_json::to_string(&record) {
            if let Err(err) = self.kv.publish(SOCKET_EVENTS_CHANNEL, &raw).await {
                warn!(error = %err, event, "failed to publish socket event");
            }
        }
    }
}

enum Outcome {
    Done,
    RetryInBand,
    DeadLetter,
}

fn is_diff_job(payload: &[u8]) -> bool {
    serde_json::from_slice::<serde_json::Value>(payload)
        .ok()
        .and_then(|v| v.get("type").and_then(|t| t.as_str()).map(|t| t == "diff"))
        .unwrap_or(false)
}

/// Pulls `effectiveDate`/`expiryDate`/`renewalDate` out of the model's free-
/// form `keyDates` map, parsing each as RFC 3339 or a bare `YYYY-MM-DD`.
/// Unparseable or absent entries stay `None`; the caller's merge never
/// overwrites a known field with one of those (§4.6c).
fn extract_contract_dates(key_dates: &std::collections::HashMap<String, String>) -> ContractDates {
    ContractDates {
        effective_date: parse_any_date(key_dates.get("effectiveDate")),
        expiry_date: parse_any_date(key_dates.get("expiryDate")),
        renewal_date: parse_any_date(key_dates.get("renewalDate")),
    }
}

fn parse_any_date(raw: Option<&String>) -> Option<chrono::DateTime<chrono::Utc>> {
    let raw = raw?;
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&chrono::Utc));
    }
    chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| chrono::DateTime::from_naive_utc_and_offset(dt, chrono::Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use lexai_core::store::memory::{InMemoryDocumentStore, InMemoryJobQueue, InMemoryKeyValueStore};
    use lexai_integrations::model::{FakeModelClient, Scripted};
    use std::collections::HashMap;

    fn job(content_hash: &str) -> AnalysisJob {
        AnalysisJob {
            job_id: "job-1".to_string(),
            contract_id: "contract-1".to_string(),
            analysis_id: "analysis-1".to_string(),
            tenant_id: "tenant-1".to_string(),
            user_id: "user-1".to_string(),
            content: "whereas the parties agree".to_string(),
            content_hash: content_hash.to_string(),
            version: 1,
            retry_count: 0,
            queued_at: chrono::Utc::now(),
        }
    }

    fn consumer(model: Arc<dyn lexai_integrations::ModelClient>) -> (AnalysisConsumer, Arc<InMemoryDocumentStore>) {
        let documents = Arc::new(InMemoryDocumentStore::new());
        let kv: Arc<dyn KeyValueStore> = Arc::new(InMemoryKeyValueStore::new());
        let queue: Arc<dyn JobQueue> = Arc::new(InMemoryJobQueue::new());
        let consumer = AnalysisConsumer {
            documents: documents.clone(),
            kv,
            queue,
            model,
            lock: SingleFlightLock::new(Arc::new(InMemoryKeyValueStore::new())),
            cache_ttl: Duration::from_secs(3600),
            max_retries: MAX_IN_BAND_RETRIES,
        };
        (consumer, documents)
    }

    #[test]
    fn sniffs_diff_jobs_by_type_field() {
        assert!(is_diff_job(br#"{"type":"diff","jobId":"x"}"#));
        assert!(!is_diff_job(br#"{"jobId":"x","contentHash":"y"}"#));
        assert!(!is_diff_job(b"not json"));
    }

    #[test]
    fn extracts_rfc3339_and_bare_dates_leaving_unknown_keys_out() {
        let mut key_dates = HashMap::new();
        key_dates.insert("effectiveDate".to_string(), "2026-01-15T00:00:00Z".to_string());
        key_dates.insert("expiryDate".to_string(), "2027-01-15".to_string());
        key_dates.insert("renewalDate".to_string(), "not a date".to_string());

        let dates = extract_contract_dates(&key_dates);
        assert!(dates.effective_date.is_some());
        assert!(dates.expiry_date.is_some());
        assert!(dates.renewal_date.is_none());
        assert_eq!(dates.expiry_date.unwrap().format("%Y-%m-%d").to_string(), "2027-01-15");
    }

    #[tokio::test]
    async fn model_call_completes_analysis_and_merges_dates() {
        let model: Arc<dyn lexai_integrations::ModelClient> = Arc::new(FakeModelClient::new("gpt-test").push(
            Scripted::Json(
                r#"{"summary":"ok","riskScore":10,"riskLevel":"low","clauses":[],"obligations":{"yourObligations":[],"otherPartyObligations":[]},"parties":["Acme"],"keyDates":{"effectiveDate":"2026-01-01"}}"#
                    .to_string(),
            ),
        ));
        let (consumer, documents) = consumer(model);

        let analysis = Analysis::new_pending("tenant-1", "contract-1", 1, "fp-1");
        documents.insert_analysis(&analysis).await.unwrap();

        let job = AnalysisJob { analysis_id: analysis.id.clone(), ..job("fp-1") };
        let outcome = consumer.process(&job).await;
        assert!(matches!(outcome, Outcome::Done));

        let stored = documents.get_analysis("tenant-1", &analysis.id).await.unwrap().unwrap();
        assert_eq!(stored.state, AnalysisState::Completed);
        assert_eq!(stored.result.unwrap().parties, vec!["Acme".to_string()]);

        let cached = consumer.kv.get(&cache_key("fp-1")).await.unwrap();
        assert!(cached.is_some());
    }

    #[tokio::test]
    async fn cache_hit_short_circuits_the_model_call() {
        let model = Arc::new(FakeModelClient::new("gpt-test"));
        let (consumer, documents) = consumer(model.clone());

        let analysis = Analysis::new_pending("tenant-1", "contract-1", 1, "fp-2");
        documents.insert_analysis(&analysis).await.unwrap();
        let cached = CachedSummary {
            analysis_id: analysis.id.clone(),
            summary: "cached summary".to_string(),
            risk_score: 5,
            risk_level: lexai_core::domain::RiskLevel::Low,
        };
        consumer
            .kv
            .set(&cache_key("fp-2"), &serde_json::to_string(&cached).unwrap(), None)
            .await
            .unwrap();

        let job = AnalysisJob { analysis_id: analysis.id.clone(), ..job("fp-2") };
        let outcome = consumer.process(&job).await;
        assert!(matches!(outcome, Outcome::Done));
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn exhausted_retries_dead_letter() {
        let model: Arc<dyn lexai_integrations::ModelClient> = Arc::new(FakeModelClient::new("gpt-test").push(
            Scripted::Err(lexai_core::error::LexError::PermanentUpstream(
                "provider unavailable".to_string(),
            )),
        ));
        let (consumer, documents) = consumer(model);

        let analysis = Analysis::new_pending("tenant-1", "contract-1", 1, "fp-3");
        documents.insert_analysis(&analysis).await.unwrap();

        let mut job = AnalysisJob { analysis_id: analysis.id.clone(), ..job("fp-3") };
        job.retry_count = MAX_IN_BAND_RETRIES;
        let outcome = consumer.process(&job).await;
        assert!(matches!(outcome, Outcome::DeadLetter));

        let stored = documents.get_analysis("tenant-1", &analysis.id).await.unwrap().unwrap();
        assert_eq!(stored.state, AnalysisState::Failed);
    }
}
