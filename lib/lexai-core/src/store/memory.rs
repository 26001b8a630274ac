//! In-memory fakes of [`DocumentStore`] and [`KeyValueStore`], used by the
//! crate's own test suite and exported for downstream binaries' integration
//! tests. A `RwLock`-guarded in-process collection behind the same trait
//! real adapters implement.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::mpsc;

use crate::domain::{Analysis, AnalysisState, Contract, ContractDates};
use crate::error::{LexError, LexResult};
use crate::ports::document_store::DocumentStore;
use crate::ports::job_queue::{Consumer, Delivery, JobQueue};
use crate::ports::kv_store::{EventSubscriber, KeyValueStore};

#[derive(Default)]
pub struct InMemoryDocumentStore {
    contracts: RwLock<HashMap<String, Contract>>,
    analyses: RwLock<HashMap<String, Analysis>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn get_contract(&self, tenant_id: &str, contract_id: &str) -> LexResult<Option<Contract>> {
        Ok(self
            .contracts
            .read()
            .get(contract_id)
            .filter(|c| c.tenant_id == tenant_id)
            .cloned())
    }

    async fn insert_contract(&self, contract: &Contract) -> LexResult<()> {
        self.contracts
            .write()
            .insert(contract.id.clone(), contract.clone());
        Ok(())
    }

    async fn append_version(&self, contract_id: &str, body: String) -> LexResult<Contract> {
        let mut contracts = self.contracts.write();
        let contract = contracts
            .get_mut(contract_id)
            .ok_or_else(|| LexError::NotFound(format!("contract {contract_id}")))?;
        contract.append_version(body);
        Ok(contract.clone())
    }

    async fn update_contract_extraction(
        &self,
        contract_id: &str,
        dates: ContractDates,
        parties: Vec<String>,
    ) -> LexResult<()> {
        let mut contracts = self.contracts.write();
        let contract = contracts
            .get_mut(contract_id)
            .ok_or_else(|| LexError::NotFound(format!("contract {contract_id}")))?;
        contract.merge_dates(dates);
        contract.merge_parties(parties);
        Ok(())
    }

    async fn try_record_alert_fired(
        &self,
        contract_id: &str,
        threshold_days: i64,
        fired_at: DateTime<Utc>,
    ) -> LexResult<bool> {
        let mut contracts = self.contracts.write();
        let contract = contracts
            .get_mut(contract_id)
            .ok_or_else(|| LexError::NotFound(format!("contract {contract_id}")))?;
        if contract.has_fired(threshold_days) {
            return Ok(false);
        }
        contract.record_fired(threshold_days, fired_at);
        Ok(true)
    }

    async fn list_contracts_with_expiry(&self, tenant_id: Option<&str>) -> LexResult<Vec<Contract>> {
        Ok(self
            .contracts
            .read()
            .values()
            .filter(|c| !c.deleted && c.dates.expiry_date.is_some())
            .filter(|c| tenant_id.map_or(true, |t| c.tenant_id == t))
            .cloned()
            .collect())
    }

    async fn get_analysis(&self, tenant_id: &str, analysis_id: &str) -> LexResult<Option<Analysis>> {
        Ok(self
            .analyses
            .read()
            .get(analysis_id)
            .filter(|a| a.tenant_id == tenant_id)
            .cloned())
    }

    async fn find_non_terminal_analysis(
        &self,
        contract_id: &str,
        version: u32,
    ) -> LexResult<Option<Analysis>> {
        Ok(self
            .analyses
            .read()
            .values()
            .find(|a| a.contract_id == contract_id && a.version == version && !a.state.is_terminal())
            .cloned())
    }

    async fn insert_analysis(&self, analysis: &Analysis) -> LexResult<()> {
        self.analyses
            .write()
            .insert(analysis.id.clone(), analysis.clone());
        Ok(())
    }

    async fn set_analysis_state(&self, analysis_id: &str, state: AnalysisState) -> LexResult<()> {
        let mut analyses = self.analyses.write();
        let analysis = analyses
            .get_mut(analysis_id)
            .ok_or_else(|| LexError::NotFound(format!("analysis {analysis_id}")))?;
        analysis.state = state;
        analysis.updated_at = Utc::now();
        Ok(())
    }

    async fn complete_analysis(&self, analysis: &Analysis) -> LexResult<()> {
        self.analyses
            .write()
            .insert(analysis.id.clone(), analysis.clone());
        Ok(())
    }

    async fn increment_retry(&self, analysis_id: &str) -> LexResult<u32> {
        let mut analyses = self.analyses.write();
        let analysis = analyses
            .get_mut(analysis_id)
            .ok_or_else(|| LexError::NotFound(format!("analysis {analysis_id}")))?;
        analysis.retry_count += 1;
        Ok(analysis.retry_count)
    }
}

struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self) -> bool {
        self.expires_at.map_or(true, |at| Instant::now() < at)
    }
}

/// In-memory key-value store. Publishes fan out to any subscriber created
/// via `subscribe` for the lifetime of this store instance — enough to
/// exercise the event-bus bridge in tests without a real broker.
pub struct InMemoryKeyValueStore {
    entries: RwLock<HashMap<String, Entry>>,
    subscribers: RwLock<Vec<mpsc::UnboundedSender<(String, String)>>>,
}

impl InMemoryKeyValueStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            subscribers: RwLock::new(Vec::new()),
        }
    }
}

impl Default for InMemoryKeyValueStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyValueStore for InMemoryKeyValueStore {
    async fn get(&self, key: &str) -> LexResult<Option<String>> {
        let entries = self.entries.read();
        Ok(entries
            .get(key)
            .filter(|e| e.is_live())
            .map(|e| e.value.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> LexResult<()> {
        self.entries.write().insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: ttl.map(|d| Instant::now() + d),
            },
        );
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> LexResult<bool> {
        let mut entries = self.entries.write();
        if let Some(existing) = entries.get(key) {
            if existing.is_live() {
                return Ok(false);
            }
        }
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(true)
    }

    async fn incr(&self, key: &str) -> LexResult<i64> {
        let mut entries = self.entries.write();
        let current = entries
            .get(key)
            .filter(|e| e.is_live())
            .and_then(|e| e.value.parse::<i64>().ok())
            .unwrap_or(0);
        let next = current + 1;
        let expires_at = entries.get(key).filter(|e| e.is_live()).and_then(|e| e.expires_at);
        entries.insert(
            key.to_string(),
            Entry {
                value: next.to_string(),
                expires_at,
            },
        );
        Ok(next)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> LexResult<()> {
        if let Some(entry) = self.entries.write().get_mut(key) {
            entry.expires_at = Some(Instant::now() + ttl);
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> LexResult<()> {
        self.entries.write().remove(key);
        Ok(())
    }

    async fn publish(&self, channel: &str, payload: &str) -> LexResult<()> {
        let subs = self.subscribers.read();
        for tx in subs.iter() {
            let _ = tx.send((channel.to_string(), payload.to_string()));
        }
        Ok(())
    }

    async fn subscribe(&self, _channels: &[&str]) -> LexResult<Box<dyn EventSubscriber>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.write().push(tx);
        Ok(Box::new(InMemorySubscriber { rx }))
    }

    async fn ping(&self) -> LexResult<()> {
        Ok(())
    }
}

struct InMemorySubscriber {
    rx: mpsc::UnboundedReceiver<(String, String)>,
}

#[async_trait]
impl EventSubscriber for InMemorySubscriber {
    async fn next_message(&mut self) -> LexResult<Option<(String, String)>> {
        Ok(self.rx.recv().await)
    }
}

/// Convenience constructors used by downstream binaries' test harnesses to
/// stand up a fully in-memory `(DocumentStore, KeyValueStore)` pair.
pub fn in_memory_pair() -> (Arc<dyn DocumentStore>, Arc<dyn KeyValueStore>) {
    (
        Arc::new(InMemoryDocumentStore::new()),
        Arc::new(InMemoryKeyValueStore::new()),
    )
}

/// In-memory [`JobQueue`]: one FIFO per named queue, manual ack/nack, and a
/// dead-letter sink recording anything nacked without requeue — enough to
/// assert dead-lettering happened in a test without a real broker.
pub struct InMemoryJobQueue {
    queues: RwLock<HashMap<String, mpsc::UnboundedSender<Vec<u8>>>>,
    receivers: RwLock<HashMap<String, Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<Vec<u8>>>>>>,
    dead_letters: Arc<RwLock<Vec<(String, Vec<u8>)>>>,
}

impl InMemoryJobQueue {
    pub fn new() -> Self {
        Self {
            queues: RwLock::new(HashMap::new()),
            receivers: RwLock::new(HashMap::new()),
            dead_letters: Arc::new(RwLock::new(Vec::new())),
        }
    }

    fn sender_for(&self, queue: &str) -> mpsc::UnboundedSender<Vec<u8>> {
        if let Some(tx) = self.queues.read().get(queue) {
            return tx.clone();
        }
        let mut queues = self.queues.write();
        if let Some(tx) = queues.get(queue) {
            return tx.clone();
        }
        let (tx, rx) = mpsc::unbounded_channel();
        queues.insert(queue.to_string(), tx.clone());
        self.receivers
            .write()
            .insert(queue.to_string(), Arc::new(tokio::sync::Mutex::new(rx)));
        tx
    }

    /// Messages routed to the dead-letter sink, oldest first.
    pub fn dead_lettered(&self) -> Vec<(String, Vec<u8>)> {
        self.dead_letters.read().clone()
    }
}

impl Default for InMemoryJobQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn publish(&self, queue: &str, payload: &[u8]) -> LexResult<()> {
        self.sender_for(queue)
            .send(payload.to_vec())
            .map_err(|_| LexError::InfrastructureDown(format!("queue {queue} closed")))
    }

    async fn consume(&self, queue: &str, _consumer_tag: &str) -> LexResult<Box<dyn Consumer>> {
        self.sender_for(queue); // ensure the queue exists even with no publishers yet
        let rx = self
            .receivers
            .read()
            .get(queue)
            .cloned()
            .expect("sender_for just created the receiver");
        Ok(Box::new(InMemoryConsumer {
            queue: queue.to_string(),
            rx,
            dead_letters: self.dead_letters.clone(),
        }))
    }
}

struct InMemoryConsumer {
    queue: String,
    rx: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<Vec<u8>>>>,
    dead_letters: Arc<RwLock<Vec<(String, Vec<u8>)>>>,
}

#[async_trait]
impl Consumer for InMemoryConsumer {
    async fn next(&mut self) -> LexResult<Option<Box<dyn Delivery>>> {
        let mut rx = self.rx.lock().await;
        match rx.recv().await {
            Some(payload) => Ok(Some(Box::new(InMemoryDelivery {
                queue: self.queue.clone(),
                payload,
                dead_letters: self.dead_letters.clone(),
            }))),
            None => Ok(None),
        }
    }
}

struct InMemoryDelivery {
    queue: String,
    payload: Vec<u8>,
    dead_letters: Arc<RwLock<Vec<(String, Vec<u8>)>>>,
}

#[async_trait]
impl Delivery for InMemoryDelivery {
    fn payload(&self) -> &[u8] {
        &self.payload
    }

    async fn ack(self: Box<Self>) -> LexResult<()> {
        Ok(())
    }

    async fn nack_no_requeue(self: Box<Self>) -> LexResult<()> {
        self.dead_letters.write().push((self.queue, self.payload));
        Ok(())
    }
}

#[cfg(test)]
mod queue_tests {
    use super::*;

    #[tokio::test]
    async fn published_message_is_delivered_and_acked() {
        let queue = InMemoryJobQueue::new();
        queue.publish("analysis", b"job-1").await.unwrap();
        let mut consumer = queue.consume("analysis", "worker-1").await.unwrap();
        let delivery = consumer.next().await.unwrap().unwrap();
        assert_eq!(delivery.payload(), b"job-1");
        delivery.ack().await.unwrap();
        assert!(queue.dead_lettered().is_empty());
    }

    #[tokio::test]
    async fn nack_without_requeue_dead_letters() {
        let queue = InMemoryJobQueue::new();
        queue.publish("analysis", b"job-2").await.unwrap();
        let mut consumer = queue.consume("analysis", "worker-1").await.unwrap();
        let delivery = consumer.next().await.unwrap().unwrap();
        delivery.nack_no_requeue().await.unwrap();
        assert_eq!(queue.dead_lettered(), vec![("analysis".to_string(), b"job-2".to_vec())]);
    }
}
