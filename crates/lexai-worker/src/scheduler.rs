//! The daily expiry scheduler (§4.10): fires once at 02:00 UTC, scans every
//! non-deleted contract with a known expiry date, and enqueues an alert job
//! per threshold that newly crosses `remaining <= threshold`.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Timelike, Utc};
use lexai_core::domain::events::{queues, AlertJob};
use lexai_core::ports::{DocumentStore, JobQueue};
use tracing::{error, info, warn};

/// Contracts expiring further out than this are not worth scanning alerts
/// for yet (§4.10: "skips any contract with remaining ... > 90").
const MAX_LOOKAHEAD_DAYS: i64 = 90;
const SCHEDULER_HOUR_UTC: u32 = 2;

/// How often the scheduler wakes to check the wall clock. A daily fixed-time
/// trigger doesn't need a cron parser; a short poll against the UTC hour is
/// exact and simple to test.
const POLL_INTERVAL: Duration = Duration::from_secs(60);

pub struct ExpiryScheduler {
    pub documents: Arc<dyn DocumentStore>,
    pub queue: Arc<dyn JobQueue>,
}

impl ExpiryScheduler {
    /// Runs forever, firing [`Self::run_once`] the first time the UTC clock
    /// reads `02:00` each day.
    pub async fn run(&self) {
        let mut last_fired_date = None;
        loop {
            let now = Utc::now();
            if now.hour() == SCHEDULER_HOUR_UTC && last_fired_date != Some(now.date_naive()) {
                last_fired_date = Some(now.date_naive());
                if let Err(err) = self.run_once().await {
                    error!(error = %err, "expiry scheduler run failed");
                }
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    pub async fn run_once(&self) -> lexai_core::error::LexResult<()> {
        let now = Utc::now();
        let contracts = self.documents.list_contracts_with_expiry(None).await?;
        info!(count = contracts.len(), "expiry scheduler scanning contracts");

        for contract in contracts {
            let Some(remaining) = contract.days_until_expiry(now) else {
                continue;
            };
            if !(0..=MAX_LOOKAHEAD_DAYS).contains(&remaining) {
                continue;
            }

            for threshold in contract.alert_thresholds_days.iter().copied() {
                if remaining > threshold || contract.has_fired(threshold) {
                    continue;
                }
                let won_race = self
                    .documents
                    .try_record_alert_fired(&contract.id, threshold, now)
                    .await?;
                if !won_race {
                    continue;
                }

                let job = AlertJob {
                    contract_id: contract.id.clone(),
                    tenant_id: contract.tenant_id.clone(),
                    title: contract.title.clone(),
                    expiry_date: contract
                        .dates
                        .expiry_date
                        .expect("days_until_expiry returned Some"),
                    days_until_expiry: remaining,
                    threshold,
                };
                match serde_json::to_vec(&job) {
                    Ok(payload) => {
                        if let Err(err) = self.queue.publish(queues::ALERT, &payload).await {
                            warn!(error = %err, contract_id = %contract.id, "failed to enqueue alert job");
                        }
                    }
                    Err(err) => warn!(error = %err, "failed to encode alert job"),
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lexai_core::domain::Contract;
    use lexai_core::store::memory::{InMemoryDocumentStore, InMemoryJobQueue};
    use lexai_core::ports::{Consumer, Delivery, DocumentStore, JobQueue};

    fn scheduler(documents: Arc<InMemoryDocumentStore>, queue: Arc<InMemoryJobQueue>) -> ExpiryScheduler {
        ExpiryScheduler { documents, queue }
    }

    #[tokio::test]
    async fn enqueues_one_alert_per_crossed_threshold_and_never_twice() {
        let documents = Arc::new(InMemoryDocumentStore::new());
        let queue = Arc::new(InMemoryJobQueue::new());

        let mut contract = Contract::new("tenant-1", "MSA", "body".to_string());
        contract.dates.expiry_date = Some(Utc::now() + chrono::Duration::days(25));
        contract.alert_thresholds_days = vec![30];
        let contract_id = contract.id.clone();
        documents.insert_contract(&contract).await.unwrap();

        let s = scheduler(documents.clone(), queue.clone());
        s.run_once().await.unwrap();

        let mut consumer = queue.consume(queues::ALERT, "test").await.unwrap();
        let delivery = consumer.next().await.unwrap().unwrap();
        let job: AlertJob = serde_json::from_slice(delivery.payload()).unwrap();
        assert_eq!(job.contract_id, contract_id);
        assert_eq!(job.threshold, 30);
        delivery.ack().await.unwrap();

        // A second pass must not re-fire the same threshold.
        s.run_once().await.unwrap();
        let second = tokio::time::timeout(Duration::from_millis(50), consumer.next()).await;
        assert!(second.is_err(), "expected no further alert to be enqueued");
    }

    #[tokio::test]
    async fn contracts_outside_the_lookahead_window_are_skipped() {
        let documents = Arc::new(InMemoryDocumentStore::new());
        let queue = Arc::new(InMemoryJobQueue::new());

        let mut contract = Contract::new("tenant-1", "MSA", "body".to_string());
        contract.dates.expiry_date = Some(Utc::now() + chrono::Duration::days(200));
        documents.insert_contract(&contract).await.unwrap();

        let s = scheduler(documents, queue.clone());
        s.run_once().await.unwrap();

        let mut consumer = queue.consume(queues::ALERT, "test").await.unwrap();
        let result = tokio::time::timeout(Duration::from_millis(50), consumer.next()).await;
        assert!(result.is_err(), "expected no alert for a contract outside the lookahead window");
    }
}
