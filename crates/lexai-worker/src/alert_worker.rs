//! The alert consumer (§4.10): one `contract:expiring` event per tenant,
//! one email per tenant member. Failures are not retried — negative-acked
//! without requeue — so a bad alert job cannot spam the same users forever.

use std::sync::Arc;
use std::time::Duration;

use lexai_core::domain::events::{event_names, queues, AlertJob, ContractExpiringPayload, SocketEvent, SOCKET_EVENTS_CHANNEL};
use lexai_core::ports::{JobQueue, KeyValueStore};
use lexai_integrations::{EmailDispatcher, EmailMessage, TenantDirectory};
use tracing::{error, warn};

pub struct AlertWorker {
    pub queue: Arc<dyn JobQueue>,
    pub kv: Arc<dyn KeyValueStore>,
    pub directory: Arc<dyn TenantDirectory>,
    pub email: Arc<dyn EmailDispatcher>,
}

impl AlertWorker {
    pub async fn run(&self) {
        let consumer_tag = "alert-0";
        loop {
            let mut consumer = match self.queue.consume(queues::ALERT, consumer_tag).await {
                Ok(consumer) => consumer,
                Err(err) => {
                    error!(error = %err, "failed to start alert consumer, retrying in 2s");
                    tokio::time::sleep(Duration::from_secs(2)).await;
                    continue;
                }
            };
            loop {
                match consumer.next().await {
                    Ok(Some(delivery)) => {
                        let payload = delivery.payload().to_vec();
                        match serde_json::from_slice::<AlertJob>(&payload) {
                            Ok(job) => {
                                self.handle(&job).await;
                                let _ = delivery.ack().await;
                            }
                            Err(err) => {
                                warn!(error = %err, "discarding malformed alert job");
                                let _ = delivery.nack_no_requeue().await;
                            }
                        }
                    }
                    Ok(None) => {
                        warn!("alert consumer stream ended, reconnecting");
                        break;
                    }
                    Err(err) => {
                        error!(error = %err, "alert consumer error, reconnecting");
                        break;
                    }
                }
            }
        }
    }

    async fn handle(&self, job: &AlertJob) {
        let payload = ContractExpiringPayload {
            contract_id: job.contract_id.clone(),
            title: job.title.clone(),
            days_until_expiry: job.days_until_expiry,
            expiry_date: job.expiry_date,
        };
        let Ok(payload_value) = serde_json::to_value(&payload) else {
            return;
        };
        let event = SocketEvent::new(
            event_names::CONTRACT_EXPIRING,
            SocketEvent::org_room(&job.tenant_id),
            payload_value,
        );
        if let Ok(raw) = serde_json::to_string(&event) {
            if let Err(err) = self.kv.publish(SOCKET_EVENTS_CHANNEL, &raw).await {
                warn!(error = %err, "failed to publish contract:expiring event");
            }
        }

        let members = match self.directory.members(&job.tenant_id).await {
            Ok(members) => members,
            Err(err) => {
                warn!(error = %err, tenant_id = %job.tenant_id, "failed to resolve tenant members for alert");
                return;
            }
        };
        for member in members {
            self.email
                .submit(EmailMessage {
                    to: member.email,
                    subject: format!("\"{}\" expires in {} days", job.title, job.days_until_expiry),
                    html: format!(
                        "<p>{} expires on {}.</p>",
                        job.title,
                        job.expiry_date.format("%Y-%m-%d")
                    ),
                    text: format!("{} expires on {}.", job.title, job.expiry_date.format("%Y-%m-%d")),
                })
                .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use lexai_core::store::memory::{InMemoryJobQueue, InMemoryKeyValueStore};
    use lexai_integrations::{FakeTenantDirectory, TenantMember};
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingDispatcher {
        sent: Mutex<Vec<EmailMessage>>,
    }

    #[async_trait]
    impl EmailDispatcher for RecordingDispatcher {
        async fn submit(&self, message: EmailMessage) {
            self.sent.lock().push(message);
        }
    }

    fn worker(directory: Arc<FakeTenantDirectory>, email: Arc<RecordingDispatcher>) -> AlertWorker {
        AlertWorker {
            queue: Arc::new(InMemoryJobQueue::new()),
            kv: Arc::new(InMemoryKeyValueStore::new()),
            directory,
            email,
        }
    }

    #[tokio::test]
    async fn sends_one_email_per_tenant_member_and_publishes_event() {
        let directory = Arc::new(FakeTenantDirectory::new());
        directory.seed(
            "tenant-1",
            vec![
                TenantMember { user_id: "u1".into(), email: "u1@example.com".into() },
                TenantMember { user_id: "u2".into(), email: "u2@example.com".into() },
            ],
        );
        let email = Arc::new(RecordingDispatcher::default());
        let w = worker(directory, email.clone());

        let job = AlertJob {
            contract_id: "contract-1".to_string(),
            tenant_id: "tenant-1".to_string(),
            title: "MSA with Acme".to_string(),
            expiry_date: chrono::Utc::now(),
            days_until_expiry: 30,
            threshold: 30,
        };
        w.handle(&job).await;

        let sent = email.sent.lock();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].to, "u1@example.com");
        assert_eq!(sent[1].to, "u2@example.com");
    }

    #[tokio::test]
    async fn no_members_means_no_emails_but_no_error() {
        let directory = Arc::new(FakeTenantDirectory::new());
        let email = Arc::new(RecordingDispatcher::default());
        let w = worker(directory, email.clone());

        let job = AlertJob {
            contract_id: "contract-2".to_string(),
            tenant_id: "tenant-empty".to_string(),
            title: "NDA".to_string(),
            expiry_date: chrono::Utc::now(),
            days_until_expiry: 7,
            threshold: 7,
        };
        w.handle(&job).await;
        assert!(email.sent.lock().is_empty());
    }
}
