//! Bounded-retry, never-blocks-the-caller email dispatch (§9).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lexai_core::error::LexResult;
use tracing::warn;

use super::{EmailDispatcher, EmailMessage, EmailTransport};

const MAX_ATTEMPTS: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_secs(2);

/// Spawns a detached task per submission; the task retries up to
/// [`MAX_ATTEMPTS`] times and then gives up silently (a failure here is
/// swallowed with a warning, matching the audit-log failure policy in §7 —
/// the caller already moved on).
pub struct BoundedRetryDispatcher<T: EmailTransport + 'static> {
    transport: Arc<T>,
}

impl<T: EmailTransport + 'static> BoundedRetryDispatcher<T> {
    pub fn new(transport: Arc<T>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl<T: EmailTransport + 'static> EmailDispatcher for BoundedRetryDispatcher<T> {
    async fn submit(&self, message: EmailMessage) {
        let transport = self.transport.clone();
        tokio::spawn(async move {
            for attempt in 1..=MAX_ATTEMPTS {
                match transport.send_once(&message).await {
                    Ok(()) => return,
                    Err(err) => {
                        warn!(attempt, to = %message.to, error = %err, "email send attempt failed");
                        if attempt < MAX_ATTEMPTS {
                            tokio::time::sleep(RETRY_DELAY).await;
                        }
                    }
                }
            }
            warn!(to = %message.to, "email delivery abandoned after max attempts");
        });
    }
}

/// Production transport: a transactional-email HTTP provider.
pub struct ReqwestEmailTransport {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl ReqwestEmailTransport {
    pub fn from_env() -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: std::env::var("LEXAI_EMAIL_ENDPOINT")
                .unwrap_or_else(|_| "https://api.email-provider.example/v1/send".to_string()),
            api_key: std::env::var("LEXAI_EMAIL_API_KEY").unwrap_or_default(),
        }
    }
}

#[async_trait]
impl EmailTransport for ReqwestEmailTransport {
    async fn send_once(&self, message: &EmailMessage) -> LexResult<()> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({
                "to": message.to,
                "subject": message.subject,
                "html": message.html,
                "text": message.text,
            }))
            .send()
            .await
            .map_err(|e| lexai_core::error::LexError::TransientUpstream(format!("email send: {e}")))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(lexai_core::error::LexError::TransientUpstream(format!(
                "email provider returned {}",
                response.status()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FlakyTransport {
        fail_times: usize,
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl EmailTransport for FlakyTransport {
        async fn send_once(&self, _message: &EmailMessage) -> LexResult<()> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            if attempt < self.fail_times {
                Err(lexai_core::error::LexError::TransientUpstream("flaky".into()))
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn submit_never_blocks_and_eventually_succeeds() {
        let transport = Arc::new(FlakyTransport {
            fail_times: 1,
            attempts: AtomicUsize::new(0),
        });
        let dispatcher = BoundedRetryDispatcher::new(transport.clone());
        dispatcher
            .submit(EmailMessage {
                to: "user@example.com".into(),
                subject: "Contract expiring".into(),
                html: "<p>hi</p>".into(),
                text: "hi".into(),
            })
            .await;
        tokio::time::sleep(Duration::from_millis(50) + RETRY_DELAY).await;
        assert!(transport.attempts.load(Ordering::SeqCst) >= 2);
    }
}
