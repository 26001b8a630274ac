//! Email collaborator (§6): fire-and-forget from the caller's perspective.
//! Represented as a submission to an internal dispatcher that owns its own
//! bounded retry and never blocks or fails the caller (§9 design notes).

mod dispatcher;

pub use dispatcher::{BoundedRetryDispatcher, ReqwestEmailTransport};

use async_trait::async_trait;
use lexai_core::error::LexResult;

#[derive(Debug, Clone)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub html: String,
    pub text: String,
}

/// The raw transport a dispatcher retries over. Kept separate from
/// [`EmailDispatcher`] so the bounded-retry behavior is testable against a
/// fake transport without spinning up a fire-and-forget task per test.
#[async_trait]
pub trait EmailTransport: Send + Sync {
    async fn send_once(&self, message: &EmailMessage) -> LexResult<()>;
}

/// What callers depend on: submit and move on.
#[async_trait]
pub trait EmailDispatcher: Send + Sync {
    async fn submit(&self, message: EmailMessage);
}
