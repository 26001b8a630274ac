//! Durable job queue port: publish, prefetch-one consume with manual
//! ack/nack, dead-lettering (§4.5, §6).

use async_trait::async_trait;

use crate::error::LexResult;

/// A delivered message: the queue is free to use whatever internal delivery
/// tag it needs, but the port only ever asks callers to ack/nack once.
#[async_trait]
pub trait Delivery: Send {
    fn payload(&self) -> &[u8];

    /// Positive-acknowledge: the message is done, successfully or because
    /// it was malformed and deliberately not retried (§4.6 step 1).
    async fn ack(self: Box<Self>) -> LexResult<()>;

    /// Negative-acknowledge without requeue, so the broker dead-letters it.
    async fn nack_no_requeue(self: Box<Self>) -> LexResult<()>;
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Publish a durable, persistent message to `queue`.
    async fn publish(&self, queue: &str, payload: &[u8]) -> LexResult<()>;

    /// Start a prefetch-one consumer on `queue`. Each call to
    /// [`Consumer::next`] blocks until exactly one unacknowledged message is
    /// available.
    async fn consume(&self, queue: &str, consumer_tag: &str) -> LexResult<Box<dyn Consumer>>;
}

#[async_trait]
pub trait Consumer: Send {
    async fn next(&mut self) -> LexResult<Option<Box<dyn Delivery>>>;
}
