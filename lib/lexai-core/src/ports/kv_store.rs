//! Key-value store port: cache, single-flight lock, quota counters,
//! revocation markers, and the pub/sub channel (§6).
//!
//! The subscribe-mode constraint (§9): a connection that has issued
//! `subscribe` must not be reused for other commands. This trait therefore
//! splits subscription into its own narrow trait, `EventSubscriber`, which
//! callers obtain via [`KeyValueStore::subscribe`] as a *separate* handle
//! rather than a mode switch on the same object.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::LexResult;

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> LexResult<Option<String>>;

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> LexResult<()>;

    /// Create `key` with `value` only if absent, with `ttl`. Returns `true`
    /// iff this call created it (i.e. won the race).
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> LexResult<bool>;

    /// Atomically increment a counter, creating it at 1 if absent. Returns
    /// the post-increment value.
    async fn incr(&self, key: &str) -> LexResult<i64>;

    async fn expire(&self, key: &str, ttl: Duration) -> LexResult<()>;

    async fn delete(&self, key: &str) -> LexResult<()>;

    /// Publish a raw string payload on `channel`. Fire-and-forget: failures
    /// are the caller's to log and drop (§4.8, §7).
    async fn publish(&self, channel: &str, payload: &str) -> LexResult<()>;

    /// Acquire a dedicated subscription handle. This opens the second,
    /// subscribe-only connection the store requires (§6, §9) — it must not
    /// be used for `get`/`set`/etc.
    async fn subscribe(&self, channels: &[&str]) -> LexResult<Box<dyn EventSubscriber>>;

    async fn ping(&self) -> LexResult<()>;
}

#[async_trait]
pub trait EventSubscriber: Send {
    /// Block until the next message arrives on any subscribed channel, or
    /// `None` if the subscription has been closed.
    async fn next_message(&mut self) -> LexResult<Option<(String, String)>>;
}
