//! Redis-backed [`KeyValueStore`] (§6, §9).
//!
//! Two independent connections are required by the subscribe-mode
//! constraint: [`RedisKeyValueStore`] holds a multiplexed command
//! connection for `get`/`set`/`incr`/etc, while [`subscribe`] opens a fresh,
//! dedicated `PubSub` connection per call — that connection is never reused
//! for commands, matching the design note in §9.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use crate::error::{LexError, LexResult};
use crate::ports::kv_store::{EventSubscriber, KeyValueStore};

pub struct RedisKeyValueStore {
    client: redis::Client,
    conn: ConnectionManager,
}

impl RedisKeyValueStore {
    pub async fn connect(url: &str) -> LexResult<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| LexError::InfrastructureDown(format!("redis client: {e}")))?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(|e| LexError::InfrastructureDown(format!("redis connect: {e}")))?;
        Ok(Self { client, conn })
    }

    fn io_err(context: &str, e: impl std::fmt::Display) -> LexError {
        LexError::InfrastructureDown(format!("{context}: {e}"))
    }
}

#[async_trait]
impl KeyValueStore for RedisKeyValueStore {
    async fn get(&self, key: &str) -> LexResult<Option<String>> {
        let mut conn = self.conn.clone();
        conn.get(key).await.map_err(|e| Self::io_err("get", e))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> LexResult<()> {
        let mut conn = self.conn.clone();
        match ttl {
            Some(ttl) => {
                let _: () = conn
                    .set_ex(key, value, ttl.as_secs().max(1))
                    .await
                    .map_err(|e| Self::io_err("set_ex", e))?;
            }
            None => {
                let _: () = conn.set(key, value).await.map_err(|e| Self::io_err("set", e))?;
            }
        }
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> LexResult<bool> {
        let mut conn = self.conn.clone();
        let created: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async(&mut conn)
            .await
            .map_err(|e| Self::io_err("set_if_absent", e))?;
        Ok(created.is_some())
    }

    async fn incr(&self, key: &str) -> LexResult<i64> {
        let mut conn = self.conn.clone();
        conn.incr(key, 1).await.map_err(|e| Self::io_err("incr", e))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> LexResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .expire(key, ttl.as_secs().max(1) as i64)
            .await
            .map_err(|e| Self::io_err("expire", e))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> LexResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(key).await.map_err(|e| Self::io_err("delete", e))?;
        Ok(())
    }

    async fn publish(&self, channel: &str, payload: &str) -> LexResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .publish(channel, payload)
            .await
            .map_err(|e| Self::io_err("publish", e))?;
        Ok(())
    }

    async fn subscribe(&self, channels: &[&str]) -> LexResult<Box<dyn EventSubscriber>> {
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| Self::io_err("subscribe connect", e))?;
        for channel in channels {
            pubsub
                .subscribe(*channel)
                .await
                .map_err(|e| Self::io_err("subscribe", e))?;
        }
        Ok(Box::new(RedisSubscriber { pubsub }))
    }

    async fn ping(&self) -> LexResult<()> {
        let mut conn = self.conn.clone();
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(|e| Self::io_err("ping", e))?;
        Ok(())
    }
}

struct RedisSubscriber {
    pubsub: redis::aio::PubSub,
}

#[async_trait]
impl EventSubscriber for RedisSubscriber {
    async fn next_message(&mut self) -> LexResult<Option<(String, String)>> {
        use futures::StreamExt;
        match self.pubsub.on_message().next().await {
            Some(msg) => {
                let channel = msg.get_channel_name().to_string();
                let payload: String = msg
                    .get_payload()
                    .map_err(|e| LexError::InfrastructureDown(format!("payload decode: {e}")))?;
                Ok(Some((channel, payload)))
            }
            None => Ok(None),
        }
    }
}
