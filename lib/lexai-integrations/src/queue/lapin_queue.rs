//! AMQP-backed [`JobQueue`] (§4.5, §6).
//!
//! Declares the DLX topology described in §6: a direct exchange
//! `lexai.dlx`, a dead-letter queue `lexai.analysis.dlq` bound on routing
//! key `analysis.failed`, and the main `analysis`/`alert` queues configured
//! with `x-dead-letter-exchange`/`x-dead-letter-routing-key` pointing at it.
//! A supervisor task watches the connection and reconnects with capped
//! exponential backoff, re-declaring topology before resuming (§4.5).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions,
    ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind};
use lexai_core::domain::events::queues;
use lexai_core::error::{LexError, LexResult};
use lexai_core::ports::job_queue::{Consumer, Delivery, JobQueue};
use tokio::sync::RwLock;
use tracing::{info, warn};

const RECONNECT_POLL_INTERVAL: Duration = Duration::from_secs(2);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

pub struct LapinJobQueue {
    url: String,
    connection: Arc<RwLock<Connection>>,
}

impl LapinJobQueue {
    pub async fn connect(url: &str) -> LexResult<Self> {
        let connection = connect_with_backoff(url).await;
        declare_topology(&connection).await?;
        let queue = Self {
            url: url.to_string(),
            connection: Arc::new(RwLock::new(connection)),
        };
        queue.spawn_supervisor();
        Ok(queue)
    }

    fn spawn_supervisor(&self) {
        let url = self.url.clone();
        let connection = self.connection.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(RECONNECT_POLL_INTERVAL).await;
                let is_connected = connection.read().await.status().connected();
                if is_connected {
                    continue;
                }
                warn!("amqp connection lost, reconnecting");
                let fresh = connect_with_backoff(&url).await;
                if let Err(err) = declare_topology(&fresh).await {
                    warn!(error = %err, "failed to redeclare topology after reconnect, will retry");
                    continue;
                }
                *connection.write().await = fresh;
                info!("amqp connection and topology restored");
            }
        });
    }

    async fn channel(&self) -> LexResult<Channel> {
        self.connection
            .read()
            .await
            .create_channel()
            .await
            .map_err(|e| LexError::InfrastructureDown(format!("amqp channel: {e}")))
    }
}

async fn connect_with_backoff(url: &str) -> Connection {
    let mut backoff = Duration::from_secs(1);
    loop {
        match Connection::connect(url, ConnectionProperties::default()).await {
            Ok(conn) => return conn,
            Err(err) => {
                warn!(error = %err, backoff_secs = backoff.as_secs(), "amqp connect failed, retrying");
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(MAX_BACKOFF);
            }
        }
    }
}

async fn declare_topology(connection: &Connection) -> LexResult<()> {
    let channel = connection
        .create_channel()
        .await
        .map_err(|e| LexError::InfrastructureDown(format!("amqp channel: {e}")))?;

    channel
        .exchange_declare(
            queues::DLX_EXCHANGE,
            ExchangeKind::Direct,
            ExchangeDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await
        .map_err(|e| LexError::InfrastructureDown(format!("declare dlx exchange: {e}")))?;

    channel
        .queue_declare(
            queues::ANALYSIS_DLQ,
            QueueDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await
        .map_err(|e| LexError::InfrastructureDown(format!("declare dlq: {e}")))?;

    channel
        .queue_bind(
            queues::ANALYSIS_DLQ,
            queues::DLX_EXCHANGE,
            queues::ANALYSIS_FAILED_ROUTING_KEY,
            QueueBindOptions::default(),
            FieldTable::default(),
        )
        .await
        .map_err(|e| LexError::InfrastructureDown(format!("bind dlq: {e}")))?;

    let mut analysis_args = FieldTable::default();
    analysis_args.insert(
        "x-dead-letter-exchange".into(),
        queues::DLX_EXCHANGE.into(),
    );
    analysis_args.insert(
        "x-dead-letter-routing-key".into(),
        queues::ANALYSIS_FAILED_ROUTING_KEY.into(),
    );
    channel
        .queue_declare(
            queues::ANALYSIS,
            QueueDeclareOptions {
                durable: true,
                ..Default::default()
            },
            analysis_args,
        )
        .await
        .map_err(|e| LexError::InfrastructureDown(format!("declare analysis queue: {e}")))?;

    channel
        .queue_declare(
            queues::ALERT,
            QueueDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await
        .map_err(|e| LexError::InfrastructureDown(format!("declare alert queue: {e}")))?;

    Ok(())
}

#[async_trait]
impl JobQueue for LapinJobQueue {
    async fn publish(&self, queue: &str, payload: &[u8]) -> LexResult<()> {
        let channel = self.channel().await?;
        channel
            .basic_publish(
                "",
                queue,
                BasicPublishOptions::default(),
                payload,
                BasicProperties::default().with_delivery_mode(2), // persistent
            )
            .await
            .map_err(|e| LexError::TransientUpstream(format!("amqp publish: {e}")))?
            .await
            .map_err(|e| LexError::TransientUpstream(format!("amqp publish confirm: {e}")))?;
        Ok(())
    }

    async fn consume(&self, queue: &str, consumer_tag: &str) -> LexResult<Box<dyn Consumer>> {
        let channel = self.channel().await?;
        channel
            .basic_qos(1, lapin::options::BasicQosOptions::default())
            .await
            .map_err(|e| LexError::InfrastructureDown(format!("amqp qos: {e}")))?;

        let consumer = channel
            .basic_consume(
                queue,
                consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| LexError::InfrastructureDown(format!("amqp consume: {e}")))?;

        Ok(Box::new(LapinConsumer { consumer }))
    }
}

struct LapinConsumer {
    consumer: lapin::Consumer,
}

#[async_trait]
impl Consumer for LapinConsumer {
    async fn next(&mut self) -> LexResult<Option<Box<dyn Delivery>>> {
        use futures::StreamExt;
        match self.consumer.next().await {
            Some(Ok(delivery)) => Ok(Some(Box::new(LapinDelivery { delivery }))),
            Some(Err(err)) => Err(LexError::InfrastructureDown(format!("amqp delivery: {err}"))),
            None => Ok(None),
        }
    }
}

struct LapinDelivery {
    delivery: lapin::message::Delivery,
}

#[async_trait]
impl Delivery for LapinDelivery {
    fn payload(&self) -> &[u8] {
        &self.delivery.data
    }

    async fn ack(self: Box<Self>) -> LexResult<()> {
        self.delivery
            .ack(BasicAckOptions::default())
            .await
            .map_err(|e| LexError::InfrastructureDown(format!("amqp ack: {e}")))
    }

    async fn nack_no_requeue(self: Box<Self>) -> LexResult<()> {
        self.delivery
            .nack(BasicNackOptions {
                requeue: false,
                ..Default::default()
            })
            .await
            .map_err(|e| LexError::InfrastructureDown(format!("amqp nack: {e}")))
    }
}
