//! `lexai-worker`: boots config + tracing, connects to the stores/queue,
//! and runs the analysis consumer loops, the alert consumer, and the daily
//! expiry scheduler side by side.

mod alert_worker;
mod consumer;
mod diff_worker;
mod scheduler;

use std::sync::Arc;

use clap::Parser;
use lexai_core::config::CoreConfig;
use lexai_core::lock::SingleFlightLock;
use lexai_core::ports::{DocumentStore, JobQueue, KeyValueStore};
use lexai_core::store::{MongoDocumentStore, RedisKeyValueStore};
use lexai_integrations::{LapinJobQueue, ModelChainConfig, ModelClient, NoopTenantDirectory, ReqwestEmailTransport, ReqwestModelClient};

use alert_worker::AlertWorker;
use consumer::AnalysisConsumer;
use scheduler::ExpiryScheduler;

/// Command-line overrides for the environment-derived configuration
/// (§2 supplemented features); every flag mirrors a `LEXAI_*` env var and
/// wins over it when set.
#[derive(Parser, Debug)]
#[command(name = "lexai-worker", about = "LexAI analysis/alert/scheduler worker")]
struct Cli {
    #[arg(long, env = "LEXAI_WORKER_CONCURRENCY")]
    concurrency: Option<usize>,

    #[arg(long, env = "LEXAI_LOG_FORMAT", default_value = "pretty")]
    log_format: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing(&cli.log_format);

    let config = CoreConfig::from_env();
    let concurrency = cli.concurrency.unwrap_or(config.worker_concurrency);

    let documents: Arc<dyn DocumentStore> =
        Arc::new(MongoDocumentStore::connect(&config.mongo_uri, &config.mongo_db).await?);
    let kv: Arc<dyn KeyValueStore> = Arc::new(RedisKeyValueStore::connect(&config.redis_url).await?);
    let queue: Arc<dyn JobQueue> = Arc::new(LapinJobQueue::connect(&config.amqp_url).await?);
    let model: Arc<dyn ModelClient> = Arc::new(ReqwestModelClient::new(ModelChainConfig::from_env()));
    let email = Arc::new(lexai_integrations::BoundedRetryDispatcher::new(Arc::new(
        ReqwestEmailTransport::from_env(),
    )));
    let directory = Arc::new(NoopTenantDirectory);

    let analysis_consumer = Arc::new(AnalysisConsumer {
        documents: documents.clone(),
        kv: kv.clone(),
        queue: queue.clone(),
        model,
        lock: SingleFlightLock::new(kv.clone()),
        cache_ttl: config.cache_ttl,
        max_retries: config.max_retries,
    });

    let alert_worker = AlertWorker {
        queue: queue.clone(),
        kv: kv.clone(),
        directory,
        email,
    };

    let scheduler = ExpiryScheduler {
        documents: documents.clone(),
        queue: queue.clone(),
    };

    tracing::info!(concurrency, "lexai-worker starting");

    let analysis_task = tokio::spawn(async move { analysis_consumer.run(concurrency).await });
    let alert_task = tokio::spawn(async move { alert_worker.run().await });
    let scheduler_task = tokio::spawn(async move { scheduler.run().await });

    tokio::select! {
        _ = analysis_task => tracing::error!("analysis consumer task exited unexpectedly"),
        _ = alert_task => tracing::error!("alert consumer task exited unexpectedly"),
        _ = scheduler_task => tracing::error!("scheduler task exited unexpectedly"),
        _ = shutdown_signal() => tracing::info!("shutdown signal received, draining"),
    }

    Ok(())
}

/// SIGINT/SIGTERM handling (§5): stop accepting new work and let in-flight
/// consumer iterations finish best-effort; the process is force-killed by
/// the supervisor after 30s if it hasn't exited by then.
async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

fn init_tracing(format: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}
