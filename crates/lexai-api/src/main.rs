//! `lexai-api`: boots config + tracing, connects to the stores, runs the
//! admission HTTP surface, owns the WebSocket hub, and runs the pub/sub
//! subscriber loop that bridges worker-side publishes into it (§4.8, §4.9).

mod auth;
mod http_error;
mod routes;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use lexai_core::admission::AdmissionService;
use lexai_core::config::CoreConfig;
use lexai_core::ports::{DocumentStore, JobQueue, KeyValueStore};
use lexai_core::store::{MongoDocumentStore, RedisKeyValueStore};
use lexai_integrations::LapinJobQueue;
use lexai_ws::{HubState, WsHub};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use auth::DevTokenVerifier;
use state::AppState;

#[derive(Parser, Debug)]
#[command(name = "lexai-api", about = "LexAI admission API and WebSocket hub")]
struct Cli {
    #[arg(long, env = "LEXAI_API_PORT", default_value_t = 8080)]
    port: u16,

    #[arg(long, env = "LEXAI_LOG_FORMAT", default_value = "pretty")]
    log_format: String,
}

/// Server-imposed request deadline (§5).
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing(&cli.log_format);

    let config = CoreConfig::from_env();

    let documents: Arc<dyn DocumentStore> =
        Arc::new(MongoDocumentStore::connect(&config.mongo_uri, &config.mongo_db).await?);
    let kv: Arc<dyn KeyValueStore> = Arc::new(RedisKeyValueStore::connect(&config.redis_url).await?);
    let queue: Arc<dyn JobQueue> = Arc::new(LapinJobQueue::connect(&config.amqp_url).await?);

    let admission = Arc::new(AdmissionService::new(documents, kv.clone(), queue, config.lock_ttl));
    let hub = WsHub::new();

    tokio::spawn(lexai_ws::run_bridge(kv.clone(), hub.clone()));

    let app_state = AppState {
        admission,
        hub: hub.clone(),
    };

    let hub_state = HubState {
        hub: hub.clone(),
        verifier: Arc::new(DevTokenVerifier),
    };

    let ws_router = axum::Router::new()
        .route("/ws", axum::routing::get(lexai_ws::upgrade))
        .with_state(hub_state);

    let app = routes::router(app_state)
        .merge(ws_router)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT));

    let addr = SocketAddr::from(([0, 0, 0, 0], cli.port));
    tracing::info!(%addr, "lexai-api listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

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
