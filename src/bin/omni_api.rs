//! Omni Pipeline Cloud API Server
//!
//! REST glue over the processing Coordinator.
//!
//! Usage:
//!   cargo run --bin omni_api
//!
//! Environment:
//!   OMNI_PORT - Server port (default: 8080)
//!   OMNI_HOST - Server host (default: 0.0.0.0)
//!   RUST_LOG  - Log level (default: info)

use omni_pipeline::api::{create_router, handlers::AppState};
use omni_pipeline::{
    BullxClient, Coordinator, DexScreenerClient, GmgnClient, Governor, MemoryStore,
    PipelineConfig, PipelineTelemetry, RetryPolicy, SourceAggregator, SourceClient,
    TraderEvaluator,
};

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    // Initialize logging
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .compact()
        .init();

    let config = PipelineConfig::default();
    let telemetry = Arc::new(PipelineTelemetry::new());
    let store = Arc::new(MemoryStore::new());

    // The market client is shared between the aggregator and the
    // add-token name lookup, so both draw from one rate bucket
    let policy = RetryPolicy::new(config.per_source_retries, config.per_source_timeout);
    let market = Arc::new(DexScreenerClient::new(
        &config.dexscreener,
        policy,
        telemetry.clone(),
    ));
    let clients: Vec<Arc<dyn SourceClient>> = vec![
        Arc::new(BullxClient::new(&config.bullx, policy, telemetry.clone())),
        Arc::new(GmgnClient::new(&config.gmgn, policy, telemetry.clone())),
        market.clone(),
    ];

    let coordinator = Coordinator::new(
        SourceAggregator::new(clients),
        TraderEvaluator::from_config(&config),
        Governor::new(config.max_concurrency),
        store.clone(),
        store.clone(),
        telemetry.clone(),
    );

    let state = Arc::new(AppState {
        coordinator,
        registry: store,
        market,
        telemetry,
        start_time: Instant::now(),
    });

    let app = create_router(state);

    // Railway-style PORT fallback for hosted deploys
    let host = std::env::var("OMNI_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = std::env::var("PORT")
        .or_else(|_| std::env::var("OMNI_PORT"))
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080);

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;

    info!("🚀 Omni Pipeline API starting on http://{}", addr);
    info!("");
    info!("Endpoints:");
    info!("  POST /v1/processing/start   - Start a processing run");
    info!("  POST /v1/processing/stop    - Stop the active run");
    info!("  GET  /v1/processing/status  - Run snapshot");
    info!("  POST /v1/tokens             - Add a token to the watchlist");
    info!("  POST /v1/tokens/process     - Process one token on demand");
    info!("  GET  /v1/stats              - Pipeline statistics");
    info!("  GET  /v1/health             - Health check");
    info!("");
    info!("Press Ctrl+C for graceful shutdown");

    let listener = TcpListener::bind(addr).await?;

    let shutdown_signal = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    info!("👋 Omni Pipeline API shutdown complete");

    Ok(())
}
