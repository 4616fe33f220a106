//! Omni Pipeline - Multi-source token processing daemon
//!
//! Pulls pending tokens, enriches each one from BullX, GMGN, and
//! DexScreener, scores the traders behind it, and records the results.
//! Runs on a daily schedule; Ctrl+C shuts down gracefully.

use omni_pipeline::{
    default_clients, Coordinator, Governor, MemoryStore, PipelineConfig, PipelineTelemetry,
    Scheduler, SourceAggregator, TraderEvaluator,
};

use eyre::{eyre, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();

    println!(
        r#"
    ============================================================
       O M N I   P I P E L I N E   v{}
       Multi-Source Token Processing & Trader Evaluation
    ============================================================
    "#,
        env!("CARGO_PKG_VERSION")
    );

    // Load configuration
    let config = PipelineConfig::default();
    info!(
        max_concurrency = config.max_concurrency,
        schedule = %config.schedule_cron,
        retries = config.per_source_retries,
        "configuration loaded"
    );

    // Shared telemetry and store
    let telemetry = Arc::new(PipelineTelemetry::new());
    let store = Arc::new(MemoryStore::new());

    // Seed the token list if one is present
    let tokens_file =
        std::env::var("OMNI_TOKENS_FILE").unwrap_or_else(|_| "tokens.txt".to_string());
    if std::path::Path::new(&tokens_file).exists() {
        match store.load_tokens_file(&tokens_file) {
            Ok(count) => info!(file = %tokens_file, count, "token list seeded"),
            Err(e) => warn!(file = %tokens_file, error = %e, "token list load failed"),
        }
    } else {
        warn!(file = %tokens_file, "no token list found, waiting for manual additions");
    }

    // Wire the pipeline
    let clients = default_clients(&config, telemetry.clone());
    let coordinator = Coordinator::new(
        SourceAggregator::new(clients),
        TraderEvaluator::from_config(&config),
        Governor::new(config.max_concurrency),
        store.clone(),
        store.clone(),
        telemetry.clone(),
    );

    let scheduler = Scheduler::new(coordinator.clone(), &config.schedule_cron)
        .map_err(|e| eyre!("invalid schedule: {}", e))?;
    let shutdown = CancellationToken::new();

    // Run scheduler with graceful shutdown on Ctrl+C
    tokio::select! {
        _ = scheduler.run(shutdown.clone()) => {}
        _ = tokio::signal::ctrl_c() => {
            println!("\n🛑 Shutting down gracefully...");
            shutdown.cancel();

            // Stop an active run, if any, and let workers drain
            if coordinator.stop().is_ok() {
                info!("waiting for in-flight workers to drain");
                while coordinator
                    .status()
                    .map(|s| s.status == omni_pipeline::RunStatus::Running)
                    .unwrap_or(false)
                {
                    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
                }
            }

            // Final statistics
            let stats = telemetry.stats();
            println!("\n📊 Final Statistics:");
            println!("   Tokens processed:  {}", stats.tokens_processed);
            println!("   Tokens failed:     {}", stats.tokens_failed);
            println!("   Evaluations:       {}", stats.evaluations_written);
            println!(
                "   Verdicts:          {} pass / {} flag / {} reject",
                stats.verdict_pass, stats.verdict_flag, stats.verdict_reject
            );
            for (source, counters) in &stats.sources {
                println!(
                    "   {:<12} {} attempts, {} ok, {} failed, avg {:.0}ms",
                    source,
                    counters.attempts,
                    counters.successes,
                    counters.failures,
                    counters.avg_latency_ms
                );
            }
        }
    }

    Ok(())
}
