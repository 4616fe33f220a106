//! Integration tests for the Omni Pipeline
//!
//! Exercises the Coordinator end-to-end with scripted source clients and
//! the in-memory store: run lifecycle, duplicate suppression, admission
//! control, partial-source tolerance, and cooperative stop.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use omni_pipeline::{
    AppResult, Coordinator, ErrorCode, Evaluation, Governor, MemoryStore, OverridePolicy,
    PipelineConfig, PipelineTelemetry, ProcessingState, RiskThresholds, RunStatus, RunTrigger,
    SourceAggregator, SourceClient, SourceKind, SourcePayload, SourceResult, Token, TokenMarket,
    TraderEvaluator, TraderFlow, TraderProfile,
};
use omni_pipeline::models::TraceDetail;
use omni_pipeline::store::EvaluationStore;

// ============================================
// Scripted source client
// ============================================

/// A source that answers after a fixed delay, tracking peak concurrency
struct ScriptedSource {
    kind: SourceKind,
    fail: bool,
    delay: Duration,
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedSource {
    fn new(kind: SourceKind, fail: bool, delay: Duration) -> Self {
        Self {
            kind,
            fail,
            delay,
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn payload(&self) -> SourcePayload {
        match self.kind {
            SourceKind::Bullx => SourcePayload::TraderFlows(vec![TraderFlow {
                wallet: "wallet_1".to_string(),
                total_bought_usd: 1_000.0,
                total_sold_usd: 2_000.0,
                buy_transactions: 5,
                sell_transactions: 4,
                holding_amount: 10.0,
            }]),
            SourceKind::Gmgn => SourcePayload::TraderBehavior(vec![TraderProfile {
                wallet: "wallet_1".to_string(),
                tags: vec![],
                winrate: 0.65,
                pnl_pct_7d: 0.2,
                pnl_pct_30d: 1.1,
                realized_profit_7d: 3_000.0,
                realized_profit_30d: 9_000.0,
                top_roi: Some(0.5),
                no_buy_hold_ratio: 0.1,
                fast_tx_ratio: 0.05,
                sell_pass_buy_ratio: 0.02,
            }]),
            SourceKind::DexScreener => SourcePayload::TokenMarket(TokenMarket {
                name: Some("Test Token".to_string()),
                symbol: Some("TST".to_string()),
                price_usd: Some(0.01),
                liquidity_usd: 25_000.0,
                volume_24h: 90_000.0,
            }),
        }
    }
}

#[async_trait]
impl SourceClient for ScriptedSource {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    async fn fetch(&self, token_address: &str) -> SourceResult {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        tokio::time::sleep(self.delay).await;
        self.current.fetch_sub(1, Ordering::SeqCst);

        if self.fail {
            SourceResult::error(token_address, self.kind, "scripted failure", 3)
        } else {
            SourceResult::ok(token_address, self.kind, self.payload(), 1)
        }
    }
}

// ============================================
// Harness
// ============================================

struct Harness {
    coordinator: Coordinator,
    store: Arc<MemoryStore>,
    bullx: Arc<ScriptedSource>,
}

fn build_harness(
    tokens: &[&str],
    max_concurrency: usize,
    fail_sources: &[SourceKind],
    delay: Duration,
) -> Harness {
    let store = Arc::new(MemoryStore::new());
    for address in tokens {
        store.add_token(Token::new(*address, None));
    }

    let bullx = Arc::new(ScriptedSource::new(
        SourceKind::Bullx,
        fail_sources.contains(&SourceKind::Bullx),
        delay,
    ));
    let clients: Vec<Arc<dyn SourceClient>> = vec![
        bullx.clone(),
        Arc::new(ScriptedSource::new(
            SourceKind::Gmgn,
            fail_sources.contains(&SourceKind::Gmgn),
            delay,
        )),
        Arc::new(ScriptedSource::new(
            SourceKind::DexScreener,
            fail_sources.contains(&SourceKind::DexScreener),
            delay,
        )),
    ];

    let telemetry = Arc::new(PipelineTelemetry::new());
    let coordinator = Coordinator::new(
        SourceAggregator::new(clients),
        TraderEvaluator::new(
            TraderEvaluator::default_rules(),
            RiskThresholds::default(),
            OverridePolicy::FirstWins,
        ),
        Governor::new(max_concurrency),
        store.clone(),
        store.clone(),
        telemetry,
    );

    Harness {
        coordinator,
        store,
        bullx,
    }
}

/// Poll until the current run leaves `Running`, with a hard deadline
async fn wait_for_run_end(coordinator: &Coordinator) -> RunStatus {
    for _ in 0..500 {
        if let Some(snapshot) = coordinator.status() {
            if snapshot.status != RunStatus::Running {
                return snapshot.status;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("run did not finish within the deadline");
}

// ============================================
// Run lifecycle
// ============================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_full_run_completes_all_tokens() {
    let harness = build_harness(&["tok_a", "tok_b", "tok_c"], 2, &[], Duration::from_millis(30));

    harness.coordinator.start(RunTrigger::Manual).unwrap();
    let status = wait_for_run_end(&harness.coordinator).await;
    assert_eq!(status, RunStatus::Completed);

    let snapshot = harness.coordinator.status().unwrap();
    assert_eq!(snapshot.attempted, 3);
    assert_eq!(snapshot.succeeded, 3);
    assert_eq!(snapshot.failed, 0);
    for address in ["tok_a", "tok_b", "tok_c"] {
        assert_eq!(
            snapshot.token_states[address],
            ProcessingState::Completed,
            "{} should be completed",
            address
        );
        let token = harness.store.load_token(address).await.unwrap().unwrap();
        assert_eq!(token.state, ProcessingState::Completed);
        assert!(token.last_processed_at.is_some());
    }

    // Flow and behavior records merge on wallet_1: one evaluation per token
    assert_eq!(harness.store.evaluation_count(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_second_start_rejected_while_running() {
    let harness = build_harness(&["tok_a", "tok_b"], 1, &[], Duration::from_millis(100));

    let first = harness.coordinator.start(RunTrigger::Scheduled).unwrap();
    let err = harness.coordinator.start(RunTrigger::Manual).unwrap_err();
    assert_eq!(err.code, ErrorCode::AlreadyRunning);

    // The rejected trigger must not have replaced the run
    assert_eq!(harness.coordinator.status().unwrap().run_id, first);

    wait_for_run_end(&harness.coordinator).await;

    // After completion a new run is accepted
    let second = harness.coordinator.start(RunTrigger::Manual).unwrap();
    assert_ne!(first, second);
    wait_for_run_end(&harness.coordinator).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_governor_cap_respected_under_burst() {
    // 10x the cap submitted at once; the per-source peak equals token
    // concurrency because every worker calls each source exactly once
    const CAP: usize = 2;
    let tokens: Vec<String> = (0..CAP * 10).map(|i| format!("tok_{}", i)).collect();
    let refs: Vec<&str> = tokens.iter().map(|s| s.as_str()).collect();
    let harness = build_harness(&refs, CAP, &[], Duration::from_millis(20));

    harness.coordinator.start(RunTrigger::Manual).unwrap();
    let status = wait_for_run_end(&harness.coordinator).await;

    assert_eq!(status, RunStatus::Completed);
    assert!(
        harness.bullx.peak_concurrency() <= CAP,
        "peak {} exceeded cap {}",
        harness.bullx.peak_concurrency(),
        CAP
    );
    // With 20 queued tokens the cap is also actually reached
    assert_eq!(harness.bullx.peak_concurrency(), CAP);
    let snapshot = harness.coordinator.status().unwrap();
    assert_eq!(snapshot.succeeded as usize, CAP * 10);
}

// ============================================
// Failure tolerance
// ============================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_all_sources_failing_marks_token_failed() {
    let harness = build_harness(
        &["tok_dead"],
        2,
        &[SourceKind::Bullx, SourceKind::Gmgn, SourceKind::DexScreener],
        Duration::from_millis(10),
    );

    harness.coordinator.start(RunTrigger::Manual).unwrap();
    let status = wait_for_run_end(&harness.coordinator).await;

    // One token failing never fails the run itself
    assert_eq!(status, RunStatus::Completed);
    let snapshot = harness.coordinator.status().unwrap();
    assert_eq!(snapshot.failed, 1);
    assert_eq!(snapshot.succeeded, 0);

    let token = harness.store.load_token("tok_dead").await.unwrap().unwrap();
    assert_eq!(token.state, ProcessingState::Failed);
    assert!(token.last_error.as_deref().unwrap().contains("SRC_DATA_INSUFFICIENT"));
    assert_eq!(harness.store.evaluation_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_partial_sources_still_evaluate_with_skips() {
    // Behavior source down: flow metrics present, behavior metrics absent
    let harness = build_harness(
        &["tok_partial"],
        2,
        &[SourceKind::Gmgn],
        Duration::from_millis(10),
    );

    harness.coordinator.start(RunTrigger::Manual).unwrap();
    let status = wait_for_run_end(&harness.coordinator).await;
    assert_eq!(status, RunStatus::Completed);

    let token = harness
        .store
        .load_token("tok_partial")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(token.state, ProcessingState::Completed);

    let evaluations: Vec<Evaluation> = harness.store.evaluations_for("tok_partial");
    assert!(!evaluations.is_empty());
    // Rules needing behavior metrics are recorded as skipped, not errors
    let has_skip = evaluations[0]
        .trace
        .iter()
        .any(|entry| matches!(entry.detail, TraceDetail::Skipped { .. }));
    assert!(has_skip, "expected skipped rule-trace entries");
}

// ============================================
// Cooperative stop
// ============================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_stop_leaves_no_token_in_progress() {
    let tokens = ["t0", "t1", "t2", "t3", "t4", "t5"];
    let harness = build_harness(&tokens, 2, &[], Duration::from_millis(300));

    harness.coordinator.start(RunTrigger::Manual).unwrap();

    // Let the first wave finish, catch the second wave mid-fetch
    tokio::time::sleep(Duration::from_millis(450)).await;
    harness.coordinator.stop().unwrap();

    let status = wait_for_run_end(&harness.coordinator).await;
    assert_eq!(status, RunStatus::Stopped);

    let snapshot = harness.coordinator.status().unwrap();
    for (address, state) in &snapshot.token_states {
        assert_ne!(
            *state,
            ProcessingState::InProgress,
            "{} left in progress after stop",
            address
        );
    }

    // Completed stay completed, interrupted and never-started are pending
    let mut completed = 0;
    let mut pending = 0;
    for address in tokens {
        let token = harness.store.load_token(address).await.unwrap().unwrap();
        match token.state {
            ProcessingState::Completed => completed += 1,
            ProcessingState::Pending => pending += 1,
            other => panic!("{} in unexpected state {:?}", address, other),
        }
    }
    assert!(completed >= 1, "first wave should have completed");
    assert!(pending >= 1, "later tokens should remain pending");

    // A stopped coordinator accepts a fresh run
    harness.coordinator.start(RunTrigger::Manual).unwrap();
    let status = wait_for_run_end(&harness.coordinator).await;
    assert_eq!(status, RunStatus::Completed);
}

#[tokio::test]
async fn test_stop_without_run_is_rejected() {
    let harness = build_harness(&[], 2, &[], Duration::from_millis(10));
    let err = harness.coordinator.stop().unwrap_err();
    assert_eq!(err.code, ErrorCode::NoActiveRun);
}

// ============================================
// Manual single-token path
// ============================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_process_token_returns_evaluations() {
    let harness = build_harness(&["tok_manual"], 2, &[], Duration::from_millis(10));

    let evaluations = harness.coordinator.process_token("tok_manual").await.unwrap();
    assert!(!evaluations.is_empty());
    assert!(evaluations.iter().all(|e| e.token_address == "tok_manual"));

    let token = harness
        .store
        .load_token("tok_manual")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(token.state, ProcessingState::Completed);
}

#[tokio::test]
async fn test_process_token_unknown_address() {
    let harness = build_harness(&[], 2, &[], Duration::from_millis(10));
    let err = harness.coordinator.process_token("nope").await.unwrap_err();
    assert_eq!(err.code, ErrorCode::TokenNotFound);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_process_token_insufficient_data() {
    let harness = build_harness(
        &["tok_dark"],
        2,
        &[SourceKind::Bullx, SourceKind::Gmgn, SourceKind::DexScreener],
        Duration::from_millis(10),
    );

    let err = harness.coordinator.process_token("tok_dark").await.unwrap_err();
    assert_eq!(err.code, ErrorCode::SourceDataInsufficient);

    let token = harness.store.load_token("tok_dark").await.unwrap().unwrap();
    assert_eq!(token.state, ProcessingState::Failed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_duplicate_manual_processing_rejected() {
    let harness = build_harness(&["tok_busy"], 2, &[], Duration::from_millis(300));

    let coordinator = harness.coordinator.clone();
    let first = tokio::spawn(async move { coordinator.process_token("tok_busy").await });

    // Give the first request time to claim the token
    tokio::time::sleep(Duration::from_millis(100)).await;
    let err = harness.coordinator.process_token("tok_busy").await.unwrap_err();
    assert_eq!(err.code, ErrorCode::TokenInFlight);

    assert!(first.await.unwrap().is_ok());
}

// ============================================
// Fatal persistence failure
// ============================================

/// Store that accepts state updates but refuses evaluations
struct BrokenStore {
    inner: MemoryStore,
}

#[async_trait]
impl EvaluationStore for BrokenStore {
    async fn save_evaluation(&self, _evaluation: &Evaluation) -> AppResult<()> {
        Err(omni_pipeline::AppError::store_unavailable(
            "evaluation store offline",
        ))
    }

    async fn update_token_state(
        &self,
        address: &str,
        state: ProcessingState,
        error: Option<String>,
    ) -> AppResult<()> {
        self.inner.update_token_state(address, state, error).await
    }

    async fn load_token(&self, address: &str) -> AppResult<Option<Token>> {
        self.inner.load_token(address).await
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_store_failure_fails_the_run() {
    let discovery = Arc::new(MemoryStore::new());
    discovery.add_token(Token::new("tok_a", None));
    discovery.add_token(Token::new("tok_b", None));

    let clients: Vec<Arc<dyn SourceClient>> = vec![
        Arc::new(ScriptedSource::new(
            SourceKind::Bullx,
            false,
            Duration::from_millis(10),
        )),
        Arc::new(ScriptedSource::new(
            SourceKind::Gmgn,
            false,
            Duration::from_millis(10),
        )),
    ];

    let coordinator = Coordinator::new(
        SourceAggregator::new(clients),
        TraderEvaluator::from_config(&PipelineConfig::default()),
        Governor::new(2),
        discovery.clone(),
        Arc::new(BrokenStore {
            inner: MemoryStore::new(),
        }),
        Arc::new(PipelineTelemetry::new()),
    );

    coordinator.start(RunTrigger::Manual).unwrap();
    let status = wait_for_run_end(&coordinator).await;
    assert_eq!(status, RunStatus::Failed);
}
