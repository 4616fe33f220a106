//! Processing Coordinator
//! Owns the run lifecycle and drives every token through
//! aggregation -> evaluation -> persistence.
//!
//! One Coordinator owns at most one active run. The in-flight set keyed by
//! token address guarantees a token is never processed twice concurrently,
//! whether work arrives from the scheduler or from manual requests.
//! Cancellation is cooperative: workers observe the run's cancellation
//! token at task boundaries, never mid-fetch.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::future::join_all;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::aggregator::SourceAggregator;
use crate::evaluator::TraderEvaluator;
use crate::governor::Governor;
use crate::models::{
    AppError, AppResult, Evaluation, ProcessingState, RunSnapshot, RunStatus, RunTrigger, Token,
};
use crate::store::{EvaluationStore, TokenDiscovery};
use crate::telemetry::PipelineTelemetry;

/// Mutable state of one processing run, shared between driver and workers
struct RunState {
    id: Uuid,
    trigger: RunTrigger,
    started_at: DateTime<Utc>,
    finished_at: RwLock<Option<DateTime<Utc>>>,
    status: RwLock<RunStatus>,
    token_states: DashMap<String, ProcessingState>,
    succeeded: AtomicU64,
    failed: AtomicU64,
    /// Set when the persistence collaborator fails; turns the run Failed
    fatal: AtomicBool,
    cancel: CancellationToken,
}

impl RunState {
    fn new(trigger: RunTrigger) -> Self {
        Self {
            id: Uuid::new_v4(),
            trigger,
            started_at: Utc::now(),
            finished_at: RwLock::new(None),
            status: RwLock::new(RunStatus::Running),
            token_states: DashMap::new(),
            succeeded: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            fatal: AtomicBool::new(false),
            cancel: CancellationToken::new(),
        }
    }

    fn status(&self) -> RunStatus {
        self.status.read().map(|s| *s).unwrap_or(RunStatus::Failed)
    }

    fn finish(&self, status: RunStatus) {
        if let Ok(mut s) = self.status.write() {
            *s = status;
        }
        if let Ok(mut f) = self.finished_at.write() {
            *f = Some(Utc::now());
        }
    }

    fn snapshot(&self) -> RunSnapshot {
        RunSnapshot {
            run_id: self.id,
            trigger: self.trigger,
            status: self.status(),
            started_at: self.started_at,
            finished_at: self.finished_at.read().ok().and_then(|f| *f),
            attempted: self.token_states.len(),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            token_states: self
                .token_states
                .iter()
                .map(|entry| (entry.key().clone(), *entry.value()))
                .collect(),
        }
    }
}

/// Removes the token from the in-flight set when the worker is done,
/// whichever way it exits
struct InFlightGuard<'a> {
    set: &'a DashMap<String, ()>,
    key: String,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.set.remove(&self.key);
    }
}

struct CoordinatorInner {
    aggregator: SourceAggregator,
    evaluator: TraderEvaluator,
    governor: Governor,
    discovery: Arc<dyn TokenDiscovery>,
    store: Arc<dyn EvaluationStore>,
    telemetry: Arc<PipelineTelemetry>,
    in_flight: DashMap<String, ()>,
    /// Current or most recent run; replaced on the next start()
    current_run: Mutex<Option<Arc<RunState>>>,
}

/// The orchestrator. Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<CoordinatorInner>,
}

impl Coordinator {
    pub fn new(
        aggregator: SourceAggregator,
        evaluator: TraderEvaluator,
        governor: Governor,
        discovery: Arc<dyn TokenDiscovery>,
        store: Arc<dyn EvaluationStore>,
        telemetry: Arc<PipelineTelemetry>,
    ) -> Self {
        Self {
            inner: Arc::new(CoordinatorInner {
                aggregator,
                evaluator,
                governor,
                discovery,
                store,
                telemetry,
                in_flight: DashMap::new(),
                current_run: Mutex::new(None),
            }),
        }
    }

    /// Start a processing run over all pending tokens
    ///
    /// Rejects with `AlreadyRunning` while a run is active; a second
    /// trigger is never queued.
    pub fn start(&self, trigger: RunTrigger) -> AppResult<Uuid> {
        let run = {
            let mut slot = self
                .inner
                .current_run
                .lock()
                .map_err(|_| AppError::store_unavailable("run slot poisoned"))?;
            if let Some(active) = slot.as_ref() {
                if active.status() == RunStatus::Running {
                    return Err(AppError::already_running());
                }
            }
            let run = Arc::new(RunState::new(trigger));
            *slot = Some(run.clone());
            run
        };

        info!(
            run_id = %run.id,
            trigger = trigger.as_str(),
            "🚀 processing run started"
        );

        let inner = self.inner.clone();
        let driver_run = run.clone();
        tokio::spawn(async move {
            inner.drive_run(driver_run).await;
        });

        Ok(run.id)
    }

    /// Request cooperative shutdown of the active run
    ///
    /// In-flight source calls are allowed to finish; workers notice the
    /// cancellation at their next task boundary. The run reaches `Stopped`
    /// once the workers drain.
    pub fn stop(&self) -> AppResult<()> {
        let slot = self
            .inner
            .current_run
            .lock()
            .map_err(|_| AppError::store_unavailable("run slot poisoned"))?;
        match slot.as_ref() {
            Some(run) if run.status() == RunStatus::Running => {
                info!(run_id = %run.id, "🛑 stop requested, draining workers");
                run.cancel.cancel();
                Ok(())
            }
            _ => Err(AppError::no_active_run()),
        }
    }

    /// Snapshot of the current (or most recent) run
    ///
    /// Read-only and safe to call at any time, including mid-run.
    pub fn status(&self) -> Option<RunSnapshot> {
        self.inner
            .current_run
            .lock()
            .ok()
            .and_then(|slot| slot.as_ref().map(|run| run.snapshot()))
    }

    /// Process a single token on demand, outside any run
    ///
    /// Shares the Governor with scheduled runs, so manual traffic cannot
    /// push total concurrency past the configured cap.
    pub async fn process_token(&self, address: &str) -> AppResult<Vec<Evaluation>> {
        let token = self
            .inner
            .store
            .load_token(address)
            .await?
            .ok_or_else(|| AppError::token_not_found(address))?;

        let _guard = self.inner.claim(&token.address)?;
        let _permit = self.inner.governor.admit().await?;

        self.inner
            .store
            .update_token_state(address, ProcessingState::InProgress, None)
            .await?;

        match self.inner.aggregator.aggregate(address).await {
            Ok(data) => {
                let evaluations = self.inner.evaluator.evaluate(address, &data);
                for evaluation in &evaluations {
                    self.inner.store.save_evaluation(evaluation).await?;
                    self.inner.telemetry.record_evaluation(evaluation.verdict);
                }
                self.inner
                    .store
                    .update_token_state(address, ProcessingState::Completed, None)
                    .await?;
                self.inner.telemetry.record_token_completed();
                info!(
                    token = %address,
                    evaluations = evaluations.len(),
                    "manual token processing done"
                );
                Ok(evaluations)
            }
            Err(e) => {
                self.inner
                    .store
                    .update_token_state(address, ProcessingState::Failed, Some(e.to_string()))
                    .await
                    .ok();
                self.inner.telemetry.record_token_failed();
                Err(e)
            }
        }
    }
}

impl CoordinatorInner {
    /// Put a token into the in-flight set, or fail if a worker holds it
    fn claim(&self, address: &str) -> AppResult<InFlightGuard<'_>> {
        match self.in_flight.entry(address.to_string()) {
            Entry::Occupied(_) => Err(AppError::token_in_flight(address)),
            Entry::Vacant(vacant) => {
                vacant.insert(());
                Ok(InFlightGuard {
                    set: &self.in_flight,
                    key: address.to_string(),
                })
            }
        }
    }

    /// Main driver: admit one worker per pending token, then wait for all
    /// workers and settle the run's final status
    async fn drive_run(self: Arc<Self>, run: Arc<RunState>) {
        let tokens = match self.discovery.list_pending_tokens().await {
            Ok(tokens) => tokens,
            Err(e) => {
                error!(run_id = %run.id, error = %e, "token discovery failed, run aborted");
                run.finish(RunStatus::Failed);
                return;
            }
        };

        info!(run_id = %run.id, pending = tokens.len(), "pending tokens pulled");

        let mut workers = Vec::new();
        for token in tokens {
            if run.cancel.is_cancelled() {
                break;
            }

            // Duplicate suppression: the worker's guard releases the slot
            let key = token.address.clone();
            match self.in_flight.entry(key.clone()) {
                Entry::Occupied(_) => {
                    warn!(token = %token.address, "already in flight, skipping");
                    continue;
                }
                Entry::Vacant(vacant) => {
                    vacant.insert(());
                }
            }

            run.token_states
                .insert(token.address.clone(), ProcessingState::Pending);

            // Admission control; stop() can interrupt the wait
            let permit = tokio::select! {
                permit = self.governor.admit() => match permit {
                    Ok(permit) => permit,
                    Err(_) => {
                        self.in_flight.remove(&key);
                        break;
                    }
                },
                _ = run.cancel.cancelled() => {
                    self.in_flight.remove(&key);
                    break;
                }
            };

            let inner = self.clone();
            let worker_run = run.clone();
            workers.push(tokio::spawn(async move {
                let _permit = permit;
                inner.process_one(&worker_run, token).await;
            }));
        }

        join_all(workers).await;

        let final_status = if run.fatal.load(Ordering::SeqCst) {
            RunStatus::Failed
        } else if run.cancel.is_cancelled() {
            RunStatus::Stopped
        } else {
            RunStatus::Completed
        };
        run.finish(final_status);

        info!(
            run_id = %run.id,
            status = final_status.as_str(),
            succeeded = run.succeeded.load(Ordering::Relaxed),
            failed = run.failed.load(Ordering::Relaxed),
            "🏁 processing run finished"
        );
    }

    /// Process one token inside a run; absorbs per-token failures
    async fn process_one(&self, run: &RunState, token: Token) {
        let address = token.address.clone();
        let _guard = InFlightGuard {
            set: &self.in_flight,
            key: address.clone(),
        };

        run.token_states
            .insert(address.clone(), ProcessingState::InProgress);
        if let Err(e) = self
            .store
            .update_token_state(&address, ProcessingState::InProgress, None)
            .await
        {
            self.fatal_store_failure(run, &e);
            return;
        }

        let aggregated = self.aggregator.aggregate(&address).await;

        // Cancellation checkpoint between fetching and evaluating: partial
        // fetch results are discarded and the token goes back to Pending
        if run.cancel.is_cancelled() {
            run.token_states
                .insert(address.clone(), ProcessingState::Pending);
            self.store
                .update_token_state(&address, ProcessingState::Pending, None)
                .await
                .ok();
            return;
        }

        match aggregated {
            Ok(data) => {
                let evaluations = self.evaluator.evaluate(&address, &data);
                for evaluation in &evaluations {
                    if let Err(e) = self.store.save_evaluation(evaluation).await {
                        self.fatal_store_failure(run, &e);
                        return;
                    }
                    self.telemetry.record_evaluation(evaluation.verdict);
                }

                run.token_states
                    .insert(address.clone(), ProcessingState::Completed);
                run.succeeded.fetch_add(1, Ordering::Relaxed);
                self.telemetry.record_token_completed();
                if let Err(e) = self
                    .store
                    .update_token_state(&address, ProcessingState::Completed, None)
                    .await
                {
                    self.fatal_store_failure(run, &e);
                    return;
                }
                info!(
                    token = %address,
                    complete = data.complete,
                    evaluations = evaluations.len(),
                    "✅ token completed"
                );
            }
            Err(e) => {
                // One token failing never aborts the run
                run.token_states
                    .insert(address.clone(), ProcessingState::Failed);
                run.failed.fetch_add(1, Ordering::Relaxed);
                self.telemetry.record_token_failed();
                warn!(token = %address, error = %e, "❌ token failed");
                if let Err(se) = self
                    .store
                    .update_token_state(&address, ProcessingState::Failed, Some(e.to_string()))
                    .await
                {
                    self.fatal_store_failure(run, &se);
                }
            }
        }
    }

    /// Persistence failures are resource-level: fail the run and drain
    fn fatal_store_failure(&self, run: &RunState, error: &AppError) {
        error!(run_id = %run.id, error = %error, "persistence failure, failing run");
        run.fatal.store(true, Ordering::SeqCst);
        run.cancel.cancel();
    }
}
