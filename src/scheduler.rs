//! Scheduler
//! Fires the Coordinator's scheduled entry point once a day.
//!
//! Pure trigger, no business logic: if a run is already active the cycle
//! is logged and skipped, never queued.

use chrono::Utc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::DailySchedule;
use crate::coordinator::Coordinator;
use crate::models::{AppResult, ErrorCode, RunTrigger};

pub struct Scheduler {
    coordinator: Coordinator,
    schedule: DailySchedule,
}

impl Scheduler {
    pub fn new(coordinator: Coordinator, schedule_cron: &str) -> AppResult<Self> {
        Ok(Self {
            coordinator,
            schedule: DailySchedule::parse(schedule_cron)?,
        })
    }

    /// Run until cancelled, firing at the configured time every day
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(
            "⏰ scheduler armed, daily at {:02}:{:02} UTC",
            self.schedule.hour, self.schedule.minute
        );

        loop {
            let now = Utc::now();
            let next = self.schedule.next_fire_after(now);
            let wait = (next - now)
                .to_std()
                .unwrap_or_else(|_| Duration::from_secs(1));
            info!(next_fire = %next, "scheduler sleeping until next cycle");

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = shutdown.cancelled() => {
                    info!("scheduler shutting down");
                    return;
                }
            }

            self.fire();
        }
    }

    /// One scheduled trigger attempt
    fn fire(&self) {
        match self.coordinator.start(RunTrigger::Scheduled) {
            Ok(run_id) => {
                info!(run_id = %run_id, "scheduled run triggered");
            }
            Err(e) if e.code == ErrorCode::AlreadyRunning => {
                // Never queue a second trigger behind an active run
                warn!("previous run still active, skipping this cycle");
            }
            Err(e) => {
                warn!(error = %e, "scheduled trigger failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::SourceAggregator;
    use crate::config::PipelineConfig;
    use crate::evaluator::TraderEvaluator;
    use crate::governor::Governor;
    use crate::models::Token;
    use crate::store::{MemoryStore, TokenDiscovery};
    use crate::telemetry::PipelineTelemetry;
    use async_trait::async_trait;
    use std::sync::Arc;

    /// Discovery that never answers, so the run stays Running
    struct HangingDiscovery;

    #[async_trait]
    impl TokenDiscovery for HangingDiscovery {
        async fn list_pending_tokens(&self) -> AppResult<Vec<Token>> {
            futures_util::future::pending::<()>().await;
            unreachable!()
        }
    }

    fn coordinator_with(discovery: Arc<dyn TokenDiscovery>) -> Coordinator {
        let store = Arc::new(MemoryStore::new());
        let telemetry = Arc::new(PipelineTelemetry::new());
        Coordinator::new(
            SourceAggregator::new(vec![]),
            TraderEvaluator::from_config(&PipelineConfig::default()),
            Governor::new(2),
            discovery,
            store,
            telemetry,
        )
    }

    #[test]
    fn test_rejects_bad_schedule() {
        let coordinator = coordinator_with(Arc::new(MemoryStore::new()));
        assert!(Scheduler::new(coordinator, "every day at noon").is_err());
    }

    #[tokio::test]
    async fn test_fire_skips_when_already_running() {
        let coordinator = coordinator_with(Arc::new(HangingDiscovery));
        let scheduler = Scheduler::new(coordinator.clone(), "0 6 * * *").unwrap();

        // Occupy the run slot, then fire: the cycle must be skipped, not
        // replace the active run
        let run_id = coordinator.start(RunTrigger::Manual).unwrap();
        scheduler.fire();
        let snapshot = coordinator.status().unwrap();
        assert_eq!(snapshot.run_id, run_id);
        assert_eq!(snapshot.status, crate::models::RunStatus::Running);
    }
}
