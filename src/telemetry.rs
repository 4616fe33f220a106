//! Telemetry Module for the Omni Pipeline
//!
//! Collects in-process statistics about source fetches and processing
//! outcomes for:
//! - The `/v1/stats` API endpoint
//! - Operational logging at shutdown
//!
//! Counters only; no wallet addresses are recorded here.

use dashmap::DashMap;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::models::{SourceKind, Verdict};

/// Per-source fetch counters
#[derive(Default)]
struct SourceCounters {
    attempts: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    total_latency_ms: AtomicU64,
}

/// Per-source snapshot for reporting
#[derive(Debug, Clone, Serialize, Default)]
pub struct SourceStats {
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
    pub avg_latency_ms: f64,
}

/// Aggregated pipeline statistics
#[derive(Debug, Clone, Serialize, Default)]
pub struct TelemetryStats {
    pub tokens_processed: u64,
    pub tokens_failed: u64,
    pub evaluations_written: u64,
    pub verdict_pass: u64,
    pub verdict_flag: u64,
    pub verdict_reject: u64,
    pub sources: HashMap<String, SourceStats>,
    pub session_start: u64,
}

/// Main telemetry collector
///
/// Cheap to update from many workers at once; every counter is an atomic.
pub struct PipelineTelemetry {
    per_source: DashMap<SourceKind, SourceCounters>,
    tokens_processed: AtomicU64,
    tokens_failed: AtomicU64,
    evaluations_written: AtomicU64,
    verdict_pass: AtomicU64,
    verdict_flag: AtomicU64,
    verdict_reject: AtomicU64,
    session_start: u64,
}

impl PipelineTelemetry {
    pub fn new() -> Self {
        Self {
            per_source: DashMap::new(),
            tokens_processed: AtomicU64::new(0),
            tokens_failed: AtomicU64::new(0),
            evaluations_written: AtomicU64::new(0),
            verdict_pass: AtomicU64::new(0),
            verdict_flag: AtomicU64::new(0),
            verdict_reject: AtomicU64::new(0),
            session_start: current_timestamp(),
        }
    }

    /// Record one fetch attempt against a source
    pub fn record_fetch_attempt(&self, source: SourceKind, ok: bool, latency_ms: u64) {
        let counters = self.per_source.entry(source).or_default();
        counters.attempts.fetch_add(1, Ordering::Relaxed);
        counters.total_latency_ms.fetch_add(latency_ms, Ordering::Relaxed);
        if ok {
            counters.successes.fetch_add(1, Ordering::Relaxed);
        } else {
            counters.failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_token_completed(&self) {
        self.tokens_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_token_failed(&self) {
        self.tokens_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_evaluation(&self, verdict: Verdict) {
        self.evaluations_written.fetch_add(1, Ordering::Relaxed);
        let counter = match verdict {
            Verdict::Pass => &self.verdict_pass,
            Verdict::Flag => &self.verdict_flag,
            Verdict::Reject => &self.verdict_reject,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot all counters for reporting
    pub fn stats(&self) -> TelemetryStats {
        let mut sources = HashMap::new();
        for entry in self.per_source.iter() {
            let attempts = entry.attempts.load(Ordering::Relaxed);
            let total_latency = entry.total_latency_ms.load(Ordering::Relaxed);
            sources.insert(
                entry.key().as_str().to_string(),
                SourceStats {
                    attempts,
                    successes: entry.successes.load(Ordering::Relaxed),
                    failures: entry.failures.load(Ordering::Relaxed),
                    avg_latency_ms: if attempts > 0 {
                        total_latency as f64 / attempts as f64
                    } else {
                        0.0
                    },
                },
            );
        }

        TelemetryStats {
            tokens_processed: self.tokens_processed.load(Ordering::Relaxed),
            tokens_failed: self.tokens_failed.load(Ordering::Relaxed),
            evaluations_written: self.evaluations_written.load(Ordering::Relaxed),
            verdict_pass: self.verdict_pass.load(Ordering::Relaxed),
            verdict_flag: self.verdict_flag.load(Ordering::Relaxed),
            verdict_reject: self.verdict_reject.load(Ordering::Relaxed),
            sources,
            session_start: self.session_start,
        }
    }
}

impl Default for PipelineTelemetry {
    fn default() -> Self {
        Self::new()
    }
}

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
