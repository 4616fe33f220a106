//! Type definitions for the Omni Pipeline
//! All core data structures for token processing and trader evaluation

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Lifecycle state of a token within the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessingState {
    /// Discovered but not yet processed
    Pending,
    /// A worker currently holds this token
    InProgress,
    /// Processed successfully, evaluations recorded
    Completed,
    /// Processing failed, reason stored on the token
    Failed,
}

impl ProcessingState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingState::Pending => "PENDING",
            ProcessingState::InProgress => "IN_PROGRESS",
            ProcessingState::Completed => "COMPLETED",
            ProcessingState::Failed => "FAILED",
        }
    }
}

/// A token known to the pipeline
///
/// Identity is the chain address. Tokens are never deleted, only
/// state-transitioned by the Coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    /// Chain address (unique identifier)
    pub address: String,
    /// Human-readable name, if known
    pub name: Option<String>,
    /// Ticker symbol, if known
    pub symbol: Option<String>,
    /// When the token entered the pipeline
    pub discovered_at: DateTime<Utc>,
    pub state: ProcessingState,
    pub last_processed_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl Token {
    pub fn new(address: impl Into<String>, name: Option<String>) -> Self {
        Self {
            address: address.into(),
            name,
            symbol: None,
            discovered_at: Utc::now(),
            state: ProcessingState::Pending,
            last_processed_at: None,
            last_error: None,
        }
    }
}

/// The fixed set of external data providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Trader flow summaries (bought/sold USD, tx counts)
    Bullx,
    /// Trader behavior statistics (winrate, PnL, risk ratios)
    Gmgn,
    /// On-chain market data (price, liquidity, volume)
    DexScreener,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Bullx => "bullx",
            SourceKind::Gmgn => "gmgn",
            SourceKind::DexScreener => "dexscreener",
        }
    }
}

/// Outcome of a source fetch after retries are exhausted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SourceOutcome {
    Ok,
    Error { reason: String },
}

impl SourceOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, SourceOutcome::Ok)
    }
}

/// Per-wallet flow summary as reported by the BullX-style provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraderFlow {
    pub wallet: String,
    pub total_bought_usd: f64,
    pub total_sold_usd: f64,
    pub buy_transactions: u64,
    pub sell_transactions: u64,
    pub holding_amount: f64,
}

/// Per-wallet behavior profile as reported by the GMGN-style provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraderProfile {
    pub wallet: String,
    pub tags: Vec<String>,
    /// Fraction of winning positions, 0.0..=1.0
    pub winrate: f64,
    pub pnl_pct_7d: f64,
    pub pnl_pct_30d: f64,
    pub realized_profit_7d: f64,
    pub realized_profit_30d: f64,
    /// Best ROI among the wallet's top holdings, if reported
    pub top_roi: Option<f64>,
    /// Phishing-risk ratios, 0.0..=1.0 each
    pub no_buy_hold_ratio: f64,
    pub fast_tx_ratio: f64,
    pub sell_pass_buy_ratio: f64,
}

/// Token-level market snapshot from the on-chain data provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenMarket {
    pub name: Option<String>,
    pub symbol: Option<String>,
    pub price_usd: Option<f64>,
    pub liquidity_usd: f64,
    pub volume_24h: f64,
}

/// Typed payload carried by a successful fetch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SourcePayload {
    TokenMarket(TokenMarket),
    TraderFlows(Vec<TraderFlow>),
    TraderBehavior(Vec<TraderProfile>),
}

/// Terminal result of fetching one source for one token
///
/// Immutable once created. Failure is represented in `outcome`, never
/// raised to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceResult {
    pub token_address: String,
    pub source: SourceKind,
    /// Present only when `outcome` is `Ok`
    pub payload: Option<SourcePayload>,
    pub fetched_at: DateTime<Utc>,
    /// Attempts consumed, including the successful one
    pub attempts: u32,
    pub outcome: SourceOutcome,
}

impl SourceResult {
    pub fn ok(
        token_address: impl Into<String>,
        source: SourceKind,
        payload: SourcePayload,
        attempts: u32,
    ) -> Self {
        Self {
            token_address: token_address.into(),
            source,
            payload: Some(payload),
            fetched_at: Utc::now(),
            attempts,
            outcome: SourceOutcome::Ok,
        }
    }

    pub fn error(
        token_address: impl Into<String>,
        source: SourceKind,
        reason: impl Into<String>,
        attempts: u32,
    ) -> Self {
        Self {
            token_address: token_address.into(),
            source,
            payload: None,
            fetched_at: Utc::now(),
            attempts,
            outcome: SourceOutcome::Error {
                reason: reason.into(),
            },
        }
    }
}

/// Composite view of all source results for one token
///
/// Derived per processing attempt; not persisted on its own.
#[derive(Debug, Clone, Serialize)]
pub struct AggregatedData {
    pub token_address: String,
    pub results: HashMap<SourceKind, SourceResult>,
    /// True only if every configured source returned `Ok`
    pub complete: bool,
}

impl AggregatedData {
    /// Number of sources that produced a usable payload
    pub fn usable_sources(&self) -> usize {
        self.results.values().filter(|r| r.outcome.is_ok()).count()
    }

    pub fn market(&self) -> Option<&TokenMarket> {
        match self.results.get(&SourceKind::DexScreener)?.payload.as_ref()? {
            SourcePayload::TokenMarket(m) => Some(m),
            _ => None,
        }
    }

    pub fn flows(&self) -> Option<&[TraderFlow]> {
        match self.results.get(&SourceKind::Bullx)?.payload.as_ref()? {
            SourcePayload::TraderFlows(f) => Some(f),
            _ => None,
        }
    }

    pub fn behavior(&self) -> Option<&[TraderProfile]> {
        match self.results.get(&SourceKind::Gmgn)?.payload.as_ref()? {
            SourcePayload::TraderBehavior(b) => Some(b),
            _ => None,
        }
    }
}

/// A trader observed on a token, with merged metrics from all sources
///
/// Identity is the wallet address; metric values are overwritten on
/// re-evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trader {
    pub address: String,
    /// Observed metrics keyed by metric name
    pub metrics: HashMap<String, f64>,
    pub tags: Vec<String>,
}

/// Final judgment on a trader for a token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    Pass,
    Flag,
    Reject,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Pass => "PASS",
            Verdict::Flag => "FLAG",
            Verdict::Reject => "REJECT",
        }
    }
}

/// What a single rule did during an evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TraceDetail {
    /// Condition met, delta applied
    Scored { delta: f64 },
    /// Condition met and the rule forced a verdict
    Override { verdict: Verdict },
    /// Required metric absent from the aggregated data
    Skipped { missing: String },
    /// Condition not met, zero contribution
    Passed,
}

/// One entry in the ordered rule trace
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEntry {
    pub rule: String,
    pub detail: TraceDetail,
}

/// Result of evaluating one trader on one token
///
/// Append-only: later evaluations of the same (trader, token) pair
/// supersede this one, they never overwrite it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evaluation {
    pub trader: String,
    pub token_address: String,
    pub score: f64,
    pub verdict: Verdict,
    pub trace: Vec<TraceEntry>,
    pub evaluated_at: DateTime<Utc>,
}

/// What kicked off a processing run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunTrigger {
    Scheduled,
    Manual,
}

impl RunTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunTrigger::Scheduled => "SCHEDULED",
            RunTrigger::Manual => "MANUAL",
        }
    }
}

/// Overall status of a processing run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Running,
    Completed,
    Stopped,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "RUNNING",
            RunStatus::Completed => "COMPLETED",
            RunStatus::Stopped => "STOPPED",
            RunStatus::Failed => "FAILED",
        }
    }
}

/// Read-only snapshot of a processing run, safe to serve while the run
/// is still moving
#[derive(Debug, Clone, Serialize)]
pub struct RunSnapshot {
    pub run_id: Uuid,
    pub trigger: RunTrigger,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Tokens attempted by this run so far
    pub attempted: usize,
    pub succeeded: u64,
    pub failed: u64,
    pub token_states: HashMap<String, ProcessingState>,
}
