//! Sources Module - External Data Providers
//!
//! One client per provider, each an isolated failure domain:
//! - Private token-bucket rate limit (providers have unrelated quotas)
//! - Per-attempt timeout and bounded retry with backoff + jitter
//! - Failure is data: `fetch` always returns a `SourceResult`, never an error
//!
//! Every attempt is recorded in telemetry.

pub mod bullx;
pub mod dexscreener;
pub mod gmgn;

pub use bullx::BullxClient;
pub use dexscreener::DexScreenerClient;
pub use gmgn::GmgnClient;

use async_trait::async_trait;
use rand::Rng;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::PipelineConfig;
use crate::models::{AppError, AppResult, SourceKind, SourcePayload, SourceResult};
use crate::telemetry::PipelineTelemetry;

/// User-Agent sent to every provider
const USER_AGENT_STRING: &str = "OmniPipeline/0.1.0";

/// Base delay for exponential backoff (milliseconds)
const BASE_RETRY_DELAY_MS: u64 = 250;

/// Build the full provider set from config
pub fn default_clients(
    config: &PipelineConfig,
    telemetry: Arc<PipelineTelemetry>,
) -> Vec<Arc<dyn SourceClient>> {
    let policy = RetryPolicy::new(config.per_source_retries, config.per_source_timeout);
    vec![
        Arc::new(BullxClient::new(&config.bullx, policy, telemetry.clone())),
        Arc::new(GmgnClient::new(&config.gmgn, policy, telemetry.clone())),
        Arc::new(DexScreenerClient::new(&config.dexscreener, policy, telemetry)),
    ]
}

/// A provider-specific fetcher for one token's worth of data
#[async_trait]
pub trait SourceClient: Send + Sync {
    fn kind(&self) -> SourceKind;

    /// Fetch data for one token. Retries internally; on exhaustion the
    /// failure is returned inside the `SourceResult`.
    async fn fetch(&self, token_address: &str) -> SourceResult;
}

/// Retry settings shared by all clients, values per config
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub timeout: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, timeout: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            timeout,
        }
    }
}

/// Token-bucket rate limiter, private to one client instance
///
/// Capacity equals the sustained rate, so a client can burst at most one
/// second's worth of requests before it starts pacing.
pub struct RateBucket {
    capacity: f64,
    refill_per_sec: f64,
    state: Mutex<BucketState>,
}

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl RateBucket {
    pub fn new(qps: f64) -> Self {
        let capacity = qps.max(1.0);
        Self {
            capacity,
            refill_per_sec: qps.max(0.1),
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Wait until a request slot is available, then consume it
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut state = self.state.lock().await;
                let elapsed = state.last_refill.elapsed().as_secs_f64();
                state.tokens = (state.tokens + elapsed * self.refill_per_sec).min(self.capacity);
                state.last_refill = Instant::now();

                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    return;
                }
                (1.0 - state.tokens) / self.refill_per_sec
            };
            tokio::time::sleep(Duration::from_secs_f64(wait)).await;
        }
    }
}

/// Build the HTTP client shared settings for a provider
pub(crate) fn build_http_client() -> reqwest::Client {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_STRING));
    headers.insert("Content-Type", HeaderValue::from_static("application/json"));

    reqwest::Client::builder()
        .default_headers(headers)
        .gzip(true)
        .build()
        .unwrap_or_default()
}

/// Drive one attempt function through the rate limit, timeout, and retry
/// loop, turning the terminal failure into data
///
/// Backoff doubles per retry (250ms, 500ms, 1s, ...) with up to 50% random
/// jitter on top, so parallel workers hitting the same provider do not
/// retry in lockstep.
pub(crate) async fn fetch_with_retry<F, Fut>(
    source: SourceKind,
    token_address: &str,
    policy: &RetryPolicy,
    bucket: &RateBucket,
    telemetry: &PipelineTelemetry,
    mut attempt_fn: F,
) -> SourceResult
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<SourcePayload>>,
{
    let mut last_error = String::from("no attempts made");

    for attempt in 1..=policy.attempts {
        if attempt > 1 {
            let backoff = BASE_RETRY_DELAY_MS * 2u64.pow(attempt - 2);
            let jitter = rand::thread_rng().gen_range(0..=backoff / 2);
            tokio::time::sleep(Duration::from_millis(backoff + jitter)).await;
        }

        bucket.acquire().await;

        let start = Instant::now();
        let outcome = tokio::time::timeout(policy.timeout, attempt_fn()).await;
        let latency_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(Ok(payload)) => {
                telemetry.record_fetch_attempt(source, true, latency_ms);
                debug!(
                    source = source.as_str(),
                    token = token_address,
                    attempt,
                    latency_ms,
                    "fetch ok"
                );
                return SourceResult::ok(token_address, source, payload, attempt);
            }
            Ok(Err(e)) => {
                telemetry.record_fetch_attempt(source, false, latency_ms);
                warn!(
                    source = source.as_str(),
                    token = token_address,
                    attempt,
                    error = %e,
                    "fetch attempt failed"
                );
                let retryable = e.code.is_retryable();
                last_error = e.to_string();
                if !retryable {
                    return SourceResult::error(token_address, source, last_error, attempt);
                }
            }
            Err(_) => {
                telemetry.record_fetch_attempt(source, false, latency_ms);
                last_error =
                    AppError::source_timeout(format!("attempt timed out after {:?}", policy.timeout))
                        .to_string();
                warn!(
                    source = source.as_str(),
                    token = token_address,
                    attempt,
                    "fetch attempt timed out"
                );
            }
        }
    }

    SourceResult::error(token_address, source, last_error, policy.attempts)
}
