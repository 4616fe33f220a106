//! DexScreener API Client - On-Chain Market Data
//!
//! Used for the token-level view of a processing run:
//! - Liquidity, 24h volume, and USD price from the deepest pair
//! - Token name/symbol (also backs naming of manually-added tokens)
//!
//! API: {base}/tokens/{tokenAddress}. Free, no API key required.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tracing::warn;

use super::{build_http_client, fetch_with_retry, RateBucket, RetryPolicy, SourceClient};
use crate::config::SourceSettings;
use crate::models::{AppError, AppResult, SourceKind, SourcePayload, SourceResult, TokenMarket};
use crate::telemetry::PipelineTelemetry;

#[derive(Debug, Deserialize)]
struct DexScreenerResponse {
    #[serde(default)]
    pairs: Option<Vec<DexPair>>,
}

/// A trading pair from DexScreener
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DexPair {
    base_token: DexToken,
    liquidity: Option<DexLiquidity>,
    price_usd: Option<String>,
    volume: Option<DexVolume>,
}

#[derive(Debug, Clone, Deserialize)]
struct DexToken {
    name: Option<String>,
    symbol: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct DexLiquidity {
    usd: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
struct DexVolume {
    h24: Option<f64>,
}

pub struct DexScreenerClient {
    client: reqwest::Client,
    base_url: String,
    policy: RetryPolicy,
    bucket: RateBucket,
    telemetry: Arc<PipelineTelemetry>,
}

impl DexScreenerClient {
    pub fn new(
        settings: &SourceSettings,
        policy: RetryPolicy,
        telemetry: Arc<PipelineTelemetry>,
    ) -> Self {
        Self {
            client: build_http_client(),
            base_url: settings.base_url.clone(),
            policy,
            bucket: RateBucket::new(settings.rate_limit_qps),
            telemetry,
        }
    }

    async fn fetch_pairs(&self, token_address: &str) -> AppResult<Vec<DexPair>> {
        let url = format!("{}/tokens/{}", self.base_url, token_address);

        let response = self.client.get(&url).send().await?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(AppError::source_rate_limited());
        }
        if !status.is_success() {
            return Err(AppError::source_http(format!("HTTP {}", status)));
        }

        let body: DexScreenerResponse = response.json().await.map_err(AppError::from)?;
        let mut pairs = body.pairs.unwrap_or_default();

        // Deepest pair first
        pairs.sort_by(|a, b| {
            let liq_a = a.liquidity.as_ref().and_then(|l| l.usd).unwrap_or(0.0);
            let liq_b = b.liquidity.as_ref().and_then(|l| l.usd).unwrap_or(0.0);
            liq_b.partial_cmp(&liq_a).unwrap_or(std::cmp::Ordering::Equal)
        });

        Ok(pairs)
    }

    async fn fetch_once(&self, token_address: &str) -> AppResult<SourcePayload> {
        let pairs = self.fetch_pairs(token_address).await?;

        let best = pairs.into_iter().next().ok_or_else(|| {
            AppError::source_invalid(format!("no pairs listed for {}", token_address))
        })?;

        Ok(SourcePayload::TokenMarket(TokenMarket {
            name: best.base_token.name,
            symbol: best.base_token.symbol,
            price_usd: best.price_usd.and_then(|p| p.parse().ok()),
            liquidity_usd: best.liquidity.and_then(|l| l.usd).unwrap_or(0.0),
            volume_24h: best.volume.and_then(|v| v.h24).unwrap_or(0.0),
        }))
    }

    /// Best-effort name/symbol lookup for a manually-added token
    ///
    /// Single attempt, no retries: an unnamed token is acceptable, a stuck
    /// add-token request is not.
    pub async fn lookup_identity(&self, token_address: &str) -> Option<(String, String)> {
        self.bucket.acquire().await;
        match self.fetch_pairs(token_address).await {
            Ok(pairs) => pairs.into_iter().next().and_then(|p| {
                Some((p.base_token.name?, p.base_token.symbol.unwrap_or_default()))
            }),
            Err(e) => {
                warn!(token = token_address, error = %e, "token identity lookup failed");
                None
            }
        }
    }
}

#[async_trait]
impl SourceClient for DexScreenerClient {
    fn kind(&self) -> SourceKind {
        SourceKind::DexScreener
    }

    async fn fetch(&self, token_address: &str) -> SourceResult {
        fetch_with_retry(
            SourceKind::DexScreener,
            token_address,
            &self.policy,
            &self.bucket,
            &self.telemetry,
            || self.fetch_once(token_address),
        )
        .await
    }
}
