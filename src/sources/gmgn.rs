//! GMGN API Client - Trader Behavior Statistics
//!
//! Queries token-scoped trader statistics: tags, winrate, 7d/30d PnL,
//! top-holding ROI, and phishing-risk ratios.
//!
//! The API wraps every response in a `{code, msg, data}` envelope and
//! signals soft failures with a non-zero `code` inside an HTTP 200 body;
//! those are retried like any transient error.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

use super::{build_http_client, fetch_with_retry, RateBucket, RetryPolicy, SourceClient};
use crate::config::SourceSettings;
use crate::models::{AppError, AppResult, SourceKind, SourcePayload, SourceResult, TraderProfile};
use crate::telemetry::PipelineTelemetry;

/// Reporting period requested from the API
const STAT_PERIOD: &str = "7d";

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    msg: Option<String>,
    data: Option<TradersData>,
}

#[derive(Debug, Deserialize)]
struct TradersData {
    #[serde(default)]
    traders: Vec<GmgnTrader>,
}

#[derive(Debug, Deserialize)]
struct GmgnTrader {
    address: String,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    winrate: f64,
    #[serde(default)]
    pnl_7d: f64,
    #[serde(default)]
    pnl_30d: f64,
    #[serde(default)]
    realized_profit_7d: f64,
    #[serde(default)]
    realized_profit_30d: f64,
    /// ROI of the wallet's best holding, as reported server-side
    #[serde(default)]
    top_profit_pnl: Option<f64>,
    #[serde(default)]
    risk: RiskRatios,
}

#[derive(Debug, Deserialize, Default)]
struct RiskRatios {
    #[serde(default)]
    no_buy_hold_ratio: f64,
    #[serde(default)]
    fast_tx_ratio: f64,
    #[serde(default)]
    sell_pass_buy_ratio: f64,
}

pub struct GmgnClient {
    client: reqwest::Client,
    base_url: String,
    policy: RetryPolicy,
    bucket: RateBucket,
    telemetry: Arc<PipelineTelemetry>,
}

impl GmgnClient {
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

    async fn fetch_once(&self, token_address: &str) -> AppResult<SourcePayload> {
        let url = format!(
            "{}/api/v1/token_traders/sol/{}",
            self.base_url, token_address
        );

        let response = self
            .client
            .get(&url)
            .query(&[("period", STAT_PERIOD), ("orderby", "realized_profit")])
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(AppError::source_rate_limited());
        }
        if !status.is_success() {
            return Err(AppError::source_http(format!("HTTP {}", status)));
        }

        let envelope: Envelope = response.json().await.map_err(AppError::from)?;
        if envelope.code != 0 {
            // Soft failure inside a 200 body; retried upstream
            return Err(AppError::source_invalid(format!(
                "API code {} ({})",
                envelope.code,
                envelope.msg.as_deref().unwrap_or("no message")
            )));
        }

        let traders = envelope.data.map(|d| d.traders).unwrap_or_default();
        let profiles: Vec<TraderProfile> = traders
            .into_iter()
            .filter(|t| !t.address.is_empty())
            .map(|t| TraderProfile {
                wallet: t.address,
                tags: t.tags,
                winrate: t.winrate,
                pnl_pct_7d: t.pnl_7d,
                pnl_pct_30d: t.pnl_30d,
                realized_profit_7d: t.realized_profit_7d,
                realized_profit_30d: t.realized_profit_30d,
                top_roi: t.top_profit_pnl,
                no_buy_hold_ratio: t.risk.no_buy_hold_ratio,
                fast_tx_ratio: t.risk.fast_tx_ratio,
                sell_pass_buy_ratio: t.risk.sell_pass_buy_ratio,
            })
            .collect();

        Ok(SourcePayload::TraderBehavior(profiles))
    }
}

#[async_trait]
impl SourceClient for GmgnClient {
    fn kind(&self) -> SourceKind {
        SourceKind::Gmgn
    }

    async fn fetch(&self, token_address: &str) -> SourceResult {
        fetch_with_retry(
            SourceKind::Gmgn,
            token_address,
            &self.policy,
            &self.bucket,
            &self.telemetry,
            || self.fetch_once(token_address),
        )
        .await
    }
}
