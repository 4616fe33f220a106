//! BullX API Client - Trader Flow Summaries
//!
//! Queries the holders-summary endpoint for the top traders of a token:
//! bought/sold USD, buy/sell transaction counts, current holding.
//!
//! The API sometimes answers with a bare holder list and sometimes with a
//! `{data: {holders: [...]}}` envelope; both are accepted. Wallets are
//! deduplicated, keeping the first occurrence.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;

use super::{build_http_client, fetch_with_retry, RateBucket, RetryPolicy, SourceClient};
use crate::config::SourceSettings;
use crate::models::{AppError, AppResult, SourceKind, SourcePayload, SourceResult, TraderFlow};
use crate::telemetry::PipelineTelemetry;

/// One holder row from the summary endpoint
#[derive(Debug, Deserialize)]
struct HolderSummary {
    address: String,
    #[serde(default, rename = "totalBoughtUSD")]
    total_bought_usd: f64,
    #[serde(default, rename = "totalSoldUSD")]
    total_sold_usd: f64,
    #[serde(default, rename = "totalBuyTransactions")]
    total_buy_transactions: u64,
    #[serde(default, rename = "totalSellTransactions")]
    total_sell_transactions: u64,
    #[serde(default, rename = "currentlyHoldingAmount")]
    currently_holding_amount: f64,
}

#[derive(Debug, Deserialize)]
struct HoldersData {
    #[serde(default)]
    holders: Vec<HolderSummary>,
}

/// The endpoint answers either shape depending on API version
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum HoldersResponse {
    Bare(Vec<HolderSummary>),
    Envelope { data: HoldersData },
}

pub struct BullxClient {
    client: reqwest::Client,
    base_url: String,
    policy: RetryPolicy,
    bucket: RateBucket,
    telemetry: Arc<PipelineTelemetry>,
}

impl BullxClient {
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
        let url = format!("{}/holdersSummaryV2", self.base_url);
        let payload = serde_json::json!({
            "name": "holdersSummaryV2",
            "data": {
                "tokenAddress": token_address,
                "sortBy": "pnlUSD",
                "chainId": 1399811149,
                "filters": { "tagsFilters": [] },
            }
        });

        let response = self.client.post(&url).json(&payload).send().await?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(AppError::source_rate_limited());
        }
        if !status.is_success() {
            return Err(AppError::source_http(format!("HTTP {}", status)));
        }

        let body: HoldersResponse = response.json().await.map_err(AppError::from)?;
        let holders = match body {
            HoldersResponse::Bare(list) => list,
            HoldersResponse::Envelope { data } => data.holders,
        };

        // Dedup wallets, first occurrence wins
        let mut seen = HashSet::new();
        let flows: Vec<TraderFlow> = holders
            .into_iter()
            .filter(|h| !h.address.is_empty() && seen.insert(h.address.clone()))
            .map(|h| TraderFlow {
                wallet: h.address,
                total_bought_usd: h.total_bought_usd,
                total_sold_usd: h.total_sold_usd,
                buy_transactions: h.total_buy_transactions,
                sell_transactions: h.total_sell_transactions,
                holding_amount: h.currently_holding_amount,
            })
            .collect();

        Ok(SourcePayload::TraderFlows(flows))
    }
}

#[async_trait]
impl SourceClient for BullxClient {
    fn kind(&self) -> SourceKind {
        SourceKind::Bullx
    }

    async fn fetch(&self, token_address: &str) -> SourceResult {
        fetch_with_retry(
            SourceKind::Bullx,
            token_address,
            &self.policy,
            &self.bucket,
            &self.telemetry,
            || self.fetch_once(token_address),
        )
        .await
    }
}
