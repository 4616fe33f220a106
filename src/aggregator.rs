//! Source Aggregator
//! Fans out to every configured source client for a token and merges the
//! results into one composite view.
//!
//! Source latencies are independent, so the fetches overlap. One failing
//! source never fails the aggregate; only zero usable sources does, since
//! an evaluation with no input is meaningless.

use futures_util::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::models::{AggregatedData, AppError, AppResult, SourceOutcome};
use crate::sources::SourceClient;

pub struct SourceAggregator {
    clients: Vec<Arc<dyn SourceClient>>,
}

impl SourceAggregator {
    pub fn new(clients: Vec<Arc<dyn SourceClient>>) -> Self {
        Self { clients }
    }

    pub fn source_count(&self) -> usize {
        self.clients.len()
    }

    /// Fetch all sources concurrently and merge
    ///
    /// `complete` is true only when every configured source returned `Ok`.
    /// Errors only when no source produced a usable payload.
    pub async fn aggregate(&self, token_address: &str) -> AppResult<AggregatedData> {
        let fetches = self
            .clients
            .iter()
            .map(|client| client.fetch(token_address));
        let outcomes = join_all(fetches).await;

        let mut results = HashMap::new();
        for result in outcomes {
            if let SourceOutcome::Error { ref reason } = result.outcome {
                warn!(
                    source = result.source.as_str(),
                    token = token_address,
                    reason = %reason,
                    "source failed for token"
                );
            }
            results.insert(result.source, result);
        }

        let usable = results.values().filter(|r| r.outcome.is_ok()).count();
        if usable == 0 {
            return Err(AppError::data_insufficient(token_address));
        }

        let complete = usable == self.clients.len();
        debug!(
            token = token_address,
            usable,
            configured = self.clients.len(),
            complete,
            "aggregation done"
        );

        Ok(AggregatedData {
            token_address: token_address.to_string(),
            results,
            complete,
        })
    }
}
