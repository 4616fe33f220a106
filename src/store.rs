//! External Collaborator Contracts & In-Memory Implementation
//!
//! The pipeline core does not own a database. It talks to two narrow
//! traits: token discovery and evaluation persistence. Production wires
//! these to real storage; `MemoryStore` backs tests and the default
//! binaries, and understands the classic `tokens.txt` list format.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::path::Path;
use std::sync::RwLock;
use tracing::info;

use crate::models::{
    AppError, AppResult, ErrorCode, Evaluation, ProcessingState, Token,
};

/// Where pending tokens come from
#[async_trait]
pub trait TokenDiscovery: Send + Sync {
    /// Tokens that have not been processed yet
    async fn list_pending_tokens(&self) -> AppResult<Vec<Token>>;
}

/// Where processing outcomes go
///
/// Evaluations are append-only; token state is last-writer-wins.
#[async_trait]
pub trait EvaluationStore: Send + Sync {
    async fn save_evaluation(&self, evaluation: &Evaluation) -> AppResult<()>;

    async fn update_token_state(
        &self,
        address: &str,
        state: ProcessingState,
        error: Option<String>,
    ) -> AppResult<()>;

    async fn load_token(&self, address: &str) -> AppResult<Option<Token>>;
}

/// In-memory token and evaluation store
pub struct MemoryStore {
    tokens: DashMap<String, Token>,
    evaluations: RwLock<Vec<Evaluation>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tokens: DashMap::new(),
            evaluations: RwLock::new(Vec::new()),
        }
    }

    /// Register a token; an existing entry is left untouched
    pub fn add_token(&self, token: Token) -> bool {
        if self.tokens.contains_key(&token.address) {
            return false;
        }
        self.tokens.insert(token.address.clone(), token);
        true
    }

    pub fn token_count(&self) -> usize {
        self.tokens.len()
    }

    /// All stored evaluations for one token, oldest first
    pub fn evaluations_for(&self, token_address: &str) -> Vec<Evaluation> {
        self.evaluations
            .read()
            .map(|evals| {
                evals
                    .iter()
                    .filter(|e| e.token_address == token_address)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn evaluation_count(&self) -> usize {
        self.evaluations.read().map(|e| e.len()).unwrap_or(0)
    }

    /// Load tokens from a `tokens.txt`-style list: one `address,name` per
    /// line, `#` starts a comment
    pub fn load_tokens_file(&self, path: impl AsRef<Path>) -> AppResult<usize> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            AppError::with_source(
                ErrorCode::ConfigInvalidValue,
                format!("cannot read token list {}", path.as_ref().display()),
                e,
            )
        })?;

        let mut added = 0;
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut parts = line.splitn(2, ',');
            let address = parts.next().unwrap_or_default().trim();
            if address.is_empty() {
                continue;
            }
            let name = parts.next().map(|n| n.trim().to_string()).filter(|n| !n.is_empty());
            if self.add_token(Token::new(address, name)) {
                added += 1;
            }
        }

        info!(added, "token list loaded");
        Ok(added)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TokenDiscovery for MemoryStore {
    async fn list_pending_tokens(&self) -> AppResult<Vec<Token>> {
        Ok(self
            .tokens
            .iter()
            .filter(|entry| entry.state == ProcessingState::Pending)
            .map(|entry| entry.clone())
            .collect())
    }
}

#[async_trait]
impl EvaluationStore for MemoryStore {
    async fn save_evaluation(&self, evaluation: &Evaluation) -> AppResult<()> {
        self.evaluations
            .write()
            .map_err(|_| AppError::store_unavailable("evaluation store poisoned"))?
            .push(evaluation.clone());
        Ok(())
    }

    async fn update_token_state(
        &self,
        address: &str,
        state: ProcessingState,
        error: Option<String>,
    ) -> AppResult<()> {
        let mut entry = self
            .tokens
            .entry(address.to_string())
            .or_insert_with(|| Token::new(address, None));
        entry.state = state;
        entry.last_error = error;
        if matches!(state, ProcessingState::Completed | ProcessingState::Failed) {
            entry.last_processed_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn load_token(&self, address: &str) -> AppResult<Option<Token>> {
        Ok(self.tokens.get(address).map(|t| t.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_add_and_list_pending() {
        let store = MemoryStore::new();
        assert!(store.add_token(Token::new("tok1", Some("One".to_string()))));
        assert!(!store.add_token(Token::new("tok1", None)));
        store.add_token(Token::new("tok2", None));

        store
            .update_token_state("tok2", ProcessingState::Completed, None)
            .await
            .unwrap();

        let pending = store.list_pending_tokens().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].address, "tok1");
    }

    #[tokio::test]
    async fn test_update_state_records_timestamps() {
        let store = MemoryStore::new();
        store.add_token(Token::new("tok", None));

        store
            .update_token_state("tok", ProcessingState::InProgress, None)
            .await
            .unwrap();
        let token = store.load_token("tok").await.unwrap().unwrap();
        assert_eq!(token.state, ProcessingState::InProgress);
        assert!(token.last_processed_at.is_none());

        store
            .update_token_state("tok", ProcessingState::Failed, Some("no data".to_string()))
            .await
            .unwrap();
        let token = store.load_token("tok").await.unwrap().unwrap();
        assert_eq!(token.state, ProcessingState::Failed);
        assert_eq!(token.last_error.as_deref(), Some("no data"));
        assert!(token.last_processed_at.is_some());
    }

    #[test]
    fn test_tokens_file_parsing() {
        let dir = std::env::temp_dir().join("omni_store_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("tokens.txt");
        std::fs::write(
            &path,
            "# watchlist\nJB2wezZLdzWfnaCfHxLg193RS3Rh51ThiXxEDWQDpump,Neo (NEO)\n\nabc123\n",
        )
        .unwrap();

        let store = MemoryStore::new();
        let added = store.load_tokens_file(&path).unwrap();
        assert_eq!(added, 2);
        assert_eq!(store.token_count(), 2);

        std::fs::remove_file(&path).ok();
    }
}
