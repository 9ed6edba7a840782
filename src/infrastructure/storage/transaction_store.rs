//! Whole-list transaction snapshot on top of a key-value store

use std::sync::Arc;
use tracing::{debug, warn};

use super::KeyValueStore;
use crate::domain::transaction::Transaction;
use crate::shared::errors::PersistenceError;

/// Persists every transaction as one JSON array under a single key.
/// Each save rewrites the full list.
pub struct TransactionStore {
    backend: Arc<dyn KeyValueStore>,
    key: String,
}

impl TransactionStore {
    pub fn new(backend: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        Self {
            backend,
            key: key.into(),
        }
    }

    /// Load the snapshot. Unreadable or corrupt data yields an empty list.
    pub async fn load(&self) -> Vec<Transaction> {
        let raw = match self.backend.get(&self.key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!(key = %self.key, error = %e, "failed to read transaction store, starting empty");
                return Vec::new();
            }
        };

        match serde_json::from_str::<Vec<Transaction>>(&raw) {
            Ok(transactions) => {
                debug!(count = transactions.len(), "loaded transactions");
                transactions
            }
            Err(e) => {
                warn!(key = %self.key, error = %e, "corrupt transaction store, starting empty");
                Vec::new()
            }
        }
    }

    pub async fn save(&self, transactions: &[Transaction]) -> Result<(), PersistenceError> {
        let raw = serde_json::to_string(transactions)?;
        self.backend.set(&self.key, &raw).await
    }
}
