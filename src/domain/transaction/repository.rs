//! In-memory transaction list backed by the persistence store

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{watch, Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use super::{StatusAggregator, StepStatus, Transaction, INTERRUPTED_BY_RESTART};
use crate::infrastructure::storage::TransactionStore;
use crate::shared::errors::ValidationError;

/// Per-transaction execution lock and cancellation token
#[derive(Clone)]
pub struct TransactionControl {
    pub execution_lock: Arc<Mutex<()>>,
    pub cancel: CancellationToken,
}

impl TransactionControl {
    fn new() -> Self {
        Self {
            execution_lock: Arc::new(Mutex::new(())),
            cancel: CancellationToken::new(),
        }
    }

    /// Fresh token once the current one has fired; handlers still holding the old one stay cancelled
    pub fn renew_cancellation(&mut self) {
        if self.cancel.is_cancelled() {
            self.cancel = CancellationToken::new();
        }
    }
}

/// Owns every transaction. Each committed mutation is flushed to the store and
/// broadcast as the full list before the mutating call returns.
pub struct TransactionRepository {
    transactions: RwLock<Vec<Transaction>>,
    controls: RwLock<HashMap<String, TransactionControl>>,
    store: TransactionStore,
    updates: watch::Sender<Vec<Transaction>>,
}

impl TransactionRepository {
    /// Load persisted transactions. Steps left running by a previous process
    /// are failed so the transaction can be retried.
    pub async fn load(store: TransactionStore) -> Self {
        let mut transactions = store.load().await;
        let recovered = Self::recover_interrupted(&mut transactions);

        let (updates, _) = watch::channel(transactions.clone());
        let repository = Self {
            transactions: RwLock::new(transactions),
            controls: RwLock::new(HashMap::new()),
            store,
            updates,
        };

        if recovered > 0 {
            warn!(steps = recovered, "marked interrupted steps as failed after restart");
            let transactions = repository.transactions.read().await;
            repository.commit(&transactions).await;
        }
        repository
    }

    fn recover_interrupted(transactions: &mut [Transaction]) -> usize {
        let now = Utc::now();
        let mut recovered = 0;
        for tx in transactions.iter_mut() {
            let mut touched = false;
            for step in tx.steps.iter_mut().filter(|s| s.status == StepStatus::InProgress) {
                step.fail(INTERRUPTED_BY_RESTART);
                touched = true;
                recovered += 1;
            }
            if touched {
                StatusAggregator::apply(tx, now);
            }
        }
        recovered
    }

    /// Receiver that always holds the latest full list
    pub fn subscribe(&self) -> watch::Receiver<Vec<Transaction>> {
        self.updates.subscribe()
    }

    pub async fn all(&self) -> Vec<Transaction> {
        self.transactions.read().await.clone()
    }

    pub async fn get(&self, id: &str) -> Option<Transaction> {
        self.transactions
            .read()
            .await
            .iter()
            .find(|tx| tx.id == id)
            .cloned()
    }

    pub async fn insert(&self, transaction: Transaction) {
        let mut transactions = self.transactions.write().await;
        transactions.push(transaction);
        self.commit(&transactions).await;
    }

    /// Apply `mutate` to one transaction. Nothing is committed when it returns an error,
    /// so it must validate before touching the record.
    pub async fn update<R, F>(&self, id: &str, mutate: F) -> Result<R, ValidationError>
    where
        F: FnOnce(&mut Transaction) -> Result<R, ValidationError>,
    {
        let mut transactions = self.transactions.write().await;
        let tx = transactions
            .iter_mut()
            .find(|tx| tx.id == id)
            .ok_or_else(|| ValidationError::TransactionNotFound(id.to_string()))?;

        let result = mutate(tx)?;
        self.commit(&transactions).await;
        Ok(result)
    }

    /// Like [`update`](Self::update) but also hands over the transaction's control.
    /// Token reads and swaps made here are atomic with the status change they belong to.
    pub async fn update_controlled<R, F>(&self, id: &str, mutate: F) -> Result<R, ValidationError>
    where
        F: FnOnce(&mut Transaction, &mut TransactionControl) -> Result<R, ValidationError>,
    {
        let mut transactions = self.transactions.write().await;
        let tx = transactions
            .iter_mut()
            .find(|tx| tx.id == id)
            .ok_or_else(|| ValidationError::TransactionNotFound(id.to_string()))?;

        let result = {
            let mut controls = self.controls.write().await;
            let control = controls
                .entry(id.to_string())
                .or_insert_with(TransactionControl::new);
            mutate(tx, control)?
        };
        self.commit(&transactions).await;
        Ok(result)
    }

    /// Lock and token for `id`, created on first use. The token may be replaced
    /// later; read it through [`update_controlled`](Self::update_controlled) when
    /// it must match the transaction's current state.
    pub async fn control(&self, id: &str) -> Result<TransactionControl, ValidationError> {
        if let Some(control) = self.controls.read().await.get(id) {
            return Ok(control.clone());
        }
        if self.get(id).await.is_none() {
            return Err(ValidationError::TransactionNotFound(id.to_string()));
        }

        let mut controls = self.controls.write().await;
        Ok(controls
            .entry(id.to_string())
            .or_insert_with(TransactionControl::new)
            .clone())
    }

    async fn commit(&self, transactions: &[Transaction]) {
        if let Err(e) = self.store.save(transactions).await {
            error!(error = %e, "failed to persist transactions, state may be lost on restart");
        }
        self.updates.send_replace(transactions.to_vec());
    }
}
