//! Transaction registry: the public façade over creation, execution and queries

use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, info, warn};

use crate::domain::gas::{GasPriceMonitor, GasPriceSnapshot, SimulationResult, Simulator};
use crate::domain::transaction::{
    ExecutorSettings, InvestmentMethod, Step, StepExecutor, StepStatus, Transaction,
    TransactionFactory, TransactionRepository, TransactionStatus, CANCELLED_BY_USER,
};
use crate::infrastructure::chain::ChainExecutor;
use crate::infrastructure::storage::{KeyValueStore, TransactionStore};
use crate::shared::errors::ValidationError;
use crate::shared::types::{ChainId, OrchestratorConfig};
use crate::shared::utils::u128_string;

/// Transaction counts by overall status
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryStats {
    pub total: usize,
    pub pending: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    /// Gas of completed transactions
    #[serde(with = "u128_string")]
    pub total_gas_used: u128,
}

/// Entry point for callers. Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct TransactionRegistry {
    repository: Arc<TransactionRepository>,
    executor: Arc<StepExecutor>,
    chain: Arc<dyn ChainExecutor>,
    gas_monitor: Arc<GasPriceMonitor>,
    simulator: Arc<Simulator>,
    assumed_gas_price: u128,
}

impl TransactionRegistry {
    /// Load persisted transactions from `backend` and wire up the executor
    pub async fn load(
        config: &OrchestratorConfig,
        backend: Arc<dyn KeyValueStore>,
        chain: Arc<dyn ChainExecutor>,
    ) -> Self {
        let store = TransactionStore::new(backend, config.storage.key.clone());
        let repository = Arc::new(TransactionRepository::load(store).await);
        Self::new(config, repository, chain)
    }

    pub fn new(
        config: &OrchestratorConfig,
        repository: Arc<TransactionRepository>,
        chain: Arc<dyn ChainExecutor>,
    ) -> Self {
        let executor = Arc::new(StepExecutor::new(
            repository.clone(),
            chain.clone(),
            ExecutorSettings::from_config(config),
        ));
        let gas_monitor = Arc::new(GasPriceMonitor::new(chain.clone(), config.gas.poll_interval()));
        let simulator = Arc::new(Simulator::new(chain.clone()));

        Self {
            repository,
            executor,
            chain,
            gas_monitor,
            simulator,
            assumed_gas_price: config.gas.assumed_gas_price_wei,
        }
    }

    /// Create and store a pending transaction. The investor address is resolved
    /// from the wallet in the background and patched onto the stored record.
    pub async fn create_investment_transaction(
        &self,
        property_address: &str,
        amount: &str,
        shares: u32,
        method: InvestmentMethod,
    ) -> Result<Transaction, ValidationError> {
        let tx = TransactionFactory::create(property_address, amount, shares, method)?;
        self.repository.insert(tx.clone()).await;
        info!(tx_id = %tx.id, %method, property = %property_address, "created investment transaction");

        let repository = self.repository.clone();
        let chain = self.chain.clone();
        let tx_id = tx.id.clone();
        tokio::spawn(async move {
            match chain.get_account().await {
                Ok(Some(account)) => {
                    let patched = repository
                        .update(&tx_id, |current| {
                            current.investor_address = account;
                            Ok(())
                        })
                        .await;
                    if let Err(e) = patched {
                        warn!(tx_id = %tx_id, error = %e, "could not record investor address");
                    }
                }
                Ok(None) => debug!(tx_id = %tx_id, "wallet has no account yet"),
                Err(e) => warn!(tx_id = %tx_id, error = %e, "failed to resolve investor account"),
            }
        });

        Ok(tx)
    }

    pub async fn execute_step(&self, transaction_id: &str, step_id: &str) -> Result<Step, ValidationError> {
        self.executor.execute(transaction_id, step_id).await
    }

    /// Run the remaining pending steps in order, stopping at the first failure
    pub async fn execute_all(&self, transaction_id: &str) -> Result<Transaction, ValidationError> {
        loop {
            let tx = self
                .repository
                .get(transaction_id)
                .await
                .ok_or_else(|| ValidationError::TransactionNotFound(transaction_id.to_string()))?;

            let Some(next) = tx.next_pending_step() else {
                return Ok(tx);
            };
            let step = self.execute_step(transaction_id, &next.id).await?;
            if step.status == StepStatus::Failed {
                return self
                    .repository
                    .get(transaction_id)
                    .await
                    .ok_or_else(|| ValidationError::TransactionNotFound(transaction_id.to_string()));
            }
        }
    }

    pub async fn get_transaction(&self, id: &str) -> Option<Transaction> {
        self.repository.get(id).await
    }

    pub async fn get_all_transactions(&self) -> Vec<Transaction> {
        self.repository.all().await
    }

    pub async fn get_user_transactions(&self, investor_address: &str) -> Vec<Transaction> {
        self.repository
            .all()
            .await
            .into_iter()
            .filter(|tx| tx.investor_address.eq_ignore_ascii_case(investor_address))
            .collect()
    }

    /// Cancel a transaction. Returns false if it has already completed.
    pub async fn cancel_transaction(&self, id: &str) -> Result<bool, ValidationError> {
        let cancelled = self
            .repository
            .update_controlled(id, |tx, control| {
                if tx.overall_status == TransactionStatus::Completed {
                    return Ok(false);
                }
                if tx.overall_status == TransactionStatus::Cancelled {
                    return Ok(true);
                }

                let now = Utc::now();
                tx.overall_status = TransactionStatus::Cancelled;
                tx.completion_time = Some(now);
                for step in tx.steps.iter_mut().filter(|s| s.status == StepStatus::Pending) {
                    step.fail(CANCELLED_BY_USER);
                }
                // In-progress steps are failed by their handler once it sees the token
                control.cancel.cancel();
                Ok(true)
            })
            .await?;

        if cancelled {
            info!(tx_id = %id, "transaction cancelled");
        }
        Ok(cancelled)
    }

    /// Reset failed steps to pending. Returns false if the transaction has
    /// completed or one of its steps is still running.
    pub async fn retry_transaction(&self, id: &str) -> Result<bool, ValidationError> {
        let retried = self
            .repository
            .update_controlled(id, |tx, control| {
                if tx.overall_status == TransactionStatus::Completed || tx.has_running_step() {
                    return Ok(false);
                }

                for step in tx.steps.iter_mut().filter(|s| s.status == StepStatus::Failed) {
                    step.reset();
                }
                tx.overall_status = TransactionStatus::Pending;
                tx.completion_time = None;
                tx.total_gas_used = None;
                tx.receipt = None;
                control.renew_cancellation();
                Ok(true)
            })
            .await?;

        if retried {
            info!(tx_id = %id, "transaction reset for retry");
        }
        Ok(retried)
    }

    /// Approximate cost in wei at the configured flat gas price
    pub fn calculate_transaction_cost(&self, tx: &Transaction) -> u128 {
        tx.total_gas_used
            .unwrap_or(0)
            .saturating_mul(self.assumed_gas_price)
    }

    /// Full transaction list, re-emitted after every mutation
    pub fn subscribe_transactions(&self) -> WatchStream<Vec<Transaction>> {
        WatchStream::new(self.repository.subscribe())
    }

    /// Per-chain gas snapshots, re-emitted after every monitor tick
    pub fn subscribe_gas_prices(&self) -> WatchStream<HashMap<ChainId, GasPriceSnapshot>> {
        WatchStream::new(self.gas_monitor.subscribe())
    }

    pub async fn simulate(
        &self,
        contract: &str,
        function: &str,
        args: &[String],
        value: u128,
    ) -> SimulationResult {
        self.simulator.simulate(contract, function, args, value).await
    }

    /// Last snapshot for `chain_id`; `None` until the monitor has polled it
    pub fn latest_gas_price(&self, chain_id: ChainId) -> Option<GasPriceSnapshot> {
        self.gas_monitor.latest(chain_id)
    }

    pub fn gas_monitor(&self) -> &Arc<GasPriceMonitor> {
        &self.gas_monitor
    }

    pub fn start_gas_monitor(&self) {
        self.gas_monitor.start();
    }

    pub async fn shutdown(&self) {
        self.gas_monitor.stop().await;
    }

    pub async fn stats(&self) -> RegistryStats {
        let mut stats = RegistryStats::default();
        for tx in self.repository.all().await {
            stats.total += 1;
            match tx.overall_status {
                TransactionStatus::Pending => stats.pending += 1,
                TransactionStatus::InProgress => stats.in_progress += 1,
                TransactionStatus::Completed => {
                    stats.completed += 1;
                    stats.total_gas_used += tx.total_gas_used.unwrap_or(0);
                }
                TransactionStatus::Failed => stats.failed += 1,
                TransactionStatus::Cancelled => stats.cancelled += 1,
            }
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::transaction::StepKind;
    use crate::infrastructure::chain::SimulatedChainExecutor;
    use crate::infrastructure::storage::MemoryStore;
    use crate::shared::errors::PersistenceError;
    use async_trait::async_trait;
    use futures::StreamExt;
    use std::time::Duration;
    use tokio::time::timeout;

    const ACCOUNT: &str = "0x70997970C51812dc3A010C7d01b50e0d17dc79C8";

    struct Harness {
        registry: TransactionRegistry,
        chain: Arc<SimulatedChainExecutor>,
        backend: Arc<MemoryStore>,
        config: OrchestratorConfig,
    }

    async fn harness_with(relay_poll_interval_ms: u64, relay_polls: u32) -> Harness {
        let mut config = OrchestratorConfig::default();
        config.relay.poll_interval_ms = relay_poll_interval_ms;
        config.simulated.latency_ms = 0;
        config.simulated.relay_polls_to_deliver = relay_polls;
        config.simulated.account = Some(ACCOUNT.to_string());

        let chain = Arc::new(SimulatedChainExecutor::new(config.simulated.clone(), 1));
        let backend = Arc::new(MemoryStore::new());
        let registry = TransactionRegistry::load(&config, backend.clone(), chain.clone()).await;
        Harness {
            registry,
            chain,
            backend,
            config,
        }
    }

    async fn harness() -> Harness {
        harness_with(1, 2).await
    }

    #[tokio::test]
    async fn test_direct_investment_scenario() {
        let h = harness().await;
        let tx = h
            .registry
            .create_investment_transaction("0xprop", "1000", 5, InvestmentMethod::Direct)
            .await
            .unwrap();
        assert_eq!(tx.steps.len(), 3);
        assert!(tx.steps.iter().all(|s| s.status == StepStatus::Pending));
        assert_eq!(tx.overall_status, TransactionStatus::Pending);

        for step in &tx.steps {
            let done = h.registry.execute_step(&tx.id, &step.id).await.unwrap();
            assert_eq!(done.status, StepStatus::Completed);
        }

        let done = h.registry.get_transaction(&tx.id).await.unwrap();
        assert_eq!(done.overall_status, TransactionStatus::Completed);
        assert!(done.completion_time.is_some());
        assert!(done.receipt.is_some());
        assert_eq!(done.total_gas_used, Some(done.summed_gas_used()));
        assert_eq!(
            h.registry.calculate_transaction_cost(&done),
            done.summed_gas_used() * 20_000_000_000
        );
    }

    #[tokio::test]
    async fn test_execute_all_cross_chain() {
        let h = harness().await;
        let tx = h
            .registry
            .create_investment_transaction("0xprop", "250.5", 2, InvestmentMethod::CrossChain)
            .await
            .unwrap();

        let done = h.registry.execute_all(&tx.id).await.unwrap();
        assert_eq!(done.overall_status, TransactionStatus::Completed);
        assert!(done.steps.iter().all(|s| s.status == StepStatus::Completed));

        let stats = h.registry.stats().await;
        assert_eq!(stats.total, 1);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.total_gas_used, done.summed_gas_used());
    }

    #[tokio::test]
    async fn test_execute_all_stops_at_failure_then_retry_resumes() {
        let h = harness().await;
        h.chain.revert_on("invest", "insufficient funds").await;
        let tx = h
            .registry
            .create_investment_transaction("0xprop", "1000", 5, InvestmentMethod::Direct)
            .await
            .unwrap();

        let failed = h.registry.execute_all(&tx.id).await.unwrap();
        assert_eq!(failed.overall_status, TransactionStatus::Failed);
        assert_eq!(failed.steps[0].status, StepStatus::Completed);
        assert_eq!(failed.steps[1].status, StepStatus::Failed);
        assert_eq!(failed.steps[1].error_message.as_deref(), Some("insufficient funds"));
        assert_eq!(failed.steps[2].status, StepStatus::Pending);

        h.chain.clear_revert("invest").await;
        assert!(h.registry.retry_transaction(&tx.id).await.unwrap());

        let reset = h.registry.get_transaction(&tx.id).await.unwrap();
        assert_eq!(reset.overall_status, TransactionStatus::Pending);
        assert!(reset.completion_time.is_none());
        // Completed steps are untouched by retry
        assert_eq!(reset.steps[0], failed.steps[0]);
        let step = &reset.steps[1];
        assert_eq!(step.status, StepStatus::Pending);
        assert!(step.tx_hash.is_none() && step.block_number.is_none());
        assert!(step.gas_used.is_none() && step.error_message.is_none());

        let done = h.registry.execute_all(&tx.id).await.unwrap();
        assert_eq!(done.overall_status, TransactionStatus::Completed);
    }

    #[tokio::test]
    async fn test_retry_refused_for_completed() {
        let h = harness().await;
        let tx = h
            .registry
            .create_investment_transaction("0xprop", "1", 1, InvestmentMethod::Direct)
            .await
            .unwrap();
        h.registry.execute_all(&tx.id).await.unwrap();

        assert!(!h.registry.retry_transaction(&tx.id).await.unwrap());
        assert!(!h.registry.cancel_transaction(&tx.id).await.unwrap());
        let done = h.registry.get_transaction(&tx.id).await.unwrap();
        assert_eq!(done.overall_status, TransactionStatus::Completed);
        assert!(h.registry.retry_transaction("missing").await.is_err());
    }

    /// Memory store whose writes take a while, so callers queue up on the repository
    struct SlowStore {
        inner: MemoryStore,
        delay: Duration,
    }

    #[async_trait]
    impl KeyValueStore for SlowStore {
        async fn get(&self, key: &str) -> Result<Option<String>, PersistenceError> {
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: &str) -> Result<(), PersistenceError> {
            tokio::time::sleep(self.delay).await;
            self.inner.set(key, value).await
        }
    }

    #[tokio::test]
    async fn test_step_after_cancel_and_retry_is_not_cancelled() {
        let mut config = OrchestratorConfig::default();
        config.simulated.latency_ms = 0;
        config.simulated.account = None;
        let chain = Arc::new(SimulatedChainExecutor::new(config.simulated.clone(), 1));
        let backend = Arc::new(SlowStore {
            inner: MemoryStore::new(),
            delay: Duration::from_millis(50),
        });
        let registry = TransactionRegistry::load(&config, backend, chain).await;
        let tx = registry
            .create_investment_transaction("0xprop", "1000", 5, InvestmentMethod::Direct)
            .await
            .unwrap();

        // Cancel is mid-write when retry and execute are issued
        let canceller = registry.clone();
        let tx_id = tx.id.clone();
        let cancel = tokio::spawn(async move { canceller.cancel_transaction(&tx_id).await });
        tokio::task::yield_now().await;

        assert!(registry.retry_transaction(&tx.id).await.unwrap());
        let step = registry.execute_step(&tx.id, &tx.steps[0].id).await.unwrap();
        assert!(cancel.await.unwrap().unwrap());

        assert_eq!(step.status, StepStatus::Completed, "{:?}", step.error_message);
        let current = registry.get_transaction(&tx.id).await.unwrap();
        assert_eq!(current.overall_status, TransactionStatus::Pending);
        assert_eq!(current.steps[1].status, StepStatus::Pending);
    }

    #[tokio::test]
    async fn test_cancel_fails_pending_steps() {
        let h = harness().await;
        let tx = h
            .registry
            .create_investment_transaction("0xprop", "1000", 5, InvestmentMethod::Direct)
            .await
            .unwrap();
        h.registry.execute_step(&tx.id, &tx.steps[0].id).await.unwrap();

        assert!(h.registry.cancel_transaction(&tx.id).await.unwrap());
        let cancelled = h.registry.get_transaction(&tx.id).await.unwrap();
        assert_eq!(cancelled.overall_status, TransactionStatus::Cancelled);
        assert!(cancelled.completion_time.is_some());
        assert_eq!(cancelled.steps[0].status, StepStatus::Completed);
        for step in &cancelled.steps[1..] {
            assert_eq!(step.status, StepStatus::Failed);
            assert_eq!(step.error_message.as_deref(), Some(CANCELLED_BY_USER));
        }

        // Retry brings the cancelled steps back
        assert!(h.registry.retry_transaction(&tx.id).await.unwrap());
        let done = h.registry.execute_all(&tx.id).await.unwrap();
        assert_eq!(done.overall_status, TransactionStatus::Completed);
    }

    #[tokio::test]
    async fn test_cancel_interrupts_relay() {
        // Relay never delivers within the test
        let h = harness_with(5, u32::MAX).await;
        let tx = h
            .registry
            .create_investment_transaction("0xprop", "1000", 5, InvestmentMethod::CrossChain)
            .await
            .unwrap();
        for step in &tx.steps[..3] {
            h.registry.execute_step(&tx.id, &step.id).await.unwrap();
        }

        let relay_id = tx.steps[3].id.clone();
        assert_eq!(tx.steps[3].kind, StepKind::RelayMonitor);
        let registry = h.registry.clone();
        let tx_id = tx.id.clone();
        let running = tokio::spawn(async move { registry.execute_step(&tx_id, &relay_id).await });

        let mut updates = h.registry.subscribe_transactions();
        timeout(Duration::from_secs(5), async {
            while let Some(list) = updates.next().await {
                if list.iter().any(|t| t.steps[3].description.contains("% complete")) {
                    break;
                }
            }
        })
        .await
        .expect("relay never reported progress");

        assert!(h.registry.cancel_transaction(&tx.id).await.unwrap());
        let step = timeout(Duration::from_secs(5), running)
            .await
            .expect("relay did not stop")
            .unwrap()
            .unwrap();
        assert_eq!(step.status, StepStatus::Failed);
        assert_eq!(step.error_message.as_deref(), Some(CANCELLED_BY_USER));

        let after = h.registry.get_transaction(&tx.id).await.unwrap();
        assert_eq!(after.overall_status, TransactionStatus::Cancelled);
        assert!(after.receipt.is_none());
    }

    #[tokio::test]
    async fn test_investor_address_is_patched() {
        let h = harness().await;
        let mut updates = h.registry.subscribe_transactions();
        let tx = h
            .registry
            .create_investment_transaction("0xprop", "1000", 5, InvestmentMethod::Direct)
            .await
            .unwrap();
        assert!(tx.investor_address.is_empty());

        timeout(Duration::from_secs(5), async {
            while let Some(list) = updates.next().await {
                if list.iter().any(|t| t.id == tx.id && t.investor_address == ACCOUNT) {
                    break;
                }
            }
        })
        .await
        .expect("investor address never patched");

        let mine = h.registry.get_user_transactions(&ACCOUNT.to_lowercase()).await;
        assert_eq!(mine.len(), 1);
        assert!(h.registry.get_user_transactions("0xsomeoneelse").await.is_empty());
    }

    #[tokio::test]
    async fn test_state_survives_reload() {
        let h = harness().await;
        let tx = h
            .registry
            .create_investment_transaction("0xprop", "1000", 5, InvestmentMethod::Direct)
            .await
            .unwrap();
        h.registry.execute_step(&tx.id, &tx.steps[0].id).await.unwrap();

        let reloaded = TransactionRegistry::load(&h.config, h.backend.clone(), h.chain.clone()).await;
        let restored = reloaded.get_transaction(&tx.id).await.unwrap();
        assert_eq!(restored.steps[0].status, StepStatus::Completed);
        assert_eq!(restored.steps[1].status, StepStatus::Pending);
    }

    #[tokio::test]
    async fn test_gas_prices_and_simulation() {
        let h = harness().await;
        h.chain.set_base_fee(1_000_000_007).await;
        assert!(h.registry.latest_gas_price(1).is_none());

        h.registry.gas_monitor().poll_once().await.unwrap();
        let snapshot = h.registry.latest_gas_price(1).unwrap();
        assert_eq!(snapshot.slow, 800_000_005);
        assert_eq!(snapshot.standard, 1_000_000_007);
        assert_eq!(snapshot.fast, 1_200_000_008);

        h.chain.revert_on("invest", "insufficient funds").await;
        let result = h.registry.simulate("0xpool", "invest", &[], 0).await;
        assert!(!result.success);
        assert_eq!(result.revert_reason.as_deref(), Some("insufficient funds"));
    }

    #[tokio::test]
    async fn test_gas_monitor_lifecycle() {
        let h = harness().await;
        let mut prices = h.registry.subscribe_gas_prices();
        // Initial empty map
        assert!(prices.next().await.unwrap().is_empty());

        h.registry.start_gas_monitor();
        let first = timeout(Duration::from_secs(5), prices.next()).await.unwrap().unwrap();
        assert!(first.contains_key(&1));

        h.registry.shutdown().await;
        assert!(!h.registry.gas_monitor().is_running());
    }

    #[tokio::test]
    async fn test_invalid_input_rejected() {
        let h = harness().await;
        let err = h
            .registry
            .create_investment_transaction("0xprop", "-5", 1, InvestmentMethod::Direct)
            .await
            .unwrap_err();
        assert_eq!(err, ValidationError::InvalidAmount("-5".to_string()));
        assert!(h.registry.get_all_transactions().await.is_empty());
    }
}
