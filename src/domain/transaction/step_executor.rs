//! Runs a single step: validation, dispatch, and recording of the outcome

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use super::handlers::StepOutcome;
use super::{
    Receipt, StatusAggregator, Step, StepStatus, Transaction, TransactionRepository,
    TransactionStatus,
};
use crate::infrastructure::chain::ChainExecutor;
use crate::shared::errors::{ExecutionError, ValidationError};
use crate::shared::types::{ChainId, OrchestratorConfig};

/// Networks, contracts and pacing used by the step handlers
#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    pub source_chain_id: ChainId,
    pub destination_chain_id: ChainId,
    pub token_address: String,
    pub investment_contract: String,
    pub bridge_contract: String,
    pub relay_poll_interval: Duration,
}

impl ExecutorSettings {
    pub fn from_config(config: &OrchestratorConfig) -> Self {
        Self {
            source_chain_id: config.network.source_chain_id,
            destination_chain_id: config.network.destination_chain_id,
            token_address: config.network.token_address.clone(),
            investment_contract: config.network.investment_contract.clone(),
            bridge_contract: config.network.bridge_contract.clone(),
            relay_poll_interval: config.relay.poll_interval(),
        }
    }
}

/// Executes steps against the chain and records every transition
pub struct StepExecutor {
    pub(super) repository: Arc<TransactionRepository>,
    pub(super) chain: Arc<dyn ChainExecutor>,
    pub(super) settings: ExecutorSettings,
}

impl StepExecutor {
    pub fn new(
        repository: Arc<TransactionRepository>,
        chain: Arc<dyn ChainExecutor>,
        settings: ExecutorSettings,
    ) -> Self {
        Self {
            repository,
            chain,
            settings,
        }
    }

    /// Run one pending step to completion or failure.
    ///
    /// Only caller mistakes are returned as errors. A handler failure is
    /// recorded on the step and the returned step carries it; inspect
    /// `status` / `error_message` to detect business failure. State is
    /// persisted before this returns.
    pub async fn execute(&self, transaction_id: &str, step_id: &str) -> Result<Step, ValidationError> {
        let control = self.repository.control(transaction_id).await?;
        let _guard = control.execution_lock.lock().await;

        let (index, snapshot, cancel) = self
            .repository
            .update_controlled(transaction_id, |tx, current| {
                let (index, snapshot) = Self::start_step(tx, step_id)?;
                Ok((index, snapshot, current.cancel.clone()))
            })
            .await?;
        let kind = snapshot.steps[index].kind;
        info!(tx_id = %transaction_id, step_id = %step_id, ?kind, "executing step");

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ExecutionError::Cancelled),
            result = self.run_handler(kind, &snapshot, index) => result,
        };

        if let Err(e) = &outcome {
            warn!(tx_id = %transaction_id, step_id = %step_id, error = %e, "step failed");
        }

        self.repository
            .update(transaction_id, |tx| Ok(Self::finish_step(tx, index, outcome)))
            .await
    }

    fn start_step(tx: &mut Transaction, step_id: &str) -> Result<(usize, Transaction), ValidationError> {
        let index = tx.step_index(step_id).ok_or_else(|| ValidationError::StepNotFound {
            transaction_id: tx.id.clone(),
            step_id: step_id.to_string(),
        })?;

        let status = tx.steps[index].status;
        if status != StepStatus::Pending {
            return Err(ValidationError::StepNotPending {
                step_id: step_id.to_string(),
                status,
            });
        }
        if tx.overall_status.is_terminal() {
            return Err(ValidationError::TransactionNotActive {
                transaction_id: tx.id.clone(),
                status: tx.overall_status,
            });
        }

        tx.steps[index].status = StepStatus::InProgress;
        StatusAggregator::apply(tx, Utc::now());
        Ok((index, tx.clone()))
    }

    fn finish_step(
        tx: &mut Transaction,
        index: usize,
        outcome: Result<StepOutcome, ExecutionError>,
    ) -> Step {
        let now = Utc::now();
        let cancelled = tx.overall_status == TransactionStatus::Cancelled;

        match outcome {
            Ok(outcome) => {
                let step = &mut tx.steps[index];
                step.status = StepStatus::Completed;
                step.timestamp = Some(now);
                step.chain_id = outcome.chain_id;
                step.error_message = None;
                if let Some(submitted) = outcome.submitted {
                    step.tx_hash = Some(submitted.tx_hash);
                    step.block_number = Some(submitted.block_number);
                    step.gas_used = Some(submitted.gas_used);
                }

                let was_completed = tx.overall_status == TransactionStatus::Completed;
                StatusAggregator::apply(tx, now);
                if !was_completed && tx.overall_status == TransactionStatus::Completed {
                    tx.receipt = Some(Self::build_receipt(tx));
                }
            }
            Err(e) => {
                tx.steps[index].fail(e.to_string());
                if !cancelled {
                    tx.overall_status = TransactionStatus::Failed;
                }
            }
        }

        tx.steps[index].clone()
    }

    fn build_receipt(tx: &Transaction) -> Receipt {
        let final_tx_hash = tx
            .steps
            .iter()
            .rev()
            .find_map(|s| s.tx_hash.clone())
            .unwrap_or_default();
        let serial = Uuid::new_v4().simple().to_string()[..8].to_uppercase();
        let owner = if tx.investor_address.is_empty() {
            "the connected wallet"
        } else {
            tx.investor_address.as_str()
        };

        Receipt {
            confirmation_number: format!("INV-{}-{}", Utc::now().format("%Y%m%d"), serial),
            final_tx_hash,
            proof_of_ownership: format!(
                "{} shares of property {} held by {} for an investment of {} ({})",
                tx.shares, tx.property_address, owner, tx.amount, tx.method
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::transaction::{InvestmentMethod, StepKind, TransactionFactory};
    use crate::infrastructure::chain::SimulatedChainExecutor;
    use crate::infrastructure::storage::{MemoryStore, TransactionStore};

    struct Harness {
        executor: StepExecutor,
        repository: Arc<TransactionRepository>,
        chain: Arc<SimulatedChainExecutor>,
    }

    async fn harness() -> Harness {
        let store = TransactionStore::new(Arc::new(MemoryStore::new()), "txs");
        let repository = Arc::new(TransactionRepository::load(store).await);
        let chain = Arc::new(SimulatedChainExecutor::instant(137));
        let mut config = OrchestratorConfig::default();
        config.relay.poll_interval_ms = 1;

        let executor = StepExecutor::new(
            repository.clone(),
            chain.clone(),
            ExecutorSettings::from_config(&config),
        );
        Harness {
            executor,
            repository,
            chain,
        }
    }

    async fn create(h: &Harness, method: InvestmentMethod) -> Transaction {
        let tx = TransactionFactory::create("0xprop", "1000", 5, method).unwrap();
        h.repository.insert(tx.clone()).await;
        tx
    }

    #[tokio::test]
    async fn test_direct_scenario() {
        let h = harness().await;
        let tx = create(&h, InvestmentMethod::Direct).await;

        let step = h.executor.execute(&tx.id, &tx.steps[0].id).await.unwrap();
        assert_eq!(step.status, StepStatus::Completed);
        assert!(step.tx_hash.is_some());
        let current = h.repository.get(&tx.id).await.unwrap();
        assert!(!current.overall_status.is_terminal());

        h.executor.execute(&tx.id, &tx.steps[1].id).await.unwrap();
        h.executor.execute(&tx.id, &tx.steps[2].id).await.unwrap();

        let done = h.repository.get(&tx.id).await.unwrap();
        assert_eq!(done.overall_status, TransactionStatus::Completed);
        assert!(done.completion_time.is_some());
        assert_eq!(done.total_gas_used, Some(done.summed_gas_used()));
        assert_eq!(done.total_gas_used, Some(46_000 + 120_000 + 65_000));

        let receipt = done.receipt.expect("receipt");
        assert!(!receipt.confirmation_number.is_empty());
        assert_eq!(Some(receipt.final_tx_hash), done.steps[2].tx_hash);
        assert!(receipt.proof_of_ownership.contains("5 shares"));
        assert!(receipt.proof_of_ownership.contains("0xprop"));
    }

    #[tokio::test]
    async fn test_receipt_only_once_all_steps_complete() {
        let h = harness().await;
        let tx = create(&h, InvestmentMethod::Direct).await;

        // Final step first: nothing to prove yet
        let last = h.executor.execute(&tx.id, &tx.steps[2].id).await.unwrap();
        assert_eq!(last.status, StepStatus::Completed);
        let partial = h.repository.get(&tx.id).await.unwrap();
        assert_eq!(partial.overall_status, TransactionStatus::Pending);
        assert!(partial.receipt.is_none());

        h.executor.execute(&tx.id, &tx.steps[0].id).await.unwrap();
        h.chain.revert_on("invest", "insufficient funds").await;
        h.executor.execute(&tx.id, &tx.steps[1].id).await.unwrap();
        let failed = h.repository.get(&tx.id).await.unwrap();
        assert_eq!(failed.overall_status, TransactionStatus::Failed);
        assert!(failed.receipt.is_none());
    }

    #[tokio::test]
    async fn test_preconditions() {
        let h = harness().await;
        let tx = create(&h, InvestmentMethod::Direct).await;

        assert_eq!(
            h.executor.execute("missing", "x").await,
            Err(ValidationError::TransactionNotFound("missing".to_string()))
        );
        assert!(matches!(
            h.executor.execute(&tx.id, "bogus").await,
            Err(ValidationError::StepNotFound { .. })
        ));

        h.executor.execute(&tx.id, &tx.steps[0].id).await.unwrap();
        assert!(matches!(
            h.executor.execute(&tx.id, &tx.steps[0].id).await,
            Err(ValidationError::StepNotPending { status: StepStatus::Completed, .. })
        ));
    }

    #[tokio::test]
    async fn test_failure_is_recorded_not_returned() {
        let h = harness().await;
        let tx = create(&h, InvestmentMethod::Direct).await;
        h.chain.revert_on("invest", "insufficient funds").await;

        h.executor.execute(&tx.id, &tx.steps[0].id).await.unwrap();
        let step = h.executor.execute(&tx.id, &tx.steps[1].id).await.unwrap();
        assert_eq!(step.status, StepStatus::Failed);
        assert_eq!(step.error_message.as_deref(), Some("insufficient funds"));

        let current = h.repository.get(&tx.id).await.unwrap();
        assert_eq!(current.overall_status, TransactionStatus::Failed);
        // Later siblings are not auto-failed
        assert_eq!(current.steps[2].status, StepStatus::Pending);
        assert!(current.receipt.is_none());

        // Non-advanceable until retried
        assert!(matches!(
            h.executor.execute(&tx.id, &tx.steps[2].id).await,
            Err(ValidationError::TransactionNotActive { .. })
        ));
    }

    #[tokio::test]
    async fn test_cross_chain_runs_all_steps() {
        let h = harness().await;
        h.chain.switch_network(1).await.unwrap();
        let tx = create(&h, InvestmentMethod::CrossChain).await;

        for step in &tx.steps {
            let result = h.executor.execute(&tx.id, &step.id).await.unwrap();
            assert_eq!(result.status, StepStatus::Completed, "{} failed: {:?}", step.title, result.error_message);
        }

        let done = h.repository.get(&tx.id).await.unwrap();
        assert_eq!(done.overall_status, TransactionStatus::Completed);
        assert_eq!(done.steps[0].chain_id, Some(1));
        let relay = done.steps.iter().find(|s| s.kind == StepKind::RelayMonitor).unwrap();
        assert!(relay.tx_hash.is_some());
        assert!(relay.description.contains("100%"));
        assert_eq!(done.steps[5].chain_id, Some(137));
        assert!(done.receipt.is_some());
    }

    #[tokio::test]
    async fn test_relay_without_deposit_fails() {
        let h = harness().await;
        let tx = create(&h, InvestmentMethod::CrossChain).await;
        let relay = tx.steps.iter().find(|s| s.kind == StepKind::RelayMonitor).unwrap();

        let step = h.executor.execute(&tx.id, &relay.id).await.unwrap();
        assert_eq!(step.status, StepStatus::Failed);
        assert!(step.error_message.unwrap().contains("cross-chain deposit"));
    }

    #[tokio::test]
    async fn test_declined_network_switch_fails_step() {
        let h = harness().await;
        h.chain.allow_network_switch(false).await;
        let tx = create(&h, InvestmentMethod::CrossChain).await;

        let step = h.executor.execute(&tx.id, &tx.steps[0].id).await.unwrap();
        assert_eq!(step.status, StepStatus::Failed);
        assert_eq!(
            step.error_message.as_deref(),
            Some("Network switch to chain 1 was rejected")
        );
    }

    #[tokio::test]
    async fn test_concurrent_steps_are_serialized() {
        let h = harness().await;
        let tx = create(&h, InvestmentMethod::Direct).await;

        let (a, b) = tokio::join!(
            h.executor.execute(&tx.id, &tx.steps[0].id),
            h.executor.execute(&tx.id, &tx.steps[1].id),
        );
        assert_eq!(a.unwrap().status, StepStatus::Completed);
        assert_eq!(b.unwrap().status, StepStatus::Completed);

        // Neither write was lost
        let current = h.repository.get(&tx.id).await.unwrap();
        assert_eq!(current.steps[0].status, StepStatus::Completed);
        assert_eq!(current.steps[1].status, StepStatus::Completed);
        assert_eq!(current.overall_status, TransactionStatus::Pending);
    }
}
