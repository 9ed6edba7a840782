//! Step handlers, one per [`StepKind`]

use tracing::{debug, warn};

use super::{InvestmentMethod, StepExecutor, StepKind, Transaction};
use crate::infrastructure::chain::{ContractCall, SubmittedTx};
use crate::shared::errors::{ChainError, ExecutionError};
use crate::shared::types::ChainId;

/// What a successful handler hands back for the step record
#[derive(Debug, Clone, Default)]
pub(super) struct StepOutcome {
    pub submitted: Option<SubmittedTx>,
    pub chain_id: Option<ChainId>,
}

impl StepExecutor {
    pub(super) async fn run_handler(
        &self,
        kind: StepKind,
        tx: &Transaction,
        index: usize,
    ) -> Result<StepOutcome, ExecutionError> {
        match kind {
            StepKind::SwitchToSourceNetwork => {
                self.switch_network(self.settings.source_chain_id).await
            }
            StepKind::SwitchToDestinationNetwork => {
                self.switch_network(self.settings.destination_chain_id).await
            }
            StepKind::Approval => self.approve(tx).await,
            StepKind::DirectDeposit => self.deposit(tx).await,
            StepKind::CrossChainDeposit => self.initiate_cross_chain_deposit(tx).await,
            StepKind::RelayMonitor => self.monitor_relay(tx, index).await,
            StepKind::OwnershipConfirm => self.confirm_ownership(tx).await,
        }
    }

    async fn switch_network(&self, chain_id: ChainId) -> Result<StepOutcome, ExecutionError> {
        if !self.chain.switch_network(chain_id).await? {
            return Err(ExecutionError::NetworkSwitchRejected(chain_id));
        }
        Ok(StepOutcome {
            submitted: None,
            chain_id: Some(chain_id),
        })
    }

    async fn approve(&self, tx: &Transaction) -> Result<StepOutcome, ExecutionError> {
        let spender = match tx.method {
            InvestmentMethod::Direct => &self.settings.investment_contract,
            InvestmentMethod::CrossChain => &self.settings.bridge_contract,
        };
        let call = ContractCall::new(&self.settings.token_address, "approve")
            .with_args([spender.as_str(), tx.amount.as_str()]);
        self.send(&call).await
    }

    async fn deposit(&self, tx: &Transaction) -> Result<StepOutcome, ExecutionError> {
        let call = ContractCall::new(&self.settings.investment_contract, "invest").with_args([
            tx.property_address.clone(),
            tx.shares.to_string(),
            tx.amount.clone(),
        ]);
        self.send(&call).await
    }

    async fn initiate_cross_chain_deposit(&self, tx: &Transaction) -> Result<StepOutcome, ExecutionError> {
        let call = ContractCall::new(&self.settings.bridge_contract, "sendCrossChainDeposit").with_args([
            self.settings.destination_chain_id.to_string(),
            tx.property_address.clone(),
            tx.shares.to_string(),
            tx.amount.clone(),
        ]);
        self.send(&call).await
    }

    async fn monitor_relay(&self, tx: &Transaction, index: usize) -> Result<StepOutcome, ExecutionError> {
        let source_hash = tx
            .steps
            .iter()
            .find(|s| s.kind == StepKind::CrossChainDeposit)
            .and_then(|s| s.tx_hash.clone())
            .ok_or_else(|| {
                ExecutionError::MissingPrerequisite(
                    "cross-chain deposit transaction hash is not recorded".to_string(),
                )
            })?;

        loop {
            let progress = match self.chain.relay_progress(&source_hash).await {
                Ok(progress) => progress,
                Err(ChainError::Network(e)) => {
                    warn!(tx_id = %tx.id, error = %e, "relay status poll failed, retrying");
                    tokio::time::sleep(self.settings.relay_poll_interval).await;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            debug!(tx_id = %tx.id, percent = progress.percent, "relay progress");
            let description = format!("Relaying cross-chain message... {}% complete", progress.percent);
            let recorded = self
                .repository
                .update(&tx.id, |current| {
                    if let Some(step) = current.steps.get_mut(index) {
                        step.description = description;
                    }
                    Ok(())
                })
                .await;
            if let Err(e) = recorded {
                warn!(tx_id = %tx.id, error = %e, "could not record relay progress");
            }

            if let Some(delivered) = progress.delivered {
                return Ok(StepOutcome {
                    submitted: Some(delivered),
                    chain_id: Some(self.settings.destination_chain_id),
                });
            }
            tokio::time::sleep(self.settings.relay_poll_interval).await;
        }
    }

    async fn confirm_ownership(&self, tx: &Transaction) -> Result<StepOutcome, ExecutionError> {
        let call = ContractCall::new(&self.settings.investment_contract, "confirmOwnership")
            .with_args([tx.property_address.clone(), tx.shares.to_string()]);
        self.send(&call).await
    }

    /// Preflight, submit, and tag the outcome with the connected network
    async fn send(&self, call: &ContractCall) -> Result<StepOutcome, ExecutionError> {
        let estimate = self.chain.estimate_gas(call).await?;
        debug!(function = %call.function, gas = %estimate, "preflight passed");

        let submitted = self.chain.submit(call).await?;
        let chain_id = self.chain.get_network().await?;
        Ok(StepOutcome {
            submitted: Some(submitted),
            chain_id: Some(chain_id),
        })
    }
}
