//! In-process chain executor with scripted latency, reverts and relay progress

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

use super::{ChainExecutor, ContractCall, RelayProgress, SubmittedTx};
use crate::shared::errors::ChainError;
use crate::shared::types::{ChainId, SimulatedChainConfig};

const BASE_TX_GAS: u128 = 21_000;

#[derive(Debug)]
struct SimulatedState {
    network: ChainId,
    base_fee: u128,
    account: Option<String>,
    next_block: u64,
    reverts: HashMap<String, String>,
    network_switch_allowed: bool,
    relay_polls: HashMap<String, u32>,
    submitted: Vec<ContractCall>,
}

/// Deterministic stand-in for a wallet + RPC pair
pub struct SimulatedChainExecutor {
    config: SimulatedChainConfig,
    state: RwLock<SimulatedState>,
}

impl SimulatedChainExecutor {
    /// Create an executor connected to `network`
    pub fn new(config: SimulatedChainConfig, network: ChainId) -> Self {
        let state = SimulatedState {
            network,
            base_fee: config.base_fee_wei,
            account: config.account.clone(),
            next_block: 19_000_000,
            reverts: HashMap::new(),
            network_switch_allowed: true,
            relay_polls: HashMap::new(),
            submitted: Vec::new(),
        };
        Self {
            config,
            state: RwLock::new(state),
        }
    }

    /// Zero-latency executor for tests
    pub fn instant(network: ChainId) -> Self {
        let config = SimulatedChainConfig {
            latency_ms: 0,
            relay_polls_to_deliver: 2,
            ..SimulatedChainConfig::default()
        };
        Self::new(config, network)
    }

    pub async fn set_base_fee(&self, base_fee: u128) {
        self.state.write().await.base_fee = base_fee;
    }

    /// Make every call to `function` revert with `reason`
    pub async fn revert_on(&self, function: &str, reason: &str) {
        self.state
            .write()
            .await
            .reverts
            .insert(function.to_string(), reason.to_string());
    }

    pub async fn clear_revert(&self, function: &str) {
        self.state.write().await.reverts.remove(function);
    }

    pub async fn allow_network_switch(&self, allowed: bool) {
        self.state.write().await.network_switch_allowed = allowed;
    }

    /// Calls submitted so far, in order
    pub async fn submitted_calls(&self) -> Vec<ContractCall> {
        self.state.read().await.submitted.clone()
    }

    fn gas_for(call: &ContractCall) -> u128 {
        match call.function.as_str() {
            "approve" => 46_000,
            "invest" => 120_000,
            "sendCrossChainDeposit" => 180_000,
            "confirmOwnership" => 65_000,
            _ => BASE_TX_GAS + 5_000 * call.args.len() as u128,
        }
    }

    fn random_hash() -> String {
        format!("0x{}", hex::encode(rand::random::<[u8; 32]>()))
    }

    /// Progress below delivery, capped at 99
    fn relay_percent(polls: u32, required: u32) -> u8 {
        let percent = u64::from(polls) * 100 / u64::from(required.max(1));
        percent.min(99) as u8
    }

    async fn delay(&self) {
        let latency = self.config.latency();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }

    fn check_revert(state: &SimulatedState, call: &ContractCall) -> Result<(), ChainError> {
        match state.reverts.get(&call.function) {
            Some(reason) => Err(ChainError::Reverted(reason.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ChainExecutor for SimulatedChainExecutor {
    async fn get_network(&self) -> Result<ChainId, ChainError> {
        Ok(self.state.read().await.network)
    }

    async fn get_fee_data(&self) -> Result<u128, ChainError> {
        Ok(self.state.read().await.base_fee)
    }

    async fn estimate_gas(&self, call: &ContractCall) -> Result<u128, ChainError> {
        self.delay().await;
        let state = self.state.read().await;
        Self::check_revert(&state, call)?;
        Ok(Self::gas_for(call))
    }

    async fn switch_network(&self, chain_id: ChainId) -> Result<bool, ChainError> {
        self.delay().await;
        let mut state = self.state.write().await;
        if !state.network_switch_allowed {
            return Ok(false);
        }
        state.network = chain_id;
        debug!(chain_id, "simulated wallet switched network");
        Ok(true)
    }

    async fn get_account(&self) -> Result<Option<String>, ChainError> {
        self.delay().await;
        Ok(self.state.read().await.account.clone())
    }

    async fn submit(&self, call: &ContractCall) -> Result<SubmittedTx, ChainError> {
        self.delay().await;
        let mut state = self.state.write().await;
        Self::check_revert(&state, call)?;

        state.next_block += 1;
        state.submitted.push(call.clone());
        let submitted = SubmittedTx {
            tx_hash: Self::random_hash(),
            block_number: state.next_block,
            gas_used: Self::gas_for(call),
        };
        debug!(function = %call.function, tx_hash = %submitted.tx_hash, "simulated call mined");
        Ok(submitted)
    }

    async fn relay_progress(&self, source_tx_hash: &str) -> Result<RelayProgress, ChainError> {
        self.delay().await;
        let required = self.config.relay_polls_to_deliver;
        let mut state = self.state.write().await;

        let polls = state.relay_polls.entry(source_tx_hash.to_string()).or_insert(0);
        *polls += 1;
        let polls = *polls;

        if polls >= required {
            state.next_block += 1;
            let delivered = SubmittedTx {
                tx_hash: Self::random_hash(),
                block_number: state.next_block,
                gas_used: 0,
            };
            return Ok(RelayProgress {
                percent: 100,
                delivered: Some(delivered),
            });
        }

        Ok(RelayProgress {
            percent: Self::relay_percent(polls, required),
            delivered: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_submit_records_call_and_advances_block() {
        let chain = SimulatedChainExecutor::instant(1);
        let call = ContractCall::new("0xtoken", "approve").with_args(["0xspender", "1000"]);

        let first = chain.submit(&call).await.unwrap();
        let second = chain.submit(&call).await.unwrap();

        assert_eq!(second.block_number, first.block_number + 1);
        assert_eq!(first.gas_used, 46_000);
        assert!(first.tx_hash.starts_with("0x"));
        assert_eq!(first.tx_hash.len(), 66);
        assert_eq!(chain.submitted_calls().await.len(), 2);
    }

    #[tokio::test]
    async fn test_scripted_revert() {
        let chain = SimulatedChainExecutor::instant(1);
        chain.revert_on("invest", "insufficient funds").await;

        let call = ContractCall::new("0xpool", "invest");
        assert_eq!(
            chain.estimate_gas(&call).await,
            Err(ChainError::Reverted("insufficient funds".to_string()))
        );
        assert!(chain.submit(&call).await.is_err());

        chain.clear_revert("invest").await;
        assert!(chain.submit(&call).await.is_ok());
    }

    #[tokio::test]
    async fn test_relay_delivers_after_configured_polls() {
        let chain = SimulatedChainExecutor::instant(1);

        let first = chain.relay_progress("0xabc").await.unwrap();
        assert_eq!(first.percent, 50);
        assert!(first.delivered.is_none());

        let second = chain.relay_progress("0xabc").await.unwrap();
        assert_eq!(second.percent, 100);
        assert!(second.delivered.is_some());
    }

    #[test]
    fn test_relay_percent_handles_large_poll_counts() {
        assert_eq!(SimulatedChainExecutor::relay_percent(1, 4), 25);
        assert_eq!(SimulatedChainExecutor::relay_percent(3, 3), 99);
        assert_eq!(SimulatedChainExecutor::relay_percent(50_000_000, u32::MAX), 1);
        assert_eq!(SimulatedChainExecutor::relay_percent(u32::MAX - 1, u32::MAX), 99);
        assert_eq!(SimulatedChainExecutor::relay_percent(5, 0), 99);
    }

    #[tokio::test]
    async fn test_network_switch_can_be_declined() {
        let chain = SimulatedChainExecutor::instant(1);
        assert!(chain.switch_network(137).await.unwrap());
        assert_eq!(chain.get_network().await.unwrap(), 137);

        chain.allow_network_switch(false).await;
        assert!(!chain.switch_network(1).await.unwrap());
        assert_eq!(chain.get_network().await.unwrap(), 137);
    }
}
