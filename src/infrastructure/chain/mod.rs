//! Chain executor boundary: the narrow interface to wallets and networks

pub mod json_rpc;
pub mod simulated;

pub use json_rpc::JsonRpcChainExecutor;
pub use simulated::SimulatedChainExecutor;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::shared::errors::ChainError;
use crate::shared::types::ChainId;

/// A prospective or submitted contract call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractCall {
    pub contract: String,
    pub function: String,
    pub args: Vec<String>,
    /// Native value attached to the call, in wei
    pub value: u128,
}

impl ContractCall {
    pub fn new(contract: impl Into<String>, function: impl Into<String>) -> Self {
        Self {
            contract: contract.into(),
            function: function.into(),
            args: Vec::new(),
            value: 0,
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_value(mut self, value: u128) -> Self {
        self.value = value;
        self
    }
}

/// Inclusion data returned once a submitted call is mined
#[derive(Debug, Clone, PartialEq)]
pub struct SubmittedTx {
    pub tx_hash: String,
    pub block_number: u64,
    pub gas_used: u128,
}

/// Progress of a cross-chain message
#[derive(Debug, Clone, PartialEq)]
pub struct RelayProgress {
    pub percent: u8,
    /// Destination-side inclusion, present once delivered
    pub delivered: Option<SubmittedTx>,
}

/// External executor performing real network calls
#[async_trait]
pub trait ChainExecutor: Send + Sync {
    /// Chain the wallet is currently connected to
    async fn get_network(&self) -> Result<ChainId, ChainError>;

    /// Current gas price in wei
    async fn get_fee_data(&self) -> Result<u128, ChainError>;

    /// Non-committing gas estimate. Reverts surface as [`ChainError::Reverted`].
    async fn estimate_gas(&self, call: &ContractCall) -> Result<u128, ChainError>;

    /// Ask the wallet to switch networks; `false` when the user declines
    async fn switch_network(&self, chain_id: ChainId) -> Result<bool, ChainError>;

    /// Connected account, if the wallet has resolved one
    async fn get_account(&self) -> Result<Option<String>, ChainError>;

    /// Sign, send and wait for inclusion
    async fn submit(&self, call: &ContractCall) -> Result<SubmittedTx, ChainError>;

    /// Poll the delivery status of a cross-chain message sent by `source_tx_hash`
    async fn relay_progress(&self, source_tx_hash: &str) -> Result<RelayProgress, ChainError>;
}
