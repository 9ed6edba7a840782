//! Common types used across the application

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::shared::utils::u128_string;

/// EVM chain identifier
pub type ChainId = u64;

/// Durable storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding one file per storage key
    pub path: PathBuf,
    /// Key under which the transaction list is stored
    pub key: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data"),
            key: "investment_transactions".to_string(),
        }
    }
}

/// Networks and contracts the investment steps talk to
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Optional JSON-RPC endpoint for read-only calls (gas, simulation)
    pub rpc_url: Option<String>,
    /// Chain the funds leave from in a cross-chain investment
    pub source_chain_id: ChainId,
    /// Chain hosting the property contracts
    pub destination_chain_id: ChainId,
    pub token_address: String,
    pub investment_contract: String,
    pub bridge_contract: String,
    pub timeout_ms: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            rpc_url: None,
            source_chain_id: 1,
            destination_chain_id: 137,
            token_address: "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48".to_string(), // USDC
            investment_contract: "0x5FbDB2315678afecb367f032d93F642f64180aa3".to_string(),
            bridge_contract: "0xe7f1725E7734CE288F8367e1Bb143E90bb3F0512".to_string(),
            timeout_ms: 30_000,
        }
    }
}

impl NetworkConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Gas price tracking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GasConfig {
    pub poll_interval_secs: u64,
    /// Flat price used by cost approximation, in wei
    #[serde(with = "u128_string")]
    pub assumed_gas_price_wei: u128,
}

impl Default for GasConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 30,
            assumed_gas_price_wei: 20_000_000_000, // 20 gwei
        }
    }
}

impl GasConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

/// Cross-chain relay monitoring configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub poll_interval_ms: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 5_000,
        }
    }
}

impl RelayConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Knobs for the in-process simulated chain
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatedChainConfig {
    pub latency_ms: u64,
    #[serde(with = "u128_string")]
    pub base_fee_wei: u128,
    /// Relay polls before a cross-chain message is delivered
    pub relay_polls_to_deliver: u32,
    pub account: Option<String>,
}

impl Default for SimulatedChainConfig {
    fn default() -> Self {
        Self {
            latency_ms: 250,
            base_fee_wei: 25_000_000_000,
            relay_polls_to_deliver: 4,
            account: Some("0x70997970C51812dc3A010C7d01b50e0d17dc79C8".to_string()),
        }
    }
}

impl SimulatedChainConfig {
    pub fn latency(&self) -> Duration {
        Duration::from_millis(self.latency_ms)
    }
}

/// Orchestrator configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub storage: StorageConfig,
    pub network: NetworkConfig,
    pub gas: GasConfig,
    pub relay: RelayConfig,
    pub simulated: SimulatedChainConfig,
}
