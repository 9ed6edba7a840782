//! Gas domain - tiered price snapshots and pre-flight simulation

mod gas_monitor;
mod simulator;

pub use gas_monitor::GasPriceMonitor;
pub use simulator::Simulator;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::shared::types::ChainId;
use crate::shared::utils::u128_string;

/// Tiered gas prices for one chain, in wei
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GasPriceSnapshot {
    pub chain_id: ChainId,
    #[serde(with = "u128_string")]
    pub slow: u128,
    #[serde(with = "u128_string")]
    pub standard: u128,
    #[serde(with = "u128_string")]
    pub fast: u128,
    pub timestamp: DateTime<Utc>,
}

impl GasPriceSnapshot {
    /// slow = 80% and fast = 120% of the base fee, truncated to whole wei
    pub fn from_base_fee(chain_id: ChainId, base_fee: u128, timestamp: DateTime<Utc>) -> Self {
        Self {
            chain_id,
            slow: base_fee.saturating_mul(8) / 10,
            standard: base_fee,
            fast: base_fee.saturating_mul(12) / 10,
            timestamp,
        }
    }
}

/// Outcome of a non-committing call estimate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationResult {
    pub success: bool,
    #[serde(with = "u128_string")]
    pub gas_estimate: u128,
    #[serde(with = "u128_string")]
    pub gas_price: u128,
    #[serde(with = "u128_string")]
    pub estimated_cost: u128,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revert_reason: Option<String>,
    pub simulated_at: DateTime<Utc>,
}
