//! Pre-flight estimation of a contract call

use chrono::Utc;
use std::sync::Arc;
use tracing::debug;

use super::SimulationResult;
use crate::infrastructure::chain::{ChainExecutor, ContractCall};
use crate::shared::errors::ChainError;

pub struct Simulator {
    chain: Arc<dyn ChainExecutor>,
}

impl Simulator {
    pub fn new(chain: Arc<dyn ChainExecutor>) -> Self {
        Self { chain }
    }

    pub async fn simulate(
        &self,
        contract: &str,
        function: &str,
        args: &[String],
        value: u128,
    ) -> SimulationResult {
        let call = ContractCall::new(contract, function)
            .with_args(args.iter().cloned())
            .with_value(value);
        self.simulate_call(&call).await
    }

    /// Never fails: any executor error becomes an unsuccessful result
    pub async fn simulate_call(&self, call: &ContractCall) -> SimulationResult {
        match self.estimate(call).await {
            Ok((gas_estimate, gas_price)) => SimulationResult {
                success: true,
                gas_estimate,
                gas_price,
                estimated_cost: gas_estimate.saturating_mul(gas_price),
                revert_reason: None,
                simulated_at: Utc::now(),
            },
            Err(e) => {
                debug!(function = %call.function, error = %e, "simulation failed");
                SimulationResult {
                    success: false,
                    gas_estimate: 0,
                    gas_price: 0,
                    estimated_cost: 0,
                    revert_reason: Some(e.to_string()),
                    simulated_at: Utc::now(),
                }
            }
        }
    }

    async fn estimate(&self, call: &ContractCall) -> Result<(u128, u128), ChainError> {
        let gas = self.chain.estimate_gas(call).await?;
        let price = self.chain.get_fee_data().await?;
        Ok((gas, price))
    }
}
