//! Read-only EVM JSON-RPC executor
//!
//! Serves gas price polling and simulation against a real node. Calls that
//! need a signing wallet report `Unsupported`.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

use super::{ChainExecutor, ContractCall, RelayProgress, SubmittedTx};
use crate::shared::errors::ChainError;
use crate::shared::types::ChainId;

const REVERT_PREFIX: &str = "execution reverted: ";

/// JSON-RPC client for an EVM node
pub struct JsonRpcChainExecutor {
    http_client: reqwest::Client,
    rpc_url: String,
    request_id: AtomicU64,
}

impl JsonRpcChainExecutor {
    pub fn new(rpc_url: String, timeout: Duration) -> Result<Self, ChainError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ChainError::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            rpc_url,
            request_id: AtomicU64::new(1),
        })
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value, ChainError> {
        let request_body = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": self.request_id.fetch_add(1, Ordering::Relaxed),
        });

        let response = self
            .http_client
            .post(&self.rpc_url)
            .header("Content-Type", "application/json")
            .json(&request_body)
            .send()
            .await
            .map_err(|e| ChainError::Network(e.to_string()))?;

        let response_json: Value = response
            .json()
            .await
            .map_err(|e| ChainError::Network(format!("Invalid RPC response: {}", e)))?;

        parse_rpc_response(response_json)
    }

    /// Builds the `eth_estimateGas` call object. Calldata is supplied pre-encoded
    /// as the first argument since ABI encoding lives outside this crate.
    fn call_object(call: &ContractCall) -> Value {
        let mut object = json!({
            "to": call.contract,
            "value": format!("0x{:x}", call.value),
        });
        if let Some(data) = call.args.first().filter(|a| a.starts_with("0x")) {
            object["data"] = json!(data);
        }
        object
    }
}

/// Extracts `result`, mapping node errors; revert reasons are kept verbatim
fn parse_rpc_response(response: Value) -> Result<Value, ChainError> {
    if let Some(error) = response.get("error") {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown RPC error");
        if let Some(reason) = message.strip_prefix(REVERT_PREFIX) {
            return Err(ChainError::Reverted(reason.to_string()));
        }
        if message == "execution reverted" {
            return Err(ChainError::Reverted(message.to_string()));
        }
        return Err(ChainError::Network(format!("RPC error: {}", message)));
    }

    response
        .get("result")
        .cloned()
        .ok_or_else(|| ChainError::Network("Missing result in RPC response".to_string()))
}

fn parse_quantity(value: &Value) -> Result<u128, ChainError> {
    let raw = value
        .as_str()
        .ok_or_else(|| ChainError::Network(format!("Expected hex quantity, got {}", value)))?;
    u128::from_str_radix(raw.trim_start_matches("0x"), 16)
        .map_err(|e| ChainError::Network(format!("Invalid hex quantity {}: {}", raw, e)))
}

#[async_trait]
impl ChainExecutor for JsonRpcChainExecutor {
    async fn get_network(&self) -> Result<ChainId, ChainError> {
        let result = self.request("eth_chainId", json!([])).await?;
        let chain_id = parse_quantity(&result)?;
        ChainId::try_from(chain_id)
            .map_err(|_| ChainError::Network(format!("Chain id out of range: {}", chain_id)))
    }

    async fn get_fee_data(&self) -> Result<u128, ChainError> {
        let result = self.request("eth_gasPrice", json!([])).await?;
        parse_quantity(&result)
    }

    async fn estimate_gas(&self, call: &ContractCall) -> Result<u128, ChainError> {
        debug!(contract = %call.contract, function = %call.function, "eth_estimateGas");
        let result = self
            .request("eth_estimateGas", json!([Self::call_object(call)]))
            .await?;
        parse_quantity(&result)
    }

    async fn switch_network(&self, _chain_id: ChainId) -> Result<bool, ChainError> {
        Err(ChainError::Unsupported("network switching requires a wallet".to_string()))
    }

    async fn get_account(&self) -> Result<Option<String>, ChainError> {
        let result = self.request("eth_accounts", json!([])).await?;
        Ok(result
            .as_array()
            .and_then(|accounts| accounts.first())
            .and_then(Value::as_str)
            .map(str::to_string))
    }

    async fn submit(&self, _call: &ContractCall) -> Result<SubmittedTx, ChainError> {
        Err(ChainError::Unsupported("transaction submission requires a wallet".to_string()))
    }

    async fn relay_progress(&self, _source_tx_hash: &str) -> Result<RelayProgress, ChainError> {
        Err(ChainError::Unsupported("relay tracking requires a bridge indexer".to_string()))
    }
}
