//! Transaction domain - investment transactions, their steps and execution

mod handlers;
mod repository;
mod status_aggregator;
mod step_definitions;
mod step_executor;
mod transaction_factory;

pub use repository::{TransactionControl, TransactionRepository};
pub use status_aggregator::StatusAggregator;
pub use step_definitions::{StepDefinitions, StepTemplate};
pub use step_executor::{ExecutorSettings, StepExecutor};
pub use transaction_factory::TransactionFactory;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::shared::types::ChainId;
use crate::shared::utils::{option_u128_string, option_u64_string};

/// Error message written to steps stopped by a cancel
pub const CANCELLED_BY_USER: &str = "Cancelled by user";

/// Error message written to steps found running after a restart
pub const INTERRUPTED_BY_RESTART: &str = "Interrupted by restart";

/// How the investor's funds reach the property contract
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InvestmentMethod {
    Direct,
    CrossChain,
}

impl InvestmentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvestmentMethod::Direct => "direct",
            InvestmentMethod::CrossChain => "cross-chain",
        }
    }
}

impl fmt::Display for InvestmentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InvestmentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "direct" => Ok(InvestmentMethod::Direct),
            "cross-chain" | "cross_chain" | "crosschain" => Ok(InvestmentMethod::CrossChain),
            other => Err(format!("unknown investment method: {}", other)),
        }
    }
}

/// What a step does; selects its handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    SwitchToSourceNetwork,
    SwitchToDestinationNetwork,
    Approval,
    DirectDeposit,
    CrossChainDeposit,
    RelayMonitor,
    OwnershipConfirm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StepStatus::Pending => "pending",
            StepStatus::InProgress => "in_progress",
            StepStatus::Completed => "completed",
            StepStatus::Failed => "failed",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl TransactionStatus {
    /// No further step may run without a retry
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionStatus::Completed | TransactionStatus::Failed | TransactionStatus::Cancelled
        )
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::InProgress => "in_progress",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Failed => "failed",
            TransactionStatus::Cancelled => "cancelled",
        })
    }
}

/// One atomic unit of an investment transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    pub id: String,
    pub kind: StepKind,
    pub title: String,
    pub description: String,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    #[serde(default, with = "option_u64_string", skip_serializing_if = "Option::is_none")]
    pub block_number: Option<u64>,
    #[serde(default, with = "option_u128_string", skip_serializing_if = "Option::is_none")]
    pub gas_used: Option<u128>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<ChainId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub estimated_duration_secs: u64,
}

impl Step {
    /// Back to `pending`, dropping everything the last attempt recorded
    pub(crate) fn reset(&mut self) {
        self.status = StepStatus::Pending;
        self.tx_hash = None;
        self.block_number = None;
        self.gas_used = None;
        self.timestamp = None;
        self.chain_id = None;
        self.error_message = None;
    }

    pub(crate) fn fail(&mut self, message: impl Into<String>) {
        self.status = StepStatus::Failed;
        self.error_message = Some(message.into());
        self.timestamp = Some(Utc::now());
    }
}

/// Proof handed to the investor once the final step lands
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub confirmation_number: String,
    pub final_tx_hash: String,
    pub proof_of_ownership: String,
}

/// All steps of one investment attempt plus the derived overall status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: String,
    pub property_address: String,
    /// Filled in once the wallet resolves an account; never gates execution
    #[serde(default)]
    pub investor_address: String,
    pub amount: String,
    pub shares: u32,
    pub method: InvestmentMethod,
    pub steps: Vec<Step>,
    pub overall_status: TransactionStatus,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_time: Option<DateTime<Utc>>,
    #[serde(default, with = "option_u128_string", skip_serializing_if = "Option::is_none")]
    pub total_gas_used: Option<u128>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receipt: Option<Receipt>,
}

impl Transaction {
    pub fn step_index(&self, step_id: &str) -> Option<usize> {
        self.steps.iter().position(|s| s.id == step_id)
    }

    /// First step still waiting to run
    pub fn next_pending_step(&self) -> Option<&Step> {
        self.steps.iter().find(|s| s.status == StepStatus::Pending)
    }

    pub fn has_running_step(&self) -> bool {
        self.steps.iter().any(|s| s.status == StepStatus::InProgress)
    }

    /// Σ gas over steps that recorded any
    pub fn summed_gas_used(&self) -> u128 {
        self.steps.iter().filter_map(|s| s.gas_used).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_parsing() {
        assert_eq!("direct".parse::<InvestmentMethod>(), Ok(InvestmentMethod::Direct));
        assert_eq!("cross-chain".parse::<InvestmentMethod>(), Ok(InvestmentMethod::CrossChain));
        assert!("wire".parse::<InvestmentMethod>().is_err());
        assert_eq!(InvestmentMethod::CrossChain.to_string(), "cross-chain");
    }

    #[test]
    fn test_persisted_layout() {
        let mut tx = TransactionFactory::create("0xprop", "1000", 5, InvestmentMethod::CrossChain).unwrap();
        tx.steps[0].gas_used = Some(u128::MAX);
        tx.steps[0].block_number = Some(19_000_001);
        tx.total_gas_used = Some(42);

        let json = serde_json::to_value(&tx).unwrap();
        assert_eq!(json["method"], "cross-chain");
        assert_eq!(json["overallStatus"], "pending");
        assert_eq!(json["propertyAddress"], "0xprop");
        assert_eq!(json["totalGasUsed"], "42");
        assert_eq!(json["steps"][0]["gasUsed"], u128::MAX.to_string());
        assert_eq!(json["steps"][0]["blockNumber"], "19000001");
        assert_eq!(json["steps"][3]["kind"], "relay_monitor");
        assert!(json["steps"][1].get("txHash").is_none());

        let back: Transaction = serde_json::from_value(json).unwrap();
        assert_eq!(back, tx);
    }

    #[test]
    fn test_step_reset_clears_attempt() {
        let tx = TransactionFactory::create("0xprop", "1", 1, InvestmentMethod::Direct).unwrap();
        let mut step = tx.steps[0].clone();
        step.tx_hash = Some("0xabc".to_string());
        step.gas_used = Some(10);
        step.fail("boom");

        step.reset();
        assert_eq!(step.status, StepStatus::Pending);
        assert!(step.tx_hash.is_none());
        assert!(step.gas_used.is_none());
        assert!(step.error_message.is_none());
    }
}
