//! Builds new transactions from the step definition table

use chrono::Utc;
use uuid::Uuid;

use super::{InvestmentMethod, Step, StepDefinitions, StepStatus, Transaction, TransactionStatus};
use crate::shared::errors::ValidationError;
use crate::shared::utils::is_decimal_amount;

pub struct TransactionFactory;

impl TransactionFactory {
    /// Create a pending transaction with every step of `method` pending.
    /// `investor_address` starts empty; the registry patches it later.
    pub fn create(
        property_address: &str,
        amount: &str,
        shares: u32,
        method: InvestmentMethod,
    ) -> Result<Transaction, ValidationError> {
        if !is_decimal_amount(amount) {
            return Err(ValidationError::InvalidAmount(amount.to_string()));
        }
        if shares == 0 {
            return Err(ValidationError::InvalidShares);
        }

        let id = Uuid::new_v4().to_string();
        let steps = StepDefinitions::for_method(method)
            .iter()
            .enumerate()
            .map(|(index, template)| Step {
                id: Self::step_id(&id, index),
                kind: template.kind,
                title: template.title.to_string(),
                description: template.description.to_string(),
                status: StepStatus::Pending,
                tx_hash: None,
                block_number: None,
                gas_used: None,
                timestamp: None,
                chain_id: None,
                error_message: None,
                estimated_duration_secs: template.estimated_duration_secs,
            })
            .collect();

        Ok(Transaction {
            id,
            property_address: property_address.to_string(),
            investor_address: String::new(),
            amount: amount.to_string(),
            shares,
            method,
            steps,
            overall_status: TransactionStatus::Pending,
            start_time: Utc::now(),
            completion_time: None,
            total_gas_used: None,
            receipt: None,
        })
    }

    pub fn step_id(transaction_id: &str, index: usize) -> String {
        format!("{}-step-{}", transaction_id, index)
    }
}
