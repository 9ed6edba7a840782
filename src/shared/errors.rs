//! Error handling for the application

use thiserror::Error;

use crate::domain::transaction::{StepStatus, TransactionStatus};

/// Caller errors, returned synchronously from registry operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),

    #[error("Step {step_id} not found in transaction {transaction_id}")]
    StepNotFound {
        transaction_id: String,
        step_id: String,
    },

    #[error("Step {step_id} is not pending (status: {status})")]
    StepNotPending { step_id: String, status: StepStatus },

    #[error("Transaction {transaction_id} cannot advance (status: {status})")]
    TransactionNotActive {
        transaction_id: String,
        status: TransactionStatus,
    },

    #[error("Invalid amount: {0:?}")]
    InvalidAmount(String),

    #[error("Share count must be greater than zero")]
    InvalidShares,
}

/// Errors reported by the external chain executor
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChainError {
    /// Call reverted; carries the human-readable reason verbatim
    #[error("{0}")]
    Reverted(String),

    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Operation not supported by this executor: {0}")]
    Unsupported(String),
}

/// Step handler failures. Absorbed into the step record, never returned to callers.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecutionError {
    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error("Network switch to chain {0} was rejected")]
    NetworkSwitchRejected(u64),

    #[error("Missing prerequisite: {0}")]
    MissingPrerequisite(String),

    #[error("Cancelled by user")]
    Cancelled,
}

/// Storage read/write failures
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Storage IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Storage(String),
}

/// General application error
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Persistence error: {0}")]
    PersistenceError(String),

    #[error("Blockchain error: {0}")]
    BlockchainError(String),

    #[error("Output error: {0}")]
    OutputError(#[from] serde_json::Error),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl From<PersistenceError> for AppError {
    fn from(err: PersistenceError) -> Self {
        AppError::PersistenceError(err.to_string())
    }
}

impl From<ChainError> for AppError {
    fn from(err: ChainError) -> Self {
        AppError::BlockchainError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_revert_reason_is_verbatim() {
        let err = ExecutionError::from(ChainError::Reverted("insufficient funds".to_string()));
        assert_eq!(err.to_string(), "insufficient funds");
    }

    #[test]
    fn test_cancelled_message() {
        assert_eq!(ExecutionError::Cancelled.to_string(), "Cancelled by user");
    }

    #[test]
    fn test_validation_into_app_error() {
        let err: AppError = ValidationError::InvalidShares.into();
        assert!(matches!(err, AppError::Validation(ValidationError::InvalidShares)));
    }
}
