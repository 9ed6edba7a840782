//! Invest Orchestrator - multi-step property investment transactions
//! Built with Domain-Driven Design principles

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod shared;

// Re-export main types for convenience
pub use application::TransactionRegistry;
pub use domain::gas::{GasPriceSnapshot, SimulationResult};
pub use domain::transaction::{
    InvestmentMethod, Receipt, Step, StepKind, StepStatus, Transaction, TransactionStatus,
};
pub use infrastructure::chain::{ChainExecutor, JsonRpcChainExecutor, SimulatedChainExecutor};
pub use infrastructure::storage::{FileStore, KeyValueStore, MemoryStore};
pub use shared::types::OrchestratorConfig;
