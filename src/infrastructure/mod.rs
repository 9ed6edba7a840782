//! Infrastructure layer - chain access and durable storage

pub mod chain;
pub mod storage;

pub use chain::{ChainExecutor, ContractCall, JsonRpcChainExecutor, SimulatedChainExecutor};
pub use storage::{FileStore, KeyValueStore, MemoryStore, TransactionStore};
