//! Application layer - registry façade and CLI commands

pub mod commands;
pub mod registry;

pub use commands::{Cli, CommandExecutor, Commands};
pub use registry::{RegistryStats, TransactionRegistry};
