//! CLI commands and handlers

use clap::{Parser, Subcommand};
use futures::StreamExt;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

use crate::application::registry::TransactionRegistry;
use crate::domain::transaction::{InvestmentMethod, StepDefinitions, StepStatus, Transaction};
use crate::shared::errors::{AppError, ValidationError};
use crate::shared::utils::format_wei_as_eth;

#[derive(Parser)]
#[command(name = "invest-orchestrator")]
#[command(version, about = "Multi-step property investment transaction orchestrator")]
pub struct Cli {
    /// Path to a TOML config file (defaults to ./Config.toml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory for persisted transactions (overrides config)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// JSON-RPC endpoint; switches to the read-only RPC executor (overrides config)
    #[arg(long, global = true)]
    pub rpc_url: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a new investment transaction
    Invest {
        /// Property contract address
        #[arg(long)]
        property: String,

        /// Amount to invest, as a decimal string
        #[arg(long)]
        amount: String,

        #[arg(long)]
        shares: u32,

        /// direct or cross-chain
        #[arg(long, default_value = "direct")]
        method: InvestmentMethod,

        /// Execute every step right away
        #[arg(long)]
        run: bool,
    },

    /// Run the remaining steps of a transaction
    Run { id: String },

    /// Run a single step
    Step { id: String, step_id: String },

    /// List transactions
    List {
        /// Only transactions of this investor
        #[arg(long)]
        investor: Option<String>,
    },

    /// Show one transaction as JSON
    Show { id: String },

    /// Reset failed steps so the transaction can continue
    Retry { id: String },

    /// Cancel a transaction
    Cancel { id: String },

    /// Dry-run a contract call
    Simulate {
        contract: String,
        function: String,
        args: Vec<String>,

        /// Native value in wei
        #[arg(long, default_value_t = 0)]
        value: u128,
    },

    /// Show gas prices
    Gas {
        /// Keep polling for this many seconds
        #[arg(long)]
        watch: Option<u64>,
    },

    /// Counts by status
    Stats,
}

pub struct CommandExecutor;

impl CommandExecutor {
    /// Execute the selected command
    pub async fn execute(command: Commands, registry: &TransactionRegistry) -> Result<(), AppError> {
        match command {
            Commands::Invest {
                property,
                amount,
                shares,
                method,
                run,
            } => Self::execute_invest_command(registry, &property, &amount, shares, method, run).await,
            Commands::Run { id } => {
                let tx = registry.execute_all(&id).await?;
                Self::print_summary(registry, &tx);
                Ok(())
            }
            Commands::Step { id, step_id } => {
                let step = registry.execute_step(&id, &step_id).await?;
                if step.status == StepStatus::Failed {
                    warn!(step = %step.title, error = ?step.error_message, "step failed");
                }
                Self::print_json(&step)
            }
            Commands::List { investor } => {
                let transactions = match investor {
                    Some(investor) => registry.get_user_transactions(&investor).await,
                    None => registry.get_all_transactions().await,
                };
                if transactions.is_empty() {
                    info!("No transactions");
                }
                for tx in &transactions {
                    Self::print_summary(registry, tx);
                }
                Ok(())
            }
            Commands::Show { id } => {
                let tx = registry
                    .get_transaction(&id)
                    .await
                    .ok_or(ValidationError::TransactionNotFound(id))?;
                Self::print_json(&tx)
            }
            Commands::Retry { id } => {
                if registry.retry_transaction(&id).await? {
                    info!(tx_id = %id, "transaction reset, run it again to continue");
                } else {
                    warn!(tx_id = %id, "nothing to retry: transaction completed or a step is running");
                }
                Ok(())
            }
            Commands::Cancel { id } => {
                if registry.cancel_transaction(&id).await? {
                    info!(tx_id = %id, "transaction cancelled");
                } else {
                    warn!(tx_id = %id, "transaction already completed");
                }
                Ok(())
            }
            Commands::Simulate {
                contract,
                function,
                args,
                value,
            } => {
                let result = registry.simulate(&contract, &function, &args, value).await;
                Self::print_json(&result)
            }
            Commands::Gas { watch } => Self::execute_gas_command(registry, watch).await,
            Commands::Stats => Self::print_json(&registry.stats().await),
        }
    }

    async fn execute_invest_command(
        registry: &TransactionRegistry,
        property: &str,
        amount: &str,
        shares: u32,
        method: InvestmentMethod,
        run: bool,
    ) -> Result<(), AppError> {
        let tx = registry
            .create_investment_transaction(property, amount, shares, method)
            .await?;
        info!(
            tx_id = %tx.id,
            steps = tx.steps.len(),
            estimated_secs = StepDefinitions::total_estimated_duration_secs(method),
            "transaction created"
        );

        let tx = if run { registry.execute_all(&tx.id).await? } else { tx };
        Self::print_summary(registry, &tx);
        Ok(())
    }

    async fn execute_gas_command(registry: &TransactionRegistry, watch: Option<u64>) -> Result<(), AppError> {
        let Some(seconds) = watch else {
            let snapshot = registry.gas_monitor().poll_once().await?;
            return Self::print_json(&snapshot);
        };

        let mut prices = registry.subscribe_gas_prices();
        registry.start_gas_monitor();
        let deadline = tokio::time::sleep(Duration::from_secs(seconds));
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = &mut deadline => break,
                update = prices.next() => match update {
                    Some(snapshots) => {
                        for snapshot in snapshots.values() {
                            info!(
                                chain_id = snapshot.chain_id,
                                slow = %snapshot.slow,
                                standard = %snapshot.standard,
                                fast = %snapshot.fast,
                                "gas prices"
                            );
                        }
                    }
                    None => break,
                },
            }
        }

        registry.shutdown().await;
        Ok(())
    }

    fn print_summary(registry: &TransactionRegistry, tx: &Transaction) {
        let done = tx
            .steps
            .iter()
            .filter(|s| s.status == StepStatus::Completed)
            .count();
        println!(
            "{}  {:<11} {:<11} {}/{} steps  {} shares of {} for {}  cost ~{} ETH",
            tx.id,
            tx.method,
            tx.overall_status,
            done,
            tx.steps.len(),
            tx.shares,
            tx.property_address,
            tx.amount,
            format_wei_as_eth(registry.calculate_transaction_cost(tx)),
        );
        if let Some(failed) = tx.steps.iter().find(|s| s.status == StepStatus::Failed) {
            println!(
                "    {} failed: {}",
                failed.title,
                failed.error_message.as_deref().unwrap_or("unknown error")
            );
        }
        if let Some(receipt) = &tx.receipt {
            println!("    receipt {}  final tx {}", receipt.confirmation_number, receipt.final_tx_hash);
        }
    }

    fn print_json<T: Serialize>(value: &T) -> Result<(), AppError> {
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(())
    }
}
