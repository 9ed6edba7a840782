// src/app.rs
use anyhow::Result;
use std::sync::Arc;
use tracing::info;

use invest_orchestrator::application::{Cli, CommandExecutor, TransactionRegistry};
use invest_orchestrator::infrastructure::{
    ChainExecutor, FileStore, JsonRpcChainExecutor, SimulatedChainExecutor,
};
use invest_orchestrator::shared::config::ConfigLoader;
use invest_orchestrator::OrchestratorConfig;

/// Resolve configuration with priority: CLI flags > config file > defaults
pub fn resolve_config(cli: &Cli) -> Result<OrchestratorConfig> {
    let mut config = match &cli.config {
        Some(path) => ConfigLoader::load_config(path)?,
        None => ConfigLoader::load_or_default()?,
    };

    if let Some(data_dir) = &cli.data_dir {
        config.storage.path = data_dir.clone();
    }
    if let Some(rpc_url) = &cli.rpc_url {
        config.network.rpc_url = Some(rpc_url.clone());
    }
    Ok(config)
}

fn build_chain(config: &OrchestratorConfig) -> Result<Arc<dyn ChainExecutor>> {
    match &config.network.rpc_url {
        Some(url) => {
            info!(%url, "using JSON-RPC chain executor");
            Ok(Arc::new(JsonRpcChainExecutor::new(url.clone(), config.network.timeout())?))
        }
        None => {
            info!(network = config.network.source_chain_id, "using simulated chain executor");
            Ok(Arc::new(SimulatedChainExecutor::new(
                config.simulated.clone(),
                config.network.source_chain_id,
            )))
        }
    }
}

pub async fn run(cli: Cli) -> Result<()> {
    let config = resolve_config(&cli)?;
    let chain = build_chain(&config)?;
    let store = Arc::new(FileStore::new(config.storage.path.clone()));
    info!(path = %store.root().display(), "using file store");
    let registry = TransactionRegistry::load(&config, store, chain).await;

    CommandExecutor::execute(cli.command, &registry).await?;
    registry.shutdown().await;
    Ok(())
}
