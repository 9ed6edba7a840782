mod app;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use invest_orchestrator::application::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    app::run(cli).await
}
