//! MCP Hub - aggregate multiple MCP servers behind one stdio endpoint

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use mcp_hub::{
    cli::Cli, config::load_descriptors, gateway::Hub, setup_tracing,
    transport::DefaultTransportFactory,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    let descriptors = load_descriptors(&cli.config);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        backends = descriptors.len(),
        "Starting MCP Hub"
    );

    let hub = match Hub::start(&descriptors, Arc::new(DefaultTransportFactory)).await {
        Ok(hub) => hub,
        Err(e) => {
            error!("Failed to start hub: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = hub.run().await {
        error!("Hub error: {e}");
        return ExitCode::FAILURE;
    }

    info!("Hub shutdown complete");
    ExitCode::SUCCESS
}
