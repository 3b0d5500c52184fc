//! Prism Gateway - Main entry point.

use anyhow::Result;
use prism_common::logging::init_logging;
use prism_common::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    init_logging(
        &config.observability.log_level,
        &config.observability.log_format,
    );

    tracing::info!("Prism Gateway v{}", env!("CARGO_PKG_VERSION"));
    if config.hf_token().is_none() {
        tracing::warn!("No HF_TOKEN configured; inference calls will be unauthenticated");
    }

    // Start the gateway server
    prism_gateway::start_server(&config).await
}
