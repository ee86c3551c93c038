//! Self-check server binary

use anyhow::Context;
use selfcheck_server::{Config, SelfcheckServer, setup_tracing};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration first (needed for logging settings)
    let config = Config::load().context("failed to load configuration")?;

    let _telemetry_guard = setup_tracing(&config.logging, &config.telemetry)?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Self-check server starting");

    SelfcheckServer::new(config).run().await?;

    // Telemetry guard will flush spans on drop

    Ok(())
}
