use anyhow::{Context, Result};

use ticket_gateway::{config::AppConfig, server, telemetry};

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::from_env().context("failed to load configuration")?;
    telemetry::init("ticket-gateway", &config.log, config.debug)?;
    server::run(config).await
}
