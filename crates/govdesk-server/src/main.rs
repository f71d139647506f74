use anyhow::{Context, Result};
use govdesk_server::config::ServerConfig;

#[tokio::main]
async fn main() -> Result<()> {
    govdesk_monitoring::init_logging(&ServerConfig::logging_from_env())
        .context("Failed to initialize logging")?;

    // Load configuration from environment variables
    let config = ServerConfig::load().context("Failed to load configuration")?;

    govdesk_server::run(config).await.context("Server error")?;

    Ok(())
}
