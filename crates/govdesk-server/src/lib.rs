//!
//! GovDesk Server - HTTP boundary for the GovDesk IT-service platform
//!
//! Serves the e-mailed approval link, guest submissions and state lookups
//! on top of [`govdesk_core::WorkflowEngine`], and runs the workflow's
//! scheduled sweeps in the background.

use std::sync::Arc;
use tracing::info;

use govdesk_core::{Clock, SystemClock, WorkflowEngine};
use govdesk_state_inmemory::InMemoryStateStoreProvider;

/// API module
pub mod api;

/// Configuration module
pub mod config;

/// Error module
pub mod error;

/// Server module
pub mod server;

// Re-export key types
pub use api::build_router;
pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use server::GovDeskServer;

/// Wire a workflow engine over the in-memory stores
pub async fn in_memory_engine(
    config: &ServerConfig,
    clock: Arc<dyn Clock>,
) -> ServerResult<(InMemoryStateStoreProvider, Arc<WorkflowEngine>)> {
    let provider = InMemoryStateStoreProvider::new()
        .with_available_assets(config.available_assets.iter().cloned())
        .await;
    let engine = provider.create_engine(config.workflow.clone(), clock)?;
    Ok((provider, Arc::new(engine)))
}

/// Run function
pub async fn run(config: ServerConfig) -> ServerResult<()> {
    let (_provider, engine) = in_memory_engine(&config, Arc::new(SystemClock)).await?;
    info!(
        assets = config.available_assets.len(),
        "Workflow engine ready on in-memory stores"
    );

    GovDeskServer::new(config, engine)
        .run(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
    }
}
