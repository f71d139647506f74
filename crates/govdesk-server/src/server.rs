//! Server implementation
//!
//! Binds the HTTP listener and runs the workflow scheduler next to it. Both
//! stop on the same shutdown signal.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;

use govdesk_core::{WorkflowEngine, WorkflowScheduler};
use govdesk_monitoring::LogExt;

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};

/// The GovDesk HTTP server
pub struct GovDeskServer {
    config: ServerConfig,
    engine: Arc<WorkflowEngine>,
}

impl GovDeskServer {
    /// Create a server around a workflow engine
    pub fn new(config: ServerConfig, engine: Arc<WorkflowEngine>) -> Self {
        Self { config, engine }
    }

    /// Active configuration
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Workflow engine behind the API
    pub fn engine(&self) -> &Arc<WorkflowEngine> {
        &self.engine
    }

    /// Serve until `shutdown` resolves, then stop the scheduler
    pub async fn run<F>(self, shutdown: F) -> ServerResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        info!("Starting GovDesk server");

        let addr: SocketAddr = format!("{}:{}", self.config.bind_address, self.config.port)
            .parse()
            .map_err(|e| {
                ServerError::ConfigError(format!(
                    "Invalid bind address {}:{}: {}",
                    self.config.bind_address, self.config.port, e
                ))
            })?;

        let (stop_tx, stop_rx) = watch::channel(false);
        let scheduler = WorkflowScheduler::new(self.engine.clone()).spawn(stop_rx);

        let app = crate::api::build_router(Arc::new(self));
        let listener = TcpListener::bind(addr).await?;
        info!("Listening on {}", listener.local_addr()?);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
            .log_err("HTTP server failed")?;

        info!("HTTP server stopped, waiting for scheduler");
        // The receiver is gone once the scheduler has exited on its own
        let _ = stop_tx.send(true);
        scheduler.await.log_err("Workflow scheduler task failed")?;
        Ok(())
    }
}
