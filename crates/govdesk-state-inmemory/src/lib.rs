//! In-memory state store implementation for the GovDesk platform
//!
//! This crate provides in-memory implementations of the repository and
//! collaborator interfaces defined in the govdesk-core crate. It is
//! primarily useful for development, testing, and single-node deployments
//! where persistence is not required.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

pub mod repositories;
pub use repositories::{
    InMemoryAssetRepository, InMemoryCrossModuleLinkRepository, InMemoryRequestRepository,
};

pub mod collaborators;
pub use collaborators::{
    InMemoryMaintenanceModule, MaintenanceTicket, QueuedNotification,
    QueuedNotificationDispatcher, RecordingAuditEmitter, StaticCapabilityTable,
};

use govdesk_core::{
    AssetId, AssetStatus, Clock, CoreError, WorkflowConfig, WorkflowDependencies, WorkflowEngine,
};

/// Provider for in-memory stores and collaborators
///
/// Handles are kept as concrete types so that callers can inspect what the
/// workflow did (queued notifications, audit records, tickets) or inject
/// failures.
pub struct InMemoryStateStoreProvider {
    /// Request store
    pub requests: Arc<InMemoryRequestRepository>,
    /// Asset store
    pub assets: Arc<InMemoryAssetRepository>,
    /// Cross-module link store
    pub links: Arc<InMemoryCrossModuleLinkRepository>,
    /// Maintenance module
    pub maintenance: Arc<InMemoryMaintenanceModule>,
    /// Audit sink
    pub audit: Arc<RecordingAuditEmitter>,
    /// Notification queue
    pub notifications: Arc<QueuedNotificationDispatcher>,
    /// Capability grants
    pub capabilities: Arc<StaticCapabilityTable>,
}

impl InMemoryStateStoreProvider {
    /// Create a new in-memory state store provider
    pub fn new() -> Self {
        Self {
            requests: Arc::new(InMemoryRequestRepository::new(
                Arc::new(RwLock::new(HashMap::new())),
                Arc::new(RwLock::new(HashMap::new())),
            )),
            assets: Arc::new(InMemoryAssetRepository::new(Arc::new(RwLock::new(
                HashMap::new(),
            )))),
            links: Arc::new(InMemoryCrossModuleLinkRepository::new(Arc::new(
                RwLock::new(HashMap::new()),
            ))),
            maintenance: Arc::new(InMemoryMaintenanceModule::new()),
            audit: Arc::new(RecordingAuditEmitter::new()),
            notifications: Arc::new(QueuedNotificationDispatcher::new()),
            capabilities: Arc::new(StaticCapabilityTable::new()),
        }
    }

    /// Register loanable assets as available
    pub async fn with_available_assets<I, S>(self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for id in ids {
            self.assets
                .register(AssetId(id.into()), AssetStatus::Available)
                .await;
        }
        self
    }

    /// Wire the stores into [`WorkflowDependencies`]
    pub fn dependencies(&self, clock: Arc<dyn Clock>) -> WorkflowDependencies {
        WorkflowDependencies {
            requests: self.requests.clone(),
            assets: self.assets.clone(),
            links: self.links.clone(),
            gateway: self.maintenance.clone(),
            audit: self.audit.clone(),
            notifications: self.notifications.clone(),
            capabilities: self.capabilities.clone(),
            clock,
        }
    }

    /// Build a workflow engine over these stores
    pub fn create_engine(
        &self,
        config: WorkflowConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<WorkflowEngine, CoreError> {
        WorkflowEngine::new(config, self.dependencies(clock))
    }
}

impl Default for InMemoryStateStoreProvider {
    fn default() -> Self {
        Self::new()
    }
}
