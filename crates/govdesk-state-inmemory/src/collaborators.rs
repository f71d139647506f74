//! In-process stand-ins for the collaborators outside the workflow core

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use govdesk_core::{
    Account, AccountId, AuditEmitter, AuditRecord, CapabilityCheck, CoreError, LinkedRecordKind,
    NotificationDispatcher, NotificationKind, Recipient, SiblingModuleGateway,
};

use crate::repositories::take_failure;

/// Maintenance ticket held by [`InMemoryMaintenanceModule`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MaintenanceTicket {
    /// Ticket id
    pub id: String,
    /// Record kind requested
    pub kind: LinkedRecordKind,
    /// Payload sent by the core
    pub payload: Value,
    /// When the ticket was opened
    pub opened_at: DateTime<Utc>,
}

/// Helpdesk maintenance module reachable in-process. Creation is
/// idempotent on the payload's `idempotency_key`.
#[derive(Default)]
pub struct InMemoryMaintenanceModule {
    tickets: Mutex<HashMap<String, MaintenanceTicket>>,
    failures_remaining: AtomicUsize,
}

impl InMemoryMaintenanceModule {
    /// Create an empty module
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` creations fail
    pub fn fail_next(&self, count: usize) {
        self.failures_remaining.store(count, Ordering::SeqCst);
    }

    /// Tickets opened so far
    pub fn tickets(&self) -> Vec<MaintenanceTicket> {
        self.tickets.lock().values().cloned().collect()
    }
}

#[async_trait]
impl SiblingModuleGateway for InMemoryMaintenanceModule {
    async fn create_linked_record(
        &self,
        kind: LinkedRecordKind,
        payload: Value,
    ) -> Result<String, CoreError> {
        if take_failure(&self.failures_remaining) {
            return Err(CoreError::ExternalDependencyError(
                "Maintenance module unavailable".to_string(),
            ));
        }

        let key = payload
            .get("idempotency_key")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                CoreError::ValidationError("Payload is missing idempotency_key".to_string())
            })?
            .to_string();

        let mut tickets = self.tickets.lock();
        if let Some(existing) = tickets.get(&key) {
            debug!(ticket_id = %existing.id, "Returning existing maintenance ticket");
            return Ok(existing.id.clone());
        }

        let ticket = MaintenanceTicket {
            id: format!("MT-{:05}", tickets.len() + 1),
            kind,
            payload,
            opened_at: Utc::now(),
        };
        info!(ticket_id = %ticket.id, %kind, "Opened maintenance ticket");
        let id = ticket.id.clone();
        tickets.insert(key, ticket);
        Ok(id)
    }
}

/// Audit emitter that keeps every record in memory
#[derive(Default)]
pub struct RecordingAuditEmitter {
    records: Mutex<Vec<AuditRecord>>,
}

impl RecordingAuditEmitter {
    /// Create an empty emitter
    pub fn new() -> Self {
        Self::default()
    }

    /// All records in emission order
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().clone()
    }

    /// Records for one entity
    pub fn records_for(&self, entity_id: &str) -> Vec<AuditRecord> {
        self.records()
            .into_iter()
            .filter(|r| r.entity_id == entity_id)
            .collect()
    }
}

#[async_trait]
impl AuditEmitter for RecordingAuditEmitter {
    async fn record(&self, record: AuditRecord) -> Result<(), CoreError> {
        self.records.lock().push(record);
        Ok(())
    }
}

/// Notification as queued by the core
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueuedNotification {
    /// Template
    pub kind: NotificationKind,
    /// Recipient
    pub recipient: Recipient,
    /// Structured context
    pub context: Value,
}

/// Dispatcher that only queues; delivery happens elsewhere
#[derive(Default)]
pub struct QueuedNotificationDispatcher {
    queue: Mutex<Vec<QueuedNotification>>,
    failures_remaining: AtomicUsize,
}

impl QueuedNotificationDispatcher {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` queue calls fail
    pub fn fail_next(&self, count: usize) {
        self.failures_remaining.store(count, Ordering::SeqCst);
    }

    /// Everything queued so far
    pub fn queued(&self) -> Vec<QueuedNotification> {
        self.queue.lock().clone()
    }

    /// Queued notifications of one kind
    pub fn queued_of(&self, kind: NotificationKind) -> Vec<QueuedNotification> {
        self.queued().into_iter().filter(|n| n.kind == kind).collect()
    }

    /// Remove and return everything queued
    pub fn drain(&self) -> Vec<QueuedNotification> {
        std::mem::take(&mut *self.queue.lock())
    }
}

impl NotificationDispatcher for QueuedNotificationDispatcher {
    fn queue(
        &self,
        kind: NotificationKind,
        recipient: Recipient,
        context: Value,
    ) -> Result<(), CoreError> {
        if take_failure(&self.failures_remaining) {
            return Err(CoreError::ExternalDependencyError(
                "Notification queue unavailable".to_string(),
            ));
        }
        self.queue.lock().push(QueuedNotification {
            kind,
            recipient,
            context,
        });
        Ok(())
    }
}

/// Capability oracle over a fixed grant table
#[derive(Default)]
pub struct StaticCapabilityTable {
    grants: RwLock<HashMap<AccountId, HashSet<String>>>,
}

impl StaticCapabilityTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant `capability` to `account_id`
    pub fn grant(&self, account_id: &AccountId, capability: &str) {
        self.grants
            .write()
            .entry(account_id.clone())
            .or_default()
            .insert(capability.to_string());
    }

    /// Revoke `capability` from `account_id`
    pub fn revoke(&self, account_id: &AccountId, capability: &str) {
        if let Some(held) = self.grants.write().get_mut(account_id) {
            held.remove(capability);
        }
    }
}

#[async_trait]
impl CapabilityCheck for StaticCapabilityTable {
    async fn has_capability(&self, account: &Account, capability: &str) -> bool {
        self.grants
            .read()
            .get(&account.id)
            .map(|held| held.contains(capability))
            .unwrap_or(false)
    }
}
