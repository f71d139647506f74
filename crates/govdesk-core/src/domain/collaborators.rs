//! Ports to collaborators outside the workflow core
//!
//! Audit storage, notification delivery, role storage and the sibling
//! maintenance module are consumed through these traits only.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::actor::{Account, AccountId, AuditActor};
use super::link::LinkedRecordKind;
use crate::CoreError;

/// Capability names checked through [`CapabilityCheck`]
pub mod capabilities {
    /// Decide requests through the portal
    pub const APPROVE_REQUESTS: &str = "requests.approve";
    /// Decide requests bound to another approver
    pub const OVERRIDE_APPROVER: &str = "requests.approve.override";
    /// Issue assets, confirm receipt, and record returns
    pub const MANAGE_LOANS: &str = "loans.manage";
    /// Receives admin-preparation notifications for approved requests
    pub const PREPARE_ASSETS: &str = "loans.prepare";
}

/// Immutable before/after change record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Entity type, e.g. `service_request`
    pub entity_type: String,
    /// Entity identifier
    pub entity_id: String,
    /// Event name, e.g. `request.approved` or `transition_rejected`
    pub event: String,
    /// Changed fields before the change
    pub old_values: Value,
    /// Changed fields after the change
    pub new_values: Value,
    /// Who caused it
    pub actor: AuditActor,
    /// When it was recorded
    pub recorded_at: DateTime<Utc>,
}

impl AuditRecord {
    /// Record of a committed change. Only fields that differ between
    /// `before` and `after` are kept.
    pub fn change(
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
        event: impl Into<String>,
        before: &Value,
        after: &Value,
        actor: AuditActor,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        let (old_values, new_values) = changed_fields(before, after);
        Self {
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
            event: event.into(),
            old_values,
            new_values,
            actor,
            recorded_at,
        }
    }
}

/// Split two JSON objects into the changed fields of each side
pub fn changed_fields(before: &Value, after: &Value) -> (Value, Value) {
    let empty = Map::new();
    let before = before.as_object().unwrap_or(&empty);
    let after = after.as_object().unwrap_or(&empty);

    let mut old_values = Map::new();
    let mut new_values = Map::new();
    for key in before.keys().chain(after.keys()) {
        if old_values.contains_key(key) || new_values.contains_key(key) {
            continue;
        }
        let old = before.get(key).cloned().unwrap_or(Value::Null);
        let new = after.get(key).cloned().unwrap_or(Value::Null);
        if old != new {
            old_values.insert(key.clone(), old);
            new_values.insert(key.clone(), new);
        }
    }
    (Value::Object(old_values), Value::Object(new_values))
}

/// Receives audit records. Called after every committed transition and
/// every rejected attempt.
#[async_trait]
pub trait AuditEmitter: Send + Sync {
    /// Record one change
    async fn record(&self, record: AuditRecord) -> Result<(), CoreError>;
}

/// Notification templates the core asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// Request received
    SubmissionConfirmation,
    /// Approver asked to decide; carries the approval link token
    ApprovalRequested,
    /// Requester told the outcome
    DecisionOutcome,
    /// Asset staff told to prepare an approved loan
    AdminPreparation,
    /// Loan ends soon
    DueSoonReminder,
    /// Loan is overdue
    OverdueReminder,
    /// Asset received back
    ReturnConfirmation,
}

/// Who a notification goes to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Recipient {
    /// A portal account
    Account {
        /// Account
        account_id: AccountId,
    },
    /// A bare e-mail address (guest or e-mail approver)
    Email {
        /// Address
        email: String,
    },
    /// Everyone holding a capability
    CapabilityHolders {
        /// Capability name
        capability: String,
    },
}

/// Fire-and-forget notification queue. The core passes structured context
/// and never formats user-facing text.
pub trait NotificationDispatcher: Send + Sync {
    /// Queue a notification. Must not block on delivery.
    fn queue(
        &self,
        kind: NotificationKind,
        recipient: Recipient,
        context: Value,
    ) -> Result<(), CoreError>;
}

/// Opaque capability oracle backed by role storage
#[async_trait]
pub trait CapabilityCheck: Send + Sync {
    /// Whether `account` holds `capability`
    async fn has_capability(&self, account: &Account, capability: &str) -> bool;
}

/// Creates records in a sibling module
#[async_trait]
pub trait SiblingModuleGateway: Send + Sync {
    /// Create a record and return its identifier. Payloads carry an
    /// `idempotency_key`; repeating a call with the same key returns the
    /// existing record.
    async fn create_linked_record(
        &self,
        kind: LinkedRecordKind,
        payload: Value,
    ) -> Result<String, CoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_changed_fields_keeps_only_differences() {
        let before = json!({"state": "UNDER_REVIEW", "unit": "ICT", "decided_by": null});
        let after = json!({"state": "APPROVED", "unit": "ICT", "decided_by": "boss@x.com"});

        let (old, new) = changed_fields(&before, &after);
        assert_eq!(old, json!({"state": "UNDER_REVIEW", "decided_by": null}));
        assert_eq!(new, json!({"state": "APPROVED", "decided_by": "boss@x.com"}));
    }

    #[test]
    fn test_changed_fields_handles_added_keys() {
        let (old, new) = changed_fields(&json!({}), &json!({"state": "SUBMITTED"}));
        assert_eq!(old, json!({"state": null}));
        assert_eq!(new, json!({"state": "SUBMITTED"}));
    }

    #[test]
    fn test_audit_record_change() {
        let record = AuditRecord::change(
            "service_request",
            "r-1",
            "request.claimed",
            &json!({"owner_account_id": null}),
            &json!({"owner_account_id": "u-1"}),
            AuditActor::System,
            Utc::now(),
        );
        assert_eq!(record.new_values["owner_account_id"], "u-1");
    }
}
