use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::domain::asset::{AssetId, MaintenanceSeverity};
use crate::domain::reference::ReferenceNumber;
use crate::domain::request::RequestId;

/// Event name that raises a maintenance ticket from a loan return
pub const DAMAGED_RETURN_EVENT: &str = "loan.returned_damaged";

/// Kind of record created in a sibling module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkedRecordKind {
    /// Helpdesk maintenance ticket
    MaintenanceTicket,
}

impl fmt::Display for LinkedRecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkedRecordKind::MaintenanceTicket => f.write_str("maintenance_ticket"),
        }
    }
}

/// Context captured when the link was written
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkSnapshot {
    /// Asset the ticket is about
    pub asset_id: AssetId,
    /// Reference of the originating request
    pub reference: ReferenceNumber,
    /// Severity the ticket was raised with
    pub severity: MaintenanceSeverity,
    /// Damage description from the condition report
    pub damage_description: Option<String>,
    /// When the triggering transition committed
    pub triggered_at: DateTime<Utc>,
}

/// Causal edge from a request to a record in a sibling module.
/// Written once per triggering event and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossModuleLink {
    /// Link identifier
    pub id: String,
    /// Originating request
    pub request_id: RequestId,
    /// Name of the triggering event
    pub trigger_event: String,
    /// Kind of the linked record
    pub linked_kind: LinkedRecordKind,
    /// Identifier returned by the sibling module
    pub linked_record_id: String,
    /// Context at link time
    pub snapshot: LinkSnapshot,
    /// When the link was written
    pub created_at: DateTime<Utc>,
}

impl CrossModuleLink {
    /// Create a link
    pub fn new(
        request_id: RequestId,
        trigger_event: impl Into<String>,
        linked_kind: LinkedRecordKind,
        linked_record_id: impl Into<String>,
        snapshot: LinkSnapshot,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            request_id,
            trigger_event: trigger_event.into(),
            linked_kind,
            linked_record_id: linked_record_id.into(),
            snapshot,
            created_at,
        }
    }

    /// Key used to make sibling-module calls idempotent
    pub fn idempotency_key(reference: &ReferenceNumber, trigger_event: &str) -> String {
        format!("{}:{}", reference, trigger_event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_idempotency_key() {
        let reference =
            ReferenceNumber::new("LA", NaiveDate::from_ymd_opt(2024, 3, 15).unwrap(), 3);
        assert_eq!(
            CrossModuleLink::idempotency_key(&reference, DAMAGED_RETURN_EVENT),
            "LA202403150003:loan.returned_damaged"
        );
    }
}
