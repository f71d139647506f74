use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::actor::AccountId;
use crate::domain::request::{ApprovalChannel, DecisionChannel, RequestId};

/// What happened to a request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RequestEventKind {
    /// Request created
    Submitted,
    /// Sent for a decision through `channel`
    RoutedForReview {
        /// Channel the decision is expected on
        channel: ApprovalChannel,
    },
    /// Approved without review by the approval matrix
    AutoApproved,
    /// Approver decision recorded
    Decided {
        /// Outcome
        approved: bool,
        /// Channel the decision arrived on
        channel: DecisionChannel,
    },
    /// Asset handed over
    Issued,
    /// Borrower confirmed receipt
    InUse,
    /// Loan period passed without return
    Overdue,
    /// Asset returned
    Returned {
        /// Whether the condition report indicated damage
        damaged: bool,
    },
    /// Guest submission bound to an account
    Claimed {
        /// New owner
        account_id: AccountId,
    },
}

/// Event recorded on the request aggregate during a transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestEvent {
    /// Request the event belongs to
    pub request_id: RequestId,

    /// What happened
    pub kind: RequestEventKind,

    /// When it happened
    pub timestamp: DateTime<Utc>,
}

impl RequestEvent {
    /// Returns the type of the event as a string
    pub fn event_type(&self) -> &'static str {
        match &self.kind {
            RequestEventKind::Submitted => "request.submitted",
            RequestEventKind::RoutedForReview { .. } => "request.routed",
            RequestEventKind::AutoApproved => "request.auto_approved",
            RequestEventKind::Decided { approved: true, .. } => "request.approved",
            RequestEventKind::Decided { approved: false, .. } => "request.rejected",
            RequestEventKind::Issued => "loan.issued",
            RequestEventKind::InUse => "loan.in_use",
            RequestEventKind::Overdue => "loan.overdue",
            RequestEventKind::Returned { .. } => "loan.returned",
            RequestEventKind::Claimed { .. } => "request.claimed",
        }
    }
}
