use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use uuid::Uuid;

use crate::domain::actor::AccountId;
use crate::domain::asset::{AssetId, ConditionReport};
use crate::domain::events::{RequestEvent, RequestEventKind};
use crate::domain::reference::ReferenceNumber;
use crate::CoreError;

/// Value object: request identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestId(pub String);

impl RequestId {
    /// Fresh random identifier
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which module a request belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    /// Asset loan application
    LoanApplication,
    /// Helpdesk ticket
    HelpdeskTicket,
}

/// Request lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestState {
    /// Created, not yet routed
    Submitted,
    /// Waiting for an approver decision
    UnderReview,
    /// Approved by an approver or the approval matrix
    Approved,
    /// Rejected by an approver
    Rejected,
    /// Asset handed over
    Issued,
    /// Borrower has the asset
    InUse,
    /// Loan period ended without return
    Overdue,
    /// Asset back with the agency
    Returned,
}

impl RequestState {
    /// Every state, in lifecycle order
    pub const ALL: [RequestState; 8] = [
        RequestState::Submitted,
        RequestState::UnderReview,
        RequestState::Approved,
        RequestState::Rejected,
        RequestState::Issued,
        RequestState::InUse,
        RequestState::Overdue,
        RequestState::Returned,
    ];

    /// Whether `self -> next` is an edge of the lifecycle graph
    pub fn can_transition_to(self, next: RequestState) -> bool {
        use RequestState::*;
        matches!(
            (self, next),
            (Submitted, UnderReview)
                | (Submitted, Approved)
                | (UnderReview, Approved)
                | (UnderReview, Rejected)
                | (Approved, Issued)
                | (Issued, InUse)
                | (InUse, Returned)
                | (InUse, Overdue)
                | (Overdue, Returned)
        )
    }

    /// Whether a decision has been recorded
    pub fn is_decided(self) -> bool {
        !matches!(self, RequestState::Submitted | RequestState::UnderReview)
    }

    /// No outgoing edges
    pub fn is_terminal(self) -> bool {
        RequestState::ALL
            .iter()
            .all(|next| !self.can_transition_to(*next))
    }

    /// Canonical upper-case name
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestState::Submitted => "SUBMITTED",
            RequestState::UnderReview => "UNDER_REVIEW",
            RequestState::Approved => "APPROVED",
            RequestState::Rejected => "REJECTED",
            RequestState::Issued => "ISSUED",
            RequestState::InUse => "IN_USE",
            RequestState::Overdue => "OVERDUE",
            RequestState::Returned => "RETURNED",
        }
    }
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inputs to the approval matrix. Fixed once submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingAttributes {
    /// Monetary value of the request
    pub value: Decimal,

    /// Requester's service grade; `None` when unknown
    #[serde(default)]
    pub grade: Option<u8>,

    /// Requester's organisational unit
    pub unit: String,
}

/// Dates a loan covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanPeriod {
    /// First day of the loan
    pub start: NaiveDate,
    /// Last day of the loan; the asset is overdue after this day
    pub end: NaiveDate,
}

/// Who owns a request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Ownership {
    /// Submitted by a logged-in account
    Account {
        /// Owner
        account_id: AccountId,
    },
    /// Submitted by a guest
    Guest {
        /// Guest e-mail
        email: String,
    },
    /// Guest submission later claimed by an account
    Claimed {
        /// Owner since the claim
        account_id: AccountId,
        /// E-mail the guest submitted with; kept for audit only
        guest_email: String,
        /// When the claim happened
        claimed_at: DateTime<Utc>,
    },
}

impl Ownership {
    /// Owning account, if any
    pub fn owner_account_id(&self) -> Option<&AccountId> {
        match self {
            Ownership::Account { account_id } | Ownership::Claimed { account_id, .. } => {
                Some(account_id)
            }
            Ownership::Guest { .. } => None,
        }
    }

    /// Guest e-mail while it is still authoritative for ownership
    pub fn guest_email(&self) -> Option<&str> {
        match self {
            Ownership::Guest { email } => Some(email),
            _ => None,
        }
    }

    /// E-mail the request was submitted under, claimed or not
    pub fn submitted_guest_email(&self) -> Option<&str> {
        match self {
            Ownership::Guest { email } => Some(email),
            Ownership::Claimed { guest_email, .. } => Some(guest_email),
            Ownership::Account { .. } => None,
        }
    }

    /// When the request was claimed
    pub fn claimed_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Ownership::Claimed { claimed_at, .. } => Some(*claimed_at),
            _ => None,
        }
    }
}

/// Channel a pending approval is waiting on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalChannel {
    /// Bearer link e-mailed to the approver
    Email,
    /// Authenticated portal action
    Portal,
}

/// Channel a decision arrived on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionChannel {
    /// Approval link
    Email,
    /// Portal
    Portal,
    /// Approval matrix auto-approval
    System,
}

/// Approval binding held while a request is under review
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "channel", rename_all = "snake_case")]
pub enum PendingApproval {
    /// A specific approver holds an e-mailed token
    Email {
        /// Approver the link was sent to
        approver_email: String,
        /// SHA-256 digest of the token; the token itself is never stored
        token_digest: String,
        /// Token expiry
        expires_at: DateTime<Utc>,
    },
    /// Any portal approver for the unit may decide
    Portal {
        /// Unit queue
        unit: String,
    },
}

impl PendingApproval {
    /// Channel the binding is waiting on
    pub fn channel(&self) -> ApprovalChannel {
        match self {
            PendingApproval::Email { .. } => ApprovalChannel::Email,
            PendingApproval::Portal { .. } => ApprovalChannel::Portal,
        }
    }

    /// Approver e-mail or portal queue name
    pub fn approver_identity(&self) -> String {
        match self {
            PendingApproval::Email { approver_email, .. } => approver_email.clone(),
            PendingApproval::Portal { unit } => format!("portal:{}", unit),
        }
    }

    /// Token expiry for the e-mail channel
    pub fn token_expires_at(&self) -> Option<DateTime<Utc>> {
        match self {
            PendingApproval::Email { expires_at, .. } => Some(*expires_at),
            PendingApproval::Portal { .. } => None,
        }
    }
}

/// Outcome of a decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DecisionOutcome {
    /// Approved
    Approved {
        /// Approver remarks
        remarks: Option<String>,
    },
    /// Rejected
    Rejected {
        /// Why
        reason: Option<String>,
    },
}

impl DecisionOutcome {
    /// Build from the approve/reject flag used at the boundary
    pub fn from_flag(approved: bool, remarks: Option<String>) -> Self {
        let remarks = remarks.filter(|r| !r.trim().is_empty());
        if approved {
            DecisionOutcome::Approved { remarks }
        } else {
            DecisionOutcome::Rejected { reason: remarks }
        }
    }

    /// Whether this is an approval
    pub fn is_approval(&self) -> bool {
        matches!(self, DecisionOutcome::Approved { .. })
    }
}

/// Recorded decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    /// Approve or reject, with remarks
    pub outcome: DecisionOutcome,
    /// Account id, approver e-mail, or `system`
    pub decided_by: String,
    /// When
    pub decided_at: DateTime<Utc>,
    /// Channel
    pub channel: DecisionChannel,
}

/// Who is submitting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Submitter {
    /// Logged-in account
    Account {
        /// Account
        account_id: AccountId,
    },
    /// Guest known by e-mail
    Guest {
        /// E-mail
        email: String,
    },
}

/// Data needed to create a request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRequest {
    /// Module
    pub kind: RequestKind,
    /// Owner at submission
    pub submitter: Submitter,
    /// Why the request is made
    pub purpose: String,
    /// Approval matrix inputs
    pub routing: RoutingAttributes,
    /// Requested asset (loans)
    #[serde(default)]
    pub asset_id: Option<AssetId>,
    /// Loan dates (loans)
    #[serde(default)]
    pub loan_period: Option<LoanPeriod>,
}

impl NewRequest {
    /// Check submission data
    pub fn validate(&self) -> Result<(), CoreError> {
        if let Submitter::Guest { email } = &self.submitter {
            let email = email.trim();
            if email.is_empty() || !email.contains('@') {
                return Err(CoreError::ValidationError(format!(
                    "invalid guest e-mail: {:?}",
                    email
                )));
            }
        }
        if self.purpose.trim().is_empty() {
            return Err(CoreError::ValidationError("purpose is required".to_string()));
        }
        if self.routing.unit.trim().is_empty() {
            return Err(CoreError::ValidationError(
                "organisational unit is required".to_string(),
            ));
        }
        if self.routing.value.is_sign_negative() {
            return Err(CoreError::ValidationError(
                "request value must not be negative".to_string(),
            ));
        }
        if self.kind == RequestKind::LoanApplication {
            if self.asset_id.is_none() {
                return Err(CoreError::ValidationError(
                    "loan applications must name an asset".to_string(),
                ));
            }
            match self.loan_period {
                None => {
                    return Err(CoreError::ValidationError(
                        "loan applications must give a loan period".to_string(),
                    ))
                }
                Some(period) if period.end < period.start => {
                    return Err(CoreError::ValidationError(
                        "loan period ends before it starts".to_string(),
                    ))
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}

/// Aggregate: loan application or helpdesk ticket
#[derive(Debug, Serialize, Deserialize)]
pub struct ServiceRequest {
    /// Unique identifier
    pub id: RequestId,

    /// Human-readable reference, immutable once generated
    pub reference: ReferenceNumber,

    /// Module
    pub kind: RequestKind,

    /// Owner
    pub ownership: Ownership,

    /// Lifecycle state
    pub state: RequestState,

    /// Approval matrix inputs
    pub routing: RoutingAttributes,

    /// Why the request is made
    pub purpose: String,

    /// Requested asset (loans)
    pub asset_id: Option<AssetId>,

    /// Loan dates (loans)
    pub loan_period: Option<LoanPeriod>,

    /// Present only while under review
    pub pending_approval: Option<PendingApproval>,

    /// Digest of the last token bound to this request. Lets a replayed
    /// link resolve to its request; never valid for a decision.
    pub spent_token_digest: Option<String>,

    /// Recorded decision
    pub decision: Option<Decision>,

    /// Report captured on return
    pub condition_report: Option<ConditionReport>,

    /// Set by a damaged return; does not re-open the request
    pub maintenance_required: bool,

    /// Hand-over time
    pub issued_at: Option<DateTime<Utc>>,

    /// Receipt confirmation time
    pub in_use_at: Option<DateTime<Utc>>,

    /// When the loan was marked overdue
    pub overdue_at: Option<DateTime<Utc>>,

    /// Return time
    pub returned_at: Option<DateTime<Utc>>,

    /// Day the last due-soon/overdue reminder was queued
    pub last_reminder_on: Option<NaiveDate>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last updated timestamp
    pub updated_at: DateTime<Utc>,

    /// Incremented by the store on every committed mutation
    pub version: u64,

    /// Domain events
    #[serde(skip)]
    pub events: Vec<RequestEvent>,
}

// Domain events are not cloned
impl Clone for ServiceRequest {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            reference: self.reference.clone(),
            kind: self.kind,
            ownership: self.ownership.clone(),
            state: self.state,
            routing: self.routing.clone(),
            purpose: self.purpose.clone(),
            asset_id: self.asset_id.clone(),
            loan_period: self.loan_period,
            pending_approval: self.pending_approval.clone(),
            spent_token_digest: self.spent_token_digest.clone(),
            decision: self.decision.clone(),
            condition_report: self.condition_report.clone(),
            maintenance_required: self.maintenance_required,
            issued_at: self.issued_at,
            in_use_at: self.in_use_at,
            overdue_at: self.overdue_at,
            returned_at: self.returned_at,
            last_reminder_on: self.last_reminder_on,
            created_at: self.created_at,
            updated_at: self.updated_at,
            version: self.version,
            events: Vec::new(),
        }
    }
}

impl ServiceRequest {
    /// Create a request in `SUBMITTED`
    pub fn submit(
        new: NewRequest,
        reference: ReferenceNumber,
        now: DateTime<Utc>,
    ) -> Result<Self, CoreError> {
        new.validate()?;

        let ownership = match new.submitter {
            Submitter::Account { account_id } => Ownership::Account { account_id },
            Submitter::Guest { email } => Ownership::Guest {
                email: email.trim().to_string(),
            },
        };

        let mut request = Self {
            id: RequestId::generate(),
            reference,
            kind: new.kind,
            ownership,
            state: RequestState::Submitted,
            routing: new.routing,
            purpose: new.purpose,
            asset_id: new.asset_id,
            loan_period: new.loan_period,
            pending_approval: None,
            spent_token_digest: None,
            decision: None,
            condition_report: None,
            maintenance_required: false,
            issued_at: None,
            in_use_at: None,
            overdue_at: None,
            returned_at: None,
            last_reminder_on: None,
            created_at: now,
            updated_at: now,
            version: 0,
            events: Vec::with_capacity(4),
        };
        request.record_event(RequestEventKind::Submitted, now);
        Ok(request)
    }

    fn transition(
        &mut self,
        operation: &str,
        next: RequestState,
        now: DateTime<Utc>,
    ) -> Result<RequestState, CoreError> {
        if !self.state.can_transition_to(next) {
            return Err(CoreError::invalid_state(operation, self.state));
        }
        let previous = self.state;
        self.state = next;
        self.updated_at = now;
        Ok(previous)
    }

    fn ensure_loan(&self, operation: &str) -> Result<(), CoreError> {
        if self.kind != RequestKind::LoanApplication {
            return Err(CoreError::invalid_state(operation, self.state));
        }
        Ok(())
    }

    /// `SUBMITTED -> UNDER_REVIEW` with an approval binding
    pub fn begin_review(
        &mut self,
        pending: PendingApproval,
        now: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        self.transition("route", RequestState::UnderReview, now)?;
        let channel = pending.channel();
        self.pending_approval = Some(pending);
        self.record_event(RequestEventKind::RoutedForReview { channel }, now);
        Ok(())
    }

    /// `SUBMITTED -> APPROVED` by the approval matrix
    pub fn auto_approve(&mut self, now: DateTime<Utc>) -> Result<(), CoreError> {
        if self.state != RequestState::Submitted {
            return Err(CoreError::invalid_state("auto-approve", self.state));
        }
        self.transition("auto-approve", RequestState::Approved, now)?;
        self.decision = Some(Decision {
            outcome: DecisionOutcome::Approved { remarks: None },
            decided_by: "system".to_string(),
            decided_at: now,
            channel: DecisionChannel::System,
        });
        self.record_event(RequestEventKind::AutoApproved, now);
        Ok(())
    }

    /// `UNDER_REVIEW -> APPROVED | REJECTED`. The caller consumes the
    /// approval binding in the same update.
    pub fn record_decision(
        &mut self,
        outcome: DecisionOutcome,
        decided_by: String,
        channel: DecisionChannel,
        now: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        if self.state.is_decided() {
            return Err(CoreError::AlreadyDecided(self.reference.to_string()));
        }
        if self.state != RequestState::UnderReview {
            return Err(CoreError::invalid_state("decide", self.state));
        }

        let approved = outcome.is_approval();
        let next = if approved {
            RequestState::Approved
        } else {
            RequestState::Rejected
        };
        self.transition("decide", next, now)?;
        self.decision = Some(Decision {
            outcome,
            decided_by,
            decided_at: now,
            channel,
        });
        self.record_event(RequestEventKind::Decided { approved, channel }, now);
        Ok(())
    }

    /// `APPROVED -> ISSUED`
    pub fn issue(&mut self, now: DateTime<Utc>) -> Result<(), CoreError> {
        self.ensure_loan("issue")?;
        self.transition("issue", RequestState::Issued, now)?;
        self.issued_at = Some(now);
        self.record_event(RequestEventKind::Issued, now);
        Ok(())
    }

    /// `ISSUED -> IN_USE`
    pub fn mark_in_use(&mut self, now: DateTime<Utc>) -> Result<(), CoreError> {
        self.ensure_loan("mark in use")?;
        self.transition("mark in use", RequestState::InUse, now)?;
        self.in_use_at = Some(now);
        self.record_event(RequestEventKind::InUse, now);
        Ok(())
    }

    /// `IN_USE -> OVERDUE`
    pub fn mark_overdue(&mut self, now: DateTime<Utc>) -> Result<(), CoreError> {
        self.ensure_loan("mark overdue")?;
        self.transition("mark overdue", RequestState::Overdue, now)?;
        self.overdue_at = Some(now);
        self.record_event(RequestEventKind::Overdue, now);
        Ok(())
    }

    /// `IN_USE | OVERDUE -> RETURNED`
    pub fn return_asset(
        &mut self,
        report: ConditionReport,
        now: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        self.ensure_loan("return")?;
        self.transition("return", RequestState::Returned, now)?;
        let damaged = report.indicates_damage();
        self.maintenance_required = damaged;
        self.condition_report = Some(report);
        self.returned_at = Some(now);
        self.record_event(RequestEventKind::Returned { damaged }, now);
        Ok(())
    }

    /// Bind a guest submission to `account_id`. Callers check claimability.
    pub(crate) fn bind_owner(
        &mut self,
        account_id: AccountId,
        now: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        let guest_email = match &self.ownership {
            Ownership::Guest { email } => email.clone(),
            _ => {
                return Err(CoreError::NotClaimable(format!(
                    "{} is not a guest submission",
                    self.reference
                )))
            }
        };
        self.ownership = Ownership::Claimed {
            account_id: account_id.clone(),
            guest_email,
            claimed_at: now,
        };
        self.updated_at = now;
        self.record_event(RequestEventKind::Claimed { account_id }, now);
        Ok(())
    }

    /// Loan still in use after its last day
    pub fn is_past_due(&self, today: NaiveDate) -> bool {
        self.state == RequestState::InUse
            && self.loan_period.map(|p| p.end < today).unwrap_or(false)
    }

    /// Loan in use ending within `days` of `today`
    pub fn is_due_within(&self, today: NaiveDate, days: i64) -> bool {
        self.state == RequestState::InUse
            && self
                .loan_period
                .map(|p| p.end >= today && (p.end - today).num_days() <= days)
                .unwrap_or(false)
    }

    /// Fields exposed to the audit trail. Token material is excluded.
    pub fn audit_view(&self) -> Value {
        let decision = self.decision.as_ref();
        let (remarks, rejection_reason) = match decision.map(|d| &d.outcome) {
            Some(DecisionOutcome::Approved { remarks }) => (remarks.clone(), None),
            Some(DecisionOutcome::Rejected { reason }) => (None, reason.clone()),
            None => (None, None),
        };
        json!({
            "reference": self.reference,
            "state": self.state,
            "owner_account_id": self.ownership.owner_account_id(),
            "guest_email": self.ownership.submitted_guest_email(),
            "claimed_at": self.ownership.claimed_at(),
            "approval_channel": self.pending_approval.as_ref().map(|p| p.channel()),
            "approver_identity": self.pending_approval.as_ref().map(|p| p.approver_identity()),
            "approval_token_expires_at": self.pending_approval.as_ref().and_then(|p| p.token_expires_at()),
            "decided_by": decision.map(|d| d.decided_by.clone()),
            "decided_at": decision.map(|d| d.decided_at),
            "decision_channel": decision.map(|d| d.channel),
            "decision_remarks": remarks,
            "rejection_reason": rejection_reason,
            "maintenance_required": self.maintenance_required,
            "issued_at": self.issued_at,
            "in_use_at": self.in_use_at,
            "overdue_at": self.overdue_at,
            "returned_at": self.returned_at,
        })
    }

    fn record_event(&mut self, kind: RequestEventKind, now: DateTime<Utc>) {
        self.events.push(RequestEvent {
            request_id: self.id.clone(),
            kind,
            timestamp: now,
        });
    }

    /// Get and clear all domain events
    pub fn take_events(&mut self) -> Vec<RequestEvent> {
        std::mem::take(&mut self.events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::asset::ConditionReport;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    fn loan(submitter: Submitter) -> NewRequest {
        NewRequest {
            kind: RequestKind::LoanApplication,
            submitter,
            purpose: "Roadshow presentation".to_string(),
            routing: RoutingAttributes {
                value: Decimal::from(3200),
                grade: Some(44),
                unit: "ICT".to_string(),
            },
            asset_id: Some(AssetId("LAPTOP-017".to_string())),
            loan_period: Some(LoanPeriod {
                start: NaiveDate::from_ymd_opt(2024, 3, 18).unwrap(),
                end: NaiveDate::from_ymd_opt(2024, 3, 22).unwrap(),
            }),
        }
    }

    fn guest_loan() -> ServiceRequest {
        let reference =
            ReferenceNumber::new("LA", NaiveDate::from_ymd_opt(2024, 3, 15).unwrap(), 1);
        ServiceRequest::submit(
            loan(Submitter::Guest {
                email: " a@x.com ".to_string(),
            }),
            reference,
            now(),
        )
        .unwrap()
    }

    fn under_review() -> ServiceRequest {
        let mut request = guest_loan();
        request
            .begin_review(
                PendingApproval::Email {
                    approver_email: "boss@x.com".to_string(),
                    token_digest: "digest".to_string(),
                    expires_at: now() + chrono::Duration::days(7),
                },
                now(),
            )
            .unwrap();
        request
    }

    #[test]
    fn test_transition_table_edges() {
        use RequestState::*;
        let allowed = [
            (Submitted, UnderReview),
            (Submitted, Approved),
            (UnderReview, Approved),
            (UnderReview, Rejected),
            (Approved, Issued),
            (Issued, InUse),
            (InUse, Returned),
            (InUse, Overdue),
            (Overdue, Returned),
        ];
        for from in RequestState::ALL {
            for to in RequestState::ALL {
                assert_eq!(
                    from.can_transition_to(to),
                    allowed.contains(&(from, to)),
                    "{} -> {}",
                    from,
                    to
                );
            }
        }
    }

    #[test]
    fn test_terminal_states() {
        assert!(RequestState::Rejected.is_terminal());
        assert!(RequestState::Returned.is_terminal());
        assert!(!RequestState::Overdue.is_terminal());
    }

    #[test]
    fn test_submit_trims_guest_email_and_records_event() {
        let mut request = guest_loan();
        assert_eq!(request.state, RequestState::Submitted);
        assert_eq!(request.ownership.guest_email(), Some("a@x.com"));
        assert_eq!(request.ownership.owner_account_id(), None);
        let events = request.take_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type(), "request.submitted");
    }

    #[test]
    fn test_submit_validation() {
        let mut bad = loan(Submitter::Guest {
            email: "not-an-email".to_string(),
        });
        assert!(matches!(bad.validate(), Err(CoreError::ValidationError(_))));

        bad = loan(Submitter::Account {
            account_id: AccountId("u-1".to_string()),
        });
        bad.loan_period = Some(LoanPeriod {
            start: NaiveDate::from_ymd_opt(2024, 3, 22).unwrap(),
            end: NaiveDate::from_ymd_opt(2024, 3, 18).unwrap(),
        });
        assert!(bad.validate().is_err());

        let mut ticket = loan(Submitter::Account {
            account_id: AccountId("u-1".to_string()),
        });
        ticket.kind = RequestKind::HelpdeskTicket;
        ticket.asset_id = None;
        ticket.loan_period = None;
        assert!(ticket.validate().is_ok());
    }

    #[test]
    fn test_decision_records_outcome() {
        let mut request = under_review();
        request
            .record_decision(
                DecisionOutcome::from_flag(true, Some("ok".to_string())),
                "boss@x.com".to_string(),
                DecisionChannel::Email,
                now(),
            )
            .unwrap();
        assert_eq!(request.state, RequestState::Approved);
        assert_eq!(
            request.decision.as_ref().map(|d| d.channel),
            Some(DecisionChannel::Email)
        );
    }

    #[test]
    fn test_second_decision_is_already_decided() {
        let mut request = under_review();
        let decide = |r: &mut ServiceRequest| {
            r.record_decision(
                DecisionOutcome::from_flag(false, None),
                "boss@x.com".to_string(),
                DecisionChannel::Portal,
                now(),
            )
        };
        decide(&mut request).unwrap();
        assert!(matches!(
            decide(&mut request),
            Err(CoreError::AlreadyDecided(_))
        ));
    }

    #[test]
    fn test_decision_before_routing_is_invalid_state() {
        let mut request = guest_loan();
        let err = request
            .record_decision(
                DecisionOutcome::from_flag(true, None),
                "x".to_string(),
                DecisionChannel::Portal,
                now(),
            )
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidState { .. }));
    }

    #[test]
    fn test_auto_approve_only_from_submitted() {
        let mut request = under_review();
        assert!(matches!(
            request.auto_approve(now()),
            Err(CoreError::InvalidState { .. })
        ));
    }

    #[test]
    fn test_ticket_cannot_be_issued() {
        let reference =
            ReferenceNumber::new("HD", NaiveDate::from_ymd_opt(2024, 3, 15).unwrap(), 1);
        let mut new = loan(Submitter::Account {
            account_id: AccountId("u-1".to_string()),
        });
        new.kind = RequestKind::HelpdeskTicket;
        let mut ticket = ServiceRequest::submit(new, reference, now()).unwrap();
        ticket.auto_approve(now()).unwrap();
        assert!(matches!(
            ticket.issue(now()),
            Err(CoreError::InvalidState { .. })
        ));
    }

    #[test]
    fn test_return_sets_maintenance_flag_without_reopening() {
        let mut request = guest_loan();
        request.auto_approve(now()).unwrap();
        request.issue(now()).unwrap();
        request.mark_in_use(now()).unwrap();
        request.mark_overdue(now()).unwrap();
        request
            .return_asset(ConditionReport::damaged("screen cracked"), now())
            .unwrap();
        assert_eq!(request.state, RequestState::Returned);
        assert!(request.maintenance_required);
        assert!(request.state.is_terminal());
    }

    #[test]
    fn test_due_dates() {
        let mut request = guest_loan();
        request.auto_approve(now()).unwrap();
        request.issue(now()).unwrap();
        request.mark_in_use(now()).unwrap();

        let end = NaiveDate::from_ymd_opt(2024, 3, 22).unwrap();
        assert!(!request.is_past_due(end));
        assert!(request.is_past_due(end.succ_opt().unwrap()));
        assert!(request.is_due_within(NaiveDate::from_ymd_opt(2024, 3, 20).unwrap(), 2));
        assert!(!request.is_due_within(NaiveDate::from_ymd_opt(2024, 3, 19).unwrap(), 2));
    }

    #[test]
    fn test_audit_view_hides_token_digest() {
        let request = under_review();
        let view = request.audit_view();
        assert_eq!(view["approval_channel"], "email");
        assert_eq!(view["approver_identity"], "boss@x.com");
        assert!(!view.to_string().contains("digest\""));
    }
}
