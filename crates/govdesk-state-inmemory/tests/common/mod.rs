#![allow(dead_code)]

use chrono::{NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::Arc;

use govdesk_core::{
    capabilities, Account, AccountId, ApprovalMatrixConfig, AssetId, ManualClock, LoanPeriod,
    NewRequest, NotificationKind, RequestKind, RoutingAttributes, ServiceRequest, Submitter,
    WorkflowConfig, WorkflowEngine,
};
use govdesk_state_inmemory::InMemoryStateStoreProvider;

pub const LAPTOP: &str = "LAPTOP-017";
pub const UNIT_APPROVER: &str = "ict.head@agency.gov.my";

pub struct Harness {
    pub provider: InMemoryStateStoreProvider,
    pub engine: Arc<WorkflowEngine>,
    pub clock: Arc<ManualClock>,
}

pub fn matrix() -> ApprovalMatrixConfig {
    let mut unit_approvers = BTreeMap::new();
    unit_approvers.insert("ICT".to_string(), UNIT_APPROVER.to_string());
    ApprovalMatrixConfig {
        auto_approve_max_value: Decimal::from(1500),
        auto_approve_grade_below: Some(41),
        portal_review_min_value: Some(Decimal::from(25000)),
        unit_approvers,
        default_approver_email: Some("director@agency.gov.my".to_string()),
    }
}

pub async fn harness() -> Harness {
    let config = WorkflowConfig {
        approval_matrix: matrix(),
        ..WorkflowConfig::default()
    };
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2024, 3, 15, 9, 0, 0).unwrap(),
    ));
    let provider = InMemoryStateStoreProvider::new()
        .with_available_assets([LAPTOP])
        .await;
    let engine = provider
        .create_engine(config, clock.clone())
        .expect("valid configuration");

    for (account, capability) in [
        (approver(), capabilities::APPROVE_REQUESTS),
        (supervisor(), capabilities::APPROVE_REQUESTS),
        (supervisor(), capabilities::OVERRIDE_APPROVER),
        (queue_approver(), capabilities::APPROVE_REQUESTS),
        (loan_officer(), capabilities::MANAGE_LOANS),
    ] {
        provider.capabilities.grant(&account.id, capability);
    }

    Harness {
        provider,
        engine: Arc::new(engine),
        clock,
    }
}

/// Unit approver with a portal account
pub fn approver() -> Account {
    Account::new("approver-1", UNIT_APPROVER)
}

/// Approver allowed to decide for others
pub fn supervisor() -> Account {
    Account::new("supervisor-1", "supervisor@agency.gov.my")
}

/// Portal approver bound to nothing in particular
pub fn queue_approver() -> Account {
    Account::new("approver-2", "queue.approver@agency.gov.my")
}

pub fn loan_officer() -> Account {
    Account::new("officer-1", "loans@agency.gov.my")
}

pub fn guest(email: &str) -> Submitter {
    Submitter::Guest {
        email: email.to_string(),
    }
}

pub fn member(id: &str) -> Submitter {
    Submitter::Account {
        account_id: AccountId(id.to_string()),
    }
}

pub fn loan(submitter: Submitter, value: i64, grade: Option<u8>) -> NewRequest {
    NewRequest {
        kind: RequestKind::LoanApplication,
        submitter,
        purpose: "Projector for district briefing".to_string(),
        routing: RoutingAttributes {
            value: Decimal::from(value),
            grade,
            unit: "ICT".to_string(),
        },
        asset_id: Some(AssetId(LAPTOP.to_string())),
        loan_period: Some(LoanPeriod {
            start: NaiveDate::from_ymd_opt(2024, 3, 18).unwrap(),
            end: NaiveDate::from_ymd_opt(2024, 3, 22).unwrap(),
        }),
    }
}

/// A loan the matrix auto-approves
pub fn small_loan(submitter: Submitter) -> NewRequest {
    loan(submitter, 500, Some(29))
}

/// A loan routed to the unit approver by e-mail
pub fn reviewed_loan(submitter: Submitter) -> NewRequest {
    loan(submitter, 3200, Some(44))
}

/// A loan routed to the portal queue
pub fn large_loan(submitter: Submitter) -> NewRequest {
    loan(submitter, 30000, Some(44))
}

/// Token e-mailed for `request`
pub fn approval_token(harness: &Harness, request: &ServiceRequest) -> String {
    harness
        .provider
        .notifications
        .queued_of(NotificationKind::ApprovalRequested)
        .into_iter()
        .rev()
        .find(|n| n.context["reference"] == request.reference.as_str())
        .and_then(|n| n.context["approval_token"].as_str().map(str::to_string))
        .expect("approval token was queued")
}

/// Submit an auto-approved loan and hand it to the borrower
pub async fn loan_in_use(harness: &Harness, submitter: Submitter) -> ServiceRequest {
    let officer = loan_officer();
    let request = harness.engine.submit(small_loan(submitter)).await.unwrap();
    harness.engine.issue(&officer, &request.id).await.unwrap();
    harness.engine.mark_in_use(&officer, &request.id).await.unwrap()
}
