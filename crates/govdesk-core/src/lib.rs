//!
//! GovDesk Core - request workflow for the GovDesk IT-service platform
//!
//! This crate defines the request lifecycle shared by the asset-loan and
//! helpdesk modules: the state machine, dual-channel (e-mail link or
//! portal) approval, guest ownership and claims, approval matrix routing,
//! and the maintenance side effects of damaged returns. Storage and every
//! outside collaborator are reached through the traits in
//! [`domain::repository`] and [`domain::collaborators`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Domain layer - request aggregate, value objects, and ports
pub mod domain;

/// Application services - workflow engine and its components
pub mod application;

/// Time source
pub mod clock;

/// Workflow configuration
pub mod config;

/// Error types
pub mod error;

pub use error::CoreError;

pub use clock::{Clock, SystemClock};
#[cfg(any(test, feature = "testing"))]
pub use clock::ManualClock;

pub use config::{ApprovalMatrixConfig, WorkflowConfig};

pub use domain::actor::{Account, AccountId, AuditActor};
pub use domain::asset::{AssetCondition, AssetId, AssetStatus, ConditionReport, MaintenanceSeverity};
pub use domain::collaborators::{
    capabilities, AuditEmitter, AuditRecord, CapabilityCheck, NotificationDispatcher,
    NotificationKind, Recipient, SiblingModuleGateway,
};
pub use domain::events::{RequestEvent, RequestEventKind};
pub use domain::link::{CrossModuleLink, LinkSnapshot, LinkedRecordKind, DAMAGED_RETURN_EVENT};
pub use domain::reference::ReferenceNumber;
pub use domain::repository::{
    AssetRepository, CrossModuleLinkRepository, RequestMutation, RequestRepository,
};
pub use domain::request::{
    ApprovalChannel, Decision, DecisionChannel, DecisionOutcome, LoanPeriod, NewRequest,
    Ownership, PendingApproval, RequestId, RequestKind, RequestState, RoutingAttributes,
    ServiceRequest, Submitter,
};

pub use application::approval_matrix::{ApprovalMatrixRouter, RoutingDecision};
pub use application::cross_module::CrossModuleTrigger;
pub use application::identity::{IdentityResolver, OwnershipResolution};
pub use application::scheduler::WorkflowScheduler;
pub use application::token_service::{ApprovalToken, IssuedToken, TokenCheck, TokenService};
pub use application::workflow_engine::{
    DecisionAuthority, SweepReport, WorkflowDependencies, WorkflowEngine,
};
