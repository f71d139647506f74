//! Workflow engine
//!
//! Owns the request state machine. Every transition is applied through
//! [`RequestRepository::update_atomically`], so the read-decide-write of a
//! transition happens under the store's exclusive lock. Audit records and
//! notifications are emitted after the commit; their failures are logged
//! and never undo a transition.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::application::approval_matrix::{ApprovalMatrixRouter, RoutingDecision};
use crate::application::cross_module::CrossModuleTrigger;
use crate::application::identity::{IdentityResolver, OwnershipResolution};
use crate::application::token_service::{TokenCheck, TokenService};
use crate::clock::Clock;
use crate::config::WorkflowConfig;
use crate::domain::actor::{Account, AuditActor};
use crate::domain::asset::ConditionReport;
use crate::domain::collaborators::{
    capabilities, AuditEmitter, AuditRecord, CapabilityCheck, NotificationDispatcher,
    NotificationKind, Recipient, SiblingModuleGateway,
};
use crate::domain::link::CrossModuleLink;
use crate::domain::reference::ReferenceNumber;
use crate::domain::repository::{
    AssetRepository, CrossModuleLinkRepository, RequestMutation, RequestRepository,
};
use crate::domain::request::{
    DecisionChannel, DecisionOutcome, NewRequest, PendingApproval, RequestId, RequestKind,
    RequestState, ServiceRequest, Submitter,
};
use crate::CoreError;

const REQUEST_ENTITY: &str = "service_request";
const REJECTED_EVENT: &str = "transition_rejected";

/// Submitted requests younger than this are left to their own `submit`
/// call by the routing sweep
const SUBMISSION_ROUTING_GRACE_SECS: i64 = 60;

/// Collaborators the engine is wired with
pub struct WorkflowDependencies {
    /// Request store
    pub requests: Arc<dyn RequestRepository>,
    /// Asset store
    pub assets: Arc<dyn AssetRepository>,
    /// Cross-module link store
    pub links: Arc<dyn CrossModuleLinkRepository>,
    /// Maintenance module
    pub gateway: Arc<dyn SiblingModuleGateway>,
    /// Audit sink
    pub audit: Arc<dyn AuditEmitter>,
    /// Notification queue
    pub notifications: Arc<dyn NotificationDispatcher>,
    /// Capability oracle
    pub capabilities: Arc<dyn CapabilityCheck>,
    /// Time source
    pub clock: Arc<dyn Clock>,
}

/// How a decision is authorised
#[derive(Debug, Clone)]
pub enum DecisionAuthority {
    /// Bearer token from an approval link
    Token(String),
    /// Authenticated portal account
    Portal(Account),
}

/// What one run of the scheduled sweeps did
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    /// Stranded submissions routed
    pub routed: usize,
    /// Loans moved to `OVERDUE`
    pub marked_overdue: usize,
    /// Due-soon and overdue reminders queued
    pub reminders_queued: usize,
    /// Damaged returns whose maintenance link was completed
    pub links_reconciled: usize,
}

/// The request workflow
pub struct WorkflowEngine {
    config: WorkflowConfig,
    tokens: TokenService,
    router: ApprovalMatrixRouter,
    cross_module: CrossModuleTrigger,
    requests: Arc<dyn RequestRepository>,
    assets: Arc<dyn AssetRepository>,
    links: Arc<dyn CrossModuleLinkRepository>,
    audit: Arc<dyn AuditEmitter>,
    notifications: Arc<dyn NotificationDispatcher>,
    capabilities: Arc<dyn CapabilityCheck>,
    clock: Arc<dyn Clock>,
}

impl WorkflowEngine {
    /// Create a workflow engine
    pub fn new(config: WorkflowConfig, deps: WorkflowDependencies) -> Result<Self, CoreError> {
        config.validate()?;

        let cross_module = CrossModuleTrigger::new(
            deps.requests.clone(),
            deps.assets.clone(),
            deps.links.clone(),
            deps.gateway.clone(),
            deps.audit.clone(),
            deps.clock.clone(),
        );

        Ok(Self {
            tokens: TokenService::new(config.token_ttl()),
            router: ApprovalMatrixRouter::new(config.approval_matrix.clone()),
            config,
            cross_module,
            requests: deps.requests,
            assets: deps.assets,
            links: deps.links,
            audit: deps.audit,
            notifications: deps.notifications,
            capabilities: deps.capabilities,
            clock: deps.clock,
        })
    }

    /// Active configuration
    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    /// Create a request and route it. A named asset must be known to the
    /// asset store.
    pub async fn submit(&self, new: NewRequest) -> Result<ServiceRequest, CoreError> {
        new.validate()?;
        if let Some(asset_id) = &new.asset_id {
            if self.assets.status(asset_id).await?.is_none() {
                return Err(CoreError::ValidationError(format!(
                    "Unknown asset: {}",
                    asset_id
                )));
            }
        }

        let now = self.clock.now();
        let today = now.date_naive();
        let prefix = match new.kind {
            RequestKind::LoanApplication => &self.config.loan_reference_prefix,
            RequestKind::HelpdeskTicket => &self.config.ticket_reference_prefix,
        };
        let sequence = self.requests.next_reference_sequence(prefix, today).await?;
        let reference = ReferenceNumber::new(prefix, today, sequence);

        let actor = match &new.submitter {
            Submitter::Account { account_id } => AuditActor::Account {
                account_id: account_id.clone(),
            },
            Submitter::Guest { email } => AuditActor::Guest {
                email: email.trim().to_string(),
            },
        };

        let mut request = ServiceRequest::submit(new, reference, now)?;
        self.requests.insert(&request).await?;
        self.record_committed(&json!({}), &mut request, actor).await;

        self.notify(
            NotificationKind::SubmissionConfirmation,
            owner_recipient(&request),
            notification_context(&request),
        );

        self.route(&request.id).await
    }

    /// Route a `SUBMITTED` request through the approval matrix
    pub async fn route(&self, request_id: &RequestId) -> Result<ServiceRequest, CoreError> {
        let request = self.find_request(request_id).await?;
        let decision = self.router.route(&request.routing);
        debug!(reference = %request.reference, ?decision, "Routing decision");

        let now = self.clock.now();
        match decision {
            RoutingDecision::AutoApprove => {
                let approved = self
                    .apply(request_id, "auto-approve", AuditActor::System, &mut |r| {
                        r.auto_approve(now)
                    })
                    .await?;
                self.notify_decision(&approved);
                Ok(approved)
            }
            RoutingDecision::RouteToApproverByEmail { approver_email } => {
                let issued = self.tokens.issue(request_id, now);
                let pending = PendingApproval::Email {
                    approver_email: approver_email.clone(),
                    token_digest: issued.digest.clone(),
                    expires_at: issued.expires_at,
                };
                let routed = self
                    .apply(request_id, "route", AuditActor::System, &mut |r| {
                        r.begin_review(pending.clone(), now)
                    })
                    .await?;

                let mut context = notification_context(&routed);
                context["approval_token"] = json!(issued.token.expose());
                context["token_expires_at"] = json!(issued.expires_at);
                self.notify(
                    NotificationKind::ApprovalRequested,
                    Recipient::Email {
                        email: approver_email,
                    },
                    context,
                );
                Ok(routed)
            }
            RoutingDecision::RouteToPortalQueue { unit } => {
                let pending = PendingApproval::Portal { unit: unit.clone() };
                let routed = self
                    .apply(request_id, "route", AuditActor::System, &mut |r| {
                        r.begin_review(pending.clone(), now)
                    })
                    .await?;

                let mut context = notification_context(&routed);
                context["unit"] = json!(unit);
                self.notify(
                    NotificationKind::ApprovalRequested,
                    Recipient::CapabilityHolders {
                        capability: capabilities::APPROVE_REQUESTS.to_string(),
                    },
                    context,
                );
                Ok(routed)
            }
        }
    }

    /// Record a decision on an `UNDER_REVIEW` request.
    ///
    /// Authorisation and the state check run inside the atomic update, so
    /// of any number of concurrent decisions exactly one commits and the
    /// others fail with [`CoreError::AlreadyDecided`].
    pub async fn decide(
        &self,
        request_id: &RequestId,
        approved: bool,
        authority: DecisionAuthority,
        remarks: Option<String>,
    ) -> Result<ServiceRequest, CoreError> {
        let outcome = DecisionOutcome::from_flag(approved, remarks);
        let now = self.clock.now();

        let decided = match authority {
            DecisionAuthority::Token(token) => {
                let approver_email = self
                    .requests
                    .find_by_id(request_id)
                    .await?
                    .and_then(|r| match r.pending_approval {
                        Some(PendingApproval::Email { approver_email, .. }) => Some(approver_email),
                        _ => None,
                    });
                let actor = AuditActor::ApprovalLink { approver_email };
                let tokens = &self.tokens;

                self.apply(request_id, "decide", actor, &mut |r| {
                    authorize_token(tokens, r, &token, now)?;
                    let decided_by = r
                        .pending_approval
                        .as_ref()
                        .map(PendingApproval::approver_identity)
                        .unwrap_or_default();
                    r.record_decision(outcome.clone(), decided_by, DecisionChannel::Email, now)?;
                    TokenService::invalidate(r);
                    Ok(())
                })
                .await?
            }
            DecisionAuthority::Portal(account) => {
                let actor = AuditActor::from(&account);
                if !self
                    .capabilities
                    .has_capability(&account, capabilities::APPROVE_REQUESTS)
                    .await
                {
                    let err = CoreError::Unauthorized(format!(
                        "{} may not decide requests",
                        account.id
                    ));
                    self.record_rejected(&request_id.0, "decide", &err, actor).await;
                    return Err(err);
                }
                let can_override = self
                    .capabilities
                    .has_capability(&account, capabilities::OVERRIDE_APPROVER)
                    .await;

                self.apply(request_id, "decide", actor, &mut |r| {
                    authorize_portal(r, &account, can_override)?;
                    r.record_decision(
                        outcome.clone(),
                        account.id.0.clone(),
                        DecisionChannel::Portal,
                        now,
                    )?;
                    TokenService::invalidate(r);
                    Ok(())
                })
                .await?
            }
        };

        self.notify_decision(&decided);
        Ok(decided)
    }

    /// Decide through an approval link. Resolves the request from the token.
    pub async fn decide_via_token(
        &self,
        token: &str,
        approved: bool,
        remarks: Option<String>,
    ) -> Result<ServiceRequest, CoreError> {
        let request = if TokenService::is_well_formed(token) {
            self.requests
                .find_by_token_digest(&TokenService::digest(token))
                .await?
        } else {
            None
        };

        match request {
            Some(request) => {
                self.decide(
                    &request.id,
                    approved,
                    DecisionAuthority::Token(token.to_string()),
                    remarks,
                )
                .await
            }
            None => {
                let err = CoreError::TokenInvalid;
                self.record_rejected(
                    "unresolved",
                    "decide",
                    &err,
                    AuditActor::ApprovalLink {
                        approver_email: None,
                    },
                )
                .await;
                Err(err)
            }
        }
    }

    /// Decide through the portal
    pub async fn decide_via_portal(
        &self,
        actor: &Account,
        request_id: &RequestId,
        approved: bool,
        remarks: Option<String>,
    ) -> Result<ServiceRequest, CoreError> {
        self.decide(
            request_id,
            approved,
            DecisionAuthority::Portal(actor.clone()),
            remarks,
        )
        .await
    }

    /// Bind a guest request to `actor`
    pub async fn claim(
        &self,
        actor: &Account,
        request_id: &RequestId,
    ) -> Result<ServiceRequest, CoreError> {
        let now = self.clock.now();
        let claimed = self
            .apply(request_id, "claim", AuditActor::from(actor), &mut |r| {
                IdentityResolver::claim(r, actor, now)
            })
            .await?;
        info!(reference = %claimed.reference, account_id = %actor.id, "Guest request claimed");
        Ok(claimed)
    }

    /// Unclaimed guest requests `actor` may claim
    pub async fn claimable_requests(
        &self,
        actor: &Account,
    ) -> Result<Vec<ServiceRequest>, CoreError> {
        let Some(email) = actor.verified_email.as_deref() else {
            return Ok(Vec::new());
        };
        let candidates = self.requests.list_unclaimed_by_guest_email(email).await?;
        Ok(candidates
            .into_iter()
            .filter(|r| {
                IdentityResolver::resolve_ownership(r, actor) == OwnershipResolution::Claimable
            })
            .collect())
    }

    /// Claim every request [`claimable_requests`](Self::claimable_requests)
    /// lists. Requests claimed concurrently in between are skipped.
    pub async fn claim_all(&self, actor: &Account) -> Result<Vec<ServiceRequest>, CoreError> {
        let mut claimed = Vec::new();
        for request in self.claimable_requests(actor).await? {
            match self.claim(actor, &request.id).await {
                Ok(request) => claimed.push(request),
                Err(CoreError::NotClaimable(reason)) => {
                    debug!(reference = %request.reference, %reason, "Skipping request");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(claimed)
    }

    /// `APPROVED -> ISSUED`
    pub async fn issue(
        &self,
        actor: &Account,
        request_id: &RequestId,
    ) -> Result<ServiceRequest, CoreError> {
        self.require_capability(actor, capabilities::MANAGE_LOANS, request_id, "issue")
            .await?;
        let now = self.clock.now();
        self.apply(request_id, "issue", AuditActor::from(actor), &mut |r| r.issue(now))
            .await
    }

    /// `ISSUED -> IN_USE`. The borrower or loan staff may confirm receipt.
    pub async fn mark_in_use(
        &self,
        actor: &Account,
        request_id: &RequestId,
    ) -> Result<ServiceRequest, CoreError> {
        let is_staff = self
            .capabilities
            .has_capability(actor, capabilities::MANAGE_LOANS)
            .await;
        let now = self.clock.now();
        self.apply(request_id, "mark in use", AuditActor::from(actor), &mut |r| {
            if !is_staff
                && IdentityResolver::resolve_ownership(r, actor) != OwnershipResolution::Owner
            {
                return Err(CoreError::Unauthorized(format!(
                    "{} may not confirm receipt of {}",
                    actor.id, r.reference
                )));
            }
            r.mark_in_use(now)
        })
        .await
    }

    /// `IN_USE -> OVERDUE` for a loan past its end date.
    ///
    /// Returns `false` without changing anything when the loan is already
    /// overdue, already returned, or not yet due.
    pub async fn mark_overdue(&self, request_id: &RequestId) -> Result<bool, CoreError> {
        let now = self.clock.now();
        let today = now.date_naive();
        let mut before = Value::Null;
        let mut no_op = false;

        let result = self
            .requests
            .update_atomically(request_id, &mut |r: &mut ServiceRequest| {
                before = r.audit_view();
                let settled = matches!(r.state, RequestState::Overdue | RequestState::Returned);
                if settled || (r.state == RequestState::InUse && !r.is_past_due(today)) {
                    no_op = true;
                    return Err(CoreError::invalid_state("mark overdue", r.state));
                }
                r.mark_overdue(now)?;
                r.last_reminder_on = Some(today);
                Ok(())
            })
            .await;

        match result {
            Ok(mut request) => {
                self.record_committed(&before, &mut request, AuditActor::System)
                    .await;
                self.notify(
                    NotificationKind::OverdueReminder,
                    owner_recipient(&request),
                    notification_context(&request),
                );
                Ok(true)
            }
            Err(_) if no_op => Ok(false),
            Err(e) => {
                self.record_rejected(&request_id.0, "mark overdue", &e, AuditActor::System)
                    .await;
                Err(e)
            }
        }
    }

    /// Mark every past-due loan overdue. Returns how many were marked.
    pub async fn mark_overdue_sweep(&self) -> Result<usize, CoreError> {
        let today = self.clock.today();
        let in_use = self.requests.list_by_state(RequestState::InUse).await?;
        let mut marked = 0;

        for request in in_use.iter().filter(|r| r.is_past_due(today)) {
            match self.mark_overdue(&request.id).await {
                Ok(true) => marked += 1,
                Ok(false) => {}
                Err(e) => warn!(reference = %request.reference, error = %e, "Failed to mark loan overdue"),
            }
        }

        Ok(marked)
    }

    /// `IN_USE | OVERDUE -> RETURNED`, then the maintenance side effects
    /// when the report indicates damage.
    ///
    /// If a side effect fails the error is returned but the return itself
    /// stays committed; the reconciliation sweep completes it later.
    pub async fn return_asset(
        &self,
        actor: &Account,
        request_id: &RequestId,
        report: ConditionReport,
    ) -> Result<ServiceRequest, CoreError> {
        self.require_capability(actor, capabilities::MANAGE_LOANS, request_id, "return")
            .await?;
        let now = self.clock.now();
        let returned = self
            .apply(request_id, "return", AuditActor::from(actor), &mut |r| {
                r.return_asset(report.clone(), now)
            })
            .await?;

        let mut context = notification_context(&returned);
        context["maintenance_required"] = json!(returned.maintenance_required);
        self.notify(
            NotificationKind::ReturnConfirmation,
            owner_recipient(&returned),
            context,
        );

        if returned.maintenance_required {
            self.cross_module.on_damaged_return(&returned).await?;
        }
        Ok(returned)
    }

    /// Queue due-soon and overdue reminders, at most one per loan per day.
    /// Returns how many were queued.
    pub async fn send_reminders(&self) -> Result<usize, CoreError> {
        let today = self.clock.today();
        let window = self.config.due_soon_reminder_days;

        let mut due = Vec::new();
        for request in self.requests.list_by_state(RequestState::InUse).await? {
            if request.is_due_within(today, window) && request.last_reminder_on != Some(today) {
                due.push((request, NotificationKind::DueSoonReminder));
            }
        }
        for request in self.requests.list_by_state(RequestState::Overdue).await? {
            if request.last_reminder_on != Some(today) {
                due.push((request, NotificationKind::OverdueReminder));
            }
        }

        let mut queued = 0;
        for (request, kind) in due {
            let expected = request.state;
            let mut no_op = false;
            let result = self
                .requests
                .update_atomically(&request.id, &mut |r: &mut ServiceRequest| {
                    if r.state != expected || r.last_reminder_on == Some(today) {
                        no_op = true;
                        return Err(CoreError::invalid_state("remind", r.state));
                    }
                    r.last_reminder_on = Some(today);
                    Ok(())
                })
                .await;

            match result {
                Ok(updated) => {
                    let mut context = notification_context(&updated);
                    context["loan_end"] = json!(updated.loan_period.map(|p| p.end));
                    self.notify(kind, owner_recipient(&updated), context);
                    queued += 1;
                }
                Err(_) if no_op => {}
                Err(e) => {
                    warn!(reference = %request.reference, error = %e, "Failed to record reminder")
                }
            }
        }

        Ok(queued)
    }

    /// Route submissions left in `SUBMITTED`, e.g. after a crash between
    /// insert and routing
    pub async fn route_pending_submissions(&self) -> Result<usize, CoreError> {
        let cutoff = self.clock.now() - Duration::seconds(SUBMISSION_ROUTING_GRACE_SECS);
        let submitted = self.requests.list_by_state(RequestState::Submitted).await?;
        let mut routed = 0;

        for request in submitted.iter().filter(|r| r.created_at <= cutoff) {
            match self.route(&request.id).await {
                Ok(_) => routed += 1,
                Err(e) => warn!(reference = %request.reference, error = %e, "Failed to route submission"),
            }
        }

        Ok(routed)
    }

    /// Complete maintenance side effects left unfinished by failed returns
    pub async fn reconcile_cross_module_links(&self) -> Result<usize, CoreError> {
        self.cross_module.reconcile().await
    }

    /// One pass of every time-driven operation
    pub async fn run_scheduled_sweeps(&self) -> Result<SweepReport, CoreError> {
        let report = SweepReport {
            routed: self.route_pending_submissions().await?,
            marked_overdue: self.mark_overdue_sweep().await?,
            reminders_queued: self.send_reminders().await?,
            links_reconciled: self.reconcile_cross_module_links().await?,
        };
        debug!(?report, "Scheduled sweeps finished");
        Ok(report)
    }

    /// Current state of a request
    pub async fn current_state(&self, request_id: &RequestId) -> Result<RequestState, CoreError> {
        Ok(self.find_request(request_id).await?.state)
    }

    /// Whether `token` can currently decide the request
    pub async fn is_token_valid(
        &self,
        request_id: &RequestId,
        token: &str,
    ) -> Result<bool, CoreError> {
        let request = self.find_request(request_id).await?;
        Ok(self.tokens.validate(&request, token, self.clock.now()))
    }

    /// Load a request
    pub async fn find_request(&self, request_id: &RequestId) -> Result<ServiceRequest, CoreError> {
        self.requests
            .find_by_id(request_id)
            .await?
            .ok_or_else(|| CoreError::RequestNotFound(request_id.0.clone()))
    }

    /// Cross-module links of a request
    pub async fn links_for(
        &self,
        request_id: &RequestId,
    ) -> Result<Vec<CrossModuleLink>, CoreError> {
        self.links.list_for_request(request_id).await
    }

    async fn require_capability(
        &self,
        actor: &Account,
        capability: &str,
        request_id: &RequestId,
        operation: &str,
    ) -> Result<(), CoreError> {
        if self.capabilities.has_capability(actor, capability).await {
            return Ok(());
        }
        let err = CoreError::Unauthorized(format!("{} lacks {}", actor.id, capability));
        self.record_rejected(&request_id.0, operation, &err, AuditActor::from(actor))
            .await;
        Err(err)
    }

    /// Apply a transition atomically and audit the outcome either way
    async fn apply(
        &self,
        request_id: &RequestId,
        operation: &str,
        actor: AuditActor,
        mutation: &mut RequestMutation<'_>,
    ) -> Result<ServiceRequest, CoreError> {
        let mut before = Value::Null;
        let result = self
            .requests
            .update_atomically(request_id, &mut |r: &mut ServiceRequest| {
                before = r.audit_view();
                mutation(r)
            })
            .await;

        match result {
            Ok(mut request) => {
                self.record_committed(&before, &mut request, actor).await;
                Ok(request)
            }
            Err(e) => {
                self.record_rejected(&request_id.0, operation, &e, actor).await;
                Err(e)
            }
        }
    }

    async fn record_committed(&self, before: &Value, request: &mut ServiceRequest, actor: AuditActor) {
        let events = request.take_events();
        let event = events
            .last()
            .map(|e| e.event_type())
            .unwrap_or("request.updated");

        info!(
            reference = %request.reference,
            request_id = %request.id,
            state = %request.state,
            event,
            "Request transition committed"
        );

        let record = AuditRecord::change(
            REQUEST_ENTITY,
            request.id.0.clone(),
            event,
            before,
            &request.audit_view(),
            actor,
            self.clock.now(),
        );
        if let Err(e) = self.audit.record(record).await {
            warn!(reference = %request.reference, error = %e, "Failed to record audit event");
        }
    }

    async fn record_rejected(
        &self,
        entity_id: &str,
        operation: &str,
        error: &CoreError,
        actor: AuditActor,
    ) {
        warn!(entity_id, operation, error = %error, "Rejected transition attempt");

        let record = AuditRecord {
            entity_type: REQUEST_ENTITY.to_string(),
            entity_id: entity_id.to_string(),
            event: REJECTED_EVENT.to_string(),
            old_values: json!({}),
            new_values: json!({ "operation": operation, "error": error.kind() }),
            actor,
            recorded_at: self.clock.now(),
        };
        if let Err(e) = self.audit.record(record).await {
            warn!(entity_id, error = %e, "Failed to record audit event");
        }
    }

    fn notify_decision(&self, request: &ServiceRequest) {
        let mut context = notification_context(request);
        let approved = request.state == RequestState::Approved;
        context["approved"] = json!(approved);
        if let Some(decision) = &request.decision {
            context["decision"] = json!(decision.outcome);
        }
        self.notify(
            NotificationKind::DecisionOutcome,
            owner_recipient(request),
            context.clone(),
        );

        if approved {
            self.notify(
                NotificationKind::AdminPreparation,
                Recipient::CapabilityHolders {
                    capability: capabilities::PREPARE_ASSETS.to_string(),
                },
                context,
            );
        }
    }

    fn notify(&self, kind: NotificationKind, recipient: Recipient, context: Value) {
        if let Err(e) = self.notifications.queue(kind, recipient, context) {
            warn!(?kind, error = %e, "Failed to queue notification");
        }
    }
}

/// Token authorisation inside the decision update. The state is checked
/// before the token, so a stale token can never act on a decided request.
fn authorize_token(
    tokens: &TokenService,
    request: &ServiceRequest,
    token: &str,
    now: chrono::DateTime<chrono::Utc>,
) -> Result<(), CoreError> {
    if request.state.is_decided() {
        let replayed = request.spent_token_digest.as_deref()
            == Some(TokenService::digest(token).as_str())
            && request
                .decision
                .as_ref()
                .map(|d| d.channel == DecisionChannel::Email)
                .unwrap_or(false);
        if replayed {
            return Err(CoreError::TokenInvalid);
        }
        return Err(CoreError::AlreadyDecided(request.reference.to_string()));
    }
    if request.state != RequestState::UnderReview {
        return Err(CoreError::invalid_state("decide", request.state));
    }

    match tokens.check(request.pending_approval.as_ref(), token, now) {
        TokenCheck::Valid => Ok(()),
        TokenCheck::Invalid => Err(CoreError::TokenInvalid),
        TokenCheck::Expired => Err(CoreError::TokenExpired),
    }
}

/// Portal authorisation inside the decision update. The capability was
/// checked before the update; here the actor must be the bound approver
/// unless they may override.
fn authorize_portal(
    request: &ServiceRequest,
    account: &Account,
    can_override: bool,
) -> Result<(), CoreError> {
    if request.state.is_decided() {
        return Err(CoreError::AlreadyDecided(request.reference.to_string()));
    }
    match &request.pending_approval {
        Some(PendingApproval::Portal { .. }) => Ok(()),
        Some(PendingApproval::Email { approver_email, .. }) => {
            if can_override || account.owns_email(approver_email) {
                Ok(())
            } else {
                Err(CoreError::Unauthorized(format!(
                    "{} is not the approver of {}",
                    account.id, request.reference
                )))
            }
        }
        None => Err(CoreError::invalid_state("decide", request.state)),
    }
}

fn owner_recipient(request: &ServiceRequest) -> Recipient {
    match request.ownership.owner_account_id() {
        Some(account_id) => Recipient::Account {
            account_id: account_id.clone(),
        },
        None => Recipient::Email {
            email: request
                .ownership
                .guest_email()
                .unwrap_or_default()
                .to_string(),
        },
    }
}

fn notification_context(request: &ServiceRequest) -> Value {
    json!({
        "request_id": request.id,
        "reference": request.reference,
        "kind": request.kind,
        "state": request.state,
        "purpose": request.purpose,
    })
}
