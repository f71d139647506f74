//! Side effects of a damaged return in the maintenance module
//!
//! Request, asset and maintenance ticket live in different stores, so the
//! effects are staged: the request commits `RETURNED` with
//! `maintenance_required` first, then the ticket is created (idempotently),
//! the asset is withdrawn, and the [`CrossModuleLink`] is written last as
//! proof that every step completed. A request that is flagged but has no
//! link is picked up again by [`CrossModuleTrigger::reconcile`].

use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::clock::Clock;
use crate::domain::actor::AuditActor;
use crate::domain::asset::AssetStatus;
use crate::domain::collaborators::{AuditEmitter, AuditRecord, SiblingModuleGateway};
use crate::domain::link::{CrossModuleLink, LinkSnapshot, LinkedRecordKind, DAMAGED_RETURN_EVENT};
use crate::domain::repository::{AssetRepository, CrossModuleLinkRepository, RequestRepository};
use crate::domain::request::{RequestState, ServiceRequest};
use crate::CoreError;

/// Raises maintenance tickets for damaged returns
pub struct CrossModuleTrigger {
    requests: Arc<dyn RequestRepository>,
    assets: Arc<dyn AssetRepository>,
    links: Arc<dyn CrossModuleLinkRepository>,
    gateway: Arc<dyn SiblingModuleGateway>,
    audit: Arc<dyn AuditEmitter>,
    clock: Arc<dyn Clock>,
}

impl CrossModuleTrigger {
    /// Create a trigger
    pub fn new(
        requests: Arc<dyn RequestRepository>,
        assets: Arc<dyn AssetRepository>,
        links: Arc<dyn CrossModuleLinkRepository>,
        gateway: Arc<dyn SiblingModuleGateway>,
        audit: Arc<dyn AuditEmitter>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            requests,
            assets,
            links,
            gateway,
            audit,
            clock,
        }
    }

    /// Complete the maintenance side effects of a committed damaged return.
    /// Safe to call repeatedly; returns the existing link when done.
    pub async fn on_damaged_return(
        &self,
        request: &ServiceRequest,
    ) -> Result<CrossModuleLink, CoreError> {
        if request.state != RequestState::Returned || !request.maintenance_required {
            return Err(CoreError::invalid_state(
                "raise a maintenance ticket for",
                request.state,
            ));
        }

        if let Some(link) = self.links.find(&request.id, DAMAGED_RETURN_EVENT).await? {
            return Ok(link);
        }

        let (asset_id, report) = match (&request.asset_id, &request.condition_report) {
            (Some(asset_id), Some(report)) => (asset_id, report),
            _ => {
                return Err(CoreError::ValidationError(format!(
                    "{} has no asset or condition report",
                    request.reference
                )))
            }
        };
        let severity = report.severity();
        let triggered_at = request.returned_at.unwrap_or(request.updated_at);

        let payload = json!({
            "idempotency_key": CrossModuleLink::idempotency_key(&request.reference, DAMAGED_RETURN_EVENT),
            "request_id": request.id,
            "reference": request.reference,
            "asset_id": asset_id,
            "severity": severity,
            "condition": report.condition,
            "damage_description": report.damage_description,
            "accessories_complete": report.accessories_complete,
            "notes": report.notes,
            "reported_at": triggered_at,
        });

        let ticket_id = self
            .gateway
            .create_linked_record(LinkedRecordKind::MaintenanceTicket, payload)
            .await
            .map_err(|e| {
                error!(reference = %request.reference, error = %e, "Failed to create maintenance ticket");
                e
            })?;

        self.assets
            .set_status(asset_id, AssetStatus::UnderMaintenance)
            .await
            .map_err(|e| {
                error!(
                    reference = %request.reference,
                    asset_id = %asset_id,
                    ticket_id = %ticket_id,
                    error = %e,
                    "Maintenance ticket created but asset status not updated"
                );
                e
            })?;

        let link = CrossModuleLink::new(
            request.id.clone(),
            DAMAGED_RETURN_EVENT,
            LinkedRecordKind::MaintenanceTicket,
            ticket_id,
            LinkSnapshot {
                asset_id: asset_id.clone(),
                reference: request.reference.clone(),
                severity,
                damage_description: report.damage_description.clone(),
                triggered_at,
            },
            self.clock.now(),
        );
        let stored = self.links.insert_if_absent(link).await?;

        info!(
            reference = %request.reference,
            ticket_id = %stored.linked_record_id,
            severity = severity.as_str(),
            "Linked maintenance ticket to damaged return"
        );

        let record = AuditRecord::change(
            "cross_module_link",
            stored.id.clone(),
            DAMAGED_RETURN_EVENT,
            &json!({}),
            &serde_json::to_value(&stored)?,
            AuditActor::System,
            self.clock.now(),
        );
        if let Err(e) = self.audit.record(record).await {
            warn!(reference = %request.reference, error = %e, "Failed to record audit event");
        }

        Ok(stored)
    }

    /// Retry every damaged return that has no link yet. Returns how many
    /// were completed.
    pub async fn reconcile(&self) -> Result<usize, CoreError> {
        let returned = self.requests.list_by_state(RequestState::Returned).await?;
        let mut completed = 0;

        for request in returned.iter().filter(|r| r.maintenance_required) {
            if self
                .links
                .find(&request.id, DAMAGED_RETURN_EVENT)
                .await?
                .is_some()
            {
                continue;
            }
            match self.on_damaged_return(request).await {
                Ok(_) => {
                    info!(reference = %request.reference, "Reconciled damaged return");
                    completed += 1;
                }
                Err(e) if e.is_retryable() => {
                    warn!(reference = %request.reference, error = %e, "Reconciliation attempt failed, will retry");
                }
                Err(e) => {
                    error!(
                        reference = %request.reference,
                        error = %e,
                        "Damaged return cannot be completed without intervention"
                    );
                }
            }
        }

        Ok(completed)
    }
}
