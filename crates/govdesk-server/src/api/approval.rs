//! Approval link handler
//!
//! `GET /approve?token=<opaque>&action={approve|reject}[&remarks=]` is the
//! target of the link e-mailed to an approver. Anything that does not
//! decide the request answers with the same not-found body.

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};

use crate::api::errors::ApiError;
use crate::server::GovDeskServer;

/// Query string of an approval link
#[derive(Debug, Deserialize)]
pub struct ApprovalLinkParams {
    /// Opaque bearer token
    pub token: Option<String>,
    /// `approve` or `reject`
    pub action: Option<String>,
    /// Remarks on approval, reason on rejection
    pub remarks: Option<String>,
}

fn parse_action(action: Option<&str>) -> Option<bool> {
    match action {
        Some("approve") => Some(true),
        Some("reject") => Some(false),
        _ => None,
    }
}

/// Decide a request through its approval link
pub async fn handle_approval_link(
    State(server): State<Arc<GovDeskServer>>,
    Query(params): Query<ApprovalLinkParams>,
) -> Result<Json<Value>, ApiError> {
    let token = params
        .token
        .filter(|t| !t.is_empty())
        .ok_or(ApiError::LinkNotFound)?;
    let approved = parse_action(params.action.as_deref()).ok_or_else(|| {
        debug!(action = ?params.action, "Unknown approval link action");
        ApiError::LinkNotFound
    })?;
    let remarks = params.remarks.filter(|r| !r.trim().is_empty());

    let request = server
        .engine()
        .decide_via_token(&token, approved, remarks)
        .await?;

    info!(reference = %request.reference, state = %request.state, "Approval link used");
    Ok(Json(json!({
        "reference": request.reference,
        "state": request.state,
    })))
}
