//! Request submission and lookup handlers

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use govdesk_core::{
    AssetId, LoanPeriod, NewRequest, RequestId, RequestKind, RoutingAttributes, Submitter,
};

use crate::api::errors::ApiError;
use crate::server::GovDeskServer;

/// Body of `POST /v1/requests`
#[derive(Debug, Deserialize)]
pub struct GuestSubmission {
    /// Module the request belongs to
    #[serde(default = "default_kind")]
    pub kind: RequestKind,
    /// Contact e-mail of the guest
    pub guest_email: String,
    /// Why the request is made
    pub purpose: String,
    /// Declared value
    pub value: Decimal,
    /// Requester grade
    #[serde(default)]
    pub grade: Option<u8>,
    /// Organisational unit
    pub unit: String,
    /// Requested asset
    #[serde(default)]
    pub asset_id: Option<String>,
    /// First day of the loan
    #[serde(default)]
    pub loan_start: Option<NaiveDate>,
    /// Last day of the loan
    #[serde(default)]
    pub loan_end: Option<NaiveDate>,
}

fn default_kind() -> RequestKind {
    RequestKind::LoanApplication
}

impl GuestSubmission {
    fn into_new_request(self) -> Result<NewRequest, ApiError> {
        let loan_period = match (self.loan_start, self.loan_end) {
            (Some(start), Some(end)) => Some(LoanPeriod { start, end }),
            (None, None) => None,
            _ => {
                return Err(ApiError::BadRequest(
                    "loan_start and loan_end must be given together".to_string(),
                ))
            }
        };

        Ok(NewRequest {
            kind: self.kind,
            submitter: Submitter::Guest {
                email: self.guest_email,
            },
            purpose: self.purpose,
            routing: RoutingAttributes {
                value: self.value,
                grade: self.grade,
                unit: self.unit,
            },
            asset_id: self.asset_id.map(AssetId),
            loan_period,
        })
    }
}

/// Submit a request as a guest
pub async fn handle_submit(
    State(server): State<Arc<GovDeskServer>>,
    payload: Result<Json<GuestSubmission>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let Json(submission) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let new = submission.into_new_request()?;

    let request = server.engine().submit(new).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "id": request.id,
            "reference": request.reference,
            "state": request.state,
        })),
    ))
}

/// Current state of a request
pub async fn handle_get_state(
    State(server): State<Arc<GovDeskServer>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let state = server.engine().current_state(&RequestId(id)).await?;
    Ok(Json(json!({ "state": state })))
}
