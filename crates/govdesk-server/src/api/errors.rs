//! Error handling for the GovDesk API
//!
//! Every failure leaves the API as `{"error", "errorDetails": {"errorCode",
//! "errorMessage"}}`. Approval-link failures collapse into one generic
//! not-found answer so a link's response never reveals whether the token
//! existed, expired, or was already used.

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use tracing::error;

use govdesk_core::CoreError;

use crate::error::ServerError;

/// Message returned for every unusable approval link
pub const LINK_NOT_FOUND: &str = "Link not found or expired";

/// API Error type for returning standard error responses
#[derive(Debug)]
pub enum ApiError {
    /// Bad request (400)
    BadRequest(String),
    /// Forbidden (403)
    Forbidden(String),
    /// Not found (404)
    NotFound(String),
    /// Approval link missing, malformed, invalid, or expired (404)
    LinkNotFound,
    /// Conflict with the request's current state (409)
    Conflict(String),
    /// The request was already decided (409)
    AlreadyProcessed,
    /// Internal server error (500)
    InternalServerError(String),
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::TokenInvalid | CoreError::TokenExpired => ApiError::LinkNotFound,
            CoreError::AlreadyDecided(_) => ApiError::AlreadyProcessed,
            CoreError::Unauthorized(msg) => ApiError::Forbidden(msg),
            CoreError::InvalidState { .. } | CoreError::NotClaimable(_) => {
                ApiError::Conflict(err.to_string())
            }
            CoreError::ValidationError(msg) => ApiError::BadRequest(msg),
            CoreError::RequestNotFound(id) => ApiError::NotFound(format!("Request {} not found", id)),
            other => {
                error!(error = %other, "Unhandled workflow error");
                ApiError::InternalServerError("Internal server error".to_string())
            }
        }
    }
}

impl From<ServerError> for ApiError {
    fn from(err: ServerError) -> Self {
        match err {
            ServerError::Workflow(core) => core.into(),
            other => {
                error!(error = %other, "Server error");
                ApiError::InternalServerError("Internal server error".to_string())
            }
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::BadRequest(msg) => write!(f, "Bad Request: {}", msg),
            ApiError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            ApiError::NotFound(msg) => write!(f, "Not Found: {}", msg),
            ApiError::LinkNotFound => write!(f, "Not Found: {}", LINK_NOT_FOUND),
            ApiError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            ApiError::AlreadyProcessed => write!(f, "Conflict: already processed"),
            ApiError::InternalServerError(msg) => write!(f, "Internal Server Error: {}", msg),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, error_code, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "ERR_BAD_REQUEST", msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, "ERR_FORBIDDEN", msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "ERR_NOT_FOUND", msg),
            ApiError::LinkNotFound => (
                StatusCode::NOT_FOUND,
                "ERR_LINK_NOT_FOUND",
                LINK_NOT_FOUND.to_string(),
            ),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "ERR_CONFLICT", msg),
            ApiError::AlreadyProcessed => (
                StatusCode::CONFLICT,
                "ERR_ALREADY_PROCESSED",
                "This request has already been processed".to_string(),
            ),
            ApiError::InternalServerError(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "ERR_INTERNAL_SERVER_ERROR",
                msg,
            ),
        };

        let body = Json(json!({
            "error": message,
            "errorDetails": {
                "errorCode": error_code,
                "errorMessage": message,
            }
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use govdesk_core::RequestState;

    fn status_of(err: CoreError) -> StatusCode {
        ApiError::from(err).into_response().status()
    }

    #[test]
    fn test_core_error_status_mapping() {
        let cases = vec![
            (CoreError::TokenInvalid, StatusCode::NOT_FOUND),
            (CoreError::TokenExpired, StatusCode::NOT_FOUND),
            (CoreError::AlreadyDecided("LA1".into()), StatusCode::CONFLICT),
            (CoreError::Unauthorized("no".into()), StatusCode::FORBIDDEN),
            (
                CoreError::invalid_state("issue", RequestState::Submitted),
                StatusCode::CONFLICT,
            ),
            (CoreError::NotClaimable("no".into()), StatusCode::CONFLICT),
            (CoreError::ValidationError("bad".into()), StatusCode::BAD_REQUEST),
            (CoreError::RequestNotFound("r-1".into()), StatusCode::NOT_FOUND),
            (
                CoreError::StateStoreError("down".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(status_of(err.clone()), expected, "{:?}", err);
        }
    }

    #[test]
    fn test_token_errors_are_indistinguishable() {
        let invalid = ApiError::from(CoreError::TokenInvalid).to_string();
        let expired = ApiError::from(CoreError::TokenExpired).to_string();
        assert_eq!(invalid, expired);
    }
}
