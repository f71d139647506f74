//! API module for the GovDesk server
//!
//! This module contains the routes and handlers of the HTTP boundary.

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub mod approval;
pub mod errors;
pub mod health;
pub mod requests;

use crate::server::GovDeskServer;

/// Build the router for API endpoints
pub fn build_router(server: Arc<GovDeskServer>) -> Router {
    Router::new()
        // E-mailed approval links
        .route("/approve", get(approval::handle_approval_link))
        // Guest submissions
        .route("/v1/requests", post(requests::handle_submit))
        .route("/v1/requests/:id/state", get(requests::handle_get_state))
        // Health check
        .route("/health", get(health::health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(server)
}
