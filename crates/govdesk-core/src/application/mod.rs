/// Approval token issuance and validation
pub mod token_service;

/// Ownership resolution and claims
pub mod identity;

/// Approval matrix routing
pub mod approval_matrix;

/// Request state machine and transitions
pub mod workflow_engine;

/// Maintenance side effects of damaged returns
pub mod cross_module;

/// Background sweeps
pub mod scheduler;
