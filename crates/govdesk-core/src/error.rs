use thiserror::Error;

use crate::domain::request::RequestState;

/// Core error type for the request workflow
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Transition attempted from a state that does not permit it
    #[error("Invalid state: cannot {operation} a request in state {state}")]
    InvalidState {
        /// Operation that was attempted
        operation: String,
        /// State the request was in
        state: RequestState,
    },

    /// Approval token does not match any live binding
    #[error("Approval token is invalid")]
    TokenInvalid,

    /// Approval token matched but its expiry has passed
    #[error("Approval token has expired")]
    TokenExpired,

    /// Actor lacks the required capability or ownership
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The request was already decided (lost the decision race)
    #[error("Request already decided: {0}")]
    AlreadyDecided(String),

    /// Claim preconditions were not met
    #[error("Request not claimable: {0}")]
    NotClaimable(String),

    /// Request not found
    #[error("Request not found: {0}")]
    RequestNotFound(String),

    /// Validation error
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// State store error
    #[error("State store error: {0}")]
    StateStoreError(String),

    /// External dependency error
    #[error("External dependency error: {0}")]
    ExternalDependencyError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl CoreError {
    /// Build an [`CoreError::InvalidState`] for `operation` attempted in `state`
    pub fn invalid_state(operation: impl Into<String>, state: RequestState) -> Self {
        CoreError::InvalidState {
            operation: operation.into(),
            state,
        }
    }

    /// Stable machine-readable code, used when recording rejected attempts
    pub fn kind(&self) -> &'static str {
        match self {
            CoreError::InvalidState { .. } => "invalid_state",
            CoreError::TokenInvalid => "token_invalid",
            CoreError::TokenExpired => "token_expired",
            CoreError::Unauthorized(_) => "unauthorized",
            CoreError::AlreadyDecided(_) => "already_decided",
            CoreError::NotClaimable(_) => "not_claimable",
            CoreError::RequestNotFound(_) => "request_not_found",
            CoreError::ValidationError(_) => "validation",
            CoreError::StateStoreError(_) => "state_store",
            CoreError::ExternalDependencyError(_) => "external_dependency",
            CoreError::ConfigurationError(_) => "configuration",
            CoreError::SerializationError(_) => "serialization",
        }
    }

    /// Whether the failure is transient and the operation may be retried
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CoreError::StateStoreError(_) | CoreError::ExternalDependencyError(_)
        )
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::SerializationError(err.to_string())
    }
}

impl From<serde_yaml::Error> for CoreError {
    fn from(err: serde_yaml::Error) -> Self {
        CoreError::ConfigurationError(err.to_string())
    }
}
