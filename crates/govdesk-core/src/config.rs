//! Configuration for the request workflow
//!
//! This module contains the workflow and approval-matrix configuration
//! types and their loading functionality.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::path::Path;
use tracing::{info, warn};

use crate::CoreError;

/// Longest approval token lifetime accepted, in days
pub const MAX_TOKEN_TTL_DAYS: i64 = 365;

/// Workflow configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Lifetime of an e-mailed approval token, in days
    #[serde(default = "default_token_ttl_days")]
    pub token_ttl_days: i64,

    /// How many days before the loan end a due-soon reminder is queued
    #[serde(default = "default_due_soon_reminder_days")]
    pub due_soon_reminder_days: i64,

    /// Interval between scheduled sweeps, in seconds
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Reference number prefix for loan applications
    #[serde(default = "default_loan_reference_prefix")]
    pub loan_reference_prefix: String,

    /// Reference number prefix for helpdesk tickets
    #[serde(default = "default_ticket_reference_prefix")]
    pub ticket_reference_prefix: String,

    /// Approval routing thresholds
    #[serde(default)]
    pub approval_matrix: ApprovalMatrixConfig,
}

/// Approval matrix thresholds
///
/// None of these values are business constants; deployments supply
/// their own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalMatrixConfig {
    /// Requests valued at or below this amount may be auto-approved
    #[serde(default)]
    pub auto_approve_max_value: Decimal,

    /// Requesters whose grade is strictly below this value may be
    /// auto-approved. `None` disables auto-approval.
    #[serde(default)]
    pub auto_approve_grade_below: Option<u8>,

    /// Requests valued at or above this amount always go to the portal queue
    #[serde(default)]
    pub portal_review_min_value: Option<Decimal>,

    /// Organisational unit to approver e-mail
    #[serde(default)]
    pub unit_approvers: BTreeMap<String, String>,

    /// Approver used when a unit has no entry
    #[serde(default)]
    pub default_approver_email: Option<String>,
}

fn default_token_ttl_days() -> i64 {
    7
}

fn default_due_soon_reminder_days() -> i64 {
    2
}

fn default_sweep_interval_secs() -> u64 {
    300
}

fn default_loan_reference_prefix() -> String {
    "LA".to_string()
}

fn default_ticket_reference_prefix() -> String {
    "HD".to_string()
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            token_ttl_days: default_token_ttl_days(),
            due_soon_reminder_days: default_due_soon_reminder_days(),
            sweep_interval_secs: default_sweep_interval_secs(),
            loan_reference_prefix: default_loan_reference_prefix(),
            ticket_reference_prefix: default_ticket_reference_prefix(),
            approval_matrix: ApprovalMatrixConfig::default(),
        }
    }
}

impl Default for ApprovalMatrixConfig {
    fn default() -> Self {
        Self {
            auto_approve_max_value: Decimal::ZERO,
            auto_approve_grade_below: None,
            portal_review_min_value: None,
            unit_approvers: BTreeMap::new(),
            default_approver_email: None,
        }
    }
}

impl WorkflowConfig {
    /// Load configuration from environment variables and an optional
    /// approval matrix file
    pub fn load() -> Result<Self, CoreError> {
        let mut config = Self::default();

        if let Ok(ttl) = env::var("GOVDESK_TOKEN_TTL_DAYS") {
            if let Ok(days) = ttl.parse::<i64>() {
                config.token_ttl_days = days;
            } else {
                warn!("Invalid GOVDESK_TOKEN_TTL_DAYS value: {}", ttl);
            }
        }

        if let Ok(days) = env::var("GOVDESK_DUE_SOON_DAYS") {
            if let Ok(parsed) = days.parse::<i64>() {
                config.due_soon_reminder_days = parsed;
            } else {
                warn!("Invalid GOVDESK_DUE_SOON_DAYS value: {}", days);
            }
        }

        if let Ok(interval) = env::var("GOVDESK_SWEEP_INTERVAL_SECS") {
            if let Ok(secs) = interval.parse::<u64>() {
                config.sweep_interval_secs = secs;
            } else {
                warn!("Invalid GOVDESK_SWEEP_INTERVAL_SECS value: {}", interval);
            }
        }

        if let Ok(path) = env::var("GOVDESK_APPROVAL_MATRIX_FILE") {
            config.approval_matrix = ApprovalMatrixConfig::from_yaml_file(&path)?;
        } else {
            warn!("No GOVDESK_APPROVAL_MATRIX_FILE provided - every request will go to the portal queue");
        }

        config.validate()?;
        info!("Loaded workflow configuration");
        Ok(config)
    }

    /// Reject values the workflow cannot run with
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.token_ttl_days <= 0 {
            return Err(CoreError::ConfigurationError(
                "token_ttl_days must be positive".to_string(),
            ));
        }
        if self.token_ttl_days > MAX_TOKEN_TTL_DAYS {
            return Err(CoreError::ConfigurationError(format!(
                "token_ttl_days must not exceed {}",
                MAX_TOKEN_TTL_DAYS
            )));
        }
        if self.due_soon_reminder_days < 0 {
            return Err(CoreError::ConfigurationError(
                "due_soon_reminder_days must not be negative".to_string(),
            ));
        }
        if self.sweep_interval_secs == 0 {
            return Err(CoreError::ConfigurationError(
                "sweep_interval_secs must be positive".to_string(),
            ));
        }
        if self.loan_reference_prefix.is_empty() || self.ticket_reference_prefix.is_empty() {
            return Err(CoreError::ConfigurationError(
                "reference prefixes must not be empty".to_string(),
            ));
        }
        if self.loan_reference_prefix == self.ticket_reference_prefix {
            return Err(CoreError::ConfigurationError(
                "loan and ticket reference prefixes must differ".to_string(),
            ));
        }
        if self.approval_matrix.auto_approve_max_value.is_sign_negative() {
            return Err(CoreError::ConfigurationError(
                "auto_approve_max_value must not be negative".to_string(),
            ));
        }
        Ok(())
    }

    /// Token lifetime as a duration
    pub fn token_ttl(&self) -> chrono::Duration {
        chrono::Duration::days(self.token_ttl_days)
    }

    /// Sweep interval as a duration
    pub fn sweep_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.sweep_interval_secs)
    }
}

impl ApprovalMatrixConfig {
    /// Parse an approval matrix from YAML text
    pub fn from_yaml_str(yaml: &str) -> Result<Self, CoreError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Read an approval matrix from a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            CoreError::ConfigurationError(format!(
                "cannot read approval matrix {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_yaml_str(&contents)
    }
}
