//! Configuration for the GovDesk server
//!
//! This module contains the configuration types and loading functionality.

use serde::{Deserialize, Serialize};
use std::env;
use tracing::{info, warn};

use govdesk_core::WorkflowConfig;
use govdesk_monitoring::LoggingConfig;

use crate::error::ServerResult;

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Host to bind to
    #[serde(default = "default_host")]
    pub bind_address: String,

    /// Log filter directive
    #[serde(default = "default_log_filter")]
    pub log_filter: String,

    /// Emit JSON logs
    #[serde(default)]
    pub log_json: bool,

    /// Assets registered as available at startup
    #[serde(default)]
    pub available_assets: Vec<String>,

    /// Workflow configuration
    #[serde(default)]
    pub workflow: WorkflowConfig,
}

fn default_port() -> u16 {
    8080
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_log_filter() -> String {
    "info,govdesk_core=debug".to_string()
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn load() -> ServerResult<Self> {
        let mut config = Self {
            workflow: WorkflowConfig::load()?,
            ..Self::default()
        };

        if let Ok(port) = env::var("SERVER_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                config.port = port;
            } else {
                warn!("Invalid SERVER_PORT value: {}", port);
            }
        }

        if let Ok(host) = env::var("SERVER_HOST") {
            config.bind_address = host;
        }

        let logging = Self::logging_from_env();
        config.log_filter = logging.log_filter;
        config.log_json = logging.json;

        if let Ok(assets) = env::var("GOVDESK_ASSETS") {
            config.available_assets = assets
                .split(',')
                .map(|a| a.trim().to_string())
                .filter(|a| !a.is_empty())
                .collect();
        }

        if config.workflow.approval_matrix.unit_approvers.is_empty()
            && config.workflow.approval_matrix.default_approver_email.is_none()
        {
            warn!("No approvers configured - every reviewed request will go to the portal queue");
        }

        info!("Loaded server configuration");
        Ok(config)
    }

    /// Logging settings from `LOG_FILTER` and `LOG_JSON` alone, so logging
    /// can be installed before the rest of the configuration is loaded
    pub fn logging_from_env() -> LoggingConfig {
        let mut logging = Self::default().logging();

        if let Ok(filter) = env::var("LOG_FILTER") {
            logging.log_filter = filter;
        }

        if let Ok(json) = env::var("LOG_JSON") {
            logging.json = json.eq_ignore_ascii_case("true") || json == "1";
        }

        logging
    }

    /// Logging settings derived from this configuration
    pub fn logging(&self) -> LoggingConfig {
        LoggingConfig {
            service_name: "govdesk-server".to_string(),
            log_filter: self.log_filter.clone(),
            json: self.log_json,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind_address: default_host(),
            log_filter: default_log_filter(),
            log_json: false,
            available_assets: Vec::new(),
            workflow: WorkflowConfig::default(),
        }
    }
}
