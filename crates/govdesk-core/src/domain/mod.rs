/// Request aggregate and lifecycle states
pub mod request;

/// Human-readable reference numbers
pub mod reference;

/// Accounts and audit actors
pub mod actor;

/// Assets and return condition reports
pub mod asset;

/// Domain events
pub mod events;

/// Cross-module link records
pub mod link;

/// Repository interfaces
pub mod repository;

/// Interfaces to collaborators outside the core
pub mod collaborators;
