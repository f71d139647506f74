//! Repository traits for the GovDesk core
//!
//! This module defines the persistence ports used by the workflow engine.
//! External crates implement these traits to provide storage.

use async_trait::async_trait;
use chrono::NaiveDate;

use super::asset::{AssetId, AssetStatus};
use super::link::CrossModuleLink;
use super::request::{RequestId, RequestState, ServiceRequest};
use crate::CoreError;

/// Mutation applied to a request inside the store's exclusive section
pub type RequestMutation<'a> =
    dyn FnMut(&mut ServiceRequest) -> Result<(), CoreError> + Send + 'a;

/// Repository for service requests
#[async_trait]
pub trait RequestRepository: Send + Sync {
    /// Find a request by ID
    async fn find_by_id(&self, id: &RequestId) -> Result<Option<ServiceRequest>, CoreError>;

    /// Insert a newly submitted request. Fails if the id is taken.
    async fn insert(&self, request: &ServiceRequest) -> Result<(), CoreError>;

    /// Read, mutate and write a request as one exclusive step.
    ///
    /// The mutation runs on a copy while the store holds its exclusive
    /// lock for `id`. The copy replaces the stored request (with `version`
    /// incremented) only if the mutation returns `Ok`; otherwise the stored
    /// request is untouched and the mutation's error is returned. The
    /// mutation must not perform I/O.
    async fn update_atomically(
        &self,
        id: &RequestId,
        mutation: &mut RequestMutation<'_>,
    ) -> Result<ServiceRequest, CoreError>;

    /// Find the request whose live or spent approval token has this digest
    async fn find_by_token_digest(&self, digest: &str) -> Result<Option<ServiceRequest>, CoreError>;

    /// List requests in a state
    async fn list_by_state(&self, state: RequestState) -> Result<Vec<ServiceRequest>, CoreError>;

    /// Unclaimed guest requests submitted under `email` (case-insensitive)
    async fn list_unclaimed_by_guest_email(
        &self,
        email: &str,
    ) -> Result<Vec<ServiceRequest>, CoreError>;

    /// Allocate the next reference sequence for `prefix` on `date`, starting at 1
    async fn next_reference_sequence(&self, prefix: &str, date: NaiveDate)
        -> Result<u32, CoreError>;
}

/// Repository for loanable assets
#[async_trait]
pub trait AssetRepository: Send + Sync {
    /// Current status of an asset
    async fn status(&self, id: &AssetId) -> Result<Option<AssetStatus>, CoreError>;

    /// Set the status of an asset. Setting the current status again is a no-op.
    async fn set_status(&self, id: &AssetId, status: AssetStatus) -> Result<(), CoreError>;
}

/// Repository for cross-module links
#[async_trait]
pub trait CrossModuleLinkRepository: Send + Sync {
    /// Insert `link` unless a link for the same request and trigger event
    /// exists. Returns the stored link either way.
    async fn insert_if_absent(&self, link: CrossModuleLink) -> Result<CrossModuleLink, CoreError>;

    /// Link for a request and trigger event
    async fn find(
        &self,
        request_id: &RequestId,
        trigger_event: &str,
    ) -> Result<Option<CrossModuleLink>, CoreError>;

    /// All links of a request
    async fn list_for_request(&self, request_id: &RequestId)
        -> Result<Vec<CrossModuleLink>, CoreError>;
}
