use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::RwLock;
use tracing::debug;

use govdesk_core::{
    domain::actor::emails_match,
    AssetId, AssetRepository, AssetStatus, CoreError, CrossModuleLink, CrossModuleLinkRepository,
    Ownership, PendingApproval, RequestId, RequestMutation, RequestRepository, RequestState,
    ServiceRequest,
};

/// Shared request storage
pub type RequestMap = Arc<RwLock<HashMap<String, ServiceRequest>>>;

/// Shared reference sequence counters, keyed by prefix and day
pub type SequenceMap = Arc<RwLock<HashMap<(String, NaiveDate), u32>>>;

/// In-memory implementation of the RequestRepository
pub struct InMemoryRequestRepository {
    requests: RequestMap,
    sequences: SequenceMap,
}

impl InMemoryRequestRepository {
    /// Create a new in-memory request repository
    pub fn new(requests: RequestMap, sequences: SequenceMap) -> Self {
        Self { requests, sequences }
    }

    /// Whether the store is empty
    pub async fn is_empty(&self) -> bool {
        self.requests.read().await.is_empty()
    }
}

fn holds_digest(request: &ServiceRequest, digest: &str) -> bool {
    let live = matches!(
        &request.pending_approval,
        Some(PendingApproval::Email { token_digest, .. }) if token_digest == digest
    );
    live || request.spent_token_digest.as_deref() == Some(digest)
}

#[async_trait]
impl RequestRepository for InMemoryRequestRepository {
    async fn find_by_id(&self, id: &RequestId) -> Result<Option<ServiceRequest>, CoreError> {
        let requests = self.requests.read().await;
        Ok(requests.get(&id.0).cloned())
    }

    async fn insert(&self, request: &ServiceRequest) -> Result<(), CoreError> {
        let mut requests = self.requests.write().await;
        if requests.contains_key(&request.id.0) {
            return Err(CoreError::StateStoreError(format!(
                "Request already exists: {}",
                request.id
            )));
        }
        requests.insert(request.id.0.clone(), request.clone());
        Ok(())
    }

    async fn update_atomically(
        &self,
        id: &RequestId,
        mutation: &mut RequestMutation<'_>,
    ) -> Result<ServiceRequest, CoreError> {
        // The write guard is held until the copy is committed
        let mut requests = self.requests.write().await;
        let stored = requests
            .get_mut(&id.0)
            .ok_or_else(|| CoreError::RequestNotFound(id.0.clone()))?;

        let mut copy = stored.clone();
        mutation(&mut copy)?;
        copy.version += 1;
        *stored = copy.clone();

        debug!(request_id = %id, version = copy.version, "Committed request update");
        Ok(copy)
    }

    async fn find_by_token_digest(&self, digest: &str) -> Result<Option<ServiceRequest>, CoreError> {
        let requests = self.requests.read().await;
        Ok(requests
            .values()
            .find(|request| holds_digest(request, digest))
            .cloned())
    }

    async fn list_by_state(&self, state: RequestState) -> Result<Vec<ServiceRequest>, CoreError> {
        let requests = self.requests.read().await;
        let mut result: Vec<ServiceRequest> = requests
            .values()
            .filter(|request| request.state == state)
            .cloned()
            .collect();
        result.sort_by(|a, b| a.reference.cmp(&b.reference));
        Ok(result)
    }

    async fn list_unclaimed_by_guest_email(
        &self,
        email: &str,
    ) -> Result<Vec<ServiceRequest>, CoreError> {
        let requests = self.requests.read().await;
        let mut result: Vec<ServiceRequest> = requests
            .values()
            .filter(|request| match &request.ownership {
                Ownership::Guest { email: guest } => emails_match(guest, email),
                _ => false,
            })
            .cloned()
            .collect();
        result.sort_by(|a, b| a.reference.cmp(&b.reference));
        Ok(result)
    }

    async fn next_reference_sequence(
        &self,
        prefix: &str,
        date: NaiveDate,
    ) -> Result<u32, CoreError> {
        let mut sequences = self.sequences.write().await;
        let counter = sequences.entry((prefix.to_string(), date)).or_insert(0);
        *counter += 1;
        Ok(*counter)
    }
}

/// In-memory implementation of the AssetRepository
pub struct InMemoryAssetRepository {
    assets: Arc<RwLock<HashMap<AssetId, AssetStatus>>>,
    failures_remaining: AtomicUsize,
}

impl InMemoryAssetRepository {
    /// Create a new in-memory asset repository
    pub fn new(assets: Arc<RwLock<HashMap<AssetId, AssetStatus>>>) -> Self {
        Self {
            assets,
            failures_remaining: AtomicUsize::new(0),
        }
    }

    /// Add or replace an asset
    pub async fn register(&self, id: AssetId, status: AssetStatus) {
        self.assets.write().await.insert(id, status);
    }

    /// Make the next `count` status updates fail
    pub fn fail_next_updates(&self, count: usize) {
        self.failures_remaining.store(count, Ordering::SeqCst);
    }
}

#[async_trait]
impl AssetRepository for InMemoryAssetRepository {
    async fn status(&self, id: &AssetId) -> Result<Option<AssetStatus>, CoreError> {
        Ok(self.assets.read().await.get(id).copied())
    }

    async fn set_status(&self, id: &AssetId, status: AssetStatus) -> Result<(), CoreError> {
        if take_failure(&self.failures_remaining) {
            return Err(CoreError::StateStoreError(format!(
                "Asset store unavailable while updating {}",
                id
            )));
        }

        let mut assets = self.assets.write().await;
        match assets.get_mut(id) {
            Some(current) => {
                *current = status;
                Ok(())
            }
            None => Err(CoreError::ValidationError(format!("Unknown asset: {}", id))),
        }
    }
}

/// Consume one injected failure, if any are left
pub(crate) fn take_failure(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

/// Shared link storage, keyed by request id and trigger event
pub type LinkMap = Arc<RwLock<HashMap<(String, String), CrossModuleLink>>>;

/// In-memory implementation of the CrossModuleLinkRepository
pub struct InMemoryCrossModuleLinkRepository {
    links: LinkMap,
}

impl InMemoryCrossModuleLinkRepository {
    /// Create a new in-memory link repository
    pub fn new(links: LinkMap) -> Self {
        Self { links }
    }
}

#[async_trait]
impl CrossModuleLinkRepository for InMemoryCrossModuleLinkRepository {
    async fn insert_if_absent(&self, link: CrossModuleLink) -> Result<CrossModuleLink, CoreError> {
        let mut links = self.links.write().await;
        let key = (link.request_id.0.clone(), link.trigger_event.clone());
        Ok(links.entry(key).or_insert(link).clone())
    }

    async fn find(
        &self,
        request_id: &RequestId,
        trigger_event: &str,
    ) -> Result<Option<CrossModuleLink>, CoreError> {
        let links = self.links.read().await;
        Ok(links
            .get(&(request_id.0.clone(), trigger_event.to_string()))
            .cloned())
    }

    async fn list_for_request(
        &self,
        request_id: &RequestId,
    ) -> Result<Vec<CrossModuleLink>, CoreError> {
        let links = self.links.read().await;
        Ok(links
            .values()
            .filter(|link| link.request_id == *request_id)
            .cloned()
            .collect())
    }
}
