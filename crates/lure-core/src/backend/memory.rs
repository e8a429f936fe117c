//! In-process backend used by tests and offline demos

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use super::{BackendError, BackendResult, CampaignBackend, RemoteCampaign, WriteAck};
use crate::diff::apply_diff;
use crate::models::{Campaign, CampaignId, SavePayload};

/// Backend holding campaigns in memory with the same revision rules as a server
#[derive(Debug)]
pub struct InMemoryBackend {
    campaigns: Mutex<HashMap<CampaignId, Campaign>>,
    reachable: AtomicBool,
    writes: AtomicUsize,
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self {
            campaigns: Mutex::new(HashMap::new()),
            reachable: AtomicBool::new(true),
            writes: AtomicUsize::new(0),
        }
    }

    fn campaigns(&self) -> MutexGuard<'_, HashMap<CampaignId, Campaign>> {
        self.campaigns.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Simulate losing or regaining the network
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    pub fn is_reachable(&self) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }

    /// Number of writes the backend has applied
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Store `campaign` as-is, keeping its revision
    pub fn insert(&self, campaign: Campaign) {
        self.campaigns().insert(campaign.id.clone(), campaign);
    }

    /// Current server copy of a campaign
    pub fn campaign(&self, campaign_id: &CampaignId) -> Option<Campaign> {
        self.campaigns().get(campaign_id).cloned()
    }

    /// Apply an edit made by another client, bumping the revision
    pub fn commit_external(&self, campaign: &Campaign) -> u64 {
        let mut campaigns = self.campaigns();
        let revision = campaigns
            .get(&campaign.id)
            .map_or(0, |current| current.revision)
            .saturating_add(1);
        let mut stored = campaign.clone();
        stored.revision = revision;
        campaigns.insert(stored.id.clone(), stored);
        revision
    }
}

#[async_trait]
impl CampaignBackend for InMemoryBackend {
    async fn write(
        &self,
        campaign_id: &CampaignId,
        base_revision: u64,
        payload: &SavePayload,
    ) -> BackendResult<WriteAck> {
        if !self.is_reachable() {
            return Err(BackendError::Network("backend unreachable".to_string()));
        }

        let mut campaigns = self.campaigns();
        let current = campaigns.get(campaign_id);
        let server_revision = current.map_or(0, |campaign| campaign.revision);
        if base_revision != server_revision {
            return Err(BackendError::Conflict { server_revision });
        }

        let mut next = match payload {
            SavePayload::Snapshot { campaign } => campaign.clone(),
            SavePayload::Diff { diff } => {
                let current =
                    current.ok_or_else(|| BackendError::NotFound(campaign_id.to_string()))?;
                if diff.base_revision != server_revision {
                    return Err(BackendError::InvalidPayload(format!(
                        "patch based on revision {}, server at {server_revision}",
                        diff.base_revision
                    )));
                }
                apply_diff(current, diff).ok_or_else(|| {
                    BackendError::InvalidPayload("patch does not apply".to_string())
                })?
            }
        };

        if next.id != *campaign_id {
            return Err(BackendError::InvalidPayload(format!(
                "payload is for campaign {}",
                next.id
            )));
        }

        let new_revision = server_revision.saturating_add(1);
        next.revision = new_revision;
        campaigns.insert(campaign_id.clone(), next);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(WriteAck { new_revision })
    }

    async fn read(&self, campaign_id: &CampaignId) -> BackendResult<RemoteCampaign> {
        if !self.is_reachable() {
            return Err(BackendError::Network("backend unreachable".to_string()));
        }
        self.campaign(campaign_id)
            .map(RemoteCampaign::from)
            .ok_or_else(|| BackendError::NotFound(campaign_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::create_diff;
    use crate::models::CampaignType;

    fn campaign() -> Campaign {
        let mut campaign = Campaign::new("Spin", CampaignType::Wheel);
        campaign.id = "c1".parse().unwrap();
        campaign
    }

    #[tokio::test]
    async fn snapshot_then_diff_bumps_revision() {
        let backend = InMemoryBackend::new();
        let mut local = campaign();

        let ack = backend
            .write(&local.id, 0, &SavePayload::Snapshot { campaign: local.clone() })
            .await
            .unwrap();
        assert_eq!(ack.new_revision, 1);

        let mut edited = local.clone();
        local.revision = 1;
        edited.revision = 1;
        edited.name = "Spin to win".to_string();
        let diff = create_diff(&local, &edited).unwrap().unwrap();
        let ack = backend
            .write(&local.id, 1, &SavePayload::Diff { diff })
            .await
            .unwrap();
        assert_eq!(ack.new_revision, 2);

        let stored = backend.campaign(&local.id).unwrap();
        assert_eq!(stored.name, "Spin to win");
        assert_eq!(stored.revision, 2);
        assert_eq!(backend.write_count(), 2);
    }

    #[tokio::test]
    async fn stale_base_is_a_conflict() {
        let backend = InMemoryBackend::new();
        let local = campaign();
        backend.commit_external(&local);
        backend.commit_external(&local);

        let error = backend
            .write(&local.id, 1, &SavePayload::Snapshot { campaign: local.clone() })
            .await
            .unwrap_err();
        assert_eq!(error, BackendError::Conflict { server_revision: 2 });
        assert_eq!(backend.write_count(), 0);
    }

    #[tokio::test]
    async fn unreachable_backend_fails_with_network_error() {
        let backend = InMemoryBackend::new();
        backend.set_reachable(false);
        let local = campaign();

        assert!(matches!(
            backend.read(&local.id).await,
            Err(BackendError::Network(_))
        ));
        assert!(matches!(
            backend
                .write(&local.id, 0, &SavePayload::Snapshot { campaign: local.clone() })
                .await,
            Err(BackendError::Network(_))
        ));
    }

    #[tokio::test]
    async fn diff_for_unknown_campaign_is_not_found() {
        let backend = InMemoryBackend::new();
        let old = campaign();
        let mut new = old.clone();
        new.name = "Other".to_string();
        let diff = create_diff(&old, &new).unwrap().unwrap();

        assert!(matches!(
            backend.write(&old.id, 0, &SavePayload::Diff { diff }).await,
            Err(BackendError::NotFound(_))
        ));
    }
}
