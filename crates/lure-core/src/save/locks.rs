//! Per-campaign async locks

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::models::CampaignId;

/// One async mutex per campaign, created on first use
#[derive(Debug, Default)]
pub(crate) struct CampaignLocks {
    locks: Mutex<HashMap<CampaignId, Arc<AsyncMutex<()>>>>,
}

impl CampaignLocks {
    /// Wait for exclusive access to `campaign_id`
    pub(crate) async fn acquire(&self, campaign_id: &CampaignId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            // Drop locks nobody holds or waits on.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            Arc::clone(locks.entry(campaign_id.clone()).or_default())
        };
        lock.lock_owned().await
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
