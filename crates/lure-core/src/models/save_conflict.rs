//! Save conflict model

use serde::{Deserialize, Serialize};

use crate::conflict::ConflictResolution;

/// Recorded revision conflict on a campaign save
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveConflict {
    /// Conflict row identifier
    pub id: i64,
    /// Campaign involved in the conflict
    pub campaign_id: String,
    /// Server revision the rejected save was based on
    pub local_revision: u64,
    /// Server revision at the time of the write
    pub server_revision: u64,
    /// Detection timestamp (unix ms)
    pub detected_at: i64,
    /// How the user settled it; `None` while the campaign is still conflicted
    pub resolution: Option<ConflictResolution>,
    /// Resolution timestamp (unix ms)
    pub resolved_at: Option<i64>,
}

impl SaveConflict {
    pub const fn is_open(&self) -> bool {
        self.resolution.is_none()
    }
}
