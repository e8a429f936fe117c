//! Backup and draft models

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::{Campaign, CampaignId};

/// A unique identifier for a backup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BackupId(Uuid);

impl BackupId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for BackupId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BackupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for BackupId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Named full snapshot of a campaign, kept until explicitly deleted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignBackup {
    pub id: BackupId,
    pub campaign_id: CampaignId,
    pub name: String,
    pub campaign: Campaign,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
}

impl CampaignBackup {
    #[must_use]
    pub fn new(campaign: &Campaign, name: impl Into<String>) -> Self {
        Self {
            id: BackupId::new(),
            campaign_id: campaign.id.clone(),
            name: name.into(),
            campaign: campaign.clone(),
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// Latest local edit of a campaign
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignDraft {
    pub campaign: Campaign,
    /// Save timestamp (Unix ms)
    pub saved_at: i64,
}
