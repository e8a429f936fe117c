//! Save status published to editors.

use crate::models::CampaignId;

/// Latest outcome of the save pipeline, surfaced as the save indicator
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum SaveState {
    #[default]
    Idle,
    Saving {
        campaign_id: CampaignId,
    },
    Saved {
        campaign_id: CampaignId,
        revision: u64,
    },
    Queued {
        campaign_id: CampaignId,
        pending: u64,
    },
    Conflicted {
        campaign_id: CampaignId,
        local_revision: u64,
        server_revision: u64,
    },
    Failed {
        campaign_id: CampaignId,
        error: String,
    },
}

impl SaveState {
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Saving { .. } => "saving",
            Self::Saved { .. } => "saved",
            Self::Queued { .. } => "queued",
            Self::Conflicted { .. } => "conflicted",
            Self::Failed { .. } => "failed",
        }
    }

    /// Whether the user has to act before edits reach the server
    pub const fn needs_attention(&self) -> bool {
        matches!(self, Self::Conflicted { .. } | Self::Failed { .. })
    }
}
