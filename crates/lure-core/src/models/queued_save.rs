//! Pending save model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::{Campaign, CampaignId};
use crate::diff::CampaignDiff;

/// A unique identifier for a queued save, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueuedSaveId(Uuid);

impl QueuedSaveId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for QueuedSaveId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for QueuedSaveId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for QueuedSaveId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// What a save ships to the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SavePayload {
    /// Whole campaign state
    Snapshot { campaign: Campaign },
    /// RFC 6902 patch against `diff.base_revision`
    Diff { diff: CampaignDiff },
}

impl SavePayload {
    pub const fn is_diff(&self) -> bool {
        matches!(self, Self::Diff { .. })
    }

    pub const fn label(&self) -> &'static str {
        match self {
            Self::Snapshot { .. } => "snapshot",
            Self::Diff { .. } => "diff",
        }
    }
}

/// Lifecycle of a queue entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum QueueEntryState {
    /// Waiting for the next drain
    #[default]
    Pending,
    /// Retries exhausted; kept until the user retries or discards it
    Failed,
}

impl QueueEntryState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Failed => "failed",
        }
    }
}

impl FromStr for QueueEntryState {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "failed" => Ok(Self::Failed),
            other => Err(crate::Error::InvalidInput(format!(
                "unknown queue entry state: {other}"
            ))),
        }
    }
}

/// A campaign mutation waiting to reach the server.
///
/// `payload` is always the decoded form; compression only exists at rest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedSave {
    pub id: QueuedSaveId,
    pub campaign_id: CampaignId,
    pub payload: SavePayload,
    /// Last known server revision when the entry was queued
    pub base_revision: u64,
    /// Enqueue timestamp (Unix ms)
    pub created_at: i64,
    pub retries: u32,
    /// Earliest time the drain may replay this entry (Unix ms)
    pub next_attempt_at: i64,
    pub last_error: Option<String>,
    pub state: QueueEntryState,
}

impl QueuedSave {
    pub const fn is_diff(&self) -> bool {
        self.payload.is_diff()
    }

    /// Whether the entry may be replayed at `now` (Unix ms)
    pub const fn is_due(&self, now: i64) -> bool {
        matches!(self.state, QueueEntryState::Pending) && self.next_attempt_at <= now
    }
}
