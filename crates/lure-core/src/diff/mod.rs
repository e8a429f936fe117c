//! Campaign diffing with RFC 6902 JSON patches.
//!
//! A diff is always computed against the last state the server acknowledged
//! and carries the revision it applies to. Long diff chains make recovery
//! cost grow with history, so every [`SNAPSHOT_INTERVAL`]th revision is sent
//! as a full snapshot instead.

use json_patch::Patch;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::Campaign;

/// Revisions divisible by this value are written as full snapshots
pub const SNAPSHOT_INTERVAL: u64 = 10;

/// Patch between two campaign states
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignDiff {
    pub patch: Patch,
    /// Revision the patch applies to
    pub base_revision: u64,
    /// Revision the server assigns once the patch is applied
    pub target_revision: u64,
    /// Serialized patch size in bytes
    pub patch_size: usize,
}

impl CampaignDiff {
    pub fn operation_count(&self) -> usize {
        self.patch.0.len()
    }
}

/// Compute the patch turning `old` into `new`.
///
/// Returns `Ok(None)` when the two campaigns are structurally identical,
/// which callers treat as "nothing to send".
pub fn create_diff(old: &Campaign, new: &Campaign) -> Result<Option<CampaignDiff>> {
    let left = old.to_value()?;
    let right = new.to_value()?;
    let patch = json_patch::diff(&left, &right);
    if patch.0.is_empty() {
        return Ok(None);
    }

    let patch_size = serde_json::to_vec(&patch)?.len();
    Ok(Some(CampaignDiff {
        patch,
        base_revision: old.revision,
        target_revision: old.revision.saturating_add(1),
        patch_size,
    }))
}

/// Apply `diff` to a copy of `base`.
///
/// Returns `None` when the patch no longer fits the base (a path it touches
/// is gone, or the result is not a campaign). Callers fall back to fetching
/// or sending a full snapshot.
pub fn apply_diff(base: &Campaign, diff: &CampaignDiff) -> Option<Campaign> {
    let mut doc = match base.to_value() {
        Ok(doc) => doc,
        Err(error) => {
            tracing::debug!("Cannot serialize diff base {}: {}", base.id, error);
            return None;
        }
    };

    if let Err(error) = json_patch::patch(&mut doc, &diff.patch) {
        tracing::debug!(
            "Diff for campaign {} does not apply to revision {}: {}",
            base.id,
            base.revision,
            error
        );
        return None;
    }

    match Campaign::from_value(doc) {
        Ok(campaign) => Some(campaign),
        Err(error) => {
            tracing::debug!("Patched document for {} is not a campaign: {}", base.id, error);
            None
        }
    }
}

/// Whether `revision` should be written as a full snapshot.
pub const fn should_save_full_snapshot(revision: u64) -> bool {
    should_save_full_snapshot_every(revision, SNAPSHOT_INTERVAL)
}

/// [`should_save_full_snapshot`] with a configurable interval.
///
/// An interval of 0 or 1 snapshots every revision.
pub const fn should_save_full_snapshot_every(revision: u64, interval: u64) -> bool {
    interval <= 1 || revision % interval == 0
}
