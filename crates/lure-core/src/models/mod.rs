//! Data models for Lure

mod backup;
mod campaign;
mod queued_save;
mod save_conflict;

pub use backup::{BackupId, CampaignBackup, CampaignDraft};
pub use campaign::{Campaign, CampaignId, CampaignSection, CampaignStatus, CampaignType};
pub use queued_save::{QueueEntryState, QueuedSave, QueuedSaveId, SavePayload};
pub use save_conflict::SaveConflict;
