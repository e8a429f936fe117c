//! lure-core - Offline-first save pipeline for campaign editing
//!
//! This crate contains the campaign models, the diff engine, payload
//! compression, the local libSQL store (offline queue, drafts, backups,
//! conflict log) and the save orchestration shared by every Lure client.

pub mod backend;
pub mod compression;
pub mod config;
pub mod conflict;
pub mod connectivity;
pub mod db;
pub mod diff;
pub mod editor;
pub mod error;
pub mod models;
pub mod save;
pub mod state;

pub use backend::{BackendError, CampaignBackend, HttpBackend, InMemoryBackend};
pub use config::SaveConfig;
pub use conflict::{ConflictResolution, ConflictState};
pub use connectivity::Connectivity;
pub use error::{Error, Result};
pub use models::{Campaign, CampaignId};
pub use save::{SaveOutcome, SaveService};
pub use state::SaveState;
