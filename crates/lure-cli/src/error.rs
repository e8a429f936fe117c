use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] lure_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Invalid campaign file {path}: {message}")]
    CampaignFile { path: String, message: String },
    #[error("Invalid {kind} ID: {value}")]
    InvalidId { kind: &'static str, value: String },
    #[error(
        "Campaign {campaign_id} is conflicted (local revision {local_revision}, server revision {server_revision}). Run `lure resolve {campaign_id} <reload|overwrite|cancel>`."
    )]
    Conflicted {
        campaign_id: String,
        local_revision: u64,
        server_revision: u64,
    },
    #[error("Configuration error: {0}")]
    Config(String),
}
