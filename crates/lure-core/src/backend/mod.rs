//! Remote campaign store contract.
//!
//! The backend owns the authoritative revision counter. A write names the
//! revision it was based on; the backend rejects it with
//! [`BackendError::Conflict`] when its own revision has moved on.

mod http;
mod memory;

pub use http::HttpBackend;
pub use memory::InMemoryBackend;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::Error;
use crate::models::{Campaign, CampaignId, SavePayload};

/// Server acknowledgement of an applied write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteAck {
    #[serde(alias = "revision")]
    pub new_revision: u64,
}

/// Campaign as currently stored by the server
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteCampaign {
    pub campaign: Campaign,
    pub revision: u64,
}

impl From<Campaign> for RemoteCampaign {
    fn from(campaign: Campaign) -> Self {
        let revision = campaign.revision;
        Self { campaign, revision }
    }
}

/// Failures reported by a backend
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    #[error("server is at revision {server_revision}")]
    Conflict { server_revision: u64 },

    #[error("backend unreachable: {0}")]
    Network(String),

    #[error("payload rejected: {0}")]
    InvalidPayload(String),

    #[error("campaign not found: {0}")]
    NotFound(String),
}

pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Longest server message kept in queue entries and error output
pub const ERROR_EXCERPT_CHARS: usize = 180;

/// Trimmed server message cut to [`ERROR_EXCERPT_CHARS`] characters
pub fn error_excerpt(message: &str) -> String {
    message.trim().chars().take(ERROR_EXCERPT_CHARS).collect()
}

impl BackendError {
    /// Convert into the crate error for a write based on `local_revision`
    pub fn into_error(self, campaign_id: &CampaignId, local_revision: u64) -> Error {
        match self {
            Self::Conflict { server_revision } => Error::Conflict {
                campaign_id: campaign_id.to_string(),
                local_revision,
                server_revision,
            },
            Self::Network(message) => Error::Network(message),
            Self::InvalidPayload(message) => Error::InvalidInput(message),
            Self::NotFound(message) => Error::NotFound(message),
        }
    }
}

/// Authoritative campaign storage
#[async_trait]
pub trait CampaignBackend: Send + Sync {
    /// Apply `payload` on top of `base_revision`
    async fn write(
        &self,
        campaign_id: &CampaignId,
        base_revision: u64,
        payload: &SavePayload,
    ) -> BackendResult<WriteAck>;

    /// Fetch the current server campaign
    async fn read(&self, campaign_id: &CampaignId) -> BackendResult<RemoteCampaign>;
}
