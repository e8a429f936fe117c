//! Backend selected from the active profile.

use async_trait::async_trait;
use lure_core::backend::{BackendResult, RemoteCampaign, WriteAck};
use lure_core::models::SavePayload;
use lure_core::{BackendError, CampaignBackend, CampaignId, HttpBackend};

const UNCONFIGURED_MESSAGE: &str =
    "no API base URL configured; run `lure config init --api-base-url <URL>` or set LURE_API_URL";

#[derive(Debug)]
pub enum CliBackend {
    Http(HttpBackend),
    /// No server configured; every call fails as unreachable so saves queue
    Unconfigured,
}

impl CliBackend {
    pub fn from_settings(
        api_base_url: Option<&str>,
        api_token: Option<String>,
    ) -> lure_core::Result<Self> {
        match api_base_url {
            Some(url) => Ok(Self::Http(HttpBackend::new(url, api_token)?)),
            None => Ok(Self::Unconfigured),
        }
    }

    pub const fn is_configured(&self) -> bool {
        matches!(self, Self::Http(_))
    }
}

#[async_trait]
impl CampaignBackend for CliBackend {
    async fn write(
        &self,
        campaign_id: &CampaignId,
        base_revision: u64,
        payload: &SavePayload,
    ) -> BackendResult<WriteAck> {
        match self {
            Self::Http(backend) => backend.write(campaign_id, base_revision, payload).await,
            Self::Unconfigured => Err(BackendError::Network(UNCONFIGURED_MESSAGE.to_string())),
        }
    }

    async fn read(&self, campaign_id: &CampaignId) -> BackendResult<RemoteCampaign> {
        match self {
            Self::Http(backend) => backend.read(campaign_id).await,
            Self::Unconfigured => Err(BackendError::Network(UNCONFIGURED_MESSAGE.to_string())),
        }
    }
}
