//! REST campaign backend

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::Deserialize;

use super::{
    error_excerpt, BackendError, BackendResult, CampaignBackend, RemoteCampaign, WriteAck,
};
use crate::config::{normalize_api_base_url, setting_value};
use crate::error::{Error, Result};
use crate::models::{Campaign, CampaignId, SavePayload};

const HTTP_TIMEOUT_SECS: u64 = 10;

/// Backend speaking `GET /v1/campaigns/{id}` and
/// `PUT /v1/campaigns/{id}/revisions/{base_revision}`
#[derive(Clone)]
pub struct HttpBackend {
    base_url: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl std::fmt::Debug for HttpBackend {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("HttpBackend")
            .field("base_url", &self.base_url)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish_non_exhaustive()
    }
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Result<Self> {
        let base_url: String = base_url.into();
        let base_url = normalize_api_base_url(&base_url)?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .map_err(|error| Error::Network(format!("failed to build HTTP client: {error}")))?;

        Ok(Self {
            base_url,
            token: setting_value(token),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Ids are opaque, so the path segment is percent-encoded.
    fn campaign_url(&self, campaign_id: &CampaignId) -> String {
        format!(
            "{}/v1/campaigns/{}",
            self.base_url,
            urlencoding::encode(campaign_id.as_str())
        )
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let request = self
            .client
            .request(method, url)
            .header(reqwest::header::ACCEPT, "application/json");
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl CampaignBackend for HttpBackend {
    async fn write(
        &self,
        campaign_id: &CampaignId,
        base_revision: u64,
        payload: &SavePayload,
    ) -> BackendResult<WriteAck> {
        let url = format!(
            "{}/revisions/{base_revision}",
            self.campaign_url(campaign_id)
        );
        let response = self
            .request(Method::PUT, &url)
            .json(payload)
            .send()
            .await
            .map_err(|error| BackendError::Network(error.to_string()))?;

        let status = response.status();
        if status.is_success() {
            // An unreadable acknowledgement is retried; a repeat is answered with a conflict.
            return response
                .json::<WriteAck>()
                .await
                .map_err(|error| BackendError::Network(format!("invalid acknowledgement: {error}")));
        }

        let body = response.text().await.unwrap_or_default();
        Err(error_for_status(status, &body))
    }

    async fn read(&self, campaign_id: &CampaignId) -> BackendResult<RemoteCampaign> {
        let response = self
            .request(Method::GET, &self.campaign_url(campaign_id))
            .send()
            .await
            .map_err(|error| BackendError::Network(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(error_for_status(status, &body));
        }

        let campaign = response
            .json::<Campaign>()
            .await
            .map_err(|error| BackendError::InvalidPayload(format!("invalid campaign: {error}")))?;
        Ok(RemoteCampaign::from(campaign))
    }
}

#[derive(Debug, Deserialize)]
struct ConflictBody {
    server_revision: u64,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<String>,
    message: Option<String>,
}

fn error_for_status(status: StatusCode, body: &str) -> BackendError {
    if status == StatusCode::CONFLICT {
        return match serde_json::from_str::<ConflictBody>(body) {
            Ok(conflict) => BackendError::Conflict {
                server_revision: conflict.server_revision,
            },
            Err(_) => BackendError::Network(format!(
                "conflict response without server_revision: {}",
                describe_error(status, body)
            )),
        };
    }

    let message = describe_error(status, body);
    match status {
        StatusCode::NOT_FOUND => BackendError::NotFound(message),
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => {
            BackendError::Network(message)
        }
        status if status.is_server_error() => BackendError::Network(message),
        _ => BackendError::InvalidPayload(message),
    }
}

fn describe_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return format!("{} ({})", message.trim(), status.as_u16());
        }
    }

    let trimmed = error_excerpt(body);
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{trimmed} ({})", status.as_u16())
    }
}
