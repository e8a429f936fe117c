//! Draft repository: the latest local edit of each campaign

use crate::compression::{compress_json, decompress_json, COMPRESSION_THRESHOLD};
use crate::error::Result;
use crate::models::{Campaign, CampaignDraft, CampaignId};
use libsql::Connection;

use super::now_millis;

/// Trait for draft storage operations (async)
#[allow(async_fn_in_trait)]
pub trait DraftRepository {
    /// Store `campaign` as the draft of its campaign, replacing any previous one
    async fn save_draft(&self, campaign: &Campaign) -> Result<CampaignDraft>;

    /// Load the draft of a campaign
    async fn load_draft(&self, campaign_id: &CampaignId) -> Result<Option<CampaignDraft>>;

    /// Delete the draft of a campaign; returns whether one existed
    async fn delete_draft(&self, campaign_id: &CampaignId) -> Result<bool>;

    /// All drafts, most recently saved first
    async fn list_drafts(&self) -> Result<Vec<CampaignDraft>>;
}

/// libSQL implementation of `DraftRepository`
pub struct LibSqlDraftRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlDraftRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_draft(row: &libsql::Row) -> Result<CampaignDraft> {
        let payload: String = row.get(0)?;
        Ok(CampaignDraft {
            campaign: decompress_json(&payload)?,
            saved_at: row.get(1)?,
        })
    }
}

impl DraftRepository for LibSqlDraftRepository<'_> {
    async fn save_draft(&self, campaign: &Campaign) -> Result<CampaignDraft> {
        let saved_at = now_millis();
        let record = compress_json(campaign, COMPRESSION_THRESHOLD)?.to_record()?;

        self.conn
            .execute(
                "INSERT OR REPLACE INTO drafts (campaign_id, payload, saved_at) VALUES (?, ?, ?)",
                libsql::params![campaign.id.as_str(), record, saved_at],
            )
            .await?;

        Ok(CampaignDraft {
            campaign: campaign.clone(),
            saved_at,
        })
    }

    async fn load_draft(&self, campaign_id: &CampaignId) -> Result<Option<CampaignDraft>> {
        let mut rows = self
            .conn
            .query(
                "SELECT payload, saved_at FROM drafts WHERE campaign_id = ?",
                [campaign_id.as_str()],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_draft(&row)?)),
            None => Ok(None),
        }
    }

    async fn delete_draft(&self, campaign_id: &CampaignId) -> Result<bool> {
        let rows = self
            .conn
            .execute(
                "DELETE FROM drafts WHERE campaign_id = ?",
                [campaign_id.as_str()],
            )
            .await?;
        Ok(rows > 0)
    }

    async fn list_drafts(&self) -> Result<Vec<CampaignDraft>> {
        let mut rows = self
            .conn
            .query(
                "SELECT payload, saved_at FROM drafts ORDER BY saved_at DESC",
                (),
            )
            .await?;

        let mut drafts = Vec::new();
        while let Some(row) = rows.next().await? {
            drafts.push(Self::parse_draft(&row)?);
        }
        Ok(drafts)
    }
}
