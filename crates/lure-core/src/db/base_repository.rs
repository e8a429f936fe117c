//! Last known server state per campaign (the diff base)

use crate::compression::{compress_json, decompress_json, COMPRESSION_THRESHOLD};
use crate::error::Result;
use crate::models::{Campaign, CampaignId};
use libsql::Connection;

use super::{now_millis, to_sql_int};

/// Trait for server base storage operations (async)
#[allow(async_fn_in_trait)]
pub trait BaseRepository {
    /// Last acknowledged campaign state; its `revision` is the server revision
    async fn load_base(&self, campaign_id: &CampaignId) -> Result<Option<Campaign>>;

    /// Record `campaign` as acknowledged at `campaign.revision`
    async fn store_base(&self, campaign: &Campaign) -> Result<()>;

    /// Forget the base of a campaign
    async fn delete_base(&self, campaign_id: &CampaignId) -> Result<bool>;
}

/// libSQL implementation of `BaseRepository`
pub struct LibSqlBaseRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlBaseRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl BaseRepository for LibSqlBaseRepository<'_> {
    async fn load_base(&self, campaign_id: &CampaignId) -> Result<Option<Campaign>> {
        let mut rows = self
            .conn
            .query(
                "SELECT snapshot FROM campaign_bases WHERE campaign_id = ?",
                [campaign_id.as_str()],
            )
            .await?;

        match rows.next().await? {
            Some(row) => {
                let snapshot: String = row.get(0)?;
                Ok(Some(decompress_json(&snapshot)?))
            }
            None => Ok(None),
        }
    }

    async fn store_base(&self, campaign: &Campaign) -> Result<()> {
        let record = compress_json(campaign, COMPRESSION_THRESHOLD)?.to_record()?;
        self.conn
            .execute(
                "INSERT OR REPLACE INTO campaign_bases (campaign_id, revision, snapshot, updated_at) VALUES (?, ?, ?, ?)",
                libsql::params![
                    campaign.id.as_str(),
                    to_sql_int(campaign.revision),
                    record,
                    now_millis()
                ],
            )
            .await?;
        Ok(())
    }

    async fn delete_base(&self, campaign_id: &CampaignId) -> Result<bool> {
        let rows = self
            .conn
            .execute(
                "DELETE FROM campaign_bases WHERE campaign_id = ?",
                [campaign_id.as_str()],
            )
            .await?;
        Ok(rows > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::CampaignType;

    #[tokio::test(flavor = "multi_thread")]
    async fn base_replaces_previous_revision() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = LibSqlBaseRepository::new(db.connection());

        let mut campaign = Campaign::new("Wheel", CampaignType::Wheel);
        campaign.revision = 3;
        repo.store_base(&campaign).await.unwrap();
        campaign.revision = 4;
        repo.store_base(&campaign).await.unwrap();

        let base = repo.load_base(&campaign.id).await.unwrap().unwrap();
        assert_eq!(base.revision, 4);

        assert!(repo.delete_base(&campaign.id).await.unwrap());
        assert!(repo.load_base(&campaign.id).await.unwrap().is_none());
    }
}
