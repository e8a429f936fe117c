//! Named campaign backup repository

use crate::compression::{compress_json, decompress_json, COMPRESSION_THRESHOLD};
use crate::error::{Error, Result};
use crate::models::{BackupId, Campaign, CampaignBackup, CampaignId};
use libsql::Connection;

/// Trait for backup storage operations (async)
#[allow(async_fn_in_trait)]
pub trait BackupRepository {
    /// Snapshot `campaign` under a human-readable name
    async fn create_backup(&self, campaign: &Campaign, name: &str) -> Result<CampaignBackup>;

    /// Backups of one campaign, newest first
    async fn list_backups(&self, campaign_id: &CampaignId) -> Result<Vec<CampaignBackup>>;

    /// Get a backup by ID
    async fn get_backup(&self, id: &BackupId) -> Result<Option<CampaignBackup>>;

    /// Delete a backup
    async fn delete_backup(&self, id: &BackupId) -> Result<()>;
}

/// libSQL implementation of `BackupRepository`
pub struct LibSqlBackupRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlBackupRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_backup(row: &libsql::Row) -> Result<CampaignBackup> {
        let id: String = row.get(0)?;
        let campaign_id: String = row.get(1)?;
        let payload: String = row.get(3)?;
        Ok(CampaignBackup {
            id: id
                .parse()
                .map_err(|_| Error::Storage(format!("invalid backup id: {id}")))?,
            campaign_id: campaign_id.parse()?,
            name: row.get(2)?,
            campaign: decompress_json(&payload)?,
            created_at: row.get(4)?,
        })
    }
}

impl BackupRepository for LibSqlBackupRepository<'_> {
    async fn create_backup(&self, campaign: &Campaign, name: &str) -> Result<CampaignBackup> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::InvalidInput("backup name cannot be empty".into()));
        }

        let backup = CampaignBackup::new(campaign, name);
        let record = compress_json(&backup.campaign, COMPRESSION_THRESHOLD)?.to_record()?;

        self.conn
            .execute(
                "INSERT INTO backups (id, campaign_id, name, payload, created_at) VALUES (?, ?, ?, ?, ?)",
                libsql::params![
                    backup.id.as_str(),
                    backup.campaign_id.as_str(),
                    backup.name.as_str(),
                    record,
                    backup.created_at
                ],
            )
            .await?;

        tracing::info!("Created backup '{}' of campaign {}", backup.name, backup.campaign_id);
        Ok(backup)
    }

    async fn list_backups(&self, campaign_id: &CampaignId) -> Result<Vec<CampaignBackup>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, campaign_id, name, payload, created_at
                 FROM backups
                 WHERE campaign_id = ?
                 ORDER BY created_at DESC, id DESC",
                [campaign_id.as_str()],
            )
            .await?;

        let mut backups = Vec::new();
        while let Some(row) = rows.next().await? {
            backups.push(Self::parse_backup(&row)?);
        }
        Ok(backups)
    }

    async fn get_backup(&self, id: &BackupId) -> Result<Option<CampaignBackup>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, campaign_id, name, payload, created_at FROM backups WHERE id = ?",
                [id.as_str()],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_backup(&row)?)),
            None => Ok(None),
        }
    }

    async fn delete_backup(&self, id: &BackupId) -> Result<()> {
        let rows = self
            .conn
            .execute("DELETE FROM backups WHERE id = ?", [id.as_str()])
            .await?;

        if rows == 0 {
            return Err(Error::NotFound(format!("backup {id}")));
        }
        Ok(())
    }
}
