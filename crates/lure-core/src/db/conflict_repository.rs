//! Save conflict log repository

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT

use crate::conflict::ConflictResolution;
use crate::error::Result;
use crate::models::{CampaignId, SaveConflict};
use libsql::Connection;

use super::{from_sql_int, now_millis, to_sql_int};

const CONFLICT_COLUMNS: &str =
    "id, campaign_id, local_revision, server_revision, detected_at, resolution, resolved_at";

/// Trait for conflict log operations (async)
#[allow(async_fn_in_trait)]
pub trait ConflictRepository {
    /// Record a conflict, updating the open one for the campaign if present
    async fn record_conflict(
        &self,
        campaign_id: &CampaignId,
        local_revision: u64,
        server_revision: u64,
    ) -> Result<SaveConflict>;

    /// The unresolved conflict of a campaign, if any
    async fn open_conflict(&self, campaign_id: &CampaignId) -> Result<Option<SaveConflict>>;

    /// Close the open conflict of a campaign; returns whether one was open
    async fn resolve_open(
        &self,
        campaign_id: &CampaignId,
        resolution: ConflictResolution,
    ) -> Result<bool>;

    /// Recently detected conflicts, newest first
    async fn list_conflicts(&self, limit: usize) -> Result<Vec<SaveConflict>>;
}

/// libSQL implementation of `ConflictRepository`
pub struct LibSqlConflictRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlConflictRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_conflict(row: &libsql::Row) -> Result<SaveConflict> {
        let resolution = row
            .get::<Option<String>>(5)?
            .map(|value| value.parse::<ConflictResolution>())
            .transpose()?;

        Ok(SaveConflict {
            id: row.get(0)?,
            campaign_id: row.get(1)?,
            local_revision: from_sql_int(row.get(2)?),
            server_revision: from_sql_int(row.get(3)?),
            detected_at: row.get(4)?,
            resolution,
            resolved_at: row.get::<Option<i64>>(6)?,
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<SaveConflict>> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {CONFLICT_COLUMNS} FROM save_conflicts WHERE id = ?"),
                libsql::params![id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_conflict(&row)?)),
            None => Ok(None),
        }
    }
}

impl ConflictRepository for LibSqlConflictRepository<'_> {
    async fn record_conflict(
        &self,
        campaign_id: &CampaignId,
        local_revision: u64,
        server_revision: u64,
    ) -> Result<SaveConflict> {
        if let Some(open) = self.open_conflict(campaign_id).await? {
            self.conn
                .execute(
                    "UPDATE save_conflicts SET local_revision = ?, server_revision = ? WHERE id = ?",
                    libsql::params![
                        to_sql_int(local_revision),
                        to_sql_int(server_revision),
                        open.id
                    ],
                )
                .await?;
            return Ok(SaveConflict {
                local_revision,
                server_revision,
                ..open
            });
        }

        let detected_at = now_millis();
        self.conn
            .execute(
                "INSERT INTO save_conflicts (campaign_id, local_revision, server_revision, detected_at, resolution, resolved_at)
                 VALUES (?, ?, ?, ?, NULL, NULL)",
                libsql::params![
                    campaign_id.as_str(),
                    to_sql_int(local_revision),
                    to_sql_int(server_revision),
                    detected_at
                ],
            )
            .await?;

        let id = self.conn.last_insert_rowid();
        Ok(SaveConflict {
            id,
            campaign_id: campaign_id.to_string(),
            local_revision,
            server_revision,
            detected_at,
            resolution: None,
            resolved_at: None,
        })
    }

    async fn open_conflict(&self, campaign_id: &CampaignId) -> Result<Option<SaveConflict>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id FROM save_conflicts
                 WHERE campaign_id = ? AND resolution IS NULL
                 ORDER BY id DESC LIMIT 1",
                [campaign_id.as_str()],
            )
            .await?;

        let Some(row) = rows.next().await? else {
            return Ok(None);
        };
        let id: i64 = row.get(0)?;
        self.get_by_id(id).await
    }

    async fn resolve_open(
        &self,
        campaign_id: &CampaignId,
        resolution: ConflictResolution,
    ) -> Result<bool> {
        let rows = self
            .conn
            .execute(
                "UPDATE save_conflicts SET resolution = ?, resolved_at = ?
                 WHERE campaign_id = ? AND resolution IS NULL",
                libsql::params![resolution.as_str(), now_millis(), campaign_id.as_str()],
            )
            .await?;
        Ok(rows > 0)
    }

    async fn list_conflicts(&self, limit: usize) -> Result<Vec<SaveConflict>> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {CONFLICT_COLUMNS} FROM save_conflicts ORDER BY detected_at DESC, id DESC LIMIT ?"
                ),
                libsql::params![limit as i64],
            )
            .await?;

        let mut conflicts = Vec::new();
        while let Some(row) = rows.next().await? {
            conflicts.push(Self::parse_conflict(&row)?);
        }
        Ok(conflicts)
    }
}
