//! Offline save queue repository

use crate::compression::{compress_json, decompress_json, COMPRESSION_THRESHOLD};
use crate::error::{Error, Result};
use crate::models::{CampaignId, QueueEntryState, QueuedSave, QueuedSaveId, SavePayload};
use libsql::Connection;

use super::{from_sql_int, now_millis, to_sql_int};

const ENTRY_COLUMNS: &str = "id, campaign_id, payload, base_revision, created_at, retries, next_attempt_at, last_error, state";

/// Trait for queued save storage operations (async)
#[allow(async_fn_in_trait)]
pub trait SaveQueueRepository {
    /// Compress and persist a pending save
    async fn add_to_queue(
        &self,
        campaign_id: &CampaignId,
        payload: &SavePayload,
        base_revision: u64,
    ) -> Result<QueuedSave>;

    /// Pending entries in FIFO order, decompressed
    async fn get_queue(&self) -> Result<Vec<QueuedSave>>;

    /// Dead-lettered entries in FIFO order
    async fn failed_entries(&self) -> Result<Vec<QueuedSave>>;

    /// Fetch one entry regardless of state
    async fn get(&self, id: &QueuedSaveId) -> Result<Option<QueuedSave>>;

    /// Delete an acknowledged or discarded entry
    async fn remove(&self, id: &QueuedSaveId) -> Result<()>;

    /// Count a failed attempt and schedule the next one; returns the new retry count
    async fn record_failure(
        &self,
        id: &QueuedSaveId,
        error: &str,
        next_attempt_at: i64,
    ) -> Result<u32>;

    /// Move an entry to the dead-letter state
    async fn mark_failed(&self, id: &QueuedSaveId, error: &str) -> Result<()>;

    /// Put a dead-lettered entry back in the queue with a fresh retry budget
    async fn requeue(&self, id: &QueuedSaveId) -> Result<()>;

    /// Delete pending entries of one campaign; returns the number removed
    async fn discard_pending(&self, campaign_id: &CampaignId) -> Result<u64>;

    /// Delete every entry of one campaign; returns the number removed
    async fn discard_campaign(&self, campaign_id: &CampaignId) -> Result<u64>;

    /// Number of pending entries
    async fn pending_count(&self) -> Result<u64>;
}

/// libSQL implementation of `SaveQueueRepository`
pub struct LibSqlSaveQueueRepository<'a> {
    conn: &'a Connection,
    compression_threshold: usize,
}

impl<'a> LibSqlSaveQueueRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self::with_threshold(conn, COMPRESSION_THRESHOLD)
    }

    pub const fn with_threshold(conn: &'a Connection, compression_threshold: usize) -> Self {
        Self {
            conn,
            compression_threshold,
        }
    }

    fn parse_entry(row: &libsql::Row) -> Result<QueuedSave> {
        let id: String = row.get(0)?;
        let campaign_id: String = row.get(1)?;
        let payload: String = row.get(2)?;
        let state: String = row.get(8)?;

        Ok(QueuedSave {
            id: id
                .parse()
                .map_err(|_| Error::Storage(format!("invalid queue entry id: {id}")))?,
            campaign_id: campaign_id.parse()?,
            payload: decompress_json(&payload)?,
            base_revision: from_sql_int(row.get(3)?),
            created_at: row.get(4)?,
            retries: u32::try_from(row.get::<i64>(5)?).unwrap_or(u32::MAX),
            next_attempt_at: row.get(6)?,
            last_error: row.get::<Option<String>>(7)?,
            state: state.parse()?,
        })
    }

    async fn list_by_state(&self, state: QueueEntryState) -> Result<Vec<QueuedSave>> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {ENTRY_COLUMNS} FROM save_queue WHERE state = ? ORDER BY seq ASC"),
                [state.as_str()],
            )
            .await?;

        let mut entries = Vec::new();
        while let Some(row) = rows.next().await? {
            entries.push(Self::parse_entry(&row)?);
        }
        Ok(entries)
    }
}

impl SaveQueueRepository for LibSqlSaveQueueRepository<'_> {
    async fn add_to_queue(
        &self,
        campaign_id: &CampaignId,
        payload: &SavePayload,
        base_revision: u64,
    ) -> Result<QueuedSave> {
        let now = now_millis();
        let entry = QueuedSave {
            id: QueuedSaveId::new(),
            campaign_id: campaign_id.clone(),
            payload: payload.clone(),
            base_revision,
            created_at: now,
            retries: 0,
            next_attempt_at: now,
            last_error: None,
            state: QueueEntryState::Pending,
        };

        let compressed = compress_json(payload, self.compression_threshold)?;
        tracing::debug!(
            "Queueing {} for campaign {} ({} -> {} bytes)",
            payload.label(),
            campaign_id,
            compressed.original_size,
            compressed.compressed_size
        );

        self.conn
            .execute(
                "INSERT INTO save_queue (id, campaign_id, payload, is_diff, base_revision, created_at, retries, next_attempt_at, last_error, state)
                 VALUES (?, ?, ?, ?, ?, ?, 0, ?, NULL, ?)",
                libsql::params![
                    entry.id.as_str(),
                    campaign_id.as_str(),
                    compressed.to_record()?,
                    i64::from(payload.is_diff()),
                    to_sql_int(base_revision),
                    now,
                    now,
                    QueueEntryState::Pending.as_str()
                ],
            )
            .await?;

        Ok(entry)
    }

    async fn get_queue(&self) -> Result<Vec<QueuedSave>> {
        self.list_by_state(QueueEntryState::Pending).await
    }

    async fn failed_entries(&self) -> Result<Vec<QueuedSave>> {
        self.list_by_state(QueueEntryState::Failed).await
    }

    async fn get(&self, id: &QueuedSaveId) -> Result<Option<QueuedSave>> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {ENTRY_COLUMNS} FROM save_queue WHERE id = ?"),
                [id.as_str()],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_entry(&row)?)),
            None => Ok(None),
        }
    }

    async fn remove(&self, id: &QueuedSaveId) -> Result<()> {
        let rows = self
            .conn
            .execute("DELETE FROM save_queue WHERE id = ?", [id.as_str()])
            .await?;

        if rows == 0 {
            return Err(Error::NotFound(format!("queued save {id}")));
        }
        Ok(())
    }

    async fn record_failure(
        &self,
        id: &QueuedSaveId,
        error: &str,
        next_attempt_at: i64,
    ) -> Result<u32> {
        let rows = self
            .conn
            .execute(
                "UPDATE save_queue SET retries = retries + 1, last_error = ?, next_attempt_at = ? WHERE id = ?",
                libsql::params![error, next_attempt_at, id.as_str()],
            )
            .await?;

        if rows == 0 {
            return Err(Error::NotFound(format!("queued save {id}")));
        }

        let entry = self
            .get(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("queued save {id}")))?;
        Ok(entry.retries)
    }

    async fn mark_failed(&self, id: &QueuedSaveId, error: &str) -> Result<()> {
        let rows = self
            .conn
            .execute(
                "UPDATE save_queue SET state = ?, last_error = ? WHERE id = ?",
                libsql::params![QueueEntryState::Failed.as_str(), error, id.as_str()],
            )
            .await?;

        if rows == 0 {
            return Err(Error::NotFound(format!("queued save {id}")));
        }
        Ok(())
    }

    async fn requeue(&self, id: &QueuedSaveId) -> Result<()> {
        let rows = self
            .conn
            .execute(
                "UPDATE save_queue SET state = ?, retries = 0, next_attempt_at = ? WHERE id = ? AND state = ?",
                libsql::params![
                    QueueEntryState::Pending.as_str(),
                    now_millis(),
                    id.as_str(),
                    QueueEntryState::Failed.as_str()
                ],
            )
            .await?;

        if rows == 0 {
            return Err(Error::NotFound(format!("failed save {id}")));
        }
        Ok(())
    }

    async fn discard_pending(&self, campaign_id: &CampaignId) -> Result<u64> {
        Ok(self
            .conn
            .execute(
                "DELETE FROM save_queue WHERE campaign_id = ? AND state = ?",
                [campaign_id.as_str(), QueueEntryState::Pending.as_str()],
            )
            .await?)
    }

    async fn discard_campaign(&self, campaign_id: &CampaignId) -> Result<u64> {
        Ok(self
            .conn
            .execute(
                "DELETE FROM save_queue WHERE campaign_id = ?",
                [campaign_id.as_str()],
            )
            .await?)
    }

    async fn pending_count(&self) -> Result<u64> {
        let mut rows = self
            .conn
            .query(
                "SELECT COUNT(*) FROM save_queue WHERE state = ?",
                [QueueEntryState::Pending.as_str()],
            )
            .await?;

        let count = match rows.next().await? {
            Some(row) => row.get::<i64>(0)?,
            None => 0,
        };
        Ok(from_sql_int(count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::diff::create_diff;
    use crate::models::{Campaign, CampaignType};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    async fn setup() -> Database {
        Database::open_in_memory().await.unwrap()
    }

    fn snapshot(name: &str) -> SavePayload {
        let mut campaign = Campaign::new(name, CampaignType::Scratch);
        campaign.id = "c1".parse().unwrap();
        SavePayload::Snapshot { campaign }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn add_and_get_queue_roundtrip() {
        let db = setup().await;
        let repo = LibSqlSaveQueueRepository::new(db.connection());
        let campaign_id: CampaignId = "c1".parse().unwrap();

        let payload = snapshot("Scratch & win");
        let entry = repo.add_to_queue(&campaign_id, &payload, 4).await.unwrap();

        let queue = repo.get_queue().await.unwrap();
        assert_eq!(queue, vec![entry]);
        assert_eq!(queue[0].payload, payload);
        assert_eq!(queue[0].base_revision, 4);
        assert!(!queue[0].is_diff());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn payload_is_compressed_at_rest() {
        let db = setup().await;
        let repo = LibSqlSaveQueueRepository::with_threshold(db.connection(), 0);
        let campaign_id: CampaignId = "c1".parse().unwrap();

        let mut campaign = Campaign::new("Big wheel", CampaignType::Wheel);
        campaign.game_config = json!({
            "segments": (0..200).map(|i| json!({"label": format!("Prize {i}")})).collect::<Vec<_>>()
        });
        repo.add_to_queue(&campaign_id, &SavePayload::Snapshot { campaign: campaign.clone() }, 0)
            .await
            .unwrap();

        let mut rows = db
            .connection()
            .query("SELECT payload FROM save_queue", ())
            .await
            .unwrap();
        let raw: String = rows.next().await.unwrap().unwrap().get(0).unwrap();
        let envelope: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(envelope["compressed"], json!(true));
        assert!(!raw.contains("Prize 199"));

        let queue = repo.get_queue().await.unwrap();
        assert_eq!(queue[0].payload, SavePayload::Snapshot { campaign });
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn queue_is_fifo() {
        let db = setup().await;
        let repo = LibSqlSaveQueueRepository::new(db.connection());
        let first: CampaignId = "c1".parse().unwrap();
        let second: CampaignId = "c2".parse().unwrap();

        let a = repo.add_to_queue(&first, &snapshot("a"), 1).await.unwrap();
        let b = repo.add_to_queue(&second, &snapshot("b"), 1).await.unwrap();
        let c = repo.add_to_queue(&first, &snapshot("c"), 1).await.unwrap();

        let ids: Vec<_> = repo.get_queue().await.unwrap().into_iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![a.id, b.id, c.id]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn diff_payloads_keep_their_flag() {
        let db = setup().await;
        let repo = LibSqlSaveQueueRepository::new(db.connection());

        let old = Campaign::from_value(json!({"id": "c1", "name": "Old", "revision": 3})).unwrap();
        let new = Campaign::from_value(json!({"id": "c1", "name": "New", "revision": 3})).unwrap();
        let diff = create_diff(&old, &new).unwrap().unwrap();

        repo.add_to_queue(&old.id, &SavePayload::Diff { diff: diff.clone() }, 3)
            .await
            .unwrap();

        let queue = repo.get_queue().await.unwrap();
        assert!(queue[0].is_diff());
        assert_eq!(queue[0].payload, SavePayload::Diff { diff });
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failure_bookkeeping_and_dead_letters() {
        let db = setup().await;
        let repo = LibSqlSaveQueueRepository::new(db.connection());
        let campaign_id: CampaignId = "c1".parse().unwrap();
        let entry = repo.add_to_queue(&campaign_id, &snapshot("x"), 0).await.unwrap();

        assert_eq!(repo.record_failure(&entry.id, "offline", 10).await.unwrap(), 1);
        assert_eq!(repo.record_failure(&entry.id, "timeout", 20).await.unwrap(), 2);
        let fetched = repo.get(&entry.id).await.unwrap().unwrap();
        assert_eq!(fetched.last_error.as_deref(), Some("timeout"));
        assert_eq!(fetched.next_attempt_at, 20);

        repo.mark_failed(&entry.id, "gave up").await.unwrap();
        assert!(repo.get_queue().await.unwrap().is_empty());
        assert_eq!(repo.failed_entries().await.unwrap().len(), 1);
        assert_eq!(repo.pending_count().await.unwrap(), 0);

        repo.requeue(&entry.id).await.unwrap();
        let queue = repo.get_queue().await.unwrap();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].retries, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn requeue_rejects_pending_entries() {
        let db = setup().await;
        let repo = LibSqlSaveQueueRepository::new(db.connection());
        let entry = repo
            .add_to_queue(&"c1".parse().unwrap(), &snapshot("x"), 0)
            .await
            .unwrap();
        assert!(matches!(repo.requeue(&entry.id).await, Err(Error::NotFound(_))));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn remove_and_discard() {
        let db = setup().await;
        let repo = LibSqlSaveQueueRepository::new(db.connection());
        let first: CampaignId = "c1".parse().unwrap();
        let second: CampaignId = "c2".parse().unwrap();

        let a = repo.add_to_queue(&first, &snapshot("a"), 0).await.unwrap();
        repo.add_to_queue(&first, &snapshot("b"), 0).await.unwrap();
        repo.add_to_queue(&second, &snapshot("c"), 0).await.unwrap();

        repo.remove(&a.id).await.unwrap();
        assert!(matches!(repo.remove(&a.id).await, Err(Error::NotFound(_))));

        assert_eq!(repo.discard_pending(&first).await.unwrap(), 1);
        assert_eq!(repo.pending_count().await.unwrap(), 1);
        assert_eq!(repo.discard_campaign(&second).await.unwrap(), 1);
        assert_eq!(repo.pending_count().await.unwrap(), 0);
    }
}
