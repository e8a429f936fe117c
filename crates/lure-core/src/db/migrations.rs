//! Database migrations

use crate::error::Result;
use libsql::Connection;

/// Current schema version
const CURRENT_VERSION: i32 = 2;

/// Run all pending migrations
pub async fn run(conn: &Connection) -> Result<()> {
    let version = get_version(conn).await?;

    if version < 1 {
        migrate_v1(conn).await?;
    }
    if version < 2 {
        migrate_v2(conn).await?;
    }

    Ok(())
}

/// Get the current schema version
async fn get_version(conn: &Connection) -> Result<i32> {
    let mut rows = conn
        .query(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
            (),
        )
        .await?;

    let exists: bool = if let Some(row) = rows.next().await? {
        row.get::<i32>(0)? != 0
    } else {
        false
    };

    if !exists {
        return Ok(0);
    }

    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM schema_version", ())
        .await?;

    let version: i32 = if let Some(row) = rows.next().await? {
        row.get(0)?
    } else {
        0
    };

    Ok(version)
}

/// Run `statements` in one transaction, rolling back on the first failure
async fn apply(conn: &Connection, version: i32, statements: &[&str]) -> Result<()> {
    // libsql doesn't have execute_batch, so we run each statement separately
    conn.execute("BEGIN TRANSACTION", ()).await?;

    for stmt in statements {
        if let Err(e) = conn.execute(stmt, ()).await {
            conn.execute("ROLLBACK", ()).await.ok();
            return Err(e.into());
        }
    }

    if let Err(e) = conn
        .execute(
            "INSERT INTO schema_version (version) VALUES (?)",
            libsql::params![version],
        )
        .await
    {
        conn.execute("ROLLBACK", ()).await.ok();
        return Err(e.into());
    }

    if let Err(e) = conn.execute("COMMIT", ()).await {
        conn.execute("ROLLBACK", ()).await.ok();
        return Err(e.into());
    }

    tracing::info!("Migrated database to version {version}");
    Ok(())
}

/// Migration to version 1: save queue, drafts and server bases
async fn migrate_v1(conn: &Connection) -> Result<()> {
    apply(
        conn,
        1,
        &[
            "CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY
            )",
            // FIFO order is the autoincrement sequence, never the timestamp
            "CREATE TABLE IF NOT EXISTS save_queue (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                campaign_id TEXT NOT NULL,
                payload TEXT NOT NULL,
                is_diff INTEGER NOT NULL,
                base_revision INTEGER NOT NULL,
                created_at INTEGER NOT NULL,
                retries INTEGER NOT NULL DEFAULT 0,
                next_attempt_at INTEGER NOT NULL,
                last_error TEXT,
                state TEXT NOT NULL DEFAULT 'pending'
            )",
            "CREATE INDEX IF NOT EXISTS idx_save_queue_state ON save_queue(state, seq)",
            "CREATE INDEX IF NOT EXISTS idx_save_queue_campaign ON save_queue(campaign_id)",
            "CREATE TABLE IF NOT EXISTS drafts (
                campaign_id TEXT PRIMARY KEY,
                payload TEXT NOT NULL,
                saved_at INTEGER NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS campaign_bases (
                campaign_id TEXT PRIMARY KEY,
                revision INTEGER NOT NULL,
                snapshot TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            )",
        ],
    )
    .await
}

/// Migration to version 2: named backups and conflict log
async fn migrate_v2(conn: &Connection) -> Result<()> {
    apply(
        conn,
        CURRENT_VERSION,
        &[
            "CREATE TABLE IF NOT EXISTS backups (
                id TEXT PRIMARY KEY,
                campaign_id TEXT NOT NULL,
                name TEXT NOT NULL,
                payload TEXT NOT NULL,
                created_at INTEGER NOT NULL
            )",
            "CREATE INDEX IF NOT EXISTS idx_backups_campaign ON backups(campaign_id, created_at DESC)",
            "CREATE TABLE IF NOT EXISTS save_conflicts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                campaign_id TEXT NOT NULL,
                local_revision INTEGER NOT NULL,
                server_revision INTEGER NOT NULL,
                detected_at INTEGER NOT NULL,
                resolution TEXT,
                resolved_at INTEGER
            )",
            "CREATE INDEX IF NOT EXISTS idx_save_conflicts_campaign ON save_conflicts(campaign_id)",
            "CREATE INDEX IF NOT EXISTS idx_save_conflicts_detected_at ON save_conflicts(detected_at DESC)",
        ],
    )
    .await
}
