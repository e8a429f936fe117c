//! Database layer for Lure

mod backup_repository;
mod base_repository;
mod conflict_repository;
mod connection;
mod draft_repository;
mod migrations;
mod queue_repository;

pub use backup_repository::{BackupRepository, LibSqlBackupRepository};
pub use base_repository::{BaseRepository, LibSqlBaseRepository};
pub use conflict_repository::{ConflictRepository, LibSqlConflictRepository};
pub use connection::Database;
pub use draft_repository::{DraftRepository, LibSqlDraftRepository};
pub use queue_repository::{LibSqlSaveQueueRepository, SaveQueueRepository};

/// SQLite stores integers as i64
pub(crate) fn to_sql_int(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

pub(crate) fn from_sql_int(value: i64) -> u64 {
    u64::try_from(value).unwrap_or_default()
}

pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
