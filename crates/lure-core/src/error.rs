//! Error types for lure-core

use thiserror::Error;

/// Result type alias using lure-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in lure-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// The server revision moved past the revision a save was based on
    #[error(
        "Revision conflict on campaign {campaign_id}: local revision {local_revision}, server revision {server_revision}"
    )]
    Conflict {
        campaign_id: String,
        local_revision: u64,
        server_revision: u64,
    },

    /// Transient backend failure; retried through the offline queue
    #[error("Network error: {0}")]
    Network(String),

    /// Payload could not be decoded
    #[error("Compression error: {0}")]
    Compression(String),

    /// Durable local store failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// libSQL error
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Campaign, queue entry, draft or backup not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Whether the failure is worth retrying without user involvement.
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}
