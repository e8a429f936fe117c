//! Whole-campaign revision conflict detection.
//!
//! A campaign is `Clean` while the revision local edits are based on equals
//! the last revision the server reported. When a write is rejected because
//! the server moved ahead, the campaign becomes `Conflicted` and every further
//! write is blocked until the user picks one of the three resolutions. There
//! is no merge: the campaign is either reloaded or overwritten as a whole.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// User choice for a conflicted campaign
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConflictResolution {
    /// Drop local edits and adopt the server state
    #[serde(rename = "reload")]
    ReloadDiscardLocal,
    /// Write the local state on top of the current server revision
    #[serde(rename = "overwrite")]
    ForceOverwrite,
    /// Keep the conflict open without writing
    #[serde(rename = "cancel")]
    Cancel,
}

impl ConflictResolution {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ReloadDiscardLocal => "reload",
            Self::ForceOverwrite => "overwrite",
            Self::Cancel => "cancel",
        }
    }
}

impl fmt::Display for ConflictResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConflictResolution {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reload" => Ok(Self::ReloadDiscardLocal),
            "overwrite" => Ok(Self::ForceOverwrite),
            "cancel" => Ok(Self::Cancel),
            other => Err(Error::InvalidInput(format!(
                "unknown conflict resolution: {other}"
            ))),
        }
    }
}

/// Conflict state of one campaign
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictState {
    #[default]
    Clean,
    Conflicted {
        /// Revision the rejected edit was based on
        local_revision: u64,
        /// Revision the server reported
        server_revision: u64,
    },
}

/// What the caller must do after [`ConflictDetector::resolve`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionStep {
    /// Fetch the server campaign and drop local edits
    Reload,
    /// Write the local campaign as a snapshot based on `server_revision`
    Overwrite { server_revision: u64 },
    /// No write; the campaign stays conflicted
    Stay,
    /// The campaign was not conflicted
    NothingToResolve,
}

/// Two-state machine guarding writes for a single campaign
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConflictDetector {
    state: ConflictState,
}

impl ConflictDetector {
    pub const fn new() -> Self {
        Self {
            state: ConflictState::Clean,
        }
    }

    /// Restore a persisted conflict
    pub const fn conflicted(local_revision: u64, server_revision: u64) -> Self {
        Self {
            state: ConflictState::Conflicted {
                local_revision,
                server_revision,
            },
        }
    }

    pub const fn state(&self) -> ConflictState {
        self.state
    }

    pub const fn is_conflicted(&self) -> bool {
        matches!(self.state, ConflictState::Conflicted { .. })
    }

    /// Whether a write may be attempted
    pub const fn allows_write(&self) -> bool {
        !self.is_conflicted()
    }

    /// Record the revision the server reported for a write based on
    /// `local_revision`. A mismatch moves the detector to `Conflicted`.
    pub fn observe(&mut self, local_revision: u64, server_revision: u64) -> ConflictState {
        if local_revision != server_revision {
            if !self.is_conflicted() {
                tracing::info!(
                    "Revision mismatch: local edit based on {}, server at {}",
                    local_revision,
                    server_revision
                );
            }
            self.state = ConflictState::Conflicted {
                local_revision,
                server_revision,
            };
        }
        self.state
    }

    /// Apply a user resolution.
    ///
    /// `Reload` returns to `Clean` immediately. `Overwrite` stays
    /// `Conflicted` until the caller reports the write with [`Self::mark_clean`].
    pub fn resolve(&mut self, resolution: ConflictResolution) -> ResolutionStep {
        let ConflictState::Conflicted {
            server_revision, ..
        } = self.state
        else {
            return ResolutionStep::NothingToResolve;
        };

        match resolution {
            ConflictResolution::ReloadDiscardLocal => {
                self.state = ConflictState::Clean;
                ResolutionStep::Reload
            }
            ConflictResolution::ForceOverwrite => ResolutionStep::Overwrite { server_revision },
            ConflictResolution::Cancel => ResolutionStep::Stay,
        }
    }

    pub fn mark_clean(&mut self) {
        self.state = ConflictState::Clean;
    }
}
