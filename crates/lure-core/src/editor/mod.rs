//! Editor state store.
//!
//! The active campaign lives in one place and only changes through
//! [`EditorStore::dispatch`]. Views and the autosave loop subscribe to it.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::watch;

use crate::models::{Campaign, CampaignSection, CampaignStatus};

/// Mutations of the active campaign
#[derive(Debug, Clone, PartialEq)]
pub enum EditorAction {
    /// Open a campaign, replacing the current one
    Load(Campaign),
    Rename(String),
    SetStatus(CampaignStatus),
    SetSection {
        section: CampaignSection,
        value: Value,
    },
    /// The server stored the campaign at `revision`
    Acknowledge { revision: u64 },
    Close,
}

/// Apply `action` to `state`; returns whether anything changed
pub fn reduce(state: &mut Option<Campaign>, action: EditorAction) -> bool {
    match action {
        EditorAction::Load(campaign) => {
            let changed = state.as_ref() != Some(&campaign);
            *state = Some(campaign);
            changed
        }
        EditorAction::Close => state.take().is_some(),
        action => match state.as_mut() {
            Some(campaign) => apply(campaign, action),
            None => {
                tracing::debug!("Ignoring editor action without an open campaign");
                false
            }
        },
    }
}

fn apply(campaign: &mut Campaign, action: EditorAction) -> bool {
    match action {
        EditorAction::Rename(name) => {
            let name = name.trim();
            if name.is_empty() || campaign.name == name {
                return false;
            }
            campaign.name = name.to_string();
            true
        }
        EditorAction::SetStatus(status) => {
            let changed = campaign.status != status;
            campaign.status = status;
            changed
        }
        EditorAction::SetSection { section, value } => {
            let slot = campaign.section_mut(section);
            if *slot == value {
                return false;
            }
            *slot = value;
            true
        }
        EditorAction::Acknowledge { revision } => {
            if revision <= campaign.revision {
                return false;
            }
            campaign.revision = revision;
            true
        }
        EditorAction::Load(_) | EditorAction::Close => false,
    }
}

/// Single-writer holder of the campaign being edited
#[derive(Debug, Clone)]
pub struct EditorStore {
    tx: Arc<watch::Sender<Option<Campaign>>>,
}

impl Default for EditorStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EditorStore {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Returns whether subscribers were notified
    pub fn dispatch(&self, action: EditorAction) -> bool {
        self.tx.send_if_modified(|state| reduce(state, action))
    }

    pub fn current(&self) -> Option<Campaign> {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Campaign>> {
        self.tx.subscribe()
    }
}
