//! Save orchestration.
//!
//! [`SaveService`] turns an edited campaign into a backend write: diff it
//! against the last state the server acknowledged, choose diff or snapshot,
//! write directly when online and fall back to the offline queue otherwise.
//! Live saves, queue drains and conflict resolution for one campaign are
//! serialized by a per-campaign lock.

mod locks;
mod retry;
mod worker;

#[cfg(test)]
mod tests;

pub use retry::RetryPolicy;
pub use worker::{Autosave, DrainWorker};

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::{watch, Mutex};

use crate::backend::{BackendError, CampaignBackend};
use crate::config::SaveConfig;
use crate::conflict::{ConflictDetector, ConflictResolution, ConflictState, ResolutionStep};
use crate::connectivity::Connectivity;
use crate::db::{
    now_millis, BackupRepository, BaseRepository, ConflictRepository, Database, DraftRepository,
    LibSqlBackupRepository, LibSqlBaseRepository, LibSqlConflictRepository,
    LibSqlDraftRepository, LibSqlSaveQueueRepository, SaveQueueRepository,
};
use crate::diff::{apply_diff, create_diff, should_save_full_snapshot_every};
use crate::error::{Error, Result};
use crate::models::{
    BackupId, Campaign, CampaignBackup, CampaignDraft, CampaignId, QueueEntryState, QueuedSave,
    QueuedSaveId, SaveConflict, SavePayload,
};
use crate::state::SaveState;
use locks::CampaignLocks;

/// Why a save went to the offline queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueReason {
    Offline,
    Unreachable(String),
}

/// Result of [`SaveService::save`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Identical to the acknowledged state; nothing was sent
    NoChanges,
    Saved { revision: u64, sent_diff: bool },
    Queued {
        entry_id: QueuedSaveId,
        reason: QueueReason,
    },
    /// Rejected by the server or blocked by an unresolved conflict
    Conflicted {
        local_revision: u64,
        server_revision: u64,
    },
}

/// Counters of one pass over the queue
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub flushed: usize,
    pub retried: usize,
    pub dead_lettered: usize,
    pub conflicts: usize,
    /// Entries of conflicted campaigns, left in place
    pub blocked: usize,
    /// Entries still backing off
    pub deferred: usize,
    pub skipped_offline: bool,
    /// Pending entries after the pass
    pub remaining: u64,
}

/// Result of [`SaveService::resolve_conflict`]
#[derive(Debug, Clone, PartialEq)]
pub enum ResolutionOutcome {
    /// Local edits dropped; the server campaign is the new local state
    Reloaded { campaign: Campaign },
    /// Local campaign written over the server copy
    Overwritten { revision: u64 },
    StillConflicted {
        local_revision: u64,
        server_revision: u64,
    },
    NothingToResolve,
}

struct SavePlan {
    /// Campaign as it will be stored, with `revision` equal to `base_revision`
    candidate: Campaign,
    payload: SavePayload,
    base_revision: u64,
}

enum Delivery {
    Acked {
        new_revision: u64,
        payload: SavePayload,
    },
    Conflict {
        server_revision: u64,
    },
    Unreachable {
        error: String,
        payload: SavePayload,
    },
    Rejected(BackendError),
}

enum EntryOutcome {
    Flushed,
    Retrying,
    DeadLettered,
    Conflicted,
    Blocked,
    Gone,
}

/// Which queue entries an acknowledged write settles
enum Settle<'a> {
    /// Direct write: older pending entries are superseded
    Live,
    /// Drained entry
    Entry(&'a QueuedSaveId),
    /// Forced overwrite: every entry of the campaign is obsolete
    Overwrite,
}

/// Offline-first save pipeline for campaigns
pub struct SaveService<B> {
    db: Arc<Mutex<Database>>,
    backend: Arc<B>,
    connectivity: Connectivity,
    config: SaveConfig,
    locks: Arc<CampaignLocks>,
    state: Arc<watch::Sender<SaveState>>,
}

impl<B> Clone for SaveService<B> {
    fn clone(&self) -> Self {
        Self {
            db: Arc::clone(&self.db),
            backend: Arc::clone(&self.backend),
            connectivity: self.connectivity.clone(),
            config: self.config.clone(),
            locks: Arc::clone(&self.locks),
            state: Arc::clone(&self.state),
        }
    }
}

impl<B: CampaignBackend> SaveService<B> {
    pub fn new(
        db: Database,
        backend: Arc<B>,
        connectivity: Connectivity,
        config: SaveConfig,
    ) -> Self {
        let (state, _rx) = watch::channel(SaveState::Idle);
        Self {
            db: Arc::new(Mutex::new(db)),
            backend,
            connectivity,
            config,
            locks: Arc::new(CampaignLocks::default()),
            state: Arc::new(state),
        }
    }

    /// Service over an in-memory database (primarily for tests).
    pub async fn open_in_memory(backend: Arc<B>, connectivity: Connectivity) -> Result<Self> {
        let db = Database::open_in_memory().await?;
        Ok(Self::new(db, backend, connectivity, SaveConfig::default()))
    }

    pub const fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    pub const fn connectivity(&self) -> &Connectivity {
        &self.connectivity
    }

    pub const fn config(&self) -> &SaveConfig {
        &self.config
    }

    pub fn subscribe(&self) -> watch::Receiver<SaveState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> SaveState {
        self.state.borrow().clone()
    }

    fn publish(&self, state: SaveState) {
        tracing::debug!("Save state: {}", state.label());
        self.state.send_replace(state);
    }

    fn queue_repo<'a>(&self, db: &'a Database) -> LibSqlSaveQueueRepository<'a> {
        LibSqlSaveQueueRepository::with_threshold(db.connection(), self.config.compression_threshold)
    }

    /// Save `campaign`, online when possible and through the queue otherwise.
    ///
    /// The campaign is stored as the local draft before anything else, so an
    /// edit survives even when every later step fails.
    pub async fn save(&self, campaign: &Campaign) -> Result<SaveOutcome> {
        let _guard = self.locks.acquire(&campaign.id).await;
        self.publish(SaveState::Saving {
            campaign_id: campaign.id.clone(),
        });

        self.save_locked(campaign)
            .await
            .inspect_err(|error| self.publish_failure(&campaign.id, error))
    }

    async fn save_locked(&self, campaign: &Campaign) -> Result<SaveOutcome> {
        let (base, mut detector) = {
            let db = self.db.lock().await;
            LibSqlDraftRepository::new(db.connection())
                .save_draft(campaign)
                .await?;
            let base = LibSqlBaseRepository::new(db.connection())
                .load_base(&campaign.id)
                .await?;
            let conflict = LibSqlConflictRepository::new(db.connection())
                .open_conflict(&campaign.id)
                .await?;
            (base, restore_detector(conflict.as_ref()))
        };

        if let ConflictState::Conflicted {
            local_revision,
            server_revision,
        } = detector.state()
        {
            tracing::debug!(
                "Save of campaign {} blocked by unresolved conflict",
                campaign.id
            );
            self.publish_conflicted(&campaign.id, local_revision, server_revision);
            return Ok(SaveOutcome::Conflicted {
                local_revision,
                server_revision,
            });
        }

        let Some(plan) = self.plan(campaign, base.as_ref())? else {
            let revision = base.map_or(campaign.revision, |base| base.revision);
            let db = self.db.lock().await;
            LibSqlDraftRepository::new(db.connection())
                .delete_draft(&campaign.id)
                .await?;
            drop(db);
            tracing::debug!("Campaign {} unchanged since revision {}", campaign.id, revision);
            self.publish(SaveState::Saved {
                campaign_id: campaign.id.clone(),
                revision,
            });
            return Ok(SaveOutcome::NoChanges);
        };

        if !self.connectivity.is_online() {
            return self
                .enqueue(&campaign.id, &plan.payload, plan.base_revision, QueueReason::Offline)
                .await;
        }

        let delivery = self
            .deliver(
                &campaign.id,
                plan.base_revision,
                plan.payload.clone(),
                Some(&plan.candidate),
                &mut detector,
            )
            .await;

        match delivery {
            Delivery::Acked {
                new_revision,
                payload,
            } => {
                self.acknowledge(&campaign.id, Some(plan.candidate), new_revision, Settle::Live)
                    .await?;
                Ok(SaveOutcome::Saved {
                    revision: new_revision,
                    sent_diff: payload.is_diff(),
                })
            }
            Delivery::Conflict { server_revision } => {
                self.record_conflict(&campaign.id, plan.base_revision, server_revision)
                    .await?;
                Ok(SaveOutcome::Conflicted {
                    local_revision: plan.base_revision,
                    server_revision,
                })
            }
            Delivery::Unreachable { error, payload } => {
                tracing::warn!(
                    "Save of campaign {} failed ({}); queueing for retry",
                    campaign.id,
                    error
                );
                self.enqueue(
                    &campaign.id,
                    &payload,
                    plan.base_revision,
                    QueueReason::Unreachable(error),
                )
                .await
            }
            Delivery::Rejected(error) => Err(error.into_error(&campaign.id, plan.base_revision)),
        }
    }

    /// Show a failed save on the indicator; conflicts publish their own state.
    fn publish_failure(&self, campaign_id: &CampaignId, error: &Error) {
        if matches!(error, Error::Conflict { .. }) {
            return;
        }
        tracing::error!("Save of campaign {} failed: {}", campaign_id, error);
        self.publish(SaveState::Failed {
            campaign_id: campaign_id.clone(),
            error: error.to_string(),
        });
    }

    /// Pick the payload for `campaign`; `None` when it matches the base.
    fn plan(&self, campaign: &Campaign, base: Option<&Campaign>) -> Result<Option<SavePlan>> {
        let Some(base) = base else {
            return Ok(Some(SavePlan {
                candidate: campaign.clone(),
                payload: SavePayload::Snapshot {
                    campaign: campaign.clone(),
                },
                base_revision: campaign.revision,
            }));
        };

        // The editor's revision may have drifted; the base is authoritative.
        let mut candidate = campaign.clone();
        candidate.revision = base.revision;

        let Some(diff) = create_diff(base, &candidate)? else {
            return Ok(None);
        };

        let snapshot_size = candidate.snapshot_size()?;
        let payload = if should_save_full_snapshot_every(
            diff.target_revision,
            self.config.snapshot_interval,
        ) || diff.patch_size >= snapshot_size
        {
            tracing::debug!(
                "Sending snapshot of campaign {} for revision {} ({} patch bytes, {} snapshot bytes)",
                campaign.id,
                diff.target_revision,
                diff.patch_size,
                snapshot_size
            );
            SavePayload::Snapshot {
                campaign: candidate.clone(),
            }
        } else {
            tracing::debug!(
                "Sending {} patch operations for campaign {} ({} bytes)",
                diff.operation_count(),
                campaign.id,
                diff.patch_size
            );
            SavePayload::Diff { diff }
        };

        Ok(Some(SavePlan {
            candidate,
            payload,
            base_revision: base.revision,
        }))
    }

    /// Write `payload`, retrying once with `fallback` as a snapshot when the
    /// server cannot apply a diff. Conflict replies are run through `detector`.
    async fn deliver(
        &self,
        campaign_id: &CampaignId,
        base_revision: u64,
        mut payload: SavePayload,
        fallback: Option<&Campaign>,
        detector: &mut ConflictDetector,
    ) -> Delivery {
        loop {
            match self.backend.write(campaign_id, base_revision, &payload).await {
                Ok(ack) => {
                    return Delivery::Acked {
                        new_revision: ack.new_revision,
                        payload,
                    }
                }
                Err(BackendError::Conflict { server_revision }) => {
                    return match detector.observe(base_revision, server_revision) {
                        ConflictState::Conflicted { .. } => Delivery::Conflict { server_revision },
                        ConflictState::Clean => Delivery::Rejected(BackendError::InvalidPayload(
                            format!("conflict reported at base revision {base_revision}"),
                        )),
                    };
                }
                Err(BackendError::Network(error)) => {
                    return Delivery::Unreachable { error, payload }
                }
                Err(error) => match (&payload, fallback) {
                    (SavePayload::Diff { .. }, Some(campaign)) => {
                        tracing::debug!(
                            "Server could not apply diff for campaign {}: {}; retrying with a snapshot",
                            campaign_id,
                            error
                        );
                        payload = SavePayload::Snapshot {
                            campaign: campaign.clone(),
                        };
                    }
                    _ => return Delivery::Rejected(error),
                },
            }
        }
    }

    async fn enqueue(
        &self,
        campaign_id: &CampaignId,
        payload: &SavePayload,
        base_revision: u64,
        reason: QueueReason,
    ) -> Result<SaveOutcome> {
        let (entry, pending) = {
            let db = self.db.lock().await;
            let queue = self.queue_repo(&db);
            let superseded = queue.discard_pending(campaign_id).await?;
            if superseded > 0 {
                tracing::debug!(
                    "Superseded {} queued save(s) of campaign {}",
                    superseded,
                    campaign_id
                );
            }
            let entry = queue.add_to_queue(campaign_id, payload, base_revision).await?;
            (entry, queue.pending_count().await?)
        };

        self.publish(SaveState::Queued {
            campaign_id: campaign_id.clone(),
            pending,
        });
        Ok(SaveOutcome::Queued {
            entry_id: entry.id,
            reason,
        })
    }

    /// Record a server acknowledgement of `acknowledged` at `new_revision`.
    async fn acknowledge(
        &self,
        campaign_id: &CampaignId,
        acknowledged: Option<Campaign>,
        new_revision: u64,
        settle: Settle<'_>,
    ) -> Result<()> {
        let db = self.db.lock().await;
        let bases = LibSqlBaseRepository::new(db.connection());
        let drafts = LibSqlDraftRepository::new(db.connection());
        let queue = self.queue_repo(&db);

        match settle {
            Settle::Live => {
                queue.discard_pending(campaign_id).await?;
            }
            Settle::Entry(id) => queue.remove(id).await?,
            Settle::Overwrite => {
                queue.discard_campaign(campaign_id).await?;
            }
        }

        if let Some(mut campaign) = acknowledged {
            campaign.revision = new_revision;
            bases.store_base(&campaign).await?;

            if let Some(draft) = drafts.load_draft(campaign_id).await? {
                let mut drafted = draft.campaign;
                drafted.revision = new_revision;
                if drafted == campaign {
                    drafts.delete_draft(campaign_id).await?;
                }
            }
        } else {
            // Unknown acknowledged content: the next save sends a snapshot.
            bases.delete_base(campaign_id).await?;
        }
        drop(db);

        self.publish(SaveState::Saved {
            campaign_id: campaign_id.clone(),
            revision: new_revision,
        });
        Ok(())
    }

    async fn record_conflict(
        &self,
        campaign_id: &CampaignId,
        local_revision: u64,
        server_revision: u64,
    ) -> Result<SaveConflict> {
        let conflict = {
            let db = self.db.lock().await;
            LibSqlConflictRepository::new(db.connection())
                .record_conflict(campaign_id, local_revision, server_revision)
                .await?
        };
        tracing::info!(
            "Campaign {} conflicted: edit based on revision {}, server at {}",
            campaign_id,
            local_revision,
            server_revision
        );
        self.publish_conflicted(campaign_id, local_revision, server_revision);
        Ok(conflict)
    }

    fn publish_conflicted(&self, campaign_id: &CampaignId, local_revision: u64, server_revision: u64) {
        self.publish(SaveState::Conflicted {
            campaign_id: campaign_id.clone(),
            local_revision,
            server_revision,
        });
    }

    /// Replay due queue entries FIFO.
    pub async fn drain_queue(&self) -> Result<DrainReport> {
        self.drain(true).await
    }

    /// Replay every pending entry now, ignoring backoff
    pub async fn flush_queue(&self) -> Result<DrainReport> {
        self.drain(false).await
    }

    async fn drain(&self, respect_backoff: bool) -> Result<DrainReport> {
        let mut report = DrainReport::default();
        if !self.connectivity.is_online() {
            report.skipped_offline = true;
            report.remaining = self.pending_count().await?;
            return Ok(report);
        }

        let entries = {
            let db = self.db.lock().await;
            self.queue_repo(&db).get_queue().await?
        };

        let now = now_millis();
        let mut stalled: HashSet<CampaignId> = HashSet::new();
        for entry in entries {
            if stalled.contains(&entry.campaign_id) {
                continue;
            }
            if respect_backoff && !entry.is_due(now) {
                report.deferred += 1;
                stalled.insert(entry.campaign_id.clone());
                continue;
            }

            match self.drain_entry(&entry).await? {
                EntryOutcome::Flushed => {
                    report.flushed += 1;
                    continue;
                }
                EntryOutcome::Gone => continue,
                EntryOutcome::Retrying => report.retried += 1,
                EntryOutcome::DeadLettered => report.dead_lettered += 1,
                EntryOutcome::Conflicted => report.conflicts += 1,
                EntryOutcome::Blocked => report.blocked += 1,
            }
            stalled.insert(entry.campaign_id.clone());
        }

        report.remaining = self.pending_count().await?;
        if report.flushed > 0 || report.dead_lettered > 0 || report.conflicts > 0 {
            tracing::info!(
                "Drained save queue: {} flushed, {} retrying, {} dead-lettered, {} conflicted, {} remaining",
                report.flushed,
                report.retried,
                report.dead_lettered,
                report.conflicts,
                report.remaining
            );
        }
        Ok(report)
    }

    async fn drain_entry(&self, queued: &QueuedSave) -> Result<EntryOutcome> {
        let _guard = self.locks.acquire(&queued.campaign_id).await;
        self.drain_entry_locked(queued)
            .await
            .inspect_err(|error| self.publish_failure(&queued.campaign_id, error))
    }

    async fn drain_entry_locked(&self, queued: &QueuedSave) -> Result<EntryOutcome> {
        let (entry, base, mut detector) = {
            let db = self.db.lock().await;
            // A live save may have superseded or flushed the entry meanwhile.
            let entry = self.queue_repo(&db).get(&queued.id).await?;
            let base = LibSqlBaseRepository::new(db.connection())
                .load_base(&queued.campaign_id)
                .await?;
            let conflict = LibSqlConflictRepository::new(db.connection())
                .open_conflict(&queued.campaign_id)
                .await?;
            (entry, base, restore_detector(conflict.as_ref()))
        };

        let Some(entry) = entry.filter(|entry| entry.state == QueueEntryState::Pending) else {
            return Ok(EntryOutcome::Gone);
        };
        if !detector.allows_write() {
            return Ok(EntryOutcome::Blocked);
        }

        let acknowledged = match &entry.payload {
            SavePayload::Snapshot { campaign } => Some(campaign.clone()),
            SavePayload::Diff { diff } => base
                .filter(|base| base.revision == entry.base_revision)
                .and_then(|base| apply_diff(&base, diff)),
        };

        let delivery = self
            .deliver(
                &entry.campaign_id,
                entry.base_revision,
                entry.payload.clone(),
                acknowledged.as_ref(),
                &mut detector,
            )
            .await;

        match delivery {
            Delivery::Acked { new_revision, .. } => {
                self.acknowledge(
                    &entry.campaign_id,
                    acknowledged,
                    new_revision,
                    Settle::Entry(&entry.id),
                )
                .await?;
                Ok(EntryOutcome::Flushed)
            }
            Delivery::Conflict { server_revision } => {
                self.record_conflict(&entry.campaign_id, entry.base_revision, server_revision)
                    .await?;
                Ok(EntryOutcome::Conflicted)
            }
            Delivery::Unreachable { error, .. } => self.record_retry(&entry, &error).await,
            Delivery::Rejected(error) => {
                self.dead_letter(&entry, &error.to_string()).await?;
                Ok(EntryOutcome::DeadLettered)
            }
        }
    }

    async fn record_retry(&self, entry: &QueuedSave, error: &str) -> Result<EntryOutcome> {
        let delay = self.config.retry.delay(entry.retries);
        let next_attempt_at =
            now_millis().saturating_add(i64::try_from(delay.as_millis()).unwrap_or(i64::MAX));

        let retries = {
            let db = self.db.lock().await;
            self.queue_repo(&db)
                .record_failure(&entry.id, error, next_attempt_at)
                .await?
        };

        if self.config.retry.is_exhausted(retries) {
            self.dead_letter(entry, error).await?;
            return Ok(EntryOutcome::DeadLettered);
        }

        tracing::warn!(
            "Queued save {} of campaign {} failed (attempt {}/{}): {}; retrying in {}s",
            entry.id,
            entry.campaign_id,
            retries,
            self.config.retry.max_retries,
            error,
            delay.as_secs()
        );
        Ok(EntryOutcome::Retrying)
    }

    async fn dead_letter(&self, entry: &QueuedSave, error: &str) -> Result<()> {
        {
            let db = self.db.lock().await;
            self.queue_repo(&db).mark_failed(&entry.id, error).await?;
        }
        tracing::info!(
            "Queued save {} of campaign {} moved to failed: {}",
            entry.id,
            entry.campaign_id,
            error
        );
        self.publish(SaveState::Failed {
            campaign_id: entry.campaign_id.clone(),
            error: error.to_string(),
        });
        Ok(())
    }

    /// Settle the open conflict of `campaign_id`.
    ///
    /// `local` is the campaign to write on `ForceOverwrite`; the stored draft
    /// is used when it is `None`.
    pub async fn resolve_conflict(
        &self,
        campaign_id: &CampaignId,
        resolution: ConflictResolution,
        local: Option<&Campaign>,
    ) -> Result<ResolutionOutcome> {
        let _guard = self.locks.acquire(campaign_id).await;
        self.resolve_locked(campaign_id, resolution, local)
            .await
            .inspect_err(|error| self.publish_failure(campaign_id, error))
    }

    async fn resolve_locked(
        &self,
        campaign_id: &CampaignId,
        resolution: ConflictResolution,
        local: Option<&Campaign>,
    ) -> Result<ResolutionOutcome> {
        let open = {
            let db = self.db.lock().await;
            LibSqlConflictRepository::new(db.connection())
                .open_conflict(campaign_id)
                .await?
        };
        let mut detector = restore_detector(open.as_ref());
        let ConflictState::Conflicted {
            local_revision,
            server_revision,
        } = detector.state()
        else {
            return Ok(ResolutionOutcome::NothingToResolve);
        };

        let outcome = match detector.resolve(resolution) {
            ResolutionStep::NothingToResolve => return Ok(ResolutionOutcome::NothingToResolve),
            ResolutionStep::Stay => {
                self.publish_conflicted(campaign_id, local_revision, server_revision);
                ResolutionOutcome::StillConflicted {
                    local_revision,
                    server_revision,
                }
            }
            ResolutionStep::Reload => self.reload(campaign_id, local_revision).await?,
            ResolutionStep::Overwrite { server_revision } => {
                self.overwrite(campaign_id, server_revision, local, &mut detector)
                    .await?
            }
        };

        if !detector.is_conflicted() {
            let db = self.db.lock().await;
            LibSqlConflictRepository::new(db.connection())
                .resolve_open(campaign_id, resolution)
                .await?;
        }
        Ok(outcome)
    }

    async fn reload(
        &self,
        campaign_id: &CampaignId,
        local_revision: u64,
    ) -> Result<ResolutionOutcome> {
        let remote = self
            .backend
            .read(campaign_id)
            .await
            .map_err(|error| error.into_error(campaign_id, local_revision))?;
        let mut campaign = remote.campaign;
        campaign.revision = remote.revision;

        {
            let db = self.db.lock().await;
            LibSqlBaseRepository::new(db.connection())
                .store_base(&campaign)
                .await?;
            let discarded = self.queue_repo(&db).discard_campaign(campaign_id).await?;
            LibSqlDraftRepository::new(db.connection())
                .delete_draft(campaign_id)
                .await?;
            tracing::info!(
                "Reloaded campaign {} at revision {}, discarded {} queued save(s)",
                campaign_id,
                campaign.revision,
                discarded
            );
        }

        self.publish(SaveState::Saved {
            campaign_id: campaign_id.clone(),
            revision: campaign.revision,
        });
        Ok(ResolutionOutcome::Reloaded { campaign })
    }

    async fn overwrite(
        &self,
        campaign_id: &CampaignId,
        conflict_revision: u64,
        local: Option<&Campaign>,
        detector: &mut ConflictDetector,
    ) -> Result<ResolutionOutcome> {
        let local = match local {
            Some(campaign) => campaign.clone(),
            None => self
                .draft(campaign_id)
                .await?
                .map(|draft| draft.campaign)
                .ok_or_else(|| {
                    Error::InvalidInput(format!(
                        "no local copy of campaign {campaign_id} to overwrite with"
                    ))
                })?,
        };
        if local.id != *campaign_id {
            return Err(Error::InvalidInput(format!(
                "campaign {} cannot overwrite campaign {campaign_id}",
                local.id
            )));
        }

        // The server may have moved again since the conflict was recorded.
        let server_revision = match self.backend.read(campaign_id).await {
            Ok(remote) => remote.revision,
            Err(BackendError::NotFound(_)) => conflict_revision,
            Err(error) => return Err(error.into_error(campaign_id, conflict_revision)),
        };

        let mut candidate = local;
        candidate.revision = server_revision;
        let payload = SavePayload::Snapshot {
            campaign: candidate.clone(),
        };

        match self
            .deliver(campaign_id, server_revision, payload, None, detector)
            .await
        {
            Delivery::Acked { new_revision, .. } => {
                self.acknowledge(campaign_id, Some(candidate), new_revision, Settle::Overwrite)
                    .await?;
                detector.mark_clean();
                tracing::info!(
                    "Overwrote campaign {} on the server at revision {}",
                    campaign_id,
                    new_revision
                );
                Ok(ResolutionOutcome::Overwritten {
                    revision: new_revision,
                })
            }
            Delivery::Conflict {
                server_revision: latest,
            } => {
                self.record_conflict(campaign_id, server_revision, latest)
                    .await?;
                Err(Error::Conflict {
                    campaign_id: campaign_id.to_string(),
                    local_revision: server_revision,
                    server_revision: latest,
                })
            }
            Delivery::Unreachable { error, .. } => Err(Error::Network(error)),
            Delivery::Rejected(error) => Err(error.into_error(campaign_id, server_revision)),
        }
    }

    /// Fetch the server campaign and make it the diff base.
    pub async fn pull(&self, campaign_id: &CampaignId) -> Result<Campaign> {
        let _guard = self.locks.acquire(campaign_id).await;

        let remote = self
            .backend
            .read(campaign_id)
            .await
            .map_err(|error| error.into_error(campaign_id, 0))?;
        let mut campaign = remote.campaign;
        campaign.revision = remote.revision;

        let db = self.db.lock().await;
        LibSqlBaseRepository::new(db.connection())
            .store_base(&campaign)
            .await?;
        tracing::info!("Pulled campaign {} at revision {}", campaign_id, campaign.revision);
        Ok(campaign)
    }

    pub async fn conflict_state(&self, campaign_id: &CampaignId) -> Result<ConflictState> {
        let db = self.db.lock().await;
        let open = LibSqlConflictRepository::new(db.connection())
            .open_conflict(campaign_id)
            .await?;
        Ok(restore_detector(open.as_ref()).state())
    }

    /// Recently detected conflicts, newest first
    pub async fn conflicts(&self, limit: usize) -> Result<Vec<SaveConflict>> {
        let db = self.db.lock().await;
        LibSqlConflictRepository::new(db.connection())
            .list_conflicts(limit)
            .await
    }

    /// Last server state acknowledged for a campaign
    pub async fn base(&self, campaign_id: &CampaignId) -> Result<Option<Campaign>> {
        let db = self.db.lock().await;
        LibSqlBaseRepository::new(db.connection())
            .load_base(campaign_id)
            .await
    }

    pub async fn pending_saves(&self) -> Result<Vec<QueuedSave>> {
        let db = self.db.lock().await;
        self.queue_repo(&db).get_queue().await
    }

    pub async fn pending_count(&self) -> Result<u64> {
        let db = self.db.lock().await;
        self.queue_repo(&db).pending_count().await
    }

    /// Dead-lettered saves
    pub async fn failed_saves(&self) -> Result<Vec<QueuedSave>> {
        let db = self.db.lock().await;
        self.queue_repo(&db).failed_entries().await
    }

    /// Put a dead-lettered save back in the queue.
    ///
    /// Refused while a newer save of the same campaign is pending, since
    /// both would be based on the same revision.
    pub async fn retry_failed(&self, id: &QueuedSaveId) -> Result<()> {
        let db = self.db.lock().await;
        let queue = self.queue_repo(&db);
        let entry = queue
            .get(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("queued save {id}")))?;

        let superseded = queue
            .get_queue()
            .await?
            .iter()
            .any(|pending| pending.campaign_id == entry.campaign_id);
        if superseded {
            return Err(Error::InvalidInput(format!(
                "campaign {} has a newer pending save; discard {id} instead",
                entry.campaign_id
            )));
        }

        queue.requeue(id).await?;
        tracing::info!("Requeued failed save {} of campaign {}", id, entry.campaign_id);
        Ok(())
    }

    /// Drop a queued or dead-lettered save
    pub async fn discard_save(&self, id: &QueuedSaveId) -> Result<()> {
        let db = self.db.lock().await;
        self.queue_repo(&db).remove(id).await
    }

    pub async fn draft(&self, campaign_id: &CampaignId) -> Result<Option<CampaignDraft>> {
        let db = self.db.lock().await;
        LibSqlDraftRepository::new(db.connection())
            .load_draft(campaign_id)
            .await
    }

    pub async fn clear_draft(&self, campaign_id: &CampaignId) -> Result<bool> {
        let db = self.db.lock().await;
        LibSqlDraftRepository::new(db.connection())
            .delete_draft(campaign_id)
            .await
    }

    pub async fn create_backup(&self, campaign: &Campaign, name: &str) -> Result<CampaignBackup> {
        let db = self.db.lock().await;
        LibSqlBackupRepository::new(db.connection())
            .create_backup(campaign, name)
            .await
    }

    pub async fn list_backups(&self, campaign_id: &CampaignId) -> Result<Vec<CampaignBackup>> {
        let db = self.db.lock().await;
        LibSqlBackupRepository::new(db.connection())
            .list_backups(campaign_id)
            .await
    }

    /// Campaign stored in a backup; saving it is up to the caller
    pub async fn restore_backup(&self, id: &BackupId) -> Result<Campaign> {
        let db = self.db.lock().await;
        LibSqlBackupRepository::new(db.connection())
            .get_backup(id)
            .await?
            .map(|backup| backup.campaign)
            .ok_or_else(|| Error::NotFound(format!("backup {id}")))
    }

    pub async fn delete_backup(&self, id: &BackupId) -> Result<()> {
        let db = self.db.lock().await;
        LibSqlBackupRepository::new(db.connection())
            .delete_backup(id)
            .await
    }
}

/// Detector for a campaign, conflicted while its log has an open entry
fn restore_detector(open: Option<&SaveConflict>) -> ConflictDetector {
    open.map_or_else(ConflictDetector::new, |conflict| {
        ConflictDetector::conflicted(conflict.local_revision, conflict.server_revision)
    })
}
