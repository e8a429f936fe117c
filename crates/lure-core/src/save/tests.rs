use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::json;

use super::*;
use crate::backend::{BackendResult, InMemoryBackend, RemoteCampaign, WriteAck};
use crate::editor::{EditorAction, EditorStore};
use crate::models::CampaignType;

fn campaign(name: &str) -> Campaign {
    let mut campaign = Campaign::new(name, CampaignType::Wheel);
    campaign.id = "c1".parse().unwrap();
    campaign
}

fn renamed(campaign: &Campaign, name: &str) -> Campaign {
    let mut renamed = campaign.clone();
    renamed.name = name.to_string();
    renamed
}

async fn service(backend: &Arc<InMemoryBackend>, online: bool) -> SaveService<InMemoryBackend> {
    SaveService::open_in_memory(Arc::clone(backend), Connectivity::new(online))
        .await
        .unwrap()
}

async fn service_with(
    backend: &Arc<InMemoryBackend>,
    online: bool,
    config: SaveConfig,
) -> SaveService<InMemoryBackend> {
    let db = Database::open_in_memory().await.unwrap();
    SaveService::new(db, Arc::clone(backend), Connectivity::new(online), config)
}

async fn drop_table<B: CampaignBackend>(service: &SaveService<B>, table: &str) {
    let db = service.db.lock().await;
    db.connection()
        .execute(&format!("DROP TABLE {table}"), ())
        .await
        .unwrap();
}

/// Answers every write with a conflict at a fixed server revision
struct ConflictingBackend {
    server_revision: u64,
}

#[async_trait::async_trait]
impl CampaignBackend for ConflictingBackend {
    async fn write(
        &self,
        _campaign_id: &CampaignId,
        _base_revision: u64,
        _payload: &SavePayload,
    ) -> BackendResult<WriteAck> {
        Err(BackendError::Conflict {
            server_revision: self.server_revision,
        })
    }

    async fn read(&self, campaign_id: &CampaignId) -> BackendResult<RemoteCampaign> {
        Err(BackendError::NotFound(campaign_id.to_string()))
    }
}

async fn wait_until<F, Fut>(mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition().await {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met in time"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn first_save_sends_snapshot() {
    let backend = Arc::new(InMemoryBackend::new());
    let service = service(&backend, true).await;
    let local = campaign("Old");

    let outcome = service.save(&local).await.unwrap();
    assert_eq!(
        outcome,
        SaveOutcome::Saved {
            revision: 1,
            sent_diff: false
        }
    );

    assert_eq!(backend.campaign(&local.id).unwrap().name, "Old");
    assert_eq!(service.base(&local.id).await.unwrap().unwrap().revision, 1);
    assert!(service.draft(&local.id).await.unwrap().is_none());
    assert_eq!(
        service.state(),
        SaveState::Saved {
            campaign_id: local.id.clone(),
            revision: 1
        }
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn unchanged_campaign_skips_the_network() {
    let backend = Arc::new(InMemoryBackend::new());
    let service = service(&backend, true).await;
    let local = campaign("Old");

    service.save(&local).await.unwrap();
    // The editor never learned the new revision; content is what counts.
    assert_eq!(service.save(&local).await.unwrap(), SaveOutcome::NoChanges);
    assert_eq!(backend.write_count(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn rename_is_sent_as_diff() {
    let backend = Arc::new(InMemoryBackend::new());
    let service = service(&backend, true).await;
    let old = campaign("Old");
    service.save(&old).await.unwrap();

    let new = renamed(&old, "New");
    let plan = service
        .plan(&new, service.base(&old.id).await.unwrap().as_ref())
        .unwrap()
        .unwrap();
    let SavePayload::Diff { diff } = &plan.payload else {
        panic!("expected a diff payload");
    };
    assert_eq!(
        serde_json::to_value(&diff.patch).unwrap(),
        json!([{"op": "replace", "path": "/name", "value": "New"}])
    );
    assert_eq!(diff.base_revision, 1);
    assert_eq!(diff.target_revision, 2);

    assert_eq!(
        service.save(&new).await.unwrap(),
        SaveOutcome::Saved {
            revision: 2,
            sent_diff: true
        }
    );
    let stored = backend.campaign(&old.id).unwrap();
    assert_eq!(stored.name, "New");
    assert_eq!(stored.revision, 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn every_tenth_revision_is_a_snapshot_and_revisions_increase() {
    let backend = Arc::new(InMemoryBackend::new());
    let service = service(&backend, true).await;
    let local = campaign("v0");

    let mut last_revision = 0;
    for i in 1..=10_u64 {
        let outcome = service.save(&renamed(&local, &format!("v{i}"))).await.unwrap();
        let SaveOutcome::Saved {
            revision,
            sent_diff,
        } = outcome
        else {
            panic!("unexpected outcome {outcome:?}");
        };
        assert!(revision > last_revision);
        last_revision = revision;
        assert_eq!(revision, i);
        assert_eq!(sent_diff, i != 1 && i != 10, "revision {i}");
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_commit_is_a_conflict_and_blocks_writes() {
    let backend = Arc::new(InMemoryBackend::new());
    let service = service(&backend, true).await;
    let local = campaign("Old");
    service.save(&local).await.unwrap();

    backend.commit_external(&renamed(&local, "Theirs"));

    let outcome = service.save(&renamed(&local, "Mine")).await.unwrap();
    assert_eq!(
        outcome,
        SaveOutcome::Conflicted {
            local_revision: 1,
            server_revision: 2
        }
    );
    assert_eq!(
        service.conflict_state(&local.id).await.unwrap(),
        ConflictState::Conflicted {
            local_revision: 1,
            server_revision: 2
        }
    );
    assert!(service.state().needs_attention());

    let blocked = service.save(&renamed(&local, "Mine again")).await.unwrap();
    assert!(matches!(blocked, SaveOutcome::Conflicted { .. }));
    assert_eq!(backend.write_count(), 1);
    assert_eq!(backend.campaign(&local.id).unwrap().name, "Theirs");
    assert_eq!(
        service.draft(&local.id).await.unwrap().unwrap().campaign.name,
        "Mine again"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn conflict_reply_at_the_base_revision_is_rejected() {
    let backend = Arc::new(ConflictingBackend { server_revision: 0 });
    let service = SaveService::open_in_memory(Arc::clone(&backend), Connectivity::new(true))
        .await
        .unwrap();
    let local = campaign("Old");

    assert!(matches!(
        service.save(&local).await,
        Err(Error::InvalidInput(_))
    ));
    assert_eq!(
        service.conflict_state(&local.id).await.unwrap(),
        ConflictState::Clean
    );
    assert!(service.conflicts(10).await.unwrap().is_empty());
    assert!(matches!(service.state(), SaveState::Failed { .. }));
}

#[tokio::test(flavor = "multi_thread")]
async fn reload_discards_local_edits() {
    let backend = Arc::new(InMemoryBackend::new());
    let service = service(&backend, true).await;
    let local = campaign("Old");
    service.save(&local).await.unwrap();
    backend.commit_external(&renamed(&local, "Theirs"));
    service.save(&renamed(&local, "Mine")).await.unwrap();

    let outcome = service
        .resolve_conflict(&local.id, ConflictResolution::ReloadDiscardLocal, None)
        .await
        .unwrap();
    let ResolutionOutcome::Reloaded { campaign: reloaded } = outcome else {
        panic!("expected reload, got {outcome:?}");
    };
    assert_eq!(reloaded.name, "Theirs");
    assert_eq!(reloaded.revision, 2);
    assert_eq!(
        service.conflict_state(&local.id).await.unwrap(),
        ConflictState::Clean
    );
    assert!(service.draft(&local.id).await.unwrap().is_none());

    let next = service.save(&renamed(&reloaded, "Edited after reload")).await.unwrap();
    assert_eq!(
        next,
        SaveOutcome::Saved {
            revision: 3,
            sent_diff: true
        }
    );

    let history = service.conflicts(10).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(
        history[0].resolution,
        Some(ConflictResolution::ReloadDiscardLocal)
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn overwrite_replaces_server_copy() {
    let backend = Arc::new(InMemoryBackend::new());
    let service = service(&backend, true).await;
    let local = campaign("Old");
    service.save(&local).await.unwrap();
    backend.commit_external(&renamed(&local, "Theirs"));
    service.save(&renamed(&local, "Mine")).await.unwrap();

    // Without an explicit campaign the stored draft is written.
    let outcome = service
        .resolve_conflict(&local.id, ConflictResolution::ForceOverwrite, None)
        .await
        .unwrap();
    assert_eq!(outcome, ResolutionOutcome::Overwritten { revision: 3 });

    let stored = backend.campaign(&local.id).unwrap();
    assert_eq!(stored.name, "Mine");
    assert_eq!(stored.revision, 3);
    assert_eq!(
        service.conflict_state(&local.id).await.unwrap(),
        ConflictState::Clean
    );
    assert_eq!(service.base(&local.id).await.unwrap().unwrap().revision, 3);
}

#[tokio::test(flavor = "multi_thread")]
async fn cancel_stays_conflicted_without_writing() {
    let backend = Arc::new(InMemoryBackend::new());
    let service = service(&backend, true).await;
    let local = campaign("Old");
    service.save(&local).await.unwrap();
    backend.commit_external(&renamed(&local, "Theirs"));
    service.save(&renamed(&local, "Mine")).await.unwrap();

    let outcome = service
        .resolve_conflict(&local.id, ConflictResolution::Cancel, None)
        .await
        .unwrap();
    assert_eq!(
        outcome,
        ResolutionOutcome::StillConflicted {
            local_revision: 1,
            server_revision: 2
        }
    );
    assert_eq!(backend.write_count(), 1);
    assert!(matches!(
        service.conflict_state(&local.id).await.unwrap(),
        ConflictState::Conflicted { .. }
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn resolving_a_clean_campaign_does_nothing() {
    let backend = Arc::new(InMemoryBackend::new());
    let service = service(&backend, true).await;
    let outcome = service
        .resolve_conflict(
            &"c1".parse().unwrap(),
            ConflictResolution::ForceOverwrite,
            None,
        )
        .await
        .unwrap();
    assert_eq!(outcome, ResolutionOutcome::NothingToResolve);
}

#[tokio::test(flavor = "multi_thread")]
async fn offline_save_is_queued_and_flushed_once() {
    let backend = Arc::new(InMemoryBackend::new());
    let service = service(&backend, false).await;
    let local = campaign("Offline edit");

    let outcome = service.save(&local).await.unwrap();
    assert!(matches!(
        outcome,
        SaveOutcome::Queued {
            reason: QueueReason::Offline,
            ..
        }
    ));
    assert_eq!(service.pending_count().await.unwrap(), 1);
    assert_eq!(backend.write_count(), 0);
    assert!(service.draft(&local.id).await.unwrap().is_some());

    let skipped = service.drain_queue().await.unwrap();
    assert!(skipped.skipped_offline);
    assert_eq!(skipped.remaining, 1);

    service.connectivity().set_online(true);
    let report = service.drain_queue().await.unwrap();
    assert_eq!(report.flushed, 1);
    assert_eq!(report.remaining, 0);

    let again = service.drain_queue().await.unwrap();
    assert_eq!(again.flushed, 0);
    assert_eq!(backend.write_count(), 1);
    assert_eq!(backend.campaign(&local.id).unwrap().name, "Offline edit");
    assert!(service.draft(&local.id).await.unwrap().is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn offline_saves_of_one_campaign_coalesce() {
    let backend = Arc::new(InMemoryBackend::new());
    let service = service(&backend, true).await;
    let local = campaign("Old");
    service.save(&local).await.unwrap();

    service.connectivity().set_online(false);
    service.save(&renamed(&local, "Draft 1")).await.unwrap();
    service.save(&renamed(&local, "Draft 2")).await.unwrap();
    assert_eq!(service.pending_count().await.unwrap(), 1);
    assert!(service.pending_saves().await.unwrap()[0].is_diff());

    service.connectivity().set_online(true);
    let report = service.drain_queue().await.unwrap();
    assert_eq!(report.flushed, 1);
    assert_eq!(report.conflicts, 0);

    let stored = backend.campaign(&local.id).unwrap();
    assert_eq!(stored.name, "Draft 2");
    assert_eq!(stored.revision, 2);
    assert_eq!(service.base(&local.id).await.unwrap().unwrap().name, "Draft 2");
}

#[tokio::test(flavor = "multi_thread")]
async fn queue_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("lure.db");
    let backend = Arc::new(InMemoryBackend::new());
    let local = campaign("Persisted");

    {
        let db = Database::open(&path).await.unwrap();
        let service = SaveService::new(
            db,
            Arc::clone(&backend),
            Connectivity::new(false),
            SaveConfig::default(),
        );
        service.save(&local).await.unwrap();
    }

    let db = Database::open(&path).await.unwrap();
    let service = SaveService::new(
        db,
        Arc::clone(&backend),
        Connectivity::new(true),
        SaveConfig::default(),
    );
    assert_eq!(service.pending_count().await.unwrap(), 1);
    assert_eq!(service.drain_queue().await.unwrap().flushed, 1);
    assert_eq!(backend.campaign(&local.id).unwrap().name, "Persisted");
}

#[tokio::test(flavor = "multi_thread")]
async fn network_failure_queues_and_backs_off() {
    let backend = Arc::new(InMemoryBackend::new());
    let service = service(&backend, true).await;
    let local = campaign("Flaky");
    backend.set_reachable(false);

    let outcome = service.save(&local).await.unwrap();
    assert!(matches!(
        outcome,
        SaveOutcome::Queued {
            reason: QueueReason::Unreachable(_),
            ..
        }
    ));

    let report = service.drain_queue().await.unwrap();
    assert_eq!(report.retried, 1);
    let entry = &service.pending_saves().await.unwrap()[0];
    assert_eq!(entry.retries, 1);
    assert!(entry.last_error.is_some());

    let report = service.drain_queue().await.unwrap();
    assert_eq!(report.deferred, 1);
    assert_eq!(report.retried, 0);

    backend.set_reachable(true);
    let report = service.flush_queue().await.unwrap();
    assert_eq!(report.flushed, 1);
    assert_eq!(backend.campaign(&local.id).unwrap().revision, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn exhausted_retries_become_dead_letters() {
    let backend = Arc::new(InMemoryBackend::new());
    let config = SaveConfig {
        retry: RetryPolicy {
            max_retries: 2,
            ..RetryPolicy::default()
        },
        ..SaveConfig::default()
    };
    let service = service_with(&backend, true, config).await;
    let local = campaign("Doomed");
    backend.set_reachable(false);
    service.save(&local).await.unwrap();

    assert_eq!(service.flush_queue().await.unwrap().retried, 1);
    let report = service.flush_queue().await.unwrap();
    assert_eq!(report.dead_lettered, 1);
    assert_eq!(report.remaining, 0);

    let failed = service.failed_saves().await.unwrap();
    assert_eq!(failed.len(), 1);
    assert!(matches!(service.state(), SaveState::Failed { .. }));

    service.retry_failed(&failed[0].id).await.unwrap();
    assert_eq!(service.pending_saves().await.unwrap()[0].retries, 0);

    backend.set_reachable(true);
    assert_eq!(service.flush_queue().await.unwrap().flushed, 1);
    assert!(service.failed_saves().await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn retry_refused_while_newer_save_is_pending() {
    let backend = Arc::new(InMemoryBackend::new());
    let config = SaveConfig {
        retry: RetryPolicy {
            max_retries: 1,
            ..RetryPolicy::default()
        },
        ..SaveConfig::default()
    };
    let service = service_with(&backend, true, config).await;
    let local = campaign("First");
    backend.set_reachable(false);
    service.save(&local).await.unwrap();
    service.flush_queue().await.unwrap();
    let failed = service.failed_saves().await.unwrap();
    assert_eq!(failed.len(), 1);

    service.save(&renamed(&local, "Second")).await.unwrap();
    assert!(matches!(
        service.retry_failed(&failed[0].id).await,
        Err(Error::InvalidInput(_))
    ));

    service.discard_save(&failed[0].id).await.unwrap();
    assert!(service.failed_saves().await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn queued_diff_conflicts_when_server_moved() {
    let backend = Arc::new(InMemoryBackend::new());
    let service = service(&backend, true).await;
    let local = campaign("Old");
    service.save(&local).await.unwrap();

    service.connectivity().set_online(false);
    service.save(&renamed(&local, "Mine")).await.unwrap();
    backend.commit_external(&renamed(&local, "Theirs"));

    service.connectivity().set_online(true);
    let report = service.drain_queue().await.unwrap();
    assert_eq!(report.conflicts, 1);
    assert_eq!(report.remaining, 1);
    assert_eq!(backend.campaign(&local.id).unwrap().name, "Theirs");

    let report = service.drain_queue().await.unwrap();
    assert_eq!(report.blocked, 1);

    service
        .resolve_conflict(&local.id, ConflictResolution::ReloadDiscardLocal, None)
        .await
        .unwrap();
    assert_eq!(service.pending_count().await.unwrap(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn unappliable_diff_falls_back_to_snapshot() {
    let backend = Arc::new(InMemoryBackend::new());
    let service = service(&backend, true).await;
    let mut local = campaign("Wheel");
    local.game_config = json!({"segments": 8});
    service.save(&local).await.unwrap();

    // Server content drifted without a revision bump.
    let mut drifted = local.clone();
    drifted.game_config = json!(null);
    drifted.revision = 1;
    backend.insert(drifted);

    let mut edited = local.clone();
    edited.game_config = json!({"segments": 12});
    assert_eq!(
        service.save(&edited).await.unwrap(),
        SaveOutcome::Saved {
            revision: 2,
            sent_diff: false
        }
    );
    assert_eq!(
        backend.campaign(&local.id).unwrap().game_config,
        json!({"segments": 12})
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn live_save_supersedes_queued_entries() {
    let backend = Arc::new(InMemoryBackend::new());
    let service = service(&backend, true).await;
    let local = campaign("Old");
    service.save(&local).await.unwrap();

    service.connectivity().set_online(false);
    service.save(&renamed(&local, "Queued")).await.unwrap();
    service.connectivity().set_online(true);

    let outcome = service.save(&renamed(&local, "Live")).await.unwrap();
    assert!(matches!(outcome, SaveOutcome::Saved { revision: 2, .. }));
    assert_eq!(service.pending_count().await.unwrap(), 0);
    assert_eq!(service.drain_queue().await.unwrap().conflicts, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_saves_of_one_campaign_are_serialized() {
    let backend = Arc::new(InMemoryBackend::new());
    let service = service(&backend, true).await;
    let local = campaign("Start");

    let tasks: Vec<_> = (0..5)
        .map(|i| {
            let service = service.clone();
            let edit = renamed(&local, &format!("Edit {i}"));
            tokio::spawn(async move { service.save(&edit).await.unwrap() })
        })
        .collect();

    for task in tasks {
        let outcome = task.await.unwrap();
        assert!(
            matches!(outcome, SaveOutcome::Saved { .. }),
            "unexpected outcome {outcome:?}"
        );
    }
    assert_eq!(backend.campaign(&local.id).unwrap().revision, 5);
    assert!(service.conflicts(10).await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn queued_payloads_are_compressed_only_when_large() {
    let backend = Arc::new(InMemoryBackend::new());
    let service = service(&backend, false).await;

    let small = campaign("Small");
    let mut large = Campaign::new("Large", CampaignType::Quiz);
    large.game_config = json!({
        "questions": (0..100)
            .map(|i| json!({"q": format!("Question {i}?"), "answers": ["yes", "no"]}))
            .collect::<Vec<_>>()
    });
    service.save(&small).await.unwrap();
    service.save(&large).await.unwrap();

    let flags: Vec<bool> = {
        let db = service.db.lock().await;
        let mut rows = db
            .connection()
            .query("SELECT payload FROM save_queue ORDER BY seq", ())
            .await
            .unwrap();
        let mut flags = Vec::new();
        while let Some(row) = rows.next().await.unwrap() {
            let raw: String = row.get(0).unwrap();
            let envelope: serde_json::Value = serde_json::from_str(&raw).unwrap();
            flags.push(envelope["compressed"].as_bool().unwrap());
        }
        flags
    };
    assert_eq!(flags, vec![false, true]);

    service.connectivity().set_online(true);
    assert_eq!(service.drain_queue().await.unwrap().flushed, 2);
    assert_eq!(
        backend.campaign(&large.id).unwrap().game_config,
        large.game_config
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn pull_resets_the_diff_base() {
    let backend = Arc::new(InMemoryBackend::new());
    let service = service(&backend, true).await;
    let mut remote = campaign("Remote");
    remote.revision = 4;
    backend.insert(remote.clone());

    let pulled = service.pull(&remote.id).await.unwrap();
    assert_eq!(pulled, remote);

    let outcome = service.save(&renamed(&pulled, "Local")).await.unwrap();
    assert_eq!(
        outcome,
        SaveOutcome::Saved {
            revision: 5,
            sent_diff: true
        }
    );

    assert!(matches!(
        service.pull(&"missing".parse().unwrap()).await,
        Err(Error::NotFound(_))
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn backups_restore_snapshots() {
    let backend = Arc::new(InMemoryBackend::new());
    let service = service(&backend, true).await;
    let local = campaign("Before launch");

    let backup = service.create_backup(&local, "pre-launch").await.unwrap();
    assert_eq!(service.list_backups(&local.id).await.unwrap().len(), 1);
    assert_eq!(service.restore_backup(&backup.id).await.unwrap(), local);

    service.delete_backup(&backup.id).await.unwrap();
    assert!(matches!(
        service.restore_backup(&backup.id).await,
        Err(Error::NotFound(_))
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn drain_worker_flushes_on_reconnect() {
    let backend = Arc::new(InMemoryBackend::new());
    let config = SaveConfig {
        drain_interval_secs: 3600,
        ..SaveConfig::default()
    };
    let service = service_with(&backend, false, config).await;
    service.save(&campaign("Queued")).await.unwrap();

    let worker = DrainWorker::spawn(service.clone());
    service.connectivity().set_online(true);

    wait_until(|| {
        let service = service.clone();
        async move { service.pending_count().await.unwrap() == 0 }
    })
    .await;
    worker.shutdown().await;
    assert_eq!(backend.write_count(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn autosave_saves_settled_edits_and_acknowledges() {
    let backend = Arc::new(InMemoryBackend::new());
    let config = SaveConfig {
        autosave_debounce_ms: 20,
        ..SaveConfig::default()
    };
    let service = service_with(&backend, true, config).await;
    let store = EditorStore::new();
    let _autosave = Autosave::spawn(service.clone(), store.clone());

    let local = campaign("Autosaved");
    store.dispatch(EditorAction::Load(local.clone()));
    wait_until(|| {
        let store = store.clone();
        async move { store.current().is_some_and(|campaign| campaign.revision == 1) }
    })
    .await;

    store.dispatch(EditorAction::Rename("Renamed".to_string()));
    wait_until(|| {
        let store = store.clone();
        async move { store.current().is_some_and(|campaign| campaign.revision == 2) }
    })
    .await;
    assert_eq!(backend.campaign(&local.id).unwrap().name, "Renamed");
}

#[tokio::test(flavor = "multi_thread")]
async fn state_changes_reach_subscribers() {
    let backend = Arc::new(InMemoryBackend::new());
    let service = service(&backend, false).await;
    let mut rx = service.subscribe();

    service.save(&campaign("Queued")).await.unwrap();
    rx.changed().await.unwrap();
    assert_eq!(rx.borrow_and_update().label(), "queued");
}

#[tokio::test(flavor = "multi_thread")]
async fn storage_failure_during_save_is_published() {
    let backend = Arc::new(InMemoryBackend::new());
    let service = service(&backend, false).await;
    let local = campaign("Old");
    drop_table(&service, "save_queue").await;

    assert!(matches!(service.save(&local).await, Err(Error::LibSql(_))));
    let SaveState::Failed { campaign_id, error } = service.state() else {
        panic!("expected failed state, got {:?}", service.state());
    };
    assert_eq!(campaign_id, local.id);
    assert!(error.contains("save_queue"));
}

#[tokio::test(flavor = "multi_thread")]
async fn storage_failure_during_drain_is_published() {
    let backend = Arc::new(InMemoryBackend::new());
    let service = service(&backend, false).await;
    let local = campaign("Queued");
    service.save(&local).await.unwrap();
    drop_table(&service, "campaign_bases").await;

    service.connectivity().set_online(true);
    assert!(service.drain_queue().await.is_err());
    assert!(matches!(
        service.state(),
        SaveState::Failed { campaign_id, .. } if campaign_id == local.id
    ));
    assert_eq!(backend.write_count(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn autosave_acknowledgement_does_not_save_again() {
    let backend = Arc::new(InMemoryBackend::new());
    let config = SaveConfig {
        autosave_debounce_ms: 20,
        ..SaveConfig::default()
    };
    let service = service_with(&backend, true, config).await;
    let mut states = service.subscribe();
    let store = EditorStore::new();
    let _autosave = Autosave::spawn(service.clone(), store.clone());

    store.dispatch(EditorAction::Load(campaign("Autosaved")));
    wait_until(|| {
        let store = store.clone();
        async move { store.current().is_some_and(|campaign| campaign.revision == 1) }
    })
    .await;
    states.borrow_and_update();

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!states.has_changed().unwrap());
    assert_eq!(backend.write_count(), 1);
}
