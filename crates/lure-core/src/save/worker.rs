//! Background tasks driving the save pipeline

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::{SaveOutcome, SaveService};
use crate::backend::CampaignBackend;
use crate::editor::{EditorAction, EditorStore};
use crate::models::Campaign;

/// Drains the save queue on reconnect and on a timer
pub struct DrainWorker {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl DrainWorker {
    pub fn spawn<B: CampaignBackend + 'static>(service: SaveService<B>) -> Self {
        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let mut online = service.connectivity().subscribe();
        let interval = service.config().drain_interval();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                let reconnected = tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    changed = online.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        *online.borrow_and_update()
                    }
                    _ = ticker.tick() => false,
                };

                if !service.connectivity().is_online() {
                    continue;
                }
                // Failures while offline say nothing about the next attempt.
                let result = if reconnected {
                    tracing::debug!("Reconnected; flushing save queue");
                    service.flush_queue().await
                } else {
                    service.drain_queue().await
                };
                if let Err(error) = result {
                    tracing::warn!("Save queue drain failed: {}", error);
                }
            }
            tracing::debug!("Drain worker stopped");
        });

        Self { shutdown, handle }
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.handle.await;
    }
}

/// Saves the editor's campaign once edits settle
pub struct Autosave {
    handle: JoinHandle<()>,
}

impl Autosave {
    pub fn spawn<B: CampaignBackend + 'static>(service: SaveService<B>, store: EditorStore) -> Self {
        let debounce = service.config().autosave_debounce();
        let mut rx = store.subscribe();

        let handle = tokio::spawn(async move {
            let mut edited = false;
            loop {
                if !edited && rx.changed().await.is_err() {
                    return;
                }
                // Restart the timer on every further edit.
                loop {
                    tokio::select! {
                        changed = rx.changed() => {
                            if changed.is_err() {
                                return;
                            }
                        }
                        () = tokio::time::sleep(debounce) => break,
                    }
                }

                edited = false;
                let Some(campaign) = rx.borrow_and_update().clone() else {
                    continue;
                };

                match service.save(&campaign).await {
                    Ok(SaveOutcome::Saved { revision, .. }) => {
                        let still_open = store
                            .current()
                            .is_some_and(|current| current.id == campaign.id);
                        if still_open {
                            store.dispatch(EditorAction::Acknowledge { revision });
                        }
                        // Only edits made during the save start another round.
                        edited = edited_since(rx.borrow_and_update().as_ref(), &campaign);
                    }
                    Ok(outcome) => {
                        tracing::debug!("Autosave of campaign {}: {:?}", campaign.id, outcome);
                    }
                    Err(error) => {
                        tracing::warn!("Autosave of campaign {} failed: {}", campaign.id, error);
                    }
                }
            }
        });

        Self { handle }
    }

    pub fn stop(&self) {
        self.handle.abort();
    }
}

/// Whether `current` differs from `saved` in anything but the revision
fn edited_since(current: Option<&Campaign>, saved: &Campaign) -> bool {
    current.is_some_and(|current| {
        let mut current = current.clone();
        current.revision = saved.revision;
        current != *saved
    })
}

impl Drop for Autosave {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
