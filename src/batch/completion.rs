//! Worker completion handling: bookkeeping, chaining, fail-fast and
//! completion detection.

use super::BatchRunner;
use crate::artifacts;
use crate::pool::Completion;
use crate::types::{BatchState, Event, ItemOutcome, PauseReason, WorkItem};

impl BatchRunner {
    /// Apply one worker result; runs on the control task
    pub(crate) async fn handle_completion(&self, completion: Completion) {
        let id = completion.id;

        let Some(outcome) = completion.outcome() else {
            if self.store.release_claim(id, completion.dispatch).await {
                tracing::debug!(item_id = %id, "aborted submission returned to pending");
                self.emit_event(Event::ItemRequeued { id });
            }
            self.dispatch_tick().await;
            return;
        };

        let Some(item) = self
            .store
            .finish(id, completion.dispatch, &outcome)
            .await
        else {
            tracing::debug!(
                item_id = %id,
                dispatch = completion.dispatch,
                "ignoring stale completion"
            );
            return;
        };

        self.tracker
            .record(id, item.status, Some(completion.duration));

        let config = self.config.read().await.clone();
        let delay = config.inter_submission_delay;

        match &outcome {
            ItemOutcome::Success { artifact, duration } => {
                tracing::info!(
                    item_id = %id,
                    duration_ms = duration.as_millis() as u64,
                    "item completed"
                );
                self.emit_event(Event::ItemCompleted {
                    id,
                    artifact: artifact.clone(),
                    duration: *duration,
                });
                self.emit_event(Event::Progress(self.tracker.summary()));

                if config.artifacts.auto_download {
                    self.spawn_download(item.clone(), config.artifacts.download_folder.clone());
                }

                if config.sequential_mode && config.chain_frames && self.collaborators.deriver.is_some()
                {
                    self.spawn_chaining(item, artifact.clone(), delay);
                } else {
                    self.close_gate_for(delay);
                    self.dispatch_tick().await;
                }
            }
            ItemOutcome::Failure { error, .. } => {
                tracing::warn!(item_id = %id, error = %error, "item failed");
                self.emit_event(Event::ItemFailed {
                    id,
                    error: error.clone(),
                });
                self.emit_event(Event::Progress(self.tracker.summary()));

                if config.sequential_mode {
                    self.pause_for(PauseReason::SequenceFailure {
                        id,
                        error: error.clone(),
                    });
                } else {
                    self.close_gate_for(delay);
                    self.dispatch_tick().await;
                }
            }
        }

        self.check_finished().await;
    }

    /// Derive the next reference off the control task; dispatch stays held
    /// until it is done
    fn spawn_chaining(&self, item: WorkItem, artifact: String, delay: std::time::Duration) {
        let Some(deriver) = self.collaborators.deriver.clone() else {
            return;
        };
        self.hold_gate();

        let runner = self.clone();
        tokio::spawn(async move {
            match deriver.derive(&item, &artifact).await {
                Ok(reference) => {
                    tracing::info!(item_id = %item.id, reference = %reference, "chained reference updated");
                    runner.run_state().chained_reference = Some(reference.clone());
                    runner.emit_event(Event::ChainReferenceUpdated {
                        source: item.id,
                        reference,
                    });
                }
                Err(e) => {
                    tracing::warn!(item_id = %item.id, error = %e, "reference derivation failed, keeping previous reference");
                }
            }
            runner.release_gate(delay);
            runner.nudge();
        });
    }

    fn spawn_download(&self, item: WorkItem, folder: std::path::PathBuf) {
        let runner = self.clone();
        tokio::spawn(async move {
            let position = runner.store.position(item.id).await.unwrap_or(0);
            match artifacts::download_item(&item, position, &folder).await {
                Ok(path) => runner.emit_event(Event::ArtifactSaved { id: item.id, path }),
                Err(e) => {
                    tracing::warn!(item_id = %item.id, error = %e, "automatic download failed");
                }
            }
        });
    }

    /// Move a running batch to `Completed` once nothing is pending or in flight
    pub(crate) async fn check_finished(&self) {
        if self.state() != BatchState::Running {
            return;
        }
        let counts = self.store.counts().await;
        if !counts.is_drained() || self.pool.outstanding() > 0 {
            return;
        }

        {
            let mut run = self.run_state();
            if run.batch != BatchState::Running {
                return;
            }
            run.batch = BatchState::Completed;
        }
        let summary = self.tracker.summary();
        tracing::info!(
            completed = summary.completed,
            failed = summary.failed,
            "batch completed"
        );
        self.emit_event(Event::BatchCompleted { summary });
    }
}
