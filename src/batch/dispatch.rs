//! Dispatch ticks and the pacing gate.

use super::BatchRunner;
use crate::processor::{Job, ProcessSettings};
use crate::store::SequentialCandidate;
use crate::types::{BatchState, Event, ItemId, PauseReason};
use std::time::Duration;
use tokio::time::Instant;

/// Pacing gate as seen by one tick
enum Gate {
    Open,
    Until(Instant),
    Held,
}

impl BatchRunner {
    /// Dispatch as many pending items as capacity, pacing and mode allow
    ///
    /// Returns the number of items handed to the pool. Never blocks on I/O;
    /// a closed pacing gate schedules a wake-up instead of sleeping.
    pub(crate) async fn dispatch_tick(&self) -> usize {
        let _tick = self.tick_lock.lock().await;
        if self.state() != BatchState::Running {
            return 0;
        }
        if self.store.counts().await.pending == 0 {
            return 0;
        }

        let config = self.config.read().await.clone();
        let mut capacity = self
            .pool
            .capacity()
            .saturating_sub(self.pool.outstanding());
        if config.sequential_mode {
            capacity = capacity.min(1);
        }
        if capacity == 0 {
            return 0;
        }

        match self.gate() {
            Gate::Open => {}
            Gate::Until(at) => {
                self.schedule_wake(at);
                return 0;
            }
            Gate::Held => return 0,
        }

        let ids = if config.sequential_mode {
            match self.store.sequential_candidate().await {
                SequentialCandidate::Ready(id) => vec![id],
                SequentialCandidate::Nothing => return 0,
                SequentialCandidate::Waiting { on, next } => {
                    tracing::debug!(item_id = %next, waiting_on = %on, "sequential dispatch waiting");
                    return 0;
                }
                SequentialCandidate::Blocked { failed, next } => {
                    self.block_sequence(failed, next).await;
                    return 0;
                }
            }
        } else {
            self.store.pending_ids(capacity).await
        };

        let settings = ProcessSettings::from_config(&config);
        let chained = self.run_state().chained_reference.clone();
        let delay = config.inter_submission_delay;
        let mut submitted = 0usize;

        for id in ids {
            // Another tick or a removal may have raced us
            let Some(item) = self.store.claim(id).await else {
                continue;
            };
            let dispatch = item.dispatch_count;
            let reference = item
                .prompt
                .reference_image
                .clone()
                .or_else(|| chained.clone())
                .or_else(|| config.reference_image.clone());
            let deferral = delay * submitted as u32;
            let job = Job {
                item,
                reference_image: reference,
                settings: settings.clone(),
            };

            match self.pool.submit(job, self.processor.clone(), deferral) {
                Ok(()) => {
                    submitted += 1;
                    tracing::info!(
                        item_id = %id,
                        dispatch,
                        delay_ms = deferral.as_millis() as u64,
                        "item dispatched"
                    );
                    self.emit_event(Event::ItemDispatched {
                        id,
                        delay: deferral,
                    });
                }
                Err(e) => {
                    tracing::warn!(item_id = %id, error = %e, "submission rejected, releasing claim");
                    self.store.release_claim(id, dispatch).await;
                }
            }
        }

        // Keep the spacing across ticks, not just within this one
        if submitted > 0 && !delay.is_zero() {
            self.close_gate_for(delay * submitted as u32);
        }
        submitted
    }

    /// Sequential mode found an earlier failure: pause instead of skipping it
    async fn block_sequence(&self, failed: ItemId, next: ItemId) {
        let error = self
            .store
            .find(failed)
            .await
            .and_then(|item| item.error)
            .unwrap_or_default();
        tracing::warn!(failed_item = %failed, next_item = %next, "sequence blocked by failed item");
        self.emit_event(Event::SequenceBlocked {
            blocked_by: failed,
            next,
        });
        self.pause_for(PauseReason::SequenceFailure { id: failed, error });
    }

    fn gate(&self) -> Gate {
        let mut run = self.run_state();
        if run.gate_held {
            return Gate::Held;
        }
        match run.gate_until {
            Some(at) if at > Instant::now() => Gate::Until(at),
            Some(_) => {
                run.gate_until = None;
                Gate::Open
            }
            None => Gate::Open,
        }
    }

    /// Close the gate for `delay` from now; never shortens a later gate
    pub(crate) fn close_gate_for(&self, delay: Duration) {
        if delay.is_zero() {
            return;
        }
        let until = Instant::now() + delay;
        let mut run = self.run_state();
        if run.gate_until.is_none_or(|at| at < until) {
            run.gate_until = Some(until);
        }
    }

    /// Block dispatch until [`release_gate`](Self::release_gate)
    pub(crate) fn hold_gate(&self) {
        self.run_state().gate_held = true;
    }

    /// Lift a hold and close the gate for `delay`
    pub(crate) fn release_gate(&self, delay: Duration) {
        self.run_state().gate_held = false;
        self.close_gate_for(delay);
    }

    pub(crate) fn reset_gate(&self) {
        let mut run = self.run_state();
        run.gate_until = None;
        run.gate_held = false;
    }

    /// Nudge the control task once `at` has passed
    fn schedule_wake(&self, at: Instant) {
        {
            let mut run = self.run_state();
            let now = Instant::now();
            if run.wake_at.is_some_and(|w| w > now && w <= at) {
                return;
            }
            run.wake_at = Some(at);
        }
        let nudge = self.nudge.clone();
        tokio::spawn(async move {
            tokio::time::sleep_until(at).await;
            nudge.notify_one();
        });
    }
}
