//! Batch lifecycle control (start/pause/resume/stop/shutdown).

use super::BatchRunner;
use crate::error::{Error, Result};
use crate::types::{BatchState, Event, PauseReason};

impl BatchRunner {
    /// Start dispatching pending items
    ///
    /// Allowed from any state except `Running`. Progress tracking restarts
    /// over the items that are pending or still in flight, the pacing gate is
    /// opened and the pool's stop token is renewed. A batch with nothing to do
    /// completes immediately.
    pub async fn start(&self) -> Result<()> {
        if self.shutdown.is_cancelled() {
            return Err(Error::ShuttingDown);
        }

        let counts = self.store.counts().await;
        {
            let mut run = self.run_state();
            if run.batch == BatchState::Running {
                return Err(Error::invalid_state("start", run.batch));
            }
            run.batch = BatchState::Running;
        }
        self.reset_gate();

        let total = counts.pending + counts.processing;
        self.tracker.start(total);
        self.pool.resume();

        tracing::info!(total, "batch started");
        self.emit_event(Event::BatchStarted { total });

        self.dispatch_tick().await;
        self.check_finished().await;
        Ok(())
    }

    /// Halt dispatch; items already handed to workers keep running
    pub fn pause(&self) -> Result<()> {
        let state = self.state();
        if !self.pause_for(PauseReason::Requested) {
            return Err(Error::invalid_state("pause", state));
        }
        Ok(())
    }

    /// `Running -> Paused`; returns whether the transition happened
    ///
    /// A sequence failure also fires the pool's stop token so deferred or
    /// waiting submissions are returned to pending.
    pub(crate) fn pause_for(&self, reason: PauseReason) -> bool {
        {
            let mut run = self.run_state();
            if run.batch != BatchState::Running {
                return false;
            }
            run.batch = BatchState::Paused;
        }
        if matches!(reason, PauseReason::SequenceFailure { .. }) {
            self.pool.request_stop();
        }
        tracing::info!(reason = ?reason, "batch paused");
        self.emit_event(Event::BatchPaused { reason });
        true
    }

    /// Continue a paused batch
    pub fn resume(&self) -> Result<()> {
        if self.shutdown.is_cancelled() {
            return Err(Error::ShuttingDown);
        }
        {
            let mut run = self.run_state();
            if run.batch != BatchState::Paused {
                return Err(Error::invalid_state("resume", run.batch));
            }
            run.batch = BatchState::Running;
        }
        self.pool.resume();
        tracing::info!("batch resumed");
        self.emit_event(Event::BatchResumed);
        self.nudge();
        Ok(())
    }

    /// Stop the batch and return in-flight items to `Pending`
    ///
    /// Workers that have not reached the processor abort. Processor calls
    /// already in progress are not interrupted; their late results are
    /// discarded. Waits at most `stop_timeout` for running workers.
    pub async fn stop(&self) -> Result<()> {
        {
            let mut run = self.run_state();
            if !matches!(run.batch, BatchState::Running | BatchState::Paused) {
                return Err(Error::invalid_state("stop", run.batch));
            }
            run.batch = BatchState::Stopped;
        }

        let timeout = self.config.read().await.stop_timeout;
        let drained = self.pool.stop_all(timeout).await;
        let requeued = self.store.requeue_processing().await;
        for id in &requeued {
            self.emit_event(Event::ItemRequeued { id: *id });
        }

        tracing::info!(requeued = requeued.len(), drained, "batch stopped");
        self.emit_event(Event::BatchStopped {
            requeued: requeued.len(),
        });
        Ok(())
    }

    /// Stop any active batch and end the control task
    ///
    /// Further `start`/`resume` calls fail with [`Error::ShuttingDown`].
    pub async fn shutdown(&self) -> Result<()> {
        if self.shutdown.is_cancelled() {
            return Ok(());
        }
        if matches!(self.state(), BatchState::Running | BatchState::Paused) {
            self.stop().await?;
        }
        self.shutdown.cancel();
        tracing::info!("batch runner shut down");
        self.emit_event(Event::Shutdown);
        Ok(())
    }
}
