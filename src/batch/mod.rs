//! Batch runner split into focused submodules.
//!
//! The `BatchRunner` struct and its methods are organized by concern:
//! - [`dispatch`] - Dispatch ticks and the pacing gate
//! - [`completion`] - Worker results, chaining and fail-fast
//! - [`control`] - Start, pause, resume, stop and shutdown
//! - [`config_ops`] - Runtime configuration updates
//! - [`items`] - Adding, editing, retrying and exporting items

mod completion;
mod config_ops;
mod control;
mod dispatch;
mod items;

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

use crate::chain::ReferenceDeriver;
use crate::config::BatchConfig;
use crate::error::Result;
use crate::pool::{Completion, WorkerPool};
use crate::processor::ItemProcessor;
use crate::progress::ProgressTracker;
use crate::store::ItemStore;
use crate::types::{BatchState, Event};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{Notify, RwLock, broadcast, mpsc};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Mutable run state shared by the control task and API calls
#[derive(Debug, Default)]
pub(crate) struct RunState {
    /// Whole-batch state
    pub(crate) batch: BatchState,
    /// No dispatch before this instant
    pub(crate) gate_until: Option<Instant>,
    /// Dispatch blocked until a chaining step finishes
    pub(crate) gate_held: bool,
    /// Reference derived from the last completed sequential item
    pub(crate) chained_reference: Option<String>,
    /// Instant a deferred wake-up is already scheduled for
    pub(crate) wake_at: Option<Instant>,
}

/// Optional collaborators of a runner
#[derive(Clone, Default)]
pub(crate) struct Collaborators {
    /// Derives the next reference in sequential mode
    pub(crate) deriver: Option<Arc<dyn ReferenceDeriver>>,
}

/// Handle to a running batch (cloneable, all fields are Arc-wrapped)
///
/// Creating a runner spawns its control task, so it must be called inside a
/// tokio runtime. The control task receives worker completions, runs the
/// periodic dispatch timer and reacts to nudges from API calls. Call
/// [`shutdown`](BatchRunner::shutdown) to end it.
#[derive(Clone)]
pub struct BatchRunner {
    pub(crate) store: Arc<ItemStore>,
    pub(crate) pool: WorkerPool,
    pub(crate) tracker: Arc<ProgressTracker>,
    /// Live configuration; runtime knobs change it through `config_ops`
    pub(crate) config: Arc<RwLock<BatchConfig>>,
    pub(crate) run: Arc<Mutex<RunState>>,
    pub(crate) processor: Arc<dyn ItemProcessor>,
    pub(crate) collaborators: Collaborators,
    pub(crate) event_tx: broadcast::Sender<Event>,
    /// Wakes the control task for an immediate dispatch tick
    pub(crate) nudge: Arc<Notify>,
    /// Serializes dispatch ticks from the control task and API calls
    pub(crate) tick_lock: Arc<tokio::sync::Mutex<()>>,
    pub(crate) shutdown: CancellationToken,
}

impl BatchRunner {
    /// Create a runner and spawn its control task
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`](crate::Error::Config) if `config` fails validation.
    pub fn new(config: BatchConfig, processor: Arc<dyn ItemProcessor>) -> Result<Self> {
        Self::build(config, processor, Collaborators::default())
    }

    /// Create a runner that chains frames with `deriver` in sequential mode
    pub fn with_deriver(
        config: BatchConfig,
        processor: Arc<dyn ItemProcessor>,
        deriver: Arc<dyn ReferenceDeriver>,
    ) -> Result<Self> {
        Self::build(
            config,
            processor,
            Collaborators {
                deriver: Some(deriver),
            },
        )
    }

    fn build(
        config: BatchConfig,
        processor: Arc<dyn ItemProcessor>,
        collaborators: Collaborators,
    ) -> Result<Self> {
        config.validate()?;

        let (pool, completions) = WorkerPool::new(config.effective_concurrency())?;
        let (event_tx, _rx) = broadcast::channel(1000);
        let tick_interval = config.tick_interval;

        let runner = Self {
            store: Arc::new(ItemStore::new(config.item_cap)),
            pool,
            tracker: Arc::new(ProgressTracker::new()),
            config: Arc::new(RwLock::new(config)),
            run: Arc::new(Mutex::new(RunState::default())),
            processor,
            collaborators,
            event_tx,
            nudge: Arc::new(Notify::new()),
            tick_lock: Arc::new(tokio::sync::Mutex::new(())),
            shutdown: CancellationToken::new(),
        };

        let control = runner.clone();
        tokio::spawn(async move { control.control_loop(completions, tick_interval).await });

        tracing::info!(
            processor = runner.processor.name(),
            chaining = runner.collaborators.deriver.is_some(),
            "batch runner created"
        );
        Ok(runner)
    }

    async fn control_loop(
        self,
        mut completions: mpsc::UnboundedReceiver<Completion>,
        tick_interval: std::time::Duration,
    ) {
        let mut ticker = tokio::time::interval(tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                Some(completion) = completions.recv() => self.handle_completion(completion).await,
                _ = self.nudge.notified() => {
                    self.dispatch_tick().await;
                    self.check_finished().await;
                }
                _ = ticker.tick() => {
                    self.dispatch_tick().await;
                    self.check_finished().await;
                }
            }
        }
        tracing::debug!("control task finished");
    }

    /// Subscribe to batch events
    ///
    /// Multiple subscribers are supported. Each subscriber receives all events independently.
    /// A subscriber that falls behind by more than 1000 events receives
    /// `RecvError::Lagged`.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use std::sync::Arc;
    /// use vidgen_batch::{BatchConfig, BatchRunner, Event};
    /// use vidgen_batch::processor::WebhookProcessor;
    ///
    /// # async fn example() -> vidgen_batch::Result<()> {
    /// let processor = Arc::new(WebhookProcessor::new("https://hooks.example/generate")?);
    /// let runner = BatchRunner::new(BatchConfig::default(), processor)?;
    ///
    /// let mut events = runner.subscribe();
    /// tokio::spawn(async move {
    ///     while let Ok(event) = events.recv().await {
    ///         if let Event::Progress(summary) = event {
    ///             println!("{:.0}% done", summary.percentage);
    ///         }
    ///     }
    /// });
    /// # Ok(())
    /// # }
    /// ```
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Emit an event to all subscribers; dropped silently when nobody listens
    pub(crate) fn emit_event(&self, event: Event) {
        self.event_tx.send(event).ok();
    }

    /// Ask the control task for a dispatch tick
    pub(crate) fn nudge(&self) {
        self.nudge.notify_one();
    }

    pub(crate) fn run_state(&self) -> MutexGuard<'_, RunState> {
        self.run.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current batch state
    pub fn state(&self) -> BatchState {
        self.run_state().batch
    }
}
