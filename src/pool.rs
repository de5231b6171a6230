//! Bounded-concurrency worker pool
//!
//! Each submitted job runs on its own tokio task. A task first waits out its
//! optional deferral, then competes for a capacity slot, checks the stop token
//! one last time and only then calls the processor. Results travel back to the
//! owner as [`Completion`] messages on an unbounded channel.
//!
//! Capacity is a counter behind a `std::sync::Mutex` paired with a
//! [`Notify`]. Unlike a semaphore it can shrink without revoking permits:
//! running work keeps its slot and new work waits until `running < capacity`.

use crate::config::validate_concurrency;
use crate::error::{Error, Result};
use crate::processor::{ItemProcessor, Job};
use crate::types::{ItemId, ItemOutcome};
use futures::FutureExt;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::{Notify, mpsc};
use tokio_util::sync::CancellationToken;

/// Result of one worker run
#[derive(Clone, Debug, PartialEq)]
pub enum WorkerResult {
    /// The processor returned an artifact
    Success(String),
    /// The processor returned an error or panicked
    Failure(String),
    /// The stop token fired before the processor was called
    Aborted,
}

/// Message sent by a worker when it is done
#[derive(Clone, Debug)]
pub struct Completion {
    /// Item the worker ran for
    pub id: ItemId,
    /// Dispatch number of the claim this worker belongs to
    pub dispatch: u32,
    /// What happened
    pub result: WorkerResult,
    /// Time spent in the processor (zero when aborted)
    pub duration: Duration,
}

impl Completion {
    /// Item outcome, `None` for aborted runs
    pub fn outcome(&self) -> Option<ItemOutcome> {
        match &self.result {
            WorkerResult::Success(artifact) => Some(ItemOutcome::Success {
                artifact: artifact.clone(),
                duration: self.duration,
            }),
            WorkerResult::Failure(error) => Some(ItemOutcome::Failure {
                error: error.clone(),
                duration: self.duration,
            }),
            WorkerResult::Aborted => None,
        }
    }
}

#[derive(Debug)]
struct GateState {
    capacity: usize,
    running: usize,
}

#[derive(Debug)]
struct CapacityGate {
    state: Mutex<GateState>,
    notify: Notify,
}

impl CapacityGate {
    fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(GateState {
                capacity,
                running: 0,
            }),
            notify: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn try_acquire(self: &Arc<Self>) -> Option<SlotGuard> {
        let mut state = self.lock();
        if state.running < state.capacity {
            state.running += 1;
            Some(SlotGuard { gate: self.clone() })
        } else {
            None
        }
    }

    async fn acquire(self: &Arc<Self>) -> SlotGuard {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before checking so a release between the check and the
            // await is not lost
            notified.as_mut().enable();

            if let Some(slot) = self.try_acquire() {
                return slot;
            }
            notified.await;
        }
    }

    fn set_capacity(&self, capacity: usize) {
        self.lock().capacity = capacity;
        self.notify.notify_waiters();
    }

    fn capacity(&self) -> usize {
        self.lock().capacity
    }
}

/// RAII capacity slot
struct SlotGuard {
    gate: Arc<CapacityGate>,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        {
            let mut state = self.gate.lock();
            state.running = state.running.saturating_sub(1);
        }
        self.gate.notify.notify_waiters();
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Waiting,
    Running,
}

/// Bounded pool of item workers
///
/// Cloning is cheap and yields another handle to the same pool.
#[derive(Clone)]
pub struct WorkerPool {
    gate: Arc<CapacityGate>,
    registry: Arc<Mutex<HashMap<ItemId, Phase>>>,
    stop: Arc<Mutex<CancellationToken>>,
    drained: Arc<Notify>,
    completions: mpsc::UnboundedSender<Completion>,
}

impl WorkerPool {
    /// Create a pool with `capacity` slots and the receiving end of its
    /// completion channel
    pub fn new(capacity: usize) -> Result<(Self, mpsc::UnboundedReceiver<Completion>)> {
        validate_concurrency(capacity)?;
        let (tx, rx) = mpsc::unbounded_channel();
        let pool = Self {
            gate: Arc::new(CapacityGate::new(capacity)),
            registry: Arc::new(Mutex::new(HashMap::new())),
            stop: Arc::new(Mutex::new(CancellationToken::new())),
            drained: Arc::new(Notify::new()),
            completions: tx,
        };
        Ok((pool, rx))
    }

    fn registry(&self) -> MutexGuard<'_, HashMap<ItemId, Phase>> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn stop_token(&self) -> CancellationToken {
        self.stop
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Register `job` and spawn its worker
    ///
    /// The worker sleeps `delay` first (cut short by a stop), then waits for a
    /// free slot. Fails with [`Error::AlreadyInFlight`] if the item already has
    /// a registered worker.
    pub fn submit(
        &self,
        job: Job,
        processor: Arc<dyn ItemProcessor>,
        delay: Duration,
    ) -> Result<()> {
        let id = job.item.id;
        {
            let mut registry = self.registry();
            if registry.contains_key(&id) {
                return Err(Error::AlreadyInFlight(id));
            }
            registry.insert(id, Phase::Waiting);
        }

        let token = self.stop_token();
        let pool = self.clone();
        tokio::spawn(async move {
            pool.run_worker(job, processor, delay, token).await;
        });
        Ok(())
    }

    async fn run_worker(
        self,
        job: Job,
        processor: Arc<dyn ItemProcessor>,
        delay: Duration,
        token: CancellationToken,
    ) {
        let id = job.item.id;
        let dispatch = job.item.dispatch_count;

        if !delay.is_zero() {
            tokio::select! {
                _ = token.cancelled() => return self.abort(id, dispatch),
                _ = tokio::time::sleep(delay) => {}
            }
        }

        let slot = tokio::select! {
            biased;
            _ = token.cancelled() => return self.abort(id, dispatch),
            slot = self.gate.acquire() => slot,
        };

        if token.is_cancelled() {
            drop(slot);
            return self.abort(id, dispatch);
        }

        self.set_phase(id, Phase::Running);
        tracing::debug!(item_id = %id, processor = processor.name(), "worker started");

        let started = Instant::now();
        let result = AssertUnwindSafe(processor.process(&job))
            .catch_unwind()
            .await;
        let duration = started.elapsed();

        let result = match result {
            Ok(Ok(artifact)) => WorkerResult::Success(artifact),
            Ok(Err(e)) => WorkerResult::Failure(e.to_string()),
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                tracing::error!(item_id = %id, panic = %message, "processor panicked");
                WorkerResult::Failure(format!("processor panicked: {message}"))
            }
        };

        drop(slot);
        self.unregister(id);
        self.send(Completion {
            id,
            dispatch,
            result,
            duration,
        });
    }

    fn abort(&self, id: ItemId, dispatch: u32) {
        tracing::debug!(item_id = %id, "worker aborted before start");
        self.unregister(id);
        self.send(Completion {
            id,
            dispatch,
            result: WorkerResult::Aborted,
            duration: Duration::ZERO,
        });
    }

    fn set_phase(&self, id: ItemId, phase: Phase) {
        if let Some(entry) = self.registry().get_mut(&id) {
            *entry = phase;
        }
    }

    fn unregister(&self, id: ItemId) {
        self.registry().remove(&id);
        self.drained.notify_waiters();
    }

    fn send(&self, completion: Completion) {
        if self.completions.send(completion).is_err() {
            tracing::debug!("completion receiver dropped");
        }
    }

    /// Change the number of slots (1..=10)
    ///
    /// Growing wakes waiting workers at once. Shrinking never interrupts
    /// running work; the pool simply admits nothing new until enough workers
    /// have finished.
    pub fn set_capacity(&self, capacity: usize) -> Result<()> {
        validate_concurrency(capacity)?;
        self.gate.set_capacity(capacity);
        tracing::info!(capacity, "worker pool capacity changed");
        Ok(())
    }

    /// Current number of slots
    pub fn capacity(&self) -> usize {
        self.gate.capacity()
    }

    /// Workers currently inside the processor
    pub fn active_count(&self) -> usize {
        self.registry()
            .values()
            .filter(|phase| **phase == Phase::Running)
            .count()
    }

    /// Registered workers, waiting or running
    pub fn outstanding(&self) -> usize {
        self.registry().len()
    }

    /// Whether `id` has a registered worker
    pub fn is_active(&self, id: ItemId) -> bool {
        self.registry().contains_key(&id)
    }

    /// Fire the stop token and wait up to `timeout` for running workers
    ///
    /// Workers that have not reached the processor abort. Workers already
    /// inside it are not interrupted; returns `false` if any were still running
    /// when the timeout elapsed.
    pub async fn stop_all(&self, timeout: Duration) -> bool {
        self.request_stop();

        let wait = async {
            loop {
                let notified = self.drained.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();
                if self.active_count() == 0 {
                    return;
                }
                notified.await;
            }
        };

        let drained = tokio::time::timeout(timeout, wait).await.is_ok();
        if !drained {
            tracing::warn!(
                still_running = self.active_count(),
                "workers did not finish before stop timeout"
            );
        }
        drained
    }

    /// Fire the stop token without waiting for anything
    pub fn request_stop(&self) {
        self.stop_token().cancel();
    }

    /// Install a fresh stop token so new submissions run again
    pub fn resume(&self) {
        let mut token = self.stop.lock().unwrap_or_else(PoisonError::into_inner);
        if token.is_cancelled() {
            *token = CancellationToken::new();
        }
    }

    /// Whether the current stop token has fired
    pub fn is_stopped(&self) -> bool {
        self.stop_token().is_cancelled()
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
