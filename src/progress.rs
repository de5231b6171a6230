//! Batch progress tracking and ETA estimation

use crate::types::{ItemId, ItemStatus, ProgressSummary};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct TrackerState {
    total: usize,
    completed: usize,
    failed: usize,
    durations: Vec<Duration>,
    started: Option<Instant>,
}

impl TrackerState {
    fn remaining(&self) -> usize {
        self.total.saturating_sub(self.completed + self.failed)
    }

    fn average(&self) -> Option<Duration> {
        if self.durations.is_empty() {
            return None;
        }
        let sum: Duration = self.durations.iter().sum();
        Some(sum / self.durations.len() as u32)
    }

    fn percentage(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        (self.completed + self.failed) as f64 / self.total as f64 * 100.0
    }

    fn eta(&self) -> Option<Duration> {
        if self.total == 0 {
            return None;
        }
        let remaining = self.remaining();
        if remaining == 0 {
            return Some(Duration::ZERO);
        }
        self.average().map(|avg| avg * remaining as u32)
    }
}

/// Counts finished items for the current run and estimates time remaining
///
/// Only successful items contribute duration samples; failures usually end
/// early and would skew the average downwards.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    state: Mutex<TrackerState>,
}

impl ProgressTracker {
    /// Create an idle tracker
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reset counters and start timing a run of `total` items
    pub fn start(&self, total: usize) {
        *self.lock() = TrackerState {
            total,
            started: Some(Instant::now()),
            ..Default::default()
        };
    }

    /// Grow the run by `n` items (items added or retried mid-run); 0 is ignored
    pub fn add_to_total(&self, n: usize) {
        if n == 0 {
            return;
        }
        self.lock().total += n;
    }

    /// Shrink the run by `n` items that left before finishing
    ///
    /// Never drops the total below the items already finished.
    pub fn remove_from_total(&self, n: usize) {
        let mut state = self.lock();
        let finished = state.completed + state.failed;
        state.total = state.total.saturating_sub(n).max(finished);
    }

    /// Record a finished item
    ///
    /// `Completed` increments the completed count and samples `duration`;
    /// `Failed` increments the failed count. Other statuses are ignored.
    pub fn record(&self, id: ItemId, status: ItemStatus, duration: Option<Duration>) {
        let mut state = self.lock();
        match status {
            ItemStatus::Completed => {
                state.completed += 1;
                if let Some(d) = duration {
                    state.durations.push(d);
                }
            }
            ItemStatus::Failed => state.failed += 1,
            other => {
                tracing::debug!(item_id = %id, status = ?other, "ignoring non-terminal progress record");
            }
        }
    }

    /// Finished share of the run, 0 when nothing is tracked
    pub fn percentage(&self) -> f64 {
        self.lock().percentage()
    }

    /// Estimated time to finish the remaining items
    ///
    /// `None` until the first successful sample, zero once nothing remains.
    pub fn eta(&self) -> Option<Duration> {
        self.lock().eta()
    }

    /// Mean duration of successful items
    pub fn average_duration(&self) -> Option<Duration> {
        self.lock().average()
    }

    /// Snapshot of every derived figure
    pub fn summary(&self) -> ProgressSummary {
        let state = self.lock();
        ProgressSummary {
            total: state.total,
            completed: state.completed,
            failed: state.failed,
            remaining: state.remaining(),
            percentage: state.percentage(),
            elapsed: state.started.map(|t| t.elapsed()),
            average_duration: state.average(),
            eta: state.eta(),
        }
    }
}
