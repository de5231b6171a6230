//! Core types for vidgen-batch

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Unique identifier for a work item
///
/// Ids come from a counter owned by the [`ItemStore`](crate::store::ItemStore)
/// and are never reused, not even after the store is cleared.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub u64);

impl ItemId {
    /// Get the inner u64 value
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl From<u64> for ItemId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl From<ItemId> for u64 {
    fn from(id: ItemId) -> Self {
        id.0
    }
}

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ItemId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

/// Work item status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    /// Waiting to be dispatched
    Pending,
    /// Claimed by the dispatcher and handed to a worker
    Processing,
    /// Finished with an artifact
    Completed,
    /// Finished with an error
    Failed,
    /// Reserved. Batch pausing halts dispatch instead of touching items, so
    /// nothing in this crate moves an item into this state.
    Paused,
}

impl ItemStatus {
    /// Whether the item reached a terminal state for the current attempt
    pub fn is_finished(&self) -> bool {
        matches!(self, ItemStatus::Completed | ItemStatus::Failed)
    }

    /// Whether `self -> next` is an edge of the item state machine
    ///
    /// Forward: `Pending -> Processing -> {Completed, Failed}`.
    /// Backward: `Failed -> Pending` (retry) and `Processing -> Pending` (stop).
    pub fn can_transition_to(&self, next: ItemStatus) -> bool {
        use ItemStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Processing, Pending)
                | (Failed, Pending)
        )
    }
}

/// Prompt text plus an optional per-item reference image
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptPayload {
    /// Prompt text sent to the provider
    pub text: String,
    /// Item-specific reference image (path or URL); overrides any batch-level reference
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_image: Option<String>,
}

impl PromptPayload {
    /// Payload with text only
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            reference_image: None,
        }
    }

    /// Attach a reference image
    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference_image = Some(reference.into());
        self
    }
}

/// One unit of batch work
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkItem {
    /// Unique id, assigned at creation
    pub id: ItemId,
    /// Prompt and optional reference image
    pub prompt: PromptPayload,
    /// Provider-side language tag
    pub language: String,
    /// Current status
    pub status: ItemStatus,
    /// When the item was added
    pub created_at: DateTime<Utc>,
    /// Set on the transition to `Processing`
    pub started_at: Option<DateTime<Utc>>,
    /// Set on the transition to `Completed` or `Failed`
    pub completed_at: Option<DateTime<Utc>>,
    /// URL or local path of the produced video
    pub artifact: Option<String>,
    /// Human-readable failure cause
    pub error: Option<String>,
    /// Number of manual retry resets
    pub retry_count: u32,
    /// Number of times the item was claimed for dispatch
    pub dispatch_count: u32,
}

impl WorkItem {
    pub(crate) fn new(id: ItemId, prompt: PromptPayload, language: String) -> Self {
        Self {
            id,
            prompt,
            language,
            status: ItemStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            artifact: None,
            error: None,
            retry_count: 0,
            dispatch_count: 0,
        }
    }
}

/// Per-status item counts
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    /// Items waiting for dispatch
    pub pending: usize,
    /// Items claimed or running
    pub processing: usize,
    /// Items finished successfully
    pub completed: usize,
    /// Items finished with an error
    pub failed: usize,
    /// Items in the reserved paused state
    pub paused: usize,
}

impl StatusCounts {
    /// Total number of items
    pub fn total(&self) -> usize {
        self.pending + self.processing + self.completed + self.failed + self.paused
    }

    /// Whether nothing is waiting or in flight
    pub fn is_drained(&self) -> bool {
        self.pending == 0 && self.processing == 0
    }
}

/// Outcome of one processing attempt
#[derive(Clone, Debug, PartialEq)]
pub enum ItemOutcome {
    /// The processor produced an artifact
    Success {
        /// Artifact reference (URL or path)
        artifact: String,
        /// Wall-clock processing time
        duration: Duration,
    },
    /// The processor failed, returned an error or panicked
    Failure {
        /// Rendered failure cause
        error: String,
        /// Wall-clock processing time
        duration: Duration,
    },
}

impl ItemOutcome {
    /// Processing time of the attempt
    pub fn duration(&self) -> Duration {
        match self {
            ItemOutcome::Success { duration, .. } | ItemOutcome::Failure { duration, .. } => {
                *duration
            }
        }
    }

    /// Whether the attempt succeeded
    pub fn is_success(&self) -> bool {
        matches!(self, ItemOutcome::Success { .. })
    }
}

/// Whole-batch state
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchState {
    /// Never started
    #[default]
    Idle,
    /// Dispatching work
    Running,
    /// Dispatch halted; resumable without requeueing
    Paused,
    /// Dispatch halted; in-flight items were returned to `Pending`
    Stopped,
    /// Nothing left pending or in flight
    Completed,
}

impl std::fmt::Display for BatchState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BatchState::Idle => "idle",
            BatchState::Running => "running",
            BatchState::Paused => "paused",
            BatchState::Stopped => "stopped",
            BatchState::Completed => "completed",
        };
        f.write_str(s)
    }
}

/// Snapshot of batch progress
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressSummary {
    /// Items counted towards this run
    pub total: usize,
    /// Items completed during this run
    pub completed: usize,
    /// Items failed during this run
    pub failed: usize,
    /// Items not yet finished
    pub remaining: usize,
    /// `(completed + failed) / total * 100`, 0 when total is 0
    pub percentage: f64,
    /// Time since tracking started
    pub elapsed: Option<Duration>,
    /// Mean duration of completed items
    pub average_duration: Option<Duration>,
    /// `remaining * average_duration`
    pub eta: Option<Duration>,
}

/// Why the batch stopped dispatching
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PauseReason {
    /// Explicit `pause()` call
    Requested,
    /// Sequential mode: an item failed and the chain cannot continue
    SequenceFailure {
        /// The failed item blocking the chain
        id: ItemId,
        /// Its error message
        error: String,
    },
}

/// Event emitted during the batch lifecycle
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Items were added to the store
    ItemsAdded {
        /// Ids of the new items, in order
        ids: Vec<ItemId>,
    },

    /// Item removed from the store
    ItemRemoved {
        /// Item ID
        id: ItemId,
    },

    /// Item handed to the worker pool
    ItemDispatched {
        /// Item ID
        id: ItemId,
        /// Deferral applied before the worker competes for a slot
        delay: Duration,
    },

    /// Item finished successfully
    ItemCompleted {
        /// Item ID
        id: ItemId,
        /// Produced artifact
        artifact: String,
        /// Processing time
        duration: Duration,
    },

    /// Item failed
    ItemFailed {
        /// Item ID
        id: ItemId,
        /// Error message
        error: String,
    },

    /// Item returned to `Pending` (retry, stop, or aborted submission)
    ItemRequeued {
        /// Item ID
        id: ItemId,
    },

    /// A reference frame was derived for the next sequential item
    ChainReferenceUpdated {
        /// Item the reference was derived from
        source: ItemId,
        /// Path or URL of the derived reference
        reference: String,
    },

    /// Artifact downloaded to the local folder
    ArtifactSaved {
        /// Item ID
        id: ItemId,
        /// Destination path
        path: std::path::PathBuf,
    },

    /// Progress changed
    Progress(ProgressSummary),

    /// Batch started dispatching
    BatchStarted {
        /// Items counted for this run
        total: usize,
    },

    /// Batch paused
    BatchPaused {
        /// Cause of the pause
        reason: PauseReason,
    },

    /// Batch resumed after a pause
    BatchResumed,

    /// Batch stopped
    BatchStopped {
        /// Items returned to `Pending`
        requeued: usize,
    },

    /// Nothing left pending or in flight
    BatchCompleted {
        /// Final progress
        summary: ProgressSummary,
    },

    /// Sequential mode found an earlier failed item and refused to continue
    SequenceBlocked {
        /// The failed item
        blocked_by: ItemId,
        /// The item that would have been dispatched next
        next: ItemId,
    },

    /// Worker pool capacity changed
    ConcurrencyChanged {
        /// New capacity
        max_concurrency: usize,
    },

    /// Runner shut down
    Shutdown,
}
