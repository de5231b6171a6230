//! Ordered, thread-safe collection of work items
//!
//! Every operation takes the single store lock once, so compound steps such
//! as "check the cap, then insert" or "find the earliest pending item and look
//! at everything before it" are atomic with respect to other callers. The
//! critical sections are plain scans over a `Vec`; no I/O happens under the
//! lock.

use crate::error::{Error, Result};
use crate::import;
use crate::types::{ItemId, ItemOutcome, ItemStatus, PromptPayload, StatusCounts, WorkItem};
use chrono::Utc;
use tokio::sync::Mutex;

/// What sequential dispatch may do next
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SequentialCandidate {
    /// No pending items
    Nothing,
    /// The earliest pending item may be dispatched
    Ready(ItemId),
    /// An earlier item failed; the chain is broken
    Blocked {
        /// Earliest failed item before `next`
        failed: ItemId,
        /// Earliest pending item
        next: ItemId,
    },
    /// An earlier item has not finished yet
    Waiting {
        /// Earliest unfinished item before `next`
        on: ItemId,
        /// Earliest pending item
        next: ItemId,
    },
}

#[derive(Debug, Default)]
struct StoreInner {
    items: Vec<WorkItem>,
    next_id: u64,
}

impl StoreInner {
    fn get_mut(&mut self, id: ItemId) -> Option<&mut WorkItem> {
        self.items.iter_mut().find(|item| item.id == id)
    }

    fn allocate_id(&mut self) -> ItemId {
        self.next_id += 1;
        ItemId(self.next_id)
    }
}

/// Insertion-ordered work item store with a fixed item cap
#[derive(Debug)]
pub struct ItemStore {
    inner: Mutex<StoreInner>,
    cap: usize,
}

impl ItemStore {
    /// Create an empty store holding at most `cap` items
    pub fn new(cap: usize) -> Self {
        Self {
            inner: Mutex::new(StoreInner::default()),
            cap,
        }
    }

    /// Maximum number of items
    pub fn cap(&self) -> usize {
        self.cap
    }

    /// Add one prompt; `None` when the text is blank or the store is full
    pub async fn add(&self, text: &str, language: &str) -> Option<ItemId> {
        self.add_prompt(PromptPayload::new(text), language).await
    }

    /// Add one payload; `None` when the text is blank or the store is full
    pub async fn add_prompt(&self, mut prompt: PromptPayload, language: &str) -> Option<ItemId> {
        let text = prompt.text.trim();
        if text.is_empty() {
            return None;
        }
        prompt.text = text.to_string();

        let mut inner = self.inner.lock().await;
        if inner.items.len() >= self.cap {
            tracing::warn!(cap = self.cap, "item cap reached, prompt rejected");
            return None;
        }
        let id = inner.allocate_id();
        inner
            .items
            .push(WorkItem::new(id, prompt, language.to_string()));
        Some(id)
    }

    /// Parse bulk input and add as many prompts as the cap allows
    ///
    /// Returns the exact number of items added.
    pub async fn add_many(&self, raw: &str, language: &str) -> usize {
        self.add_payloads(import::parse_prompts(raw), language)
            .await
            .len()
    }

    /// Add parsed payloads in order, truncated to the remaining capacity
    pub async fn add_payloads(&self, payloads: Vec<PromptPayload>, language: &str) -> Vec<ItemId> {
        let mut inner = self.inner.lock().await;
        let room = self.cap.saturating_sub(inner.items.len());
        let offered = payloads.len();

        let mut ids = Vec::new();
        for mut prompt in payloads {
            if ids.len() >= room {
                break;
            }
            let text = prompt.text.trim();
            if text.is_empty() {
                continue;
            }
            prompt.text = text.to_string();
            let id = inner.allocate_id();
            inner
                .items
                .push(WorkItem::new(id, prompt, language.to_string()));
            ids.push(id);
        }

        if ids.len() < offered {
            tracing::warn!(
                offered,
                added = ids.len(),
                cap = self.cap,
                "bulk import truncated"
            );
        }
        ids
    }

    /// Remove an item; `false` for unknown ids and for items being processed
    pub async fn remove(&self, id: ItemId) -> bool {
        let mut inner = self.inner.lock().await;
        match inner.items.iter().position(|item| item.id == id) {
            Some(idx) if inner.items[idx].status != ItemStatus::Processing => {
                inner.items.remove(idx);
                true
            }
            _ => false,
        }
    }

    /// Move an item along the state machine, maintaining its timestamps
    pub async fn update_status(
        &self,
        id: ItemId,
        status: ItemStatus,
        artifact: Option<String>,
        error: Option<String>,
    ) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let item = inner.get_mut(id).ok_or(Error::NotFound(id))?;
        if !item.status.can_transition_to(status) {
            return Err(Error::InvalidTransition {
                id,
                from: item.status,
                to: status,
            });
        }

        let now = Utc::now();
        match status {
            ItemStatus::Processing => {
                item.started_at = Some(now);
                item.completed_at = None;
            }
            ItemStatus::Completed | ItemStatus::Failed => item.completed_at = Some(now),
            ItemStatus::Pending => {
                item.started_at = None;
                item.completed_at = None;
            }
            ItemStatus::Paused => {}
        }
        item.status = status;
        if artifact.is_some() {
            item.artifact = artifact;
        }
        if error.is_some() {
            item.error = error;
        }
        Ok(())
    }

    /// Snapshot of one item
    pub async fn find(&self, id: ItemId) -> Option<WorkItem> {
        let inner = self.inner.lock().await;
        inner.items.iter().find(|item| item.id == id).cloned()
    }

    /// 1-based position of an item in insertion order
    pub async fn position(&self, id: ItemId) -> Option<usize> {
        let inner = self.inner.lock().await;
        inner
            .items
            .iter()
            .position(|item| item.id == id)
            .map(|idx| idx + 1)
    }

    /// Edit prompt text and/or language; `false` for unknown or in-flight items
    /// and for blank replacement text
    pub async fn update_fields(
        &self,
        id: ItemId,
        text: Option<&str>,
        language: Option<&str>,
    ) -> bool {
        let text = match text.map(str::trim) {
            Some("") => return false,
            other => other,
        };

        let mut inner = self.inner.lock().await;
        let Some(item) = inner.get_mut(id) else {
            return false;
        };
        if item.status == ItemStatus::Processing {
            return false;
        }
        if let Some(text) = text {
            item.prompt.text = text.to_string();
        }
        if let Some(language) = language {
            item.language = language.to_string();
        }
        true
    }

    /// Return a failed item to `Pending`, clearing its previous result
    ///
    /// The item keeps its position and `retry_count` is incremented. Refused
    /// for unknown ids and for items that are not `Failed`.
    pub async fn reset_for_retry(&self, id: ItemId) -> bool {
        let mut inner = self.inner.lock().await;
        match inner.get_mut(id) {
            Some(item) if item.status == ItemStatus::Failed => {
                reset(item);
                true
            }
            _ => false,
        }
    }

    /// Edit a failed item and return it to `Pending` in one step
    ///
    /// Nothing changes unless the item is `Failed` and any replacement text is
    /// non-blank.
    pub async fn edit_for_retry(
        &self,
        id: ItemId,
        text: Option<&str>,
        language: Option<&str>,
    ) -> bool {
        let text = match text.map(str::trim) {
            Some("") => return false,
            other => other,
        };

        let mut inner = self.inner.lock().await;
        let Some(item) = inner.get_mut(id) else {
            return false;
        };
        if item.status != ItemStatus::Failed {
            return false;
        }
        if let Some(text) = text {
            item.prompt.text = text.to_string();
        }
        if let Some(language) = language {
            item.language = language.to_string();
        }
        reset(item);
        true
    }

    /// Snapshot of every item in order
    pub async fn list_all(&self) -> Vec<WorkItem> {
        self.inner.lock().await.items.clone()
    }

    /// Snapshot of the items with `status`, in order
    pub async fn list_by_status(&self, status: ItemStatus) -> Vec<WorkItem> {
        let inner = self.inner.lock().await;
        inner
            .items
            .iter()
            .filter(|item| item.status == status)
            .cloned()
            .collect()
    }

    /// Drop every item; refused while any item is being processed
    ///
    /// Ids keep counting up after a clear.
    pub async fn clear_all(&self) -> Result<usize> {
        let mut inner = self.inner.lock().await;
        if inner
            .items
            .iter()
            .any(|item| item.status == ItemStatus::Processing)
        {
            return Err(Error::InvalidState {
                operation: "clear".to_string(),
                state: "items are processing".to_string(),
            });
        }
        let removed = inner.items.len();
        inner.items.clear();
        Ok(removed)
    }

    /// Number of items
    pub async fn count(&self) -> usize {
        self.inner.lock().await.items.len()
    }

    /// Per-status counts
    pub async fn counts(&self) -> StatusCounts {
        let inner = self.inner.lock().await;
        let mut counts = StatusCounts::default();
        for item in &inner.items {
            match item.status {
                ItemStatus::Pending => counts.pending += 1,
                ItemStatus::Processing => counts.processing += 1,
                ItemStatus::Completed => counts.completed += 1,
                ItemStatus::Failed => counts.failed += 1,
                ItemStatus::Paused => counts.paused += 1,
            }
        }
        counts
    }

    /// First `limit` pending ids in order
    pub async fn pending_ids(&self, limit: usize) -> Vec<ItemId> {
        let inner = self.inner.lock().await;
        inner
            .items
            .iter()
            .filter(|item| item.status == ItemStatus::Pending)
            .take(limit)
            .map(|item| item.id)
            .collect()
    }

    /// Atomically move a pending item to `Processing` for a new dispatch
    ///
    /// Returns the claimed snapshot, or `None` if the item is gone or no
    /// longer pending.
    pub async fn claim(&self, id: ItemId) -> Option<WorkItem> {
        let mut inner = self.inner.lock().await;
        let item = inner.get_mut(id)?;
        if item.status != ItemStatus::Pending {
            return None;
        }
        item.status = ItemStatus::Processing;
        item.started_at = Some(Utc::now());
        item.completed_at = None;
        item.dispatch_count += 1;
        Some(item.clone())
    }

    /// Undo a claim whose submission never ran
    pub async fn release_claim(&self, id: ItemId, dispatch: u32) -> bool {
        let mut inner = self.inner.lock().await;
        match inner.get_mut(id) {
            Some(item)
                if item.status == ItemStatus::Processing && item.dispatch_count == dispatch =>
            {
                item.status = ItemStatus::Pending;
                item.started_at = None;
                true
            }
            _ => false,
        }
    }

    /// Record the outcome of dispatch number `dispatch`
    ///
    /// Returns the updated snapshot, or `None` when the result is stale: the
    /// item was removed, requeued by a stop, or dispatched again since.
    pub async fn finish(
        &self,
        id: ItemId,
        dispatch: u32,
        outcome: &ItemOutcome,
    ) -> Option<WorkItem> {
        let mut inner = self.inner.lock().await;
        let item = inner.get_mut(id)?;
        if item.status != ItemStatus::Processing || item.dispatch_count != dispatch {
            return None;
        }
        item.completed_at = Some(Utc::now());
        match outcome {
            ItemOutcome::Success { artifact, .. } => {
                item.status = ItemStatus::Completed;
                item.artifact = Some(artifact.clone());
                item.error = None;
            }
            ItemOutcome::Failure { error, .. } => {
                item.status = ItemStatus::Failed;
                item.error = Some(error.clone());
            }
        }
        Some(item.clone())
    }

    /// Force every processing item back to `Pending`
    pub async fn requeue_processing(&self) -> Vec<ItemId> {
        let mut inner = self.inner.lock().await;
        inner
            .items
            .iter_mut()
            .filter(|item| item.status == ItemStatus::Processing)
            .map(|item| {
                item.status = ItemStatus::Pending;
                item.started_at = None;
                item.id
            })
            .collect()
    }

    /// Examine the earliest pending item and everything before it
    pub async fn sequential_candidate(&self) -> SequentialCandidate {
        let inner = self.inner.lock().await;
        let Some(idx) = inner
            .items
            .iter()
            .position(|item| item.status == ItemStatus::Pending)
        else {
            return SequentialCandidate::Nothing;
        };
        let next = inner.items[idx].id;
        let earlier = &inner.items[..idx];

        if let Some(failed) = earlier.iter().find(|item| item.status == ItemStatus::Failed) {
            return SequentialCandidate::Blocked {
                failed: failed.id,
                next,
            };
        }
        if let Some(unfinished) = earlier
            .iter()
            .find(|item| item.status != ItemStatus::Completed)
        {
            return SequentialCandidate::Waiting {
                on: unfinished.id,
                next,
            };
        }
        SequentialCandidate::Ready(next)
    }
}

fn reset(item: &mut WorkItem) {
    item.status = ItemStatus::Pending;
    item.error = None;
    item.artifact = None;
    item.started_at = None;
    item.completed_at = None;
    item.retry_count += 1;
}
