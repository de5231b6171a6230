//! Item management: adding, editing, retrying, removing and exporting.

use super::BatchRunner;
use crate::artifacts::{self, DownloadReport};
use crate::error::{Error, Result};
use crate::import;
use crate::types::{
    BatchState, Event, ItemId, ItemStatus, ProgressSummary, PromptPayload, StatusCounts, WorkItem,
};
use std::path::Path;

impl BatchRunner {
    /// Add one prompt in the default language
    ///
    /// Returns `None` for blank text or when the item cap is reached.
    pub async fn add(&self, text: &str) -> Option<ItemId> {
        self.add_prompt(PromptPayload::new(text), None).await
    }

    /// Add one payload; `language` falls back to the configured default
    pub async fn add_prompt(
        &self,
        prompt: PromptPayload,
        language: Option<&str>,
    ) -> Option<ItemId> {
        let language = self.language_or_default(language).await;
        let id = self.store.add_prompt(prompt, &language).await?;
        self.items_added(vec![id]);
        Some(id)
    }

    /// Parse bulk input (lines or JSON records) and add what fits
    ///
    /// Returns the number of items added.
    pub async fn add_many(&self, raw: &str) -> usize {
        self.add_many_with_language(raw, None).await
    }

    /// [`add_many`](Self::add_many) with an explicit language
    pub async fn add_many_with_language(&self, raw: &str, language: Option<&str>) -> usize {
        let language = self.language_or_default(language).await;
        let ids = self
            .store
            .add_payloads(import::parse_prompts(raw), &language)
            .await;
        let added = ids.len();
        if added > 0 {
            tracing::info!(added, "prompts imported");
            self.items_added(ids);
        }
        added
    }

    async fn language_or_default(&self, language: Option<&str>) -> String {
        match language.map(str::trim).filter(|l| !l.is_empty()) {
            Some(l) => l.to_string(),
            None => self.config.read().await.default_language.clone(),
        }
    }

    fn items_added(&self, ids: Vec<ItemId>) {
        self.grow_running_total(ids.len());
        self.emit_event(Event::ItemsAdded { ids });
    }

    /// New pending work joins the tracked run, running or paused
    fn grow_running_total(&self, n: usize) {
        match self.state() {
            BatchState::Running => {
                self.tracker.add_to_total(n);
                self.nudge();
            }
            BatchState::Paused => self.tracker.add_to_total(n),
            _ => {}
        }
    }

    /// Snapshot of every item in order
    pub async fn items(&self) -> Vec<WorkItem> {
        self.store.list_all().await
    }

    /// Snapshot of one item
    pub async fn item(&self, id: ItemId) -> Option<WorkItem> {
        self.store.find(id).await
    }

    /// 1-based position of an item
    pub async fn position(&self, id: ItemId) -> Option<usize> {
        self.store.position(id).await
    }

    /// Items with `status`, in order
    pub async fn items_with_status(&self, status: ItemStatus) -> Vec<WorkItem> {
        self.store.list_by_status(status).await
    }

    /// Per-status counts
    pub async fn counts(&self) -> StatusCounts {
        self.store.counts().await
    }

    /// Progress of the current run
    pub fn progress(&self) -> ProgressSummary {
        self.tracker.summary()
    }

    async fn refused(&self, id: ItemId, operation: &str) -> Error {
        match self.store.find(id).await {
            None => Error::NotFound(id),
            Some(item) => Error::InvalidState {
                operation: operation.to_string(),
                state: format!("item {id} is {:?}", item.status).to_lowercase(),
            },
        }
    }

    /// Return a failed item to `Pending` for another attempt
    pub async fn retry_item(&self, id: ItemId) -> Result<()> {
        if !self.store.reset_for_retry(id).await {
            return Err(self.refused(id, "retry").await);
        }
        self.requeued_for_retry(id);
        Ok(())
    }

    /// Change a failed item's prompt and/or language, then retry it
    ///
    /// The edit and the reset happen together or not at all.
    pub async fn edit_and_retry(
        &self,
        id: ItemId,
        text: Option<&str>,
        language: Option<&str>,
    ) -> Result<()> {
        if matches!(text.map(str::trim), Some("")) {
            return Err(Error::InvalidState {
                operation: "edit".to_string(),
                state: "prompt text is blank".to_string(),
            });
        }
        if !self.store.edit_for_retry(id, text, language).await {
            return Err(self.refused(id, "edit").await);
        }
        self.requeued_for_retry(id);
        Ok(())
    }

    fn requeued_for_retry(&self, id: ItemId) {
        tracing::info!(item_id = %id, "item queued for retry");
        self.emit_event(Event::ItemRequeued { id });
        self.grow_running_total(1);
    }

    /// Retry every failed item; returns how many were requeued
    pub async fn retry_failed(&self) -> usize {
        let failed = self.store.list_by_status(ItemStatus::Failed).await;
        let mut requeued = 0;
        for item in failed {
            if self.retry_item(item.id).await.is_ok() {
                requeued += 1;
            }
        }
        requeued
    }

    /// Remove an item that is not being processed
    ///
    /// A pending item removed from a running or paused batch leaves the
    /// progress total; a running batch re-checks for completion.
    pub async fn remove_item(&self, id: ItemId) -> Result<()> {
        let was_pending = self
            .store
            .find(id)
            .await
            .is_some_and(|item| item.status == ItemStatus::Pending);
        if !self.store.remove(id).await {
            return Err(self.refused(id, "remove").await);
        }
        self.emit_event(Event::ItemRemoved { id });
        match self.state() {
            BatchState::Running | BatchState::Paused if was_pending => {
                self.tracker.remove_from_total(1);
            }
            _ => {}
        }
        if self.state() == BatchState::Running {
            self.nudge();
        }
        Ok(())
    }

    /// Remove every item
    ///
    /// Refused while any item is processing or a worker is still registered.
    pub async fn clear(&self) -> Result<usize> {
        if self.pool.outstanding() > 0 {
            return Err(Error::InvalidState {
                operation: "clear".to_string(),
                state: format!("{} workers outstanding", self.pool.outstanding()),
            });
        }
        let removed = self.store.clear_all().await?;
        tracing::info!(removed, "store cleared");
        Ok(removed)
    }

    /// Download every completed artifact into `folder`
    pub async fn download_completed(&self, folder: &Path) -> DownloadReport {
        let items = self.store.list_all().await;
        let report = artifacts::download_completed(&items, folder).await;
        for (id, path) in &report.saved {
            self.emit_event(Event::ArtifactSaved {
                id: *id,
                path: path.clone(),
            });
        }
        report
    }

    /// Package every completed artifact into a ZIP archive at `dest`
    pub async fn export_zip(&self, dest: &Path) -> Result<usize> {
        let items = self.store.list_all().await;
        artifacts::package_zip(&items, dest).await
    }
}
