//! Trait definitions for item processors

use crate::config::{BatchConfig, RetryConfig};
use crate::types::WorkItem;
use async_trait::async_trait;
use std::time::Duration;

/// Per-call knobs read from the live configuration when an item is submitted
#[derive(Clone, Debug)]
pub struct ProcessSettings {
    /// Timeout for a single provider request
    pub request_timeout: Duration,
    /// Automatic retries for transient failures
    pub max_attempt_retries: u32,
    /// Backoff shape for those retries
    pub retry: RetryConfig,
}

impl ProcessSettings {
    /// Settings derived from a batch configuration
    pub fn from_config(config: &BatchConfig) -> Self {
        Self {
            request_timeout: config.request_timeout,
            max_attempt_retries: config.max_attempt_retries,
            retry: config.retry.clone(),
        }
    }

    /// Retry policy with the attempt limit applied
    pub fn retry_policy(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_attempt_retries,
            ..self.retry.clone()
        }
    }
}

impl Default for ProcessSettings {
    fn default() -> Self {
        Self::from_config(&BatchConfig::default())
    }
}

/// One unit of work handed to a processor
#[derive(Clone, Debug)]
pub struct Job {
    /// Snapshot of the item taken when it was claimed
    pub item: WorkItem,
    /// Effective reference image: the item's own, else the chained frame,
    /// else the batch-level reference
    pub reference_image: Option<String>,
    /// Per-call settings
    pub settings: ProcessSettings,
}

impl Job {
    /// Prompt text
    pub fn prompt(&self) -> &str {
        &self.item.prompt.text
    }

    /// Provider-side language tag
    pub fn language(&self) -> &str {
        &self.item.language
    }
}

/// Generates the artifact for one work item
///
/// Implementations retry transient failures internally (see
/// [`with_retry`](crate::retry::with_retry)) and return the artifact reference,
/// a URL or local path. Errors and panics are caught by the worker pool and
/// recorded on the item.
#[async_trait]
pub trait ItemProcessor: Send + Sync {
    /// Process one job, returning the artifact reference
    async fn process(&self, job: &Job) -> crate::Result<String>;

    /// Short name used in logs
    fn name(&self) -> &str {
        "processor"
    }
}
