//! # vidgen-batch
//!
//! Bounded-concurrency batch orchestration for video-generation prompts.
//!
//! A [`BatchRunner`] holds an ordered list of prompts and feeds them to an
//! [`ItemProcessor`] through a resizable worker pool. It paces submissions,
//! tracks progress and ETA, supports pause/resume/stop and runtime changes to
//! concurrency, delay and retry count, and offers a strict sequential mode in
//! which each finished video can hand its last frame to the next prompt.
//!
//! ## Design
//!
//! - **Library-first** - no UI; callers read snapshots and subscribe to events
//! - **Opaque processing** - providers plug in behind one async trait
//! - **In memory** - nothing is persisted between runs
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use vidgen_batch::{BatchConfig, BatchRunner, Event};
//! use vidgen_batch::processor::WebhookProcessor;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = BatchConfig {
//!         max_concurrency: 3,
//!         ..Default::default()
//!     };
//!     let processor = WebhookProcessor::new("https://hooks.example/generate")?;
//!     let runner = BatchRunner::new(config, Arc::new(processor))?;
//!
//!     runner.add_many("a lighthouse in a storm\na desert at dawn\n").await;
//!
//!     let mut events = runner.subscribe();
//!     runner.start().await?;
//!     while let Ok(event) = events.recv().await {
//!         if let Event::BatchCompleted { summary } = event {
//!             println!("{} done, {} failed", summary.completed, summary.failed);
//!             break;
//!         }
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Artifact retrieval, downloads and ZIP packaging
pub mod artifacts;
/// Batch runner (decomposed into focused submodules)
pub mod batch;
/// Frame chaining for sequential batches
pub mod chain;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Bulk prompt import
pub mod import;
/// Bounded-concurrency worker pool
pub mod pool;
/// Item processing contract
pub mod processor;
/// Progress tracking and ETA
pub mod progress;
/// Retry logic with exponential backoff
pub mod retry;
/// Work item store
pub mod store;
/// Core types and events
pub mod types;

#[cfg(test)]
pub(crate) mod test_helpers;

// Re-export commonly used types
pub use batch::BatchRunner;
pub use chain::{FfmpegFrameExtractor, ReferenceDeriver};
pub use config::{ArtifactConfig, BatchConfig, ConfigUpdate, RetryConfig};
pub use error::{Error, Result};
pub use processor::{ItemProcessor, Job, ProcessSettings, WebhookProcessor};
pub use types::{
    BatchState, Event, ItemId, ItemOutcome, ItemStatus, PauseReason, ProgressSummary,
    PromptPayload, StatusCounts, WorkItem,
};

/// Wait for a termination signal, then shut the runner down
///
/// Listens for SIGTERM and SIGINT on Unix and for Ctrl+C elsewhere.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use vidgen_batch::{BatchConfig, BatchRunner, WebhookProcessor, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let processor = Arc::new(WebhookProcessor::new("https://hooks.example/generate")?);
///     let runner = BatchRunner::new(BatchConfig::default(), processor)?;
///     runner.start().await?;
///
///     run_with_shutdown(runner).await?;
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(runner: BatchRunner) -> Result<()> {
    wait_for_signal().await;
    runner.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("received SIGTERM"),
                _ = sigint.recv() => tracing::info!("received SIGINT"),
            }
        }
        (Err(e), _) | (_, Err(e)) => {
            tracing::warn!(error = %e, "could not register signal handlers, falling back to ctrl_c");
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for Ctrl+C");
    }
}
