//! Item processing contract
//!
//! The batch core treats "generate one video" as an opaque async call behind
//! the [`ItemProcessor`] trait. Provider integrations implement it; the crate
//! ships one generic implementation:
//!
//! - [`WebhookProcessor`]: POSTs the prompt as JSON to a configurable endpoint
//!   and reads the artifact URL from the response
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use vidgen_batch::{BatchConfig, BatchRunner};
//! use vidgen_batch::processor::WebhookProcessor;
//!
//! # async fn example() -> vidgen_batch::Result<()> {
//! let processor = WebhookProcessor::new("https://hooks.example/generate")?
//!     .with_bearer_token("secret");
//! let runner = BatchRunner::new(BatchConfig::default(), Arc::new(processor))?;
//! runner.add_many("a fox in the snow\na city at night").await;
//! runner.start().await?;
//! # Ok(())
//! # }
//! ```

mod traits;
mod webhook;

pub use traits::{ItemProcessor, Job, ProcessSettings};
pub use webhook::WebhookProcessor;
