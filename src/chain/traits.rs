//! Trait definitions for reference derivation

use crate::types::WorkItem;
use async_trait::async_trait;

/// Turns a finished item's artifact into a reference for the next item
#[async_trait]
pub trait ReferenceDeriver: Send + Sync {
    /// Derive a reference (path or URL) from `artifact`, produced by `item`
    async fn derive(&self, item: &WorkItem, artifact: &str) -> crate::Result<String>;
}
