//! BatchRunner behaviour tests, grouped by concern.

mod sequential;

use super::BatchRunner;
use crate::chain::ReferenceDeriver;
use crate::config::BatchConfig;
use crate::error::{Error, Result};
use crate::test_helpers::ScriptedProcessor;
use crate::types::{BatchState, Event, ItemId, WorkItem};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// No pacing and a fast timer so tests finish quickly
fn fast_config() -> BatchConfig {
    BatchConfig {
        inter_submission_delay: Duration::ZERO,
        tick_interval: Duration::from_millis(20),
        stop_timeout: Duration::from_secs(2),
        ..Default::default()
    }
}

fn runner(config: BatchConfig, processor: &ScriptedProcessor) -> BatchRunner {
    BatchRunner::new(config, Arc::new(processor.clone())).unwrap()
}

/// Poll until the batch reaches `state`, failing after five seconds
async fn wait_for_state(runner: &BatchRunner, state: BatchState) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while runner.state() != state {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {state:?}, batch is {:?}",
            runner.state()
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Collect every event already buffered for `rx`
fn drain(rx: &mut broadcast::Receiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Deriver that names the frame after the source item
#[derive(Clone, Default)]
struct StubDeriver {
    fail: bool,
}

#[async_trait]
impl ReferenceDeriver for StubDeriver {
    async fn derive(&self, item: &WorkItem, _artifact: &str) -> Result<String> {
        tokio::time::sleep(Duration::from_millis(10)).await;
        if self.fail {
            return Err(Error::ExternalTool("ffmpeg busy".to_string()));
        }
        Ok(format!("frame-of-{}.png", item.id))
    }
}
