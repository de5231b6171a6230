//! Waiting and collection helpers for batch tests

use std::time::Duration;
use tokio::sync::broadcast;
use vidgen_batch::{BatchRunner, BatchState, Event, ProgressSummary};

/// Result of waiting for a batch to finish
#[derive(Debug)]
pub enum WaitResult {
    /// Batch completed
    Completed(ProgressSummary),
    /// Batch paused before finishing
    Paused,
    /// Timeout waiting for completion
    Timeout,
    /// Channel closed unexpectedly
    ChannelClosed,
}

/// Wait for `BatchCompleted` or `BatchPaused` on an existing subscription
///
/// Subscribe before calling `start` so no event is missed.
pub async fn wait_for_completion(
    events: &mut broadcast::Receiver<Event>,
    timeout: Duration,
) -> WaitResult {
    let result = tokio::time::timeout(timeout, async {
        loop {
            match events.recv().await {
                Ok(Event::BatchCompleted { summary }) => return WaitResult::Completed(summary),
                Ok(Event::BatchPaused { .. }) => return WaitResult::Paused,
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return WaitResult::ChannelClosed,
            }
        }
    })
    .await;

    result.unwrap_or(WaitResult::Timeout)
}

/// Collect events until timeout or predicate is satisfied
pub async fn collect_events_until<F>(
    events: &mut broadcast::Receiver<Event>,
    timeout: Duration,
    stop_predicate: F,
) -> Vec<Event>
where
    F: Fn(&Event) -> bool,
{
    let mut collected = Vec::new();

    let _ = tokio::time::timeout(timeout, async {
        while let Ok(event) = events.recv().await {
            let should_stop = stop_predicate(&event);
            collected.push(event);
            if should_stop {
                break;
            }
        }
    })
    .await;

    collected
}

/// Assert the runner reaches `state` within `timeout`
pub async fn assert_state_within(runner: &BatchRunner, state: BatchState, timeout: Duration) {
    let deadline = tokio::time::Instant::now() + timeout;
    while runner.state() != state {
        assert!(
            tokio::time::Instant::now() < deadline,
            "batch is {:?}, expected {:?}",
            runner.state(),
            state
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
