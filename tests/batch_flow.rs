//! End-to-end batch flows through the public API

mod common;

use async_trait::async_trait;
use common::{WaitResult, assert_state_within, collect_events_until, fast_config, wait_for_completion};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use vidgen_batch::{
    BatchConfig, BatchRunner, BatchState, Event, ItemProcessor, ItemStatus, Job, PauseReason,
    ReferenceDeriver, WorkItem,
};

/// Succeeds unless the prompt contains "fail"
#[derive(Default)]
struct EchoProcessor {
    calls: AtomicUsize,
}

#[async_trait]
impl ItemProcessor for EchoProcessor {
    async fn process(&self, job: &Job) -> vidgen_batch::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(10)).await;
        if job.prompt().contains("fail") {
            return Err(vidgen_batch::Error::Other(format!("cannot render {}", job.prompt())));
        }
        let reference = job.reference_image.as_deref().unwrap_or("none");
        Ok(format!("https://cdn.test/{}.mp4?ref={reference}", job.item.id))
    }
}

struct LastFrame;

#[async_trait]
impl ReferenceDeriver for LastFrame {
    async fn derive(&self, item: &WorkItem, _artifact: &str) -> vidgen_batch::Result<String> {
        Ok(format!("last-{}.png", item.id))
    }
}

#[tokio::test]
async fn bulk_import_runs_to_completion() {
    let processor = Arc::new(EchoProcessor::default());
    let runner = BatchRunner::new(fast_config(), processor.clone()).unwrap();

    let raw = r#"{"prompt": "city at dusk"} {"text": "forest rain", "image": "leaf.png"} {"input": "ocean"}"#;
    assert_eq!(runner.add_many(raw).await, 3);

    let mut events = runner.subscribe();
    runner.start().await.unwrap();
    let WaitResult::Completed(summary) =
        wait_for_completion(&mut events, Duration::from_secs(5)).await
    else {
        panic!("batch did not complete");
    };

    assert_eq!(summary.total, 3);
    assert_eq!(summary.completed, 3);
    assert_eq!(summary.percentage, 100.0);
    assert_eq!(processor.calls.load(Ordering::SeqCst), 3);

    let items = runner.items().await;
    assert!(items[1].artifact.as_deref().unwrap().ends_with("ref=leaf.png"));
}

#[tokio::test]
async fn sequential_chain_pauses_on_failure_and_recovers_after_edit() {
    let config = BatchConfig {
        sequential_mode: true,
        ..fast_config()
    };
    let runner =
        BatchRunner::with_deriver(config, Arc::new(EchoProcessor::default()), Arc::new(LastFrame))
            .unwrap();
    runner.add_many("opening shot\nplease fail here\nclosing shot").await;
    let ids: Vec<_> = runner.items().await.iter().map(|i| i.id).collect();

    let mut events = runner.subscribe();
    runner.start().await.unwrap();
    let collected = collect_events_until(&mut events, Duration::from_secs(5), |e| {
        matches!(e, Event::BatchPaused { .. })
    })
    .await;
    assert!(collected.iter().any(|e| matches!(
        e,
        Event::BatchPaused { reason: PauseReason::SequenceFailure { id, .. } } if *id == ids[1]
    )));
    assert_eq!(runner.item(ids[2]).await.unwrap().status, ItemStatus::Pending);

    runner
        .edit_and_retry(ids[1], Some("middle shot"), None)
        .await
        .unwrap();
    runner.resume().unwrap();
    assert_state_within(&runner, BatchState::Completed, Duration::from_secs(5)).await;

    let items = runner.items().await;
    assert!(items.iter().all(|i| i.status == ItemStatus::Completed));
    let last = items[2].artifact.as_deref().unwrap();
    assert!(last.ends_with(&format!("ref=last-{}.png", ids[1])), "got {last}");
}

#[tokio::test]
async fn progress_reports_eta_while_running() {
    let runner = BatchRunner::new(
        BatchConfig {
            max_concurrency: 1,
            ..fast_config()
        },
        Arc::new(EchoProcessor::default()),
    )
    .unwrap();
    runner.add_many("a\nb\nc\nd").await;

    let mut events = runner.subscribe();
    runner.start().await.unwrap();
    let collected = collect_events_until(&mut events, Duration::from_secs(5), |e| {
        matches!(e, Event::Progress(p) if p.completed == 1)
    })
    .await;

    let Some(Event::Progress(first)) = collected.last() else {
        panic!("no progress event");
    };
    assert_eq!(first.total, 4);
    assert_eq!(first.percentage, 25.0);
    assert!(first.eta.is_some());
    assert!(first.average_duration.is_some());

    assert_state_within(&runner, BatchState::Completed, Duration::from_secs(5)).await;
    assert_eq!(runner.progress().eta, Some(Duration::ZERO));
}
