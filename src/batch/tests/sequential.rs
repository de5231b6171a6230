use super::*;
use crate::types::{ItemStatus, PauseReason};

fn sequential_config() -> BatchConfig {
    BatchConfig {
        sequential_mode: true,
        max_concurrency: 4,
        ..fast_config()
    }
}

#[tokio::test]
async fn failure_pauses_and_leaves_rest_pending() {
    let processor = ScriptedProcessor::new(Duration::from_millis(10)).failing("one");
    let runner = runner(sequential_config(), &processor);
    let mut events = runner.subscribe();
    runner.add_many("one\ntwo\nthree").await;

    runner.start().await.unwrap();
    wait_for_state(&runner, BatchState::Paused).await;
    tokio::time::sleep(Duration::from_millis(60)).await;

    assert_eq!(processor.calls().len(), 1);
    let items = runner.items().await;
    assert_eq!(items[0].status, ItemStatus::Failed);
    assert_eq!(items[1].status, ItemStatus::Pending);
    assert_eq!(items[2].status, ItemStatus::Pending);

    let paused = drain(&mut events).into_iter().find_map(|e| match e {
        Event::BatchPaused { reason } => Some(reason),
        _ => None,
    });
    assert!(matches!(
        paused,
        Some(PauseReason::SequenceFailure { id, .. }) if id == items[0].id
    ));
}

#[tokio::test]
async fn resuming_past_a_failure_blocks_again() {
    let processor = ScriptedProcessor::new(Duration::from_millis(10)).failing("one");
    let runner = runner(sequential_config(), &processor);
    runner.add_many("one\ntwo").await;

    runner.start().await.unwrap();
    wait_for_state(&runner, BatchState::Paused).await;

    let mut events = runner.subscribe();
    runner.resume().unwrap();
    wait_for_state(&runner, BatchState::Paused).await;
    tokio::time::sleep(Duration::from_millis(40)).await;

    assert_eq!(processor.calls().len(), 1);
    let items = runner.items().await;
    assert!(drain(&mut events).iter().any(|e| matches!(
        e,
        Event::SequenceBlocked { blocked_by, next } if *blocked_by == items[0].id && *next == items[1].id
    )));
}

#[tokio::test]
async fn retrying_the_failed_item_continues_the_chain() {
    let processor = ScriptedProcessor::new(Duration::from_millis(10)).failing("one");
    let runner = runner(sequential_config(), &processor);
    runner.add_many("one\ntwo\nthree").await;

    runner.start().await.unwrap();
    wait_for_state(&runner, BatchState::Paused).await;

    processor.heal("one");
    assert_eq!(runner.retry_failed().await, 1);
    runner.resume().unwrap();
    wait_for_state(&runner, BatchState::Completed).await;

    let prompts: Vec<_> = processor.calls().into_iter().map(|c| c.prompt).collect();
    assert_eq!(prompts, ["one", "one", "two", "three"]);
    assert_eq!(runner.counts().await.completed, 3);

    // The earlier failure stays counted, so the retry grows the total
    let progress = runner.progress();
    assert_eq!(progress.total, 4);
    assert_eq!(progress.completed, 3);
    assert_eq!(progress.failed, 1);
    assert_eq!(progress.percentage, 100.0);
}

#[tokio::test]
async fn edit_while_paused_keeps_progress_within_bounds() {
    let processor = ScriptedProcessor::new(Duration::from_millis(10)).failing("one");
    let runner = runner(sequential_config(), &processor);
    let first = runner.add("one").await.unwrap();
    runner.add("two").await.unwrap();

    runner.start().await.unwrap();
    wait_for_state(&runner, BatchState::Paused).await;

    runner
        .edit_and_retry(first, Some("one, fixed"), None)
        .await
        .unwrap();
    runner.add("three").await.unwrap();
    runner.resume().unwrap();
    wait_for_state(&runner, BatchState::Completed).await;

    let progress = runner.progress();
    assert_eq!(progress.total, 4);
    assert_eq!(progress.remaining, 0);
    assert!(progress.percentage <= 100.0);
}

#[tokio::test]
async fn last_frames_chain_into_the_next_item() {
    let processor = ScriptedProcessor::new(Duration::from_millis(5));
    let runner = BatchRunner::with_deriver(
        sequential_config(),
        Arc::new(processor.clone()),
        Arc::new(StubDeriver::default()),
    )
    .unwrap();
    let mut events = runner.subscribe();
    let ids = [
        runner.add("dawn").await.unwrap(),
        runner.add("noon").await.unwrap(),
        runner.add("dusk").await.unwrap(),
    ];

    runner.start().await.unwrap();
    wait_for_state(&runner, BatchState::Completed).await;

    let references: Vec<_> = processor.calls().into_iter().map(|c| c.reference).collect();
    assert_eq!(
        references,
        [
            None,
            Some(format!("frame-of-{}.png", ids[0])),
            Some(format!("frame-of-{}.png", ids[1])),
        ]
    );
    assert!(drain(&mut events).iter().any(|e| matches!(
        e,
        Event::ChainReferenceUpdated { source, .. } if *source == ids[0]
    )));
}

#[tokio::test]
async fn item_reference_overrides_chained_frame() {
    let processor = ScriptedProcessor::new(Duration::from_millis(5));
    let runner = BatchRunner::with_deriver(
        sequential_config(),
        Arc::new(processor.clone()),
        Arc::new(StubDeriver::default()),
    )
    .unwrap();
    let first = runner.add("dawn").await.unwrap();
    runner
        .add_prompt(
            crate::types::PromptPayload::new("noon").with_reference("custom.png"),
            None,
        )
        .await
        .unwrap();

    runner.start().await.unwrap();
    wait_for_state(&runner, BatchState::Completed).await;

    let calls = processor.calls();
    assert_eq!(calls[0].id, first);
    assert_eq!(calls[1].reference.as_deref(), Some("custom.png"));
}

#[tokio::test]
async fn failed_derivation_keeps_previous_reference() {
    let processor = ScriptedProcessor::new(Duration::from_millis(5));
    let config = BatchConfig {
        reference_image: Some("seed.png".to_string()),
        ..sequential_config()
    };
    let runner = BatchRunner::with_deriver(
        config,
        Arc::new(processor.clone()),
        Arc::new(StubDeriver { fail: true }),
    )
    .unwrap();
    runner.add_many("dawn\nnoon").await;

    runner.start().await.unwrap();
    wait_for_state(&runner, BatchState::Completed).await;

    let references: Vec<_> = processor.calls().into_iter().map(|c| c.reference).collect();
    assert_eq!(
        references,
        [Some("seed.png".to_string()), Some("seed.png".to_string())]
    );
}

#[tokio::test]
async fn chaining_is_skipped_when_disabled() {
    let processor = ScriptedProcessor::new(Duration::from_millis(5));
    let config = BatchConfig {
        chain_frames: false,
        ..sequential_config()
    };
    let runner = BatchRunner::with_deriver(
        config,
        Arc::new(processor.clone()),
        Arc::new(StubDeriver::default()),
    )
    .unwrap();
    runner.add_many("dawn\nnoon").await;

    runner.start().await.unwrap();
    wait_for_state(&runner, BatchState::Completed).await;

    assert!(processor.calls().iter().all(|c| c.reference.is_none()));
}
