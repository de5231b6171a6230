//! Shared test doubles for processors and jobs.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use crate::error::{Error, Result};
use crate::processor::{ItemProcessor, Job, ProcessSettings};
use crate::types::{ItemId, PromptPayload, WorkItem};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Job for a freshly claimed item with prompt `prompt {id}`
pub(crate) fn job_for(id: u64) -> Job {
    let mut item = WorkItem::new(
        ItemId(id),
        PromptPayload::new(format!("prompt {id}")),
        "pt".to_string(),
    );
    item.dispatch_count = 1;
    Job {
        item,
        reference_image: None,
        settings: ProcessSettings::default(),
    }
}

/// One processor call as seen by [`ScriptedProcessor`]
#[derive(Clone, Debug)]
pub(crate) struct Call {
    pub id: ItemId,
    pub prompt: String,
    pub reference: Option<String>,
    pub at: std::time::Instant,
}

/// Sleeps for a fixed time, fails on selected prompts and records every call
/// together with the highest concurrency it observed
#[derive(Clone)]
pub(crate) struct ScriptedProcessor {
    delay: Duration,
    failing: Arc<Mutex<HashSet<String>>>,
    calls: Arc<Mutex<Vec<Call>>>,
    current: Arc<AtomicUsize>,
    max_seen: Arc<AtomicUsize>,
}

impl ScriptedProcessor {
    pub(crate) fn new(delay: Duration) -> Self {
        Self {
            delay,
            failing: Arc::new(Mutex::new(HashSet::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
            current: Arc::new(AtomicUsize::new(0)),
            max_seen: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Fail every call whose prompt equals `prompt`
    pub(crate) fn failing(self, prompt: &str) -> Self {
        self.failing.lock().unwrap().insert(prompt.to_string());
        self
    }

    /// Stop failing `prompt`
    pub(crate) fn heal(&self, prompt: &str) {
        self.failing.lock().unwrap().remove(prompt);
    }

    pub(crate) fn max_seen(&self) -> usize {
        self.max_seen.load(Ordering::SeqCst)
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ItemProcessor for ScriptedProcessor {
    async fn process(&self, job: &Job) -> Result<String> {
        self.calls.lock().unwrap().push(Call {
            id: job.item.id,
            prompt: job.prompt().to_string(),
            reference: job.reference_image.clone(),
            at: std::time::Instant::now(),
        });
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_seen.fetch_max(now, Ordering::SeqCst);

        tokio::time::sleep(self.delay).await;

        self.current.fetch_sub(1, Ordering::SeqCst);
        if self.failing.lock().unwrap().contains(job.prompt()) {
            return Err(Error::Http {
                status: 500,
                body: format!("generation failed for {}", job.item.id),
            });
        }
        Ok(format!("https://cdn.test/videos/{}.mp4", job.item.id))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Processor backed by a synchronous closure
pub(crate) struct FnProcessor<F> {
    f: F,
}

impl<F> FnProcessor<F>
where
    F: Fn(&Job) -> Result<String> + Send + Sync,
{
    pub(crate) fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F> ItemProcessor for FnProcessor<F>
where
    F: Fn(&Job) -> Result<String> + Send + Sync,
{
    async fn process(&self, job: &Job) -> Result<String> {
        tokio::task::yield_now().await;
        (self.f)(job)
    }
}
