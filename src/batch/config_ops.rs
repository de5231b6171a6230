//! Runtime configuration updates.

use super::BatchRunner;
use crate::config::{
    BatchConfig, ConfigUpdate, validate_attempt_retries, validate_concurrency, validate_delay_secs,
};
use crate::error::Result;
use crate::types::Event;

impl BatchRunner {
    /// Snapshot of the live configuration
    pub async fn config(&self) -> BatchConfig {
        self.config.read().await.clone()
    }

    /// Change the worker capacity (1..=10)
    ///
    /// In sequential mode the value is stored and takes effect once
    /// sequential mode is switched off. Running work is never interrupted.
    pub async fn set_concurrency(&self, max_concurrency: usize) -> Result<()> {
        validate_concurrency(max_concurrency)?;
        self.update_config(ConfigUpdate {
            max_concurrency: Some(max_concurrency),
            ..Default::default()
        })
        .await
    }

    /// Change the pause between dispatches, in seconds
    pub async fn set_delay(&self, seconds: f64) -> Result<()> {
        validate_delay_secs(seconds)?;
        self.update_config(ConfigUpdate {
            inter_submission_delay: Some(seconds),
            ..Default::default()
        })
        .await
    }

    /// Change the number of automatic retries per processing call (0..=10)
    ///
    /// Applies to items dispatched from now on.
    pub async fn set_max_retries(&self, retries: u32) -> Result<()> {
        validate_attempt_retries(retries)?;
        self.update_config(ConfigUpdate {
            max_attempt_retries: Some(retries),
            ..Default::default()
        })
        .await
    }

    /// Switch strict ordering with fail-fast on or off
    pub async fn set_sequential_mode(&self, enabled: bool) -> Result<()> {
        self.update_config(ConfigUpdate {
            sequential_mode: Some(enabled),
            ..Default::default()
        })
        .await
    }

    /// Apply several runtime changes at once
    ///
    /// The update is validated as a whole; on error nothing changes.
    pub async fn update_config(&self, update: ConfigUpdate) -> Result<()> {
        let (before, after) = {
            let mut config = self.config.write().await;
            let before = config.effective_concurrency();
            config.apply(&update)?;
            (before, config.effective_concurrency())
        };

        if before != after {
            self.pool.set_capacity(after)?;
            self.emit_event(Event::ConcurrencyChanged {
                max_concurrency: after,
            });
        }
        tracing::info!(update = ?update, "configuration updated");
        self.nudge();
        Ok(())
    }
}
