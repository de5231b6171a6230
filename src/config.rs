//! Configuration types for vidgen-batch

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// Upper bound for worker pool capacity
pub const MAX_CONCURRENCY: usize = 10;

/// Upper bound for per-item attempt retries
pub const MAX_ATTEMPT_RETRIES: u32 = 10;

/// Upper bound for the item cap
pub const MAX_ITEM_CAP: usize = 100;

/// Main configuration for a [`BatchRunner`](crate::batch::BatchRunner)
///
/// Every field has a default, so `{}` is a valid JSON configuration.
/// The knobs in [`ConfigUpdate`] can be changed while a batch is running.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Maximum concurrently running items (1..=10, default: 2)
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Language used when the caller does not give one (default: "pt")
    #[serde(default = "default_language")]
    pub default_language: String,

    /// Pause between successive dispatches, in seconds (default: 0.5)
    ///
    /// Applied after every completion, and between submissions of one tick.
    #[serde(default = "default_submission_delay", with = "secs_f64_serde")]
    pub inter_submission_delay: Duration,

    /// Per-request timeout handed to processors (default: 300 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,

    /// Automatic retries inside a single processing call (0..=10, default: 2)
    #[serde(default = "default_attempt_retries")]
    pub max_attempt_retries: u32,

    /// Strict order, concurrency 1, fail-fast (default: false)
    #[serde(default)]
    pub sequential_mode: bool,

    /// Maximum number of items held by the store (1..=100, default: 50)
    #[serde(default = "default_item_cap")]
    pub item_cap: usize,

    /// In sequential mode, derive a reference frame from each finished video
    /// and hand it to the next item (default: true)
    #[serde(default = "default_true")]
    pub chain_frames: bool,

    /// Batch-level reference image used when an item has none of its own
    #[serde(default)]
    pub reference_image: Option<String>,

    /// Period of the dispatch timer, in milliseconds (default: 500)
    #[serde(default = "default_tick_interval", with = "millis_serde")]
    pub tick_interval: Duration,

    /// How long `stop` waits for running workers (default: 5 seconds)
    #[serde(default = "default_stop_timeout", with = "duration_serde")]
    pub stop_timeout: Duration,

    /// Backoff settings for retries inside processors
    #[serde(default)]
    pub retry: RetryConfig,

    /// Local artifact handling
    #[serde(default)]
    pub artifacts: ArtifactConfig,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            default_language: default_language(),
            inter_submission_delay: default_submission_delay(),
            request_timeout: default_request_timeout(),
            max_attempt_retries: default_attempt_retries(),
            sequential_mode: false,
            item_cap: default_item_cap(),
            chain_frames: true,
            reference_image: None,
            tick_interval: default_tick_interval(),
            stop_timeout: default_stop_timeout(),
            retry: RetryConfig::default(),
            artifacts: ArtifactConfig::default(),
        }
    }
}

impl BatchConfig {
    /// Parse a JSON configuration and validate it
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read a JSON configuration file and validate it
    pub fn from_json_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&raw)
    }

    /// Check every knob against its allowed range
    pub fn validate(&self) -> Result<()> {
        validate_concurrency(self.max_concurrency)?;
        validate_attempt_retries(self.max_attempt_retries)?;
        if self.item_cap == 0 || self.item_cap > MAX_ITEM_CAP {
            return Err(Error::config(
                "item_cap",
                format!("must be between 1 and {MAX_ITEM_CAP}"),
            ));
        }
        if self.tick_interval.is_zero() {
            return Err(Error::config("tick_interval", "must be greater than zero"));
        }
        if self.retry.backoff_multiplier < 1.0 {
            return Err(Error::config(
                "retry.backoff_multiplier",
                "must be at least 1.0",
            ));
        }
        Ok(())
    }

    /// Effective worker capacity: sequential mode clamps it to 1
    pub fn effective_concurrency(&self) -> usize {
        if self.sequential_mode {
            1
        } else {
            self.max_concurrency
        }
    }

    /// Apply a runtime update after validating it; on error nothing changes
    pub fn apply(&mut self, update: &ConfigUpdate) -> Result<()> {
        if let Some(n) = update.max_concurrency {
            validate_concurrency(n)?;
        }
        if let Some(n) = update.max_attempt_retries {
            validate_attempt_retries(n)?;
        }
        let delay = update
            .inter_submission_delay
            .map(validate_delay_secs)
            .transpose()?;

        if let Some(n) = update.max_concurrency {
            self.max_concurrency = n;
        }
        if let Some(n) = update.max_attempt_retries {
            self.max_attempt_retries = n;
        }
        if let Some(d) = delay {
            self.inter_submission_delay = d;
        }
        if let Some(t) = update.request_timeout {
            self.request_timeout = t;
        }
        if let Some(s) = update.sequential_mode {
            self.sequential_mode = s;
        }
        if let Some(c) = update.chain_frames {
            self.chain_frames = c;
        }
        Ok(())
    }
}

pub(crate) fn validate_concurrency(n: usize) -> Result<()> {
    if n == 0 || n > MAX_CONCURRENCY {
        return Err(Error::config(
            "max_concurrency",
            format!("must be between 1 and {MAX_CONCURRENCY}, got {n}"),
        ));
    }
    Ok(())
}

pub(crate) fn validate_attempt_retries(n: u32) -> Result<()> {
    if n > MAX_ATTEMPT_RETRIES {
        return Err(Error::config(
            "max_attempt_retries",
            format!("must be between 0 and {MAX_ATTEMPT_RETRIES}, got {n}"),
        ));
    }
    Ok(())
}

pub(crate) fn validate_delay_secs(secs: f64) -> Result<Duration> {
    if !secs.is_finite() || secs < 0.0 {
        return Err(Error::config(
            "inter_submission_delay",
            format!("must be a non-negative number of seconds, got {secs}"),
        ));
    }
    Ok(Duration::from_secs_f64(secs))
}

/// Retry configuration for transient failures inside processors
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 2)
    #[serde(default = "default_attempt_retries")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 2 seconds)
    #[serde(default = "default_initial_delay", with = "secs_f64_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 30 seconds)
    #[serde(default = "default_max_delay", with = "secs_f64_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_attempt_retries(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// Local artifact handling
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ArtifactConfig {
    /// Download each artifact as soon as its item completes (default: false)
    #[serde(default)]
    pub auto_download: bool,

    /// Destination folder for downloads (default: "./batch_videos")
    #[serde(default = "default_download_folder")]
    pub download_folder: PathBuf,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            auto_download: false,
            download_folder: default_download_folder(),
        }
    }
}

/// Configuration update for runtime-changeable settings
///
/// `None` leaves the field untouched.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ConfigUpdate {
    /// New worker capacity (1..=10)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrency: Option<usize>,
    /// New inter-submission delay in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inter_submission_delay: Option<f64>,
    /// New per-call retry limit (0..=10)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempt_retries: Option<u32>,
    /// New request timeout
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout: Option<Duration>,
    /// Toggle sequential mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequential_mode: Option<bool>,
    /// Toggle frame chaining
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_frames: Option<bool>,
}

fn default_max_concurrency() -> usize {
    2
}

fn default_language() -> String {
    "pt".to_string()
}

fn default_submission_delay() -> Duration {
    Duration::from_millis(500)
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(300)
}

fn default_attempt_retries() -> u32 {
    2
}

fn default_item_cap() -> usize {
    50
}

fn default_true() -> bool {
    true
}

fn default_tick_interval() -> Duration {
    Duration::from_millis(500)
}

fn default_stop_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(2)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_download_folder() -> PathBuf {
    PathBuf::from("./batch_videos")
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Fractional seconds, for sub-second pacing delays
mod secs_f64_serde {
    use serde::{Deserialize, Deserializer, Serializer, de::Error};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_f64(duration.as_secs_f64())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        if !secs.is_finite() || secs < 0.0 {
            return Err(D::Error::custom(format!(
                "expected a non-negative number of seconds, got {secs}"
            )));
        }
        Ok(Duration::from_secs_f64(secs))
    }
}

mod millis_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
