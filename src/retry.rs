//! Bounded retry with exponential backoff
//!
//! Processors wrap each provider call in [`with_retry`]. Only errors classified
//! as transient by [`IsRetryable`] are retried; everything else is returned on
//! the first failure so the item can be marked failed immediately.
//!
//! # Example
//!
//! ```no_run
//! use vidgen_batch::config::RetryConfig;
//! use vidgen_batch::error::Error;
//! use vidgen_batch::retry::with_retry;
//!
//! # async fn example() -> Result<(), Error> {
//! let config = RetryConfig::default();
//! let artifact = with_retry(&config, || async {
//!     Ok::<String, Error>("https://cdn.example/clip.mp4".to_string())
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::Error;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Classifies an error as transient (worth another attempt) or terminal
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            Error::Network(e) => e.is_timeout() || e.is_connect(),
            Error::Http { status, .. } => *status == 429 || (500..600).contains(status),
            // A 2xx without a usable artifact is usually a provider still warming up
            Error::AmbiguousResponse(_) => true,
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::NotConnected
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::Interrupted
            ),
            Error::ExternalTool(msg) => {
                msg.contains("timeout") || msg.contains("busy") || msg.contains("temporary")
            }
            Error::Config { .. }
            | Error::NotFound(_)
            | Error::InvalidTransition { .. }
            | Error::InvalidState { .. }
            | Error::AlreadyInFlight(_)
            | Error::CapacityExceeded { .. }
            | Error::Serialization(_)
            | Error::Zip(_)
            | Error::NotSupported(_)
            | Error::ShuttingDown
            | Error::Other(_) => false,
        }
    }
}

/// Run `operation` until it succeeds, fails terminally, or `config.max_attempts`
/// retries have been spent
///
/// The first retry waits `initial_delay`; each further wait is multiplied by
/// `backoff_multiplier` and capped at `max_delay`. With `jitter` each wait is
/// stretched by a random factor in `[1, 2]`.
pub async fn with_retry<F, Fut, T, E>(config: &RetryConfig, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let mut attempt = 0;
    let mut delay = config.initial_delay;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    tracing::info!(attempts = attempt + 1, "call succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if e.is_retryable() && attempt < config.max_attempts => {
                attempt += 1;

                let wait = if config.jitter {
                    add_jitter(delay)
                } else {
                    delay
                };

                tracing::warn!(
                    error = %e,
                    attempt,
                    max_attempts = config.max_attempts,
                    delay_ms = wait.as_millis() as u64,
                    "transient failure, retrying"
                );

                tokio::time::sleep(wait).await;

                delay = Duration::from_secs_f64(delay.as_secs_f64() * config.backoff_multiplier)
                    .min(config.max_delay);
            }
            Err(e) => {
                if e.is_retryable() {
                    tracing::warn!(error = %e, attempts = attempt + 1, "retries exhausted");
                } else {
                    tracing::debug!(error = %e, "terminal failure, not retrying");
                }
                return Err(e);
            }
        }
    }
}

/// Stretch `delay` by a uniform factor in `[1, 2]`
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let factor: f64 = rng.gen_range(0.0..=1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + factor))
}
