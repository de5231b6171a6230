//! Common test utilities for vidgen-batch integration tests

#[allow(dead_code)]
pub mod assertions;

#[allow(unused_imports)]
pub use assertions::*;

use std::time::Duration;
use vidgen_batch::{BatchConfig, RetryConfig};

/// Config without pacing and with fast retries
#[allow(dead_code)]
pub fn fast_config() -> BatchConfig {
    BatchConfig {
        inter_submission_delay: Duration::ZERO,
        tick_interval: Duration::from_millis(20),
        retry: RetryConfig {
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(50),
            jitter: false,
            ..Default::default()
        },
        ..Default::default()
    }
}
