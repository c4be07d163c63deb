//! Retry budgets and backoff shape.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use vst_core::RetryPolicy;

const fn default_store_write_attempts() -> u32 {
    RetryPolicy::STORE_WRITE_ATTEMPTS
}

const fn default_crypto_attempts() -> u32 {
    RetryPolicy::CRYPTO_ATTEMPTS
}

const fn default_base_delay_ms() -> u64 {
    1000
}

const fn default_jitter_step_ms() -> u64 {
    100
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryConfig {
    /// Attempts for record store reads, writes and transactions.
    #[serde(default = "default_store_write_attempts")]
    pub store_write_attempts: u32,

    /// Attempts for cryptographic service calls.
    #[serde(default = "default_crypto_attempts")]
    pub crypto_attempts: u32,

    /// Backoff before attempt `n` is `n² × base_delay_ms`.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Jitter before attempt `n` is uniform in `[0, n × jitter_step_ms)`.
    #[serde(default = "default_jitter_step_ms")]
    pub jitter_step_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            store_write_attempts: default_store_write_attempts(),
            crypto_attempts: default_crypto_attempts(),
            base_delay_ms: default_base_delay_ms(),
            jitter_step_ms: default_jitter_step_ms(),
        }
    }
}

impl RetryConfig {
    /// Policy for record store operations.
    pub const fn store_policy(&self) -> RetryPolicy {
        self.policy(self.store_write_attempts)
    }

    /// Policy for cryptographic calls.
    pub const fn crypto_policy(&self) -> RetryPolicy {
        self.policy(self.crypto_attempts)
    }

    const fn policy(&self, max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts)
            .with_base_delay(Duration::from_millis(self.base_delay_ms))
            .with_jitter_step(Duration::from_millis(self.jitter_step_ms))
    }
}

/// Maps onto the store budget, the one most callers want.
impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        config.store_policy()
    }
}
