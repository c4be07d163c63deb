//! Bounded retry with quadratic backoff and linear jitter.
//!
//! Backoff before attempt `n` (n >= 2) is `n² × base_delay` plus a uniform
//! jitter in `[0, n × jitter_step)`. With the defaults (1s, 100ms) attempt 2
//! waits ~4s and attempt 8 waits ~64s, so budgets are sized for expensive,
//! low-frequency remote calls: 8 attempts for storage writes, 4 for
//! cryptographic calls.
//!
//! The operation classifies its own failures. [`RetryDecision::Terminal`]
//! stops the loop immediately (e.g. "entity not found"); the executor never
//! looks at error types.

use std::error::Error as StdError;
use std::future::Future;
use std::pin::{Pin, pin};
use std::time::Duration;

use rand::Rng;

use crate::error::RetryError;

/// What one attempt produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision<T, E> {
    Success(T),
    /// Failed, may succeed if tried again.
    Retriable(E),
    /// Failed, must not be tried again.
    Terminal(E),
}

impl<T, E> RetryDecision<T, E> {
    /// Every error is retriable.
    pub fn retriable(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => Self::Success(value),
            Err(e) => Self::Retriable(e),
        }
    }

    /// Route errors through `is_retriable`.
    pub fn classify(result: Result<T, E>, is_retriable: impl FnOnce(&E) -> bool) -> Self {
        match result {
            Ok(value) => Self::Success(value),
            Err(e) if is_retriable(&e) => Self::Retriable(e),
            Err(e) => Self::Terminal(e),
        }
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

/// Attempt budget and backoff shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first. Zero behaves as one.
    pub max_attempts: u32,
    /// Multiplied by `attempt²`.
    pub base_delay: Duration,
    /// Jitter ceiling grows by this much per attempt.
    pub jitter_step: Duration,
}

impl RetryPolicy {
    /// Budget used for record store writes.
    pub const STORE_WRITE_ATTEMPTS: u32 = 8;
    /// Budget used for cryptographic service calls.
    pub const CRYPTO_ATTEMPTS: u32 = 4;

    pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);
    pub const DEFAULT_JITTER_STEP: Duration = Duration::from_millis(100);

    #[must_use]
    pub const fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Self::DEFAULT_BASE_DELAY,
            jitter_step: Self::DEFAULT_JITTER_STEP,
        }
    }

    #[must_use]
    pub const fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    #[must_use]
    pub const fn with_jitter_step(mut self, jitter_step: Duration) -> Self {
        self.jitter_step = jitter_step;
        self
    }

    /// Deterministic part of the delay before `attempt`.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(attempt.saturating_mul(attempt))
    }

    /// Exclusive upper bound of the jitter added before `attempt`.
    #[must_use]
    pub fn jitter_ceiling(&self, attempt: u32) -> Duration {
        self.jitter_step.saturating_mul(attempt)
    }

    /// Full randomized delay before `attempt`.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let ceiling = u64::try_from(self.jitter_ceiling(attempt).as_millis()).unwrap_or(u64::MAX);
        let jitter = if ceiling == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::thread_rng().gen_range(0..ceiling))
        };
        self.backoff(attempt).saturating_add(jitter)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Self::STORE_WRITE_ATTEMPTS)
    }
}

/// Stateless retry executor.
#[derive(Debug, Clone, Copy, Default)]
pub struct Retry {
    policy: RetryPolicy,
}

impl Retry {
    #[must_use]
    pub const fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    #[must_use]
    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Invoke `operation` with 1-based attempt numbers until it succeeds,
    /// fails terminally, or the budget runs out.
    ///
    /// # Errors
    ///
    /// [`RetryError::Terminal`] for a terminal failure,
    /// [`RetryError::Exhausted`] with the last error when the budget is spent.
    pub async fn run<T, E, F, Fut>(&self, operation: F) -> Result<T, RetryError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = RetryDecision<T, E>>,
        E: StdError + 'static,
    {
        self.run_until_cancelled(std::future::pending::<()>(), operation)
            .await
    }

    /// Like [`run`](Self::run), but stops as soon as `cancel` resolves: before
    /// starting an attempt or in the middle of a backoff sleep. An attempt
    /// already in flight is allowed to finish.
    ///
    /// Pass `tokio::time::sleep_until(deadline)` for a deadline.
    ///
    /// # Errors
    ///
    /// As [`run`](Self::run), plus [`RetryError::Cancelled`].
    pub async fn run_until_cancelled<T, E, F, Fut, S>(
        &self,
        cancel: S,
        mut operation: F,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = RetryDecision<T, E>>,
        E: StdError + 'static,
        S: Future<Output = ()>,
    {
        let mut cancel = pin!(cancel);
        let mut last: Option<E> = None;
        let mut attempt: u32 = 1;

        loop {
            if is_ready(cancel.as_mut()).await {
                tracing::debug!(attempt, "retry cancelled before attempt");
                return Err(RetryError::Cancelled {
                    attempts: attempt - 1,
                    last,
                });
            }

            let error = match operation(attempt).await {
                RetryDecision::Success(value) => return Ok(value),
                RetryDecision::Terminal(error) => {
                    tracing::debug!(attempt, %error, "terminal failure, not retrying");
                    return Err(RetryError::Terminal {
                        attempts: attempt,
                        source: error,
                    });
                }
                RetryDecision::Retriable(error) => error,
            };

            let completed = attempt;
            attempt += 1;
            if attempt > self.policy.max_attempts {
                tracing::warn!(attempts = completed, %error, "retry budget exhausted");
                return Err(RetryError::Exhausted {
                    attempts: completed,
                    source: error,
                });
            }

            let delay = self.policy.delay_for(attempt);
            tracing::warn!(
                attempt = completed,
                max_attempts = self.policy.max_attempts,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                %error,
                "retriable failure, backing off",
            );
            last = Some(error);

            tokio::select! {
                biased;
                () = cancel.as_mut() => {
                    tracing::debug!(attempts = completed, "retry cancelled during backoff");
                    return Err(RetryError::Cancelled { attempts: completed, last });
                }
                () = tokio::time::sleep(delay) => {}
            }
        }
    }
}

/// Poll `signal` once without waiting.
async fn is_ready<S: Future<Output = ()>>(signal: Pin<&mut S>) -> bool {
    tokio::select! {
        biased;
        () = signal => true,
        () = std::future::ready(()) => false,
    }
}
