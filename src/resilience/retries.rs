//! Retry logic.
//!
//! # Responsibilities
//! - Decide whether a failed call may be attempted again
//! - Execute attempts with exponential backoff
//!
//! # Design Decisions
//! - Only transport failures retry; application answers and breaker
//!   rejections propagate immediately
//! - Creates retry only on UNAVAILABLE: a DEADLINE_EXCEEDED create may have
//!   been applied, and repeating it could insert twice
//! - Backoff sleeps on the calling task

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;

use crate::config::RetryConfig;
use crate::error::Error;
use crate::observability::metrics;
use crate::resilience::backoff::calculate_backoff;
use crate::rpc::Code;

/// Which failures an operation may be retried on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryOn {
    /// UNAVAILABLE and DEADLINE_EXCEEDED. For idempotent calls.
    Transport,
    /// UNAVAILABLE only. For calls that must not run twice.
    Unreachable,
}

impl RetryOn {
    pub fn allows(&self, error: &Error) -> bool {
        match (self, error.rpc_code()) {
            (RetryOn::Transport, Some(code)) => code.is_transport(),
            (RetryOn::Unreachable, Some(code)) => code == Code::Unavailable,
            (_, None) => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub jitter: bool,
}

impl RetryPolicy {
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_retries.max(1),
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            jitter: config.jitter,
        }
    }

    /// Delay after the `attempt`-th failure (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        calculate_backoff(
            attempt,
            self.initial_delay.as_millis() as u64,
            self.max_delay.as_millis() as u64,
            self.jitter,
        )
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(&RetryConfig::default())
    }
}

/// Run `f` until it succeeds, fails with a non-retryable error, or the
/// attempts run out. The last error is returned.
pub async fn execute<F, Fut, T>(
    policy: &RetryPolicy,
    operation: &'static str,
    retry_on: RetryOn,
    mut f: F,
) -> Result<T, Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, Error>>,
{
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        let err = match f().await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        if !retry_on.allows(&err) {
            return Err(err);
        }

        if attempt >= policy.max_attempts {
            tracing::warn!(
                operation,
                attempts = attempt,
                error = %err,
                "Retry attempts exhausted"
            );
            return Err(err);
        }

        let delay = policy.delay_for(attempt);
        tracing::warn!(
            operation,
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "Transient failure, retrying after backoff"
        );
        metrics::record_retry(operation);
        sleep(delay).await;
    }
}
