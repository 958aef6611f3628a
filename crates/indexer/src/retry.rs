//! Bounded retry with exponential backoff and jitter for ledger calls.

use anyhow::Result;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tracing::warn;

use crate::schedule::sleep_or_shutdown;

/// Retry schedule: `min(max_delay, base_delay * 2^attempt)` plus up to
/// `max_jitter` of random delay, for at most `retries` extra attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_jitter: Duration,
}

impl RetryPolicy {
    /// Policy for chain head queries.
    pub const fn chain_head() -> Self {
        Self {
            retries: 5,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(10),
            max_jitter: Duration::from_millis(250),
        }
    }

    /// Policy for block fetches.
    pub const fn block() -> Self {
        Self {
            retries: 6,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(10),
            max_jitter: Duration::from_millis(250),
        }
    }

    /// Single attempt, no waiting.
    pub const fn none() -> Self {
        Self {
            retries: 0,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            max_jitter: Duration::ZERO,
        }
    }

    /// Deterministic part of the delay after failed attempt `attempt` (0-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.min(20);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    fn jitter(&self) -> Duration {
        let max = self.max_jitter.as_millis() as u64;
        if max == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..max))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::chain_head()
    }
}

/// Run `op` until it succeeds or the policy is exhausted.
///
/// `op` receives the 0-based attempt number. The last error is returned
/// unchanged so callers can add their own context. A shutdown signalled
/// while backing off ends the loop early with that error.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    what: &str,
    shutdown: &watch::Receiver<bool>,
    mut op: F,
) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut shutdown = shutdown.clone();
    let mut attempt = 0;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if attempt >= policy.retries => return Err(e),
            Err(e) => {
                let delay = policy.backoff(attempt) + policy.jitter();
                warn!(
                    operation = what,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Retrying after failure"
                );
                if sleep_or_shutdown(delay, &mut shutdown).await {
                    warn!(operation = what, attempt = attempt + 1, "Retry abandoned on shutdown");
                    return Err(e);
                }
                attempt += 1;
            }
        }
    }
}
