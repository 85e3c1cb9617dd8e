//! Retry of transient storage failures at the request boundary

use std::future::Future;
use std::time::Duration;

use rand::Rng;

use crate::config::EngineConfig;
use crate::error::Result;

/// Upper bound for a single backoff sleep.
const MAX_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first one.
    pub attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub const fn new(attempts: u32, base_delay: Duration) -> Self {
        Self {
            attempts,
            base_delay,
        }
    }

    pub const fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.retry_attempts, config.retry_base_delay)
    }

    /// Backoff before retry number `attempt` (1-based): exponential, jittered
    /// uniformly between half and the full step.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let step = self
            .base_delay
            .saturating_mul(2_u32.saturating_pow(attempt.saturating_sub(1)))
            .min(MAX_DELAY);
        let floor = step / 2;
        if step <= floor {
            return step;
        }
        rand::thread_rng().gen_range(floor..=step)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

/// Run `operation`, retrying while it fails with a transient storage error.
///
/// Validation, not-found, forbidden, quota and conflict errors are returned
/// at once. Every engine operation is safe to repeat: creates are idempotent
/// by id and updates are conditioned on the presented version.
pub async fn with_retry<T, F, Fut>(policy: RetryPolicy, operation_name: &str, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Err(error) if error.is_transient() && attempt < policy.attempts => {
                attempt += 1;
                let delay = policy.delay_for(attempt);
                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %error,
                    "Transient storage failure, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            outcome => return outcome,
        }
    }
}
