use std::time::Duration;

use tokio::time::sleep;

// ============================================================================
// Gateway Retry Policy
// ============================================================================
//
// Exponential backoff for idempotent gateway reads (status queries).
// Charge creation is never routed through here: without an idempotency
// key, retrying a charge can double-bill the customer.
//
// ============================================================================

#[derive(Clone, Debug)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.powi(attempt.saturating_sub(1) as i32);
        let millis = (self.initial_delay.as_millis() as f64 * factor) as u64;
        Duration::from_millis(millis).min(self.max_delay)
    }
}

/// Distinguishes failures worth another attempt (network blips, gateway
/// 5xx) from ones that will not improve (declined card, bad request).
pub trait IsTransient {
    fn is_transient(&self) -> bool;
}

/// Run `operation` until it succeeds, fails permanently, or exhausts the
/// policy. The last error is returned either way.
pub async fn retry_transient<F, Fut, T, E>(policy: &RetryPolicy, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display + IsTransient,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(attempt, "operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(error) if !error.is_transient() => {
                tracing::error!(error = %error, "permanent failure, not retrying");
                return Err(error);
            }
            Err(error) if attempt >= policy.max_attempts => {
                tracing::error!(attempt, error = %error, "giving up after final attempt");
                return Err(error);
            }
            Err(error) => {
                let delay = policy.delay_for(attempt);
                tracing::warn!(
                    attempt,
                    error = %error,
                    delay_ms = delay.as_millis(),
                    "transient failure, retrying after delay"
                );
                sleep(delay).await;
            }
        }
    }
}
