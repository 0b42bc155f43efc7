use std::time::Duration;

use crate::utils::retry::RetryPolicy;

// ============================================================================
// Engine Configuration
// ============================================================================
//
// Explicit configuration passed into each service at construction; no
// global state. Defaults are sensible for development; production values
// come from `CHECKOUT_*` environment variables.
//
// ============================================================================

#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// How long an unpaid payment stays `pending` before the sweep
    /// expires it.
    pub payment_expiry: chrono::Duration,
    /// Shared secret the gateway signs webhook notifications with.
    pub gateway_server_key: String,
    /// Cadence of the stale-payment sweep.
    pub sweep_interval: Duration,
    /// Backoff for idempotent gateway status queries.
    pub retry: RetryPolicy,
    /// Attempts to find an unused order number before giving up.
    pub order_number_attempts: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            payment_expiry: chrono::Duration::hours(24),
            gateway_server_key: "dev-server-key".to_string(),
            sweep_interval: Duration::from_secs(60),
            retry: RetryPolicy::default(),
            order_number_attempts: 5,
        }
    }
}

impl EngineConfig {
    /// Load from the environment, falling back to defaults for anything
    /// unset or unparseable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            payment_expiry: env_i64("CHECKOUT_PAYMENT_EXPIRY_HOURS")
                .map(chrono::Duration::hours)
                .unwrap_or(defaults.payment_expiry),
            gateway_server_key: std::env::var("CHECKOUT_GATEWAY_SERVER_KEY")
                .unwrap_or(defaults.gateway_server_key),
            sweep_interval: env_i64("CHECKOUT_SWEEP_INTERVAL_SECS")
                .and_then(|s| u64::try_from(s).ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.sweep_interval),
            retry: defaults.retry,
            order_number_attempts: defaults.order_number_attempts,
        }
    }
}

fn env_i64(key: &str) -> Option<i64> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}
