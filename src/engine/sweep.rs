use std::sync::Arc;

use chrono::Utc;
use tokio::task::JoinHandle;

use super::payments::PaymentService;

// ============================================================================
// Stale Payment Sweep
// ============================================================================
//
// The engine is request/event driven; this timer job is the one background
// task. It expires payments whose window has passed so reserved stock is
// handed back even when the gateway never sends the expire webhook. The
// sweep shares the reconciler's transition path, so a late webhook and the
// sweep cannot double-apply.
//
// ============================================================================

pub fn run_sweeper(payments: Arc<PaymentService>, interval: std::time::Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick fires immediately; skip it so a fresh boot does
        // not race service wiring.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match payments.sweep_expired(Utc::now()).await {
                Ok(0) => {}
                Ok(expired) => tracing::info!(expired, "payment sweep pass complete"),
                Err(error) => tracing::error!(error = %error, "payment sweep pass failed"),
            }
        }
    })
}
