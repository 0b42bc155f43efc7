use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::errors::EngineError;
use crate::domain::order::AddressSnapshot;
use crate::domain::payment::GatewayStatus;
use crate::engine::ports::{
    AddressBook, CartLine, CartProvider, ChargeRequest, ChargeResponse, NotificationEmitter,
    NotificationKind, PaymentGateway, PriceQuote, PricingProvider, ShippingQuoter,
};

// ============================================================================
// In-Memory Collaborators
// ============================================================================
//
// Deterministic implementations of the collaborator ports, used by the
// demo binary and the tests. The mock gateway is scripted: charges mint
// sequential transaction ids, and failure injection covers the paths the
// reconciler has to survive.
//
// ============================================================================

#[derive(Default)]
pub struct MemoryCart {
    carts: RwLock<HashMap<Uuid, Vec<CartLine>>>,
}

impl MemoryCart {
    pub async fn set_cart(&self, user_id: Uuid, lines: Vec<CartLine>) {
        self.carts.write().await.insert(user_id, lines);
    }
}

#[async_trait]
impl CartProvider for MemoryCart {
    async fn get_cart(&self, user_id: Uuid) -> Result<Vec<CartLine>, EngineError> {
        Ok(self.carts.read().await.get(&user_id).cloned().unwrap_or_default())
    }

    async fn clear_cart(&self, user_id: Uuid) -> Result<(), EngineError> {
        self.carts.write().await.remove(&user_id);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryCatalog {
    prices: RwLock<HashMap<Uuid, PriceQuote>>,
}

impl MemoryCatalog {
    pub async fn set_price(&self, variant_id: Uuid, quote: PriceQuote) {
        self.prices.write().await.insert(variant_id, quote);
    }
}

#[async_trait]
impl PricingProvider for MemoryCatalog {
    async fn variant_price(&self, variant_id: Uuid) -> Result<PriceQuote, EngineError> {
        self.prices
            .read()
            .await
            .get(&variant_id)
            .copied()
            .ok_or_else(|| EngineError::not_found("variant", variant_id))
    }
}

/// Hands back the same snapshot for every lookup; address resolution is
/// someone else's subsystem.
pub struct StaticAddressBook {
    snapshot: AddressSnapshot,
}

impl Default for StaticAddressBook {
    fn default() -> Self {
        Self {
            snapshot: AddressSnapshot {
                recipient: "Putri Ayu".into(),
                street: "Jl. Sudirman No. 45".into(),
                city: "Jakarta Selatan".into(),
                province: "DKI Jakarta".into(),
                postal_code: "12190".into(),
                phone: "+62-812-3456-7890".into(),
            },
        }
    }
}

#[async_trait]
impl AddressBook for StaticAddressBook {
    async fn snapshot(
        &self,
        _user_id: Uuid,
        _address_id: Uuid,
    ) -> Result<AddressSnapshot, EngineError> {
        Ok(self.snapshot.clone())
    }
}

pub struct FlatShipping {
    pub cost: i64,
}

#[async_trait]
impl ShippingQuoter for FlatShipping {
    async fn quote(
        &self,
        _destination: &AddressSnapshot,
        _method: &str,
        _weight_grams: u32,
    ) -> Result<i64, EngineError> {
        Ok(self.cost)
    }
}

// ============================================================================
// Mock Payment Gateway
// ============================================================================

#[derive(Default)]
pub struct MockGateway {
    counter: AtomicU64,
    charges: Mutex<Vec<ChargeRequest>>,
    refund_calls: Mutex<Vec<(String, i64, String)>>,
    statuses: Mutex<HashMap<String, GatewayStatus>>,
    fail_charge: AtomicBool,
    fail_refund: AtomicBool,
    status_failures_left: AtomicU32,
    status_failures_transient: AtomicBool,
    charge_delay_ms: AtomicU64,
    refund_delay_ms: AtomicU64,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next charge call fail with a permanent gateway error.
    pub fn fail_next_charge(&self) {
        self.fail_charge.store(true, Ordering::SeqCst);
    }

    /// Make the next refund call fail with a transient gateway error.
    pub fn fail_next_refund(&self) {
        self.fail_refund.store(true, Ordering::SeqCst);
    }

    /// Make the next `n` status queries fail, transiently or permanently.
    pub fn fail_status_queries(&self, n: u32, transient: bool) {
        self.status_failures_left.store(n, Ordering::SeqCst);
        self.status_failures_transient.store(transient, Ordering::SeqCst);
    }

    /// Hold every charge call for `delay`; used to widen race windows.
    pub fn delay_charges(&self, delay: std::time::Duration) {
        self.charge_delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Hold every refund call for `delay`.
    pub fn delay_refunds(&self, delay: std::time::Duration) {
        self.refund_delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Script what the gateway will report for a transaction.
    pub fn set_status(&self, transaction_id: &str, status: GatewayStatus) {
        self.statuses
            .lock()
            .unwrap()
            .insert(transaction_id.to_string(), status);
    }

    pub fn charges(&self) -> Vec<ChargeRequest> {
        self.charges.lock().unwrap().clone()
    }

    pub fn refunds(&self) -> Vec<(String, i64, String)> {
        self.refund_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn charge(&self, request: &ChargeRequest) -> Result<ChargeResponse, EngineError> {
        let delay = self.charge_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
        }
        if self.fail_charge.swap(false, Ordering::SeqCst) {
            return Err(EngineError::gateway("charge rejected by gateway", false));
        }

        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let transaction_id = format!("TXN-{n:06}");
        self.charges.lock().unwrap().push(request.clone());
        self.statuses
            .lock()
            .unwrap()
            .insert(transaction_id.clone(), GatewayStatus::Pending);

        Ok(ChargeResponse {
            transaction_id: transaction_id.clone(),
            redirect_url: Some(format!("https://pay.gateway.test/redirect/{transaction_id}")),
            token: Some(format!("tok_{n:06}")),
            va_number: Some(format!("8877{n:08}")),
            channel: Some("bca".into()),
        })
    }

    async fn query_status(&self, transaction_id: &str) -> Result<GatewayStatus, EngineError> {
        let left = self.status_failures_left.load(Ordering::SeqCst);
        if left > 0 {
            self.status_failures_left.store(left - 1, Ordering::SeqCst);
            let transient = self.status_failures_transient.load(Ordering::SeqCst);
            return Err(EngineError::gateway("status query failed", transient));
        }

        self.statuses
            .lock()
            .unwrap()
            .get(transaction_id)
            .copied()
            .ok_or_else(|| EngineError::gateway("unknown transaction", false))
    }

    async fn refund(
        &self,
        transaction_id: &str,
        amount: i64,
        reason: &str,
    ) -> Result<(), EngineError> {
        let delay = self.refund_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
        }
        if self.fail_refund.swap(false, Ordering::SeqCst) {
            return Err(EngineError::gateway("refund request timed out", true));
        }
        self.refund_calls.lock().unwrap().push((
            transaction_id.to_string(),
            amount,
            reason.to_string(),
        ));
        self.statuses
            .lock()
            .unwrap()
            .insert(transaction_id.to_string(), GatewayStatus::Refund);
        Ok(())
    }
}

// ============================================================================
// Notification Doubles
// ============================================================================

/// Collects emitted notifications; can be told to fail once to prove the
/// engine treats notifications as best-effort.
#[derive(Default)]
pub struct RecordingEmitter {
    events: tokio::sync::Mutex<Vec<(Uuid, NotificationKind, serde_json::Value)>>,
    fail_once: AtomicBool,
}

impl RecordingEmitter {
    pub async fn fail_next(&self) {
        self.fail_once.store(true, Ordering::SeqCst);
    }

    pub async fn kinds(&self) -> Vec<NotificationKind> {
        self.events.lock().await.iter().map(|(_, k, _)| *k).collect()
    }
}

#[async_trait]
impl NotificationEmitter for RecordingEmitter {
    async fn notify(
        &self,
        user_id: Uuid,
        kind: NotificationKind,
        payload: serde_json::Value,
    ) -> Result<(), EngineError> {
        if self.fail_once.swap(false, Ordering::SeqCst) {
            return Err(EngineError::Store("notification channel down".into()));
        }
        self.events.lock().await.push((user_id, kind, payload));
        Ok(())
    }
}

/// Demo emitter: notifications become log lines.
pub struct LogEmitter;

#[async_trait]
impl NotificationEmitter for LogEmitter {
    async fn notify(
        &self,
        user_id: Uuid,
        kind: NotificationKind,
        payload: serde_json::Value,
    ) -> Result<(), EngineError> {
        tracing::info!(user_id = %user_id, kind = ?kind, %payload, "notification");
        Ok(())
    }
}

// ============================================================================
// Test Rig
// ============================================================================

#[cfg(test)]
pub use rig::TestRig;
