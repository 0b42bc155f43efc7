use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::errors::EngineError;
use crate::domain::order::AddressSnapshot;
use crate::domain::payment::{GatewayStatus, PaymentMethod};

// ============================================================================
// Collaborator Ports
// ============================================================================
//
// Everything outside the engine's correctness boundary: cart, catalog
// pricing, address book, shipping quotes, the payment gateway, and
// notifications. The engine receives these at construction; no global
// handles.
//
// ============================================================================

/// A cart line as the cart subsystem stores it. Quantities only — prices
/// are re-read from the catalog at order-creation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartLine {
    pub variant_id: Uuid,
    pub quantity: u32,
}

#[async_trait]
pub trait CartProvider: Send + Sync {
    async fn get_cart(&self, user_id: Uuid) -> Result<Vec<CartLine>, EngineError>;

    /// Called only after the order is durably committed.
    async fn clear_cart(&self, user_id: Uuid) -> Result<(), EngineError>;
}

/// Current catalog price for a variant, minor units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub unit_price: i64,
    /// Product-level discount per unit, already resolved by the catalog.
    pub discount_per_unit: i64,
    pub weight_grams: u32,
}

#[async_trait]
pub trait PricingProvider: Send + Sync {
    async fn variant_price(&self, variant_id: Uuid) -> Result<PriceQuote, EngineError>;
}

#[async_trait]
pub trait AddressBook: Send + Sync {
    async fn snapshot(
        &self,
        user_id: Uuid,
        address_id: Uuid,
    ) -> Result<AddressSnapshot, EngineError>;
}

#[async_trait]
pub trait ShippingQuoter: Send + Sync {
    async fn quote(
        &self,
        destination: &AddressSnapshot,
        method: &str,
        weight_grams: u32,
    ) -> Result<i64, EngineError>;
}

// ============================================================================
// Payment Gateway Adapter
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct ChargeItem {
    pub variant_id: Uuid,
    pub quantity: u32,
    pub unit_price: i64,
}

/// Everything the gateway needs to create an external transaction; the
/// line items and customer id are passed through for gateway-side display
/// and fraud checks.
#[derive(Debug, Clone, Serialize)]
pub struct ChargeRequest {
    pub order_ref: String,
    pub amount: i64,
    pub method: PaymentMethod,
    pub customer_id: Uuid,
    pub items: Vec<ChargeItem>,
}

/// Synchronous gateway response. Which artifacts are present depends on
/// the method: redirects for wallets, virtual account numbers for bank
/// transfer.
#[derive(Debug, Clone, Deserialize)]
pub struct ChargeResponse {
    pub transaction_id: String,
    pub redirect_url: Option<String>,
    pub token: Option<String>,
    pub va_number: Option<String>,
    pub channel: Option<String>,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create an external transaction. Never blindly retried: without a
    /// client-supplied idempotency key a retry can double-charge.
    async fn charge(&self, request: &ChargeRequest) -> Result<ChargeResponse, EngineError>;

    /// Idempotent read; safe to retry on transient failures.
    async fn query_status(&self, transaction_id: &str) -> Result<GatewayStatus, EngineError>;

    async fn refund(
        &self,
        transaction_id: &str,
        amount: i64,
        reason: &str,
    ) -> Result<(), EngineError>;
}

// ============================================================================
// Notification Emitter
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    OrderCreated,
    PaymentReceived,
    OrderCancelled,
    OrderRefunded,
    OrderShipped,
    OrderDelivered,
}

/// Best-effort. Failures are logged by the caller and never roll back or
/// fail the triggering operation.
#[async_trait]
pub trait NotificationEmitter: Send + Sync {
    async fn notify(
        &self,
        user_id: Uuid,
        kind: NotificationKind,
        payload: serde_json::Value,
    ) -> Result<(), EngineError>;
}
