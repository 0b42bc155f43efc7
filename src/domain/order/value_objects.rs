use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::errors::EngineError;

// ============================================================================
// Order Value Objects
// ============================================================================
//
// All monetary amounts are integer minor units (cents). Totals must be
// exact; floating point never touches money.
//
// ============================================================================

/// A single ordered line with its price frozen at order-creation time.
/// Immutable once the order exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderLine {
    pub variant_id: Uuid,
    pub quantity: u32,
    /// Unit price snapshot, minor units. Never re-read from the live catalog.
    pub unit_price: i64,
    pub line_total: i64,
}

impl OrderLine {
    pub fn new(variant_id: Uuid, quantity: u32, unit_price: i64) -> Result<Self, EngineError> {
        if quantity == 0 {
            return Err(EngineError::validation("line quantity must be positive"));
        }
        if unit_price < 0 {
            return Err(EngineError::validation("unit price cannot be negative"));
        }
        Ok(Self {
            variant_id,
            quantity,
            unit_price,
            line_total: unit_price * i64::from(quantity),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
    Refunded,
}

impl OrderStatus {
    /// No further automatic transition leaves these states.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered | Self::Cancelled | Self::Refunded)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
            Self::Refunded => "refunded",
        };
        f.write_str(s)
    }
}

/// Shipping destination copied onto the order at creation time, so later
/// edits to the user's address book do not rewrite order history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressSnapshot {
    pub recipient: String,
    pub street: String,
    pub city: String,
    pub province: String,
    pub postal_code: String,
    pub phone: String,
}
