use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::errors::EngineError;

use super::value_objects::{AddressSnapshot, OrderLine, OrderStatus};

// ============================================================================
// Order Aggregate - Domain Logic
// ============================================================================
//
// The order owns its status and totals. Outside code never edits fields
// directly; every mutation goes through a named transition so the status
// machine cannot be bypassed.
//
// Lifecycle: pending → processing → shipped → delivered
//            pending|processing → cancelled
//            processing|shipped|delivered → refunded
//
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub order_number: String,
    pub status: OrderStatus,
    pub lines: Vec<OrderLine>,
    pub shipping_address: AddressSnapshot,
    pub shipping_method: String,
    pub subtotal: i64,
    pub shipping_cost: i64,
    pub discount: i64,
    pub grand_total: i64,
    pub notes: Option<String>,
    pub payment_id: Option<Uuid>,
    pub tracking_number: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Named state changes, applied by the order store under its write guard.
#[derive(Debug, Clone)]
pub enum OrderTransition {
    /// Payment settled; the order enters fulfilment.
    MarkProcessing,
    /// Payment failed/expired or the customer cancelled.
    MarkCancelled,
    /// The linked payment was refunded.
    MarkRefunded,
    MarkShipped { tracking_number: String },
    MarkDelivered,
    /// Claim the payment slot (at most one). Fails while another payment
    /// is attached, so concurrent initiations serialize on this transition.
    LinkPayment { payment_id: Uuid },
    /// Release the payment slot, but only for the payment that holds it.
    UnlinkPayment { payment_id: Uuid },
}

impl Order {
    /// Build a new `pending` order, computing and checking totals.
    ///
    /// Invariants enforced here:
    ///   subtotal    == sum(line.line_total)
    ///   grand_total == subtotal + shipping_cost - discount
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        user_id: Uuid,
        order_number: String,
        lines: Vec<OrderLine>,
        shipping_address: AddressSnapshot,
        shipping_method: String,
        shipping_cost: i64,
        discount: i64,
        notes: Option<String>,
    ) -> Result<Self, EngineError> {
        if lines.is_empty() {
            return Err(EngineError::validation("order must have at least one line"));
        }
        if shipping_cost < 0 {
            return Err(EngineError::validation("shipping cost cannot be negative"));
        }
        if discount < 0 {
            return Err(EngineError::validation("discount cannot be negative"));
        }

        let subtotal: i64 = lines.iter().map(|l| l.line_total).sum();
        let grand_total = subtotal + shipping_cost - discount;
        if grand_total < 0 {
            return Err(EngineError::validation(
                "discount exceeds order value",
            ));
        }

        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            user_id,
            order_number,
            status: OrderStatus::Pending,
            lines,
            shipping_address,
            shipping_method,
            subtotal,
            shipping_cost,
            discount,
            grand_total,
            notes,
            payment_id: None,
            tracking_number: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Apply a transition, rejecting anything not legal from the current
    /// status. `InvalidState` here means "not applicable right now" and is
    /// what lets concurrent callers race safely on the store's guard.
    pub fn apply(&mut self, transition: &OrderTransition) -> Result<(), EngineError> {
        match transition {
            OrderTransition::MarkProcessing => match self.status {
                OrderStatus::Pending => {
                    self.status = OrderStatus::Processing;
                }
                current => return Err(self.rejected("start processing", current)),
            },
            OrderTransition::MarkCancelled => match self.status {
                OrderStatus::Pending | OrderStatus::Processing => {
                    self.status = OrderStatus::Cancelled;
                }
                current => return Err(self.rejected("cancel", current)),
            },
            OrderTransition::MarkRefunded => match self.status {
                OrderStatus::Processing | OrderStatus::Shipped | OrderStatus::Delivered => {
                    self.status = OrderStatus::Refunded;
                }
                current => return Err(self.rejected("refund", current)),
            },
            OrderTransition::MarkShipped { tracking_number } => match self.status {
                OrderStatus::Processing => {
                    self.status = OrderStatus::Shipped;
                    self.tracking_number = Some(tracking_number.clone());
                }
                current => return Err(self.rejected("ship", current)),
            },
            OrderTransition::MarkDelivered => match self.status {
                OrderStatus::Shipped => {
                    self.status = OrderStatus::Delivered;
                }
                current => return Err(self.rejected("deliver", current)),
            },
            OrderTransition::LinkPayment { payment_id } => {
                if self.status != OrderStatus::Pending {
                    return Err(self.rejected("attach payment to", self.status));
                }
                if self.payment_id.is_some() {
                    return Err(EngineError::invalid_state(format!(
                        "order {} already has a payment attached",
                        self.order_number
                    )));
                }
                self.payment_id = Some(*payment_id);
            }
            OrderTransition::UnlinkPayment { payment_id } => {
                if self.status != OrderStatus::Pending {
                    return Err(self.rejected("detach payment from", self.status));
                }
                if self.payment_id != Some(*payment_id) {
                    return Err(EngineError::invalid_state(format!(
                        "payment {payment_id} does not hold the slot on order {}",
                        self.order_number
                    )));
                }
                self.payment_id = None;
            }
        }
        self.updated_at = Utc::now();
        Ok(())
    }

    fn rejected(&self, action: &str, current: OrderStatus) -> EngineError {
        EngineError::invalid_state(format!(
            "cannot {action} order {} in status {current}",
            self.order_number
        ))
    }

    /// Reservation quantities to hand back to the ledger on unwind.
    pub fn reserved_quantities(&self) -> Vec<(Uuid, u32)> {
        self.lines
            .iter()
            .map(|l| (l.variant_id, l.quantity))
            .collect()
    }
}
