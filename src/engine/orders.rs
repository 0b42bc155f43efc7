use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::domain::errors::EngineError;
use crate::domain::order::{number, AddressSnapshot, Order, OrderLine, OrderTransition};
use crate::domain::payment::{PaymentStatus, PaymentTransition};
use crate::store::{Applied, InsertOutcome, OrderStore, PaymentStore};

use super::inventory::InventoryLedger;
use super::ports::{
    AddressBook, CartProvider, NotificationEmitter, NotificationKind, PricingProvider,
    ShippingQuoter,
};

// ============================================================================
// Order Service - Creation, Cancellation, Fulfilment
// ============================================================================
//
// Order creation sequence: snapshot the cart at current prices, reserve
// stock as one atomic batch, persist the order, then clear the cart. Any
// failure after the reservation releases it before the error propagates,
// so no partial order is ever visible.
//
// ============================================================================

pub struct OrderService {
    orders: Arc<dyn OrderStore>,
    payments: Arc<dyn PaymentStore>,
    ledger: Arc<InventoryLedger>,
    cart: Arc<dyn CartProvider>,
    pricing: Arc<dyn PricingProvider>,
    addresses: Arc<dyn AddressBook>,
    shipping: Arc<dyn ShippingQuoter>,
    notifier: Arc<dyn NotificationEmitter>,
    config: EngineConfig,
}

impl OrderService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        orders: Arc<dyn OrderStore>,
        payments: Arc<dyn PaymentStore>,
        ledger: Arc<InventoryLedger>,
        cart: Arc<dyn CartProvider>,
        pricing: Arc<dyn PricingProvider>,
        addresses: Arc<dyn AddressBook>,
        shipping: Arc<dyn ShippingQuoter>,
        notifier: Arc<dyn NotificationEmitter>,
        config: EngineConfig,
    ) -> Self {
        Self {
            orders,
            payments,
            ledger,
            cart,
            pricing,
            addresses,
            shipping,
            notifier,
            config,
        }
    }

    /// Turn the user's cart into a committed `pending` order.
    pub async fn create_order(
        &self,
        user_id: Uuid,
        shipping_address_id: Uuid,
        shipping_method: &str,
        notes: Option<String>,
    ) -> Result<Order, EngineError> {
        let cart_lines = self.cart.get_cart(user_id).await?;
        if cart_lines.is_empty() {
            return Err(EngineError::EmptyCart);
        }

        let address = self.addresses.snapshot(user_id, shipping_address_id).await?;

        // Prices come from the live catalog, never from the cart cache.
        let mut lines = Vec::with_capacity(cart_lines.len());
        let mut discount: i64 = 0;
        let mut total_weight: u32 = 0;
        for cart_line in &cart_lines {
            let quote = self.pricing.variant_price(cart_line.variant_id).await?;
            let line = OrderLine::new(cart_line.variant_id, cart_line.quantity, quote.unit_price)?;
            discount += quote.discount_per_unit * i64::from(cart_line.quantity);
            // Cart quantities are caller input; an absurd value must fail
            // as validation, not as an arithmetic panic.
            total_weight = quote
                .weight_grams
                .checked_mul(cart_line.quantity)
                .and_then(|line_weight| total_weight.checked_add(line_weight))
                .ok_or_else(|| {
                    EngineError::validation(format!(
                        "cart quantity {} for variant {} overflows shipment weight",
                        cart_line.quantity, cart_line.variant_id
                    ))
                })?;
            lines.push(line);
        }

        let reservation: Vec<(Uuid, u32)> = cart_lines
            .iter()
            .map(|l| (l.variant_id, l.quantity))
            .collect();
        self.ledger.reserve_batch(&reservation).await?;

        // The reservation is held; from here every failure must hand it back.
        let order = match self
            .persist_order(user_id, lines, address, shipping_method, discount, total_weight, notes)
            .await
        {
            Ok(order) => order,
            Err(error) => {
                self.ledger.release_batch(&reservation).await;
                return Err(error);
            }
        };

        // Only after the order is durably committed.
        if let Err(error) = self.cart.clear_cart(user_id).await {
            tracing::warn!(
                order_number = %order.order_number,
                error = %error,
                "failed to clear cart after order commit"
            );
        }

        self.emit(
            user_id,
            NotificationKind::OrderCreated,
            json!({
                "order_id": order.id,
                "order_number": order.order_number,
                "grand_total": order.grand_total,
            }),
        )
        .await;

        tracing::info!(
            order_number = %order.order_number,
            user_id = %user_id,
            grand_total = order.grand_total,
            "order created"
        );
        Ok(order)
    }

    async fn persist_order(
        &self,
        user_id: Uuid,
        lines: Vec<OrderLine>,
        address: AddressSnapshot,
        shipping_method: &str,
        discount: i64,
        total_weight: u32,
        notes: Option<String>,
    ) -> Result<Order, EngineError> {
        let shipping_cost = self
            .shipping
            .quote(&address, shipping_method, total_weight)
            .await?;

        for _ in 0..self.config.order_number_attempts {
            let order_number = number::generate(Utc::now());
            let order = Order::new(
                user_id,
                order_number,
                lines.clone(),
                address.clone(),
                shipping_method.to_string(),
                shipping_cost,
                discount,
                notes.clone(),
            )?;
            match self.orders.insert(order.clone()).await? {
                InsertOutcome::Inserted => return Ok(order),
                InsertOutcome::DuplicateNumber => {
                    tracing::debug!(order_number = %order.order_number, "order number collision, regenerating");
                }
            }
        }
        Err(EngineError::Store(
            "could not allocate a unique order number".into(),
        ))
    }

    /// Customer-initiated cancellation. Only legal while nothing has been
    /// paid; a paid order must go through the refund flow instead.
    pub async fn cancel_order(&self, order_id: Uuid, user_id: Uuid) -> Result<Order, EngineError> {
        let order = self
            .orders
            .find(order_id)
            .await?
            .ok_or_else(|| EngineError::not_found("order", order_id))?;
        if order.user_id != user_id {
            // Not leaked to other users.
            return Err(EngineError::not_found("order", order_id));
        }

        if let Some(payment_id) = order.payment_id {
            let Some(payment) = self.payments.find(payment_id).await? else {
                // The slot is claimed but the charge has not come back yet.
                return Err(EngineError::invalid_state(
                    "a payment for this order is being initiated; retry shortly",
                ));
            };
            match payment.status {
                PaymentStatus::Paid | PaymentStatus::Refunded => {
                    return Err(EngineError::invalid_state(
                        "order has a settled payment; use the refund flow",
                    ));
                }
                PaymentStatus::Failed | PaymentStatus::Expired => {
                    // Reconciliation already owns the unwind for this order.
                    return Err(EngineError::invalid_state(format!(
                        "payment already {}; order is being cancelled by reconciliation",
                        payment.status
                    )));
                }
                PaymentStatus::Pending => {
                    // Winning this transition makes us the sole owner of the
                    // stock release; a concurrent webhook observes `failed`
                    // and no-ops.
                    match self
                        .payments
                        .apply_transition(
                            payment_id,
                            PaymentTransition::MarkFailed {
                                reason: "cancelled by customer".into(),
                            },
                        )
                        .await?
                    {
                        Applied::Done(_) => {}
                        Applied::Unchanged(current) => {
                            return Err(EngineError::invalid_state(format!(
                                "payment moved to {} during cancellation",
                                current.status
                            )));
                        }
                    }
                }
            }
        }

        match self
            .orders
            .apply_transition(order_id, OrderTransition::MarkCancelled)
            .await?
        {
            Applied::Done(cancelled) => {
                self.ledger
                    .release_batch(&cancelled.reserved_quantities())
                    .await;
                self.emit(
                    cancelled.user_id,
                    NotificationKind::OrderCancelled,
                    json!({
                        "order_id": cancelled.id,
                        "order_number": cancelled.order_number,
                    }),
                )
                .await;
                tracing::info!(order_number = %cancelled.order_number, "order cancelled");
                Ok(cancelled)
            }
            Applied::Unchanged(current) => Err(EngineError::invalid_state(format!(
                "cannot cancel order {} in status {}",
                current.order_number, current.status
            ))),
        }
    }

    /// Admin/shipping action: processing → shipped.
    pub async fn mark_shipped(
        &self,
        order_id: Uuid,
        tracking_number: String,
    ) -> Result<Order, EngineError> {
        match self
            .orders
            .apply_transition(order_id, OrderTransition::MarkShipped { tracking_number })
            .await?
        {
            Applied::Done(shipped) => {
                self.emit(
                    shipped.user_id,
                    NotificationKind::OrderShipped,
                    json!({
                        "order_number": shipped.order_number,
                        "tracking_number": shipped.tracking_number,
                    }),
                )
                .await;
                Ok(shipped)
            }
            Applied::Unchanged(current) => Err(EngineError::invalid_state(format!(
                "cannot ship order {} in status {}",
                current.order_number, current.status
            ))),
        }
    }

    /// Admin/shipping action: shipped → delivered.
    pub async fn mark_delivered(&self, order_id: Uuid) -> Result<Order, EngineError> {
        match self
            .orders
            .apply_transition(order_id, OrderTransition::MarkDelivered)
            .await?
        {
            Applied::Done(delivered) => {
                self.emit(
                    delivered.user_id,
                    NotificationKind::OrderDelivered,
                    json!({ "order_number": delivered.order_number }),
                )
                .await;
                Ok(delivered)
            }
            Applied::Unchanged(current) => Err(EngineError::invalid_state(format!(
                "cannot deliver order {} in status {}",
                current.order_number, current.status
            ))),
        }
    }

    pub async fn get_order(&self, order_id: Uuid) -> Result<Order, EngineError> {
        self.orders
            .find(order_id)
            .await?
            .ok_or_else(|| EngineError::not_found("order", order_id))
    }

    async fn emit(&self, user_id: Uuid, kind: NotificationKind, payload: serde_json::Value) {
        if let Err(error) = self.notifier.notify(user_id, kind, payload).await {
            tracing::warn!(kind = ?kind, error = %error, "notification emit failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::OrderStatus;
    use crate::testkit::TestRig;
    use futures_util::future::join_all;

    #[tokio::test]
    async fn test_create_order_totals_and_stock() {
        let rig = TestRig::new();
        let user = Uuid::new_v4();
        let variant = rig.seed_variant(15_000, 500, 5).await; // price, discount/unit, stock
        rig.seed_cart(user, &[(variant, 2)]).await;

        let order = rig
            .orders
            .create_order(user, Uuid::new_v4(), "regular", None)
            .await
            .unwrap();

        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.subtotal, 30_000);
        assert_eq!(order.discount, 1_000);
        assert_eq!(order.shipping_cost, rig.flat_shipping_cost());
        assert_eq!(
            order.grand_total,
            order.subtotal + order.shipping_cost - order.discount
        );
        assert_eq!(
            order.subtotal,
            order.lines.iter().map(|l| l.line_total).sum::<i64>()
        );
        assert_eq!(rig.ledger.available(variant).await, 3);

        // Cart is cleared only after commit.
        assert!(rig.cart.get_cart(user).await.unwrap().is_empty());
        assert!(rig
            .emitter
            .kinds()
            .await
            .contains(&NotificationKind::OrderCreated));
    }

    #[tokio::test]
    async fn test_empty_cart_rejected() {
        let rig = TestRig::new();
        let err = rig
            .orders
            .create_order(Uuid::new_v4(), Uuid::new_v4(), "regular", None)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::EmptyCart));
    }

    #[tokio::test]
    async fn test_insufficient_stock_names_line_and_creates_nothing() {
        let rig = TestRig::new();
        let user = Uuid::new_v4();
        let plenty = rig.seed_variant(5_000, 0, 10).await;
        let scarce = rig.seed_variant(8_000, 0, 1).await;
        rig.seed_cart(user, &[(plenty, 2), (scarce, 3)]).await;

        let err = rig
            .orders
            .create_order(user, Uuid::new_v4(), "regular", None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::InsufficientStock { variant_id, requested: 3, available: 1 }
                if variant_id == scarce
        ));

        // No partial order, no partial reservation, cart untouched.
        assert_eq!(rig.ledger.available(plenty).await, 10);
        assert_eq!(rig.ledger.available(scarce).await, 1);
        assert_eq!(rig.cart.get_cart(user).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_checkout_of_last_unit() {
        let rig = std::sync::Arc::new(TestRig::new());
        let variant = rig.seed_variant(9_900, 0, 1).await;

        let users = [Uuid::new_v4(), Uuid::new_v4()];
        for user in &users {
            rig.seed_cart(*user, &[(variant, 1)]).await;
        }

        let results = join_all(users.map(|user| {
            let rig = rig.clone();
            tokio::spawn(async move {
                rig.orders
                    .create_order(user, Uuid::new_v4(), "regular", None)
                    .await
            })
        }))
        .await;

        let mut wins = 0;
        let mut stock_failures = 0;
        for result in results {
            match result.unwrap() {
                Ok(_) => wins += 1,
                Err(EngineError::InsufficientStock { .. }) => stock_failures += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(wins, 1);
        assert_eq!(stock_failures, 1);
        assert_eq!(rig.ledger.available(variant).await, 0);
    }

    #[tokio::test]
    async fn test_notification_failure_does_not_fail_creation() {
        let rig = TestRig::new();
        rig.emitter.fail_next().await;
        let user = Uuid::new_v4();
        let variant = rig.seed_variant(2_000, 0, 4).await;
        rig.seed_cart(user, &[(variant, 1)]).await;

        let order = rig
            .orders
            .create_order(user, Uuid::new_v4(), "regular", None)
            .await
            .unwrap();
        assert_eq!(order.status, OrderStatus::Pending);
    }

    #[tokio::test]
    async fn test_cancel_pending_order_releases_stock() {
        let rig = TestRig::new();
        let user = Uuid::new_v4();
        let variant = rig.seed_variant(2_000, 0, 6).await;
        rig.seed_cart(user, &[(variant, 4)]).await;

        let order = rig
            .orders
            .create_order(user, Uuid::new_v4(), "regular", None)
            .await
            .unwrap();
        assert_eq!(rig.ledger.available(variant).await, 2);

        let cancelled = rig.orders.cancel_order(order.id, user).await.unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert_eq!(rig.ledger.available(variant).await, 6);

        // A second cancel must not double-release.
        let err = rig.orders.cancel_order(order.id, user).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidState(_)));
        assert_eq!(rig.ledger.available(variant).await, 6);
    }

    #[tokio::test]
    async fn test_cancel_hides_other_users_orders() {
        let rig = TestRig::new();
        let owner = Uuid::new_v4();
        let variant = rig.seed_variant(2_000, 0, 2).await;
        rig.seed_cart(owner, &[(variant, 1)]).await;
        let order = rig
            .orders
            .create_order(owner, Uuid::new_v4(), "regular", None)
            .await
            .unwrap();

        let err = rig
            .orders
            .cancel_order(order.id, Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound { entity: "order", .. }));
    }

    #[tokio::test]
    async fn test_cancel_rejected_after_shipping() {
        let rig = TestRig::new();
        let user = Uuid::new_v4();
        let order = rig.paid_order(user, 2).await;

        rig.orders
            .mark_shipped(order.id, "JNE-555".into())
            .await
            .unwrap();
        let err = rig.orders.cancel_order(order.id, user).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidState(_)));

        rig.orders.mark_delivered(order.id).await.unwrap();
        let err = rig.orders.cancel_order(order.id, user).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_cancel_paid_order_routes_to_refund() {
        let rig = TestRig::new();
        let user = Uuid::new_v4();
        let order = rig.paid_order(user, 1).await;

        let err = rig.orders.cancel_order(order.id, user).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidState(ref msg) if msg.contains("refund")));
    }

    #[tokio::test]
    async fn test_shipping_transitions() {
        let rig = TestRig::new();
        let user = Uuid::new_v4();
        let order = rig.paid_order(user, 1).await;

        // Cannot deliver before shipping.
        let err = rig.orders.mark_delivered(order.id).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidState(_)));

        let shipped = rig
            .orders
            .mark_shipped(order.id, "SICEPAT-42".into())
            .await
            .unwrap();
        assert_eq!(shipped.status, OrderStatus::Shipped);
        assert_eq!(shipped.tracking_number.as_deref(), Some("SICEPAT-42"));

        let delivered = rig.orders.mark_delivered(order.id).await.unwrap();
        assert_eq!(delivered.status, OrderStatus::Delivered);
    }

    #[tokio::test]
    async fn test_get_order_not_found() {
        let rig = TestRig::new();
        let err = rig.orders.get_order(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound { entity: "order", .. }));
    }

    #[tokio::test]
    async fn test_absurd_quantity_fails_as_validation() {
        let rig = TestRig::new();
        let user = Uuid::new_v4();

        let variant = Uuid::new_v4();
        rig.catalog
            .set_price(
                variant,
                crate::engine::ports::PriceQuote {
                    unit_price: 10_000,
                    discount_per_unit: 0,
                    weight_grams: u32::MAX,
                },
            )
            .await;
        rig.ledger.set_stock(variant, u32::MAX).await;
        rig.seed_cart(user, &[(variant, 2)]).await;

        // Weight arithmetic overflows; the order must fail cleanly, not
        // panic, and nothing may be reserved.
        let err = rig
            .orders
            .create_order(user, Uuid::new_v4(), "regular", None)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
        assert_eq!(rig.ledger.available(variant).await, u32::MAX);
    }
}
