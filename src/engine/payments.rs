use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::domain::errors::EngineError;
use crate::domain::order::{OrderStatus, OrderTransition};
use crate::domain::payment::{
    GatewayStatus, Payment, PaymentMethod, PaymentStatus, PaymentTransition,
};
use crate::store::{Applied, OrderStore, PaymentStore};
use crate::utils::retry::retry_transient;

use super::inventory::InventoryLedger;
use super::ports::{
    ChargeItem, ChargeRequest, NotificationEmitter, NotificationKind, PaymentGateway,
};

// ============================================================================
// Payment Service - Initiation & Reconciliation
// ============================================================================
//
// The reconciler applies the gateway's authoritative status to the local
// payment and cascades to the order. Every status change goes through a
// conditional transition keyed on the current status, which is what makes
// duplicate webhook deliveries no-ops and contradictory ones first-writer-
// wins conflicts.
//
// Gateway calls happen outside any local guard: charge before the payment
// row exists, refund before the status flips. No lock is held across
// network I/O.
//
// ============================================================================

pub struct PaymentService {
    orders: Arc<dyn OrderStore>,
    payments: Arc<dyn PaymentStore>,
    ledger: Arc<InventoryLedger>,
    gateway: Arc<dyn PaymentGateway>,
    notifier: Arc<dyn NotificationEmitter>,
    config: EngineConfig,
}

impl PaymentService {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        payments: Arc<dyn PaymentStore>,
        ledger: Arc<InventoryLedger>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn NotificationEmitter>,
        config: EngineConfig,
    ) -> Self {
        Self {
            orders,
            payments,
            ledger,
            gateway,
            notifier,
            config,
        }
    }

    /// Create the external transaction and the local `pending` payment.
    ///
    /// The order's payment slot is claimed before the gateway is called:
    /// of two concurrent initiations only the claim winner reaches the
    /// gateway, so the order can never be charged twice. The charge is
    /// issued before the payment row is persisted; if it fails, the claim
    /// is handed back and no payment row exists.
    pub async fn initiate_payment(
        &self,
        order_id: Uuid,
        method: PaymentMethod,
    ) -> Result<Payment, EngineError> {
        let order = self
            .orders
            .find(order_id)
            .await?
            .ok_or_else(|| EngineError::not_found("order", order_id))?;
        if order.status != OrderStatus::Pending {
            return Err(EngineError::invalid_state(format!(
                "cannot initiate payment for order {} in status {}",
                order.order_number, order.status
            )));
        }
        if let Some(existing_id) = order.payment_id {
            match self.payments.find(existing_id).await? {
                Some(existing)
                    if matches!(
                        existing.status,
                        PaymentStatus::Pending | PaymentStatus::Paid
                    ) =>
                {
                    return Err(EngineError::invalid_state(format!(
                        "order {} already has an active payment ({})",
                        order.order_number, existing.transaction_id
                    )));
                }
                Some(_) => {
                    // Terminal payment: free the slot so this attempt can
                    // retry with a fresh record. `Unchanged` means a
                    // concurrent retry already freed it.
                    self.orders
                        .apply_transition(
                            order.id,
                            OrderTransition::UnlinkPayment {
                                payment_id: existing_id,
                            },
                        )
                        .await?;
                }
                None => {
                    // The slot is held but the row is not visible yet: an
                    // initiation is mid-charge.
                    return Err(EngineError::invalid_state(format!(
                        "a payment for order {} is already being initiated",
                        order.order_number
                    )));
                }
            }
        }

        // Claim the slot before touching the gateway. The loser of a
        // concurrent initiation stops here and never charges.
        let payment_id = Uuid::new_v4();
        match self
            .orders
            .apply_transition(order.id, OrderTransition::LinkPayment { payment_id })
            .await?
        {
            Applied::Done(_) => {}
            Applied::Unchanged(current) => {
                return Err(EngineError::invalid_state(format!(
                    "order {} already has a payment in flight",
                    current.order_number
                )));
            }
        }

        let request = ChargeRequest {
            order_ref: order.order_number.clone(),
            amount: order.grand_total,
            method,
            customer_id: order.user_id,
            items: order
                .lines
                .iter()
                .map(|l| ChargeItem {
                    variant_id: l.variant_id,
                    quantity: l.quantity,
                    unit_price: l.unit_price,
                })
                .collect(),
        };
        // Not retried here: a duplicate charge without an idempotency key
        // would double-bill.
        let response = match self.gateway.charge(&request).await {
            Ok(response) => response,
            Err(error) => {
                self.release_payment_slot(order.id, payment_id).await;
                return Err(error);
            }
        };

        let payment = match Payment::new(
            payment_id,
            order.id,
            method,
            order.grand_total,
            response.transaction_id,
            response.redirect_url,
            response.token,
            response.va_number,
            response.channel,
            Utc::now() + self.config.payment_expiry,
        ) {
            Ok(payment) => payment,
            Err(error) => {
                self.release_payment_slot(order.id, payment_id).await;
                return Err(error);
            }
        };
        if let Err(error) = self.payments.insert(payment.clone()).await {
            self.release_payment_slot(order.id, payment_id).await;
            return Err(error);
        }

        tracing::info!(
            order_number = %order.order_number,
            transaction_id = %payment.transaction_id,
            amount = payment.amount,
            method = %method,
            "payment initiated"
        );
        Ok(payment)
    }

    /// Hand the payment slot back after a failed initiation so the order
    /// can be charged again.
    async fn release_payment_slot(&self, order_id: Uuid, payment_id: Uuid) {
        match self
            .orders
            .apply_transition(order_id, OrderTransition::UnlinkPayment { payment_id })
            .await
        {
            Ok(Applied::Done(_)) => {}
            Ok(Applied::Unchanged(current)) => {
                tracing::warn!(
                    order_number = %current.order_number,
                    "payment slot was already released"
                );
            }
            Err(error) => {
                tracing::error!(
                    order_id = %order_id,
                    error = %error,
                    "failed to release payment slot after charge failure"
                );
            }
        }
    }

    /// Apply a gateway status to the payment identified by its transaction
    /// id. Called from the webhook path and from manual/poll checks.
    ///
    /// Duplicate deliveries of the same terminal status are acknowledged
    /// without re-applying side effects. A *different* terminal status than
    /// the recorded one is a conflict: the existing status stays, the
    /// conflict is counted for review, and the gateway still gets an ack so
    /// it stops retrying.
    pub async fn reconcile_notification(
        &self,
        transaction_id: &str,
        status: GatewayStatus,
    ) -> Result<(), EngineError> {
        let payment = self
            .payments
            .find_by_transaction_id(transaction_id)
            .await?
            .ok_or_else(|| EngineError::not_found("payment", transaction_id))?;

        let Some(target) = status.target_status() else {
            tracing::debug!(transaction_id, "gateway still pending, nothing to apply");
            return Ok(());
        };

        let transition = match target {
            PaymentStatus::Paid => PaymentTransition::MarkPaid { at: Utc::now() },
            PaymentStatus::Failed => PaymentTransition::MarkFailed {
                reason: format!("gateway reported {status}"),
            },
            PaymentStatus::Expired => PaymentTransition::MarkExpired,
            PaymentStatus::Refunded => PaymentTransition::MarkRefunded {
                amount: payment.amount,
                reason: "refund reported by gateway".into(),
                at: Utc::now(),
            },
            PaymentStatus::Pending => unreachable!("target_status never yields pending"),
        };

        match self.payments.apply_transition(payment.id, transition).await? {
            Applied::Done(updated) => self.cascade(&updated).await,
            Applied::Unchanged(current) => {
                if current.status == target {
                    tracing::debug!(
                        transaction_id,
                        status = %current.status,
                        "duplicate notification, re-driving downstream effects"
                    );
                    // A redelivery repairs a cascade that failed after the
                    // payment committed; the order transition guard keeps
                    // every side effect single-shot.
                    self.cascade(&current).await
                } else {
                    tracing::warn!(
                        transaction_id,
                        recorded = %current.status,
                        incoming = %target,
                        "conflicting terminal notification; keeping first-writer status"
                    );
                    self.payments.record_conflict(current.id).await?;
                    Ok(())
                }
            }
        }
    }

    /// Follow a committed payment transition through to the order, the
    /// stock ledger, and notifications. The payment row is already
    /// terminal at this point, so a failure in here is recoverable: a
    /// redelivered notification re-drives the cascade, and the order
    /// transition guard keeps the stock release single-shot.
    async fn cascade(&self, payment: &Payment) -> Result<(), EngineError> {
        match payment.status {
            PaymentStatus::Paid => {
                match self
                    .orders
                    .apply_transition(payment.order_id, OrderTransition::MarkProcessing)
                    .await?
                {
                    Applied::Done(order) => {
                        self.emit(
                            order.user_id,
                            NotificationKind::PaymentReceived,
                            json!({
                                "order_number": order.order_number,
                                "amount": payment.amount,
                                "transaction_id": payment.transaction_id,
                            }),
                        )
                        .await;
                        tracing::info!(
                            order_number = %order.order_number,
                            transaction_id = %payment.transaction_id,
                            "payment settled, order processing"
                        );
                    }
                    Applied::Unchanged(order) => {
                        tracing::debug!(
                            order_number = %order.order_number,
                            status = %order.status,
                            "order already advanced; settlement effects in place"
                        );
                    }
                }
                Ok(())
            }
            PaymentStatus::Failed | PaymentStatus::Expired => {
                // Winning the order's cancel transition is what authorizes
                // the stock release; it can only be won once.
                match self
                    .orders
                    .apply_transition(payment.order_id, OrderTransition::MarkCancelled)
                    .await?
                {
                    Applied::Done(order) => {
                        self.ledger.release_batch(&order.reserved_quantities()).await;
                        self.emit(
                            order.user_id,
                            NotificationKind::OrderCancelled,
                            json!({
                                "order_number": order.order_number,
                                "reason": payment.status.to_string(),
                            }),
                        )
                        .await;
                        tracing::info!(
                            order_number = %order.order_number,
                            payment_status = %payment.status,
                            "payment did not settle; stock released, order cancelled"
                        );
                    }
                    Applied::Unchanged(order) => {
                        tracing::debug!(
                            order_number = %order.order_number,
                            status = %order.status,
                            "order already left cancellable state; no release"
                        );
                    }
                }
                Ok(())
            }
            PaymentStatus::Refunded => {
                match self
                    .orders
                    .apply_transition(payment.order_id, OrderTransition::MarkRefunded)
                    .await?
                {
                    Applied::Done(order) => {
                        self.emit(
                            order.user_id,
                            NotificationKind::OrderRefunded,
                            json!({
                                "order_number": order.order_number,
                                "refund_amount": payment.refund_amount,
                            }),
                        )
                        .await;
                        tracing::info!(
                            order_number = %order.order_number,
                            refund_amount = payment.refund_amount,
                            "payment refunded"
                        );
                    }
                    Applied::Unchanged(order) => {
                        tracing::debug!(
                            order_number = %order.order_number,
                            status = %order.status,
                            "order already reflects the refund"
                        );
                    }
                }
                Ok(())
            }
            PaymentStatus::Pending => Ok(()),
        }
    }

    /// Refund a settled payment, fully or partially. Partial refunds still
    /// land on the terminal `refunded` status.
    pub async fn refund_payment(
        &self,
        payment_id: Uuid,
        amount: i64,
        reason: &str,
    ) -> Result<Payment, EngineError> {
        let payment = self
            .payments
            .find(payment_id)
            .await?
            .ok_or_else(|| EngineError::not_found("payment", payment_id))?;
        if payment.status != PaymentStatus::Paid {
            return Err(EngineError::invalid_state(format!(
                "cannot refund payment {} in status {}",
                payment.transaction_id, payment.status
            )));
        }
        if amount <= 0 {
            return Err(EngineError::validation("refund amount must be positive"));
        }
        if amount > payment.amount {
            return Err(EngineError::validation(format!(
                "refund amount {amount} exceeds payment amount {}",
                payment.amount
            )));
        }

        // Take the refund claim before calling out. Of two concurrent
        // refund requests only the claim winner reaches the gateway.
        match self
            .payments
            .apply_transition(payment.id, PaymentTransition::ClaimRefund)
            .await?
        {
            Applied::Done(_) => {}
            Applied::Unchanged(current) if current.status == PaymentStatus::Refunded => {
                return Err(EngineError::invalid_state(format!(
                    "payment {} is already refunded",
                    current.transaction_id
                )));
            }
            Applied::Unchanged(current) => {
                return Err(EngineError::invalid_state(format!(
                    "a refund of payment {} is already in progress",
                    current.transaction_id
                )));
            }
        }

        if let Err(error) = self
            .gateway
            .refund(&payment.transaction_id, amount, reason)
            .await
        {
            // Hand the claim back so the refund can be retried.
            if let Err(release_error) = self
                .payments
                .apply_transition(payment.id, PaymentTransition::ReleaseRefundClaim)
                .await
            {
                tracing::error!(
                    transaction_id = %payment.transaction_id,
                    error = %release_error,
                    "failed to release refund claim after gateway failure"
                );
            }
            return Err(error);
        }

        match self
            .payments
            .apply_transition(
                payment.id,
                PaymentTransition::MarkRefunded {
                    amount,
                    reason: reason.to_string(),
                    at: Utc::now(),
                },
            )
            .await?
        {
            Applied::Done(updated) => {
                self.cascade(&updated).await?;
                Ok(updated)
            }
            Applied::Unchanged(current) if current.status == PaymentStatus::Refunded => {
                // A gateway-initiated refund notification won the race;
                // both paths converge on the same terminal state.
                Ok(current)
            }
            Applied::Unchanged(current) => Err(EngineError::invalid_state(format!(
                "payment {} moved to {} during refund",
                current.transaction_id, current.status
            ))),
        }
    }

    /// Poll the gateway for the current status and reconcile it, for
    /// payments whose webhook may have been lost. The status query is
    /// idempotent, so transient gateway failures are retried with backoff.
    pub async fn refresh_status(&self, payment_id: Uuid) -> Result<Payment, EngineError> {
        let payment = self
            .payments
            .find(payment_id)
            .await?
            .ok_or_else(|| EngineError::not_found("payment", payment_id))?;
        if payment.status != PaymentStatus::Pending {
            return Ok(payment);
        }

        let gateway = self.gateway.clone();
        let transaction_id = payment.transaction_id.clone();
        let status = retry_transient(&self.config.retry, || {
            let gateway = gateway.clone();
            let transaction_id = transaction_id.clone();
            async move { gateway.query_status(&transaction_id).await }
        })
        .await?;

        self.reconcile_notification(&payment.transaction_id, status)
            .await?;
        self.payments
            .find(payment_id)
            .await?
            .ok_or_else(|| EngineError::not_found("payment", payment_id))
    }

    /// Expire every payment still `pending` past its expiry timestamp,
    /// driving the same path an `expire` webhook would. Returns how many
    /// were expired.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<u32, EngineError> {
        let stale = self.payments.list_expired_pending(now).await?;
        let mut expired = 0;
        for payment in stale {
            match self
                .payments
                .apply_transition(payment.id, PaymentTransition::MarkExpired)
                .await?
            {
                Applied::Done(updated) => {
                    self.cascade(&updated).await?;
                    expired += 1;
                }
                Applied::Unchanged(current) => {
                    tracing::debug!(
                        transaction_id = %current.transaction_id,
                        status = %current.status,
                        "payment settled between listing and expiry"
                    );
                }
            }
        }
        if expired > 0 {
            tracing::info!(expired, "expired stale pending payments");
        }
        Ok(expired)
    }

    pub async fn get_payment(&self, payment_id: Uuid) -> Result<Payment, EngineError> {
        self.payments
            .find(payment_id)
            .await?
            .ok_or_else(|| EngineError::not_found("payment", payment_id))
    }

    async fn emit(&self, user_id: Uuid, kind: NotificationKind, payload: serde_json::Value) {
        if let Err(error) = self.notifier.notify(user_id, kind, payload).await {
            tracing::warn!(kind = ?kind, error = %error, "notification emit failed");
        }
    }
}
