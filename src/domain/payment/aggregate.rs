use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::errors::EngineError;

use super::value_objects::{PaymentMethod, PaymentStatus};

// ============================================================================
// Payment Aggregate - Domain Logic
// ============================================================================
//
// One active payment per order. Mutated only by the reconciler through
// `apply`; a payment is never deleted, only transitioned to a terminal
// status. The gateway transaction id is the idempotency key for webhook
// processing.
//
// Lifecycle: pending → paid | failed | expired
//            paid → refunded
//
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub order_id: Uuid,
    pub method: PaymentMethod,
    /// Equals the order's grand total at creation, minor units.
    pub amount: i64,
    pub status: PaymentStatus,
    pub transaction_id: String,
    pub redirect_url: Option<String>,
    pub token: Option<String>,
    pub va_number: Option<String>,
    pub channel: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    pub refund_amount: i64,
    pub refund_reason: Option<String>,
    pub refund_date: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
    /// Set while a customer-initiated refund holds the payment; makes the
    /// gateway refund call single-shot under concurrent requests.
    pub refund_claimed: bool,
    /// Contradictory terminal notifications observed after settlement.
    /// First writer wins; conflicts are counted for manual review.
    pub conflict_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub enum PaymentTransition {
    MarkPaid { at: DateTime<Utc> },
    MarkFailed { reason: String },
    MarkExpired,
    MarkRefunded {
        amount: i64,
        reason: String,
        at: DateTime<Utc>,
    },
    /// Take the refund claim on a settled payment; fails while another
    /// refund holds it.
    ClaimRefund,
    /// Hand the refund claim back after a gateway failure.
    ReleaseRefundClaim,
}

impl PaymentTransition {
    pub fn target_status(&self) -> PaymentStatus {
        match self {
            Self::MarkPaid { .. } => PaymentStatus::Paid,
            Self::MarkFailed { .. } => PaymentStatus::Failed,
            Self::MarkExpired => PaymentStatus::Expired,
            Self::MarkRefunded { .. } => PaymentStatus::Refunded,
            // Claim handling never changes the status.
            Self::ClaimRefund | Self::ReleaseRefundClaim => PaymentStatus::Paid,
        }
    }
}

impl Payment {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: Uuid,
        order_id: Uuid,
        method: PaymentMethod,
        amount: i64,
        transaction_id: String,
        redirect_url: Option<String>,
        token: Option<String>,
        va_number: Option<String>,
        channel: Option<String>,
        expires_at: DateTime<Utc>,
    ) -> Result<Self, EngineError> {
        if amount <= 0 {
            return Err(EngineError::validation("payment amount must be positive"));
        }
        if transaction_id.is_empty() {
            return Err(EngineError::validation(
                "gateway transaction id must not be empty",
            ));
        }
        let now = Utc::now();
        Ok(Self {
            id,
            order_id,
            method,
            amount,
            status: PaymentStatus::Pending,
            transaction_id,
            redirect_url,
            token,
            va_number,
            channel,
            paid_at: None,
            expires_at,
            refund_amount: 0,
            refund_reason: None,
            refund_date: None,
            failure_reason: None,
            refund_claimed: false,
            conflict_count: 0,
            created_at: now,
            updated_at: now,
        })
    }

    /// Apply a transition under the store's write guard. `InvalidState`
    /// means the transition is not legal from the current status; that is
    /// what makes duplicate webhook deliveries observable as no-ops.
    pub fn apply(&mut self, transition: &PaymentTransition) -> Result<(), EngineError> {
        match transition {
            PaymentTransition::MarkPaid { at } => {
                self.require(PaymentStatus::Pending, "settle")?;
                self.status = PaymentStatus::Paid;
                self.paid_at = Some(*at);
            }
            PaymentTransition::MarkFailed { reason } => {
                self.require(PaymentStatus::Pending, "fail")?;
                self.status = PaymentStatus::Failed;
                self.failure_reason = Some(reason.clone());
            }
            PaymentTransition::MarkExpired => {
                self.require(PaymentStatus::Pending, "expire")?;
                self.status = PaymentStatus::Expired;
            }
            PaymentTransition::MarkRefunded { amount, reason, at } => {
                self.require(PaymentStatus::Paid, "refund")?;
                if *amount <= 0 {
                    return Err(EngineError::validation("refund amount must be positive"));
                }
                if *amount > self.amount {
                    return Err(EngineError::validation(format!(
                        "refund amount {amount} exceeds payment amount {}",
                        self.amount
                    )));
                }
                self.status = PaymentStatus::Refunded;
                self.refund_amount = *amount;
                self.refund_reason = Some(reason.clone());
                self.refund_date = Some(*at);
                self.refund_claimed = false;
            }
            PaymentTransition::ClaimRefund => {
                self.require(PaymentStatus::Paid, "claim a refund on")?;
                if self.refund_claimed {
                    return Err(EngineError::invalid_state(format!(
                        "a refund of payment {} is already in progress",
                        self.transaction_id
                    )));
                }
                self.refund_claimed = true;
            }
            PaymentTransition::ReleaseRefundClaim => {
                if !self.refund_claimed {
                    return Err(EngineError::invalid_state(format!(
                        "no refund claim held on payment {}",
                        self.transaction_id
                    )));
                }
                self.refund_claimed = false;
            }
        }
        self.updated_at = Utc::now();
        Ok(())
    }

    fn require(&self, expected: PaymentStatus, action: &str) -> Result<(), EngineError> {
        if self.status != expected {
            return Err(EngineError::invalid_state(format!(
                "cannot {action} payment {} in status {}",
                self.transaction_id, self.status
            )));
        }
        Ok(())
    }

    pub fn is_expired_by(&self, now: DateTime<Utc>) -> bool {
        self.status == PaymentStatus::Pending && self.expires_at <= now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn pending_payment(amount: i64) -> Payment {
        Payment::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            PaymentMethod::BankTransfer,
            amount,
            "TXN-000001".into(),
            Some("https://gateway.test/redirect/abc".into()),
            Some("tok_abc".into()),
            None,
            None,
            Utc::now() + Duration::hours(24),
        )
        .unwrap()
    }

    #[test]
    fn test_settle_then_refund() {
        let mut payment = pending_payment(10_000);
        let paid_at = Utc::now();

        payment
            .apply(&PaymentTransition::MarkPaid { at: paid_at })
            .unwrap();
        assert_eq!(payment.status, PaymentStatus::Paid);
        assert_eq!(payment.paid_at, Some(paid_at));

        payment
            .apply(&PaymentTransition::MarkRefunded {
                amount: 10_000,
                reason: "damaged item".into(),
                at: Utc::now(),
            })
            .unwrap();
        assert_eq!(payment.status, PaymentStatus::Refunded);
        assert_eq!(payment.refund_amount, 10_000);
        assert_eq!(payment.refund_reason.as_deref(), Some("damaged item"));
        assert!(payment.refund_date.is_some());
    }

    #[test]
    fn test_refund_requires_paid() {
        let mut payment = pending_payment(10_000);
        let err = payment
            .apply(&PaymentTransition::MarkRefunded {
                amount: 10_000,
                reason: "nope".into(),
                at: Utc::now(),
            })
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidState(_)));
        assert_eq!(payment.status, PaymentStatus::Pending);
    }

    #[test]
    fn test_refund_cannot_exceed_amount() {
        let mut payment = pending_payment(10_000);
        payment
            .apply(&PaymentTransition::MarkPaid { at: Utc::now() })
            .unwrap();
        let err = payment
            .apply(&PaymentTransition::MarkRefunded {
                amount: 10_001,
                reason: "too much".into(),
                at: Utc::now(),
            })
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
        assert_eq!(payment.status, PaymentStatus::Paid);
    }

    #[test]
    fn test_terminal_statuses_accept_nothing_further() {
        let mut payment = pending_payment(5_000);
        payment
            .apply(&PaymentTransition::MarkFailed {
                reason: "deny".into(),
            })
            .unwrap();

        for transition in [
            PaymentTransition::MarkPaid { at: Utc::now() },
            PaymentTransition::MarkExpired,
            PaymentTransition::MarkFailed {
                reason: "again".into(),
            },
        ] {
            let err = payment.apply(&transition).unwrap_err();
            assert!(matches!(err, EngineError::InvalidState(_)));
        }
        assert_eq!(payment.status, PaymentStatus::Failed);
    }

    #[test]
    fn test_zero_amount_rejected() {
        let err = Payment::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            PaymentMethod::Qris,
            0,
            "TXN-1".into(),
            None,
            None,
            None,
            None,
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[test]
    fn test_refund_claim_is_exclusive() {
        let mut payment = pending_payment(10_000);
        payment
            .apply(&PaymentTransition::MarkPaid { at: Utc::now() })
            .unwrap();

        payment.apply(&PaymentTransition::ClaimRefund).unwrap();
        let err = payment.apply(&PaymentTransition::ClaimRefund).unwrap_err();
        assert!(matches!(err, EngineError::InvalidState(_)));

        // Release after a gateway failure re-opens the claim.
        payment
            .apply(&PaymentTransition::ReleaseRefundClaim)
            .unwrap();
        payment.apply(&PaymentTransition::ClaimRefund).unwrap();

        // Completing the refund clears the claim with it.
        payment
            .apply(&PaymentTransition::MarkRefunded {
                amount: 10_000,
                reason: "damaged item".into(),
                at: Utc::now(),
            })
            .unwrap();
        assert!(!payment.refund_claimed);
    }

    #[test]
    fn test_refund_claim_requires_paid() {
        let mut payment = pending_payment(10_000);
        let err = payment.apply(&PaymentTransition::ClaimRefund).unwrap_err();
        assert!(matches!(err, EngineError::InvalidState(_)));
        assert!(!payment.refund_claimed);
    }

    #[test]
    fn test_expiry_window() {
        let now = Utc::now();
        let mut payment = pending_payment(5_000);
        payment.expires_at = now - Duration::minutes(1);
        assert!(payment.is_expired_by(now));

        payment.apply(&PaymentTransition::MarkExpired).unwrap();
        // Already expired; the sweep must not pick it up again.
        assert!(!payment.is_expired_by(now));
    }
}
