use serde::{Deserialize, Serialize};

use crate::domain::errors::EngineError;

// ============================================================================
// Payment Value Objects
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
    Expired,
    Refunded,
}

impl PaymentStatus {
    /// `paid` is semi-terminal: the only transition out of it is a refund.
    /// `failed`/`expired`/`refunded` accept nothing further.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Failed => "failed",
            Self::Expired => "expired",
            Self::Refunded => "refunded",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    CreditCard,
    BankTransfer,
    Gopay,
    Shopeepay,
    Qris,
}

impl PaymentMethod {
    pub fn parse(raw: &str) -> Result<Self, EngineError> {
        match raw {
            "credit_card" => Ok(Self::CreditCard),
            "bank_transfer" => Ok(Self::BankTransfer),
            "gopay" => Ok(Self::Gopay),
            "shopeepay" => Ok(Self::Shopeepay),
            "qris" => Ok(Self::Qris),
            other => Err(EngineError::validation(format!(
                "unsupported payment method: {other}"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreditCard => "credit_card",
            Self::BankTransfer => "bank_transfer",
            Self::Gopay => "gopay",
            Self::Shopeepay => "shopeepay",
            Self::Qris => "qris",
        }
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Gateway Status Vocabulary
// ============================================================================
//
// The external gateway's status strings, modelled as a closed enum so every
// handler is forced to be exhaustive. Anything outside this vocabulary is
// rejected with `UnknownStatus`, never guessed at.
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayStatus {
    Capture,
    Settlement,
    Deny,
    Cancel,
    Failure,
    Expire,
    Pending,
    Refund,
}

impl GatewayStatus {
    pub fn parse(raw: &str) -> Result<Self, EngineError> {
        match raw {
            "capture" => Ok(Self::Capture),
            "settlement" => Ok(Self::Settlement),
            "deny" => Ok(Self::Deny),
            "cancel" => Ok(Self::Cancel),
            "failure" => Ok(Self::Failure),
            "expire" => Ok(Self::Expire),
            "pending" => Ok(Self::Pending),
            "refund" => Ok(Self::Refund),
            other => Err(EngineError::UnknownStatus(other.to_string())),
        }
    }

    /// Map to the internal status this notification drives the payment
    /// towards. `None` means the gateway still considers it pending and
    /// there is nothing to apply.
    pub fn target_status(&self) -> Option<PaymentStatus> {
        match self {
            Self::Capture | Self::Settlement => Some(PaymentStatus::Paid),
            Self::Deny | Self::Cancel | Self::Failure => Some(PaymentStatus::Failed),
            Self::Expire => Some(PaymentStatus::Expired),
            Self::Pending => None,
            Self::Refund => Some(PaymentStatus::Refunded),
        }
    }
}

impl std::fmt::Display for GatewayStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Capture => "capture",
            Self::Settlement => "settlement",
            Self::Deny => "deny",
            Self::Cancel => "cancel",
            Self::Failure => "failure",
            Self::Expire => "expire",
            Self::Pending => "pending",
            Self::Refund => "refund",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_vocabulary_roundtrip() {
        for raw in [
            "capture",
            "settlement",
            "deny",
            "cancel",
            "failure",
            "expire",
            "pending",
            "refund",
        ] {
            let status = GatewayStatus::parse(raw).unwrap();
            assert_eq!(status.to_string(), raw);
        }
    }

    #[test]
    fn test_unknown_status_is_rejected_not_guessed() {
        let err = GatewayStatus::parse("authorize").unwrap_err();
        assert!(matches!(err, EngineError::UnknownStatus(s) if s == "authorize"));
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            GatewayStatus::Settlement.target_status(),
            Some(PaymentStatus::Paid)
        );
        assert_eq!(
            GatewayStatus::Capture.target_status(),
            Some(PaymentStatus::Paid)
        );
        assert_eq!(
            GatewayStatus::Deny.target_status(),
            Some(PaymentStatus::Failed)
        );
        assert_eq!(
            GatewayStatus::Expire.target_status(),
            Some(PaymentStatus::Expired)
        );
        assert_eq!(
            GatewayStatus::Refund.target_status(),
            Some(PaymentStatus::Refunded)
        );
        assert_eq!(GatewayStatus::Pending.target_status(), None);
    }

    #[test]
    fn test_payment_method_parse() {
        assert_eq!(
            PaymentMethod::parse("bank_transfer").unwrap(),
            PaymentMethod::BankTransfer
        );
        let err = PaymentMethod::parse("cash_on_delivery").unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[test]
    fn test_only_pending_is_non_terminal() {
        assert!(!PaymentStatus::Pending.is_terminal());
        assert!(PaymentStatus::Paid.is_terminal());
        assert!(PaymentStatus::Failed.is_terminal());
        assert!(PaymentStatus::Expired.is_terminal());
        assert!(PaymentStatus::Refunded.is_terminal());
    }
}
