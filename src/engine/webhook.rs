use serde::Deserialize;
use sha2::{Digest, Sha512};

use crate::domain::errors::EngineError;
use crate::domain::payment::GatewayStatus;

// ============================================================================
// Gateway Notification Payload
// ============================================================================
//
// The HTTP webhook handler lives outside the engine; what belongs here is
// strict payload handling: parse the gateway's JSON, verify its signature,
// and map the status string into the closed vocabulary. Malformed or
// unauthenticated payloads are rejected — the sender gets a failure and
// retries. Everything past this point acks even on a no-op, so the
// gateway stops redelivering.
//
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct GatewayNotification {
    pub transaction_id: String,
    pub order_id: String,
    pub status_code: String,
    pub gross_amount: String,
    pub transaction_status: String,
    pub signature_key: String,
}

/// Parse and authenticate a raw webhook body. Returns the transaction id
/// and parsed status, ready for `PaymentService::reconcile_notification`.
pub fn parse_notification(
    raw: &str,
    server_key: &str,
) -> Result<(String, GatewayStatus), EngineError> {
    let notification: GatewayNotification = serde_json::from_str(raw)
        .map_err(|e| EngineError::validation(format!("malformed notification payload: {e}")))?;

    let expected = signature(
        &notification.order_id,
        &notification.status_code,
        &notification.gross_amount,
        server_key,
    );
    if expected != notification.signature_key {
        return Err(EngineError::validation("notification signature mismatch"));
    }

    let status = GatewayStatus::parse(&notification.transaction_status)?;
    Ok((notification.transaction_id, status))
}

/// SHA-512 over `order_id + status_code + gross_amount + server_key`,
/// hex-encoded — the gateway's documented signing scheme.
pub fn signature(order_id: &str, status_code: &str, gross_amount: &str, server_key: &str) -> String {
    let mut hasher = Sha512::new();
    hasher.update(order_id.as_bytes());
    hasher.update(status_code.as_bytes());
    hasher.update(gross_amount.as_bytes());
    hasher.update(server_key.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SERVER_KEY: &str = "test-server-key";

    fn signed_payload(status: &str) -> String {
        let sig = signature("ORD-20260829-K7M2QX", "200", "32500", SERVER_KEY);
        serde_json::json!({
            "transaction_id": "TXN-000001",
            "order_id": "ORD-20260829-K7M2QX",
            "status_code": "200",
            "gross_amount": "32500",
            "transaction_status": status,
            "signature_key": sig,
        })
        .to_string()
    }

    #[test]
    fn test_valid_settlement_payload() {
        let (transaction_id, status) =
            parse_notification(&signed_payload("settlement"), SERVER_KEY).unwrap();
        assert_eq!(transaction_id, "TXN-000001");
        assert_eq!(status, GatewayStatus::Settlement);
    }

    #[test]
    fn test_malformed_payload_rejected() {
        let err = parse_notification("{not json", SERVER_KEY).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));

        let err = parse_notification(r#"{"transaction_id": "TXN-1"}"#, SERVER_KEY).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[test]
    fn test_bad_signature_rejected() {
        let err = parse_notification(&signed_payload("settlement"), "other-key").unwrap_err();
        assert!(matches!(err, EngineError::Validation(ref m) if m.contains("signature")));
    }

    #[test]
    fn test_unknown_status_rejected_after_authentication() {
        let err = parse_notification(&signed_payload("chargeback"), SERVER_KEY).unwrap_err();
        assert!(matches!(err, EngineError::UnknownStatus(ref s) if s == "chargeback"));
    }

    #[test]
    fn test_signature_is_stable() {
        let a = signature("A", "200", "1000", "k");
        let b = signature("A", "200", "1000", "k");
        assert_eq!(a, b);
        assert_eq!(a.len(), 128);
        assert_ne!(a, signature("A", "200", "1001", "k"));
    }
}
