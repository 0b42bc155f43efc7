use uuid::Uuid;

use crate::utils::retry::IsTransient;

// ============================================================================
// Engine Error Taxonomy
// ============================================================================
//
// Every business-rule violation is a typed error returned to the immediate
// caller; nothing is swallowed. Notification failures are the single
// exception and are logged at the call site instead.
//
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("cart is empty")]
    EmptyCart,

    #[error("insufficient stock for variant {variant_id}: requested {requested}, available {available}")]
    InsufficientStock {
        variant_id: Uuid,
        requested: u32,
        available: u32,
    },

    #[error("operation not allowed: {0}")]
    InvalidState(String),

    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    #[error("payment gateway error: {message}")]
    Gateway { message: String, transient: bool },

    #[error("unrecognized gateway status: {0}")]
    UnknownStatus(String),

    #[error("store error: {0}")]
    Store(String),
}

impl EngineError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState(message.into())
    }

    pub fn not_found(entity: &'static str, key: impl ToString) -> Self {
        Self::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    pub fn gateway(message: impl Into<String>, transient: bool) -> Self {
        Self::Gateway {
            message: message.into(),
            transient,
        }
    }
}

impl IsTransient for EngineError {
    fn is_transient(&self) -> bool {
        matches!(self, Self::Gateway { transient: true, .. })
    }
}
