use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::errors::EngineError;
use crate::domain::order::{Order, OrderTransition};
use crate::domain::payment::{Payment, PaymentTransition};

pub mod memory;

// ============================================================================
// Persistence Contracts
// ============================================================================
//
// The engine owns these interfaces, not their mechanics. The one hard
// requirement is that `apply_transition` is atomic: the status check and
// the write happen under the same guard, so concurrent webhook deliveries
// and cancels serialize on the record.
//
// ============================================================================

/// Result of a conditional transition.
#[derive(Debug)]
pub enum Applied<T> {
    /// The transition was legal and is now committed.
    Done(T),
    /// The transition was not legal from the record's current status;
    /// carries the untouched current state so the caller can decide
    /// between duplicate-no-op and conflict.
    Unchanged(T),
}

#[derive(Debug, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// The generated order number is already taken; caller regenerates.
    DuplicateNumber,
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn insert(&self, order: Order) -> Result<InsertOutcome, EngineError>;

    async fn find(&self, id: Uuid) -> Result<Option<Order>, EngineError>;

    /// Atomically validate and apply a transition against the current
    /// record. Returns `NotFound` if the order does not exist.
    async fn apply_transition(
        &self,
        id: Uuid,
        transition: OrderTransition,
    ) -> Result<Applied<Order>, EngineError>;
}

#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn insert(&self, payment: Payment) -> Result<(), EngineError>;

    async fn find(&self, id: Uuid) -> Result<Option<Payment>, EngineError>;

    /// Webhook lookup path; the transaction id is the idempotency key.
    async fn find_by_transaction_id(&self, transaction_id: &str)
        -> Result<Option<Payment>, EngineError>;

    async fn apply_transition(
        &self,
        id: Uuid,
        transition: PaymentTransition,
    ) -> Result<Applied<Payment>, EngineError>;

    /// Record a contradictory terminal notification for manual review.
    async fn record_conflict(&self, id: Uuid) -> Result<(), EngineError>;

    /// Payments still `pending` whose expiry timestamp has passed.
    async fn list_expired_pending(&self, now: DateTime<Utc>)
        -> Result<Vec<Payment>, EngineError>;
}
