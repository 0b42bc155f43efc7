use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::errors::EngineError;
use crate::domain::order::{Order, OrderTransition};
use crate::domain::payment::{Payment, PaymentTransition};

use super::{Applied, InsertOutcome, OrderStore, PaymentStore};

// ============================================================================
// In-Memory Stores
// ============================================================================
//
// Single-process implementations of the persistence contracts. The write
// lock is the transaction boundary: a conditional transition validates and
// commits under one guard, which is the same serialization a row lock or
// conditional UPDATE gives a SQL-backed implementation.
//
// ============================================================================

#[derive(Default)]
pub struct MemoryOrderStore {
    inner: RwLock<OrderMaps>,
}

#[derive(Default)]
struct OrderMaps {
    orders: HashMap<Uuid, Order>,
    numbers: HashSet<String>,
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn insert(&self, order: Order) -> Result<InsertOutcome, EngineError> {
        let mut inner = self.inner.write().await;
        if inner.numbers.contains(&order.order_number) {
            return Ok(InsertOutcome::DuplicateNumber);
        }
        if inner.orders.contains_key(&order.id) {
            return Err(EngineError::Store(format!(
                "order {} already exists",
                order.id
            )));
        }
        inner.numbers.insert(order.order_number.clone());
        inner.orders.insert(order.id, order);
        Ok(InsertOutcome::Inserted)
    }

    async fn find(&self, id: Uuid) -> Result<Option<Order>, EngineError> {
        Ok(self.inner.read().await.orders.get(&id).cloned())
    }

    async fn apply_transition(
        &self,
        id: Uuid,
        transition: OrderTransition,
    ) -> Result<Applied<Order>, EngineError> {
        let mut inner = self.inner.write().await;
        let order = inner
            .orders
            .get_mut(&id)
            .ok_or_else(|| EngineError::not_found("order", id))?;

        let mut next = order.clone();
        match next.apply(&transition) {
            Ok(()) => {
                *order = next.clone();
                Ok(Applied::Done(next))
            }
            Err(EngineError::InvalidState(_)) => Ok(Applied::Unchanged(order.clone())),
            Err(other) => Err(other),
        }
    }
}

#[derive(Default)]
pub struct MemoryPaymentStore {
    inner: RwLock<PaymentMaps>,
}

#[derive(Default)]
struct PaymentMaps {
    payments: HashMap<Uuid, Payment>,
    by_transaction: HashMap<String, Uuid>,
}

#[async_trait]
impl PaymentStore for MemoryPaymentStore {
    async fn insert(&self, payment: Payment) -> Result<(), EngineError> {
        let mut inner = self.inner.write().await;
        if inner.by_transaction.contains_key(&payment.transaction_id) {
            return Err(EngineError::Store(format!(
                "transaction id {} already recorded",
                payment.transaction_id
            )));
        }
        inner
            .by_transaction
            .insert(payment.transaction_id.clone(), payment.id);
        inner.payments.insert(payment.id, payment);
        Ok(())
    }

    async fn find(&self, id: Uuid) -> Result<Option<Payment>, EngineError> {
        Ok(self.inner.read().await.payments.get(&id).cloned())
    }

    async fn find_by_transaction_id(
        &self,
        transaction_id: &str,
    ) -> Result<Option<Payment>, EngineError> {
        let inner = self.inner.read().await;
        Ok(inner
            .by_transaction
            .get(transaction_id)
            .and_then(|id| inner.payments.get(id))
            .cloned())
    }

    async fn apply_transition(
        &self,
        id: Uuid,
        transition: PaymentTransition,
    ) -> Result<Applied<Payment>, EngineError> {
        let mut inner = self.inner.write().await;
        let payment = inner
            .payments
            .get_mut(&id)
            .ok_or_else(|| EngineError::not_found("payment", id))?;

        let mut next = payment.clone();
        match next.apply(&transition) {
            Ok(()) => {
                *payment = next.clone();
                Ok(Applied::Done(next))
            }
            Err(EngineError::InvalidState(_)) => Ok(Applied::Unchanged(payment.clone())),
            Err(other) => Err(other),
        }
    }

    async fn record_conflict(&self, id: Uuid) -> Result<(), EngineError> {
        let mut inner = self.inner.write().await;
        let payment = inner
            .payments
            .get_mut(&id)
            .ok_or_else(|| EngineError::not_found("payment", id))?;
        payment.conflict_count += 1;
        payment.updated_at = Utc::now();
        Ok(())
    }

    async fn list_expired_pending(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<Payment>, EngineError> {
        let inner = self.inner.read().await;
        Ok(inner
            .payments
            .values()
            .filter(|p| p.is_expired_by(now))
            .cloned()
            .collect())
    }
}
